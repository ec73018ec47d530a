use serde::Serialize;
use serde_json::Value;

use terminal_size::{terminal_size, Height, Width};

pub const ENV_OUTPUT: &str = "HELPDESK_OUTPUT";

/// `HELPDESK_OUTPUT=json` switches every listing to pretty JSON.
pub fn json_output_forced() -> bool {
    std::env::var(ENV_OUTPUT).map(|v| v.eq_ignore_ascii_case("json")).unwrap_or(false)
}

/// Rows of entity fields laid out under fixed column names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// One row per record; each column is a top-level field of the record's JSON form.
    /// Nested objects collapse to their `name`, if they have one.
    pub fn from_records<T: Serialize>(records: &[T], columns: &[&str]) -> Table {
        let rows = records
            .iter()
            .map(|r| {
                let v = serde_json::to_value(r).unwrap_or(Value::Null);
                columns.iter().map(|c| to_cell_string(v.get(*c).unwrap_or(&Value::Null))).collect()
            })
            .collect();
        Table { columns: columns.iter().map(|c| c.to_string()).collect(), rows }
    }

    /// Field/value pairs of a single record, in the record's own field order.
    pub fn from_record<T: Serialize>(record: &T) -> Table {
        let rows = match serde_json::to_value(record) {
            Ok(Value::Object(map)) => map.iter().map(|(k, v)| vec![k.clone(), to_cell_string(v)]).collect(),
            Ok(other) => vec![vec!["value".to_string(), to_cell_string(&other)]],
            Err(_) => Vec::new(),
        };
        Table { columns: vec!["field".to_string(), "value".to_string()], rows }
    }

    /// Lines of the ASCII table, each fitted to `termw` visible columns.
    pub fn render(&self, termw: usize) -> Vec<String> {
        let mut widths: Vec<usize> = self.columns.iter().map(|s| s.chars().count().min(termw)).collect();
        for r in &self.rows {
            for (i, cell) in r.iter().enumerate().take(self.columns.len()) {
                let w = visible_len(cell);
                if w > widths[i] { widths[i] = w.min(termw); }
            }
        }
        let sep = build_separator(&widths);
        let mut out = Vec::with_capacity(self.rows.len() + 5);
        out.push(fit_line_to_width(&sep, termw));
        out.push(fit_line_to_width(&build_row_header_colored(&self.columns, &widths), termw));
        out.push(fit_line_to_width(&sep, termw));
        for r in &self.rows {
            out.push(fit_line_to_width(&build_row(r, &widths), termw));
        }
        out.push(fit_line_to_width(&sep, termw));
        out.push(format!("rows: {}", self.rows.len()));
        out
    }
}

/// Print a list of records as a table (or JSON when forced). Empty lists print a short note.
pub fn print_records<T: Serialize>(records: &[T], columns: &[&str]) {
    if json_output_forced() {
        print_json(&records);
        return;
    }
    if records.is_empty() {
        println!("(no rows)");
        return;
    }
    print_table(&Table::from_records(records, columns));
}

pub fn print_record<T: Serialize>(record: &T) {
    if json_output_forced() {
        print_json(record);
        return;
    }
    print_table(&Table::from_record(record));
}

pub fn print_table(table: &Table) {
    let termw = get_terminal_width();
    crate::tprintln!("[cli.outputformatter] detected terminal width={} columns", termw);
    for line in table.render(termw) {
        println!("{}", line);
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("error: cannot render output: {}", e),
    }
}

fn to_cell_string(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Object(map) => match map.get("name") {
            Some(Value::String(name)) => name.clone(),
            _ => v.to_string(),
        },
        Value::Array(items) => format!("[{}]", items.len()),
    }
}

fn build_separator(widths: &[usize]) -> String {
    let mut s = String::from("+");
    for w in widths {
        s.push_str(&"-".repeat(*w + 2));
        s.push('+');
    }
    s
}

fn build_row(cells: &[String], widths: &[usize]) -> String {
    let mut s = String::from("|");
    for (i, w) in widths.iter().enumerate() {
        let cell = cells.get(i).cloned().unwrap_or_default();
        let (text, align_right) = (truncate(&cell, *w), is_numeric_like(&cell));
        let pad = " ".repeat(w.saturating_sub(visible_len(&text)));
        s.push(' ');
        if align_right {
            s.push_str(&pad);
            s.push_str(&text);
        } else {
            s.push_str(&text);
            s.push_str(&pad);
        }
        s.push_str(" |");
    }
    s
}

// column names in green; padding follows the visible width
fn build_row_header_colored(cells: &[String], widths: &[usize]) -> String {
    let mut s = String::from("|");
    for (i, w) in widths.iter().enumerate() {
        let text = truncate(cells.get(i).map(String::as_str).unwrap_or(""), *w);
        s.push(' ');
        s.push_str(&format!("\x1b[32m{}\x1b[0m", text));
        s.push_str(&" ".repeat(w.saturating_sub(visible_len(&text))));
        s.push_str(" |");
    }
    s
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max { return s.to_string(); }
    if max <= 1 { return "…".to_string(); }
    s.chars().take(max - 1).collect::<String>() + "…"
}

fn is_numeric_like(s: &str) -> bool {
    let st = s.trim();
    !st.is_empty() && st.chars().all(|c| c.is_ascii_digit() || c == '.' || c == '-') && st.chars().any(|c| c.is_ascii_digit())
}

fn get_terminal_width() -> usize {
    match terminal_size() {
        Some((Width(w), Height(_))) if w > 8 => (w - 4) as usize,
        _ => 80,
    }
}

/// Cut a line at `maxw` visible chars, skipping over ANSI escapes, with a reset appended
/// so a truncated color cannot bleed.
fn fit_line_to_width(s: &str, maxw: usize) -> String {
    if visible_len(s) <= maxw { return s.to_string(); }
    let keep = maxw.saturating_sub(3);
    let mut out = String::new();
    let mut seen = 0usize;
    let mut chars = s.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\x1b' {
            out.push(ch);
            if chars.peek() == Some(&'[') {
                for c in chars.by_ref() {
                    out.push(c);
                    if c.is_ascii_alphabetic() { break; }
                }
            }
            continue;
        }
        if seen >= keep { break; }
        out.push(ch);
        seen += 1;
    }
    out.push_str("...\x1b[0m");
    out
}

/// Visible chars, ANSI CSI sequences excluded.
fn visible_len(s: &str) -> usize {
    let mut count = 0;
    let mut chars = s.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\x1b' {
            if chars.peek() == Some(&'[') {
                for c in chars.by_ref() {
                    if c.is_ascii_alphabetic() { break; }
                }
            }
            continue;
        }
        count += 1;
    }
    count
}
