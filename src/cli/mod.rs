//! Terminal front-end for the helpdesk client: command parsing, the interactive
//! interpreter and table output.

pub mod outputformatter;

use std::fmt;

use anyhow::{anyhow, bail, Context, Result};
use parking_lot::Mutex;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::debug;

use crate::client::HelpdeskClient;
use crate::identity::Navigator;
use crate::resources::{TicketFilter, TicketStatusUpdate};
pub use outputformatter::{json_output_forced, print_json, print_record, print_records, print_table, Table};

pub const USAGE: &str = "Commands:
  login <user> <password>        sign in and store the session credential
  logout                         end the session
  whoami                         show the signed-in user
  devices                        list devices
  device <id>                    show one device
  delete-device <id>             delete a device (admin)
  device-types                   list device types
  priorities                     list priorities
  statuses                       list statuses
  roles                          list roles (admin)
  users                          list users (admin)
  tickets [search]               list tickets, optionally filtered by description text
  ticket <id>                    show one ticket with its assignments
  set-status <ticket> <status>   change a ticket's status (id or name)
  help                           show this help
  quit | exit                    leave the interpreter";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login { username: String, password: String },
    Logout,
    WhoAmI,
    Devices,
    Device(i64),
    DeleteDevice(i64),
    DeviceTypes,
    Priorities,
    Statuses,
    Roles,
    Users,
    Tickets(Option<String>),
    Ticket(i64),
    SetStatus { ticket_id: i64, status: String },
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError(pub String);

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl std::error::Error for ParseError {}

fn parse_id(arg: Option<&&str>, usage: &str) -> Result<i64, ParseError> {
    let raw = arg.ok_or_else(|| ParseError(format!("usage: {}", usage)))?;
    raw.parse::<i64>().map_err(|_| ParseError(format!("not a number: {}", raw)))
}

impl Command {
    pub fn parse(line: &str) -> Result<Command, ParseError> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(head) = parts.first() else { return Err(ParseError("empty command".into())) };
        let cmd = match head.to_ascii_lowercase().as_str() {
            "login" => match (parts.get(1), parts.get(2)) {
                (Some(u), Some(p)) => Command::Login { username: u.to_string(), password: p.to_string() },
                _ => return Err(ParseError("usage: login <user> <password>".into())),
            },
            "logout" => Command::Logout,
            "whoami" => Command::WhoAmI,
            "devices" => Command::Devices,
            "device" => Command::Device(parse_id(parts.get(1), "device <id>")?),
            "delete-device" => Command::DeleteDevice(parse_id(parts.get(1), "delete-device <id>")?),
            "device-types" => Command::DeviceTypes,
            "priorities" => Command::Priorities,
            "statuses" => Command::Statuses,
            "roles" => Command::Roles,
            "users" => Command::Users,
            "tickets" => {
                let search = parts[1..].join(" ");
                Command::Tickets(if search.is_empty() { None } else { Some(search) })
            }
            "ticket" => Command::Ticket(parse_id(parts.get(1), "ticket <id>")?),
            "set-status" => {
                let ticket_id = parse_id(parts.get(1), "set-status <ticket> <status>")?;
                let status = parts[2..].join(" ");
                if status.is_empty() { return Err(ParseError("usage: set-status <ticket> <status>".into())); }
                Command::SetStatus { ticket_id, status }
            }
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => return Err(ParseError(format!("unknown command '{}'; type 'help'", other))),
        };
        Ok(cmd)
    }
}

/// Tracks the "screen" the session is on. Landing on the login route means the
/// session ended and the prompt switches back to the signed-out state.
pub struct CliNavigator {
    route: Mutex<String>,
    login_route: String,
}

impl CliNavigator {
    pub fn new(login_route: &str, initial: &str) -> Self {
        Self { route: Mutex::new(initial.to_string()), login_route: login_route.to_string() }
    }

    pub fn route(&self) -> String { self.route.lock().clone() }

    /// Move without the session-ended notice (startup without a stored credential).
    pub fn set_route(&self, route: &str) { *self.route.lock() = route.to_string(); }

    pub fn prompt(&self) -> String { format!("helpdesk:{}> ", self.route()) }
}

impl Navigator for CliNavigator {
    fn navigate(&self, route: &str) {
        let previous = std::mem::replace(&mut *self.route.lock(), route.to_string());
        debug!(target: "cli", from = %previous, to = %route, "navigate");
        if route == self.login_route && previous != self.login_route {
            eprintln!("session ended; sign in again with: login <user> <password>");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub async fn execute(client: &HelpdeskClient, cmd: Command) -> Result<Flow> {
    let api = client.api();
    match cmd {
        Command::Login { username, password } => {
            client.login(&username, &password).await.map_err(|e| anyhow!("login failed: {}", e))?;
            match client.current_principal().await {
                Some(p) => println!("signed in as {}", p.display_name()),
                None => println!("signed in"),
            }
        }
        Command::Logout => {
            client.logout().context("logout")?;
            println!("signed out");
        }
        Command::WhoAmI => {
            // each whoami is a fresh profile screen, so the principal is revalidated
            client.resolver().mount();
            match client.current_principal().await {
                Some(p) => print_record(&p),
                None => println!("not signed in"),
            }
        }
        Command::Devices => print_records(&api.devices().await?, &["device_id", "name", "device_type", "inventory_number"]),
        Command::Device(id) => print_record(&*api.device(id).await?),
        Command::DeleteDevice(id) => {
            api.delete_device(id).await?;
            println!("device {} deleted", id);
        }
        Command::DeviceTypes => print_records(&api.device_types().await?, &["device_type_id", "name"]),
        Command::Priorities => print_records(&api.priorities().await?, &["priority_id", "name", "display_order"]),
        Command::Statuses => print_records(&api.statuses().await?, &["status_id", "name", "display_order", "is_final"]),
        Command::Roles => print_records(&api.roles().await?, &["id", "name", "description"]),
        Command::Users => print_records(&api.users().await?, &["user_id", "username", "first_name", "last_name", "department", "role_id", "is_active"]),
        Command::Tickets(search) => {
            let filter = TicketFilter { search, ..Default::default() };
            print_records(&api.tickets(&filter).await?, &["ticket_id", "status", "priority", "device", "description", "created_at"]);
        }
        Command::Ticket(id) => {
            let ticket = api.ticket(id).await?;
            print_record(&*ticket);
            if !ticket.assignments.is_empty() && !json_output_forced() {
                print_records(&ticket.assignments, &["technician_id", "technician_name", "assigned_at"]);
            }
        }
        Command::SetStatus { ticket_id, status } => {
            let status_id = match status.parse::<i64>() {
                Ok(id) => id,
                Err(_) => {
                    let statuses = api.statuses().await?;
                    match statuses.iter().find(|s| s.name.eq_ignore_ascii_case(&status)) {
                        Some(s) => s.status_id,
                        None => bail!("no status named '{}'", status),
                    }
                }
            };
            let updated = api.update_ticket_status(ticket_id, &TicketStatusUpdate { status_id, resolution_notes: None }).await?;
            println!("ticket {} now has status {}", updated.ticket_id, updated.status.as_ref().map(|s| s.name.clone()).unwrap_or_else(|| updated.status_id.to_string()));
        }
        Command::Help => println!("{}", USAGE),
        Command::Quit => return Ok(Flow::Quit),
    }
    Ok(Flow::Continue)
}

/// Parse and run one command line, printing failures instead of returning them.
pub async fn run_line(client: &HelpdeskClient, line: &str) -> Flow {
    let cmd = match Command::parse(line) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e);
            return Flow::Continue;
        }
    };
    match execute(client, cmd).await {
        Ok(flow) => flow,
        Err(e) => {
            eprintln!("error: {:#}", e);
            Flow::Continue
        }
    }
}

pub fn run_repl(rt: &tokio::runtime::Runtime, client: &HelpdeskClient, navigator: &CliNavigator) -> Result<()> {
    let mut editor = DefaultEditor::new().context("failed to initialise line editor")?;
    println!("helpdesk interpreter connected to {}. Type 'help' for commands.", client.config().api_base_url);
    if !client.is_authenticated() {
        println!("not signed in; use: login <user> <password>");
    }
    loop {
        let line = match editor.readline(&navigator.prompt()) {
            Ok(l) => l,
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(anyhow!("reading input: {}", e)),
        };
        let line = line.trim();
        if line.is_empty() { continue; }
        // keep passwords out of the history
        if !line.starts_with("login ") {
            let _ = editor.add_history_entry(line);
        }
        if rt.block_on(run_line(client, line)) == Flow::Quit { break; }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_with_arguments() {
        assert_eq!(Command::parse("login alice correct-pw").unwrap(), Command::Login { username: "alice".into(), password: "correct-pw".into() });
        assert_eq!(Command::parse("DELETE-DEVICE 5").unwrap(), Command::DeleteDevice(5));
        assert_eq!(Command::parse("tickets").unwrap(), Command::Tickets(None));
        assert_eq!(Command::parse("tickets printer jam").unwrap(), Command::Tickets(Some("printer jam".into())));
        assert_eq!(Command::parse("set-status 7 In Progress").unwrap(), Command::SetStatus { ticket_id: 7, status: "In Progress".into() });
        assert_eq!(Command::parse("exit").unwrap(), Command::Quit);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(Command::parse("login alice").is_err());
        assert!(Command::parse("device five").is_err());
        assert!(Command::parse("set-status 7").is_err());
        assert!(Command::parse("frobnicate").is_err());
    }

    #[test]
    fn navigator_tracks_route() {
        let nav = CliNavigator::new("/login", "/user");
        assert_eq!(nav.prompt(), "helpdesk:/user> ");
        nav.navigate("/login");
        assert_eq!(nav.route(), "/login");
    }
}
