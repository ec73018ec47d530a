//!
//! helpdesk CLI binary
//! -------------------
//! Interactive interpreter and one-shot command runner for the helpdesk REST
//! backend. The session credential persists between runs in the token file.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use helpdesk_client::cli::{self, CliNavigator, Command};
use helpdesk_client::system_paths;
use helpdesk_client::{ClientConfig, HelpdeskClient};

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} [--config <file>] [--url <base_url>]                 # start the interpreter\n  {program} [--config <file>] [--url <base_url>] <command> [args]  # run one command and exit\n\nFlags:\n  --config <file>   JSON settings file (default: ~/.helpdesk/config.json, created with defaults)\n  --url <base_url>  backend origin, overrides the config file and HELPDESK_API_BASE_URL\n  -h, --help        show this help\n\nEnvironment:\n  HELPDESK_API_BASE_URL, HELPDESK_TOKEN_FILE, HELPDESK_PRINCIPAL_FRESH_SECS,\n  HELPDESK_QUERY_STALE_SECS, HELPDESK_REQUEST_TIMEOUT_SECS, HELPDESK_OUTPUT=json, RUST_LOG\n\n{}",
        cli::USAGE
    );
}

fn main() -> Result<()> {
    // Init logging; stderr keeps tables on stdout clean
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let mut args: Vec<String> = env::args().collect();
    let program = if args.is_empty() { "helpdesk".to_string() } else { args.remove(0) };

    let mut config_path: Option<PathBuf> = None;
    let mut base_url: Option<String> = None;
    let mut command: Vec<String> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                if i + 1 >= args.len() { eprintln!("--config requires a value"); print_usage(&program); std::process::exit(2); }
                config_path = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            "--url" => {
                if i + 1 >= args.len() { eprintln!("--url requires a value"); print_usage(&program); std::process::exit(2); }
                base_url = Some(args[i + 1].clone());
                i += 2;
            }
            "-h" | "--help" => {
                print_usage(&program);
                return Ok(());
            }
            _ => {
                command = args[i..].to_vec();
                break;
            }
        }
    }

    let config_path = config_path.unwrap_or_else(system_paths::default_config_file);
    let mut config = ClientConfig::load_or_default(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?
        .with_env_overrides(|k| env::var(k).ok())
        .context("invalid HELPDESK_* environment setting")?;
    if let Some(url) = base_url { config.api_base_url = url; }
    config.base_url().context("invalid --url")?;

    info!(
        target: "cli",
        "helpdesk starting: api='{}', token_file='{}', RUST_LOG='{}'",
        config.api_base_url,
        config.token_file.display(),
        env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string())
    );

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build Tokio runtime")?;

    let navigator = Arc::new(CliNavigator::new(&config.login_route, &config.landing_route));
    let client = HelpdeskClient::from_config(config, navigator.clone()).context("failed to create client")?;
    if !client.is_authenticated() {
        navigator.set_route(&client.config().login_route);
    }

    if !command.is_empty() {
        let cmd = Command::parse(&command.join(" "))?;
        rt.block_on(cli::execute(&client, cmd))?;
        return Ok(());
    }

    cli::run_repl(&rt, &client, &navigator)
}
