// ABOUTME: Entry point for the beach CLI application.
// ABOUTME: Loads settings, sets up logging, and dispatches to the console.

mod cli;

use beach::config::Settings;
use beach::console::{BlockingLines, Console, TerminalPassword};
use beach::credential::{CredentialStore, PasswordCodec};
use beach::error::Result;
use beach::output::{Output, OutputMode};
use beach::types::Target;
use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let settings = match load_settings(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    // RUST_LOG wins over the config file and --verbose
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.logging.default_directive()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(settings.logging.debug)
        .with_file(settings.logging.debug)
        .with_line_number(settings.logging.debug)
        .init();

    if let Err(e) = run(cli.command, settings).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = Settings::discover(cli.config.as_deref())?;
    if let Some(path) = &cli.store {
        settings.store_path = Some(path.clone());
    }
    if let Some(path) = &cli.key_file {
        settings.key_path = Some(path.clone());
    }
    if let Some(port) = cli.port {
        settings.port = port;
    }
    if cli.json {
        settings.output = OutputMode::Json;
    }
    if cli.verbose {
        settings.logging.debug = true;
    }
    Ok(settings)
}

async fn run(command: Option<Commands>, settings: Settings) -> Result<()> {
    let codec = PasswordCodec::for_encoding(settings.password_encoding, &settings.key_path()?)?;
    let store = CredentialStore::open(settings.store_path()?, codec)?;
    let output = Output::new(settings.output);

    match command.unwrap_or(Commands::Menu) {
        Commands::List => {
            let entries = store.list()?;
            if entries.is_empty() {
                output.line("No collected shells.");
            }
            for (i, (target, _)) in entries.iter().enumerate() {
                output.line(&format!("({i}) {target}"));
            }
            Ok(())
        }
        Commands::Menu => {
            let connector = settings.connector();
            let mut console = console(&settings, output)?;
            console.run_menu(&store, &connector).await
        }
        Commands::Connect { target } => {
            let target = Target::parse(&target)?;
            let connector = settings.connector();
            let mut console = console(&settings, output)?;
            console.connect_target(&store, &connector, &target).await?;
            Ok(())
        }
    }
}

fn console(settings: &Settings, output: Output) -> Result<Console<BlockingLines>> {
    // Not tokio::io::stdin: a read left pending when a session ends would
    // keep the runtime from shutting down until the user pressed enter.
    let input = BlockingLines::stdin()?;
    Ok(Console::new(input, output, Box::new(TerminalPassword))
        .session_config(settings.session_config())
        .settle_delay(settings.settle_delay)
        .port(settings.port))
}
