pub mod commands;

use clap::{Parser, Subcommand};
use linedesk_core::config::{load_dotenv, DOTENV_FILE};
use std::path::Path;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "linedesk",
    about = "Linedesk operator CLI",
    long_about = "Inspect configuration, check runtime readiness, and talk to the agents without LINE.",
    after_help = "Examples:\n  linedesk doctor --json\n  linedesk config\n  linedesk chat --user U123 \"/agent echo hello\""
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, LINE credential presence, and LLM agent readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Route one message through the agents and print the reply as JSON")]
    Chat {
        #[arg(long, default_value = "cli-user", help = "User id the conversation belongs to")]
        user: String,
        #[arg(help = "Message text, e.g. `/agent echo hi`")]
        message: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    if let Err(error) = load_dotenv(Path::new(DOTENV_FILE)) {
        let result = commands::CommandResult::failure(
            "linedesk",
            "config_validation",
            error.to_string(),
            2,
        );
        println!("{}", result.output);
        return ExitCode::from(result.exit_code);
    }

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Chat { user, message } => commands::chat::run(&user, &message),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
