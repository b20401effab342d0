pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "leavedesk",
    about = "Leavedesk operator CLI",
    long_about = "Operate Leavedesk migrations, demo data, config inspection, and single-message routing.",
    after_help = "Examples:\n  leavedesk migrate\n  leavedesk config\n  leavedesk route --user usr-emp-003 \"How much annual leave do I have left?\""
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo organisation (users and leave requests); safe to re-run")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Send one message through the router as an existing user")]
    Route {
        #[arg(long, help = "Id of the sending user")]
        user: String,
        #[arg(
            long,
            help = "Act with this role instead of the stored one (employee, manager, hr, admin)"
        )]
        role: Option<String>,
        #[arg(help = "Message text")]
        text: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => commands::config::run(),
        Command::Route { user, role, text } => commands::route::run(&user, role.as_deref(), &text),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
