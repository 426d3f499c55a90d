//! dirgate CLI - Command-line front end for the directory engine
//!
//! This CLI lets operators:
//! - Render structured filters to LDAP wire syntax
//! - Run attribute values through the converter registry
//! - Search and modify configured Active Directory domains

use clap::{Parser, Subcommand};

mod commands;
mod error;
mod logging;

use error::CliResult;
use logging::LogFormat;

/// dirgate CLI - Directory query and attribute conversion
#[derive(Parser)]
#[command(name = "dirgate")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t, env = "DIRGATE_LOG_FORMAT")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a structured JSON filter
    Filter(commands::filter::FilterArgs),

    /// Convert attribute values between wire and JSON form
    Convert(commands::convert::ConvertArgs),

    /// Search a domain
    Search(commands::directory::SearchArgs),

    /// Apply edits to an entry
    Edit(commands::directory::EditArgs),

    /// Create an entry
    Create(commands::directory::CreateArgs),

    /// Give an entry a new relative name
    Rename(commands::directory::RenameArgs),

    /// Move an entry under a new parent
    Move(commands::directory::MoveArgs),

    /// Delete an entry
    Delete(commands::directory::DeleteArgs),
}

#[tokio::main]
async fn main() {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    logging::init_logging(cli.log_format);

    match run(cli.command).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            e.print();
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(command: Commands) -> CliResult<()> {
    match command {
        Commands::Filter(args) => commands::filter::execute(args),
        Commands::Convert(args) => commands::convert::execute(args),
        Commands::Search(args) => commands::directory::search(args).await,
        Commands::Edit(args) => commands::directory::edit(args).await,
        Commands::Create(args) => commands::directory::create(args).await,
        Commands::Rename(args) => commands::directory::rename(args).await,
        Commands::Move(args) => commands::directory::move_object(args).await,
        Commands::Delete(args) => commands::directory::delete(args).await,
    }
}
