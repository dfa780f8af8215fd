mod extract;
mod insert;
mod prompt;
mod query;
mod setup;

use anyhow::Result;
use clap::Parser;
use pixrank::services::CONFIG_FILE;
use prompt::MenuChoice;
use setup::Session;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pixrank")]
#[command(about = "Rank stored images against text queries with CLIP embeddings", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose output (info logs)
    #[arg(short, long)]
    pub verbose: bool,

    /// Path to the JSON configuration file
    #[arg(long, default_value = CONFIG_FILE)]
    pub config: PathBuf,

    /// Use the stored configuration without asking
    #[arg(long)]
    pub use_default: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

fn print_menu() {
    println!("\nSelect an operation:");
    println!("1. Insert New Images into Database");
    println!("2. Batch Process Images to Generate Features");
    println!("3. Compare Query to Existing Images");
    println!("4. Batch Compare Queries to Existing Images");
    println!("5. Exit");
}

/// Open the session, then run the menu until the user exits
pub async fn execute(cli: Cli) -> Result<()> {
    let config = setup::resolve_config(&cli.config, cli.use_default)?;
    let session = setup::open_session(config).await?;

    loop {
        print_menu();
        let choice = prompt::ask_menu_choice()?;
        if choice == MenuChoice::Exit {
            println!("Exiting the program. Goodbye!");
            return Ok(());
        }

        if let Err(e) = run_choice(&session, choice).await {
            tracing::error!("Operation failed: {:#}", e);
            println!("Error: {:#}", e);
        }
    }
}

async fn run_choice(session: &Session, choice: MenuChoice) -> Result<()> {
    match choice {
        MenuChoice::Insert => insert::execute(session).await,
        MenuChoice::Extract => extract::execute(session).await,
        MenuChoice::Query => query::execute_single(session).await,
        MenuChoice::BatchQuery => query::execute_batch(session).await,
        MenuChoice::Exit => Ok(()),
    }
}
