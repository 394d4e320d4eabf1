use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;

use offline_ledger::cli::args::{Cli, Commands};
use offline_ledger::cli::commands;
use offline_ledger::config::{Config, Paths};
use offline_ledger::logging;
use offline_ledger::LedgerError;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{}: {:#}", "error".red().bold(), e);
        // 2 marks errors the user can fix by acting on the ledger
        let code = e
            .downcast_ref::<LedgerError>()
            .map_or(1, |err| if err.is_user_actionable() { 2 } else { 1 });
        std::process::exit(code);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let format = cli.output;

    if let Commands::Completions { shell } = cli.command {
        print!("{}", commands::completions(shell));
        return Ok(());
    }

    let paths = match cli.home {
        Some(root) => Paths::with_root(root),
        None => Paths::new()?,
    };
    let config = Config::load_from_path(&paths.config_file)?;
    logging::init(cli.verbose, &config.logging);

    let service = commands::open_service(&paths, &config, cli.offline)
        .await
        .with_context(|| format!("opening ledger at {}", paths.root.display()))?;

    let output = match cli.command {
        Commands::Status => commands::status(&service, format).await?,
        Commands::Enqueue(args) => commands::enqueue(&service, args, format).await?,
        Commands::Drain { force } => commands::drain(&service, force, format).await?,
        Commands::Sync => commands::sync(&service, format).await?,
        Commands::Queue(args) => commands::queue(&service, args.command, format).await?,
        Commands::DeadLetter(args) => commands::dead_letter(&service, args.command, format).await?,
        Commands::Payment(args) => commands::payment(&service, args.command, format).await?,
        Commands::Conflicts(args) => commands::conflicts(&service, args.command, format).await?,
        Commands::Completions { .. } => String::new(),
    };

    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}
