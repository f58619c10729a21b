//! Selective migration CLI.
//!
//! Migrates one source company into a freshly-created organization, with
//! optional table selection and a dry-run preview mode.

use std::process::exit;

use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use migrator_core::config::Config;
use migrator_core::runner::{MigrationOptions, MigrationRunner};
use migrator_core::tables;
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "migrate")]
#[command(about = "Migrate a source company into a new organization")]
struct Cli {
    /// Source company ID to migrate
    #[arg(long = "source-company", value_name = "UUID")]
    source_company: Uuid,

    /// Comma-separated list of tables, or "all"
    #[arg(long, default_value = "all")]
    tables: String,

    /// Preview what would be migrated without writing anything
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let tables = match tables::parse_table_list(&cli.tables) {
        Ok(tables) => tables,
        Err(error) => {
            eprintln!("{} {}", style("error:").red().bold(), error);
            exit(2);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    let source = PgPool::connect(&config.source_database_url)
        .await
        .context("Failed to connect to source database")?;
    let target = PgPool::connect(&config.database_url)
        .await
        .context("Failed to connect to target database")?;

    println!("{}", style("Starting selective migration").cyan().bold());
    println!("  Source company: {}", cli.source_company);
    println!(
        "  Tables: {}",
        tables
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!(
        "  Mode: {}",
        if cli.dry_run {
            style("DRY RUN").yellow()
        } else {
            style("LIVE MIGRATION").green()
        }
    );
    println!();

    let runner = MigrationRunner::new(source, target);
    let options = MigrationOptions {
        source_company_id: cli.source_company,
        tables,
        dry_run: cli.dry_run,
    };

    let summary = tokio::select! {
        result = runner.run(options) => result,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("{}", style("Migration interrupted, cleaning up views").yellow());
            runner.cleanup().await;
            exit(130);
        }
    };

    match summary {
        Ok(summary) => {
            println!();
            println!("{}", style("Migration statistics").cyan().bold());
            for entry in &summary.stats {
                println!("  {}: {} records", entry.table, entry.count);
            }

            if !summary.executed {
                println!();
                println!(
                    "{}",
                    style("DRY RUN MODE - no data was migrated").yellow().bold()
                );
                return Ok(());
            }

            println!();
            for (table, count) in &summary.moved {
                println!(
                    "  {} {}: {} records migrated",
                    style("✓").green(),
                    table,
                    count
                );
            }
            println!();
            println!(
                "{} \"{}\" migrated successfully",
                style("Done.").green().bold(),
                summary.company_name
            );
            println!("New organization ID: {}", style(&summary.org_id).bold());
            Ok(())
        }
        Err(error) => {
            eprintln!("{} {:#}", style("Migration failed:").red().bold(), error);
            exit(1);
        }
    }
}
