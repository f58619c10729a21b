//! Grant a user admin membership on migrated organizations.
//!
//! Migrated organizations start with no members; this backfills admin access
//! for an operator account across all organizations or a single one.

use std::process::exit;

use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use migrator_core::config::Config;
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "create_memberships")]
#[command(about = "Create admin memberships on migrated organizations")]
struct Cli {
    /// Profile ID of the user to grant access
    #[arg(long = "user-id", value_name = "UUID")]
    user_id: Uuid,

    /// Email the profile must match, as a safety check
    #[arg(long)]
    email: String,

    /// Single organization ID; all organizations when omitted
    #[arg(long)]
    org: Option<String>,

    /// Preview without creating anything
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let pool = PgPool::connect(&config.database_url)
        .await
        .context("Failed to connect to target database")?;

    // The profile must exist with the stated email before touching
    // memberships; a typo in either flag stops here.
    let profile: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM profiles WHERE id = $1 AND email = $2")
            .bind(cli.user_id)
            .bind(&cli.email)
            .fetch_optional(&pool)
            .await?;
    if profile.is_none() {
        eprintln!(
            "{} user {} ({}) not found in profiles",
            style("error:").red().bold(),
            cli.email,
            cli.user_id
        );
        exit(1);
    }
    println!("Found user: {}", cli.email);

    let organizations: Vec<(String, String)> = match &cli.org {
        Some(org_id) => {
            sqlx::query_as("SELECT id, name FROM organizations WHERE id = $1")
                .bind(org_id)
                .fetch_all(&pool)
                .await?
        }
        None => {
            sqlx::query_as("SELECT id, name FROM organizations ORDER BY created_at DESC")
                .fetch_all(&pool)
                .await?
        }
    };

    if organizations.is_empty() {
        println!(
            "{}",
            style(match &cli.org {
                Some(org_id) => format!("Organization {org_id} not found"),
                None => "No organizations found".to_string(),
            })
            .yellow()
        );
        return Ok(());
    }

    println!("Found {} organization(s)", organizations.len());
    for (id, name) in &organizations {
        println!("  - {name} ({id})");
    }
    println!();

    if cli.dry_run {
        println!(
            "{}",
            style("DRY RUN MODE - no memberships will be created").yellow().bold()
        );
        return Ok(());
    }

    let mut created = 0;
    let mut existing = 0;
    let mut errors: Vec<(String, String)> = Vec::new();

    for (org_id, org_name) in &organizations {
        let already: Option<(i32,)> = sqlx::query_as(
            "SELECT 1 FROM memberships WHERE organization_id = $1 AND profile_id = $2",
        )
        .bind(org_id)
        .bind(cli.user_id)
        .fetch_optional(&pool)
        .await?;

        if already.is_some() {
            println!("  {} membership already exists for {org_name}", style("◦").yellow());
            existing += 1;
            continue;
        }

        let result = sqlx::query(
            "INSERT INTO memberships (organization_id, profile_id, role, created_at) \
             VALUES ($1, $2, 'admin', NOW())",
        )
        .bind(org_id)
        .bind(cli.user_id)
        .execute(&pool)
        .await;

        match result {
            Ok(_) => {
                println!("  {} created admin membership for {org_name}", style("✓").green());
                created += 1;
            }
            Err(error) => {
                println!("  {} failed for {org_name}: {error}", style("✗").red());
                errors.push((org_name.clone(), error.to_string()));
            }
        }
    }

    println!();
    println!("{}", style("Summary").cyan().bold());
    println!("  Created: {created}");
    println!("  Already existed: {existing}");
    println!("  Errors: {}", errors.len());
    println!("  Total organizations: {}", organizations.len());

    if !errors.is_empty() {
        exit(1);
    }
    Ok(())
}
