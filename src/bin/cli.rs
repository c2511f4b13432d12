use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use ledgerkeep::authz::{roles, PermissionSet};
use ledgerkeep::models::invoice::Invoice;
use ledgerkeep::utils::hash_password;

#[derive(Parser, Debug)]
#[command(author, version, about = "ledgerkeep migration tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new empty migration with the provided name
    MakeMigration { name: String },
    /// Apply pending migrations
    MigrateRun,
    /// Show migration status against the current database
    MigrateStatus,
    /// Roll back the last applied migration
    MigrateRollback,
    /// Seed a demo organization with an owner account and sample records
    Seed,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Try to load env from CWD; when running in Docker the binary CWD may differ,
    // so fall back to the crate-local `.env` using CARGO_MANIFEST_DIR.
    if dotenv().is_err() {
        let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::MakeMigration { name } => {
            let path = make_migration_file(&name)?;
            println!("Created migration: {}", path.display());
        }
        Commands::MigrateRun => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            migrator.run(&pool).await?;
            println!("Migrations applied");
        }
        Commands::MigrateStatus => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            print_status(&pool, &migrator).await?;
        }
        Commands::MigrateRollback => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            migrator
                .undo(&pool, 1)
                .await
                .context("no migrations were rolled back")?;
            println!("Rolled back last migration");
        }
        Commands::Seed => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            migrator.run(&pool).await?;
            seed_demo(&pool).await?;
        }
    }

    Ok(())
}

fn make_migration_file(name: &str) -> anyhow::Result<PathBuf> {
    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    let sanitized = sanitize_name(name);
    let filename = format!("{}_{}.sql", timestamp, sanitized);
    let path = Path::new("migrations").join(filename);

    if path.exists() {
        anyhow::bail!("migration already exists: {}", path.display());
    }

    fs::write(&path, "-- Write your migration SQL here\n")
        .with_context(|| format!("failed to create migration at {}", path.display()))?;

    Ok(path)
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to database")
}

async fn print_status(pool: &SqlitePool, migrator: &sqlx::migrate::Migrator) -> anyhow::Result<()> {
    // If the migrations table doesn't exist, nothing is applied yet.
    let table_exists = sqlx::query(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
    )
    .fetch_optional(pool)
    .await?;

    let applied_versions: HashSet<i64> = if table_exists.is_some() {
        let rows = sqlx::query("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await?;
        rows.iter()
            .filter_map(|row| row.try_get::<i64, _>("version").ok())
            .collect()
    } else {
        HashSet::new()
    };

    println!("{:<8} {:<20} {}", "Status", "Version", "Name");
    for migration in migrator.iter() {
        let version = migration.version;
        let status = if applied_versions.contains(&version) {
            "applied"
        } else {
            "pending"
        };
        let desc = migration.description.as_ref().trim();
        let name = if !desc.is_empty() { desc } else { "unknown" };
        println!("{:<8} {:<20} {}", status, version, name);
    }

    Ok(())
}

const DEMO_EMAIL: &str = "demo@ledgerkeep.test";
const DEMO_PASSWORD: &str = "demo-password";

async fn seed_demo(pool: &SqlitePool) -> anyhow::Result<()> {
    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = ?")
        .bind(DEMO_EMAIL)
        .fetch_one(pool)
        .await?;
    if existing > 0 {
        println!("Demo data already present, nothing to do");
        return Ok(());
    }

    let now = Utc::now();
    let org_id = Uuid::new_v4();
    let role_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    let customer_id = Uuid::new_v4();
    let invoice_id = Uuid::new_v4();
    let password_hash = hash_password(DEMO_PASSWORD)?;

    let mut tx = pool.begin().await?;

    sqlx::query("INSERT INTO organizations (id, name, created_at, updated_at) VALUES (?, ?, ?, ?)")
        .bind(org_id.to_string())
        .bind("Demo Accounting")
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        "INSERT INTO roles (id, organization_id, name, display_name, permissions, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(role_id.to_string())
    .bind(org_id.to_string())
    .bind(roles::OWNER)
    .bind("Owner")
    .bind(PermissionSet::all().to_json())
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO users (id, organization_id, role_id, name, email, password_hash, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, 'active', ?, ?)",
    )
    .bind(user_id.to_string())
    .bind(org_id.to_string())
    .bind(role_id.to_string())
    .bind("Demo Owner")
    .bind(DEMO_EMAIL)
    .bind(password_hash)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO customers (id, organization_id, name, email, created_by, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(customer_id.to_string())
    .bind(org_id.to_string())
    .bind("Globex Ltd")
    .bind("billing@globex.test")
    .bind(user_id.to_string())
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    let subtotal = 1200.0;
    let tax_rate = 0.075;
    let (tax_amount, total) = Invoice::compute_totals(subtotal, tax_rate);

    sqlx::query(
        "INSERT INTO invoices (id, organization_id, customer_id, invoice_number, status, issue_date, currency, subtotal, tax_rate, tax_amount, total, created_by, created_at, updated_at) \
         VALUES (?, ?, ?, ?, 'draft', ?, 'USD', ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(invoice_id.to_string())
    .bind(org_id.to_string())
    .bind(customer_id.to_string())
    .bind("INV-DEMO-0001")
    .bind(now)
    .bind(subtotal)
    .bind(tax_rate)
    .bind(tax_amount)
    .bind(total)
    .bind(user_id.to_string())
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    println!("Seeded demo tenant: {} / {}", DEMO_EMAIL, DEMO_PASSWORD);
    Ok(())
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '_' => c,
            'A'..='Z' => c.to_ascii_lowercase(),
            _ => '_',
        })
        .collect()
}

async fn get_migrator() -> anyhow::Result<sqlx::migrate::Migrator> {
    // Prefer ./migrations when run from the repo root; fall back to the
    // crate-local directory for container CWDs.
    let local = Path::new("./migrations");
    let migrator_path = if local.exists() {
        local.to_path_buf()
    } else {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
    };

    let migrator_path_display = migrator_path.display().to_string();
    sqlx::migrate::Migrator::new(migrator_path)
        .await
        .with_context(|| format!("failed to load migrations from {}", migrator_path_display))
}
