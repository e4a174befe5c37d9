use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use forumdb::migrate::{load_migrations, migrate_down, migrate_up};
use forumdb::tasks::{load_routes, seed_role_permissions};
use forumdb::{Config, Forum};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "forumdb")]
#[command(about = "Maintenance tasks for the forum database")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply or revert schema migrations.
    Migrate {
        #[command(subcommand)]
        direction: Direction,
        /// Overrides MIGRATIONS_DIR.
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Create missing routes and role permissions from a route table.
    Seed {
        #[arg(long, default_value = "migrations/routes.json")]
        routes: PathBuf,
    },
    Roles {
        #[command(subcommand)]
        action: RolesAction,
    },
    /// Verify database and cache connectivity.
    Check,
}

#[derive(Subcommand)]
enum Direction {
    Up,
    Down {
        #[arg(long, default_value_t = 1)]
        steps: usize,
    },
}

#[derive(Subcommand)]
enum RolesAction {
    /// Recompute which role assignment is current for every user.
    Backfill,
    /// Make a role the user's current one.
    Assign {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        role: i64,
        /// The user performing the change.
        #[arg(long)]
        source: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("forumdb=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("failed to read configuration")?;
    let migrations_dir = config.migrations_dir.clone();
    let forum = Forum::connect(config)
        .await
        .context("failed to connect")?;
    let mut db = forum.database();

    match cli.command {
        Command::Migrate { direction, dir } => {
            let dir = dir.unwrap_or(migrations_dir);
            let migrations = load_migrations(&dir)
                .with_context(|| format!("failed to read migrations from {}", dir.display()))?;
            match direction {
                Direction::Up => {
                    let applied = migrate_up(&mut db, &migrations).await?;
                    if applied.is_empty() {
                        info!("database is up to date");
                    }
                }
                Direction::Down { steps } => {
                    let reverted = migrate_down(&mut db, &migrations, steps).await?;
                    if reverted.is_empty() {
                        info!("nothing to revert");
                    }
                }
            }
        }
        Command::Seed { routes } => {
            let table = load_routes(&routes)
                .with_context(|| format!("failed to read route table {}", routes.display()))?;
            let report = seed_role_permissions(&mut db, forum.cache(), table).await?;
            info!(
                routes = report.routes.len(),
                permissions = report.permissions,
                "seed finished"
            );
        }
        Command::Roles { action } => match action {
            RolesAction::Backfill => {
                let active = forum.role_assignments().backfill(&mut db).await?;
                info!(active, "backfill finished");
            }
            RolesAction::Assign { user, role, source } => {
                let assignment = forum
                    .role_assignments()
                    .assign(&mut db, user, role, source)
                    .await?;
                println!("{}", serde_json::to_string_pretty(&assignment)?);
            }
        },
        Command::Check => {
            let row = db.query_row("select 1::bigint", &[]).await?;
            if row.try_i64(0)? != 1 {
                bail!("unexpected answer from the database");
            }
            let cache = forum.cache();
            cache.set("forumdb:check", "ok", None).await?;
            if cache.get("forumdb:check").await?.as_deref() != Some("ok") {
                bail!("cache did not return the value just written");
            }
            cache.del(&["forumdb:check".to_string()]).await?;
            println!("{}", forum.stats().await);
        }
    }

    Ok(())
}
