//! oxide-schema CLI
//!
//! Plans the DDL of JSON migration scripts.

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use oxide_schema::prelude::*;

/// Ordered DDL migration planning.
#[derive(Parser)]
#[command(name = "oxide-schema")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Target SQL dialect.
    #[arg(
        short,
        long,
        value_enum,
        env = "OXIDE_SCHEMA_DIALECT",
        default_value = "postgres"
    )]
    dialect: DialectName,

    /// Emit one clause per ALTER TABLE statement.
    #[arg(long)]
    single_clause: bool,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DialectName {
    Postgres,
    Sqlite,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the DDL for a migration script.
    Plan {
        /// Path to the JSON script.
        script: PathBuf,
    },

    /// Validate a migration script and summarise the planned actions.
    Check {
        /// Path to the JSON script.
        script: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so that planned SQL can be piped.
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let dialect: Box<dyn DdlDialect> = match cli.dialect {
        DialectName::Postgres => Box::new(PostgresDialect::new()),
        DialectName::Sqlite => Box::new(SqliteDialect::new()),
    };
    let policy = cli.single_clause.then(|| AlterationPolicy {
        multi_clause_alter: false,
        ..dialect.alteration_policy()
    });

    match cli.command {
        Commands::Plan { script } => {
            let migration = MigrationScript::from_path(&script)?;
            let db = migration.build(dialect, policy)?;
            print!("{}", db.sql());
            info!(
                actions = db.actions().len(),
                script = %script.display(),
                "planned migration"
            );
        }

        Commands::Check { script } => {
            let migration = MigrationScript::from_path(&script)?;
            let db = migration.build(dialect, policy)?;

            let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
            for action in db.actions() {
                let kind = match action.kind {
                    ActionKind::Create => "create",
                    ActionKind::Rename => "rename",
                    ActionKind::Alter => "alter",
                    ActionKind::Remove => "remove",
                };
                *counts.entry(kind).or_default() += 1;
            }

            println!(
                "{}: {} baseline steps, {} changes, {} actions",
                script.display(),
                migration.baseline.len(),
                migration.changes.len(),
                db.actions().len()
            );
            for (kind, count) in counts {
                println!("  {kind:<8} {count}");
            }
        }
    }

    Ok(())
}
