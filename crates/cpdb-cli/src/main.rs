mod accounts;
mod collect;
mod quota;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::accounts::AccountsCommands;
use crate::collect::CollectCommands;

#[derive(Debug, Parser)]
#[command(name = "cpdb-cli")]
#[command(about = "Crypto-project social account collector")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Manage tracked social accounts
    Accounts {
        #[command(subcommand)]
        command: AccountsCommands,
    },
    /// Run or preview a collection cycle
    Collect {
        #[command(subcommand)]
        command: CollectCommands,
    },
    /// Show this month's API quota usage
    Quota,
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check database connectivity
    Ping,
    /// Apply pending migrations
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("cpdb-cli: no command given; run with --help for usage");
        return Ok(());
    };

    let config = cpdb_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = cpdb_db::PoolConfig::from_app_config(&config);
    let pool = cpdb_db::connect_pool(&config.database_url, pool_config).await?;

    match command {
        Commands::Db { command } => match command {
            DbCommands::Ping => {
                cpdb_db::ping(&pool).await?;
                println!("database: ok");
            }
            DbCommands::Migrate => {
                let applied = cpdb_db::run_migrations(&pool).await?;
                println!("migrations: {applied} applied");
            }
        },
        Commands::Accounts { command } => accounts::run(&pool, &config, command).await?,
        Commands::Collect { command } => collect::run(&pool, &config, command).await?,
        Commands::Quota => quota::run_quota(&pool, &config).await?,
    }

    Ok(())
}
