//! Recruitdb CLI - inspect and maintain the local recruiting databases

use clap::{Parser, Subcommand};
use recruitdb::config::{self, StoreConfig};
use recruitdb::{Recruit, StoreRouter};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "recruitdb")]
#[command(version = "0.1.0")]
#[command(about = "Multi-tenant local store for scraped recruiting data")]
#[command(long_about = r#"
Recruitdb keeps one embedded database per team plus a master registry of
every known team. The CLI inspects and maintains those databases:

Example usage:
  recruitdb teams
  recruitdb stats --team 12345
  recruitdb import --team 12345 --file recruits.json --replace
  recruitdb export --team 12345 --out backup.json
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file (default: recruitdb.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default recruitdb.toml
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// List every registered team
    Teams,

    /// Show registry, metadata and live counts for a team
    Stats {
        /// Team id
        #[arg(short, long)]
        team: String,
    },

    /// Export a team's recruits as JSON
    Export {
        /// Team id
        #[arg(short, long)]
        team: String,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Import recruits from a JSON file
    Import {
        /// Team id
        #[arg(short, long)]
        team: String,

        /// JSON file holding an array of recruits
        #[arg(short, long)]
        file: PathBuf,

        /// Clear existing recruits before importing
        #[arg(long)]
        replace: bool,
    },

    /// Clear all recruits for a team
    Clear {
        /// Team id
        #[arg(short, long)]
        team: String,
    },

    /// Probe every registered team database
    Doctor,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    if let Commands::Init { force } = &cli.command {
        let path = cli.config.clone().unwrap_or_else(config::default_config_path);
        config::write_config(&path, &StoreConfig::default(), *force)?;
        println!("✅ Wrote {}", path.display());
        return Ok(());
    }

    let store_config = config::load_config(cli.config.as_deref())?.unwrap_or_default();
    let router = StoreRouter::open(&store_config);

    match cli.command {
        Commands::Init { .. } => unreachable!("handled above"),

        Commands::Teams => {
            let teams = router.registry().get_all_teams().await?;
            if teams.is_empty() {
                println!("No teams registered yet.");
            } else {
                for team in teams {
                    println!(
                        "- {} {} (division: {}, world: {}, last accessed: {})",
                        team.team_id,
                        team.school_name,
                        team.division.as_deref().unwrap_or("?"),
                        team.world.as_deref().unwrap_or("?"),
                        team.last_accessed.format("%Y-%m-%d %H:%M"),
                    );
                }
            }
        }

        Commands::Stats { team } => {
            router.set_active_team(&team, None).await?;
            match router.get_team_stats().await? {
                Some(stats) => {
                    println!("Team {} - {}", stats.record.team_id, stats.record.school_name);
                    println!("  Division:  {}", stats.record.division.as_deref().unwrap_or("?"));
                    println!("  World:     {}", stats.record.world.as_deref().unwrap_or("?"));
                    println!("  Recruits:  {}", stats.recruit_count);
                    println!("  Watchlist: {}", stats.watchlist_count);
                    if let Some(season) = &stats.current_season {
                        println!("  Season:    {}", season);
                    }
                    if let Some(updated) = &stats.last_updated {
                        println!("  Updated:   {}", updated);
                    }
                }
                None => println!("❌ No stats available for team {}", team),
            }
        }

        Commands::Export { team, out } => {
            router.set_active_team(&team, None).await?;
            let recruits = router.get_all_recruits().await?;
            let json = serde_json::to_string_pretty(&recruits)?;
            match out {
                Some(path) => {
                    std::fs::write(&path, json)?;
                    println!("✅ Exported {} recruits to {}", recruits.len(), path.display());
                }
                None => println!("{}", json),
            }
        }

        Commands::Import { team, file, replace } => {
            router.set_active_team(&team, None).await?;

            let contents = std::fs::read_to_string(&file)?;
            let recruits: Vec<Recruit> = serde_json::from_str(&contents)?;

            if replace {
                let outcome = router.clear_all_recruits().await?;
                if let Some(warning) = outcome.warning {
                    println!("⚠️  {}", warning);
                }
            }

            let saved = router.save_recruits(recruits).await?;
            let (total, watched) = router.refresh_team_counts().await?;
            println!(
                "✅ Imported {} recruits (team total: {}, watchlist: {})",
                saved.len(),
                total,
                watched
            );
        }

        Commands::Clear { team } => {
            router.set_active_team(&team, None).await?;
            let outcome = router.clear_all_recruits().await?;
            router.refresh_team_counts().await?;
            if outcome.success {
                println!("✅ Cleared all recruits for team {}", team);
            } else {
                println!(
                    "⚠️  {}",
                    outcome.warning.unwrap_or_else(|| "clear not confirmed".to_string())
                );
            }
        }

        Commands::Doctor => {
            let teams = router.registry().get_all_teams().await?;
            if teams.is_empty() {
                println!("No teams registered yet.");
            }
            for team in teams {
                let store = router.set_active_team(&team.team_id, None).await?;
                if store.is_connection_healthy().await {
                    println!("✅ {} ({})", team.team_id, team.school_name);
                } else {
                    println!("❌ {} ({}) - data layer unavailable", team.team_id, team.school_name);
                }
            }
        }
    }

    router.shutdown().await;
    Ok(())
}
