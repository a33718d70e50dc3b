use clap::{Parser, Subcommand};
use lotta_cli::{load_config, load_events, Session};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON file with cache configuration
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply recorded events and print the resulting views
    Replay {
        /// JSON array of cache events
        #[arg(short, long)]
        events: PathBuf,

        /// SQLite snapshot to restore from and save to
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Print the views held in a snapshot
    Inspect {
        #[arg(long)]
        db: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();

    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    match args.command {
        Command::Replay { events, db } => {
            let events = load_events(&events)?;
            let session = Session::open(db, config).await?;
            let applied = session.replay(events)?;
            println!("{}", serde_json::to_string_pretty(&session.views()?)?);
            if let Some(saved) = session.save().await? {
                eprintln!("Applied {} events, saved {} entries", applied, saved);
            }
        }
        Command::Inspect { db } => {
            let session = Session::open(Some(db), config).await?;
            println!("{}", serde_json::to_string_pretty(&session.views()?)?);
        }
    }

    Ok(())
}
