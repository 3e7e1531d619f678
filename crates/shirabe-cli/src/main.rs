use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use url::Url;

use shirabe_core::config::Config;
use shirabe_core::models::Purpose;
use shirabe_core::proximity::{jaro, proximity};
use shirabe_runtime::{Runtime, RuntimeError};

#[derive(Parser)]
#[command(name = "shirabe")]
#[command(about = "Resolve episodes on streaming sites into playable media")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve one episode of the content at URL
    Resolve {
        url: Url,

        /// Episode name as listed by the site
        #[arg(short, long, default_value = "1")]
        episode: String,

        /// playback, casting or download (defaults to the configured purpose)
        #[arg(short, long)]
        purpose: Option<Purpose>,

        /// Use this server id instead of the recommended one
        #[arg(short, long)]
        server: Option<String>,

        /// Print what the pipeline did to stderr
        #[arg(long)]
        events: bool,
    },

    /// Search every enabled source
    Search {
        query: String,

        /// Print only the hit whose title matches the query
        #[arg(long)]
        best: bool,
    },

    /// List registered sources and parsers
    Servers,

    /// Title proximity of two strings
    Similarity { a: String, b: String },
}

fn main() -> ExitCode {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli.command, config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands, config: Config) -> Result<(), RuntimeError> {
    match command {
        Commands::Resolve {
            url,
            episode,
            purpose,
            server,
            events,
        } => {
            let runtime = Runtime::with_config(config)?;
            let result = runtime.resolve(&url, &episode, purpose, server).await;
            if events {
                for (at, event) in runtime.events() {
                    eprintln!("{}  {event}", at.format("%H:%M:%S%.3f"));
                }
            }
            print_json(&result?);
        }
        Commands::Search { query, best } => {
            let runtime = Runtime::with_config(config)?;
            if best {
                match runtime.find(&query).await? {
                    Some(link) => print_json(&link),
                    None => println!("no title matched \"{query}\""),
                }
            } else {
                let hits = runtime.search(&query).await?;
                print_json(&hits);
            }
        }
        Commands::Servers => {
            let runtime = Runtime::with_config(config)?;
            let catalog = runtime.catalog();
            for entry in catalog.sources.iter() {
                println!("source  {}", entry.key);
            }
            for entry in catalog.parsers.iter() {
                if entry.aliases.is_empty() {
                    println!("parser  {}", entry.key);
                } else {
                    println!("parser  {} ({})", entry.key, entry.aliases.join(", "));
                }
            }
        }
        Commands::Similarity { a, b } => {
            println!("jaro          {:.4}", jaro(&a, &b));
            println!("jaro-winkler  {:.4}", proximity(&a, &b));
        }
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("failed to encode output: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_resolve_arguments() {
        let cli = Cli::try_parse_from([
            "shirabe",
            "resolve",
            "https://cdn.example/ep.m3u8",
            "--purpose",
            "cast",
            "-s",
            "direct",
        ])
        .unwrap();
        match cli.command {
            Commands::Resolve {
                purpose, server, episode, ..
            } => {
                assert_eq!(purpose, Some(Purpose::Casting));
                assert_eq!(server.as_deref(), Some("direct"));
                assert_eq!(episode, "1");
            }
            _ => panic!("Expected resolve"),
        }
    }

    #[test]
    fn test_rejects_unknown_purpose() {
        assert!(Cli::try_parse_from([
            "shirabe",
            "resolve",
            "https://cdn.example/ep.m3u8",
            "--purpose",
            "stream"
        ])
        .is_err());
    }
}
