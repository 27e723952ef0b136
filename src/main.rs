//! atomspace-bridge CLI: fetch, convert and query AtomSpace atoms.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result};

use atomspace_bridge::adapter::{self, Conversion};
use atomspace_bridge::atom::Atom;
use atomspace_bridge::channel::CommandChannel;
use atomspace_bridge::config::BridgeConfig;
use atomspace_bridge::fetch::Fetcher;

#[derive(Parser)]
#[command(name = "atomspace-bridge", version, about = "AtomSpace client and format adapter")]
struct Cli {
    /// Config file (defaults to $XDG_CONFIG_HOME/atomspace-bridge/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the command/request timeout in milliseconds.
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load atoms from an asset file, legacy REST server or ws:// endpoint,
    /// printed in the flat encoding.
    Fetch {
        /// Target path or URL. Defaults to the configured WebSocket endpoint.
        target: Option<String>,
    },

    /// Convert a JSON file between encodings.
    Convert {
        /// Input file in either encoding.
        file: PathBuf,

        /// Output encoding.
        #[arg(long, value_enum, default_value = "flat")]
        to: Encoding,
    },

    /// Print the built-in Socrates sample.
    Sample {
        /// Print the flat encoding instead of the nested one.
        #[arg(long)]
        flat: bool,

        /// Load the configured `sample_data_file` instead (always flat).
        #[arg(long)]
        asset: bool,
    },

    /// Run a command against a live AtomSpace.
    Remote {
        /// WebSocket endpoint. Defaults to the configured one.
        #[arg(long)]
        url: Option<String>,

        #[command(subcommand)]
        action: RemoteAction,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Encoding {
    Flat,
    Nested,
}

#[derive(Subcommand)]
enum RemoteAction {
    /// List all atoms (nested encoding).
    Atoms,
    /// Show the JSON API version.
    Version,
    /// Send raw shell text.
    Raw { text: String },
    /// Insert an atom given as JSON.
    Make { atom: String },
    /// Check whether an atom exists.
    Have { atom: String },
    /// List links pointing at an atom.
    Incoming { atom: String },
    /// List values attached to an atom.
    Values { atom: String },
    /// Show an atom's truth value.
    Tv { atom: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => BridgeConfig::load(path)?,
        None => BridgeConfig::resolve()?,
    };
    if let Some(timeout_ms) = cli.timeout_ms {
        config.timeout_ms = timeout_ms;
    }

    match cli.command {
        Commands::Fetch { target } => {
            let target = target.unwrap_or_else(|| config.websocket_url.clone());
            let fetcher = Fetcher::new(config);
            let outcome = fetcher.fetch(&target).await?;
            fetcher.channel().disconnect().await;

            print_json(&outcome.conversion.response)?;
            eprintln!(
                "{} atoms ({} distinct) from {}",
                outcome.conversion.atom_count, outcome.conversion.distinct_handles, outcome.source
            );
        }

        Commands::Convert { file, to } => {
            let text = std::fs::read_to_string(&file).into_diagnostic()?;
            let payload: serde_json::Value = serde_json::from_str(&text).into_diagnostic()?;
            let conversion = Conversion::from_payload(&payload);
            match to {
                Encoding::Flat => print_json(&conversion.response)?,
                Encoding::Nested => print_json(&adapter::convert_old_to_new(&conversion.response))?,
            }
        }

        Commands::Sample { asset: true, .. } => {
            let outcome = Fetcher::new(config).fetch_sample().await?;
            print_json(&outcome.conversion.response)?;
        }

        Commands::Sample { flat, asset: false } => {
            let atoms = adapter::sample_data();
            if flat {
                print_json(&adapter::convert_new_to_old(&atoms))?;
            } else {
                print_json(&atoms)?;
            }
        }

        Commands::Remote { url, action } => {
            let url = url.unwrap_or_else(|| config.websocket_url.clone());
            let channel = CommandChannel::from_config(&config);
            channel.connect(&url).await?;
            let result = run_remote(&channel, action).await;
            channel.disconnect().await;
            result?;
        }
    }

    Ok(())
}

async fn run_remote(channel: &CommandChannel, action: RemoteAction) -> Result<()> {
    match action {
        RemoteAction::Atoms => print_json(&channel.get_all_atoms().await?)?,
        RemoteAction::Version => println!("{}", channel.get_version().await?),
        RemoteAction::Raw { text } => println!("{}", channel.send_raw(&text).await?),
        RemoteAction::Make { atom } => {
            let created = channel.make_atom(parse_atom(&atom)?).await?;
            println!("Created {created}");
        }
        RemoteAction::Have { atom } => {
            println!("{}", channel.have_atom(&parse_atom(&atom)?).await?);
        }
        RemoteAction::Incoming { atom } => {
            print_json(&channel.get_incoming(&parse_atom(&atom)?).await?)?;
        }
        RemoteAction::Values { atom } => {
            print_json(&channel.get_values(&parse_atom(&atom)?).await?)?;
        }
        RemoteAction::Tv { atom } => {
            print_json(&channel.get_truth_value(&parse_atom(&atom)?).await?)?;
        }
    }
    Ok(())
}

fn parse_atom(json: &str) -> Result<Atom> {
    serde_json::from_str(json)
        .into_diagnostic()
        .map_err(|e| e.wrap_err("atom must be JSON like {\"type\":\"ConceptNode\",\"name\":\"cat\"}"))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).into_diagnostic()?;
    println!("{json}");
    Ok(())
}
