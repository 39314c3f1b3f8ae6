use clap::{Parser, Subcommand};
use std::path::PathBuf;
use brook_cli::commands::{append, head, inspect, read, verify};

#[derive(Parser)]
#[command(name = "brook")]
#[command(about = "Brook CLI - inspect and append to file-backed event streams", long_about = None)]
struct Cli {
    /// Root directory of the brook store.
    #[arg(long, short, global = true, default_value = "brooks")]
    dir: PathBuf,

    /// Print Prometheus metrics collected during the command.
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show head, pending appends and snapshots of every brook.
    Inspect,
    /// Verify frame checksums and event contiguity without touching the store.
    Verify,
    /// Committed head of a brook, completing or rolling back an interrupted append.
    Head {
        brook_type: String,
        id: String,
    },
    /// Append one JSON event
    Append {
        brook_type: String,
        id: String,

        /// Event type used for reducer dispatch
        #[arg(long, short = 't')]
        event_type: String,

        /// JSON payload
        #[arg(long)]
        data: String,

        #[arg(long, default_value = "brook-cli")]
        source: String,

        /// Event id (defaults to type plus a timestamp)
        #[arg(long)]
        event_id: Option<String>,

        /// Required current head; -1 for an empty brook
        #[arg(long, allow_hyphen_values = true)]
        expected: Option<i64>,
    },
    /// List events in a position range
    Read {
        brook_type: String,
        id: String,

        #[arg(long, default_value_t = 0)]
        from: i64,

        /// Last position (defaults to the head)
        #[arg(long)]
        to: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    brook_node::telemetry::init_telemetry();

    let result = match cli.command {
        Commands::Inspect => inspect::run(&cli.dir).await,
        Commands::Verify => verify::run(&cli.dir),
        Commands::Head { brook_type, id } => head::run(&cli.dir, &brook_type, &id).await,
        Commands::Append {
            brook_type,
            id,
            event_type,
            data,
            source,
            event_id,
            expected,
        } => {
            append::run(
                &cli.dir,
                append::AppendArgs {
                    brook_type,
                    id,
                    event_type,
                    data,
                    source,
                    event_id,
                    expected,
                },
            )
            .await
        }
        Commands::Read {
            brook_type,
            id,
            from,
            to,
        } => read::run(&cli.dir, &brook_type, &id, from, to).await,
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "command failed");
    }
    if cli.metrics {
        println!("{}", brook_node::telemetry::render_metrics());
    }
    result
}
