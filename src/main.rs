use std::fmt;
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use treeql::{CancelToken, Engine, SqliteBackend};

/// Output format for the response document.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    /// Compact JSON output (single line)
    Json,
    /// Pretty-printed JSON with indentation
    Pretty,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            OutputFormat::Json => "json",
            OutputFormat::Pretty => "pretty",
        };
        write!(f, "{}", value)
    }
}

#[derive(Parser)]
#[command(
    name = "treeql",
    version = env!("CARGO_PKG_VERSION"),
    about = "Execute a tree-shaped JSON query against a SQLite database",
    after_help = EXAMPLES
)]
struct Cli {
    /// SQLite database to query
    #[arg(long)]
    db: PathBuf,

    /// Request document; reads stdin when omitted
    #[arg(long)]
    request: Option<PathBuf>,

    #[arg(long, default_value_t = OutputFormat::Json)]
    output: OutputFormat,

    /// Abort the request after this many milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
}

const EXAMPLES: &str = "\
Examples:
  treeql --db app.db --request query.json
  echo '{\"User\": {\"id>\": 0}}' | treeql --db app.db --output pretty";

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let body = match &cli.request {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading request from {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("reading request from stdin")?;
            buffer
        }
    };

    let backend = SqliteBackend::open(&cli.db)
        .with_context(|| format!("opening database {}", cli.db.display()))?;

    let mut engine = Engine::new(&backend);
    if let Some(ms) = cli.timeout_ms {
        engine = engine.with_cancel(CancelToken::with_timeout(Duration::from_millis(ms)));
    }

    let response = engine.execute_str(&body).map_err(|err| {
        anyhow::anyhow!(
            "[{}] {}{}",
            err.error_code(),
            err,
            err.remediation()
                .map(|hint| format!("\n  hint: {}", hint))
                .unwrap_or_default()
        )
    })?;

    match cli.output {
        OutputFormat::Json => println!("{}", response),
        OutputFormat::Pretty => {
            let value: serde_json::Value = serde_json::from_str(&response)?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }

    Ok(())
}
