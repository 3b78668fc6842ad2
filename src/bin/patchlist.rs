//! CLI binary for patchlist-ingest.
//!
//! `patchlist extract` reads one rider and prints its patch list;
//! `patchlist serve` runs the HTTP upload service.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use patchlist_ingest::{
    extract, persist_patch_list, ExtractionConfig, ExtractionOutput, SqliteStore,
    DEFAULT_MAX_UPLOAD_BYTES,
};
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Print the patch list of a rider
  patchlist extract rider.pdf

  # Full JSON (patch list + raw model answer + stats)
  patchlist extract --json rider.pdf > rider.json

  # Extract and store under the artist's storage key
  patchlist extract --persist --db patchlist.db rider.pdf

  # Rider from a URL, specific model
  patchlist extract --provider openai --model gpt-4.1 https://example.com/rider.pdf

  # Run the upload service
  patchlist serve --bind 127.0.0.1:8080 --db patchlist.db
  curl -F "file=@rider.pdf;type=application/pdf" http://127.0.0.1:8080/api/riders

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY              OpenAI API key
  ANTHROPIC_API_KEY           Anthropic API key
  GEMINI_API_KEY              Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER      Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL             Override model ID
  PDFIUM_LIB_PATH             Directory containing libpdfium (else the system library)
  PATCHLIST_BIND              serve: listen address
  PATCHLIST_DB                SQLite database file
  PATCHLIST_UPLOAD_DIR        serve: where uploads are spooled
  PATCHLIST_MAX_UPLOAD_BYTES  Largest accepted PDF
"#;

/// Extract live-sound patch lists from technical rider PDFs.
#[derive(Parser, Debug)]
#[command(
    name = "patchlist",
    version,
    about = "Extract live-sound patch lists from technical rider PDFs using Vision LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PATCHLIST_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PATCHLIST_QUIET")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read one rider (file or URL) and print its patch list.
    Extract(ExtractArgs),
    /// Run the HTTP upload service.
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Output structured JSON (ExtractionOutput) instead of a table.
    #[arg(long)]
    json: bool,

    /// Store the patch list in the document database.
    #[arg(long)]
    persist: bool,

    /// SQLite database used with --persist.
    #[arg(long, env = "PATCHLIST_DB", default_value = "patchlist.db")]
    db: String,

    /// PDF user password for encrypted riders.
    #[arg(long, env = "PATCHLIST_PASSWORD")]
    password: Option<String>,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PATCHLIST_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    #[command(flatten)]
    model: ModelArgs,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Listen address.
    #[arg(long, env = "PATCHLIST_BIND", default_value = "0.0.0.0:8080")]
    bind: std::net::SocketAddr,

    /// SQLite database file.
    #[arg(long, env = "PATCHLIST_DB", default_value = "patchlist.db")]
    db: String,

    /// Directory uploads are spooled to.
    #[arg(long, env = "PATCHLIST_UPLOAD_DIR")]
    upload_dir: Option<PathBuf>,

    #[command(flatten)]
    model: ModelArgs,
}

/// Model settings shared by both subcommands.
#[derive(Args, Debug)]
struct ModelArgs {
    /// LLM model ID (e.g. gpt-4.1-mini, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Pages shown to the model, from the start of the rider.
    #[arg(long, env = "PATCHLIST_MAX_PAGES", default_value_t = 8,
          value_parser = clap::value_parser!(u64).range(1..=50))]
    max_pages: u64,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "PATCHLIST_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Max LLM output tokens.
    #[arg(long, env = "PATCHLIST_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PATCHLIST_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Retries on LLM failure.
    #[arg(long, env = "PATCHLIST_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// LLM call timeout in seconds.
    #[arg(long, env = "PATCHLIST_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Largest accepted PDF, in bytes.
    #[arg(long, env = "PATCHLIST_MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    max_upload_bytes: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Extract(args) => run_extract(args, cli.quiet).await,
        Command::Serve(args) => run_serve(args).await,
    }
}

async fn run_extract(args: ExtractArgs, quiet: bool) -> Result<()> {
    let mut config = build_config(&args.model).await?;
    config.password = args.password.clone();
    config.download_timeout_secs = args.download_timeout;

    let spinner = (!quiet && !args.json).then(|| {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  ⏱ {elapsed}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Reading");
        bar.set_message(args.input.clone());
        bar.enable_steady_tick(Duration::from_millis(80));
        bar
    });

    let result = extract(&args.input, &config).await;
    if let Some(bar) = &spinner {
        bar.finish_and_clear();
    }
    let output = result.context("Extraction failed")?;

    if args.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else {
        print_table(&output);
    }

    if args.persist {
        let store = SqliteStore::open(&args.db)
            .await
            .with_context(|| format!("Failed to open database '{}'", args.db))?;
        let written = persist_patch_list(&store, &output.extraction)
            .await
            .context("Failed to store patch list")?;
        if !quiet {
            eprintln!(
                "{} {} channel(s) stored under {}",
                green("✔"),
                written,
                bold(&output.extraction.storage_key)
            );
        }
    }

    if !quiet && !args.json {
        let stats = &output.stats;
        eprintln!(
            "   {}/{} pages  {} tokens in  /  {} tokens out  {}ms total",
            stats.rendered_pages,
            stats.total_pages,
            dim(&stats.input_tokens.to_string()),
            dim(&stats.output_tokens.to_string()),
            stats.total_duration_ms,
        );
    }

    Ok(())
}

/// Table cell text: strings unquoted, `null` blank, anything else as JSON.
fn cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn print_table(output: &ExtractionOutput) {
    let ex = &output.extraction;
    println!("{} {}  ({})", cyan("◆"), bold(&ex.main_artist), dim(&ex.storage_key));
    println!();
    println!("{:>4}  {:<20}  {:<24}  {}", "Ch", "Mic/DI", "Source", "Comments/Stand");
    for entry in &ex.entries {
        println!(
            "{:>4}  {:<20}  {:<24}  {}",
            entry.channel_number.to_string(),
            cell(&entry.mic_or_di),
            cell(&entry.patch_name),
            cell(&entry.comments_or_stand)
        );
    }
    if ex.excluded_entries > 0 {
        println!();
        println!(
            "{}",
            dim(&format!("{} incomplete row(s) skipped", ex.excluded_entries))
        );
    }
    if !ex.instruments_and_backlines.is_empty() {
        println!();
        println!("{}", bold("Backline"));
        for item in &ex.instruments_and_backlines {
            println!("  - {item}");
        }
    }
}

#[cfg(feature = "server")]
async fn run_serve(args: ServeArgs) -> Result<()> {
    use patchlist_ingest::server::{serve, AppState, ServerConfig};
    use patchlist_ingest::VisionExtractor;
    use std::sync::Arc;

    let config = build_config(&args.model).await?;

    let mut server_config = ServerConfig::from_env();
    server_config.bind = args.bind;
    server_config.db_path = args.db;
    server_config.max_upload_bytes = config.max_upload_bytes;
    if let Some(dir) = args.upload_dir {
        server_config.upload_dir = dir;
    }

    let extractor = VisionExtractor::new(config).context("Failed to set up the LLM provider")?;
    let store = SqliteStore::open(&server_config.db_path)
        .await
        .with_context(|| format!("Failed to open database '{}'", server_config.db_path))?;

    let state = AppState::new(Arc::new(extractor), Arc::new(store), server_config);
    serve(state).await.context("Server stopped")?;
    Ok(())
}

#[cfg(not(feature = "server"))]
async fn run_serve(_args: ServeArgs) -> Result<()> {
    anyhow::bail!("this build has no HTTP service; rebuild with --features server")
}

/// Map model flags to `ExtractionConfig`.
async fn build_config(args: &ModelArgs) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .max_pages(args.max_pages as usize)
        .max_tokens(args.max_tokens)
        .temperature(args.temperature)
        .max_retries(args.max_retries)
        .api_timeout_secs(args.api_timeout)
        .max_upload_bytes(args.max_upload_bytes);

    if let Some(ref model) = args.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = args.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref path) = args.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }

    builder.build().context("Invalid configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_args() {
        let cli = Cli::try_parse_from(["patchlist", "extract", "rider.pdf", "--json", "--persist"])
            .unwrap();
        match cli.command {
            Command::Extract(args) => {
                assert_eq!(args.input, "rider.pdf");
                assert!(args.json);
                assert!(args.persist);
            }
            other => panic!("expected extract, got {other:?}"),
        }
    }

    #[test]
    fn test_serve_args() {
        let cli = Cli::try_parse_from(["patchlist", "serve", "--bind", "127.0.0.1:9000"]).unwrap();
        match cli.command {
            Command::Serve(args) => assert_eq!(args.bind.port(), 9000),
            other => panic!("expected serve, got {other:?}"),
        }
    }

    #[test]
    fn test_global_verbose_after_subcommand() {
        let cli = Cli::try_parse_from(["patchlist", "extract", "rider.pdf", "-v"]).unwrap();
        assert!(cli.verbose);
    }

    #[test]
    fn test_max_pages_range() {
        assert!(Cli::try_parse_from(["patchlist", "extract", "r.pdf", "--max-pages", "0"]).is_err());
        assert!(Cli::try_parse_from(["patchlist", "extract", "r.pdf", "--max-pages", "3"]).is_ok());
    }

    #[test]
    fn test_extract_requires_input() {
        assert!(Cli::try_parse_from(["patchlist", "extract"]).is_err());
    }

    #[tokio::test]
    async fn test_build_config_maps_flags() {
        let cli = Cli::try_parse_from([
            "patchlist",
            "extract",
            "r.pdf",
            "--max-pages",
            "2",
            "--max-tokens",
            "1000",
            "--max-retries",
            "1",
        ])
        .unwrap();
        let Command::Extract(args) = cli.command else {
            panic!("expected extract");
        };
        let config = build_config(&args.model).await.unwrap();
        assert_eq!(config.max_pages, 2);
        assert_eq!(config.max_tokens, 1000);
        assert_eq!(config.max_retries, 1);
    }
}
