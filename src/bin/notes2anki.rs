//! CLI binary for notes2anki.
//!
//! A thin shim over the library crate that maps CLI flags to `BatchConfig`,
//! runs one batch, and writes the Anki import file.

use anyhow::{Context, Result};
use clap::Parser;
use notes2anki::pipeline::intake::load_inputs;
use notes2anki::{
    default_export_file_name, AnkiBatchError, BatchConfig, BatchController,
    BatchProgressCallback, ItemId, ItemStatus, ModelSelector, ProgressCallback, QueuedItem,
    RunOutcome, RunSummary, SanitizePolicy, MAX_QUEUE_CAPACITY,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
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

/// Cut `s` to at most `max` characters, marking the cut with an ellipsis.
fn truncate(s: &str, max: usize) -> String {
    let flat = s.replace(['\n', '\r', '\t'], " ");
    match flat.char_indices().nth(max) {
        Some((idx, _)) => format!("{}\u{2026}", &flat[..idx]),
        None => flat,
    }
}

const TICKS: [&str; 11] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus one log line per photo.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Start of the item currently in flight; items never overlap.
    item_started: Mutex<Option<Instant>>,
}

impl CliProgressCallback {
    /// Spinner-only until `on_run_start` tells us the queue length.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);

        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Loading photos…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            item_started: Mutex::new(None),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} photos  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Processing");
        self.bar.reset_eta();
    }

    fn take_elapsed_secs(&self) -> f64 {
        self.item_started
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total: usize) {
        self.activate_bar(total);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Making flashcards from {total} photo(s)…"))
        ));
    }

    fn on_item_start(&self, position: usize, total: usize, _id: ItemId) {
        *self
            .item_started
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(Instant::now());
        self.bar
            .set_message(format!("Processing image {position}/{total}…"));
    }

    fn on_item_complete(&self, position: usize, total: usize, front: &str) {
        let secs = self.take_elapsed_secs();
        self.bar.println(format!(
            "  {} #{:>3}/{:<3}  {}  {}",
            green("✓"),
            position,
            total,
            truncate(front, 60),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_item_error(&self, position: usize, total: usize, error: &str) {
        let secs = self.take_elapsed_secs();
        self.bar.println(format!(
            "  {} #{:>3}/{:<3}  {}  {}",
            red("✗"),
            position,
            total,
            red(&truncate(error, 80)),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, summary: &RunSummary) {
        self.bar.finish_and_clear();
        let total = summary.stats.total;
        let failed = summary.stats.error;

        if failed == 0 {
            eprintln!(
                "{} {} card(s) created",
                green("✔"),
                bold(&summary.stats.done.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} card(s) created  ({} failed)",
                if failed == total {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&summary.stats.done.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # A folder of photos → Anki import file
  notes2anki photos/ -o cards.txt

  # Individual photos and a URL
  notes2anki page1.jpg page2.png https://example.com/notes.jpg

  # Pick the models for each stage
  notes2anki --extract-model gpt-4.1-mini --synth-model gemini-2.5-flash photos/

  # Plain-space line breaks instead of <br><br>
  notes2anki --separator space photos/ -o cards.txt

  # Print the export to stdout; or write a per-photo JSON report
  notes2anki photos/ -o -
  notes2anki --json photos/ > report.json

MODELS:
  Selector                 Provider   Vision   Default for
  ───────────────────────  ─────────  ──────   ───────────
  gemini-3-flash-preview   gemini     ✓        extraction
  gemini-2.5-flash         gemini     ✓
  gemini-2.5-pro           gemini     ✓
  gpt-4.1-nano             openai     ✓
  gpt-4.1-mini             openai     ✓
  deepseek-chat            deepseek   ✗        synthesis
  deepseek-reasoner        deepseek   ✗

  Extraction reads the photo, so it needs a vision model.

IMPORTING INTO ANKI:
  File → Import, choose the .txt file, set "Fields separated by: Tab"
  and tick "Allow HTML in fields".

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY      Google Gemini API key
  OPENAI_API_KEY      OpenAI API key
  DEEPSEEK_API_KEY    DeepSeek API key
  RUST_LOG            Override the log filter (e.g. notes2anki=debug)
"#;

/// Turn photographed study notes into Anki flashcards.
#[derive(Parser, Debug)]
#[command(
    name = "notes2anki",
    version,
    about = "Turn photographed study notes into Anki flashcards",
    long_about = "Send each photo through a vision model to transcribe it, then through a \
text model to write one question/answer card, and save every successful card to a \
tab-separated file ready for Anki's importer. A photo that fails is reported and skipped; \
the rest of the batch carries on.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Image files, directories of images, or HTTP/HTTPS URLs.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Export file. `-` prints to stdout. Default: anki_batch_<timestamp>.txt
    #[arg(short, long, env = "NOTES2ANKI_OUTPUT")]
    output: Option<PathBuf>,

    /// Vision model for the extraction stage.
    #[arg(long, env = "NOTES2ANKI_EXTRACT_MODEL", default_value = "gemini-3-flash-preview")]
    extract_model: ModelSelector,

    /// Text model for the synthesis stage.
    #[arg(long, env = "NOTES2ANKI_SYNTH_MODEL", default_value = "deepseek-chat")]
    synth_model: ModelSelector,

    /// Line-break replacement inside fields: html, space, or a custom string.
    #[arg(long, env = "NOTES2ANKI_SEPARATOR", default_value = "html")]
    separator: String,

    /// Per-stage call timeout in seconds (0 disables).
    #[arg(long, env = "NOTES2ANKI_STAGE_TIMEOUT", default_value_t = 120)]
    stage_timeout: u64,

    /// Maximum photos per batch; extra inputs are ignored.
    #[arg(long, env = "NOTES2ANKI_MAX_ITEMS", default_value_t = MAX_QUEUE_CAPACITY as u64,
          value_parser = clap::value_parser!(u64).range(1..=MAX_QUEUE_CAPACITY as u64))]
    max_items: u64,

    /// Max LLM output tokens per stage call.
    #[arg(long, env = "NOTES2ANKI_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "NOTES2ANKI_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Text file with a custom extraction system prompt.
    #[arg(long, env = "NOTES2ANKI_EXTRACTION_PROMPT")]
    extraction_prompt: Option<PathBuf>,

    /// Text file with a custom synthesis system prompt.
    #[arg(long, env = "NOTES2ANKI_SYNTHESIS_PROMPT")]
    synthesis_prompt: Option<PathBuf>,

    /// Downscale photos whose longest edge exceeds this many pixels.
    #[arg(long, env = "NOTES2ANKI_MAX_IMAGE_EDGE", default_value_t = 2000)]
    max_image_edge: u32,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "NOTES2ANKI_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Print a JSON report of every item instead of the summary.
    #[arg(long, env = "NOTES2ANKI_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "NOTES2ANKI_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "NOTES2ANKI_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "NOTES2ANKI_QUIET")]
    quiet: bool,
}

/// `--json` output.
#[derive(Serialize)]
struct Report<'a> {
    output: Option<String>,
    exported: usize,
    summary: &'a RunSummary,
    items: &'a [QueuedItem],
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; --verbose brings them all back.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
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

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb).await?;
    let controller =
        BatchController::from_config(&config).context("Failed to set up model providers")?;

    // ── Intake ───────────────────────────────────────────────────────────
    let items = load_inputs(&cli.inputs, &config)
        .await
        .context("Failed to load photos")?;
    if items.is_empty() {
        anyhow::bail!("No images found in the given inputs");
    }
    controller.enqueue(items)?;

    // ── Run ──────────────────────────────────────────────────────────────
    let summary = match controller.run().await {
        RunOutcome::Completed(summary) => summary,
        RunOutcome::Empty | RunOutcome::AlreadyRunning => RunSummary::default(),
    };

    // ── Export ───────────────────────────────────────────────────────────
    let to_stdout = cli.output.as_deref().is_some_and(|p| p.as_os_str() == "-");
    let output_path = cli
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(default_export_file_name()));

    let (exported, written_to) = if to_stdout {
        let payload = controller.export();
        if !payload.is_empty() {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(payload.as_bytes())
                .context("Failed to write to stdout")?;
            handle.write_all(b"\n").ok();
        }
        (summary.stats.done, None)
    } else {
        match controller.export_to_file(&output_path).await {
            Ok(count) => (count, Some(output_path.display().to_string())),
            Err(AnkiBatchError::NothingToExport) => {
                if !cli.quiet {
                    eprintln!("{} No cards were created; nothing exported", cyan("⚠"));
                }
                (0, None)
            }
            Err(e) => return Err(e).context("Failed to write export file"),
        }
    };

    // ── Report ───────────────────────────────────────────────────────────
    let snapshot = controller.snapshot();
    if cli.json {
        let report = Report {
            output: written_to,
            exported,
            summary: &summary,
            items: snapshot.as_slice(),
        };
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        if to_stdout {
            eprintln!("{json}");
        } else {
            println!("{json}");
        }
        return Ok(());
    }

    if cli.quiet {
        return Ok(());
    }

    if !show_progress {
        eprintln!(
            "Created {}/{} card(s) in {}ms",
            summary.stats.done, summary.stats.total, summary.duration_ms
        );
    }

    let failures: Vec<(usize, &QueuedItem)> = snapshot
        .iter()
        .enumerate()
        .filter(|(_, item)| item.status() == ItemStatus::Error)
        .collect();
    if !failures.is_empty() {
        eprintln!("{}", bold("Failed photos (run again to retry):"));
        for (index, item) in failures {
            eprintln!(
                "  {} #{:<3} {}  {}",
                red("✗"),
                index + 1,
                item.source().unwrap_or("<memory>"),
                dim(item.error_message().unwrap_or_default()),
            );
        }
    }

    if let Some(path) = written_to {
        eprintln!(
            "{}  {} card(s)  →  {}",
            green("✔"),
            exported,
            bold(&path)
        );
    }

    Ok(())
}

/// Map CLI args to `BatchConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<BatchConfig> {
    let mut builder = BatchConfig::builder()
        .extraction_model(cli.extract_model)
        .synthesis_model(cli.synth_model)
        .sanitize(parse_separator(&cli.separator))
        .stage_timeout_secs(cli.stage_timeout)
        .max_items(cli.max_items as usize)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_image_edge(cli.max_image_edge)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref path) = cli.extraction_prompt {
        builder = builder.extraction_prompt(read_prompt(path).await?);
    }
    if let Some(ref path) = cli.synthesis_prompt {
        builder = builder.synthesis_prompt(read_prompt(path).await?);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

async fn read_prompt(path: &PathBuf) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read prompt from {:?}", path))
}

/// Parse `--separator` into a `SanitizePolicy`.
fn parse_separator(s: &str) -> SanitizePolicy {
    match s.to_lowercase().as_str() {
        "html" | "br" => SanitizePolicy::HtmlBreak,
        "space" => SanitizePolicy::Space,
        _ => SanitizePolicy::Custom(s.to_string()),
    }
}
