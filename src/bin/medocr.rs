//! CLI binary for medocr.
//!
//! A thin shim over the library crate: flags map onto `ServiceConfig`, then
//! either the HTTP service starts or one local file runs through the pipeline.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use medocr::output::join_pages;
use medocr::pipeline::ocr::ocr_document;
use medocr::{server, DocumentExtractor, PdfiumRasterizer, ServiceConfig, TesseractEngine};
use serde_json::json;
use std::io::{self, Write};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Serve on 0.0.0.0:5000
  GEMINI_API_KEY=... medocr serve

  # Upload a document
  curl -F file=@lab_report.pdf http://localhost:5000/extract-entities

  # One-off extraction without the server
  medocr extract scan.png

  # OCR only, no model call (no API key needed)
  medocr extract report.pdf --ocr-only

RUNTIME DEPENDENCIES:
  tesseract   must be on PATH (Windows: C:/Program Files/Tesseract-OCR/),
              or set TESSERACT_CMD.
  PDFium      needed for PDF uploads; set PDFIUM_LIB_PATH to the library file
              or its directory when it is not on the loader path.

LOGGING:
  RUST_LOG overrides --verbose/--quiet, e.g. RUST_LOG=medocr=debug.
"#;

/// Extract structured medical fields from scanned documents.
#[derive(Parser, Debug)]
#[command(
    name = "medocr",
    version,
    about = "Extract structured medical fields from scanned documents",
    long_about = "OCR medical PDFs and images with Tesseract, then extract patient, diagnosis, \
medication and lab fields as JSON with Gemini or another LLM provider. Runs as an HTTP \
service (POST /extract-entities) or on a single local file.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "MEDOCR_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "MEDOCR_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service.
    Serve(ServeArgs),
    /// Process one local file and print the response JSON.
    Extract(ExtractArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Interface to bind.
    #[arg(long, env = "MEDOCR_HOST", default_value = "0.0.0.0")]
    host: IpAddr,

    /// Port to bind.
    #[arg(long, env = "MEDOCR_PORT", default_value_t = 5000)]
    port: u16,

    /// Largest accepted upload, in MiB.
    #[arg(long, env = "MEDOCR_MAX_UPLOAD_MB", default_value_t = 25,
          value_parser = clap::value_parser!(u64).range(1..=1024))]
    max_upload_mb: u64,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// PDF or image file.
    input: PathBuf,

    /// Stop after OCR; print only the recognised text.
    #[arg(long)]
    ocr_only: bool,

    /// Print compact JSON instead of pretty-printed.
    #[arg(long)]
    compact: bool,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

/// Flags shared by both subcommands.
#[derive(Args, Debug)]
struct PipelineArgs {
    /// Extraction provider: gemini, or any edgequake-llm provider (openai, anthropic, ollama, …).
    #[arg(long, env = "MEDOCR_PROVIDER", default_value = medocr::config::GEMINI_PROVIDER)]
    provider: String,

    /// Model ID passed to the provider.
    #[arg(long, env = "MEDOCR_MODEL", default_value = medocr::config::DEFAULT_MODEL)]
    model: String,

    /// Gemini API key.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Gemini API base URL.
    #[arg(long, env = "GEMINI_API_BASE_URL")]
    api_base_url: Option<String>,

    /// LLM temperature (0.0–2.0). Provider default when unset.
    #[arg(long, env = "MEDOCR_TEMPERATURE")]
    temperature: Option<f32>,

    /// Max LLM output tokens. Provider default when unset.
    #[arg(long, env = "MEDOCR_MAX_TOKENS")]
    max_tokens: Option<usize>,

    /// Tesseract executable.
    #[arg(long, env = "TESSERACT_CMD")]
    tesseract_cmd: Option<PathBuf>,

    /// Tesseract language pack(s), e.g. eng or eng+deu.
    #[arg(long, env = "MEDOCR_OCR_LANG", default_value = "eng")]
    ocr_lang: String,

    /// Pages recognised in parallel.
    #[arg(long, env = "MEDOCR_OCR_CONCURRENCY", default_value_t = 1)]
    ocr_concurrency: usize,

    /// Rendering DPI for PDF pages (72–600).
    #[arg(long, env = "MEDOCR_DPI", default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Path to the PDFium library file or its directory.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Directory for staged uploads (default: OS temp dir).
    #[arg(long, env = "MEDOCR_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,
}

impl PipelineArgs {
    fn builder(&self) -> medocr::ServiceConfigBuilder {
        let mut builder = ServiceConfig::builder()
            .provider(&self.provider)
            .model(&self.model)
            .ocr_language(&self.ocr_lang)
            .ocr_concurrency(self.ocr_concurrency)
            .dpi(self.dpi);

        if let Some(key) = &self.api_key {
            builder = builder.api_key(key);
        }
        if let Some(url) = &self.api_base_url {
            builder = builder.api_base_url(url);
        }
        if let Some(t) = self.temperature {
            builder = builder.temperature(t);
        }
        if let Some(n) = self.max_tokens {
            builder = builder.max_output_tokens(n);
        }
        if let Some(cmd) = &self.tesseract_cmd {
            builder = builder.tesseract_cmd(cmd);
        }
        if let Some(path) = &self.pdfium_lib {
            builder = builder.pdfium_library_path(path);
        }
        if let Some(dir) = &self.scratch_dir {
            builder = builder.scratch_dir(dir);
        }
        builder
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // `extract` shows a spinner, so library INFO logs are hidden unless
    // --verbose asks for them.
    let spinner_mode = matches!(cli.command, Command::Extract(_)) && !cli.quiet;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || spinner_mode {
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
        Command::Serve(args) => run_serve(args).await,
        Command::Extract(args) => run_extract(args, !cli.quiet && !cli.verbose).await,
    }
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let max_upload_bytes = usize::try_from(args.max_upload_mb * 1024 * 1024)
        .context("--max-upload-mb is too large for this platform")?;
    let config = args
        .pipeline
        .builder()
        .bind_addr(SocketAddr::new(args.host, args.port))
        .max_upload_bytes(max_upload_bytes)
        .build()
        .context("Invalid configuration")?;

    info!("Starting medocr with {config:?}");
    probe_tesseract(&config).await;

    let addr = config.bind_addr;
    let extractor =
        Arc::new(DocumentExtractor::from_config(config).context("Failed to set up extraction")?);
    server::serve(extractor, addr)
        .await
        .context("HTTP server failed")?;
    Ok(())
}

/// Warn early when Tesseract is missing; requests would fail one by one.
async fn probe_tesseract(config: &ServiceConfig) {
    match TesseractEngine::from_config(config).probe().await {
        Ok(version) => info!("OCR engine: {version}"),
        Err(e) => warn!("{e}"),
    }
}

async fn run_extract(args: ExtractArgs, show_spinner: bool) -> Result<()> {
    let filename = display_name(&args.input);
    let spinner = show_spinner.then(|| spinner(&filename));

    let builder = args.pipeline.builder();
    let value = if args.ocr_only {
        let config = builder.build_ocr_only().context("Invalid configuration")?;
        let pages = ocr_document(
            &args.input,
            Arc::new(PdfiumRasterizer::from_config(&config)),
            &TesseractEngine::from_config(&config),
            config.ocr_concurrency,
        )
        .await
        .context("OCR failed")?;
        json!({ "filename": filename, "ocr_text": join_pages(&pages) })
    } else {
        let config = builder.build().context("Invalid configuration")?;
        let extractor =
            DocumentExtractor::from_config(config).context("Failed to set up extraction")?;
        let response = extractor
            .process_file(&args.input, &filename)
            .await
            .context("Extraction failed")?;
        serde_json::to_value(&response).context("Failed to serialise output")?
    };

    if let Some(bar) = spinner {
        bar.finish_and_clear();
    }

    let rendered = if args.compact {
        serde_json::to_string(&value)
    } else {
        serde_json::to_string_pretty(&value)
    }
    .context("Failed to serialise output")?;

    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{rendered}").context("Failed to write to stdout")?;
    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn spinner(filename: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
    );
    bar.set_prefix("Processing");
    bar.set_message(filename.to_string());
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}
