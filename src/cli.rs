use crate::{
    classify::classify,
    config::Config,
    engine::EngineRegistry,
    job::{self, Job, JobKind},
    ocr::tools::probe_tool,
    router,
    util::ensure_dir,
};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "docshift")]
#[command(about = "Document conversion orchestrator (engine racing + batched OCR + routing policy)")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./docshift.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Probe the external toolchain and report availability.
    Doctor {},
    /// Classify a document and print the routing decision.
    Classify {
        #[arg(long)]
        input: PathBuf,
    },
    /// Convert a document, racing engines or running OCR as appropriate.
    Convert {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        /// Job kind; inferred from the file extensions when omitted.
        #[arg(long, value_enum)]
        kind: Option<JobKind>,
    },
}

pub fn dispatch(args: Args) -> Result<()> {
    let cfg = load_config(args.config.as_deref())?;
    let _guard = init_logging(&args, &cfg)?;

    match &args.cmd {
        Command::Doctor {} => doctor(),
        Command::Classify { input } => classify_cmd(&cfg, input),
        Command::Convert {
            input,
            output,
            kind,
        } => convert(&cfg, input, output, *kind),
    }
}

fn load_config(user: Option<&Path>) -> Result<Config> {
    if let Some(p) = user {
        return Config::load(p);
    }
    for candidate in ["docshift.toml", "docshift.example.toml"] {
        let p = PathBuf::from(candidate);
        if p.exists() {
            return Config::load(&p);
        }
    }
    let mut cfg = Config::default();
    cfg.apply_env_overrides();
    Ok(cfg)
}

fn init_logging(args: &Args, cfg: &Config) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(true).boxed()
    };

    let (file_layer, guard) = if cfg.logging.write_to_file {
        let path = if cfg.logging.file_path.is_empty() {
            PathBuf::from(&cfg.paths.work_dir).join("docshift.log")
        } else {
            PathBuf::from(&cfg.logging.file_path)
        };
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::File::create(&path)
            .with_context(|| format!("create log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn doctor() -> Result<()> {
    let diags = vec![
        probe_tool("libreoffice", "soffice", "--version"),
        probe_tool("pdftoppm", "pdftoppm", "-v"),
        probe_tool("pdfinfo", "pdfinfo", "-v"),
        probe_tool("tesseract", "tesseract", "--version"),
        probe_tool("pdf2docx", "pdf2docx", "--version"),
        probe_tool("unoconv", "unoconv", "--version"),
    ];
    println!("{}", serde_json::to_string_pretty(&diags)?);
    Ok(())
}

fn classify_cmd(cfg: &Config, input: &Path) -> Result<()> {
    validate_input(cfg, input)?;
    let passphrase = read_passphrase(cfg, input);
    let plaintext = crate::security::decrypt(input, passphrase.as_deref())?;
    let classification = classify(plaintext.path(), cfg);
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "input": input,
            "classification": classification,
            "route": if classification.is_text_dominant { "native" } else { "ocr" },
        }))?
    );
    Ok(())
}

fn convert(cfg: &Config, input: &Path, output: &Path, kind: Option<JobKind>) -> Result<()> {
    validate_input(cfg, input)?;

    let kind = match kind {
        Some(kind) => kind,
        None => JobKind::infer(input, output).ok_or_else(|| {
            anyhow!(
                "cannot infer job kind for {} -> {}; pass --kind",
                input.display(),
                output.display()
            )
        })?,
    };

    let job = Job {
        input: input.to_path_buf(),
        output: output.to_path_buf(),
        kind,
        passphrase: read_passphrase(cfg, input),
    };

    ensure_dir(Path::new(&cfg.paths.work_dir))?;
    // Resolved once per run; races borrow it read-only.
    let registry = EngineRegistry::resolve();

    info!("job start: kind={} input={}", kind.as_str(), input.display());
    let report = router::run_job(&job, &registry, cfg)?;

    if cfg.output.write_report_json {
        let report_path = report_path(output, &cfg.output.report_filename);
        std::fs::write(&report_path, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("writing report: {}", report_path.display()))?;
    }

    if cfg.global.print_summary {
        println!("{}", report.summary_line());
    }
    Ok(())
}

fn report_path(output: &Path, filename: &str) -> PathBuf {
    match output.parent() {
        Some(parent) if parent != Path::new("") => parent.join(filename),
        _ => PathBuf::from(filename),
    }
}

fn read_passphrase(cfg: &Config, input: &Path) -> Option<String> {
    if !job::is_encrypted(input) {
        return None;
    }
    match std::env::var(&cfg.security.passphrase_env) {
        Ok(v) if !v.is_empty() => Some(v),
        _ => {
            warn!(
                "encrypted input but {} is not set",
                cfg.security.passphrase_env
            );
            None
        }
    }
}

fn validate_input(cfg: &Config, input: &Path) -> Result<()> {
    let input_str = input.display().to_string();

    if cfg.security.reject_url_inputs && looks_like_url(&input_str) {
        return Err(anyhow!("URL inputs are disabled: {input_str}"));
    }

    if !input.exists() {
        return Err(anyhow!("input does not exist: {}", input.display()));
    }

    let bytes = std::fs::metadata(input).map(|m| m.len()).unwrap_or(0);
    if bytes > cfg.limits.max_input_file_bytes {
        return Err(anyhow!("input exceeds max_input_file_bytes: {bytes}"));
    }

    Ok(())
}

fn looks_like_url(s: &str) -> bool {
    let s = s.to_ascii_lowercase();
    s.starts_with("http://") || s.starts_with("https://") || s.starts_with("file://")
}
