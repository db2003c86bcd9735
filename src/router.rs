//! ConversionRouter: composes the gate, the classifier, the race and the OCR
//! pipeline, with a single-shot fallback when the native path under-delivers.

use crate::classify::{classify, Classification};
use crate::config::Config;
use crate::engine::{race, EngineRegistry, RaceOutcome};
use crate::job::{Job, JobKind};
use crate::ocr::pipeline::{self, OcrStats};
use crate::error::FatalError;
use crate::ocr::tools::{page_count, probe_tool, PdftoppmRenderer, TesseractBackend};
use crate::ocr::TextSink;
use crate::report::JobReport;
use crate::util::{file_at_least, now_rfc3339};
use anyhow::{anyhow, Result};
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

pub fn run_job(job: &Job, registry: &EngineRegistry, cfg: &Config) -> Result<JobReport> {
    let started = Instant::now();

    // The plaintext guard wipes the decrypted file on every exit path.
    let plaintext = crate::security::decrypt(&job.input, job.passphrase.as_deref())?;
    let source = plaintext.path();

    let mut classification: Option<Classification> = None;
    let mut race_outcome: Option<RaceOutcome> = None;
    let mut ocr_stats: Option<OcrStats> = None;
    let mut fallback_used = false;

    let (strategy, engine): (&'static str, Option<String>) = match job.kind {
        JobKind::OfficeConvert => {
            let outcome = race::race(source, &job.output, registry.for_kind(job.kind), cfg)?;
            if !outcome.won() {
                let detail = describe_failures(&outcome);
                return Err(anyhow!("all office engines failed: {detail}"));
            }
            let winner = outcome.winner.clone();
            race_outcome = Some(outcome);
            ("native", winner)
        }
        JobKind::RasterOcr => {
            ocr_stats = Some(run_ocr(source, &job.output, None, cfg)?);
            ("ocr", Some("tesseract".into()))
        }
        JobKind::NativePdfConvert => {
            let c = classify(source, cfg);
            info!(
                "classification: pages={} sampled_chars={} text_dominant={}",
                c.page_count, c.sampled_text_len, c.is_text_dominant
            );
            let text_dominant = c.is_text_dominant;
            classification = Some(c.clone());

            if text_dominant {
                match try_native(source, &job.output, registry, cfg) {
                    Ok(outcome) => {
                        let winner = outcome.winner.clone();
                        race_outcome = Some(outcome);
                        ("native", winner)
                    }
                    Err(err) => {
                        // The one allowed fallback: native under-delivered,
                        // degrade to the raster path.
                        warn!("native path under-delivered, falling back to OCR: {err:#}");
                        fallback_used = true;
                        ocr_stats = Some(run_ocr(source, &job.output, Some(&c), cfg)?);
                        ("ocr", Some("tesseract".into()))
                    }
                }
            } else {
                ocr_stats = Some(run_ocr(source, &job.output, Some(&c), cfg)?);
                ("ocr", Some("tesseract".into()))
            }
        }
    };

    Ok(JobReport {
        input: job.input.display().to_string(),
        output: job.output.display().to_string(),
        kind: job.kind.as_str(),
        classification,
        strategy,
        engine,
        fallback_used,
        race: race_outcome,
        ocr: ocr_stats,
        duration_ms: started.elapsed().as_millis(),
        finished: now_rfc3339(),
    })
}

/// Native race plus the plausibility check. A raced conversion that leaves a
/// few hundred bytes behind is a silent failure, not a result.
fn try_native(
    source: &Path,
    output: &Path,
    registry: &EngineRegistry,
    cfg: &Config,
) -> Result<RaceOutcome> {
    let outcome = race::race(source, output, registry.for_kind(JobKind::NativePdfConvert), cfg)?;
    if !outcome.won() {
        return Err(anyhow!("no native engine produced output: {}", describe_failures(&outcome)));
    }
    if !file_at_least(output, cfg.router.min_plausible_output_bytes) {
        let _ = std::fs::remove_file(output);
        return Err(anyhow!(
            "output failed plausibility check (under {} bytes)",
            cfg.router.min_plausible_output_bytes
        ));
    }
    Ok(outcome)
}

fn run_ocr(
    source: &Path,
    output: &Path,
    classification: Option<&Classification>,
    cfg: &Config,
) -> Result<OcrStats> {
    // Per-page failures degrade to empty text, so a missing tesseract would
    // otherwise produce a silently empty document. Fail fast instead.
    if !probe_tool("tesseract", "tesseract", "--version").available {
        return Err(FatalError::MissingDependency("tesseract".into()).into());
    }

    let pages = match classification {
        Some(c) if c.page_count > 0 => c.page_count,
        _ => page_count(source)?,
    };
    if pages > cfg.limits.max_input_pages {
        return Err(anyhow!("input exceeds max_input_pages: {pages}"));
    }

    let renderer = PdftoppmRenderer::new(source, cfg)?;
    let backend = TesseractBackend::new(cfg);
    let mut sink = TextSink::new(output);
    pipeline::run(source, pages, &renderer, &backend, &mut sink, cfg)
}

fn describe_failures(outcome: &RaceOutcome) -> String {
    if outcome.diagnostics.is_empty() {
        return "no diagnostics".into();
    }
    outcome
        .diagnostics
        .iter()
        .map(|d| format!("{}: {}", d.engine, d.message))
        .collect::<Vec<_>>()
        .join("; ")
}
