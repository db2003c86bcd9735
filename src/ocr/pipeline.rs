//! OCRBatchPipeline: streams pages through fixed-size batches so peak memory
//! is bounded by one batch regardless of document length.
//!
//! Per batch: render, fan the pages out to a bounded worker pool, collect,
//! sort by page index, append to the sink, discard the images. Workers are
//! stateless and independent; the sink is touched only by this thread.

use crate::config::Config;
use crate::ocr::{DocumentSink, OcrBackend, OcrPageResult, OcrTask, PageRenderer};
use anyhow::Result;
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct OcrStats {
    pub pages: usize,
    pub failed_pages: usize,
    pub batches: usize,
    pub workers: usize,
    pub duration_ms: u128,
}

pub fn run(
    input: &Path,
    page_count: usize,
    renderer: &dyn PageRenderer,
    backend: &dyn OcrBackend,
    sink: &mut dyn DocumentSink,
    cfg: &Config,
) -> Result<OcrStats> {
    let started = Instant::now();
    let batch_pages = cfg.ocr.batch_pages.max(1);
    let workers = worker_count(cfg);
    info!("ocr pipeline: {page_count} pages, batch={batch_pages}, workers={workers}");

    let mut failed_pages = 0usize;
    let mut batches = 0usize;
    let mut start = 0usize;

    while start < page_count {
        let end = (start + batch_pages).min(page_count);
        debug!("ocr batch {batches}: pages {start}..{end}");

        let images = renderer.render_batch(input, start, end)?;
        let (mut results, batch_failures) = recognize_batch(&images, backend, workers);
        failed_pages += batch_failures;

        // Completion order and presentation order are decoupled here.
        results.sort_by_key(|r| r.page_index);
        for result in &results {
            sink.append_page(result)?;
        }

        renderer.discard_batch(images)?;
        batches += 1;
        start = end;
    }

    sink.save()?;

    Ok(OcrStats {
        pages: page_count,
        failed_pages,
        batches,
        workers,
        duration_ms: started.elapsed().as_millis(),
    })
}

/// One reserved core for the orchestrator, capped by config.
pub fn worker_count(cfg: &Config) -> usize {
    let available = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2);
    available.saturating_sub(1).clamp(1, cfg.ocr.max_workers.max(1))
}

/// Fans one batch out to the pool. A page that fails to recognize degrades
/// to an empty-text result instead of aborting the document; failures are
/// counted here, where they surface, and returned with the results.
fn recognize_batch(
    images: &[crate::ocr::PageImage],
    backend: &dyn OcrBackend,
    workers: usize,
) -> (Vec<OcrPageResult>, usize) {
    let next = AtomicUsize::new(0);
    let failures = AtomicUsize::new(0);
    let (tx, rx) = mpsc::channel::<OcrPageResult>();

    std::thread::scope(|scope| {
        for _ in 0..workers.min(images.len()).max(1) {
            let tx = tx.clone();
            let next = &next;
            let failures = &failures;
            scope.spawn(move || loop {
                let i = next.fetch_add(1, Ordering::Relaxed);
                if i >= images.len() {
                    break;
                }
                let task = OcrTask {
                    page_index: images[i].page_index,
                    image: &images[i],
                };
                let result = match backend.recognize(&task) {
                    Ok(result) => result,
                    Err(err) => {
                        warn!("ocr failed on page {}: {err}", task.page_index);
                        failures.fetch_add(1, Ordering::Relaxed);
                        OcrPageResult {
                            page_index: task.page_index,
                            text: String::new(),
                            confidence: 0.0,
                        }
                    }
                };
                if tx.send(result).is_err() {
                    break;
                }
            });
        }
        drop(tx);
    });

    (rx.iter().collect(), failures.load(Ordering::Relaxed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn worker_count_reserves_a_core_and_respects_cap() {
        let mut cfg = Config::default();
        cfg.ocr.max_workers = 2;
        assert!(worker_count(&cfg) <= 2);
        assert!(worker_count(&cfg) >= 1);
    }
}
