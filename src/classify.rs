//! ContentClassifier: decides machine-text vs scan-like from a bounded page
//! sample. Opens the document structurally (lopdf), never renders, and runs
//! in time independent of total page count beyond the sample.

use crate::config::Config;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub is_text_dominant: bool,
    pub sampled_text_len: usize,
    pub page_count: usize,
}

impl Classification {
    /// The conservative answer: route to the raster/OCR path.
    fn scan_like() -> Self {
        Self {
            is_text_dominant: false,
            sampled_text_len: 0,
            page_count: 0,
        }
    }
}

/// Classification never propagates errors; anything unreadable routes to the
/// slower-but-always-works OCR path.
pub fn classify(path: &Path, cfg: &Config) -> Classification {
    let doc = match lopdf::Document::load(path) {
        Ok(doc) => doc,
        Err(err) => {
            warn!("classification: cannot open {}: {err}", path.display());
            return Classification::scan_like();
        }
    };

    let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
    let page_count = pages.len();
    if page_count == 0 {
        return Classification::scan_like();
    }

    let sample = sample_pages(&pages, cfg.classification.sample_all_under);
    let mut sampled_text_len = 0usize;
    for page_no in &sample {
        match doc.extract_text(&[*page_no]) {
            Ok(text) => sampled_text_len += text.trim().chars().count(),
            Err(err) => debug!("classification: no text on page {page_no}: {err}"),
        }
    }

    let is_text_dominant = sampled_text_len > cfg.classification.min_sampled_text_chars;
    debug!(
        "classification pages={page_count} sampled={} chars={sampled_text_len} text_dominant={is_text_dominant}",
        sample.len()
    );

    Classification {
        is_text_dominant,
        sampled_text_len,
        page_count,
    }
}

/// Small documents are sampled in full; large ones get first, middle, last.
fn sample_pages(pages: &[u32], sample_all_under: usize) -> Vec<u32> {
    if pages.len() <= sample_all_under {
        return pages.to_vec();
    }
    let mut picks = vec![pages[0], pages[pages.len() / 2], pages[pages.len() - 1]];
    picks.dedup();
    picks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_documents_sample_every_page() {
        let pages: Vec<u32> = (1..=5).collect();
        assert_eq!(sample_pages(&pages, 8), pages);
    }

    #[test]
    fn large_documents_sample_first_middle_last() {
        let pages: Vec<u32> = (1..=100).collect();
        assert_eq!(sample_pages(&pages, 8), vec![1, 51, 100]);
    }

    #[test]
    fn unreadable_input_routes_conservatively() {
        let cfg = Config::default();
        let c = classify(Path::new("/nonexistent/x.pdf"), &cfg);
        assert!(!c.is_text_dominant);
        assert_eq!(c.page_count, 0);
    }
}
