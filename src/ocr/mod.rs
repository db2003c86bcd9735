//! Raster/OCR path: rendering pages to images and reading pixels back into
//! text. The pipeline orchestrates; rendering and recognition sit behind
//! traits so external tools (and test fakes) plug in at the same seam.

pub mod pipeline;
pub mod tools;

use anyhow::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// One rendered page. `owned` images are deleted when the batch is
/// discarded; a borrowed image (the user's own input file) is left alone.
#[derive(Debug)]
pub struct PageImage {
    pub page_index: usize,
    pub path: PathBuf,
    pub owned: bool,
}

/// Unit of work for one worker. Created per batch, consumed by exactly one
/// worker, never reused.
#[derive(Debug)]
pub struct OcrTask<'a> {
    pub page_index: usize,
    pub image: &'a PageImage,
}

#[derive(Debug, Clone, Serialize)]
pub struct OcrPageResult {
    pub page_index: usize,
    pub text: String,
    pub confidence: f32,
}

pub trait PageRenderer: Sync {
    /// Renders pages `[start, end)` of `input` to raster images. Called once
    /// per batch; the pipeline never asks for more than one batch at a time.
    fn render_batch(&self, input: &Path, start: usize, end: usize) -> Result<Vec<PageImage>>;

    /// Drops a batch's images before the next batch is rendered.
    fn discard_batch(&self, images: Vec<PageImage>) -> Result<()>;
}

pub trait OcrBackend: Sync {
    fn recognize(&self, task: &OcrTask<'_>) -> Result<OcrPageResult>;
}

/// Where assembled paragraphs go. Mutated only by the orchestrating thread,
/// strictly in ascending page order.
pub trait DocumentSink {
    fn append_page(&mut self, result: &OcrPageResult) -> Result<()>;
    fn save(&mut self) -> Result<()>;
}

/// Default sink: UTF-8 paragraphs separated by blank lines.
pub struct TextSink {
    path: PathBuf,
    paragraphs: Vec<String>,
}

impl TextSink {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            paragraphs: Vec::new(),
        }
    }
}

impl DocumentSink for TextSink {
    fn append_page(&mut self, result: &OcrPageResult) -> Result<()> {
        let text = result.text.trim();
        if !text.is_empty() {
            self.paragraphs.push(text.to_string());
        }
        Ok(())
    }

    fn save(&mut self) -> Result<()> {
        use anyhow::Context;
        std::fs::write(&self.path, self.paragraphs.join("\n\n"))
            .with_context(|| format!("saving document: {}", self.path.display()))
    }
}
