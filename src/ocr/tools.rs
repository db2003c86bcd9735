//! External tools behind the OCR traits: `pdftoppm` renders page batches,
//! `tesseract` reads one page at a time. Both are treated as black boxes
//! invoked per call; a missing binary surfaces as the distinguished
//! missing-dependency error.

use crate::config::Config;
use crate::error::FatalError;
use crate::ocr::{OcrBackend, OcrPageResult, OcrTask, PageImage, PageRenderer};
use crate::util::ensure_dir;
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff", "ppm"];

pub fn is_image_input(path: &Path) -> bool {
    crate::job::logical_extension(path)
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Render resolution ladder from the input size: large scans drop to a lower
/// DPI to keep render time and image memory in check.
pub fn adaptive_dpi(file_bytes: u64) -> u32 {
    const MB: u64 = 1024 * 1024;
    if file_bytes < 50 * MB {
        300
    } else if file_bytes < 200 * MB {
        150
    } else {
        72
    }
}

/// Page count without rendering: structural parse first, `pdfinfo` as the
/// backstop for files lopdf cannot open. Single images count as one page.
pub fn page_count(input: &Path) -> Result<usize> {
    if is_image_input(input) {
        return Ok(1);
    }
    if let Ok(doc) = lopdf::Document::load(input) {
        let n = doc.get_pages().len();
        if n > 0 {
            return Ok(n);
        }
    }
    let output = Command::new("pdfinfo")
        .arg(input)
        .output()
        .map_err(|err| missing_or(err, "pdfinfo"))?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    for line in stdout.lines() {
        if let Some(rest) = line.strip_prefix("Pages:") {
            return rest
                .trim()
                .parse::<usize>()
                .with_context(|| "parsing pdfinfo page count");
        }
    }
    Err(anyhow!("could not determine page count: {}", input.display()))
}

fn missing_or(err: std::io::Error, program: &str) -> anyhow::Error {
    if err.kind() == ErrorKind::NotFound {
        FatalError::MissingDependency(program.to_string()).into()
    } else {
        anyhow::Error::from(err).context(format!("running {program}"))
    }
}

/// Batch renderer over `pdftoppm`. Each batch gets its own directory under
/// the work dir; `discard_batch` removes it, so only one batch's images ever
/// exist on disk.
pub struct PdftoppmRenderer {
    work_dir: PathBuf,
    dpi: u32,
}

impl PdftoppmRenderer {
    pub fn new(input: &Path, cfg: &Config) -> Result<Self> {
        let work_dir = PathBuf::from(&cfg.paths.work_dir).join(format!(
            "ocr-{}-{}",
            std::process::id(),
            crate::util::sha256_hex(input.display().to_string().as_bytes())
                .chars()
                .take(12)
                .collect::<String>()
        ));
        ensure_dir(&work_dir)?;

        let dpi = if cfg.ocr.force_dpi > 0 {
            cfg.ocr.force_dpi
        } else {
            let bytes = std::fs::metadata(input).map(|m| m.len()).unwrap_or(0);
            adaptive_dpi(bytes)
        };
        debug!("renderer dpi={dpi}");
        Ok(Self { work_dir, dpi })
    }
}

impl PageRenderer for PdftoppmRenderer {
    fn render_batch(&self, input: &Path, start: usize, end: usize) -> Result<Vec<PageImage>> {
        if is_image_input(input) {
            // The input already is the raster page; nothing to render and
            // nothing to delete afterwards.
            return Ok(vec![PageImage {
                page_index: 0,
                path: input.to_path_buf(),
                owned: false,
            }]);
        }

        let batch_dir = self.work_dir.join(format!("pages-{start}-{end}"));
        ensure_dir(&batch_dir)?;
        let prefix = batch_dir.join("page");

        // pdftoppm takes 1-based inclusive page numbers.
        let output = Command::new("pdftoppm")
            .arg("-f")
            .arg((start + 1).to_string())
            .arg("-l")
            .arg(end.to_string())
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg(input)
            .arg(&prefix)
            .output()
            .map_err(|err| missing_or(err, "pdftoppm"))?;
        if !output.status.success() {
            return Err(anyhow!(
                "pdftoppm failed for pages {start}..{end}: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        // Output names are `page-<n>.ppm` with unpredictable zero padding;
        // recover the page number from the digits.
        let mut images = Vec::new();
        for entry in std::fs::read_dir(&batch_dir).with_context(|| "listing batch dir")? {
            let path = entry?.path();
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Some(page_index) = page_index_from_stem(stem) else {
                continue;
            };
            images.push(PageImage {
                page_index,
                path,
                owned: true,
            });
        }
        if images.is_empty() {
            return Err(anyhow!("pdftoppm produced no images for pages {start}..{end}"));
        }
        images.sort_by_key(|img| img.page_index);
        Ok(images)
    }

    fn discard_batch(&self, images: Vec<PageImage>) -> Result<()> {
        let mut dirs = Vec::new();
        for image in images {
            if image.owned {
                if let Some(parent) = image.path.parent() {
                    if !dirs.contains(&parent.to_path_buf()) {
                        dirs.push(parent.to_path_buf());
                    }
                }
                let _ = std::fs::remove_file(&image.path);
            }
        }
        for dir in dirs {
            let _ = std::fs::remove_dir(dir);
        }
        Ok(())
    }
}

impl Drop for PdftoppmRenderer {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.work_dir);
    }
}

/// Zero-based page index from a `page-<n>` stem. Page numbers are 1-based;
/// a zero or non-numeric stem is malformed and skipped.
fn page_index_from_stem(stem: &str) -> Option<usize> {
    let digits = stem.rsplit('-').next()?;
    let page_no = digits.parse::<usize>().ok()?;
    page_no.checked_sub(1)
}

/// Per-page recognition over the `tesseract` CLI.
pub struct TesseractBackend {
    languages: String,
}

impl TesseractBackend {
    pub fn new(cfg: &Config) -> Self {
        Self {
            languages: cfg.ocr.languages.clone(),
        }
    }
}

impl OcrBackend for TesseractBackend {
    fn recognize(&self, task: &OcrTask<'_>) -> Result<OcrPageResult> {
        let output = Command::new("tesseract")
            .arg(&task.image.path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.languages)
            .arg("--psm")
            .arg("3")
            .output()
            .map_err(|err| missing_or(err, "tesseract"))?;
        if !output.status.success() {
            return Err(anyhow!(
                "tesseract failed on page {}: {}",
                task.page_index,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(OcrPageResult {
            page_index: task.page_index,
            text: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            confidence: 1.0,
        })
    }
}

/// Availability probe for one external tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDiag {
    pub name: String,
    pub available: bool,
    pub version: Option<String>,
}

pub fn probe_tool(name: &str, program: &str, version_arg: &str) -> ToolDiag {
    match Command::new(program).arg(version_arg).output() {
        Ok(output) => {
            // Some tools (pdftoppm) print the version banner on stderr.
            let text = if output.stdout.is_empty() {
                String::from_utf8_lossy(&output.stderr).to_string()
            } else {
                String::from_utf8_lossy(&output.stdout).to_string()
            };
            ToolDiag {
                name: name.to_string(),
                available: true,
                version: text.lines().next().map(|s| s.trim().to_string()),
            }
        }
        Err(_) => ToolDiag {
            name: name.to_string(),
            available: false,
            version: None,
        },
    }
}
