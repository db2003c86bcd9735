use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What the caller is asking for. Immutable once built; owned by exactly one
/// orchestration call for its lifetime.
#[derive(Debug)]
pub struct Job {
    pub input: PathBuf,
    pub output: PathBuf,
    pub kind: JobKind,
    /// Passphrase for `.enc` inputs; never logged.
    pub passphrase: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    /// PDF to an editable document via structured text extraction.
    NativePdfConvert,
    /// Render pages, OCR them, assemble text. Always works, slowest.
    RasterOcr,
    /// Office document to PDF through an external engine race.
    OfficeConvert,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::NativePdfConvert => "native-pdf-convert",
            JobKind::RasterOcr => "raster-ocr",
            JobKind::OfficeConvert => "office-convert",
        }
    }

    /// Infers the kind from the input/output extensions. The `.enc` wrapper
    /// is transparent: `report.pdf.enc` is treated as `report.pdf`.
    pub fn infer(input: &Path, output: &Path) -> Option<JobKind> {
        let ext = logical_extension(input)?;
        let out_ext = output
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "pdf" => Some(JobKind::NativePdfConvert),
            "png" | "jpg" | "jpeg" | "tif" | "tiff" => Some(JobKind::RasterOcr),
            "doc" | "docx" | "odt" | "xls" | "xlsx" | "ods" | "ppt" | "pptx" | "odp"
                if out_ext == "pdf" =>
            {
                Some(JobKind::OfficeConvert)
            }
            _ => None,
        }
    }
}

/// Extension of the payload once an optional `.enc` suffix is stripped.
pub fn logical_extension(input: &Path) -> Option<String> {
    let name = input.file_name()?.to_str()?;
    let name = name.strip_suffix(".enc").unwrap_or(name);
    let ext = Path::new(name).extension()?.to_str()?;
    Some(ext.to_ascii_lowercase())
}

pub fn is_encrypted(input: &Path) -> bool {
    input
        .file_name()
        .and_then(|s| s.to_str())
        .is_some_and(|n| n.ends_with(".enc"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_kind_through_enc_suffix() {
        assert_eq!(
            JobKind::infer(Path::new("scan.pdf.enc"), Path::new("out.docx")),
            Some(JobKind::NativePdfConvert)
        );
        assert_eq!(
            JobKind::infer(Path::new("deck.pptx"), Path::new("deck.pdf")),
            Some(JobKind::OfficeConvert)
        );
        assert_eq!(
            JobKind::infer(Path::new("page.png"), Path::new("page.txt")),
            Some(JobKind::RasterOcr)
        );
        assert_eq!(JobKind::infer(Path::new("notes.bin"), Path::new("x.pdf")), None);
    }

    #[test]
    fn enc_detection() {
        assert!(is_encrypted(Path::new("/tmp/a.pdf.enc")));
        assert!(!is_encrypted(Path::new("/tmp/a.pdf")));
    }
}
