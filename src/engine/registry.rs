//! Declarative engine table. Strategy selection is data: each candidate
//! engine is a descriptor (invocation template + applicability + priority),
//! and the registry resolves the applicable subset once at startup instead
//! of branching on the OS at call sites.

use crate::job::JobKind;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Platform {
    Any,
    Unix,
    Windows,
}

impl Platform {
    pub fn applicable(&self) -> bool {
        match self {
            Platform::Any => true,
            Platform::Unix => cfg!(unix),
            Platform::Windows => cfg!(windows),
        }
    }
}

/// How the engine names its artifact. Some engines honor the requested
/// output path; `soffice`-style engines name the file after the input stem
/// inside the given outdir, and the race normalizes that afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum OutputNaming {
    Requested,
    InputStem { extension: String },
}

/// Static description of one external engine. No mutable state; shared
/// read-only across concurrent races.
///
/// Argument templates may contain `{input}`, `{outdir}` and `{output}`
/// placeholders, substituted at spawn time.
#[derive(Debug, Clone, Serialize)]
pub struct EngineDescriptor {
    pub name: String,
    pub program: String,
    pub args: Vec<String>,
    pub platform: Platform,
    pub priority: u8,
    pub naming: OutputNaming,
}

impl EngineDescriptor {
    pub fn new(
        name: &str,
        program: &str,
        args: &[&str],
        platform: Platform,
        priority: u8,
        naming: OutputNaming,
    ) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: args.iter().map(|s| s.to_string()).collect(),
            platform,
            priority,
            naming,
        }
    }
}

/// Applicable engines per job kind, resolved once per process run and passed
/// by reference to whoever races them.
#[derive(Debug)]
pub struct EngineRegistry {
    office: Vec<EngineDescriptor>,
    native_pdf: Vec<EngineDescriptor>,
}

impl EngineRegistry {
    pub fn resolve() -> Self {
        Self {
            office: applicable(office_engines()),
            native_pdf: applicable(native_pdf_engines()),
        }
    }

    /// Registry over explicit descriptor lists; the same platform filter and
    /// priority ordering apply. Embedders and tests use this, production
    /// goes through [`EngineRegistry::resolve`].
    pub fn from_engines(
        office: Vec<EngineDescriptor>,
        native_pdf: Vec<EngineDescriptor>,
    ) -> Self {
        Self {
            office: applicable(office),
            native_pdf: applicable(native_pdf),
        }
    }

    pub fn for_kind(&self, kind: JobKind) -> &[EngineDescriptor] {
        match kind {
            JobKind::OfficeConvert => &self.office,
            JobKind::NativePdfConvert => &self.native_pdf,
            // The raster path has no race; it is the OCR pipeline's job.
            JobKind::RasterOcr => &[],
        }
    }
}

fn applicable(mut engines: Vec<EngineDescriptor>) -> Vec<EngineDescriptor> {
    engines.retain(|e| e.platform.applicable());
    engines.sort_by_key(|e| e.priority);
    engines
}

fn office_engines() -> Vec<EngineDescriptor> {
    vec![
        EngineDescriptor::new(
            "libreoffice",
            "soffice",
            &["--headless", "--convert-to", "pdf", "--outdir", "{outdir}", "{input}"],
            Platform::Any,
            0,
            OutputNaming::InputStem {
                extension: "pdf".into(),
            },
        ),
        EngineDescriptor::new(
            "lowriter",
            "lowriter",
            &["--headless", "--convert-to", "pdf", "--outdir", "{outdir}", "{input}"],
            Platform::Unix,
            1,
            OutputNaming::InputStem {
                extension: "pdf".into(),
            },
        ),
        EngineDescriptor::new(
            "unoconv",
            "unoconv",
            &["-f", "pdf", "-o", "{output}", "{input}"],
            Platform::Unix,
            2,
            OutputNaming::Requested,
        ),
        EngineDescriptor::new(
            "msword",
            "docx2pdf",
            &["{input}", "{output}"],
            Platform::Windows,
            0,
            OutputNaming::Requested,
        ),
    ]
}

fn native_pdf_engines() -> Vec<EngineDescriptor> {
    vec![
        EngineDescriptor::new(
            "pdf2docx",
            "pdf2docx",
            &["convert", "{input}", "{output}"],
            Platform::Any,
            0,
            OutputNaming::Requested,
        ),
        EngineDescriptor::new(
            "libreoffice-pdf-import",
            "soffice",
            &[
                "--headless",
                "--infilter=writer_pdf_import",
                "--convert-to",
                "docx",
                "--outdir",
                "{outdir}",
                "{input}",
            ],
            Platform::Any,
            1,
            OutputNaming::InputStem {
                extension: "docx".into(),
            },
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_filters_and_orders_by_priority() {
        let reg = EngineRegistry::resolve();
        let office = reg.for_kind(JobKind::OfficeConvert);
        assert!(!office.is_empty());
        assert!(office.windows(2).all(|w| w[0].priority <= w[1].priority));
        assert!(office.iter().all(|e| e.platform.applicable()));
    }

    #[test]
    fn raster_jobs_have_no_race_engines() {
        let reg = EngineRegistry::resolve();
        assert!(reg.for_kind(JobKind::RasterOcr).is_empty());
    }
}
