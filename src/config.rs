use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub global: Global,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub classification: Classification,
    #[serde(default)]
    pub router: Router,
    #[serde(default)]
    pub race: Race,
    #[serde(default)]
    pub ocr: Ocr,
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub security: Security,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let mut cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    /// The knobs a supervising process most often tunes are overridable
    /// without touching the config file.
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = parse_env_u64("DOCSHIFT_TIMEOUT_SECONDS") {
            self.race.timeout_seconds = v;
        }
        if let Some(v) = parse_env_usize("DOCSHIFT_OCR_BATCH_PAGES") {
            if v > 0 {
                self.ocr.batch_pages = v;
            }
        }
        if let Some(v) = parse_env_usize("DOCSHIFT_OCR_WORKERS") {
            if v > 0 {
                self.ocr.max_workers = v;
            }
        }
    }
}

fn parse_env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok()?.parse::<u64>().ok()
}

fn parse_env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok()?.parse::<usize>().ok()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Global {
    pub keep_intermediates: bool,
    pub print_summary: bool,
}
impl Default for Global {
    fn default() -> Self {
        Self {
            keep_intermediates: false,
            print_summary: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paths {
    pub work_dir: String,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            work_dir: ".docshift-work".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Limits {
    pub max_input_file_bytes: u64,
    pub max_input_pages: usize,
}
impl Default for Limits {
    fn default() -> Self {
        Self {
            max_input_file_bytes: 2 * 1024 * 1024 * 1024,
            max_input_pages: 20000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    /// Documents with at most this many pages are sampled in full;
    /// larger ones get the first/middle/last sample.
    pub sample_all_under: usize,
    /// Summed extracted text length over the sampled pages above which the
    /// document counts as machine-text.
    pub min_sampled_text_chars: usize,
}
impl Default for Classification {
    fn default() -> Self {
        Self {
            sample_all_under: 8,
            min_sampled_text_chars: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Router {
    /// Byte floor below which a native engine's output is treated as a
    /// silent failure. Deliberately a tunable, not a constant.
    pub min_plausible_output_bytes: u64,
}
impl Default for Router {
    fn default() -> Self {
        Self {
            min_plausible_output_bytes: 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Race {
    pub timeout_seconds: u64,
    pub poll_interval_ms: u64,
    pub grace_period_ms: u64,
    /// An engine artifact smaller than this does not count as produced yet.
    pub min_artifact_bytes: u64,
}
impl Default for Race {
    fn default() -> Self {
        Self {
            timeout_seconds: 120,
            poll_interval_ms: 50,
            grace_period_ms: 2000,
            min_artifact_bytes: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ocr {
    pub batch_pages: usize,
    /// Upper bound on the worker pool; the effective size is
    /// min(available cores - 1, max_workers).
    pub max_workers: usize,
    pub languages: String,
    /// 0 = pick DPI from the input file size.
    pub force_dpi: u32,
}
impl Default for Ocr {
    fn default() -> Self {
        Self {
            batch_pages: 8,
            max_workers: 8,
            languages: "eng".into(),
            force_dpi: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Output {
    pub write_report_json: bool,
    pub report_filename: String,
}
impl Default for Output {
    fn default() -> Self {
        Self {
            write_report_json: true,
            report_filename: "report.json".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: false,
            file_path: "".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Security {
    /// Name of the environment variable holding the decryption passphrase.
    /// Kept out of argv so it never shows in process listings.
    pub passphrase_env: String,
    pub reject_url_inputs: bool,
}
impl Default for Security {
    fn default() -> Self {
        Self {
            passphrase_env: "DOCSHIFT_PASSPHRASE".into(),
            reject_url_inputs: true,
        }
    }
}
