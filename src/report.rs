use crate::classify::Classification;
use crate::engine::RaceOutcome;
use crate::ocr::pipeline::OcrStats;
use serde::Serialize;

/// Everything the supervising process learns about a finished job. Written
/// as JSON next to the output and summarized as the final stdout line.
#[derive(Debug, Serialize)]
pub struct JobReport {
    pub input: String,
    pub output: String,
    pub kind: &'static str,
    pub classification: Option<Classification>,
    /// Which conversion path produced the output: "native" or "ocr".
    pub strategy: &'static str,
    pub engine: Option<String>,
    pub fallback_used: bool,
    pub race: Option<RaceOutcome>,
    pub ocr: Option<OcrStats>,
    pub duration_ms: u128,
    pub finished: String,
}

impl JobReport {
    /// The final line: success plus which strategy/engine satisfied the
    /// request and how long it took.
    pub fn summary_line(&self) -> String {
        serde_json::json!({
            "status": "ok",
            "strategy": self.strategy,
            "engine": self.engine,
            "fallback_used": self.fallback_used,
            "duration_ms": self.duration_ms,
            "output": self.output,
        })
        .to_string()
    }
}

/// Failure counterpart of [`JobReport::summary_line`], emitted by `main`.
pub fn failure_line(err: &anyhow::Error, duration_ms: u128) -> String {
    serde_json::json!({
        "status": "error",
        "error": format!("{err:#}"),
        "duration_ms": duration_ms,
    })
    .to_string()
}
