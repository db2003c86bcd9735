use thiserror::Error;

/// Sysexits EX_UNAVAILABLE; the supervising process keys off this to tell
/// "install the toolchain" apart from an ordinary failed job.
pub const EXIT_MISSING_DEPENDENCY: i32 = 69;

/// Errors that abort the job outright. Everything else travels as
/// `anyhow::Error` and is either degraded or reported as a plain failure.
#[derive(Debug, Error)]
pub enum FatalError {
    /// Wrong key, truncated payload, or failed AEAD authentication.
    /// Never falls back to treating the ciphertext as a document.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// A required external tool is not installed or not invocable.
    #[error("required external dependency missing: {0}")]
    MissingDependency(String),
}

impl FatalError {
    pub fn exit_code(&self) -> i32 {
        match self {
            FatalError::Decryption(_) => 1,
            FatalError::MissingDependency(_) => EXIT_MISSING_DEPENDENCY,
        }
    }
}

/// Maps an error chain to the process exit status.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<FatalError>() {
        Some(fatal) => fatal.exit_code(),
        None => 1,
    }
}
