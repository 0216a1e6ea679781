use thiserror::Error;

/// Why an ingestion run did not complete. `NoNewContent` and publish
/// failures are not errors; they travel inside `RunOutcome`.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("another devlog run holds the lock: {0}")]
    Locked(String),
    #[error("no usable generation backend configured: {0}")]
    ConfigMissing(String),
    #[error("generation failed: {0}")]
    GenerationFailure(String),
    #[error("generator returned malformed output: {0}")]
    MalformedOutput(String),
    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

impl IngestError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Locked(_) => ErrorCode::E001Locked,
            Self::ConfigMissing(_) => ErrorCode::E005ConfigMissing,
            Self::GenerationFailure(_) => ErrorCode::E008GenerationFailed,
            Self::MalformedOutput(_) => ErrorCode::E009MalformedOutput,
            Self::Io(_) => ErrorCode::E011Io,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    E001Locked,
    E005ConfigMissing,
    E006CursorReset,
    E007StoreCorrupt,
    E008GenerationFailed,
    E009MalformedOutput,
    E010PublishFailed,
    E011Io,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::E001Locked => "E001_LOCKED",
            Self::E005ConfigMissing => "E005_CONFIG_MISSING",
            Self::E006CursorReset => "E006_CURSOR_RESET",
            Self::E007StoreCorrupt => "E007_STORE_CORRUPT",
            Self::E008GenerationFailed => "E008_GENERATION_FAILED",
            Self::E009MalformedOutput => "E009_MALFORMED_OUTPUT",
            Self::E010PublishFailed => "E010_PUBLISH_FAILED",
            Self::E011Io => "E011_IO",
        }
    }
}
