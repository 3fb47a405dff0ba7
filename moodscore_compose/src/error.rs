// Error type for the composer.
//
// Only configuration and I/O can fail. Everything past a validated `Controls`
// is total: empty candidate sets fall back to register centers or tonic
// chords, and pitch arithmetic clamps into range. Configuration errors are
// raised before any generation work begins.

/// Failures surfaced by request validation, token parsing, and file output.
#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error("song length must be at least one bar, got {0}")]
    InvalidLength(i64),

    #[error("tempo must be a positive BPM, got {0}")]
    InvalidTempo(u32),

    #[error("unrecognized key name: {0:?}")]
    UnknownKey(String),

    #[error("unrecognized mode: {0:?}")]
    UnknownMode(String),

    #[error("invalid chord token: {0:?}")]
    InvalidToken(String),

    #[error("failed to parse generation request: {0}")]
    Config(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
