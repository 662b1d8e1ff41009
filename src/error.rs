use std::path::PathBuf;

/// Snapshot could not be turned into domain values
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Malformed settings snapshot: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Unsupported settings version {found} (this build understands 1..={supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("Non-finite value in field '{field}'")]
    NonFinite { field: &'static str },
}

/// Failures surfaced to callers of save/delete
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to {op} settings file {path:?}: {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Refusing to save invalid settings: {0}")]
    Invalid(#[from] DecodeError),

    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Settings operation cancelled")]
    Cancelled,
}

impl SettingsError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }
}
