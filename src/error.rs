// Error types shared by the library modules.
// The binary turns these into exit codes: only `Cancelled` ends the process
// cleanly. Everything else is reported and exits with 1.

use std::path::PathBuf;

/// Errors produced while talking to Pinpoint or packaging a project.
#[derive(Debug, thiserror::Error)]
pub enum PinpointError {
    #[error("Couldn't find {0}. Please make sure you're running this command from a Pinpoint project")]
    MissingProjectConfig(PathBuf),

    #[error("{0} doesn't define a siteId")]
    MissingSiteId(PathBuf),

    #[error("You're not logged in. Please run `pinpoint login` and try again")]
    NotLoggedIn,

    #[error("Couldn't read saved credentials in {}: {source}. Run `pinpoint logout` to reset them", path.display())]
    UnreadableCredentials {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("No saved credentials for {0}. Please run `pinpoint login` first")]
    NoUsers(String),

    /// Failure reported by the API for a request that opted out of
    /// failing the process. Callers are expected to inspect it.
    #[error("{0}")]
    Api(String),

    /// Failure reported by the API for a request that must end the command.
    #[error("{0}")]
    Fatal(String),

    #[error("Pinpoint is not responding (gave up after {attempts} attempts)")]
    RetriesExhausted { attempts: u32 },

    #[error("invalid ignore pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("cancelled")]
    Cancelled,

    #[error("Cancelled, let us know if you have concerns or need assistance at support@pinpoint.com")]
    Declined,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl PinpointError {
    /// Whether this error should end the process with a zero exit code.
    pub fn is_clean_exit(&self) -> bool {
        matches!(self, PinpointError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, PinpointError>;
