use std::path::PathBuf;

use thiserror::Error;

/// Fatal errors that abort an extraction run.
///
/// Non-fatal outcomes (a best-effort probe missing a partition, a partition
/// that was never produced) are not represented here — see the pipeline's
/// own bookkeeping for those.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("helper `{0}` not found on PATH")]
    ToolNotFound(String),

    #[error("unexpected file type at {0:?}")]
    UnexpectedFileType(PathBuf),

    #[error("file not found: {0:?}")]
    NotFound(PathBuf),

    #[error("unrecognized archive type at {0:?}")]
    UnknownArchiveType(PathBuf),

    #[error("failed to run `{label}`: {argv:?} exited with {code}: {stderr}")]
    HelperFailed {
        label: String,
        argv: Vec<String>,
        code: i32,
        stderr: String,
    },

    #[error("helper `{label}` terminated by signal")]
    HelperSignaled { label: String },

    #[error("duplicate partition `{0}` unpacked from super image under more than one slot")]
    DuplicateSlot(String),

    #[error("hook for pattern `{pattern}` on {file:?} failed: {source}")]
    HookFailed {
        pattern: String,
        file: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("invalid hook pattern `{0}`: {1}")]
    InvalidPattern(String, #[source] regex::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
}

pub type Result<T> = std::result::Result<T, ExtractError>;
