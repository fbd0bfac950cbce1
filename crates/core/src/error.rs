//! Run-level error model.
//!
//! Everything here aborts the entire run before (or instead of) tenant
//! processing. Per-tenant failures never surface as a `RunError`; they are
//! captured inside that tenant's [`crate::TaskResult`].

use std::path::PathBuf;

use thiserror::Error;

/// Run-level failure.
#[derive(Debug, Error)]
pub enum RunError {
    /// An override key was not in the fixed option table. A typo would
    /// otherwise silently run with a default the caller did not intend.
    #[error("invalid arguments passed to the run command: {0}")]
    InvalidArgument(String),

    /// An `order_by` token was outside the column whitelist.
    #[error("invalid order_by part(s): {0}")]
    InvalidOrderBy(String),

    /// The installation is not a multisite network.
    #[error("this only works on a multisite install")]
    NotMultisite,

    /// The blog directory query could not be executed.
    #[error("querying all blogs failed: {0}")]
    QueryFailed(String),

    /// The directory returned zero rows. Abnormal for a multisite install,
    /// so it is not silently tolerated.
    #[error("querying all blogs returned empty, that's odd")]
    EmptyResult,

    /// File logging could not create or write the log file.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The log file is at or above the configured size cap. The operator
    /// must intervene; the logger never truncates or rotates.
    #[error("log file [{}] is too big", path.display())]
    LogTooLarge { path: PathBuf },
}

impl RunError {
    pub fn invalid_argument(keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        Self::InvalidArgument(keys.join(", "))
    }

    pub fn invalid_order_by(tokens: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let tokens: Vec<String> = tokens.into_iter().map(Into::into).collect();
        Self::InvalidOrderBy(tokens.join(", "))
    }
}
