//! Typed errors for the core layers.
//!
//! The transport layer, the dump rewriter, and the capability cache never log
//! anything — they return one of these variants and let the orchestrators in
//! [`crate::backup`] and [`crate::restore`] decide whether a failure aborts
//! the whole operation or only the current category.
//!
//! | Variant             | Raised by                   | Typical handling        |
//! |---------------------|-----------------------------|-------------------------|
//! | `Config`            | config loading/validation   | fatal before connecting |
//! | `Transport`         | ssh/scp/rsync/lftp, local fs| fatal to current step   |
//! | `RemoteExecution`   | non-200 from the payload    | logged, step aborted    |
//! | `BackupNotFound`    | missing prerequisite backup | fatal, actionable hint  |

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or missing site definition.
    #[error("configuration error: {0}")]
    Config(String),

    /// An external command could not be spawned or exited non-zero.
    ///
    /// `command` is the joined command line, `detail` whatever the process
    /// wrote to stderr (or the spawn error).
    #[error("`{command}` failed: {detail}")]
    Transport { command: String, detail: String },

    /// The remote-execution payload answered with a non-200 status.
    /// The message is the response body, verbatim.
    #[error("remote execution failed: {0}")]
    RemoteExecution(String),

    /// An operation required an existing backup and none was found.
    #[error("{0}")]
    BackupNotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("capability cache is not valid JSON: {0}")]
    Cache(#[from] serde_json::Error),
}

impl Error {
    /// Build a [`Error::Transport`] from a command's argument vector and a
    /// detail message.
    pub fn transport(args: &[String], detail: impl Into<String>) -> Self {
        Self::Transport {
            command: args.join(" "),
            detail: detail.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

// ─── Tests ────────────────────────────────────────────────────────────────────
