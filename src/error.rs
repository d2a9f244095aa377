//! Errors that abort a scan.
//!
//! An attempt that never becomes writable, or whose connect is refused, is a
//! negative result and not an error. It shows up as
//! [`AttemptState::Failed`](crate::scanner::AttemptState::Failed).
use std::io;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ScanError>;

/// Fatal conditions. None of them are retried and none return partial results.
#[derive(Error, Debug)]
pub enum ScanError {
    /// The attempt table for a batch could not be reserved.
    #[error("could not allocate an attempt table for {requested} connections")]
    Allocation {
        /// Number of attempts the batch asked room for.
        requested: usize,
    },

    /// A socket could not be created or switched to non-blocking mode.
    #[error("socket setup failed at slot {slot}: {source}")]
    SocketSetup {
        /// Slot in the batch where setup failed.
        slot: usize,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// A user-supplied exclusion block could not be used.
    #[error("invalid exclusion {input:?}: {reason}")]
    InvalidExclusion {
        /// The block as it was given.
        input: String,
        /// Why it was rejected.
        reason: String,
    },
}
