use nwgnrcs::NrcsError;
use nwgplayout::PlayoutError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, WatcherError>;

/// Errors surfaced by the watcher.
///
/// Per-segment problems (a story missing from cache after a fetch, a rank
/// the assigner could not produce) are not errors at this level: they are
/// logged, reported on the event stream and the poll continues without the
/// affected segment.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// NRCS download or story fetch failed; the queue is skipped for this
    /// poll and previous caches are preserved untouched.
    #[error("NRCS fetch failed: {0}")]
    Fetch(#[from] NrcsError),

    #[error("Control plane error: {0}")]
    Playout(#[from] PlayoutError),

    /// Fatal at startup: missing credentials or unreachable control plane.
    #[error("Gateway initialisation failed: {0}")]
    Init(String),
}
