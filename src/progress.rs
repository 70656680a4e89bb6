//! Cooperative progress reporting and cancellation.

/// Supplied by the caller of long operations (merge, reindex, bulk probe).
///
/// Cancellation is checked between item boundaries, never mid-statement. A
/// cancelled merge reports the count written so far and leaves any open
/// transaction to the caller.
pub trait ProgressSink {
    /// Polled between items; `true` stops the operation at the next
    /// boundary.
    fn should_abort(&self) -> bool {
        false
    }

    /// Completion fraction in `[0, 1]`.
    fn set_progress(&self, _fraction: f64) {}
}

/// Sink that never aborts and discards progress.
pub struct NoProgress;

impl ProgressSink for NoProgress {}
