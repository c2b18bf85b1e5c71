use bustrack_transit::TransitError;

/// Failures surfaced by the tracker.
///
/// Full buses and empty selections are outcomes, not errors: see
/// `BookingOutcome::Queued` and `Selection::report`.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// Malformed update. The update is dropped and no state changes.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Authoritative distance lookup failed or timed out.
    #[error("Lookup failed: {0}")]
    LookupFailure(String),

    #[error(transparent)]
    Transit(#[from] TransitError),
}

pub type Result<T> = std::result::Result<T, TrackerError>;

pub(crate) fn invalid(message: impl Into<String>) -> TrackerError {
    TrackerError::InvalidInput(message.into())
}
