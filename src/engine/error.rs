use thiserror::Error;
use ulid::Ulid;

use crate::model::{BookingStatus, StayRange};

/// Every failure the engine reports. All but `Storage` are business-rule
/// rejections the caller must act on; none are retried internally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("invalid stay range: {0}")]
    InvalidRange(&'static str),
    #[error("{requested} guests requested, listing allows at most {max}")]
    CapacityExceeded { requested: u32, max: u32 },
    #[error("listing {0} not found or not accepting bookings")]
    ListingUnavailable(Ulid),
    #[error("listing {listing_id} is already booked for part of {range}")]
    BookingConflict { listing_id: Ulid, range: StayRange },
    #[error("booking not found: {0}")]
    NotFound(Ulid),
    #[error("not authorized: {0}")]
    NotAuthorized(&'static str),
    #[error("cannot move booking from {from} to {to}")]
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },
    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),
    #[error("storage error: {0}")]
    Storage(String),
}

impl EngineError {
    /// Only storage failures are transient; everything else needs new input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Storage(_))
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::InvalidRange(_) => "invalid_range",
            EngineError::CapacityExceeded { .. } => "capacity_exceeded",
            EngineError::ListingUnavailable(_) => "listing_unavailable",
            EngineError::BookingConflict { .. } => "booking_conflict",
            EngineError::NotFound(_) => "not_found",
            EngineError::NotAuthorized(_) => "not_authorized",
            EngineError::InvalidTransition { .. } => "invalid_transition",
            EngineError::InvalidRequest(_) => "invalid_request",
            EngineError::Storage(_) => "storage",
        }
    }
}
