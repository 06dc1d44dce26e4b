use chrono::NaiveDate;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// First active stay overlapping `range`, skipping `exclude`.
pub(crate) fn find_conflict(
    occupancy: &ListingOccupancy,
    range: &StayRange,
    exclude: Option<Ulid>,
) -> Option<Ulid> {
    occupancy
        .overlapping(range)
        .find(|stay| Some(stay.booking_id) != exclude && stay.range.overlaps(range))
        .map(|stay| stay.booking_id)
}

pub(crate) fn check_no_conflict(
    occupancy: &ListingOccupancy,
    range: &StayRange,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    match find_conflict(occupancy, range, exclude) {
        Some(_) => Err(EngineError::BookingConflict {
            listing_id: occupancy.listing_id,
            range: *range,
        }),
        None => Ok(()),
    }
}

// ── Request validation (pure, runs before any lock or persistence) ──

pub(crate) fn validate_listing(listing: Option<&Listing>, listing_id: Ulid) -> Result<&Listing, EngineError> {
    match listing {
        Some(l) if l.accepts_bookings() => Ok(l),
        _ => Err(EngineError::ListingUnavailable(listing_id)),
    }
}

pub(crate) fn validate_guests(guests: u32, listing: &Listing) -> Result<(), EngineError> {
    if guests > listing.max_guests {
        return Err(EngineError::CapacityExceeded {
            requested: guests,
            max: listing.max_guests,
        });
    }
    if guests == 0 {
        return Err(EngineError::InvalidRequest("at least one guest is required"));
    }
    Ok(())
}

pub(crate) fn validate_range(range: &StayRange, today: NaiveDate) -> Result<(), EngineError> {
    if !range.is_valid() {
        return Err(EngineError::InvalidRange("check-out must be after check-in"));
    }
    if range.check_in < today {
        return Err(EngineError::InvalidRange("check-in date is in the past"));
    }
    Ok(())
}

pub(crate) fn validate_special_requests(text: Option<&str>) -> Result<(), EngineError> {
    if let Some(t) = text
        && t.chars().count() > MAX_SPECIAL_REQUESTS_LEN
    {
        return Err(EngineError::InvalidRequest("special requests cannot exceed 500 characters"));
    }
    Ok(())
}

/// Every pre-lock check of a create request, in reporting order.
pub(crate) fn validate_request<'a>(
    request: &BookingRequest,
    listing: Option<&'a Listing>,
    today: NaiveDate,
) -> Result<&'a Listing, EngineError> {
    let listing = validate_listing(listing, request.listing_id)?;
    validate_guests(request.guests, listing)?;
    validate_range(&request.range(), today)?;
    validate_special_requests(request.special_requests.as_deref())?;
    Ok(listing)
}
