use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::model::StayRange;

use super::EngineError;

/// Total price of a stay: whole nights times the nightly rate.
///
/// Dates carry no time of day, so the night count is exact. Zero or negative
/// nights are rejected rather than priced at zero.
pub fn price(check_in: NaiveDate, check_out: NaiveDate, nightly_rate: Decimal) -> Result<Decimal, EngineError> {
    price_range(&StayRange::new(check_in, check_out), nightly_rate)
}

pub(crate) fn price_range(range: &StayRange, nightly_rate: Decimal) -> Result<Decimal, EngineError> {
    if !range.is_valid() {
        return Err(EngineError::InvalidRange("check-out must be after check-in"));
    }
    if nightly_rate.is_sign_negative() {
        return Err(EngineError::InvalidRequest("nightly rate cannot be negative"));
    }
    Decimal::from(range.nights())
        .checked_mul(nightly_rate)
        .ok_or(EngineError::InvalidRequest("total price overflows"))
}
