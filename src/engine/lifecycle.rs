//! Booking status state machine.
//!
//! ```text
//!   pending ──confirm──▶ confirmed ──complete──▶ completed
//!      │                    │
//!      └──cancel──▶ cancelled ◀──cancel──┘
//! ```
//!
//! Authorization is decided before state validity, so a stranger learns
//! nothing about a booking's current status from the error they get back.

use crate::model::*;

use super::EngineError;

/// How an actor relates to one booking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Parties {
    pub is_owner: bool,
    pub is_host: bool,
    pub is_admin: bool,
}

impl Parties {
    pub fn resolve(actor: &Actor, booking: &Booking, host_id: Option<ulid::Ulid>) -> Self {
        Self {
            is_owner: actor.id == booking.traveler_id,
            is_host: host_id == Some(actor.id),
            is_admin: actor.role == Role::Admin,
        }
    }

    pub fn any(&self) -> bool {
        self.is_owner || self.is_host || self.is_admin
    }

    fn host_or_admin(&self) -> bool {
        self.is_host || self.is_admin
    }
}

/// Who may view a booking: its traveler, the listing's host, or an admin.
pub fn authorize_view(parties: Parties) -> Result<(), EngineError> {
    if parties.any() {
        Ok(())
    } else {
        Err(EngineError::NotAuthorized("not a party to this booking"))
    }
}

/// Role half of a transition: may these parties ask for `target` at all?
pub fn authorize_transition(parties: Parties, target: BookingStatus) -> Result<(), EngineError> {
    if !parties.any() {
        return Err(EngineError::NotAuthorized("not a party to this booking"));
    }
    match target {
        BookingStatus::Confirmed if !parties.host_or_admin() => {
            Err(EngineError::NotAuthorized("only the host or an admin can confirm a booking"))
        }
        BookingStatus::Completed if !parties.host_or_admin() => {
            Err(EngineError::NotAuthorized("only the host or an admin can complete a booking"))
        }
        _ => Ok(()),
    }
}

/// State half of a transition. Terminal states and no-op moves are rejected.
pub fn check_transition(from: BookingStatus, to: BookingStatus) -> Result<(), EngineError> {
    use BookingStatus::*;
    match (from, to) {
        (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Cancelled) | (Confirmed, Completed) => Ok(()),
        _ => Err(EngineError::InvalidTransition { from, to }),
    }
}

/// Full rule: authorization first, then state.
pub fn apply_transition(parties: Parties, from: BookingStatus, to: BookingStatus) -> Result<(), EngineError> {
    authorize_transition(parties, to)?;
    check_transition(from, to)
}
