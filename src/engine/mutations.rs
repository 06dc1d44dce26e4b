use std::time::Instant;

use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::*;

use super::conflict::{check_no_conflict, validate_request};
use super::lifecycle::{Parties, apply_transition};
use super::pricing::price_range;
use super::{BookingEngine, EngineError};

impl BookingEngine {
    /// Validate, conflict-check, price and persist a new `pending` booking.
    ///
    /// Checks run in a fixed order (listing, guests, dates, overlap) so the
    /// caller always hears about the first failed precondition.
    pub async fn create_booking(&self, request: BookingRequest) -> Result<Booking, EngineError> {
        let started = Instant::now();
        let result = self.create_booking_inner(request).await;
        metrics::histogram!(CREATE_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        match &result {
            Ok(_) => metrics::counter!(BOOKINGS_CREATED_TOTAL).increment(1),
            Err(e) => {
                metrics::counter!(BOOKINGS_REJECTED_TOTAL, "reason" => e.kind()).increment(1)
            }
        }
        result
    }

    async fn create_booking_inner(&self, request: BookingRequest) -> Result<Booking, EngineError> {
        let listing = self.directory.get_listing(request.listing_id).await?;
        let listing = validate_request(&request, listing.as_ref(), self.clock.today())?;
        let range = request.range();

        let _gate = self.commit_gate.read().await;
        let occupancy = self.occupancy_for(listing.id);
        let mut guard = occupancy.write().await;
        if guard.len() >= MAX_ACTIVE_STAYS_PER_LISTING {
            return Err(EngineError::InvalidRequest("too many active bookings on listing"));
        }
        if let Err(e) = check_no_conflict(&guard, &range, None) {
            debug!("listing {} rejected {range}: overlaps an active stay", listing.id);
            return Err(e);
        }

        let total_price = price_range(&range, listing.price_per_night)?;
        let now = self.clock.now();
        let booking = Booking {
            id: Ulid::new(),
            listing_id: listing.id,
            traveler_id: request.traveler_id,
            range,
            guests: request.guests,
            total_price,
            status: BookingStatus::Pending,
            payment_status: PaymentStatus::Pending,
            special_requests: request.special_requests,
            created_at: now,
            updated_at: now,
        };

        let event = Event::BookingCreated { booking: booking.clone() };
        self.journal_append(&event).await?;
        guard.insert(OccupiedStay {
            booking_id: booking.id,
            range,
        });
        drop(guard);

        self.index_booking(booking.clone());
        metrics::gauge!(ACTIVE_BOOKINGS).increment(1.0);
        info!(
            "booking {} created on listing {} for {range} ({} nights, total {})",
            booking.id,
            booking.listing_id,
            booking.nights(),
            booking.total_price
        );
        Ok(booking)
    }

    /// Move a booking to `target` on behalf of `actor`.
    ///
    /// Authorization is checked before state validity. Reaching `cancelled`
    /// or `completed` frees the booking's dates.
    pub async fn transition_status(
        &self,
        booking_id: Ulid,
        actor: Actor,
        target: BookingStatus,
    ) -> Result<Booking, EngineError> {
        let result = self.transition_status_inner(booking_id, actor, target).await;
        match &result {
            Ok(_) => metrics::counter!(TRANSITIONS_TOTAL, "to" => target.as_str()).increment(1),
            Err(e) => {
                metrics::counter!(TRANSITIONS_REJECTED_TOTAL, "reason" => e.kind()).increment(1)
            }
        }
        result
    }

    async fn transition_status_inner(
        &self,
        booking_id: Ulid,
        actor: Actor,
        target: BookingStatus,
    ) -> Result<Booking, EngineError> {
        let _gate = self.commit_gate.read().await;
        let shared = self
            .shared_booking(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        let mut booking = shared.write().await;

        let host_id = self.host_of(booking.listing_id).await?;
        let parties = Parties::resolve(&actor, &booking, host_id);
        let from = booking.status;
        apply_transition(parties, from, target)?;

        let at = self.clock.now();
        let event = Event::BookingStatusChanged {
            id: booking_id,
            listing_id: booking.listing_id,
            status: target,
            at,
        };

        if target.is_active() {
            self.journal_append(&event).await?;
        } else {
            let occupancy = self.occupancy_for(booking.listing_id);
            let mut guard = occupancy.write().await;
            self.journal_append(&event).await?;
            guard.remove(booking_id);
            metrics::gauge!(ACTIVE_BOOKINGS).decrement(1.0);
        }
        booking.status = target;
        booking.updated_at = at;

        info!("booking {booking_id}: {from} -> {target} by {:?} {}", actor.role, actor.id);
        Ok(booking.clone())
    }
}
