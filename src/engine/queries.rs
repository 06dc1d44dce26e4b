use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

use super::conflict::find_conflict;
use super::lifecycle::{Parties, authorize_view};
use super::{BookingEngine, EngineError};

/// Newest first; ids break ties so equal timestamps still order stably.
fn sort_newest_first(bookings: &mut [Booking]) {
    bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

impl BookingEngine {
    /// A single booking, visible to its traveler, the listing host, or an admin.
    pub async fn get_booking(&self, booking_id: Ulid, actor: Actor) -> Result<Booking, EngineError> {
        let shared = self
            .shared_booking(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        let snapshot = shared.read().await.clone();
        let host_id = self.host_of(snapshot.listing_id).await?;
        authorize_view(Parties::resolve(&actor, &snapshot, host_id))?;
        Ok(snapshot)
    }

    /// The actor's own bookings.
    pub async fn bookings_for_traveler(&self, actor: Actor, query: BookingQuery) -> Vec<Booking> {
        let ids = self
            .by_traveler
            .get(&actor.id)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        let mut out = self.collect_bookings(&ids, &query).await;
        sort_newest_first(&mut out);
        out
    }

    /// Bookings across every listing the actor hosts.
    pub async fn bookings_for_host(&self, actor: Actor, query: BookingQuery) -> Result<Vec<Booking>, EngineError> {
        let listing_ids = self.directory.listings_for_host(actor.id).await?;
        let mut out = Vec::new();
        for listing_id in listing_ids {
            let ids = self
                .by_listing
                .get(&listing_id)
                .map(|e| e.value().clone())
                .unwrap_or_default();
            out.extend(self.collect_bookings(&ids, &query).await);
        }
        sort_newest_first(&mut out);
        Ok(out)
    }

    async fn collect_bookings(&self, ids: &[Ulid], query: &BookingQuery) -> Vec<Booking> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(shared) = self.shared_booking(id) else { continue };
            let booking = shared.read().await;
            if query.matches(&booking) {
                out.push(booking.clone());
            }
        }
        out
    }

    /// Active (pending + confirmed) stays on a listing, by check-in.
    pub async fn active_bookings_for_listing(&self, listing_id: Ulid) -> Vec<OccupiedStay> {
        match self.occupancy.get(&listing_id).map(|e| e.value().clone()) {
            Some(occ) => occ.read().await.stays.clone(),
            None => Vec::new(),
        }
    }

    /// Would `[check_in, check_out)` overlap an active stay on the listing?
    /// `exclude` skips one booking, for re-validating it against the rest.
    pub async fn has_conflict(
        &self,
        listing_id: Ulid,
        check_in: NaiveDate,
        check_out: NaiveDate,
        exclude: Option<Ulid>,
    ) -> bool {
        let Some(occ) = self.occupancy.get(&listing_id).map(|e| e.value().clone()) else {
            return false;
        };
        let guard = occ.read().await;
        find_conflict(&guard, &StayRange::new(check_in, check_out), exclude).is_some()
    }

    /// Confirmed bookings whose check-out day has arrived. Bookings locked by
    /// an in-flight transition are skipped; the next sweep picks them up.
    pub fn collect_finished_stays(&self, today: NaiveDate) -> Vec<Ulid> {
        let mut finished = Vec::new();
        for entry in self.bookings.iter() {
            if let Ok(booking) = entry.value().try_read()
                && booking.status == BookingStatus::Confirmed
                && booking.range.check_out <= today
            {
                finished.push(booking.id);
            }
        }
        finished
    }
}
