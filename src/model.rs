use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Half-open stay `[check_in, check_out)` in calendar days.
///
/// The check-out day itself is free: a stay ending on the 12th does not
/// occupy the 12th, so another guest may check in that day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StayRange {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl StayRange {
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Self {
        Self { check_in, check_out }
    }

    /// Whole nights between check-in and check-out. Non-positive for an
    /// inverted or empty range.
    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }

    pub fn is_valid(&self) -> bool {
        self.check_out > self.check_in
    }

    pub fn overlaps(&self, other: &StayRange) -> bool {
        self.check_in < other.check_out && other.check_in < self.check_out
    }
}

impl std::fmt::Display for StayRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.check_in, self.check_out)
    }
}

// ── Listings & actors ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    Active,
    Inactive,
    Pending,
}

/// The slice of a listing the engine consumes. Owned by the listing service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub id: Ulid,
    pub host_id: Ulid,
    pub max_guests: u32,
    pub price_per_night: Decimal,
    pub status: ListingStatus,
}

impl Listing {
    pub fn accepts_bookings(&self) -> bool {
        self.status == ListingStatus::Active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Traveler,
    Host,
    Admin,
}

/// An already-authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Ulid,
    pub role: Role,
}

impl Actor {
    pub fn traveler(id: Ulid) -> Self {
        Self { id, role: Role::Traveler }
    }

    pub fn host(id: Ulid) -> Self {
        Self { id, role: Role::Host }
    }

    pub fn admin(id: Ulid) -> Self {
        Self { id, role: Role::Admin }
    }

    /// Identity used by background maintenance (auto-completion).
    pub fn system() -> Self {
        Self::admin(Ulid::nil())
    }
}

// ── Bookings ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 4] = [
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        BookingStatus::Completed,
        BookingStatus::Cancelled,
    ];

    /// Active bookings occupy their dates.
    pub fn is_active(self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracked for display only; settled by the payment service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Refunded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub listing_id: Ulid,
    pub traveler_id: Ulid,
    pub range: StayRange,
    pub guests: u32,
    pub total_price: Decimal,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub special_requests: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn nights(&self) -> i64 {
        self.range.nights()
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// Input to `create_booking`. Price and status are never caller-supplied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
    pub listing_id: Ulid,
    pub traveler_id: Ulid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests: u32,
    pub special_requests: Option<String>,
}

impl BookingRequest {
    pub fn range(&self) -> StayRange {
        StayRange::new(self.check_in, self.check_out)
    }
}

/// Closed filter set for the list projections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BookingQuery {
    pub status: Option<BookingStatus>,
}

impl BookingQuery {
    pub fn with_status(status: BookingStatus) -> Self {
        Self { status: Some(status) }
    }

    pub fn matches(&self, booking: &Booking) -> bool {
        self.status.is_none_or(|s| s == booking.status)
    }
}

// ── Occupancy ────────────────────────────────────────────────────

/// One active booking's hold on a listing's calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OccupiedStay {
    pub booking_id: Ulid,
    pub range: StayRange,
}

/// Active stays of one listing, sorted by `range.check_in`.
#[derive(Debug, Clone)]
pub struct ListingOccupancy {
    pub listing_id: Ulid,
    pub stays: Vec<OccupiedStay>,
}

impl ListingOccupancy {
    pub fn new(listing_id: Ulid) -> Self {
        Self {
            listing_id,
            stays: Vec::new(),
        }
    }

    /// Insert maintaining sort order by check-in.
    pub fn insert(&mut self, stay: OccupiedStay) {
        let pos = self
            .stays
            .partition_point(|s| s.range.check_in <= stay.range.check_in);
        self.stays.insert(pos, stay);
    }

    pub fn remove(&mut self, booking_id: Ulid) -> Option<OccupiedStay> {
        let pos = self.stays.iter().position(|s| s.booking_id == booking_id)?;
        Some(self.stays.remove(pos))
    }

    /// Stays overlapping `query`. Everything checking in on or after
    /// `query.check_out` is skipped by binary search.
    pub fn overlapping(&self, query: &StayRange) -> impl Iterator<Item = &OccupiedStay> {
        let right_bound = self
            .stays
            .partition_point(|s| s.range.check_in < query.check_out);
        self.stays[..right_bound]
            .iter()
            .filter(move |s| s.range.check_out > query.check_in)
    }

    pub fn len(&self) -> usize {
        self.stays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stays.is_empty()
    }
}

/// Journal record format. Flat, one variant per committed change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    BookingCreated {
        booking: Booking,
    },
    BookingStatusChanged {
        id: Ulid,
        listing_id: Ulid,
        status: BookingStatus,
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn listing_id(&self) -> Ulid {
        match self {
            Event::BookingCreated { booking } => booking.listing_id,
            Event::BookingStatusChanged { listing_id, .. } => *listing_id,
        }
    }
}
