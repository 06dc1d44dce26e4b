use std::sync::Arc;

use chrono::{Days, NaiveDate};
use futures::future::join_all;
use rust_decimal::Decimal;
use ulid::Ulid;

use farmstay::clock::FixedClock;
use farmstay::engine::{BookingEngine, EngineError};
use farmstay::listing::InMemoryListings;
use farmstay::model::*;

// ── Test infrastructure ──────────────────────────────────────

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

struct Harness {
    engine: Arc<BookingEngine>,
    listing: Listing,
}

fn start_engine(max_guests: u32) -> Harness {
    let dir = std::env::temp_dir().join(format!("farmstay_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();

    let listing = Listing {
        id: Ulid::new(),
        host_id: Ulid::new(),
        max_guests,
        price_per_night: Decimal::from(2500),
        status: ListingStatus::Active,
    };
    let listings = Arc::new(InMemoryListings::new());
    listings.upsert(listing.clone());

    let engine = BookingEngine::new(
        dir.join("bookings.journal"),
        listings,
        Arc::new(FixedClock::at_date(date(2025, 1, 1))),
    )
    .unwrap();
    Harness {
        engine: Arc::new(engine),
        listing,
    }
}

fn request(listing_id: Ulid, check_in: NaiveDate, nights: u64) -> BookingRequest {
    BookingRequest {
        listing_id,
        traveler_id: Ulid::new(),
        check_in,
        check_out: check_in + Days::new(nights),
        guests: 2,
        special_requests: None,
    }
}

fn assert_no_overlaps(stays: &[OccupiedStay]) {
    for (i, a) in stays.iter().enumerate() {
        for b in &stays[i + 1..] {
            assert!(
                !a.range.overlaps(&b.range),
                "accepted overlapping stays {} and {}",
                a.range,
                b.range
            );
        }
    }
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn identical_requests_race_exactly_one_wins() {
    let h = start_engine(6);

    let attempts = (0..64).map(|_| {
        let engine = h.engine.clone();
        let req = request(h.listing.id, date(2025, 3, 10), 2);
        tokio::spawn(async move { engine.create_booking(req).await })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let won = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(EngineError::BookingConflict { .. })))
        .count();
    assert_eq!(won, 1);
    assert_eq!(conflicts, 63);
    assert_eq!(h.engine.active_bookings_for_listing(h.listing.id).await.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn staggered_requests_never_overlap() {
    let h = start_engine(6);

    // Every start day in March with 1..=4 night stays; many overlap each other.
    let attempts = (0..31u64).flat_map(|offset| {
        let h_engine = h.engine.clone();
        let listing_id = h.listing.id;
        (1..=4u64).map(move |nights| {
            let engine = h_engine.clone();
            let req = request(listing_id, date(2025, 3, 1) + Days::new(offset), nights);
            tokio::spawn(async move { engine.create_booking(req).await })
        })
    });
    let results: Vec<_> = join_all(attempts.collect::<Vec<_>>())
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    for r in &results {
        assert!(matches!(r, Ok(_) | Err(EngineError::BookingConflict { .. })), "{r:?}");
    }
    let accepted = results.iter().filter(|r| r.is_ok()).count();
    assert!(accepted > 0);

    let stays = h.engine.active_bookings_for_listing(h.listing.id).await;
    assert_eq!(stays.len(), accepted);
    assert_no_overlaps(&stays);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancel_and_rebook_under_contention() {
    let h = start_engine(6);
    let traveler = Ulid::new();
    let mut req = request(h.listing.id, date(2025, 3, 10), 3);
    req.traveler_id = traveler;
    let original_id = h.engine.create_booking(req).await.unwrap().id;

    let cancel = {
        let engine = h.engine.clone();
        tokio::spawn(async move {
            engine
                .transition_status(original_id, Actor::traveler(traveler), BookingStatus::Cancelled)
                .await
        })
    };
    let rebookers = (0..16).map(|_| {
        let engine = h.engine.clone();
        let req = request(h.listing.id, date(2025, 3, 11), 1);
        tokio::spawn(async move { engine.create_booking(req).await })
    });
    let rebooked: Vec<_> = join_all(rebookers).await.into_iter().map(|r| r.unwrap()).collect();
    cancel.await.unwrap().unwrap();

    // At most one rebooking can hold the freed night.
    assert!(rebooked.iter().filter(|r| r.is_ok()).count() <= 1);
    let stays = h.engine.active_bookings_for_listing(h.listing.id).await;
    assert!(stays.iter().all(|s| s.booking_id != original_id));
    assert_no_overlaps(&stays);
}
