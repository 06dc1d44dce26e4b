use std::path::Path;

use async_trait::async_trait;
use dashmap::DashMap;
use ulid::Ulid;

use crate::engine::EngineError;
use crate::model::Listing;

/// Read access to the listing service. The engine never writes listings.
#[async_trait]
pub trait ListingDirectory: Send + Sync {
    async fn get_listing(&self, id: Ulid) -> Result<Option<Listing>, EngineError>;

    /// Ids of every listing hosted by `host_id`.
    async fn listings_for_host(&self, host_id: Ulid) -> Result<Vec<Ulid>, EngineError>;
}

/// Process-local directory, filled by the embedding service or from a JSON file.
#[derive(Default)]
pub struct InMemoryListings {
    listings: DashMap<Ulid, Listing>,
}

impl InMemoryListings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON array of listings.
    pub fn from_json_file(path: &Path) -> std::io::Result<Self> {
        let raw = std::fs::read(path)?;
        let listings: Vec<Listing> = serde_json::from_slice(&raw)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let dir = Self::new();
        for listing in listings {
            dir.upsert(listing);
        }
        Ok(dir)
    }

    pub fn upsert(&self, listing: Listing) {
        self.listings.insert(listing.id, listing);
    }

    pub fn len(&self) -> usize {
        self.listings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }
}

#[async_trait]
impl ListingDirectory for InMemoryListings {
    async fn get_listing(&self, id: Ulid) -> Result<Option<Listing>, EngineError> {
        Ok(self.listings.get(&id).map(|e| e.value().clone()))
    }

    async fn listings_for_host(&self, host_id: Ulid) -> Result<Vec<Ulid>, EngineError> {
        Ok(self
            .listings
            .iter()
            .filter(|e| e.value().host_id == host_id)
            .map(|e| *e.key())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::model::ListingStatus;

    fn listing(host_id: Ulid) -> Listing {
        Listing {
            id: Ulid::new(),
            host_id,
            max_guests: 4,
            price_per_night: Decimal::from(1800),
            status: ListingStatus::Active,
        }
    }

    #[test]
    fn lookup_and_host_index() {
        let dir = InMemoryListings::new();
        let host = Ulid::new();
        let a = listing(host);
        let b = listing(host);
        let other = listing(Ulid::new());
        dir.upsert(a.clone());
        dir.upsert(b.clone());
        dir.upsert(other);

        let found = tokio_test::block_on(dir.get_listing(a.id)).unwrap();
        assert_eq!(found, Some(a.clone()));

        let mut hosted = tokio_test::block_on(dir.listings_for_host(host)).unwrap();
        hosted.sort();
        let mut expected = vec![a.id, b.id];
        expected.sort();
        assert_eq!(hosted, expected);

        assert!(tokio_test::block_on(dir.get_listing(Ulid::new())).unwrap().is_none());
    }

    #[test]
    fn load_from_json_file() {
        let dir = std::env::temp_dir().join("farmstay_test_listings");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("listings.json");
        let host = Ulid::new();
        let listings = vec![listing(host), listing(host)];
        std::fs::write(&path, serde_json::to_vec(&listings).unwrap()).unwrap();

        let loaded = InMemoryListings::from_json_file(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        let got = tokio_test::block_on(loaded.get_listing(listings[0].id)).unwrap();
        assert_eq!(got.as_ref(), Some(&listings[0]));

        let _ = std::fs::remove_file(&path);
    }
}
