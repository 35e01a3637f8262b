use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::PlaceId;

/// Reference to the first photo of a looked-up place.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhotoMetadata {
    pub reference: String,
    pub width: u32,
    pub height: u32,
    pub attribution: Option<String>,
}

/// Authoritative fields returned by the lookup service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedPlace {
    pub id: PlaceId,
    pub name: String,
    pub address: String,
    pub photo: Option<PhotoMetadata>,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("place not found: {0}")]
    NotFound(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("lookup task failed: {0}")]
    Task(String),
}

/// Remote place-lookup service. Only the two calls below are used; query
/// semantics stay on the other side of this trait.
#[async_trait::async_trait]
pub trait PlaceLookup: Send + Sync + 'static {
    async fn fetch_place(&self, id: &PlaceId) -> Result<FetchedPlace, LookupError>;

    async fn fetch_photo(
        &self,
        photo: &PhotoMetadata,
        max_width: u32,
        max_height: u32,
    ) -> Result<Vec<u8>, LookupError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// In-memory lookup with per-id responses and optional delays.
    #[derive(Default)]
    pub(crate) struct FakeLookup {
        places: Mutex<HashMap<PlaceId, Result<FetchedPlace, LookupError>>>,
        photos: Mutex<HashMap<String, Vec<u8>>>,
        delays: Mutex<HashMap<PlaceId, Duration>>,
        place_calls: AtomicUsize,
        photo_calls: AtomicUsize,
    }

    impl FakeLookup {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn respond(&self, id: &str, name: &str, address: &str, photo: Option<PhotoMetadata>) {
            let id = PlaceId::new(id).unwrap();
            self.places.lock().unwrap().insert(
                id.clone(),
                Ok(FetchedPlace {
                    id,
                    name: name.into(),
                    address: address.into(),
                    photo,
                }),
            );
        }

        pub(crate) fn fail(&self, id: &str) {
            self.places.lock().unwrap().insert(
                PlaceId::new(id).unwrap(),
                Err(LookupError::Network("connection reset".into())),
            );
        }

        pub(crate) fn photo(&self, reference: &str, bytes: Vec<u8>) {
            self.photos.lock().unwrap().insert(reference.into(), bytes);
        }

        pub(crate) fn delay(&self, id: &str, delay: Duration) {
            self.delays
                .lock()
                .unwrap()
                .insert(PlaceId::new(id).unwrap(), delay);
        }

        pub(crate) fn place_calls(&self) -> usize {
            self.place_calls.load(Ordering::SeqCst)
        }

        pub(crate) fn photo_calls(&self) -> usize {
            self.photo_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl PlaceLookup for FakeLookup {
        async fn fetch_place(&self, id: &PlaceId) -> Result<FetchedPlace, LookupError> {
            self.place_calls.fetch_add(1, Ordering::SeqCst);
            let delay = self.delays.lock().unwrap().get(id).copied();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            self.places
                .lock()
                .unwrap()
                .get(id)
                .cloned()
                .unwrap_or_else(|| Err(LookupError::NotFound(id.to_string())))
        }

        async fn fetch_photo(
            &self,
            photo: &PhotoMetadata,
            _max_width: u32,
            _max_height: u32,
        ) -> Result<Vec<u8>, LookupError> {
            self.photo_calls.fetch_add(1, Ordering::SeqCst);
            self.photos
                .lock()
                .unwrap()
                .get(&photo.reference)
                .cloned()
                .ok_or_else(|| LookupError::NotFound(photo.reference.clone()))
        }
    }
}
