//! Background refresh of place data from the lookup service.
//!
//! One fetch per place is spawned on a `JoinSet` without waiting between
//! starts; draining the set is the barrier, so merging begins only once
//! every fetch has finished, whatever order they finish in. Failed fetches
//! leave their place untouched. The merged bundle must fit the configured
//! byte budget or the whole cycle is dropped.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

use crate::config::{PhotoConfig, RefreshConfig};
use crate::lookup::{FetchedPlace, LookupError, PhotoMetadata, PlaceLookup};
use crate::model::{Place, PlaceId};
use crate::photo::{self, PhotoError};

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("too much data: refresh result is {size} bytes, budget {budget}")]
    PayloadTooLarge { size: usize, budget: usize },

    #[error("failed to serialize refresh result: {0}")]
    Serialization(String),

    #[error("photo lookup failed: {0}")]
    PhotoLookup(#[from] LookupError),

    #[error("photo processing failed: {0}")]
    Photo(#[from] PhotoError),
}

impl From<ciborium::ser::Error<std::io::Error>> for RefreshError {
    fn from(e: ciborium::ser::Error<std::io::Error>) -> Self {
        RefreshError::Serialization(e.to_string())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub requested: usize,
    pub updated: usize,
    pub failed: usize,
}

/// Follow-up photo fetch for a refreshed place.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhotoRequest {
    pub id: PlaceId,
    pub metadata: PhotoMetadata,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhotoUpdate {
    pub id: PlaceId,
    pub photo: String,
    pub attribution: Option<String>,
}

#[derive(Clone, Debug)]
pub struct RefreshOutcome {
    /// Successful fetches keyed by the id they were requested for.
    pub fetched: HashMap<PlaceId, FetchedPlace>,
    /// Every input place after the merge, in input order.
    pub merged: Vec<Place>,
    pub payload_size: usize,
    pub report: RefreshReport,
}

impl RefreshOutcome {
    pub fn photo_requests(&self) -> Vec<PhotoRequest> {
        self.merged
            .iter()
            .filter_map(|place| {
                let metadata = self.fetched.get(&place.id)?.photo.clone()?;
                Some(PhotoRequest {
                    id: place.id.clone(),
                    metadata,
                })
            })
            .collect()
    }
}

pub struct Reconciler {
    lookup: Arc<dyn PlaceLookup>,
    config: RefreshConfig,
}

impl Reconciler {
    pub fn new(lookup: Arc<dyn PlaceLookup>, config: RefreshConfig) -> Self {
        Self { lookup, config }
    }

    #[instrument(skip_all, fields(places = places.len()))]
    pub async fn run(&self, places: Vec<Place>) -> Result<RefreshOutcome, RefreshError> {
        let fetched = self.fetch_all(&places).await;
        let report = RefreshReport {
            requested: places.len(),
            updated: fetched.len(),
            failed: places.len() - fetched.len(),
        };

        let merged = merge(&places, &fetched);
        let payload_size = estimate_payload_size(&merged)?;
        if payload_size >= self.config.payload_budget_bytes {
            warn!(
                size = payload_size,
                budget = self.config.payload_budget_bytes,
                "refresh result over budget, dropping it"
            );
            return Err(RefreshError::PayloadTooLarge {
                size: payload_size,
                budget: self.config.payload_budget_bytes,
            });
        }

        info!(
            requested = report.requested,
            updated = report.updated,
            failed = report.failed,
            "refresh fetched"
        );

        Ok(RefreshOutcome {
            fetched,
            merged,
            payload_size,
            report,
        })
    }

    async fn fetch_all(&self, places: &[Place]) -> HashMap<PlaceId, FetchedPlace> {
        let mut fetches = JoinSet::new();
        for place in places {
            let lookup = Arc::clone(&self.lookup);
            let id = place.id.clone();
            fetches.spawn(async move {
                let result = lookup.fetch_place(&id).await;
                (id, result)
            });
        }

        let mut fetched = HashMap::with_capacity(places.len());
        while let Some(joined) = fetches.join_next().await {
            match joined {
                Ok((id, Ok(place))) => {
                    fetched.insert(id, place);
                }
                Ok((id, Err(e))) => {
                    warn!(place_id = %id, error = %e, "place fetch failed, keeping local data");
                }
                Err(e) => {
                    warn!(error = %e, "place fetch task failed");
                }
            }
        }
        fetched
    }
}

/// Fetched name and address over the local record; everything the user
/// owns (notes, visits, position, photo, attribution) is kept.
pub fn merge_place(local: &Place, fetched: &FetchedPlace) -> Place {
    Place {
        name: fetched.name.clone(),
        address: fetched.address.clone(),
        ..local.clone()
    }
}

pub fn merge(places: &[Place], fetched: &HashMap<PlaceId, FetchedPlace>) -> Vec<Place> {
    places
        .iter()
        .map(|place| match fetched.get(&place.id) {
            Some(remote) => merge_place(place, remote),
            None => place.clone(),
        })
        .collect()
}

/// Serialized size of the bundle handed onward, in bytes.
pub fn estimate_payload_size(places: &[Place]) -> Result<usize, RefreshError> {
    let mut buffer = Vec::new();
    ciborium::into_writer(places, &mut buffer)?;
    Ok(buffer.len())
}

/// Fetches and normalizes one photo. Runs after the merge has committed
/// and has no link back to the refresh that asked for it.
#[instrument(skip(lookup, refresh, photo_config), fields(place_id = %request.id))]
pub async fn fetch_photo(
    lookup: Arc<dyn PlaceLookup>,
    request: PhotoRequest,
    refresh: RefreshConfig,
    photo_config: PhotoConfig,
) -> Result<PhotoUpdate, RefreshError> {
    let raw = lookup
        .fetch_photo(
            &request.metadata,
            refresh.photo_max_width,
            refresh.photo_max_height,
        )
        .await?;
    let cached = photo::normalize_photo(
        photo_config,
        raw,
        refresh.photo_max_width,
        refresh.photo_max_height,
    )
    .await?;

    Ok(PhotoUpdate {
        id: request.id,
        photo: cached,
        attribution: request.metadata.attribution,
    })
}
