// lib.rs - Placebook core

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod app;
pub mod config;
pub mod error;
pub mod event;
pub mod form;
pub mod lookup;
pub mod model;
pub mod photo;
pub mod position;
pub mod refresh;
pub mod session;
pub mod storage;
pub mod store;
pub mod visits;
mod writer;

pub use app::{App, ListKind, PlaceRow};
pub use config::{CoreConfig, PhotoConfig, RefreshConfig};
pub use error::{CoreError, CoreResult, IndexError, ValidationError};
pub use event::Notice;
pub use form::{FormConfig, FormMode, PlaceForm};
pub use lookup::{FetchedPlace, LookupError, PhotoMetadata, PlaceLookup};
pub use model::{Place, PlaceFields, PlaceId, Visit};
pub use refresh::{RefreshError, RefreshReport};
pub use session::{Commit, DeleteOutcome, EditSession, EditState, SessionError};
pub use storage::{PlaceStorage, StoreError};
#[cfg(not(target_arch = "wasm32"))]
pub use storage::SqliteStorage;
pub use store::PlaceStore;
pub use visits::{VisitGroup, VisitRow};
pub use writer::WriterMetricsSnapshot;
