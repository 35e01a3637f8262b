//! Single-writer persistence queue.
//!
//! One task owns the storage handle and applies commands strictly in the
//! order they were sent, one at a time. After each successful write it
//! updates the observed snapshot; failed writes are logged and dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument};

use crate::model::{Place, PlaceId};
use crate::storage::{PlaceStorage, StoreError};

pub(crate) enum WriteCommand {
    Insert(Place),
    Update(Place),
    UpdateBatch(Vec<Place>),
    Delete(PlaceId),
    Flush(oneshot::Sender<()>),
}

impl WriteCommand {
    fn name(&self) -> &'static str {
        match self {
            Self::Insert(_) => "insert",
            Self::Update(_) => "update",
            Self::UpdateBatch(_) => "update_batch",
            Self::Delete(_) => "delete",
            Self::Flush(_) => "flush",
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct WriterMetrics {
    pub writes_applied: AtomicU64,
    pub writes_failed: AtomicU64,
}

impl WriterMetrics {
    pub fn snapshot(&self) -> WriterMetricsSnapshot {
        WriterMetricsSnapshot {
            writes_applied: self.writes_applied.load(Ordering::Relaxed),
            writes_failed: self.writes_failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriterMetricsSnapshot {
    pub writes_applied: u64,
    pub writes_failed: u64,
}

pub(crate) fn spawn_writer(
    storage: Arc<dyn PlaceStorage>,
    snapshot: watch::Sender<Vec<Place>>,
    metrics: Arc<WriterMetrics>,
    commands: mpsc::UnboundedReceiver<WriteCommand>,
) -> JoinHandle<()> {
    tokio::spawn(run_writer(storage, snapshot, metrics, commands))
}

#[instrument(skip_all)]
async fn run_writer(
    storage: Arc<dyn PlaceStorage>,
    snapshot: watch::Sender<Vec<Place>>,
    metrics: Arc<WriterMetrics>,
    mut commands: mpsc::UnboundedReceiver<WriteCommand>,
) {
    while let Some(command) = commands.recv().await {
        let name = command.name();
        match apply(storage.as_ref(), &snapshot, command).await {
            Ok(true) => {
                metrics.writes_applied.fetch_add(1, Ordering::Relaxed);
                debug!(command = name, "write applied");
            }
            Ok(false) => {}
            Err(e) => {
                metrics.writes_failed.fetch_add(1, Ordering::Relaxed);
                error!(command = name, error = %e, "write failed");
            }
        }
    }
    debug!("writer stopped");
}

/// `Ok(false)` for commands that do not touch storage.
async fn apply(
    storage: &dyn PlaceStorage,
    snapshot: &watch::Sender<Vec<Place>>,
    command: WriteCommand,
) -> Result<bool, StoreError> {
    match command {
        WriteCommand::Insert(place) => {
            storage.insert(&place).await?;
            snapshot.send_modify(|places| {
                places.push(place);
                sort_by_position(places);
            });
        }
        WriteCommand::Update(place) => {
            storage.update(&place).await?;
            snapshot.send_modify(|places| {
                replace(places, place);
                sort_by_position(places);
            });
        }
        WriteCommand::UpdateBatch(batch) => {
            storage.update_batch(&batch).await?;
            snapshot.send_modify(|places| {
                for place in batch {
                    replace(places, place);
                }
                sort_by_position(places);
            });
        }
        WriteCommand::Delete(id) => {
            storage.delete(&id).await?;
            snapshot.send_modify(|places| places.retain(|p| p.id != id));
        }
        WriteCommand::Flush(done) => {
            let _ = done.send(());
            return Ok(false);
        }
    }
    Ok(true)
}

fn replace(places: &mut [Place], place: Place) {
    if let Some(slot) = places.iter_mut().find(|p| p.id == place.id) {
        *slot = place;
    }
}

pub(crate) fn sort_by_position(places: &mut [Place]) {
    places.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.id.cmp(&b.id)));
}
