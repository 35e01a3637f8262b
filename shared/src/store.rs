use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::model::{Place, PlaceId};
use crate::storage::{PlaceStorage, StoreError};
use crate::writer::{self, WriteCommand, WriterMetrics, WriterMetricsSnapshot};

/// Aggregate store for places and their embedded visits.
///
/// Writes are validated here, then queued to the single writer and return
/// immediately. Reads come from the observed snapshot, which the writer
/// refreshes after every applied write.
pub struct PlaceStore {
    commands: mpsc::UnboundedSender<WriteCommand>,
    snapshot: watch::Receiver<Vec<Place>>,
    metrics: Arc<WriterMetrics>,
    worker: JoinHandle<()>,
}

impl PlaceStore {
    #[instrument(skip(storage))]
    pub async fn open(storage: Arc<dyn PlaceStorage>) -> Result<Self, StoreError> {
        let loaded = storage.load_all().await?;
        let mut places = Vec::with_capacity(loaded.len());
        let mut quarantined = 0usize;

        for row in loaded {
            match row {
                Ok(place) => places.push(place),
                Err(e) => {
                    warn!("Skipping unreadable place row: {}", e);
                    quarantined += 1;
                }
            }
        }
        writer::sort_by_position(&mut places);

        info!(
            "Place store opened with {} places, {} quarantined",
            places.len(),
            quarantined
        );

        let (snapshot_tx, snapshot_rx) = watch::channel(places);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let metrics = Arc::new(WriterMetrics::default());
        let worker = writer::spawn_writer(storage, snapshot_tx, Arc::clone(&metrics), commands_rx);

        Ok(Self {
            commands: commands_tx,
            snapshot: snapshot_rx,
            metrics,
            worker,
        })
    }

    /// Id uniqueness is enforced by storage when the insert is applied;
    /// the snapshot lags the queue and cannot answer it here.
    pub fn insert(&self, place: Place) -> Result<(), StoreError> {
        place.validate()?;
        self.send(WriteCommand::Insert(place))
    }

    /// Replaces the full record.
    pub fn update(&self, place: Place) -> Result<(), StoreError> {
        place.validate()?;
        self.send(WriteCommand::Update(place))
    }

    /// Replaces several records in one storage transaction.
    pub fn update_batch(&self, places: Vec<Place>) -> Result<(), StoreError> {
        if places.is_empty() {
            return Ok(());
        }
        for place in &places {
            place.validate()?;
        }
        self.send(WriteCommand::UpdateBatch(places))
    }

    /// Removes the place together with its visits and cached photo.
    pub fn delete(&self, id: PlaceId) -> Result<(), StoreError> {
        self.send(WriteCommand::Delete(id))
    }

    pub fn snapshot(&self) -> Vec<Place> {
        self.snapshot.borrow().clone()
    }

    pub fn get(&self, id: &PlaceId) -> Option<Place> {
        self.snapshot.borrow().iter().find(|p| &p.id == id).cloned()
    }

    /// Change notification: resolves whenever the writer applies a write.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Place>> {
        self.snapshot.clone()
    }

    /// Waits until every write queued before this call has been applied.
    pub async fn flush(&self) -> Result<(), StoreError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(WriteCommand::Flush(done_tx))?;
        done_rx.await.map_err(|_| StoreError::Closed)
    }

    pub fn metrics(&self) -> WriterMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Drains queued writes and stops the writer.
    #[instrument(skip(self))]
    pub async fn close(self) -> Result<(), StoreError> {
        let Self {
            commands, worker, ..
        } = self;
        drop(commands);
        worker
            .await
            .map_err(|e| StoreError::Worker(e.to_string()))?;
        info!("Place store closed");
        Ok(())
    }

    fn send(&self, command: WriteCommand) -> Result<(), StoreError> {
        self.commands
            .send(command)
            .map_err(|_| StoreError::Closed)
    }
}
