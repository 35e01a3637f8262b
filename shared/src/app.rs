//! The control context.
//!
//! `App` is the only owner of the in-memory place list and the edit
//! sessions. Writes go to the store's queue and return immediately; refresh
//! and photo fetches run as tokio tasks and report back as `CoreEvent`s,
//! which are applied here when the caller pumps `next_notice` or
//! `drain_notices`. Every method that spawns work must be called from inside
//! a tokio runtime.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use crate::config::CoreConfig;
use crate::error::{CoreResult, ValidationError};
use crate::event::{BackgroundTask, CoreEvent, Notice};
use crate::form::PlaceForm;
use crate::lookup::PlaceLookup;
use crate::model::{Place, PlaceFields, PlaceId, Visit};
use crate::position::{self, next_position, pending_position_updates};
use crate::refresh::{self, PhotoUpdate, Reconciler, RefreshError, RefreshOutcome};
use crate::session::{DeleteOutcome, EditSession, SessionError};
use crate::storage::{PlaceStorage, StoreError};
use crate::store::PlaceStore;
use crate::visits::{VisitGroup, VisitList, VisitRow, DEFAULT_GROUP_TITLE};

/// Which list an edit-mode toggle applies to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ListKind {
    Places,
    Visits(PlaceId),
}

/// One row of the place list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaceRow {
    pub id: PlaceId,
    pub name: String,
    pub address: String,
    /// "date at time" of the last visit in list order.
    pub last_visit: Option<String>,
    pub has_photo: bool,
}

pub struct App {
    config: CoreConfig,
    store: PlaceStore,
    lookup: Arc<dyn PlaceLookup>,
    places: Vec<Place>,
    place_session: EditSession<Place>,
    visit_sessions: HashMap<PlaceId, EditSession<Visit>>,
    /// Stored visit order of places whose visits are being reordered.
    committed_visits: HashMap<PlaceId, Vec<Visit>>,
    events_tx: mpsc::UnboundedSender<CoreEvent>,
    events_rx: mpsc::UnboundedReceiver<CoreEvent>,
    refresh_cycle: u64,
    refresh_running: bool,
    in_flight: usize,
}

impl App {
    pub async fn open(
        config: CoreConfig,
        storage: Arc<dyn PlaceStorage>,
        lookup: Arc<dyn PlaceLookup>,
    ) -> CoreResult<Self> {
        config.validate()?;
        let store = PlaceStore::open(storage).await?;
        let places = store.snapshot();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        info!(places = places.len(), "app opened");

        Ok(Self {
            config,
            store,
            lookup,
            places,
            place_session: EditSession::new(),
            visit_sessions: HashMap::new(),
            committed_visits: HashMap::new(),
            events_tx,
            events_rx,
            refresh_cycle: 0,
            refresh_running: false,
            in_flight: 0,
        })
    }

    /// Opens the SQLite file named by the config, or an in-memory database.
    #[cfg(not(target_arch = "wasm32"))]
    pub async fn open_with_config(
        config: CoreConfig,
        lookup: Arc<dyn PlaceLookup>,
    ) -> CoreResult<Self> {
        use crate::storage::SqliteStorage;

        let storage = match &config.database_path {
            Some(path) => SqliteStorage::open(path)?,
            None => SqliteStorage::open_in_memory()?,
        };
        Self::open(config, Arc::new(storage), lookup).await
    }

    /// Drains the write queue and stops the writer.
    pub async fn close(self) -> CoreResult<()> {
        self.store.close().await?;
        Ok(())
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn store(&self) -> &PlaceStore {
        &self.store
    }

    /// Waits until every write queued so far has been applied.
    pub async fn flush(&self) -> CoreResult<()> {
        self.store.flush().await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn places(&self) -> &[Place] {
        &self.places
    }

    pub fn place(&self, id: &PlaceId) -> Option<&Place> {
        self.places.iter().find(|place| &place.id == id)
    }

    pub fn place_rows(&self) -> Vec<PlaceRow> {
        self.places
            .iter()
            .map(|place| PlaceRow {
                id: place.id.clone(),
                name: place.name.clone(),
                address: place.address.clone(),
                last_visit: place.last_visit().map(Visit::summary),
                has_photo: place.photo.is_some(),
            })
            .collect()
    }

    pub fn visit_rows(&self, id: &PlaceId) -> Option<Vec<VisitRow>> {
        self.place(id)
            .map(|place| VisitGroup::new(DEFAULT_GROUP_TITLE, &place.visits).rows())
    }

    pub fn last_visit(&self, id: &PlaceId) -> Option<&Visit> {
        self.place(id)?.last_visit()
    }

    pub fn reordering_enabled(&self, list: &ListKind) -> bool {
        match list {
            ListKind::Places => self.place_session.is_reordering(),
            ListKind::Visits(id) => self
                .visit_sessions
                .get(id)
                .is_some_and(EditSession::is_reordering),
        }
    }

    /// Background results not yet turned into notices.
    pub fn pending_background_work(&self) -> usize {
        self.in_flight
    }

    // ------------------------------------------------------------------
    // Places
    // ------------------------------------------------------------------

    /// Manual entry; the place gets a generated id.
    pub fn add_place(&mut self, name: &str, address: &str) -> CoreResult<PlaceId> {
        let mut form = PlaceForm::new_place();
        form.fields.name = name.to_string();
        form.fields.address = address.to_string();
        self.add_place_from_form(&form)
    }

    #[instrument(skip_all)]
    pub fn add_place_from_form(&mut self, form: &PlaceForm) -> CoreResult<PlaceId> {
        let place = form.build_place(next_position(&self.places))?;
        let staged = self
            .place_session
            .pending()
            .is_some_and(|(_, pending)| pending.id == place.id);
        if staged || self.place(&place.id).is_some() {
            return Err(StoreError::DuplicateId(place.id.to_string()).into());
        }

        let id = place.id.clone();
        self.store.insert(place.clone())?;
        self.places.push(place);
        debug!(place_id = %id, "place added");
        Ok(id)
    }

    /// Removes the place and, with it, all of its visits.
    #[instrument(skip(self))]
    pub fn delete_place(&mut self, id: &PlaceId) -> CoreResult<Place> {
        let index = self.index_of(id)?;
        self.store.delete(id.clone())?;
        let removed = self.places.remove(index);
        self.forget_visit_state(id);
        info!(visits = removed.visits.len(), "place deleted");
        Ok(removed)
    }

    /// Swipe on a place row. The row disappears until confirmed or declined.
    pub fn stage_place_delete(&mut self, index: usize) -> CoreResult<&Place> {
        Ok(self.place_session.stage_delete(&mut self.places, index)?)
    }

    pub fn confirm_place_delete(&mut self) -> CoreResult<DeleteOutcome> {
        let id = self
            .place_session
            .pending()
            .map(|(_, place)| place.id.clone())
            .ok_or(SessionError::NoPendingDelete)?;
        self.store.delete(id.clone())?;
        self.place_session.confirm_delete()?;
        self.forget_visit_state(&id);
        info!(place_id = %id, "place deleted");
        Ok(DeleteOutcome::Deleted)
    }

    pub fn decline_place_delete(&mut self) -> CoreResult<DeleteOutcome> {
        Ok(self.place_session.decline_delete(&mut self.places)?)
    }

    /// Only accepted while the place list is reordering. Nothing is written
    /// until `commit_place_order`.
    pub fn move_place(&mut self, from: usize, to: usize) -> CoreResult<()> {
        self.place_session.require_reordering()?;
        position::move_item(&mut self.places, from, to)?;
        Ok(())
    }

    /// Renumbers positions to list order and persists the changed ones as
    /// one batch. Returns how many places moved.
    #[instrument(skip(self))]
    pub fn commit_place_order(&mut self) -> CoreResult<usize> {
        let mut renumbered = self.places.clone();
        let changed: Vec<Place> = pending_position_updates(&mut renumbered)
            .iter()
            .map(|place| self.stored_form(place, None))
            .collect();
        let count = changed.len();
        if count > 0 {
            self.store.update_batch(changed)?;
        }
        self.places = renumbered;
        debug!(changed = count, "place order committed");
        Ok(count)
    }

    pub fn update_place_fields(&mut self, id: &PlaceId, fields: PlaceFields) -> CoreResult<()> {
        fields.validate()?;
        let index = self.index_of(id)?;
        let mut updated = self.places[index].clone();
        updated.apply_fields(fields);
        self.commit_place(index, updated, None)
    }

    // ------------------------------------------------------------------
    // Visits
    // ------------------------------------------------------------------

    /// Appends a visit and returns its domain index.
    pub fn add_visit(&mut self, id: &PlaceId, visit: Visit) -> CoreResult<usize> {
        let index = self.index_of(id)?;
        let mut updated = self.places[index].clone();
        let visit_index = VisitList::new(&mut updated.visits).insert(visit.clone());
        let committed = self.committed_with(id, |committed| committed.push(visit));
        self.commit_place(index, updated, committed)?;
        Ok(visit_index)
    }

    pub fn update_visit(&mut self, id: &PlaceId, visit_index: usize, visit: Visit) -> CoreResult<()> {
        let index = self.index_of(id)?;
        let mut updated = self.places[index].clone();
        let old = VisitList::new(&mut updated.visits).update(visit_index, visit.clone())?;
        let committed = self.committed_with(id, |committed| replace_first(committed, &old, visit));
        self.commit_place(index, updated, committed)
    }

    pub fn delete_visit(&mut self, id: &PlaceId, visit_index: usize) -> CoreResult<Visit> {
        let index = self.index_of(id)?;
        let mut updated = self.places[index].clone();
        let removed = VisitList::new(&mut updated.visits).remove(visit_index)?;
        let committed = self.committed_with(id, |committed| remove_first(committed, &removed));
        self.commit_place(index, updated, committed)?;
        Ok(removed)
    }

    pub fn stage_visit_delete(&mut self, id: &PlaceId, visit_index: usize) -> CoreResult<&Visit> {
        let index = self.index_of(id)?;
        let session = self.visit_sessions.entry(id.clone()).or_default();
        Ok(session.stage_delete(&mut self.places[index].visits, visit_index)?)
    }

    pub fn confirm_visit_delete(&mut self, id: &PlaceId) -> CoreResult<DeleteOutcome> {
        let index = self.index_of(id)?;
        let staged = self
            .visit_sessions
            .get(id)
            .and_then(EditSession::pending)
            .map(|(_, visit)| visit.clone())
            .ok_or(SessionError::NoPendingDelete)?;
        let committed = self.committed_with(id, |committed| remove_first(committed, &staged));

        let mut stored = self.places[index].clone();
        if let Some(committed) = &committed {
            stored.visits = committed.clone();
        }
        self.store.update(stored)?;

        self.visit_session_mut(id).confirm_delete()?;
        if let Some(committed) = committed {
            self.committed_visits.insert(id.clone(), committed);
        }
        Ok(DeleteOutcome::Deleted)
    }

    pub fn decline_visit_delete(&mut self, id: &PlaceId) -> CoreResult<DeleteOutcome> {
        let index = self.index_of(id)?;
        let session = self.visit_sessions.entry(id.clone()).or_default();
        Ok(session.decline_delete(&mut self.places[index].visits)?)
    }

    /// Only accepted while this place's visit list is reordering. Storage
    /// keeps the previous order until `commit_visit_order`.
    pub fn move_visit(&mut self, id: &PlaceId, from: usize, to: usize) -> CoreResult<()> {
        let index = self.index_of(id)?;
        self.visit_session_mut(id).require_reordering()?;
        VisitList::new(&mut self.places[index].visits).move_item(from, to)?;
        Ok(())
    }

    /// Persists the place so the new visit order and last-visit summary
    /// reach storage together.
    pub fn commit_visit_order(&mut self, id: &PlaceId) -> CoreResult<()> {
        let index = self.index_of(id)?;
        let order = self.visits_with_staged(&self.places[index]);
        let mut stored = self.places[index].clone();
        stored.visits = order.clone();
        self.store.update(stored)?;
        if let Some(committed) = self.committed_visits.get_mut(id) {
            *committed = order;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Edit mode
    // ------------------------------------------------------------------

    /// Toggles drag handles. Leaving reorder mode commits the order once;
    /// if that write cannot be queued the list stays in reorder mode.
    pub fn set_editing(&mut self, list: ListKind, editing: bool) -> CoreResult<()> {
        match list {
            ListKind::Places => {
                if editing {
                    self.place_session.begin();
                } else if self.place_session.finish().is_required() {
                    if let Err(e) = self.commit_place_order() {
                        self.place_session.begin();
                        return Err(e);
                    }
                }
            }
            ListKind::Visits(id) => {
                let index = self.index_of(&id)?;
                if editing {
                    if self.visit_session_mut(&id).begin() {
                        let committed = self.visits_with_staged(&self.places[index]);
                        self.committed_visits.insert(id, committed);
                    }
                } else if self.visit_session_mut(&id).finish().is_required() {
                    if let Err(e) = self.commit_visit_order(&id) {
                        self.visit_session_mut(&id).begin();
                        return Err(e);
                    }
                    self.committed_visits.remove(&id);
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Refresh
    // ------------------------------------------------------------------

    /// Starts a refresh of every visible place. Returns `false` if one is
    /// already running.
    #[instrument(skip(self))]
    pub fn begin_refresh(&mut self) -> bool {
        if self.refresh_running {
            debug!("refresh already running");
            return false;
        }
        self.refresh_cycle += 1;
        self.refresh_running = true;

        let cycle = self.refresh_cycle;
        let places = self.places.clone();
        let reconciler = Reconciler::new(Arc::clone(&self.lookup), self.config.refresh.clone());
        info!(cycle, places = places.len(), "refresh started");

        self.spawn_background(BackgroundTask::Refresh, async move {
            let result = reconciler.run(places).await;
            CoreEvent::RefreshFinished { cycle, result }
        });
        true
    }

    pub fn is_refreshing(&self) -> bool {
        self.refresh_running
    }

    /// Waits for the next background result that has something to show.
    /// Returns `None` once no background work is outstanding.
    pub async fn next_notice(&mut self) -> Option<Notice> {
        while self.in_flight > 0 {
            let event = self.events_rx.recv().await?;
            if let Some(notice) = self.handle_event(event) {
                return Some(notice);
            }
        }
        None
    }

    /// Applies whatever has already arrived without waiting.
    pub fn drain_notices(&mut self) -> Vec<Notice> {
        let mut notices = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            notices.extend(self.handle_event(event));
        }
        notices
    }

    /// Runs until all outstanding refresh and photo work has been applied.
    pub async fn settle(&mut self) -> Vec<Notice> {
        let mut notices = Vec::new();
        while let Some(notice) = self.next_notice().await {
            notices.push(notice);
        }
        notices
    }

    /// Runs `work` on the runtime. Whatever happens to it, exactly one event
    /// comes back, so `in_flight` always returns to zero.
    fn spawn_background<F>(&mut self, task: BackgroundTask, work: F)
    where
        F: Future<Output = CoreEvent> + Send + 'static,
    {
        self.in_flight += 1;
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let event = match tokio::spawn(work).await {
                Ok(event) => event,
                Err(e) => CoreEvent::TaskFailed {
                    task,
                    reason: e.to_string(),
                },
            };
            // Only fails once `App` is gone, and then nobody is waiting.
            let _ = events.send(event);
        });
    }

    fn handle_event(&mut self, event: CoreEvent) -> Option<Notice> {
        self.in_flight = self.in_flight.saturating_sub(1);
        debug!(event = event.name(), "applying background result");

        match event {
            CoreEvent::RefreshFinished { cycle, result } => {
                self.refresh_running = false;
                self.apply_refresh(cycle, result)
            }
            CoreEvent::PhotoFetched { cycle, id, result } => match result {
                Ok(update) => self.apply_photo(update),
                Err(e) => {
                    warn!(cycle, place_id = %id, error = %e, "photo fetch failed");
                    None
                }
            },
            CoreEvent::TaskFailed { task, reason } => {
                error!(task = ?task, reason = %reason, "background task failed");
                match task {
                    BackgroundTask::Refresh => {
                        self.refresh_running = false;
                        Some(Notice::RefreshFailed(reason))
                    }
                    BackgroundTask::Photo(_) => None,
                }
            }
        }
    }

    fn apply_refresh(
        &mut self,
        cycle: u64,
        result: Result<RefreshOutcome, RefreshError>,
    ) -> Option<Notice> {
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(RefreshError::PayloadTooLarge { size, budget }) => {
                return Some(Notice::RefreshAborted { size, budget });
            }
            Err(e) => {
                error!(cycle, error = %e, "refresh failed");
                return Some(Notice::RefreshFailed(e.to_string()));
            }
        };

        // Merge onto the list as it is now; places deleted meanwhile are
        // skipped. Fetched data that would not pass validation counts as a
        // failed fetch for that place.
        let mut report = outcome.report;
        let mut merged = Vec::new();
        let mut rejected = HashSet::new();
        for (index, place) in self.places.iter().enumerate() {
            let Some(fetched) = outcome.fetched.get(&place.id) else {
                continue;
            };
            let candidate = refresh::merge_place(place, fetched);
            if let Err(e) = candidate.validate() {
                warn!(cycle, place_id = %place.id, error = %e, "fetched data rejected, keeping local data");
                rejected.insert(place.id.clone());
                continue;
            }
            merged.push((index, candidate));
        }
        report.updated = report.updated.saturating_sub(rejected.len());
        report.failed += rejected.len();

        let batch: Vec<Place> = merged
            .iter()
            .map(|(_, place)| self.stored_form(place, None))
            .collect();
        if !batch.is_empty() {
            if let Err(e) = self.store.update_batch(batch) {
                error!(cycle, error = %e, "failed to queue refresh results");
                return Some(Notice::RefreshFailed(e.to_string()));
            }
        }
        for (index, place) in merged {
            self.places[index] = place;
        }

        for request in outcome.photo_requests() {
            if rejected.contains(&request.id) || self.place(&request.id).is_none() {
                continue;
            }
            let id = request.id.clone();
            let lookup = Arc::clone(&self.lookup);
            let refresh_config = self.config.refresh.clone();
            let photo_config = self.config.photo.clone();
            self.spawn_background(BackgroundTask::Photo(id.clone()), async move {
                let result = refresh::fetch_photo(lookup, request, refresh_config, photo_config).await;
                CoreEvent::PhotoFetched { cycle, id, result }
            });
        }

        info!(
            cycle,
            updated = report.updated,
            failed = report.failed,
            "refresh applied"
        );
        Some(Notice::RefreshCompleted(report))
    }

    fn apply_photo(&mut self, update: PhotoUpdate) -> Option<Notice> {
        let Ok(index) = self.index_of(&update.id) else {
            debug!(place_id = %update.id, "photo for removed place dropped");
            return None;
        };
        let mut updated = self.places[index].clone();
        updated.photo = Some(update.photo);
        updated.photo_attribution = update.attribution;

        if let Err(e) = self.commit_place(index, updated, None) {
            error!(place_id = %update.id, error = %e, "failed to queue photo update");
            return None;
        }
        Some(Notice::PhotoUpdated(update.id))
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn index_of(&self, id: &PlaceId) -> Result<usize, ValidationError> {
        self.places
            .iter()
            .position(|place| &place.id == id)
            .ok_or_else(|| ValidationError::UnknownPlace(id.to_string()))
    }

    fn visit_session_mut(&mut self, id: &PlaceId) -> &mut EditSession<Visit> {
        self.visit_sessions.entry(id.clone()).or_default()
    }

    fn forget_visit_state(&mut self, id: &PlaceId) {
        self.visit_sessions.remove(id);
        self.committed_visits.remove(id);
    }

    /// In-memory visits with a staged delete put back: a swiped visit stays
    /// in storage until the delete is confirmed.
    fn visits_with_staged(&self, place: &Place) -> Vec<Visit> {
        let mut visits = place.visits.clone();
        if let Some((at, visit)) = self
            .visit_sessions
            .get(&place.id)
            .and_then(EditSession::pending)
        {
            visits.insert(at.min(visits.len()), visit.clone());
        }
        visits
    }

    /// The committed visit order with `edit` applied, if the place's visits
    /// are being reordered.
    fn committed_with(
        &self,
        id: &PlaceId,
        edit: impl FnOnce(&mut Vec<Visit>),
    ) -> Option<Vec<Visit>> {
        self.committed_visits.get(id).map(|committed| {
            let mut committed = committed.clone();
            edit(&mut committed);
            committed
        })
    }

    /// The record as storage should see it. While the visit list is being
    /// reordered, storage keeps the last committed order.
    fn stored_form(&self, place: &Place, committed: Option<&Vec<Visit>>) -> Place {
        let mut stored = place.clone();
        stored.visits = match committed.or_else(|| self.committed_visits.get(&place.id)) {
            Some(committed) => committed.clone(),
            None => self.visits_with_staged(place),
        };
        stored
    }

    /// Queues `updated` and swaps it in only once the write was accepted.
    fn commit_place(
        &mut self,
        index: usize,
        updated: Place,
        committed: Option<Vec<Visit>>,
    ) -> CoreResult<()> {
        self.store
            .update(self.stored_form(&updated, committed.as_ref()))?;
        if let Some(committed) = committed {
            self.committed_visits.insert(updated.id.clone(), committed);
        }
        self.places[index] = updated;
        Ok(())
    }
}

fn replace_first(visits: &mut [Visit], old: &Visit, new: Visit) {
    if let Some(slot) = visits.iter_mut().find(|visit| **visit == *old) {
        *slot = new;
    }
}

fn remove_first(visits: &mut Vec<Visit>, target: &Visit) {
    if let Some(at) = visits.iter().position(|visit| visit == target) {
        visits.remove(at);
    }
}
