use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use placebook::{
    App, CoreConfig, CoreError, FetchedPlace, ListKind, LookupError, Notice, PhotoMetadata,
    PlaceFields, PlaceForm, PlaceId, PlaceLookup, SqliteStorage, ValidationError, Visit, VisitRow,
};

#[derive(Default)]
struct StubLookup {
    places: Mutex<HashMap<PlaceId, FetchedPlace>>,
}

impl StubLookup {
    fn set(&self, id: &PlaceId, name: &str, address: &str) {
        self.places.lock().unwrap().insert(
            id.clone(),
            FetchedPlace {
                id: id.clone(),
                name: name.into(),
                address: address.into(),
                photo: None,
            },
        );
    }
}

#[async_trait::async_trait]
impl PlaceLookup for StubLookup {
    async fn fetch_place(&self, id: &PlaceId) -> Result<FetchedPlace, LookupError> {
        self.places
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| LookupError::Network(format!("offline: {id}")))
    }

    async fn fetch_photo(
        &self,
        photo: &PhotoMetadata,
        _max_width: u32,
        _max_height: u32,
    ) -> Result<Vec<u8>, LookupError> {
        Err(LookupError::NotFound(photo.reference.clone()))
    }
}

fn at(day: u32, hour: u32) -> Visit {
    Visit::new(
        NaiveDate::from_ymd_opt(2024, 6, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap(),
    )
}

async fn open(lookup: Arc<StubLookup>) -> App {
    let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
    App::open(CoreConfig::default(), storage, lookup).await.unwrap()
}

#[tokio::test]
async fn collect_reorder_and_refresh() {
    let lookup = Arc::new(StubLookup::default());
    let mut app = open(Arc::clone(&lookup)).await;

    // 1. Add one place by hand and one from a search result
    let bakery = app.add_place("Bakery", "1 Flour Rd").unwrap();
    let museum_id = PlaceId::new("remote-museum").unwrap();
    let form = PlaceForm::from_lookup(&FetchedPlace {
        id: museum_id.clone(),
        name: "Museum".into(),
        address: "2 Art Way".into(),
        photo: None,
    });
    assert_eq!(app.add_place_from_form(&form).unwrap(), museum_id);

    // 2. Rejected input changes nothing
    assert!(matches!(
        app.add_place("   ", "addr"),
        Err(CoreError::Validation(ValidationError::EmptyName))
    ));
    assert_eq!(app.places().len(), 2);

    // 3. Visits: the summary tracks the last row, not the latest date
    app.add_visit(&bakery, at(10, 8)).unwrap();
    app.add_visit(&bakery, at(2, 17)).unwrap();
    let rows = app.place_rows();
    assert_eq!(rows[0].last_visit.as_deref(), Some("Jun 2, 2024 at 5:00 PM"));

    let visit_rows = app.visit_rows(&bakery).unwrap();
    assert!(matches!(visit_rows[0], VisitRow::Header { count: 2, .. }));

    // 4. Reorder the place list
    app.set_editing(ListKind::Places, true).unwrap();
    app.move_place(1, 0).unwrap();
    app.set_editing(ListKind::Places, false).unwrap();
    let order: Vec<&str> = app.places().iter().map(|p| p.name.as_str()).collect();
    assert_eq!(order, vec!["Museum", "Bakery"]);

    // 5. Refresh: museum resolves, the hand-made bakery does not
    lookup.set(&museum_id, "City Museum", "2 Art Way");
    app.begin_refresh();
    let notices = app.settle().await;
    assert_eq!(notices.len(), 1);
    match &notices[0] {
        Notice::RefreshCompleted(report) => {
            assert_eq!((report.requested, report.updated, report.failed), (2, 1, 1));
        }
        other => panic!("unexpected notice: {other:?}"),
    }
    assert_eq!(app.place(&museum_id).unwrap().name, "City Museum");
    assert_eq!(app.place(&bakery).unwrap().visits.len(), 2);

    // 6. Everything reached storage in order
    app.flush().await.unwrap();
    let stored = app.store().snapshot();
    assert_eq!(stored[0].name, "City Museum");
    assert_eq!(stored[1].visits, vec![at(10, 8), at(2, 17)]);

    app.close().await.unwrap();
}

#[tokio::test]
async fn editing_fields_keeps_visits_and_position() {
    let mut app = open(Arc::new(StubLookup::default())).await;
    let first = app.add_place("A", "x").unwrap();
    let second = app.add_place("B", "y").unwrap();
    app.add_visit(&second, at(1, 9)).unwrap();

    let mut form = PlaceForm::edit(app.place(&second).unwrap());
    form.fields.notes = "closed mondays".into();
    app.update_place_fields(&second, form.submit_fields().unwrap())
        .unwrap();

    let place = app.place(&second).unwrap();
    assert_eq!(place.notes, "closed mondays");
    assert_eq!(place.position, 1);
    assert_eq!(place.visits.len(), 1);

    let err = app
        .update_place_fields(&first, PlaceFields::new("", "x", ""))
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(ValidationError::EmptyName)));
    assert_eq!(app.place(&first).unwrap().name, "A");
}

#[tokio::test]
async fn visit_moves_wait_for_commit() {
    let mut app = open(Arc::new(StubLookup::default())).await;
    let id = app.add_place("Cafe", "Main St").unwrap();
    let (a, b, c) = (at(1, 9), at(2, 9), at(3, 9));
    for visit in [a.clone(), b.clone(), c.clone()] {
        app.add_visit(&id, visit).unwrap();
    }

    let list = ListKind::Visits(id.clone());
    assert!(app.move_visit(&id, 0, 2).is_err());
    app.set_editing(list.clone(), true).unwrap();
    assert!(app.reordering_enabled(&list));
    assert!(!app.reordering_enabled(&ListKind::Places));
    app.move_visit(&id, 0, 2).unwrap();
    assert_eq!(app.place(&id).unwrap().visits, vec![b.clone(), c.clone(), a.clone()]);

    app.flush().await.unwrap();
    assert_eq!(app.store().get(&id).unwrap().visits, vec![a.clone(), b.clone(), c.clone()]);

    app.set_editing(list, false).unwrap();
    app.flush().await.unwrap();
    assert_eq!(app.store().get(&id).unwrap().visits, vec![b, c, a]);
}

#[tokio::test]
async fn edits_during_visit_reorder_keep_stored_order() {
    let mut app = open(Arc::new(StubLookup::default())).await;
    let id = app.add_place("Cafe", "Main St").unwrap();
    let (a, b, c) = (at(1, 9), at(2, 9), at(3, 9));
    app.add_visit(&id, a.clone()).unwrap();
    app.add_visit(&id, b.clone()).unwrap();

    let list = ListKind::Visits(id.clone());
    app.set_editing(list.clone(), true).unwrap();
    app.move_visit(&id, 0, 1).unwrap();

    // 1. Other writes to the place keep the last committed visit order
    app.update_place_fields(&id, PlaceFields::new("Cafe", "Main St", "new notes"))
        .unwrap();
    app.add_visit(&id, c.clone()).unwrap();
    app.flush().await.unwrap();
    assert!(app.reordering_enabled(&list));
    let stored = app.store().get(&id).unwrap();
    assert_eq!(stored.notes, "new notes");
    assert_eq!(stored.visits, vec![a.clone(), b.clone(), c.clone()]);
    assert_eq!(app.place(&id).unwrap().visits, vec![b.clone(), a.clone(), c.clone()]);

    // 2. A delete while reordering removes the same visit from both orders
    app.delete_visit(&id, 0).unwrap();
    app.flush().await.unwrap();
    assert_eq!(app.store().get(&id).unwrap().visits, vec![a.clone(), c.clone()]);

    // 3. Done commits the on-screen order
    app.set_editing(list, false).unwrap();
    app.flush().await.unwrap();
    assert_eq!(app.store().get(&id).unwrap().visits, vec![a, c]);
    assert_eq!(
        app.place_rows()[0].last_visit.as_deref(),
        Some("Jun 3, 2024 at 9:00 AM")
    );
}
