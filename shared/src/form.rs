//! Place detail form shared by the "new place" and "edit place" screens.
//!
//! Both screens edit the same fields; `FormConfig` says which extra parts
//! (visit list, delete button, photo) a given screen shows and whether the
//! result creates a place or updates one.

use crate::error::ValidationError;
use crate::lookup::FetchedPlace;
use crate::model::{Place, PlaceFields, PlaceId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormMode {
    Create,
    Edit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FormConfig {
    pub mode: FormMode,
    pub show_visits: bool,
    pub show_delete: bool,
    pub show_photo: bool,
}

impl FormConfig {
    pub const fn create() -> Self {
        Self {
            mode: FormMode::Create,
            show_visits: false,
            show_delete: false,
            show_photo: false,
        }
    }

    pub const fn edit() -> Self {
        Self {
            mode: FormMode::Edit,
            show_visits: true,
            show_delete: true,
            show_photo: true,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PlaceForm {
    config: FormConfig,
    id: Option<PlaceId>,
    pub fields: PlaceFields,
}

impl PlaceForm {
    /// Empty manual-entry form.
    pub fn new_place() -> Self {
        Self {
            config: FormConfig::create(),
            id: None,
            fields: PlaceFields::default(),
        }
    }

    /// Create form pre-filled from a search result, keeping its id.
    pub fn from_lookup(fetched: &FetchedPlace) -> Self {
        Self {
            config: FormConfig::create(),
            id: Some(fetched.id.clone()),
            fields: PlaceFields::new(fetched.name.clone(), fetched.address.clone(), ""),
        }
    }

    pub fn edit(place: &Place) -> Self {
        Self {
            config: FormConfig::edit(),
            id: Some(place.id.clone()),
            fields: PlaceFields::new(place.name.clone(), place.address.clone(), place.notes.clone()),
        }
    }

    pub fn config(&self) -> FormConfig {
        self.config
    }

    pub fn id(&self) -> Option<&PlaceId> {
        self.id.as_ref()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.fields.validate()
    }

    /// New place appended at `position`. Manual entries get a random id.
    pub fn build_place(&self, position: u32) -> Result<Place, ValidationError> {
        self.validate()?;
        let id = self.id.clone().unwrap_or_else(PlaceId::generate);
        let mut place = Place::new(id, self.fields.name.trim(), self.fields.address.trim(), position)?;
        place.notes = self.fields.notes.clone();
        Ok(place)
    }

    /// Trimmed fields for an update of an existing place.
    pub fn submit_fields(&self) -> Result<PlaceFields, ValidationError> {
        self.validate()?;
        Ok(PlaceFields::new(
            self.fields.name.trim(),
            self.fields.address.trim(),
            self.fields.notes.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_edit_show_different_parts() {
        let create = PlaceForm::new_place().config();
        assert_eq!(create.mode, FormMode::Create);
        assert!(!create.show_visits && !create.show_delete);

        let place = Place::new(PlaceId::new("p1").unwrap(), "Cafe", "Main St", 0).unwrap();
        let edit = PlaceForm::edit(&place).config();
        assert_eq!(edit.mode, FormMode::Edit);
        assert!(edit.show_visits && edit.show_delete && edit.show_photo);
    }

    #[test]
    fn manual_entry_gets_generated_id() {
        let mut form = PlaceForm::new_place();
        form.fields.name = "  Corner Bakery ".into();
        form.fields.address = "12 High St".into();

        let place = form.build_place(4).unwrap();
        assert_eq!(place.name, "Corner Bakery");
        assert_eq!(place.position, 4);
        assert!(!place.id.as_str().is_empty());
    }

    #[test]
    fn lookup_entry_keeps_remote_id() {
        let fetched = FetchedPlace {
            id: PlaceId::new("ChIJ123").unwrap(),
            name: "Museum".into(),
            address: "1 Art Way".into(),
            photo: None,
        };
        let place = PlaceForm::from_lookup(&fetched).build_place(0).unwrap();
        assert_eq!(place.id.as_str(), "ChIJ123");
        assert_eq!(place.address, "1 Art Way");
    }

    #[test]
    fn empty_name_is_rejected() {
        let mut form = PlaceForm::new_place();
        form.fields.address = "addr".into();
        assert_eq!(form.build_place(0).unwrap_err(), ValidationError::EmptyName);
        assert_eq!(form.submit_fields().unwrap_err(), ValidationError::EmptyName);
    }

    #[test]
    fn edit_form_round_trips_fields() {
        let mut place = Place::new(PlaceId::new("p1").unwrap(), "Cafe", "Main St", 0).unwrap();
        place.notes = "window seat".into();
        let form = PlaceForm::edit(&place);
        assert_eq!(form.id(), Some(&place.id));
        assert_eq!(
            form.submit_fields().unwrap(),
            PlaceFields::new("Cafe", "Main St", "window seat")
        );
    }
}
