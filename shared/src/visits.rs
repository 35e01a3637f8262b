//! Per-place visit list and its flattened presentation form.
//!
//! All operations take a zero-based *domain* index into the place's visit
//! list. The presentation list reserves slot 0 for the group header; the
//! mapping between the two lives here and nowhere else.

use crate::error::IndexError;
use crate::model::Visit;
use crate::position;

/// Rows the group header occupies ahead of the first visit.
pub const HEADER_SLOTS: usize = 1;

pub const DEFAULT_GROUP_TITLE: &str = "Visits";

pub fn to_adapter_index(domain_index: usize) -> usize {
    domain_index + HEADER_SLOTS
}

/// `None` for the header slot.
pub fn to_domain_index(adapter_index: usize) -> Option<usize> {
    adapter_index.checked_sub(HEADER_SLOTS)
}

/// Mutable view over one place's visits.
pub struct VisitList<'a> {
    visits: &'a mut Vec<Visit>,
}

impl<'a> VisitList<'a> {
    pub fn new(visits: &'a mut Vec<Visit>) -> Self {
        Self { visits }
    }

    pub fn len(&self) -> usize {
        self.visits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visits.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Visit> {
        self.visits.get(index)
    }

    /// Appends; the new visit becomes the last visit.
    pub fn insert(&mut self, visit: Visit) -> usize {
        self.visits.push(visit);
        self.visits.len() - 1
    }

    pub fn update(&mut self, index: usize, visit: Visit) -> Result<Visit, IndexError> {
        IndexError::check(index, self.visits.len())?;
        Ok(std::mem::replace(&mut self.visits[index], visit))
    }

    pub fn remove(&mut self, index: usize) -> Result<Visit, IndexError> {
        IndexError::check(index, self.visits.len())?;
        Ok(self.visits.remove(index))
    }

    pub fn move_item(&mut self, from: usize, to: usize) -> Result<(), IndexError> {
        position::move_item(self.visits, from, to)
    }

    /// Visit at the highest domain index.
    pub fn last(&self) -> Option<&Visit> {
        self.visits.last()
    }

    pub fn last_summary(&self) -> Option<String> {
        last_visit_summary(self.visits.as_slice())
    }
}

pub fn last_visit_summary(visits: &[Visit]) -> Option<String> {
    visits.last().map(Visit::summary)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VisitRow {
    Header { title: String, count: usize },
    Item {
        domain_index: usize,
        date: String,
        time: String,
    },
}

/// The single header + visits group shown on a place's detail screen.
#[derive(Clone, Copy, Debug)]
pub struct VisitGroup<'a> {
    title: &'a str,
    visits: &'a [Visit],
}

impl<'a> VisitGroup<'a> {
    pub fn new(title: &'a str, visits: &'a [Visit]) -> Self {
        Self { title, visits }
    }

    pub fn title(&self) -> &str {
        self.title
    }

    /// Flattened rows: the header first, then one row per visit.
    pub fn rows(&self) -> Vec<VisitRow> {
        let mut rows = Vec::with_capacity(self.visits.len() + HEADER_SLOTS);
        rows.push(VisitRow::Header {
            title: self.title.to_string(),
            count: self.visits.len(),
        });
        rows.extend(
            self.visits
                .iter()
                .enumerate()
                .map(|(domain_index, visit)| VisitRow::Item {
                    domain_index,
                    date: visit.date().to_string(),
                    time: visit.time().to_string(),
                }),
        );
        rows
    }

    pub fn row_count(&self) -> usize {
        self.visits.len() + HEADER_SLOTS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, day)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn days(visits: &[Visit]) -> Vec<u32> {
        use chrono::Datelike;
        visits.iter().map(|v| v.timestamp().day()).collect()
    }

    #[test]
    fn offset_mapping_round_trips() {
        for domain in 0..5 {
            assert_eq!(to_domain_index(to_adapter_index(domain)), Some(domain));
        }
    }

    #[test]
    fn header_slot_has_no_domain_index() {
        assert_eq!(to_domain_index(0), None);
        assert_eq!(to_adapter_index(0), 1);
    }

    #[test]
    fn insert_appends_and_becomes_last() {
        let mut visits = vec![Visit::new(at(9))];
        let mut list = VisitList::new(&mut visits);
        let index = list.insert(Visit::new(at(2)));
        assert_eq!(index, 1);
        assert_eq!(list.last().unwrap().timestamp(), at(2));
    }

    #[test]
    fn move_zero_to_two_rotates() {
        let mut visits = vec![Visit::new(at(1)), Visit::new(at(2)), Visit::new(at(3))];
        VisitList::new(&mut visits).move_item(0, 2).unwrap();
        assert_eq!(days(&visits), vec![2, 3, 1]);
    }

    #[test]
    fn move_changes_which_visit_is_last() {
        let mut visits = vec![Visit::new(at(1)), Visit::new(at(2))];
        let mut list = VisitList::new(&mut visits);
        list.move_item(1, 0).unwrap();
        assert_eq!(list.last().unwrap().timestamp(), at(1));
    }

    #[test]
    fn update_replaces_whole_visit() {
        let mut visits = vec![Visit::new(at(1))];
        let old = VisitList::new(&mut visits).update(0, Visit::new(at(5))).unwrap();
        assert_eq!(old.timestamp(), at(1));
        assert_eq!(visits[0], Visit::new(at(5)));
    }

    #[test]
    fn remove_last_clears_summary() {
        let mut visits = vec![Visit::new(at(1))];
        let mut list = VisitList::new(&mut visits);
        list.remove(0).unwrap();
        assert!(list.is_empty());
        assert_eq!(list.last_summary(), None);
    }

    #[test]
    fn out_of_range_is_index_error() {
        let mut visits = vec![Visit::new(at(1))];
        let mut list = VisitList::new(&mut visits);
        assert_eq!(list.remove(1).unwrap_err(), IndexError { index: 1, len: 1 });
        assert!(list.update(3, Visit::new(at(2))).is_err());
        assert!(list.move_item(0, 1).is_err());
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn group_rows_start_with_header() {
        let visits = vec![Visit::new(at(1)), Visit::new(at(2))];
        let group = VisitGroup::new(DEFAULT_GROUP_TITLE, &visits);
        let rows = group.rows();
        assert_eq!(rows.len(), group.row_count());
        assert_eq!(
            rows[0],
            VisitRow::Header {
                title: "Visits".into(),
                count: 2
            }
        );
        match &rows[to_adapter_index(1)] {
            VisitRow::Item { domain_index, date, .. } => {
                assert_eq!(*domain_index, 1);
                assert_eq!(date, "Mar 2, 2026");
            }
            other => panic!("expected item row, got {other:?}"),
        }
    }
}
