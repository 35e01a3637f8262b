//! Dense ordering over a user-reorderable list.
//!
//! Moves only reorder the in-memory list. Stored positions are rewritten in
//! a single pass when a reorder session ends; until then a freshly inserted
//! element goes after the highest stored position.

use crate::error::IndexError;
use crate::model::Place;

pub trait Positioned {
    fn position(&self) -> u32;
    fn set_position(&mut self, position: u32);
}

impl Positioned for Place {
    fn position(&self) -> u32 {
        self.position
    }

    fn set_position(&mut self, position: u32) {
        self.position = position;
    }
}

/// Removes the element at `from` and reinserts it at `to`.
pub fn move_item<T>(list: &mut Vec<T>, from: usize, to: usize) -> Result<(), IndexError> {
    IndexError::check(from, list.len())?;
    IndexError::check(to, list.len())?;
    if from != to {
        let item = list.remove(from);
        list.insert(to, item);
    }
    Ok(())
}

/// Rewrites `position = index` where they disagree and returns the changed
/// elements, ready to be written back as one batch.
pub fn pending_position_updates<T: Positioned + Clone>(list: &mut [T]) -> Vec<T> {
    let mut changed = Vec::new();
    for (index, item) in list.iter_mut().enumerate() {
        let index = to_position(index);
        if item.position() != index {
            item.set_position(index);
            changed.push(item.clone());
        }
    }
    changed
}

/// Position for an element appended to `list`. Deletes leave gaps, so this
/// is one past the highest position rather than the length.
pub fn next_position<T: Positioned>(list: &[T]) -> u32 {
    list.iter()
        .map(|item| item.position().saturating_add(1))
        .max()
        .unwrap_or(0)
}

pub fn is_dense<T: Positioned>(list: &[T]) -> bool {
    list.iter()
        .enumerate()
        .all(|(index, item)| item.position() == to_position(index))
}

fn to_position(index: usize) -> u32 {
    u32::try_from(index).unwrap_or(u32::MAX)
}
