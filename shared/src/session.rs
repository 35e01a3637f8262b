//! Edit-session state for a reorderable list.
//!
//! `Viewing` is the resting state. `Reordering` shows drag handles and is the
//! only state in which moves are accepted; leaving it asks the caller to
//! commit the new order exactly once. Swipe-to-delete works in both states
//! but is staged until the user confirms or declines.

use thiserror::Error;

use crate::error::IndexError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EditState {
    #[default]
    Viewing,
    Reordering,
}

/// What the caller must do after `finish`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Commit {
    Required,
    Nothing,
}

impl Commit {
    pub fn is_required(self) -> bool {
        self == Commit::Required
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// Declined: the item is back at `index`, nothing else changed.
    Restored { index: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("list is not in reorder mode")]
    NotReordering,

    #[error("a delete is already awaiting confirmation")]
    DeletePending,

    #[error("no delete is awaiting confirmation")]
    NoPendingDelete,

    #[error(transparent)]
    Index(#[from] IndexError),
}

#[derive(Debug)]
struct PendingDelete<T> {
    index: usize,
    item: T,
}

#[derive(Debug)]
pub struct EditSession<T> {
    state: EditState,
    pending_delete: Option<PendingDelete<T>>,
}

impl<T> Default for EditSession<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EditSession<T> {
    pub fn new() -> Self {
        Self {
            state: EditState::Viewing,
            pending_delete: None,
        }
    }

    pub fn state(&self) -> EditState {
        self.state
    }

    /// Whether drag handles are shown.
    pub fn is_reordering(&self) -> bool {
        self.state == EditState::Reordering
    }

    /// Viewing -> Reordering. Returns `false` if already reordering.
    pub fn begin(&mut self) -> bool {
        if self.is_reordering() {
            return false;
        }
        self.state = EditState::Reordering;
        true
    }

    /// Reordering -> Viewing.
    pub fn finish(&mut self) -> Commit {
        if !self.is_reordering() {
            return Commit::Nothing;
        }
        self.state = EditState::Viewing;
        Commit::Required
    }

    pub fn require_reordering(&self) -> Result<(), SessionError> {
        if self.is_reordering() {
            Ok(())
        } else {
            Err(SessionError::NotReordering)
        }
    }

    pub fn has_pending_delete(&self) -> bool {
        self.pending_delete.is_some()
    }

    /// The staged item and the index it was swiped from.
    pub fn pending(&self) -> Option<(usize, &T)> {
        self.pending_delete
            .as_ref()
            .map(|pending| (pending.index, &pending.item))
    }

    /// Takes the swiped row out of the visible list until confirmed.
    pub fn stage_delete(&mut self, list: &mut Vec<T>, index: usize) -> Result<&T, SessionError> {
        if self.pending_delete.is_some() {
            return Err(SessionError::DeletePending);
        }
        IndexError::check(index, list.len())?;
        let item = list.remove(index);
        let pending = self.pending_delete.insert(PendingDelete { index, item });
        Ok(&pending.item)
    }

    /// Hands back the staged item; the caller commits the structural delete.
    pub fn confirm_delete(&mut self) -> Result<T, SessionError> {
        self.pending_delete
            .take()
            .map(|pending| pending.item)
            .ok_or(SessionError::NoPendingDelete)
    }

    /// Puts the staged item back where it was.
    pub fn decline_delete(&mut self, list: &mut Vec<T>) -> Result<DeleteOutcome, SessionError> {
        let pending = self
            .pending_delete
            .take()
            .ok_or(SessionError::NoPendingDelete)?;
        let index = pending.index.min(list.len());
        list.insert(index, pending.item);
        Ok(DeleteOutcome::Restored { index })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_viewing() {
        let session = EditSession::<u8>::new();
        assert_eq!(session.state(), EditState::Viewing);
        assert!(!session.is_reordering());
        assert_eq!(session.require_reordering(), Err(SessionError::NotReordering));
    }

    #[test]
    fn finish_requires_commit_once() {
        let mut session = EditSession::<u8>::new();
        assert!(session.begin());
        assert!(!session.begin());
        assert!(session.require_reordering().is_ok());
        assert_eq!(session.finish(), Commit::Required);
        assert_eq!(session.finish(), Commit::Nothing);
        assert_eq!(session.state(), EditState::Viewing);
    }

    #[test]
    fn declined_delete_restores_position() {
        let mut session = EditSession::new();
        let mut list = vec!['a', 'b', 'c'];
        assert_eq!(*session.stage_delete(&mut list, 1).unwrap(), 'b');
        assert_eq!(list, vec!['a', 'c']);
        assert_eq!(session.pending(), Some((1, &'b')));

        let outcome = session.decline_delete(&mut list).unwrap();
        assert_eq!(outcome, DeleteOutcome::Restored { index: 1 });
        assert_eq!(list, vec!['a', 'b', 'c']);
        assert!(!session.has_pending_delete());
    }

    #[test]
    fn confirmed_delete_returns_item() {
        let mut session = EditSession::new();
        let mut list = vec!['a', 'b'];
        session.stage_delete(&mut list, 0).unwrap();
        assert_eq!(session.confirm_delete().unwrap(), 'a');
        assert_eq!(list, vec!['b']);
        assert_eq!(session.confirm_delete(), Err(SessionError::NoPendingDelete));
    }

    #[test]
    fn delete_is_allowed_while_reordering() {
        let mut session = EditSession::new();
        session.begin();
        let mut list = vec![1, 2];
        assert!(session.stage_delete(&mut list, 1).is_ok());
    }

    #[test]
    fn second_swipe_waits_for_first() {
        let mut session = EditSession::new();
        let mut list = vec![1, 2, 3];
        session.stage_delete(&mut list, 0).unwrap();
        assert_eq!(
            session.stage_delete(&mut list, 0).unwrap_err(),
            SessionError::DeletePending
        );
    }

    #[test]
    fn out_of_range_swipe_is_index_error() {
        let mut session = EditSession::new();
        let mut list = vec![1];
        assert_eq!(
            session.stage_delete(&mut list, 4).unwrap_err(),
            SessionError::Index(IndexError { index: 4, len: 1 })
        );
        assert!(!session.has_pending_delete());
    }

    #[test]
    fn decline_without_pending_is_error() {
        let mut session = EditSession::<u8>::new();
        assert_eq!(
            session.decline_delete(&mut Vec::new()),
            Err(SessionError::NoPendingDelete)
        );
    }
}
