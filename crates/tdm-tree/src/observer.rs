//! Change notifications for views.
//!
//! Every structural mutation is announced as an intent event followed by a
//! completion event. Observers receive only addresses, never the tree, so they
//! cannot query rows while a change is in flight.

#![allow(missing_docs)]

use std::cell::RefCell;
use std::rc::Rc;

use drop_bomb::DropBomb;
use tracing::debug;

use crate::address::ModelIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeEvent {
    StructureWillChange {
        parent: ModelIndex,
        first: usize,
        last: usize,
        kind: ChangeKind,
    },
    StructureChanged,
    DataChanged(ModelIndex),
}

pub trait TreeObserver {
    /// Rows `first..=last` under `parent` are about to be inserted or removed.
    fn structure_will_change(
        &mut self,
        parent: &ModelIndex,
        first: usize,
        last: usize,
        kind: ChangeKind,
    );

    /// The change announced by the last intent event is complete.
    fn structure_changed(&mut self);

    fn data_changed(&mut self, index: &ModelIndex);
}

/// Observer that records every event into a shared list.
///
/// Clones share the list, so a test can keep one handle and subscribe another.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Rc<RefCell<Vec<TreeEvent>>>,
}

impl EventLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<TreeEvent> {
        self.events.borrow().clone()
    }

    pub fn take(&self) -> Vec<TreeEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }

    fn push(&self, event: TreeEvent) {
        self.events.borrow_mut().push(event);
    }
}

impl TreeObserver for EventLog {
    fn structure_will_change(
        &mut self,
        parent: &ModelIndex,
        first: usize,
        last: usize,
        kind: ChangeKind,
    ) {
        self.push(TreeEvent::StructureWillChange {
            parent: *parent,
            first,
            last,
            kind,
        });
    }

    fn structure_changed(&mut self) {
        self.push(TreeEvent::StructureChanged);
    }

    fn data_changed(&mut self, index: &ModelIndex) {
        self.push(TreeEvent::DataChanged(*index));
    }
}

/// Open intent bracket; must be handed back to [`Notifier::end`].
pub(crate) struct PendingChange {
    bomb: DropBomb,
}

/// Fan-out of events to subscribed observers.
#[derive(Default)]
pub(crate) struct Notifier {
    observers: Vec<Box<dyn TreeObserver>>,
    open: bool,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("observers", &self.observers.len())
            .field("open", &self.open)
            .finish()
    }
}

impl Notifier {
    pub(crate) fn subscribe(&mut self, observer: Box<dyn TreeObserver>) {
        self.observers.push(observer);
    }

    pub(crate) fn begin(
        &mut self,
        parent: &ModelIndex,
        first: usize,
        last: usize,
        kind: ChangeKind,
    ) -> PendingChange {
        debug_assert!(!self.open, "nested structural change");
        debug!(?kind, first, last, parent_valid = parent.is_valid(), "structure will change");
        self.open = true;
        for observer in &mut self.observers {
            observer.structure_will_change(parent, first, last, kind);
        }
        PendingChange {
            bomb: DropBomb::new("structural change never completed"),
        }
    }

    pub(crate) fn end(&mut self, mut change: PendingChange) {
        change.bomb.defuse();
        self.open = false;
        for observer in &mut self.observers {
            observer.structure_changed();
        }
    }

    pub(crate) fn data_changed(&mut self, index: &ModelIndex) {
        debug_assert!(!self.open, "data change inside a structural change");
        for observer in &mut self.observers {
            observer.data_changed(index);
        }
    }
}
