//! Transaction record: which jigs an action read, wrote, and created.

use std::cell::RefCell;
use std::rc::Rc;

use jig_realm::ObjectId;
use tracing::debug;

#[derive(Debug, Default)]
struct RecordState {
    stack: Vec<ObjectId>,
    reads: Vec<ObjectId>,
    writes: Vec<ObjectId>,
    creates: Vec<ObjectId>,
}

fn note(set: &mut Vec<ObjectId>, id: ObjectId) {
    if !set.contains(&id) {
        set.push(id);
    }
}

/// Shared handle onto the current action's record.
///
/// Sets keep first-touch order and list each jig once.
#[derive(Debug, Clone, Default)]
pub struct Record {
    state: Rc<RefCell<RecordState>>,
}

impl Record {
    /// An empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new action, forgetting everything recorded so far.
    pub fn begin(&self) {
        let mut state = self.state.borrow_mut();
        state.reads.clear();
        state.writes.clear();
        state.creates.clear();
    }

    /// Enter a method of `jig`.
    pub fn push(&self, jig: ObjectId) {
        self.state.borrow_mut().stack.push(jig);
    }

    /// Leave the innermost method.
    pub fn pop(&self) -> Option<ObjectId> {
        self.state.borrow_mut().stack.pop()
    }

    /// Depth of the method call stack.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.state.borrow().stack.len()
    }

    /// The jig whose method is running, if any.
    #[must_use]
    pub fn current(&self) -> Option<ObjectId> {
        self.state.borrow().stack.last().copied()
    }

    /// Note a read of `jig`. Ignored outside methods.
    pub fn read(&self, jig: ObjectId) {
        let mut state = self.state.borrow_mut();
        if !state.stack.is_empty() {
            note(&mut state.reads, jig);
        }
    }

    /// Note a write to `jig`. Ignored outside methods.
    pub fn write(&self, jig: ObjectId) {
        let mut state = self.state.borrow_mut();
        if !state.stack.is_empty() {
            note(&mut state.writes, jig);
        }
    }

    /// Note that `jig` was created by the current action.
    pub fn create(&self, jig: ObjectId) {
        note(&mut self.state.borrow_mut().creates, jig);
    }

    /// Jigs read, in first-touch order.
    #[must_use]
    pub fn reads(&self) -> Vec<ObjectId> {
        self.state.borrow().reads.clone()
    }

    /// Jigs written, in first-touch order.
    #[must_use]
    pub fn writes(&self) -> Vec<ObjectId> {
        self.state.borrow().writes.clone()
    }

    /// Jigs created, in creation order.
    #[must_use]
    pub fn creates(&self) -> Vec<ObjectId> {
        self.state.borrow().creates.clone()
    }

    /// Discard the current action entirely, including any open frames.
    pub fn rollback(&self) {
        let mut state = self.state.borrow_mut();
        debug!(
            reads = state.reads.len(),
            writes = state.writes.len(),
            creates = state.creates.len(),
            "record rolled back"
        );
        *state = RecordState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_and_writes_only_count_inside_methods() {
        let record = Record::new();
        let jig = ObjectId::new(1);
        record.read(jig);
        record.write(jig);
        assert!(record.reads().is_empty());

        record.push(jig);
        record.read(jig);
        record.read(jig);
        record.write(ObjectId::new(2));
        assert_eq!(record.pop(), Some(jig));
        assert_eq!(record.reads(), vec![jig]);
        assert_eq!(record.writes(), vec![ObjectId::new(2)]);
    }

    #[test]
    fn test_begin_and_rollback() {
        let record = Record::new();
        record.push(ObjectId::new(1));
        record.create(ObjectId::new(3));
        record.begin();
        assert!(record.creates().is_empty());
        assert_eq!(record.depth(), 1);
        record.rollback();
        assert_eq!(record.depth(), 0);
    }
}
