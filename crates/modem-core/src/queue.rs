//! Two-level FIFO of pending commands

use std::collections::VecDeque;

use crate::command::QueueItem;

/// Pending commands and sequences
///
/// Priority items always dequeue before normal ones; each level is FIFO.
#[derive(Debug, Default)]
pub struct CommandQueue {
    priority: VecDeque<QueueItem>,
    normal: VecDeque<QueueItem>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: QueueItem, priority: bool) {
        if priority {
            self.priority.push_back(item);
        } else {
            self.normal.push_back(item);
        }
    }

    pub fn pop(&mut self) -> Option<QueueItem> {
        self.priority.pop_front().or_else(|| self.normal.pop_front())
    }

    pub fn len(&self) -> usize {
        self.priority.len() + self.normal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove everything, priority items first
    pub fn drain(&mut self) -> Vec<QueueItem> {
        self.priority.drain(..).chain(self.normal.drain(..)).collect()
    }
}
