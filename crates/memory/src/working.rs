/// In-process ring buffer holding the most recent interactions.
use std::collections::VecDeque;

use tokio::sync::RwLock;

use crate::types::WorkingEntry;

pub struct WorkingMemory {
    entries: RwLock<VecDeque<WorkingEntry>>,
    capacity: usize,
}

impl WorkingMemory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Push an entry, returning the one that fell off the front if the
    /// buffer was full.
    pub async fn push(&self, entry: WorkingEntry) -> Option<WorkingEntry> {
        let mut entries = self.entries.write().await;
        entries.push_back(entry);
        if entries.len() > self.capacity {
            entries.pop_front()
        } else {
            None
        }
    }

    /// Copy of the current contents, oldest first.
    pub async fn snapshot(&self) -> Vec<WorkingEntry> {
        self.entries.read().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
