use image::Rgb;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::canvas::{AlphaMask, PixelBuffer};

// ============================================================================
// DOCUMENT SNAPSHOT: immutable, structurally shared document state
// ============================================================================

/// Committed document state. Buffers are reference counted so consecutive
/// entries that did not touch a buffer share the same allocation; a fill
/// toggle, for instance, costs no pixel memory at all.
#[derive(Clone, Debug)]
pub struct DocumentSnapshot {
    pub original: Arc<PixelBuffer>,
    pub alpha: Arc<AlphaMask>,
    pub fill_color: Option<Rgb<u8>>,
}

impl DocumentSnapshot {
    pub fn dimensions(&self) -> (u32, u32) {
        self.original.dimensions()
    }

    /// Bytes held by this snapshot that are not shared with `prev`.
    fn unique_bytes(&self, prev: Option<&DocumentSnapshot>) -> usize {
        let mut bytes = 0;
        if prev.is_none_or(|p| !Arc::ptr_eq(&p.original, &self.original)) {
            bytes += self.original.as_raw().len();
        }
        if prev.is_none_or(|p| !Arc::ptr_eq(&p.alpha, &self.alpha)) {
            bytes += self.alpha.as_raw().len();
        }
        bytes
    }
}

#[derive(Clone, Debug)]
pub struct HistoryEntry {
    pub description: String,
    pub snapshot: DocumentSnapshot,
}

// ============================================================================
// HISTORY MANAGER: linear timeline with a cursor and memory limits
// ============================================================================

/// Linear undo/redo timeline. `entries[cursor]` is always the state the
/// document currently shows; the timeline is never empty.
pub struct HistoryManager {
    entries: VecDeque<HistoryEntry>,
    cursor: usize,
    max_history_size: usize,
    /// Optional memory cap in bytes.
    max_memory_bytes: Option<usize>,
}

impl HistoryManager {
    pub const DEFAULT_MAX_STEPS: usize = 20;
    pub const DEFAULT_MAX_MEMORY: usize = 512 * 1024 * 1024;

    /// Start a timeline at `initial` (cursor 0).
    pub fn new(initial: DocumentSnapshot, description: impl Into<String>) -> Self {
        Self::with_limits(
            initial,
            description,
            Self::DEFAULT_MAX_STEPS,
            Some(Self::DEFAULT_MAX_MEMORY),
        )
    }

    pub fn with_limits(
        initial: DocumentSnapshot,
        description: impl Into<String>,
        max_history_size: usize,
        max_memory_bytes: Option<usize>,
    ) -> Self {
        let mut entries = VecDeque::new();
        entries.push_back(HistoryEntry {
            description: description.into(),
            snapshot: initial,
        });
        Self {
            entries,
            cursor: 0,
            max_history_size: max_history_size.max(1),
            max_memory_bytes,
        }
    }

    /// Append a new state after the cursor. Any redo entries are dropped
    /// first; the cursor ends on the new entry.
    pub fn commit(&mut self, description: impl Into<String>, snapshot: DocumentSnapshot) {
        self.entries.truncate(self.cursor + 1);
        self.entries.push_back(HistoryEntry {
            description: description.into(),
            snapshot,
        });
        self.cursor = self.entries.len() - 1;
        self.prune();
    }

    /// Step back. Returns the description of the undone action and the
    /// snapshot to adopt, or `None` at the start of the timeline.
    pub fn undo(&mut self) -> Option<(String, DocumentSnapshot)> {
        if self.cursor == 0 {
            return None;
        }
        let undone = self.entries[self.cursor].description.clone();
        self.cursor -= 1;
        Some((undone, self.entries[self.cursor].snapshot.clone()))
    }

    /// Step forward. Returns the description of the redone action and the
    /// snapshot to adopt, or `None` at the end of the timeline.
    pub fn redo(&mut self) -> Option<(String, DocumentSnapshot)> {
        if self.cursor + 1 >= self.entries.len() {
            return None;
        }
        self.cursor += 1;
        let entry = &self.entries[self.cursor];
        Some((entry.description.clone(), entry.snapshot.clone()))
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn current(&self) -> &HistoryEntry {
        &self.entries[self.cursor]
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.can_undo()
            .then(|| self.entries[self.cursor].description.as_str())
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.entries.get(self.cursor + 1).map(|e| e.description.as_str())
    }

    /// All descriptions up to the cursor, most recent first.
    pub fn undo_history(&self) -> Vec<String> {
        self.entries
            .iter()
            .take(self.cursor + 1)
            .rev()
            .map(|e| e.description.clone())
            .collect()
    }

    /// Pixel bytes held by the timeline, counting shared buffers once.
    pub fn memory_usage(&self) -> usize {
        let mut total = 0;
        let mut prev: Option<&DocumentSnapshot> = None;
        for entry in &self.entries {
            total += entry.snapshot.unique_bytes(prev);
            prev = Some(&entry.snapshot);
        }
        total
    }

    /// Drop the oldest entries to stay within limits. The entry under the
    /// cursor is never removed.
    fn prune(&mut self) {
        // Prune by count
        while self.entries.len() > self.max_history_size && self.cursor > 0 {
            self.entries.pop_front();
            self.cursor -= 1;
        }

        // Prune by memory if limit is set
        if let Some(max_bytes) = self.max_memory_bytes {
            while self.cursor > 0 && self.memory_usage() > max_bytes {
                self.entries.pop_front();
                self.cursor -= 1;
            }
        }
    }
}
