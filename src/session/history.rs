// ABOUTME: Bounded buffer of the most recently entered command lines.
// ABOUTME: Evicts the oldest entry once capacity is reached.

use std::collections::VecDeque;
use std::fmt::Write;

/// Number of commands a session remembers.
pub const HISTORY_CAPACITY: usize = 5;

#[derive(Debug, Clone)]
pub struct CommandHistory {
    entries: VecDeque<String>,
    capacity: usize,
}

impl Default for CommandHistory {
    fn default() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }
}

impl CommandHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a command, dropping the oldest one when full.
    pub fn record(&mut self, line: impl Into<String>) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(line.into());
    }

    /// Entries, most recent first.
    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().rev().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render as a numbered list, most recent first.
    pub fn display(&self) -> String {
        let mut out = String::from("User cmd history:\n");
        for (i, entry) in self.entries().enumerate() {
            let _ = writeln!(out, "({}) {}", i + 1, entry);
        }
        out
    }
}
