//! Per-buffer usage trace.
//!
//! A fixed-size ring of (subsystem, operation) pairs. When a bounds error
//! fires, the dump shows which layers touched the buffer last.

use std::fmt::Write as _;

use peerbuf_core::tag::{Operation, Subsystem};

#[derive(Debug, Clone)]
pub struct UsageTrace {
    depth: usize,
    entries: Vec<(Subsystem, Operation)>,
    next: usize,
}

impl UsageTrace {
    pub fn new(depth: usize) -> Self {
        let depth = depth.max(1);
        Self {
            depth,
            entries: Vec::with_capacity(depth),
            next: 0,
        }
    }

    pub fn record(&mut self, subsystem: Subsystem, op: Operation) {
        if self.entries.len() < self.depth {
            self.entries.push((subsystem, op));
        } else if let Some(slot) = self.entries.get_mut(self.next) {
            *slot = (subsystem, op);
        }
        self.next = (self.next + 1) % self.depth;
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Oldest entry first.
    pub fn iter(&self) -> impl Iterator<Item = (Subsystem, Operation)> + '_ {
        let split = self.next.min(self.entries.len());
        let (newer, older) = self.entries.split_at(split);
        older.iter().chain(newer.iter()).copied()
    }

    /// `SS:op` pairs, oldest first, space separated.
    pub fn dump(&self) -> String {
        let mut out = String::with_capacity(self.entries.len() * 8);
        for (i, (ss, op)) in self.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            let _ = write!(out, "{ss}:{op}");
        }
        out
    }
}
