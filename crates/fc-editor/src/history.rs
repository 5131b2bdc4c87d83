//! Bounded undo/redo over whole-value snapshots.
//!
//! Every recorded step stores the previous value in full. Changes are
//! detected by comparing the MessagePack encoding of the candidate against
//! the current value, so pushing an equal value is a no-op and never clears
//! the redo stack.

use serde::Serialize;
use std::collections::VecDeque;

pub const DEFAULT_MAX_HISTORY: usize = 50;

pub struct History<T> {
    current: T,
    /// Encoding of `current`, if it could be serialized.
    fingerprint: Option<Vec<u8>>,
    /// Oldest first.
    past: VecDeque<T>,
    /// Most recently undone last.
    future: Vec<T>,
    max_history: usize,
}

fn fingerprint<T: Serialize>(value: &T) -> Option<Vec<u8>> {
    match rmp_serde::to_vec(value) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            log::warn!("history snapshot could not be encoded: {e}");
            None
        }
    }
}

impl<T: Clone + Serialize> History<T> {
    pub fn new(initial: T, max_history: usize) -> Self {
        Self {
            fingerprint: fingerprint(&initial),
            current: initial,
            past: VecDeque::new(),
            future: Vec::new(),
            max_history,
        }
    }

    pub fn current(&self) -> &T {
        &self.current
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    /// Record `next` as the new current value. Returns `false` (and changes
    /// nothing) when it is structurally equal to the current value.
    pub fn update(&mut self, next: T) -> bool {
        let next_fingerprint = fingerprint(&next);
        if next_fingerprint.is_some() && next_fingerprint == self.fingerprint {
            return false;
        }

        let previous = std::mem::replace(&mut self.current, next);
        self.fingerprint = next_fingerprint;
        self.past.push_back(previous);
        while self.past.len() > self.max_history {
            self.past.pop_front();
        }
        self.future.clear();
        true
    }

    /// Like [`update`](Self::update), deriving the next value from the
    /// current one.
    pub fn update_with(&mut self, f: impl FnOnce(&T) -> T) -> bool {
        let next = f(&self.current);
        self.update(next)
    }

    /// Step back. Returns `false` when there is nothing to undo.
    pub fn undo(&mut self) -> bool {
        let Some(previous) = self.past.pop_back() else {
            return false;
        };
        let undone = std::mem::replace(&mut self.current, previous);
        self.fingerprint = fingerprint(&self.current);
        self.future.push(undone);
        true
    }

    /// Step forward. Returns `false` when there is nothing to redo.
    pub fn redo(&mut self) -> bool {
        let Some(next) = self.future.pop() else {
            return false;
        };
        let redone = std::mem::replace(&mut self.current, next);
        self.fingerprint = fingerprint(&self.current);
        self.past.push_back(redone);
        true
    }

    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    pub fn past_len(&self) -> usize {
        self.past.len()
    }

    pub fn future_len(&self) -> usize {
        self.future.len()
    }

    /// Replace the current value and forget all history.
    pub fn reset(&mut self, value: T) {
        self.fingerprint = fingerprint(&value);
        self.current = value;
        self.clear_history();
    }

    /// Forget all history, keeping the current value.
    pub fn clear_history(&mut self) {
        self.past.clear();
        self.future.clear();
    }
}
