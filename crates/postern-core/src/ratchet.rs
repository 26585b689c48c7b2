//! Two-generation Diffie-Hellman ratchet slots
//!
//! Each contact keeps a previous/current pair of local DH private scalars and
//! a previous/current pair of the peer's DH public values. The only way to
//! advance a pair is [`RatchetPair::rotate`], which shifts current into
//! previous and installs the new value. Older generations are dropped.

use serde::{Deserialize, Serialize};

/// A previous/current pair of ratchet values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatchetPair<T> {
    previous: Option<T>,
    current: Option<T>,
}

impl<T> Default for RatchetPair<T> {
    fn default() -> Self {
        Self {
            previous: None,
            current: None,
        }
    }
}

impl<T> RatchetPair<T> {
    /// Pair holding only a seed in the previous slot
    pub fn seeded(previous: T) -> Self {
        Self {
            previous: Some(previous),
            current: None,
        }
    }

    /// Install `next` as the current value, shifting the old current back
    ///
    /// A pair with an empty current slot keeps its previous value.
    pub fn rotate(&mut self, next: T) {
        if let Some(current) = self.current.replace(next) {
            self.previous = Some(current);
        }
    }

    pub fn previous(&self) -> Option<&T> {
        self.previous.as_ref()
    }

    pub fn current(&self) -> Option<&T> {
        self.current.as_ref()
    }

    /// Most recent value, current if set, else previous
    pub fn latest(&self) -> Option<&T> {
        self.current.as_ref().or(self.previous.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.previous.is_none() && self.current.is_none()
    }
}

impl<T: PartialEq> RatchetPair<T> {
    /// Rotate only when `next` differs from the latest value
    ///
    /// Returns whether the pair advanced.
    pub fn advance_to(&mut self, next: T) -> bool {
        if self.latest() == Some(&next) {
            return false;
        }
        self.rotate(next);
        true
    }
}
