//! Capture store: one slot per pose, addressed by ordinal.

use crate::types::EncodedImage;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("slot {ordinal} out of range (store has {len} slots)")]
    OutOfRange { ordinal: usize, len: usize },
}

/// Fixed-length, index-addressable collection of capture slots.
///
/// Progress is always recomputed from slot contents; there is no cached
/// counter to fall out of sync.
#[derive(Debug, Clone)]
pub struct CaptureStore {
    slots: Vec<Option<EncodedImage>>,
}

impl CaptureStore {
    /// Create a store with `total` empty slots.
    pub fn new(total: usize) -> Self {
        Self {
            slots: vec![None; total],
        }
    }

    pub fn total(&self) -> usize {
        self.slots.len()
    }

    /// Number of non-empty slots.
    pub fn completed_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.completed_count() == self.total()
    }

    pub fn slot_at(&self, ordinal: usize) -> Result<Option<&EncodedImage>, StoreError> {
        self.check(ordinal)?;
        Ok(self.slots[ordinal].as_ref())
    }

    /// Store `image` at `ordinal`, returning whatever was there before.
    pub fn set_slot(
        &mut self,
        ordinal: usize,
        image: EncodedImage,
    ) -> Result<Option<EncodedImage>, StoreError> {
        self.check(ordinal)?;
        Ok(self.slots[ordinal].replace(image))
    }

    /// Empty the slot at `ordinal`, returning the previous image.
    pub fn clear_slot(&mut self, ordinal: usize) -> Result<Option<EncodedImage>, StoreError> {
        self.check(ordinal)?;
        Ok(self.slots[ordinal].take())
    }

    pub fn clear_all(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
    }

    /// Ordinals that still need an image, ascending.
    pub fn remaining(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_none())
            .map(|(i, _)| i)
            .collect()
    }

    /// First empty slot after `ordinal`, wrapping around to the start.
    pub fn next_empty_after(&self, ordinal: usize) -> Option<usize> {
        let n = self.total();
        (1..=n)
            .map(|step| (ordinal + step) % n)
            .find(|&i| self.slots[i].is_none())
    }

    /// All images in ordinal order, or `None` if any slot is empty.
    pub fn images(&self) -> Option<Vec<&EncodedImage>> {
        self.slots.iter().map(|s| s.as_ref()).collect()
    }

    fn check(&self, ordinal: usize) -> Result<(), StoreError> {
        if ordinal < self.slots.len() {
            Ok(())
        } else {
            Err(StoreError::OutOfRange {
                ordinal,
                len: self.slots.len(),
            })
        }
    }
}
