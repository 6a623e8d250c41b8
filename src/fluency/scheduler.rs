use std::collections::HashSet;

use rand::Rng;

use super::fact::PermutationId;
use super::EngineError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Next {
    Item(PermutationId),
    /// Every item is mastered. Terminal.
    Complete,
}

/// Picks the next item to present and recycles unmastered items until each
/// one reaches threshold.
///
/// Every item is always in exactly one of `pending`, `mastered` or
/// `displayed`.
#[derive(Debug)]
pub struct SessionQueue<R> {
    all: Vec<PermutationId>,
    pending: Vec<PermutationId>,
    mastered: HashSet<PermutationId>,
    displayed: Option<PermutationId>,
    rng: R,
}

impl<R: Rng> SessionQueue<R> {
    pub fn new(items: Vec<PermutationId>, rng: R) -> Self {
        Self {
            pending: items.clone(),
            all: items,
            mastered: HashSet::new(),
            displayed: None,
            rng,
        }
    }

    pub fn next_item(&mut self) -> Next {
        // skipping an unanswered item puts it back in the pool
        if let Some(skipped) = self.displayed.take() {
            self.pending.push(skipped);
        }

        if self.pending.is_empty() {
            self.pending = self
                .all
                .iter()
                .filter(|id| !self.mastered.contains(*id))
                .cloned()
                .collect();
            if self.pending.is_empty() {
                return Next::Complete;
            }
        }

        let index = self.rng.random_range(0..self.pending.len());
        let item = self.pending.swap_remove(index);
        self.displayed = Some(item.clone());
        Next::Item(item)
    }

    /// Settles the displayed item after an answer: into `mastered` if it
    /// just reached threshold, otherwise back into the pool.
    pub fn resolve(&mut self, id: &PermutationId, mastered_now: bool) -> Result<(), EngineError> {
        match self.displayed.take() {
            Some(current) if &current == id => {
                if mastered_now {
                    self.mastered.insert(current);
                } else {
                    self.pending.push(current);
                }
                Ok(())
            }
            other => {
                self.displayed = other;
                Err(EngineError::InvariantViolation(format!(
                    "resolved {id} but displayed item is {:?}",
                    self.displayed.as_ref().map(ToString::to_string)
                )))
            }
        }
    }

    pub fn displayed(&self) -> Option<&PermutationId> {
        self.displayed.as_ref()
    }

    pub fn total(&self) -> usize {
        self.all.len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn mastered_len(&self) -> usize {
        self.mastered.len()
    }

    pub fn is_mastered(&self, id: &PermutationId) -> bool {
        self.mastered.contains(id)
    }

    pub fn is_complete(&self) -> bool {
        self.mastered.len() == self.all.len()
    }

    /// `|pending| + |mastered| + (1 if an item is displayed)`.
    pub fn len_accounted(&self) -> usize {
        self.pending.len() + self.mastered.len() + usize::from(self.displayed.is_some())
    }
}
