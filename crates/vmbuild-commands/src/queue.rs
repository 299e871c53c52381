//! FIFO queue of decoded instructions

use crate::instruction::BuildInstruction;
use std::collections::VecDeque;

/// Ordered queue drained strictly front-to-back
///
/// Draining an empty queue yields `None` rather than failing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstructionQueue {
    items: VecDeque<BuildInstruction>,
}

impl InstructionQueue {
    /// Create empty queue
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append at the back
    #[inline]
    pub fn push(&mut self, instruction: BuildInstruction) {
        self.items.push_back(instruction);
    }

    /// Number of queued instructions
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if queue is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Iterator for InstructionQueue {
    type Item = BuildInstruction;

    fn next(&mut self) -> Option<Self::Item> {
        self.items.pop_front()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.items.len(), Some(self.items.len()))
    }
}

impl FromIterator<BuildInstruction> for InstructionQueue {
    fn from_iter<I: IntoIterator<Item = BuildInstruction>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}
