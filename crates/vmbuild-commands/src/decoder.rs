//! Batch decoding of self-describing instruction records
//!
//! Each record is a JSON object carrying at least `OriginalCommand`. The
//! leading token of that text selects the decoder from the registry:
//! - unknown directive: skipped with a warning, decoding continues
//! - known directive, fields do not fit: the whole batch fails

use crate::directive::{directive_token, DirectiveRegistry};
use crate::error::DecodeError;
use crate::instruction::BuildInstruction;
use crate::queue::InstructionQueue;
use serde_json::Value;

/// Field holding the original instruction text
pub const ORIGINAL_COMMAND_FIELD: &str = "OriginalCommand";

/// Decoder for instruction batches
#[derive(Debug, Clone)]
pub struct InstructionDecoder {
    registry: DirectiveRegistry,
}

impl InstructionDecoder {
    /// Create decoder over a registry
    #[inline]
    #[must_use]
    pub fn new(registry: DirectiveRegistry) -> Self {
        Self { registry }
    }

    /// Get the registry
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &DirectiveRegistry {
        &self.registry
    }

    /// Decode a batch into a FIFO queue, preserving input order
    ///
    /// # Errors
    /// Returns the first fatal [`DecodeError`]; nothing is queued in that case
    pub fn decode_batch<S: AsRef<str>>(&self, records: &[S]) -> Result<InstructionQueue, DecodeError> {
        let mut queue = InstructionQueue::new();
        for (index, record) in records.iter().enumerate() {
            if let Some(instruction) = self.decode_record(index, record.as_ref())? {
                queue.push(instruction);
            }
        }
        tracing::debug!("Decoded {} of {} instruction records", queue.len(), records.len());
        Ok(queue)
    }

    /// Decode one record
    ///
    /// Returns `Ok(None)` when the record is skipped.
    ///
    /// # Errors
    /// Returns [`DecodeError`] for invalid JSON, non-object records, or
    /// known directives whose fields fail to map
    pub fn decode_record(&self, index: usize, record: &str) -> Result<Option<BuildInstruction>, DecodeError> {
        let value: Value = serde_json::from_str(record)
            .map_err(|source| DecodeError::InvalidRecord { index, source })?;

        let Some(object) = value.as_object() else {
            return Err(DecodeError::NotAnObject { index });
        };

        let Some(original_command) = object.get(ORIGINAL_COMMAND_FIELD).and_then(Value::as_str) else {
            tracing::warn!("Skipping record {} without {}", index, ORIGINAL_COMMAND_FIELD);
            return Ok(None);
        };
        let original_command = original_command.to_string();

        let token = directive_token(&original_command).unwrap_or_default();
        let Some(decode) = self.registry.lookup(token) else {
            tracing::warn!("Skipping record {} with unknown directive: {:?}", index, original_command);
            return Ok(None);
        };

        decode(value)
            .map(Some)
            .map_err(|source| DecodeError::Malformed {
                index,
                directive: token.to_ascii_uppercase(),
                original_command: original_command.clone(),
                source,
            })
    }
}

impl Default for InstructionDecoder {
    fn default() -> Self {
        Self::new(DirectiveRegistry::with_defaults())
    }
}
