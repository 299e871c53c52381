//! Error types for instruction decoding

/// Fatal batch decode errors
///
/// Unknown directives are not errors; the decoder skips them.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Record is not valid JSON
    #[error("record {index} is not valid JSON: {source}")]
    InvalidRecord {
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    /// Record is JSON but not an object
    #[error("record {index} is not an object")]
    NotAnObject { index: usize },

    /// Known directive whose fields do not fit the instruction
    #[error("found {directive} in record {index} ({original_command:?}) but did not deserialize: {source}")]
    Malformed {
        index: usize,
        directive: String,
        original_command: String,
        #[source]
        source: serde_json::Error,
    },
}

impl DecodeError {
    /// Index of the offending record within its batch
    #[inline]
    #[must_use]
    pub fn record_index(&self) -> usize {
        match self {
            Self::InvalidRecord { index, .. }
            | Self::NotAnObject { index }
            | Self::Malformed { index, .. } => *index,
        }
    }
}
