//! Error types for pattern operations.

use thiserror::Error;

/// Result type for pattern operations.
pub type PatternResult<T> = Result<T, PatternError>;

/// Errors that can occur in pattern operations.
#[derive(Debug, Error)]
pub enum PatternError {
    /// Grid access outside the pattern dimensions.
    #[error("Cell ({x}, {y}) is outside the {width}x{height} grid")]
    OutOfBounds {
        /// Requested column.
        x: usize,
        /// Requested row.
        y: usize,
        /// Grid width.
        width: usize,
        /// Grid height.
        height: usize,
    },

    /// Wedge operation referencing an index outside `[0, 12)`.
    #[error("Invalid wedge index: {0}")]
    InvalidWedgeIndex(usize),

    /// Pattern dimensions or ball geometry are not allowed.
    #[error("Invalid dimensions: {0}")]
    InvalidDimensions(String),

    /// A color index does not reference a palette entry.
    #[error("Color index {index} is outside the palette of {palette_len} colors")]
    InvalidColorIndex {
        /// Offending index.
        index: u8,
        /// Current palette length.
        palette_len: usize,
    },

    /// Stringing positions are 1-based; zero is never valid.
    #[error("Invalid stringing position: {0}")]
    InvalidPosition(usize),

    /// Interchange input could not be understood.
    #[error("Malformed interchange data: {0}")]
    MalformedInterchange(String),

    /// Pattern document serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PatternError {
    /// Build a [`PatternError::MalformedInterchange`] from any message.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedInterchange(msg.into())
    }

    /// Build a [`PatternError::InvalidDimensions`] from any message.
    pub fn dimensions(msg: impl Into<String>) -> Self {
        Self::InvalidDimensions(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_bounds_message_names_cell() {
        let err = PatternError::OutOfBounds {
            x: 9,
            y: 2,
            width: 8,
            height: 4,
        };
        assert_eq!(err.to_string(), "Cell (9, 2) is outside the 8x4 grid");
    }

    #[test]
    fn test_malformed_prefix_is_stable() {
        assert!(PatternError::malformed("missing model")
            .to_string()
            .starts_with("Malformed interchange data:"));
    }
}
