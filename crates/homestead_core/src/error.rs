//! Error types for the logistics engine.

use thiserror::Error;

/// Result type alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

/// Top-level error type for all engine errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Complex handle that was never allocated or has been recycled.
    #[error("Unknown complex id: {0}")]
    UnknownComplex(u32),

    /// No member registered at the given tile.
    #[error("No member at tile ({x}, {z})")]
    MemberNotFound {
        /// Tile x coordinate.
        x: u32,
        /// Tile z coordinate.
        z: u32,
    },

    /// Insufficient stock for a checked removal.
    #[error("Insufficient stock: need {required} of item {item}, have {available}")]
    InsufficientStock {
        /// Item handle index.
        item: u16,
        /// Amount required.
        required: u32,
        /// Amount available.
        available: u32,
    },

    /// Tile outside the world bounds.
    #[error("Tile ({x}, {z}) is outside the {width}x{height} map")]
    TileOutOfBounds {
        /// Tile x coordinate.
        x: u32,
        /// Tile z coordinate.
        z: u32,
        /// Map width in tiles.
        width: u32,
        /// Map height in tiles.
        height: u32,
    },

    /// Malformed save buffer.
    #[error("Corrupt save data at offset {offset}: {message}")]
    CorruptSave {
        /// Byte offset where decoding failed.
        offset: usize,
        /// What was being decoded.
        message: String,
    },

    /// Save file version mismatch.
    #[error("Unsupported save version: found {found}, expected {expected}")]
    UnsupportedSaveVersion {
        /// Version found in the file.
        found: u32,
        /// Version this build writes.
        expected: u32,
    },

    /// Definition file resolution error.
    #[error("Data error: {0}")]
    DataError(String),

    /// IO failure in the save/load file helpers.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
