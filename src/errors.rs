use crate::format::ControlType;
use std::io;

/// The encoder ran out of room in one of the scene-wide structures.
///
/// These are recoverable: a caller can retry with a larger `direct_slots`
/// or `index_bits` setting, or split the scene into smaller ones.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapacityError {
    #[error("tile parameter {param:#x} exceeds the {max:#x} parameter limit")]
    Parameter { param: u32, max: u32 },

    #[error("dictionary needs {required} operation slots but only {available} are addressable")]
    Dictionary { required: usize, available: usize },

    #[error("invalid dictionary layout: {direct} direct slots with {index_bits} bit indices")]
    Layout { direct: usize, index_bits: u32 },
}

/// Possible errors that arise while compressing a scene
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error(transparent)]
    Capacity(#[from] CapacityError),

    #[error("frame {frame} has {found} pixels, expected {expected}")]
    FrameSize {
        frame: usize,
        expected: usize,
        found: usize,
    },

    #[error("scene dimensions {0}x{1} are not a whole number of tiles")]
    Dimensions(usize, usize),

    #[error("no frames were added to the scene")]
    NoFrames,

    #[error("{ty} operation {param:#x} was never added to the sequencer")]
    Unregistered { ty: ControlType, param: u32 },

    #[error("color set {0} has no window in the palette buffer")]
    MissingPalette(String),

    #[error("{0}")]
    Io(#[from] io::Error),
}

/// Possible errors that arise from a malformed dictionary, palette buffer, or frame stream
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("dictionary index {index} is out of range ({len} words)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("long offset chain exceeded {0} hops")]
    ChainTooLong(usize),

    #[error("reserved control type {0} in dictionary word")]
    ReservedType(u8),

    #[error("repeat-previous word at the start of tile row {row}")]
    RepeatAtRowStart { row: usize },

    #[error("zero length skip run at tile {0}")]
    EmptySkip(usize),

    #[error("palette window at {offset} selects entry {selector} past the {len} byte palette buffer")]
    PaletteRange {
        offset: usize,
        selector: usize,
        len: usize,
    },

    #[error("dictionary indices of {0} bits are unsupported")]
    IndexBits(u32),

    #[error("frame buffer holds {found} bytes but {expected} are needed")]
    FrameBuffer { expected: usize, found: usize },

    #[error("serialized dictionary is truncated: {0}")]
    Truncated(&'static str),

    #[error("serialized dictionary has a run with a zero repeat count")]
    EmptyRun,

    #[error("{0}")]
    Io(#[from] io::Error),
}
