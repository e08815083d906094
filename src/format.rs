//! Information and structures for MOVI tile-coded video.
//!
//! A scene is compressed into three parts:
//! 1. Control word dictionary (shared by every frame)
//! 2. Palette lookup buffer (shared by every frame)
//! 3. One bitstream and one maskstream per frame
//!
//! ## Control Words
//! Every 4x4 tile is described by a 32 bit control word taken from the dictionary.
//! Only the low 24 bits are used:
//!
//! | Bits     | Field     | Description |
//! | :------: | --------- | ----------- |
//! | 20..24   | count     | tiles painted by this word; `0` marks a long offset |
//! | 17..20   | type      | [`ControlType`] of the operation |
//! | 0..17    | parameter | palette buffer offset, or two literal colors |
//!
//! A long offset word (count `0`) stores a 20 bit absolute dictionary index instead
//! of a type and parameter. It points at a block of 16 extension words.
//!
//! ## Bitstream
//! Tiles are visited left to right, top to bottom. Each visited tile starts with a
//! 12 bit dictionary index. While the indexed word is a long offset, a further 4 bit
//! offset into its extension block is read. A skip word is followed by a 5 bit run:
//! ```text
//! ┌ dictionary index (12 bits)
//! |            ┌ block offset (4 bits, only after a long offset)
//! |            |    ┌ skip run (5 bits, only after a skip word)
//! 000000000011 0101 11111
//! ```
//! A run of `31` skips to the end of the current tile row.
//!
//! ## Maskstream
//! Masked operations read 2, 4, 6 or 8 little endian bytes holding one 1, 2, 3 or 4 bit
//! selector per pixel. Pixel `y * 4 + x` selects from the palette window
//! `buffer[parameter..parameter + size]`. A selected value of zero leaves the pixel unchanged.
//!
//! ## Serialized Dictionary
//! The container stores the dictionary run length encoded:
//!
//! | Bytes   | Description |
//! | :-----: | ----------- |
//! | 0..4    | little endian payload size, three times the number of runs |
//! | 4..     | one little endian `u32` per run: low 24 bits word, high 8 bits repeat count |
use crate::errors::{CapacityError, DecodeError};
use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use std::fmt;
use std::io::{Cursor, Read};

/// Width and height of a tile in pixels
pub const TILE_SIZE: usize = 4;
/// Pixels in a tile
pub const TILE_PIXELS: usize = TILE_SIZE * TILE_SIZE;
/// Largest parameter value an operation can carry (17 bits)
pub const MAX_PARAMETER: u32 = (1 << 17) - 1;
/// Largest absolute index a long offset can carry (20 bits)
pub const MAX_LONG_OFFSET: u32 = (1 << 20) - 1;
/// Widest dictionary index a bitstream can carry; long offsets must stay reachable
pub const MAX_INDEX_BITS: u32 = 20;
/// Largest number of tiles a single word can paint
pub const MAX_COUNT: u8 = 15;
/// Words in one extension block
pub const BLOCK_SIZE: usize = 16;
/// Bits read for an offset into an extension block
pub const BLOCK_BITS: u32 = 4;
/// Bits in a skip run
pub const SKIP_BITS: u32 = 5;
/// Longest run a single skip marker may encode
pub const MAX_SKIP_RUN: u32 = 30;
/// Skip run value that skips the rest of the tile row
pub const SKIP_TO_ROW_END: u32 = 31;
/// Long offset chains longer than this are treated as corrupt
pub const MAX_CHAIN_HOPS: usize = 100;
/// Checkerboard selector mask used by [`ControlType::Static`] tiles
pub const STATIC_PATTERN: u16 = 0x5A5A;

const COUNT_SHIFT: u32 = 20;
const TYPE_SHIFT: u32 = 17;
const WORD_MASK: u32 = 0x00FF_FFFF;
const MAX_REPEAT: u32 = 0xFF;

/// How a control word paints its tiles
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ControlType {
    /// Leave a run of tiles untouched
    Skip = 0,
    /// Two literal colors in a fixed checkerboard
    Static = 1,
    Masked2 = 2,
    Masked4 = 3,
    Masked8 = 4,
    Masked16 = 5,
    /// Reuse the previous word of the current tile row
    Repeat = 6,
    Reserved = 7,
}

impl ControlType {
    fn from_bits(bits: u32) -> Self {
        match bits & 0b111 {
            0 => Self::Skip,
            1 => Self::Static,
            2 => Self::Masked2,
            3 => Self::Masked4,
            4 => Self::Masked8,
            5 => Self::Masked16,
            6 => Self::Repeat,
            _ => Self::Reserved,
        }
    }

    /// The masked type able to select from `colors` palette entries
    pub fn masked_for(colors: usize) -> Self {
        match colors {
            0..=2 => Self::Masked2,
            3..=4 => Self::Masked4,
            5..=8 => Self::Masked8,
            _ => Self::Masked16,
        }
    }

    /// Number of palette entries a masked type selects from
    pub fn palette_size(self) -> Option<usize> {
        match self {
            Self::Masked2 => Some(2),
            Self::Masked4 => Some(4),
            Self::Masked8 => Some(8),
            Self::Masked16 => Some(16),
            _ => None,
        }
    }

    /// Selector bits per pixel in the maskstream
    pub fn selector_bits(self) -> Option<u32> {
        self.palette_size().map(|size| size.trailing_zeros())
    }

    /// Maskstream bytes read per tile
    pub fn mask_bytes(self) -> usize {
        self.selector_bits()
            .map(|bits| bits as usize * TILE_PIXELS / 8)
            .unwrap_or(0)
    }
}

impl fmt::Display for ControlType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Skip => write!(f, "skip"),
            Self::Static => write!(f, "static"),
            Self::Masked2 => write!(f, "2 color"),
            Self::Masked4 => write!(f, "4 color"),
            Self::Masked8 => write!(f, "8 color"),
            Self::Masked16 => write!(f, "16 color"),
            Self::Repeat => write!(f, "repeat"),
            Self::Reserved => write!(f, "reserved"),
        }
    }
}

/// A single dictionary entry
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ControlWord(u32);

impl ControlWord {
    /// Create an operation word.
    ///
    /// Panics if `count` is zero or larger than [`MAX_COUNT`], since either would
    /// make a different word. Fails if `param` does not fit in 17 bits.
    pub fn new(count: u8, ty: ControlType, param: u32) -> Result<Self, CapacityError> {
        assert!(
            count > 0 && count <= MAX_COUNT,
            "control word count {} is outside 1..=15",
            count
        );
        if param > MAX_PARAMETER {
            return Err(CapacityError::Parameter {
                param,
                max: MAX_PARAMETER,
            });
        }

        Ok(Self(
            u32::from(count) << COUNT_SHIFT | (ty as u32) << TYPE_SHIFT | param,
        ))
    }

    /// Create a long offset pointing at the extension block starting at `index`.
    ///
    /// Panics if `index` does not fit in 20 bits.
    pub fn long_offset(index: u32) -> Self {
        assert!(
            index <= MAX_LONG_OFFSET,
            "long offset {:#x} does not fit in 20 bits",
            index
        );
        Self(index)
    }

    /// Interpret a raw dictionary value. Bits above the low 24 are dropped.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw & WORD_MASK)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub fn count(self) -> u8 {
        (self.0 >> COUNT_SHIFT & 0xF) as u8
    }

    pub fn control_type(self) -> ControlType {
        ControlType::from_bits(self.0 >> TYPE_SHIFT)
    }

    pub fn parameter(self) -> u32 {
        self.0 & MAX_PARAMETER
    }

    pub fn offset(self) -> u32 {
        self.0 & MAX_LONG_OFFSET
    }

    pub fn is_long_offset(self) -> bool {
        self.count() == 0
    }

    /// This word in its run length form with a repeat count of `times`
    pub fn packed(self, times: u8) -> u32 {
        (self.0 & WORD_MASK) | u32::from(times) << 24
    }
}

impl fmt::Display for ControlWord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_long_offset() {
            write!(f, "-> {:#07x}", self.offset())
        } else {
            write!(
                f,
                "{}x {} {:#07x}",
                self.count(),
                self.control_type(),
                self.parameter()
            )
        }
    }
}

impl From<ControlWord> for u32 {
    fn from(word: ControlWord) -> Self {
        word.0
    }
}

/// Serialize `words` into the run length encoded dictionary format
pub fn pack_dictionary(words: &[ControlWord]) -> Vec<u8> {
    let mut runs: Vec<(ControlWord, u32)> = Vec::new();
    for &word in words {
        match runs.last_mut() {
            Some((last, times)) if *last == word && *times < MAX_REPEAT => *times += 1,
            _ => runs.push((word, 1)),
        }
    }

    let packed: Vec<u32> = runs
        .iter()
        .map(|&(word, times)| word.packed(times as u8))
        .collect();

    let mut out = vec![0; 4 + packed.len() * 4];
    LittleEndian::write_u32(&mut out[..4], (packed.len() * 3) as u32);
    LittleEndian::write_u32_into(&packed, &mut out[4..]);

    out
}

/// Expand a run length encoded dictionary back into its words
pub fn unpack_dictionary(bytes: &[u8]) -> Result<Vec<ControlWord>, DecodeError> {
    let mut rdr = Cursor::new(bytes);
    let payload = rdr
        .read_u32::<LittleEndian>()
        .map_err(|_| DecodeError::Truncated("missing payload size"))?;
    let runs = payload as usize / 3;

    let mut words = Vec::with_capacity(runs);
    for _ in 0..runs {
        let packed = read_run(&mut rdr)?;
        let times = packed >> 24;
        if times == 0 {
            return Err(DecodeError::EmptyRun);
        }
        let word = ControlWord::from_raw(packed);
        words.extend(std::iter::repeat(word).take(times as usize));
    }

    Ok(words)
}

fn read_run<R: Read>(rdr: &mut R) -> Result<u32, DecodeError> {
    rdr.read_u32::<LittleEndian>()
        .map_err(|_| DecodeError::Truncated("run shorter than its payload size"))
}
