//! Frequency ordered control word dictionary.
//!
//! Every tile operation of a scene is counted, then the distinct operations are
//! laid out by descending use so the most common ones get a direct index. Once the
//! direct slots run out, the remaining operations are placed in 16 word extension
//! blocks reached through long offset words.
use super::Frequency;
use crate::{
    channel::BitWriter,
    errors::{CapacityError, EncodeError},
    format::{
        ControlType, ControlWord, BLOCK_BITS, BLOCK_SIZE, MAX_INDEX_BITS, MAX_LONG_OFFSET,
        MAX_PARAMETER, MAX_SKIP_RUN, SKIP_BITS, SKIP_TO_ROW_END,
    },
};
use std::{collections::HashMap, fmt};

/// Configure the dictionary layout and bitstream generation
///
/// By [`default`](SequencerSettings::default):
///
/// | Parameter       | Field          | Value |
/// | --------------- | -------------- | :---: |
/// | Index width     | `index_bits`   | 12    |
/// | Direct slots    | `direct_slots` | 3840  |
/// | Tiles per row   | `row_tiles`    | none  |
///
/// With these settings the last 256 indices are reserved for long offsets,
/// giving room for 3840 + 256 * 16 distinct operations.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SequencerSettings {
    /// number of bits in a dictionary index
    pub index_bits: u32,
    /// number of operations addressed without a long offset
    pub direct_slots: usize,
    /// tiles in a frame row; enables skip-to-row-end markers
    pub row_tiles: Option<usize>,
}

impl SequencerSettings {
    pub const DEFAULT_INDEX_BITS: u32 = 12;
    pub const DEFAULT_DIRECT_SLOTS: usize = 0xF00;

    pub const fn new(index_bits: u32, direct_slots: usize) -> Self {
        Self {
            index_bits,
            direct_slots,
            row_tiles: None,
        }
    }

    /// Number of indices addressable from the bitstream
    const fn index_limit(&self) -> usize {
        1 << self.index_bits
    }

    /// Largest number of distinct operations this layout can hold
    pub fn available(&self) -> usize {
        let limit = self.index_limit();
        self.direct_slots + limit.saturating_sub(self.direct_slots) * BLOCK_SIZE
    }

    fn validate(&self) -> Result<(), CapacityError> {
        let err = CapacityError::Layout {
            direct: self.direct_slots,
            index_bits: self.index_bits,
        };
        if self.index_bits == 0 || self.index_bits > MAX_INDEX_BITS {
            return Err(err);
        }
        if self.direct_slots > self.index_limit() {
            return Err(err);
        }

        Ok(())
    }
}

impl Default for SequencerSettings {
    fn default() -> Self {
        Self::new(Self::DEFAULT_INDEX_BITS, Self::DEFAULT_DIRECT_SLOTS)
    }
}

/// One requested tile coloring
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileOp {
    pub ty: ControlType,
    pub param: u32,
}

impl TileOp {
    pub const SKIP: Self = Self {
        ty: ControlType::Skip,
        param: 0,
    };

    pub const fn new(ty: ControlType, param: u32) -> Self {
        Self { ty, param }
    }

    fn word(self) -> Result<ControlWord, CapacityError> {
        ControlWord::new(1, self.ty, self.param)
    }
}

impl fmt::Display for TileOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {:#07x}", self.ty, self.param)
    }
}

/// How the bitstream reaches an operation's word in the dictionary
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IndexPath {
    Direct(u32),
    /// index of a long offset word, then the offset into its block
    Extended { pointer: u32, offset: u8 },
}

/// Collects the operations of a scene with their use counts
#[derive(Debug, Clone)]
pub struct Sequencer {
    settings: SequencerSettings,
    freq: HashMap<TileOp, Frequency>,
}

impl Sequencer {
    pub fn new(settings: SequencerSettings) -> Self {
        Self {
            settings,
            freq: HashMap::new(),
        }
    }

    /// Count one use of `op`
    pub fn add(&mut self, op: TileOp) -> Result<(), CapacityError> {
        if op.param > MAX_PARAMETER {
            return Err(CapacityError::Parameter {
                param: op.param,
                max: MAX_PARAMETER,
            });
        }
        *self.freq.entry(op).or_insert(0) += 1;

        Ok(())
    }

    /// Number of distinct operations added so far
    pub fn distinct(&self) -> usize {
        self.freq.len()
    }

    /// Lay out the dictionary for every operation added so far
    pub fn sequence(&self) -> Result<Dictionary, CapacityError> {
        let settings = self.settings;
        settings.validate()?;

        let mut ops: Vec<(TileOp, Frequency)> =
            self.freq.iter().map(|(&op, &freq)| (op, freq)).collect();
        ops.sort_unstable_by(|a, b| {
            b.1.cmp(&a.1)
                .then(a.0.param.cmp(&b.0.param))
                .then(a.0.ty.cmp(&b.0.ty))
        });

        let available = settings.available();
        if ops.len() > available {
            return Err(CapacityError::Dictionary {
                required: ops.len(),
                available,
            });
        }

        let direct = settings.direct_slots.min(ops.len());
        let rest = ops.len() - direct;
        let blocks = (rest + BLOCK_SIZE - 1) / BLOCK_SIZE;
        let ext_base = direct + blocks;
        if rest > 0 && ext_base + rest - 1 > MAX_LONG_OFFSET as usize {
            return Err(CapacityError::Dictionary {
                required: ops.len(),
                available: direct + MAX_LONG_OFFSET as usize + 1 - ext_base,
            });
        }

        let mut words = Vec::with_capacity(ops.len() + blocks);
        let mut paths = HashMap::with_capacity(ops.len());

        for (i, &(op, _)) in ops[..direct].iter().enumerate() {
            words.push(op.word()?);
            paths.insert(op, IndexPath::Direct(i as u32));
        }
        for block in 0..blocks {
            let start = ext_base + block * BLOCK_SIZE;
            words.push(ControlWord::long_offset(start as u32));
        }
        for (j, &(op, _)) in ops[direct..].iter().enumerate() {
            words.push(op.word()?);
            let path = IndexPath::Extended {
                pointer: (direct + j / BLOCK_SIZE) as u32,
                offset: (j % BLOCK_SIZE) as u8,
            };
            paths.insert(op, path);
        }

        log::debug!(
            "sequenced {} operations: {} direct, {} extension blocks",
            ops.len(),
            direct,
            blocks
        );

        Ok(Dictionary {
            settings,
            words,
            paths,
        })
    }
}

/// A finished, immutable dictionary with the path to each of its operations
#[derive(Debug, Clone)]
pub struct Dictionary {
    settings: SequencerSettings,
    words: Vec<ControlWord>,
    paths: HashMap<TileOp, IndexPath>,
}

impl Dictionary {
    pub fn words(&self) -> &[ControlWord] {
        &self.words
    }

    pub fn into_words(self) -> Vec<ControlWord> {
        self.words
    }

    pub fn path(&self, op: TileOp) -> Option<IndexPath> {
        self.paths.get(&op).copied()
    }

    /// Pack one frame's operations, in tile order, into its bitstream.
    ///
    /// Runs of [`TileOp::SKIP`] are coalesced into skip markers. Without a row
    /// width every skipped tile gets its own marker.
    pub fn bitstream_for(&self, ops: &[TileOp]) -> Result<Vec<u8>, EncodeError> {
        let mut out = BitWriter::new();
        let mut pending = 0;

        for (tile, &op) in ops.iter().enumerate() {
            if op.ty != ControlType::Skip {
                self.flush_skips(&mut out, pending)?;
                pending = 0;
                self.write_path(&mut out, op)?;
                continue;
            }

            match self.settings.row_tiles {
                Some(row) if row > 0 => {
                    pending += 1;
                    if (tile + 1) % row == 0 {
                        self.write_skip(&mut out, SKIP_TO_ROW_END)?;
                        pending = 0;
                    }
                }
                _ => self.write_skip(&mut out, 1)?,
            }
        }
        self.flush_skips(&mut out, pending)?;

        out.finish().map_err(Into::into)
    }

    // split a run that stopped before the row end into markers of at most 30 tiles
    fn flush_skips(&self, out: &mut BitWriter, mut pending: u32) -> Result<(), EncodeError> {
        while pending > 0 {
            let run = pending.min(MAX_SKIP_RUN);
            self.write_skip(out, run)?;
            pending -= run;
        }

        Ok(())
    }

    fn write_skip(&self, out: &mut BitWriter, run: u32) -> Result<(), EncodeError> {
        self.write_path(out, TileOp::SKIP)?;
        out.write(SKIP_BITS, run)?;

        Ok(())
    }

    fn write_path(&self, out: &mut BitWriter, op: TileOp) -> Result<(), EncodeError> {
        let index_bits = self.settings.index_bits;
        match self.path(op) {
            Some(IndexPath::Direct(index)) => out.write(index_bits, index)?,
            Some(IndexPath::Extended { pointer, offset }) => {
                out.write(index_bits, pointer)?;
                out.write(BLOCK_BITS, u32::from(offset))?;
            }
            None => {
                return Err(EncodeError::Unregistered {
                    ty: op.ty,
                    param: op.param,
                })
            }
        }

        Ok(())
    }
}

impl fmt::Display for Dictionary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.words.is_empty() {
            return writeln!(f, "empty dictionary");
        }

        for (i, word) in self.words.iter().enumerate() {
            writeln!(f, "{:05x} : {}", i, word)?;
        }
        Ok(())
    }
}
