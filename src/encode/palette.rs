//! Shared palette lookup buffer.
//!
//! Every masked tile selects its colors from a small window of one scene-wide
//! byte buffer. A window of `S` bytes can serve any color set of up to `S`
//! colors it contains, so sets are nested inside each other and overlapped at
//! their boundaries to keep the buffer short.
use super::Frequency;
use smallvec::SmallVec;
use std::{collections::HashMap, fmt};

/// The colors of one palette, in buffer order
pub type Palette = SmallVec<[u8; 16]>;

/// Nested subsets are searched no deeper than the largest palette
const MAX_NESTING: usize = 16;

/// A set of palette indices, one bit per possible color
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColorSet([u64; 4]);

impl ColorSet {
    pub fn from_colors(colors: &[u8]) -> Self {
        let mut set = Self::default();
        for &c in colors {
            set.insert(c);
        }
        set
    }

    pub fn insert(&mut self, color: u8) {
        self.0[(color >> 6) as usize] |= 1 << (color & 63);
    }

    pub fn contains(&self, color: u8) -> bool {
        self.0[(color >> 6) as usize] & 1 << (color & 63) != 0
    }

    pub fn len(&self) -> usize {
        self.0.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|&w| w == 0)
    }

    pub fn is_subset(&self, other: &Self) -> bool {
        self.0.iter().zip(&other.0).all(|(a, b)| a & !b == 0)
    }

    pub fn difference(&self, other: &Self) -> Self {
        let mut out = *self;
        for (a, b) in out.0.iter_mut().zip(&other.0) {
            *a &= !b;
        }
        out
    }

    /// The colors in ascending order
    pub fn colors(&self) -> Palette {
        (0..=255u8).filter(|&c| self.contains(c)).collect()
    }

    /// Number of palette entries a masked tile with these colors selects from
    pub fn window_size(&self) -> usize {
        self.len().max(2).next_power_of_two()
    }
}

impl fmt::Display for ColorSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:02x?}", self.colors().as_slice())
    }
}

/// Find the first window of `set.window_size()` bytes in `buf` holding every color of `set`.
///
/// Windows may run off the end of `buf`; [`PaletteGenerator::build`] pads the
/// finished buffer so that every window it hands out is complete.
pub fn find_window(buf: &[u8], set: &ColorSet) -> Option<usize> {
    let size = set.window_size();
    let needed = set.len();
    let mut counts = [0u8; 256];
    let mut held = 0;
    let mut end = 0;

    for start in 0..buf.len() {
        while end < buf.len() && end < start + size {
            let c = buf[end];
            if set.contains(c) {
                if counts[c as usize] == 0 {
                    held += 1;
                }
                counts[c as usize] += 1;
            }
            end += 1;
        }
        if held == needed {
            return Some(start);
        }

        let c = buf[start];
        if set.contains(c) {
            counts[c as usize] -= 1;
            if counts[c as usize] == 0 {
                held -= 1;
            }
        }
    }

    None
}

/// Appends byte strings to the palette buffer, reusing what is already there
#[derive(Debug, Clone, Default)]
pub struct PaletteWriter {
    buf: Vec<u8>,
}

impl PaletteWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Make `data` appear contiguously in the buffer and return its offset.
    ///
    /// An existing copy is returned as is. Otherwise the longest suffix of the
    /// buffer that starts `data` is shared, and only the rest is appended.
    pub fn write(&mut self, data: &[u8]) -> usize {
        if data.is_empty() {
            return self.buf.len();
        }
        if let Some(pos) = self.buf.windows(data.len()).position(|w| w == data) {
            return pos;
        }

        let max_overlap = self.buf.len().min(data.len() - 1);
        let overlap = (1..=max_overlap)
            .rev()
            .find(|&n| self.buf.ends_with(&data[..n]))
            .unwrap_or(0);

        let start = self.buf.len() - overlap;
        self.buf.extend_from_slice(&data[overlap..]);
        start
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Collects the color sets of every masked tile of a scene
#[derive(Debug, Clone, Default)]
pub struct PaletteGenerator {
    sets: HashMap<ColorSet, Frequency>,
}

impl PaletteGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one use of `set`
    pub fn add(&mut self, set: ColorSet) {
        *self.sets.entry(set).or_insert(0) += 1;
    }

    /// Number of distinct sets added so far
    pub fn distinct(&self) -> usize {
        self.sets.len()
    }

    /// Build the shared buffer holding a window for every added set
    pub fn build(&self) -> PaletteLookup {
        let mut pending: Vec<(ColorSet, Frequency)> =
            self.sets.iter().map(|(&s, &f)| (s, f)).collect();
        // largest first; most used first among equal sizes
        pending.sort_unstable_by(|a, b| {
            b.0.len()
                .cmp(&a.0.len())
                .then(b.1.cmp(&a.1))
                .then(a.0.cmp(&b.0))
        });
        let pending: Vec<ColorSet> = pending.into_iter().map(|(s, _)| s).collect();

        // the buffer only grows at its end, so a window stays valid once found
        let mut wtr = PaletteWriter::new();
        let mut offsets = HashMap::with_capacity(pending.len());
        for (i, set) in pending.iter().enumerate() {
            if let Some(at) = find_window(wtr.as_slice(), set) {
                offsets.insert(*set, at);
                continue;
            }

            let order = match nest_order(set, &pending[i + 1..], MAX_NESTING) {
                Some(order) => order,
                None => tail_order(wtr.as_slice(), set),
            };
            offsets.insert(*set, wtr.write(&order));
        }

        // complete windows that run past the last written color
        let mut buf = wtr.into_inner();
        let end = offsets
            .iter()
            .map(|(set, &at)| at + set.window_size())
            .max()
            .unwrap_or(0);
        if end > buf.len() {
            buf.resize(end, 0);
        }

        log::debug!(
            "palette lookup: {} sets in {} bytes",
            pending.len(),
            buf.len()
        );

        PaletteLookup { buf, offsets }
    }
}

// order `set` so that its largest remaining subset comes first, recursively,
// or `None` if no remaining set nests inside it
fn nest_order(set: &ColorSet, remaining: &[ColorSet], depth: usize) -> Option<Palette> {
    if depth == 0 {
        return None;
    }

    // `remaining` is sorted largest first
    let inner = remaining
        .iter()
        .find(|sub| sub.len() >= 2 && sub.len() < set.len() && sub.is_subset(set))?;

    let mut order = nest_order(inner, remaining, depth - 1).unwrap_or_else(|| inner.colors());
    order.extend(set.difference(inner).colors());
    Some(order)
}

// order `set` so that the colors ending the buffer come first and can be shared
fn tail_order(buf: &[u8], set: &ColorSet) -> Palette {
    let mut shared = ColorSet::default();
    let mut start = buf.len();
    while start > 0 && buf.len() - start < set.len().saturating_sub(1) {
        let c = buf[start - 1];
        if !set.contains(c) || shared.contains(c) {
            break;
        }
        shared.insert(c);
        start -= 1;
    }

    let mut order: Palette = buf[start..].iter().copied().collect();
    order.extend(set.difference(&shared).colors());
    order
}

/// The finished palette buffer with the window chosen for every set
#[derive(Debug, Clone)]
pub struct PaletteLookup {
    buf: Vec<u8>,
    offsets: HashMap<ColorSet, usize>,
}

impl PaletteLookup {
    pub fn offset(&self, set: &ColorSet) -> Option<usize> {
        self.offsets.get(set).copied()
    }

    /// The palette window of `size` entries at `offset`.
    ///
    /// Every window handed out by [`offset`](Self::offset) fits in the buffer;
    /// other windows are cut short at its end.
    pub fn window(&self, offset: usize, size: usize) -> &[u8] {
        let start = offset.min(self.buf.len());
        let end = self.buf.len().min(offset + size);
        &self.buf[start..end]
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_buffer(self) -> Vec<u8> {
        self.buf
    }
}
