use crate::{
    channel::MaskWriter,
    errors::EncodeError,
    format::{pack_dictionary, ControlType, ControlWord, STATIC_PATTERN, TILE_PIXELS, TILE_SIZE},
};
use std::io::Write;

mod palette;
pub(crate) mod sequencer;

pub use self::{
    palette::{ColorSet, PaletteGenerator, PaletteLookup, PaletteWriter},
    sequencer::{Dictionary, IndexPath, Sequencer, SequencerSettings, TileOp},
};

type Frequency = u64;
type LogWtr<'a> = &'a mut dyn Write;

/// The changed pixels of one tile; unchanged pixels are zero
pub type TileDelta = [u8; TILE_PIXELS];

/// The compressed form of a scene
///
/// The dictionary and palette buffer are shared by every frame. Each frame is
/// decoded from its own bitstream and maskstream on top of the previous frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scene {
    pub dictionary: Vec<ControlWord>,
    pub palette: Vec<u8>,
    pub frames: Vec<EncodedFrame>,
}

impl Scene {
    /// The dictionary in its run length encoded container form
    pub fn packed_dictionary(&self) -> Vec<u8> {
        pack_dictionary(&self.dictionary)
    }
}

/// The per-frame streams of a [`Scene`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodedFrame {
    pub bitstream: Vec<u8>,
    pub maskstream: Vec<u8>,
}

/// Accumulate the frames of a scene, then compress them together
///
/// Create an `Encoder` with [`new()`], change any settings, add every frame of the
/// scene in order with [`add_frame()`], and finally call [`encode()`].
/// ```
/// # use movi_tiles::Encoder;
/// let frame = vec![7u8; 16 * 8];
/// let mut encoder = Encoder::new(16, 8);
/// encoder.add_frame(&frame).unwrap();
/// encoder.add_frame(&frame).unwrap();
/// let scene = encoder.encode().unwrap();
/// assert_eq!(scene.frames.len(), 2);
/// ```
///
/// The default settings are those of [`SequencerSettings::default`]. The row width
/// used for skip markers always comes from the frame width.
///
/// [`new()`]: Encoder::new
/// [`add_frame()`]: Encoder::add_frame
/// [`encode()`]: Encoder::encode
pub struct Encoder<'a> {
    width: usize,
    height: usize,
    settings: SequencerSettings,
    log: Option<LogWtr<'a>>,
    previous: Vec<u8>,
    deltas: Vec<Vec<TileDelta>>,
}

impl<'a> Encoder<'a> {
    #[inline]
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            settings: SequencerSettings::default(),
            log: None,
            previous: vec![0; width * height],
            deltas: Vec::new(),
        }
    }

    /// Set the dictionary layout. See [`SequencerSettings`] for more details.
    #[inline]
    pub fn with_settings(&mut self, settings: SequencerSettings) -> &mut Self {
        self.settings = settings;
        self
    }

    /// Write debugging and diagnostic information to `log` while the scene is
    /// being encoded.
    #[inline]
    pub fn with_logging<L: Write>(&mut self, log: &'a mut L) -> &mut Self {
        self.log = Some(log as LogWtr<'a>);
        self
    }

    /// Number of frames added so far
    pub fn frames(&self) -> usize {
        self.deltas.len()
    }

    /// Add the next frame of the scene: `width * height` palette indices, row major
    pub fn add_frame(&mut self, frame: &[u8]) -> Result<(), EncodeError> {
        if self.width % TILE_SIZE != 0 || self.height % TILE_SIZE != 0 {
            return Err(EncodeError::Dimensions(self.width, self.height));
        }
        let expected = self.width * self.height;
        if frame.len() != expected {
            return Err(EncodeError::FrameSize {
                frame: self.deltas.len(),
                expected,
                found: frame.len(),
            });
        }

        let deltas = tile_deltas(frame, &self.previous, self.width);
        self.deltas.push(deltas);
        self.previous.copy_from_slice(frame);

        Ok(())
    }

    /// Compress every added frame into a [`Scene`]
    pub fn encode(&mut self) -> Result<Scene, EncodeError> {
        do_encode(self)
    }
}

/// Compress `frames` of `width * height` pixels into a [`Scene`]
///
/// This is a convenience function to encode a scene without having to set up
/// an [`Encoder`].
pub fn encode<F: AsRef<[u8]>>(
    width: usize,
    height: usize,
    frames: &[F],
) -> Result<Scene, EncodeError> {
    let mut encoder = Encoder::new(width, height);
    for frame in frames {
        encoder.add_frame(frame.as_ref())?;
    }
    encoder.encode()
}

fn do_encode(opts: &mut Encoder) -> Result<Scene, EncodeError> {
    let Encoder {
        width,
        settings,
        ref mut log,
        ref deltas,
        ..
    } = *opts;

    if deltas.is_empty() {
        return Err(EncodeError::NoFrames);
    }

    let classes: Vec<Vec<TileClass>> = deltas
        .iter()
        .map(|frame| frame.iter().map(TileClass::from).collect())
        .collect();

    let mut palettes = PaletteGenerator::new();
    for class in classes.iter().flatten() {
        if let TileClass::Masked(set, _) = class {
            palettes.add(*set);
        }
    }
    let lookup = palettes.build();

    let settings = SequencerSettings {
        row_tiles: Some(width / TILE_SIZE),
        ..settings
    };
    let mut sequencer = Sequencer::new(settings);
    let mut ops = Vec::with_capacity(classes.len());
    let mut masks = Vec::with_capacity(classes.len());

    for frame in &classes {
        let mut frame_ops = Vec::with_capacity(frame.len());
        let mut mask = MaskWriter::new();

        for class in frame {
            let op = tile_op(class, &lookup, &mut mask)?;
            sequencer.add(op)?;
            frame_ops.push(op);
        }

        ops.push(frame_ops);
        masks.push(mask);
    }

    let dictionary = sequencer.sequence()?;

    if let Some(wtr) = log.as_mut() {
        writeln!(wtr, "# Dictionary ({} words)\n{}", dictionary.words().len(), dictionary)?;
        writeln!(
            wtr,
            "# Palette Buffer ({} sets, {} bytes)\n{:02x?}",
            palettes.distinct(),
            lookup.buffer().len(),
            lookup.buffer()
        )?;
    }

    let mut frames = Vec::with_capacity(ops.len());
    for (i, (frame_ops, mask)) in ops.iter().zip(masks).enumerate() {
        let bitstream = dictionary.bitstream_for(frame_ops)?;
        let maskstream = mask.into_inner();

        if let Some(wtr) = log.as_mut() {
            writeln!(
                wtr,
                "frame {:04}: bitstream {} bytes | maskstream {} bytes",
                i,
                bitstream.len(),
                maskstream.len()
            )?;
        }
        log::trace!("frame {} encoded into {} + {} bytes", i, bitstream.len(), maskstream.len());

        frames.push(EncodedFrame {
            bitstream,
            maskstream,
        });
    }

    log::debug!(
        "encoded {} frames with {} dictionary words and {} palette bytes",
        frames.len(),
        dictionary.words().len(),
        lookup.buffer().len()
    );

    Ok(Scene {
        dictionary: dictionary.into_words(),
        palette: lookup.into_buffer(),
        frames,
    })
}

/// Turn a classified tile into its operation, writing its selectors to `mask` if needed
fn tile_op(
    class: &TileClass,
    lookup: &PaletteLookup,
    mask: &mut MaskWriter,
) -> Result<TileOp, EncodeError> {
    let op = match *class {
        TileClass::Skip => TileOp::SKIP,
        TileClass::Static(c0, c1) => {
            TileOp::new(ControlType::Static, u32::from(c0) | u32::from(c1) << 8)
        }
        TileClass::Masked(set, ref pixels) => {
            let offset = lookup
                .offset(&set)
                .ok_or_else(|| EncodeError::MissingPalette(set.to_string()))?;
            let ty = ControlType::masked_for(set.len());
            let size = set.window_size();
            let bits = size.trailing_zeros();

            let window = lookup.window(offset, size);
            mask.write(ty.mask_bytes(), selectors(window, pixels, bits));

            TileOp::new(ty, offset as u32)
        }
    };

    Ok(op)
}

/// Pack the position of each pixel's color within `window`, `bits` bits per pixel
fn selectors(window: &[u8], pixels: &TileDelta, bits: u32) -> u64 {
    pixels.iter().enumerate().fold(0, |mask, (p, color)| {
        let sel = window.iter().position(|c| c == color).unwrap_or(0) as u64;
        mask | sel << (p as u32 * bits)
    })
}

/// Split `frame` into tiles of the pixels that differ from `previous`
fn tile_deltas(frame: &[u8], previous: &[u8], width: usize) -> Vec<TileDelta> {
    let h_tiles = width / TILE_SIZE;
    let v_tiles = frame.len() / width.max(1) / TILE_SIZE;
    let mut deltas = Vec::with_capacity(h_tiles * v_tiles);

    for ty in 0..v_tiles {
        for tx in 0..h_tiles {
            let mut delta = [0; TILE_PIXELS];
            for (p, px) in delta.iter_mut().enumerate() {
                let idx = (ty * TILE_SIZE + p / TILE_SIZE) * width + tx * TILE_SIZE + p % TILE_SIZE;
                if frame[idx] != previous[idx] {
                    *px = frame[idx];
                }
            }
            deltas.push(delta);
        }
    }

    deltas
}

/// How a tile delta will be painted
#[derive(Debug, Clone, PartialEq, Eq)]
enum TileClass {
    Skip,
    /// colors for the clear and set bits of the checkerboard
    Static(u8, u8),
    Masked(ColorSet, TileDelta),
}

impl From<&TileDelta> for TileClass {
    fn from(delta: &TileDelta) -> Self {
        let set = ColorSet::from_colors(delta);
        match set.len() {
            1 if delta[0] == 0 => Self::Skip,
            1 => Self::Static(delta[0], delta[0]),
            2 => {
                let colors = set.colors();
                let (lo, hi) = (colors[0], colors[1]);
                let pattern = delta
                    .iter()
                    .enumerate()
                    .filter(|(_, &c)| c == hi)
                    .fold(0u16, |m, (p, _)| m | 1 << p);

                if pattern == STATIC_PATTERN {
                    Self::Static(lo, hi)
                } else if pattern == !STATIC_PATTERN {
                    Self::Static(hi, lo)
                } else {
                    Self::Masked(set, *delta)
                }
            }
            _ => Self::Masked(set, *delta),
        }
    }
}
