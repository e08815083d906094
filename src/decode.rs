use crate::{
    channel::{BitReader, MaskReader},
    errors::DecodeError,
    format::{
        ControlType, ControlWord, BLOCK_BITS, MAX_CHAIN_HOPS, MAX_INDEX_BITS, SKIP_BITS,
        SKIP_TO_ROW_END, STATIC_PATTERN, TILE_PIXELS, TILE_SIZE,
    },
    SequencerSettings,
};
use std::io::Write;

type LogWtr<'a> = &'a mut dyn Write;

/// Receives the decoded pixels of each painted tile
///
/// `pixels` holds the tile row major; a zero means the pixel is unchanged.
pub trait TilePainter {
    fn paint(&mut self, tile_x: usize, tile_y: usize, pixels: &[u8; TILE_PIXELS]);
}

/// Paints tiles into a row major frame buffer of one byte per pixel
pub struct FramePainter<'a> {
    frame: &'a mut [u8],
    stride: usize,
}

impl<'a> FramePainter<'a> {
    pub fn new(frame: &'a mut [u8], stride: usize) -> Self {
        Self { frame, stride }
    }
}

impl TilePainter for FramePainter<'_> {
    fn paint(&mut self, tile_x: usize, tile_y: usize, pixels: &[u8; TILE_PIXELS]) {
        for (row, line) in pixels.chunks(TILE_SIZE).enumerate() {
            let start = (tile_y * TILE_SIZE + row) * self.stride + tile_x * TILE_SIZE;
            let dst = &mut self.frame[start..start + TILE_SIZE];
            for (d, &px) in dst.iter_mut().zip(line) {
                if px != 0 {
                    *d = px;
                }
            }
        }
    }
}

/// Specify the scene-wide decoding state: dimensions, dictionary, palette buffer
/// and the target of the decoded pixels.
///
/// To create a new `DecoderBuilder`, use [`for_frame()`] or [`for_painter()`].
/// Then set the dictionary and palette buffer, and [`build()`] a [`Decoder`].
/// ```
/// # use movi_tiles::{encode, DecoderBuilder};
/// let original: Vec<u8> = (0..64).map(|i| (i % 5 + 1) as u8).collect();
/// let scene = encode(8, 8, &[&original]).unwrap();
///
/// let mut frame = vec![0u8; 64];
/// let mut decoder = DecoderBuilder::for_frame(8, 8, &mut frame)
///     .dictionary(&scene.dictionary)
///     .palette(&scene.palette)
///     .build()
///     .unwrap();
/// let encoded = &scene.frames[0];
/// decoder.decode(&encoded.bitstream, &encoded.maskstream).unwrap();
/// drop(decoder);
/// assert_eq!(frame, original);
/// ```
/// [`for_frame()`]: DecoderBuilder::for_frame
/// [`for_painter()`]: DecoderBuilder::for_painter
/// [`build()`]: DecoderBuilder::build
pub struct DecoderBuilder<'a> {
    width: usize,
    height: usize,
    target: Target<'a>,
    dictionary: &'a [ControlWord],
    palette: &'a [u8],
    index_bits: u32,
    log: Option<LogWtr<'a>>,
}

enum Target<'a> {
    Frame { frame: &'a mut [u8], stride: usize },
    Painter(Box<dyn TilePainter + 'a>),
}

impl<'a> DecoderBuilder<'a> {
    /// Decode into `frame`, a `width * height` buffer holding the previous frame
    #[inline]
    pub fn for_frame(width: usize, height: usize, frame: &'a mut [u8]) -> Self {
        Self::with_target(width, height, Target::Frame { frame, stride: width })
    }

    /// Send each decoded tile to `painter`
    #[inline]
    pub fn for_painter<P: TilePainter + 'a>(width: usize, height: usize, painter: P) -> Self {
        Self::with_target(width, height, Target::Painter(Box::new(painter)))
    }

    fn with_target(width: usize, height: usize, target: Target<'a>) -> Self {
        Self {
            width,
            height,
            target,
            dictionary: &[],
            palette: &[],
            index_bits: SequencerSettings::DEFAULT_INDEX_BITS,
            log: None,
        }
    }

    /// Set the distance in bytes between the starts of two frame rows
    #[inline]
    pub fn stride(mut self, stride: usize) -> Self {
        if let Target::Frame { stride: ref mut s, .. } = self.target {
            *s = stride;
        }
        self
    }

    #[inline]
    pub fn dictionary(mut self, words: &'a [ControlWord]) -> Self {
        self.dictionary = words;
        self
    }

    #[inline]
    pub fn palette(mut self, buffer: &'a [u8]) -> Self {
        self.palette = buffer;
        self
    }

    /// Set the width of a dictionary index; must match the encoder's settings
    #[inline]
    pub fn index_bits(mut self, bits: u32) -> Self {
        self.index_bits = bits;
        self
    }

    /// Write a trace of every decoded tile to `log`
    #[inline]
    pub fn with_logging<W: Write>(mut self, log: &'a mut W) -> Self {
        self.log = Some(log as LogWtr<'a>);
        self
    }

    /// Create a decoder with its own copy of the dictionary and palette buffer
    pub fn build(self) -> Result<Decoder<'a>, DecodeError> {
        if self.index_bits == 0 || self.index_bits > MAX_INDEX_BITS {
            return Err(DecodeError::IndexBits(self.index_bits));
        }

        let painter: Box<dyn TilePainter + 'a> = match self.target {
            Target::Frame { frame, stride } => {
                let needed = if self.height == 0 {
                    0
                } else {
                    (self.height - 1) * stride + self.width
                };
                if stride < self.width || frame.len() < needed {
                    return Err(DecodeError::FrameBuffer {
                        expected: needed.max(self.height * self.width),
                        found: frame.len(),
                    });
                }
                Box::new(FramePainter::new(frame, stride))
            }
            Target::Painter(painter) => painter,
        };

        Ok(Decoder {
            h_tiles: self.width / TILE_SIZE,
            v_tiles: self.height / TILE_SIZE,
            dictionary: self.dictionary.to_vec(),
            palette: self.palette.to_vec(),
            index_bits: self.index_bits,
            painter,
            log: self.log,
        })
    }
}

/// Decodes the frames of one scene, tile by tile
pub struct Decoder<'a> {
    h_tiles: usize,
    v_tiles: usize,
    dictionary: Vec<ControlWord>,
    palette: Vec<u8>,
    index_bits: u32,
    painter: Box<dyn TilePainter + 'a>,
    log: Option<LogWtr<'a>>,
}

impl<'a> Decoder<'a> {
    /// Apply one frame's streams on top of the previous frame.
    ///
    /// Decoding ends early, without error, when the bitstream runs out.
    pub fn decode(&mut self, bitstream: &[u8], maskstream: &[u8]) -> Result<(), DecodeError> {
        let total = self.h_tiles * self.v_tiles;
        let mut bits = BitReader::new(bitstream);
        let mut masks = MaskReader::new(maskstream);
        let mut prev: Option<ControlWord> = None;
        let mut tile = 0;

        while tile < total && !bits.exhausted() {
            if tile % self.h_tiles == 0 {
                prev = None;
            }

            let mut word = self.resolve(&mut bits)?;
            if word.control_type() == ControlType::Repeat {
                word = prev.ok_or(DecodeError::RepeatAtRowStart {
                    row: tile / self.h_tiles,
                })?;
            }

            if let Some(wtr) = self.log.as_mut() {
                writeln!(wtr, "{:05} - {}", tile, word)?;
            }

            match word.control_type() {
                ControlType::Skip => {
                    let run = bits.take(SKIP_BITS);
                    tile = match run {
                        0 => return Err(DecodeError::EmptySkip(tile)),
                        SKIP_TO_ROW_END => (tile / self.h_tiles + 1) * self.h_tiles,
                        n => tile + n as usize,
                    };
                }
                ty @ ControlType::Repeat | ty @ ControlType::Reserved => {
                    return Err(DecodeError::ReservedType(ty as u8))
                }
                ty => {
                    for _ in 0..word.count() {
                        if tile >= total {
                            break;
                        }
                        self.paint(tile, ty, word.parameter(), &mut masks)?;
                        tile += 1;
                    }
                }
            }

            prev = Some(word);
        }

        Ok(())
    }

    /// Read a dictionary index and follow any long offsets to an operation word
    fn resolve(&self, bits: &mut BitReader) -> Result<ControlWord, DecodeError> {
        let index = bits.take(self.index_bits) as usize;
        let mut word = self.word(index)?;

        let mut hops = 0;
        while word.is_long_offset() {
            hops += 1;
            if hops > MAX_CHAIN_HOPS {
                return Err(DecodeError::ChainTooLong(MAX_CHAIN_HOPS));
            }
            let index = word.offset() as usize + bits.take(BLOCK_BITS) as usize;
            word = self.word(index)?;
        }

        Ok(word)
    }

    fn word(&self, index: usize) -> Result<ControlWord, DecodeError> {
        self.dictionary
            .get(index)
            .copied()
            .ok_or(DecodeError::IndexOutOfRange {
                index,
                len: self.dictionary.len(),
            })
    }

    fn paint(
        &mut self,
        tile: usize,
        ty: ControlType,
        param: u32,
        masks: &mut MaskReader,
    ) -> Result<(), DecodeError> {
        let literal;
        let (window, selectors, bits, offset): (&[u8], u64, u32, usize) = match ty {
            ControlType::Static => {
                literal = [param as u8, (param >> 8) as u8];
                (&literal[..], u64::from(STATIC_PATTERN), 1, 0)
            }
            _ => {
                // only masked types reach here
                let size = ty.palette_size().unwrap_or(0);
                let offset = param as usize;
                let start = offset.min(self.palette.len());
                let end = self.palette.len().min(offset + size);
                let selectors = masks.read(ty.mask_bytes());
                (&self.palette[start..end], selectors, size.trailing_zeros(), offset)
            }
        };

        let field = (1u64 << bits) - 1;
        let mut pixels = [0u8; TILE_PIXELS];
        for (p, px) in pixels.iter_mut().enumerate() {
            let selector = (selectors >> (p as u32 * bits) & field) as usize;
            *px = *window.get(selector).ok_or(DecodeError::PaletteRange {
                offset,
                selector,
                len: self.palette.len(),
            })?;
        }

        self.painter
            .paint(tile % self.h_tiles, tile / self.h_tiles, &pixels);
        Ok(())
    }
}

/// Decode one frame's streams into `frame`
///
/// This is a convenience function for a single frame without having to set up
/// a [`DecoderBuilder`]. `frame` should hold the previous frame of the scene.
pub fn decode_frame(
    width: usize,
    height: usize,
    dictionary: &[ControlWord],
    palette: &[u8],
    frame: &mut [u8],
    bitstream: &[u8],
    maskstream: &[u8],
) -> Result<(), DecodeError> {
    DecoderBuilder::for_frame(width, height, frame)
        .dictionary(dictionary)
        .palette(palette)
        .build()?
        .decode(bitstream, maskstream)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::channel::BitWriter;

    fn op(ty: ControlType, param: u32) -> ControlWord {
        ControlWord::new(1, ty, param).unwrap()
    }

    fn stream(fields: &[(u32, u32)]) -> Vec<u8> {
        let mut wtr = BitWriter::new();
        for &(bits, value) in fields {
            wtr.write(bits, value).unwrap();
        }
        wtr.finish().unwrap()
    }

    fn run(
        width: usize,
        height: usize,
        dict: &[ControlWord],
        palette: &[u8],
        frame: &mut [u8],
        bits: &[u8],
        masks: &[u8],
    ) -> Result<(), DecodeError> {
        decode_frame(width, height, dict, palette, frame, bits, masks)
    }

    #[test]
    fn paints_static_checkerboard() {
        let dict = [op(ControlType::Static, 0x0902)];
        let mut frame = [0u8; 16];
        run(4, 4, &dict, &[], &mut frame, &stream(&[(12, 0)]), &[]).unwrap();
        assert_eq!(
            frame,
            [2, 9, 2, 9, 9, 2, 9, 2, 2, 9, 2, 9, 9, 2, 9, 2]
        );
    }

    #[test]
    fn zero_palette_entries_leave_pixels_unchanged() {
        let dict = [op(ControlType::Masked2, 0)];
        let palette = [0, 7];
        let mut frame = [1u8; 16];
        // only the first pixel selects entry 1
        run(4, 4, &dict, &palette, &mut frame, &stream(&[(12, 0)]), &[1, 0]).unwrap();
        let mut expected = [1u8; 16];
        expected[0] = 7;
        assert_eq!(frame, expected);
    }

    #[test]
    fn skip_to_row_end() {
        let dict = [op(ControlType::Skip, 0), op(ControlType::Static, 0x0505)];
        let mut frame = [0u8; 8 * 8];
        // row 0 skipped, row 1: static then skip the rest
        let bits = stream(&[(12, 0), (5, 31), (12, 1), (12, 0), (5, 31)]);
        run(8, 8, &dict, &[], &mut frame, &bits, &[]).unwrap();

        assert!(frame[..32].iter().all(|&p| p == 0));
        for y in 4..8 {
            assert_eq!(&frame[y * 8..y * 8 + 8], &[5, 5, 5, 5, 0, 0, 0, 0]);
        }
    }

    #[test]
    fn count_paints_several_tiles() {
        let dict = [ControlWord::new(3, ControlType::Static, 0x0404).unwrap()];
        let mut frame = [0u8; 8 * 4];
        run(8, 4, &dict, &[], &mut frame, &stream(&[(12, 0)]), &[]).unwrap();
        assert!(frame.iter().all(|&p| p == 4));
    }

    #[test]
    fn follows_long_offsets() {
        let dict = [
            ControlWord::long_offset(2),
            op(ControlType::Skip, 0),
            op(ControlType::Static, 0x0101),
            op(ControlType::Static, 0x0303),
        ];
        let mut frame = [0u8; 16];
        run(4, 4, &dict, &[], &mut frame, &stream(&[(12, 0), (4, 1)]), &[]).unwrap();
        assert!(frame.iter().all(|&p| p == 3));
    }

    #[test]
    fn repeat_uses_previous_word() {
        let dict = [op(ControlType::Static, 0x0606), op(ControlType::Repeat, 0)];
        let mut frame = [0u8; 8 * 4];
        run(8, 4, &dict, &[], &mut frame, &stream(&[(12, 0), (12, 1)]), &[]).unwrap();
        assert!(frame.iter().all(|&p| p == 6));
    }

    #[test]
    fn repeat_at_row_start_fails() {
        let dict = [op(ControlType::Repeat, 0)];
        let mut frame = [0u8; 16];
        let err = run(4, 4, &dict, &[], &mut frame, &stream(&[(12, 0)]), &[]).unwrap_err();
        assert!(matches!(err, DecodeError::RepeatAtRowStart { row: 0 }));
    }

    #[test]
    fn reserved_type_fails() {
        let dict = [op(ControlType::Reserved, 0)];
        let mut frame = [0u8; 16];
        let err = run(4, 4, &dict, &[], &mut frame, &stream(&[(12, 0)]), &[]).unwrap_err();
        assert!(matches!(err, DecodeError::ReservedType(7)));
    }

    #[test]
    fn index_out_of_range_fails() {
        let dict = [op(ControlType::Static, 0x0101)];
        let mut frame = [0u8; 16];
        let err = run(4, 4, &dict, &[], &mut frame, &stream(&[(12, 1)]), &[]).unwrap_err();
        assert!(matches!(err, DecodeError::IndexOutOfRange { index: 1, len: 1 }));
    }

    #[test]
    fn endless_chain_fails() {
        let dict = [ControlWord::long_offset(0)];
        let mut frame = [0u8; 16];
        let err = run(4, 4, &dict, &[], &mut frame, &stream(&[(12, 0)]), &[]).unwrap_err();
        assert!(matches!(err, DecodeError::ChainTooLong(MAX_CHAIN_HOPS)));
    }

    #[test]
    fn palette_window_out_of_range_fails() {
        let dict = [op(ControlType::Masked4, 6)];
        let palette = [1, 2, 3, 4];
        let mut frame = [0u8; 16];
        let err = run(4, 4, &dict, &palette, &mut frame, &stream(&[(12, 0)]), &[0; 4])
            .unwrap_err();
        assert!(matches!(err, DecodeError::PaletteRange { offset: 6, .. }));
    }

    #[test]
    fn zero_skip_run_fails() {
        let dict = [op(ControlType::Skip, 0)];
        let mut frame = [0u8; 16];
        let err = run(4, 4, &dict, &[], &mut frame, &stream(&[(12, 0), (5, 0)]), &[]).unwrap_err();
        assert!(matches!(err, DecodeError::EmptySkip(0)));
    }

    #[test]
    fn exhausted_stream_stops_cleanly() {
        let dict = [op(ControlType::Static, 0x0808)];
        let mut frame = [0u8; 8 * 4];
        run(8, 4, &dict, &[], &mut frame, &[], &[]).unwrap();
        assert!(frame.iter().all(|&p| p == 0));

        // one byte covers the first index; the second tile is never reached
        run(8, 4, &dict, &[], &mut frame, &[0x00], &[]).unwrap();
        for row in frame.chunks(8) {
            assert_eq!(row, &[8, 8, 8, 8, 0, 0, 0, 0]);
        }
    }

    #[test]
    fn short_frame_buffer_is_rejected() {
        let mut frame = [0u8; 15];
        let err = DecoderBuilder::for_frame(4, 4, &mut frame).build().err();
        assert!(matches!(
            err,
            Some(DecodeError::FrameBuffer {
                expected: 16,
                found: 15
            })
        ));
    }

    #[test]
    fn unsupported_index_width_is_rejected() {
        for &bits in &[0, 21, 33] {
            let mut frame = [0u8; 16];
            let err = DecoderBuilder::for_frame(4, 4, &mut frame)
                .index_bits(bits)
                .build()
                .err();
            assert!(matches!(err, Some(DecodeError::IndexBits(b)) if b == bits));
        }
    }

    #[test]
    fn stride_leaves_padding_untouched() {
        let dict = [op(ControlType::Static, 0x0202)];
        let mut frame = [0u8; 6 * 4];
        DecoderBuilder::for_frame(4, 4, &mut frame)
            .stride(6)
            .dictionary(&dict)
            .build()
            .unwrap()
            .decode(&stream(&[(12, 0)]), &[])
            .unwrap();
        for row in frame.chunks(6) {
            assert_eq!(row, &[2, 2, 2, 2, 0, 0]);
        }
    }
}
