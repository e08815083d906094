//! Tile-based delta compression for MOVI high resolution video entries.
//!
//! Frames are 8 bit paletted buffers split into 4x4 tiles. A scene of frames is
//! compressed against a single control word dictionary and palette lookup buffer,
//! with one bitstream and maskstream per frame. See [`format`] for the layout.
//!
//! ```
//! # use movi_tiles::{encode, decode_frame};
//! let frames: Vec<Vec<u8>> = (1..=3u8)
//!     .map(|n| (0..32 * 16).map(|i| (i % 7) as u8 * n + 1).collect())
//!     .collect();
//! let scene = encode(32, 16, &frames).unwrap();
//!
//! let mut frame = vec![0; 32 * 16];
//! for (original, encoded) in frames.iter().zip(&scene.frames) {
//!     decode_frame(
//!         32, 16,
//!         &scene.dictionary, &scene.palette, &mut frame,
//!         &encoded.bitstream, &encoded.maskstream,
//!     ).unwrap();
//!     assert_eq!(&frame, original);
//! }
//! ```

mod channel;
mod decode;
mod encode;
mod errors;
pub mod format;

pub use channel::{BitReader, BitWriter, MaskReader, MaskWriter};
pub use decode::{decode_frame, Decoder, DecoderBuilder, FramePainter, TilePainter};
pub use encode::{
    encode, ColorSet, Dictionary, EncodedFrame, Encoder, IndexPath, PaletteGenerator,
    PaletteLookup, PaletteWriter, Scene, Sequencer, SequencerSettings, TileDelta, TileOp,
};
pub use errors::{CapacityError, DecodeError, EncodeError};
pub use format::{pack_dictionary, unpack_dictionary, ControlType, ControlWord};
