//! Bit and byte packing shared by the encoder and the decoder.
//!
//! The bitstream carries dictionary paths and skip runs packed big endian,
//! most significant bit first. The maskstream carries the per-pixel palette
//! selectors as little endian integers of whole bytes.
//!
//! Both readers return zeros past the end of their source rather than
//! failing; the decoder uses [`BitReader::exhausted`] to find the end of a frame.
use bitstream_io::BigEndian;
use byteorder::{ByteOrder, LittleEndian};
use std::io;

/// Widest value that can be written to or read from the bitstream at once
pub const MAX_BITS: u32 = 32;
/// Widest value that can be written to or read from the maskstream at once
pub const MAX_MASK_BYTES: usize = 8;

/// Appends big endian bit fields to a growing byte buffer
pub struct BitWriter {
    out: bitstream_io::BitWriter<Vec<u8>, BigEndian>,
    len: u64,
}

impl BitWriter {
    pub fn new() -> Self {
        Self {
            out: bitstream_io::BitWriter::endian(Vec::new(), BigEndian),
            len: 0,
        }
    }

    /// Write the low `bits` bits of `value`.
    ///
    /// Writing zero bits does nothing. Panics if `bits` is larger than [`MAX_BITS`].
    pub fn write(&mut self, bits: u32, value: u32) -> io::Result<()> {
        assert!(
            bits <= MAX_BITS,
            "tried to write {} bits into the bitstream at once",
            bits
        );
        if bits == 0 {
            return Ok(());
        }

        let value = if bits == MAX_BITS {
            value
        } else {
            value & ((1 << bits) - 1)
        };
        self.out.write(bits, value)?;
        self.len += u64::from(bits);

        Ok(())
    }

    /// Number of bits written so far
    pub fn bit_len(&self) -> u64 {
        self.len
    }

    /// Pad the final byte with zero bits and return the packed buffer
    pub fn finish(mut self) -> io::Result<Vec<u8>> {
        self.out.byte_align()?;
        Ok(self.out.into_writer())
    }
}

impl Default for BitWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads big endian bit fields with separate peek and consume steps
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    src: &'a [u8],
    // cursor in bits
    pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(src: &'a [u8]) -> Self {
        Self { src, pos: 0 }
    }

    /// Peek at the next `bits` bits without consuming them.
    ///
    /// Bits past the end of the source read as zero. Panics if `bits` is
    /// larger than [`MAX_BITS`].
    pub fn read(&self, bits: u32) -> u32 {
        assert!(
            bits <= MAX_BITS,
            "tried to read {} bits from the bitstream at once",
            bits
        );
        if bits == 0 {
            return 0;
        }

        // five bytes always cover a 32 bit field at any bit alignment
        let start = self.pos / 8;
        let shift = (self.pos % 8) as u32;
        let window = (0..5).fold(0u64, |acc, i| {
            let byte = start
                .checked_add(i)
                .and_then(|idx| self.src.get(idx))
                .copied()
                .unwrap_or(0);
            (acc << 8) | u64::from(byte)
        });

        let value = window >> (40 - shift - bits);
        (value & ((1u64 << bits) - 1)) as u32
    }

    /// Move the cursor forward by `bits` bits
    pub fn advance(&mut self, bits: usize) {
        self.pos = self.pos.saturating_add(bits);
    }

    /// Read `bits` bits and move past them
    pub fn take(&mut self, bits: u32) -> u32 {
        let value = self.read(bits);
        self.advance(bits as usize);
        value
    }

    /// Has the cursor reached or passed the end of the source
    pub fn exhausted(&self) -> bool {
        self.pos >= self.src.len().saturating_mul(8)
    }

    /// Current cursor position in bits
    pub fn position(&self) -> usize {
        self.pos
    }
}

/// Appends little endian values of up to eight bytes
#[derive(Debug, Clone, Default)]
pub struct MaskWriter {
    buf: Vec<u8>,
}

impl MaskWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Write the low `bytes` bytes of `value`, least significant byte first.
    ///
    /// Panics if `bytes` is larger than [`MAX_MASK_BYTES`].
    pub fn write(&mut self, bytes: usize, value: u64) {
        assert!(
            bytes <= MAX_MASK_BYTES,
            "tried to write {} bytes into the maskstream at once",
            bytes
        );
        if bytes == 0 {
            return;
        }

        let start = self.buf.len();
        self.buf.resize(start + bytes, 0);
        LittleEndian::write_uint(&mut self.buf[start..], value & low_bytes(bytes), bytes);
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

/// Sequentially reads little endian values of up to eight bytes
#[derive(Debug, Clone)]
pub struct MaskReader<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> MaskReader<'a> {
    pub fn new(src: &'a [u8]) -> Self {
        Self { src, pos: 0 }
    }

    /// Read the next `bytes` bytes as a little endian value.
    ///
    /// Bytes past the end of the source read as zero. Panics if `bytes` is
    /// larger than [`MAX_MASK_BYTES`].
    pub fn read(&mut self, bytes: usize) -> u64 {
        assert!(
            bytes <= MAX_MASK_BYTES,
            "tried to read {} bytes from the maskstream at once",
            bytes
        );

        if bytes == 0 {
            return 0;
        }

        let mut scratch = [0u8; MAX_MASK_BYTES];
        let start = self.pos.min(self.src.len());
        let end = self.src.len().min(self.pos + bytes);
        scratch[..end - start].copy_from_slice(&self.src[start..end]);
        self.pos += bytes;

        LittleEndian::read_uint(&scratch[..bytes], bytes)
    }
}

// mask of the low `bytes` bytes of a u64, for 1..=8 bytes
fn low_bytes(bytes: usize) -> u64 {
    u64::MAX >> (64 - 8 * bytes as u32)
}
