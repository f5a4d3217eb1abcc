//! Bit-packed channel implementations.

use std::io::{self, Read, Write};

use crate::channel::{DecoderChannel, EncoderChannel};
use crate::{Error, Result};

/// Bit-packed encoder channel over any writer.
///
/// Bits are collected into an octet, most significant first, and the
/// octet is emitted once full. [`EncoderChannel::align`] pads the open
/// octet with zero bits.
pub struct BitEncoderChannel<W> {
    writer: W,
    /// Bits collected for the open octet, left-aligned as they arrive.
    buffer: u8,
    /// Number of bits currently in `buffer`, 0..=7.
    used: usize,
}

impl<W: Write> BitEncoderChannel<W> {
    /// Creates a bit-packed channel writing to `writer`.
    pub fn new(writer: W) -> Self {
        BitEncoderChannel {
            writer,
            buffer: 0,
            used: 0,
        }
    }

    /// Aligns, flushes and returns the underlying writer.
    pub fn into_inner(mut self) -> Result<W> {
        self.flush()?;
        Ok(self.writer)
    }

    fn emit(&mut self) -> Result<()> {
        let byte = self.buffer;
        self.buffer = 0;
        self.used = 0;
        self.writer.write_all(&[byte]).map_err(Error::Io)
    }
}

impl<W: Write> EncoderChannel for BitEncoderChannel<W> {
    fn write_bit(&mut self, bit: bool) -> Result<()> {
        self.buffer |= (bit as u8) << (7 - self.used);
        self.used += 1;
        if self.used == 8 {
            self.emit()?;
        }
        Ok(())
    }

    fn write_bits(&mut self, value: u32, n: usize) -> Result<()> {
        if n > 32 {
            return Err(Error::Argument(format!(
                "n-bit integer width {} exceeds 32",
                n
            )));
        }
        for i in (0..n).rev() {
            self.write_bit((value >> i) & 1 == 1)?;
        }
        Ok(())
    }

    fn write_byte(&mut self, byte: u8) -> Result<()> {
        if self.used == 0 {
            self.writer.write_all(&[byte]).map_err(Error::Io)
        } else {
            self.write_bits(u32::from(byte), 8)
        }
    }

    fn align(&mut self) -> Result<()> {
        if self.used > 0 {
            self.emit()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.align()?;
        self.writer.flush().map_err(Error::Io)
    }
}

/// Bit-packed decoder channel over any reader.
pub struct BitDecoderChannel<R> {
    reader: R,
    /// Bits of the current octet not yet handed out.
    buffer: u8,
    /// Number of valid bits left in `buffer`, 0..=8.
    remaining: usize,
}

impl<R: Read> BitDecoderChannel<R> {
    /// Creates a bit-packed channel reading from `reader`.
    pub fn new(reader: R) -> Self {
        BitDecoderChannel {
            reader,
            buffer: 0,
            remaining: 0,
        }
    }

    /// Returns the underlying reader, discarding any partial octet.
    pub fn into_inner(self) -> R {
        self.reader
    }

    fn fill(&mut self) -> Result<()> {
        let mut byte = [0u8; 1];
        loop {
            break match self.reader.read(&mut byte) {
                Ok(0) => Err(Error::UnexpectedEof("bit stream".to_string())),
                Ok(_) => {
                    self.buffer = byte[0];
                    self.remaining = 8;
                    Ok(())
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => Err(Error::Io(e)),
            };
        }
    }
}

impl<R: Read> DecoderChannel for BitDecoderChannel<R> {
    fn read_bit(&mut self) -> Result<bool> {
        if self.remaining == 0 {
            self.fill()?;
        }
        self.remaining -= 1;
        Ok((self.buffer >> self.remaining) & 1 == 1)
    }

    fn read_bits(&mut self, n: usize) -> Result<u32> {
        if n > 32 {
            return Err(Error::Argument(format!(
                "n-bit integer width {} exceeds 32",
                n
            )));
        }
        let mut value = 0u32;
        for _ in 0..n {
            value = (value << 1) | self.read_bit()? as u32;
        }
        Ok(value)
    }

    fn read_byte(&mut self) -> Result<u8> {
        if self.remaining == 0 {
            self.fill()?;
        }
        if self.remaining == 8 {
            self.remaining = 0;
            Ok(self.buffer)
        } else {
            Ok(self.read_bits(8)? as u8)
        }
    }

    fn align(&mut self) -> Result<()> {
        self.remaining = 0;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Checks that bits are packed most significant first.
    #[test]
    fn bits_pack_msb_first() {
        let mut buf = Vec::new();
        let mut channel = BitEncoderChannel::new(&mut buf);
        channel.write_bit(true).unwrap();
        channel.write_bits(0b0110, 4).unwrap();
        channel.flush().unwrap();
        // 1 0110 padded with three zero bits.
        assert_eq!(buf, vec![0b1011_0000]);
    }

    /// An n-bit read consumes exactly n bits.
    #[test]
    fn n_bit_values_are_bijective() {
        for n in 0..=12usize {
            let max = if n == 0 { 0 } else { (1u32 << n) - 1 };
            for value in [0, max / 2, max] {
                let mut buf = Vec::new();
                let mut enc = BitEncoderChannel::new(&mut buf);
                enc.write_bits(value, n).unwrap();
                enc.write_bit(true).unwrap();
                enc.flush().unwrap();

                let mut dec = BitDecoderChannel::new(buf.as_slice());
                assert_eq!(dec.read_bits(n).unwrap(), value);
                // The trailing marker bit proves nothing extra was consumed.
                assert!(dec.read_bit().unwrap());
            }
        }
    }

    /// Aligning twice in a row writes at most one padding octet.
    #[test]
    fn align_is_idempotent() {
        let mut buf = Vec::new();
        let mut channel = BitEncoderChannel::new(&mut buf);
        channel.write_bit(true).unwrap();
        channel.align().unwrap();
        channel.align().unwrap();
        channel.flush().unwrap();
        assert_eq!(buf.len(), 1);

        let mut empty = Vec::new();
        let mut channel = BitEncoderChannel::new(&mut empty);
        channel.align().unwrap();
        channel.flush().unwrap();
        assert_eq!(empty.len(), 0);
    }

    #[test]
    fn eof_mid_value_is_reported() {
        let mut dec = BitDecoderChannel::new([0xffu8].as_slice());
        dec.read_bits(8).unwrap();
        let err = dec.read_bit().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn aligned_byte_reads_take_the_fast_path() {
        let mut dec = BitDecoderChannel::new([0xab, 0xcd].as_slice());
        assert_eq!(dec.read_byte().unwrap(), 0xab);
        assert_eq!(dec.read_byte().unwrap(), 0xcd);
    }
}
