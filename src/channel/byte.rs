//! Byte-aligned channel implementations.
//!
//! Every value occupies whole octets. An n-bit integer takes one octet
//! per started 8-bit group, least significant octet first; booleans take
//! a full octet. Alignment is a no-op by construction.

use std::io::{self, Read, Write};

use crate::channel::{DecoderChannel, EncoderChannel};
use crate::{Error, Result};

/// Byte-aligned encoder channel over any writer.
pub struct ByteEncoderChannel<W> {
    writer: W,
}

impl<W: Write> ByteEncoderChannel<W> {
    /// Creates a byte-aligned channel writing to `writer`.
    pub fn new(writer: W) -> Self {
        ByteEncoderChannel { writer }
    }

    /// Flushes and returns the underlying writer.
    pub fn into_inner(mut self) -> Result<W> {
        self.flush()?;
        Ok(self.writer)
    }
}

impl<W: Write> EncoderChannel for ByteEncoderChannel<W> {
    fn write_bit(&mut self, bit: bool) -> Result<()> {
        self.write_byte(bit as u8)
    }

    fn write_bits(&mut self, value: u32, n: usize) -> Result<()> {
        if n > 32 {
            return Err(Error::Argument(format!(
                "n-bit integer width {} exceeds 4 octets",
                n
            )));
        }
        let octets = (n + 7) / 8;
        for i in 0..octets {
            self.write_byte((value >> (8 * i)) as u8)?;
        }
        Ok(())
    }

    fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.writer.write_all(&[byte]).map_err(Error::Io)
    }

    fn align(&mut self) -> Result<()> {
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(Error::Io)
    }
}

/// Byte-aligned decoder channel over any reader.
pub struct ByteDecoderChannel<R> {
    reader: R,
}

impl<R: Read> ByteDecoderChannel<R> {
    /// Creates a byte-aligned channel reading from `reader`.
    pub fn new(reader: R) -> Self {
        ByteDecoderChannel { reader }
    }

    /// Returns the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read> DecoderChannel for ByteDecoderChannel<R> {
    fn read_bit(&mut self) -> Result<bool> {
        Ok(self.read_byte()? != 0)
    }

    fn read_bits(&mut self, n: usize) -> Result<u32> {
        if n > 32 {
            return Err(Error::Argument(format!(
                "n-bit integer width {} exceeds 4 octets",
                n
            )));
        }
        let octets = (n + 7) / 8;
        let mut value = 0u32;
        for i in 0..octets {
            value |= u32::from(self.read_byte()?) << (8 * i);
        }
        Ok(value)
    }

    fn read_byte(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        loop {
            break match self.reader.read(&mut byte) {
                Ok(0) => Err(Error::UnexpectedEof("byte stream".to_string())),
                Ok(_) => Ok(byte[0]),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => Err(Error::Io(e)),
            };
        }
    }

    fn align(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    /// n-bit groups land little endian between octets.
    #[test]
    fn n_bit_values_round_to_octets() {
        let mut buf = Vec::new();
        let mut enc = ByteEncoderChannel::new(&mut buf);
        enc.write_bits(0x1ff, 9).unwrap();
        enc.flush().unwrap();
        assert_eq!(buf, vec![0xff, 0x01]);

        let mut dec = ByteDecoderChannel::new(buf.as_slice());
        assert_eq!(dec.read_bits(9).unwrap(), 0x1ff);
    }

    #[test]
    fn zero_width_consumes_nothing() {
        let mut buf = Vec::new();
        let mut enc = ByteEncoderChannel::new(&mut buf);
        enc.write_bits(0, 0).unwrap();
        enc.flush().unwrap();
        assert!(buf.is_empty());
    }

    #[test]
    fn widths_beyond_four_octets_are_rejected() {
        let mut buf = Vec::new();
        let mut enc = ByteEncoderChannel::new(&mut buf);
        let err = enc.write_bits(0, 33).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Argument);

        let mut dec = ByteDecoderChannel::new([0u8; 8].as_slice());
        let err = dec.read_bits(40).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Argument);
    }

    #[test]
    fn booleans_take_a_full_octet() {
        let mut buf = Vec::new();
        let mut enc = ByteEncoderChannel::new(&mut buf);
        enc.encode_boolean(true).unwrap();
        enc.encode_boolean(false).unwrap();
        enc.flush().unwrap();
        assert_eq!(buf, vec![1, 0]);
    }
}
