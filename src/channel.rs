//! Alignment-aware channels carrying the EXI lexical datatypes.
//!
//! A channel is the lowest layer of a stream: it turns booleans, n-bit
//! integers, varints, strings, decimals, floats and date-times into bits
//! or bytes. There are two interchangeable implementations per direction,
//! a bit-aligned one and a byte-aligned one; the alignment is fixed when
//! the stream is created and never changes.
//!
//! All composite codecs are default trait methods written against the
//! small primitive set, so both alignments share one body per datatype.

mod bit;
mod byte;

use std::convert::TryFrom;
use std::io::{Read, Write};

use num_bigint::{BigInt, BigUint};

use crate::values::{
    DateTimeKind, DateTimeValue, DecimalValue, FloatValue, IntegerValue, MAX_EXPONENT,
    SPECIAL_EXPONENT,
};
use crate::{Error, Result};

pub use self::bit::{BitDecoderChannel, BitEncoderChannel};
pub use self::byte::{ByteDecoderChannel, ByteEncoderChannel};

/// Number of septets after which an unsigned varint no longer fits 63
/// bits and decoding continues in arbitrary precision.
const LONG_SEPTETS: usize = 9;

fn n_bit_range_check(value: u32, n: usize) -> Result<()> {
    if n > 32 {
        return Err(Error::Argument(format!(
            "n-bit integer width {} exceeds 32",
            n
        )));
    }
    if n < 32 && value >= 1u32 << n {
        return Err(Error::Argument(format!(
            "value {} does not fit {} bits",
            value, n
        )));
    }
    Ok(())
}

/// The writing half of a stream.
pub trait EncoderChannel {
    /// Writes a single bit. On a byte-aligned channel this occupies a
    /// whole octet.
    fn write_bit(&mut self, bit: bool) -> Result<()>;

    /// Writes the lowest `n` bits of `value`, most significant first.
    /// `n` may be zero, in which case nothing is written. On a
    /// byte-aligned channel the bits occupy whole octets, least
    /// significant octet first.
    fn write_bits(&mut self, value: u32, n: usize) -> Result<()>;

    /// Writes eight bits.
    fn write_byte(&mut self, byte: u8) -> Result<()>;

    /// Pads the current octet with zero bits. A no-op when the channel
    /// is already aligned.
    fn align(&mut self) -> Result<()>;

    /// Aligns and flushes the underlying writer.
    fn flush(&mut self) -> Result<()>;

    /// Writes a boolean as one bit, or one octet on a byte-aligned
    /// channel.
    fn encode_boolean(&mut self, value: bool) -> Result<()> {
        self.write_bits(value as u32, 1)
    }

    /// Writes `value` as an `n`-bit unsigned integer.
    fn encode_n_bit_unsigned_integer(&mut self, value: u32, n: usize) -> Result<()> {
        n_bit_range_check(value, n)?;
        self.write_bits(value, n)
    }

    /// Writes an unbounded unsigned integer as a base-128 varint, least
    /// significant septet first, continuation flag in the high bit.
    fn encode_unsigned_integer(&mut self, mut value: u64) -> Result<()> {
        loop {
            let mut septet = (value & 0x7f) as u8;
            value >>= 7;
            if value != 0 {
                septet |= 0x80;
            }
            self.write_byte(septet)?;
            if value == 0 {
                return Ok(());
            }
        }
    }

    /// Varint encoding beyond 64 bits.
    fn encode_unsigned_big_integer(&mut self, value: &BigUint) -> Result<()> {
        let mut rest = value.clone();
        loop {
            let low = (rest.iter_u32_digits().next().unwrap_or(0) & 0x7f) as u8;
            rest >>= 7;
            if rest.bits() != 0 {
                self.write_byte(low | 0x80)?;
            } else {
                return self.write_byte(low);
            }
        }
    }

    /// Writes a non-negative [`IntegerValue`] as a varint, picking the
    /// 32-bit, 64-bit or arbitrary-precision path from its width.
    fn encode_unsigned_integer_value(&mut self, value: &IntegerValue) -> Result<()> {
        if value.is_negative() {
            return Err(Error::Argument(format!(
                "negative value {} on the unsigned integer codec",
                value
            )));
        }
        match value {
            IntegerValue::Int(v) => self.encode_unsigned_integer(*v as u64),
            IntegerValue::Long(v) => self.encode_unsigned_integer(*v as u64),
            IntegerValue::Big(v) => self.encode_unsigned_big_integer(v.magnitude()),
        }
    }

    /// Writes a signed integer: a sign bit, then the varint of the value
    /// itself, or of `-value - 1` when negative.
    fn encode_integer(&mut self, value: i64) -> Result<()> {
        if value < 0 {
            self.encode_boolean(true)?;
            self.encode_unsigned_integer((-(value + 1)) as u64)
        } else {
            self.encode_boolean(false)?;
            self.encode_unsigned_integer(value as u64)
        }
    }

    /// Signed varint over the full [`IntegerValue`] range.
    fn encode_integer_value(&mut self, value: &IntegerValue) -> Result<()> {
        if value.is_negative() {
            self.encode_boolean(true)?;
            let magnitude = IntegerValue::Int(-1) - value.clone();
            self.encode_unsigned_integer_value(&magnitude)
        } else {
            self.encode_boolean(false)?;
            self.encode_unsigned_integer_value(value)
        }
    }

    /// Writes a length-prefixed octet sequence.
    fn encode_binary(&mut self, data: &[u8]) -> Result<()> {
        self.encode_unsigned_integer(data.len() as u64)?;
        for byte in data {
            self.write_byte(*byte)?;
        }
        Ok(())
    }

    /// Writes a length-prefixed string: the number of code points as a
    /// varint, then one varint per Unicode scalar value.
    fn encode_string(&mut self, value: &str) -> Result<()> {
        self.encode_unsigned_integer(value.chars().count() as u64)?;
        self.encode_characters(value)
    }

    /// Writes the code points of `value` without a length prefix.
    fn encode_characters(&mut self, value: &str) -> Result<()> {
        for ch in value.chars() {
            self.encode_unsigned_integer(ch as u64)?;
        }
        Ok(())
    }

    /// Writes a decimal as sign, integral varint and reversed-fraction
    /// varint.
    fn encode_decimal(&mut self, value: &DecimalValue) -> Result<()> {
        self.encode_boolean(value.negative)?;
        self.encode_unsigned_integer_value(&value.integral)?;
        self.encode_unsigned_integer_value(&value.rev_fractional)
    }

    /// Writes a float as two signed varints, mantissa then exponent.
    fn encode_float(&mut self, value: &FloatValue) -> Result<()> {
        self.encode_integer(value.mantissa())?;
        self.encode_integer(i64::from(value.exponent()))
    }

    /// Writes the components a value of this date-time kind carries:
    /// year offset by 2000, 9-bit month/day, 17-bit time, optional
    /// fractional seconds and optional timezone. The presence bits are
    /// `false` when the component is absent.
    fn encode_date_time(&mut self, value: &DateTimeValue) -> Result<()> {
        if value.kind.has_year() {
            self.encode_integer(value.year - 2000)?;
        }
        if value.kind.has_month_day() {
            self.encode_n_bit_unsigned_integer(value.month_day, 9)?;
        }
        if value.kind.has_time() {
            self.encode_n_bit_unsigned_integer(value.time, 17)?;
            if value.fractional_secs != 0 {
                self.encode_boolean(true)?;
                self.encode_unsigned_integer(u64::from(value.fractional_secs))?;
            } else {
                self.encode_boolean(false)?;
            }
        }
        match value.timezone_minutes {
            Some(tz) => {
                self.encode_boolean(true)?;
                let packed = (tz / 60) * 64 + tz % 60 + 896;
                self.encode_n_bit_unsigned_integer(packed as u32, 11)
            }
            None => self.encode_boolean(false),
        }
    }
}

/// The reading half of a stream.
pub trait DecoderChannel {
    /// Reads a single bit, a whole octet on a byte-aligned channel.
    fn read_bit(&mut self) -> Result<bool>;

    /// Reads an `n`-bit unsigned integer, most significant bit first.
    /// `n` may be zero, in which case nothing is consumed and zero is
    /// returned.
    fn read_bits(&mut self, n: usize) -> Result<u32>;

    /// Reads eight bits.
    fn read_byte(&mut self) -> Result<u8>;

    /// Discards the remaining bits of the current octet. A no-op when
    /// the channel is already aligned.
    fn align(&mut self) -> Result<()>;

    /// Reads a boolean.
    fn decode_boolean(&mut self) -> Result<bool> {
        Ok(self.read_bits(1)? != 0)
    }

    /// Reads an `n`-bit unsigned integer.
    fn decode_n_bit_unsigned_integer(&mut self, n: usize) -> Result<u32> {
        if n > 32 {
            return Err(Error::Argument(format!(
                "n-bit integer width {} exceeds 32",
                n
            )));
        }
        self.read_bits(n)
    }

    /// Reads an unsigned varint that must fit 64 bits. Used for lengths
    /// and other protocol integers.
    fn decode_unsigned_integer(&mut self) -> Result<u64> {
        let mut result = 0u64;
        let mut shift = 0;
        loop {
            let septet = self.read_byte()?;
            let payload = u64::from(septet & 0x7f);
            if shift >= 63 && payload > (u64::MAX >> shift) {
                return Err(Error::Protocol(
                    "unsigned integer overflows 64 bits".to_string(),
                ));
            }
            result |= payload << shift;
            if septet & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
            if shift > 63 {
                return Err(Error::Protocol(
                    "unsigned integer overflows 64 bits".to_string(),
                ));
            }
        }
    }

    /// Reads an unbounded unsigned varint. Up to nine septets are
    /// accumulated in 64-bit arithmetic; a tenth septet promotes the
    /// accumulation to arbitrary precision.
    fn decode_unsigned_integer_value(&mut self) -> Result<IntegerValue> {
        let mut result = 0i64;
        let mut shift = 0;
        for _ in 0..LONG_SEPTETS {
            let septet = self.read_byte()?;
            result |= i64::from(septet & 0x7f) << shift;
            if septet & 0x80 == 0 {
                return Ok(IntegerValue::from_long(result));
            }
            shift += 7;
        }
        let mut big = BigUint::from(result as u64);
        let mut shift = 7 * LONG_SEPTETS;
        loop {
            let septet = self.read_byte()?;
            big |= BigUint::from(u64::from(septet & 0x7f)) << shift;
            if septet & 0x80 == 0 {
                return Ok(IntegerValue::from_big(BigInt::from(big)));
            }
            shift += 7;
        }
    }

    /// Reads a signed integer fitting 64 bits.
    fn decode_integer(&mut self) -> Result<i64> {
        let negative = self.decode_boolean()?;
        let magnitude = self.decode_unsigned_integer()?;
        if negative {
            if magnitude > i64::MAX as u64 {
                return Err(Error::Protocol("signed integer overflows 64 bits".to_string()));
            }
            Ok(-(magnitude as i64) - 1)
        } else {
            if magnitude > i64::MAX as u64 {
                return Err(Error::Protocol("signed integer overflows 64 bits".to_string()));
            }
            Ok(magnitude as i64)
        }
    }

    /// Signed varint over the full [`IntegerValue`] range.
    fn decode_integer_value(&mut self) -> Result<IntegerValue> {
        let negative = self.decode_boolean()?;
        let magnitude = self.decode_unsigned_integer_value()?;
        if negative {
            Ok(IntegerValue::Int(-1) - magnitude)
        } else {
            Ok(magnitude)
        }
    }

    /// Reads a length-prefixed octet sequence.
    fn decode_binary(&mut self) -> Result<Vec<u8>> {
        let length = self.decode_unsigned_integer()? as usize;
        let mut data = Vec::with_capacity(length.min(1 << 20));
        for _ in 0..length {
            data.push(self.read_byte()?);
        }
        Ok(data)
    }

    /// Reads a length-prefixed string.
    fn decode_string(&mut self) -> Result<String> {
        let length = self.decode_unsigned_integer()? as usize;
        self.decode_characters(length)
    }

    /// Reads `length` code points.
    fn decode_characters(&mut self, length: usize) -> Result<String> {
        let mut out = String::with_capacity(length.min(1 << 20));
        for _ in 0..length {
            let code = self.decode_unsigned_integer()?;
            let ch = u32::try_from(code)
                .ok()
                .and_then(char::from_u32)
                .ok_or_else(|| Error::Format {
                    datatype: "character",
                    value: code.to_string(),
                })?;
            out.push(ch);
        }
        Ok(out)
    }

    /// Reads a decimal.
    fn decode_decimal(&mut self) -> Result<DecimalValue> {
        let negative = self.decode_boolean()?;
        let integral = self.decode_unsigned_integer_value()?;
        let rev_fractional = self.decode_unsigned_integer_value()?;
        Ok(DecimalValue::new(negative, integral, rev_fractional))
    }

    /// Reads a float.
    fn decode_float(&mut self) -> Result<FloatValue> {
        let mantissa = self.decode_integer()?;
        let exponent = self.decode_integer()?;
        if exponent != i64::from(SPECIAL_EXPONENT)
            && (exponent < -i64::from(MAX_EXPONENT) || exponent > i64::from(MAX_EXPONENT))
        {
            return Err(Error::Protocol(format!(
                "float exponent {} out of range",
                exponent
            )));
        }
        FloatValue::new(mantissa, exponent as i32)
    }

    /// Reads the components of a date-time of the given kind.
    fn decode_date_time(&mut self, kind: DateTimeKind) -> Result<DateTimeValue> {
        let year = if kind.has_year() {
            self.decode_integer()? + 2000
        } else {
            0
        };
        let month_day = if kind.has_month_day() {
            self.decode_n_bit_unsigned_integer(9)?
        } else {
            0
        };
        let (time, fractional_secs) = if kind.has_time() {
            let time = self.decode_n_bit_unsigned_integer(17)?;
            let fractional = if self.decode_boolean()? {
                let f = self.decode_unsigned_integer()?;
                u32::try_from(f).map_err(|_| {
                    Error::Protocol("fractional seconds overflow".to_string())
                })?
            } else {
                0
            };
            (time, fractional)
        } else {
            (0, 0)
        };
        let timezone_minutes = if self.decode_boolean()? {
            let packed = self.decode_n_bit_unsigned_integer(11)? as i32 - 896;
            Some((packed / 64) * 60 + packed % 64)
        } else {
            None
        };
        Ok(DateTimeValue {
            kind,
            year,
            month_day,
            time,
            fractional_secs,
            timezone_minutes,
        })
    }
}

/// Encoder channel of either alignment, picked at stream creation.
pub(crate) enum AnyEncoderChannel<W> {
    /// Bit-packed.
    Bit(BitEncoderChannel<W>),
    /// Byte-aligned.
    Byte(ByteEncoderChannel<W>),
}

impl<W: Write> EncoderChannel for AnyEncoderChannel<W> {
    fn write_bit(&mut self, bit: bool) -> Result<()> {
        match self {
            AnyEncoderChannel::Bit(c) => c.write_bit(bit),
            AnyEncoderChannel::Byte(c) => c.write_bit(bit),
        }
    }

    fn write_bits(&mut self, value: u32, n: usize) -> Result<()> {
        match self {
            AnyEncoderChannel::Bit(c) => c.write_bits(value, n),
            AnyEncoderChannel::Byte(c) => c.write_bits(value, n),
        }
    }

    fn write_byte(&mut self, byte: u8) -> Result<()> {
        match self {
            AnyEncoderChannel::Bit(c) => c.write_byte(byte),
            AnyEncoderChannel::Byte(c) => c.write_byte(byte),
        }
    }

    fn align(&mut self) -> Result<()> {
        match self {
            AnyEncoderChannel::Bit(c) => c.align(),
            AnyEncoderChannel::Byte(c) => c.align(),
        }
    }

    fn flush(&mut self) -> Result<()> {
        match self {
            AnyEncoderChannel::Bit(c) => c.flush(),
            AnyEncoderChannel::Byte(c) => c.flush(),
        }
    }
}

impl<W: Write> AnyEncoderChannel<W> {
    /// Aligns, flushes and returns the underlying writer.
    pub(crate) fn into_inner(self) -> Result<W> {
        match self {
            AnyEncoderChannel::Bit(c) => c.into_inner(),
            AnyEncoderChannel::Byte(c) => c.into_inner(),
        }
    }
}

/// Decoder channel of either alignment.
pub(crate) enum AnyDecoderChannel<R> {
    /// Bit-packed.
    Bit(BitDecoderChannel<R>),
    /// Byte-aligned.
    Byte(ByteDecoderChannel<R>),
}

impl<R: Read> DecoderChannel for AnyDecoderChannel<R> {
    fn read_bit(&mut self) -> Result<bool> {
        match self {
            AnyDecoderChannel::Bit(c) => c.read_bit(),
            AnyDecoderChannel::Byte(c) => c.read_bit(),
        }
    }

    fn read_bits(&mut self, n: usize) -> Result<u32> {
        match self {
            AnyDecoderChannel::Bit(c) => c.read_bits(n),
            AnyDecoderChannel::Byte(c) => c.read_bits(n),
        }
    }

    fn read_byte(&mut self) -> Result<u8> {
        match self {
            AnyDecoderChannel::Bit(c) => c.read_byte(),
            AnyDecoderChannel::Byte(c) => c.read_byte(),
        }
    }

    fn align(&mut self) -> Result<()> {
        match self {
            AnyDecoderChannel::Bit(c) => c.align(),
            AnyDecoderChannel::Byte(c) => c.align(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use num_bigint::BigInt;
    use pretty_assertions::assert_eq;

    fn bit_round_trip<T>(
        encode: impl FnOnce(&mut BitEncoderChannel<&mut Vec<u8>>) -> Result<()>,
        decode: impl FnOnce(&mut BitDecoderChannel<&[u8]>) -> Result<T>,
    ) -> T {
        let mut buf = Vec::new();
        let mut encoder = BitEncoderChannel::new(&mut buf);
        encode(&mut encoder).unwrap();
        encoder.flush().unwrap();
        let mut decoder = BitDecoderChannel::new(buf.as_slice());
        decode(&mut decoder).unwrap()
    }

    /// Checks the varint length formula along the 64-bit range.
    #[test]
    fn unsigned_varint_length_is_minimal() {
        for (value, octets) in [
            (0u64, 1usize),
            (127, 1),
            (128, 2),
            (16_383, 2),
            (16_384, 3),
            (u64::from(u32::MAX), 5),
            (1 << 62, 9),
        ] {
            let mut buf = Vec::new();
            let mut encoder = BitEncoderChannel::new(&mut buf);
            encoder.encode_unsigned_integer(value).unwrap();
            encoder.flush().unwrap();
            assert_eq!(buf.len(), octets, "value {}", value);
        }
    }

    #[test]
    fn unsigned_varint_round_trips() {
        for value in [0u64, 1, 127, 128, 300, 1 << 20, u64::from(u32::MAX), 1 << 62] {
            let got = bit_round_trip(
                |e| e.encode_unsigned_integer(value),
                |d| d.decode_unsigned_integer(),
            );
            assert_eq!(got, value);
        }
    }

    #[test]
    fn signed_varint_round_trips() {
        for value in [0i64, 1, -1, 63, -64, 8191, -8192, i64::MAX, i64::MIN] {
            let got = bit_round_trip(|e| e.encode_integer(value), |d| d.decode_integer());
            assert_eq!(got, value);
        }
    }

    /// 2^70 takes eleven septets and must promote to arbitrary precision
    /// on the way back in.
    #[test]
    fn varint_promotes_beyond_nine_septets() {
        let value = IntegerValue::Big(BigInt::from(1) << 70);
        let mut buf = Vec::new();
        let mut encoder = BitEncoderChannel::new(&mut buf);
        encoder.encode_unsigned_integer_value(&value).unwrap();
        encoder.flush().unwrap();
        assert_eq!(buf.len(), 11);

        let mut decoder = BitDecoderChannel::new(buf.as_slice());
        let got = decoder.decode_unsigned_integer_value().unwrap();
        assert_eq!(got, value);
    }

    #[test]
    fn negative_value_on_unsigned_codec_is_an_argument_error() {
        let mut buf = Vec::new();
        let mut encoder = BitEncoderChannel::new(&mut buf);
        let err = encoder
            .encode_unsigned_integer_value(&IntegerValue::Int(-1))
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Argument);
    }

    #[test]
    fn string_code_points_round_trip() {
        let text = "h\u{e9}llo \u{1f600}";
        let got = bit_round_trip(|e| e.encode_string(text), |d| d.decode_string());
        assert_eq!(got, text);
    }

    #[test]
    fn decimal_round_trips_with_leading_fraction_zeros() {
        let value = DecimalValue::parse("-12.0034").unwrap();
        let got = bit_round_trip(|e| e.encode_decimal(&value), |d| d.decode_decimal());
        assert_eq!(got, value);
        assert_eq!(got.to_string(), "-12.0034");
    }

    #[test]
    fn float_round_trips_including_specials() {
        for lexical in ["-1.25E2", "0", "INF", "-INF", "NaN"] {
            let value = FloatValue::parse(lexical).unwrap();
            let got = bit_round_trip(|e| e.encode_float(&value), |d| d.decode_float());
            assert_eq!(got, value, "{}", lexical);
        }
    }

    #[test]
    fn date_time_round_trips_per_kind() {
        let cases = [
            (DateTimeKind::DateTime, "2023-12-31T24:00:00Z"),
            (DateTimeKind::DateTime, "2023-06-01T08:30:15.25+05:30"),
            (DateTimeKind::Date, "-0045-03-15"),
            (DateTimeKind::Time, "23:59:59.9"),
            (DateTimeKind::GYear, "1999"),
            (DateTimeKind::GMonthDay, "--02-29"),
        ];
        for (kind, lexical) in cases {
            let value = DateTimeValue::parse(kind, lexical).unwrap();
            let got = bit_round_trip(
                |e| e.encode_date_time(&value),
                |d| d.decode_date_time(kind),
            );
            assert_eq!(got, value, "{}", lexical);
        }
    }

    #[test]
    fn binary_round_trips() {
        let data = vec![0u8, 1, 2, 254, 255];
        let got = bit_round_trip(|e| e.encode_binary(&data), |d| d.decode_binary());
        assert_eq!(got, data);
    }
}
