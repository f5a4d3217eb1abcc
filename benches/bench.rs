use criterion::{self, criterion_group, criterion_main, Criterion};

use quick_exi::channel::{
    BitDecoderChannel, BitEncoderChannel, DecoderChannel, EncoderChannel,
};
use quick_exi::{Reader, Value, Writer};

/// Varint encoding across one to five octets.
fn unsigned_integer(c: &mut Criterion) {
    c.bench_function("encode_unsigned_integer", |b| {
        let mut buf = Vec::with_capacity(1024);
        b.iter(|| {
            buf.clear();
            let mut channel = BitEncoderChannel::new(&mut buf);
            for value in [3u64, 127, 128, 16_384, 1 << 21, 1 << 28, u64::from(u32::MAX)] {
                channel.encode_unsigned_integer(criterion::black_box(value)).unwrap();
            }
            channel.flush().unwrap();
        })
    });

    let mut encoded = Vec::new();
    let mut channel = BitEncoderChannel::new(&mut encoded);
    for value in [3u64, 127, 128, 16_384, 1 << 21, 1 << 28, u64::from(u32::MAX)] {
        channel.encode_unsigned_integer(value).unwrap();
    }
    channel.flush().unwrap();

    c.bench_function("decode_unsigned_integer", |b| {
        b.iter(|| {
            let mut channel = BitDecoderChannel::new(encoded.as_slice());
            for _ in 0..7 {
                criterion::black_box(channel.decode_unsigned_integer().unwrap());
            }
        })
    });
}

/// A small document with repeating values, the common telemetry shape.
fn document_round_trip(c: &mut Criterion) {
    fn encode() -> Vec<u8> {
        let mut out = Vec::with_capacity(512);
        let mut writer = Writer::from_writer(&mut out).unwrap();
        writer.encode_start_document().unwrap();
        writer.encode_start_element("", "readings", None).unwrap();
        for i in 0..32 {
            writer.encode_start_element("", "value", None).unwrap();
            writer
                .encode_characters(&Value::from(if i % 2 == 0 { "on" } else { "off" }))
                .unwrap();
            writer.encode_end_element().unwrap();
        }
        writer.encode_end_element().unwrap();
        writer.encode_end_document().unwrap();
        drop(writer);
        out
    }

    c.bench_function("encode_document", |b| b.iter(|| criterion::black_box(encode())));

    let encoded = encode();
    c.bench_function("decode_document", |b| {
        b.iter(|| {
            let mut reader = Reader::from_reader(encoded.as_slice()).unwrap();
            while !reader.is_finished() {
                criterion::black_box(reader.read_event().unwrap());
            }
        })
    });
}

criterion_group!(benches, unsigned_integer, document_round_trip);
criterion_main!(benches);
