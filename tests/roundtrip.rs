//! End to end encode/decode scenarios over the public API.

use pretty_assertions::assert_eq;

use quick_exi::datatypes::Datatype;
use quick_exi::events::Event;
use quick_exi::grammar::{GrammarLabel, Production};
use quick_exi::values::{DateTimeKind, DateTimeValue};
use quick_exi::{
    AttributeList, CodingMode, ErrorKind, Reader, SchemaGrammarsBuilder, StreamEvent, Value,
    Writer,
};

fn decode_all(bytes: &[u8]) -> Vec<StreamEvent> {
    let mut reader = Reader::from_reader(bytes).unwrap();
    let mut events = Vec::new();
    loop {
        let (event, has_more) = reader.read_event().unwrap();
        events.push(event);
        if !has_more {
            break;
        }
    }
    events
}

/// The empty element `<a/>`, bit for bit.
#[test]
fn empty_element_produces_the_reference_bytes() {
    let mut out = Vec::new();
    let mut writer = Writer::builder()
        .include_cookie(true)
        .into_writer(&mut out)
        .unwrap();
    writer.encode_start_document().unwrap();
    writer.encode_start_element("", "a", None).unwrap();
    writer.encode_end_element().unwrap();
    writer.encode_end_document().unwrap();
    drop(writer);

    // $EXI, then: distinguishing bits 10, presence 0, SD (0 bits),
    // SE(*) (0 bits), uri hit "" as 01, local name miss len+1=2,
    // the code point of "a", EE as second level code 00, ED (0 bits).
    let mut expected = b"$EXI".to_vec();
    expected.extend([0x88, 0x13, 0x08]);
    assert_eq!(out, expected);

    let events = decode_all(&out);
    assert_eq!(
        events,
        vec![
            StreamEvent::StartDocument,
            StreamEvent::StartElement {
                uri: String::new(),
                local_name: "a".to_string(),
                prefix: None,
            },
            StreamEvent::EndElement {
                uri: String::new(),
                local_name: "a".to_string(),
            },
            StreamEvent::EndDocument,
        ]
    );
}

/// A repeated text value must come back out of the local partition
/// instead of being written twice.
#[test]
fn repeated_text_hits_the_local_partition() {
    let mut out = Vec::new();
    let mut writer = Writer::from_writer(&mut out).unwrap();
    writer.encode_start_document().unwrap();
    writer.encode_start_element("", "r", None).unwrap();
    for _ in 0..2 {
        writer.encode_start_element("", "a", None).unwrap();
        writer.encode_characters(&Value::from("hi")).unwrap();
        writer.encode_end_element().unwrap();
    }
    // The table records "hi" once; the second occurrence was a hit.
    assert_eq!(writer.global_value_count(), 1);
    writer.encode_end_element().unwrap();
    writer.encode_end_document().unwrap();
    drop(writer);

    let characters: Vec<_> = decode_all(&out)
        .into_iter()
        .filter_map(|e| match e {
            StreamEvent::Characters(v) => Some(v.to_string()),
            _ => None,
        })
        .collect();
    assert_eq!(characters, vec!["hi", "hi"]);
}

/// The same document with distinct values is longer than the one with a
/// repeat.
#[test]
fn repeats_compress_better_than_distinct_values() {
    let encode = |second: &str| {
        let mut out = Vec::new();
        let mut writer = Writer::from_writer(&mut out).unwrap();
        writer.encode_start_document().unwrap();
        writer.encode_start_element("", "r", None).unwrap();
        for value in ["hello world", second] {
            writer.encode_start_element("", "a", None).unwrap();
            writer.encode_characters(&Value::from(value)).unwrap();
            writer.encode_end_element().unwrap();
        }
        writer.encode_end_element().unwrap();
        writer.encode_end_document().unwrap();
        drop(writer);
        out
    };
    assert!(encode("hello world").len() < encode("hello again").len());
}

/// Canonical output reorders attributes by local name.
#[test]
fn canonical_attributes_sort_lexicographically() {
    let mut out = Vec::new();
    let mut writer = Writer::builder()
        .canonical(true)
        .into_writer(&mut out)
        .unwrap();
    let mut attributes = AttributeList::new();
    attributes.push_attribute("", "b", None, "1");
    attributes.push_attribute("", "a", None, "2");

    writer.encode_start_document().unwrap();
    writer.encode_start_element("", "x", None).unwrap();
    writer.encode_attribute_list(&attributes).unwrap();
    writer.encode_end_element().unwrap();
    writer.encode_end_document().unwrap();
    drop(writer);

    let names: Vec<_> = decode_all(&out)
        .into_iter()
        .filter_map(|e| match e {
            StreamEvent::Attribute {
                local_name, value, ..
            } => Some((local_name, value.to_string())),
            _ => None,
        })
        .collect();
    assert_eq!(
        names,
        vec![
            ("a".to_string(), "2".to_string()),
            ("b".to_string(), "1".to_string())
        ]
    );
}

/// `xsi:nil` leaves the attribute list ahead of everything else.
#[test]
fn xsi_nil_is_promoted_before_other_attributes() {
    let mut out = Vec::new();
    let mut writer = Writer::from_writer(&mut out).unwrap();
    let mut attributes = AttributeList::new();
    attributes.push_attribute("", "a", None, "1");
    attributes.push_attribute(
        "http://www.w3.org/2001/XMLSchema-instance",
        "nil",
        Some("xsi"),
        "true",
    );

    writer.encode_start_document().unwrap();
    writer.encode_start_element("", "x", None).unwrap();
    writer.encode_attribute_list(&attributes).unwrap();
    writer.encode_end_element().unwrap();
    writer.encode_end_document().unwrap();
    drop(writer);

    let names: Vec<_> = decode_all(&out)
        .into_iter()
        .filter_map(|e| match e {
            StreamEvent::Attribute { local_name, .. } => Some(local_name),
            _ => None,
        })
        .collect();
    assert_eq!(names, vec!["nil".to_string(), "a".to_string()]);
}

/// Builds the schema grammar of an element `{urn:log}entry` holding one
/// `xsd:dateTime` value.
fn date_time_schema() -> std::sync::Arc<quick_exi::Grammars> {
    let mut builder = SchemaGrammarsBuilder::new();
    let entry = builder.intern("urn:log", "entry");
    let first = builder.reserve_grammar(GrammarLabel::FirstStartTag);
    let end = builder.reserve_grammar(GrammarLabel::ElementContent);
    builder.set_productions(
        first,
        vec![Production {
            event: Event::Characters {
                datatype: Datatype::DateTime(DateTimeKind::DateTime),
            },
            next: end,
        }],
    );
    builder.set_productions(
        end,
        vec![Production {
            event: Event::EndElement,
            next: end,
        }],
    );
    builder.set_global_element(entry, first).unwrap();
    builder.build()
}

/// A dateTime with hour 24 decodes as midnight of the next day.
#[test]
fn schema_informed_date_time_rolls_over() {
    let grammars = date_time_schema();
    let mut out = Vec::new();
    let mut writer = Writer::builder()
        .with_grammars(grammars.clone())
        .into_writer(&mut out)
        .unwrap();
    writer.encode_start_document().unwrap();
    writer.encode_start_element("urn:log", "entry", None).unwrap();
    writer
        .encode_characters(&Value::from("2023-12-31T24:00:00Z"))
        .unwrap();
    writer.encode_end_element().unwrap();
    writer.encode_end_document().unwrap();
    drop(writer);

    let mut reader = Reader::builder()
        .with_grammars(grammars)
        .into_reader(out.as_slice())
        .unwrap();
    let expected = DateTimeValue::parse(DateTimeKind::DateTime, "2024-01-01T00:00:00Z").unwrap();
    loop {
        let (event, has_more) = reader.read_event().unwrap();
        if let StreamEvent::Characters(Value::DateTime(decoded)) = &event {
            assert_eq!(decoded, &expected);
        } else if let StreamEvent::Characters(other) = &event {
            panic!("expected a typed dateTime, got {:?}", other);
        }
        if !has_more {
            break;
        }
    }
}

/// Byte-aligned streams with an embedded options document reconfigure
/// the reader from the header alone.
#[test]
fn byte_aligned_stream_with_options_document_round_trips() {
    let mut out = Vec::new();
    let mut writer = Writer::builder()
        .coding_mode(CodingMode::BytePacked)
        .include_options(true)
        .into_writer(&mut out)
        .unwrap();
    writer.encode_start_document().unwrap();
    writer.encode_start_element("", "doc", None).unwrap();
    writer.encode_characters(&Value::from("payload")).unwrap();
    writer.encode_end_element().unwrap();
    writer.encode_end_document().unwrap();
    drop(writer);

    // The reader is built with defaults; the alignment comes out of the
    // options document.
    let events = decode_all(&out);
    assert!(events.contains(&StreamEvent::Characters(Value::from("payload"))));
}

/// Comments and processing instructions survive when their fidelity
/// options are on.
#[test]
fn comments_and_pis_round_trip_with_fidelity() {
    let mut out = Vec::new();
    let mut writer = Writer::builder()
        .preserve_comments(true)
        .preserve_pis(true)
        .include_options(true)
        .into_writer(&mut out)
        .unwrap();
    writer.encode_start_document().unwrap();
    writer.encode_start_element("", "doc", None).unwrap();
    writer.encode_comment("begin").unwrap();
    writer
        .encode_processing_instruction("target", "data")
        .unwrap();
    writer.encode_end_element().unwrap();
    writer.encode_end_document().unwrap();
    drop(writer);

    let events = decode_all(&out);
    assert!(events.contains(&StreamEvent::Comment("begin".to_string())));
    assert!(events.contains(&StreamEvent::ProcessingInstruction {
        target: "target".to_string(),
        data: "data".to_string(),
    }));
}

/// Namespace declarations come back with the element scope flag when
/// prefixes are preserved.
#[test]
fn namespace_declarations_round_trip_with_prefixes() {
    let mut out = Vec::new();
    let mut writer = Writer::builder()
        .preserve_prefixes(true)
        .include_options(true)
        .into_writer(&mut out)
        .unwrap();
    writer.encode_start_document().unwrap();
    writer.encode_start_element("urn:x", "doc", None).unwrap();
    writer
        .encode_namespace_declaration("urn:x", "p", true)
        .unwrap();
    writer.encode_end_element().unwrap();
    writer.encode_end_document().unwrap();
    drop(writer);

    let events = decode_all(&out);
    assert!(events.contains(&StreamEvent::NamespaceDeclaration {
        uri: "urn:x".to_string(),
        prefix: "p".to_string(),
        element_scope: true,
    }));
}

/// Both sides of a stream end up with identical table sizes after the
/// same event sequence.
#[test]
fn encoder_and_decoder_tables_stay_in_lock_step() {
    let mut out = Vec::new();
    let mut writer = Writer::from_writer(&mut out).unwrap();
    writer.encode_start_document().unwrap();
    writer.encode_start_element("", "r", None).unwrap();
    for value in ["one", "two", "one", "three"] {
        writer.encode_start_element("", "v", None).unwrap();
        writer.encode_characters(&Value::from(value)).unwrap();
        writer.encode_end_element().unwrap();
    }
    writer.encode_end_element().unwrap();
    writer.encode_end_document().unwrap();
    let writer_count = writer.global_value_count();
    drop(writer);

    let mut reader = Reader::from_reader(out.as_slice()).unwrap();
    while !reader.is_finished() {
        reader.read_event().unwrap();
    }
    assert_eq!(reader.global_value_count(), writer_count);
    assert_eq!(reader.depth(), 0);
}

/// A failed operation poisons the stream with its error kind.
#[test]
fn errors_poison_the_writer() {
    let mut out = Vec::new();
    let mut writer = Writer::from_writer(&mut out).unwrap();
    writer.encode_start_document().unwrap();
    // EE without an open element does not match any production.
    let err = writer.encode_end_element().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protocol);

    let err = writer.encode_start_element("", "a", None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert!(matches!(err, quick_exi::Error::Poisoned(_)));
}

/// Fragments allow a sequence of root elements.
#[test]
fn fragments_carry_multiple_roots() {
    let mut out = Vec::new();
    let mut writer = Writer::builder()
        .fragment(true)
        .include_options(true)
        .into_writer(&mut out)
        .unwrap();
    writer.encode_start_document().unwrap();
    for _ in 0..2 {
        writer.encode_start_element("", "item", None).unwrap();
        writer.encode_end_element().unwrap();
    }
    writer.encode_end_document().unwrap();
    drop(writer);

    let starts = decode_all(&out)
        .into_iter()
        .filter(|e| matches!(e, StreamEvent::StartElement { .. }))
        .count();
    assert_eq!(starts, 2);
}

/// Compression coding modes stay an explicit unsupported error.
#[test]
fn compression_modes_are_unsupported() {
    let err = Writer::builder()
        .coding_mode(CodingMode::Compression)
        .into_writer(Vec::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unsupported);
}
