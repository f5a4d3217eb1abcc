//! High performance Efficient XML Interchange (EXI) encoder and decoder.
//!
//! EXI is the W3C binary representation of the XML information set:
//! instead of angle brackets, a stream carries grammar-driven event
//! codes packed down to single bits, and repeated names and values
//! shrink to small table indices. This crate implements the core codec:
//! the bit- and byte-aligned channels, the typed value model, the
//! schema-less and schema-informed grammars with runtime learning, and
//! the string table.
//!
//! ## Writing
//!
//! ```
//! use quick_exi::{AttributeList, Value, Writer};
//!
//! let mut out = Vec::new();
//! let mut writer = Writer::builder()
//!     .include_cookie(true)
//!     .into_writer(&mut out)
//!     .unwrap();
//!
//! let mut attributes = AttributeList::new();
//! attributes.push_attribute("", "lang", None, "en");
//!
//! writer.encode_start_document().unwrap();
//! writer.encode_start_element("", "note", None).unwrap();
//! writer.encode_attribute_list(&attributes).unwrap();
//! writer.encode_characters(&Value::from("remember the milk")).unwrap();
//! writer.encode_end_element().unwrap();
//! writer.encode_end_document().unwrap();
//!
//! assert_eq!(&out[..4], b"$EXI");
//! ```
//!
//! ## Reading
//!
//! ```
//! # use quick_exi::{Value, Writer};
//! # let mut out = Vec::new();
//! # let mut writer = Writer::from_writer(&mut out).unwrap();
//! # writer.encode_start_document().unwrap();
//! # writer.encode_start_element("", "note", None).unwrap();
//! # writer.encode_characters(&Value::from("hi")).unwrap();
//! # writer.encode_end_element().unwrap();
//! # writer.encode_end_document().unwrap();
//! use quick_exi::{Reader, StreamEvent};
//!
//! let mut reader = Reader::from_reader(out.as_slice()).unwrap();
//! loop {
//!     let (event, has_more) = reader.read_event().unwrap();
//!     match event {
//!         StreamEvent::StartElement { local_name, .. } => assert_eq!(local_name, "note"),
//!         StreamEvent::Characters(value) => assert_eq!(value.to_string(), "hi"),
//!         _ => {}
//!     }
//!     if !has_more {
//!         break;
//!     }
//! }
//! ```
//!
//! Schema-informed streams consume an already-built grammar model,
//! assembled by an external schema loader through
//! [`SchemaGrammarsBuilder`] and handed to the builders with
//! `with_grammars`. Without one, the process-wide schema-less grammar
//! set is used.

pub mod attributes;
pub mod channel;
pub mod context;
pub mod datatypes;
pub mod errors;
pub mod events;
pub mod grammar;
mod header;
pub mod options;
pub mod reader;
pub mod table;
pub mod values;
pub mod writer;

pub use crate::attributes::AttributeList;
pub use crate::errors::{Error, ErrorKind, Result};
pub use crate::events::EventKind;
pub use crate::grammar::schema::SchemaGrammarsBuilder;
pub use crate::grammar::Grammars;
pub use crate::options::{
    CodingMode, DtrMapEntry, EncodingOptions, FidelityOptions, Options,
};
pub use crate::reader::builder::ReaderBuilder;
pub use crate::reader::{Reader, StreamEvent};
pub use crate::values::Value;
pub use crate::writer::builder::WriterBuilder;
pub use crate::writer::Writer;
