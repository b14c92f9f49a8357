//! json-doc is a library implementing the core engine behind a JSON-typed
//! value store: an incremental stream lexer, a tagged-union document tree
//! with all the mutation primitives a key/value database needs, an
//! iterative serializer used for both JSON text and a persistent binary
//! form, a compact path language for addressing into a document, and a
//! per-path LRU cache for serialized output.
//!
//! This crate is the storage-engine core only — command dispatch, key
//! lifecycle, replication, and wire reply formatting belong to whatever
//! host embeds it.
//!
//! # Example
//!
//! ```
//! use json_doc::config::{CacheLimits, JsonFormat, LexerLimits};
//! use json_doc::node::Node;
//! use json_doc::{Cache, Document};
//!
//! let mut doc = Document::from_json(1, br#"{"name":"ada","tags":["math"]}"#, LexerLimits::default()).unwrap();
//! let mut cache = Cache::new(CacheLimits::default());
//!
//! doc.array_append(&mut cache, b".tags", Node::String(b"logic".to_vec())).unwrap();
//!
//! let rendered = doc.get_serialized(&mut cache, b".tags", &JsonFormat::compact()).unwrap();
//! assert_eq!(rendered, br#"["math","logic"]"#);
//! ```

pub mod builder;
pub mod cache;
pub mod codec;
pub mod config;
pub mod document;
pub mod error;
pub mod lexer;
pub mod node;
pub mod path;
pub mod position;
pub mod serializer;
pub mod trace;

pub use cache::{Cache, DocId};
pub use document::{Document, DocumentError};
pub use error::{CodecError, JsonParseError, LexError, NodeKind, ObjectError, PathError, PathParseError};
pub use node::{ArithOp, KeyVal, Node};
