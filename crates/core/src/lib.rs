//! Core value model and error types for bmdb.
//!
//! This crate defines the foundational types every other crate in the
//! workspace builds on:
//! - [`value::Value`] / [`value::Document`]: the schemaless tree type and
//! its table-row wrapper.
//! - [`key::Path`]: dotted field-path addressing into a `Value`.
//! - [`error::Error`]: the unified error taxonomy.
//! - [`limits`]: fixed wire-format constants shared by the codec, B-tree,
//! and binary file store.

#![warn(missing_docs)]

pub mod clock;
pub mod error;
pub mod key;
pub mod limits;
pub mod value;

pub use clock::{Clock, SteppableClock, SystemClock};
pub use error::{Error, Result};
pub use key::{Path, PathSegment};
pub use value::{Document, OrderedMap, Value, DOC_ID_FIELD, DOC_ID_FIELD_CAMEL};
