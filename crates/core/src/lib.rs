//! Core types and error model for ProtoBase.
//!
//! This crate defines the foundational types shared across the workspace:
//! - [`pointer::AtomPointer`]: content-addressed identity of a persisted atom
//! - [`atom::Atom`] / [`atom::AtomKind`]: the tagged-variant atom record
//! - [`value::Value`]: primitive field values and atom references
//! - [`hash::content_hash`]: canonical hashing rules (spec.md §4.4.6)
//! - [`error::Error`]: the unified error type every layer returns
//! - [`config::Config`]: recognized configuration (spec.md §6.5)

#![warn(missing_docs)]

pub mod atom;
pub mod config;
pub mod error;
pub mod hash;
pub mod pointer;
pub mod value;

pub use atom::{Atom, AtomKind};
pub use config::Config;
pub use error::{Error, Result};
pub use pointer::{AtomPointer, WalId};
pub use value::Value;
