//! `BlockProvider` backends, WAL frame format, and root-pointer persistence
//! (spec.md §4.1, §6.1, §6.3, §6.4).
//!
//! This crate owns everything byte-level: how a space's WAL segments and
//! root pointer live on disk (or in memory), and how a single record is
//! framed. It knows nothing about atoms, caching, or transactions — those
//! live in `protobase-storage` and `protobase-concurrency`, layered on top
//! of the [`provider::BlockProvider`] trait defined here.

#![warn(missing_docs)]

pub mod file;
pub mod frame;
pub mod lock;
pub mod memory;
pub mod provider;
pub mod root_pointer;

pub use file::FileBlockProvider;
pub use frame::{
    decode_atom_payload, encode_atom_payload, encode_frame, read_frame, DecodedFrame, Format,
};
pub use memory::MemoryBlockProvider;
pub use provider::{BlockProvider, ReadStream, RootScopeGuard, WriteStream};
