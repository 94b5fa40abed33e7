//! Write each module of a bundle to its own file.
//!
//! The crate sits where a bundler would normally run its packing step: module
//! records are tagged with their identity, packed into text chunks, routed to
//! target paths, merged per path and written to disk once per file.

pub mod config;
pub mod error;
pub mod packer;
pub mod pipeline;
pub mod router;
pub mod tagger;
pub mod types;
pub mod writer;

pub use config::{Config, OutfileStrategy};
pub use error::{GlobalPackError, Result};
pub use pipeline::{BundlePipeline, GlobalPack, PackSummary, StageRegistry, install};
pub use types::{ModuleIdentity, ModuleRecord, OutputUnit, PackedChunk};
