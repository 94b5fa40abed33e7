//! Shared type definitions for the globalpack crate
//!
//! Records flow in from the bundler, chunks flow out of the packer, and
//! output units leave the router for the writer.

use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;

/// Id and source label of the synthetic prelude chunk
pub const PRELUDE_ID: &str = "prelude";
pub const PRELUDE_LABEL: &str = "(prelude)";

/// Id and source label of the synthetic postlude chunk
pub const POSTLUDE_ID: &str = "postlude";
pub const POSTLUDE_LABEL: &str = "(postlude)";

/// One module as emitted by the bundler
///
/// Field names follow the browserify dependency record (`expose`, `file`,
/// `source`); the long names are accepted as aliases.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModuleRecord {
    /// Absolute source path or logical module name
    pub id: String,
    /// Public name the module is exposed under; wins over `id` for output paths
    #[serde(default, rename = "expose", alias = "exposedAlias")]
    pub exposed_alias: Option<String>,
    /// File the module was read from
    #[serde(default, rename = "file", alias = "sourceOrigin")]
    pub source_origin: String,
    /// Generated code text
    #[serde(rename = "source", alias = "content")]
    pub content: String,
    /// Dependency name to resolved module id, only consumed by packers
    #[serde(default)]
    pub deps: IndexMap<String, String>,
    #[serde(default)]
    pub entry: bool,
}

impl ModuleRecord {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            source_origin: id.clone(),
            id,
            exposed_alias: None,
            content: content.into(),
            deps: IndexMap::new(),
            entry: false,
        }
    }

    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.exposed_alias = Some(alias.into());
        self
    }

    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.source_origin = origin.into();
        self
    }

    pub fn identity(&self) -> ModuleIdentity {
        ModuleIdentity {
            id: self.id.clone(),
            exposed_alias: self.exposed_alias.clone(),
            source_origin: self.source_origin.clone(),
        }
    }

    /// Id used for output naming: the exposed alias if present, else the id
    pub fn resolved_id(&self) -> &str {
        self.exposed_alias.as_deref().unwrap_or(&self.id)
    }
}

/// Identity metadata of a chunk, handed to custom outfile functions
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleIdentity {
    pub id: String,
    pub exposed_alias: Option<String>,
    pub source_origin: String,
}

impl ModuleIdentity {
    pub fn prelude() -> Self {
        Self::synthetic(PRELUDE_ID, PRELUDE_LABEL)
    }

    pub fn postlude() -> Self {
        Self::synthetic(POSTLUDE_ID, POSTLUDE_LABEL)
    }

    fn synthetic(id: &str, label: &str) -> Self {
        Self {
            id: id.to_owned(),
            exposed_alias: None,
            source_origin: label.to_owned(),
        }
    }

    pub fn resolved_id(&self) -> &str {
        self.exposed_alias.as_deref().unwrap_or(&self.id)
    }

    /// Label used in audit lines; falls back to the id when no origin is known
    pub fn source_label(&self) -> &str {
        if self.source_origin.is_empty() {
            &self.id
        } else {
            &self.source_origin
        }
    }

    /// Whether the resolved id is an absolute filesystem path
    pub fn is_path_like(&self) -> bool {
        Path::new(self.resolved_id()).is_absolute()
    }
}

/// Position class of a packed chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkKind {
    /// Bootstrap code emitted before any module
    Prelude,

    /// Code for exactly one module record
    Module,

    /// Closing code emitted after the last module
    Postlude,
}

impl ChunkKind {
    pub fn is_boundary(&self) -> bool {
        !matches!(self, Self::Module)
    }
}

impl std::fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Prelude => write!(f, "prelude"),
            Self::Module => write!(f, "module"),
            Self::Postlude => write!(f, "postlude"),
        }
    }
}

/// A text fragment from the packer with its identity attached
///
/// For `N` records the packer emits `N + 2` chunks: index 0 is the prelude,
/// `1..=N` follow the records in order and `N + 1` is the postlude.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedChunk {
    pub index: usize,
    pub kind: ChunkKind,
    pub identity: ModuleIdentity,
    pub content: String,
}

/// Where one piece of an output unit came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSource {
    pub source_label: String,
    pub chunk_index: usize,
}

/// All chunks that resolved to one target path, merged into one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputUnit {
    pub target_path: String,
    /// Chunk contents in arrival order, each terminated by `\n`
    pub payload: String,
    pub contributing_chunks: Vec<ChunkSource>,
}

impl OutputUnit {
    pub(crate) fn new(target_path: String) -> Self {
        Self {
            target_path,
            payload: String::new(),
            contributing_chunks: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, chunk: &PackedChunk) {
        self.payload.push_str(&chunk.content);
        self.payload.push('\n');
        self.contributing_chunks.push(ChunkSource {
            source_label: chunk.identity.source_label().to_owned(),
            chunk_index: chunk.index,
        });
    }
}
