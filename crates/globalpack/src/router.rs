//! Target path resolution and grouping of packed chunks
//!
//! Every chunk is assigned a target path; chunks sharing a path are merged
//! into one [`OutputUnit`]. Grouping needs the whole chunk stream, since any
//! later chunk may land on a path that was already seen.

use std::{
    hash::BuildHasherDefault,
    path::{Component, Path, PathBuf},
};

use indexmap::IndexMap;
use log::{debug, trace};
use rustc_hash::FxHasher;

use crate::{
    config::OutfileStrategy,
    error::{GlobalPackError, Result},
    types::{ModuleIdentity, OutputUnit, PackedChunk},
};

/// Type alias for FxHasher-based IndexMap
type FxIndexMap<K, V> = IndexMap<K, V, BuildHasherDefault<FxHasher>>;

/// Default output path of a module under `write_to_dir`
///
/// Absolute ids keep only their file stem (`/src/a.js` -> `dir/a.js`);
/// anything else is used verbatim (`foo/bar` -> `dir/foo/bar.js`). The
/// joined path is normalized, so `./a` and `a` land on the same file.
pub fn default_outfile(write_to_dir: &Path, identity: &ModuleIdentity) -> Result<String> {
    let id = identity.resolved_id();
    let name = if identity.is_path_like() {
        Path::new(id)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .ok_or_else(|| GlobalPackError::UnnamedModule { id: id.to_owned() })?
    } else {
        id.to_owned()
    };
    let joined = write_to_dir.join(format!("{name}.js"));
    Ok(normalize(&joined).to_string_lossy().into_owned())
}

/// Lexically drop `.` segments and fold `..` into the preceding segment
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other),
        }
    }
    out
}

/// Assigns target paths and merges chunks per path
#[derive(Debug)]
pub struct Router<'a> {
    strategy: &'a mut OutfileStrategy,
    units: FxIndexMap<String, OutputUnit>,
    chunks_seen: usize,
}

impl<'a> Router<'a> {
    pub fn new(strategy: &'a mut OutfileStrategy) -> Self {
        Self {
            strategy,
            units: FxIndexMap::default(),
            chunks_seen: 0,
        }
    }

    /// Resolve the target path of a single chunk
    ///
    /// Custom outfile results are used as given.
    pub fn resolve(&mut self, chunk: &PackedChunk) -> Result<String> {
        match &mut *self.strategy {
            OutfileStrategy::Directory(dir) => default_outfile(dir, &chunk.identity),
            OutfileStrategy::Custom(get_outfile) => Ok(get_outfile(&chunk.identity)),
        }
    }

    /// Add one chunk to the unit of its target path
    pub fn accept(&mut self, chunk: &PackedChunk) -> Result<()> {
        let target = self.resolve(chunk)?;
        if chunk.kind.is_boundary() {
            debug!("{} chunk -> {target}", chunk.kind);
        } else {
            trace!(
                "Chunk {} ({}) -> {target}",
                chunk.index,
                chunk.identity.source_label()
            );
        }
        self.units
            .entry(target)
            .or_insert_with_key(|key| OutputUnit::new(key.clone()))
            .push(chunk);
        self.chunks_seen += 1;
        Ok(())
    }

    /// Units in the order their target path was first seen
    pub fn finish(self) -> Vec<OutputUnit> {
        debug!(
            "Grouped {} chunks into {} output units",
            self.chunks_seen,
            self.units.len()
        );
        self.units.into_values().collect()
    }

    /// Drain a chunk stream and return the grouped units
    ///
    /// Stops at the first upstream or naming error; nothing is returned in
    /// that case.
    pub fn route<I>(mut self, chunks: I) -> Result<Vec<OutputUnit>>
    where
        I: IntoIterator<Item = Result<PackedChunk>>,
    {
        for chunk in chunks {
            self.accept(&chunk?)?;
        }
        Ok(self.finish())
    }
}
