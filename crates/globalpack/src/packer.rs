//! Packing step: turn tagged records into positional text chunks
//!
//! The text a [`Packer`] produces is opaque to the rest of the pipeline.
//! [`PackStream`] frames it with the prelude and postlude and carries every
//! record's identity and index onto its chunk.

use log::debug;

use crate::{
    error::{GlobalPackError, Result},
    tagger::TaggedRecord,
    types::{ChunkKind, ModuleIdentity, ModuleRecord, PackedChunk},
};

/// Scope object the global packer registers modules on
pub const DEFAULT_SCOPE: &str = "window.modules";

/// Serializes module records into loadable code text
pub trait Packer {
    fn prelude(&mut self) -> Result<String>;

    fn pack_module(&mut self, record: &ModuleRecord) -> Result<String>;

    /// Called once after the last module
    fn postlude(&mut self) -> Result<String>;
}

impl<P: Packer + ?Sized> Packer for &mut P {
    fn prelude(&mut self) -> Result<String> {
        (**self).prelude()
    }

    fn pack_module(&mut self, record: &ModuleRecord) -> Result<String> {
        (**self).pack_module(record)
    }

    fn postlude(&mut self) -> Result<String> {
        (**self).postlude()
    }
}

/// Registers every module on a shared global scope object
///
/// The prelude creates the scope object, each module becomes
/// `scope["id"] = [factory, deps]` and the postlude lists the entry modules.
#[derive(Debug, Clone)]
pub struct GlobalPacker {
    scope: String,
    entries: Vec<String>,
}

impl Default for GlobalPacker {
    fn default() -> Self {
        Self::new(None)
    }
}

impl GlobalPacker {
    pub fn new(scope: Option<&str>) -> Self {
        Self {
            scope: scope.unwrap_or(DEFAULT_SCOPE).to_owned(),
            entries: Vec::new(),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }
}

impl Packer for GlobalPacker {
    fn prelude(&mut self) -> Result<String> {
        self.entries.clear();
        Ok(format!("{scope} = {scope} || {{}};", scope = self.scope))
    }

    fn pack_module(&mut self, record: &ModuleRecord) -> Result<String> {
        let id = record.resolved_id();
        if record.entry {
            self.entries.push(id.to_owned());
        }
        let key = serde_json::to_string(id).map_err(GlobalPackError::upstream)?;
        let deps = serde_json::to_string(&record.deps).map_err(GlobalPackError::upstream)?;
        Ok(format!(
            "{scope}[{key}] = [function(require,module,exports){{\n{source}\n}}, {deps}];",
            scope = self.scope,
            source = record.content,
        ))
    }

    fn postlude(&mut self) -> Result<String> {
        let entries = serde_json::to_string(&self.entries).map_err(GlobalPackError::upstream)?;
        Ok(format!("{}.entries = {entries};", self.scope))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Prelude,
    Modules,
    Postlude,
    Done,
}

/// Stream of `N + 2` packed chunks for `N` tagged records
///
/// Pulls one record per module chunk, so nothing is read ahead of the
/// consumer. Fused after the first error.
#[derive(Debug)]
pub struct PackStream<I, P> {
    records: I,
    packer: P,
    phase: Phase,
    next_index: usize,
}

impl<I, P> PackStream<I, P>
where
    I: Iterator<Item = Result<TaggedRecord>>,
    P: Packer,
{
    pub fn new(records: I, packer: P) -> Self {
        Self {
            records,
            packer,
            phase: Phase::Prelude,
            next_index: 0,
        }
    }

    fn boundary(&mut self, kind: ChunkKind) -> Result<PackedChunk> {
        let (content, identity) = match kind {
            ChunkKind::Postlude => (self.packer.postlude()?, ModuleIdentity::postlude()),
            _ => (self.packer.prelude()?, ModuleIdentity::prelude()),
        };
        Ok(PackedChunk {
            index: self.next_index,
            kind,
            identity,
            content,
        })
    }

    fn module(&mut self, tagged: TaggedRecord) -> Result<PackedChunk> {
        let content = self.packer.pack_module(&tagged.record)?;
        Ok(PackedChunk {
            index: tagged.index,
            kind: ChunkKind::Module,
            identity: tagged.identity,
            content,
        })
    }

    fn advance(&mut self) -> Option<Result<PackedChunk>> {
        match self.phase {
            Phase::Prelude => {
                self.phase = Phase::Modules;
                Some(self.boundary(ChunkKind::Prelude))
            }
            Phase::Modules => match self.records.next() {
                Some(Ok(tagged)) => Some(self.module(tagged)),
                Some(Err(err)) => Some(Err(err)),
                None => {
                    self.phase = Phase::Postlude;
                    self.advance()
                }
            },
            Phase::Postlude => {
                self.phase = Phase::Done;
                debug!("Packed {} chunks", self.next_index + 1);
                Some(self.boundary(ChunkKind::Postlude))
            }
            Phase::Done => None,
        }
    }
}

impl<I, P> Iterator for PackStream<I, P>
where
    I: Iterator<Item = Result<TaggedRecord>>,
    P: Packer,
{
    type Item = Result<PackedChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.advance()?;
        match &item {
            Ok(chunk) => self.next_index = chunk.index + 1,
            Err(_) => self.phase = Phase::Done,
        }
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::*;
    use crate::tagger::Tagger;

    fn pack_all(records: Vec<ModuleRecord>, packer: &mut GlobalPacker) -> Vec<PackedChunk> {
        let tagger = Tagger::new(records.into_iter().map(Ok));
        PackStream::new(tagger, packer)
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_chunks_frame_records() {
        let mut packer = GlobalPacker::default();
        let chunks = pack_all(
            vec![ModuleRecord::new("/src/a.js", "a"), ModuleRecord::new("b", "b")],
            &mut packer,
        );

        let kinds: Vec<_> = chunks.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            [
                ChunkKind::Prelude,
                ChunkKind::Module,
                ChunkKind::Module,
                ChunkKind::Postlude
            ]
        );
        let indices: Vec<_> = chunks.iter().map(|c| c.index).collect();
        assert_eq!(indices, [0, 1, 2, 3]);
        assert!(chunks[0].kind.is_boundary() && chunks[3].kind.is_boundary());
        assert!(!chunks[1].kind.is_boundary());
        assert_eq!(chunks[1].identity.id, "/src/a.js");
        assert_eq!(chunks[3].identity, ModuleIdentity::postlude());
    }

    #[test]
    fn test_empty_bundle_still_has_boundaries() {
        let chunks = pack_all(Vec::new(), &mut GlobalPacker::default());
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].identity.id, "prelude");
        assert_eq!(chunks[1].identity.id, "postlude");
        assert_eq!(chunks[1].index, 1);
    }

    #[test]
    fn test_global_packer_text() {
        let mut packer = GlobalPacker::default();
        let mut record = ModuleRecord::new("/src/a.js", "module.exports = 1;").with_alias("a");
        record.entry = true;
        record.deps.insert("./b".to_owned(), "/src/b.js".to_owned());

        assert_snapshot!(packer.prelude().unwrap(), @"window.modules = window.modules || {};");
        assert_eq!(
            packer.pack_module(&record).unwrap(),
            "window.modules[\"a\"] = [function(require,module,exports){\nmodule.exports = 1;\n}, {\"./b\":\"/src/b.js\"}];"
        );
        assert_snapshot!(packer.postlude().unwrap(), @r#"window.modules.entries = ["a"];"#);
    }

    #[test]
    fn test_scope_replaces_window_modules() {
        let mut packer = GlobalPacker::new(Some("foo.bar"));
        assert_eq!(packer.scope(), "foo.bar");
        assert_snapshot!(packer.prelude().unwrap(), @"foo.bar = foo.bar || {};");
        assert_snapshot!(packer.postlude().unwrap(), @"foo.bar.entries = [];");
    }

    #[test]
    fn test_upstream_error_ends_stream() {
        let records = vec![
            Ok(ModuleRecord::new("a", "a")),
            Err(GlobalPackError::upstream("bundler crashed")),
        ];
        let mut stream = PackStream::new(Tagger::new(records.into_iter()), GlobalPacker::default());

        assert!(matches!(stream.next(), Some(Ok(ref c)) if c.kind == ChunkKind::Prelude));
        assert!(matches!(stream.next(), Some(Ok(ref c)) if c.kind == ChunkKind::Module));
        assert!(matches!(stream.next(), Some(Err(_))));
        assert!(stream.next().is_none());
    }
}
