//! Pipeline runner and host integration
//!
//! [`GlobalPack`] runs the stages strictly in sequence: records are tagged
//! and packed lazily, routing drains the chunk stream, and only then are
//! files written. [`install`] validates a [`Config`] and splices the stage
//! into a host's `"pack"` slot.

use log::{debug, info};
use rustc_hash::FxHashMap;

use crate::{
    config::{Config, OutfileStrategy},
    error::{GlobalPackError, Result},
    packer::{GlobalPacker, PackStream, Packer},
    router::Router,
    tagger::Tagger,
    types::ModuleRecord,
    writer::{AuditLog, FileSink, FsSink, WriteObserver, Writer},
};

/// Label of the host stage replaced by [`install`]
pub const PACK_STAGE: &str = "pack";

/// Stream of module records handed to a stage
pub type RecordStream<'a> = Box<dyn Iterator<Item = Result<ModuleRecord>> + 'a>;

/// Outcome of one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackSummary {
    /// Records received from the bundler
    pub modules: usize,
    /// Chunks produced by the packer, prelude and postlude included
    pub chunks: usize,
    /// Target paths written, in write order
    pub files: Vec<String>,
}

/// Tag, pack, route and write a bundle
pub struct GlobalPack<P, S> {
    strategy: OutfileStrategy,
    packer: P,
    sink: S,
    observer: Option<Box<dyn WriteObserver>>,
}

impl<P, S> std::fmt::Debug for GlobalPack<P, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalPack")
            .field("strategy", &self.strategy)
            .field("observed", &self.observer.is_some())
            .finish_non_exhaustive()
    }
}

impl GlobalPack<GlobalPacker, FsSink> {
    /// Stage writing to the local filesystem with the global packer
    pub fn from_config(mut config: Config) -> Result<Self> {
        let strategy = config.outfile_strategy()?;
        let mut stage = Self::new(
            strategy,
            GlobalPacker::new(config.scope.as_deref()),
            FsSink::new(config.create_dirs),
        );
        if config.verbose {
            stage = stage.with_observer(Box::new(AuditLog::stdout()));
        }
        Ok(stage)
    }
}

impl<P: Packer, S: FileSink> GlobalPack<P, S> {
    pub fn new(strategy: OutfileStrategy, packer: P, sink: S) -> Self {
        Self {
            strategy,
            packer,
            sink,
            observer: None,
        }
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Box<dyn WriteObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Run one pass over `records`
    ///
    /// Nothing is written unless the whole record stream was consumed
    /// without error.
    pub fn run<I>(&mut self, records: I) -> Result<PackSummary>
    where
        I: IntoIterator<Item = Result<ModuleRecord>>,
    {
        let mut tagger = Tagger::new(records.into_iter());
        let units = {
            let chunks = PackStream::new(&mut tagger, &mut self.packer);
            Router::new(&mut self.strategy).route(chunks)?
        };
        let modules = tagger.identities().len();
        debug!(
            "Routed {modules} modules into {} output units",
            units.len()
        );

        let mut writer = Writer::new(&self.sink);
        if let Some(observer) = self.observer.as_deref_mut() {
            writer = writer.with_observer(observer);
        }
        writer.write_all(&units)?;

        Ok(PackSummary {
            modules,
            chunks: modules + 2,
            files: units.into_iter().map(|unit| unit.target_path).collect(),
        })
    }
}

/// A step of the host's bundle pipeline that consumes module records
pub trait BundleStage {
    fn run(&mut self, records: RecordStream<'_>) -> Result<PackSummary>;
}

impl<P: Packer, S: FileSink> BundleStage for GlobalPack<P, S> {
    fn run(&mut self, records: RecordStream<'_>) -> Result<PackSummary> {
        Self::run(self, records)
    }
}

/// Registration handle of a host pipeline
pub trait StageRegistry {
    /// Put `stage` under `label`, returning the stage it replaced
    fn splice(&mut self, label: &str, stage: Box<dyn BundleStage>) -> Option<Box<dyn BundleStage>>;
}

/// Minimal host pipeline with labelled stages
#[derive(Default)]
pub struct BundlePipeline {
    stages: FxHashMap<String, Box<dyn BundleStage>>,
}

impl std::fmt::Debug for BundlePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundlePipeline")
            .field("stages", &self.stages.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl BundlePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_stage(&self, label: &str) -> bool {
        self.stages.contains_key(label)
    }

    /// Feed `records` to the pack stage
    pub fn bundle<I>(&mut self, records: I) -> Result<PackSummary>
    where
        I: IntoIterator<Item = Result<ModuleRecord>>,
    {
        let stage = self
            .stages
            .get_mut(PACK_STAGE)
            .ok_or_else(|| GlobalPackError::MissingStage {
                label: PACK_STAGE.to_owned(),
            })?;
        stage.run(Box::new(records.into_iter()))
    }
}

impl StageRegistry for BundlePipeline {
    fn splice(&mut self, label: &str, stage: Box<dyn BundleStage>) -> Option<Box<dyn BundleStage>> {
        self.stages.insert(label.to_owned(), stage)
    }
}

/// Validate `config` and replace the registry's pack stage with globalpack
///
/// Fails before touching the registry when neither or both of
/// `write_to_dir` and `get_outfile` are set.
pub fn install(registry: &mut dyn StageRegistry, config: Config) -> Result<()> {
    let stage = GlobalPack::from_config(config)?;
    info!("Installing globalpack as the `{PACK_STAGE}` stage");
    if registry.splice(PACK_STAGE, Box::new(stage)).is_some() {
        debug!("Replaced existing `{PACK_STAGE}` stage");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{
        cell::RefCell,
        io,
        path::{Path, PathBuf},
        rc::Rc,
    };

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::types::ModuleIdentity;

    /// Echoes record content; boundaries are fixed strings
    struct EchoPacker;

    impl Packer for EchoPacker {
        fn prelude(&mut self) -> Result<String> {
            Ok("PRELUDE".to_owned())
        }

        fn pack_module(&mut self, record: &ModuleRecord) -> Result<String> {
            Ok(record.content.clone())
        }

        fn postlude(&mut self) -> Result<String> {
            Ok("POSTLUDE".to_owned())
        }
    }

    #[derive(Default)]
    struct MemorySink {
        writes: RefCell<Vec<(String, String)>>,
    }

    impl FileSink for MemorySink {
        fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
            self.writes.borrow_mut().push((
                path.to_string_lossy().into_owned(),
                String::from_utf8_lossy(bytes).into_owned(),
            ));
            Ok(())
        }
    }

    /// Shares audit output with the test after the stage took ownership
    #[derive(Clone, Default)]
    struct SharedAudit(Rc<RefCell<Vec<String>>>);

    impl WriteObserver for SharedAudit {
        fn unit_written(&mut self, unit: &crate::types::OutputUnit) -> io::Result<()> {
            for chunk in &unit.contributing_chunks {
                self.0
                    .borrow_mut()
                    .push(format!("{} -> {}", chunk.source_label, unit.target_path));
            }
            Ok(())
        }
    }

    fn records(ids: &[&str]) -> Vec<Result<ModuleRecord>> {
        ids.iter()
            .map(|id| Ok(ModuleRecord::new(*id, id.to_uppercase())))
            .collect()
    }

    #[test]
    fn test_run_writes_every_unit() {
        let mut stage = GlobalPack::new(
            OutfileStrategy::Directory(PathBuf::from("out")),
            EchoPacker,
            MemorySink::default(),
        );
        let summary = stage.run(records(&["a", "b"])).unwrap();

        assert_eq!(summary.modules, 2);
        assert_eq!(summary.chunks, 4);
        let writes = stage.sink().writes.borrow();
        let contents: Vec<_> = writes.iter().map(|(_, c)| c.as_str()).collect();
        assert_eq!(contents, ["PRELUDE\n", "A\n", "B\n", "POSTLUDE\n"]);
        assert_eq!(summary.files.len(), writes.len());
    }

    #[test]
    fn test_upstream_error_writes_nothing() {
        let mut stage = GlobalPack::new(
            OutfileStrategy::Directory(PathBuf::from("out")),
            EchoPacker,
            MemorySink::default(),
        );
        let mut input = records(&["a"]);
        input.push(Err(GlobalPackError::upstream("bundler exited")));
        input.extend(records(&["b"]));

        let err = stage.run(input).unwrap_err();
        assert!(matches!(err, GlobalPackError::Upstream(_)));
        assert!(stage.sink().writes.borrow().is_empty());
    }

    #[test]
    fn test_observer_sees_units_in_write_order() {
        let audit = SharedAudit::default();
        let mut calls = 0;
        let mut stage = GlobalPack::new(
            OutfileStrategy::Custom(Box::new(move |_: &ModuleIdentity| {
                calls += 1;
                let name = if calls % 2 == 0 { "even.js" } else { "odd.js" };
                name.to_owned()
            })),
            EchoPacker,
            MemorySink::default(),
        )
        .with_observer(Box::new(audit.clone()));
        stage.run(records(&["a", "b"])).unwrap();

        assert_eq!(
            *audit.0.borrow(),
            [
                "(prelude) -> odd.js",
                "b -> odd.js",
                "a -> even.js",
                "(postlude) -> even.js",
            ]
        );
    }

    #[test]
    fn test_install_replaces_pack_stage() {
        let mut pipeline = BundlePipeline::new();
        assert!(matches!(
            pipeline.bundle(Vec::new()),
            Err(GlobalPackError::MissingStage { .. })
        ));

        install(&mut pipeline, Config::directory("unused")).unwrap();
        assert!(pipeline.has_stage(PACK_STAGE));
    }

    #[test]
    fn test_install_rejects_invalid_config_untouched() {
        let mut pipeline = BundlePipeline::new();

        let err = install(&mut pipeline, Config::default()).unwrap_err();
        assert!(err.is_configuration());

        let mut both = Config::custom(|_| "x.js".to_owned());
        both.write_to_dir = Some(PathBuf::from("out"));
        let err = install(&mut pipeline, both).unwrap_err();
        assert!(matches!(err, GlobalPackError::ConflictingOutput));

        assert!(!pipeline.has_stage(PACK_STAGE));
    }
}
