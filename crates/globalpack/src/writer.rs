//! Writing output units to disk
//!
//! Each unit is written exactly once and overwrites whatever is at its
//! target path. The first failed write aborts the run; files already
//! written stay as they are.

use std::{
    fs,
    io::{self, Write},
    path::Path,
};

use log::{debug, info};

use crate::{
    error::{GlobalPackError, Result},
    types::OutputUnit,
};

/// Filesystem write capability
pub trait FileSink {
    /// Replace the file at `path` with `bytes`
    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;
}

/// Writes straight to the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSink {
    create_dirs: bool,
}

impl FsSink {
    pub fn new(create_dirs: bool) -> Self {
        Self { create_dirs }
    }
}

impl FileSink for FsSink {
    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        if self.create_dirs
            && let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, bytes)
    }
}

/// Notified after each unit has been written
pub trait WriteObserver {
    fn unit_written(&mut self, unit: &OutputUnit) -> io::Result<()>;
}

/// Prints `<source> -> <target>` for every chunk of a written unit
#[derive(Debug)]
pub struct AuditLog<W> {
    out: W,
}

impl AuditLog<io::Stdout> {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write> AuditLog<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> WriteObserver for AuditLog<W> {
    fn unit_written(&mut self, unit: &OutputUnit) -> io::Result<()> {
        for chunk in &unit.contributing_chunks {
            writeln!(self.out, "{} -> {}", chunk.source_label, unit.target_path)?;
        }
        self.out.flush()
    }
}

/// Writes units through a [`FileSink`], reporting to an optional observer
pub struct Writer<'a, S> {
    sink: &'a S,
    observer: Option<&'a mut dyn WriteObserver>,
}

impl<S> std::fmt::Debug for Writer<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Writer")
            .field("observed", &self.observer.is_some())
            .finish_non_exhaustive()
    }
}

impl<'a, S: FileSink> Writer<'a, S> {
    pub fn new(sink: &'a S) -> Self {
        Self {
            sink,
            observer: None,
        }
    }

    #[must_use]
    pub fn with_observer(mut self, observer: &'a mut dyn WriteObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Write a single unit, then notify the observer
    pub fn write_unit(&mut self, unit: &OutputUnit) -> Result<()> {
        self.sink
            .write(Path::new(&unit.target_path), unit.payload.as_bytes())
            .map_err(|source| GlobalPackError::Write {
                path: unit.target_path.clone(),
                source,
            })?;
        debug!(
            "Wrote {} ({} bytes, {} chunks)",
            unit.target_path,
            unit.payload.len(),
            unit.contributing_chunks.len()
        );

        if let Some(observer) = self.observer.as_deref_mut() {
            observer.unit_written(unit).map_err(GlobalPackError::Audit)?;
        }
        Ok(())
    }

    /// Write every unit in order, stopping at the first failure
    pub fn write_all(&mut self, units: &[OutputUnit]) -> Result<()> {
        for unit in units {
            self.write_unit(unit)?;
        }
        info!("Wrote {} files", units.len());
        Ok(())
    }
}
