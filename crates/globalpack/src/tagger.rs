//! Identity tagging for incoming module records
//!
//! The packer only sees records; the tagger attaches each record's identity
//! and chunk position before packing so later stages never have to recover
//! them by counting.

use log::trace;

use crate::{
    error::Result,
    types::{ModuleIdentity, ModuleRecord},
};

/// A record together with its identity and the index of the chunk it becomes
#[derive(Debug, Clone)]
pub struct TaggedRecord {
    /// Chunk position; records start at 1 because the prelude occupies 0
    pub index: usize,
    pub identity: ModuleIdentity,
    pub record: ModuleRecord,
}

/// Ordered identities of every record seen so far
#[derive(Debug, Clone, Default)]
pub struct IdentityLog {
    entries: Vec<ModuleIdentity>,
}

impl IdentityLog {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Identity of the `position`-th record (0-based arrival order)
    pub fn get(&self, position: usize) -> Option<&ModuleIdentity> {
        self.entries.get(position)
    }
}

/// Iterator adapter that tags records as they arrive
///
/// Records pass through unchanged. The first upstream error is forwarded and
/// ends the stream.
#[derive(Debug)]
pub struct Tagger<I> {
    records: I,
    log: IdentityLog,
    failed: bool,
}

impl<I> Tagger<I>
where
    I: Iterator<Item = Result<ModuleRecord>>,
{
    pub fn new(records: I) -> Self {
        Self {
            records,
            log: IdentityLog::default(),
            failed: false,
        }
    }

    pub fn identities(&self) -> &IdentityLog {
        &self.log
    }

    pub fn into_identities(self) -> IdentityLog {
        self.log
    }
}

impl<I> Iterator for Tagger<I>
where
    I: Iterator<Item = Result<ModuleRecord>>,
{
    type Item = Result<TaggedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        match self.records.next()? {
            Ok(record) => {
                let identity = record.identity();
                self.log.entries.push(identity.clone());
                let index = self.log.len();
                trace!("Tagged record {index}: {}", identity.resolved_id());
                Some(Ok(TaggedRecord {
                    index,
                    identity,
                    record,
                }))
            }
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}
