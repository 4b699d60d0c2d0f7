//! Indirection table, record metadata layout and version chain walks

use dashmap::DashMap;
use lstore_common::error::StorageError;
use lstore_common::types::{RecordId, SchemaEncoding, Timestamp, Value};

use crate::page::PageSet;
use crate::page_directory::{Location, PageDirectory};

/// Metadata streams at the front of every base page set
pub(crate) mod base_meta {
    pub const RID: usize = 0;
    pub const TIMESTAMP: usize = 1;
    /// Columns folded in by merge; zero for a freshly inserted row
    pub const SCHEMA_ENCODING: usize = 2;
    pub const WIDTH: usize = 3;
}

/// Metadata streams at the front of every tail page set
pub(crate) mod tail_meta {
    pub const RID: usize = 0;
    /// Next-older tail rid; absent on the oldest tail record
    pub const INDIRECTION: usize = 1;
    pub const TIMESTAMP: usize = 2;
    pub const SCHEMA_ENCODING: usize = 3;
    pub const BASE_RID: usize = 4;
    pub const WIDTH: usize = 5;
}

// Rids, timestamps and bitmaps are stored bit-for-bit in i64 column slots.
#[allow(clippy::cast_possible_wrap)]
pub(crate) fn encode_u64(v: u64) -> Value {
    v as Value
}

#[allow(clippy::cast_sign_loss)]
pub(crate) fn decode_u64(v: Value) -> u64 {
    v as u64
}

/// Newest tail record of a base record and the number of tails behind it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ChainHead {
    pub newest: RecordId,
    pub length: usize,
}

/// Base rid to chain head. Replacing an entry is the single visible step of
/// an update; a missing entry means the row has no tail records.
#[derive(Debug, Default)]
pub(crate) struct Indirection {
    heads: DashMap<RecordId, ChainHead>,
}

impl Indirection {
    pub fn head(&self, base: RecordId) -> Option<ChainHead> {
        self.heads.get(&base).map(|entry| *entry)
    }

    /// Point `base` at a freshly written tail. Callers hold the table write
    /// lock, so the head read here cannot change underneath.
    pub fn splice(&self, base: RecordId, tail: RecordId) -> ChainHead {
        let length = self.head(base).map_or(0, |h| h.length) + 1;
        let head = ChainHead {
            newest: tail,
            length,
        };
        self.heads.insert(base, head);
        head
    }

    pub fn clear(&self, base: RecordId) -> Option<ChainHead> {
        self.heads.remove(&base).map(|(_, head)| head)
    }

    /// Base rids that currently have a chain, ascending
    pub fn bases(&self) -> Vec<RecordId> {
        let mut rids: Vec<RecordId> = self.heads.iter().map(|entry| *entry.key()).collect();
        rids.sort_unstable();
        rids
    }

    /// Total tail records reachable from all heads
    pub fn total_length(&self) -> usize {
        self.heads.iter().map(|entry| entry.length).sum()
    }
}

/// Metadata of one tail record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TailHeader {
    pub rid: RecordId,
    pub location: Location,
    pub indirection: Option<RecordId>,
    pub timestamp: Timestamp,
    pub schema: SchemaEncoding,
}

impl TailHeader {
    fn read(
        tail: &PageSet,
        base: RecordId,
        rid: RecordId,
        location: Location,
    ) -> Result<Self, StorageError> {
        let stored = tail
            .read(location, tail_meta::RID)
            .map(decode_u64)
            .ok_or_else(|| StorageError::missing_slot(rid))?;
        if stored != rid {
            return Err(StorageError::CorruptData(format!(
                "tail slot for rid {rid} holds rid {stored}"
            )));
        }
        let owner = tail.read(location, tail_meta::BASE_RID).map(decode_u64);
        if owner != Some(base) {
            return Err(StorageError::CorruptData(format!(
                "tail {rid} does not belong to base record {base}"
            )));
        }
        Ok(Self {
            rid,
            location,
            indirection: tail.read(location, tail_meta::INDIRECTION).map(decode_u64),
            timestamp: tail
                .read(location, tail_meta::TIMESTAMP)
                .map_or(0, decode_u64),
            schema: SchemaEncoding::from_bits(
                tail.read(location, tail_meta::SCHEMA_ENCODING)
                    .map_or(0, decode_u64),
            ),
        })
    }
}

/// Collect the chain of `base` newest to oldest. The walk is bounded by the
/// recorded length; a chain that ends early, runs long, or is not strictly
/// older at every step is reported as corruption.
pub(crate) fn walk_chain(
    tail: &PageSet,
    directory: &PageDirectory,
    base: RecordId,
    head: ChainHead,
) -> Result<Vec<TailHeader>, StorageError> {
    let mut chain = Vec::with_capacity(head.length);
    let mut next = Some(head.newest);

    while let Some(rid) = next {
        if chain.len() == head.length {
            return Err(StorageError::CorruptData(format!(
                "chain headed by {} is longer than its recorded length {}",
                head.newest, head.length
            )));
        }
        let location = directory
            .get_tail(rid)
            .ok_or_else(|| StorageError::missing_location(rid))?;
        let header = TailHeader::read(tail, base, rid, location)?;
        if header.indirection.is_some_and(|older| older >= rid) {
            return Err(StorageError::CorruptData(format!(
                "tail {rid} links to a record that is not older"
            )));
        }
        if chain
            .last()
            .is_some_and(|newer: &TailHeader| newer.timestamp <= header.timestamp)
        {
            return Err(StorageError::CorruptData(format!(
                "tail {rid} is not older than its successor"
            )));
        }
        next = header.indirection;
        chain.push(header);
    }

    if chain.len() != head.length {
        return Err(StorageError::CorruptData(format!(
            "chain headed by {} has {} records, expected {}",
            head.newest,
            chain.len(),
            head.length
        )));
    }
    Ok(chain)
}
