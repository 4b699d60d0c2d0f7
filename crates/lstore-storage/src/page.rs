//! Fixed-capacity column pages and the lockstep page sets built from them

use lstore_common::error::StorageError;
use lstore_common::types::Value;
use tracing::debug;

use crate::page_directory::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Present(Value),
    Absent,
    Tombstone,
}

/// Append-only, single-column container of at most `capacity` values
#[derive(Debug, Clone)]
pub struct Page {
    slots: Vec<Slot>,
    capacity: usize,
    tombstones: usize,
}

impl Page {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            tombstones: 0,
        }
    }

    /// Append a value, returning its slot. `None` stores an absent marker.
    pub fn write(&mut self, value: Option<Value>) -> Result<usize, StorageError> {
        if !self.has_capacity() {
            return Err(StorageError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        let slot = self.slots.len();
        self.slots.push(value.map_or(Slot::Absent, Slot::Present));
        Ok(slot)
    }

    /// Value at `slot`; `None` for absent, tombstoned or unwritten slots
    pub fn read(&self, slot: usize) -> Option<Value> {
        match self.slots.get(slot) {
            Some(Slot::Present(value)) => Some(*value),
            _ => None,
        }
    }

    /// Whether `slot` was written and not yet tombstoned
    pub fn is_live(&self, slot: usize) -> bool {
        matches!(self.slots.get(slot), Some(Slot::Present(_) | Slot::Absent))
    }

    /// Mark a slot dead for reclamation. Returns false if it was not live.
    pub fn tombstone(&mut self, slot: usize) -> bool {
        match self.slots.get_mut(slot) {
            Some(entry) if *entry != Slot::Tombstone => {
                *entry = Slot::Tombstone;
                self.tombstones += 1;
                true
            }
            _ => false,
        }
    }

    pub fn has_capacity(&self) -> bool {
        self.slots.len() < self.capacity
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.slots.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn num_records(&self) -> usize {
        self.slots.len()
    }

    pub fn live_records(&self) -> usize {
        self.slots.len() - self.tombstones
    }

    /// Full and every slot tombstoned
    pub fn is_reclaimable(&self) -> bool {
        !self.has_capacity() && self.tombstones == self.slots.len()
    }
}

/// One address space (base or tail) of a table: a page stream per physical
/// column, all advancing in lockstep so a record occupies the same
/// `(page, slot)` in every stream.
#[derive(Debug)]
pub struct PageSet {
    space: &'static str,
    page_capacity: usize,
    /// `streams[column][page]`; released pages become `None` so page numbers stay stable
    streams: Vec<Vec<Option<Page>>>,
}

impl PageSet {
    pub fn new(space: &'static str, num_streams: usize, page_capacity: usize) -> Self {
        Self {
            space,
            page_capacity,
            streams: (0..num_streams).map(|_| Vec::new()).collect(),
        }
    }

    pub fn space(&self) -> &'static str {
        self.space
    }

    pub fn num_streams(&self) -> usize {
        self.streams.len()
    }

    /// Write one value per stream, opening a new page generation when the
    /// current one is full. Returns true in the second field if a page was opened.
    pub fn append(&mut self, row: &[Option<Value>]) -> Result<(Location, bool), StorageError> {
        if row.len() != self.streams.len() {
            return Err(StorageError::CorruptData(format!(
                "{} row has {} physical columns, page set has {}",
                self.space,
                row.len(),
                self.streams.len()
            )));
        }

        match self.try_append(row) {
            Ok(location) => Ok((location, false)),
            Err(StorageError::CapacityExceeded { .. }) => {
                self.open_page();
                self.try_append(row).map(|location| (location, true))
            }
            Err(e) => Err(e),
        }
    }

    fn try_append(&mut self, row: &[Option<Value>]) -> Result<Location, StorageError> {
        let page = self.open_page_number().ok_or(StorageError::CapacityExceeded {
            capacity: self.page_capacity,
        })?;

        let mut slot = None;
        for (stream, value) in self.streams.iter_mut().zip(row) {
            let target = stream[page].as_mut().ok_or_else(|| {
                StorageError::CorruptData(format!("open page {page} was released"))
            })?;
            let written = target.write(*value)?;
            match slot {
                None => slot = Some(written),
                Some(expected) if expected != written => {
                    return Err(StorageError::CorruptData(format!(
                        "page streams out of step at page {page}: slot {written} != {expected}"
                    )));
                }
                Some(_) => {}
            }
        }

        let slot = slot.ok_or_else(|| StorageError::CorruptData("empty page set".to_string()))?;
        Ok(Location { page, slot })
    }

    /// Last page, if it still has room
    fn open_page_number(&self) -> Option<usize> {
        let first = self.streams.first()?;
        let page = first.len().checked_sub(1)?;
        first[page]
            .as_ref()
            .filter(|p| p.has_capacity())
            .map(|_| page)
    }

    fn open_page(&mut self) {
        for stream in &mut self.streams {
            stream.push(Some(Page::new(self.page_capacity)));
        }
        debug!(
            space = self.space,
            page = self.num_pages() - 1,
            "opened page generation"
        );
    }

    /// Value of `column` at `location`
    pub fn read(&self, location: Location, column: usize) -> Option<Value> {
        self.page(column, location.page)?.read(location.slot)
    }

    /// Whether a record is stored (and not tombstoned) at `location`
    pub fn is_live(&self, location: Location) -> bool {
        self.page(0, location.page)
            .is_some_and(|p| p.is_live(location.slot))
    }

    fn page(&self, column: usize, page: usize) -> Option<&Page> {
        self.streams.get(column)?.get(page)?.as_ref()
    }

    /// Tombstone a record in every stream
    pub fn tombstone(&mut self, location: Location) -> bool {
        let mut any = false;
        for stream in &mut self.streams {
            if let Some(Some(page)) = stream.get_mut(location.page) {
                any |= page.tombstone(location.slot);
            }
        }
        any
    }

    /// Drop fully tombstoned pages other than the open one. Returns how many
    /// page generations were released.
    pub fn release_reclaimable(&mut self) -> usize {
        let Some(first) = self.streams.first() else {
            return 0;
        };
        let last = first.len().saturating_sub(1);
        let reclaimable: Vec<usize> = first
            .iter()
            .enumerate()
            .filter(|(page, entry)| {
                *page != last && entry.as_ref().is_some_and(Page::is_reclaimable)
            })
            .map(|(page, _)| page)
            .collect();

        for &page in &reclaimable {
            for stream in &mut self.streams {
                stream[page] = None;
            }
        }
        if !reclaimable.is_empty() {
            debug!(space = self.space, released = reclaimable.len(), "released pages");
        }
        reclaimable.len()
    }

    /// Page generations ever opened, including released ones
    pub fn num_pages(&self) -> usize {
        self.streams.first().map_or(0, Vec::len)
    }

    /// Page generations still resident
    pub fn resident_pages(&self) -> usize {
        self.streams
            .first()
            .map_or(0, |s| s.iter().filter(|p| p.is_some()).count())
    }

    /// Resident page generations with no room left
    pub fn full_pages(&self) -> usize {
        self.streams.first().map_or(0, |s| {
            s.iter()
                .filter(|p| p.as_ref().is_some_and(|p| !p.has_capacity()))
                .count()
        })
    }

    /// Live records across resident pages
    pub fn live_records(&self) -> usize {
        self.streams.first().map_or(0, |s| {
            s.iter().flatten().map(Page::live_records).sum()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_write_read() {
        let mut page = Page::new(4);
        assert_eq!(page.write(Some(7)).unwrap(), 0);
        assert_eq!(page.write(None).unwrap(), 1);
        assert_eq!(page.read(0), Some(7));
        assert_eq!(page.read(1), None);
        assert!(page.is_live(1));
        assert_eq!(page.read(9), None);
        assert_eq!(page.remaining(), 2);
    }

    #[test]
    fn test_page_capacity() {
        let mut page = Page::new(2);
        page.write(Some(1)).unwrap();
        page.write(Some(2)).unwrap();
        assert!(!page.has_capacity());
        assert_eq!(
            page.write(Some(3)),
            Err(StorageError::CapacityExceeded { capacity: 2 })
        );
        assert_eq!(page.num_records(), 2);
    }

    #[test]
    fn test_page_tombstone() {
        let mut page = Page::new(2);
        page.write(Some(1)).unwrap();
        page.write(Some(2)).unwrap();

        assert!(page.tombstone(0));
        assert!(!page.tombstone(0));
        assert_eq!(page.read(0), None);
        assert!(!page.is_reclaimable());

        assert!(page.tombstone(1));
        assert!(page.is_reclaimable());
        assert_eq!(page.live_records(), 0);
    }

    #[test]
    fn test_page_set_lockstep() {
        let mut set = PageSet::new("base", 3, 2);
        let (a, opened) = set.append(&[Some(1), Some(10), Some(100)]).unwrap();
        assert!(opened);
        let (b, opened) = set.append(&[Some(2), None, Some(200)]).unwrap();
        assert!(!opened);
        let (c, opened) = set.append(&[Some(3), Some(30), Some(300)]).unwrap();
        assert!(opened);

        assert_eq!(a, Location { page: 0, slot: 0 });
        assert_eq!(b, Location { page: 0, slot: 1 });
        assert_eq!(c, Location { page: 1, slot: 0 });

        assert_eq!(set.read(b, 0), Some(2));
        assert_eq!(set.read(b, 1), None);
        assert_eq!(set.read(c, 2), Some(300));
        assert_eq!(set.num_pages(), 2);
        assert_eq!(set.full_pages(), 1);
    }

    #[test]
    fn test_page_set_rejects_wrong_width() {
        let mut set = PageSet::new("tail", 2, 4);
        assert!(matches!(
            set.append(&[Some(1)]),
            Err(StorageError::CorruptData(_))
        ));
    }

    #[test]
    fn test_release_skips_open_page() {
        let mut set = PageSet::new("tail", 1, 1);
        let (a, _) = set.append(&[Some(1)]).unwrap();
        let (b, _) = set.append(&[Some(2)]).unwrap();

        set.tombstone(a);
        set.tombstone(b);
        assert_eq!(set.release_reclaimable(), 1);
        assert_eq!(set.resident_pages(), 1);
        assert_eq!(set.read(a, 0), None);
        assert!(!set.is_live(a));

        // Page numbers stay stable after release
        let (c, _) = set.append(&[Some(3)]).unwrap();
        assert_eq!(c.page, 2);
        assert_eq!(set.live_records(), 1);
    }
}
