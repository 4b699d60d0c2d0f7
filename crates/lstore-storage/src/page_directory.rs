//! Record id to physical location bookkeeping

use dashmap::DashMap;
use lstore_common::types::RecordId;

/// Position of a record inside a page set. The same location addresses the
/// record in every column stream of that set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Location {
    /// Page generation number
    pub page: usize,
    /// Slot within the page
    pub slot: usize,
}

/// Maps every live rid to where it is stored, with separate address spaces for
/// base and tail records. Never interprets record contents.
#[derive(Debug, Default)]
pub struct PageDirectory {
    base: DashMap<RecordId, Location>,
    tail: DashMap<RecordId, Location>,
}

impl PageDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record or repoint a base record. Returns the previous location.
    pub fn put_base(&self, rid: RecordId, location: Location) -> Option<Location> {
        self.base.insert(rid, location)
    }

    pub fn put_tail(&self, rid: RecordId, location: Location) -> Option<Location> {
        self.tail.insert(rid, location)
    }

    pub fn get_base(&self, rid: RecordId) -> Option<Location> {
        self.base.get(&rid).map(|entry| *entry)
    }

    pub fn get_tail(&self, rid: RecordId) -> Option<Location> {
        self.tail.get(&rid).map(|entry| *entry)
    }

    /// Forget a rid in both address spaces. Idempotent.
    pub fn remove(&self, rid: RecordId) -> Option<Location> {
        let base = self.base.remove(&rid).map(|(_, loc)| loc);
        let tail = self.tail.remove(&rid).map(|(_, loc)| loc);
        base.or(tail)
    }

    pub fn remove_tail(&self, rid: RecordId) -> Option<Location> {
        self.tail.remove(&rid).map(|(_, loc)| loc)
    }

    /// Snapshot of every live base rid, ascending
    pub fn base_rids(&self) -> Vec<RecordId> {
        let mut rids: Vec<RecordId> = self.base.iter().map(|entry| *entry.key()).collect();
        rids.sort_unstable();
        rids
    }

    pub fn base_len(&self) -> usize {
        self.base.len()
    }

    pub fn tail_len(&self) -> usize {
        self.tail.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(page: usize, slot: usize) -> Location {
        Location { page, slot }
    }

    #[test]
    fn test_separate_address_spaces() {
        let dir = PageDirectory::new();
        dir.put_base(1, loc(0, 0));
        dir.put_tail(2, loc(0, 0));

        assert_eq!(dir.get_base(1), Some(loc(0, 0)));
        assert_eq!(dir.get_tail(1), None);
        assert_eq!(dir.get_tail(2), Some(loc(0, 0)));
        assert_eq!(dir.get_base(2), None);
    }

    #[test]
    fn test_repoint_returns_previous() {
        let dir = PageDirectory::new();
        assert_eq!(dir.put_base(1, loc(0, 3)), None);
        assert_eq!(dir.put_base(1, loc(4, 0)), Some(loc(0, 3)));
        assert_eq!(dir.get_base(1), Some(loc(4, 0)));
        assert_eq!(dir.base_len(), 1);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let dir = PageDirectory::new();
        dir.put_base(5, loc(1, 1));
        dir.put_tail(6, loc(0, 2));

        assert_eq!(dir.remove(5), Some(loc(1, 1)));
        assert_eq!(dir.remove(5), None);
        assert_eq!(dir.remove_tail(6), Some(loc(0, 2)));
        assert_eq!(dir.remove(6), None);
        assert_eq!(dir.base_len() + dir.tail_len(), 0);
    }

    #[test]
    fn test_base_rids_sorted() {
        let dir = PageDirectory::new();
        for rid in [9, 3, 7] {
            dir.put_base(rid, loc(0, 0));
        }
        assert_eq!(dir.base_rids(), vec![3, 7, 9]);
    }
}
