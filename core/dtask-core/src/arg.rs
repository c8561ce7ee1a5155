//!
//! Argument records: the per-parameter descriptor the conflict scan compares.
//!
//! A record names a base address, a byte size (for scalars, the whole
//! binding's footprint; for arrays, the base buffer's footprint), whether the
//! binding is writable, and — for array selections — the per-dimension
//! inclusive ranges actually touched. Records within one work item's
//! argument list are kept non-decreasing by `addr`.
//!

use crate::range::Range;

#[derive(Debug, Clone)]
pub struct ArgRecord {
    pub addr: usize,
    pub size: usize,
    pub writable: bool,
    /// `None` for a scalar binding; `Some(ranges)` for a rank-N array
    /// selection, one inclusive range per dimension.
    pub ranges: Option<Vec<Range>>,
}

impl ArgRecord {
    pub fn scalar(addr: usize, size: usize, writable: bool) -> Self {
        Self { addr, size, writable, ranges: None }
    }

    pub fn array(addr: usize, writable: bool, ranges: Vec<Range>) -> Self {
        debug_assert!(!ranges.is_empty(), "an array record needs rank >= 1");
        Self { addr, size: 0, writable, ranges: Some(ranges) }
    }

    pub fn rank(&self) -> usize {
        self.ranges.as_ref().map_or(0, Vec::len)
    }

    fn scalar_interval_overlaps(&self, other: &ArgRecord) -> bool {
        self.addr < other.addr.saturating_add(other.size) && other.addr < self.addr.saturating_add(self.size)
    }

    /// §4.3: scalar-vs-scalar and array-vs-array (same base) overlap tests.
    /// Records of different kinds, or arrays with different base addresses,
    /// never overlap — they describe disjoint objects by construction.
    pub fn overlaps(&self, other: &ArgRecord) -> bool {
        if !(self.writable || other.writable) {
            return false;
        }
        match (&self.ranges, &other.ranges) {
            (None, None) => self.scalar_interval_overlaps(other),
            (Some(a), Some(b)) => {
                self.addr == other.addr
                    && a.len() == b.len()
                    && a.iter().zip(b.iter()).all(|(x, y)| x.intersects(y))
            }
            _ => false,
        }
    }

    /// §4.3 containment test, used for the AncestorEscape optimization and
    /// for the "more recent writer subsumes an older view" scan shortcut.
    /// Containment requires `self` to be writable: only a writer can subsume
    /// a dependent's view of a region.
    pub fn contains(&self, other: &ArgRecord) -> bool {
        if !self.writable {
            return false;
        }
        match (&self.ranges, &other.ranges) {
            (None, None) => self.addr <= other.addr && other.addr.saturating_add(other.size) <= self.addr.saturating_add(self.size),
            (Some(a), Some(b)) => {
                self.addr == other.addr
                    && a.len() == b.len()
                    && a.iter().zip(b.iter()).all(|(x, y)| x.contains(y))
            }
            _ => false,
        }
    }
}

/// Inserts `new` into `args` keeping addresses non-decreasing. Two scalar
/// records at the same address are merged (§4.3): the union is writable if
/// either was, and the larger size wins. Array records sharing a base
/// address are never merged — every selection is kept distinct so rank and
/// ranges remain comparable during the conflict scan.
pub fn insert_sorted(args: &mut Vec<ArgRecord>, new: ArgRecord) {
    if new.ranges.is_none() {
        if let Some(existing) = args.iter_mut().find(|a| a.ranges.is_none() && a.addr == new.addr) {
            existing.writable = existing.writable || new.writable;
            existing.size = existing.size.max(new.size);
            return;
        }
    }
    let pos = args.partition_point(|a| a.addr <= new.addr);
    args.insert(pos, new);
}
