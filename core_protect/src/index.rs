//! Per-world spatial index over claims.
//!
//! World horizontal space is partitioned into fixed 16x16 cells; each cell
//! bucket holds the ids of every claim whose footprint touches it. The index
//! owns ids only. Boxes live on the records in the arena, which callers
//! supply, so there is a single source of truth for claim geometry.
//!
//! Cell size is tuned so an average claim touches a handful of cells and an
//! average cell holds a handful of claims, keeping point lookup and overlap
//! search near-constant regardless of total claim count. Claims much larger
//! than a cell simply occupy more buckets.

use ahash::{AHashMap, AHashSet};

use crate::claim::{ClaimArena, ClaimError, ClaimId};
use crate::geometry::{BlockPos, ClaimBox};

#[derive(Debug, Clone, Default)]
pub struct ClaimIndex {
    buckets: AHashMap<(i32, i32), Vec<ClaimId>>,
}

impl ClaimIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of non-empty cell buckets (diagnostics only).
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Register a claim in every cell its footprint touches.
    ///
    /// Re-validates the sibling non-overlap invariant against the arena even
    /// though callers pre-check via [`find_overlapping`](Self::find_overlapping):
    /// the index is the last line before the invariant would be corrupted.
    pub fn insert(&mut self, record_id: ClaimId, bounds: ClaimBox, parent: Option<ClaimId>, arena: &ClaimArena) -> Result<(), ClaimError> {
        if let Some(other) = self
            .find_overlapping(bounds, Some(record_id), arena)
            .find(|id| arena[id].parent() == parent)
        {
            return Err(ClaimError::Overlap(other));
        }
        self.insert_unchecked(record_id, bounds);
        Ok(())
    }

    /// Register a claim without the sibling-overlap re-validation. Only for
    /// the explicit overlap-permitted subdivision path and bulk world load.
    pub fn insert_unchecked(&mut self, record_id: ClaimId, bounds: ClaimBox) {
        for cell in bounds.cells() {
            let bucket = self.buckets.entry(cell).or_default();
            if !bucket.contains(&record_id) {
                bucket.push(record_id);
            }
        }
    }

    /// Remove a claim from every cell of its last-known footprint. The index
    /// stores no boxes, so the footprint must be supplied by the caller.
    ///
    /// Panics if the id is missing from a cell the footprint says it should
    /// occupy: index and registry disagreeing is a programming error, and a
    /// loud stop beats a plausible-looking wrong answer.
    pub fn remove(&mut self, record_id: ClaimId, footprint: ClaimBox) {
        for cell in footprint.cells() {
            let bucket = self
                .buckets
                .get_mut(&cell)
                .unwrap_or_else(|| panic!("index missing cell {:?} for claim {}", cell, record_id));
            let before = bucket.len();
            bucket.retain(|id| *id != record_id);
            assert!(
                bucket.len() < before,
                "claim {} absent from cell {:?} it should occupy",
                record_id,
                cell
            );
            if bucket.is_empty() {
                self.buckets.remove(&cell);
            }
        }
    }

    /// The claim containing `point`, or `None` for wilderness.
    ///
    /// When claims nest, the smallest-area match wins: a subdivision is
    /// always strictly inside (and smaller than) its parent, so this resolves
    /// subdivisions over parents without walking the hierarchy. Equal areas
    /// cannot occur between nested claims; if they ever tie, the newer claim
    /// (larger id) wins deterministically.
    pub fn find_at(&self, point: BlockPos, arena: &ClaimArena) -> Option<ClaimId> {
        let bucket = self.buckets.get(&point.cell())?;
        bucket
            .iter()
            .map(|id| {
                let record = arena
                    .get(id)
                    .unwrap_or_else(|| panic!("index references unknown claim {}", id));
                (*id, record)
            })
            .filter(|(_, record)| record.bounds().contains_point(point))
            .min_by_key(|(id, record)| (record.area(), std::cmp::Reverse(*id)))
            .map(|(id, _)| id)
    }

    /// Lazily yield every claim whose box truly overlaps `bounds`, skipping
    /// `exclude` (the claim being created or resized). Callers doing a
    /// boolean check stop at the first hit; diagnostic paths enumerate all.
    pub fn find_overlapping<'a>(
        &'a self,
        bounds: ClaimBox,
        exclude: Option<ClaimId>,
        arena: &'a ClaimArena,
    ) -> impl Iterator<Item = ClaimId> + 'a {
        let mut seen: AHashSet<ClaimId> = AHashSet::new();
        bounds
            .cells()
            .filter_map(move |cell| self.buckets.get(&cell))
            .flatten()
            .copied()
            .filter(move |id| seen.insert(*id))
            .filter(move |id| Some(*id) != exclude)
            .filter(move |id| {
                let record = arena
                    .get(id)
                    .unwrap_or_else(|| panic!("index references unknown claim {}", id));
                record.bounds().overlaps(&bounds)
            })
    }
}
