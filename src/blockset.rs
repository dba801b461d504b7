//! A collection of alignment blocks with a genome-range index over all of
//! their rows.
//!
//! Blocks are keyed by object id so iteration is deterministic. The range
//! index is built lazily on the first overlap query and updated as blocks
//! are added; entries belonging to deleted or removed blocks act as
//! tombstones and are skipped on lookup. Deletion is deferred: marking a
//! block deleted releases its row storage immediately, sweeping between
//! pipeline states reclaims the rest.

use std::collections::{BTreeMap, HashMap};

use crate::block::Block;
use crate::genomes::{Genomes, SeqId};
use crate::tree::LocFilter;

#[derive(Debug, Clone, Copy)]
struct RangeEntry {
    chrom_start: i64,
    chrom_end: i64,
    blk: u64,
    comp: usize,
}

#[derive(Debug, Default)]
struct RangeIndex {
    by_seq: HashMap<SeqId, Vec<RangeEntry>>,
}

impl RangeIndex {
    fn insert_block(&mut self, blk: &Block) {
        for (i, comp) in blk.comps.iter().enumerate() {
            self.by_seq.entry(comp.seq).or_default().push(RangeEntry {
                chrom_start: comp.chrom_start,
                chrom_end: comp.chrom_end,
                blk: blk.id,
                comp: i,
            });
        }
    }
}

#[derive(Debug, Default)]
pub struct BlockSet {
    blocks: BTreeMap<u64, Block>,
    index: Option<RangeIndex>,
}

impl BlockSet {
    pub fn new() -> BlockSet {
        BlockSet::default()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn add(&mut self, blk: Block) -> u64 {
        let id = blk.id;
        if let Some(index) = &mut self.index {
            index.insert_block(&blk);
        }
        self.blocks.insert(id, blk);
        id
    }

    pub fn get(&self, id: u64) -> Option<&Block> {
        self.blocks.get(&id)
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut Block> {
        self.blocks.get_mut(&id)
    }

    /// Snapshot of block ids in deterministic (id) order.
    pub fn ids(&self) -> Vec<u64> {
        self.blocks.keys().copied().collect()
    }

    /// Blocks in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }

    /// Non-deleted blocks in id order.
    pub fn iter_live(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values().filter(|b| !b.deleted)
    }

    /// Take a block out of the set immediately. Its index entries become
    /// tombstones until the next rebuild.
    pub fn remove(&mut self, id: u64) -> Option<Block> {
        self.blocks.remove(&id)
    }

    /// Flag a block deleted, releasing its row storage. The id keeps its
    /// place (and its index tombstones) until the next sweep. Idempotent.
    pub fn mark_deleted(&mut self, id: u64) {
        if let Some(blk) = self.blocks.get_mut(&id) {
            if !blk.deleted {
                blk.deleted = true;
                blk.release_storage();
            }
        }
    }

    /// Physically remove deleted blocks. The index is dropped and rebuilt
    /// lazily on the next overlap query.
    pub fn sweep_deleted(&mut self) {
        self.blocks.retain(|_, blk| !blk.deleted);
        self.index = None;
    }

    fn ensure_index(&mut self) {
        if self.index.is_none() {
            let mut index = RangeIndex::default();
            for blk in self.blocks.values() {
                if !blk.deleted {
                    index.insert_block(blk);
                }
            }
            self.index = Some(index);
        }
    }

    /// All non-deleted rows overlapping the chromosome interval whose tree
    /// location passes the filter, as `(block id, component index)` pairs
    /// sorted by (block width ascending, block id, component order) so
    /// merges are stable.
    pub fn get_overlapping(
        &mut self,
        seq: SeqId,
        chrom_start: i64,
        chrom_end: i64,
        filter: LocFilter,
    ) -> Vec<(u64, usize)> {
        self.ensure_index();
        let index = self.index.as_ref().expect("index built");
        let mut hits: Vec<(i64, u64, usize)> = Vec::new();
        if let Some(entries) = index.by_seq.get(&seq) {
            for entry in entries {
                if entry.chrom_start >= chrom_end || entry.chrom_end <= chrom_start {
                    continue;
                }
                // tombstoned entries point at removed or deleted blocks
                let blk = match self.blocks.get(&entry.blk) {
                    Some(blk) if !blk.deleted => blk,
                    _ => continue,
                };
                let comp = &blk.comps[entry.comp];
                if !comp.overlaps_range(seq, chrom_start, chrom_end) {
                    continue;
                }
                if !filter.contains(blk.loc_of(entry.comp)) {
                    continue;
                }
                hits.push((blk.width, entry.blk, entry.comp));
            }
        }
        hits.sort();
        hits.dedup();
        hits.into_iter().map(|(_, blk, comp)| (blk, comp)).collect()
    }

    /// Like `get_overlapping` with the interval widened by one on each
    /// side, so immediately adjacent rows are returned too.
    pub fn get_overlapping_adjacent(
        &mut self,
        seq: SeqId,
        chrom_start: i64,
        chrom_end: i64,
        filter: LocFilter,
    ) -> Vec<(u64, usize)> {
        self.get_overlapping(seq, chrom_start - 1, chrom_end + 1, filter)
    }

    /// Blocks sorted by root row in chromosome order; used for output and
    /// the overlap-adjacent joiner.
    pub fn ids_root_sorted(&self, genomes: &Genomes) -> Vec<u64> {
        let mut ids = self.ids();
        ids.sort_by(|&a, &b| {
            let ba = &self.blocks[&a];
            let bb = &self.blocks[&b];
            ba.root_comp()
                .cmp_chrom(bb.root_comp(), genomes)
                .then(a.cmp(&b))
        });
        ids
    }
}
