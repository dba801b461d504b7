//! Joins within a single block set: fusing duplicate blocks that cover the
//! same guide region, and coalescing overlapping or adjacent blocks after
//! a cross-set join.

use log::{debug, info};

use crate::block::Block;
use crate::blockset::BlockSet;
use crate::error::Result;
use crate::genomes::Genomes;
use crate::join_blocks::join_blocks;
use crate::tree::LocFilter;

/// The block a joining loop is currently extending: still the in-set
/// original, or an owned intermediate produced by a join.
enum Joining {
    InSet(u64),
    Owned(Block),
}

impl Joining {
    fn block<'a>(&'a self, set: &'a BlockSet) -> &'a Block {
        match self {
            Joining::InSet(id) => set.get(*id).expect("joining block still in set"),
            Joining::Owned(blk) => blk,
        }
    }
}

/// Fuse blocks whose root rows overlap on the same sequence. Duplication
/// events arrive as separate blocks covering the same guide region; joining
/// them leaves at most one root per region. Adjacency is deliberately not
/// used here: joining merely-adjacent roots balloons blocks at the root.
pub fn join_dups(set: &mut BlockSet, genomes: &Genomes) -> Result<()> {
    let mut new_blocks: Vec<Block> = Vec::new();
    for id in set.ids() {
        if set.get(id).map_or(true, |b| b.deleted) {
            continue;
        }
        join_block_with_dups(set, genomes, id, &mut new_blocks)?;
    }
    set.sweep_deleted();
    let count = new_blocks.len();
    for blk in new_blocks {
        set.add(blk);
    }
    if count > 0 {
        info!("duplicate join produced {count} fused blocks");
    }
    Ok(())
}

fn join_block_with_dups(
    set: &mut BlockSet,
    genomes: &Genomes,
    id: u64,
    new_blocks: &mut Vec<Block>,
) -> Result<()> {
    let mut joining = Joining::InSet(id);
    loop {
        let (seq, chrom_start, chrom_end) = {
            let root = joining.block(set).root_comp();
            (root.seq, root.chrom_start, root.chrom_end)
        };
        let candidates = set.get_overlapping(seq, chrom_start, chrom_end, LocFilter::ROOT);
        let mut next: Option<Block> = None;
        for (cand_id, cand_comp) in candidates {
            if cand_id == id {
                continue;
            }
            let cand_blk = match set.get(cand_id) {
                Some(blk) if !blk.deleted => blk,
                _ => continue,
            };
            debug_assert_eq!(cand_comp, cand_blk.root_idx());
            let cur_blk = joining.block(set);
            debug!(
                "duplicate join of #{} with #{} at {}",
                cur_blk.id,
                cand_blk.id,
                cur_blk.root_comp().describe(genomes)
            );
            let joined = join_blocks(
                genomes,
                cur_blk,
                cur_blk.root_idx(),
                cand_blk,
                cand_blk.root_idx(),
            )?;
            set.mark_deleted(cand_id);
            if matches!(joining, Joining::InSet(_)) {
                set.mark_deleted(id);
            }
            next = Some(joined);
            break;
        }
        match next {
            Some(blk) => joining = Joining::Owned(blk),
            None => break,
        }
    }
    if let Joining::Owned(blk) = joining {
        new_blocks.push(blk);
    }
    Ok(())
}

/// Can the blocks at two root-sorted positions fuse? Overlapping roots
/// always can; adjacent roots only when some non-root row pair connects in
/// the orientation implied by the root strands.
fn can_join_adjacent(set: &BlockSet, genomes: &Genomes, id1: u64, id2: u64) -> bool {
    let blk1 = set.get(id1).expect("sorted block in set");
    let blk2 = set.get(id2).expect("sorted block in set");
    let root1 = blk1.root_comp();
    let root2 = blk2.root_comp();
    if root1.overlaps(root2) {
        return true;
    }
    if !root1.overlaps_adjacent(root2) {
        return false;
    }
    let orient = if root1.strand == root2.strand { 1 } else { -1 };
    for comp1 in &blk1.comps[..blk1.root_idx()] {
        for comp2 in &blk2.comps[..blk2.root_idx()] {
            if comp1.seq == comp2.seq
                && comp1.overlaps_adjacent_orient(comp2, orient, genomes.size_of(comp2.seq))
            {
                return true;
            }
        }
    }
    false
}

/// End of the run of root-sorted blocks starting at `start` that can fuse
/// pairwise in order.
fn find_adjacent_run(set: &BlockSet, genomes: &Genomes, sorted: &[u64], start: usize) -> usize {
    let mut next = start + 1;
    while next < sorted.len() && can_join_adjacent(set, genomes, sorted[next - 1], sorted[next]) {
        next += 1;
    }
    next
}

/// Fuse one run of blocks at their roots, stopping before the fused block
/// would exceed the width cap. Returns the index after the last block
/// consumed.
fn join_adjacent_run(
    set: &mut BlockSet,
    genomes: &Genomes,
    sorted: &[u64],
    start: usize,
    next: usize,
    max_width: i64,
    new_blocks: &mut Vec<Block>,
) -> Result<usize> {
    let mut joining = Joining::InSet(sorted[start]);
    let mut i = start + 1;
    while i < next {
        let cur_width = joining.block(set).width;
        let next_blk_width = set.get(sorted[i]).expect("sorted block in set").width;
        if cur_width + next_blk_width > max_width {
            break;
        }
        let cur_blk = joining.block(set);
        let next_blk = set.get(sorted[i]).expect("sorted block in set");
        let joined = join_blocks(
            genomes,
            cur_blk,
            cur_blk.root_idx(),
            next_blk,
            next_blk.root_idx(),
        )?;
        set.mark_deleted(sorted[i]);
        if matches!(joining, Joining::InSet(_)) {
            set.mark_deleted(sorted[start]);
        }
        joining = Joining::Owned(joined);
        i += 1;
    }
    if let Joining::Owned(blk) = joining {
        new_blocks.push(blk);
    }
    Ok(i)
}

/// Fuse overlapping and adjacent blocks across the whole set, walking
/// blocks in root chromosome order. `max_width` caps how wide a fused
/// block may grow; blocks passed through unjoined keep their size.
pub fn join_overlap_adjacent(set: &mut BlockSet, genomes: &Genomes, max_width: i64) -> Result<()> {
    let sorted = set.ids_root_sorted(genomes);
    let mut new_blocks: Vec<Block> = Vec::new();
    let mut start = 0;
    while start < sorted.len() {
        let next = find_adjacent_run(set, genomes, &sorted, start);
        start = join_adjacent_run(set, genomes, &sorted, start, next, max_width, &mut new_blocks)?;
        set.sweep_deleted(); // keep memory down between runs
    }
    let count = new_blocks.len();
    for blk in new_blocks {
        set.add(blk);
    }
    if count > 0 {
        info!("overlap-adjacent join produced {count} fused blocks");
    }
    Ok(())
}
