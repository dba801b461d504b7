//! Merge interleaved-free duplicate rows after joining.
//!
//! A cross-set join can leave a block with two rows for the same sequence
//! and strand that are contiguous in sequence and occupy disjoint column
//! ranges. Such pairs are really one row split in two: the later row's
//! segments are spliced onto the earlier one and the emptied row drops out
//! of the block and its tree. Merging never reorders columns nor changes
//! the block width.

use log::{debug, info};

use crate::block::Block;
use crate::blockset::BlockSet;
use crate::error::Result;
use crate::genomes::Genomes;

/// Is there any row pair in the block that can merge?
fn any_to_merge(blk: &Block) -> bool {
    find_pair(blk).is_some()
}

/// First mergeable ordered pair (earlier, later) by row order.
fn find_pair(blk: &Block) -> Option<(usize, usize)> {
    let n = blk.comps.len();
    for i in 0..n {
        for j in 0..n {
            if i != j && blk.comps[i].can_splice(&blk.comps[j]) {
                return Some((i, j));
            }
        }
    }
    None
}

/// Merge one pair, dropping the non-surviving row from the block and its
/// tree. The root row always survives a merge.
fn merge_pair(blk: &mut Block, earlier: usize, later: usize) {
    let root = blk.root_idx();
    let (survivor, victim) = if later == root {
        (later, earlier)
    } else {
        (earlier, later)
    };
    let victim_comp = blk.comps[victim].clone();
    blk.comps[survivor].merge_rows(&victim_comp);
    let pruned = blk.tree().prune_comp(victim);
    blk.comps.remove(victim);
    blk.set_tree(pruned);
}

/// Merge every mergeable pair in a block, restarting after each merge
/// since indices shift.
fn merge_block(blk: &mut Block, genomes: &Genomes) -> Result<()> {
    while let Some((earlier, later)) = find_pair(blk) {
        merge_pair(blk, earlier, later);
    }
    blk.finish(genomes)
}

/// Merge rows within every block of a set. Blocks with merges are replaced
/// by merged clones; a full pass repeats per block until nothing merges.
pub fn merge_set_comps(set: &mut BlockSet, genomes: &Genomes) -> Result<()> {
    let mut new_blocks: Vec<Block> = Vec::new();
    for id in set.ids() {
        let blk = match set.get(id) {
            Some(blk) if !blk.deleted => blk,
            _ => continue,
        };
        if !any_to_merge(blk) {
            continue;
        }
        debug!("merging rows within block #{id}");
        let mut merged = blk.clone_block(genomes)?;
        merge_block(&mut merged, genomes)?;
        set.mark_deleted(id);
        new_blocks.push(merged);
    }
    let count = new_blocks.len();
    for blk in new_blocks {
        set.add(blk);
    }
    set.sweep_deleted();
    if count > 0 {
        info!("component merge rewrote {count} blocks");
    }
    Ok(())
}
