//! Cross-set join: combine two block sets that share a guide genome into a
//! third set.
//!
//! For each block of set A whose root row belongs to the guide genome, the
//! joiner repeatedly looks up overlapping or adjacent guide rows in set B
//! and fuses the blocks pairwise. Every join produces a fresh block, so the
//! loop re-anchors on the new block's root until no candidate joins.
//! Consumed source blocks are marked deleted in their owning sets; blocks
//! never touched are cloned through to the joined set.

use log::{debug, info};

use crate::block::Block;
use crate::blockset::BlockSet;
use crate::error::Result;
use crate::genomes::Genomes;
use crate::join_blocks::{can_join, join_blocks};
use crate::tree::LocFilter;

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

/// Join two sets on a guide genome, producing a third set. Both inputs are
/// consumed in the sense that joined-in blocks are marked deleted.
pub fn join_sets(
    guide_genome: &str,
    set_a: &mut BlockSet,
    set_b: &mut BlockSet,
    genomes: &Genomes,
) -> Result<BlockSet> {
    let mut joined_set = BlockSet::new();
    for id in set_a.ids() {
        if set_a.get(id).map_or(true, |b| b.deleted) {
            continue;
        }
        join_block_with_set(guide_genome, set_a, id, set_b, genomes, &mut joined_set)?;
    }
    let mut passed = 0usize;
    for set in [&*set_a, &*set_b] {
        for blk in set.iter_live() {
            joined_set.add(blk.clone_block(genomes)?);
            passed += 1;
        }
    }
    info!(
        "cross-set join: {} blocks ({} passed through unjoined)",
        joined_set.len(),
        passed
    );
    Ok(joined_set)
}

fn join_block_with_set(
    guide_genome: &str,
    set_a: &mut BlockSet,
    id: u64,
    set_b: &mut BlockSet,
    genomes: &Genomes,
    joined_set: &mut BlockSet,
) -> Result<()> {
    let mut joining = Joining::InSet(id);
    loop {
        // the anchor is the root row, when it belongs to the guide genome
        let anchor = {
            let root = joining.block(set_a).root_comp();
            if genomes.genome_of(root.seq) == guide_genome {
                Some((root.seq, root.chrom_start, root.chrom_end))
            } else {
                None
            }
        };
        let Some((seq, chrom_start, chrom_end)) = anchor else {
            break;
        };
        let candidates = set_b.get_overlapping_adjacent(
            seq,
            chrom_start,
            chrom_end,
            LocFilter::ROOT | LocFilter::LEAF,
        );
        let mut next: Option<Block> = None;
        for (b_id, b_comp) in candidates {
            let b_blk = match set_b.get(b_id) {
                Some(blk) if !blk.deleted => blk,
                _ => continue,
            };
            let cur_blk = joining.block(set_a);
            if !can_join(cur_blk, cur_blk.root_idx(), b_blk, b_comp) {
                continue;
            }
            debug!(
                "cross-set join of #{} with #{} at {}",
                cur_blk.id,
                b_blk.id,
                cur_blk.root_comp().describe(genomes)
            );
            let joined = join_blocks(genomes, cur_blk, cur_blk.root_idx(), b_blk, b_comp)?;
            set_b.mark_deleted(b_id);
            if matches!(joining, Joining::InSet(_)) {
                set_a.mark_deleted(id);
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
        joined_set.add(blk);
    }
    Ok(())
}
