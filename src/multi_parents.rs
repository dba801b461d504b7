//! Reject alignments in which a non-root region is claimed by more than
//! one parent.
//!
//! After joining, every non-root row region must be aligned under exactly
//! one parent. A non-root row of one block overlapping a non-root row of
//! another block means two independent parents claim the same bases. Root
//! overlaps between blocks are the duplicate joiner's business and are
//! ignored here.

use log::info;

use crate::blockset::BlockSet;
use crate::error::{JoinError, Result};
use crate::genomes::{Genomes, SeqId};
use crate::tree::{LocFilter, TreeLoc};

/// Check every non-root row of every block for an overlapping non-root row
/// in another block; fail with `MultiParent` on the first hit.
pub fn check_multi_parents(set: &mut BlockSet, genomes: &Genomes) -> Result<()> {
    for id in set.ids() {
        let probes: Vec<(usize, SeqId, i64, i64)> = {
            let blk = match set.get(id) {
                Some(blk) if !blk.deleted => blk,
                _ => continue,
            };
            (0..blk.comps.len())
                .filter(|&i| blk.loc_of(i) != TreeLoc::Root)
                .map(|i| {
                    let c = &blk.comps[i];
                    (i, c.seq, c.chrom_start, c.chrom_end)
                })
                .collect()
        };
        for (comp_idx, seq, chrom_start, chrom_end) in probes {
            let hits = set.get_overlapping(
                seq,
                chrom_start,
                chrom_end,
                LocFilter::INTERNAL | LocFilter::LEAF,
            );
            for (hit_id, hit_comp) in hits {
                if hit_id == id {
                    continue;
                }
                let comp1 = &set.get(id).expect("probed block in set").comps[comp_idx];
                let comp2 = &set.get(hit_id).expect("hit block in set").comps[hit_comp];
                return Err(JoinError::MultiParent {
                    comp1: comp1.describe(genomes),
                    comp2: comp2.describe(genomes),
                });
            }
        }
    }
    info!("multi-parent check passed ({} blocks)", set.len());
    Ok(())
}
