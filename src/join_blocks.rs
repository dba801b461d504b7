//! Pairwise block join on a shared guide row.
//!
//! Two blocks whose guide rows cover overlapping or adjacent ranges of the
//! same sequence are combined column by column into a fresh block: columns
//! where both guides align the same base collapse into one, insertions
//! unique to either block are interleaved, and the unshared flanks are
//! carried over. The block trees are joined at the guide nodes.

use log::debug;

use crate::block::{Block, BlockCursor};
use crate::comp::Component;
use crate::error::{JoinError, Result};
use crate::genomes::Genomes;
use crate::tree::{BlockTree, TreeLoc};

/// Can two rows anchor a join? Same sequence, overlapping or adjacent, and
/// at least one of them the root of its block.
pub fn can_join(blk1: &Block, comp1: usize, blk2: &Block, comp2: usize) -> bool {
    let c1 = &blk1.comps[comp1];
    let c2 = &blk2.comps[comp2];
    c1.overlaps_adjacent(c2)
        && (blk1.loc_of(comp1) == TreeLoc::Root || blk2.loc_of(comp2) == TreeLoc::Root)
}

/// State for one pairwise join. Guide 1 starts at or before guide 2; both
/// guides are on the same strand by the time this is built.
struct Joiner<'a> {
    cursor1: BlockCursor<'a>,
    cursor2: BlockCursor<'a>,
    joined: Block,
    /// Destination component index per cursor row (row 0 is the guide).
    dests1: Vec<usize>,
    dests2: Vec<usize>,
    /// Source component index -> destination component index, per block.
    map1: Vec<usize>,
    map2: Vec<usize>,
    /// Shared guide range in strand coordinates; empty when adjacent-only.
    common_start: i64,
    common_end: i64,
    /// Alignment column ranges corresponding to the shared guide range.
    aln1: (i64, i64),
    aln2: (i64, i64),
}

impl<'a> Joiner<'a> {
    fn new(genomes: &Genomes, blk1: &'a Block, guide1: usize, blk2: &'a Block, guide2: usize) -> Result<Joiner<'a>> {
        let g1 = &blk1.comps[guide1];
        let g2 = &blk2.comps[guide2];
        let common_start = g1.start.max(g2.start);
        let common_end = g1.end.min(g2.end);
        let (aln1, aln2) = if common_start < common_end {
            let a1 = g1.seq_range_to_aln_range(common_start, common_end).ok_or_else(|| {
                JoinError::JoinCoordBug {
                    org_seq: genomes.org_seq(g1.seq).to_string(),
                }
            })?;
            let a2 = g2.seq_range_to_aln_range(common_start, common_end).ok_or_else(|| {
                JoinError::JoinCoordBug {
                    org_seq: genomes.org_seq(g2.seq).to_string(),
                }
            })?;
            (a1, a2)
        } else {
            ((blk1.width, blk1.width), (blk2.width, blk2.width))
        };

        let cursor1 = BlockCursor::new(blk1, Some(guide1), None);
        let cursor2 = BlockCursor::new(blk2, Some(guide2), None);

        let mut joined = Block::new();
        let guide_size = genomes.size_of(g1.seq);
        joined.add_comp(Component::new_empty(
            g1.seq,
            g1.strand,
            g1.start.min(g2.start),
            guide_size,
        ));
        let mut map1 = vec![usize::MAX; blk1.comps.len()];
        let mut map2 = vec![usize::MAX; blk2.comps.len()];
        map1[guide1] = 0;
        map2[guide2] = 0;
        let mut dests1 = vec![0usize; cursor1.rows.len()];
        let mut dests2 = vec![0usize; cursor2.rows.len()];
        add_dest_comps(genomes, &mut joined, &cursor1, &mut dests1, &mut map1);
        add_dest_comps(genomes, &mut joined, &cursor2, &mut dests2, &mut map2);

        Ok(Joiner {
            cursor1,
            cursor2,
            joined,
            dests1,
            dests2,
            map1,
            map2,
            common_start,
            common_end,
            aln1,
            aln2,
        })
    }
}

/// Create an empty destination row for every non-guide row of a cursor.
fn add_dest_comps(
    genomes: &Genomes,
    joined: &mut Block,
    cursor: &BlockCursor<'_>,
    dests: &mut [usize],
    map: &mut [usize],
) {
    for i in 1..cursor.rows.len() {
        let src = cursor.rows[i].comp;
        let size = genomes.size_of(src.seq);
        let d = joined.comps.len();
        joined.add_comp(Component::new_empty(src.seq, src.strand, src.start, size));
        dests[i] = d;
        map[cursor.comp_indices[i]] = d;
    }
}

/// Copy columns outside the shared guide region, then square the block up.
fn copy_unshared(
    joined: &mut Block,
    dests: &[usize],
    cursor: &mut BlockCursor<'_>,
    aln_start: i64,
    aln_end: i64,
) {
    for (i, &d) in dests.iter().enumerate() {
        let src = cursor.rows[i].comp;
        joined.comps[d].append_comp_range(src, aln_start, aln_end);
    }
    cursor.set_aln_col(aln_end);
    joined.width += aln_end - aln_start;
    joined.pad();
}

/// Copy the current column of every cursor row, optionally skipping the
/// guide so its bases are written only once.
fn copy_column(joined: &mut Block, dests: &[usize], cursor: &mut BlockCursor<'_>, skip_guide: bool) {
    let from = usize::from(skip_guide);
    for i in from..cursor.rows.len() {
        joined.comps[dests[i]].append_cursor_col(&cursor.rows[i]);
    }
    cursor.incr();
}

impl<'a> Joiner<'a> {
    /// Copy runs of columns where both guides align the same bases; the
    /// guide itself is written from block 1 only.
    fn copy_shared_guide_columns(&mut self) {
        debug_assert_eq!(self.cursor1.rows[0].pos, self.cursor2.rows[0].pos);
        while self.cursor1.guide_aligned()
            && self.cursor2.guide_aligned()
            && self.cursor1.aln_idx < self.aln1.1
            && self.cursor2.aln_idx < self.aln2.1
        {
            copy_column(&mut self.joined, &self.dests1, &mut self.cursor1, false);
            copy_column(&mut self.joined, &self.dests2, &mut self.cursor2, true);
            self.joined.width += 1;
        }
    }

    /// Copy a run of columns in which one block's guide is gapped; these
    /// are insertions on other rows unique to that block.
    fn copy_unaligned_shared_columns(&mut self, which: usize) {
        let (dests, cursor, aln_end) = if which == 1 {
            (&self.dests1, &mut self.cursor1, self.aln1.1)
        } else {
            (&self.dests2, &mut self.cursor2, self.aln2.1)
        };
        while !cursor.guide_aligned() && cursor.aln_idx < aln_end {
            copy_column(&mut self.joined, dests, cursor, false);
            self.joined.width += 1;
        }
        self.joined.pad();
    }

    /// Interleave the shared guide region from both blocks.
    fn join_shared_guide_columns(&mut self) {
        debug_assert_eq!(self.joined.comps[0].end, self.common_start);
        while self.cursor1.aln_idx < self.aln1.1 || self.cursor2.aln_idx < self.aln2.1 {
            self.copy_shared_guide_columns();
            self.copy_unaligned_shared_columns(1);
            self.copy_unaligned_shared_columns(2);
        }
        debug_assert_eq!(self.cursor1.aln_idx, self.aln1.1);
        debug_assert_eq!(self.cursor2.aln_idx, self.aln2.1);
        debug_assert_eq!(self.joined.comps[0].end, self.common_end);
    }
}

/// Join two blocks at their guide rows, producing a fresh block with the
/// joined tree. The guides must refer to the same sequence, overlap or
/// adjoin, and at least one must be its block's root.
pub fn join_blocks(
    genomes: &Genomes,
    blk1: &Block,
    guide1: usize,
    blk2: &Block,
    guide2: usize,
) -> Result<Block> {
    let (c1, c2) = (&blk1.comps[guide1], &blk2.comps[guide2]);
    if c1.seq != c2.seq {
        return Err(JoinError::GuideSequenceMismatch {
            guide1: c1.describe(genomes),
            guide2: c2.describe(genomes),
        });
    }
    if !c1.overlaps_adjacent(c2) {
        return Err(JoinError::GuideNonOverlapping {
            guide1: c1.describe(genomes),
            guide2: c2.describe(genomes),
        });
    }
    if blk1.loc_of(guide1) != TreeLoc::Root && blk2.loc_of(guide2) != TreeLoc::Root {
        return Err(JoinError::GuideNeitherIsRoot {
            guide1: c1.describe(genomes),
            guide2: c2.describe(genomes),
        });
    }

    // put both guides on the same strand, reverse-complementing the block
    // whose guide is on the minus strand
    let mut rc_holder: Option<Block> = None;
    let (mut b1, mut g1) = (blk1, guide1);
    let (mut b2, mut g2) = (blk2, guide2);
    if c1.strand != c2.strand {
        if c1.strand == crate::comp::Strand::Minus {
            let rc = blk1.reverse_complement(genomes)?;
            let g = rc
                .find_comp_by_chrom_range(c1.seq, c1.chrom_start, c1.chrom_end)
                .expect("guide survives reverse complement");
            b1 = &*rc_holder.insert(rc);
            g1 = g;
        } else {
            let rc = blk2.reverse_complement(genomes)?;
            let g = rc
                .find_comp_by_chrom_range(c2.seq, c2.chrom_start, c2.chrom_end)
                .expect("guide survives reverse complement");
            b2 = &*rc_holder.insert(rc);
            g2 = g;
        }
    }

    // guide 1 starts at or before guide 2
    if b1.comps[g1].start > b2.comps[g2].start {
        std::mem::swap(&mut b1, &mut b2);
        std::mem::swap(&mut g1, &mut g2);
    }

    debug!(
        "join blocks #{} and #{} on {}",
        b1.id,
        b2.id,
        b1.comps[g1].describe(genomes)
    );

    let mut jb = Joiner::new(genomes, b1, g1, b2, g2)?;

    // unshared prefixes
    copy_unshared(&mut jb.joined, &jb.dests1, &mut jb.cursor1, 0, jb.aln1.0);
    copy_unshared(&mut jb.joined, &jb.dests2, &mut jb.cursor2, 0, jb.aln2.0);

    // shared middle
    if jb.common_start < jb.common_end {
        jb.join_shared_guide_columns();
    }

    // unshared suffixes
    let (w1, w2) = (b1.width, b2.width);
    let (a1e, a2e) = (jb.aln1.1, jb.aln2.1);
    copy_unshared(&mut jb.joined, &jb.dests1, &mut jb.cursor1, a1e, w1);
    copy_unshared(&mut jb.joined, &jb.dests2, &mut jb.cursor2, a2e, w2);

    let tree = BlockTree::join(b1.tree(), g1, b2.tree(), g2, &jb.map1, &jb.map2)?;
    jb.joined.set_tree(tree);

    debug_assert_eq!(jb.joined.comps[0].start, b1.comps[g1].start.min(b2.comps[g2].start));
    debug_assert_eq!(jb.joined.comps[0].end, b1.comps[g1].end.max(b2.comps[g2].end));
    debug_assert!(jb
        .dests1
        .iter()
        .enumerate()
        .skip(1)
        .all(|(i, &d)| jb.joined.comps[d].start == jb.cursor1.rows[i].comp.start
            && jb.joined.comps[d].end == jb.cursor1.rows[i].comp.end));

    let mut joined = jb.joined;
    joined.finish(genomes)?;
    Ok(joined)
}
