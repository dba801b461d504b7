//! A multiple alignment block: ordered rows sharing one alignment width,
//! plus the tree tying the rows together. The root row is always last in
//! row order (DFS post-order of the tree).

use std::sync::atomic::{AtomicU64, Ordering};

use crate::comp::{CompCursor, Component};
use crate::error::{JoinError, Result};
use crate::genomes::{Genomes, SeqId};
use crate::tree::{BlockTree, TreeLoc};

static NEXT_BLOCK_ID: AtomicU64 = AtomicU64::new(1);

/// Block object ids are process-wide and monotonic, giving deterministic
/// iteration order where address identity would otherwise leak.
fn next_block_id() -> u64 {
    NEXT_BLOCK_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone)]
pub struct Block {
    pub id: u64,
    pub width: i64,
    pub comps: Vec<Component>,
    pub tree: Option<BlockTree>,
    pub deleted: bool,
}

impl Default for Block {
    fn default() -> Self {
        Self::new()
    }
}

impl Block {
    pub fn new() -> Block {
        Block {
            id: next_block_id(),
            width: 0,
            comps: Vec::new(),
            tree: None,
            deleted: false,
        }
    }

    /// Append a row, widening the block if needed.
    pub fn add_comp(&mut self, comp: Component) {
        self.width = self.width.max(comp.width());
        self.comps.push(comp);
    }

    pub fn set_tree(&mut self, tree: BlockTree) {
        self.tree = Some(tree);
    }

    pub fn tree(&self) -> &BlockTree {
        self.tree.as_ref().expect("block tree not set")
    }

    /// The root row is the last in tree order.
    pub fn root_idx(&self) -> usize {
        self.comps.len() - 1
    }

    pub fn root_comp(&self) -> &Component {
        &self.comps[self.root_idx()]
    }

    pub fn loc_of(&self, comp_idx: usize) -> TreeLoc {
        self.tree().loc_of_comp(comp_idx)
    }

    /// Finish construction: sort rows into tree post-order (children sorted
    /// for determinism), pad every row to the block width, and validate.
    pub fn finish(&mut self, genomes: &Genomes) -> Result<()> {
        let mut tree = self.tree.take().expect("block tree not set");
        tree.sort_children(&self.comps, genomes);
        let order = tree.post_order();
        debug_assert_eq!(order.len(), self.comps.len());
        let perm: Vec<usize> = order.iter().map(|&ni| tree.node(ni).comp).collect();
        let mut slots: Vec<Option<Component>> = self.comps.drain(..).map(Some).collect();
        self.comps = perm
            .iter()
            .map(|&i| slots[i].take().expect("valid tree-order permutation"))
            .collect();
        tree.bind_post_order();
        self.tree = Some(tree);
        for comp in &mut self.comps {
            comp.pad(self.width);
        }
        self.validate(genomes)
    }

    /// Check equal widths and that no other row overlaps the root on the
    /// same sequence.
    pub fn validate(&self, genomes: &Genomes) -> Result<()> {
        debug_assert!(self
            .comps
            .iter()
            .all(|comp| comp.width() == self.width));
        let root = self.root_comp();
        for comp in &self.comps[..self.root_idx()] {
            if root.overlaps(comp) {
                return Err(JoinError::OverlappingRoots {
                    comp1: root.describe(genomes),
                    comp2: comp.describe(genomes),
                });
            }
        }
        Ok(())
    }

    /// Widen every row to the block width with implicit gaps.
    pub fn pad(&mut self) {
        for comp in &mut self.comps {
            comp.pad(self.width);
        }
    }

    /// A structural clone with a fresh block id.
    pub fn clone_block(&self, genomes: &Genomes) -> Result<Block> {
        let mut blk = Block::new();
        blk.width = self.width;
        blk.comps = self.comps.clone();
        blk.tree = self.tree.clone();
        blk.finish(genomes)?;
        Ok(blk)
    }

    /// A new block with every row reverse complemented and the tree kept.
    pub fn reverse_complement(&self, genomes: &Genomes) -> Result<Block> {
        let mut blk = Block::new();
        for comp in &self.comps {
            let size = genomes.size_of(comp.seq);
            blk.add_comp(comp.reverse_complement(size));
        }
        blk.tree = self.tree.clone();
        blk.finish(genomes)?;
        Ok(blk)
    }

    /// A new block covering the column range, dropping rows left with no
    /// bases and pruning their tree nodes. None when no row survives.
    pub fn subrange(
        &self,
        aln_start: i64,
        aln_end: i64,
        genomes: &Genomes,
    ) -> Result<Option<Block>> {
        debug_assert!(0 <= aln_start && aln_start < aln_end && aln_end <= self.width);
        let mut blk = Block::new();
        let mut comp_map: Vec<Option<usize>> = Vec::with_capacity(self.comps.len());
        for comp in &self.comps {
            let size = genomes.size_of(comp.seq);
            match comp.subrange(aln_start, aln_end, size) {
                Some(sub) => {
                    comp_map.push(Some(blk.comps.len()));
                    blk.add_comp(sub);
                }
                None => comp_map.push(None),
            }
        }
        if blk.comps.is_empty() {
            return Ok(None);
        }
        let tree = self
            .tree()
            .subrange_clone(&comp_map)?
            .expect("tree survivors match component survivors");
        blk.set_tree(tree);
        blk.width = aln_end - aln_start;
        blk.finish(genomes)?;
        Ok(Some(blk))
    }

    pub fn find_comp_by_seq_start(&self, seq: SeqId, start: i64) -> Option<usize> {
        self.comps
            .iter()
            .position(|c| c.seq == seq && c.start == start)
    }

    pub fn find_comp_by_chrom_range(
        &self,
        seq: SeqId,
        chrom_start: i64,
        chrom_end: i64,
    ) -> Option<usize> {
        self.comps
            .iter()
            .position(|c| c.seq == seq && c.chrom_start == chrom_start && c.chrom_end == chrom_end)
    }

    /// Deterministic block order: root comparison, then row count, then
    /// row-wise comparison.
    pub fn cmp_block(&self, other: &Block, genomes: &Genomes) -> std::cmp::Ordering {
        self.root_comp()
            .cmp_comp(other.root_comp(), genomes)
            .then(self.comps.len().cmp(&other.comps.len()))
            .then_with(|| {
                for (a, b) in self.comps.iter().zip(&other.comps) {
                    let ord = a.cmp_comp(b, genomes);
                    if ord != std::cmp::Ordering::Equal {
                        return ord;
                    }
                }
                std::cmp::Ordering::Equal
            })
    }

    /// Drop row storage for a block that is marked deleted but must keep
    /// its identity until the next sweep.
    pub fn release_storage(&mut self) {
        for comp in &mut self.comps {
            comp.release_storage();
        }
    }
}

/// Lock-stepped column cursor over a chosen subset of a block's rows,
/// optionally forcing a guide row first.
pub struct BlockCursor<'a> {
    pub block: &'a Block,
    pub rows: Vec<CompCursor<'a>>,
    /// Component index (in the block) behind each row of the cursor.
    pub comp_indices: Vec<usize>,
    pub aln_idx: i64,
    pub width: i64,
}

impl<'a> BlockCursor<'a> {
    pub fn new(block: &'a Block, guide: Option<usize>, subset: Option<&[usize]>) -> BlockCursor<'a> {
        let mut comp_indices = Vec::new();
        match subset {
            Some(indices) => {
                debug_assert!(guide.is_none() || guide == indices.first().copied());
                comp_indices.extend_from_slice(indices);
            }
            None => {
                if let Some(g) = guide {
                    comp_indices.push(g);
                }
                comp_indices.extend((0..block.comps.len()).filter(|&i| Some(i) != guide));
            }
        }
        let rows: Vec<CompCursor<'a>> = comp_indices
            .iter()
            .map(|&i| CompCursor::new(&block.comps[i]))
            .collect();
        let mut cursor = BlockCursor {
            block,
            rows,
            comp_indices,
            aln_idx: -1,
            width: block.width,
        };
        cursor.set_aln_col(0);
        cursor
    }

    /// Is the first (guide) row aligned at the current column?
    pub fn guide_aligned(&self) -> bool {
        self.rows[0].is_aligned
    }

    /// Advance all rows one column; false when past the last column.
    pub fn incr(&mut self) -> bool {
        self.aln_idx += 1;
        for row in &mut self.rows {
            row.incr();
            debug_assert_eq!(row.aln_idx, self.aln_idx.min(self.width));
        }
        self.aln_idx < self.width
    }

    /// Seek every row to the given column (may be the block width).
    pub fn set_aln_col(&mut self, col: i64) {
        for row in &mut self.rows {
            row.set_aln_col(col);
        }
        self.aln_idx = col;
    }
}
