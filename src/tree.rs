//! Phylogenetic tree attached to an alignment block.
//!
//! Tree nodes are one-to-one with the block's rows: each node carries the
//! row's "genome.seq" label and the index of its component, and the DFS
//! post-order of the tree matches the row order of the block. The tree is
//! stored as an index arena; edits rebuild rather than mutate in place so
//! the arena never holds dead nodes.

use std::ops::BitOr;

use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{char, multispace0},
    combinator::{all_consuming, map, opt},
    multi::separated_list1,
    number::complete::double,
    sequence::{delimited, pair, preceded, terminated},
    IResult,
};

use crate::comp::Component;
use crate::error::{JoinError, Result};
use crate::genomes::Genomes;

/// Where a row sits in its block's tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeLoc {
    Root,
    Internal,
    Leaf,
}

impl TreeLoc {
    pub fn as_str(self) -> &'static str {
        match self {
            TreeLoc::Root => "root",
            TreeLoc::Internal => "internal",
            TreeLoc::Leaf => "leaf",
        }
    }
}

/// A subset of tree locations used to filter range-index queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocFilter(u8);

impl LocFilter {
    pub const ROOT: LocFilter = LocFilter(1);
    pub const INTERNAL: LocFilter = LocFilter(2);
    pub const LEAF: LocFilter = LocFilter(4);
    pub const ALL: LocFilter = LocFilter(7);

    pub fn contains(self, loc: TreeLoc) -> bool {
        let bit = match loc {
            TreeLoc::Root => 1,
            TreeLoc::Internal => 2,
            TreeLoc::Leaf => 4,
        };
        self.0 & bit != 0
    }
}

impl BitOr for LocFilter {
    type Output = LocFilter;

    fn bitor(self, rhs: LocFilter) -> LocFilter {
        LocFilter(self.0 | rhs.0)
    }
}

/// A parsed Newick tree, not yet bound to rows. Also used directly for the
/// species tree assertion.
#[derive(Debug, Clone, PartialEq)]
pub struct NewickNode {
    pub label: String,
    pub branch_length: Option<f64>,
    pub children: Vec<NewickNode>,
}

fn nw_label(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| !",():;".contains(c) && !c.is_whitespace())(input)
}

fn nw_branch_length(input: &str) -> IResult<&str, f64> {
    preceded(char(':'), double)(input)
}

fn nw_leaf(input: &str) -> IResult<&str, NewickNode> {
    map(pair(nw_label, opt(nw_branch_length)), |(label, bl)| NewickNode {
        label: label.to_string(),
        branch_length: bl,
        children: Vec::new(),
    })(input)
}

fn nw_internal(input: &str) -> IResult<&str, NewickNode> {
    map(
        nom::sequence::tuple((
            delimited(
                char('('),
                separated_list1(char(','), delimited(multispace0, nw_subtree, multispace0)),
                char(')'),
            ),
            opt(nw_label),
            opt(nw_branch_length),
        )),
        |(children, label, bl)| NewickNode {
            label: label.unwrap_or("").to_string(),
            branch_length: bl,
            children,
        },
    )(input)
}

fn nw_subtree(input: &str) -> IResult<&str, NewickNode> {
    alt((nw_internal, nw_leaf))(input)
}

/// Parse a Newick string (terminating semicolon required).
pub fn parse_newick(text: &str) -> std::result::Result<NewickNode, String> {
    let parser = delimited(multispace0, nw_subtree, multispace0);
    match all_consuming(terminated(parser, pair(char(';'), multispace0)))(text) {
        Ok((_, node)) => Ok(node),
        Err(e) => Err(format!("invalid newick tree \"{}\": {}", text.trim(), e)),
    }
}

#[derive(Debug, Clone)]
pub struct TreeNode {
    pub label: String,
    pub branch_length: Option<f64>,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    /// Index of the bound component in the owning block.
    pub comp: usize,
}

#[derive(Debug, Clone)]
pub struct BlockTree {
    nodes: Vec<TreeNode>,
    root: usize,
}

impl BlockTree {
    /// Bind a parsed Newick tree to a block's rows: post-order node k must
    /// be labelled with row k's "genome.seq".
    pub fn from_newick_node(
        newick: &NewickNode,
        comps: &[Component],
        genomes: &Genomes,
    ) -> Result<BlockTree> {
        let mut nodes = Vec::new();
        let root = flatten_newick(newick, None, &mut nodes);
        let mut tree = BlockTree { nodes, root };
        let order = tree.post_order();
        if order.len() != comps.len() {
            return Err(JoinError::TreeRowCountMismatch {
                tree_nodes: order.len(),
                rows: comps.len(),
            });
        }
        for (pos, &ni) in order.iter().enumerate() {
            let org_seq = genomes.org_seq(comps[pos].seq);
            if tree.nodes[ni].label != org_seq {
                return Err(JoinError::TreeLabelMismatch {
                    label: tree.nodes[ni].label.clone(),
                    org_seq: org_seq.to_string(),
                });
            }
            tree.nodes[ni].comp = pos;
        }
        Ok(tree)
    }

    /// Fallback tree for a treeless block: the last row is the root and
    /// every other row a direct child with the default branch length.
    pub fn from_alignment(
        comps: &[Component],
        default_branch_length: f64,
        genomes: &Genomes,
    ) -> BlockTree {
        let n = comps.len();
        debug_assert!(n > 0);
        let mut nodes = Vec::with_capacity(n);
        for (i, comp) in comps.iter().enumerate().take(n - 1) {
            nodes.push(TreeNode {
                label: genomes.org_seq(comp.seq).to_string(),
                branch_length: Some(default_branch_length),
                parent: Some(n - 1),
                children: Vec::new(),
                comp: i,
            });
        }
        nodes.push(TreeNode {
            label: genomes.org_seq(comps[n - 1].seq).to_string(),
            branch_length: None,
            parent: None,
            children: (0..n - 1).collect(),
            comp: n - 1,
        });
        BlockTree {
            nodes,
            root: n - 1,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root(&self) -> usize {
        self.root
    }

    pub fn node(&self, idx: usize) -> &TreeNode {
        &self.nodes[idx]
    }

    /// Node indices in DFS post-order, children in stored order.
    pub fn post_order(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.nodes.len());
        self.post_order_rec(self.root, &mut order);
        order
    }

    fn post_order_rec(&self, idx: usize, order: &mut Vec<usize>) {
        for &child in &self.nodes[idx].children {
            self.post_order_rec(child, order);
        }
        order.push(idx);
    }

    pub fn node_of_comp(&self, comp_idx: usize) -> Option<usize> {
        self.nodes.iter().position(|n| n.comp == comp_idx)
    }

    pub fn loc_of_node(&self, idx: usize) -> TreeLoc {
        let node = &self.nodes[idx];
        if node.parent.is_none() {
            TreeLoc::Root
        } else if node.children.is_empty() {
            TreeLoc::Leaf
        } else {
            TreeLoc::Internal
        }
    }

    pub fn loc_of_comp(&self, comp_idx: usize) -> TreeLoc {
        let idx = self
            .node_of_comp(comp_idx)
            .expect("component not bound to a tree node");
        self.loc_of_node(idx)
    }

    /// Sort every node's children by label, tie-broken by component
    /// (seq, strand, start, end), for reproducible output.
    pub fn sort_children(&mut self, comps: &[Component], genomes: &Genomes) {
        for i in 0..self.nodes.len() {
            let mut kids = std::mem::take(&mut self.nodes[i].children);
            kids.sort_by(|&a, &b| {
                let na = &self.nodes[a];
                let nb = &self.nodes[b];
                na.label
                    .cmp(&nb.label)
                    .then_with(|| comps[na.comp].cmp_comp(&comps[nb.comp], genomes))
            });
            self.nodes[i].children = kids;
        }
    }

    /// Renumber component bindings so post-order node k points at row k.
    /// Called after the block reorders its rows to tree order.
    pub fn bind_post_order(&mut self) {
        let order = self.post_order();
        for (pos, &ni) in order.iter().enumerate() {
            self.nodes[ni].comp = pos;
        }
    }

    /// Rebuild the tree without the node bound to `comp_idx`, re-parenting
    /// its children in place. The root cannot be pruned. Remaining
    /// component bindings above `comp_idx` shift down by one.
    pub fn prune_comp(&self, comp_idx: usize) -> BlockTree {
        let victim = self
            .node_of_comp(comp_idx)
            .expect("component not bound to a tree node");
        debug_assert_ne!(victim, self.root, "cannot prune the tree root");
        let mut nodes = Vec::with_capacity(self.nodes.len() - 1);
        let root = self.prune_rec(self.root, victim, comp_idx, None, &mut nodes);
        BlockTree {
            nodes,
            root: root.expect("pruning a non-root node keeps the root"),
        }
    }

    fn prune_rec(
        &self,
        src: usize,
        victim: usize,
        comp_idx: usize,
        parent: Option<usize>,
        out: &mut Vec<TreeNode>,
    ) -> Option<usize> {
        if src == victim {
            return None;
        }
        let idx = out.len();
        let src_node = &self.nodes[src];
        out.push(TreeNode {
            label: src_node.label.clone(),
            branch_length: src_node.branch_length,
            parent,
            children: Vec::new(),
            comp: if src_node.comp > comp_idx {
                src_node.comp - 1
            } else {
                src_node.comp
            },
        });
        let mut children = Vec::new();
        for &child in &src_node.children {
            if child == victim {
                // splice the victim's children in at its position
                for &grandchild in &self.nodes[victim].children {
                    if let Some(c) = self.prune_rec(grandchild, victim, comp_idx, Some(idx), out) {
                        children.push(c);
                    }
                }
            } else if let Some(c) = self.prune_rec(child, victim, comp_idx, Some(idx), out) {
                children.push(c);
            }
        }
        out[idx].children = children;
        Some(idx)
    }

    /// Clone the tree over the subset of components present in `comp_map`
    /// (old index -> new index). Dropped interior nodes attach their
    /// surviving descendants to their surviving ancestor. Returns None when
    /// nothing survives.
    pub fn subrange_clone(&self, comp_map: &[Option<usize>]) -> Result<Option<BlockTree>> {
        let mut nodes = Vec::new();
        let mut pending = Vec::new();
        let root = self.sub_rec(self.root, comp_map, &mut nodes, &mut pending);
        let root = match root {
            Some(r) => r,
            None => match pending.len() {
                0 => return Ok(None),
                1 => pending[0],
                _ => {
                    return Err(JoinError::RootPruneInvalid {
                        label: self.nodes[self.root].label.clone(),
                    })
                }
            },
        };
        nodes[root].parent = None;
        Ok(Some(BlockTree { nodes, root }))
    }

    fn sub_rec(
        &self,
        src: usize,
        comp_map: &[Option<usize>],
        out: &mut Vec<TreeNode>,
        pending: &mut Vec<usize>,
    ) -> Option<usize> {
        let mut survivors = Vec::new();
        for &child in &self.nodes[src].children {
            if let Some(kept) = self.sub_rec(child, comp_map, out, &mut survivors) {
                survivors.push(kept);
            }
        }
        let src_node = &self.nodes[src];
        match comp_map[src_node.comp] {
            Some(new_comp) => {
                let idx = out.len();
                out.push(TreeNode {
                    label: src_node.label.clone(),
                    branch_length: src_node.branch_length,
                    parent: None,
                    children: survivors.clone(),
                    comp: new_comp,
                });
                for &c in &survivors {
                    out[c].parent = Some(idx);
                }
                Some(idx)
            }
            None => {
                pending.extend(survivors);
                None
            }
        }
    }

    /// Join two block trees at components referring to the same sequence.
    /// One of the join nodes must be its tree's root: the other tree is
    /// cloned and the root's children grafted at the join point. `map1` and
    /// `map2` map each source component index to its destination index.
    pub fn join(
        t1: &BlockTree,
        comp1: usize,
        t2: &BlockTree,
        comp2: usize,
        map1: &[usize],
        map2: &[usize],
    ) -> Result<BlockTree> {
        let node1 = t1
            .node_of_comp(comp1)
            .expect("join component not bound in tree 1");
        let node2 = t2
            .node_of_comp(comp2)
            .expect("join component not bound in tree 2");
        debug_assert_eq!(map1[comp1], map2[comp2]);

        let root1 = node1 == t1.root;
        let root2 = node2 == t2.root;
        let (base, attach, grafted, graft_map) = if root2 {
            // root-to-root or attach tree2's children at node1
            (t1, node1, t2, map2)
        } else if root1 {
            (t2, node2, t1, map1)
        } else {
            return Err(JoinError::TreeJoinInvalidNodes {
                label1: t1.nodes[node1].label.clone(),
                label2: t2.nodes[node2].label.clone(),
            });
        };
        let base_map = if std::ptr::eq(base, t1) { map1 } else { map2 };

        let mut nodes = Vec::with_capacity(t1.len() + t2.len() - 1);
        let root = graft(base, base.root, base_map, None, &mut nodes);
        // find the clone of the attachment node by destination component
        let attach_dest = base_map[base.nodes[attach].comp];
        let attach_new = nodes
            .iter()
            .position(|n| n.comp == attach_dest)
            .expect("attachment node cloned");
        for &child in &grafted.nodes[grafted.root()].children {
            let c = graft(grafted, child, graft_map, Some(attach_new), &mut nodes);
            nodes[attach_new].children.push(c);
        }
        Ok(BlockTree { nodes, root })
    }

    /// Format the tree as a Newick string.
    pub fn format(&self) -> String {
        let mut out = String::new();
        self.fmt_node(self.root, &mut out);
        out.push(';');
        out
    }

    fn fmt_node(&self, idx: usize, out: &mut String) {
        let node = &self.nodes[idx];
        if !node.children.is_empty() {
            out.push('(');
            for (i, &child) in node.children.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                self.fmt_node(child, out);
            }
            out.push(')');
        }
        out.push_str(&node.label);
        if let Some(bl) = node.branch_length {
            out.push(':');
            out.push_str(&format!("{bl}"));
        }
    }

    /// Verify this tree is a subtree-homomorphism of a species tree: every
    /// node's genome must appear at or below the species-tree position of
    /// its parent's genome.
    pub fn verify_against_species_tree(
        &self,
        species: &NewickNode,
        comps: &[Component],
        genomes: &Genomes,
    ) -> Result<()> {
        self.verify_species_rec(species, self.root, comps, genomes)
    }

    fn verify_species_rec(
        &self,
        species_at: &NewickNode,
        blk_node: usize,
        comps: &[Component],
        genomes: &Genomes,
    ) -> Result<()> {
        let genome = genomes.genome_of(comps[self.nodes[blk_node].comp].seq);
        let here = species_find_at_below(species_at, genome).ok_or_else(|| {
            JoinError::SpeciesTreeMismatch {
                label: self.nodes[blk_node].label.clone(),
            }
        })?;
        for &child in &self.nodes[blk_node].children {
            let child_genome = genomes.genome_of(comps[self.nodes[child].comp].seq);
            let sp_child = species_find_at_below(here, child_genome).ok_or_else(|| {
                JoinError::SpeciesTreeMismatch {
                    label: self.nodes[child].label.clone(),
                }
            })?;
            self.verify_species_rec(sp_child, child, comps, genomes)?;
        }
        Ok(())
    }
}

fn species_find_at_below<'a>(node: &'a NewickNode, genome: &str) -> Option<&'a NewickNode> {
    if node.label == genome {
        return Some(node);
    }
    node.children
        .iter()
        .find_map(|c| species_find_at_below(c, genome))
}

fn flatten_newick(src: &NewickNode, parent: Option<usize>, out: &mut Vec<TreeNode>) -> usize {
    let idx = out.len();
    out.push(TreeNode {
        label: src.label.clone(),
        branch_length: src.branch_length,
        parent,
        children: Vec::new(),
        comp: usize::MAX,
    });
    let children: Vec<usize> = src
        .children
        .iter()
        .map(|c| flatten_newick(c, Some(idx), out))
        .collect();
    out[idx].children = children;
    idx
}

fn graft(
    src: &BlockTree,
    src_idx: usize,
    map: &[usize],
    parent: Option<usize>,
    out: &mut Vec<TreeNode>,
) -> usize {
    let idx = out.len();
    let node = src.node(src_idx);
    out.push(TreeNode {
        label: node.label.clone(),
        branch_length: node.branch_length,
        parent,
        children: Vec::new(),
        comp: map[node.comp],
    });
    let children: Vec<usize> = node
        .children
        .iter()
        .map(|&c| graft(src, c, map, Some(idx), out))
        .collect();
    out[idx].children = children;
    idx
}
