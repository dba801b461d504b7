//! Error taxonomy for the join core. Every fallible operation in the
//! library returns `Result<_, JoinError>`; the CLI wraps these with
//! file-level context.

use thiserror::Error;

pub type Result<T, E = JoinError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum JoinError {
    /// The MAF reader could not make sense of a line.
    #[error("malformed MAF at {path}:{line}: {msg}")]
    MalformedMaf {
        path: String,
        line: u64,
        msg: String,
    },

    /// A row name must be "genome.sequence".
    #[error("sequence name not in the form genome.seq: \"{name}\"")]
    MissingDot { name: String },

    /// Two rows disagree on a sequence's total length.
    #[error("inconsistent size for sequence {org_seq}: {known} vs {new}")]
    InconsistentSize {
        org_seq: String,
        known: i64,
        new: i64,
    },

    /// Base count in a row's alignment text does not match its declared range.
    #[error("bases in row {org_seq} ({found}) don't match declared size ({declared})")]
    MalformedRow {
        org_seq: String,
        found: i64,
        declared: i64,
    },

    /// A tree node label matched no row at its position.
    #[error("tree node \"{label}\" doesn't match row \"{org_seq}\"")]
    TreeLabelMismatch { label: String, org_seq: String },

    /// Tree node count differs from the block's row count.
    #[error("tree has {tree_nodes} nodes but block has {rows} rows")]
    TreeRowCountMismatch { tree_nodes: usize, rows: usize },

    /// Two root rows of one block overlap on the same sequence.
    #[error("overlapping root components within a block: {comp1} and {comp2}")]
    OverlappingRoots { comp1: String, comp2: String },

    /// Pairwise join guides refer to different sequences.
    #[error("join guides are not the same genome.sequence: {guide1} and {guide2}")]
    GuideSequenceMismatch { guide1: String, guide2: String },

    /// Pairwise join guides neither overlap nor adjoin.
    #[error("join guides don't overlap or adjoin: {guide1} and {guide2}")]
    GuideNonOverlapping { guide1: String, guide2: String },

    /// Pairwise join where neither guide is its block's tree root.
    #[error("neither join guide is a tree root: {guide1} and {guide2}")]
    GuideNeitherIsRoot { guide1: String, guide2: String },

    /// Tree join nodes are not root-to-root or root-to-leaf.
    #[error("tree join nodes don't obey join rules: \"{label1}\" and \"{label2}\"")]
    TreeJoinInvalidNodes { label1: String, label2: String },

    /// Subrange pruning would leave a multi-child virtual root.
    #[error("pruned tree root \"{label}\" has more than one surviving child")]
    RootPruneInvalid { label: String },

    /// A block tree is not a subtree-homomorphism of the species tree.
    #[error("block tree node \"{label}\" doesn't match the species tree")]
    SpeciesTreeMismatch { label: String },

    /// A non-root region is aligned under two independent parents.
    #[error("multiple parents detected in components {comp1} and {comp2}")]
    MultiParent { comp1: String, comp2: String },

    /// Failure to map a non-empty guide overlap onto alignment columns.
    #[error("failure to get alignment range for guide sequence range on {org_seq}")]
    JoinCoordBug { org_seq: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
