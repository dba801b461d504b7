// Library exports for mafjoin
pub mod block;
pub mod blockset;
pub mod comp;
pub mod dump;
pub mod error;
pub mod genomes;
pub mod join_blocks;
pub mod join_sets;
pub mod join_within;
pub mod maf;
pub mod merge_comps;
pub mod multi_parents;
pub mod pipeline;
pub mod tree;
