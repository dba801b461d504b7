//! The mafJoin pipeline: load both inputs, join duplicates within each,
//! join the sets on the guide genome, coalesce the result, and write it
//! out. Deleted blocks are swept between states to keep memory bounded.

use std::path::PathBuf;

use log::info;

use crate::blockset::BlockSet;
use crate::dump::dump_set;
use crate::error::Result;
use crate::genomes::Genomes;
use crate::join_sets::join_sets;
use crate::join_within::{join_dups, join_overlap_adjacent};
use crate::maf::{load_maf_set, write_maf_set, LoadOptions};
use crate::merge_comps::merge_set_comps;
use crate::multi_parents::check_multi_parents;
use crate::tree::NewickNode;

/// Everything a join run needs, passed explicitly through the pipeline.
pub struct JoinConfig {
    pub guide_genome: String,
    pub in_maf1: PathBuf,
    pub in_maf2: PathBuf,
    pub out_maf: PathBuf,
    /// Branch length used when inferring trees for treeless blocks.
    pub branch_length: f64,
    /// Tree root genome for treeless blocks of each input. Also enables
    /// duplicate joining for that input.
    pub treeless_root1: Option<String>,
    pub treeless_root2: Option<String>,
    pub max_input_blk_width: Option<i64>,
    pub max_blk_width: Option<i64>,
    /// Verify every block tree against this species tree.
    pub species_tree: Option<NewickNode>,
    /// Dump every set on state transitions into this directory.
    pub dump_dir: Option<PathBuf>,
}

impl JoinConfig {
    pub fn new(guide_genome: &str, in_maf1: PathBuf, in_maf2: PathBuf, out_maf: PathBuf) -> Self {
        JoinConfig {
            guide_genome: guide_genome.to_string(),
            in_maf1,
            in_maf2,
            out_maf,
            branch_length: 0.1,
            treeless_root1: None,
            treeless_root2: None,
            max_input_blk_width: None,
            max_blk_width: None,
            species_tree: None,
            dump_dir: None,
        }
    }

    fn dump(&self, set: &BlockSet, genomes: &Genomes, set_name: &str, step: &str) -> Result<()> {
        if let Some(dir) = &self.dump_dir {
            dump_set(set, genomes, dir, set_name, step)?;
        }
        Ok(())
    }

    fn verify_species(&self, set: &BlockSet, genomes: &Genomes) -> Result<()> {
        if let Some(species) = &self.species_tree {
            for blk in set.iter_live() {
                blk.tree()
                    .verify_against_species_tree(species, &blk.comps, genomes)?;
            }
        }
        Ok(())
    }
}

/// Load one input MAF and join its duplication blocks if requested.
fn load_input(
    config: &JoinConfig,
    genomes: &mut Genomes,
    in_maf: &PathBuf,
    treeless_root: Option<&str>,
    set_name: &str,
) -> Result<BlockSet> {
    if let Some(root) = treeless_root {
        genomes.obtain_genome(root);
    }
    let opts = LoadOptions {
        branch_length: config.branch_length,
        treeless_root,
        max_input_blk_width: config.max_input_blk_width,
    };
    let mut set = load_maf_set(in_maf, genomes, &opts)?;
    config.dump(&set, genomes, set_name, "1.input")?;
    config.verify_species(&set, genomes)?;
    if treeless_root.is_some() {
        check_multi_parents(&mut set, genomes)?;
        join_dups(&mut set, genomes)?;
        config.dump(&set, genomes, set_name, "2.joindups")?;
    }
    check_multi_parents(&mut set, genomes)?;
    Ok(set)
}

/// Run the whole join pipeline:
/// LoadA, JoinDupsA, LoadB, JoinDupsB, CrossJoin, OverlapAdjacentJoin,
/// MergeComponents, MultiParentCheck, Write.
pub fn run(config: &JoinConfig) -> Result<()> {
    let mut genomes = Genomes::new();
    genomes.obtain_genome(&config.guide_genome);

    let mut set1 = load_input(
        config,
        &mut genomes,
        &config.in_maf1,
        config.treeless_root1.as_deref(),
        "set1",
    )?;
    let mut set2 = load_input(
        config,
        &mut genomes,
        &config.in_maf2,
        config.treeless_root2.as_deref(),
        "set2",
    )?;

    let mut joined = join_sets(&config.guide_genome, &mut set1, &mut set2, &genomes)?;
    config.dump(&joined, &genomes, "set3", "1.joined")?;
    drop(set1);
    drop(set2);

    join_overlap_adjacent(
        &mut joined,
        &genomes,
        config.max_blk_width.unwrap_or(i64::MAX),
    )?;
    config.dump(&joined, &genomes, "set3", "2.overadj")?;

    merge_set_comps(&mut joined, &genomes)?;
    config.dump(&joined, &genomes, "set3", "3.merged")?;

    check_multi_parents(&mut joined, &genomes)?;
    config.verify_species(&joined, &genomes)?;

    write_maf_set(&joined, &genomes, &config.out_maf)?;
    info!("join pipeline finished");
    Ok(())
}
