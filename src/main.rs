use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use mafjoin::pipeline::{run, JoinConfig};
use mafjoin::tree::parse_newick;

/// Join two MAF files that share a guide genome into one consistent MAF,
/// preserving per-column alignment equivalence and the block trees.
///
/// Blocks without a tree= attribute get one inferred when the matching
/// --treeless-rootN genome is given: one row of that genome becomes the
/// root and the remaining rows its direct children. Giving a treeless
/// root also enables joining of duplication blocks within that input.
#[derive(Parser, Debug)]
#[command(name = "mafjoin", version, about, verbatim_doc_comment)]
struct Args {
    /// Genome shared by both inputs that anchors all joins.
    guide_genome: String,

    /// First input MAF (may be gzip compressed).
    in_maf1: PathBuf,

    /// Second input MAF (may be gzip compressed).
    in_maf2: PathBuf,

    /// Output MAF.
    out_maf: PathBuf,

    /// Branch length used when inferring trees for treeless blocks.
    #[arg(long, default_value_t = 0.1)]
    branch_length: f64,

    /// Root genome for blocks of in_maf1 that have no tree.
    #[arg(long)]
    treeless_root1: Option<String>,

    /// Root genome for blocks of in_maf2 that have no tree.
    #[arg(long)]
    treeless_root2: Option<String>,

    /// Split input blocks wider than this many columns to bound the cost
    /// of the merge.
    #[arg(long)]
    max_input_blk_width: Option<i64>,

    /// Cap on the width of blocks produced by the final overlap-adjacent
    /// join. Blocks passed through unjoined keep their size.
    #[arg(long)]
    max_blk_width: Option<i64>,

    /// Verify every block tree against this Newick species tree.
    #[arg(long, value_name = "FILE")]
    species_tree_assert: Option<PathBuf>,

    /// Dump every block set to this directory on state transitions.
    #[arg(long, value_name = "DIR")]
    dump_dir: Option<PathBuf>,
}

fn build_config(args: Args) -> Result<JoinConfig> {
    let mut config = JoinConfig::new(&args.guide_genome, args.in_maf1, args.in_maf2, args.out_maf);
    config.branch_length = args.branch_length;
    config.treeless_root1 = args.treeless_root1;
    config.treeless_root2 = args.treeless_root2;
    config.max_input_blk_width = args.max_input_blk_width;
    config.max_blk_width = args.max_blk_width;
    config.dump_dir = args.dump_dir;
    if let Some(path) = &args.species_tree_assert {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading species tree {}", path.display()))?;
        let species = parse_newick(&text)
            .map_err(|msg| anyhow::anyhow!(msg))
            .with_context(|| format!("parsing species tree {}", path.display()))?;
        config.species_tree = Some(species);
    }
    Ok(config)
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    let result =
        build_config(args).and_then(|config| run(&config).context("maf join failed"));
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
