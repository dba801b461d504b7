//! End-to-end join scenarios through the full pipeline: write input MAFs,
//! run load -> dup join -> cross join -> overlap-adjacent join -> merge ->
//! multi-parent check -> write, and inspect the output MAF.

use std::path::{Path, PathBuf};

use pretty_assertions::assert_eq;

use mafjoin::error::JoinError;
use mafjoin::genomes::Genomes;
use mafjoin::maf::{load_maf_set, LoadOptions};
use mafjoin::pipeline::{run, JoinConfig};

struct Fixture {
    _dir: tempfile::TempDir,
    in1: PathBuf,
    in2: PathBuf,
    out: PathBuf,
}

fn fixture(maf1: &str, maf2: &str) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let in1 = dir.path().join("in1.maf");
    let in2 = dir.path().join("in2.maf");
    let out = dir.path().join("out.maf");
    std::fs::write(&in1, maf1).unwrap();
    std::fs::write(&in2, maf2).unwrap();
    Fixture {
        _dir: dir,
        in1,
        in2,
        out,
    }
}

/// Load an output MAF and return (root org.seq, root start, root end,
/// width, row count) per block, root-sorted.
fn summarize(path: &Path) -> Vec<(String, i64, i64, i64, usize)> {
    let mut genomes = Genomes::new();
    let opts = LoadOptions {
        branch_length: 0.1,
        treeless_root: None,
        max_input_blk_width: None,
    };
    let set = load_maf_set(path, &mut genomes, &opts).unwrap();
    let mut rows: Vec<_> = set
        .iter()
        .map(|blk| {
            let root = blk.root_comp();
            (
                genomes.org_seq(root.seq).to_string(),
                root.start,
                root.end,
                blk.width,
                blk.comps.len(),
            )
        })
        .collect();
    rows.sort();
    rows
}

const MAF1_SIMPLE: &str = "##maf version=1

a tree=\"(mm.chr5:0.1)hg.chr1:0;\"
s mm.chr5 0 6 + 30 ACGTAC
s hg.chr1 0 6 + 20 ACGTAC
";

const MAF2_SIMPLE: &str = "##maf version=1

a tree=\"(rn.chr9:0.1)hg.chr1:0;\"
s rn.chr9 0 6 + 25 TACGAT
s hg.chr1 3 6 + 20 TACGAT
";

// the overlapping second input reverse complemented: hg.chr1 on the minus strand
const MAF2_MINUS: &str = "##maf version=1

a tree=\"(rn.chr9:0.1)hg.chr1:0;\"
s rn.chr9 19 6 - 25 ATCGTA
s hg.chr1 11 6 - 20 ATCGTA
";

// a far-away block so the second input never joins
const MAF2_DISTANT: &str = "##maf version=1

a tree=\"(ss.c1:0.1)hg.chr9:0;\"
s ss.c1 0 4 + 50 AAAA
s hg.chr9 0 4 + 60 AAAA
";

#[test]
fn joins_blocks_overlapping_on_the_guide() {
    let fx = fixture(MAF1_SIMPLE, MAF2_SIMPLE);
    let config = JoinConfig::new("hg", fx.in1.clone(), fx.in2.clone(), fx.out.clone());
    run(&config).unwrap();

    let text = std::fs::read_to_string(&fx.out).unwrap();
    assert_eq!(
        text,
        "##maf version=1

a tree=\"(mm.chr5:0.1,rn.chr9:0.1)hg.chr1:0;\"
s mm.chr5 0 6 + 30 ACGTAC---
s rn.chr9 0 6 + 25 ---TACGAT
s hg.chr1 0 9 + 20 ACGTACGAT

"
    );
}

#[test]
fn strand_mismatch_reverse_complements_before_joining() {
    let fx_a = fixture(MAF1_SIMPLE, MAF2_SIMPLE);
    let config = JoinConfig::new("hg", fx_a.in1.clone(), fx_a.in2.clone(), fx_a.out.clone());
    run(&config).unwrap();
    let out_a = std::fs::read_to_string(&fx_a.out).unwrap();

    let fx_b = fixture(MAF1_SIMPLE, MAF2_MINUS);
    let config = JoinConfig::new("hg", fx_b.in1.clone(), fx_b.in2.clone(), fx_b.out.clone());
    run(&config).unwrap();
    let out_b = std::fs::read_to_string(&fx_b.out).unwrap();

    // the minus-strand block is reverse complemented first, then the join
    // proceeds exactly as in the plus-strand case
    assert_eq!(out_a, out_b);
}

#[test]
fn duplicate_blocks_within_one_input_are_fused() {
    let maf1 = "##maf version=1

a tree=\"(mm.chr5:0.1)hg.chr1:0;\"
s mm.chr5 0 6 + 30 ACGTAC
s hg.chr1 0 6 + 20 ACGTAC

a tree=\"(rn.chr9:0.1)hg.chr1:0;\"
s rn.chr9 0 6 + 25 TACGAT
s hg.chr1 3 6 + 20 TACGAT
";
    let fx = fixture(maf1, MAF2_DISTANT);
    let mut config = JoinConfig::new("hg", fx.in1.clone(), fx.in2.clone(), fx.out.clone());
    // a treeless root enables duplicate joining for that input
    config.treeless_root1 = Some("hg".to_string());
    run(&config).unwrap();

    let blocks = summarize(&fx.out);
    let hg1_roots: Vec<_> = blocks.iter().filter(|b| b.0 == "hg.chr1").collect();
    assert_eq!(hg1_roots.len(), 1);
    assert_eq!(
        hg1_roots[0],
        &("hg.chr1".to_string(), 0, 9, 9, 3)
    );
}

#[test]
fn multi_parent_regions_abort_the_run() {
    // mm.chr5 10-20 is claimed as a child under two different guide
    // sequences; the joined set fails validation and no output appears
    let maf1 = "##maf version=1

a tree=\"(mm.chr5:0.1)hg.chr1:0;\"
s mm.chr5 10 10 + 30 ACGTACGTAC
s hg.chr1 0 10 + 20 ACGTACGTAC
";
    let maf2 = "##maf version=1

a tree=\"(mm.chr5:0.1)hg.chr3:0;\"
s mm.chr5 10 10 + 30 ACGTACGTAC
s hg.chr3 0 10 + 40 ACGTACGTAC
";
    let fx = fixture(maf1, maf2);
    let config = JoinConfig::new("hg", fx.in1.clone(), fx.in2.clone(), fx.out.clone());
    let err = run(&config).unwrap_err();
    match err {
        JoinError::MultiParent { comp1, comp2 } => {
            assert!(comp1.contains("mm.chr5:10-20"), "comp1: {comp1}");
            assert!(comp2.contains("mm.chr5:10-20"), "comp2: {comp2}");
        }
        other => panic!("expected MultiParent, got {other}"),
    }
    assert!(!fx.out.exists(), "partial output must not be left behind");
}

#[test]
fn width_cap_limits_fused_output_blocks() {
    // four contiguous 20-wide blocks; cap 50 fuses them into 40 + 40
    let mut maf1 = String::from("##maf version=1\n");
    for i in 0..4i64 {
        let start = i * 20;
        maf1.push_str(&format!(
            "\na tree=\"(mm.chr5:0.1)hg.chr1:0;\"\ns mm.chr5 {start} 20 + 100 ACGTACGTACGTACGTACGT\ns hg.chr1 {start} 20 + 100 ACGTACGTACGTACGTACGT\n"
        ));
    }
    let fx = fixture(&maf1, MAF2_DISTANT);
    let mut config = JoinConfig::new("hg", fx.in1.clone(), fx.in2.clone(), fx.out.clone());
    config.max_blk_width = Some(50);
    run(&config).unwrap();

    let blocks = summarize(&fx.out);
    let hg1: Vec<_> = blocks.into_iter().filter(|b| b.0 == "hg.chr1").collect();
    assert_eq!(
        hg1,
        vec![
            ("hg.chr1".to_string(), 0, 40, 40, 2),
            ("hg.chr1".to_string(), 40, 80, 40, 2),
        ]
    );
}

#[test]
fn treeless_input_gets_inferred_fan_tree() {
    let maf1 = "##maf version=1

a score=0
s aa.c1 0 4 + 10 ACGT
s bb.c1 0 4 + 10 ACGT
s hg.chr1 0 4 + 20 ACGT
";
    let fx = fixture(maf1, MAF2_DISTANT);
    let mut config = JoinConfig::new("hg", fx.in1.clone(), fx.in2.clone(), fx.out.clone());
    config.treeless_root1 = Some("hg".to_string());
    run(&config).unwrap();

    let text = std::fs::read_to_string(&fx.out).unwrap();
    assert!(
        text.contains("a tree=\"(aa.c1:0.1,bb.c1:0.1)hg.chr1;\""),
        "inferred tree missing: {text}"
    );
}

#[test]
fn adjacent_guides_join_without_shared_columns() {
    let maf2 = "##maf version=1

a tree=\"(rn.chr9:0.1)hg.chr1:0;\"
s rn.chr9 0 3 + 25 TTT
s hg.chr1 6 3 + 20 TTT
";
    let fx = fixture(MAF1_SIMPLE, maf2);
    let config = JoinConfig::new("hg", fx.in1.clone(), fx.in2.clone(), fx.out.clone());
    run(&config).unwrap();
    let blocks = summarize(&fx.out);
    assert_eq!(blocks, vec![("hg.chr1".to_string(), 0, 9, 9, 3)]);
}

#[test]
fn dump_dir_writes_state_transitions() {
    let fx = fixture(MAF1_SIMPLE, MAF2_SIMPLE);
    let dump_dir = fx._dir.path().join("dumps");
    let mut config = JoinConfig::new("hg", fx.in1.clone(), fx.in2.clone(), fx.out.clone());
    config.dump_dir = Some(dump_dir.clone());
    run(&config).unwrap();
    for name in [
        "set1-1.input.dmp",
        "set2-1.input.dmp",
        "set3-1.joined.dmp",
        "set3-2.overadj.dmp",
        "set3-3.merged.dmp",
    ] {
        assert!(dump_dir.join(name).exists(), "missing dump {name}");
    }
    let joined = std::fs::read_to_string(dump_dir.join("set3-1.joined.dmp")).unwrap();
    assert!(joined.contains("hg.chr1 + 0-9 0-9 [9] root"), "{joined}");
}

#[test]
fn species_tree_assert_checks_block_trees() {
    let fx = fixture(MAF1_SIMPLE, MAF2_SIMPLE);
    let mut config = JoinConfig::new("hg", fx.in1.clone(), fx.in2.clone(), fx.out.clone());
    config.species_tree = Some(mafjoin::tree::parse_newick("(mm,rn)hg;").unwrap());
    run(&config).unwrap();

    let fx = fixture(MAF1_SIMPLE, MAF2_SIMPLE);
    let mut config = JoinConfig::new("hg", fx.in1.clone(), fx.in2.clone(), fx.out.clone());
    // hg is not an ancestor of mm here, so block trees cannot embed
    config.species_tree = Some(mafjoin::tree::parse_newick("(hg,rn)mm;").unwrap());
    let err = run(&config).unwrap_err();
    assert!(matches!(err, JoinError::SpeciesTreeMismatch { .. }));
}

#[test]
fn max_input_width_splits_before_joining() {
    let fx = fixture(MAF1_SIMPLE, MAF2_SIMPLE);
    let mut config = JoinConfig::new("hg", fx.in1.clone(), fx.in2.clone(), fx.out.clone());
    config.max_input_blk_width = Some(3);
    run(&config).unwrap();
    // the pieces re-fuse through the cross and overlap-adjacent joins
    let blocks = summarize(&fx.out);
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].1, 0);
    assert_eq!(blocks[0].2, 9);
}
