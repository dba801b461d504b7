//! Round-trip and idempotence laws over whole block sets.

use pretty_assertions::assert_eq;

use mafjoin::blockset::BlockSet;
use mafjoin::genomes::Genomes;
use mafjoin::join_within::join_dups;
use mafjoin::maf::{load_maf_set, write_maf_set, LoadOptions};
use mafjoin::merge_comps::merge_set_comps;

const MIXED: &str = "##maf version=1

a tree=\"(mm.chr5:0.1,rn.chr9:0.2)hg.chr1:0;\"
s mm.chr5 4 6 + 30 AC--GTAC--
s rn.chr9 19 6 - 25 -ATCGT--A-
s hg.chr1 0 8 + 20 ACGT-ACGT-

a tree=\"(mm.chr5:0.1)hg.chr2:0;\"
s mm.chr5 12 4 + 30 acgt
s hg.chr2 5 4 + 40 tgca
";

fn opts() -> LoadOptions<'static> {
    LoadOptions {
        branch_length: 0.1,
        treeless_root: None,
        max_input_blk_width: None,
    }
}

fn sets_equal(a: &BlockSet, b: &BlockSet, genomes: &Genomes) {
    assert_eq!(a.len(), b.len());
    for (blk_a, blk_b) in a.iter().zip(b.iter()) {
        assert_eq!(blk_a.width, blk_b.width);
        assert_eq!(blk_a.comps.len(), blk_b.comps.len());
        assert_eq!(blk_a.tree().format(), blk_b.tree().format());
        for (ca, cb) in blk_a.comps.iter().zip(&blk_b.comps) {
            assert_eq!(genomes.org_seq(ca.seq), genomes.org_seq(cb.seq));
            assert_eq!(ca.strand, cb.strand);
            assert_eq!((ca.start, ca.end), (cb.start, cb.end));
            assert_eq!((ca.chrom_start, ca.chrom_end), (cb.chrom_start, cb.chrom_end));
            assert_eq!(ca.aln_text(), cb.aln_text());
        }
    }
}

#[test]
fn load_write_load_is_identity() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.maf");
    std::fs::write(&input, MIXED).unwrap();
    let mut genomes = Genomes::new();
    let set = load_maf_set(&input, &mut genomes, &opts()).unwrap();

    let out1 = dir.path().join("out1.maf");
    write_maf_set(&set, &genomes, &out1).unwrap();
    let set1 = load_maf_set(&out1, &mut genomes, &opts()).unwrap();
    sets_equal(&set, &set1, &genomes);

    // writing again is stable
    let out2 = dir.path().join("out2.maf");
    write_maf_set(&set1, &genomes, &out2).unwrap();
    assert_eq!(
        std::fs::read_to_string(&out1).unwrap(),
        std::fs::read_to_string(&out2).unwrap()
    );
}

#[test]
fn join_dups_without_overlaps_is_noop() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.maf");
    std::fs::write(&input, MIXED).unwrap();
    let mut genomes = Genomes::new();
    let mut set = load_maf_set(&input, &mut genomes, &opts()).unwrap();
    let ids = set.ids();
    join_dups(&mut set, &genomes).unwrap();
    assert_eq!(set.ids(), ids);
}

#[test]
fn merge_comps_without_pairs_is_noop() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.maf");
    std::fs::write(&input, MIXED).unwrap();
    let mut genomes = Genomes::new();
    let mut set = load_maf_set(&input, &mut genomes, &opts()).unwrap();
    let ids = set.ids();
    merge_set_comps(&mut set, &genomes).unwrap();
    assert_eq!(set.ids(), ids);
}

#[test]
fn finish_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.maf");
    std::fs::write(&input, MIXED).unwrap();
    let mut genomes = Genomes::new();
    let mut set = load_maf_set(&input, &mut genomes, &opts()).unwrap();
    let before: Vec<String> = set.iter().map(|b| b.tree().format()).collect();
    for id in set.ids() {
        let genomes_ref = &genomes;
        set.get_mut(id).unwrap().finish(genomes_ref).unwrap();
    }
    let after: Vec<String> = set.iter().map(|b| b.tree().format()).collect();
    assert_eq!(before, after);
}
