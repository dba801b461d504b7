//! Human-readable block-set dumps, written on state transitions when a
//! dump directory is configured. For debugging and tests only; the format
//! carries no stability guarantee.

use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::blockset::BlockSet;
use crate::error::Result;
use crate::genomes::Genomes;

/// Write one `<set_name>-<step>.dmp` file describing every block.
pub fn dump_set(
    set: &BlockSet,
    genomes: &Genomes,
    dir: &Path,
    set_name: &str,
    step: &str,
) -> Result<()> {
    create_dir_all(dir)?;
    let path = dir.join(format!("{set_name}-{step}.dmp"));
    let mut out = BufWriter::new(File::create(path)?);
    for blk in set.iter() {
        let tree = blk
            .tree
            .as_ref()
            .map(|t| t.format())
            .unwrap_or_else(|| "none".to_string());
        writeln!(
            out,
            "#{} width={}{} tree={}",
            blk.id,
            blk.width,
            if blk.deleted { " deleted" } else { "" },
            tree
        )?;
        for (i, comp) in blk.comps.iter().enumerate() {
            writeln!(
                out,
                "{} {} {}-{} {}-{} [{}] {}",
                genomes.org_seq(comp.seq),
                comp.strand,
                comp.start,
                comp.end,
                comp.chrom_start,
                comp.chrom_end,
                comp.aligned(),
                blk.loc_of(i).as_str()
            )?;
        }
        writeln!(out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Block;
    use crate::comp::{Component, Strand};
    use crate::tree::{parse_newick, BlockTree};

    #[test]
    fn dump_format_lines() {
        let mut genomes = Genomes::new();
        let hg = genomes.obtain_seq_for_org_seq("hg.chr1", Some(20)).unwrap();
        let mm = genomes.obtain_seq_for_org_seq("mm.chr5", Some(30)).unwrap();
        let mut blk = Block::new();
        blk.add_comp(Component::from_text(&genomes, mm, Strand::Plus, 0, 6, b"ACGTAC").unwrap());
        blk.add_comp(Component::from_text(&genomes, hg, Strand::Plus, 0, 6, b"ACGTAC").unwrap());
        let nw = parse_newick("(mm.chr5:0.1)hg.chr1;").unwrap();
        let tree = BlockTree::from_newick_node(&nw, &blk.comps, &genomes).unwrap();
        blk.set_tree(tree);
        blk.finish(&genomes).unwrap();
        let id = blk.id;

        let mut set = BlockSet::new();
        set.add(blk);
        let dir = tempfile::tempdir().unwrap();
        dump_set(&set, &genomes, dir.path(), "set1", "1.input").unwrap();
        let text = std::fs::read_to_string(dir.path().join("set1-1.input.dmp")).unwrap();
        assert!(text.contains(&format!("#{id} width=6 tree=(mm.chr5:0.1)hg.chr1;")));
        assert!(text.contains("mm.chr5 + 0-6 0-6 [6] leaf"));
        assert!(text.contains("hg.chr1 + 0-6 0-6 [6] root"));
    }
}
