//! MAF text reading and writing, and loading MAF files into block sets.
//!
//! The reader handles `##maf` headers, `a` block lines with attributes
//! (including `tree="..."`), and `s` rows; `i`, `e`, `q` and comment lines
//! must parse but carry nothing the join core uses. Input files ending in
//! `.gz`/`.bgz` are decompressed transparently. Output is written through
//! a temp file in the target directory so a failed run never leaves a
//! partial MAF behind.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use log::info;
use tempfile::NamedTempFile;

use crate::block::Block;
use crate::blockset::BlockSet;
use crate::comp::{Component, Strand};
use crate::error::{JoinError, Result};
use crate::genomes::Genomes;
use crate::tree::{parse_newick, BlockTree};

/// Open a MAF file, auto-detecting gzip compression by extension.
pub fn open_maf_input(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path)?;
    let is_compressed = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext == "gz" || ext == "bgz")
        .unwrap_or(false);
    if is_compressed {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// One `s` row as read from the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    pub name: String,
    pub start: i64,
    pub size: i64,
    pub strand: Strand,
    pub src_size: i64,
    pub text: Vec<u8>,
}

/// One alignment paragraph as read from the file.
#[derive(Debug, Clone, Default)]
pub struct RawBlock {
    /// The `tree="..."` attribute of the `a` line, quotes stripped.
    pub tree: Option<String>,
    /// Remaining `a`-line attributes, in file order.
    pub attrs: Vec<(String, String)>,
    pub rows: Vec<RawRow>,
    /// Line number of the `a` line, for error reporting.
    pub line: u64,
}

pub struct MafReader<R> {
    input: R,
    path: String,
    line_no: u64,
    header_seen: bool,
}

impl<R: BufRead> MafReader<R> {
    pub fn new(input: R, path: &str) -> MafReader<R> {
        MafReader {
            input,
            path: path.to_string(),
            line_no: 0,
            header_seen: false,
        }
    }

    fn malformed(&self, line: u64, msg: impl Into<String>) -> JoinError {
        JoinError::MalformedMaf {
            path: self.path.clone(),
            line,
            msg: msg.into(),
        }
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        let mut buf = String::new();
        if self.input.read_line(&mut buf)? == 0 {
            return Ok(None);
        }
        self.line_no += 1;
        while buf.ends_with('\n') || buf.ends_with('\r') {
            buf.pop();
        }
        Ok(Some(buf))
    }

    /// Read the next alignment paragraph, or None at end of file.
    pub fn next_block(&mut self) -> Result<Option<RawBlock>> {
        // find the next `a` line
        let header = loop {
            let line = match self.read_line()? {
                Some(line) => line,
                None => return Ok(None),
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if !self.header_seen {
                if !trimmed.starts_with("##maf") {
                    return Err(self.malformed(self.line_no, "file does not start with ##maf"));
                }
                self.header_seen = true;
                continue;
            }
            if trimmed.starts_with('#') {
                continue;
            }
            if trimmed.starts_with("a ") || trimmed == "a" {
                break line;
            }
            return Err(self.malformed(self.line_no, format!("unexpected line: {trimmed}")));
        };

        let mut block = RawBlock {
            line: self.line_no,
            ..RawBlock::default()
        };
        self.parse_block_header(&header, &mut block)?;

        // rows until a blank line ends the paragraph
        loop {
            let line = match self.read_line()? {
                Some(line) => line,
                None => break,
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                break;
            }
            let kind = trimmed.split_whitespace().next().unwrap_or("");
            match kind {
                "s" => block.rows.push(self.parse_s_line(trimmed)?),
                "i" | "e" | "q" => {} // parse and discard
                _ if trimmed.starts_with('#') => {}
                _ => {
                    return Err(
                        self.malformed(self.line_no, format!("unexpected line in block: {trimmed}"))
                    )
                }
            }
        }
        Ok(Some(block))
    }

    fn parse_block_header(&self, header: &str, block: &mut RawBlock) -> Result<()> {
        for field in header.split_whitespace().skip(1) {
            let (key, value) = field
                .split_once('=')
                .ok_or_else(|| self.malformed(block.line, format!("bad a-line attribute: {field}")))?;
            let value = value.trim_matches('"');
            if key == "tree" {
                block.tree = Some(value.to_string());
            } else {
                block.attrs.push((key.to_string(), value.to_string()));
            }
        }
        Ok(())
    }

    fn parse_s_line(&self, line: &str) -> Result<RawRow> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 7 {
            return Err(self.malformed(
                self.line_no,
                format!("s line has {} fields, expected 7", fields.len()),
            ));
        }
        let parse_num = |s: &str, what: &str| -> Result<i64> {
            s.parse()
                .map_err(|_| self.malformed(self.line_no, format!("invalid {what}: {s}")))
        };
        let strand_char = fields[4];
        let strand = strand_char
            .chars()
            .next()
            .and_then(Strand::from_char)
            .filter(|_| strand_char.len() == 1)
            .ok_or_else(|| self.malformed(self.line_no, format!("invalid strand: {strand_char}")))?;
        Ok(RawRow {
            name: fields[1].to_string(),
            start: parse_num(fields[2], "start")?,
            size: parse_num(fields[3], "size")?,
            strand,
            src_size: parse_num(fields[5], "srcSize")?,
            text: fields[6].as_bytes().to_vec(),
        })
    }
}

/// How to turn raw blocks into finished blocks.
pub struct LoadOptions<'a> {
    /// Branch length for inferred trees.
    pub branch_length: f64,
    /// Root genome for blocks without a `tree=` attribute; without it a
    /// treeless block is an error.
    pub treeless_root: Option<&'a str>,
    /// Split wider input blocks into adjacent pieces.
    pub max_input_blk_width: Option<i64>,
}

/// Load a MAF file into a fresh block set.
pub fn load_maf_set(path: &Path, genomes: &mut Genomes, opts: &LoadOptions<'_>) -> Result<BlockSet> {
    let path_str = path.display().to_string();
    let input = open_maf_input(path)?;
    let mut reader = MafReader::new(input, &path_str);
    let mut set = BlockSet::new();
    let mut blocks = 0usize;
    while let Some(raw) = reader.next_block()? {
        let blk = raw_to_block(&raw, genomes, opts, &path_str)?;
        blocks += 1;
        match opts.max_input_blk_width {
            Some(max_width) if blk.width > max_width => {
                for piece in split_block(&blk, max_width, genomes)? {
                    set.add(piece);
                }
            }
            _ => {
                set.add(blk);
            }
        }
    }
    info!(
        "loaded {} with {} blocks ({} after splitting)",
        path_str,
        blocks,
        set.len()
    );
    Ok(set)
}

fn raw_to_block(
    raw: &RawBlock,
    genomes: &mut Genomes,
    opts: &LoadOptions<'_>,
    path: &str,
) -> Result<Block> {
    let mut comps = Vec::with_capacity(raw.rows.len());
    for row in &raw.rows {
        let seq = genomes.obtain_seq_for_org_seq(&row.name, Some(row.src_size))?;
        comps.push(Component::from_text(
            genomes,
            seq,
            row.strand,
            row.start,
            row.start + row.size,
            &row.text,
        )?);
    }
    if comps.is_empty() {
        return Err(JoinError::MalformedMaf {
            path: path.to_string(),
            line: raw.line,
            msg: "alignment block has no s rows".to_string(),
        });
    }

    let tree = match (&raw.tree, opts.treeless_root) {
        (Some(text), _) => {
            let newick = parse_newick(text).map_err(|msg| JoinError::MalformedMaf {
                path: path.to_string(),
                line: raw.line,
                msg,
            })?;
            BlockTree::from_newick_node(&newick, &comps, genomes)?
        }
        (None, Some(root_genome)) => {
            order_treeless(&mut comps, root_genome, genomes);
            BlockTree::from_alignment(&comps, opts.branch_length, genomes)
        }
        (None, None) => {
            return Err(JoinError::MalformedMaf {
                path: path.to_string(),
                line: raw.line,
                msg: "block has no tree and no treeless root genome was given".to_string(),
            })
        }
    };

    let mut blk = Block::new();
    for comp in comps {
        blk.add_comp(comp);
    }
    blk.set_tree(tree);
    blk.finish(genomes)?;
    Ok(blk)
}

/// Order rows of a treeless block for tree inference: rows of other
/// genomes first in input order, then the root genome's rows with the
/// longest (most aligned bases) last so it becomes the root.
fn order_treeless(comps: &mut Vec<Component>, root_genome: &str, genomes: &Genomes) {
    comps.sort_by(|a, b| {
        let a_root = genomes.genome_of(a.seq) == root_genome;
        let b_root = genomes.genome_of(b.seq) == root_genome;
        a_root
            .cmp(&b_root)
            .then_with(|| {
                if a_root && b_root {
                    a.aligned().cmp(&b.aligned())
                } else {
                    std::cmp::Ordering::Equal
                }
            })
    });
}

/// Split an oversized block into roughly equal adjacent pieces. Every
/// piece must contain at least one aligned root base; pieces that do not
/// are dissolved into their neighbor.
fn split_block(blk: &Block, max_width: i64, genomes: &Genomes) -> Result<Vec<Block>> {
    let num_parts = (blk.width + max_width - 1) / max_width;
    let part = (blk.width + num_parts - 1) / num_parts;
    let mut bounds: Vec<i64> = (0..=num_parts).map(|i| (i * part).min(blk.width)).collect();
    bounds.dedup();
    let root = blk.root_comp();
    let mut i = 0;
    while i + 1 < bounds.len() {
        if root.any_aligned_range(bounds[i], bounds[i + 1]) {
            i += 1;
        } else if i + 2 < bounds.len() {
            bounds.remove(i + 1); // dissolve into the following piece
        } else if i > 0 {
            bounds.remove(i); // last piece dissolves backward
        } else {
            break; // a root always has at least one base somewhere
        }
    }
    let mut pieces = Vec::new();
    for win in bounds.windows(2) {
        if let Some(piece) = blk.subrange(win[0], win[1], genomes)? {
            pieces.push(piece);
        }
    }
    Ok(pieces)
}

/// Write a block set as MAF, blocks sorted by root row. The file appears
/// atomically: content goes to a temp file first and is persisted only on
/// success.
pub fn write_maf_set(set: &BlockSet, genomes: &Genomes, path: &Path) -> Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    let tmp = match dir {
        Some(dir) => NamedTempFile::new_in(dir)?,
        None => NamedTempFile::new_in(".")?,
    };
    {
        let mut out = BufWriter::new(tmp.as_file());
        writeln!(out, "##maf version=1")?;
        writeln!(out)?;
        for id in set.ids_root_sorted(genomes) {
            let blk = match set.get(id) {
                Some(blk) if !blk.deleted => blk,
                _ => continue,
            };
            blk.validate(genomes)?;
            write_block(&mut out, blk, genomes)?;
        }
        out.flush()?;
    }
    tmp.persist(path).map_err(|e| JoinError::Io(e.error))?;
    info!("wrote {} blocks to {}", set.len(), path.display());
    Ok(())
}

fn write_block(out: &mut impl Write, blk: &Block, genomes: &Genomes) -> Result<()> {
    match &blk.tree {
        Some(tree) => writeln!(out, "a tree=\"{}\"", tree.format())?,
        None => writeln!(out, "a")?,
    }
    for comp in &blk.comps {
        writeln!(
            out,
            "s {} {} {} {} {} {}",
            genomes.org_seq(comp.seq),
            comp.start,
            comp.end - comp.start,
            comp.strand,
            genomes.size_of(comp.seq),
            String::from_utf8_lossy(&comp.aln_text()),
        )?;
    }
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn reader(text: &str) -> MafReader<BufReader<&[u8]>> {
        MafReader::new(BufReader::new(text.as_bytes()), "test.maf")
    }

    const SIMPLE: &str = "##maf version=1

a score=23 tree=\"(mm.chr5:0.1)hg.chr1;\"
s hg.chr1 0 6 + 20 ACGTAC
s mm.chr5 0 6 + 30 ACGTAC

a tree=\"(rn.chr9:0.1)hg.chr1;\"
s hg.chr1 3 6 + 20 TACGAT
s rn.chr9 0 6 + 25 TACGAT
";

    #[test]
    fn reads_blocks_and_attributes() {
        let mut r = reader(SIMPLE);
        let b1 = r.next_block().unwrap().unwrap();
        assert_eq!(b1.tree.as_deref(), Some("(mm.chr5:0.1)hg.chr1;"));
        assert_eq!(b1.attrs, vec![("score".to_string(), "23".to_string())]);
        assert_eq!(b1.rows.len(), 2);
        assert_eq!(b1.rows[0].name, "hg.chr1");
        assert_eq!(b1.rows[0].src_size, 20);
        assert_eq!(b1.rows[1].strand, Strand::Plus);
        let b2 = r.next_block().unwrap().unwrap();
        assert_eq!(b2.rows[0].start, 3);
        assert!(r.next_block().unwrap().is_none());
    }

    #[test]
    fn skips_status_lines_and_comments() {
        let text = "##maf version=1
# a comment
a tree=\"(mm.chr5:0.1)hg.chr1;\"
s hg.chr1 0 6 + 20 ACGTAC
i hg.chr1 N 0 C 0
s mm.chr5 0 6 + 30 ACGTAC
e rn.chr9 0 6 + 25 I
q mm.chr5 999999
";
        let mut r = reader(text);
        let b = r.next_block().unwrap().unwrap();
        assert_eq!(b.rows.len(), 2);
    }

    #[test]
    fn rejects_missing_header_and_bad_lines() {
        let mut r = reader("a tree=\"x;\"\n");
        assert!(matches!(
            r.next_block().unwrap_err(),
            JoinError::MalformedMaf { .. }
        ));

        let mut r = reader("##maf version=1\n\na tree=\"(a.1:1)b.1;\"\ns hg.chr1 0 6 20 ACGTAC\n");
        assert!(matches!(
            r.next_block().unwrap_err(),
            JoinError::MalformedMaf { .. }
        ));

        let mut r = reader("##maf version=1\n\nz what\n");
        assert!(matches!(
            r.next_block().unwrap_err(),
            JoinError::MalformedMaf { .. }
        ));
    }

    #[test]
    fn load_builds_finished_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.maf");
        std::fs::write(&path, SIMPLE).unwrap();
        let mut genomes = Genomes::new();
        let opts = LoadOptions {
            branch_length: 0.1,
            treeless_root: None,
            max_input_blk_width: None,
        };
        let set = load_maf_set(&path, &mut genomes, &opts).unwrap();
        assert_eq!(set.len(), 2);
        for blk in set.iter() {
            assert_eq!(genomes.org_seq(blk.root_comp().seq), "hg.chr1");
            assert_eq!(blk.width, 6);
        }
    }

    #[test]
    fn treeless_blocks_get_inferred_trees() {
        let text = "##maf version=1

a score=1
s aa.c1 0 3 + 10 ACG
s bb.c1 0 3 + 10 ACG
s hg.chr1 0 3 + 20 ACG
";
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.maf");
        std::fs::write(&path, text).unwrap();
        let mut genomes = Genomes::new();
        let opts = LoadOptions {
            branch_length: 0.1,
            treeless_root: Some("hg"),
            max_input_blk_width: None,
        };
        let set = load_maf_set(&path, &mut genomes, &opts).unwrap();
        let blk = set.iter().next().unwrap();
        assert_eq!(blk.tree().format(), "(aa.c1:0.1,bb.c1:0.1)hg.chr1;");
    }

    #[test]
    fn treeless_without_root_genome_fails() {
        let text = "##maf version=1

a
s aa.c1 0 3 + 10 ACG
s hg.chr1 0 3 + 20 ACG
";
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.maf");
        std::fs::write(&path, text).unwrap();
        let mut genomes = Genomes::new();
        let opts = LoadOptions {
            branch_length: 0.1,
            treeless_root: None,
            max_input_blk_width: None,
        };
        let err = load_maf_set(&path, &mut genomes, &opts).unwrap_err();
        assert!(matches!(err, JoinError::MalformedMaf { .. }));
    }

    #[test]
    fn oversized_blocks_are_split() {
        let text = "##maf version=1

a tree=\"(mm.chr5:0.1)hg.chr1;\"
s hg.chr1 0 12 + 20 ACGTACGTACGT
s mm.chr5 0 12 + 30 ACGTACGTACGT
";
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.maf");
        std::fs::write(&path, text).unwrap();
        let mut genomes = Genomes::new();
        let opts = LoadOptions {
            branch_length: 0.1,
            treeless_root: None,
            max_input_blk_width: Some(5),
        };
        let set = load_maf_set(&path, &mut genomes, &opts).unwrap();
        assert_eq!(set.len(), 3);
        let mut starts: Vec<i64> = set.iter().map(|b| b.root_comp().start).collect();
        starts.sort();
        assert_eq!(starts, vec![0, 4, 8]);
        for blk in set.iter() {
            assert_eq!(blk.width, 4);
        }
    }

    #[test]
    fn split_pieces_without_root_bases_dissolve() {
        // the root has bases only in the right half; left pieces merge right
        let mut genomes = Genomes::new();
        let hg = genomes.obtain_seq_for_org_seq("hg.chr1", Some(20)).unwrap();
        let mm = genomes.obtain_seq_for_org_seq("mm.chr5", Some(30)).unwrap();
        let mut blk = Block::new();
        blk.add_comp(
            Component::from_text(&genomes, mm, Strand::Plus, 0, 8, b"ACGTACGT").unwrap(),
        );
        blk.add_comp(
            Component::from_text(&genomes, hg, Strand::Plus, 0, 2, b"------GT").unwrap(),
        );
        let nw = parse_newick("(mm.chr5:0.1)hg.chr1;").unwrap();
        let tree = BlockTree::from_newick_node(&nw, &blk.comps, &genomes).unwrap();
        blk.set_tree(tree);
        blk.finish(&genomes).unwrap();
        let pieces = split_block(&blk, 4, &genomes).unwrap();
        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0].width, 8);
    }

    #[test]
    fn write_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.maf");
        std::fs::write(&path, SIMPLE).unwrap();
        let mut genomes = Genomes::new();
        let opts = LoadOptions {
            branch_length: 0.1,
            treeless_root: None,
            max_input_blk_width: None,
        };
        let set = load_maf_set(&path, &mut genomes, &opts).unwrap();
        let out = dir.path().join("out.maf");
        write_maf_set(&set, &genomes, &out).unwrap();

        let reloaded = load_maf_set(&out, &mut genomes, &opts).unwrap();
        assert_eq!(reloaded.len(), set.len());
        for (a, b) in set.iter().zip(reloaded.iter()) {
            assert_eq!(a.width, b.width);
            assert_eq!(a.comps.len(), b.comps.len());
            for (ca, cb) in a.comps.iter().zip(&b.comps) {
                assert_eq!(ca.seq, cb.seq);
                assert_eq!((ca.start, ca.end, ca.strand), (cb.start, cb.end, cb.strand));
                assert_eq!(ca.aln_text(), cb.aln_text());
            }
            assert_eq!(a.tree().format(), b.tree().format());
        }
    }
}
