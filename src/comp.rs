//! One aligned row of an alignment block.
//!
//! Row storage is a list of segment runs: each segment carries the bases of
//! one maximal ungapped stretch together with its sequence and alignment
//! offsets. Characters between segments are implicit gaps, so memory is
//! proportional to aligned bases rather than to alignment width.

use std::fmt;

use crate::genomes::{Genomes, SeqId};
use crate::error::{JoinError, Result};

/// Which strand of the sequence a row aligns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Strand {
    Plus,
    Minus,
}

impl Strand {
    pub fn flip(self) -> Strand {
        match self {
            Strand::Plus => Strand::Minus,
            Strand::Minus => Strand::Plus,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Strand::Plus => '+',
            Strand::Minus => '-',
        }
    }

    pub fn from_char(c: char) -> Option<Strand> {
        match c {
            '+' => Some(Strand::Plus),
            '-' => Some(Strand::Minus),
            _ => None,
        }
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Is an alignment character a base (rather than a gap)? IUPAC ambiguity
/// codes count as bases, case preserved.
pub fn is_base(c: u8) -> bool {
    c.is_ascii_alphabetic()
}

/// IUPAC complement, preserving case.
pub fn complement(c: u8) -> u8 {
    let comp = match c.to_ascii_uppercase() {
        b'A' => b'T',
        b'T' => b'A',
        b'U' => b'A',
        b'C' => b'G',
        b'G' => b'C',
        b'R' => b'Y',
        b'Y' => b'R',
        b'K' => b'M',
        b'M' => b'K',
        b'B' => b'V',
        b'V' => b'B',
        b'D' => b'H',
        b'H' => b'D',
        other => other, // S, W, N and anything unexpected are self-complementary
    };
    if c.is_ascii_lowercase() {
        comp.to_ascii_lowercase()
    } else {
        comp
    }
}

/// Reflect a half-open range within a sequence of the given size, switching
/// between strand and chromosome coordinates.
pub fn reverse_range(start: i64, end: i64, size: i64) -> (i64, i64) {
    (size - end, size - start)
}

/// One maximal run of aligned bases within a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Strand-coordinate position of the first base.
    pub seq_start: i64,
    /// Alignment column of the first base.
    pub aln_start: i64,
    pub bases: Vec<u8>,
}

impl Segment {
    pub fn len(&self) -> i64 {
        self.bases.len() as i64
    }

    pub fn seq_end(&self) -> i64 {
        self.seq_start + self.len()
    }

    pub fn aln_end(&self) -> i64 {
        self.aln_start + self.len()
    }
}

/// One aligned row. Coordinates follow MAF conventions: `start`/`end` are
/// half-open in strand coordinates, `chrom_start`/`chrom_end` are the same
/// range in always-forward chromosome coordinates.
#[derive(Debug, Clone)]
pub struct Component {
    pub seq: SeqId,
    pub strand: Strand,
    pub start: i64,
    pub end: i64,
    pub chrom_start: i64,
    pub chrom_end: i64,
    width: i64,
    segs: Vec<Segment>,
}

impl Component {
    /// An empty row to be grown by appends.
    pub fn new_empty(seq: SeqId, strand: Strand, start: i64, seq_size: i64) -> Component {
        let (chrom_start, chrom_end) = match strand {
            Strand::Plus => (start, start),
            Strand::Minus => reverse_range(start, start, seq_size),
        };
        Component {
            seq,
            strand,
            start,
            end: start,
            chrom_start,
            chrom_end,
            width: 0,
            segs: Vec::new(),
        }
    }

    /// Build a row from MAF alignment text, scanning maximal base runs into
    /// segments. The base count must match the declared range.
    pub fn from_text(
        genomes: &Genomes,
        seq: SeqId,
        strand: Strand,
        start: i64,
        end: i64,
        text: &[u8],
    ) -> Result<Component> {
        let seq_size = genomes.size_of(seq);
        let mut comp = Component::new_empty(seq, strand, start, seq_size);
        let mut pos = start;
        let mut run: Option<Segment> = None;
        for (col, &c) in text.iter().enumerate() {
            if is_base(c) {
                match &mut run {
                    Some(seg) => seg.bases.push(c),
                    None => {
                        run = Some(Segment {
                            seq_start: pos,
                            aln_start: col as i64,
                            bases: vec![c],
                        })
                    }
                }
                pos += 1;
            } else if let Some(seg) = run.take() {
                comp.segs.push(seg);
            }
        }
        if let Some(seg) = run.take() {
            comp.segs.push(seg);
        }
        comp.width = text.len() as i64;
        comp.end = pos;
        match strand {
            Strand::Plus => comp.chrom_end = pos,
            Strand::Minus => comp.chrom_start = seq_size - pos,
        }
        if pos - start != end - start {
            return Err(JoinError::MalformedRow {
                org_seq: genomes.org_seq(seq).to_string(),
                found: pos - start,
                declared: end - start,
            });
        }
        Ok(comp)
    }

    pub fn width(&self) -> i64 {
        self.width
    }

    /// Number of aligned bases (no gaps).
    pub fn aligned(&self) -> i64 {
        self.chrom_end - self.chrom_start
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segs
    }

    /// Drop base storage, keeping identity and coordinates. Used when a
    /// block is marked deleted but not yet swept.
    pub fn release_storage(&mut self) {
        self.segs = Vec::new();
    }

    /// Base at an alignment column, or None for a gap.
    pub fn base_at(&self, aln_idx: i64) -> Option<u8> {
        let i = self.segs.partition_point(|s| s.aln_end() <= aln_idx);
        let seg = self.segs.get(i)?;
        if seg.aln_start <= aln_idx {
            Some(seg.bases[(aln_idx - seg.aln_start) as usize])
        } else {
            None
        }
    }

    /// Widen the row with trailing implicit gap columns.
    pub fn pad(&mut self, width: i64) {
        debug_assert!(self.width <= width);
        self.width = width;
    }

    /// Append a run of bases at the given alignment column, extending the
    /// row's coordinates.
    fn push_bases(&mut self, aln_at: i64, bases: &[u8]) {
        debug_assert!(self.segs.last().map_or(true, |s| s.aln_end() <= aln_at));
        match self.segs.last_mut() {
            Some(seg) if seg.aln_end() == aln_at => seg.bases.extend_from_slice(bases),
            _ => self.segs.push(Segment {
                seq_start: self.end,
                aln_start: aln_at,
                bases: bases.to_vec(),
            }),
        }
        let n = bases.len() as i64;
        self.end += n;
        match self.strand {
            Strand::Plus => self.chrom_end += n,
            Strand::Minus => self.chrom_start -= n,
        }
    }

    /// Append one alignment column: a base run of one, or an implicit gap.
    pub fn append_col(&mut self, c: u8) {
        if is_base(c) {
            let at = self.width;
            self.push_bases(at, &[c]);
        }
        self.width += 1;
    }

    /// Append the column under a cursor on another row of the same
    /// sequence and strand. The cursor's base must continue this row.
    pub fn append_cursor_col(&mut self, cur: &CompCursor<'_>) {
        debug_assert_eq!(cur.comp.seq, self.seq);
        debug_assert_eq!(cur.comp.strand, self.strand);
        if cur.is_aligned {
            debug_assert_eq!(cur.pos, self.end);
            let at = self.width;
            let base = cur.base().unwrap_or(b'N');
            self.push_bases(at, &[base]);
        }
        self.width += 1;
    }

    /// Append the columns `[aln_start, aln_end)` of `src`, bases and
    /// implicit gaps alike. The appended region must continue this row's
    /// sequence range.
    pub fn append_comp_range(&mut self, src: &Component, aln_start: i64, aln_end: i64) {
        debug_assert_eq!(src.seq, self.seq);
        debug_assert_eq!(src.strand, self.strand);
        debug_assert!(aln_start <= aln_end && aln_end <= src.width);
        for seg in &src.segs {
            let ov_start = seg.aln_start.max(aln_start);
            let ov_end = seg.aln_end().min(aln_end);
            if ov_start < ov_end {
                let at = self.width + (ov_start - aln_start);
                let lo = (ov_start - seg.aln_start) as usize;
                let hi = (ov_end - seg.aln_start) as usize;
                self.push_bases(at, &seg.bases[lo..hi]);
            }
        }
        self.width += aln_end - aln_start;
    }

    /// A new row on the opposite strand with reflected coordinates and
    /// complemented bases.
    pub fn reverse_complement(&self, seq_size: i64) -> Component {
        let (start, end) = reverse_range(self.start, self.end, seq_size);
        let segs = self
            .segs
            .iter()
            .rev()
            .map(|seg| Segment {
                seq_start: seq_size - seg.seq_end(),
                aln_start: self.width - seg.aln_end(),
                bases: seg.bases.iter().rev().copied().map(complement).collect(),
            })
            .collect();
        Component {
            seq: self.seq,
            strand: self.strand.flip(),
            start,
            end,
            chrom_start: self.chrom_start,
            chrom_end: self.chrom_end,
            width: self.width,
            segs,
        }
    }

    /// The part of this row inside `[aln_start, aln_end)`, or None if no
    /// base falls in the range.
    pub fn subrange(&self, aln_start: i64, aln_end: i64, seq_size: i64) -> Option<Component> {
        debug_assert!(0 <= aln_start && aln_start <= aln_end && aln_end <= self.width);
        let mut segs = Vec::new();
        for seg in &self.segs {
            let ov_start = seg.aln_start.max(aln_start);
            let ov_end = seg.aln_end().min(aln_end);
            if ov_start < ov_end {
                let lo = (ov_start - seg.aln_start) as usize;
                let hi = (ov_end - seg.aln_start) as usize;
                segs.push(Segment {
                    seq_start: seg.seq_start + (ov_start - seg.aln_start),
                    aln_start: ov_start - aln_start,
                    bases: seg.bases[lo..hi].to_vec(),
                });
            }
        }
        let first = segs.first()?;
        let start = first.seq_start;
        let end = segs.last().map(Segment::seq_end).unwrap_or(start);
        let (chrom_start, chrom_end) = match self.strand {
            Strand::Plus => (start, end),
            Strand::Minus => reverse_range(start, end, seq_size),
        };
        Some(Component {
            seq: self.seq,
            strand: self.strand,
            start,
            end,
            chrom_start,
            chrom_end,
            width: aln_end - aln_start,
            segs,
        })
    }

    /// Alignment column of the base at a strand position. The position must
    /// lie within the row's range.
    fn col_of_pos(&self, pos: i64) -> i64 {
        debug_assert!(self.start <= pos && pos < self.end);
        let i = self.segs.partition_point(|s| s.seq_end() <= pos);
        let seg = &self.segs[i];
        seg.aln_start + (pos - seg.seq_start)
    }

    /// Map an alignment range to the strand range of the bases inside it.
    /// None if the range holds no base.
    pub fn aln_range_to_seq_range(&self, aln_start: i64, aln_end: i64) -> Option<(i64, i64)> {
        let mut range: Option<(i64, i64)> = None;
        for seg in &self.segs {
            let ov_start = seg.aln_start.max(aln_start);
            let ov_end = seg.aln_end().min(aln_end);
            if ov_start < ov_end {
                let s = seg.seq_start + (ov_start - seg.aln_start);
                let e = seg.seq_start + (ov_end - seg.aln_start);
                range = Some(match range {
                    None => (s, e),
                    Some((first, _)) => (first, e),
                });
            }
        }
        range
    }

    /// Map a strand range to the alignment columns from the base at
    /// `start` up to the base at `end` (or the row's width when `end` is
    /// the row end). None if the range holds no base.
    pub fn seq_range_to_aln_range(&self, start: i64, end: i64) -> Option<(i64, i64)> {
        debug_assert!(self.start <= start && end <= self.end);
        if start >= end || start == self.end {
            return None;
        }
        let aln_start = self.col_of_pos(start);
        let aln_end = if end == self.end {
            self.width
        } else {
            self.col_of_pos(end)
        };
        Some((aln_start, aln_end))
    }

    /// Map a chromosome range to alignment columns. Columns always run
    /// forward with increasing strand position, so the range only needs
    /// reflecting into strand coordinates first. None if the range holds
    /// no base.
    pub fn seq_chrom_range_to_aln_range(
        &self,
        chrom_start: i64,
        chrom_end: i64,
        seq_size: i64,
    ) -> Option<(i64, i64)> {
        let (start, end) = match self.strand {
            Strand::Plus => (chrom_start, chrom_end),
            Strand::Minus => reverse_range(chrom_start, chrom_end, seq_size),
        };
        self.seq_range_to_aln_range(start, end)
    }

    pub fn overlaps(&self, other: &Component) -> bool {
        self.seq == other.seq
            && self.chrom_start < other.chrom_end
            && self.chrom_end > other.chrom_start
    }

    pub fn overlaps_adjacent(&self, other: &Component) -> bool {
        self.seq == other.seq
            && self.chrom_start <= other.chrom_end
            && self.chrom_end >= other.chrom_start
    }

    pub fn overlaps_range(&self, seq: SeqId, chrom_start: i64, chrom_end: i64) -> bool {
        self.seq == seq && self.chrom_start < chrom_end && self.chrom_end > chrom_start
    }

    /// Overlap-or-adjacency with the other row taken in the given relative
    /// orientation (-1 means reverse complemented).
    pub fn overlaps_adjacent_orient(&self, other: &Component, orient: i32, seq_size: i64) -> bool {
        let (mut start2, mut end2) = (other.start, other.end);
        if orient < 0 {
            let (s, e) = reverse_range(start2, end2, seq_size);
            start2 = s;
            end2 = e;
        }
        self.seq == other.seq && self.start <= end2 && self.end >= start2
    }

    /// Any aligned base in the column range?
    pub fn any_aligned_range(&self, aln_start: i64, aln_end: i64) -> bool {
        self.segs
            .iter()
            .any(|seg| seg.aln_start < aln_end && seg.aln_end() > aln_start)
    }

    /// Can this row absorb `later` as its sequence continuation? The rows
    /// must share sequence and strand, be contiguous in sequence, and not
    /// interleave in the alignment.
    pub fn can_splice(&self, later: &Component) -> bool {
        self.seq == later.seq
            && self.strand == later.strand
            && self.end == later.start
            && match (self.segs.last(), later.segs.first()) {
                (Some(a), Some(b)) => a.aln_end() <= b.aln_start,
                _ => false,
            }
    }

    /// Absorb another row of the same sequence and strand whose segments
    /// are disjoint from this row's in both axes. Column positions are
    /// unchanged; the coordinate ranges merge.
    pub fn merge_rows(&mut self, other: &Component) {
        debug_assert_eq!(self.seq, other.seq);
        debug_assert_eq!(self.strand, other.strand);
        debug_assert_eq!(self.width, other.width);
        self.segs.extend(other.segs.iter().cloned());
        self.segs.sort_by_key(|s| s.aln_start);
        self.start = self.start.min(other.start);
        self.end = self.end.max(other.end);
        self.chrom_start = self.chrom_start.min(other.chrom_start);
        self.chrom_end = self.chrom_end.max(other.chrom_end);
    }

    /// Deterministic component order: (seq, strand, start, end).
    pub fn cmp_comp(&self, other: &Component, genomes: &Genomes) -> std::cmp::Ordering {
        genomes
            .cmp_seqs(self.seq, other.seq)
            .then(self.strand.cmp(&other.strand))
            .then(self.start.cmp(&other.start))
            .then(self.end.cmp(&other.end))
    }

    /// Chromosome-order comparison: (seq, chrom_start, chrom_end).
    pub fn cmp_chrom(&self, other: &Component, genomes: &Genomes) -> std::cmp::Ordering {
        genomes
            .cmp_seqs(self.seq, other.seq)
            .then(self.chrom_start.cmp(&other.chrom_start))
            .then(self.chrom_end.cmp(&other.chrom_end))
    }

    /// Short identification for error messages.
    pub fn describe(&self, genomes: &Genomes) -> String {
        format!(
            "{}:{}-{} ({})",
            genomes.org_seq(self.seq),
            self.start,
            self.end,
            self.strand
        )
    }

    /// Materialize the full alignment text, gaps included.
    pub fn aln_text(&self) -> Vec<u8> {
        let mut text = vec![b'-'; self.width as usize];
        for seg in &self.segs {
            let at = seg.aln_start as usize;
            text[at..at + seg.bases.len()].copy_from_slice(&seg.bases);
        }
        text
    }

    /// Check the row's internal invariants; used by block validation and
    /// tests.
    pub fn check_consistency(&self, seq_size: i64) -> bool {
        let mut base_count = 0;
        let mut prev_seq_end = self.start;
        let mut prev_aln_end = -1;
        for seg in &self.segs {
            if seg.seq_start != prev_seq_end || seg.aln_start <= prev_aln_end {
                return false;
            }
            prev_seq_end = seg.seq_end();
            prev_aln_end = seg.aln_end();
            base_count += seg.len();
        }
        if prev_seq_end != self.end || prev_aln_end > self.width {
            return false;
        }
        let (want_cs, want_ce) = match self.strand {
            Strand::Plus => (self.start, self.end),
            Strand::Minus => reverse_range(self.start, self.end, seq_size),
        };
        base_count == self.end - self.start
            && self.chrom_start == want_cs
            && self.chrom_end == want_ce
    }
}

/// Column cursor over one row. Starts before the first column; `pos` is
/// the current base position, or the next base position when sitting on a
/// gap, or the row end past the last base.
#[derive(Debug, Clone)]
pub struct CompCursor<'a> {
    pub comp: &'a Component,
    pub aln_idx: i64,
    pub pos: i64,
    pub is_aligned: bool,
    seg_idx: usize,
}

impl<'a> CompCursor<'a> {
    pub fn new(comp: &'a Component) -> CompCursor<'a> {
        CompCursor {
            comp,
            aln_idx: -1,
            pos: comp.start,
            is_aligned: false,
            seg_idx: 0,
        }
    }

    pub fn at_end(&self) -> bool {
        self.aln_idx == self.comp.width
    }

    pub fn base(&self) -> Option<u8> {
        if !self.is_aligned {
            return None;
        }
        let seg = &self.comp.segs[self.seg_idx];
        Some(seg.bases[(self.aln_idx - seg.aln_start) as usize])
    }

    /// Recompute pos/is_aligned from seg_idx and aln_idx.
    fn sync(&mut self) {
        let segs = &self.comp.segs;
        while self.seg_idx < segs.len() && segs[self.seg_idx].aln_end() <= self.aln_idx {
            self.seg_idx += 1;
        }
        if let Some(seg) = segs.get(self.seg_idx) {
            if seg.aln_start <= self.aln_idx {
                self.is_aligned = true;
                self.pos = seg.seq_start + (self.aln_idx - seg.aln_start);
            } else {
                self.is_aligned = false;
                self.pos = seg.seq_start;
            }
        } else {
            self.is_aligned = false;
            self.pos = self.comp.end;
        }
    }

    /// Advance one column; false once the end is reached.
    pub fn incr(&mut self) -> bool {
        if self.aln_idx == self.comp.width {
            return false;
        }
        self.aln_idx += 1;
        if self.aln_idx == self.comp.width {
            self.pos = self.comp.end;
            self.is_aligned = false;
            return false;
        }
        self.sync();
        true
    }

    /// Seek to an alignment column (may be the width, one past the last).
    /// Backward seeks restart the cursor; forward seeks cost the number of
    /// segments skipped.
    pub fn set_aln_col(&mut self, col: i64) {
        debug_assert!((0..=self.comp.width).contains(&col));
        if col < self.aln_idx {
            *self = CompCursor::new(self.comp);
        }
        self.aln_idx = col;
        if col == self.comp.width {
            self.seg_idx = self.comp.segs.len();
            self.pos = self.comp.end;
            self.is_aligned = false;
        } else {
            self.sync();
        }
    }

    /// Seek to a strand position in `[start, end]`; the end position parks
    /// the cursor past the last column.
    pub fn set_seq_pos(&mut self, pos: i64) {
        debug_assert!(self.comp.start <= pos && pos <= self.comp.end);
        if pos < self.pos {
            *self = CompCursor::new(self.comp);
        }
        if pos == self.comp.end {
            self.set_aln_col(self.comp.width);
            return;
        }
        self.set_aln_col(self.comp.col_of_pos(pos));
    }

    /// Move to the next aligned column; false when none remain.
    pub fn advance_to_aligned(&mut self) -> bool {
        if !self.incr() {
            return false;
        }
        if self.is_aligned {
            return true;
        }
        if self.seg_idx < self.comp.segs.len() {
            let col = self.comp.segs[self.seg_idx].aln_start;
            self.set_aln_col(col);
            true
        } else {
            self.set_aln_col(self.comp.width);
            false
        }
    }
}
