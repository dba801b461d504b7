//! Interned genome and sequence identities.
//!
//! Every alignment row references a sequence through a small copyable
//! `SeqId`; the registry owns the name strings and sizes. Genomes and
//! sequences are created lazily when first referenced by a row and are
//! exposed in insertion order.

use std::cmp::Ordering;

use indexmap::IndexMap;

use crate::error::{JoinError, Result};

/// Index of an interned sequence within a `Genomes` registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeqId(u32);

/// One sequence of one genome.
#[derive(Debug)]
pub struct Seq {
    pub genome: String,
    pub name: String,
    /// The canonical "genome.seq" key used in MAF names and indexing.
    pub org_seq: String,
    /// Total sequence length; unknown until first sized observation.
    pub size: Option<i64>,
}

/// Registry of all genomes and sequences seen in a run.
#[derive(Debug, Default)]
pub struct Genomes {
    seqs: Vec<Seq>,
    by_org_seq: IndexMap<String, SeqId>,
    /// Genome name -> sequence ids, both in insertion order.
    genomes: IndexMap<String, Vec<SeqId>>,
}

impl Genomes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the genome if it does not exist yet.
    pub fn obtain_genome(&mut self, name: &str) {
        if !self.genomes.contains_key(name) {
            self.genomes.insert(name.to_string(), Vec::new());
        }
    }

    /// Get or create a sequence. A known size must agree with previous
    /// observations; an unknown size is filled in later.
    pub fn obtain_seq(
        &mut self,
        genome_name: &str,
        seq_name: &str,
        size: Option<i64>,
    ) -> Result<SeqId> {
        let org_seq = format!("{genome_name}.{seq_name}");
        if let Some(&id) = self.by_org_seq.get(&org_seq) {
            let seq = &mut self.seqs[id.0 as usize];
            match (seq.size, size) {
                (Some(known), Some(new)) if known != new => {
                    return Err(JoinError::InconsistentSize {
                        org_seq,
                        known,
                        new,
                    });
                }
                (None, Some(new)) => seq.size = Some(new),
                _ => {}
            }
            return Ok(id);
        }

        let id = SeqId(self.seqs.len() as u32);
        self.seqs.push(Seq {
            genome: genome_name.to_string(),
            name: seq_name.to_string(),
            org_seq: org_seq.clone(),
            size,
        });
        self.by_org_seq.insert(org_seq, id);
        self.genomes
            .entry(genome_name.to_string())
            .or_default()
            .push(id);
        Ok(id)
    }

    /// Get or create a sequence from a "genome.seq" name, splitting at the
    /// first dot.
    pub fn obtain_seq_for_org_seq(&mut self, org_seq: &str, size: Option<i64>) -> Result<SeqId> {
        let (genome, seq) = org_seq.split_once('.').ok_or_else(|| JoinError::MissingDot {
            name: org_seq.to_string(),
        })?;
        self.obtain_seq(genome, seq, size)
    }

    pub fn seq(&self, id: SeqId) -> &Seq {
        &self.seqs[id.0 as usize]
    }

    pub fn org_seq(&self, id: SeqId) -> &str {
        &self.seq(id).org_seq
    }

    pub fn genome_of(&self, id: SeqId) -> &str {
        &self.seq(id).genome
    }

    /// Total length of a sequence. Any sequence referenced by an alignment
    /// row was observed with its srcSize, so the size is always known here.
    pub fn size_of(&self, id: SeqId) -> i64 {
        self.seq(id)
            .size
            .expect("sequence size never observed from an alignment row")
    }

    /// Deterministic sequence order: (genome name, sequence name).
    pub fn cmp_seqs(&self, a: SeqId, b: SeqId) -> Ordering {
        let sa = self.seq(a);
        let sb = self.seq(b);
        sa.genome
            .cmp(&sb.genome)
            .then_with(|| sa.name.cmp(&sb.name))
    }
}
