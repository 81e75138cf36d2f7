//! Per-breakend transcript context.
//!
//! For every breakend x gene x transcript triple this module derives where
//! in the transcript the breakend falls (exon ranks, region, coding context,
//! reading-frame phase) and keeps the mutable per-sample state in an arena
//! addressed by `(breakend_id, tx_idx)`.

use std::collections::HashMap;

use crate::common::Strand;

use super::{
    genes::{GeneDb, TranscriptAnnotation},
    schema::{Breakend, SvGraph},
};

/// Reading-frame phase of a coding position, or `None` outside of coding
/// sequence.
#[derive(
    serde::Serialize, serde::Deserialize, PartialEq, Eq, Hash, Debug, Clone, Copy, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No numeric phase (pre-coding, non-coding, post-coding).
    #[default]
    None,
    /// Phase 0.
    P0,
    /// Phase 1.
    P1,
    /// Phase 2.
    P2,
}

/// Phase following `p` after one base: `(p + 1) % 3`.
pub fn next_phase(p: u8) -> u8 {
    (p + 1) % 3
}

impl Phase {
    /// Build from an integer in `0..3`.
    pub fn from_int(value: i64) -> Phase {
        match value.rem_euclid(3) {
            0 => Phase::P0,
            1 => Phase::P1,
            _ => Phase::P2,
        }
    }

    /// The numeric phase, if any.
    pub fn as_int(&self) -> Option<u8> {
        match self {
            Phase::None => None,
            Phase::P0 => Some(0),
            Phase::P1 => Some(1),
            Phase::P2 => Some(2),
        }
    }

    /// Phase compatibility at an intron boundary.  A missing phase matches
    /// unconditionally.
    pub fn matches(&self, other: Phase) -> bool {
        match (self.as_int(), other.as_int()) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }
}

/// Region of a transcript hit by a breakend.
#[derive(
    serde::Serialize,
    serde::Deserialize,
    PartialEq,
    Eq,
    Hash,
    Debug,
    Clone,
    Copy,
    strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RegionType {
    /// 5' of the transcript start (promoter side).
    Upstream,
    /// Within an exon.
    Exonic,
    /// Within an intron.
    Intronic,
    /// 3' of the transcript end.
    Downstream,
}

/// Coding context of a breakend position within a transcript.
#[derive(
    serde::Serialize,
    serde::Deserialize,
    PartialEq,
    Eq,
    Hash,
    Debug,
    Clone,
    Copy,
    strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CodingContext {
    /// 5' of the coding start of a coding transcript.
    PreCoding,
    /// Within the coding region.
    Coding,
    /// In a transcript without coding region.
    NonCoding,
    /// 3' of the coding end of a coding transcript.
    PostCoding,
    /// Synthetic enhancer context used for IG region partners.
    Enhancer,
}

/// Mutable per-sample state for one breakend x gene x transcript triple.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakendTranscript {
    /// Id of the breakend.
    pub breakend_id: usize,
    /// Index of the gene in the annotation database.
    pub gene_idx: usize,
    /// Index of the transcript in the annotation database.
    pub tx_idx: usize,
    /// Whether the breakend retains the 5' part of this transcript, i.e.
    /// whether it can act as the upstream partner of a fusion.
    pub is_upstream: bool,
    /// Region of the transcript hit by the breakend.
    pub region: RegionType,
    /// Coding context at the breakend position.
    pub coding: CodingContext,
    /// 1-based rank of the exon at or 5' of the breakend; 0 if none.
    pub exon_upstream: u32,
    /// 1-based rank of the exon at or 3' of the breakend; 0 if none.
    pub exon_downstream: u32,
    /// Reading-frame phase at the breakend.
    pub phase: Phase,
    /// Strand-aware distance from the breakend to the first splice acceptor
    /// for breakends 5' of the coding region; negative when the breakend
    /// already lies past the acceptor.
    pub acceptor_distance: Option<i64>,
    /// Whether the breakend disrupts this transcript; only ever cleared,
    /// never re-set, within one classification pass.
    pub disruptive: bool,
    /// Whether the disruption is reportable.
    pub reportable_disruption: bool,
    /// Copy number not affected by the breakend junction.
    pub undisrupted_copy_number: Option<f64>,
}

impl BreakendTranscript {
    /// Whether the breakend is within the transcript body.
    pub fn is_within_transcript(&self) -> bool {
        matches!(self.region, RegionType::Exonic | RegionType::Intronic)
    }

    /// Whether the breakend is exonic.
    pub fn is_exonic(&self) -> bool {
        self.region == RegionType::Exonic
    }
}

/// Whether a breakend with the given orientation retains the 5' part of a
/// gene on the given strand.
pub fn is_upstream(strand: Strand, orientation: i8) -> bool {
    strand.as_int() == orientation
}

/// Map a genomic position to a transcript-directed coordinate so that all
/// downstream logic can treat both strands as "forward".
fn directed(pos: i64, strand: Strand) -> i64 {
    pos * strand.as_int() as i64
}

/// Derive the context of a breakend within one transcript.
pub fn derive_context(
    bnd: &Breakend,
    bnd_id: usize,
    gene_idx: usize,
    tx_idx: usize,
    tx: &TranscriptAnnotation,
    strand: Strand,
) -> BreakendTranscript {
    let d_pos = directed(bnd.pos, strand);
    // Directed exon bounds in rank order; ascending by construction.
    let d_exon = |rank: u32| -> (i64, i64) {
        let exon = tx.exon(rank).expect("rank checked by caller");
        match strand {
            Strand::Forward => (exon.start, exon.end),
            Strand::Reverse => (-exon.end, -exon.start),
        }
    };
    let exon_count = tx.exon_count();
    let (tx_first, _) = d_exon(1);
    let (_, tx_last) = d_exon(exon_count);

    let (region, exon_upstream, exon_downstream) = if d_pos < tx_first {
        (RegionType::Upstream, 0, 1)
    } else if d_pos > tx_last {
        (RegionType::Downstream, exon_count, 0)
    } else {
        // Within the transcript: find the containing or flanking exons.
        let mut result = (RegionType::Intronic, 0, 0);
        for rank in 1..=exon_count {
            let (d_start, d_end) = d_exon(rank);
            if d_pos >= d_start && d_pos <= d_end {
                result = (RegionType::Exonic, rank, rank);
                break;
            } else if d_pos < d_start {
                result = (RegionType::Intronic, rank - 1, rank);
                break;
            }
        }
        result
    };

    let coding = coding_context(tx, d_pos, strand, region);
    let phase = phase_at(tx, d_pos, strand, region, coding, exon_upstream);
    let acceptor_distance = if exon_count >= 2
        && (region == RegionType::Upstream || coding == CodingContext::PreCoding)
    {
        let (d_acceptor, _) = d_exon(2);
        Some(d_acceptor - d_pos)
    } else {
        None
    };

    BreakendTranscript {
        breakend_id: bnd_id,
        gene_idx,
        tx_idx,
        is_upstream: is_upstream(strand, bnd.orientation),
        region,
        coding,
        exon_upstream,
        exon_downstream,
        phase,
        acceptor_distance,
        disruptive: matches!(region, RegionType::Exonic | RegionType::Intronic)
            && !bnd.is_inferred,
        reportable_disruption: false,
        undisrupted_copy_number: None,
    }
}

/// Coding context at a directed position.
fn coding_context(
    tx: &TranscriptAnnotation,
    d_pos: i64,
    strand: Strand,
    region: RegionType,
) -> CodingContext {
    let (Some(coding_start), Some(coding_end)) = (tx.coding_start, tx.coding_end) else {
        return CodingContext::NonCoding;
    };
    let (d_cs, d_ce) = match strand {
        Strand::Forward => (coding_start, coding_end),
        Strand::Reverse => (-coding_end, -coding_start),
    };
    match region {
        RegionType::Upstream => CodingContext::PreCoding,
        RegionType::Downstream => CodingContext::PostCoding,
        _ => {
            if d_pos < d_cs {
                CodingContext::PreCoding
            } else if d_pos > d_ce {
                CodingContext::PostCoding
            } else {
                CodingContext::Coding
            }
        }
    }
}

/// Reading-frame phase at a directed position.
fn phase_at(
    tx: &TranscriptAnnotation,
    d_pos: i64,
    strand: Strand,
    region: RegionType,
    coding: CodingContext,
    exon_upstream: u32,
) -> Phase {
    if coding != CodingContext::Coding {
        return Phase::None;
    }
    match region {
        RegionType::Intronic => tx
            .exon(exon_upstream)
            .map(|e| e.phase_end)
            .unwrap_or(Phase::None),
        RegionType::Exonic => {
            let exon = tx.exon(exon_upstream).expect("exonic rank is valid");
            let (d_start, _) = match strand {
                Strand::Forward => (exon.start, exon.end),
                Strand::Reverse => (-exon.end, -exon.start),
            };
            let (coding_start, coding_end) = (
                tx.coding_start.expect("coding checked"),
                tx.coding_end.expect("coding checked"),
            );
            let (d_cs, _d_ce) = match strand {
                Strand::Forward => (coding_start, coding_end),
                Strand::Reverse => (-coding_end, -coding_start),
            };
            // Coding bases within this exon up to and including the breakend.
            let bases_in_exon = d_pos - d_start.max(d_cs) + 1;
            let prev = exon.phase_start.as_int().unwrap_or(0) as i64;
            if bases_in_exon <= 0 && exon.phase_start == Phase::None {
                Phase::None
            } else {
                Phase::from_int(prev + bases_in_exon.max(0))
            }
        }
        _ => Phase::None,
    }
}

/// Alternative phasings reachable by skipping exons, as `(phase, exons
/// skipped)` pairs in preference order.  The first entry is the direct
/// intron-boundary phase; crossing from an exon into the adjacent intron
/// counts as zero skips.
pub fn alternative_phases(
    tx: &TranscriptAnnotation,
    ctx: &BreakendTranscript,
    for_upstream: bool,
) -> Vec<(Phase, u32)> {
    let mut result = Vec::new();
    if for_upstream {
        // Candidate splice donors at or 5' of the breakend.
        let base_rank = if ctx.is_exonic() {
            ctx.exon_upstream.saturating_sub(1)
        } else {
            ctx.exon_upstream
        };
        for (skips, rank) in [(0u32, base_rank), (1, base_rank.saturating_sub(1))] {
            if rank >= 1 {
                if let Some(exon) = tx.exon(rank) {
                    result.push((exon.phase_end, skips));
                }
            }
        }
    } else {
        // Candidate splice acceptors at or 3' of the breakend.
        let base_rank = if ctx.is_exonic() {
            ctx.exon_downstream + 1
        } else {
            ctx.exon_downstream
        };
        for (skips, rank) in [(0u32, base_rank), (1, base_rank + 1)] {
            if let Some(exon) = tx.exon(rank) {
                result.push((exon.phase_start, skips));
            }
        }
    }
    result
}

/// Arena of [`BreakendTranscript`] entries for one sample.
#[derive(Debug, Default)]
pub struct TxContextArena {
    /// All entries.
    pub entries: Vec<BreakendTranscript>,
    /// Entry index by `(breakend_id, tx_idx)`.
    index: HashMap<(usize, usize), usize>,
    /// Entry indices by breakend id.
    by_breakend: Vec<Vec<usize>>,
}

impl TxContextArena {
    /// Derive contexts for every breakend of the graph.
    pub fn annotate_graph(graph: &SvGraph, db: &GeneDb) -> TxContextArena {
        let mut result = TxContextArena {
            by_breakend: vec![Vec::new(); graph.breakends.len()],
            ..Default::default()
        };
        for (bnd_id, bnd) in graph.breakends.iter().enumerate() {
            for gene_idx in db.genes_overlapping(bnd.chrom_no, bnd.pos) {
                let strand = db.genes[gene_idx].strand;
                for &tx_idx in db.transcripts(gene_idx) {
                    let tx = &db.transcripts[tx_idx];
                    if tx.exon_count() == 0 {
                        tracing::warn!("transcript {} has no exons, skipping", &tx.name);
                        continue;
                    }
                    let ctx = derive_context(bnd, bnd_id, gene_idx, tx_idx, tx, strand);
                    result.push(ctx);
                }
            }
        }
        result
    }

    /// Append an entry, maintaining the indices.
    pub fn push(&mut self, ctx: BreakendTranscript) -> usize {
        let entry_idx = self.entries.len();
        while self.by_breakend.len() <= ctx.breakend_id {
            self.by_breakend.push(Vec::new());
        }
        self.index.insert((ctx.breakend_id, ctx.tx_idx), entry_idx);
        self.by_breakend[ctx.breakend_id].push(entry_idx);
        self.entries.push(ctx);
        entry_idx
    }

    /// Entry indices at a breakend.
    pub fn entries_at(&self, bnd_id: usize) -> &[usize] {
        self.by_breakend
            .get(bnd_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Entry index for a breakend/transcript pair.
    pub fn lookup(&self, bnd_id: usize, tx_idx: usize) -> Option<usize> {
        self.index.get(&(bnd_id, tx_idx)).copied()
    }

    /// Gene indices with entries at a breakend, each with its entry indices.
    pub fn genes_at(&self, bnd_id: usize) -> Vec<(usize, Vec<usize>)> {
        let mut result: indexmap::IndexMap<usize, Vec<usize>> = indexmap::IndexMap::new();
        for &entry_idx in self.entries_at(bnd_id) {
            result
                .entry(self.entries[entry_idx].gene_idx)
                .or_default()
                .push(entry_idx);
        }
        result.into_iter().collect()
    }
}
