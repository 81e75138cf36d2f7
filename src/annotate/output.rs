//! Output records and JSONL writers.
//!
//! One line per record; files ending in `.gz` are compressed transparently.

use std::{io::Write, path::Path};

use serde::Serialize;

use crate::common::io::open_write_maybe_gz;

use super::{
    fusion::{ChainInfo, FusionCandidate},
    genes::GeneDb,
    known::KnownFusionMatch,
    schema::{SvGraph, SvType},
    transcript::{CodingContext, Phase, RegionType, TxContextArena},
};

/// One breakend x transcript disruption record.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct DisruptionRecord {
    /// Name of the sample.
    pub sample: String,
    /// Id of the variant.
    pub variant_id: usize,
    /// Type of the variant.
    pub sv_type: SvType,
    /// Whether the breakend is the start breakend of the variant.
    pub is_start: bool,
    /// Chromosome name.
    pub chrom: String,
    /// 1-based position.
    pub pos: i64,
    /// Breakend orientation.
    pub orientation: i8,
    /// Gene symbol.
    pub gene: String,
    /// Transcript name.
    pub transcript: String,
    /// Region of the transcript hit by the breakend.
    pub region: RegionType,
    /// Coding context at the breakend.
    pub coding: CodingContext,
    /// Exon rank at or 5' of the breakend.
    pub exon_upstream: u32,
    /// Exon rank at or 3' of the breakend.
    pub exon_downstream: u32,
    /// Whether the breakend disrupts the transcript.
    pub disruptive: bool,
    /// Whether the disruption is reportable.
    pub reportable: bool,
    /// Copy number not affected by the breakend junction.
    pub undisrupted_copy_number: Option<f64>,
}

/// One fusion candidate record.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct FusionRecord {
    /// Name of the sample.
    pub sample: String,
    /// Sample-scoped candidate id.
    pub id: usize,
    /// 5' gene symbol.
    pub five_gene: String,
    /// 5' transcript name.
    pub five_transcript: String,
    /// 5' breakend chromosome.
    pub five_chrom: String,
    /// 5' breakend position.
    pub five_pos: i64,
    /// Fused exon rank on the 5' side.
    pub five_exon: u32,
    /// Phase at the 5' breakend.
    pub five_phase: Phase,
    /// 3' gene symbol.
    pub three_gene: String,
    /// 3' transcript name.
    pub three_transcript: String,
    /// 3' breakend chromosome.
    pub three_chrom: String,
    /// 3' breakend position.
    pub three_pos: i64,
    /// Fused exon rank on the 3' side.
    pub three_exon: u32,
    /// Phase at the 3' breakend.
    pub three_phase: Phase,
    /// Classification against the known-fusion reference.
    pub known_type: KnownFusionMatch,
    /// Whether the fused exons fall into a registered range.
    pub known_exons: bool,
    /// Whether the reading frame is preserved.
    pub phase_matched: bool,
    /// Exons skipped on the 5' side.
    pub exons_skipped_up: u32,
    /// Exons skipped on the 3' side.
    pub exons_skipped_down: u32,
    /// Whether the chain terminates the 5' transcript.
    pub terminated_up: bool,
    /// Whether the chain terminates the 3' transcript.
    pub terminated_down: bool,
    /// Chain summary for chained fusions.
    pub chain: Option<ChainInfo>,
    /// Whether the candidate passed the reportability gate.
    pub reportable: bool,
}

/// Build disruption records for every within-transcript entry of the arena.
pub fn disruption_records(
    graph: &SvGraph,
    arena: &TxContextArena,
    db: &GeneDb,
) -> Vec<DisruptionRecord> {
    let mut result = Vec::new();
    for entry in &arena.entries {
        if !entry.is_within_transcript() {
            continue;
        }
        let bnd = &graph.breakends[entry.breakend_id];
        result.push(DisruptionRecord {
            sample: graph.sample.clone(),
            variant_id: bnd.variant_id,
            sv_type: graph.variants[bnd.variant_id].sv_type,
            is_start: bnd.is_start,
            chrom: bnd.chrom.clone(),
            pos: bnd.pos,
            orientation: bnd.orientation,
            gene: db.genes[entry.gene_idx].name.clone(),
            transcript: db.transcripts[entry.tx_idx].name.clone(),
            region: entry.region,
            coding: entry.coding,
            exon_upstream: entry.exon_upstream,
            exon_downstream: entry.exon_downstream,
            disruptive: entry.disruptive,
            reportable: entry.reportable_disruption,
            undisrupted_copy_number: entry.undisrupted_copy_number,
        });
    }
    result
}

/// Build fusion records from the final candidate list.
pub fn fusion_records(graph: &SvGraph, candidates: &[FusionCandidate]) -> Vec<FusionRecord> {
    candidates
        .iter()
        .map(|candidate| {
            let five_bnd = &graph.breakends[candidate.up.breakend_id];
            let three_bnd = &graph.breakends[candidate.down.breakend_id];
            FusionRecord {
                sample: graph.sample.clone(),
                id: candidate.id,
                five_gene: candidate.up.gene_name.clone(),
                five_transcript: candidate.up.tx_name.clone(),
                five_chrom: five_bnd.chrom.clone(),
                five_pos: five_bnd.pos,
                five_exon: candidate.up.exon,
                five_phase: candidate.up.phase,
                three_gene: candidate.down.gene_name.clone(),
                three_transcript: candidate.down.tx_name.clone(),
                three_chrom: three_bnd.chrom.clone(),
                three_pos: three_bnd.pos,
                three_exon: candidate.down.exon,
                three_phase: candidate.down.phase,
                known_type: candidate.known,
                known_exons: candidate.known_exons,
                phase_matched: candidate.phase_matched,
                exons_skipped_up: candidate.exons_skipped_up,
                exons_skipped_down: candidate.exons_skipped_down,
                terminated_up: candidate.terminated_up,
                terminated_down: candidate.terminated_down,
                chain: candidate.chain,
                reportable: candidate.reportable,
            }
        })
        .collect()
}

/// Write records as JSON lines.
pub fn write_jsonl<T: Serialize>(path: &Path, records: &[T]) -> Result<(), anyhow::Error> {
    let mut writer = open_write_maybe_gz(path)?;
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}
