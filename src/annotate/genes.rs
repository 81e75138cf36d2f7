//! Gene / transcript / exon annotation lookup.
//!
//! Annotation data is loaded once per run from (optionally gzipped) TSV
//! files and then queried in memory only: by position through per-chromosome
//! interval trees and by start-sorted scan for traversal checks.

use std::{path::Path, time::Instant};

use bio::data_structures::interval_tree::ArrayBackedIntervalTree;
use serde::Deserialize;

use crate::common::{io::open_read_maybe_gz, Strand, CHROMS};

use super::transcript::Phase;

/// Alias for the interval tree that we use.
type IntervalTree = ArrayBackedIntervalTree<i64, u32>;

/// Transcript biotype.
#[derive(
    serde::Serialize,
    serde::Deserialize,
    PartialEq,
    Eq,
    Hash,
    Debug,
    Clone,
    Copy,
    Default,
    strum_macros::EnumString,
    strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Biotype {
    /// Protein coding transcript.
    #[default]
    ProteinCoding,
    /// Transcript subject to nonsense-mediated decay.
    NonsenseMediatedDecay,
    /// Transcript with a retained intron.
    RetainedIntron,
    /// Processed transcript without ORF.
    ProcessedTranscript,
    /// Long intervening non-coding RNA.
    Lincrna,
    /// Pseudogene.
    Pseudogene,
    /// Immunoglobulin gene segment.
    IgRegion,
    /// Anything else.
    Other,
}

/// A gene with its genomic span; immutable after loading.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneAnnotation {
    /// Stable identifier.
    pub gene_id: String,
    /// Gene symbol.
    pub name: String,
    /// Chromosome number.
    pub chrom_no: usize,
    /// 1-based start position.
    pub start: i64,
    /// 1-based end position (inclusive).
    pub end: i64,
    /// Strand of the gene.
    pub strand: Strand,
}

/// One exon of a transcript with precomputed coding phases.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExonData {
    /// 1-based rank in transcript orientation (rank 1 is 5'-most).
    pub rank: u32,
    /// 1-based genomic start (lower coordinate).
    pub start: i64,
    /// 1-based genomic end (upper coordinate, inclusive).
    pub end: i64,
    /// Reading-frame phase when entering the exon.
    pub phase_start: Phase,
    /// Reading-frame phase after the exon.
    pub phase_end: Phase,
}

/// A transcript with its ordered exon list; immutable after loading.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptAnnotation {
    /// Index of the owning gene in [`GeneDb::genes`].
    pub gene_idx: usize,
    /// Transcript name.
    pub name: String,
    /// Whether this is the gene's canonical transcript.
    pub canonical: bool,
    /// Transcript biotype.
    pub biotype: Biotype,
    /// Exons in rank order (index 0 is rank 1, the 5'-most exon).
    pub exons: Vec<ExonData>,
    /// Genomic lower coordinate of the coding region, if coding.
    pub coding_start: Option<i64>,
    /// Genomic upper coordinate of the coding region, if coding.
    pub coding_end: Option<i64>,
    /// Total number of coding bases, filled in by [`GeneDb::index`].
    pub total_coding_bases: i64,
}

impl TranscriptAnnotation {
    /// Whether the transcript has a coding region.
    pub fn is_coding(&self) -> bool {
        self.coding_start.is_some() && self.coding_end.is_some()
    }

    /// Number of exons.
    pub fn exon_count(&self) -> u32 {
        self.exons.len() as u32
    }

    /// Exon by 1-based rank.
    pub fn exon(&self, rank: u32) -> Option<&ExonData> {
        if rank == 0 {
            None
        } else {
            self.exons.get(rank as usize - 1)
        }
    }

    /// 1-based genomic span of the transcript.
    pub fn span(&self) -> (i64, i64) {
        let start = self.exons.iter().map(|e| e.start).min().unwrap_or(0);
        let end = self.exons.iter().map(|e| e.end).max().unwrap_or(0);
        (start, end)
    }
}

/// In-memory annotation database.
#[derive(Debug, Default)]
pub struct GeneDb {
    /// All genes.
    pub genes: Vec<GeneAnnotation>,
    /// All transcripts.
    pub transcripts: Vec<TranscriptAnnotation>,
    /// Transcript indices by gene index.
    pub tx_by_gene: multimap::MultiMap<usize, usize>,
    /// Interval trees by chromosome for position queries.
    trees: Vec<IntervalTree>,
    /// Gene indices by chromosome, sorted by start position.
    sorted_genes: Vec<Vec<usize>>,
}

impl GeneDb {
    /// Return indices of genes overlapping the given position.
    pub fn genes_overlapping(&self, chrom_no: usize, pos: i64) -> Vec<usize> {
        if chrom_no >= self.trees.len() {
            return Vec::new();
        }
        let mut result = self.trees[chrom_no]
            .find(pos..pos + 1)
            .iter()
            .map(|cursor| *cursor.data() as usize)
            .collect::<Vec<_>>();
        result.sort();
        result
    }

    /// Gene indices on a chromosome, sorted by start position.
    pub fn genes_sorted(&self, chrom_no: usize) -> &[usize] {
        self.sorted_genes
            .get(chrom_no)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Transcript indices of a gene.
    pub fn transcripts(&self, gene_idx: usize) -> &[usize] {
        self.tx_by_gene
            .get_vec(&gene_idx)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// The canonical transcript of a gene, if annotated.
    pub fn canonical_transcript(&self, gene_idx: usize) -> Option<usize> {
        self.transcripts(gene_idx)
            .iter()
            .copied()
            .find(|tx_idx| self.transcripts[*tx_idx].canonical)
    }

    /// Add a gene, returning its index.
    pub fn add_gene(&mut self, gene: GeneAnnotation) -> usize {
        self.genes.push(gene);
        self.genes.len() - 1
    }

    /// Add a transcript, returning its index.
    pub fn add_transcript(&mut self, tx: TranscriptAnnotation) -> usize {
        let tx_idx = self.transcripts.len();
        self.tx_by_gene.insert(tx.gene_idx, tx_idx);
        self.transcripts.push(tx);
        tx_idx
    }

    /// Build the position indices and precompute exon phases.
    pub fn index(&mut self) {
        self.trees.clear();
        self.sorted_genes.clear();
        for _ in CHROMS {
            self.trees.push(IntervalTree::new());
            self.sorted_genes.push(Vec::new());
        }
        for (gene_idx, gene) in self.genes.iter().enumerate() {
            self.trees[gene.chrom_no].insert(gene.start..gene.end + 1, gene_idx as u32);
            self.sorted_genes[gene.chrom_no].push(gene_idx);
        }
        self.trees.iter_mut().for_each(|tree| tree.index());
        for list in &mut self.sorted_genes {
            list.sort_by_key(|gene_idx| self.genes[*gene_idx].start);
        }
        for tx in &mut self.transcripts {
            compute_exon_phases(tx);
        }
    }
}

/// Fill in per-exon coding phases and the total coding base count.
fn compute_exon_phases(tx: &mut TranscriptAnnotation) {
    let (Some(coding_start), Some(coding_end)) = (tx.coding_start, tx.coding_end) else {
        for exon in &mut tx.exons {
            exon.phase_start = Phase::None;
            exon.phase_end = Phase::None;
        }
        tx.total_coding_bases = 0;
        return;
    };

    let mut cum = 0i64;
    for exon in &mut tx.exons {
        let coding_bases =
            (exon.end.min(coding_end) - exon.start.max(coding_start) + 1).max(0);
        exon.phase_start = if cum == 0 {
            Phase::None
        } else {
            Phase::from_int(cum % 3)
        };
        cum += coding_bases;
        exon.phase_end = if cum == 0 {
            Phase::None
        } else {
            Phase::from_int(cum % 3)
        };
    }
    tx.total_coding_bases = cum;
}

/// Gene row in the annotation TSV.
#[derive(Deserialize, Debug, Clone)]
struct GeneRecord {
    /// Stable identifier.
    pub gene_id: String,
    /// Gene symbol.
    pub symbol: String,
    /// Chromosome name.
    pub chrom: String,
    /// 1-based start position.
    pub start: i64,
    /// 1-based end position.
    pub end: i64,
    /// Strand, `+` or `-`.
    pub strand: String,
}

/// Transcript row in the annotation TSV.
#[derive(Deserialize, Debug, Clone)]
struct TranscriptRecord {
    /// Stable identifier of the owning gene.
    pub gene_id: String,
    /// Transcript name.
    pub tx_name: String,
    /// Whether this is the canonical transcript.
    pub canonical: bool,
    /// Transcript biotype.
    pub biotype: String,
    /// Genomic lower coordinate of the coding region, if any.
    pub coding_start: Option<i64>,
    /// Genomic upper coordinate of the coding region, if any.
    pub coding_end: Option<i64>,
    /// Exons as `start-end` pairs joined with `,`, in genomic order.
    pub exons: String,
}

/// Parse the `exons` column and assign ranks in transcript orientation.
fn parse_exons(spec: &str, strand: Strand) -> Result<Vec<ExonData>, anyhow::Error> {
    let mut spans = Vec::new();
    for item in spec.split(',').filter(|s| !s.is_empty()) {
        let (start, end) = item
            .split_once('-')
            .ok_or_else(|| anyhow::anyhow!("invalid exon spec: {:?}", item))?;
        spans.push((start.trim().parse::<i64>()?, end.trim().parse::<i64>()?));
    }
    spans.sort();
    if strand == Strand::Reverse {
        spans.reverse();
    }
    Ok(spans
        .into_iter()
        .enumerate()
        .map(|(i, (start, end))| ExonData {
            rank: i as u32 + 1,
            start,
            end,
            phase_start: Phase::None,
            phase_end: Phase::None,
        })
        .collect())
}

/// Load the gene and transcript annotation TSV files into a [`GeneDb`].
#[tracing::instrument]
pub fn load_gene_db(
    path_genes: &Path,
    path_transcripts: &Path,
    chrom_map: &indexmap::IndexMap<String, usize>,
) -> Result<GeneDb, anyhow::Error> {
    tracing::debug!("loading gene annotation from {:?}...", path_genes);
    let before_loading = Instant::now();
    let mut result = GeneDb::default();
    let mut gene_idx_by_id = indexmap::IndexMap::new();

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .from_reader(open_read_maybe_gz(path_genes)?);
    for record in reader.deserialize() {
        let record: GeneRecord = record?;
        let Some(chrom_no) = chrom_map.get(&record.chrom) else {
            tracing::warn!("skipping gene {} on unknown chromosome {}", &record.symbol, &record.chrom);
            continue;
        };
        let gene_idx = result.add_gene(GeneAnnotation {
            gene_id: record.gene_id.clone(),
            name: record.symbol,
            chrom_no: *chrom_no,
            start: record.start,
            end: record.end,
            strand: record.strand.parse()?,
        });
        gene_idx_by_id.insert(record.gene_id, gene_idx);
    }

    tracing::debug!("loading transcript annotation from {:?}...", path_transcripts);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .from_reader(open_read_maybe_gz(path_transcripts)?);
    for record in reader.deserialize() {
        let record: TranscriptRecord = record?;
        let Some(gene_idx) = gene_idx_by_id.get(&record.gene_id) else {
            tracing::warn!(
                "skipping transcript {} of unknown gene {}",
                &record.tx_name,
                &record.gene_id
            );
            continue;
        };
        let strand = result.genes[*gene_idx].strand;
        let biotype = record.biotype.parse().unwrap_or(Biotype::Other);
        let exons = parse_exons(&record.exons, strand)?;
        if exons.is_empty() {
            tracing::warn!("skipping transcript {} without exons", &record.tx_name);
            continue;
        }
        result.add_transcript(TranscriptAnnotation {
            gene_idx: *gene_idx,
            name: record.tx_name,
            canonical: record.canonical,
            biotype,
            exons,
            coding_start: record.coding_start,
            coding_end: record.coding_end,
            total_coding_bases: 0,
        });
    }

    result.index();
    tracing::debug!(
        "... done loading {} genes / {} transcripts in {:?}",
        result.genes.len(),
        result.transcripts.len(),
        before_loading.elapsed(),
    );
    Ok(result)
}
