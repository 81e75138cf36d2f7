//! Code implementing the `annotate` sub command: gene-level annotation of
//! structural variant graphs.
//!
//! For each sample graph the pipeline derives breakend x transcript contexts,
//! classifies transcript disruptions, enumerates single-junction and chained
//! fusion candidates, applies the reportability gate and per-gene-pair
//! ranking, and writes the results as JSONL files.

pub mod chain;
pub mod disruption;
pub mod fusion;
pub mod genes;
pub mod known;
pub mod output;
pub mod rank;
pub mod schema;
pub mod transcript;
pub mod traversal;

use std::{
    path::{Path, PathBuf},
    time::Instant,
};

use clap::Parser;
use indexmap::IndexMap;
use rayon::prelude::*;

use crate::common::{build_chrom_map, io::open_read_maybe_gz};

use self::{
    chain::ChainFusionWalker,
    disruption::DisruptionClassifier,
    fusion::{AnalysisContext, FusionCandidate, FusionFinder},
    genes::GeneDb,
    known::KnownFusionCache,
    rank::FusionRanker,
    schema::SvGraph,
    transcript::TxContextArena,
};

/// Command line arguments for `svfusion annotate` sub command.
#[derive(Parser, Debug)]
#[command(about = "annotate SV graphs with gene disruptions and fusions", long_about = None)]
pub struct Args {
    /// Path to the gene annotation TSV file.
    #[arg(long)]
    pub path_genes: PathBuf,
    /// Path to the transcript annotation TSV file.
    #[arg(long)]
    pub path_transcripts: PathBuf,
    /// Path to the known fusion reference TSV file.
    #[arg(long)]
    pub path_known_fusions: PathBuf,
    /// Path to the output directory.
    #[arg(long)]
    pub path_output: PathBuf,
    /// Paths to the per-sample SV graph JSON files.
    #[arg(required = true)]
    pub path_samples: Vec<PathBuf>,
}

/// Main entry point for the `annotate` sub command.
pub fn run(args_common: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    tracing::info!("args_common = {:?}", &args_common);
    tracing::info!("args = {:?}", &args);

    let chrom_map = build_chrom_map();

    tracing::info!("loading annotation data...");
    let before_loading = Instant::now();
    let gene_db = genes::load_gene_db(&args.path_genes, &args.path_transcripts, &chrom_map)?;
    let known = known::load_known_fusions(&args.path_known_fusions, &chrom_map)?;
    tracing::info!(
        "...done loading annotation data in {:?}",
        before_loading.elapsed()
    );

    std::fs::create_dir_all(&args.path_output)?;

    tracing::info!("annotating {} sample(s)...", args.path_samples.len());
    let before_samples = Instant::now();
    args.path_samples.par_iter().for_each(|path_sample| {
        // A failing sample must not abort the whole run.
        if let Err(e) =
            annotate_sample(path_sample, &gene_db, &known, &chrom_map, &args.path_output)
        {
            tracing::error!("problem annotating sample {:?}: {}", path_sample, e);
        }
    });
    tracing::info!(
        "...done annotating {} sample(s) in {:?}",
        args.path_samples.len(),
        before_samples.elapsed()
    );

    Ok(())
}

/// Load one sample graph from a (possibly gzip-ed) JSON file.
fn load_graph(path: &Path) -> Result<SvGraph, anyhow::Error> {
    let reader = open_read_maybe_gz(path)?;
    serde_json::from_reader(reader)
        .map_err(|e| anyhow::anyhow!("problem loading graph from {:?}: {}", path, e))
}

/// Run the full annotation pipeline for one sample graph.
#[tracing::instrument(skip(gene_db, known, chrom_map, path_output))]
fn annotate_sample(
    path_sample: &Path,
    gene_db: &GeneDb,
    known: &KnownFusionCache,
    chrom_map: &indexmap::IndexMap<String, usize>,
    path_output: &Path,
) -> Result<(), anyhow::Error> {
    let before_sample = Instant::now();
    let mut graph = load_graph(path_sample)?;
    graph.prepare(chrom_map)?;

    let sample = if graph.sample.is_empty() {
        path_sample
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "sample".to_owned())
    } else {
        graph.sample.clone()
    };

    let mut arena = TxContextArena::annotate_graph(&graph, gene_db);
    DisruptionClassifier::new(&graph, gene_db).classify_all(&mut arena);

    let mut ctx = AnalysisContext::default();
    let candidates = find_all_fusions(&graph, gene_db, known, &arena, &mut ctx);
    let finals = rank_fusions(&graph, gene_db, &arena, candidates);

    for ((five, three), reason) in ctx.invalid_reasons() {
        tracing::debug!("discarded gene pair {}::{}: {}", five, three, reason);
    }

    let disruptions = output::disruption_records(&graph, &arena, gene_db);
    output::write_jsonl(
        &path_output.join(format!("{}.disruptions.jsonl", &sample)),
        &disruptions,
    )?;
    let fusions = output::fusion_records(&graph, &finals);
    output::write_jsonl(
        &path_output.join(format!("{}.fusions.jsonl", &sample)),
        &fusions,
    )?;

    tracing::info!(
        "sample {}: {} disruption and {} fusion record(s) in {:?}",
        &sample,
        disruptions.len(),
        fusions.len(),
        before_sample.elapsed()
    );

    Ok(())
}

/// Enumerate fusion candidates from isolated variants and from chains.
///
/// Variants that are part of a chain are only analyzed through the chain
/// walker so that the traversed segments are accounted for.
fn find_all_fusions(
    graph: &SvGraph,
    gene_db: &GeneDb,
    known: &KnownFusionCache,
    arena: &TxContextArena,
    ctx: &mut AnalysisContext,
) -> Vec<FusionCandidate> {
    let finder = FusionFinder::new(graph, gene_db, known);
    let mut candidates = Vec::new();
    for (variant_id, variant) in graph.variants.iter().enumerate() {
        let Some(bnd_end) = variant.bnd_end else {
            continue;
        };
        if !graph.chains_with_variant(variant_id).is_empty() {
            continue;
        }
        candidates.extend(finder.find_fusions(arena, variant.bnd_start, bnd_end, ctx));
    }
    let walker = ChainFusionWalker::new(graph, gene_db, known);
    for chain_id in 0..graph.chains.len() {
        candidates.extend(walker.find_chained_fusions(arena, chain_id, ctx));
    }
    fusion::dedup_candidates(candidates)
}

/// Apply the reportability gate and keep the best candidate per gene pair.
fn rank_fusions(
    graph: &SvGraph,
    gene_db: &GeneDb,
    arena: &TxContextArena,
    mut candidates: Vec<FusionCandidate>,
) -> Vec<FusionCandidate> {
    let ranker = FusionRanker::new(graph, gene_db);
    ranker.apply(arena, &mut candidates);

    let mut groups: IndexMap<(String, String), Vec<FusionCandidate>> = IndexMap::new();
    for candidate in candidates {
        groups
            .entry((
                candidate.up.gene_name.clone(),
                candidate.down.gene_name.clone(),
            ))
            .or_default()
            .push(candidate);
    }

    let mut result = Vec::new();
    for (_, group) in groups {
        if let Some(best) = ranker.rank(arena, &group) {
            result.push(group[best].clone());
        }
    }
    result
}
