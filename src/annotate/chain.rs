//! Fusion finding across chained breakends.
//!
//! A chain of `N` links exposes `N + 1` variant positions.  The walker pairs
//! every "lower" breakend with every "upper" breakend at or beyond it,
//! running the fusion finder on each pair: `i == j` reproduces each SV in
//! isolation, `j > i` yields fusions spanning the traversed chain segment,
//! whose intermediate links must each pass the traversal check.

use tracing::warn;

use super::{
    fusion::{
        AnalysisContext, ChainInfo, FusionCandidate, FusionFinder, dedup_candidates,
    },
    genes::{GeneDb, TranscriptAnnotation},
    known::KnownFusionCache,
    schema::{Chain, SvGraph},
    transcript::{CodingContext, TxContextArena},
    traversal::TraversalMemo,
};

/// Maximum accumulated length of traversed chain segments in a fusion.
pub const FUSION_MAX_CHAIN_LENGTH: i64 = 150_000;

/// Maximum number of links traversed by a chained fusion.
pub const FUSION_MAX_CHAIN_LINKS: u32 = 4;

/// Walker producing fusion candidates from one chain.
#[derive(Debug)]
pub struct ChainFusionWalker<'a> {
    /// The per-breakend-pair fusion finder.
    pub finder: FusionFinder<'a>,
}

impl<'a> ChainFusionWalker<'a> {
    /// Construct a new walker.
    pub fn new(graph: &'a SvGraph, db: &'a GeneDb, known: &'a KnownFusionCache) -> Self {
        ChainFusionWalker {
            finder: FusionFinder::new(graph, db, known),
        }
    }

    /// Find all fusion candidates within the chain.
    pub fn find_chained_fusions(
        &self,
        arena: &TxContextArena,
        chain_id: usize,
        ctx: &mut AnalysisContext,
    ) -> Vec<FusionCandidate> {
        let graph = self.finder.graph;
        let chain = &graph.chains[chain_id];
        let position_count = chain.link_count();
        let mut memo = TraversalMemo::default();
        let mut result = Vec::new();

        for i in 0..=position_count {
            for j in i..=position_count {
                let (Some(lower), Some(upper)) = (
                    chain.lower_breakend(i, graph),
                    chain.upper_breakend(j, graph),
                ) else {
                    warn!(
                        "chain {} has no breakend at positions {}/{}, skipping",
                        chain_id, i, j
                    );
                    continue;
                };
                if arena.entries_at(lower).is_empty() && arena.entries_at(upper).is_empty() {
                    continue;
                }

                for mut candidate in self.finder.find_fusions(arena, lower, upper, ctx) {
                    if j > i {
                        // A traversed chain segment cannot represent a
                        // single-junction exonic fusion.
                        if candidate.up.exonic && candidate.down.exonic {
                            continue;
                        }
                        let Some(info) = self.check_segment(
                            &candidate, chain, chain_id, i, j, lower, &mut memo,
                        ) else {
                            continue;
                        };
                        candidate.chain = Some(info);
                    }

                    self.apply_termination(arena, chain, &mut candidate, lower, i, j);
                    result.push(candidate);
                }
            }
        }

        dedup_candidates(result)
    }

    /// Validate the traversed links between positions `i` and `j`; `None`
    /// drops the candidate.
    #[allow(clippy::too_many_arguments)]
    fn check_segment(
        &self,
        candidate: &FusionCandidate,
        chain: &Chain,
        chain_id: usize,
        i: usize,
        j: usize,
        lower: usize,
        memo: &mut TraversalMemo,
    ) -> Option<ChainInfo> {
        let graph = self.finder.graph;
        let suspect_allowed = candidate.known.suspect_chains_allowed();
        let is_precoding_upstream = candidate.up.coding == CodingContext::PreCoding;
        // Segments are read from the 5' end of the fusion towards the 3'
        // end; walking against chain order flips each link's direction.
        let walk_sign: i64 = if candidate.up.breakend_id == lower { 1 } else { -1 };

        let mut length = 0i64;
        let mut valid_traversal = true;
        for link_idx in i..j {
            let link = chain.links[link_idx];
            let (chrom_no, lo, hi) = link.interval(graph);
            length += link.length(graph);
            let link_sign =
                (graph.breakends[link.second].pos - graph.breakends[link.first].pos).signum();
            let direction = (walk_sign * link_sign) as i8;
            if memo.traverses_gene(
                self.finder.db,
                link_idx,
                chrom_no,
                lo,
                hi,
                direction,
                is_precoding_upstream,
            ) {
                valid_traversal = false;
            }
        }

        let link_count = (j - i) as u32;
        let within_limits =
            length <= FUSION_MAX_CHAIN_LENGTH && link_count <= FUSION_MAX_CHAIN_LINKS;
        if (!within_limits || !valid_traversal) && !suspect_allowed {
            return None;
        }

        Some(ChainInfo {
            chain_id,
            link_count,
            length,
            valid_traversal,
        })
    }

    /// Mark each side terminated if the chain disrupts its transcript on
    /// the retained side of the fusion breakend.
    fn apply_termination(
        &self,
        arena: &TxContextArena,
        chain: &Chain,
        candidate: &mut FusionCandidate,
        lower: usize,
        i: usize,
        j: usize,
    ) {
        let below: Vec<usize> = (0..i).rev().collect();
        let above: Vec<usize> = (j + 1..=chain.link_count()).collect();
        let (up_outward, down_outward) = if candidate.up.breakend_id == lower {
            (below, above)
        } else {
            (above, below)
        };
        candidate.terminated_up =
            self.side_terminated(arena, chain, &up_outward, candidate.up.entry, true);
        candidate.terminated_down =
            self.side_terminated(arena, chain, &down_outward, candidate.down.entry, false);
    }

    /// Walk the given chain positions outward from the fusion breakend and
    /// report whether a disruptive breakend is met within the transcript's
    /// retained region.
    fn side_terminated(
        &self,
        arena: &TxContextArena,
        chain: &Chain,
        positions: &[usize],
        entry_idx: Option<usize>,
        five_prime: bool,
    ) -> bool {
        let Some(entry_idx) = entry_idx else {
            return false;
        };
        let graph = self.finder.graph;
        let entry = &arena.entries[entry_idx];
        let gene = &self.finder.db.genes[entry.gene_idx];
        let tx: &TranscriptAnnotation = &self.finder.db.transcripts[entry.tx_idx];
        let strand = gene.strand.as_int() as i64;
        let (span_start, span_end) = tx.span();
        let d_five = strand * if strand > 0 { span_start } else { span_end };
        // Past the stop codon a breakend cannot unmake the fusion protein,
        // so the 3' scan ends at the coding boundary of coding transcripts.
        let (c_lo, c_hi) = match (tx.coding_start, tx.coding_end) {
            (Some(coding_start), Some(coding_end)) => (coding_start, coding_end),
            _ => (span_start, span_end),
        };
        let d_three = strand * if strand > 0 { c_hi } else { c_lo };

        for &position in positions {
            let ends = [
                chain.lower_breakend(position, graph),
                chain.upper_breakend(position, graph),
            ];
            for bnd_id in ends.into_iter().flatten() {
                let bnd = &graph.breakends[bnd_id];
                if bnd.chrom_no != gene.chrom_no {
                    continue;
                }
                let d = strand * bnd.pos;
                // Past the retained end of the transcript: nothing further
                // along the chain can affect it.
                if (five_prime && d < d_five) || (!five_prime && d > d_three) {
                    return false;
                }
                if let Some(idx) = arena.lookup(bnd_id, entry.tx_idx) {
                    if arena.entries[idx].disruptive {
                        return true;
                    }
                }
            }
        }
        false
    }
}
