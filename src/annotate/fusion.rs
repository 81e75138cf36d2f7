//! Fusion candidate finding between two genic breakends.
//!
//! For a pair of breakends the finder enumerates gene pairs, assigns the 5'
//! and 3' roles by strand-relative orientation, and then runs every
//! (upstream transcript, downstream transcript) combination through the
//! coding-state compatibility matrix and reading-frame phase matching.  IG
//! locus breakends are handled through a synthetic enhancer-type 5' end
//! instead of a real transcript.

use indexmap::IndexMap;

use super::{
    genes::{Biotype, GeneDb},
    known::{KnownFusionCache, KnownFusionMatch},
    schema::SvGraph,
    transcript::{
        alternative_phases, is_upstream, CodingContext, Phase, RegionType, TxContextArena,
    },
};

/// Maximum distance of a 3' breakend upstream of a known / high-impact
/// promiscuous partner gene.
pub const MAX_UPSTREAM_DISTANCE_KNOWN: i64 = 100_000;

/// Maximum distance of a 3' breakend upstream of any other partner gene.
pub const MAX_UPSTREAM_DISTANCE_OTHER: i64 = 10_000;

/// Maximum breakend distance for the unphased known-pair reportability
/// exception on one chromosome.
pub const SHORT_UNPHASED_DISTANCE_KNOWN: i64 = 100_000;

/// Reason for discarding a gene pair, for diagnostics only.
#[derive(
    serde::Serialize, PartialEq, Eq, Hash, Debug, Clone, Copy, strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InvalidReason {
    /// Both sides face the same transcript direction.
    Orientation,
    /// The coding-state compatibility matrix rejected the pair.
    CodingType,
    /// No exact or approximate phase match was found.
    Unphased,
}

/// Per-sample analysis state: fusion id counter and one invalid reason per
/// gene pair.
#[derive(Debug, Default)]
pub struct AnalysisContext {
    next_fusion_id: usize,
    invalid: IndexMap<(String, String), InvalidReason>,
}

impl AnalysisContext {
    /// Next fusion candidate id.
    pub fn next_id(&mut self) -> usize {
        let id = self.next_fusion_id;
        self.next_fusion_id += 1;
        id
    }

    /// Record the first invalid reason seen for a gene pair.
    pub fn record_invalid(&mut self, five: &str, three: &str, reason: InvalidReason) {
        self.invalid
            .entry((five.to_owned(), three.to_owned()))
            .or_insert(reason);
    }

    /// All recorded invalid reasons in first-seen order.
    pub fn invalid_reasons(&self) -> impl Iterator<Item = (&(String, String), &InvalidReason)> {
        self.invalid.iter()
    }
}

/// Summary of the chain segment connecting the two fusion breakends; absent
/// for single-junction fusions.
#[derive(serde::Serialize, Debug, Clone, Copy, PartialEq)]
pub struct ChainInfo {
    /// Id of the chain.
    pub chain_id: usize,
    /// Number of links between the fusion breakends.
    pub link_count: u32,
    /// Accumulated traversed length in bases.
    pub length: i64,
    /// Whether every intermediate link passed the traversal check.
    pub valid_traversal: bool,
}

/// One side of a fusion candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct FusionEnd {
    /// Id of the breakend.
    pub breakend_id: usize,
    /// Gene symbol; for IG ends the curated 5' name.
    pub gene_name: String,
    /// Transcript name; synthetic for IG ends.
    pub tx_name: String,
    /// Arena entry index; `None` for synthetic IG ends.
    pub entry: Option<usize>,
    /// Fused exon rank (last kept exon upstream, first kept downstream).
    pub exon: u32,
    /// Reading-frame phase at the breakend.
    pub phase: Phase,
    /// Coding context at the breakend.
    pub coding: CodingContext,
    /// Whether the breakend is exonic.
    pub exonic: bool,
}

impl FusionEnd {
    fn from_entry(arena: &TxContextArena, db: &GeneDb, entry_idx: usize, upstream: bool) -> Self {
        let entry = &arena.entries[entry_idx];
        FusionEnd {
            breakend_id: entry.breakend_id,
            gene_name: db.genes[entry.gene_idx].name.clone(),
            tx_name: db.transcripts[entry.tx_idx].name.clone(),
            entry: Some(entry_idx),
            exon: if upstream {
                entry.exon_upstream
            } else {
                entry.exon_downstream
            },
            phase: entry.phase,
            coding: entry.coding,
            exonic: entry.is_exonic(),
        }
    }
}

/// A candidate gene fusion between two breakends.
#[derive(Debug, Clone, PartialEq)]
pub struct FusionCandidate {
    /// Sample-scoped candidate id.
    pub id: usize,
    /// The 5' end.
    pub up: FusionEnd,
    /// The 3' end.
    pub down: FusionEnd,
    /// Whether the reading frame is preserved across the junction.
    pub phase_matched: bool,
    /// Exons skipped on the 5' side to reach the matching phase.
    pub exons_skipped_up: u32,
    /// Exons skipped on the 3' side to reach the matching phase.
    pub exons_skipped_down: u32,
    /// Classification against the known-fusion reference.
    pub known: KnownFusionMatch,
    /// Whether the fused exons fall into a registered high-confidence range.
    pub known_exons: bool,
    /// Whether a promiscuous match is flagged high impact.
    pub high_impact_promiscuous: bool,
    /// Chain summary for chained fusions.
    pub chain: Option<ChainInfo>,
    /// Whether the chain terminates the 5' transcript before the junction.
    pub terminated_up: bool,
    /// Whether the chain terminates the 3' transcript before the junction.
    pub terminated_down: bool,
    /// Whether the candidate passed the reportability gate.
    pub reportable: bool,
}

impl FusionCandidate {
    /// Total exons skipped on both sides.
    pub fn exons_skipped(&self) -> u32 {
        self.exons_skipped_up + self.exons_skipped_down
    }

    /// Key identifying equivalent candidates for deduplication.
    pub fn dedup_key(&self) -> (String, String, String, String, bool) {
        (
            self.up.gene_name.clone(),
            self.up.tx_name.clone(),
            self.down.gene_name.clone(),
            self.down.tx_name.clone(),
            self.phase_matched,
        )
    }
}

/// Drop candidates equal under [`FusionCandidate::dedup_key`], keeping the
/// first occurrence.
pub fn dedup_candidates(candidates: Vec<FusionCandidate>) -> Vec<FusionCandidate> {
    let mut seen = std::collections::HashSet::new();
    candidates
        .into_iter()
        .filter(|candidate| seen.insert(candidate.dedup_key()))
        .collect()
}

/// Finder for fusion candidates between breakend pairs of one sample.
#[derive(Debug)]
pub struct FusionFinder<'a> {
    /// The sample's SV graph.
    pub graph: &'a SvGraph,
    /// The annotation database.
    pub db: &'a GeneDb,
    /// The known-fusion reference.
    pub known: &'a KnownFusionCache,
}

/// Outcome of one transcript pair check.
type PairCheck = Result<(), Option<InvalidReason>>;

impl<'a> FusionFinder<'a> {
    /// Construct a new finder.
    pub fn new(graph: &'a SvGraph, db: &'a GeneDb, known: &'a KnownFusionCache) -> Self {
        FusionFinder { graph, db, known }
    }

    /// Find all fusion candidates between the two breakends.
    pub fn find_fusions(
        &self,
        arena: &TxContextArena,
        bnd_a: usize,
        bnd_b: usize,
        ctx: &mut AnalysisContext,
    ) -> Vec<FusionCandidate> {
        let mut result = self.find_ig_fusions(arena, bnd_a, bnd_b, ctx);

        for (gene_a, entries_a) in arena.genes_at(bnd_a) {
            for (gene_b, entries_b) in arena.genes_at(bnd_b) {
                let a_up = arena.entries[entries_a[0]].is_upstream;
                let b_up = arena.entries[entries_b[0]].is_upstream;
                if a_up == b_up {
                    let (five, three) = if a_up { (gene_a, gene_b) } else { (gene_b, gene_a) };
                    ctx.record_invalid(
                        &self.db.genes[five].name,
                        &self.db.genes[three].name,
                        InvalidReason::Orientation,
                    );
                    continue;
                }
                let (up_entries, down_entries) = if a_up {
                    (&entries_a, &entries_b)
                } else {
                    (&entries_b, &entries_a)
                };
                for &up_idx in up_entries.iter() {
                    for &down_idx in down_entries.iter() {
                        match self.check_transcript_pair(arena, up_idx, down_idx) {
                            Ok(candidate) => {
                                result.push(self.finish_candidate(candidate, ctx));
                            }
                            Err(Some(reason)) => {
                                let up = &arena.entries[up_idx];
                                let down = &arena.entries[down_idx];
                                ctx.record_invalid(
                                    &self.db.genes[up.gene_idx].name,
                                    &self.db.genes[down.gene_idx].name,
                                    reason,
                                );
                            }
                            Err(None) => {}
                        }
                    }
                }
            }
        }

        dedup_candidates(result)
    }

    /// Assign the candidate id.
    fn finish_candidate(
        &self,
        mut candidate: FusionCandidate,
        ctx: &mut AnalysisContext,
    ) -> FusionCandidate {
        candidate.id = ctx.next_id();
        candidate
    }

    /// IG locus breakends are modeled as an enhancer-type synthetic 5' end
    /// fused to a partner gene on the other breakend; coding compatibility
    /// and phase matching do not apply.
    fn find_ig_fusions(
        &self,
        arena: &TxContextArena,
        bnd_a: usize,
        bnd_b: usize,
        ctx: &mut AnalysisContext,
    ) -> Vec<FusionCandidate> {
        let mut result = Vec::new();
        for (ig_bnd, gene_bnd) in [(bnd_a, bnd_b), (bnd_b, bnd_a)] {
            let ig = &self.graph.breakends[ig_bnd];
            for (gene_idx, entries) in arena.genes_at(gene_bnd) {
                let gene = &self.db.genes[gene_idx];
                let Some(entry) = self.known.ig_match(ig.chrom_no, ig.pos, &gene.name) else {
                    continue;
                };
                let region = entry.ig_region.as_ref().expect("IG entries carry a region");
                if !is_upstream(region.strand, ig.orientation) {
                    continue;
                }
                for &down_idx in entries.iter() {
                    let down = &arena.entries[down_idx];
                    if down.is_upstream
                        || !self.db.transcripts[down.tx_idx].canonical
                        || down.coding == CodingContext::PostCoding
                    {
                        continue;
                    }
                    result.push(FusionCandidate {
                        id: ctx.next_id(),
                        up: FusionEnd {
                            breakend_id: ig_bnd,
                            gene_name: entry.five_gene.clone(),
                            tx_name: format!("{}-IG", entry.five_gene),
                            entry: None,
                            exon: 0,
                            phase: Phase::None,
                            coding: CodingContext::Enhancer,
                            exonic: false,
                        },
                        down: FusionEnd::from_entry(arena, self.db, down_idx, false),
                        phase_matched: true,
                        exons_skipped_up: 0,
                        exons_skipped_down: 0,
                        known: KnownFusionMatch::IgKnownPair,
                        known_exons: false,
                        high_impact_promiscuous: false,
                        chain: None,
                        terminated_up: false,
                        terminated_down: false,
                        reportable: false,
                    });
                }
            }
        }
        result
    }

    /// Run one (upstream transcript, downstream transcript) pair through
    /// the full rule chain.
    fn check_transcript_pair(
        &self,
        arena: &TxContextArena,
        up_idx: usize,
        down_idx: usize,
    ) -> Result<FusionCandidate, Option<InvalidReason>> {
        let up = &arena.entries[up_idx];
        let down = &arena.entries[down_idx];
        let down_tx = &self.db.transcripts[down.tx_idx];
        let up_gene = &self.db.genes[up.gene_idx];
        let down_gene = &self.db.genes[down.gene_idx];

        let (known, known_exons, high_impact) = self.known.classify(
            &up_gene.name,
            &down_gene.name,
            up.exon_upstream,
            down.exon_downstream,
        );

        self.check_upstream(arena, up_idx, known)?;
        self.check_downstream(arena, down_idx)?;
        self.check_coding_matrix(arena, up_idx, down_idx, known)?;
        self.check_same_gene(arena, up_idx, down_idx)?;

        let phase_required = !known.is_exact_pairing();
        let (phase_matched, skips_up, skips_down) = if up.is_exonic() && down.is_exonic() {
            // Exact rule on the junction itself: the next coding base of the
            // 5' side must continue the 3' side's frame.
            if down.exon_downstream == down_tx.exon_count()
                && down.coding != CodingContext::PreCoding
            {
                return Err(Some(InvalidReason::CodingType));
            }
            let matched = match (up.phase.as_int(), down.phase.as_int()) {
                (Some(p_up), Some(p_down)) => super::transcript::next_phase(p_up) == p_down % 3,
                _ => true,
            };
            (matched, 0, 0)
        } else {
            self.match_boundary_phases(arena, up_idx, down_idx)
        };
        if !phase_matched && phase_required {
            return Err(Some(InvalidReason::Unphased));
        }

        Ok(FusionCandidate {
            id: 0,
            up: FusionEnd::from_entry(arena, self.db, up_idx, true),
            down: FusionEnd::from_entry(arena, self.db, down_idx, false),
            phase_matched,
            exons_skipped_up: skips_up,
            exons_skipped_down: skips_down,
            known,
            known_exons,
            high_impact_promiscuous: high_impact,
            chain: None,
            terminated_up: false,
            terminated_down: false,
            reportable: false,
        })
    }

    /// Rejection rules for the 5' transcript.
    fn check_upstream(
        &self,
        arena: &TxContextArena,
        up_idx: usize,
        known: KnownFusionMatch,
    ) -> PairCheck {
        let up = &arena.entries[up_idx];
        let up_tx = &self.db.transcripts[up.tx_idx];
        // A promoter-side or post-transcript breakend retains nothing /
        // everything of the transcript on the 5' side.
        if !up.is_within_transcript() {
            return Err(None);
        }
        if !up.disruptive && !known.is_known() {
            return Err(None);
        }
        if matches!(up_tx.biotype, Biotype::Pseudogene | Biotype::RetainedIntron)
            && !known.is_known()
        {
            return Err(None);
        }
        Ok(())
    }

    /// Rejection rules for the 3' transcript.
    fn check_downstream(&self, arena: &TxContextArena, down_idx: usize) -> PairCheck {
        let down = &arena.entries[down_idx];
        let down_tx = &self.db.transcripts[down.tx_idx];
        if down.coding == CodingContext::PostCoding {
            return Err(None);
        }
        if !down_tx.is_coding() || down_tx.exon_count() < 2 {
            return Err(None);
        }
        if down.region == RegionType::Downstream {
            return Err(None);
        }
        Ok(())
    }

    /// Coding-state compatibility matrix.
    fn check_coding_matrix(
        &self,
        arena: &TxContextArena,
        up_idx: usize,
        down_idx: usize,
        known: KnownFusionMatch,
    ) -> PairCheck {
        let up = &arena.entries[up_idx];
        let down = &arena.entries[down_idx];
        let same_gene = up.gene_idx == down.gene_idx;
        let reject = Err(Some(InvalidReason::CodingType));

        match up.coding {
            CodingContext::PreCoding => {
                if down.is_exonic() && !up.is_exonic() {
                    return reject;
                }
                if down.coding == CodingContext::Coding && !known.is_known() {
                    return reject;
                }
                if same_gene && down.coding == CodingContext::PreCoding {
                    return reject;
                }
            }
            CodingContext::Coding => {
                if down.coding == CodingContext::NonCoding {
                    return reject;
                }
                if down.coding == CodingContext::PreCoding && !known.is_known() {
                    return reject;
                }
                if up.is_exonic() {
                    let skipping_allowed = known.is_known();
                    let down_ok = down.is_exonic()
                        || (skipping_allowed && down.region == RegionType::Intronic);
                    if !down_ok {
                        return reject;
                    }
                    let up_variant = self.graph.breakends[up.breakend_id].variant_id;
                    let down_variant = self.graph.breakends[down.breakend_id].variant_id;
                    if up_variant != down_variant {
                        return reject;
                    }
                }
            }
            CodingContext::NonCoding => {
                if down.is_exonic() && !up.is_exonic() && !known.is_known() {
                    return reject;
                }
                if down.coding == CodingContext::Coding && !known.is_known() {
                    return reject;
                }
            }
            CodingContext::PostCoding => {
                return reject;
            }
            CodingContext::Enhancer => {}
        }
        Ok(())
    }

    /// Irrelevant self-fusion rules.
    fn check_same_gene(
        &self,
        arena: &TxContextArena,
        up_idx: usize,
        down_idx: usize,
    ) -> PairCheck {
        let up = &arena.entries[up_idx];
        let down = &arena.entries[down_idx];
        if up.gene_idx != down.gene_idx {
            return Ok(());
        }
        if up.tx_idx != down.tx_idx {
            return Err(None);
        }
        if up.coding == CodingContext::NonCoding {
            return Err(None);
        }
        if !up.is_exonic()
            && !down.is_exonic()
            && up.exon_upstream == down.exon_upstream
        {
            return Err(None);
        }
        Ok(())
    }

    /// Phase matching at the intron/exon boundary, optionally through
    /// skipping one additional exon per side.  Returns the match flag and
    /// the skip counts of the best (fewest skips) match.
    fn match_boundary_phases(
        &self,
        arena: &TxContextArena,
        up_idx: usize,
        down_idx: usize,
    ) -> (bool, u32, u32) {
        let up = &arena.entries[up_idx];
        let down = &arena.entries[down_idx];
        let up_tx = &self.db.transcripts[up.tx_idx];
        let down_tx = &self.db.transcripts[down.tx_idx];

        let ups = alternative_phases(up_tx, up, true);
        let downs = alternative_phases(down_tx, down, false);
        let mut best: Option<(u32, u32)> = None;
        for &(up_phase, skips_up) in &ups {
            for &(down_phase, skips_down) in &downs {
                if up_phase.matches(down_phase) {
                    let better = match best {
                        None => true,
                        Some((b_up, b_down)) => skips_up + skips_down < b_up + b_down,
                    };
                    if better {
                        best = Some((skips_up, skips_down));
                    }
                }
            }
        }
        match best {
            Some((skips_up, skips_down)) => (true, skips_up, skips_down),
            None => (false, 0, 0),
        }
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use crate::annotate::genes::{testing::*, Biotype, GeneDb};
    use crate::annotate::known::{testing::simple_entry, IgRegion, KnownFusionCache,
        KnownFusionEntry, KnownFusionType};
    use crate::annotate::schema::testing::*;
    use crate::annotate::schema::{SvGraph, SvType};
    use crate::common::Strand;

    use super::*;

    /// Two forward-strand genes on chromosome 1: AAA at 1000..9000 and BBB
    /// at 20000..29000, both coding with three exons.
    fn two_gene_db() -> GeneDb {
        let mut db = GeneDb::default();
        let gene_a = add_gene(&mut db, "AAA", 0, 1_000, 9_000, Strand::Forward);
        add_transcript(
            &mut db,
            gene_a,
            "AAA-201",
            true,
            Biotype::ProteinCoding,
            Some((2_050, 7_950)),
            &[(2_000, 2_100), (4_000, 4_100), (7_900, 8_000)],
        );
        let gene_b = add_gene(&mut db, "BBB", 0, 20_000, 29_000, Strand::Forward);
        add_transcript(
            &mut db,
            gene_b,
            "BBB-201",
            true,
            Biotype::ProteinCoding,
            Some((21_050, 26_050)),
            &[(21_000, 21_100), (23_000, 23_100), (26_000, 26_100)],
        );
        db.index();
        db
    }

    fn find(
        db: &GeneDb,
        graph: &SvGraph,
        cache: &KnownFusionCache,
        bnd_a: usize,
        bnd_b: usize,
    ) -> (Vec<FusionCandidate>, AnalysisContext) {
        let arena = TxContextArena::annotate_graph(graph, db);
        let finder = FusionFinder::new(graph, db, cache);
        let mut ctx = AnalysisContext::default();
        let result = finder.find_fusions(&arena, bnd_a, bnd_b, &mut ctx);
        (result, ctx)
    }

    #[test]
    fn intronic_breakends_yield_phase_matched_candidate() {
        let db = two_gene_db();
        let cache = KnownFusionCache::default();
        let mut graph = SvGraph::default();
        // AAA intron 1 (phase 0 at the exon 1 donor) to BBB intron 1
        // (phase 0 at the exon 2 acceptor).
        add_variant(&mut graph, 0, SvType::Del, 0, 3_000, 1, 22_000, -1);

        let (result, _) = find(&db, &graph, &cache, 0, 1);
        assert_eq!(result.len(), 1);
        let candidate = &result[0];
        assert_eq!(candidate.up.gene_name, "AAA");
        assert_eq!(candidate.down.gene_name, "BBB");
        assert!(candidate.phase_matched);
        assert_eq!(candidate.exons_skipped(), 0);
        assert_eq!(candidate.known, KnownFusionMatch::None);
    }

    #[test]
    fn same_orientation_pairs_are_skipped() {
        let db = two_gene_db();
        let cache = KnownFusionCache::default();
        let mut graph = SvGraph::default();
        // Both breakends orientation +1 on forward-strand genes: both ends
        // claim the 5' role.
        add_variant(&mut graph, 0, SvType::Inv, 0, 3_000, 1, 22_000, 1);

        let (result, ctx) = find(&db, &graph, &cache, 0, 1);
        assert!(result.is_empty());
        let reasons: Vec<_> = ctx.invalid_reasons().collect();
        assert_eq!(
            reasons,
            vec![(
                &("AAA".to_owned(), "BBB".to_owned()),
                &InvalidReason::Orientation
            )]
        );
    }

    #[test]
    fn candidates_never_share_the_upstream_role() {
        let db = two_gene_db();
        let cache = KnownFusionCache::default();
        let mut graph = SvGraph::default();
        add_variant(&mut graph, 0, SvType::Del, 0, 3_000, 1, 22_000, -1);

        let arena = TxContextArena::annotate_graph(&graph, &db);
        let finder = FusionFinder::new(&graph, &db, &cache);
        let mut ctx = AnalysisContext::default();
        for candidate in finder.find_fusions(&arena, 0, 1, &mut ctx) {
            let up = candidate.up.entry.map(|idx| arena.entries[idx].is_upstream);
            let down = candidate.down.entry.map(|idx| arena.entries[idx].is_upstream);
            assert_eq!(up, Some(true));
            assert_eq!(down, Some(false));
        }
    }

    #[test]
    fn exonic_exact_phase_match() {
        let db = two_gene_db();
        let cache = KnownFusionCache::default();
        let mut graph = SvGraph::default();
        // AAA exonic at 4050: phase (51 + 51) % 3 == 0.  BBB exonic at
        // 23021: phase (51 + 22) % 3 == 1.  (0 + 1) % 3 == 1, in frame.
        add_variant(&mut graph, 0, SvType::Del, 0, 4_050, 1, 23_021, -1);

        let (result, _) = find(&db, &graph, &cache, 0, 1);
        assert_eq!(result.len(), 1);
        assert!(result[0].phase_matched);
        assert!(result[0].up.exonic && result[0].down.exonic);
    }

    #[test]
    fn exonic_exact_phase_mismatch_is_discarded() {
        let db = two_gene_db();
        let cache = KnownFusionCache::default();
        let mut graph = SvGraph::default();
        // BBB exonic at 23020: phase (51 + 21) % 3 == 0, so the exact rule
        // (0 + 1) % 3 == 0 fails.
        add_variant(&mut graph, 0, SvType::Del, 0, 4_050, 1, 23_020, -1);

        let (result, ctx) = find(&db, &graph, &cache, 0, 1);
        assert!(result.is_empty());
        assert!(ctx
            .invalid_reasons()
            .any(|(_, reason)| *reason == InvalidReason::Unphased));
    }

    #[test]
    fn exonic_pair_across_variants_is_rejected() {
        let db = two_gene_db();
        let cache = KnownFusionCache::default();
        let mut graph = SvGraph::default();
        add_variant(&mut graph, 0, SvType::Bnd, 0, 4_050, 1, 100_000, -1);
        add_variant(&mut graph, 0, SvType::Bnd, 0, 23_021, -1, 110_000, 1);

        // Breakends 0 and 2 are exonic but belong to different variants.
        let (result, _) = find(&db, &graph, &cache, 0, 2);
        assert!(result.is_empty());
    }

    #[test]
    fn upstream_promoter_breakend_is_rejected() {
        let db = two_gene_db();
        let cache = KnownFusionCache::default();
        let mut graph = SvGraph::default();
        // Breakend 5' of the AAA transcript body retains no part of it.
        add_variant(&mut graph, 0, SvType::Del, 0, 1_500, 1, 22_000, -1);

        let (result, _) = find(&db, &graph, &cache, 0, 1);
        assert!(result.is_empty());
    }

    #[test]
    fn same_intron_self_fusion_is_rejected() {
        let db = two_gene_db();
        let cache = KnownFusionCache::default();
        let mut graph = SvGraph::default();
        // Duplication within AAA intron 1: 3' role at the lower breakend,
        // 5' role at the upper one, same intron on both sides.
        add_variant(&mut graph, 0, SvType::Dup, 0, 2_500, -1, 3_500, 1);

        let (result, _) = find(&db, &graph, &cache, 0, 1);
        assert!(result.is_empty());
    }

    #[test]
    fn known_pair_kept_despite_phase_mismatch() {
        let db = two_gene_db();
        let mut cache = KnownFusionCache::default();
        cache.add(simple_entry(KnownFusionType::KnownPair, "AAA", "BBB"));
        let mut graph = SvGraph::default();
        add_variant(&mut graph, 0, SvType::Del, 0, 4_050, 1, 23_020, -1);

        let (result, _) = find(&db, &graph, &cache, 0, 1);
        assert_eq!(result.len(), 1);
        assert!(!result[0].phase_matched);
        assert_eq!(result[0].known, KnownFusionMatch::KnownPair);
    }

    #[test]
    fn ig_region_breakend_yields_synthetic_candidate() {
        let db = two_gene_db();
        let mut cache = KnownFusionCache::default();
        cache.add(KnownFusionEntry {
            ig_region: Some(IgRegion {
                chrom_no: 1,
                start: 50_000,
                end: 60_000,
                strand: Strand::Forward,
            }),
            ..simple_entry(KnownFusionType::IgKnownPair, "IGH", "BBB")
        });
        let mut graph = SvGraph::default();
        add_variant(&mut graph, 0, SvType::Bnd, 0, 22_000, -1, 55_000, 1);
        graph.breakends[1].chrom_no = 1;

        let (result, _) = find(&db, &graph, &cache, 1, 0);
        assert_eq!(result.len(), 1);
        let candidate = &result[0];
        assert_eq!(candidate.up.gene_name, "IGH");
        assert_eq!(candidate.up.coding, CodingContext::Enhancer);
        assert_eq!(candidate.down.gene_name, "BBB");
        assert_eq!(candidate.known, KnownFusionMatch::IgKnownPair);
        assert!(candidate.phase_matched);
    }

    #[test]
    fn dedup_keeps_first_candidate() {
        let db = two_gene_db();
        let cache = KnownFusionCache::default();
        let mut graph = SvGraph::default();
        add_variant(&mut graph, 0, SvType::Del, 0, 3_000, 1, 22_000, -1);

        let arena = TxContextArena::annotate_graph(&graph, &db);
        let finder = FusionFinder::new(&graph, &db, &cache);
        let mut ctx = AnalysisContext::default();
        let mut once = finder.find_fusions(&arena, 0, 1, &mut ctx);
        let twice = {
            let mut both = once.clone();
            both.extend(finder.find_fusions(&arena, 0, 1, &mut ctx));
            dedup_candidates(both)
        };
        once = dedup_candidates(once);
        assert_eq!(once.len(), twice.len());
        assert_eq!(once[0].dedup_key(), twice[0].dedup_key());
    }
}
