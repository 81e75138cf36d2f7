//! Reportability gate and priority ranking of fusion candidates.
//!
//! Reportability is a boolean gate computed per candidate; ranking then
//! picks one candidate per gene pair using an integer score built from
//! strictly descending weight tiers, so that any higher-tier factor
//! dominates all lower tiers combined.

use super::{
    chain::{FUSION_MAX_CHAIN_LENGTH, FUSION_MAX_CHAIN_LINKS},
    fusion::{
        FusionCandidate, MAX_UPSTREAM_DISTANCE_KNOWN, MAX_UPSTREAM_DISTANCE_OTHER,
        SHORT_UNPHASED_DISTANCE_KNOWN,
    },
    genes::{Biotype, GeneDb},
    known::KnownFusionMatch,
    schema::SvGraph,
    transcript::TxContextArena,
};

/// Ranker for one sample's fusion candidates.
#[derive(Debug)]
pub struct FusionRanker<'a> {
    /// The sample's SV graph.
    pub graph: &'a SvGraph,
    /// The annotation database.
    pub db: &'a GeneDb,
}

impl<'a> FusionRanker<'a> {
    /// Construct a new ranker.
    pub fn new(graph: &'a SvGraph, db: &'a GeneDb) -> Self {
        FusionRanker { graph, db }
    }

    /// Compute the reportable flag for every candidate.
    pub fn apply(&self, arena: &TxContextArena, candidates: &mut [FusionCandidate]) {
        for candidate in candidates.iter_mut() {
            candidate.reportable = self.is_reportable(arena, candidate);
        }
    }

    /// The best candidate among those sharing one gene pair; ties keep the
    /// first-seen candidate.
    pub fn rank(&self, arena: &TxContextArena, group: &[FusionCandidate]) -> Option<usize> {
        let mut best: Option<(usize, i64)> = None;
        for (idx, candidate) in group.iter().enumerate() {
            let score = self.priority_score(arena, candidate);
            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((idx, score));
            }
        }
        best.map(|(idx, _)| idx)
    }

    /// The reportability gate.
    pub fn is_reportable(&self, arena: &TxContextArena, candidate: &FusionCandidate) -> bool {
        if !candidate.known.is_known() {
            return false;
        }
        let suspect_allowed = candidate.known.suspect_chains_allowed();

        if !candidate.phase_matched && !self.unphased_exception(candidate) {
            return false;
        }

        // Single-ended breakends only support exact curated pairings.
        let single_ended = [candidate.up.breakend_id, candidate.down.breakend_id]
            .iter()
            .any(|&bnd_id| {
                self.graph.variants[self.graph.breakends[bnd_id].variant_id].is_sgl()
            });
        if single_ended && !candidate.known.is_exact_pairing() {
            return false;
        }

        if let Some(down_idx) = candidate.down.entry {
            let down = &arena.entries[down_idx];
            // A 3' breakend upstream of its gene must be close enough to
            // the promoter, and never past the first acceptor.
            if let Some(distance) = down.acceptor_distance {
                if distance < 0 {
                    return false;
                }
                let limit = if candidate.known.is_exact_pairing()
                    || candidate.high_impact_promiscuous
                {
                    MAX_UPSTREAM_DISTANCE_KNOWN
                } else {
                    MAX_UPSTREAM_DISTANCE_OTHER
                };
                if distance > limit {
                    return false;
                }
            }
            if self.db.transcripts[down.tx_idx].biotype == Biotype::NonsenseMediatedDecay {
                return false;
            }
        }

        if candidate.exons_skipped() > 0 && !candidate.known.is_exact_pairing() {
            return false;
        }

        if (candidate.terminated_up || candidate.terminated_down) && !suspect_allowed {
            return false;
        }

        // A junction that disrupts neither transcript fuses nothing.
        if let (Some(up_idx), Some(down_idx)) = (candidate.up.entry, candidate.down.entry) {
            if !arena.entries[up_idx].disruptive && !arena.entries[down_idx].disruptive {
                return false;
            }
        }

        if let Some(info) = candidate.chain {
            if !info.valid_traversal && !suspect_allowed {
                return false;
            }
            if info.length > FUSION_MAX_CHAIN_LENGTH && !suspect_allowed {
                return false;
            }
            if info.link_count > FUSION_MAX_CHAIN_LINKS {
                return false;
            }
        }

        true
    }

    /// Narrow exceptions that keep an unphased candidate reportable.
    fn unphased_exception(&self, candidate: &FusionCandidate) -> bool {
        let up_bnd = &self.graph.breakends[candidate.up.breakend_id];
        let down_bnd = &self.graph.breakends[candidate.down.breakend_id];
        match candidate.known {
            KnownFusionMatch::KnownPair => {
                up_bnd.chrom_no == down_bnd.chrom_no
                    && (up_bnd.pos - down_bnd.pos).abs() <= SHORT_UNPHASED_DISTANCE_KNOWN
            }
            KnownFusionMatch::ExonDelDup => candidate.up.exonic && candidate.down.exonic,
            _ => false,
        }
    }

    /// Deterministic priority score from strictly descending weight tiers.
    pub fn priority_score(&self, arena: &TxContextArena, candidate: &FusionCandidate) -> i64 {
        let tier = |score: i64, value: bool| score * 10 + i64::from(value);
        let bucket_tier = |score: i64, bucket: i64| score * 100 + bucket;

        let (up_canonical, up_protein_coding, up_bucket) =
            self.tx_factors(arena, candidate.up.entry);
        let (down_canonical, down_protein_coding, down_bucket) =
            self.tx_factors(arena, candidate.down.entry);
        let down_not_nmd = candidate
            .down
            .entry
            .map(|idx| {
                self.db.transcripts[arena.entries[idx].tx_idx].biotype
                    != Biotype::NonsenseMediatedDecay
            })
            .unwrap_or(true);
        let chain_clean = !candidate.terminated_up
            && !candidate.terminated_down
            && candidate.chain.map_or(true, |info| info.valid_traversal);

        let mut score = 0i64;
        score = tier(score, candidate.reportable);
        score = tier(
            score,
            matches!(
                candidate.known,
                KnownFusionMatch::KnownPair | KnownFusionMatch::ExonDelDup
            ),
        );
        score = tier(score, candidate.phase_matched);
        score = tier(score, chain_clean);
        score = tier(score, down_protein_coding);
        score = tier(score, candidate.exons_skipped() == 0);
        score = tier(score, down_canonical);
        score = tier(score, down_not_nmd);
        score = bucket_tier(score, down_bucket);
        score = tier(score, up_canonical);
        score = tier(score, up_protein_coding);
        score = bucket_tier(score, up_bucket);
        score
    }

    /// Canonical flag, protein-coding flag and coding-length bucket of the
    /// transcript behind an arena entry; defaults for synthetic ends.
    fn tx_factors(&self, arena: &TxContextArena, entry: Option<usize>) -> (bool, bool, i64) {
        match entry {
            None => (false, false, 0),
            Some(idx) => {
                let tx = &self.db.transcripts[arena.entries[idx].tx_idx];
                (
                    tx.canonical,
                    tx.biotype == Biotype::ProteinCoding,
                    (tx.total_coding_bases / 100).min(99),
                )
            }
        }
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use crate::annotate::fusion::{AnalysisContext, ChainInfo, FusionFinder};
    use crate::annotate::genes::{testing::*, Biotype, GeneDb};
    use crate::annotate::known::{testing::simple_entry, KnownFusionCache, KnownFusionType};
    use crate::annotate::schema::testing::*;
    use crate::annotate::schema::{SvGraph, SvType};
    use crate::annotate::transcript::TxContextArena;
    use crate::common::Strand;

    use super::*;

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

    /// One phase-matched AAA -> BBB candidate from intron 1 to intron 1.
    fn candidate_fixture(
        db: &GeneDb,
        cache: &KnownFusionCache,
    ) -> (SvGraph, TxContextArena, Vec<FusionCandidate>) {
        let mut graph = SvGraph::default();
        add_variant(&mut graph, 0, SvType::Del, 0, 3_000, 1, 22_000, -1);
        let arena = TxContextArena::annotate_graph(&graph, db);
        let finder = FusionFinder::new(&graph, db, cache);
        let mut ctx = AnalysisContext::default();
        let candidates = finder.find_fusions(&arena, 0, 1, &mut ctx);
        (graph, arena, candidates)
    }

    #[test]
    fn known_pair_is_reportable() {
        let db = two_gene_db();
        let mut cache = KnownFusionCache::default();
        cache.add(simple_entry(KnownFusionType::KnownPair, "AAA", "BBB"));
        let (graph, arena, mut candidates) = candidate_fixture(&db, &cache);
        assert_eq!(candidates.len(), 1);

        let ranker = FusionRanker::new(&graph, &db);
        ranker.apply(&arena, &mut candidates);
        assert!(candidates[0].reportable);
    }

    #[test]
    fn unknown_pair_is_not_reportable() {
        let db = two_gene_db();
        let cache = KnownFusionCache::default();
        let (graph, arena, mut candidates) = candidate_fixture(&db, &cache);
        assert_eq!(candidates.len(), 1);

        let ranker = FusionRanker::new(&graph, &db);
        ranker.apply(&arena, &mut candidates);
        assert!(!candidates[0].reportable);
    }

    #[test]
    fn nmd_downstream_is_not_reportable() {
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
            Biotype::NonsenseMediatedDecay,
            Some((21_050, 26_050)),
            &[(21_000, 21_100), (23_000, 23_100), (26_000, 26_100)],
        );
        db.index();
        let mut cache = KnownFusionCache::default();
        cache.add(simple_entry(KnownFusionType::KnownPair, "AAA", "BBB"));
        let (graph, arena, mut candidates) = candidate_fixture(&db, &cache);
        assert_eq!(candidates.len(), 1);

        let ranker = FusionRanker::new(&graph, &db);
        ranker.apply(&arena, &mut candidates);
        assert!(!candidates[0].reportable);
    }

    /// AAA plus a partner gene whose coding region only begins in exon 3,
    /// so breakends in introns 1 and 2 are pre-coding with an acceptor
    /// distance.
    fn late_coding_partner_db() -> GeneDb {
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
        let gene_d = add_gene(&mut db, "DDD", 0, 20_000, 29_000, Strand::Forward);
        add_transcript(
            &mut db,
            gene_d,
            "DDD-201",
            true,
            Biotype::ProteinCoding,
            Some((26_020, 26_080)),
            &[(21_000, 21_100), (23_000, 23_100), (26_000, 26_100)],
        );
        db.index();
        db
    }

    #[test]
    fn downstream_breakend_past_first_acceptor_is_not_reportable() {
        let db = late_coding_partner_db();
        let mut cache = KnownFusionCache::default();
        cache.add(simple_entry(KnownFusionType::KnownPair, "AAA", "DDD"));

        // DDD intron 2 lies past the first splice acceptor at 23000.
        let mut graph = SvGraph::default();
        add_variant(&mut graph, 0, SvType::Bnd, 0, 3_000, 1, 24_000, -1);
        let arena = TxContextArena::annotate_graph(&graph, &db);
        let finder = FusionFinder::new(&graph, &db, &cache);
        let mut ctx = AnalysisContext::default();
        let mut candidates = finder.find_fusions(&arena, 0, 1, &mut ctx);
        assert_eq!(candidates.len(), 1);

        let ranker = FusionRanker::new(&graph, &db);
        ranker.apply(&arena, &mut candidates);
        assert!(!candidates[0].reportable);

        // DDD intron 1 is still ahead of the acceptor and close enough.
        let mut graph = SvGraph::default();
        add_variant(&mut graph, 0, SvType::Bnd, 0, 3_000, 1, 22_000, -1);
        let arena = TxContextArena::annotate_graph(&graph, &db);
        let finder = FusionFinder::new(&graph, &db, &cache);
        let mut candidates = finder.find_fusions(&arena, 0, 1, &mut ctx);
        assert_eq!(candidates.len(), 1);

        let ranker = FusionRanker::new(&graph, &db);
        ranker.apply(&arena, &mut candidates);
        assert!(candidates[0].reportable);
    }

    #[test]
    fn over_long_chain_reportable_only_for_suspect_allowed_types() {
        let db = two_gene_db();
        let mut cache = KnownFusionCache::default();
        cache.add(simple_entry(KnownFusionType::KnownPair, "AAA", "BBB"));
        let (graph, arena, mut candidates) = candidate_fixture(&db, &cache);
        candidates[0].chain = Some(ChainInfo {
            chain_id: 0,
            link_count: 2,
            length: 200_000,
            valid_traversal: true,
        });

        let ranker = FusionRanker::new(&graph, &db);
        ranker.apply(&arena, &mut candidates);
        assert!(candidates[0].reportable);

        // Promiscuous matches are known but not in the suspect-allowed set.
        let mut cache = KnownFusionCache::default();
        cache.add(simple_entry(KnownFusionType::PromiscuousFive, "AAA", ""));
        let (graph, arena, mut candidates) = candidate_fixture(&db, &cache);
        assert_eq!(candidates.len(), 1);
        candidates[0].chain = Some(ChainInfo {
            chain_id: 0,
            link_count: 2,
            length: 200_000,
            valid_traversal: true,
        });
        let ranker = FusionRanker::new(&graph, &db);
        ranker.apply(&arena, &mut candidates);
        assert!(!candidates[0].reportable);
    }

    #[test]
    fn link_count_limit_has_no_exception() {
        let db = two_gene_db();
        let mut cache = KnownFusionCache::default();
        cache.add(simple_entry(KnownFusionType::KnownPair, "AAA", "BBB"));
        let (graph, arena, mut candidates) = candidate_fixture(&db, &cache);
        candidates[0].chain = Some(ChainInfo {
            chain_id: 0,
            link_count: 5,
            length: 1_000,
            valid_traversal: true,
        });

        let ranker = FusionRanker::new(&graph, &db);
        ranker.apply(&arena, &mut candidates);
        assert!(!candidates[0].reportable);
    }

    #[test]
    fn reportable_dominates_priority() {
        let db = two_gene_db();
        let mut cache = KnownFusionCache::default();
        cache.add(simple_entry(KnownFusionType::KnownPair, "AAA", "BBB"));
        let (graph, arena, mut candidates) = candidate_fixture(&db, &cache);
        let ranker = FusionRanker::new(&graph, &db);
        ranker.apply(&arena, &mut candidates);

        let mut unreportable = candidates[0].clone();
        unreportable.reportable = false;
        let group = vec![unreportable, candidates[0].clone()];
        assert_eq!(ranker.rank(&arena, &group), Some(1));
    }

    #[test]
    fn phase_match_outranks_out_of_frame() {
        let db = two_gene_db();
        let cache = KnownFusionCache::default();
        let (graph, arena, candidates) = candidate_fixture(&db, &cache);
        let ranker = FusionRanker::new(&graph, &db);

        let mut out_of_frame = candidates[0].clone();
        out_of_frame.phase_matched = false;
        assert!(
            ranker.priority_score(&arena, &candidates[0])
                > ranker.priority_score(&arena, &out_of_frame)
        );
    }

    #[test]
    fn ties_keep_first_seen() {
        let db = two_gene_db();
        let cache = KnownFusionCache::default();
        let (graph, arena, candidates) = candidate_fixture(&db, &cache);
        let ranker = FusionRanker::new(&graph, &db);

        let group = vec![candidates[0].clone(), candidates[0].clone()];
        assert_eq!(ranker.rank(&arena, &group), Some(0));
    }
}
