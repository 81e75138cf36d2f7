//! Classification of breakends as transcript-disruptive or not.
//!
//! Every breakend inside a transcript starts out disruptive; the classifier
//! then suppresses the cases that leave splicing intact (rearrangements that
//! stay within one intron, LINE insertions, short templated insertions and
//! chains that return to the same intron).  Suppression is monotonic: the
//! disruptive flag only ever transitions from `true` to `false` within one
//! classification pass.

use std::collections::HashSet;

use tracing::warn;

use crate::common::Strand;

use super::{
    genes::GeneDb,
    schema::{ResolvedType, SvGraph, SvType},
    transcript::TxContextArena,
    traversal::traverses_gene,
};

/// Maximum cumulative length of chain segments that can return to the same
/// intron without disrupting it.
pub const MAX_NON_DISRUPTED_CHAIN_LENGTH: i64 = 5_000;

/// Classifier for per-transcript disruptiveness of one sample's variants.
#[derive(Debug)]
pub struct DisruptionClassifier<'a> {
    /// The sample's SV graph.
    pub graph: &'a SvGraph,
    /// The annotation database.
    pub db: &'a GeneDb,
}

impl<'a> DisruptionClassifier<'a> {
    /// Construct a new classifier.
    pub fn new(graph: &'a SvGraph, db: &'a GeneDb) -> Self {
        DisruptionClassifier { graph, db }
    }

    /// Classify every variant of the graph and mark reportable disruptions.
    pub fn classify_all(&self, arena: &mut TxContextArena) {
        for variant_id in 0..self.graph.variants.len() {
            self.classify(variant_id, arena);
        }
        for entry in arena.entries.iter_mut() {
            entry.reportable_disruption = entry.disruptive
                && entry.is_within_transcript()
                && self.db.transcripts[entry.tx_idx].canonical;
        }
    }

    /// Classify one variant, mutating the disruptive flags of all touched
    /// transcript entries.
    pub fn classify(&self, variant_id: usize, arena: &mut TxContextArena) {
        let variant = &self.graph.variants[variant_id];
        self.assign_undisrupted_copy_number(variant_id, arena);

        let cluster = &self.graph.clusters[variant.cluster_id];
        if cluster.resolved_type == ResolvedType::Line {
            self.suppress_line_insertion(variant_id, arena);
        }

        if variant.is_sgl() {
            return;
        }

        if cluster.is_simple() {
            self.suppress_simple_intronic(variant_id, arena);
        }

        self.suppress_templated_insertions(variant_id, arena);
        self.suppress_chain_returns(variant_id, arena);
    }

    /// Compute and store the undisrupted copy number on every canonical
    /// transcript entry of the variant's breakends.
    fn assign_undisrupted_copy_number(&self, variant_id: usize, arena: &mut TxContextArena) {
        let variant = &self.graph.variants[variant_id];
        for bnd_id in variant.breakend_ids() {
            let bnd = &self.graph.breakends[bnd_id];
            let mut undisrupted = bnd.copy_number_lowside;
            if let (Some(partner), Some(db_length)) = (bnd.db_partner, bnd.db_length) {
                if db_length < 0 {
                    undisrupted -= self.graph.breakends[partner].junction_copy_number;
                }
            }

            for (gene_idx, _) in arena.genes_at(bnd_id) {
                let Some(canonical_tx) = self.db.canonical_transcript(gene_idx) else {
                    warn!(
                        "no canonical transcript for gene {}, skipping copy number",
                        self.db.genes[gene_idx].name
                    );
                    continue;
                };
                if let Some(entry_idx) = arena.lookup(bnd_id, canonical_tx) {
                    arena.entries[entry_idx].undisrupted_copy_number = Some(undisrupted);
                }
            }
        }
    }

    /// An inserted LINE shard cannot disrupt a gene it lands inside.
    fn suppress_line_insertion(&self, variant_id: usize, arena: &mut TxContextArena) {
        let variant = &self.graph.variants[variant_id];
        for bnd_id in variant.breakend_ids() {
            for &entry_idx in arena.entries_at(bnd_id).to_vec().iter() {
                if !arena.entries[entry_idx].is_exonic() {
                    arena.entries[entry_idx].disruptive = false;
                }
            }
        }
    }

    /// A simple DEL/DUP/INS with both ends in the same intron of the same
    /// transcript changes no splicing.
    fn suppress_simple_intronic(&self, variant_id: usize, arena: &mut TxContextArena) {
        let variant = &self.graph.variants[variant_id];
        let Some(bnd_end) = variant.bnd_end else {
            return;
        };
        let bnd_start = variant.bnd_start;
        let is_dup = variant.sv_type == SvType::Dup;

        for &start_idx in arena.entries_at(bnd_start).to_vec().iter() {
            let tx_idx = arena.entries[start_idx].tx_idx;
            let Some(end_idx) = arena.lookup(bnd_end, tx_idx) else {
                continue;
            };
            let start_entry = &arena.entries[start_idx];
            let end_entry = &arena.entries[end_idx];

            let same_intron = start_entry.exon_upstream == end_entry.exon_upstream
                && !start_entry.is_exonic()
                && !end_entry.is_exonic();

            // A duplication around the first exon changes no splicing either.
            let dup_around_first = is_dup && {
                let strand = self.db.genes[start_entry.gene_idx].strand;
                let (five, three) = if strand == Strand::Forward {
                    (start_entry, end_entry)
                } else {
                    (end_entry, start_entry)
                };
                five.exon_upstream == 1 && !five.is_exonic() && three.exon_downstream <= 2
            };

            if same_intron || dup_around_first {
                arena.entries[start_idx].disruptive = false;
                arena.entries[end_idx].disruptive = false;
            }
        }
    }

    /// A templated-insertion segment wholly inside one intron, with both
    /// remote ends non-genic, does not disrupt the intron.
    fn suppress_templated_insertions(&self, variant_id: usize, arena: &mut TxContextArena) {
        let variant = &self.graph.variants[variant_id];
        for bnd_id in variant.breakend_ids() {
            if !self.has_disruptive(bnd_id, arena) {
                continue;
            }
            // The remote end of this variant must be non-genic.
            if !self.other_end_non_genic(bnd_id, arena) {
                continue;
            }
            for (chain_id, link_idx) in self.graph.links_with_breakend(bnd_id) {
                let link = self.graph.chains[chain_id].links[link_idx];
                let Some(other_bnd) = link.opposing(bnd_id) else {
                    continue;
                };
                if !self.other_end_non_genic(other_bnd, arena) {
                    continue;
                }
                let (chrom_no, lower, upper) = link.interval(self.graph);
                if traverses_gene(self.db, chrom_no, lower, upper, 0, false) {
                    continue;
                }
                self.suppress_matching(bnd_id, other_bnd, arena);
            }
        }
    }

    /// Walk outward from each breakend of the variant through its chains;
    /// a short, acceptor-free path back to an opposite-orientation breakend
    /// in the same intron leaves the transcript intact.
    fn suppress_chain_returns(&self, variant_id: usize, arena: &mut TxContextArena) {
        let variant = &self.graph.variants[variant_id];
        for bnd_id in variant.breakend_ids() {
            if !self.has_disruptive(bnd_id, arena) {
                continue;
            }
            // The chain may link the breakend directly or its variant
            // partner; both are entry points for the outward walk.
            let mut seeds = vec![bnd_id];
            seeds.extend(self.graph.other_breakend(bnd_id));
            for seed in seeds {
                for (chain_id, link_idx) in self.graph.links_with_breakend(seed) {
                    self.walk_chain_return(bnd_id, seed, chain_id, link_idx, arena);
                    if !self.has_disruptive(bnd_id, arena) {
                        return;
                    }
                }
            }
        }
    }

    /// One outward walk along a chain, alternating link traversals with
    /// variant junction crossings and accumulating traversed length.
    fn walk_chain_return(
        &self,
        start_bnd_id: usize,
        seed: usize,
        chain_id: usize,
        start_link: usize,
        arena: &mut TxContextArena,
    ) {
        let chain = &self.graph.chains[chain_id];
        let mut visited = HashSet::new();
        let mut total_length = 0i64;
        let mut current = seed;
        let mut link_idx = start_link;

        loop {
            if !visited.insert(link_idx) {
                return;
            }
            let link = chain.links[link_idx];
            let (chrom_no, lower, upper) = link.interval(self.graph);
            // Crossing any splice acceptor makes the chain disruptive from
            // here on.
            if traverses_gene(self.db, chrom_no, lower, upper, 0, false) {
                return;
            }
            total_length += link.length(self.graph);
            if total_length > MAX_NON_DISRUPTED_CHAIN_LENGTH {
                return;
            }

            let Some(far) = link.opposing(current) else {
                warn!("chain {} link {} does not continue the walk", chain_id, link_idx);
                return;
            };
            self.check_return(start_bnd_id, far, arena);
            if !self.has_disruptive(start_bnd_id, arena) {
                return;
            }

            let Some(next) = self.graph.other_breakend(far) else {
                return;
            };
            self.check_return(start_bnd_id, next, arena);
            if !self.has_disruptive(start_bnd_id, arena) {
                return;
            }

            current = next;
            let Some(next_link) = chain
                .links
                .iter()
                .enumerate()
                .find(|(idx, link)| !visited.contains(idx) && link.opposing(current).is_some())
                .map(|(idx, _)| idx)
            else {
                return;
            };
            link_idx = next_link;
        }
    }

    /// Whether the walk arrived at a breakend facing the start breakend on
    /// the same chromosome; if so, suppress shared intronic transcripts.
    fn check_return(&self, start_bnd_id: usize, candidate: usize, arena: &mut TxContextArena) {
        if candidate == start_bnd_id {
            return;
        }
        let start = &self.graph.breakends[start_bnd_id];
        let cand = &self.graph.breakends[candidate];
        if cand.orientation != start.orientation && cand.chrom_no == start.chrom_no {
            self.suppress_matching(start_bnd_id, candidate, arena);
        }
    }

    /// Mark transcripts shared between the two breakends, in the same
    /// intron on both sides, as non-disruptive.
    fn suppress_matching(&self, bnd_a: usize, bnd_b: usize, arena: &mut TxContextArena) {
        for &idx_a in arena.entries_at(bnd_a).to_vec().iter() {
            let tx_idx = arena.entries[idx_a].tx_idx;
            let Some(idx_b) = arena.lookup(bnd_b, tx_idx) else {
                continue;
            };
            let entry_a = &arena.entries[idx_a];
            let entry_b = &arena.entries[idx_b];
            if entry_a.exon_upstream == entry_b.exon_upstream
                && !entry_a.is_exonic()
                && !entry_b.is_exonic()
            {
                arena.entries[idx_a].disruptive = false;
                arena.entries[idx_b].disruptive = false;
            }
        }
    }

    /// Whether the breakend still has disruptive transcript entries.
    fn has_disruptive(&self, bnd_id: usize, arena: &TxContextArena) -> bool {
        arena
            .entries_at(bnd_id)
            .iter()
            .any(|&idx| arena.entries[idx].disruptive)
    }

    /// Whether the partner breakend of the same variant is outside of any
    /// gene (or the variant is single-ended).
    fn other_end_non_genic(&self, bnd_id: usize, arena: &TxContextArena) -> bool {
        match self.graph.other_breakend(bnd_id) {
            None => true,
            Some(partner) => arena
                .entries_at(partner)
                .iter()
                .all(|&idx| !arena.entries[idx].is_within_transcript()),
        }
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use crate::annotate::genes::{testing::*, Biotype, GeneDb};
    use crate::annotate::schema::testing::*;
    use crate::annotate::schema::{LinkedPair, ResolvedType, SvGraph, SvType};
    use crate::annotate::transcript::TxContextArena;
    use crate::common::Strand;

    use super::*;

    /// Gene on chromosome 1 at 900..6000 with one intron from 960 to 4890.
    fn one_intron_db() -> GeneDb {
        let mut db = GeneDb::default();
        let gene = add_gene(&mut db, "AAA", 0, 900, 6_000, Strand::Forward);
        add_transcript(
            &mut db,
            gene,
            "AAA-201",
            true,
            Biotype::ProteinCoding,
            Some((920, 5_800)),
            &[(900, 960), (4_890, 6_000)],
        );
        db.index();
        db
    }

    #[test]
    fn simple_deletion_within_intron_not_disruptive() {
        let db = one_intron_db();
        let mut graph = SvGraph::default();
        let variant = add_variant(&mut graph, 0, SvType::Del, 0, 1_000, 1, 4_500, -1);
        graph.clusters[0].resolved_type = ResolvedType::Del;

        let mut arena = TxContextArena::annotate_graph(&graph, &db);
        assert!(arena.entries.iter().all(|e| e.disruptive));

        DisruptionClassifier::new(&graph, &db).classify(variant, &mut arena);
        assert!(arena.entries.iter().all(|e| !e.disruptive));
    }

    #[test]
    fn simple_deletion_across_exon_stays_disruptive() {
        let db = one_intron_db();
        let mut graph = SvGraph::default();
        // End breakend is past the second exon's start.
        let variant = add_variant(&mut graph, 0, SvType::Del, 0, 1_000, 1, 5_000, -1);
        graph.clusters[0].resolved_type = ResolvedType::Del;

        let mut arena = TxContextArena::annotate_graph(&graph, &db);
        DisruptionClassifier::new(&graph, &db).classify(variant, &mut arena);
        assert!(arena.entries.iter().any(|e| e.disruptive));
    }

    #[test]
    fn complex_cluster_gets_no_simple_suppression() {
        let db = one_intron_db();
        let mut graph = SvGraph::default();
        let variant = add_variant(&mut graph, 0, SvType::Del, 0, 1_000, 1, 4_500, -1);
        graph.clusters[0].resolved_type = ResolvedType::Complex;

        let mut arena = TxContextArena::annotate_graph(&graph, &db);
        DisruptionClassifier::new(&graph, &db).classify(variant, &mut arena);
        assert!(arena.entries.iter().all(|e| e.disruptive));
    }

    #[test]
    fn line_insertion_suppresses_intronic() {
        let db = one_intron_db();
        let mut graph = SvGraph::default();
        let variant = add_variant(&mut graph, 0, SvType::Bnd, 0, 1_000, 1, 100_000, -1);
        graph.clusters[0].resolved_type = ResolvedType::Line;

        let mut arena = TxContextArena::annotate_graph(&graph, &db);
        DisruptionClassifier::new(&graph, &db).classify(variant, &mut arena);
        assert!(arena.entries.iter().all(|e| !e.disruptive));
    }

    #[test]
    fn dup_around_first_exon_not_disruptive() {
        let mut db = GeneDb::default();
        let gene = add_gene(&mut db, "BBB", 0, 1_000, 9_000, Strand::Forward);
        add_transcript(
            &mut db,
            gene,
            "BBB-201",
            true,
            Biotype::ProteinCoding,
            Some((1_100, 8_900)),
            &[(1_000, 1_200), (3_000, 3_200), (8_800, 9_000)],
        );
        db.index();

        let mut graph = SvGraph::default();
        // Duplication with the lower breakend in intron 1 and the upper
        // breakend within exon 2.
        let variant = add_variant(&mut graph, 0, SvType::Dup, 0, 2_000, -1, 3_100, 1);
        graph.clusters[0].resolved_type = ResolvedType::Dup;

        let mut arena = TxContextArena::annotate_graph(&graph, &db);
        DisruptionClassifier::new(&graph, &db).classify(variant, &mut arena);
        assert!(arena.entries.iter().all(|e| !e.disruptive));
    }

    #[test]
    fn templated_insertion_within_intron_not_disruptive() {
        let db = one_intron_db();
        let mut graph = SvGraph::default();
        // Two translocations whose remote ends are non-genic, linked through
        // a 200 base segment inside the intron.
        let v1 = add_variant(&mut graph, 0, SvType::Bnd, 0, 3_000, 1, 0, 0);
        let v2 = add_variant(&mut graph, 0, SvType::Bnd, 0, 3_200, -1, 0, 0);
        // Remote ends on chromosome 2, far from any gene.
        graph.breakends[1].chrom_no = 1;
        graph.breakends[1].pos = 50_000;
        graph.breakends[1].orientation = -1;
        graph.breakends[3].chrom_no = 1;
        graph.breakends[3].pos = 50_100;
        graph.breakends[3].orientation = 1;
        graph.clusters[0].resolved_type = ResolvedType::Complex;
        graph.chains.push(crate::annotate::schema::Chain {
            cluster_id: 0,
            links: vec![LinkedPair {
                first: 0,
                second: 2,
                assembled: true,
            }],
            is_closed: false,
        });
        graph.clusters[0].chains.push(0);

        let mut arena = TxContextArena::annotate_graph(&graph, &db);
        let classifier = DisruptionClassifier::new(&graph, &db);
        classifier.classify(v1, &mut arena);
        classifier.classify(v2, &mut arena);
        assert!(arena.entries.iter().all(|e| !e.disruptive));
    }

    #[test]
    fn chain_return_to_intron_not_disruptive() {
        let db = one_intron_db();
        let mut graph = SvGraph::default();
        // A shard from chromosome 2 is inserted into the intron: breakends
        // at 3000 (+1) and 3200 (-1) with a short linked segment between
        // their remote ends.
        let v1 = add_variant(&mut graph, 0, SvType::Bnd, 0, 3_000, 1, 0, 0);
        let v2 = add_variant(&mut graph, 0, SvType::Bnd, 0, 3_200, -1, 0, 0);
        graph.breakends[1].chrom_no = 1;
        graph.breakends[1].pos = 50_000;
        graph.breakends[1].orientation = -1;
        graph.breakends[3].chrom_no = 1;
        graph.breakends[3].pos = 50_100;
        graph.breakends[3].orientation = 1;
        graph.clusters[0].resolved_type = ResolvedType::Complex;
        // Chain: ... 3000 ] -- (v1) -- [ 50000 .. 50100 ] -- (v2) -- [ 3200 ...
        graph.chains.push(crate::annotate::schema::Chain {
            cluster_id: 0,
            links: vec![LinkedPair {
                first: 1,
                second: 3,
                assembled: true,
            }],
            is_closed: false,
        });
        graph.clusters[0].chains.push(0);

        let mut arena = TxContextArena::annotate_graph(&graph, &db);
        let classifier = DisruptionClassifier::new(&graph, &db);
        classifier.classify(v1, &mut arena);
        classifier.classify(v2, &mut arena);
        assert!(arena.entries.iter().all(|e| !e.disruptive));
    }

    #[test]
    fn chain_return_over_length_limit_stays_disruptive() {
        let db = one_intron_db();
        let mut graph = SvGraph::default();
        let v1 = add_variant(&mut graph, 0, SvType::Bnd, 0, 3_000, 1, 0, 0);
        let v2 = add_variant(&mut graph, 0, SvType::Bnd, 0, 3_200, -1, 0, 0);
        graph.breakends[1].chrom_no = 1;
        graph.breakends[1].pos = 50_000;
        graph.breakends[1].orientation = -1;
        graph.breakends[3].chrom_no = 1;
        // Shard is longer than the allowed 5000 bases.
        graph.breakends[3].pos = 60_000;
        graph.breakends[3].orientation = 1;
        graph.clusters[0].resolved_type = ResolvedType::Complex;
        graph.chains.push(crate::annotate::schema::Chain {
            cluster_id: 0,
            links: vec![LinkedPair {
                first: 1,
                second: 3,
                assembled: true,
            }],
            is_closed: false,
        });
        graph.clusters[0].chains.push(0);

        let mut arena = TxContextArena::annotate_graph(&graph, &db);
        let classifier = DisruptionClassifier::new(&graph, &db);
        classifier.classify(v1, &mut arena);
        classifier.classify(v2, &mut arena);
        assert!(arena.entries.iter().any(|e| e.disruptive));
    }

    #[test]
    fn disruption_suppression_is_monotonic() {
        let db = one_intron_db();
        let mut graph = SvGraph::default();
        let variant = add_variant(&mut graph, 0, SvType::Del, 0, 1_000, 1, 4_500, -1);
        graph.clusters[0].resolved_type = ResolvedType::Del;

        let mut arena = TxContextArena::annotate_graph(&graph, &db);
        let classifier = DisruptionClassifier::new(&graph, &db);
        classifier.classify(variant, &mut arena);
        let after_first: Vec<bool> = arena.entries.iter().map(|e| e.disruptive).collect();
        // Re-running never re-marks an entry disruptive.
        classifier.classify(variant, &mut arena);
        let after_second: Vec<bool> = arena.entries.iter().map(|e| e.disruptive).collect();
        for (first, second) in after_first.iter().zip(after_second.iter()) {
            assert!(*first || !*second);
        }
        assert_eq!(after_first, after_second);
    }

    #[test]
    fn undisrupted_copy_number_with_deletion_bridge() {
        let db = one_intron_db();
        let mut graph = SvGraph::default();
        let variant = add_variant(&mut graph, 0, SvType::Del, 0, 1_000, 1, 4_500, -1);
        let other = add_variant(&mut graph, 0, SvType::Del, 0, 1_010, -1, 100_000, 1);
        graph.clusters[0].resolved_type = ResolvedType::Complex;
        graph.breakends[0].copy_number_lowside = 3.0;
        graph.breakends[0].db_partner = Some(graph.variants[other].bnd_start);
        graph.breakends[0].db_length = Some(-10);
        graph.breakends[2].junction_copy_number = 1.0;

        let mut arena = TxContextArena::annotate_graph(&graph, &db);
        DisruptionClassifier::new(&graph, &db).classify(variant, &mut arena);

        let entry_idx = arena.lookup(0, 0).unwrap();
        assert_eq!(arena.entries[entry_idx].undisrupted_copy_number, Some(2.0));
    }
}
