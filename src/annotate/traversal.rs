//! Validation of traversed genomic segments.
//!
//! A chain segment that crosses the splice acceptor of a gene on the fused
//! strand cannot be spliced out of the fusion transcript; such segments
//! invalidate disruption suppression and chained fusion candidates.

use std::collections::HashMap;

use crate::common::Strand;

use super::genes::GeneDb;

/// Whether the interval `[pos_a, pos_b]` (either order) crosses a splice
/// acceptor of a gene whose strand matches `fusion_direction` (`0` matches
/// any strand).
///
/// A fully enclosed exon does not count when the upstream transcript is
/// still pre-coding and the interval ends before the traversed transcript's
/// coding start, because a completely traversed non-coding leading exon
/// leaves splicing intact.
pub fn traverses_gene(
    db: &GeneDb,
    chrom_no: usize,
    pos_a: i64,
    pos_b: i64,
    fusion_direction: i8,
    is_precoding_upstream: bool,
) -> bool {
    let lower = pos_a.min(pos_b);
    let upper = pos_a.max(pos_b);

    for &gene_idx in db.genes_sorted(chrom_no) {
        let gene = &db.genes[gene_idx];
        // Genes are sorted by start position; nothing further can overlap.
        if gene.start > upper {
            break;
        }
        if gene.end < lower {
            continue;
        }
        if fusion_direction != 0 && gene.strand.as_int() != fusion_direction {
            continue;
        }
        for &tx_idx in db.transcripts(gene_idx) {
            let tx = &db.transcripts[tx_idx];
            for exon in &tx.exons {
                if exon.rank == 1 {
                    continue;
                }
                let acceptor = match gene.strand {
                    Strand::Forward => exon.start,
                    Strand::Reverse => exon.end,
                };
                if acceptor < lower || acceptor > upper {
                    continue;
                }
                let enclosed = exon.start >= lower && exon.end <= upper;
                let before_coding = match gene.strand {
                    Strand::Forward => tx.coding_start.map_or(true, |cs| upper < cs),
                    Strand::Reverse => tx.coding_end.map_or(true, |ce| lower > ce),
                };
                if enclosed && is_precoding_upstream && before_coding {
                    continue;
                }
                return true;
            }
        }
    }
    false
}

/// Memo for traversal checks within one chain walk, keyed by
/// `(link index, fusion direction, pre-coding flag)`.
#[derive(Debug, Default)]
pub struct TraversalMemo {
    cache: HashMap<(usize, i8, bool), bool>,
}

impl TraversalMemo {
    /// Memoized [`traverses_gene`] for one linked pair of a chain.
    #[allow(clippy::too_many_arguments)]
    pub fn traverses_gene(
        &mut self,
        db: &GeneDb,
        link_idx: usize,
        chrom_no: usize,
        pos_a: i64,
        pos_b: i64,
        fusion_direction: i8,
        is_precoding_upstream: bool,
    ) -> bool {
        *self
            .cache
            .entry((link_idx, fusion_direction, is_precoding_upstream))
            .or_insert_with(|| {
                traverses_gene(
                    db,
                    chrom_no,
                    pos_a,
                    pos_b,
                    fusion_direction,
                    is_precoding_upstream,
                )
            })
    }
}
