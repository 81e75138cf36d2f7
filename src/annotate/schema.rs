//! Breakend / variant / cluster / chain graph for one sample.
//!
//! The graph is an arena: objects refer to each other through integer ids
//! into the vectors of [`SvGraph`], never through owning pointers.  The
//! upstream caller (SV calling, clustering and chaining) produces this
//! document; here it is only consumed.

use serde::{Deserialize, Serialize};

use crate::common::Orientation;

/// Encode the type of an SV.
#[derive(
    Serialize, Deserialize, PartialEq, Eq, Ord, PartialOrd, Hash, Debug, Clone, Copy, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SvType {
    /// Deletion
    #[default]
    Del,
    /// Duplication
    Dup,
    /// Insertion
    Ins,
    /// Inversion
    Inv,
    /// Break-end / translocation
    Bnd,
    /// Single-ended breakend
    Sgl,
    /// Inferred single-ended breakend (no mapped mate sequence)
    Inf,
}

impl std::str::FromStr for SvType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use SvType::*;
        match s {
            "DEL" => Ok(Del),
            "DUP" => Ok(Dup),
            "INS" => Ok(Ins),
            "INV" => Ok(Inv),
            "BND" => Ok(Bnd),
            "SGL" => Ok(Sgl),
            "INF" => Ok(Inf),
            _ => Err(anyhow::anyhow!("invalid SV type: {}", s)),
        }
    }
}

/// Resolved type of a cluster after classification by the upstream chainer.
#[derive(Serialize, Deserialize, PartialEq, Eq, Hash, Debug, Clone, Copy, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolvedType {
    /// Mobile element (LINE) insertion.
    Line,
    /// Simple deletion.
    Del,
    /// Simple duplication.
    Dup,
    /// Simple insertion.
    Ins,
    /// Simple inversion.
    Inv,
    /// Complex rearrangement.
    Complex,
    /// Not classified.
    #[default]
    Unclassified,
}

/// One end of a structural variant.
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
pub struct Breakend {
    /// Chromosome name.
    pub chrom: String,
    /// Chromosome number, filled in by [`SvGraph::prepare`].
    #[serde(default)]
    pub chrom_no: usize,
    /// 1-based position.
    pub pos: i64,
    /// Orientation; `+1` when the retained segment is on the lower side.
    pub orientation: Orientation,
    /// Id of the owning variant.
    pub variant_id: usize,
    /// Whether this is the start breakend of its variant.
    pub is_start: bool,
    /// Whether this is an inferred (unmapped) single end.
    #[serde(default)]
    pub is_inferred: bool,
    /// Copy number on the lower side of the breakend.
    #[serde(default)]
    pub copy_number_lowside: f64,
    /// Junction copy number of the owning variant at this breakend.
    #[serde(default)]
    pub junction_copy_number: f64,
    /// Breakend closing a deletion bridge with this one, if any.
    #[serde(default)]
    pub db_partner: Option<usize>,
    /// Length of the deletion bridge; negative for overlapping breakends.
    #[serde(default)]
    pub db_length: Option<i64>,
}

/// A structural variant: two breakends, or one for single-ended variants.
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
pub struct StructuralVariant {
    /// Type of the structural variant.
    pub sv_type: SvType,
    /// Id of the owning cluster.
    pub cluster_id: usize,
    /// Id of the start breakend.
    pub bnd_start: usize,
    /// Id of the end breakend; `None` for single-ended variants.
    #[serde(default)]
    pub bnd_end: Option<usize>,
}

impl StructuralVariant {
    /// Whether the variant is single-ended.
    pub fn is_sgl(&self) -> bool {
        self.bnd_end.is_none()
    }

    /// Ids of the breakends of this variant.
    pub fn breakend_ids(&self) -> impl Iterator<Item = usize> + '_ {
        std::iter::once(self.bnd_start).chain(self.bnd_end)
    }
}

/// A cluster of variants with a resolved type and zero or more chains.
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone, Default)]
pub struct Cluster {
    /// Resolved type of the cluster.
    #[serde(default)]
    pub resolved_type: ResolvedType,
    /// Ids of the member variants.
    pub variants: Vec<usize>,
    /// Ids of the chains owned by this cluster.
    #[serde(default)]
    pub chains: Vec<usize>,
}

impl Cluster {
    /// A cluster is simple if it resolved to a plain DEL/DUP/INS consisting
    /// of a single variant.
    pub fn is_simple(&self) -> bool {
        matches!(
            self.resolved_type,
            ResolvedType::Del | ResolvedType::Dup | ResolvedType::Ins
        ) && self.variants.len() == 1
    }
}

/// A synthesized adjacency between breakends of two different variants.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Copy)]
pub struct LinkedPair {
    /// Id of the first breakend (closer to the chain start).
    pub first: usize,
    /// Id of the second breakend (closer to the chain end).
    pub second: usize,
    /// Whether the link is supported by assembly rather than inference.
    #[serde(default)]
    pub assembled: bool,
}

impl LinkedPair {
    /// Length of the templated segment between the two breakends.
    pub fn length(&self, graph: &SvGraph) -> i64 {
        (graph.breakends[self.second].pos - graph.breakends[self.first].pos).abs()
    }

    /// Normalized genomic interval `(chrom_no, lower, upper)` of the segment.
    pub fn interval(&self, graph: &SvGraph) -> (usize, i64, i64) {
        let first = &graph.breakends[self.first];
        let second = &graph.breakends[self.second];
        (
            first.chrom_no,
            first.pos.min(second.pos),
            first.pos.max(second.pos),
        )
    }

    /// Whether the given breakend is one of the two ends of this pair, and
    /// if so, the id of the opposing end.
    pub fn opposing(&self, bnd_id: usize) -> Option<usize> {
        if self.first == bnd_id {
            Some(self.second)
        } else if self.second == bnd_id {
            Some(self.first)
        } else {
            None
        }
    }
}

/// An ordered sequence of linked pairs owned by a cluster.
///
/// A chain of `N` links connects `N + 1` variant positions `0..=N`.  Position
/// `k` addresses the variant between link `k - 1` and link `k`; the outermost
/// positions are the chain's open ends (or the wrap-around breakends of a
/// closed loop).
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
pub struct Chain {
    /// Id of the owning cluster.
    pub cluster_id: usize,
    /// The linked pairs in chain order.
    pub links: Vec<LinkedPair>,
    /// Whether the chain forms a closed loop.
    #[serde(default)]
    pub is_closed: bool,
}

impl Chain {
    /// Number of links in the chain.
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// The "lower" breakend at position `i`: the open start of the chain for
    /// `i == 0`, otherwise the near end of link `i - 1`.  For closed loops
    /// the partner lookup yields the wrap-around breakend.
    pub fn lower_breakend(&self, i: usize, graph: &SvGraph) -> Option<usize> {
        if i == 0 {
            graph.other_breakend(self.links.first()?.first)
        } else {
            Some(self.links[i - 1].second)
        }
    }

    /// The "upper" breakend at position `j`: the near end of link `j`, or
    /// the open end of the chain for `j == link_count()`.
    pub fn upper_breakend(&self, j: usize, graph: &SvGraph) -> Option<usize> {
        if j < self.links.len() {
            Some(self.links[j].first)
        } else {
            graph.other_breakend(self.links.last()?.second)
        }
    }

    /// Whether the chain contains a breakend of the given variant.
    pub fn contains_variant(&self, graph: &SvGraph, variant_id: usize) -> bool {
        self.links.iter().any(|link| {
            graph.breakends[link.first].variant_id == variant_id
                || graph.breakends[link.second].variant_id == variant_id
        })
    }
}

/// The full per-sample graph.
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone, Default)]
pub struct SvGraph {
    /// Name of the sample.
    pub sample: String,
    /// All breakends of the sample.
    pub breakends: Vec<Breakend>,
    /// All structural variants of the sample.
    pub variants: Vec<StructuralVariant>,
    /// All clusters of the sample.
    pub clusters: Vec<Cluster>,
    /// All chains of the sample.
    pub chains: Vec<Chain>,
}

impl SvGraph {
    /// The partner breakend on the same variant, `None` for single-ended
    /// variants.
    pub fn other_breakend(&self, bnd_id: usize) -> Option<usize> {
        let variant = &self.variants[self.breakends[bnd_id].variant_id];
        if variant.bnd_start == bnd_id {
            variant.bnd_end
        } else {
            Some(variant.bnd_start)
        }
    }

    /// Ids of the chains that contain the given variant.
    pub fn chains_with_variant(&self, variant_id: usize) -> Vec<usize> {
        (0..self.chains.len())
            .filter(|chain_id| self.chains[*chain_id].contains_variant(self, variant_id))
            .collect()
    }

    /// Linked pairs that have the given breakend as one of their ends,
    /// as `(chain_id, link_index)` pairs.
    pub fn links_with_breakend(&self, bnd_id: usize) -> Vec<(usize, usize)> {
        let mut result = Vec::new();
        for (chain_id, chain) in self.chains.iter().enumerate() {
            for (link_idx, link) in chain.links.iter().enumerate() {
                if link.opposing(bnd_id).is_some() {
                    result.push((chain_id, link_idx));
                }
            }
        }
        result
    }

    /// Fill in chromosome numbers and check index consistency.
    pub fn prepare(
        &mut self,
        chrom_map: &indexmap::IndexMap<String, usize>,
    ) -> Result<(), anyhow::Error> {
        for bnd in &mut self.breakends {
            bnd.chrom_no = *chrom_map
                .get(&bnd.chrom)
                .ok_or_else(|| anyhow::anyhow!("unknown chromosome: {:?}", &bnd.chrom))?;
        }
        for (bnd_id, bnd) in self.breakends.iter().enumerate() {
            if bnd.variant_id >= self.variants.len() {
                anyhow::bail!("breakend {} has out-of-range variant id", bnd_id);
            }
            if !matches!(bnd.orientation, 1 | -1) {
                anyhow::bail!("breakend {} has invalid orientation", bnd_id);
            }
        }
        for (variant_id, variant) in self.variants.iter().enumerate() {
            if variant.cluster_id >= self.clusters.len() {
                anyhow::bail!("variant {} has out-of-range cluster id", variant_id);
            }
            for bnd_id in variant.breakend_ids() {
                if bnd_id >= self.breakends.len() {
                    anyhow::bail!("variant {} has out-of-range breakend id", variant_id);
                }
            }
        }
        for (chain_id, chain) in self.chains.iter().enumerate() {
            for link in &chain.links {
                if link.first >= self.breakends.len() || link.second >= self.breakends.len() {
                    anyhow::bail!("chain {} has out-of-range breakend id", chain_id);
                }
            }
        }
        Ok(())
    }
}
