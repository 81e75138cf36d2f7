//! Known-fusion reference data.
//!
//! The curated reference is loaded once from TSV and queried by gene pair,
//! by single gene (promiscuous 5'/3'), and by IG region membership.

use std::{collections::HashMap, path::Path, time::Instant};

use serde::Deserialize;

use crate::common::{io::open_read_maybe_gz, Strand};

/// Record type in the known-fusion reference file.
#[derive(
    serde::Serialize,
    serde::Deserialize,
    PartialEq,
    Eq,
    Hash,
    Debug,
    Clone,
    Copy,
    strum_macros::EnumString,
    strum_macros::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum KnownFusionType {
    /// Curated 5'/3' gene pair.
    KnownPair,
    /// IG locus to partner gene pairing.
    IgKnownPair,
    /// IG locus with promiscuous partner.
    IgPromiscuous,
    /// Same-gene exon deletion / duplication.
    ExonDelDup,
    /// Gene known to fuse promiscuously as 5' partner.
    PromiscuousFive,
    /// Gene known to fuse promiscuously as 3' partner.
    PromiscuousThree,
}

/// Genomic bounds of an IG locus for IG-partner matching.
#[derive(Debug, Clone, PartialEq)]
pub struct IgRegion {
    /// Chromosome number.
    pub chrom_no: usize,
    /// 1-based start position.
    pub start: i64,
    /// 1-based end position.
    pub end: i64,
    /// Strand of the synthetic 5' transcript.
    pub strand: Strand,
}

impl IgRegion {
    /// Whether a position falls inside the region.
    pub fn contains(&self, chrom_no: usize, pos: i64) -> bool {
        self.chrom_no == chrom_no && pos >= self.start && pos <= self.end
    }
}

/// One curated reference entry.
#[derive(Debug, Clone, PartialEq)]
pub struct KnownFusionEntry {
    /// Type of the entry.
    pub ftype: KnownFusionType,
    /// 5' gene name; for promiscuous-3' entries this is empty.
    pub five_gene: String,
    /// 3' gene name; for promiscuous-5' entries this is empty.
    pub three_gene: String,
    /// Whether a promiscuous entry is flagged high impact.
    pub high_impact_promiscuous: bool,
    /// High-confidence exon range on the 5' side, if registered.
    pub five_exon_range: Option<(u32, u32)>,
    /// High-confidence exon range on the 3' side, if registered.
    pub three_exon_range: Option<(u32, u32)>,
    /// IG locus bounds for IG entries.
    pub ig_region: Option<IgRegion>,
}

/// Classification of a fusion candidate against the reference.
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
    strum_macros::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum KnownFusionMatch {
    /// No match in the reference.
    #[default]
    None,
    /// Exact known gene pair.
    KnownPair,
    /// Same-gene exon deletion / duplication in a registered range.
    ExonDelDup,
    /// IG locus paired with a registered partner.
    IgKnownPair,
    /// 5' gene is promiscuous.
    PromiscuousFive,
    /// 3' gene is promiscuous.
    PromiscuousThree,
    /// Both genes are promiscuous.
    PromiscuousBoth,
}

impl KnownFusionMatch {
    /// Whether the candidate matched the reference at all.
    pub fn is_known(&self) -> bool {
        !matches!(self, KnownFusionMatch::None)
    }

    /// Whether the candidate pairs the exact genes of a curated entry
    /// (as opposed to a single-gene promiscuous match).
    pub fn is_exact_pairing(&self) -> bool {
        matches!(
            self,
            KnownFusionMatch::KnownPair
                | KnownFusionMatch::ExonDelDup
                | KnownFusionMatch::IgKnownPair
        )
    }

    /// Whether candidates of this type may keep chains that fail traversal
    /// or length checks (flagged, not dropped).
    pub fn suspect_chains_allowed(&self) -> bool {
        self.is_exact_pairing()
    }
}

/// In-memory known-fusion reference.
#[derive(Debug, Default)]
pub struct KnownFusionCache {
    /// All entries.
    pub entries: Vec<KnownFusionEntry>,
    /// Known pairs by (5' gene, 3' gene).
    by_pair: HashMap<(String, String), usize>,
    /// Promiscuous 5' entries by gene.
    promiscuous_five: HashMap<String, usize>,
    /// Promiscuous 3' entries by gene.
    promiscuous_three: HashMap<String, usize>,
    /// Exon del/dup entries by gene.
    exon_del_dup: HashMap<String, usize>,
    /// Indices of IG entries.
    ig_entries: Vec<usize>,
}

impl KnownFusionCache {
    /// Add an entry, maintaining the lookup maps.
    pub fn add(&mut self, entry: KnownFusionEntry) {
        let idx = self.entries.len();
        match entry.ftype {
            KnownFusionType::KnownPair => {
                self.by_pair
                    .insert((entry.five_gene.clone(), entry.three_gene.clone()), idx);
            }
            KnownFusionType::PromiscuousFive => {
                self.promiscuous_five.insert(entry.five_gene.clone(), idx);
            }
            KnownFusionType::PromiscuousThree => {
                self.promiscuous_three.insert(entry.three_gene.clone(), idx);
            }
            KnownFusionType::ExonDelDup => {
                self.exon_del_dup.insert(entry.five_gene.clone(), idx);
            }
            KnownFusionType::IgKnownPair | KnownFusionType::IgPromiscuous => {
                self.ig_entries.push(idx);
            }
        }
        self.entries.push(entry);
    }

    /// Exact known pair entry, if registered.
    pub fn known_pair(&self, five_gene: &str, three_gene: &str) -> Option<&KnownFusionEntry> {
        self.by_pair
            .get(&(five_gene.to_owned(), three_gene.to_owned()))
            .map(|idx| &self.entries[*idx])
    }

    /// Exon del/dup entry for a gene, if registered.
    pub fn exon_del_dup(&self, gene: &str) -> Option<&KnownFusionEntry> {
        self.exon_del_dup.get(gene).map(|idx| &self.entries[*idx])
    }

    /// Promiscuous 5' entry for a gene, if registered.
    pub fn promiscuous_five(&self, gene: &str) -> Option<&KnownFusionEntry> {
        self.promiscuous_five
            .get(gene)
            .map(|idx| &self.entries[*idx])
    }

    /// Promiscuous 3' entry for a gene, if registered.
    pub fn promiscuous_three(&self, gene: &str) -> Option<&KnownFusionEntry> {
        self.promiscuous_three
            .get(gene)
            .map(|idx| &self.entries[*idx])
    }

    /// IG entry whose region contains the given position and whose partner
    /// constraint (if an IG known pair) matches the 3' gene.
    pub fn ig_match(
        &self,
        chrom_no: usize,
        pos: i64,
        three_gene: &str,
    ) -> Option<&KnownFusionEntry> {
        self.ig_entries
            .iter()
            .map(|idx| &self.entries[*idx])
            .filter(|entry| {
                entry
                    .ig_region
                    .as_ref()
                    .map(|region| region.contains(chrom_no, pos))
                    .unwrap_or(false)
            })
            .find(|entry| {
                entry.ftype == KnownFusionType::IgPromiscuous || entry.three_gene == three_gene
            })
    }

    /// Classify a gene pair with the breakend exon ranks of both sides.
    ///
    /// Returns the match type, whether the exons fall into a registered
    /// high-confidence exon range, and whether a promiscuous match is
    /// flagged high impact.
    pub fn classify(
        &self,
        five_gene: &str,
        three_gene: &str,
        five_exon: u32,
        three_exon: u32,
    ) -> (KnownFusionMatch, bool, bool) {
        if let Some(entry) = self.known_pair(five_gene, three_gene) {
            let known_exons = in_range(entry.five_exon_range, five_exon)
                && in_range(entry.three_exon_range, three_exon);
            return (KnownFusionMatch::KnownPair, known_exons, false);
        }

        if five_gene == three_gene {
            if let Some(entry) = self.exon_del_dup(five_gene) {
                if matches_range(entry.five_exon_range, five_exon)
                    && matches_range(entry.three_exon_range, three_exon)
                {
                    return (KnownFusionMatch::ExonDelDup, true, false);
                }
            }
        }

        let five = self.promiscuous_five(five_gene);
        let three = self.promiscuous_three(three_gene);
        let high_impact = five.map(|e| e.high_impact_promiscuous).unwrap_or(false)
            || three.map(|e| e.high_impact_promiscuous).unwrap_or(false);
        let known_exons = five
            .map(|e| in_range(e.five_exon_range, five_exon))
            .unwrap_or(false)
            || three
                .map(|e| in_range(e.three_exon_range, three_exon))
                .unwrap_or(false);
        match (five, three) {
            (Some(_), Some(_)) => (KnownFusionMatch::PromiscuousBoth, known_exons, high_impact),
            (Some(_), None) => (KnownFusionMatch::PromiscuousFive, known_exons, high_impact),
            (None, Some(_)) => (KnownFusionMatch::PromiscuousThree, known_exons, high_impact),
            (None, None) => (KnownFusionMatch::None, false, false),
        }
    }
}

/// Exon rank within an optional registered range; false when no range.
fn in_range(range: Option<(u32, u32)>, exon: u32) -> bool {
    range
        .map(|(min, max)| exon >= min && exon <= max)
        .unwrap_or(false)
}

/// Exon rank within an optional registered range; true when no range.
fn matches_range(range: Option<(u32, u32)>, exon: u32) -> bool {
    range
        .map(|(min, max)| exon >= min && exon <= max)
        .unwrap_or(true)
}

/// Row of the known-fusion reference TSV.
#[derive(Deserialize, Debug, Clone)]
struct KnownFusionRecord {
    /// Type of the entry.
    #[serde(rename = "type")]
    pub ftype: String,
    /// 5' gene name.
    #[serde(default)]
    pub five_gene: String,
    /// 3' gene name.
    #[serde(default)]
    pub three_gene: String,
    /// High-impact flag for promiscuous entries.
    #[serde(default)]
    pub high_impact: bool,
    /// 5' exon range as `min-max`, if any.
    #[serde(default)]
    pub five_exon_range: Option<String>,
    /// 3' exon range as `min-max`, if any.
    #[serde(default)]
    pub three_exon_range: Option<String>,
    /// IG region as `chrom:start-end:strand`, if any.
    #[serde(default)]
    pub ig_region: Option<String>,
}

fn parse_exon_range(spec: &Option<String>) -> Result<Option<(u32, u32)>, anyhow::Error> {
    match spec.as_deref().filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => {
            let (min, max) = s
                .split_once('-')
                .ok_or_else(|| anyhow::anyhow!("invalid exon range: {:?}", s))?;
            Ok(Some((min.trim().parse()?, max.trim().parse()?)))
        }
    }
}

fn parse_ig_region(
    spec: &Option<String>,
    chrom_map: &indexmap::IndexMap<String, usize>,
) -> Result<Option<IgRegion>, anyhow::Error> {
    match spec.as_deref().filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => {
            let parts: Vec<&str> = s.split(':').collect();
            if parts.len() != 3 {
                anyhow::bail!("invalid IG region: {:?}", s);
            }
            let chrom_no = *chrom_map
                .get(parts[0])
                .ok_or_else(|| anyhow::anyhow!("unknown chromosome in IG region: {:?}", s))?;
            let (start, end) = parts[1]
                .split_once('-')
                .ok_or_else(|| anyhow::anyhow!("invalid IG region: {:?}", s))?;
            Ok(Some(IgRegion {
                chrom_no,
                start: start.trim().parse()?,
                end: end.trim().parse()?,
                strand: parts[2].parse()?,
            }))
        }
    }
}

/// Load the known-fusion reference TSV into a [`KnownFusionCache`].
#[tracing::instrument]
pub fn load_known_fusions(
    path: &Path,
    chrom_map: &indexmap::IndexMap<String, usize>,
) -> Result<KnownFusionCache, anyhow::Error> {
    tracing::debug!("loading known fusion records from {:?}...", path);
    let before_loading = Instant::now();
    let mut result = KnownFusionCache::default();

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .from_reader(open_read_maybe_gz(path)?);
    for record in reader.deserialize() {
        let record: KnownFusionRecord = record?;
        result.add(KnownFusionEntry {
            ftype: record
                .ftype
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid known fusion type: {:?}", &record.ftype))?,
            five_gene: record.five_gene,
            three_gene: record.three_gene,
            high_impact_promiscuous: record.high_impact,
            five_exon_range: parse_exon_range(&record.five_exon_range)?,
            three_exon_range: parse_exon_range(&record.three_exon_range)?,
            ig_region: parse_ig_region(&record.ig_region, chrom_map)?,
        });
    }
    tracing::debug!(
        "... done loading {} records in {:?}",
        result.entries.len(),
        before_loading.elapsed(),
    );
    Ok(result)
}
