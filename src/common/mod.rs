//! Common functionality.

use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use indexmap::IndexMap;

pub mod io;

/// Commonly used command line arguments.
#[derive(Parser, Debug)]
pub struct Args {
    /// Verbosity of the program
    #[clap(flatten)]
    pub verbose: Verbosity<InfoLevel>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            verbose: Verbosity::new(0, 0),
        }
    }
}

/// Definition of canonical chromosome names.
pub const CHROMS: &[&str] = &[
    "1", "2", "3", "4", "5", "6", "7", "8", "9", "10", "11", "12", "13", "14", "15", "16", "17",
    "18", "19", "20", "21", "22", "X", "Y", "M",
];

/// Build mapping of chromosome names to chromosome numbers.
pub fn build_chrom_map() -> IndexMap<String, usize> {
    let mut result = IndexMap::new();
    for (i, &chrom_name) in CHROMS.iter().enumerate() {
        result.insert(chrom_name.to_owned(), i);
        result.insert(format!("chr{chrom_name}").to_owned(), i);
    }
    result.insert("x".to_owned(), 22);
    result.insert("y".to_owned(), 23);
    result.insert("chrx".to_owned(), 22);
    result.insert("chry".to_owned(), 23);
    result.insert("mt".to_owned(), 24);
    result.insert("m".to_owned(), 24);
    result.insert("chrmt".to_owned(), 24);
    result.insert("chrm".to_owned(), 24);
    result.insert("MT".to_owned(), 24);
    result.insert("chrMT".to_owned(), 24);
    result
}

/// Strand of a gene or transcript.
#[derive(
    serde::Serialize,
    serde::Deserialize,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Debug,
    Clone,
    Copy,
    strum_macros::Display,
)]
pub enum Strand {
    /// Forward / plus strand.
    #[serde(rename = "+")]
    #[strum(serialize = "+")]
    Forward,
    /// Reverse / minus strand.
    #[serde(rename = "-")]
    #[strum(serialize = "-")]
    Reverse,
}

impl Strand {
    /// Strand as `+1` / `-1`, the convention used in orientation arithmetic.
    pub fn as_int(&self) -> i8 {
        match self {
            Strand::Forward => 1,
            Strand::Reverse => -1,
        }
    }
}

impl std::str::FromStr for Strand {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "+" | "1" => Ok(Strand::Forward),
            "-" | "-1" => Ok(Strand::Reverse),
            _ => Err(anyhow::anyhow!("invalid strand: {:?}", s)),
        }
    }
}

/// Breakend orientation: `+1` when the retained sequence lies on the lower
/// side of the position (the breakend faces right), `-1` otherwise.
pub type Orientation = i8;

/// Orientation value for a breakend facing right.
pub const ORIENT_FWD: Orientation = 1;
/// Orientation value for a breakend facing left.
pub const ORIENT_REV: Orientation = -1;

/// The version of the `svfusion` package.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn chrom_map_aliases() {
        let map = build_chrom_map();
        assert_eq!(map.get("1"), Some(&0));
        assert_eq!(map.get("chr1"), Some(&0));
        assert_eq!(map.get("chrX"), Some(&22));
        assert_eq!(map.get("MT"), Some(&24));
    }

    #[rstest::rstest]
    #[case("+", Strand::Forward)]
    #[case("-", Strand::Reverse)]
    #[case("1", Strand::Forward)]
    #[case("-1", Strand::Reverse)]
    fn strand_from_str(#[case] s: &str, #[case] expected: Strand) {
        let actual: Strand = s.parse().unwrap();
        assert_eq!(expected, actual);
    }

    #[test]
    fn strand_as_int() {
        assert_eq!(Strand::Forward.as_int(), 1);
        assert_eq!(Strand::Reverse.as_int(), -1);
    }
}
