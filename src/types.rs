//src/types.rs

use std::fmt;

/// NCBI-style numeric taxonomic identifier.
pub type TaxId = u32;

/// Taxid reported by the search tools when a gene had no usable hit.
pub const NO_HIT: TaxId = 0;

/// Placeholder name for a rank with no (or no confident) assignment.
pub const UNK: &str = "unk";

/// Number of canonical ranks.
pub const NUM_RANKS: usize = 7;

/// The seven canonical ranks, broadest first.
///
/// The derived `Ord` follows declaration order, so `Rank::Phylum < Rank::Genus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Rank {
    Superkingdom,
    Phylum,
    Class,
    Order,
    Family,
    Genus,
    Species,
}

impl Rank {
    pub const ALL: [Rank; NUM_RANKS] = [
        Rank::Superkingdom,
        Rank::Phylum,
        Rank::Class,
        Rank::Order,
        Rank::Family,
        Rank::Genus,
        Rank::Species,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Rank::Superkingdom => "superkingdom",
            Rank::Phylum => "phylum",
            Rank::Class => "class",
            Rank::Order => "order",
            Rank::Family => "family",
            Rank::Genus => "genus",
            Rank::Species => "species",
        }
    }

    /// Maps a rank label from a taxonomy dump onto a canonical rank.
    /// Anything else ("no rank", "clade", "subspecies", ...) is `None`.
    pub fn from_label(label: &str) -> Option<Rank> {
        Rank::ALL.iter().copied().find(|r| r.as_str() == label)
    }

    /// Position in the broad-to-narrow ordering.
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One name per canonical rank, `UNK` where the lineage lacks the rank.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RankNames {
    names: [String; NUM_RANKS],
}

impl RankNames {
    /// All seven ranks unknown.
    pub fn unknown() -> Self {
        Self {
            names: std::array::from_fn(|_| UNK.to_string()),
        }
    }

    pub fn from_array(names: [String; NUM_RANKS]) -> Self {
        Self { names }
    }

    pub fn get(&self, rank: Rank) -> &str {
        &self.names[rank.index()]
    }

    pub fn set(&mut self, rank: Rank, name: impl Into<String>) {
        self.names[rank.index()] = name.into();
    }

    pub fn is_known(&self, rank: Rank) -> bool {
        self.get(rank) != UNK
    }

    pub fn iter(&self) -> impl Iterator<Item = (Rank, &str)> {
        Rank::ALL.iter().map(move |&r| (r, self.get(r)))
    }
}

impl Default for RankNames {
    fn default() -> Self {
        Self::unknown()
    }
}

/// One line of a b6+ or DIAMOND hit table, with the fields we derive from it.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneHit {
    pub query: String,
    pub target: String,
    pub percent_id: f32,
    pub alignment_length: u32,
    pub mismatches: u32,
    pub gap_opens: u32,
    pub query_start: u32,
    pub query_end: u32,
    pub target_start: u32,
    pub target_end: u32,
    pub evalue: f64,
    pub bit_score: f32,
    /// The first twelve columns exactly as read, tab-joined.
    pub raw_columns: String,
    pub extra: String,

    pub annotation: Option<String>,  // b6+ only: first field of `extra`
    pub taxid: Option<TaxId>,        // None when the field is missing or unparsable
    pub tax_string: Option<String>,  // b6+ only: quoted lineage in `extra`
    pub scaffold: Option<String>,    // None when the gene id has no `_<index>` suffix
}

/// A gene (hit) with the per-rank names of its taxid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneRankRow {
    pub gene: String,
    pub scaffold: Option<String>,
    pub taxid: Option<TaxId>,
    pub names: RankNames,
}

/// Majority call for one rank of one group.
#[derive(Debug, Clone, PartialEq)]
pub struct RankConsensus {
    pub winner: String,
    /// Share of the group's named rows that agree with `winner`, 0..=100.
    pub percent: f64,
}

impl RankConsensus {
    /// The call for a rank where no row carries a name.
    pub fn no_data() -> Self {
        Self {
            winner: UNK.to_string(),
            percent: 100.0,
        }
    }
}

/// One row of a scaffold / bin / genome consensus table.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupTaxonomy {
    pub group: String,
    pub member_count: usize,
    pub ranks: [RankConsensus; NUM_RANKS],
    pub full_taxonomy: crate::taxstring::TaxonomyString,
    /// Most specific known name of `full_taxonomy`.
    pub taxonomy: String,
}

impl GroupTaxonomy {
    pub fn rank(&self, rank: Rank) -> &RankConsensus {
        &self.ranks[rank.index()]
    }
}

/// A row of the rank census: how much of the hit set supports `name` at `rank`.
#[derive(Debug, Clone, PartialEq)]
pub struct CensusRow {
    pub tax_confidence: f64,
    pub rank: Rank,
    pub name: String,
    pub count: u32,
}
