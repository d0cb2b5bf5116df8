//src/taxstring.rs

use std::fmt;
use std::str::FromStr;

use crate::errors::TaxError;
use crate::types::{Rank, NUM_RANKS, UNK};

/// Seven pipe-joined names, broadest rank first, e.g.
/// `Bacteria|Firmicutes|Clostridia|unk|unk|unk|unk`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaxonomyString {
    names: [String; NUM_RANKS],
}

impl TaxonomyString {
    pub fn new(names: [String; NUM_RANKS]) -> Self {
        Self { names }
    }

    pub fn unknown() -> Self {
        Self::new(std::array::from_fn(|_| UNK.to_string()))
    }

    pub fn get(&self, rank: Rank) -> &str {
        &self.names[rank.index()]
    }

    pub fn names(&self) -> &[String; NUM_RANKS] {
        &self.names
    }

    /// The most specific known name, or `unk` when nothing is known.
    pub fn simple(&self) -> &str {
        self.names
            .iter()
            .rev()
            .find(|n| n.as_str() != UNK)
            .map(String::as_str)
            .unwrap_or(UNK)
    }

    /// Number of leading ranks with a known name.
    pub fn depth(&self) -> usize {
        self.names.iter().take_while(|n| n.as_str() != UNK).count()
    }
}

impl fmt::Display for TaxonomyString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.names.join("|"))
    }
}

impl FromStr for TaxonomyString {
    type Err = TaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = s.split('|').collect();
        if tokens.len() != NUM_RANKS {
            return Err(TaxError::MalformedTaxonomyString(s.to_string(), tokens.len()));
        }
        Ok(Self::new(std::array::from_fn(|i| tokens[i].to_string())))
    }
}

/// Simple taxonomy of a rendered string: the last token that is not `unk`.
pub fn simple_taxonomy(full_taxonomy: &str) -> Result<String, TaxError> {
    full_taxonomy
        .parse::<TaxonomyString>()
        .map(|t| t.simple().to_string())
}
