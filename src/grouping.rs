//src/grouping.rs

use ahash::AHashMap;
use std::io::BufRead;
use std::path::Path;

use crate::consensus::{aggregate, ConsensusConfig};
use crate::errors::{Result, TaxError};
use crate::hits::HitFormat;
use crate::types::{GeneRankRow, GroupTaxonomy, UNK};
use crate::utils::open_reader;

/// Scaffold a gene was called on.
///
/// Gene callers name genes `<scaffold>_<n>`. DIAMOND query ids may carry a
/// `|`-delimited suffix, so only the part before the first `|` is used.
/// Returns `None` when there is no `_<n>` to strip.
pub fn scaffold_of(gene: &str, format: HitFormat) -> Option<String> {
    let base = match format {
        HitFormat::B6Plus => gene,
        HitFormat::Diamond => gene.split('|').next().unwrap_or(gene),
    };
    match base.rsplit_once('_') {
        Some((scaffold, _)) if !scaffold.is_empty() => Some(scaffold.to_string()),
        _ => None,
    }
}

/// Scaffold -> bin assignments read from a two-column `.stb` table.
#[derive(Debug, Default, Clone)]
pub struct ScaffoldBins {
    map: AHashMap<String, String>,
}

impl ScaffoldBins {
    /// Reads `scaffold\tbin` lines. A first column starting with
    /// `scaffold_name` marks a header and is skipped.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut map = AHashMap::new();
        for (lineno, line) in open_reader(path)?.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut words = line.split('\t');
            let scaffold = words.next().unwrap_or_default();
            if scaffold.starts_with("scaffold_name") {
                continue;
            }
            let bin = words.next().ok_or_else(|| {
                TaxError::parse(path, lineno + 1, "expected two tab-separated columns")
            })?;
            map.insert(scaffold.to_string(), bin.to_string());
        }
        log::info!("Loaded {} scaffold-to-bin assignments from {}", map.len(), path.display());
        Ok(Self { map })
    }

    pub fn from_pairs<I, S, B>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, B)>,
        S: Into<String>,
        B: Into<String>,
    {
        Self {
            map: pairs.into_iter().map(|(s, b)| (s.into(), b.into())).collect(),
        }
    }

    pub fn bin_of(&self, scaffold: &str) -> Option<&str> {
        self.map.get(scaffold).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// What to aggregate gene rows by.
#[derive(Debug, Clone, Copy)]
pub enum GroupKey<'a> {
    Scaffold,
    /// Bins from a scaffold table; unlisted scaffolds fall into bin `unk`.
    Bin(&'a ScaffoldBins),
    /// Everything in one group with the given label.
    Genome(&'a str),
}

impl GroupKey<'_> {
    /// Header of the key column in output tables.
    pub fn column(&self) -> &'static str {
        match self {
            GroupKey::Scaffold => "scaffold",
            GroupKey::Bin(_) => "bin",
            GroupKey::Genome(_) => "genome",
        }
    }

    /// Group of `row`. Genes without a scaffold only appear in the gene
    /// table.
    pub fn key_of(&self, row: &GeneRankRow) -> Option<String> {
        match self {
            GroupKey::Scaffold => row.scaffold.clone(),
            GroupKey::Bin(stb) => row
                .scaffold
                .as_deref()
                .map(|s| stb.bin_of(s).unwrap_or(UNK).to_string()),
            GroupKey::Genome(label) => row.scaffold.as_ref().map(|_| label.to_string()),
        }
    }
}

/// Consensus per group for the chosen key.
///
/// With a bin table, fails if not a single gene lands in a listed bin: that
/// means the table does not belong to these genes.
pub fn aggregate_by(
    rows: &[GeneRankRow],
    key: GroupKey<'_>,
    config: &ConsensusConfig,
) -> Result<Vec<GroupTaxonomy>> {
    if let GroupKey::Bin(stb) = key {
        let placed = rows.iter().filter_map(|r| r.scaffold.as_deref());
        let (binned, total) = placed.fold((0usize, 0usize), |(b, t), s| {
            (b + usize::from(stb.bin_of(s).is_some()), t + 1)
        });
        if binned == 0 {
            return Err(TaxError::NoScaffoldsBinned);
        }
        if binned < total {
            log::warn!("{} of {} genes are on scaffolds without a bin; assigned to bin '{}'", total - binned, total, UNK);
        }
    }
    aggregate(rows, |r| key.key_of(r), config)
}
