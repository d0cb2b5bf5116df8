//src/levels.rs

use ahash::{AHashMap, AHashSet};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::errors::{ResolveError, Result};
use crate::lineage::{Lineage, LineageCache, LineageResolver};
use crate::types::{GeneHit, GeneRankRow, RankNames, TaxId, NO_HIT};

/// Knobs for level expansion.
#[derive(Debug, Clone)]
pub struct ExpansionConfig {
    /// Pause before the single retry of a transient lookup failure.
    pub retry_delay: Duration,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// What happened to one taxid.
#[derive(Debug, Clone, PartialEq)]
pub enum Expansion {
    /// Names for all seven ranks (`unk` where the lineage lacks a rank or
    /// the taxonomy does not know the id).
    Resolved(RankNames),
    /// The "no hit" sentinel; never looked up.
    NoHit,
    /// Lookup failed twice; the id is left out of this run.
    Excluded(ResolveError),
}

/// Per-taxid rank names for a batch of hits.
#[derive(Debug, Default, Clone)]
pub struct LevelTable {
    /// Resolved ids in first-seen order.
    pub rows: Vec<(TaxId, RankNames)>,
    index: AHashMap<TaxId, usize>,
    /// Ids dropped after a failed retry.
    pub excluded: Vec<TaxId>,
}

impl LevelTable {
    pub fn get(&self, taxid: TaxId) -> Option<&RankNames> {
        self.index.get(&taxid).map(|&i| &self.rows[i].1)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Expands taxids into canonical rank names through a resolver, caching
/// every answer for the lifetime of the expander.
pub struct LevelExpander<R> {
    resolver: R,
    cache: LineageCache,
    config: ExpansionConfig,
}

impl<R: LineageResolver> LevelExpander<R> {
    pub fn new(resolver: R) -> Self {
        Self::with_config(resolver, ExpansionConfig::default())
    }

    pub fn with_config(resolver: R, config: ExpansionConfig) -> Self {
        Self {
            resolver,
            cache: LineageCache::new(),
            config,
        }
    }

    pub fn cache(&self) -> &LineageCache {
        &self.cache
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Lineage of `taxid`, from the cache when possible.
    ///
    /// Transient failures are retried once after `retry_delay`; anything
    /// else is returned to the caller untouched.
    pub fn lineage(&self, taxid: TaxId) -> std::result::Result<Option<Arc<Lineage>>, ResolveError> {
        if let Some(cached) = self.cache.get(taxid) {
            return Ok(cached);
        }

        let looked_up = match self.resolver.lineage(taxid) {
            Err(ResolveError::Transient { reason, .. }) => {
                log::debug!("Lookup of taxid {} failed ({}); retrying", taxid, reason);
                thread::sleep(self.config.retry_delay);
                self.resolver.lineage(taxid)
            }
            other => other,
        }?;

        let lineage = looked_up.map(Arc::new);
        self.cache.insert(taxid, lineage.clone());
        Ok(lineage)
    }

    /// Expands a single taxid.
    ///
    /// Returns `Err` only when the resolver reports itself unavailable, which
    /// no retry can fix.
    pub fn expand(&self, taxid: TaxId) -> Result<Expansion> {
        if taxid == NO_HIT {
            return Ok(Expansion::NoHit);
        }
        match self.lineage(taxid) {
            Ok(Some(lineage)) => Ok(Expansion::Resolved(lineage.rank_names())),
            Ok(None) => {
                log::debug!("Taxid {} not in taxonomy", taxid);
                Ok(Expansion::Resolved(RankNames::unknown()))
            }
            Err(e @ ResolveError::Transient { .. }) => Ok(Expansion::Excluded(e)),
            Err(e) => Err(e.into()),
        }
    }

    /// Expands each distinct taxid once, skipping the "no hit" sentinel.
    pub fn expand_all<I>(&self, taxids: I) -> Result<LevelTable>
    where
        I: IntoIterator<Item = TaxId>,
    {
        let mut table = LevelTable::default();
        let mut seen = AHashSet::new();

        for taxid in taxids {
            if !seen.insert(taxid) {
                continue;
            }
            match self.expand(taxid)? {
                Expansion::Resolved(names) => {
                    table.index.insert(taxid, table.rows.len());
                    table.rows.push((taxid, names));
                }
                Expansion::NoHit => {}
                Expansion::Excluded(e) => {
                    log::warn!("Excluding taxid {}: {}", taxid, e);
                    table.excluded.push(taxid);
                }
            }
        }

        log::info!(
            "Expanded {} taxids ({} excluded, {} cached)",
            table.len(),
            table.excluded.len(),
            self.cache.len()
        );
        Ok(table)
    }

    /// One row per hit, carrying the rank names of its taxid, plus the
    /// taxids excluded after a failed retry.
    ///
    /// Hits without a taxid, with the sentinel, or whose taxid was excluded
    /// get `unk` at every rank.
    pub fn gene_rows(&self, hits: &[GeneHit]) -> Result<(Vec<GeneRankRow>, Vec<TaxId>)> {
        let table = self.expand_all(hits.iter().filter_map(|h| h.taxid))?;
        Ok((attach_levels(hits, &table), table.excluded))
    }
}

/// Joins hits to a level table.
pub fn attach_levels(hits: &[GeneHit], table: &LevelTable) -> Vec<GeneRankRow> {
    hits.iter()
        .map(|hit| GeneRankRow {
            gene: hit.query.clone(),
            scaffold: hit.scaffold.clone(),
            taxid: hit.taxid,
            names: hit
                .taxid
                .and_then(|t| table.get(t))
                .cloned()
                .unwrap_or_default(),
        })
        .collect()
}
