//src/lineage.rs

use ahash::AHashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::errors::ResolveError;
use crate::types::{Rank, RankNames, TaxId};

/// One ancestor in a lineage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineageNode {
    pub taxid: TaxId,
    pub rank: String,   // raw label from the dump, e.g. "no rank", "clade", "genus"
    pub name: String,
}

/// Ancestry of a taxid, root first, ending with the taxid itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lineage {
    nodes: Vec<LineageNode>,
}

impl Lineage {
    pub fn new(nodes: Vec<LineageNode>) -> Self {
        Self { nodes }
    }

    pub fn nodes(&self) -> &[LineageNode] {
        &self.nodes
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Name of the ancestor sitting at `rank`, if the ancestry has one.
    pub fn name_at(&self, rank: Rank) -> Option<&str> {
        self.nodes
            .iter()
            .find(|n| n.rank == rank.as_str())
            .map(|n| n.name.as_str())
    }

    /// Canonical-rank view; absent ranks become `UNK`, never invented.
    pub fn rank_names(&self) -> RankNames {
        let mut names = RankNames::unknown();
        for rank in Rank::ALL {
            if let Some(name) = self.name_at(rank) {
                names.set(rank, name);
            }
        }
        names
    }
}

/// Looks up the lineage of a taxid.
///
/// `Ok(None)` means the id is not in the taxonomy, which callers treat as a
/// data gap. Errors are reserved for the backend failing to answer.
pub trait LineageResolver {
    fn lineage(&self, taxid: TaxId) -> Result<Option<Lineage>, ResolveError>;
}

impl<R: LineageResolver + ?Sized> LineageResolver for &R {
    fn lineage(&self, taxid: TaxId) -> Result<Option<Lineage>, ResolveError> {
        (**self).lineage(taxid)
    }
}

impl<R: LineageResolver + ?Sized> LineageResolver for Arc<R> {
    fn lineage(&self, taxid: TaxId) -> Result<Option<Lineage>, ResolveError> {
        (**self).lineage(taxid)
    }
}

/// Per-run lookaside cache of resolved lineages.
///
/// Stores `None` for ids the resolver does not know, so those are not looked
/// up twice either. Failed lookups are never stored.
#[derive(Debug, Default)]
pub struct LineageCache {
    entries: RwLock<AHashMap<TaxId, Option<Arc<Lineage>>>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl LineageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outer `None` is a cache miss; inner `None` is a cached "unknown id".
    pub fn get(&self, taxid: TaxId) -> Option<Option<Arc<Lineage>>> {
        let found = self.entries.read().get(&taxid).cloned();
        match &found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    pub fn insert(&self, taxid: TaxId, lineage: Option<Arc<Lineage>>) {
        self.entries.write().insert(taxid, lineage);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(hits, misses)` since creation.
    pub fn stats(&self) -> (usize, usize) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}
