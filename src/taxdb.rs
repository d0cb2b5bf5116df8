//src/taxdb.rs

use ahash::AHashMap;
use std::io::BufRead;
use std::path::Path;

use crate::errors::{ResolveError, Result, TaxError};
use crate::lineage::{Lineage, LineageNode, LineageResolver};
use crate::types::{Rank, TaxId, UNK};
use crate::utils::open_reader;

pub type ParentMap = AHashMap<TaxId, TaxId>;
pub type NameMap = AHashMap<TaxId, String>;
pub type RankMap = AHashMap<TaxId, String>;

/// Upper bound on lineage depth; anything deeper is a cycle in the dump.
const MAX_DEPTH: usize = 256;

/// An in-memory taxonomy: parent, name and rank of every taxid.
#[derive(Debug, Default, Clone)]
pub struct TaxDB {
    parent_map: ParentMap,
    name_map: NameMap,
    rank_map: RankMap,
}

impl TaxDB {
    /// Parses a taxDB file in the format:
    /// ```text
    /// <taxid>\t<parentid>\t<taxname>\t<rank>
    /// ```
    /// Lines with fewer than four fields are skipped.
    pub fn from_taxdb<P: AsRef<Path>>(filepath: P) -> Result<Self> {
        let path = filepath.as_ref();
        let reader = open_reader(path)?;
        let mut db = TaxDB::default();

        for (lineno, line_result) in reader.lines().enumerate() {
            let line = line_result?;
            // e.g. "2   131567   Bacteria   superkingdom"
            let parts: Vec<&str> = line.split('\t').collect();
            if parts.len() < 4 {
                continue;
            }

            let taxid = parse_id(parts[0], path, lineno)?;
            let parentid = parse_id(parts[1], path, lineno)?;
            if taxid != 0 {
                db.insert(taxid, parentid, parts[2].trim(), parts[3].trim());
            }
        }

        log::info!("Loaded {} taxa from {}", db.len(), path.display());
        Ok(db)
    }

    /// Loads an NCBI taxdump (`nodes.dmp` + `names.dmp`, optionally gzipped).
    /// Only "scientific name" entries are used as names.
    pub fn from_ncbi<P: AsRef<Path>, Q: AsRef<Path>>(nodes_filename: P, names_filename: Q) -> Result<Self> {
        let mut db = TaxDB::default();

        let nodes_path = nodes_filename.as_ref();
        for (lineno, line) in open_reader(nodes_path)?.lines().enumerate() {
            let line = line?;
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<_> = line.split("\t|\t").collect();
            if fields.len() < 3 {
                continue;
            }
            let node_id = parse_id(fields[0], nodes_path, lineno)?;
            // the root is its own parent in the dump
            let parent_id = if node_id == 1 {
                1
            } else {
                parse_id(fields[1], nodes_path, lineno)?
            };
            db.parent_map.insert(node_id, parent_id);
            db.rank_map.insert(node_id, fields[2].trim().to_string());
        }

        let names_path = names_filename.as_ref();
        for (lineno, line) in open_reader(names_path)?.lines().enumerate() {
            let line = line?;
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let line = line.trim_end_matches(|c| c == '\t' || c == '|' || c == '\n');
            let fields: Vec<_> = line.split("\t|\t").collect();
            if fields.len() < 4 {
                continue;
            }
            if fields[3] == "scientific name" {
                let node_id = parse_id(fields[0], names_path, lineno)?;
                db.name_map.insert(node_id, fields[1].to_string());
            }
        }

        log::info!(
            "Loaded NCBI taxonomy: {} nodes, {} scientific names",
            db.parent_map.len(),
            db.name_map.len()
        );
        Ok(db)
    }

    /// Builds a taxonomy from `(taxid, parent, name, rank)` rows.
    pub fn from_rows<'a, I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (TaxId, TaxId, &'a str, &'a str)>,
    {
        let mut db = TaxDB::default();
        for (taxid, parent, name, rank) in rows {
            db.insert(taxid, parent, name, rank);
        }
        db
    }

    pub fn insert(&mut self, taxid: TaxId, parent: TaxId, name: &str, rank: &str) {
        self.parent_map.insert(taxid, parent);
        self.name_map.insert(taxid, name.to_string());
        self.rank_map.insert(taxid, rank.to_string());
    }

    pub fn len(&self) -> usize {
        self.parent_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent_map.is_empty()
    }

    pub fn contains(&self, taxid: TaxId) -> bool {
        self.parent_map.contains_key(&taxid)
    }

    pub fn name(&self, taxid: TaxId) -> Option<&str> {
        self.name_map.get(&taxid).map(String::as_str)
    }

    pub fn rank(&self, taxid: TaxId) -> Option<&str> {
        self.rank_map.get(&taxid).map(String::as_str)
    }

    /// Taxids from `taxid` up to the root, leaf first.
    fn ancestry(&self, taxid: TaxId) -> Vec<TaxId> {
        let mut chain = Vec::with_capacity(32);
        let mut current = taxid;
        while current != 0 && chain.len() < MAX_DEPTH {
            chain.push(current);
            match self.parent_map.get(&current) {
                Some(&p) if p != current => current = p,
                _ => break,
            }
        }
        if chain.len() == MAX_DEPTH {
            log::warn!("Taxid {} has a lineage deeper than {}; truncated", taxid, MAX_DEPTH);
        }
        chain
    }

    /// `taxid|superkingdom|phylum|...|species`, with `unk` for missing ranks.
    pub fn lineage_string(&self, taxid: TaxId) -> String {
        let names = self
            .lineage(taxid)
            .ok()
            .flatten()
            .map(|l| l.rank_names())
            .unwrap_or_default();
        let mut out = taxid.to_string();
        for rank in Rank::ALL {
            out.push('|');
            out.push_str(names.get(rank));
        }
        out
    }
}

impl LineageResolver for TaxDB {
    fn lineage(&self, taxid: TaxId) -> std::result::Result<Option<Lineage>, ResolveError> {
        if !self.contains(taxid) {
            return Ok(None);
        }
        let nodes = self
            .ancestry(taxid)
            .into_iter()
            .rev()
            .map(|id| LineageNode {
                taxid: id,
                rank: self.rank(id).unwrap_or("no rank").to_string(),
                name: self.name(id).unwrap_or(UNK).to_string(),
            })
            .collect();
        Ok(Some(Lineage::new(nodes)))
    }
}

fn parse_id(field: &str, path: &Path, lineno: usize) -> Result<TaxId> {
    field
        .trim()
        .parse::<TaxId>()
        .map_err(|_| TaxError::parse(path, lineno + 1, format!("invalid taxid '{}'", field.trim())))
}
