// src/lib.rs
pub mod annotation;
pub mod census;
pub mod consensus;
pub mod errors;
pub mod grouping;
pub mod hits;
pub mod levels;
pub mod lineage;
pub mod taxdb;
pub mod taxstring;
pub mod types;
pub mod utils;

use std::fmt::Write as FmtWrite;

use crate::consensus::ConsensusConfig;
use crate::errors::Result;
use crate::grouping::{aggregate_by, GroupKey, ScaffoldBins};
use crate::levels::{ExpansionConfig, LevelExpander};
use crate::lineage::LineageResolver;
use crate::types::{GeneHit, GeneRankRow, GroupTaxonomy, Rank, TaxId, NO_HIT, UNK};
use crate::utils::format_percent;

pub use crate::errors::TaxError;

/// Everything `classify_hits` needs besides its inputs.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub consensus: ConsensusConfig,
    pub expansion: ExpansionConfig,
    /// Key written in the genome table's single row.
    pub genome_label: String,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            consensus: ConsensusConfig::default(),
            expansion: ExpansionConfig::default(),
            genome_label: "genome".to_string(),
        }
    }
}

/// Gene rows plus every consensus table built from them.
/// Only structured data is stored; text is generated on demand.
pub struct TaxonomyResults {
    pub gene_rows: Vec<GeneRankRow>,
    pub scaffold_table: Vec<GroupTaxonomy>,
    /// Present when a scaffold-to-bin table was supplied.
    pub bin_table: Option<Vec<GroupTaxonomy>>,
    pub genome_table: Vec<GroupTaxonomy>,
    /// Taxids dropped after a failed retry.
    pub excluded: Vec<TaxId>,
}

impl TaxonomyResults {
    /// `gene\tscaffold\ttaxID\t<ranks>`; genes without a scaffold show `unk`
    /// and genes without a taxid show the no-hit id.
    pub fn get_gene_table(&self) -> String {
        let mut output = String::from("gene\tscaffold\ttaxID");
        for rank in Rank::ALL {
            output.push('\t');
            output.push_str(rank.as_str());
        }
        output.push('\n');

        for row in &self.gene_rows {
            write!(
                output,
                "{}\t{}\t{}",
                row.gene,
                row.scaffold.as_deref().unwrap_or(UNK),
                row.taxid.unwrap_or(NO_HIT)
            )
            .unwrap();
            for (_, name) in row.names.iter() {
                output.push('\t');
                output.push_str(name);
            }
            output.push('\n');
        }
        output
    }

    pub fn get_scaffold_table(&self) -> String {
        consensus_table_text(GroupKey::Scaffold.column(), &self.scaffold_table)
    }

    pub fn get_bin_table(&self) -> Option<String> {
        self.bin_table
            .as_ref()
            .map(|rows| consensus_table_text("bin", rows))
    }

    pub fn get_genome_table(&self) -> String {
        consensus_table_text("genome", &self.genome_table)
    }
}

/// Consensus table text: key column, winner and percent per rank, then
/// `full_taxonomy` and `taxonomy`.
pub fn consensus_table_text(key_column: &str, rows: &[GroupTaxonomy]) -> String {
    let mut output = String::from(key_column);
    for rank in Rank::ALL {
        write!(output, "\t{0}_winner\t{0}_percent", rank).unwrap();
    }
    output.push_str("\tfull_taxonomy\ttaxonomy\n");

    for row in rows {
        output.push_str(&row.group);
        for call in &row.ranks {
            write!(output, "\t{}\t{}", call.winner, format_percent(call.percent)).unwrap();
        }
        writeln!(output, "\t{}\t{}", row.full_taxonomy, row.taxonomy).unwrap();
    }
    output
}

/// Expands every hit's taxid to rank names and builds the scaffold, bin
/// (when `stb` is given) and genome consensus tables.
pub fn classify_hits<R: LineageResolver>(
    hits: &[GeneHit],
    resolver: R,
    stb: Option<&ScaffoldBins>,
    options: &PipelineOptions,
) -> Result<TaxonomyResults> {
    options.consensus.validate()?;

    let expander = LevelExpander::with_config(resolver, options.expansion.clone());
    let (gene_rows, excluded) = expander.gene_rows(hits)?;
    let (hits_cached, misses) = expander.cache().stats();
    log::debug!("Lineage cache: {} hits, {} misses", hits_cached, misses);

    let scaffold_table = aggregate_by(&gene_rows, GroupKey::Scaffold, &options.consensus)?;
    let bin_table = match stb {
        Some(stb) => Some(aggregate_by(&gene_rows, GroupKey::Bin(stb), &options.consensus)?),
        None => None,
    };
    let genome_table = aggregate_by(
        &gene_rows,
        GroupKey::Genome(&options.genome_label),
        &options.consensus,
    )?;

    Ok(TaxonomyResults {
        gene_rows,
        scaffold_table,
        bin_table,
        genome_table,
        excluded,
    })
}
