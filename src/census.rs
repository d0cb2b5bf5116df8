//src/census.rs

use ahash::AHashMap;
use std::fmt::Write as FmtWrite;

use crate::errors::Result;
use crate::levels::LevelExpander;
use crate::lineage::LineageResolver;
use crate::types::{CensusRow, Rank, TaxId, NUM_RANKS, NO_HIT};
use crate::utils::format_percent;

/// Tallies every name at every canonical rank across a set of hits.
///
/// Confidence is relative to the number of hits that reached a phylum, so a
/// hit set dominated by unplaced sequences does not dilute the numbers.
/// Each distinct taxid is resolved once, so an id excluded after a failed
/// retry is left out of every occurrence. Rows come rank by rank (broadest
/// first), then by descending count, ties in first-seen order.
pub fn rank_census<R, I>(expander: &LevelExpander<R>, taxids: I) -> Result<Vec<CensusRow>>
where
    R: LineageResolver,
    I: IntoIterator<Item = TaxId>,
{
    let taxids: Vec<TaxId> = taxids.into_iter().filter(|&t| t != NO_HIT).collect();
    let table = expander.expand_all(taxids.iter().copied())?;
    if !table.excluded.is_empty() {
        log::warn!("Leaving {} taxids out of the census", table.excluded.len());
    }

    let mut counts: [Vec<(String, u32)>; NUM_RANKS] = Default::default();
    let mut slots: [AHashMap<String, usize>; NUM_RANKS] = Default::default();

    for taxid in taxids {
        let Some(names) = table.get(taxid) else {
            continue;
        };
        for (rank, name) in names.iter() {
            if !names.is_known(rank) {
                continue;
            }
            let i = rank.index();
            match slots[i].get(name) {
                Some(&slot) => counts[i][slot].1 += 1,
                None => {
                    slots[i].insert(name.to_string(), counts[i].len());
                    counts[i].push((name.to_string(), 1));
                }
            }
        }
    }

    let total: u32 = counts[Rank::Phylum.index()].iter().map(|(_, c)| c).sum();

    let mut rows = Vec::new();
    for rank in Rank::ALL {
        let mut entries = std::mem::take(&mut counts[rank.index()]);
        // stable, so ties stay in first-seen order
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        for (name, count) in entries {
            let tax_confidence = if total == 0 {
                0.0
            } else {
                100.0 * f64::from(count) / f64::from(total)
            };
            rows.push(CensusRow {
                tax_confidence,
                rank,
                name,
                count,
            });
        }
    }
    Ok(rows)
}

/// `tax_confidence\ttax_level\ttaxonomy` table.
pub fn census_text(rows: &[CensusRow]) -> String {
    let mut output = String::from("tax_confidence\ttax_level\ttaxonomy\n");
    for row in rows {
        writeln!(
            output,
            "{}\t{}\t{}",
            format_percent(row.tax_confidence),
            row.rank,
            row.name
        )
        .unwrap();
    }
    output
}
