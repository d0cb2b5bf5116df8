//src/consensus.rs

use ahash::AHashMap;
use rayon::prelude::*;
use std::collections::BTreeMap;

use crate::errors::{Result, TaxError};
use crate::taxstring::TaxonomyString;
use crate::types::{GeneRankRow, GroupTaxonomy, Rank, RankConsensus, NUM_RANKS, UNK};

/// How to pick a winner when several names share the top count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TieBreak {
    /// The tied name that appears first in the group's row order.
    #[default]
    FirstSeen,
    /// The lexicographically smallest tied name.
    Lexicographic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusConfig {
    /// A rank's winner is kept only if at least this share (0..=100) of the
    /// group's named rows agree with it.
    pub min_percent: u8,
    pub tie_break: TieBreak,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            min_percent: 50,
            tie_break: TieBreak::FirstSeen,
        }
    }
}

impl ConsensusConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_percent > 100 {
            return Err(TaxError::InvalidThreshold(self.min_percent));
        }
        Ok(())
    }
}

/// Plurality vote over the names of one rank, in row order.
///
/// `unk` votes are ignored entirely: they neither win nor count towards the
/// denominator. With no named votes the call is `unk` at 100%.
pub fn rank_consensus<'a, I>(names: I, tie_break: TieBreak) -> RankConsensus
where
    I: IntoIterator<Item = &'a str>,
{
    // counts kept in first-seen order
    let mut order: Vec<(&'a str, u32)> = Vec::new();
    let mut slot: AHashMap<&'a str, usize> = AHashMap::new();
    let mut total = 0u32;

    for name in names {
        if name == UNK {
            continue;
        }
        total += 1;
        match slot.get(name) {
            Some(&i) => order[i].1 += 1,
            None => {
                slot.insert(name, order.len());
                order.push((name, 1));
            }
        }
    }

    let mut best: Option<(&str, u32)> = None;
    for &(name, count) in &order {
        best = match best {
            None => Some((name, count)),
            Some((b_name, b_count)) => {
                let better = count > b_count
                    || (count == b_count
                        && tie_break == TieBreak::Lexicographic
                        && name < b_name);
                if better { Some((name, count)) } else { Some((b_name, b_count)) }
            }
        };
    }

    match best {
        Some((winner, count)) => RankConsensus {
            winner: winner.to_string(),
            percent: 100.0 * f64::from(count) / f64::from(total),
        },
        None => RankConsensus::no_data(),
    }
}

/// Folds per-rank calls into a taxonomy string, broadest rank first.
///
/// A rank whose support is below `min_percent`, or whose winner is `unk`,
/// collapses to `unk` and takes every narrower rank with it.
pub fn collapse(ranks: &[RankConsensus; NUM_RANKS], min_percent: u8) -> TaxonomyString {
    let threshold = f64::from(min_percent);
    let mut collapsed = false;
    TaxonomyString::new(std::array::from_fn(|i| {
        let call = &ranks[i];
        if collapsed || call.percent < threshold || call.winner == UNK {
            collapsed = true;
            UNK.to_string()
        } else {
            call.winner.clone()
        }
    }))
}

/// Consensus of one group.
///
/// An empty group is a caller bug and is reported as such.
pub fn group_taxonomy(
    group: &str,
    rows: &[&GeneRankRow],
    config: &ConsensusConfig,
) -> Result<GroupTaxonomy> {
    if rows.is_empty() {
        return Err(TaxError::EmptyGroup(group.to_string()));
    }

    let ranks: [RankConsensus; NUM_RANKS] = std::array::from_fn(|i| {
        let rank = Rank::ALL[i];
        rank_consensus(rows.iter().map(|r| r.names.get(rank)), config.tie_break)
    });
    let full_taxonomy = collapse(&ranks, config.min_percent);
    let taxonomy = full_taxonomy.simple().to_string();

    Ok(GroupTaxonomy {
        group: group.to_string(),
        member_count: rows.len(),
        ranks,
        full_taxonomy,
        taxonomy,
    })
}

/// Groups `rows` by `key` and computes the consensus of every group.
///
/// Rows for which `key` returns `None` sit out this aggregation. Groups are
/// returned sorted by name; rows keep their input order inside a group,
/// which is what `TieBreak::FirstSeen` relies on.
pub fn aggregate<F>(
    rows: &[GeneRankRow],
    key: F,
    config: &ConsensusConfig,
) -> Result<Vec<GroupTaxonomy>>
where
    F: Fn(&GeneRankRow) -> Option<String>,
{
    config.validate()?;

    let mut groups: BTreeMap<String, Vec<&GeneRankRow>> = BTreeMap::new();
    let mut skipped = 0usize;
    for row in rows {
        match key(row) {
            Some(k) => groups.entry(k).or_default().push(row),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        log::warn!("{} of {} rows have no group key; left out of this aggregation", skipped, rows.len());
    }

    let groups: Vec<(String, Vec<&GeneRankRow>)> = groups.into_iter().collect();
    let table: Vec<GroupTaxonomy> = groups
        .par_iter()
        .map(|(name, members)| group_taxonomy(name, members, config))
        .collect::<Result<_>>()?;

    log::info!("Computed consensus for {} groups", table.len());
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RankNames;

    fn row(gene: &str, scaffold: &str, lineage: &[&str]) -> GeneRankRow {
        let mut names = RankNames::unknown();
        for (rank, name) in Rank::ALL.iter().zip(lineage) {
            names.set(*rank, *name);
        }
        GeneRankRow {
            gene: gene.to_string(),
            scaffold: Some(scaffold.to_string()),
            taxid: Some(1),
            names,
        }
    }

    fn by_scaffold(r: &GeneRankRow) -> Option<String> {
        r.scaffold.clone()
    }

    #[test]
    fn majority_phylum_is_accepted() {
        let rows = vec![
            row("s1_1", "s1", &["Bacteria", "Firmicutes"]),
            row("s1_2", "s1", &["Bacteria", "Firmicutes"]),
            row("s1_3", "s1", &["Bacteria", "Bacteroidetes"]),
        ];
        let table = aggregate(&rows, by_scaffold, &ConsensusConfig::default()).unwrap();
        assert_eq!(table.len(), 1);
        let phylum = table[0].rank(Rank::Phylum);
        assert_eq!(phylum.winner, "Firmicutes");
        assert!((phylum.percent - 66.666_666).abs() < 1e-3);
        assert_eq!(table[0].full_taxonomy.to_string(), "Bacteria|Firmicutes|unk|unk|unk|unk|unk");
        assert_eq!(table[0].taxonomy, "Firmicutes");
    }

    #[test]
    fn all_no_hit_group_is_unknown_at_full_support() {
        let rows: Vec<GeneRankRow> = (1..=3).map(|i| row(&format!("s9_{}", i), "s9", &[])).collect();
        let table = aggregate(&rows, by_scaffold, &ConsensusConfig::default()).unwrap();
        let g = &table[0];
        for rank in Rank::ALL {
            assert_eq!(g.rank(rank).winner, UNK);
            assert_eq!(g.rank(rank).percent, 100.0);
        }
        assert_eq!(g.full_taxonomy.to_string(), "unk|unk|unk|unk|unk|unk|unk");
        assert_eq!(g.taxonomy, UNK);
    }

    #[test]
    fn unk_rows_are_left_out_of_the_denominator() {
        let c = rank_consensus(["unk", "Firmicutes", "unk", "Firmicutes"], TieBreak::FirstSeen);
        assert_eq!(c.winner, "Firmicutes");
        assert_eq!(c.percent, 100.0);
    }

    #[test]
    fn first_seen_tie_break_is_stable() {
        let rows = vec![
            row("s1_1", "s1", &["Bacteria", "Firmicutes", "Clostridia", "Clostridiales", "Lachnospiraceae", "Roseburia"]),
            row("s1_2", "s1", &["Bacteria", "Firmicutes", "Clostridia", "Clostridiales", "Lachnospiraceae", "Blautia"]),
        ];
        let config = ConsensusConfig::default();
        let first = aggregate(&rows, by_scaffold, &config).unwrap();
        assert_eq!(first[0].rank(Rank::Genus).winner, "Roseburia");
        assert_eq!(first[0].rank(Rank::Genus).percent, 50.0);
        for _ in 0..10 {
            assert_eq!(aggregate(&rows, by_scaffold, &config).unwrap(), first);
        }

        let swapped = vec![rows[1].clone(), rows[0].clone()];
        let table = aggregate(&swapped, by_scaffold, &config).unwrap();
        assert_eq!(table[0].rank(Rank::Genus).winner, "Blautia");
    }

    #[test]
    fn lexicographic_tie_break_ignores_order() {
        let c = rank_consensus(["Roseburia", "Blautia"], TieBreak::Lexicographic);
        assert_eq!(c.winner, "Blautia");
        let c = rank_consensus(["Blautia", "Roseburia"], TieBreak::Lexicographic);
        assert_eq!(c.winner, "Blautia");
        // a strictly larger count still wins
        let c = rank_consensus(["Roseburia", "Blautia", "Roseburia"], TieBreak::Lexicographic);
        assert_eq!(c.winner, "Roseburia");
    }

    #[test]
    fn first_seen_is_not_alphabetical() {
        let c = rank_consensus(["Zeta", "Alpha", "Alpha", "Zeta"], TieBreak::FirstSeen);
        assert_eq!(c.winner, "Zeta");
    }

    #[test]
    fn collapse_is_monotone() {
        let rows = vec![
            row("a_1", "a", &["Bacteria", "Firmicutes", "Clostridia", "Clostridiales", "Lachnospiraceae", "Roseburia"]),
            row("a_2", "a", &["Bacteria", "Firmicutes", "Bacilli", "Bacillales", "Lachnospiraceae", "Roseburia"]),
            row("a_3", "a", &["Bacteria", "Firmicutes", "Negativicutes", "Clostridiales", "Lachnospiraceae", "Roseburia"]),
        ];
        let table = aggregate(&rows, by_scaffold, &ConsensusConfig { min_percent: 50, ..Default::default() }).unwrap();
        let g = &table[0];
        // class is split three ways, so family and genus never recover
        assert_eq!(g.rank(Rank::Genus).percent, 100.0);
        assert_eq!(g.full_taxonomy.to_string(), "Bacteria|Firmicutes|unk|unk|unk|unk|unk");

        let names = g.full_taxonomy.names();
        let first_unk = names.iter().position(|n| n == UNK).unwrap();
        assert!(names[first_unk..].iter().all(|n| n == UNK));
    }

    #[test]
    fn missing_rank_collapses_narrower_ranks() {
        // e.g. a species placed directly under an order
        let mut r = row("a_1", "a", &["Bacteria", "Firmicutes", "Clostridia", "Clostridiales"]);
        r.names.set(Rank::Species, "[Eubacterium] rectale");
        let table = aggregate(&[r], by_scaffold, &ConsensusConfig::default()).unwrap();
        assert_eq!(table[0].rank(Rank::Species).winner, "[Eubacterium] rectale");
        assert_eq!(
            table[0].full_taxonomy.to_string(),
            "Bacteria|Firmicutes|Clostridia|Clostridiales|unk|unk|unk"
        );
        assert_eq!(table[0].taxonomy, "Clostridiales");
    }

    #[test]
    fn threshold_is_inclusive() {
        let c = [
            RankConsensus { winner: "Bacteria".into(), percent: 50.0 },
            RankConsensus { winner: "Firmicutes".into(), percent: 49.9 },
            RankConsensus::no_data(),
            RankConsensus::no_data(),
            RankConsensus::no_data(),
            RankConsensus::no_data(),
            RankConsensus::no_data(),
        ];
        assert_eq!(collapse(&c, 50).to_string(), "Bacteria|unk|unk|unk|unk|unk|unk");
        assert_eq!(collapse(&c, 0).to_string(), "Bacteria|Firmicutes|unk|unk|unk|unk|unk");
        assert_eq!(collapse(&c, 100).to_string(), "unk|unk|unk|unk|unk|unk|unk");
    }

    #[test]
    fn percent_stays_in_range() {
        let votes = ["a", "b", "unk", "a", "c", "unk", "b", "a"];
        for n in 0..=votes.len() {
            let c = rank_consensus(votes[..n].iter().copied(), TieBreak::FirstSeen);
            assert!(c.percent >= 0.0 && c.percent <= 100.0);
        }
    }

    #[test]
    fn groups_are_sorted_and_skip_unkeyed_rows() {
        let mut rows = vec![
            row("b_1", "b", &["Bacteria"]),
            row("a_1", "a", &["Archaea"]),
        ];
        rows.push(GeneRankRow { scaffold: None, ..row("orphan", "x", &["Bacteria"]) });
        let table = aggregate(&rows, by_scaffold, &ConsensusConfig::default()).unwrap();
        let names: Vec<&str> = table.iter().map(|g| g.group.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(table.iter().map(|g| g.member_count).sum::<usize>(), 2);
    }

    #[test]
    fn empty_group_is_an_error() {
        match group_taxonomy("s1", &[], &ConsensusConfig::default()) {
            Err(TaxError::EmptyGroup(g)) => assert_eq!(g, "s1"),
            other => panic!("expected EmptyGroup, got {:?}", other),
        }
    }

    #[test]
    fn threshold_above_100_is_rejected() {
        let config = ConsensusConfig { min_percent: 101, ..Default::default() };
        assert!(matches!(aggregate(&[], by_scaffold, &config), Err(TaxError::InvalidThreshold(101))));
    }
}
