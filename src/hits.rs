//src/hits.rs

use std::io::BufRead;
use std::path::Path;

use crate::errors::{Result, TaxError};
use crate::grouping::scaffold_of;
use crate::types::{GeneHit, TaxId};
use crate::utils::open_reader;

/// Number of leading lines used to sniff the table flavour.
const SNIFF_LINES: usize = 5;

/// The two tabular hit flavours we read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitFormat {
    /// 13-column b6 whose last column carries `annotation ; ... TaxID=<n> ... ; "lineage"`.
    /// Target ids have exactly one underscore.
    B6Plus,
    /// DIAMOND output against a database whose target ids are
    /// `<accession>_<species taxid>_<group taxid>`.
    Diamond,
}

/// Which DIAMOND target field holds the taxid to classify with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaxType {
    #[default]
    Species,
    Group,
}

impl TaxType {
    fn field(self) -> usize {
        match self {
            TaxType::Species => 1,
            TaxType::Group => 2,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub tax_type: TaxType,
    /// Force a format instead of sniffing it.
    pub format: Option<HitFormat>,
    /// Drop hits scoring below this.
    pub min_bit_score: Option<f32>,
}

/// Guesses the format from the underscores in the target column of the
/// first few lines: all ones is b6+, all twos is DIAMOND.
pub fn detect_format<S: AsRef<str>>(lines: &[S], path: &Path) -> Result<HitFormat> {
    let counts: Vec<usize> = lines
        .iter()
        .map(|l| l.as_ref())
        .filter(|l| !l.trim().is_empty())
        .take(SNIFF_LINES)
        .map(|l| l.split_whitespace().nth(1).map(|t| t.matches('_').count()).unwrap_or(0))
        .collect();

    let all = |n: usize| !counts.is_empty() && counts.iter().all(|&c| c == n);
    if all(1) {
        Ok(HitFormat::B6Plus)
    } else if all(2) {
        Ok(HitFormat::Diamond)
    } else {
        Err(TaxError::UnknownHitFormat {
            path: path.to_path_buf(),
            counts,
        })
    }
}

/// Loads a hit table, returning the detected format and every hit.
pub fn load_hits<P: AsRef<Path>>(path: P, options: &LoadOptions) -> Result<(HitFormat, Vec<GeneHit>)> {
    let path = path.as_ref();
    let lines: Vec<String> = open_reader(path)?.lines().collect::<std::io::Result<_>>()?;
    let format = match options.format {
        Some(f) => f,
        None => detect_format(&lines, path)?,
    };

    let mut hits = Vec::with_capacity(lines.len());
    let mut below_score = 0usize;
    for (lineno, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let hit = parse_hit_line(line, format, options.tax_type)
            .map_err(|msg| TaxError::parse(path, lineno + 1, msg))?;
        if options.min_bit_score.map_or(false, |min| hit.bit_score < min) {
            below_score += 1;
            continue;
        }
        hits.push(hit);
    }

    let unplaced = hits.iter().filter(|h| h.scaffold.is_none()).count();
    if unplaced > 0 {
        log::warn!("{} genes have no `_<n>` suffix; they are left out of scaffold and genome calls", unplaced);
    }
    if below_score > 0 {
        log::info!("Dropped {} hits below the bit-score cutoff", below_score);
    }
    log::info!("Loaded {} hits ({:?}) from {}", hits.len(), format, path.display());
    Ok((format, hits))
}

/// Parses one tab-separated hit line.
pub fn parse_hit_line(line: &str, format: HitFormat, tax_type: TaxType) -> std::result::Result<GeneHit, String> {
    let cols: Vec<&str> = line.trim_end_matches(|c| c == '\r' || c == '\n').split('\t').collect();
    if cols.len() < 12 {
        return Err(format!("expected at least 12 tab-separated columns, found {}", cols.len()));
    }

    fn num<T: std::str::FromStr>(cols: &[&str], i: usize, what: &str) -> std::result::Result<T, String> {
        cols[i]
            .trim()
            .parse::<T>()
            .map_err(|_| format!("invalid {} '{}'", what, cols[i]))
    }

    let query = cols[0].to_string();
    let target = cols[1].to_string();
    let extra = cols.get(12).map(|s| s.to_string()).unwrap_or_default();

    let (annotation, taxid, tax_string) = match format {
        HitFormat::B6Plus => {
            let (a, t, s) = parse_b6_extra(&extra);
            (Some(a), t, s)
        }
        HitFormat::Diamond => (None, parse_diamond_target(&target, tax_type), None),
    };

    Ok(GeneHit {
        scaffold: scaffold_of(&query, format),
        query,
        target,
        percent_id: num(&cols, 2, "percent identity")?,
        alignment_length: num(&cols, 3, "alignment length")?,
        mismatches: num(&cols, 4, "mismatch count")?,
        gap_opens: num(&cols, 5, "gap count")?,
        query_start: num(&cols, 6, "query start")?,
        query_end: num(&cols, 7, "query end")?,
        target_start: num(&cols, 8, "target start")?,
        target_end: num(&cols, 9, "target end")?,
        evalue: num(&cols, 10, "e-value")?,
        bit_score: num(&cols, 11, "bit score")?,
        raw_columns: cols[..12].join("\t"),
        extra,
        annotation,
        taxid,
        tax_string,
    })
}

/// Splits a b6+ annotation column into `(annotation, taxid, quoted lineage)`.
///
/// e.g. `Chaperone protein DnaK n=1 ; Tax=Roseburia ; TaxID=841 RepID=X ; "Bacteria;Firmicutes"`
pub fn parse_b6_extra(extra: &str) -> (String, Option<TaxId>, Option<String>) {
    let words: Vec<&str> = extra.split(';').map(str::trim).collect();
    let annotation = words.first().map(|w| w.to_string()).unwrap_or_default();

    let taxid = words
        .iter()
        .find(|w| w.starts_with("TaxID"))
        .and_then(|w| w.split_whitespace().next())
        .and_then(|w| parse_taxid(w.trim_start_matches("TaxID=")));

    let tax_string = extra.split('"').nth(1).map(str::to_string);

    (annotation, taxid, tax_string)
}

/// Taxid embedded in a DIAMOND target id, e.g. `UniRef100_841_186803`.
pub fn parse_diamond_target(target: &str, tax_type: TaxType) -> Option<TaxId> {
    target.split('_').nth(tax_type.field()).and_then(parse_taxid)
}

/// Accepts `841` as well as float renderings like `841.0`; anything else,
/// including `NA`, is no taxid.
fn parse_taxid(field: &str) -> Option<TaxId> {
    let field = field.trim();
    field.parse::<TaxId>().ok().or_else(|| {
        field
            .parse::<f64>()
            .ok()
            .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f <= f64::from(TaxId::MAX))
            .map(|f| f as TaxId)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const B6_LINE: &str = "N1_scaffold_3_2\tUniRef100_A0A174\t87.5\t240\t30\t0\t1\t240\t1\t240\t1.2e-98\t402.1\tChaperone protein DnaK n=1 ; Tax=Roseburia ; TaxID=841 RepID=A0A174 ; \"Bacteria;Firmicutes;Clostridia\"";
    const DIAMOND_LINE: &str = "S1_scaffold_9_14|partial=00\tA0A174_841_186803\t91.2\t120\t10\t1\t1\t120\t5\t124\t3e-60\t230.5";

    #[test]
    fn parses_b6_plus_line() {
        let hit = parse_hit_line(B6_LINE, HitFormat::B6Plus, TaxType::Species).unwrap();
        assert_eq!(hit.query, "N1_scaffold_3_2");
        assert_eq!(hit.scaffold.as_deref(), Some("N1_scaffold_3"));
        assert_eq!(hit.taxid, Some(841));
        assert_eq!(hit.annotation.as_deref(), Some("Chaperone protein DnaK n=1"));
        assert_eq!(hit.tax_string.as_deref(), Some("Bacteria;Firmicutes;Clostridia"));
        assert_eq!(hit.alignment_length, 240);
        assert!(hit.raw_columns.ends_with("\t1.2e-98\t402.1"));
        assert_eq!(hit.raw_columns.split('\t').count(), 12);
        assert!((hit.bit_score - 402.1).abs() < 1e-3);
    }

    #[test]
    fn parses_diamond_line() {
        let hit = parse_hit_line(DIAMOND_LINE, HitFormat::Diamond, TaxType::Species).unwrap();
        assert_eq!(hit.scaffold.as_deref(), Some("S1_scaffold_9"));
        assert_eq!(hit.taxid, Some(841));
        assert_eq!(hit.annotation, None);
        assert_eq!(hit.extra, "");

        let hit = parse_hit_line(DIAMOND_LINE, HitFormat::Diamond, TaxType::Group).unwrap();
        assert_eq!(hit.taxid, Some(186803));
    }

    #[test]
    fn unparsable_taxids_are_absent() {
        assert_eq!(parse_diamond_target("A0A174_NA_NA", TaxType::Species), None);
        assert_eq!(parse_diamond_target("A0A174", TaxType::Species), None);
        assert_eq!(parse_diamond_target("A0A174_841.0_2", TaxType::Species), Some(841));
        let (annotation, taxid, lineage) = parse_b6_extra("hypothetical protein ; Tax=unknown");
        assert_eq!(annotation, "hypothetical protein");
        assert_eq!(taxid, None);
        assert_eq!(lineage, None);
        assert_eq!(parse_b6_extra("x ; TaxID=NA RepID=Q").1, None);
    }

    #[test]
    fn short_or_bad_lines_are_rejected() {
        assert!(parse_hit_line("a\tb\tc", HitFormat::B6Plus, TaxType::Species).is_err());
        let bad = B6_LINE.replace("\t240\t30\t", "\tlong\t30\t");
        let err = parse_hit_line(&bad, HitFormat::B6Plus, TaxType::Species).unwrap_err();
        assert!(err.contains("alignment length"));
    }

    #[test]
    fn detects_formats() {
        let p = Path::new("hits.b6");
        assert_eq!(detect_format(&[B6_LINE, B6_LINE], p).unwrap(), HitFormat::B6Plus);
        assert_eq!(detect_format(&[DIAMOND_LINE], p).unwrap(), HitFormat::Diamond);
        match detect_format(&[B6_LINE, DIAMOND_LINE], p) {
            Err(TaxError::UnknownHitFormat { counts, .. }) => assert_eq!(counts, vec![1, 2]),
            other => panic!("expected UnknownHitFormat, got {:?}", other),
        }
        assert!(detect_format::<&str>(&[], p).is_err());
    }

    #[test]
    fn loads_file_and_applies_score_cutoff() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("genes.b6");
        let low = B6_LINE.replace("402.1", "50.0").replace("N1_scaffold_3_2", "N1_scaffold_4_1");
        fs::write(&path, format!("{}\n{}\n\n", B6_LINE, low)).unwrap();

        let (format, hits) = load_hits(&path, &LoadOptions::default()).unwrap();
        assert_eq!(format, HitFormat::B6Plus);
        assert_eq!(hits.len(), 2);

        let opts = LoadOptions { min_bit_score: Some(100.0), ..Default::default() };
        let (_, hits) = load_hits(&path, &opts).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].query, "N1_scaffold_3_2");
    }

    #[test]
    fn parse_errors_carry_the_line_number() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("genes.b6");
        fs::write(&path, format!("{}\nbroken_1\tT_1\n", B6_LINE)).unwrap();
        match load_hits(&path, &LoadOptions::default()) {
            Err(TaxError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected parse error, got {:?}", other),
        }
    }
}
