//src/annotation.rs

use ahash::{AHashMap, AHashSet};
use std::fmt::Write as FmtWrite;
use std::io::BufRead;
use std::path::Path;

use crate::errors::Result;
use crate::types::GeneHit;
use crate::utils::open_reader;

/// target id -> functional annotation
pub type AnnotationMap = AHashMap<String, String>;

/// Reads a (gzipped) `id\tannotation` table, keeping only ids in `wanted`.
/// Passing `None` keeps everything.
pub fn load_annotations<P: AsRef<Path>>(
    path: P,
    wanted: Option<&AHashSet<&str>>,
) -> Result<AnnotationMap> {
    let path = path.as_ref();
    let mut map = AnnotationMap::new();
    let mut lines = 0usize;

    for line in open_reader(path)?.lines() {
        let line = line?;
        lines += 1;
        let line = line.trim_end();
        let Some((id, annotation)) = line.split_once('\t') else {
            continue;
        };
        if wanted.map_or(true, |w| w.contains(id)) {
            map.insert(id.to_string(), annotation.to_string());
        }
    }

    log::info!(
        "Kept {} of {} annotations from {}",
        map.len(),
        lines,
        path.display()
    );
    Ok(map)
}

/// Loads only the annotations of the targets hit in `hits`.
pub fn annotations_for_hits<P: AsRef<Path>>(path: P, hits: &[GeneHit]) -> Result<AnnotationMap> {
    let wanted: AHashSet<&str> = hits.iter().map(|h| h.target.as_str()).collect();
    load_annotations(path, Some(&wanted))
}

/// The hit table with a trailing `functional_annotation` column.
/// Hit columns are written as read; targets missing from `map` get an empty
/// annotation.
pub fn annotated_hits_text(hits: &[GeneHit], map: &AnnotationMap) -> String {
    let mut output = String::new();
    output.push_str("query\ttarget\tpercentID\talignment_length\tmm\tgaps\tquery_start\tquery_end\ttarget_start\ttarget_end\te-value\tbit_score\textra\tfunctional_annotation\n");
    for h in hits {
        let annotation = map.get(&h.target).map(String::as_str).unwrap_or("");
        writeln!(output, "{}\t{}\t{}", h.raw_columns, h.extra, annotation).unwrap();
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hits::{parse_hit_line, HitFormat, TaxType};
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::fs::File;
    use std::io::Write;

    fn write_gz(path: &Path, text: &str) {
        let mut enc = GzEncoder::new(File::create(path).unwrap(), Compression::default());
        enc.write_all(text.as_bytes()).unwrap();
        enc.finish().unwrap();
    }

    #[test]
    fn keeps_only_wanted_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uniref2ko.tsv.gz");
        write_gz(&path, "UniRef100_A\tK04043 dnaK\nUniRef100_B\tK03686 dnaJ\nmalformed\n");

        let all = load_annotations(&path, None).unwrap();
        assert_eq!(all.len(), 2);

        let wanted: AHashSet<&str> = ["UniRef100_B"].into_iter().collect();
        let some = load_annotations(&path, Some(&wanted)).unwrap();
        assert_eq!(some.len(), 1);
        assert_eq!(some["UniRef100_B"], "K03686 dnaJ");
    }

    #[test]
    fn joins_annotations_onto_hits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tt.gz");
        write_gz(&path, "UniRef100_A\tK04043 dnaK\n");

        let hits = vec![
            parse_hit_line("s_1\tUniRef100_A\t90\t10\t1\t0\t1\t10\t1\t10\t1e-5\t50\tx ; TaxID=2", HitFormat::B6Plus, TaxType::Species).unwrap(),
            parse_hit_line("s_2\tUniRef100_Z\t90\t10\t1\t0\t1\t10\t1\t10\t1e-5\t50\ty ; TaxID=2", HitFormat::B6Plus, TaxType::Species).unwrap(),
        ];
        let map = annotations_for_hits(&path, &hits).unwrap();
        let text = annotated_hits_text(&hits, &map);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("functional_annotation"));
        assert!(lines[1].ends_with("\tK04043 dnaK"));
        assert!(lines[2].ends_with("\t"));
    }

    #[test]
    fn hit_columns_keep_their_text_form() {
        let line = "s_1\tUniRef100_A\t100.0\t10\t0\t0\t1\t10\t1\t10\t0.0\t50.0";
        let hits = vec![parse_hit_line(line, HitFormat::B6Plus, TaxType::Species).unwrap()];
        let mut map = AnnotationMap::new();
        map.insert("UniRef100_A".to_string(), "K04043".to_string());
        let text = annotated_hits_text(&hits, &map);
        assert_eq!(text.lines().nth(1).unwrap(), format!("{}\t\tK04043", line));
    }
}
