use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, SourceMapError};
use crate::map::{PositionMap, PositionMapEntry};
use crate::vlq;

const XSSI_PREFIX: &str = ")]}'";

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct RawSourceMap {
    version: u32,
    file: Option<String>,
    source_root: Option<String>,
    #[serde(default)]
    sources: Vec<Option<String>>,
    mappings: Option<String>,
    sections: Option<serde_json::Value>,
}

/// Parses a Source Map revision 3 document into a [`PositionMap`].
pub fn parse(raw: &str) -> Result<PositionMap> {
    let raw = strip_xssi_prefix(raw);
    let raw_map: RawSourceMap = serde_json::from_str(raw)
        .map_err(|e| SourceMapError::MalformedMap(format!("Invalid JSON: {}", e)))?;

    if raw_map.version != 3 {
        return Err(SourceMapError::MalformedMap(format!(
            "Unsupported version {}",
            raw_map.version
        )));
    }

    if raw_map.sections.is_some() {
        return Err(SourceMapError::MalformedMap(
            "Index maps with sections are not supported".to_string(),
        ));
    }

    let file = raw_map
        .file
        .filter(|file| !file.is_empty())
        .ok_or_else(|| SourceMapError::MalformedMap("Missing emitted file name".to_string()))?;
    let mappings = raw_map
        .mappings
        .ok_or_else(|| SourceMapError::MalformedMap("Missing mappings".to_string()))?;

    let sources = raw_map
        .sources
        .into_iter()
        .map(|source| with_source_root(raw_map.source_root.as_deref(), &source.unwrap_or_default()))
        .collect::<Vec<_>>();

    let entries = decode_mappings(&mappings, sources.len())?;
    debug!(file = %file, entries = entries.len(), "Parsed position map");

    Ok(PositionMap::new(file, sources, entries))
}

/// Reads and parses the position map stored at `path`.
pub fn parse_file(path: &Path) -> Result<PositionMap> {
    let raw = fs::read_to_string(path).map_err(|source| SourceMapError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&raw)
}

fn strip_xssi_prefix(raw: &str) -> &str {
    match raw.strip_prefix(XSSI_PREFIX) {
        Some(rest) => rest.split_once('\n').map(|(_, json)| json).unwrap_or(""),
        None => raw,
    }
}

fn with_source_root(source_root: Option<&str>, source: &str) -> String {
    match source_root {
        Some(root) if !root.is_empty() => {
            if root.ends_with('/') {
                format!("{}{}", root, source)
            } else {
                format!("{}/{}", root, source)
            }
        }
        _ => source.to_string(),
    }
}

fn decode_mappings(mappings: &str, source_count: usize) -> Result<Vec<PositionMapEntry>> {
    let mut entries = Vec::new();
    let mut source: i64 = 0;
    let mut source_line: i64 = 0;
    let mut source_column: i64 = 0;

    for (line_index, line) in mappings.split(';').enumerate() {
        let emitted_line = to_line(line_index as i64)?;
        let mut emitted_column: i64 = 0;

        for segment in line.split(',').filter(|s| !s.is_empty()) {
            let fields = vlq::decode_segment(segment)?;

            match fields.as_slice() {
                [column] => {
                    emitted_column = emitted_column.saturating_add(*column);
                }
                [column, source_delta, line_delta, column_delta]
                | [column, source_delta, line_delta, column_delta, _] => {
                    emitted_column = emitted_column.saturating_add(*column);
                    source = source.saturating_add(*source_delta);
                    source_line = source_line.saturating_add(*line_delta);
                    source_column = source_column.saturating_add(*column_delta);

                    if source < 0 || source as usize >= source_count {
                        return Err(SourceMapError::MalformedMap(format!(
                            "Source index {} out of range in segment '{}'",
                            source, segment
                        )));
                    }

                    entries.push(PositionMapEntry {
                        source_line: to_line(source_line)?,
                        source_column: to_column(source_column)?,
                        emitted_line,
                        emitted_column: to_column(emitted_column)?,
                        source: source as u32,
                    });
                }
                _ => {
                    return Err(SourceMapError::MalformedMap(format!(
                        "Segment '{}' has {} fields",
                        segment,
                        fields.len()
                    )));
                }
            }
        }
    }

    Ok(entries)
}

fn to_line(zero_based: i64) -> Result<u32> {
    u32::try_from(zero_based + 1)
        .ok()
        .filter(|line| *line > 0)
        .ok_or_else(|| SourceMapError::MalformedMap(format!("Invalid line {}", zero_based)))
}

fn to_column(column: i64) -> Result<u32> {
    u32::try_from(column)
        .map_err(|_| SourceMapError::MalformedMap(format!("Invalid column {}", column)))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use rstest::rstest;

    use super::*;

    #[test]
    fn test_parse_simple_map() {
        let map = parse(
            r#"{"version":3,"file":"app.js","sources":["app.ts"],"names":[],"mappings":"AAAA;AAEA;;AAEA"}"#,
        )
        .unwrap();

        assert_eq!(map.file(), "app.js");
        assert_eq!(map.sources(), &["app.ts".to_string()]);
        assert_eq!(map.entries().len(), 3);
        assert_eq!(map.item_by_source_line(1).map(|e| e.emitted_line), Some(1));
        assert_eq!(map.item_by_source_line(3).map(|e| e.emitted_line), Some(2));
        assert_eq!(map.item_by_source_line(5).map(|e| e.emitted_line), Some(4));
        assert!(map.item_by_emitted_line(3).is_none());
    }

    #[test]
    fn test_parse_relative_segments_across_lines() {
        // Second line: column 4, same source, source line +1, source column +2.
        let map = parse(
            r#"{"version":3,"file":"app.js","sources":["app.ts"],"mappings":"AAAA,IAAE;IACE"}"#,
        )
        .unwrap();

        let second = map.item_by_emitted_line(2).unwrap();
        assert_eq!(second.emitted_column, 4);
        assert_eq!(second.source_line, 2);
        assert_eq!(second.source_column, 4);
        assert_eq!(map.item_by_emitted_line(1).unwrap().emitted_column, 0);
    }

    #[test]
    fn test_parse_multiple_sources() {
        let map = parse(
            r#"{"version":3,"file":"bundle.js","sourceRoot":"src","sources":["a.ts","b.ts"],"mappings":"AAAA;ACAA"}"#,
        )
        .unwrap();

        let first = map.item_by_emitted_line(1).unwrap();
        let second = map.item_by_emitted_line(2).unwrap();
        assert_eq!(map.source_path(first), Some("src/a.ts"));
        assert_eq!(map.source_path(second), Some("src/b.ts"));
    }

    #[test]
    fn test_parse_skips_segments_without_source() {
        let map = parse(r#"{"version":3,"file":"app.js","sources":["app.ts"],"mappings":"A;AAAA"}"#)
            .unwrap();
        assert_eq!(map.entries().len(), 1);
        assert!(map.item_by_emitted_line(1).is_none());
        assert_eq!(map.item_by_emitted_line(2).map(|e| e.source_line), Some(1));
    }

    #[test]
    fn test_parse_with_xssi_prefix() {
        let map = parse(
            ")]}'\n{\"version\":3,\"file\":\"app.js\",\"sources\":[\"app.ts\"],\"mappings\":\"AAAA\"}",
        )
        .unwrap();
        assert_eq!(map.file(), "app.js");
    }

    #[rstest]
    #[case::not_json("not a map")]
    #[case::wrong_version(r#"{"version":2,"file":"app.js","sources":[],"mappings":""}"#)]
    #[case::missing_file(r#"{"version":3,"sources":["app.ts"],"mappings":"AAAA"}"#)]
    #[case::empty_file(r#"{"version":3,"file":"","sources":["app.ts"],"mappings":"AAAA"}"#)]
    #[case::missing_mappings(r#"{"version":3,"file":"app.js","sources":["app.ts"]}"#)]
    #[case::sections(r#"{"version":3,"file":"app.js","sections":[]}"#)]
    #[case::bad_base64(r#"{"version":3,"file":"app.js","sources":["app.ts"],"mappings":"AA!A"}"#)]
    #[case::two_fields(r#"{"version":3,"file":"app.js","sources":["app.ts"],"mappings":"AA"}"#)]
    #[case::source_out_of_range(r#"{"version":3,"file":"app.js","sources":["app.ts"],"mappings":"ACAA"}"#)]
    #[case::negative_line(r#"{"version":3,"file":"app.js","sources":["app.ts"],"mappings":"AADA"}"#)]
    fn test_parse_malformed(#[case] raw: &str) {
        assert!(matches!(parse(raw), Err(SourceMapError::MalformedMap(_))));
    }

    #[test]
    fn test_parse_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"version":3,"file":"app.js","sources":["app.ts"],"mappings":"AAAA"}}"#
        )
        .unwrap();

        let map = parse_file(file.path()).unwrap();
        assert_eq!(map.file(), "app.js");
    }

    #[test]
    fn test_parse_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let result = parse_file(&dir.path().join("missing.js.map"));
        assert!(matches!(result, Err(SourceMapError::Io { .. })));
    }
}
