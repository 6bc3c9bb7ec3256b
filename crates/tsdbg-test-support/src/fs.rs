use std::io::Write;
use std::{fs::File, path::Path, path::PathBuf};

pub fn create_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    let mut file = File::create(&path).expect("Failed to create file");
    file.write_all(content.as_bytes())
        .expect("Failed to write to file");
    path
}

fn encode_vlq(value: i64, out: &mut String) {
    const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

    let mut vlq = if value < 0 {
        ((-value) << 1) | 1
    } else {
        value << 1
    };

    loop {
        let mut digit = vlq & 0b11111;
        vlq >>= 5;
        if vlq > 0 {
            digit |= 0b100000;
        }
        out.push(ALPHABET[digit as usize] as char);
        if vlq == 0 {
            break;
        }
    }
}

/// Builds a Source Map v3 document for `file` with one source.
///
/// `lines` holds `(source_line, emitted_line)` pairs, 1-based, each mapped at column 0.
pub fn position_map_json(file: &str, source: &str, lines: &[(u32, u32)]) -> String {
    let entries = lines
        .iter()
        .map(|(source_line, emitted_line)| (0, *source_line, *emitted_line))
        .collect::<Vec<_>>();
    bundle_map_json(file, &[source], &entries)
}

/// Builds a Source Map v3 document for a `file` bundled from several sources.
///
/// `entries` holds `(source_index, source_line, emitted_line)`, lines 1-based,
/// each mapped at column 0.
pub fn bundle_map_json(file: &str, sources: &[&str], entries: &[(u32, u32, u32)]) -> String {
    let mut sorted = entries.to_vec();
    sorted.sort_by_key(|(_, _, emitted)| *emitted);

    let mut mappings = String::new();
    let mut current_line = 1;
    let mut previous_source: i64 = 0;
    let mut previous_source_line: i64 = 0;

    for (source, source_line, emitted_line) in sorted {
        while current_line < emitted_line {
            mappings.push(';');
            current_line += 1;
        }
        if !mappings.is_empty() && !mappings.ends_with(';') {
            mappings.push(',');
        }
        let zero_based = i64::from(source_line) - 1;
        encode_vlq(0, &mut mappings);
        encode_vlq(i64::from(source) - previous_source, &mut mappings);
        encode_vlq(zero_based - previous_source_line, &mut mappings);
        encode_vlq(0, &mut mappings);
        previous_source = i64::from(source);
        previous_source_line = zero_based;
    }

    let sources = sources
        .iter()
        .map(|source| format!("\"{}\"", source))
        .collect::<Vec<_>>()
        .join(",");
    format!(
        r#"{{"version":3,"file":"{}","sources":[{}],"names":[],"mappings":"{}"}}"#,
        file, sources, mappings
    )
}
