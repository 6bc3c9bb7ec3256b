#![no_main]

use arbitrary::Arbitrary;
use itertools::Itertools;
use libfuzzer_sys::fuzz_target;
use serde_json::json;

#[derive(Debug, Clone, Arbitrary)]
enum Segment {
    Column(i8),
    Mapped(i8, i8, i8, i8),
    Named(i8, i8, i8, i8, i8),
    Raw(String),
}

const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

fn vlq(value: i8, out: &mut String) {
    let value = i64::from(value);
    let mut rest = if value < 0 { (-value << 1) | 1 } else { value << 1 };
    loop {
        let mut digit = rest & 0b11111;
        rest >>= 5;
        if rest > 0 {
            digit |= 0b100000;
        }
        out.push(ALPHABET[digit as usize] as char);
        if rest == 0 {
            break;
        }
    }
}

impl Segment {
    fn encode(&self) -> String {
        let mut out = String::new();
        match self {
            Segment::Column(c) => vlq(*c, &mut out),
            Segment::Mapped(a, b, c, d) => [a, b, c, d].iter().for_each(|v| vlq(**v, &mut out)),
            Segment::Named(a, b, c, d, e) => {
                [a, b, c, d, e].iter().for_each(|v| vlq(**v, &mut out))
            }
            Segment::Raw(raw) => out.push_str(raw),
        }
        out
    }
}

#[derive(Debug, Clone, Arbitrary)]
struct ArbitraryMap {
    file: String,
    sources: Vec<String>,
    source_root: Option<String>,
    lines: Vec<Vec<Segment>>,
}

impl ArbitraryMap {
    fn to_json(&self) -> String {
        let mappings = self
            .lines
            .iter()
            .map(|line| line.iter().map(Segment::encode).join(","))
            .join(";");
        let mut document = json!({
            "version": 3,
            "file": self.file,
            "sources": self.sources,
            "names": [],
            "mappings": mappings,
        });
        if let Some(root) = &self.source_root {
            document["sourceRoot"] = json!(root);
        }
        document.to_string()
    }
}

#[derive(Debug, Clone, Arbitrary)]
struct Context {
    raw_map: Option<String>,
    generated_map: Option<ArbitraryMap>,
}

fuzz_target!(|context: Context| {
    let json = match (&context.raw_map, &context.generated_map) {
        (Some(raw), _) => raw.clone(),
        (_, Some(generated)) => generated.to_json(),
        _ => "".to_string(),
    };

    if let Ok(map) = tsdbg_sourcemap::parse(&json) {
        for entry in map.entries() {
            let by_source = map.item_by_source_line(entry.source_line);
            let by_emitted = map.item_by_emitted_line(entry.emitted_line);
            assert!(by_source.is_some_and(|item| item.source_line == entry.source_line));
            assert!(by_emitted.is_some_and(|item| item.emitted_line == entry.emitted_line));
        }
    }
});
