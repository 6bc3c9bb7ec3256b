//! `tsdbg-sourcemap` maps positions between an emitted script and the sources it was compiled from.
//!
//! A [`PositionMap`] is parsed from a Source Map revision 3 document and answers exact line
//! lookups in both directions. A [`PositionMapRegistry`] caches parsed maps per source path and
//! per emitted file so that every emitted file is backed by exactly one shared map.
//!
//! ```rust
//! let map = tsdbg_sourcemap::parse(
//!     r#"{"version":3,"file":"app.js","sources":["app.ts"],"mappings":"AAAA;AAEA"}"#,
//! )
//! .unwrap();
//!
//! assert_eq!(map.file(), "app.js");
//! assert_eq!(map.item_by_source_line(3).map(|item| item.emitted_line), Some(2));
//! assert_eq!(map.item_by_emitted_line(1).map(|item| item.source_line), Some(1));
//! ```
mod error;
mod map;
mod parser;
mod registry;
mod vlq;

pub use error::{Result, SourceMapError};
pub use map::{PositionMap, PositionMapEntry};
pub use parser::{parse, parse_file};
pub use registry::{MapLocator, PositionMapRegistry, SiblingMapLocator};
