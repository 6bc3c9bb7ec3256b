use std::collections::hash_map::Entry;
use std::fmt::Debug;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use itertools::Itertools;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::{Result, SourceMapError};
use crate::map::PositionMap;
use crate::parser;

/// Naming convention that locates the position map resource of a source file.
pub trait MapLocator: Debug + Send + Sync {
    /// Returns the location of an existing map resource for `source_path`.
    fn locate(&self, source_path: &str) -> Option<PathBuf>;
}

/// Locates `<stem><suffix>` next to the source file, or inside `out_dir` when
/// the compiler writes its output elsewhere.
///
/// With both `root_dir` and `out_dir` set, the source directory relative to
/// `root_dir` is mirrored below `out_dir`, matching `tsc --rootDir --outDir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiblingMapLocator {
    root_dir: Option<PathBuf>,
    out_dir: Option<PathBuf>,
    suffix: String,
}

impl Default for SiblingMapLocator {
    fn default() -> Self {
        Self::new(".js.map")
    }
}

impl SiblingMapLocator {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            root_dir: None,
            out_dir: None,
            suffix: suffix.into(),
        }
    }

    pub fn with_out_dir(mut self, out_dir: impl Into<PathBuf>) -> Self {
        self.out_dir = Some(out_dir.into());
        self
    }

    pub fn with_root_dir(mut self, root_dir: impl Into<PathBuf>) -> Self {
        self.root_dir = Some(root_dir.into());
        self
    }

    fn candidate(&self, source_path: &Path) -> Option<PathBuf> {
        let stem = source_path.file_stem()?.to_string_lossy();
        let map_name = format!("{}{}", stem, self.suffix);
        let parent = source_path.parent().unwrap_or_else(|| Path::new(""));

        let dir = match (&self.out_dir, &self.root_dir) {
            (Some(out_dir), Some(root_dir)) => match parent.strip_prefix(root_dir) {
                Ok(relative) => out_dir.join(relative),
                Err(_) => out_dir.clone(),
            },
            (Some(out_dir), None) => out_dir.clone(),
            (None, _) => parent.to_path_buf(),
        };

        Some(dir.join(map_name))
    }
}

impl MapLocator for SiblingMapLocator {
    fn locate(&self, source_path: &str) -> Option<PathBuf> {
        self.candidate(Path::new(source_path))
            .filter(|candidate| candidate.is_file())
    }
}

/// A loaded map with its `sources` resolved against the directory of the map file.
#[derive(Debug)]
struct LoadedMap {
    map: Arc<PositionMap>,
    resolved_sources: Vec<PathBuf>,
}

impl LoadedMap {
    fn new(map: PositionMap, map_path: &Path) -> Self {
        let map_dir = map_path.parent().unwrap_or_else(|| Path::new(""));
        let resolved_sources = map
            .sources()
            .iter()
            .map(|source| normalize(&map_dir.join(source)))
            .collect();

        Self {
            map: Arc::new(map),
            resolved_sources,
        }
    }

    /// Index of `source_path` in the map's `sources`.
    ///
    /// A single-source map always answers 0. Otherwise the normalized path must
    /// match, or failing that its file name must match exactly one source.
    fn source_index(&self, source_path: &str) -> Option<u32> {
        if self.resolved_sources.len() == 1 {
            return Some(0);
        }

        let wanted = normalize(Path::new(source_path));
        if let Some(index) = self.resolved_sources.iter().position(|s| *s == wanted) {
            return u32::try_from(index).ok();
        }

        // Source roots such as `webpack:///` do not resolve to file paths.
        let name = wanted.file_name()?;
        self.resolved_sources
            .iter()
            .positions(|s| s.file_name() == Some(name))
            .exactly_one()
            .ok()
            .and_then(|index| u32::try_from(index).ok())
    }
}

#[derive(Debug)]
struct RegisteredSource {
    map: Arc<PositionMap>,
    /// Index into the map's `sources`, `None` when the path is not listed
    source: Option<u32>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    by_source: FxHashMap<String, RegisteredSource>,
    by_emitted: FxHashMap<String, LoadedMap>,
}

fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other),
        }
    }
    normalized
}

/// Lazily populated cache of position maps, keyed by source path and by
/// emitted file. Every emitted file is backed by a single shared map.
#[derive(Debug)]
pub struct PositionMapRegistry {
    locator: Box<dyn MapLocator>,
    inner: Mutex<RegistryInner>,
}

impl PositionMapRegistry {
    pub fn new(locator: Box<dyn MapLocator>) -> Self {
        Self {
            locator,
            inner: Mutex::new(RegistryInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the map for `source_path`, loading it on first use.
    pub fn resolve(&self, source_path: &str) -> Result<Arc<PositionMap>> {
        let mut inner = self.lock();

        if let Some(registered) = inner.by_source.get(source_path) {
            return Ok(Arc::clone(&registered.map));
        }

        let map_path = self
            .locator
            .locate(source_path)
            .ok_or_else(|| SourceMapError::MapNotFound(source_path.to_string()))?;
        let parsed = parser::parse_file(&map_path)?;

        let (map, source) = {
            let loaded = match inner.by_emitted.entry(parsed.file().to_string()) {
                Entry::Occupied(entry) => {
                    debug!(source = %source_path, file = %entry.key(), "Reusing position map of emitted file");
                    entry.into_mut()
                }
                Entry::Vacant(entry) => {
                    debug!(source = %source_path, map = %map_path.display(), "Loaded position map");
                    entry.insert(LoadedMap::new(parsed, &map_path))
                }
            };
            (Arc::clone(&loaded.map), loaded.source_index(source_path))
        };

        if source.is_none() {
            debug!(source = %source_path, file = %map.file(), "Source is not listed in position map");
        }

        inner.by_source.insert(
            source_path.to_string(),
            RegisteredSource {
                map: Arc::clone(&map),
                source,
            },
        );
        Ok(map)
    }

    /// Returns the map already registered for an emitted file, without loading.
    pub fn by_emitted(&self, emitted_path: &str) -> Option<Arc<PositionMap>> {
        self.lock()
            .by_emitted
            .get(emitted_path)
            .map(|loaded| Arc::clone(&loaded.map))
    }

    /// Index of a registered `source_path` in the `sources` of its map.
    pub fn source_index(&self, source_path: &str) -> Option<u32> {
        self.lock().by_source.get(source_path)?.source
    }

    /// Source paths registered against the map of `emitted_path`, sorted.
    pub fn source_paths_for(&self, emitted_path: &str) -> Vec<String> {
        self.registered_sources(emitted_path, |_| true)
    }

    /// Registered source paths that resolve to entry `source` of the map of
    /// `emitted_path`, sorted.
    pub fn source_paths_at(&self, emitted_path: &str, source: u32) -> Vec<String> {
        self.registered_sources(emitted_path, |registered| {
            registered.source == Some(source)
        })
    }

    fn registered_sources(
        &self,
        emitted_path: &str,
        filter: impl Fn(&RegisteredSource) -> bool,
    ) -> Vec<String> {
        let inner = self.lock();
        let Some(loaded) = inner.by_emitted.get(emitted_path) else {
            return Vec::new();
        };

        inner
            .by_source
            .iter()
            .filter(|(_, registered)| Arc::ptr_eq(&registered.map, &loaded.map))
            .filter(|(_, registered)| filter(registered))
            .map(|(path, _)| path.clone())
            .sorted()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().by_emitted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().by_emitted.is_empty()
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.by_source.clear();
        inner.by_emitted.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::thread;

    use rstest::rstest;

    use super::*;

    fn write_map(dir: &Path, name: &str, emitted: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(
            &path,
            format!(
                r#"{{"version":3,"file":"{}","sources":["app.ts"],"mappings":"AAAA"}}"#,
                emitted
            ),
        )
        .unwrap();
        path
    }

    fn source(dir: &Path, name: &str) -> String {
        dir.join(name).to_string_lossy().to_string()
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        write_map(dir.path(), "app.js.map", "app.js");
        let registry = PositionMapRegistry::new(Box::new(SiblingMapLocator::default()));

        let first = registry.resolve(&source(dir.path(), "app.ts")).unwrap();
        let second = registry.resolve(&source(dir.path(), "app.ts")).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_resolve_shares_map_of_same_emitted_file() {
        let dir = tempfile::tempdir().unwrap();
        write_map(dir.path(), "a.js.map", "bundle.js");
        write_map(dir.path(), "b.js.map", "bundle.js");
        let registry = PositionMapRegistry::new(Box::new(SiblingMapLocator::default()));

        let a = registry.resolve(&source(dir.path(), "a.ts")).unwrap();
        let b = registry.resolve(&source(dir.path(), "b.ts")).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
        assert!(Arc::ptr_eq(&registry.by_emitted("bundle.js").unwrap(), &a));
        assert_eq!(
            registry.source_paths_for("bundle.js"),
            vec![source(dir.path(), "a.ts"), source(dir.path(), "b.ts")]
        );
    }

    const BUNDLE_MAP: &str = r#"{"version":3,"file":"bundle.js","sources":["a.ts","b.ts"],"mappings":"AAEA;;;;;;;;;ACAA"}"#;

    #[test]
    fn test_source_index_in_bundle() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.js.map"), BUNDLE_MAP).unwrap();
        fs::write(dir.path().join("b.js.map"), BUNDLE_MAP).unwrap();
        fs::write(dir.path().join("c.js.map"), BUNDLE_MAP).unwrap();
        let registry = PositionMapRegistry::new(Box::new(SiblingMapLocator::default()));
        let (a, b, c) = (
            source(dir.path(), "a.ts"),
            source(dir.path(), "b.ts"),
            source(dir.path(), "c.ts"),
        );

        let map = registry.resolve(&b).unwrap();
        registry.resolve(&a).unwrap();
        registry.resolve(&c).unwrap();

        assert_eq!(registry.source_index(&a), Some(0));
        assert_eq!(registry.source_index(&b), Some(1));
        assert_eq!(registry.source_index(&c), None);
        assert_eq!(
            map.item_by_source_line_in(1, 3).map(|e| e.emitted_line),
            Some(10)
        );
        assert_eq!(registry.source_paths_at("bundle.js", 0), vec![a.clone()]);
        assert_eq!(registry.source_paths_at("bundle.js", 1), vec![b.clone()]);
        assert_eq!(registry.source_paths_for("bundle.js"), vec![a, b, c]);
    }

    #[rstest]
    #[case::relative_to_map_dir(None, r#"["../src/a.ts","../src/b.ts"]"#)]
    #[case::source_root(Some("../src"), r#"["a.ts","b.ts"]"#)]
    #[case::unique_file_name(Some("webpack:///"), r#"["./lib/a.ts","./lib/b.ts"]"#)]
    fn test_source_index_resolution(#[case] source_root: Option<&str>, #[case] sources: &str) {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        fs::create_dir(&out).unwrap();
        let root = source_root
            .map(|root| format!(r#""sourceRoot":"{}","#, root))
            .unwrap_or_default();
        fs::write(
            out.join("b.js.map"),
            format!(
                r#"{{"version":3,"file":"bundle.js",{}"sources":{},"mappings":"AAAA;ACAA"}}"#,
                root, sources
            ),
        )
        .unwrap();
        let registry = PositionMapRegistry::new(Box::new(
            SiblingMapLocator::default().with_out_dir(out.clone()),
        ));
        let b = dir.path().join("src").join("b.ts").to_string_lossy().to_string();

        registry.resolve(&b).unwrap();
        assert_eq!(registry.source_index(&b), Some(1));
    }

    #[test]
    fn test_source_index_of_unregistered_path() {
        let registry = PositionMapRegistry::new(Box::new(SiblingMapLocator::default()));
        assert_eq!(registry.source_index("/work/src/app.ts"), None);
        assert!(registry.source_paths_at("app.js", 0).is_empty());
    }

    #[test]
    fn test_resolve_map_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let registry = PositionMapRegistry::new(Box::new(SiblingMapLocator::default()));

        let result = registry.resolve(&source(dir.path(), "missing.ts"));
        assert!(matches!(result, Err(SourceMapError::MapNotFound(_))));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_resolve_malformed_map_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("app.js.map"), "{").unwrap();
        let registry = PositionMapRegistry::new(Box::new(SiblingMapLocator::default()));

        let result = registry.resolve(&source(dir.path(), "app.ts"));
        assert!(matches!(result, Err(SourceMapError::MalformedMap(_))));
        assert!(registry.by_emitted("app.js").is_none());
    }

    #[test]
    fn test_clear() {
        let dir = tempfile::tempdir().unwrap();
        write_map(dir.path(), "app.js.map", "app.js");
        let registry = PositionMapRegistry::new(Box::new(SiblingMapLocator::default()));
        registry.resolve(&source(dir.path(), "app.ts")).unwrap();

        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.source_paths_for("app.js").is_empty());
    }

    #[test]
    fn test_concurrent_resolve_creates_one_instance() {
        let dir = tempfile::tempdir().unwrap();
        write_map(dir.path(), "app.js.map", "app.js");
        let registry = Arc::new(PositionMapRegistry::new(Box::new(
            SiblingMapLocator::default(),
        )));
        let path = source(dir.path(), "app.ts");

        let maps = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let path = path.clone();
                thread::spawn(move || registry.resolve(&path).unwrap())
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect::<Vec<_>>();

        assert!(maps.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
    }

    #[rstest]
    #[case::sibling(None, None, "/work/src/app.ts", "/work/src/app.js.map")]
    #[case::out_dir(Some("/work/out"), None, "/work/src/app.ts", "/work/out/app.js.map")]
    #[case::mirrored(
        Some("/work/out"),
        Some("/work/src"),
        "/work/src/lib/util.ts",
        "/work/out/lib/util.js.map"
    )]
    #[case::outside_root(
        Some("/work/out"),
        Some("/work/src"),
        "/other/app.ts",
        "/work/out/app.js.map"
    )]
    fn test_sibling_locator_candidate(
        #[case] out_dir: Option<&str>,
        #[case] root_dir: Option<&str>,
        #[case] source_path: &str,
        #[case] expected: &str,
    ) {
        let mut locator = SiblingMapLocator::default();
        if let Some(out_dir) = out_dir {
            locator = locator.with_out_dir(out_dir);
        }
        if let Some(root_dir) = root_dir {
            locator = locator.with_root_dir(root_dir);
        }

        assert_eq!(
            locator.candidate(Path::new(source_path)),
            Some(PathBuf::from(expected))
        );
    }

    #[test]
    fn test_sibling_locator_requires_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let locator = SiblingMapLocator::default();
        assert!(locator.locate(&source(dir.path(), "app.ts")).is_none());

        write_map(dir.path(), "app.js.map", "app.js");
        assert_eq!(
            locator.locate(&source(dir.path(), "app.ts")),
            Some(dir.path().join("app.js.map"))
        );
    }
}
