/// One correspondence point between a source position and an emitted position.
///
/// Lines are 1-based, columns are 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PositionMapEntry {
    /// Line in the original source file
    pub source_line: u32,
    /// Column in the original source file
    pub source_column: u32,
    /// Line in the emitted file
    pub emitted_line: u32,
    /// Column in the emitted file
    pub emitted_column: u32,
    /// Index into [`PositionMap::sources`]
    pub source: u32,
}

/// Correspondence table between one emitted file and its sources.
///
/// Both lookup directions are exact-match only and run in `O(log n)` over
/// index vectors sorted once at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionMap {
    file: String,
    sources: Vec<String>,
    entries: Vec<PositionMapEntry>,
    by_source_line: Vec<usize>,
    by_source_in: Vec<usize>,
    by_emitted_line: Vec<usize>,
}

impl PositionMap {
    pub fn new(
        file: impl Into<String>,
        sources: Vec<String>,
        mut entries: Vec<PositionMapEntry>,
    ) -> Self {
        entries.sort_by_key(|e| (e.emitted_line, e.emitted_column));

        // First segment of an emitted line wins.
        let mut by_emitted_line = (0..entries.len()).collect::<Vec<_>>();
        by_emitted_line.dedup_by_key(|i| entries[*i].emitted_line);

        // First emitted position of a source line wins.
        let mut by_source_line = (0..entries.len()).collect::<Vec<_>>();
        by_source_line.sort_by_key(|i| {
            let e = &entries[*i];
            (e.source_line, e.emitted_line, e.emitted_column)
        });
        by_source_line.dedup_by_key(|i| entries[*i].source_line);

        let mut by_source_in = (0..entries.len()).collect::<Vec<_>>();
        by_source_in.sort_by_key(|i| {
            let e = &entries[*i];
            (e.source, e.source_line, e.emitted_line, e.emitted_column)
        });
        by_source_in.dedup_by_key(|i| (entries[*i].source, entries[*i].source_line));

        Self {
            file: file.into(),
            sources,
            entries,
            by_source_line,
            by_source_in,
            by_emitted_line,
        }
    }

    /// Identity of the emitted file this map belongs to.
    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// All entries ordered by emitted position.
    pub fn entries(&self) -> &[PositionMapEntry] {
        &self.entries
    }

    pub fn source_path(&self, entry: &PositionMapEntry) -> Option<&str> {
        self.sources.get(entry.source as usize).map(String::as_str)
    }

    pub fn item_by_source_line(&self, line: u32) -> Option<&PositionMapEntry> {
        self.by_source_line
            .binary_search_by_key(&line, |i| self.entries[*i].source_line)
            .ok()
            .map(|pos| &self.entries[self.by_source_line[pos]])
    }

    /// Like [`PositionMap::item_by_source_line`], restricted to the entries of
    /// one source. Needed for maps of bundles, where several sources share line numbers.
    pub fn item_by_source_line_in(&self, source: u32, line: u32) -> Option<&PositionMapEntry> {
        self.by_source_in
            .binary_search_by_key(&(source, line), |i| {
                let e = &self.entries[*i];
                (e.source, e.source_line)
            })
            .ok()
            .map(|pos| &self.entries[self.by_source_in[pos]])
    }

    pub fn item_by_emitted_line(&self, line: u32) -> Option<&PositionMapEntry> {
        self.by_emitted_line
            .binary_search_by_key(&line, |i| self.entries[*i].emitted_line)
            .ok()
            .map(|pos| &self.entries[self.by_emitted_line[pos]])
    }
}
