use std::collections::HashSet;

use logtap_types::LogEntry;

/// Source tags to keep; an empty filter keeps everything
#[derive(Clone, Default)]
pub struct SourceFilter {
    /// Lowercased tags
    sources: HashSet<String>,
}

impl SourceFilter {
    /// Build a filter from tags. Each item may itself be a comma separated list.
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let sources = tags
            .into_iter()
            .flat_map(|tag| {
                tag.as_ref()
                    .split(',')
                    .map(|s| s.trim().to_lowercase())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .collect();

        Self { sources }
    }

    /// Check if an entry's source is kept (case-insensitive)
    pub fn matches(&self, entry: &LogEntry) -> bool {
        self.sources.is_empty() || self.sources.contains(&entry.source.to_lowercase())
    }

    /// Check if filter is empty (matches everything)
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Number of distinct tags
    pub fn len(&self) -> usize {
        self.sources.len()
    }
}

impl std::fmt::Debug for SourceFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut sources: Vec<_> = self.sources.iter().collect();
        sources.sort();
        f.debug_struct("SourceFilter")
            .field("sources", &sources)
            .finish()
    }
}
