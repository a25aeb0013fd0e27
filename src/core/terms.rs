//! Term dictionary and its published snapshot.
//!
//! A [`TermSet`] is immutable once built. The process-wide [`TermStore`]
//! holds the current snapshot behind an `Arc`; reloading builds a complete
//! new set first and swaps the pointer, so a request keeps whatever snapshot
//! it took at start.

use crate::core::text::{normalize, tokenize};
use crate::domain::model::TermEntry;
use crate::utils::error::ConfigError;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEntry {
    term: String,
    weight: f64,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    theme: Option<String>,
}

/// Accepted dictionary layouts.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TermConfig {
    List(Vec<RawEntry>),
    Wrapped {
        terms: Vec<RawEntry>,
    },
    /// `category -> theme -> [phrase]`, every phrase weighted 1.0
    Nested(BTreeMap<String, BTreeMap<String, Vec<String>>>),
}

impl TermConfig {
    fn into_entries(self) -> Vec<RawEntry> {
        match self {
            TermConfig::List(entries) | TermConfig::Wrapped { terms: entries } => entries,
            TermConfig::Nested(categories) => categories
                .into_iter()
                .flat_map(|(category, themes)| {
                    themes.into_iter().flat_map(move |(theme, phrases)| {
                        let category = category.clone();
                        phrases.into_iter().map(move |term| RawEntry {
                            term,
                            weight: 1.0,
                            category: Some(category.clone()),
                            theme: Some(theme.clone()),
                        })
                    })
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TermSet {
    entries: HashMap<String, TermEntry>,
    max_phrase_tokens: usize,
    version: u64,
    source: Option<String>,
}

impl TermSet {
    /// An unloaded dictionary. Analysis against it fails.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut set = Self::from_json_str(&content)?;
        set.source = Some(path.display().to_string());
        Ok(set)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let config: TermConfig = serde_json::from_str(content)?;
        let raw = config.into_entries();
        Self::build(raw)
    }

    pub fn from_entries<I>(entries: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = TermEntry>,
    {
        Self::build(entries.into_iter().map(|e| RawEntry {
            term: e.term,
            weight: e.weight,
            category: e.category,
            theme: e.theme,
        }))
    }

    fn build<I>(raw: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = RawEntry>,
    {
        let mut entries: HashMap<String, TermEntry> = HashMap::new();
        let mut max_phrase_tokens = 0;

        for item in raw {
            let token_count = tokenize(&item.term).len();
            if token_count == 0 {
                return Err(ConfigError::InvalidTerm {
                    term: item.term,
                    reason: "contains no letters or digits".to_string(),
                });
            }
            if !item.weight.is_finite() {
                return Err(ConfigError::InvalidTerm {
                    term: item.term,
                    reason: format!("weight {} is not finite", item.weight),
                });
            }

            let key = normalize(&item.term);
            let entry = TermEntry {
                term: key.clone(),
                weight: item.weight,
                category: clean_label(item.category),
                theme: clean_label(item.theme),
            };

            match entries.get(&key) {
                Some(existing)
                    if existing.weight == entry.weight && existing.category == entry.category =>
                {
                    tracing::debug!("Merging duplicate term '{}'", key);
                }
                Some(existing) => {
                    return Err(ConfigError::DuplicateTerm {
                        term: key,
                        first: describe(existing),
                        second: describe(&entry),
                    });
                }
                None => {
                    max_phrase_tokens = max_phrase_tokens.max(token_count);
                    entries.insert(key, entry);
                }
            }
        }

        if entries.is_empty() {
            return Err(ConfigError::NoTerms);
        }

        Ok(Self {
            entries,
            max_phrase_tokens,
            version: 0,
            source: None,
        })
    }

    pub(crate) fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Looks up a term after applying the matching normalization.
    pub fn lookup(&self, term: &str) -> Option<&TermEntry> {
        self.entries.get(&normalize(term))
    }

    /// Looks up an already normalized key.
    pub(crate) fn get_normalized(&self, key: &str) -> Option<&TermEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Longest entry measured in tokens.
    pub fn max_phrase_tokens(&self) -> usize {
        self.max_phrase_tokens
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn categories(&self) -> BTreeSet<&str> {
        self.entries
            .values()
            .filter_map(|e| e.category.as_deref())
            .collect()
    }

    /// Entries sorted by term.
    pub fn entries(&self) -> Vec<&TermEntry> {
        let mut all: Vec<&TermEntry> = self.entries.values().collect();
        all.sort_by(|a, b| a.term.cmp(&b.term));
        all
    }
}

fn clean_label(label: Option<String>) -> Option<String> {
    label
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
}

fn describe(entry: &TermEntry) -> String {
    match &entry.category {
        Some(category) => format!("weight {} in '{}'", entry.weight, category),
        None => format!("weight {}", entry.weight),
    }
}

/// Holder of the currently published dictionary snapshot.
#[derive(Debug)]
pub struct TermStore {
    current: RwLock<Arc<TermSet>>,
    path: Option<PathBuf>,
    versions: AtomicU64,
}

impl TermStore {
    pub fn new(set: TermSet) -> Self {
        let store = Self {
            current: RwLock::new(Arc::new(TermSet::empty())),
            path: None,
            versions: AtomicU64::new(0),
        };
        store.publish(set);
        store
    }

    /// A store with nothing published yet.
    pub fn unloaded() -> Self {
        Self {
            current: RwLock::new(Arc::new(TermSet::empty())),
            path: None,
            versions: AtomicU64::new(0),
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let set = TermSet::load(&path)?;
        let mut store = Self::new(set);
        store.path = Some(path.as_ref().to_path_buf());
        Ok(store)
    }

    /// The snapshot to use for one whole request.
    pub fn snapshot(&self) -> Arc<TermSet> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Publishes a fully built set under the next version number.
    /// Versions are taken under the write lock, so the published version
    /// never goes backwards when reloads race.
    pub fn publish(&self, set: TermSet) -> Arc<TermSet> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let version = self.versions.fetch_add(1, Ordering::SeqCst) + 1;
        let next = Arc::new(set.with_version(version));
        *guard = Arc::clone(&next);
        drop(guard);
        tracing::info!(
            "Published term dictionary v{} ({} terms)",
            version,
            next.len()
        );
        next
    }

    /// Rebuilds from the path the store was loaded from.
    pub fn reload(&self) -> Result<Arc<TermSet>, ConfigError> {
        let path = self.path.as_ref().ok_or_else(|| ConfigError::Missing {
            field: "terms.path".to_string(),
        })?;
        self.reload_from(path)
    }

    /// Builds a new set from `path`. On failure the current snapshot stays.
    pub fn reload_from<P: AsRef<Path>>(&self, path: P) -> Result<Arc<TermSet>, ConfigError> {
        match TermSet::load(path) {
            Ok(set) => Ok(self.publish(set)),
            Err(e) => {
                tracing::warn!("Dictionary reload rejected, keeping current snapshot: {}", e);
                Err(e)
            }
        }
    }
}

impl Default for TermStore {
    fn default() -> Self {
        Self::unloaded()
    }
}
