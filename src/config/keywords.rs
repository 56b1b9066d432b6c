use std::{
    path::PathBuf,
    sync::Mutex,
    time::{Duration, Instant, SystemTime},
};

use serde::{Deserialize, Serialize};
use tracing::warn;

/// How long a loaded keyword map stays fresh. Classification runs every tick,
/// reading the config file that often would be wasteful.
pub const KEYWORD_CACHE_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectKeywords {
    pub project: String,
    pub keywords: Vec<String>,
}

/// Ordered project -> keywords mapping. Entry order is the match order: when
/// several projects share a keyword the earliest configured entry wins, which
/// is the user-visible tie-break.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectKeywordMap {
    entries: Vec<ProjectKeywords>,
}

impl ProjectKeywordMap {
    pub fn iter(&self) -> impl Iterator<Item = &ProjectKeywords> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts or replaces keywords for a project. A replaced entry keeps its
    /// position so the match order stays stable under edits.
    pub fn set(&mut self, project: &str, keywords: Vec<String>) {
        match self.entries.iter_mut().find(|e| e.project == project) {
            Some(entry) => entry.keywords = keywords,
            None => self.entries.push(ProjectKeywords {
                project: project.to_string(),
                keywords,
            }),
        }
    }

    pub fn remove(&mut self, project: &str) {
        self.entries.retain(|e| e.project != project);
    }

    /// Overlay entries replace keywords of same-named base entries in place;
    /// unknown projects are appended in overlay order.
    pub fn merged_over(base: Self, overlay: Self) -> Self {
        let mut result = base;
        for entry in overlay.entries {
            result.set(&entry.project, entry.keywords);
        }
        result
    }
}

impl FromIterator<(String, Vec<String>)> for ProjectKeywordMap {
    fn from_iter<T: IntoIterator<Item = (String, Vec<String>)>>(iter: T) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(project, keywords)| ProjectKeywords { project, keywords })
                .collect(),
        }
    }
}

struct CachedMap {
    loaded_at: Instant,
    /// Modification time of the config file when the map was loaded. `None`
    /// when the file was absent or the filesystem reports no mtime.
    modified: Option<SystemTime>,
    map: ProjectKeywordMap,
}

/// Cache over the keyword map stored in the config file. A full reparse runs
/// at most once per ttl, but every read stats the file first: an edit is
/// observed by the very next classification, not after the ttl expires.
/// In-process editors can also call [KeywordCache::invalidate] directly.
pub struct KeywordCache {
    config_path: PathBuf,
    ttl: Duration,
    state: Mutex<Option<CachedMap>>,
}

impl KeywordCache {
    pub fn new(config_path: PathBuf) -> Self {
        Self::with_ttl(config_path, KEYWORD_CACHE_TTL)
    }

    pub fn with_ttl(config_path: PathBuf, ttl: Duration) -> Self {
        Self {
            config_path,
            ttl,
            state: Mutex::new(None),
        }
    }

    pub fn get(&self) -> ProjectKeywordMap {
        let mut state = self.state.lock().expect("keyword cache poisoned");
        let modified = self.file_modified();
        match state.as_ref() {
            Some(cached)
                if cached.loaded_at.elapsed() < self.ttl && cached.modified == modified =>
            {
                cached.map.clone()
            }
            _ => {
                let map = self.load();
                *state = Some(CachedMap {
                    loaded_at: Instant::now(),
                    modified,
                    map: map.clone(),
                });
                map
            }
        }
    }

    fn file_modified(&self) -> Option<SystemTime> {
        std::fs::metadata(&self.config_path)
            .and_then(|m| m.modified())
            .ok()
    }

    pub fn invalidate(&self) {
        let mut state = self.state.lock().expect("keyword cache poisoned");
        *state = None;
    }

    fn load(&self) -> ProjectKeywordMap {
        match super::load_config(&self.config_path) {
            Ok(config) => config.project_keywords,
            Err(e) => {
                warn!("Failed to reload keyword map, classifying without it: {e}");
                ProjectKeywordMap::default()
            }
        }
    }
}
