use std::collections::HashMap;

use crate::config::LegacyOverrideEntry;

/// Hard-coded URL templates for movies whose files predate the variant
/// registry. Entries are looked up by exact movie id and are meant to be
/// deleted from config once those files are re-encoded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegacyOverrides {
    templates: HashMap<String, String>,
}

impl LegacyOverrides {
    pub fn from_entries(entries: &[LegacyOverrideEntry]) -> Self {
        let templates = entries
            .iter()
            .filter(|entry| !entry.movie_id.trim().is_empty())
            .map(|entry| (entry.movie_id.trim().to_string(), entry.url_template.clone()))
            .collect();
        Self { templates }
    }

    pub fn insert(&mut self, movie_id: impl Into<String>, url_template: impl Into<String>) {
        self.templates.insert(movie_id.into(), url_template.into());
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Renders `{movie_id}` and `{quality}` into the movie's template.
    pub fn lookup(&self, movie_id: &str, quality: &str) -> Option<String> {
        let template = self.templates.get(movie_id)?;
        let url = template
            .replace("{movie_id}", movie_id)
            .replace("{quality}", quality);
        if url.trim().is_empty() {
            None
        } else {
            Some(url)
        }
    }
}
