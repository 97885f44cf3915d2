//! Tracked plugin repository URLs.
//!
//! The host registers the repository listings it polls; a tracked URL gets
//! the budgeted retry policy and relay racing in the handler.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedRepository {
    pub url: String,
    /// Repositories not published by the host's own maintainers.
    pub third_party: bool,
}

impl TrackedRepository {
    pub fn new(url: impl Into<String>, third_party: bool) -> Self {
        Self {
            url: url.into(),
            third_party,
        }
    }
}

/// Readers see either the old or the new set, never a partial merge.
#[derive(Debug, Default)]
pub struct RepositoryRegistry {
    snapshot: ArcSwap<HashMap<String, TrackedRepository>>,
}

impl RepositoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace entries, keyed by canonical URL.
    pub fn merge<I>(&self, repositories: I)
    where
        I: IntoIterator<Item = TrackedRepository>,
    {
        let incoming: Vec<(String, TrackedRepository)> = repositories
            .into_iter()
            .map(|repo| (canonical(&repo.url), repo))
            .collect();
        if incoming.is_empty() {
            return;
        }
        self.snapshot.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.extend(incoming.iter().cloned());
            Arc::new(next)
        });
        tracing::debug!(tracked = self.len(), "Repository registry updated");
    }

    pub fn clear(&self) {
        self.snapshot.store(Arc::new(HashMap::new()));
    }

    pub fn contains(&self, url: &str) -> bool {
        self.snapshot.load().contains_key(&canonical(url))
    }

    pub fn get(&self, url: &str) -> Option<TrackedRepository> {
        self.snapshot.load().get(&canonical(url)).cloned()
    }

    pub fn len(&self) -> usize {
        self.snapshot.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn canonical(url: &str) -> String {
    match Url::parse(url.trim()) {
        Ok(parsed) => parsed.to_string(),
        Err(_) => url.trim().to_string(),
    }
}
