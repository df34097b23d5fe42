//! Multi-file archive assembly.
//!
//! Resources are always retrieved from the network (the cache is only
//! filled for URLs it lacks, never read) and stored under their local paths. Downloads may overlap up
//! to the configured concurrency, but results are consumed in resource
//! order, so archive entries and progress reports follow the resource list.

pub mod writer;

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::stream;
use serde::Serialize;

pub use writer::ArchiveWriter;

use crate::embed::cache_entry_for;
use crate::extract::Resource;
use crate::fetch::{Fetched, Fetcher};
use crate::headers::HeaderSet;
use replica_core::ResourceStore;

/// Upper bound for overlapping downloads.
pub const MAX_CONCURRENCY: usize = 16;

/// Progress after each processed resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        (self.completed.min(self.total) * 100 / self.total) as u8
    }
}

/// Which resources made it into the archive.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AssemblyReport {
    pub delivered: Vec<Resource>,
    pub undelivered: Vec<Resource>,
}

impl AssemblyReport {
    pub fn total(&self) -> usize {
        self.delivered.len() + self.undelivered.len()
    }

    /// Human-readable partial-success line.
    pub fn summary(&self) -> String {
        format!("{} of {} resources included", self.delivered.len(), self.total())
    }
}

/// Downloads resources into an archive.
pub struct ArchiveAssembler {
    fetcher: Arc<dyn Fetcher>,
    store: Option<Arc<dyn ResourceStore>>,
    concurrency: usize,
}

impl ArchiveAssembler {
    /// Sequential assembler that does not record fetched resources.
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher, store: None, concurrency: 1 }
    }

    /// Record every fetched resource in `store`.
    pub fn with_store(mut self, store: Arc<dyn ResourceStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Allow up to `concurrency` downloads in flight, clamped to 1..=16.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.clamp(1, MAX_CONCURRENCY);
        self
    }

    async fn remember(&self, resource: &Resource, fetched: &Fetched) {
        let Some(store) = &self.store else { return };
        match store.get(&resource.url).await {
            Ok(Some(_)) => return,
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(url = %resource.url, error = %e, "failed to read cache entry");
                return;
            }
        }
        if let Err(e) = store.set(cache_entry_for(&resource.url, resource.kind, fetched)).await {
            tracing::warn!(url = %resource.url, error = %e, "failed to write cache entry");
        }
    }

    /// Retrieve every resource into `writer`.
    ///
    /// Failures are recorded as undelivered and never stop the run.
    /// `on_progress` is called once per resource with a strictly increasing
    /// `completed` count. A resource repeating an earlier local path is not
    /// fetched again and shares the earlier outcome.
    pub async fn assemble<F>(
        &self, resources: &[Resource], headers: &HeaderSet, writer: &mut ArchiveWriter, mut on_progress: F,
    ) -> AssemblyReport
    where
        F: FnMut(Progress) + Send,
    {
        let total = resources.len();

        let mut first_seen: HashMap<&str, usize> = HashMap::new();
        let plan: Vec<(usize, Option<usize>)> = resources
            .iter()
            .enumerate()
            .map(|(i, r)| match first_seen.get(r.local_path.as_str()) {
                Some(&earlier) => (i, Some(earlier)),
                None => {
                    first_seen.insert(&r.local_path, i);
                    (i, None)
                }
            })
            .collect();

        let mut downloads = stream::iter(plan.into_iter().map(|(i, earlier)| {
            let resource = &resources[i];
            async move {
                let result = match earlier {
                    Some(_) => None,
                    None => Some(self.fetcher.fetch(&resource.url, headers).await),
                };
                (i, earlier, result)
            }
        }))
        .buffered(self.concurrency);

        let mut report = AssemblyReport::default();
        let mut outcomes: HashMap<usize, bool> = HashMap::new();
        let mut completed = 0;

        while let Some((i, earlier, result)) = downloads.next().await {
            let resource = &resources[i];
            let delivered = match (earlier, result) {
                (Some(first), _) => outcomes.get(&first).copied().unwrap_or(false),
                (None, Some(Ok(fetched))) => match writer.add(&resource.local_path, &fetched.body) {
                    Ok(()) => {
                        tracing::debug!(url = %resource.url, path = %resource.local_path, relay = %fetched.relay, "archived resource");
                        self.remember(resource, &fetched).await;
                        true
                    }
                    Err(e) => {
                        tracing::warn!(url = %resource.url, error = %e, "failed to add resource to archive");
                        false
                    }
                },
                (None, Some(Err(e))) => {
                    tracing::warn!(url = %resource.url, error = %e, "resource undelivered");
                    false
                }
                (None, None) => false,
            };

            if earlier.is_none() {
                outcomes.insert(i, delivered);
            }
            if delivered {
                report.delivered.push(resource.clone());
            } else {
                report.undelivered.push(resource.clone());
            }

            completed += 1;
            on_progress(Progress { completed, total });
        }

        tracing::info!(
            delivered = report.delivered.len(),
            undelivered = report.undelivered.len(),
            "assembled archive resources"
        );
        report
    }
}
