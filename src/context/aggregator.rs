//! Concurrent context gathering
//!
//! Every source runs as its own task through the shared [`ContextCache`].
//! A failing or panicking source leaves an error entry under its own name.

use super::cache::ContextCache;
use super::sources::{ContextSource, SourceRequest};
use super::ContextEntry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

pub struct ContextAggregator {
    sources: Vec<Arc<dyn ContextSource>>,
    cache: Arc<ContextCache>,
}

impl ContextAggregator {
    /// Sources are kept in launch order: descending priority.
    pub fn new(mut sources: Vec<Arc<dyn ContextSource>>, cache: Arc<ContextCache>) -> Self {
        sources.sort_by(|a, b| b.priority().cmp(&a.priority()));
        Self { sources, cache }
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn cache(&self) -> &Arc<ContextCache> {
        &self.cache
    }

    pub async fn gather(&self, request: &SourceRequest) -> HashMap<String, ContextEntry> {
        let start = Instant::now();
        let mut handles = Vec::with_capacity(self.sources.len());

        for source in &self.sources {
            let name = source.name().to_string();
            let source = Arc::clone(source);
            let cache = Arc::clone(&self.cache);
            let request = request.clone();

            let handle = tokio::spawn(async move {
                let key = source.cache_key(&request);
                cache
                    .get(source.name(), &key, || source.fetch(&request))
                    .await
            });
            handles.push((name, handle));
        }

        let mut context = HashMap::with_capacity(handles.len());
        for (name, handle) in handles {
            let entry = match handle.await {
                Ok(Ok(value)) => {
                    debug!(source = %name, "Context source completed");
                    ContextEntry::Available(value)
                }
                Ok(Err(e)) => {
                    warn!(source = %name, error = %e, "Context source failed");
                    ContextEntry::Failed {
                        error: e.to_string(),
                    }
                }
                Err(join_error) => {
                    warn!(source = %name, error = %join_error, "Context source task aborted");
                    ContextEntry::Failed {
                        error: format!("source task aborted: {}", join_error),
                    }
                }
            };
            context.insert(name, entry);
        }

        debug!(
            sources = context.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Context gathered"
        );

        context
    }
}
