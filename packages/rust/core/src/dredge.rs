//! The dredge pipeline: resolve, crawl, scrape and summarize a batch of links.
//!
//! [`Dredger::run`] spawns a fixed pool of workers over a pre-filled, closed
//! job queue and returns a stream with exactly one [`DredgeResult`] per link.
//! The stream closes once every worker has exited.
//!
//! Every store write goes through the guarded [`Storage::update_dredge_state`]
//! and [`Storage::update_dredge_result`], so a link pruned mid-run is left
//! alone. Store failures are logged and never fail a job.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, instrument, warn};

use dredger_crawler::{Fetcher, ResolverRegistry, scrape_metadata};
use dredger_shared::{DredgeConfig, DredgeState, DredgerError, Link, LinkId, Result};
use dredger_storage::Storage;

use crate::summarizer::{OllamaClient, Summary};

/// One link handed to exactly one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: LinkId,
    pub url: String,
}

impl From<&Link> for Job {
    fn from(link: &Link) -> Self {
        Self {
            id: link.id,
            url: link.url.clone(),
        }
    }
}

/// Terminal outcome of one job.
#[derive(Debug)]
pub struct DredgeResult {
    pub link_id: LinkId,
    /// URL that was fetched: the resolved article, or the link's own URL.
    pub url: String,
    pub title: String,
    pub description: String,
    pub summary: String,
    pub tags: Vec<String>,
    /// Discussion comments found while resolving an aggregator link.
    pub comments: Vec<String>,
    /// Set when the crawl or the summarize step failed.
    pub error: Option<DredgerError>,
}

impl DredgeResult {
    fn failed(job: &Job, error: DredgerError) -> Self {
        Self {
            link_id: job.id,
            url: job.url.clone(),
            title: String::new(),
            description: String::new(),
            summary: String::new(),
            tags: Vec::new(),
            comments: Vec::new(),
            error: Some(error),
        }
    }

    fn crawled(job: &Job, page: Crawled) -> Self {
        Self {
            link_id: job.id,
            url: page.url,
            title: page.title,
            description: page.description,
            summary: String::new(),
            tags: Vec::new(),
            comments: page.comments,
            error: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Output of the crawl stage.
struct Crawled {
    url: String,
    title: String,
    description: String,
    comments: Vec<String>,
}

// ---------------------------------------------------------------------------
// Dredger
// ---------------------------------------------------------------------------

/// Runs the enrichment pipeline. Cheap to clone; every worker holds a clone.
#[derive(Clone)]
pub struct Dredger {
    storage: Arc<Storage>,
    fetcher: Fetcher,
    resolvers: Arc<ResolverRegistry>,
    ollama: OllamaClient,
    config: DredgeConfig,
}

impl Dredger {
    pub fn new(storage: Arc<Storage>, config: DredgeConfig) -> Result<Self> {
        Ok(Self {
            storage,
            fetcher: Fetcher::from_config(&config)?,
            resolvers: Arc::new(ResolverRegistry::new()),
            ollama: OllamaClient::from_config(&config)?,
            config,
        })
    }

    /// Replace the built-in aggregator resolvers.
    pub fn with_resolvers(mut self, resolvers: ResolverRegistry) -> Self {
        self.resolvers = Arc::new(resolvers);
        self
    }

    /// Dredge `links` and stream back one result per link.
    ///
    /// The summarizer is pinged once before any worker starts; an empty batch
    /// returns an already-closed stream without probing.
    #[instrument(skip_all, fields(links = links.len(), workers = self.config.workers))]
    pub async fn run(
        &self,
        cancel: CancellationToken,
        links: Vec<Link>,
    ) -> mpsc::Receiver<DredgeResult> {
        let workers = self.config.workers.max(1);
        let (result_tx, result_rx) = mpsc::channel(workers * 2);

        if links.is_empty() {
            debug!("empty batch, nothing to dredge");
            return result_rx;
        }

        let (job_tx, job_rx) = mpsc::channel(links.len());
        for link in &links {
            // Capacity equals the batch size.
            let _ = job_tx.try_send(Job::from(link));
        }
        drop(job_tx);
        let jobs = Arc::new(Mutex::new(job_rx));

        let summarize = self.ollama.ping().await;
        if summarize {
            info!(model = self.ollama.model(), "summarizer available");
        } else {
            info!("summarizer unavailable, crawling only");
        }

        for worker in 0..workers {
            let dredger = self.clone();
            let jobs = Arc::clone(&jobs);
            let results = result_tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(
                async move { dredger.work(jobs, results, cancel, summarize).await }
                    .instrument(info_span!("worker", worker)),
            );
        }

        result_rx
    }

    async fn work(
        self,
        jobs: Arc<Mutex<mpsc::Receiver<Job>>>,
        results: mpsc::Sender<DredgeResult>,
        cancel: CancellationToken,
        summarize: bool,
    ) {
        loop {
            if cancel.is_cancelled() {
                debug!("cancelled, stopping");
                return;
            }

            let next = jobs.lock().await.recv().await;
            let Some(job) = next else {
                return;
            };

            let result = self.process(&job, &cancel, summarize).await;

            tokio::select! {
                biased;
                sent = results.send(result) => {
                    if sent.is_err() {
                        debug!("result receiver dropped, stopping");
                        return;
                    }
                }
                _ = cancel.cancelled() => {
                    debug!(link_id = %job.id, "cancelled before delivery");
                    return;
                }
            }
        }
    }

    #[instrument(skip(self, job, cancel), fields(link_id = %job.id, url = %job.url))]
    async fn process(
        &self,
        job: &Job,
        cancel: &CancellationToken,
        summarize: bool,
    ) -> DredgeResult {
        self.write_state(job.id, DredgeState::Crawling, "").await;

        let crawl = async {
            let delay = jitter_between(self.config.jitter_min, self.config.jitter_max);
            tokio::time::sleep(delay).await;
            self.crawl(&job.url).await
        };
        let crawled = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DredgerError::Cancelled),
            crawled = crawl => crawled,
        };

        let page = match crawled {
            Ok(page) => page,
            Err(e) => {
                warn!(error = %e, "crawl failed");
                self.write_state(job.id, DredgeState::Capsized, &format!("crawl: {e}"))
                    .await;
                return DredgeResult::failed(job, e);
            }
        };

        if !summarize {
            self.write_result(job.id, &page, &Summary::default()).await;
            return DredgeResult::crawled(job, page);
        }

        self.write_state(job.id, DredgeState::Crunching, "").await;
        let summarized = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DredgerError::Cancelled),
            summary = self.ollama.summarize(&page.title, &page.description, &page.url) => summary,
        };

        match summarized {
            Ok(summary) => {
                self.write_result(job.id, &page, &summary).await;
                let mut result = DredgeResult::crawled(job, page);
                result.summary = summary.summary;
                result.tags = summary.tags;
                result
            }
            Err(e) => {
                warn!(error = %e, "summarize failed, keeping crawl data");
                self.write_result(job.id, &page, &Summary::default()).await;
                self.write_state(job.id, DredgeState::Capsized, &e.to_string())
                    .await;
                let mut result = DredgeResult::crawled(job, page);
                result.error = Some(e);
                result
            }
        }
    }

    /// Resolve, fetch and scrape one URL.
    async fn crawl(&self, url: &str) -> Result<Crawled> {
        let resolution = self.resolvers.resolve(&self.fetcher, url).await;
        let page = self.fetcher.fetch(&resolution.url).await?;
        let meta = scrape_metadata(&page.body);

        let title = if meta.title.is_empty() {
            resolution.url.clone()
        } else {
            meta.title
        };

        Ok(Crawled {
            url: resolution.url,
            title,
            description: meta.description,
            comments: resolution.comments,
        })
    }

    async fn write_state(&self, id: LinkId, state: DredgeState, error: &str) {
        match self.storage.update_dredge_state(id, state, error).await {
            Ok(true) => {}
            Ok(false) => debug!(link_id = %id, ?state, "link pruned or gone, state not written"),
            Err(e) => warn!(link_id = %id, ?state, error = %e, "failed to write dredge state"),
        }
    }

    async fn write_result(&self, id: LinkId, page: &Crawled, summary: &Summary) {
        let written = self
            .storage
            .update_dredge_result(
                id,
                &page.title,
                &page.description,
                &summary.summary,
                &summary.tags,
            )
            .await;
        match written {
            Ok(true) => {}
            Ok(false) => debug!(link_id = %id, "link pruned or gone, result not written"),
            Err(e) => warn!(link_id = %id, error = %e, "failed to write dredge result"),
        }
    }
}

/// Random delay in `[min, max)`; `min` when the range is empty.
fn jitter_between(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    rand::rng().random_range(min..max)
}
