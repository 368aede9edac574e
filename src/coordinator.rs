use crate::config::HarvestConfig;
use crate::detail::DetailHarvester;
use crate::error::HarvestError;
use crate::fetcher::{Connector, PageFetcher, Session};
use crate::listing::{ListingWalker, WalkEnd};
use crate::results::{ItemRecord, ListingEntry};
use crate::store;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

type WorkQueue = Arc<Mutex<VecDeque<(usize, ListingEntry)>>>;

/// What a finished run produced
#[derive(Debug, Clone)]
pub struct HarvestReport {
    /// Records in discovery order, as written to `output_path`
    pub records: Vec<ItemRecord>,
    pub pages_visited: u32,
    pub walk_end: WalkEnd,
    /// Records whose detail fields all fell back to absent
    pub absent_items: usize,
    /// Entries discovered but never started because the run was cancelled
    pub skipped_items: usize,
    pub cancelled: bool,
    pub output_path: PathBuf,
}

/// Runs the listing walk, then the detail harvest, then writes the output
pub struct Coordinator<C: Connector> {
    config: HarvestConfig,
    connector: Arc<C>,
    cancel: CancellationToken,
}

impl<C: Connector> Coordinator<C> {
    pub fn new(config: HarvestConfig, connector: C) -> Self {
        Self {
            config,
            connector: Arc::new(connector),
            cancel: CancellationToken::new(),
        }
    }

    /// Stop between listing pages and between items when `token` fires
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Runs the whole pipeline.
    ///
    /// Only configuration problems, an unavailable browser runtime and a
    /// failure to write the output are errors. Everything that goes wrong
    /// with a single page or item is absorbed into the report.
    pub async fn run(&self) -> Result<HarvestReport, HarvestError> {
        let config = &self.config;
        config.validate()?;

        let fetcher = PageFetcher::new(config.timeouts.poll()).with_interstitial(
            config.selectors.interstitial.clone(),
            config.timeouts.interstitial(),
        );
        let walker = ListingWalker::new(config, fetcher.clone())?;
        let harvester = Arc::new(DetailHarvester::new(config, fetcher)?);

        ::log::info!("Connecting to the browser runtime");
        let session = self.connector.connect().await?;

        ::log::info!("Walking listing from {}", config.base_url);
        let listing = walker.walk(&session, &self.cancel).await;
        let discovered = listing.entries.len();
        ::log::info!(
            "Harvesting details for {} items with {} worker(s)",
            discovered,
            config.detail_concurrency.min(discovered.max(1))
        );

        let records = self.harvest(session, harvester, listing.entries).await;

        store::write_records(&config.output_path, &records)?;

        let absent_items = records.iter().filter(|r| r.is_detail_absent()).count();
        let report = HarvestReport {
            skipped_items: discovered - records.len(),
            absent_items,
            cancelled: self.cancel.is_cancelled(),
            pages_visited: listing.pages_visited,
            walk_end: listing.end,
            output_path: config.output_path.clone(),
            records,
        };

        ::log::info!(
            "Harvest finished: {} records written to {}, {} listing pages visited, {} items without details, listing ended: {}",
            report.records.len(),
            report.output_path.display(),
            report.pages_visited,
            report.absent_items,
            report.walk_end
        );
        if report.cancelled {
            ::log::warn!(
                "Run was cancelled; {} discovered items were not harvested",
                report.skipped_items
            );
        }

        Ok(report)
    }

    /// Spreads entries over up to `detail_concurrency` workers, each with
    /// its own session, and reassembles the records in discovery order.
    async fn harvest(
        &self,
        primary: C::Session,
        harvester: Arc<DetailHarvester>,
        entries: Vec<ListingEntry>,
    ) -> Vec<ItemRecord> {
        if entries.is_empty() {
            close_session(&primary, 0).await;
            return Vec::new();
        }

        let total = entries.len();
        let mut sessions = vec![primary];
        let wanted = self.config.detail_concurrency.min(total);
        for id in 1..wanted {
            match self.connector.connect().await {
                Ok(session) => sessions.push(session),
                Err(e) => {
                    ::log::warn!(
                        "Could not open a session for worker {}, continuing with {}: {}",
                        id,
                        sessions.len(),
                        e
                    );
                    break;
                }
            }
        }

        let queue: WorkQueue = Arc::new(Mutex::new(entries.iter().cloned().enumerate().collect()));
        let (result_tx, mut result_rx) = mpsc::channel::<(usize, ItemRecord)>(total);

        let handles = sessions
            .into_iter()
            .enumerate()
            .map(|(id, session)| {
                Worker {
                    id,
                    connector: Arc::clone(&self.connector),
                    harvester: Arc::clone(&harvester),
                    queue: Arc::clone(&queue),
                    results: result_tx.clone(),
                    cancel: self.cancel.clone(),
                }
                .spawn(session)
            })
            .collect::<Vec<_>>();

        // Each worker holds its own sender
        drop(result_tx);

        let mut slots: Vec<Option<ItemRecord>> = vec![None; total];
        let mut received = 0;
        while let Some((idx, record)) = result_rx.recv().await {
            slots[idx] = Some(record);
            received += 1;
            self.checkpoint(&slots, received);
        }

        for (id, handle) in handles.into_iter().enumerate() {
            if let Err(e) = handle.await {
                ::log::error!("Worker {} ended abnormally: {}", id, e);
            }
        }

        let cancelled = self.cancel.is_cancelled();
        let undispatched = queue
            .lock()
            .await
            .drain(..)
            .map(|(idx, _)| idx)
            .collect::<Vec<_>>();

        for idx in undispatched {
            if cancelled {
                continue;
            }
            ::log::warn!(
                "No worker left for {}, recording absent details",
                entries[idx].url
            );
            slots[idx] = Some(ItemRecord::absent(&entries[idx]));
        }

        slots.into_iter().flatten().collect()
    }

    /// Rewrites the output with everything collected so far
    fn checkpoint(&self, slots: &[Option<ItemRecord>], received: usize) {
        let Some(every) = self.config.checkpoint_every else {
            return;
        };
        if received % every != 0 || received == slots.len() {
            return;
        }

        let partial = slots.iter().flatten().cloned().collect::<Vec<_>>();
        match store::write_records(&self.config.output_path, &partial) {
            Ok(()) => ::log::info!("Checkpoint: {} records saved", partial.len()),
            Err(e) => ::log::warn!("Checkpoint failed: {}", e),
        }
    }
}

/// One detail worker and the shared state it needs
struct Worker<C: Connector> {
    id: usize,
    connector: Arc<C>,
    harvester: Arc<DetailHarvester>,
    queue: WorkQueue,
    results: mpsc::Sender<(usize, ItemRecord)>,
    cancel: CancellationToken,
}

impl<C: Connector> Worker<C> {
    fn spawn(self, session: C::Session) -> JoinHandle<()> {
        ::log::trace!("Spawning worker {}", self.id);
        tokio::spawn(self.run(session))
    }

    /// Takes entries until the queue is empty or the run is cancelled.
    ///
    /// Each item runs in its own task so a panic only costs that item and
    /// the session it was using.
    async fn run(self, mut session: C::Session) {
        loop {
            if self.cancel.is_cancelled() {
                ::log::info!("Worker {} stopping: run cancelled", self.id);
                break;
            }
            let Some((idx, entry)) = self.queue.lock().await.pop_front() else {
                break;
            };
            ::log::info!("Worker {} harvesting item {}: {}", self.id, idx + 1, entry.url);

            let task = {
                let connector = Arc::clone(&self.connector);
                let harvester = Arc::clone(&self.harvester);
                let entry = entry.clone();
                let id = self.id;
                tokio::spawn(async move {
                    let record =
                        harvest_entry(&*connector, &mut session, &harvester, &entry, id)
                            .await;
                    (session, record)
                })
            };

            let record = match task.await {
                Ok((returned, record)) => {
                    session = returned;
                    record
                }
                Err(e) => {
                    ::log::error!("Worker {} crashed on {}: {}", self.id, entry.url, e);
                    if self.results.send((idx, ItemRecord::absent(&entry))).await.is_err() {
                        return;
                    }
                    match self.connector.connect().await {
                        Ok(fresh) => {
                            session = fresh;
                            continue;
                        }
                        Err(e) => {
                            ::log::error!("Worker {} cannot replace its session: {}", self.id, e);
                            return;
                        }
                    }
                }
            };

            if self.results.send((idx, record)).await.is_err() {
                ::log::error!("Worker {} lost the result channel", self.id);
                break;
            }
        }

        close_session(&session, self.id).await;
    }
}

/// Harvests one entry, reconnecting once if the session was lost
async fn harvest_entry<C: Connector>(
    connector: &C,
    session: &mut C::Session,
    harvester: &DetailHarvester,
    entry: &ListingEntry,
    worker_id: usize,
) -> ItemRecord {
    let result = match harvester.harvest(&*session, entry).await {
        Err(e) if e.is_session_lost() => {
            ::log::warn!(
                "Worker {} attempting to reconnect after losing its session: {}",
                worker_id,
                e
            );
            match connector.connect().await {
                Ok(fresh) => {
                    let _ = session.close().await;
                    *session = fresh;
                    ::log::info!("Worker {} successfully reconnected", worker_id);
                    harvester.harvest(&*session, entry).await
                }
                Err(reconnect) => {
                    ::log::error!("Worker {} failed to reconnect: {}", worker_id, reconnect);
                    Err(e)
                }
            }
        }
        other => other,
    };

    DetailHarvester::record_or_absent(entry, result)
}

async fn close_session<S: Session>(session: &S, worker_id: usize) {
    if let Err(e) = session.close().await {
        ::log::debug!("Worker {} could not close its session: {}", worker_id, e);
    }
}
