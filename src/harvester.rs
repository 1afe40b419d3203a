//! Runs the workers and the sink consumer with ordered shutdown.

use crate::config::HarvesterConfig;
use crate::error::Result;
use crate::pool::ProxyPool;
use crate::shutdown::Shutdown;
use crate::sink::{self, ResultSink};
use crate::worker::Worker;

use futures::stream::{FuturesUnordered, StreamExt};
use log::{error, info};
use std::sync::Arc;

/// Drives a pool of workers and feeds their results into one sink.
pub struct Harvester {
    pool: Arc<ProxyPool>,
    config: HarvesterConfig,
}

impl Harvester {
    pub fn new(pool: Arc<ProxyPool>, config: HarvesterConfig) -> Self {
        Self { pool, config }
    }

    pub fn pool(&self) -> &Arc<ProxyPool> {
        &self.pool
    }

    /// Probe until `shutdown` fires, then return how many results the sink accepted.
    ///
    /// Every worker owns its own sender, so the consumer only finishes after
    /// the last worker has exited; nothing is ever sent into a closed channel.
    /// A worker panic is re-raised as soon as it is observed; the remaining
    /// workers and the consumer are aborted first.
    pub async fn run(&self, sink: Arc<dyn ResultSink>, shutdown: Shutdown) -> Result<usize> {
        let (results, receiver) = sink::result_channel();

        let workers = (0..self.config.workers)
            .map(|id| Worker::new(id, Arc::clone(&self.pool), &self.config, results.clone()))
            .collect::<Result<Vec<_>>>()?;
        drop(results);

        let consumer = tokio::spawn(async move { receiver.drain(sink.as_ref()).await });

        info!(
            "Starting {} workers over {} proxies",
            workers.len(),
            self.pool.len()
        );
        let mut running: FuturesUnordered<_> = workers
            .into_iter()
            .map(|worker| tokio::spawn(worker.run(shutdown.clone())))
            .collect();

        while let Some(joined) = running.next().await {
            match joined {
                Ok(()) => {}
                Err(e) if e.is_panic() => {
                    error!("Worker panicked, stopping the harvester");
                    for handle in running.iter() {
                        handle.abort();
                    }
                    consumer.abort();
                    std::panic::resume_unwind(e.into_panic());
                }
                Err(e) => error!("Worker task failed: {}", e),
            }
        }

        let accepted = match consumer.await {
            Ok(accepted) => accepted,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => {
                error!("Sink consumer failed: {}", e);
                0
            }
        };

        info!("Harvester stopped, {} results delivered", accepted);
        Ok(accepted)
    }
}
