//! Hand-off of harvested fingerprints to a downstream sink.
//!
//! Workers emit through a [`ResultSender`] and wait until the single consumer
//! has passed the result to the sink, so a stalled sink stalls probing instead
//! of queueing results.

use crate::error::{Error, Result};

use async_trait::async_trait;
use log::{debug, error};
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, Mutex};

/// A fingerprint and the proxy address that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FingerprintResult {
    pub fingerprint: String,
    pub proxy_address: String,
}

/// Consumes harvested results, one at a time.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn accept(&self, result: FingerprintResult) -> Result<()>;
}

struct Delivery {
    result: FingerprintResult,
    done: oneshot::Sender<Result<()>>,
}

/// Create a linked sender and receiver.
pub fn result_channel() -> (ResultSender, ResultReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (ResultSender { tx }, ResultReceiver { rx })
}

/// Producer side of the hand-off. One clone per worker.
#[derive(Clone)]
pub struct ResultSender {
    tx: mpsc::Sender<Delivery>,
}

impl ResultSender {
    /// Hand a result over and wait until the sink has taken it.
    ///
    /// Returns the sink's own error if it rejected the result. Dropping the
    /// returned future before it completes withdraws the result.
    pub async fn emit(&self, result: FingerprintResult) -> Result<()> {
        let (done, taken) = oneshot::channel();
        self.tx
            .send(Delivery { result, done })
            .await
            .map_err(|_| Error::SinkClosed)?;
        taken.await.map_err(|_| Error::SinkClosed)?
    }
}

/// Consumer side of the hand-off.
pub struct ResultReceiver {
    rx: mpsc::Receiver<Delivery>,
}

impl ResultReceiver {
    /// Feed every result into `sink` until all senders are gone.
    /// Returns how many results the sink accepted.
    pub async fn drain<S>(mut self, sink: &S) -> usize
    where
        S: ResultSink + ?Sized,
    {
        let mut accepted = 0;
        while let Some(delivery) = self.rx.recv().await {
            // the emitter gave up waiting, the result is no longer wanted
            if delivery.done.is_closed() {
                debug!("Dropping withdrawn result from {}", delivery.result.proxy_address);
                continue;
            }

            let outcome = sink.accept(delivery.result).await;
            match &outcome {
                Ok(()) => accepted += 1,
                Err(e) => error!("Sink rejected result: {}", e),
            }
            let _ = delivery.done.send(outcome);
        }
        accepted
    }
}

/// Writes each result as one JSON object per line.
pub struct JsonLinesSink<W> {
    writer: Mutex<W>,
}

impl<W> JsonLinesSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Recover the writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W> ResultSink for JsonLinesSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn accept(&self, result: FingerprintResult) -> Result<()> {
        let mut line = serde_json::to_vec(&result)?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await?;
        Ok(())
    }
}
