//! The call logger: a bounded queue in front of a single writer task.
//!
//! Executors hand records to [`CallLogger::append`], which never waits. One
//! spawned task drains the queue and writes batches to the [`AuditSink`], so
//! the sink never sees concurrent writes and a slow disk never stalls a call.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, error, warn};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

use super::{AttemptFilter, AttemptIter, AuditSink, AuditStats};
use crate::config::LoggerConfig;
use crate::errors::AuditError;
use crate::models::AttemptRecord;

/// Upper bound on records written per sink call.
const MAX_BATCH: usize = 256;

enum Command {
    Record(Box<AttemptRecord>),
    Flush(oneshot::Sender<()>),
}

/// Handle to the writer task. Cheap to clone; the task stops once every
/// clone is dropped and the queue has drained.
#[derive(Clone)]
pub struct CallLogger {
    tx: mpsc::Sender<Command>,
    sink: Arc<dyn AuditSink>,
    dropped: Arc<AtomicU64>,
    config: LoggerConfig,
}

impl CallLogger {
    /// Start the writer task. Must be called inside a tokio runtime.
    pub fn spawn(sink: Arc<dyn AuditSink>, config: LoggerConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));

        tokio::spawn(run_writer(rx, Arc::clone(&sink), Arc::clone(&dropped)));

        Self {
            tx,
            sink,
            dropped,
            config,
        }
    }

    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    /// Queue a record. Never blocks: a full or closed queue drops the record
    /// and bumps [`dropped`](Self::dropped).
    pub fn append(&self, record: AttemptRecord) {
        match self.tx.try_send(Command::Record(Box::new(record))) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!("Call log queue is full, dropped attempt record ({} total)", total);
            }
            Err(TrySendError::Closed(_)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                error!("Call log writer has stopped, dropped attempt record ({} total)", total);
            }
        }
    }

    /// Records lost to a full queue, a stopped writer, or a failed sink write.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Wait until every record queued before this call has reached the sink.
    pub async fn flush(&self) -> Result<(), AuditError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::Flush(reply_tx))
            .await
            .map_err(|_| AuditError::WriterStopped)?;
        reply_rx.await.map_err(|_| AuditError::WriterStopped)
    }

    /// Flush, then read matching records from the sink.
    pub async fn query(&self, filter: &AttemptFilter) -> Result<AttemptIter, AuditError> {
        self.flush().await?;
        self.sink.query(filter)
    }

    pub async fn stats(&self, filter: &AttemptFilter) -> Result<AuditStats, AuditError> {
        Ok(AuditStats::from_records(self.query(filter).await?))
    }

    pub async fn stats_by_provider(
        &self,
        filter: &AttemptFilter,
    ) -> Result<BTreeMap<String, AuditStats>, AuditError> {
        Ok(AuditStats::by_provider(self.query(filter).await?))
    }
}

async fn run_writer(
    mut rx: mpsc::Receiver<Command>,
    sink: Arc<dyn AuditSink>,
    dropped: Arc<AtomicU64>,
) {
    let mut batch: Vec<AttemptRecord> = Vec::with_capacity(MAX_BATCH);

    while let Some(command) = rx.recv().await {
        let mut waiters = Vec::new();
        push(command, &mut batch, &mut waiters);

        // Take whatever else is already queued without waiting.
        while batch.len() < MAX_BATCH {
            match rx.try_recv() {
                Ok(command) => push(command, &mut batch, &mut waiters),
                Err(_) => break,
            }
        }

        if !batch.is_empty() {
            if let Err(e) = sink.append(&batch) {
                let lost = batch.len() as u64;
                let total = dropped.fetch_add(lost, Ordering::Relaxed) + lost;
                error!(
                    "Failed to write {} attempt record(s): {} ({} dropped in total)",
                    lost, e, total
                );
            }
            batch.clear();
        }

        for waiter in waiters {
            let _ = waiter.send(());
        }
    }

    debug!("Call log writer stopped");
}

fn push(command: Command, batch: &mut Vec<AttemptRecord>, waiters: &mut Vec<oneshot::Sender<()>>) {
    match command {
        Command::Record(record) => batch.push(*record),
        Command::Flush(reply) => waiters.push(reply),
    }
}
