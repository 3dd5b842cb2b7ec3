//! The single write thread

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{bounded, Receiver, Sender};

use super::{Mutation, Replicator, WriteJob, WriteOptions};
use crate::error::{QuillError, Result};
use crate::protocol::ResponseCode;
use crate::storage::{StorageHandle, StoredValue};

/// Counters reported when the serializer stops
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriterStats {
    /// Jobs acknowledged with OK
    pub applied: u64,

    /// Jobs completed with SERVER_ERROR
    pub failed: u64,
}

/// Applies queued write jobs to the storage handle, one at a time
pub struct WriteSerializer {
    storage: Arc<dyn StorageHandle>,
    replicator: Arc<dyn Replicator>,
    jobs: Receiver<WriteJob>,
    stats: WriterStats,
}

impl WriteSerializer {
    /// Spawn the serializer thread
    ///
    /// The thread runs until every `WriteHandle` is dropped and the queue is
    /// empty, so dropping the handles is how shutdown drains it.
    pub fn start(
        storage: Arc<dyn StorageHandle>,
        replicator: Arc<dyn Replicator>,
        queue_capacity: usize,
    ) -> Result<(WriteHandle, JoinHandle<WriterStats>)> {
        let (sender, jobs) = bounded(queue_capacity);
        let serializer = Self {
            storage,
            replicator,
            jobs,
            stats: WriterStats::default(),
        };

        let thread = thread::Builder::new()
            .name("write-serializer".to_string())
            .spawn(move || serializer.run())
            .map_err(|e| QuillError::WriterStartup(e.to_string()))?;

        Ok((WriteHandle { jobs: sender }, thread))
    }

    fn run(mut self) -> WriterStats {
        tracing::info!("Write serializer started");

        while let Ok(job) = self.jobs.recv() {
            self.apply(job);
        }

        tracing::info!(
            "Write serializer drained: {} applied, {} failed",
            self.stats.applied,
            self.stats.failed
        );
        self.stats
    }

    fn apply(&mut self, job: WriteJob) {
        let options = job.options;
        let mutation = job.mutation.clone();

        let mut code = self.store(&mutation, options);

        // With SYNC the replica must have the write before the client hears OK.
        if code == ResponseCode::Ok && options.replicate && options.sync {
            if let Err(e) = self.replicator.replicate(&mutation) {
                tracing::error!("Synchronous replication failed: {}", e);
                code = ResponseCode::ServerError;
            }
        }

        match code {
            ResponseCode::Ok => self.stats.applied += 1,
            _ => self.stats.failed += 1,
        }

        if !job.complete(code) {
            tracing::debug!("Write submitter went away before the result was delivered");
        }

        if code == ResponseCode::Ok && options.replicate && !options.sync {
            if let Err(e) = self.replicator.replicate(&mutation) {
                tracing::warn!("Asynchronous replication failed: {}", e);
            }
        }
    }

    fn store(&self, mutation: &Mutation, options: WriteOptions) -> ResponseCode {
        let value = StoredValue::new(mutation.value.clone(), mutation.compressed);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.storage
                .put(mutation.db.as_deref(), &mutation.key, value, options.sync)
        }));

        match outcome {
            Ok(Ok(())) => ResponseCode::Ok,
            Ok(Err(e)) => {
                tracing::error!("Write of {} byte key failed: {}", mutation.key.len(), e);
                ResponseCode::ServerError
            }
            Err(_) => {
                tracing::error!("Storage backend panicked while applying a write");
                ResponseCode::ServerError
            }
        }
    }
}

/// Submission side of the write queue; cheap to clone, one per worker
#[derive(Clone)]
pub struct WriteHandle {
    jobs: Sender<WriteJob>,
}

impl WriteHandle {
    /// Enqueue a mutation and block until the serializer has applied it
    pub fn submit(&self, mutation: Mutation, options: WriteOptions) -> ResponseCode {
        let (job, result) = WriteJob::new(mutation, options);

        if self.jobs.send(job).is_err() {
            tracing::error!("Write serializer is not running");
            return ResponseCode::ServerError;
        }

        result.recv().unwrap_or_else(|_| {
            tracing::error!("Write serializer dropped a job without a result");
            ResponseCode::ServerError
        })
    }
}
