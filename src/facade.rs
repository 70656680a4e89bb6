//! Asynchronous query façade.
//!
//! A fixed pool of worker threads runs blocking reads against their own
//! read-only connections; completions are marshalled back to the caller
//! through a channel, each one paired with the filter that produced it so
//! a UI can drop callbacks whose filter is no longer current.

use std::path::Path;
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::error::DatabaseResult;
use crate::filter::PatchFilter;
use crate::patch::PatchHolder;
use crate::store::{OpenMode, PatchDatabase};
use crate::synth::SynthResolver;

struct Job {
    filter: PatchFilter,
    skip: i32,
    limit: i32,
}

/// One finished query, tagged with the filter it answered.
#[derive(Debug)]
pub struct QueryResult {
    pub filter: PatchFilter,
    pub patches: Vec<PatchHolder>,
}

/// Worker pool answering patch queries off the owner thread.
///
/// Completion order between jobs is unspecified; match results to requests
/// through the returned filter. Dropping the pool drains nothing: pending
/// jobs are discarded and workers are joined.
pub struct AsyncQueryPool {
    jobs: Option<Sender<Job>>,
    results: Receiver<QueryResult>,
    workers: Vec<JoinHandle<()>>,
}

impl AsyncQueryPool {
    /// Open `worker_count` read-only connections to the catalog at `path`
    /// and start their threads. The resolver snapshot is shared by all
    /// workers; rows for synths that have gone away are skipped as usual.
    pub fn new(
        path: &Path,
        resolver: SynthResolver,
        worker_count: usize,
    ) -> DatabaseResult<Self> {
        let (job_tx, job_rx) = unbounded::<Job>();
        let (result_tx, result_rx) = unbounded::<QueryResult>();

        let mut workers = Vec::new();
        for _ in 0..worker_count.max(1) {
            let db = PatchDatabase::open(path, OpenMode::ReadOnly)?;
            let jobs: Receiver<Job> = job_rx.clone();
            let results: Sender<QueryResult> = result_tx.clone();
            let resolver = resolver.clone();
            workers.push(std::thread::spawn(move || {
                for job in jobs.iter() {
                    let patches = db.get_patches(&job.filter, &resolver, job.skip, job.limit);
                    if results
                        .send(QueryResult {
                            filter: job.filter,
                            patches,
                        })
                        .is_err()
                    {
                        // Caller is gone, nothing left to report to.
                        break;
                    }
                }
            }));
        }

        Ok(Self {
            jobs: Some(job_tx),
            results: result_rx,
            workers,
        })
    }

    /// Enqueue a query; the completion arrives on [`AsyncQueryPool::results`].
    pub fn get_patches_async(&self, filter: PatchFilter, skip: i32, limit: i32) {
        if let Some(jobs) = &self.jobs {
            if jobs.send(Job { filter, skip, limit }).is_err() {
                log::error!("Async query pool is shut down, dropping query");
            }
        }
    }

    /// Completion channel, drained on the caller's own thread.
    pub fn results(&self) -> &Receiver<QueryResult> {
        &self.results
    }
}

impl Drop for AsyncQueryPool {
    fn drop(&mut self) {
        // Closing the job channel ends the worker loops.
        self.jobs.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
