//! The publisher: a transfer driver that ships envelopes straight to the
//! remote endpoint.
//!
//! Asynchronous sends are drained by a dedicated worker thread; synchronous
//! sends run the same retry loop inline. Dropping the publisher blocks until
//! every accepted job has completed.

use std::io;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::{error, warn};

use crate::driver::{TransferDriver, TransferJob};
use crate::error::{Error, Rejected};
use crate::net::{RemoteResource, Transport};
use crate::vstorage::FileIo;

/// Capacity of the worker's job mailbox.
const JOB_QUEUE_LEN: usize = 4;

/// Publisher configuration.
#[derive(Clone, Debug)]
pub struct PublisherOptions {
    /// How many times a failed transport send is retried before a job is
    /// reported as failed. A job is attempted `retry_count + 1` times in
    /// total.
    ///
    /// Default: 2
    pub retry_count: u32,
}

impl Default for PublisherOptions {
    fn default() -> Self {
        Self { retry_count: 2 }
    }
}

struct Shared {
    transport: Arc<dyn Transport>,
    resource: RemoteResource,
    retry_count: u32,
    /// Number of accepted jobs not yet completed.
    in_flight: Mutex<usize>,
    drained: Condvar,
}

impl Shared {
    /// Run the retry loop against the transport. Positive byte counts are
    /// collapsed to plain success here, at the boundary.
    fn send_with_retry(&self, file: &mut dyn FileIo) -> Result<(), Error> {
        let mut attempts_left = self.retry_count + 1;
        loop {
            attempts_left -= 1;
            match self.transport.send(&self.resource, file) {
                Ok(_) => return Ok(()),
                Err(e) if attempts_left > 0 => {
                    warn!("send failed: {e}, retrying");
                }
                Err(e) => {
                    error!("send failed: {e}");
                    return Err(e.into());
                }
            }
        }
    }

    fn job_done(&self) {
        let mut n = self.in_flight.lock().unwrap();
        *n -= 1;
        if *n == 0 {
            self.drained.notify_all();
        }
    }
}

/// See the [module documentation](self).
pub struct Publisher {
    shared: Arc<Shared>,
    tx: Option<Sender<TransferJob>>,
    worker: Option<JoinHandle<()>>,
}

impl Publisher {
    /// Create a publisher bound to `resource` and spawn its worker thread.
    pub fn new(
        transport: Arc<dyn Transport>,
        resource: RemoteResource,
        opts: PublisherOptions,
    ) -> io::Result<Self> {
        let shared = Arc::new(Shared {
            transport,
            resource,
            retry_count: opts.retry_count,
            in_flight: Mutex::new(0),
            drained: Condvar::new(),
        });

        let (tx, rx) = bounded(JOB_QUEUE_LEN);
        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("cdf-publisher".into())
            .spawn(move || worker_loop(&worker_shared, rx))?;

        Ok(Self {
            shared,
            tx: Some(tx),
            worker: Some(worker),
        })
    }
}

fn worker_loop(shared: &Shared, rx: Receiver<TransferJob>) {
    for mut job in rx.iter() {
        let res = shared.send_with_retry(job.file_mut());
        job.finish(res);
        shared.job_done();
    }
}

impl TransferDriver for Publisher {
    fn try_send(&self, job: TransferJob) -> Result<(), Rejected> {
        let tx = self.tx.as_ref().expect("sender lives as long as the publisher");

        // Count the job before handing it over, so a delete racing with the
        // worker cannot miss it.
        *self.shared.in_flight.lock().unwrap() += 1;

        match tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.shared.job_done();
                let (job, source) = match e {
                    TrySendError::Full(job) => {
                        error!("publisher queue full");
                        (job, Error::WouldBlock)
                    }
                    TrySendError::Disconnected(job) => (job, Error::NoSuchProcess),
                };
                Err(Rejected::new(job, source))
            }
        }
    }

    fn send(&self, file: &mut dyn FileIo) -> Result<(), Error> {
        self.shared.send_with_retry(file)
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        // Wait for the accepted jobs to finish...
        let mut n = self.shared.in_flight.lock().unwrap();
        while *n > 0 {
            n = self.shared.drained.wait(n).unwrap();
        }
        drop(n);

        // ...then disconnect the mailbox and let the worker exit.
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
