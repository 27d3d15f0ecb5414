//! The logger: a thread-safe record stream gluing the serializer to a
//! transfer driver.
//!
//! The logger owns the buffer-allocation and dispatch policy: records go
//! into the serializer, and whenever the current encoding buffer is
//! exhausted the closed envelope is wrapped in a virtual file and handed to
//! the driver asynchronously. The logger never blocks on the transport:
//! driver back-pressure is absorbed by the serializer's ring first and a
//! single held-back envelope second, and only once both are saturated does a
//! put fail.

use std::sync::{Arc, Mutex};

use log::{debug, warn};

use crate::driver::{TransferDriver, TransferJob};
use crate::error::{Error, PutError, Rejected};
use crate::record::{Record, RecordBase};
use crate::serial::{Queued, Serializer};
use crate::stream::{RecordStream, StreamName};
use crate::vstorage::VirtualFile;

/// Logger configuration.
#[derive(Clone, Debug)]
pub struct LoggerOptions {
    /// Size in bytes of each encoding buffer. Larger buffers amortize the
    /// per-envelope overhead of long-term buffering and transmission, but
    /// only pay off with a queue deep enough to fill them.
    ///
    /// Default: 2048
    pub encoding_buf_size: usize,
    /// Capacity of the record queue buffering records before they are
    /// committed to an envelope. MUST be a power of two.
    ///
    /// The memory footprint of a logger is roughly proportional to this.
    /// Take care with string-typed records: every queued record owns a copy
    /// of its payload.
    ///
    /// Default: 64
    pub record_queue_size: usize,
    /// Display name of the instance, truncated to [`StreamName`] length.
    pub name: String,
    /// Base name prefix for all the instance's envelopes; see
    /// [`RecordBase`].
    pub base_name: Option<String>,
}

impl Default for LoggerOptions {
    fn default() -> Self {
        Self {
            encoding_buf_size: 2048,
            record_queue_size: 64,
            name: "<none>".into(),
            base_name: None,
        }
    }
}

struct Inner {
    ser: Serializer,
    encoding_buf_size: usize,
    /// An envelope the driver refused to accept earlier. At most one is held
    /// back; it blocks further swaps until the driver takes it.
    pending: Option<TransferJob>,
}

/// See the [module documentation](self).
pub struct Logger {
    name: StreamName,
    driver: Arc<dyn TransferDriver>,
    inner: Mutex<Inner>,
}

impl Logger {
    /// Create a logger over `driver`.
    ///
    /// # Errors
    ///
    /// `Invalid` if the record queue size is not a power of two, `NoSpace`
    /// if the encoding buffer size cannot even hold an envelope close.
    pub fn create(opts: LoggerOptions, driver: Arc<dyn TransferDriver>) -> Result<Self, Error> {
        let base = RecordBase {
            name: opts.base_name,
        };
        let ser = Serializer::new(
            vec![0; opts.encoding_buf_size],
            opts.record_queue_size,
            base,
        )?;

        Ok(Self {
            name: StreamName::from_str_truncate(&opts.name),
            driver,
            inner: Mutex::new(Inner {
                ser,
                encoding_buf_size: opts.encoding_buf_size,
                pending: None,
            }),
        })
    }

    /// Try to hand the held-back envelope to the driver. Fails without side
    /// effects while the driver keeps refusing.
    fn pump(&self, inner: &mut Inner) -> Result<(), Error> {
        let Some(job) = inner.pending.take() else {
            return Ok(());
        };
        match self.driver.try_send(job) {
            Ok(()) => {
                debug!("{}: held-back envelope dispatched", self.name);
                Ok(())
            }
            Err(Rejected { job, source }) => {
                inner.pending = Some(job);
                Err(source)
            }
        }
    }

    /// Hand a closed envelope to the driver, holding it back if the driver
    /// refuses.
    fn dispatch(&self, inner: &mut Inner, envelope: Vec<u8>) {
        if envelope.is_empty() {
            return;
        }

        let name = self.name.clone();
        let job = TransferJob::new(Box::new(VirtualFile::with_data(envelope))).on_done(Box::new(
            move |res| match res {
                Ok(()) => debug!("{name}: envelope delivered"),
                Err(e) => warn!("{name}: envelope lost: {e}"),
            },
        ));

        match self.driver.try_send(job) {
            Ok(()) => debug!("{}: envelope dispatched", self.name),
            Err(Rejected { job, source }) => {
                if inner.pending.is_none() {
                    debug!("{}: driver busy ({source}), holding envelope back", self.name);
                    inner.pending = Some(job);
                } else {
                    // Only one envelope is ever held; further ones are lost.
                    job.finish(Err(source));
                }
            }
        }
    }

    /// Swap in a fresh encoding buffer and send the outgoing envelope.
    ///
    /// Returns `(committed, pending)`: whether the swap produced a
    /// non-empty envelope, and whether records remain queued.
    fn swap_and_send(&self, inner: &mut Inner) -> Result<(bool, bool), Error> {
        self.pump(inner)?;

        let swapped = inner.ser.swap(vec![0; inner.encoding_buf_size])?;
        let committed = !swapped.envelope.is_empty();
        self.dispatch(inner, swapped.envelope);
        Ok((committed, swapped.pending))
    }

    /// The record here is already the logger's own copy; the caller's
    /// original is untouched whatever happens below.
    fn put_record(&self, inner: &mut Inner, record: Record) -> Result<(), Error> {
        match inner.ser.put(record) {
            Ok(Queued::WithinFit) => Ok(()),
            Ok(Queued::BeyondFit) => {
                // The record is accepted either way; a refusing driver only
                // delays the swap, it does not fail this put.
                if let Err(e) = self.swap_and_send(inner) {
                    debug!("{}: cannot make room yet: {e}", self.name);
                }
                Ok(())
            }
            Err(PutError {
                record,
                source: Error::NoSpace,
            }) => {
                // Ring full: room has to be made before this record lands.
                match self.swap_and_send(inner) {
                    Ok(_) => match inner.ser.put(record) {
                        Ok(_) => Ok(()),
                        Err(e) => Err(e.source),
                    },
                    Err(Error::Invalid) => Err(Error::Invalid),
                    // Driver refused and the ring is saturated: the stream
                    // is genuinely out of space for now.
                    Err(_) => Err(Error::NoSpace),
                }
            }
            Err(e) => Err(e.source),
        }
    }

    fn flush_inner(&self, inner: &mut Inner) -> Result<(), Error> {
        loop {
            let (committed, pending) = self.swap_and_send(inner)?;
            if !pending {
                // The last envelope may still sit in the held-back slot; a
                // flush has not completed until the driver took everything.
                if inner.pending.is_some() {
                    return Err(Error::WouldBlock);
                }
                return Ok(());
            }
            if !committed {
                // Queued records which fit no buffer of the configured size;
                // only a bigger buffer could get them out.
                return Err(Error::NoBuffers);
            }
        }
    }
}

impl RecordStream for Logger {
    fn name(&self) -> &str {
        &self.name
    }

    /// Append a record.
    ///
    /// Works on a deep copy throughout, so a failure never damages the
    /// caller's record: ownership is taken only on `Ok`.
    fn put(&self, record: Record) -> Result<(), PutError> {
        let mut inner = self.inner.lock().unwrap();
        let copy = record.clone();
        match self.put_record(&mut inner, copy) {
            Ok(()) => Ok(()),
            Err(source) => Err(PutError::new(record, source)),
        }
    }

    fn flush(&self) -> Result<(), Error> {
        let mut inner = self.inner.lock().unwrap();
        self.flush_inner(&mut inner)
    }

    fn close(&self) -> Result<(), Error> {
        let mut inner = self.inner.lock().unwrap();

        let flushed = self.flush_inner(&mut inner);
        let envelope = inner.ser.retire()?;
        if !envelope.is_empty() {
            self.dispatch(&mut inner, envelope);
        }
        if inner.pending.take().is_some() {
            warn!("{}: dropping undeliverable envelope on close", self.name);
        }

        flushed
    }
}
