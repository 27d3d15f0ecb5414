//! The record serializer: a double-queue encoder which guarantees forward
//! progress under a fixed output buffer.
//!
//! Records are queued in a ring while a simulation encoder proves, in
//! advance, how many of them fit the current output buffer (the *fit count*).
//! Committing is deferred until [`Serializer::swap`], which encodes exactly
//! the proven prefix into the outgoing buffer and re-proves the remainder
//! against the fresh one. Callers therefore never observe partial encodings,
//! and no accepted record is lost on a buffer swap.

use crate::error::{Error, PutError};
use crate::record::{Record, RecordBase};
use crate::ring::PeekRing;
use crate::senml::{self, ByteBudget, SliceWriter, ENVELOPE_CLOSE_RESERVE};

/// Outcome of a successful [`Serializer::put`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Queued {
    /// The record is proven to fit the current output buffer.
    WithinFit,
    /// The record was accepted but lies beyond the fit line; the caller
    /// should swap buffers to make progress.
    BeyondFit,
}

/// Result of a successful [`Serializer::swap`].
#[derive(Debug)]
pub struct Swapped {
    /// The outgoing buffer, truncated to the closed envelope. Empty if no
    /// record had been proven to fit.
    pub envelope: Vec<u8>,
    /// Whether records remain queued beyond the new buffer's fit line. It is
    /// normal operation to keep putting until a put reports
    /// [`Queued::BeyondFit`] or the ring runs full, and only then swap again.
    pub pending: bool,
}

/// Simulation encoder state.
///
/// `None` means the simulation could not even be opened within the budget
/// (or the serializer was retired); every put then reports `NoSpace`, which
/// surfaces at the [`Serializer::put`] level as `NoBuffers` once nothing
/// fits.
struct Simulation {
    enc: Option<senml::Encoder<ByteBudget>>,
}

impl Simulation {
    /// Set up a simulation for a buffer of `buf_len` bytes. Closing the
    /// envelope array takes up to [`ENVELOPE_CLOSE_RESERVE`] extra bytes, so
    /// that is subtracted up front.
    fn over(buf_len: usize, base: &RecordBase) -> Self {
        let budget = buf_len.saturating_sub(ENVELOPE_CLOSE_RESERVE);
        Self {
            enc: senml::Encoder::new(ByteBudget::new(budget), base).ok(),
        }
    }

    fn retired() -> Self {
        Self { enc: None }
    }

    fn put(&mut self, rec: &Record) -> Result<(), Error> {
        match &mut self.enc {
            Some(enc) => enc.put(rec),
            None => Err(Error::NoSpace),
        }
    }
}

/// See the [module documentation](self).
pub struct Serializer {
    /// The current output buffer; `None` once the serializer was retired.
    buf: Option<Vec<u8>>,
    ring: PeekRing,
    sim: Simulation,
    /// How many records at the ring head are proven encodable into `buf`.
    fit_count: usize,
    base: RecordBase,
}

impl Serializer {
    /// Create a serializer over an initial output buffer.
    ///
    /// `queue_len` is the record ring capacity and must be a power of two.
    ///
    /// # Errors
    ///
    /// `Invalid` if `queue_len` is zero or not a power of two; `NoSpace` if
    /// the buffer cannot even hold the envelope close.
    pub fn new(buf: Vec<u8>, queue_len: usize, base: RecordBase) -> Result<Self, Error> {
        if queue_len == 0 || !queue_len.is_power_of_two() {
            return Err(Error::Invalid);
        }
        if buf.len() < ENVELOPE_CLOSE_RESERVE {
            return Err(Error::NoSpace);
        }

        let sim = Simulation::over(buf.len(), &base);
        Ok(Self {
            ring: PeekRing::with_capacity(queue_len),
            buf: Some(buf),
            sim,
            fit_count: 0,
            base,
        })
    }

    /// Queue a record for serialization, taking ownership on success.
    ///
    /// # Errors
    ///
    /// The record is handed back inside the error:
    ///
    /// * `NoSpace`: the ring is full; swap buffers and retry.
    /// * `NoBuffers`: the output buffer cannot hold even this one record;
    ///   only swapping in a bigger buffer can help.
    /// * `Invalid`: the record is not encodable (empty value), or the
    ///   serializer was retired.
    pub fn put(&mut self, rec: Record) -> Result<Queued, PutError> {
        if self.buf.is_none() {
            log::error!("put on retired serializer");
            return Err(PutError::new(rec, Error::Invalid));
        }
        self.check_invariants();

        if self.ring.is_full() {
            return Err(PutError::new(rec, Error::NoSpace));
        }

        match self.sim.put(&rec) {
            Ok(()) => {
                self.queue(rec);
                self.fit_count += 1;
                self.check_invariants();
                Ok(Queued::WithinFit)
            }
            Err(Error::NoSpace) => {
                if self.fit_count == 0 {
                    // The buffer cannot fit even one such record.
                    return Err(PutError::new(rec, Error::NoBuffers));
                }
                self.queue(rec);
                Ok(Queued::BeyondFit)
            }
            Err(e) => {
                log::error!("record rejected by encoder: {e}");
                Err(PutError::new(rec, Error::Invalid))
            }
        }
    }

    /// Exchange the output buffer, committing the proven prefix.
    ///
    /// Exactly `fit_count` records are drained from the ring into the
    /// outgoing buffer and the envelope is closed; the remainder is re-proven
    /// against `new_buf`. See [`Swapped`].
    pub fn swap(&mut self, new_buf: Vec<u8>) -> Result<Swapped, Error> {
        let Some(old) = self.buf.take() else {
            log::error!("swap on retired serializer");
            return Err(Error::Invalid);
        };

        let envelope = self.commit(old)?;
        self.buf = Some(new_buf);
        self.resimulate();
        self.check_invariants();

        Ok(Swapped {
            envelope,
            pending: !self.ring.is_empty(),
        })
    }

    /// Commit the proven prefix one last time and invalidate the serializer.
    ///
    /// Any records still queued beyond the fit line are discarded, releasing
    /// their string payloads. Every later call fails with `Invalid`.
    pub fn retire(&mut self) -> Result<Vec<u8>, Error> {
        let Some(old) = self.buf.take() else {
            return Err(Error::Invalid);
        };

        let envelope = self.commit(old)?;
        self.sim = Simulation::retired();
        while self.ring.pop().is_some() {}

        Ok(envelope)
    }

    /// Encode the `fit_count`-record prefix into `buf` for real and close
    /// the envelope. Infallible in practice: everything encoded here was
    /// proven to fit by the simulation.
    fn commit(&mut self, mut buf: Vec<u8>) -> Result<Vec<u8>, Error> {
        if self.fit_count == 0 {
            buf.clear();
            return Ok(buf);
        }

        let fit = self.fit_count;
        let written = {
            let mut enc = senml::Encoder::new(SliceWriter::new(&mut buf), &self.base)?;
            for _ in 0..fit {
                let rec = self.ring.pop().expect("fit count cannot exceed ring fill");
                enc.put(&rec)?;
            }
            enc.close()?.written()
        };

        self.fit_count = 0;
        buf.truncate(written);
        Ok(buf)
    }

    /// Re-prove the queued records against the current buffer, walking from
    /// the ring head until the first one that does not fit.
    fn resimulate(&mut self) {
        let buf_len = self.buf.as_ref().expect("only called on a valid instance").len();
        self.sim = Simulation::over(buf_len, &self.base);

        let mut fit = 0;
        for rec in self.ring.iter() {
            match self.sim.put(rec) {
                Ok(()) => fit += 1,
                Err(Error::NoSpace) => break,
                Err(e) => {
                    // Queued records already passed encoding validation once.
                    debug_assert!(false, "unexpected encoder error on requeue: {e}");
                    break;
                }
            }
        }
        self.fit_count = fit;
    }

    fn queue(&mut self, rec: Record) {
        if self.ring.push(rec).is_err() {
            unreachable!("ring fill was checked before queueing");
        }
    }

    fn check_invariants(&self) {
        debug_assert!(self.fit_count <= self.ring.fill());
    }

    #[cfg(test)]
    pub(crate) fn fit_count(&self) -> usize {
        self.fit_count
    }

    #[cfg(test)]
    pub(crate) fn queued(&self) -> Vec<Record> {
        self.ring.iter().cloned().collect()
    }
}
