//! The serial dispatch queue behind the long-term buffer subsystem.
//!
//! One long-lived worker thread exclusively owns the subsystem state;
//! requests are closures shipped over a bounded mailbox and executed one
//! after another. Everything that touches the registry, the counters or a
//! pool directory runs on that single thread, which removes the need for
//! any finer-grained locking around them.

use std::io;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::error::Error;

/// A request executed on the worker against the exclusively-owned state.
pub(crate) type Job<S> = Box<dyn FnOnce(&mut S) + Send>;

enum Msg<S> {
    Run(Job<S>),
    Shutdown,
}

/// Handle for submitting requests; instances and the worker itself (for
/// self-dispatch) hold clones of this.
pub(crate) struct DispatchHandle<S> {
    tx: Sender<Msg<S>>,
}

impl<S> Clone for DispatchHandle<S> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<S: 'static> DispatchHandle<S> {
    /// Submit a request asynchronously. Never blocks.
    pub(crate) fn dispatch(&self, job: impl FnOnce(&mut S) + Send + 'static) -> Result<(), Error> {
        match self.tx.try_send(Msg::Run(Box::new(job))) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(Error::WouldBlock),
            Err(TrySendError::Disconnected(_)) => Err(Error::NoSuchProcess),
        }
    }

    /// Submit a request asynchronously, reclaiming `payload` if the mailbox
    /// rejects it.
    ///
    /// The payload is what makes a request's failure reportable (a transfer
    /// job whose completion the caller must keep, a publication completion
    /// that must still be invoked), so it cannot be allowed to vanish inside
    /// an undeliverable closure.
    pub(crate) fn dispatch_reclaimable<T: Send + 'static>(
        &self,
        payload: T,
        job: impl FnOnce(&mut S, T) + Send + 'static,
    ) -> Result<(), (T, Error)> {
        let slot = Arc::new(Mutex::new(Some(payload)));
        let worker_slot = Arc::clone(&slot);
        let res = self.dispatch(move |state| {
            if let Some(payload) = worker_slot.lock().unwrap().take() {
                job(state, payload);
            }
        });
        match res {
            Ok(()) => Ok(()),
            Err(e) => {
                let payload = slot
                    .lock()
                    .unwrap()
                    .take()
                    .expect("undelivered payload is still in the slot");
                Err((payload, e))
            }
        }
    }

    /// Submit a request and block until the worker has executed it,
    /// returning its result.
    ///
    /// Must not be called from the worker itself.
    pub(crate) fn dispatch_sync<R: Send + 'static>(
        &self,
        job: impl FnOnce(&mut S) -> R + Send + 'static,
    ) -> Result<R, Error> {
        let (reply_tx, reply_rx) = bounded(1);
        self.tx
            .send(Msg::Run(Box::new(move |state| {
                let _ = reply_tx.send(job(state));
            })))
            .map_err(|_| Error::NoSuchProcess)?;
        reply_rx.recv().map_err(|_| Error::NoSuchProcess)
    }
}

/// The queue itself: shuts the worker down and joins it on drop.
pub(crate) struct DispatchQueue<S> {
    handle: DispatchHandle<S>,
    worker: Option<JoinHandle<()>>,
}

impl<S: Send + 'static> DispatchQueue<S> {
    /// Spawn the worker. `init` builds the state on the worker thread and
    /// receives a handle with which the state can self-dispatch.
    pub(crate) fn start(
        name: &str,
        mailbox_len: usize,
        init: impl FnOnce(DispatchHandle<S>) -> S + Send + 'static,
    ) -> io::Result<Self> {
        let (tx, rx) = bounded(mailbox_len);
        let self_handle = DispatchHandle { tx: tx.clone() };

        let worker = thread::Builder::new()
            .name(name.into())
            .spawn(move || worker_loop(rx, init(self_handle)))?;

        Ok(Self {
            handle: DispatchHandle { tx },
            worker: Some(worker),
        })
    }

    pub(crate) fn handle(&self) -> DispatchHandle<S> {
        self.handle.clone()
    }
}

fn worker_loop<S>(rx: Receiver<Msg<S>>, mut state: S) {
    while let Ok(msg) = rx.recv() {
        match msg {
            Msg::Run(job) => job(&mut state),
            Msg::Shutdown => break,
        }
    }
    // Drain what was already accepted (including requests the drained jobs
    // dispatch themselves), so no accepted request is silently dropped.
    while let Ok(Msg::Run(job)) = rx.try_recv() {
        job(&mut state);
    }
}

impl<S> Drop for DispatchQueue<S> {
    fn drop(&mut self) {
        let _ = self.handle.tx.send(Msg::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
