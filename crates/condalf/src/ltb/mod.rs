//! Long-term buffering: a transfer driver that parks envelopes in a
//! filesystem pool and publishes them in bursts.
//!
//! This is useful when the application can only publish intermittently, e.g.
//! because network connectivity is not permanently available, or for power
//! efficiency. Envelopes survive on storage until a publication run ships
//! them through the instance's sender driver.
//!
//! All subsystem state (the instance registry, the buffered-file counter,
//! the publication flag) is owned by a single dispatch worker; see
//! [`dispatch`] for the mechanism. Publication itself runs as a chain of
//! self-dispatched requests, one file per request, so the worker stays
//! responsive and the stack flat while a burst is going out.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use log::{debug, error, info};

use crate::driver::{Completion, TransferDriver, TransferJob};
use crate::error::{Error, Rejected};
use crate::name::Name;
use crate::pool::{FileId, Pool};

mod dispatch;

use dispatch::{DispatchHandle, DispatchQueue};

/// Name of a long-term buffer instance. Also used as the staging file
/// suffix, which is why it is kept this short.
pub type InstanceName = Name<8>;

/// External publication predicate, consulted in addition to the file-count
/// limit.
pub type ExtCond = Box<dyn Fn() -> bool + Send>;

/// Capacity of the dispatch mailbox. Sized with headroom: the publication
/// chain re-enters the mailbox from the worker itself, and must still find a
/// slot while producers are spamming requests.
const DISPATCH_QUEUE_LEN: usize = 8;

/// Chunk size for copying an envelope into the staging file.
const COPY_CHUNK: usize = 64;

/// Subsystem configuration.
pub struct LtbOptions {
    /// Every time an instance adds a file, the total number of buffered
    /// files over all instances is compared against this; reaching it
    /// triggers a publication run.
    ///
    /// Default: 4
    pub nb_files_limit: usize,
    /// If provided, its return value is ANDed with the file-count condition.
    /// Absent means unconditionally true.
    pub ext_cond: Option<ExtCond>,
}

impl Default for LtbOptions {
    fn default() -> Self {
        Self {
            nb_files_limit: 4,
            ext_cond: None,
        }
    }
}

/// One long-term buffer: a pool, a name, and an optional sender used to
/// publish the pool's files.
struct Instance<P> {
    pool: P,
    name: InstanceName,
    sender: Option<Arc<dyn TransferDriver>>,
}

/// The worker-owned subsystem state. Only ever touched on the dispatch
/// thread.
struct LtbState<P: Pool> {
    /// Handle with which publication chains itself.
    queue: DispatchHandle<LtbState<P>>,
    /// Registered instances, newest first.
    registry: Vec<Arc<Instance<P>>>,
    /// Buffered files across all instances.
    nb_files_total: usize,
    nb_files_limit: usize,
    /// Whether a publication chain is currently running.
    publishing: bool,
    ext_cond: Option<ExtCond>,
}

/// The long-term buffering subsystem. Owns the dispatch worker; dropping it
/// drains accepted requests and stops the thread.
pub struct LtbSubsystem<P: Pool> {
    queue: DispatchQueue<LtbState<P>>,
}

impl<P: Pool> LtbSubsystem<P> {
    pub fn new(opts: LtbOptions) -> io::Result<Self> {
        let queue = DispatchQueue::start("cdf-ltb", DISPATCH_QUEUE_LEN, move |me| LtbState {
            queue: me,
            registry: Vec::new(),
            nb_files_total: 0,
            nb_files_limit: opts.nb_files_limit,
            publishing: false,
            ext_cond: opts.ext_cond,
        })?;
        Ok(Self { queue })
    }

    /// Register a new instance over `pool`.
    ///
    /// The pool's current size is added to the subsystem's file count, so a
    /// pool that retained files across a restart counts towards the
    /// publication condition right away. `name` is truncated to
    /// [`InstanceName`] length. Instances without a `sender` buffer locally
    /// and are skipped by publication.
    pub fn create(
        &self,
        pool: P,
        name: &str,
        sender: Option<Arc<dyn TransferDriver>>,
    ) -> Result<Ltb<P>, Error> {
        let instance = Arc::new(Instance {
            pool,
            name: InstanceName::from_str_truncate(name),
            sender,
        });

        let registered = Arc::clone(&instance);
        self.queue
            .handle()
            .dispatch_sync(move |state| add_instance(state, registered))?;

        info!("ltb instance created: {}", instance.name);
        Ok(Ltb {
            instance,
            queue: self.queue.handle(),
        })
    }

    /// Start a publication run right now, ignoring the file-count limit and
    /// the external condition.
    ///
    /// Does not block; success only means the request was enqueued. The
    /// completion is invoked with the terminal status of the run, or with
    /// `Ok` immediately if a run is already in progress, which this call
    /// never doubles up.
    pub fn force_publish(&self, done: Option<Completion>) -> Result<(), Error> {
        self.queue.handle().dispatch(move |state| {
            if state.publishing {
                debug!("already publishing");
                if let Some(done) = done {
                    done(Ok(()));
                }
            } else {
                info!("publishing on request");
                state.publishing = true;
                publish_tick(state, done);
            }
        })
    }

    #[cfg(test)]
    pub(crate) fn files_total(&self) -> usize {
        self.queue
            .handle()
            .dispatch_sync(|state| state.nb_files_total)
            .unwrap()
    }

    #[cfg(test)]
    pub(crate) fn is_publishing(&self) -> bool {
        self.queue
            .handle()
            .dispatch_sync(|state| state.publishing)
            .unwrap()
    }
}

/// Driver handle to one long-term buffer instance.
///
/// Dropping the handle unregisters the instance; its pool files stay on
/// storage.
pub struct Ltb<P: Pool> {
    instance: Arc<Instance<P>>,
    queue: DispatchHandle<LtbState<P>>,
}

impl<P: Pool> TransferDriver for Ltb<P> {
    /// Enqueue the job's contents for long-term storage. The actual copy
    /// into the pool happens on the dispatch worker; the job completion is
    /// invoked with the staging result.
    fn try_send(&self, job: TransferJob) -> Result<(), Rejected> {
        let instance = Arc::clone(&self.instance);
        self.queue
            .dispatch_reclaimable(job, move |state, job| stage_job(state, &instance, job))
            .map_err(|(job, source)| {
                error!("{}: cannot dispatch: {source}", self.instance.name);
                Rejected::new(job, source)
            })
    }
}

impl<P: Pool> Drop for Ltb<P> {
    fn drop(&mut self) {
        let instance = Arc::clone(&self.instance);
        // A dead worker means the whole subsystem is gone, along with the
        // registry entry this would have removed.
        let _ = self
            .queue
            .dispatch_sync(move |state| remove_instance(state, &instance));
    }
}

fn add_instance<P: Pool>(state: &mut LtbState<P>, instance: Arc<Instance<P>>) {
    let size = instance.pool.size().unwrap_or_else(|e| {
        error!("{}: cannot size pool: {e}", instance.name);
        0
    });
    state.nb_files_total += size;
    debug!(
        "{}: registered with {size} buffered files, total={}",
        instance.name, state.nb_files_total
    );
    state.registry.insert(0, instance);
}

fn remove_instance<P: Pool>(state: &mut LtbState<P>, instance: &Arc<Instance<P>>) {
    let Some(pos) = state
        .registry
        .iter()
        .position(|other| Arc::ptr_eq(other, instance))
    else {
        return;
    };
    state.registry.remove(pos);

    let size = instance.pool.size().unwrap_or(0);
    state.nb_files_total = state.nb_files_total.saturating_sub(size);
    debug!(
        "{}: unregistered, total={}",
        instance.name, state.nb_files_total
    );
}

/// Executed on the worker for every accepted transfer job: stream the job's
/// file into the staging area, promote it into the pool, and re-evaluate the
/// publication condition. The job completion always fires, with the final
/// status.
fn stage_job<P: Pool>(state: &mut LtbState<P>, instance: &Instance<P>, mut job: TransferJob) {
    let res = write_into_pool(&instance.pool, &mut job);
    match &res {
        Ok(id) => {
            debug!("{}: staged envelope as {id}", instance.name);
            state.nb_files_total += 1;
        }
        Err(e) => error!("{}: staging failed: {e}", instance.name),
    }

    update_publish_condition(state);
    job.finish(res.map(drop));
}

fn write_into_pool<P: Pool>(pool: &P, job: &mut TransferJob) -> Result<FileId, Error> {
    let mut staging = pool.create_staging()?;

    let file = job.file_mut();
    file.seek(SeekFrom::Start(0))?;

    let mut chunk = [0u8; COPY_CHUNK];
    loop {
        let n = file.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        staging.write_all(&chunk[..n]).map_err(|e| {
            if e.kind() == io::ErrorKind::WriteZero {
                Error::NoSpace
            } else {
                e.into()
            }
        })?;
    }
    drop(staging);

    Ok(pool.commit_staging()?)
}

/// Begin publishing when the subsystem is idle, the buffered-file count has
/// reached the limit, and the external condition (if any) holds.
fn update_publish_condition<P: Pool>(state: &mut LtbState<P>) {
    if state.publishing {
        return;
    }

    let ext = state.ext_cond.as_ref().map_or(true, |cond| cond());
    if state.nb_files_total >= state.nb_files_limit && ext {
        info!(
            "publish condition met: {} files buffered",
            state.nb_files_total
        );
        state.publishing = true;
        publish_tick(state, None);
    } else {
        debug!(
            "publish condition unmet: files={} limit={} ext={ext}",
            state.nb_files_total, state.nb_files_limit
        );
    }
}

/// One publication step: ship the oldest file of the first instance that has
/// a sender, then chain the next step through the mailbox. The carried
/// completion is invoked exactly once, when the chain terminates.
fn publish_tick<P: Pool>(state: &mut LtbState<P>, done: Option<Completion>) {
    debug_assert!(state.publishing);

    let found = match find_first(state) {
        Ok(found) => found,
        Err(e) => return end_publication(state, done, Err(e.into())),
    };
    let Some((instance, id)) = found else {
        debug!("nothing left to publish");
        return end_publication(state, done, Ok(()));
    };

    info!("{}: publishing {id}", instance.name);
    if let Err(e) = publish_one(&instance, id) {
        error!("{}: publishing {id} failed: {e}", instance.name);
        return end_publication(state, done, Err(e));
    }
    state.nb_files_total = state.nb_files_total.saturating_sub(1);

    let chained = state
        .queue
        .dispatch_reclaimable(done, |state, done| publish_tick(state, done));
    if let Err((done, e)) = chained {
        error!("cannot chain publication: {e}");
        end_publication(state, done, Err(e));
    }
}

/// The oldest file of the first registered instance that has a sender and a
/// non-empty pool.
#[allow(clippy::type_complexity)]
fn find_first<P: Pool>(state: &LtbState<P>) -> io::Result<Option<(Arc<Instance<P>>, FileId)>> {
    for instance in &state.registry {
        if instance.sender.is_none() {
            debug!("{}: skipped, has no sender", instance.name);
            continue;
        }
        if let Some(id) = instance.pool.oldest()? {
            return Ok(Some((Arc::clone(instance), id)));
        }
    }
    Ok(None)
}

/// Ship one file synchronously through the instance's sender. The file is
/// removed only after the transfer succeeded, so a failed transport leaves
/// it for the next run.
fn publish_one<P: Pool>(instance: &Instance<P>, id: FileId) -> Result<(), Error> {
    let sender = instance
        .sender
        .as_ref()
        .expect("publication only selects instances with a sender");

    let mut file = instance.pool.open(id)?;
    sender.send(&mut file)?;
    instance.pool.remove(id)?;
    Ok(())
}

fn end_publication<P: Pool>(
    state: &mut LtbState<P>,
    done: Option<Completion>,
    result: Result<(), Error>,
) {
    state.publishing = false;
    if let Some(done) = done {
        done(result);
    }
}
