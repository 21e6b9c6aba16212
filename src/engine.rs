use crate::error::Error;
use crate::instruction::{Instruction, Thunk};
use crate::queue::{Claim, ResourceQueue};
use crate::tag::ResourceTag;
use crate::worker::Worker;
use log::{debug, trace};
use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHasher};
use std::collections::hash_map::Entry;
use std::fmt;
use std::hash::BuildHasherDefault;
use std::mem;
use std::panic;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

pub(crate) type FxIndexSet<K> = indexmap::IndexSet<K, BuildHasherDefault<FxHasher>>;

/// How ready instructions are executed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecPolicy {
    /// Launch each ready instruction on a thread of its own, joined at
    /// `stop`. The default: claiming workers never run user code, so a slow
    /// instruction cannot stall its resources' queues beyond what the
    /// dependency discipline already requires.
    Spawn,
    /// Run each ready instruction inline on the worker that performed the
    /// final claim.
    Inline,
}

/// Shared flag asking every worker to drain its queue and exit.
///
/// Engines start quiescent (flag set); `start` clears it. All queues share
/// one signal so a single store reaches every worker.
pub(crate) struct StopSignal(AtomicBool);

impl StopSignal {
    fn new() -> StopSignal {
        StopSignal(AtomicBool::new(true))
    }

    pub(crate) fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Handles of running instruction threads, appended by workers and joined
/// during `stop`.
pub(crate) struct InstructionPool {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl InstructionPool {
    fn new() -> InstructionPool {
        InstructionPool {
            handles: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn adopt(&self, handle: JoinHandle<()>) {
        self.handles.lock().push(handle);
    }

    /// Join every recorded instruction thread. Instruction panics are caught
    /// inside `Instruction::execute`, so a join error here is an engine bug
    /// and propagates.
    pub(crate) fn join_all(&self) {
        let handles = mem::take(&mut *self.handles.lock());
        for handle in handles {
            if let Err(payload) = handle.join() {
                panic::resume_unwind(payload);
            }
        }
    }
}

/// The tag-indexed map of resource queues.
///
/// Written only while registering variables, read by everything else; the
/// map is frozen for the duration of a start/stop cycle.
pub(crate) struct Registry {
    queues: RwLock<FxHashMap<ResourceTag, Arc<ResourceQueue>>>,
}

impl Registry {
    pub(crate) fn new() -> Registry {
        Registry {
            queues: RwLock::new(FxHashMap::default()),
        }
    }

    /// Register a queue under `tag`; false if the name is taken.
    pub(crate) fn insert(&self, tag: ResourceTag, queue: Arc<ResourceQueue>) -> bool {
        match self.queues.write().entry(tag) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                let _ = slot.insert(queue);
                true
            }
        }
    }

    pub(crate) fn get(&self, tag: &ResourceTag) -> Option<Arc<ResourceQueue>> {
        self.queues.read().get(tag).cloned()
    }

    /// Lookup that treats absence as a protocol violation; used on paths
    /// where `push` has already validated every tag.
    pub(crate) fn expect(&self, tag: &ResourceTag) -> Arc<ResourceQueue> {
        self.get(tag)
            .unwrap_or_else(|| panic!("bug: unregistered resource `{}`", tag))
    }

    fn snapshot(&self) -> Vec<(ResourceTag, Arc<ResourceQueue>)> {
        self.queues
            .read()
            .iter()
            .map(|(tag, queue)| (tag.clone(), Arc::clone(queue)))
            .collect()
    }

    fn len(&self) -> usize {
        self.queues.read().len()
    }
}

/// The dependency-aware execution engine.
///
/// Work is submitted with [`push`](Engine::push) as an opaque callable plus
/// the tags it reads and the tags it mutates. Per resource, instructions
/// become runnable in submission order; writers get the resource
/// exclusively, consecutive readers share it, and instructions with
/// disjoint resource sets run independently of each other.
///
/// All methods take `&self`, so an engine can be shared behind [`Arc`] and
/// pushed to from several threads at once.
pub struct Engine {
    registry: Arc<Registry>,
    stop: Arc<StopSignal>,
    policy: ExecPolicy,
    pool: Arc<InstructionPool>,
    workers: Mutex<FxHashMap<ResourceTag, JoinHandle<()>>>,
    /// Serializes the multi-queue append of one push, so concurrent pushers
    /// cannot interleave inconsistent FIFO prefixes across resources.
    submission: Mutex<()>,
    next_anonymous: AtomicU64,
}

impl Engine {
    /// An engine that launches each ready instruction on its own thread.
    pub fn new() -> Engine {
        Engine::with_policy(ExecPolicy::Spawn)
    }

    /// An engine with an explicit execution policy.
    pub fn with_policy(policy: ExecPolicy) -> Engine {
        Engine {
            registry: Arc::new(Registry::new()),
            stop: Arc::new(StopSignal::new()),
            policy,
            pool: Arc::new(InstructionPool::new()),
            workers: Mutex::new(FxHashMap::default()),
            submission: Mutex::new(()),
            next_anonymous: AtomicU64::new(0),
        }
    }

    /// Register a fresh resource under a synthesized unique name.
    pub fn new_variable(&self) -> Result<ResourceTag, Error> {
        loop {
            let name = format!(
                "resource-{}",
                self.next_anonymous.fetch_add(1, Ordering::Relaxed)
            );
            match self.register(&name) {
                Err(Error::DuplicateTag { .. }) => continue,
                outcome => return outcome,
            }
        }
    }

    /// Register a fresh resource under `name`.
    ///
    /// Fails with [`Error::DuplicateTag`] if the name is already taken. If
    /// the executor is running, the new queue's worker starts immediately;
    /// otherwise it starts with the next [`start`](Engine::start).
    pub fn new_named_variable(&self, name: &str) -> Result<ResourceTag, Error> {
        self.register(name)
    }

    fn register(&self, name: &str) -> Result<ResourceTag, Error> {
        let tag = ResourceTag::new(name);
        let queue = Arc::new(ResourceQueue::new());
        if !self.registry.insert(tag.clone(), Arc::clone(&queue)) {
            return Err(Error::DuplicateTag {
                name: name.to_owned(),
            });
        }
        debug!("registered resource `{}`", tag);

        let mut workers = self.workers.lock();
        if !self.stop.is_set() && !workers.contains_key(&tag) {
            let handle = self.spawn_worker(tag.clone(), queue)?;
            let _ = workers.insert(tag.clone(), handle);
        }
        Ok(tag)
    }

    /// Submit a unit of work that reads `reads` and mutates `mutates`.
    ///
    /// The callable fires exactly once, after every named resource has
    /// served it in that resource's submission order. A tag named in both
    /// sets counts once and is served under the mutate discipline. Fails
    /// with [`Error::UnknownTag`] (and submits nothing) if any tag was
    /// never registered.
    pub fn push<F>(&self, body: F, reads: &[ResourceTag], mutates: &[ResourceTag]) -> Result<(), Error>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(Box::new(body), reads, mutates, None)
    }

    /// Like [`push`](Engine::push), with a hook invoked after the body has
    /// run and every touched resource has been released.
    pub fn push_with_completion<F, C>(
        &self,
        body: F,
        reads: &[ResourceTag],
        mutates: &[ResourceTag],
        completion: C,
    ) -> Result<(), Error>
    where
        F: FnOnce() + Send + 'static,
        C: FnOnce() + Send + 'static,
    {
        self.submit(Box::new(body), reads, mutates, Some(Box::new(completion)))
    }

    fn submit(
        &self,
        body: Thunk,
        reads: &[ResourceTag],
        mutates: &[ResourceTag],
        completion: Option<Thunk>,
    ) -> Result<(), Error> {
        // Validate every tag up front so a bad push leaves the engine
        // untouched.
        for tag in reads.iter().chain(mutates.iter()) {
            if self.registry.get(tag).is_none() {
                return Err(Error::UnknownTag {
                    name: tag.name().to_owned(),
                });
            }
        }

        let instruction =
            Instruction::new(body, reads, mutates, completion, Arc::clone(&self.registry));

        if instruction.is_unconstrained() {
            // No resources named, hence no ordering constraints.
            trace!("unconstrained instruction fires immediately");
            self.launch_unconstrained(instruction);
            return Ok(());
        }

        let _serialized = self.submission.lock();
        for tag in instruction.touched() {
            self.registry.expect(tag).push(Arc::clone(&instruction));
        }
        trace!("pushed instruction over {} resources", instruction.touched().len());
        Ok(())
    }

    fn launch_unconstrained(&self, instruction: Arc<Instruction>) {
        match self.policy {
            ExecPolicy::Inline => instruction.execute(),
            ExecPolicy::Spawn => {
                let handle = thread::Builder::new().name("depflow-instruction".into()).spawn({
                    let instruction = Arc::clone(&instruction);
                    move || instruction.execute()
                });
                match handle {
                    Ok(handle) => self.pool.adopt(handle),
                    Err(err) => {
                        log::error!("failed to spawn instruction thread ({}), running inline", err);
                        instruction.execute();
                    }
                }
            }
        }
    }

    /// Start one worker per registered resource. Clears the stop signal;
    /// idempotent while running.
    pub fn start(&self) -> Result<(), Error> {
        let mut workers = self.workers.lock();
        self.stop.clear();
        for (tag, queue) in self.registry.snapshot() {
            if workers.contains_key(&tag) {
                continue;
            }
            let handle = self.spawn_worker(tag.clone(), queue)?;
            let _ = workers.insert(tag, handle);
        }
        debug!("executor started with {} resource workers", workers.len());
        Ok(())
    }

    fn spawn_worker(
        &self,
        tag: ResourceTag,
        queue: Arc<ResourceQueue>,
    ) -> Result<JoinHandle<()>, Error> {
        let worker = Worker::new(
            tag,
            queue,
            Arc::clone(&self.stop),
            self.policy,
            Arc::clone(&self.pool),
        );
        Ok(worker.spawn()?)
    }

    /// Request drain-and-exit and block until the engine is quiescent.
    ///
    /// Every submitted instruction whose dependencies can still be met runs
    /// to completion before this returns; afterwards no worker or
    /// instruction thread remains and the engine may be restarted or
    /// dropped. Fails with [`Error::NotRunning`] if `start` never ran.
    pub fn stop(&self) -> Result<(), Error> {
        let joined = {
            let mut workers = self.workers.lock();
            if self.stop.is_set() {
                return Err(Error::NotRunning);
            }
            self.stop.set();
            mem::take(&mut *workers)
        };

        for (_, queue) in self.registry.snapshot() {
            queue.notify();
        }

        for (tag, handle) in joined {
            if let Err(payload) = handle.join() {
                panic::resume_unwind(payload);
            }
            trace!("worker for `{}` joined", tag);
        }
        self.pool.join_all();
        debug!("executor stopped, all instructions drained");
        Ok(())
    }

    /// Synchronous single step: attempt one claim per registered queue, in
    /// an unspecified (but stable per map content) order, executing inline
    /// any instruction whose final claim happens here. Returns the number
    /// of claims that succeeded. Meant for tests and introspection; the
    /// threaded executor does not need it.
    pub fn drain_once(&self) -> usize {
        let mut claims = 0;
        for (tag, queue) in self.registry.snapshot() {
            let ready = {
                let mut inner = queue.lock();
                match inner.try_claim(&tag) {
                    Claim::Ready(instruction) => Some(instruction),
                    Claim::Advanced => {
                        claims += 1;
                        None
                    }
                    Claim::Blocked | Claim::Empty => None,
                }
            };
            if let Some(instruction) = ready {
                claims += 1;
                instruction.execute();
            }
        }
        claims
    }

    /// Scoped acquisition: `start` now, guaranteed `stop` (with its full
    /// drain) when the returned guard leaves scope.
    pub fn scope(&self) -> Result<Scope<'_>, Error> {
        self.start()?;
        Ok(Scope { engine: self })
    }
}

impl Default for Engine {
    fn default() -> Engine {
        Engine::new()
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Engine")
            .field("policy", &self.policy)
            .field("resources", &self.registry.len())
            .field("running", &!self.stop.is_set())
            .finish()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if thread::panicking() {
            return;
        }
        if self.stop.is_set() {
            // Never started (or already stopped); only stray unconstrained
            // instruction threads can remain.
            self.pool.join_all();
        } else {
            let _ = self.stop();
        }
    }
}

/// Guard returned by [`Engine::scope`]: the executor runs for the guard's
/// lifetime and is stopped (draining all submitted work) on every exit
/// path.
pub struct Scope<'a> {
    engine: &'a Engine,
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.engine.stop() {
            if thread::panicking() {
                log::error!("failed to stop engine at scope exit: {}", err);
            } else {
                panic!("failed to stop engine at scope exit: {}", err);
            }
        }
    }
}
