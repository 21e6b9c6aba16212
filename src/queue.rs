use crate::instruction::Instruction;
use crate::state::StateTracker;
use crate::tag::ResourceTag;
use log::trace;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::VecDeque;
use std::sync::Arc;

/// Outcome of one claim attempt at the head of a queue.
pub(crate) enum Claim {
    /// Head claimed and this was its final outstanding resource; the caller
    /// must now execute (or launch) the instruction.
    Ready(Arc<Instruction>),
    /// Head claimed here, but other resources have yet to serve it.
    Advanced,
    /// A head exists but the current access mode refuses it.
    Blocked,
    /// Nothing queued.
    Empty,
}

/// Per-resource FIFO of pending instructions plus the resource's state
/// machine, guarded by a single mutex.
///
/// Keeping the state tracker inside the same critical section as the FIFO
/// makes a claim (state transition, pop, pending-counter decrement) one
/// atomic step per resource, which the correctness of the cross-resource
/// protocol depends on.
pub(crate) struct ResourceQueue {
    inner: Mutex<QueueInner>,
    /// Signaled when an instruction is pushed, when a finished instruction
    /// restores this resource's state, and when stop is requested.
    activity: Condvar,
}

pub(crate) struct QueueInner {
    fifo: VecDeque<Arc<Instruction>>,
    state: StateTracker,
}

impl ResourceQueue {
    pub(crate) fn new() -> ResourceQueue {
        ResourceQueue {
            inner: Mutex::new(QueueInner {
                fifo: VecDeque::new(),
                state: StateTracker::new(),
            }),
            activity: Condvar::new(),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock()
    }

    /// Append an instruction and wake the worker.
    pub(crate) fn push(&self, instruction: Arc<Instruction>) {
        let mut inner = self.inner.lock();
        inner.fifo.push_back(instruction);
        self.activity.notify_one();
    }

    /// Block the calling worker until the queue sees activity. Spurious
    /// wakeups are fine; callers re-check their predicate.
    pub(crate) fn wait(&self, inner: &mut MutexGuard<'_, QueueInner>) {
        self.activity.wait(inner);
    }

    /// Wake the worker from outside a queue operation (used when raising
    /// the stop flag). Taking the lock first closes the window where the
    /// worker has checked its predicate but not yet parked.
    pub(crate) fn notify(&self) {
        let _inner = self.inner.lock();
        self.activity.notify_one();
    }

    /// Reverse this resource's share of a finished instruction's claims and
    /// wake the worker so it reconsiders the new head.
    pub(crate) fn restore(&self) {
        let mut inner = self.inner.lock();
        inner.state.restore();
        trace!("state restored to {:?}", inner.state);
        self.activity.notify_one();
    }
}

impl QueueInner {
    /// Attempt to serve the queue head on behalf of resource `tag`.
    ///
    /// A head that mutates `tag` needs the resource idle and takes it
    /// exclusively; a head that only reads `tag` piggybacks on any state
    /// short of a writer. On success the head is popped from this queue
    /// alone (it stays queued on every other resource it touches) and its
    /// pending counter drops by one.
    pub(crate) fn try_claim(&mut self, tag: &ResourceTag) -> Claim {
        let head = match self.fifo.front() {
            Some(head) => Arc::clone(head),
            None => return Claim::Empty,
        };

        let claimed = if head.mutates(tag) {
            self.state.try_exclusive()
        } else if head.reads(tag) {
            self.state.try_shared()
        } else {
            panic!("bug: instruction queued on resource `{}` it never named", tag);
        };

        if !claimed {
            return Claim::Blocked;
        }

        let _ = self.fifo.pop_front();
        trace!("`{}` claimed its head, now {:?}", tag, self.state);

        if head.finish_claim() {
            Claim::Ready(head)
        } else {
            Claim::Advanced
        }
    }
}
