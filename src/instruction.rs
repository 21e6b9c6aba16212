use crate::engine::{FxIndexSet, Registry};
use crate::tag::ResourceTag;
use log::{error, trace};
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A boxed unit of user work.
pub(crate) type Thunk = Box<dyn FnOnce() + Send + 'static>;

pub(crate) type TagList = SmallVec<[ResourceTag; 4]>;

/// A submitted unit of work: the user callable plus the resources it reads
/// and mutates.
///
/// One instruction is shared (reference-counted) between the queues of every
/// resource it touches. Each of those queues must claim it, in that queue's
/// submission order, before it can fire; the pending counter tracks how many
/// claims remain. The instruction fires exactly once, on whichever thread
/// performs the final claim (or on a thread of its own, depending on the
/// engine's execution policy).
pub(crate) struct Instruction {
    /// User callable; taken exactly once, by the final claimant.
    body: Mutex<Option<Thunk>>,
    /// Optional hook invoked after the body has run and every state has
    /// been restored.
    completion: Mutex<Option<Thunk>>,
    reads: TagList,
    mutates: TagList,
    /// Touched resources in push order (reads first, then mutates),
    /// deduplicated. Fixes the restore order.
    touched: TagList,
    /// Per-resource claims still required before the body may fire.
    pending: AtomicUsize,
    /// Tag -> queue lookup for the restore walk. Instructions never own
    /// queues directly, only names.
    registry: Arc<Registry>,
}

impl Instruction {
    pub(crate) fn new(
        body: Thunk,
        reads: &[ResourceTag],
        mutates: &[ResourceTag],
        completion: Option<Thunk>,
        registry: Arc<Registry>,
    ) -> Arc<Instruction> {
        let touched: FxIndexSet<ResourceTag> =
            reads.iter().chain(mutates.iter()).cloned().collect();
        let touched: TagList = touched.into_iter().collect();

        Arc::new(Instruction {
            body: Mutex::new(Some(body)),
            completion: Mutex::new(completion),
            reads: reads.iter().cloned().collect(),
            mutates: mutates.iter().cloned().collect(),
            pending: AtomicUsize::new(touched.len()),
            touched,
            registry,
        })
    }

    /// The deduplicated resources this instruction touches, in push order.
    pub(crate) fn touched(&self) -> &[ResourceTag] {
        &self.touched
    }

    /// True when the instruction names no resources at all; it then has no
    /// ordering constraints and may fire immediately.
    pub(crate) fn is_unconstrained(&self) -> bool {
        self.touched.is_empty()
    }

    pub(crate) fn mutates(&self, tag: &ResourceTag) -> bool {
        self.mutates.contains(tag)
    }

    pub(crate) fn reads(&self, tag: &ResourceTag) -> bool {
        self.reads.contains(tag)
    }

    /// Record one per-resource claim. Exactly one caller observes the
    /// counter reaching zero; that caller must execute the instruction.
    pub(crate) fn finish_claim(&self) -> bool {
        let previous = self.pending.fetch_sub(1, Ordering::AcqRel);
        assert!(
            previous > 0,
            "bug: claimed an instruction with no pending resources"
        );
        previous == 1
    }

    /// Run the body, then restore every touched resource and wake its
    /// worker.
    ///
    /// The body runs under `catch_unwind` so that a panicking instruction
    /// still releases the resources it holds; otherwise every queue it had
    /// claimed would stay blocked and `stop` would never drain. The panic is
    /// reported through the log and the completion hook still runs.
    pub(crate) fn execute(&self) {
        let body = self
            .body
            .lock()
            .take()
            .expect("bug: instruction fired twice");

        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(body)) {
            error!("instruction panicked: {}", panic_message(&*payload));
        }

        self.restore_all();

        if let Some(hook) = self.completion.lock().take() {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(hook)) {
                error!("completion hook panicked: {}", panic_message(&*payload));
            }
        }
    }

    /// Reverse the state transition on each touched resource, in the fixed
    /// restore order, and notify that resource's worker.
    fn restore_all(&self) {
        for tag in &self.touched {
            trace!("restoring `{}`", tag);
            self.registry.expect(tag).restore();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
