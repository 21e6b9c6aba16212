use crate::engine::{ExecPolicy, InstructionPool, StopSignal};
use crate::instruction::Instruction;
use crate::queue::{Claim, ResourceQueue};
use crate::tag::ResourceTag;
use log::{debug, error};
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Per-resource worker loop.
///
/// The worker blocks on its queue's condition variable until there is a head
/// to consider or stop is requested, claims consecutive compatible heads
/// (which naturally batches runs of readers), and launches any instruction
/// whose final claim it performed. With stop requested it keeps draining
/// until the queue is empty, then exits.
pub(crate) struct Worker {
    tag: ResourceTag,
    queue: Arc<ResourceQueue>,
    stop: Arc<StopSignal>,
    policy: ExecPolicy,
    pool: Arc<InstructionPool>,
}

impl Worker {
    pub(crate) fn new(
        tag: ResourceTag,
        queue: Arc<ResourceQueue>,
        stop: Arc<StopSignal>,
        policy: ExecPolicy,
        pool: Arc<InstructionPool>,
    ) -> Worker {
        Worker {
            tag,
            queue,
            stop,
            policy,
            pool,
        }
    }

    pub(crate) fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(format!("depflow-{}", self.tag))
            .spawn(move || self.run())
    }

    fn run(self) {
        debug!("worker for `{}` listening", self.tag);
        loop {
            let ready = {
                let mut inner = self.queue.lock();
                loop {
                    match inner.try_claim(&self.tag) {
                        Claim::Ready(instruction) => break Some(instruction),
                        // Claimed but not final; keep servicing the next head.
                        Claim::Advanced => {}
                        Claim::Empty if self.stop.is_set() => break None,
                        // Either nothing queued yet, or the head is waiting on
                        // the current holder; a push or a restore will wake us.
                        Claim::Empty | Claim::Blocked => self.queue.wait(&mut inner),
                    }
                }
            };

            let instruction = match ready {
                Some(instruction) => instruction,
                None => break,
            };
            self.launch(instruction);
        }
        debug!("worker for `{}` drained, exiting", self.tag);
    }

    /// Execute the instruction whose final claim this worker made, per the
    /// engine's policy: inline on this thread, or on a thread of its own
    /// whose handle the engine joins at stop.
    fn launch(&self, instruction: Arc<Instruction>) {
        match self.policy {
            ExecPolicy::Inline => instruction.execute(),
            ExecPolicy::Spawn => {
                let spawned = thread::Builder::new().name("depflow-instruction".into()).spawn({
                    let instruction = Arc::clone(&instruction);
                    move || instruction.execute()
                });
                match spawned {
                    Ok(handle) => self.pool.adopt(handle),
                    Err(err) => {
                        // Out of threads; degrade to inline so the claim is
                        // not stranded.
                        error!("failed to spawn instruction thread ({}), running inline", err);
                        instruction.execute();
                    }
                }
            }
        }
    }
}
