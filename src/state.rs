use std::fmt;

/// The access mode of one resource.
///
/// The legal transition chains are `MR -> R -> R -> ... -> MR` (a run of
/// concurrent readers, unwound one restore at a time) and `MR -> N -> MR`
/// (one exclusive writer). Everything else is a scheduler bug.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum Access {
    /// Idle; the next instruction may read or mutate.
    MutateOrRead,
    /// One or more read-only instructions hold the resource.
    Read,
    /// A mutating instruction holds the resource exclusively.
    NoAccess,
}

impl fmt::Debug for Access {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(match self {
            Access::MutateOrRead => "MR",
            Access::Read => "R",
            Access::NoAccess => "N",
        })
    }
}

/// State machine for one resource: the current access mode plus the number
/// of outstanding concurrent readers.
///
/// The tracker is a plain value owned by the resource's queue and is only
/// touched inside the queue's critical section. Illegal transitions panic:
/// they mean the claim/restore protocol itself is broken, which is not a
/// condition the caller can recover from.
pub(crate) struct StateTracker {
    mode: Access,
    /// Outstanding readers; zero whenever `mode` is not `Read`.
    readers: usize,
}

impl StateTracker {
    pub(crate) fn new() -> StateTracker {
        StateTracker {
            mode: Access::MutateOrRead,
            readers: 0,
        }
    }

    pub(crate) fn mode(&self) -> Access {
        self.mode
    }

    /// Apply one transition, enforcing the legal set.
    fn to(&mut self, next: Access) {
        match (self.mode, next) {
            (Access::MutateOrRead, Access::NoAccess) => {}
            (Access::MutateOrRead, Access::Read) | (Access::Read, Access::Read) => {
                self.readers += 1;
            }
            (Access::Read, Access::MutateOrRead) => {
                if self.readers != 0 {
                    panic!(
                        "bug: released a resource while {} readers remain",
                        self.readers
                    );
                }
            }
            (Access::NoAccess, Access::MutateOrRead) => {}
            (from, to) => panic!("bug: illegal state transition {:?} -> {:?}", from, to),
        }
        self.mode = next;
    }

    /// Claim the resource for a writer (`MR -> N`). Returns whether the
    /// claim took effect; any state other than idle refuses it.
    pub(crate) fn try_exclusive(&mut self) -> bool {
        if self.mode == Access::MutateOrRead {
            self.to(Access::NoAccess);
            true
        } else {
            false
        }
    }

    /// Claim the resource for one more reader (`MR -> R(1)` or
    /// `R(k) -> R(k+1)`). Refused only while a writer holds the resource.
    pub(crate) fn try_shared(&mut self) -> bool {
        match self.mode {
            Access::MutateOrRead | Access::Read => {
                self.to(Access::Read);
                true
            }
            Access::NoAccess => false,
        }
    }

    /// Reverse one claim after its instruction finished: `N -> MR` for a
    /// writer, `R(k) -> R(k-1)` (and finally `MR`) for a reader. Restoring
    /// an idle resource is a protocol violation.
    pub(crate) fn restore(&mut self) {
        match self.mode {
            Access::MutateOrRead => panic!("bug: restore on an idle resource"),
            Access::Read => {
                self.readers -= 1;
                if self.readers == 0 {
                    self.to(Access::MutateOrRead);
                }
            }
            Access::NoAccess => self.to(Access::MutateOrRead),
        }
    }
}

impl fmt::Debug for StateTracker {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            Access::Read => write!(fmt, "R({})", self.readers),
            mode => write!(fmt, "{:?}", mode),
        }
    }
}
