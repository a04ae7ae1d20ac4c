//! # Ownership Journal
//!
//! Validates every ownership transition of the shared buffer as it happens
//! and keeps a short history for diagnostics.
//!
//! ```text
//!            acquire              release
//!   Idle ─────────────▶ Compute ───────────▶ Idle
//!     │                   │ dispatch (0..n)
//!     │ draw begin        ▼
//!     └─────────▶ Graphics ───────────▶ Idle
//!                            draw end
//! ```

use std::collections::VecDeque;
use std::fmt;

use thiserror::Error;

use crate::compute::Kernel;

/// Events kept for diagnostics.
pub const JOURNAL_HISTORY: usize = 64;

/// Who may touch the shared buffer right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferOwner {
    /// Nobody; either side may take it.
    #[default]
    Idle,
    /// The compute kernels, between acquire and release.
    Compute,
    /// The draw call.
    Graphics,
}

impl fmt::Display for BufferOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BufferOwner::Idle => "idle",
            BufferOwner::Compute => "compute",
            BufferOwner::Graphics => "graphics",
        })
    }
}

/// One ownership transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnershipEvent {
    /// Compute side acquired the buffer.
    Acquire,
    /// A kernel was recorded.
    Dispatch(Kernel),
    /// Compute side released the buffer after its work completed.
    Release,
    /// Compute side gave the buffer back without submitting.
    Abandon,
    /// A draw started reading the buffer.
    DrawBegin,
    /// The draw finished with the buffer.
    DrawEnd,
}

/// A transition that is illegal in the current state.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolViolation {
    /// Acquire while compute already owns the buffer.
    #[error("buffer acquired for compute twice without a release")]
    DoubleAcquire,

    /// Acquire while a draw is in progress.
    #[error("buffer acquired for compute while graphics owns it")]
    AcquireWhileDrawing,

    /// Release (or abandon) without a matching acquire.
    #[error("buffer released while owned by {0}")]
    ReleaseWithoutAcquire(BufferOwner),

    /// Kernel recorded outside an acquire/release pair.
    #[error("kernel {kernel} dispatched while buffer owned by {owner}")]
    DispatchOutsideCompute {
        /// Offending kernel.
        kernel: Kernel,
        /// Owner at the time.
        owner: BufferOwner,
    },

    /// Draw started while compute owns the buffer.
    #[error("draw issued while compute owns the buffer")]
    DrawWhileComputeOwned,

    /// Draw started while another draw is in progress.
    #[error("draw issued while another draw owns the buffer")]
    NestedDraw,

    /// Draw ended without a matching begin.
    #[error("draw ended while owned by {0}")]
    DrawEndWithoutBegin(BufferOwner),
}

/// Counters accumulated by the journal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JournalCounts {
    /// Successful acquires.
    pub acquires: u64,
    /// Releases after completed work.
    pub releases: u64,
    /// Releases that discarded recorded work.
    pub abandons: u64,
    /// Kernels recorded.
    pub dispatches: u64,
    /// Draws completed.
    pub draws: u64,
}

/// Incremental validator of ownership transitions.
#[derive(Debug, Clone, Default)]
pub struct OwnershipJournal {
    owner: BufferOwner,
    counts: JournalCounts,
    history: VecDeque<OwnershipEvent>,
}

impl OwnershipJournal {
    /// An empty journal with the buffer idle.
    #[must_use]
    pub fn new() -> Self {
        Self {
            owner: BufferOwner::Idle,
            counts: JournalCounts::default(),
            history: VecDeque::with_capacity(JOURNAL_HISTORY),
        }
    }

    /// Current owner.
    #[inline]
    #[must_use]
    pub fn owner(&self) -> BufferOwner {
        self.owner
    }

    /// Accumulated counters.
    #[must_use]
    pub fn counts(&self) -> JournalCounts {
        self.counts
    }

    /// The most recent events, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &OwnershipEvent> {
        self.history.iter()
    }

    /// Applies `event`, or rejects it and leaves the state unchanged.
    ///
    /// # Errors
    ///
    /// Returns the violation if `event` is illegal for the current owner.
    pub fn record(&mut self, event: OwnershipEvent) -> Result<(), ProtocolViolation> {
        let next = match (self.owner, event) {
            (BufferOwner::Idle, OwnershipEvent::Acquire) => {
                self.counts.acquires += 1;
                BufferOwner::Compute
            }
            (BufferOwner::Compute, OwnershipEvent::Acquire) => {
                return Err(ProtocolViolation::DoubleAcquire)
            }
            (BufferOwner::Graphics, OwnershipEvent::Acquire) => {
                return Err(ProtocolViolation::AcquireWhileDrawing)
            }
            (BufferOwner::Compute, OwnershipEvent::Dispatch(_)) => {
                self.counts.dispatches += 1;
                BufferOwner::Compute
            }
            (owner, OwnershipEvent::Dispatch(kernel)) => {
                return Err(ProtocolViolation::DispatchOutsideCompute { kernel, owner })
            }
            (BufferOwner::Compute, OwnershipEvent::Release) => {
                self.counts.releases += 1;
                BufferOwner::Idle
            }
            (BufferOwner::Compute, OwnershipEvent::Abandon) => {
                self.counts.abandons += 1;
                BufferOwner::Idle
            }
            (owner, OwnershipEvent::Release | OwnershipEvent::Abandon) => {
                return Err(ProtocolViolation::ReleaseWithoutAcquire(owner))
            }
            (BufferOwner::Idle, OwnershipEvent::DrawBegin) => BufferOwner::Graphics,
            (BufferOwner::Compute, OwnershipEvent::DrawBegin) => {
                return Err(ProtocolViolation::DrawWhileComputeOwned)
            }
            (BufferOwner::Graphics, OwnershipEvent::DrawBegin) => {
                return Err(ProtocolViolation::NestedDraw)
            }
            (BufferOwner::Graphics, OwnershipEvent::DrawEnd) => {
                self.counts.draws += 1;
                BufferOwner::Idle
            }
            (owner, OwnershipEvent::DrawEnd) => {
                return Err(ProtocolViolation::DrawEndWithoutBegin(owner))
            }
        };

        self.owner = next;
        if self.history.len() == JOURNAL_HISTORY {
            self.history.pop_front();
        }
        self.history.push_back(event);
        Ok(())
    }

    /// Checks a complete event sequence from an idle start.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn verify<'a>(events: impl IntoIterator<Item = &'a OwnershipEvent>) -> Result<(), ProtocolViolation> {
        let mut journal = Self::new();
        events.into_iter().try_for_each(|event| journal.record(*event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_frame_sequence() {
        let mut journal = OwnershipJournal::new();
        for event in [
            OwnershipEvent::Acquire,
            OwnershipEvent::Dispatch(Kernel::Spawn),
            OwnershipEvent::Dispatch(Kernel::Update),
            OwnershipEvent::Dispatch(Kernel::DeathCheck),
            OwnershipEvent::Release,
            OwnershipEvent::DrawBegin,
            OwnershipEvent::DrawEnd,
        ] {
            journal.record(event).unwrap();
        }
        assert_eq!(journal.owner(), BufferOwner::Idle);
        let counts = journal.counts();
        assert_eq!(counts.acquires, 1);
        assert_eq!(counts.releases, 1);
        assert_eq!(counts.dispatches, 3);
        assert_eq!(counts.draws, 1);
    }

    #[test]
    fn test_illegal_transitions() {
        let mut journal = OwnershipJournal::new();
        assert_eq!(
            journal.record(OwnershipEvent::Release),
            Err(ProtocolViolation::ReleaseWithoutAcquire(BufferOwner::Idle))
        );
        assert_eq!(
            journal.record(OwnershipEvent::Dispatch(Kernel::Update)),
            Err(ProtocolViolation::DispatchOutsideCompute {
                kernel: Kernel::Update,
                owner: BufferOwner::Idle
            })
        );

        journal.record(OwnershipEvent::Acquire).unwrap();
        assert_eq!(journal.record(OwnershipEvent::Acquire), Err(ProtocolViolation::DoubleAcquire));
        assert_eq!(
            journal.record(OwnershipEvent::DrawBegin),
            Err(ProtocolViolation::DrawWhileComputeOwned)
        );
        // Rejected events leave the state untouched.
        assert_eq!(journal.owner(), BufferOwner::Compute);

        journal.record(OwnershipEvent::Release).unwrap();
        journal.record(OwnershipEvent::DrawBegin).unwrap();
        assert_eq!(
            journal.record(OwnershipEvent::Acquire),
            Err(ProtocolViolation::AcquireWhileDrawing)
        );
        assert_eq!(journal.record(OwnershipEvent::DrawBegin), Err(ProtocolViolation::NestedDraw));
    }

    #[test]
    fn test_history_is_bounded() {
        let mut journal = OwnershipJournal::new();
        for _ in 0..JOURNAL_HISTORY {
            journal.record(OwnershipEvent::DrawBegin).unwrap();
            journal.record(OwnershipEvent::DrawEnd).unwrap();
        }
        assert_eq!(journal.history().count(), JOURNAL_HISTORY);
        assert_eq!(journal.history().last(), Some(&OwnershipEvent::DrawEnd));
    }

    #[test]
    fn test_verify_sequences() {
        assert!(OwnershipJournal::verify(&[
            OwnershipEvent::Acquire,
            OwnershipEvent::Abandon,
            OwnershipEvent::DrawBegin,
            OwnershipEvent::DrawEnd,
        ])
        .is_ok());
        assert!(OwnershipJournal::verify(&[OwnershipEvent::DrawEnd]).is_err());
    }
}
