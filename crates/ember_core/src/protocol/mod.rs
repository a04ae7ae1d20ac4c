//! # Buffer Ownership Protocol
//!
//! One particle buffer, two users. The compute side acquires it, records
//! the frame's kernels and releases it after they complete; only then may
//! the graphics side draw from it. Ownership never overlaps.

mod capability;
mod journal;
mod shared_buffer;

pub use capability::{DeviceCapabilities, InteropRequirements};
pub use journal::{
    BufferOwner, JournalCounts, OwnershipEvent, OwnershipJournal, ProtocolViolation,
    JOURNAL_HISTORY,
};
pub use shared_buffer::{ComputeScope, GraphicsAccess, SharedParticleBuffer};
