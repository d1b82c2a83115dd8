// Transaction identity and the seams to the collaborators the core drives
// but does not implement: the log manager (transaction table, WAL flushing),
// the lock manager, and the page buffer. The dispatcher, the daemons and the
// HA machine all speak to these through the traits here; `MemLogManager` and
// friends are the in-tree implementations the server binary and the tests
// run against.

mod memlog;
mod seams;

pub use memlog::{MemLockManager, MemLogManager, MemPageBuffer};
pub use seams::{ClientInfo, LockManager, LogManager, PageBuffer};

use serde::{Deserialize, Serialize};

/// Opaque handle into the log manager's transaction table. Index 0 is the
/// system transaction and is never handed to a client.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct TranIndex(pub u32);

impl TranIndex {
    pub const SYSTEM: TranIndex = TranIndex(0);

    pub fn is_system(self) -> bool {
        self == TranIndex::SYSTEM
    }
}
