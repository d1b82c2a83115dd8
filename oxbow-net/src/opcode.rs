use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::EnumIter;

/// The fixed operation enumeration shared with clients. Codes are the enum
/// discriminants; anything outside the range is an unknown request.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, EnumIter, Serialize, Deserialize)]
pub enum Opcode {
    Ping,
    PingWithHandshake,
    Shutdown,

    // boot
    BoRegisterClient,
    BoUnregisterClient,
    BoBackup,
    BoAddVolumeExtension,
    BoChangeHaMode,
    BoNotifyLogApplierState,

    // transaction
    TranServerCommit,
    TranServerAbort,
    TranServerSavepoint,
    TranServerHasUpdated,
    TranLocalTranId,

    // log
    LogCheckpoint,
    LogSetInterrupt,
    LogDumpStat,

    // locator
    LocFetch,
    LocForce,

    // ha
    HaServerState,

    // session
    SessionEnd,

    // method
    MethodInvoke,
}

impl Opcode {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Opcode> {
        if code < 0 {
            return None;
        }
        Opcode::iter().nth(code as usize)
    }

    pub fn count() -> usize {
        Opcode::iter().count()
    }
}
