use serde::{Deserialize, Serialize};

// The session timezone is a capability, not an algorithm: the core only ever
// needs the offset to shift between UTC and session-local wall time, plus a
// checksum so a client and server can detect that they loaded different
// timezone data during the handshake.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct SessionTz {
    offset_secs: i32,
    checksum: u64,
}

impl SessionTz {
    pub fn utc() -> Self {
        Self::fixed(0)
    }

    pub fn fixed(offset_secs: i32) -> Self {
        let checksum = rapidhash::rapidhash(&offset_secs.to_le_bytes());
        SessionTz {
            offset_secs,
            checksum,
        }
    }

    pub fn offset_secs(&self) -> i32 {
        self.offset_secs
    }

    pub fn checksum(&self) -> u64 {
        self.checksum
    }
}

impl Default for SessionTz {
    fn default() -> Self {
        Self::utc()
    }
}
