use crate::seams::{ClientInfo, LockManager, LogManager, PageBuffer};
use crate::TranIndex;
use oxbow_base::{err, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::SystemTime;
use tracing::debug;

// In-memory log manager: a transaction table with the client metadata,
// interrupt and update flags the core reads, plus counters standing in for
// the WAL operations so tests and the server binary can observe daemon
// activity. The flush counters are not a WAL; they are the observable half
// of the seam.

const TRAN_TABLE_SIZE: usize = 100;

#[derive(Clone, Debug)]
struct TranEntry {
    client: ClientInfo,
    has_updated: bool,
    interrupted: bool,
    slammed: bool,
    snapshot_valid: bool,
}

pub struct MemLogManager {
    entries: Mutex<Vec<Option<TranEntry>>>,
    updates_enabled: AtomicBool,
    promotion_time: Mutex<Option<SystemTime>>,
    commit_waiters: AtomicUsize,
    pub checkpoints: AtomicU64,
    pub bg_flushes: AtomicU64,
    pub direct_flushes: AtomicU64,
    pub header_flushes: AtomicU64,
    pub commit_broadcasts: AtomicU64,
}

impl MemLogManager {
    pub fn new() -> MemLogManager {
        let mut entries = Vec::with_capacity(TRAN_TABLE_SIZE);
        entries.resize(TRAN_TABLE_SIZE, None);
        // slot 0 belongs to the system transaction
        entries[0] = Some(TranEntry {
            client: ClientInfo {
                client_id: -1,
                user: String::from("system"),
                host: String::new(),
                is_dba: true,
                maintenance_allowed: true,
            },
            has_updated: false,
            interrupted: false,
            slammed: false,
            snapshot_valid: true,
        });
        MemLogManager {
            entries: Mutex::new(entries),
            updates_enabled: AtomicBool::new(true),
            promotion_time: Mutex::new(None),
            commit_waiters: AtomicUsize::new(0),
            checkpoints: AtomicU64::new(0),
            bg_flushes: AtomicU64::new(0),
            direct_flushes: AtomicU64::new(0),
            header_flushes: AtomicU64::new(0),
            commit_broadcasts: AtomicU64::new(0),
        }
    }

    pub fn promotion_time(&self) -> Option<SystemTime> {
        *self.promotion_time.lock()
    }

    pub fn was_slammed(&self, t: TranIndex) -> bool {
        let entries = self.entries.lock();
        entries
            .get(t.0 as usize)
            .and_then(|e| e.as_ref())
            .map(|e| e.slammed)
            .unwrap_or(false)
    }

    pub fn snapshot_valid(&self, t: TranIndex) -> bool {
        let entries = self.entries.lock();
        entries
            .get(t.0 as usize)
            .and_then(|e| e.as_ref())
            .map(|e| e.snapshot_valid)
            .unwrap_or(false)
    }

    /// A commit that wants to ride the next group flush.
    pub fn add_commit_waiter(&self) {
        self.commit_waiters.fetch_add(1, Ordering::SeqCst);
    }

    fn with_entry<R>(&self, t: TranIndex, f: impl FnOnce(&mut TranEntry) -> R) -> Option<R> {
        let mut entries = self.entries.lock();
        entries
            .get_mut(t.0 as usize)
            .and_then(|e| e.as_mut())
            .map(f)
    }
}

impl Default for MemLogManager {
    fn default() -> Self {
        MemLogManager::new()
    }
}

impl LogManager for MemLogManager {
    fn register_client(&self, client: ClientInfo) -> Result<TranIndex> {
        let mut entries = self.entries.lock();
        for (i, slot) in entries.iter_mut().enumerate().skip(1) {
            if slot.is_none() {
                *slot = Some(TranEntry {
                    client,
                    has_updated: false,
                    interrupted: false,
                    slammed: false,
                    snapshot_valid: true,
                });
                debug!(target: "oxbow", "registered client at tran index {}", i);
                return Ok(TranIndex(i as u32));
            }
        }
        Err(err("transaction table pressure: no free index"))
    }

    fn unregister_client(&self, t: TranIndex) {
        if t.is_system() {
            return;
        }
        let mut entries = self.entries.lock();
        if let Some(slot) = entries.get_mut(t.0 as usize) {
            *slot = None;
        }
    }

    fn find_client(&self, t: TranIndex) -> Option<ClientInfo> {
        let entries = self.entries.lock();
        entries
            .get(t.0 as usize)
            .and_then(|e| e.as_ref())
            .map(|e| e.client.clone())
    }

    fn active_trans(&self) -> Vec<TranIndex> {
        let entries = self.entries.lock();
        entries
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, e)| e.is_some())
            .map(|(i, _)| TranIndex(i as u32))
            .collect()
    }

    fn count_non_maintenance_clients(&self) -> usize {
        let entries = self.entries.lock();
        entries
            .iter()
            .skip(1)
            .flatten()
            .filter(|e| !e.client.maintenance_allowed)
            .count()
    }

    fn commit(&self, t: TranIndex) -> Result<()> {
        self.with_entry(t, |e| {
            e.has_updated = false;
            e.interrupted = false;
        })
        .ok_or_else(|| err("commit on unregistered transaction"))
    }

    fn abort(&self, t: TranIndex) -> Result<()> {
        self.with_entry(t, |e| {
            e.has_updated = false;
            e.interrupted = false;
            e.slammed = false;
        })
        .ok_or_else(|| err("abort on unregistered transaction"))
    }

    fn note_update(&self, t: TranIndex) {
        self.with_entry(t, |e| e.has_updated = true);
    }

    fn has_updated(&self, t: TranIndex) -> bool {
        self.with_entry(t, |e| e.has_updated).unwrap_or(false)
    }

    fn is_update_allowed(&self) -> bool {
        self.updates_enabled.load(Ordering::SeqCst)
    }

    fn enable_update(&self) {
        self.updates_enabled.store(true, Ordering::SeqCst);
    }

    fn disable_update(&self) {
        self.updates_enabled.store(false, Ordering::SeqCst);
    }

    fn set_interrupt(&self, t: TranIndex, on: bool) {
        self.with_entry(t, |e| e.interrupted = on);
    }

    fn is_interrupted(&self, t: TranIndex) -> bool {
        self.with_entry(t, |e| e.interrupted).unwrap_or(false)
    }

    fn reset_snapshot(&self, t: TranIndex) {
        self.with_entry(t, |e| e.snapshot_valid = false);
    }

    fn slam_transaction(&self, t: TranIndex) {
        if t.is_system() {
            return;
        }
        self.with_entry(t, |e| {
            e.slammed = true;
            e.interrupted = true;
        });
    }

    fn is_dba(&self, t: TranIndex) -> bool {
        self.with_entry(t, |e| e.client.is_dba).unwrap_or(false)
    }

    fn set_promotion_time(&self, at: SystemTime) {
        *self.promotion_time.lock() = Some(at);
    }

    fn checkpoint(&self) {
        self.checkpoints.fetch_add(1, Ordering::SeqCst);
    }

    fn flush_background(&self) {
        self.bg_flushes.fetch_add(1, Ordering::SeqCst);
    }

    fn flush_direct(&self) -> usize {
        self.direct_flushes.fetch_add(1, Ordering::SeqCst);
        1
    }

    fn flush_header(&self) {
        self.header_flushes.fetch_add(1, Ordering::SeqCst);
    }

    fn commit_waiters(&self) -> usize {
        self.commit_waiters.load(Ordering::SeqCst)
    }

    fn broadcast_commit_done(&self) {
        self.commit_broadcasts.fetch_add(1, Ordering::SeqCst);
        self.commit_waiters.store(0, Ordering::SeqCst);
    }
}

/// Lock manager stand-in: counts the operations the daemons and the
/// shutdown path drive, releases nothing.
pub struct MemLockManager {
    pub timeouts_forced: AtomicU64,
    pub timeout_alls: AtomicU64,
    pub deadlock_runs: AtomicU64,
}

impl MemLockManager {
    pub fn new() -> MemLockManager {
        MemLockManager {
            timeouts_forced: AtomicU64::new(0),
            timeout_alls: AtomicU64::new(0),
            deadlock_runs: AtomicU64::new(0),
        }
    }
}

impl Default for MemLockManager {
    fn default() -> Self {
        MemLockManager::new()
    }
}

impl LockManager for MemLockManager {
    fn force_timeout_expired_waiters(&self, _t: TranIndex) -> bool {
        self.timeouts_forced.fetch_add(1, Ordering::SeqCst);
        false
    }

    fn force_timeout_all(&self) {
        self.timeout_alls.fetch_add(1, Ordering::SeqCst);
    }

    fn detect_local_deadlock(&self) {
        self.deadlock_runs.fetch_add(1, Ordering::SeqCst);
    }

    fn dump_state(&self) -> String {
        format!(
            "locks: forced-timeouts {} timeout-alls {} deadlock-runs {}",
            self.timeouts_forced.load(Ordering::SeqCst),
            self.timeout_alls.load(Ordering::SeqCst),
            self.deadlock_runs.load(Ordering::SeqCst),
        )
    }
}

/// Page buffer stand-in: per-worker fix counts plus a victim-flush counter.
pub struct MemPageBuffer {
    fixes: Mutex<HashMap<usize, usize>>,
    pub victim_flushes: AtomicU64,
}

impl MemPageBuffer {
    pub fn new() -> MemPageBuffer {
        MemPageBuffer {
            fixes: Mutex::new(HashMap::new()),
            victim_flushes: AtomicU64::new(0),
        }
    }

    pub fn fix_page(&self, worker: usize) {
        *self.fixes.lock().entry(worker).or_insert(0) += 1;
    }

    pub fn fixed_count(&self, worker: usize) -> usize {
        self.fixes.lock().get(&worker).copied().unwrap_or(0)
    }
}

impl Default for MemPageBuffer {
    fn default() -> Self {
        MemPageBuffer::new()
    }
}

impl PageBuffer for MemPageBuffer {
    fn unfix_all(&self, worker: usize) {
        self.fixes.lock().remove(&worker);
    }

    fn flush_victim_candidates(&self) {
        self.victim_flushes.fetch_add(1, Ordering::SeqCst);
    }
}
