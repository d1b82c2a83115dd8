// The HA server-state machine. A node is always in exactly one of the
// states below; peers request transitions, and only the pairs in the
// transition table are legal. Moving toward ACTIVE or STANDBY is two-phase:
// the machine commutes to a TO-BE-* state synchronously and the replication
// layer finishes the transit (and flips the update gate) when the log
// streams agree. Forced transitions collapse both phases.
//
// The state cell sits behind a re-entrant mutex: a replication layer that
// completes the commute synchronously calls straight back into
// `finish_transit` from under `change_server_state`.

use oxbow_base::{fail, Result};
use oxbow_thread::WorkerHerd;
use oxbow_txn::LogManager;
use parking_lot::{Mutex, ReentrantMutex};
use std::cell::Cell;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use strum_macros::EnumIter;
use tracing::{debug, info};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, EnumIter)]
pub enum ServerState {
    Idle,
    Active,
    ToBeActive,
    Standby,
    ToBeStandby,
    Maintenance,
    Dead,
    /// Not a state a server occupies: the rejection result of an illegal
    /// transition request.
    Na,
}

impl ServerState {
    pub fn name(self) -> &'static str {
        match self {
            ServerState::Idle => "idle",
            ServerState::Active => "active",
            ServerState::ToBeActive => "to-be-active",
            ServerState::Standby => "standby",
            ServerState::ToBeStandby => "to-be-standby",
            ServerState::Maintenance => "maintenance",
            ServerState::Dead => "dead",
            ServerState::Na => "na",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum BootStatus {
    Up,
    Down,
    Maintenance,
}

struct Transition {
    cur: ServerState,
    req: ServerState,
    next: ServerState,
}

const TRANSITIONS: [Transition; 11] = {
    use ServerState::*;
    [
        Transition { cur: Idle, req: Active, next: Active },
        Transition { cur: Idle, req: Standby, next: ToBeStandby },
        Transition { cur: Idle, req: Maintenance, next: Maintenance },
        Transition { cur: Active, req: Active, next: Active },
        Transition { cur: Active, req: Standby, next: ToBeStandby },
        Transition { cur: ToBeActive, req: Active, next: Active },
        Transition { cur: Standby, req: Standby, next: Standby },
        Transition { cur: Standby, req: Active, next: ToBeActive },
        Transition { cur: Standby, req: Maintenance, next: Maintenance },
        Transition { cur: ToBeStandby, req: Standby, next: Standby },
        Transition { cur: Maintenance, req: Standby, next: ToBeStandby },
    ]
};

/// The asynchronous half of a two-phase transition. `start_commute_*` kicks
/// the log streams over; the implementation calls [`HaState::finish_transit`]
/// when done (possibly synchronously, from the same thread).
pub trait ReplicationNode: Send + Sync {
    fn start_commute_to_active(&self, ha: &HaState, force: bool);
    fn start_commute_to_standby(&self, ha: &HaState, force: bool);
    /// Block until a commute from `from` has reached `to`.
    fn wait_commute(&self, from: ServerState, to: ServerState);
}

/// Replication stand-in for single-node operation: every commute completes
/// on the spot, re-entering the state machine from under the caller.
pub struct LoopbackReplication;

impl ReplicationNode for LoopbackReplication {
    fn start_commute_to_active(&self, ha: &HaState, force: bool) {
        ha.finish_transit(force, ServerState::Active);
    }

    fn start_commute_to_standby(&self, ha: &HaState, force: bool) {
        ha.finish_transit(force, ServerState::Standby);
    }

    fn wait_commute(&self, _from: ServerState, _to: ServerState) {}
}

pub struct HaState {
    state: ReentrantMutex<Cell<ServerState>>,
    boot: Mutex<BootStatus>,
    /// False when this server runs without peers; the two-phase dance then
    /// completes inline instead of waiting on a replication layer.
    ha_enabled: bool,
    log: Arc<dyn LogManager>,
    repl: Mutex<Option<Arc<dyn ReplicationNode>>>,
    herd: Mutex<Option<Arc<dyn WorkerHerd>>>,
}

impl HaState {
    pub fn new(log: Arc<dyn LogManager>, ha_enabled: bool) -> Arc<HaState> {
        Arc::new(HaState {
            state: ReentrantMutex::new(Cell::new(ServerState::Idle)),
            boot: Mutex::new(BootStatus::Down),
            ha_enabled,
            log,
            repl: Mutex::new(None),
            herd: Mutex::new(None),
        })
    }

    pub fn set_replication(&self, repl: Arc<dyn ReplicationNode>) {
        *self.repl.lock() = Some(repl);
    }

    pub fn set_worker_herd(&self, herd: Arc<dyn WorkerHerd>) {
        *self.herd.lock() = Some(herd);
    }

    pub fn ha_enabled(&self) -> bool {
        self.ha_enabled
    }

    pub fn current(&self) -> ServerState {
        self.state.lock().get()
    }

    pub fn boot_status(&self) -> BootStatus {
        *self.boot.lock()
    }

    pub fn set_boot_status(&self, status: BootStatus) {
        *self.boot.lock() = status;
    }

    fn repl(&self) -> Option<Arc<dyn ReplicationNode>> {
        self.repl.lock().clone()
    }

    fn wake_workers(&self) {
        if let Some(herd) = self.herd.lock().clone() {
            let woken = herd.start_all_workers();
            debug!(target: "oxbow", "ha promotion woke {} workers", woken);
        }
    }

    /// Request a single-step transition. Returns the new state for a legal
    /// (current, requested) pair, `Na` otherwise; an illegal request leaves
    /// the state untouched.
    pub fn transit(&self, req: ServerState) -> ServerState {
        if self.current() == req {
            return req;
        }
        let cell = self.state.lock();
        let cur = cell.get();
        for t in &TRANSITIONS {
            if t.cur == cur && t.req == req {
                info!(target: "oxbow",
                      "server state ({}) -> ({})", cur.name(), t.next.name());
                cell.set(t.next);
                if t.next == ServerState::Active {
                    self.log.set_promotion_time(SystemTime::now());
                    self.wake_workers();
                }
                return t.next;
            }
        }
        ServerState::Na
    }

    /// Completion hook for the replication layer: flip the update gate and
    /// land on the final state of a two-phase transition.
    pub fn finish_transit(&self, force: bool, req: ServerState) {
        debug_assert!(matches!(req, ServerState::Active | ServerState::Standby));
        if req == ServerState::Active {
            self.log.enable_update();
        } else {
            self.log.disable_update();
        }
        if force {
            let cell = self.state.lock();
            cell.set(req);
            if req == ServerState::Active {
                self.log.set_promotion_time(SystemTime::now());
            }
        } else {
            let state = self.transit(req);
            debug_assert!(state == req);
        }
    }

    /// The front door: accept a requested target state, decide the
    /// transient, drive the commute.
    pub fn change_server_state(
        &self,
        state: ServerState,
        force: bool,
        timeout: Duration,
        heartbeat: bool,
    ) -> Result<()> {
        debug!(target: "oxbow",
               "change_server_state: cur {} req {} force {} heartbeat {}",
               self.current().name(), state.name(), force, heartbeat);

        let _guard = self.state.lock();
        let cur = self.current();

        // Already there, or already on the way there.
        if state == cur
            || (!force && cur == ServerState::ToBeActive && state == ServerState::Active)
            || (!force && cur == ServerState::ToBeStandby && state == ServerState::Standby)
        {
            return Ok(());
        }

        // Requests not backed by the cluster manager only cover the
        // maintenance hops and forced promotion completion.
        if !heartbeat
            && !(cur == ServerState::Standby && state == ServerState::Maintenance)
            && !(cur == ServerState::Maintenance && state == ServerState::Standby)
            && !(force && cur == ServerState::ToBeActive && state == ServerState::Active)
        {
            return Ok(());
        }

        if force {
            self.handle_force(state);
            if self.current() == ServerState::Active {
                // spawn threads to absorb the flood after fail-over
                self.wake_workers();
            }
            return Ok(());
        }

        match state {
            ServerState::Active => {
                // Phase 1: commute to TO-BE-ACTIVE.
                let s = self.transit(ServerState::Active);
                if s == ServerState::Na {
                    return fail("illegal transition to active");
                }
                if self.ha_enabled && s == ServerState::ToBeActive {
                    // Phase 2 lands on ACTIVE when replication is caught up.
                    if let Some(repl) = self.repl() {
                        repl.start_commute_to_active(self, false);
                    }
                } else if !self.ha_enabled && s == ServerState::ToBeActive {
                    self.log.enable_update();
                    let s = self.transit(ServerState::Active);
                    if s == ServerState::Na {
                        return fail("illegal transition to active");
                    }
                }
                Ok(())
            }
            ServerState::Standby => {
                let orig = cur;
                let s = self.transit(ServerState::Standby);
                if s == ServerState::Na {
                    return fail("illegal transition to standby");
                }
                if s == ServerState::ToBeStandby {
                    if self.ha_enabled {
                        if let Some(repl) = self.repl() {
                            repl.start_commute_to_standby(self, false);
                        }
                    } else {
                        self.log.disable_update();
                        let s = self.transit(ServerState::Standby);
                        if s == ServerState::Na {
                            return fail("illegal transition to standby");
                        }
                    }
                }
                if orig == ServerState::Maintenance {
                    self.set_boot_status(BootStatus::Up);
                }
                Ok(())
            }
            ServerState::Maintenance => self.handle_maintenance(timeout),
            _ => fail("illegal server state request"),
        }
    }

    /// One-phase transition: directly set the target, gate updates, record
    /// the promotion time on ACTIVE.
    fn handle_force(&self, req: ServerState) {
        let cell = self.state.lock();
        if cell.get() != req {
            debug!(target: "oxbow",
                   "forced server state {} -> {}", cell.get().name(), req.name());
            match req {
                ServerState::Active => {
                    if self.ha_enabled {
                        if let Some(repl) = self.repl() {
                            repl.start_commute_to_active(self, true);
                            repl.wait_commute(cell.get(), ServerState::Active);
                        }
                    } else {
                        self.log.enable_update();
                        cell.set(ServerState::Active);
                    }
                }
                ServerState::Standby => {
                    if self.ha_enabled {
                        if let Some(repl) = self.repl() {
                            repl.start_commute_to_standby(self, true);
                            repl.wait_commute(cell.get(), ServerState::Standby);
                        }
                    } else {
                        self.log.disable_update();
                        cell.set(ServerState::Standby);
                    }
                }
                other => cell.set(other),
            }
            if cell.get() == ServerState::Active {
                self.log.set_promotion_time(SystemTime::now());
            }
        }
    }

    /// Maintenance grants updates, then waits for ordinary clients to
    /// disconnect; survivors past the timeout are slammed by transaction
    /// index (never the system transaction).
    fn handle_maintenance(&self, timeout: Duration) -> Result<()> {
        let state = self.transit(ServerState::Maintenance);
        if state == ServerState::Na {
            return fail("illegal transition to maintenance");
        }
        if state == ServerState::Maintenance {
            self.log.enable_update();
            self.set_boot_status(BootStatus::Maintenance);
        }

        let deadline = std::time::Instant::now() + timeout;
        while self.log.count_non_maintenance_clients() > 0
            && std::time::Instant::now() < deadline
        {
            std::thread::sleep(Duration::from_millis(1000).min(timeout));
        }

        if self.log.count_non_maintenance_clients() > 0 {
            for t in self.log.active_trans() {
                if let Some(client) = self.log.find_client(t) {
                    if !client.maintenance_allowed {
                        info!(target: "oxbow",
                              "maintenance: slamming transaction {:?} of client {}",
                              t, client.client_id);
                        self.log.slam_transaction(t);
                    }
                }
            }
            // grace for the slammed transactions to notice and unwind
            std::thread::sleep(Duration::from_millis(2000));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test;
