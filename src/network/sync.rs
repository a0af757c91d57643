//! Peer synchronization state machine (spec §4.4): four states, a small
//! transition table, and a 200-block backward retreat (`on_headers`) each
//! time a header batch's earliest parent is still unknown locally. The
//! no-progress watchdog is an ambient addition (not in the wire-level spec)
//! grounded in the teacher's `SyncScheduler` polling loop.

use parking_lot::RwLock;
use std::time::{Duration, Instant};
use thiserror::Error;

pub const HEADER_STEP_BACK: u64 = 200;
pub const HEADERS_PER_REQUEST: u32 = 10;
pub const BLOCKS_PER_REQUEST: u32 = 128;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("sync is already in progress")]
    AlreadySyncing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    InitSyncGetHeaders,
    InitSyncGetBlocks,
    InitSyncCompleted,
}

/// What the dispatcher should do next as a result of a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    None,
    RequestBlocks { from_height: u64 },
    RequestHeaders { from_height: u64, count: u32 },
    Completed,
}

/// Initial backward jump from our best height: `bestHeight - 200 + 1`, so the
/// first requested window overlaps our own tip by one block.
fn clamped_step_back(height: u64) -> u64 {
    height.saturating_sub(HEADER_STEP_BACK - 1).max(1)
}

/// Subsequent retreat once a window's earliest header still has an unknown
/// parent: step back a full 200 blocks (spec §4.4 scenario 5: 801 → 601 → 401).
fn clamped_retreat(height: u64) -> u64 {
    height.saturating_sub(HEADER_STEP_BACK).max(1)
}

pub struct SyncManager {
    phase: RwLock<SyncPhase>,
    last_progress: RwLock<Instant>,
    no_progress_timeout: Duration,
}

impl SyncManager {
    pub fn new(no_progress_timeout: Duration) -> Self {
        Self {
            phase: RwLock::new(SyncPhase::Idle),
            last_progress: RwLock::new(Instant::now()),
            no_progress_timeout,
        }
    }

    pub fn phase(&self) -> SyncPhase {
        *self.phase.read()
    }

    fn transition_to(&self, phase: SyncPhase) {
        *self.phase.write() = phase;
        *self.last_progress.write() = Instant::now();
    }

    /// IDLE + a peer STATUS claiming more total work than ours.
    pub fn on_peer_status(
        &self,
        peer_total_difficulty: u64,
        peer_best_height: u64,
        our_total_difficulty: u64,
        our_best_height: u64,
    ) -> SyncAction {
        if self.phase() != SyncPhase::Idle || peer_total_difficulty <= our_total_difficulty {
            return SyncAction::None;
        }
        let _ = peer_best_height;
        if our_best_height == 0 {
            self.transition_to(SyncPhase::InitSyncGetBlocks);
            SyncAction::RequestBlocks { from_height: 1 }
        } else {
            self.transition_to(SyncPhase::InitSyncGetHeaders);
            let from_height = clamped_step_back(our_best_height);
            SyncAction::RequestHeaders {
                from_height,
                count: HEADERS_PER_REQUEST,
            }
        }
    }

    /// INIT_SYNC_GET_HEADERS + a `BLOCK_HEADERS` reply.
    ///
    /// `first_header_height` / `first_header_parent` describe the earliest
    /// header in the reply; `has_local_parent` checks whether that parent
    /// hash is already known to the repository.
    pub fn on_headers(
        &self,
        headers_empty: bool,
        first_header_height: u64,
        has_local_parent: bool,
    ) -> SyncAction {
        if self.phase() != SyncPhase::InitSyncGetHeaders {
            return SyncAction::None;
        }
        if headers_empty {
            self.transition_to(SyncPhase::InitSyncCompleted);
            return SyncAction::Completed;
        }
        if has_local_parent {
            self.transition_to(SyncPhase::InitSyncGetBlocks);
            return SyncAction::RequestBlocks {
                from_height: first_header_height,
            };
        }
        // Parent unknown: stay in this phase, retreat a full window further.
        *self.last_progress.write() = Instant::now();
        let from_height = clamped_retreat(first_header_height);
        SyncAction::RequestHeaders {
            from_height,
            count: HEADERS_PER_REQUEST,
        }
    }

    /// INIT_SYNC_GET_BLOCKS + a `BLOCKS` reply. `peer_has_more` is false once
    /// the peer signals nothing further is available.
    pub fn on_blocks(&self, peer_has_more: bool) -> SyncAction {
        if self.phase() != SyncPhase::InitSyncGetBlocks {
            return SyncAction::None;
        }
        *self.last_progress.write() = Instant::now();
        if peer_has_more {
            SyncAction::None
        } else {
            self.transition_to(SyncPhase::InitSyncCompleted);
            SyncAction::Completed
        }
    }

    /// Call periodically; reverts a stalled sync back to IDLE.
    pub fn check_watchdog(&self) -> bool {
        if self.phase() == SyncPhase::Idle {
            return false;
        }
        if self.last_progress.read().elapsed() > self.no_progress_timeout {
            self.transition_to(SyncPhase::Idle);
            true
        } else {
            false
        }
    }

    pub fn reset_to_idle(&self) {
        self.transition_to(SyncPhase::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_starts_get_blocks_when_we_have_no_history() {
        let sync = SyncManager::new(Duration::from_secs(30));
        let action = sync.on_peer_status(40, 10, 30, 0);
        assert_eq!(action, SyncAction::RequestBlocks { from_height: 1 });
        assert_eq!(sync.phase(), SyncPhase::InitSyncGetBlocks);
    }

    #[test]
    fn idle_starts_get_headers_when_we_have_history() {
        let sync = SyncManager::new(Duration::from_secs(30));
        let action = sync.on_peer_status(40, 500, 30, 300);
        assert_eq!(
            action,
            SyncAction::RequestHeaders {
                from_height: clamped_step_back(300),
                count: HEADERS_PER_REQUEST,
            }
        );
        assert_eq!(sync.phase(), SyncPhase::InitSyncGetHeaders);
    }

    #[test]
    fn peer_not_ahead_does_not_start_sync() {
        let sync = SyncManager::new(Duration::from_secs(30));
        assert_eq!(sync.on_peer_status(10, 10, 30, 5), SyncAction::None);
        assert_eq!(sync.phase(), SyncPhase::Idle);
    }

    #[test]
    fn empty_headers_reply_completes_sync() {
        let sync = SyncManager::new(Duration::from_secs(30));
        sync.on_peer_status(40, 500, 30, 300);
        let action = sync.on_headers(true, 101, false);
        assert_eq!(action, SyncAction::Completed);
        assert_eq!(sync.phase(), SyncPhase::InitSyncCompleted);
    }

    #[test]
    fn unknown_parent_steps_back_and_stays() {
        let sync = SyncManager::new(Duration::from_secs(30));
        sync.on_peer_status(40, 500, 30, 300);
        let action = sync.on_headers(false, 101, false);
        assert_eq!(
            action,
            SyncAction::RequestHeaders {
                from_height: clamped_retreat(101),
                count: HEADERS_PER_REQUEST,
            }
        );
        assert_eq!(sync.phase(), SyncPhase::InitSyncGetHeaders);
    }

    #[test]
    fn repeated_unknown_parents_retreat_by_full_windows() {
        // 801 -> 601 -> 401, matching a 200-block retreat per step.
        let sync = SyncManager::new(Duration::from_secs(30));
        sync.on_peer_status(40, 1_000, 30, 1_000);
        assert_eq!(
            sync.on_headers(false, 801, false),
            SyncAction::RequestHeaders {
                from_height: 601,
                count: HEADERS_PER_REQUEST,
            }
        );
        assert_eq!(
            sync.on_headers(false, 601, false),
            SyncAction::RequestHeaders {
                from_height: 401,
                count: HEADERS_PER_REQUEST,
            }
        );
    }

    #[test]
    fn known_parent_moves_to_get_blocks() {
        let sync = SyncManager::new(Duration::from_secs(30));
        sync.on_peer_status(40, 500, 30, 300);
        let action = sync.on_headers(false, 101, true);
        assert_eq!(action, SyncAction::RequestBlocks { from_height: 101 });
        assert_eq!(sync.phase(), SyncPhase::InitSyncGetBlocks);
    }

    #[test]
    fn blocks_complete_once_peer_has_no_more() {
        let sync = SyncManager::new(Duration::from_secs(30));
        sync.on_peer_status(40, 10, 30, 0);
        assert_eq!(sync.on_blocks(true), SyncAction::None);
        assert_eq!(sync.phase(), SyncPhase::InitSyncGetBlocks);
        assert_eq!(sync.on_blocks(false), SyncAction::Completed);
        assert_eq!(sync.phase(), SyncPhase::InitSyncCompleted);
    }

    #[test]
    fn watchdog_reverts_a_stalled_sync_to_idle() {
        let sync = SyncManager::new(Duration::from_millis(1));
        sync.on_peer_status(40, 10, 30, 0);
        std::thread::sleep(Duration::from_millis(5));
        assert!(sync.check_watchdog());
        assert_eq!(sync.phase(), SyncPhase::Idle);
    }

}
