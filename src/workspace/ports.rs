//! Port-pair reservation across concurrently live runs.
//!
//! Reserved pairs are read from the persisted state of every run that has
//! not completed; a run's record is its reservation. Scan, pick, and the
//! durable write of the winning pair into the calling run's state form one
//! critical section under an exclusive file lock, so two runs starting from
//! independent processes can never be handed overlapping pairs: by the time
//! the lock is released the reservation is already visible to the next scan.

use fs2::FileExt;
use std::fs::OpenOptions;
use std::path::PathBuf;
use tracing::warn;

use crate::errors::WorkspaceError;
use crate::state::{PortPair, RunState, RunStatus, StateStore};

pub struct PortLedger {
    store: StateStore,
    lock_path: PathBuf,
    base: u16,
    span: u16,
}

impl PortLedger {
    pub fn new(state_dir: PathBuf, runs_dir: PathBuf, base: u16, span: u16) -> Self {
        Self {
            store: StateStore::new(runs_dir),
            lock_path: state_dir.join("ports.lock"),
            base,
            span,
        }
    }

    /// Reserve the lowest unused adjacent pair for `state`'s run.
    ///
    /// The pair is written into `state` and persisted before the ledger lock
    /// is released; a scan by any other run sees the reservation as soon as
    /// it can acquire the lock. The scan treats the calling run's own
    /// record (if any) as free.
    pub fn allocate(&self, state: &mut RunState) -> Result<PortPair, WorkspaceError> {
        if let Some(parent) = self.lock_path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| WorkspaceError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(|source| WorkspaceError::LedgerLock {
                path: self.lock_path.clone(),
                source,
            })?;
        lock_file
            .lock_exclusive()
            .map_err(|source| WorkspaceError::LedgerLock {
                path: self.lock_path.clone(),
                source,
            })?;

        let result = self.pick_and_record(state);

        if let Err(err) = fs2::FileExt::unlock(&lock_file) {
            warn!(error = %err, "failed to release port ledger lock");
        }
        result
    }

    fn pick_and_record(&self, state: &mut RunState) -> Result<PortPair, WorkspaceError> {
        let pair = self.pick_lowest_free(&state.run_id)?;
        state.ports = Some(pair);
        self.store.persist(state)?;
        Ok(pair)
    }

    fn pick_lowest_free(&self, run_id: &str) -> Result<PortPair, WorkspaceError> {
        let reserved = self.reserved_ports(run_id);
        let end = u32::from(self.base) + u32::from(self.span);

        let mut candidate = u32::from(self.base);
        while candidate + 1 < end && candidate + 1 <= u32::from(u16::MAX) {
            let primary = candidate as u16;
            let secondary = (candidate + 1) as u16;
            if !reserved.contains(&primary) && !reserved.contains(&secondary) {
                return Ok(PortPair { primary, secondary });
            }
            candidate += 2;
        }

        Err(WorkspaceError::PortsExhausted {
            base: self.base,
            end: end.min(u32::from(u16::MAX)) as u16,
        })
    }

    /// Ports held by every live run other than `run_id`. Completed runs have
    /// released theirs; failed runs keep them, since failed runs are
    /// resumable.
    fn reserved_ports(&self, run_id: &str) -> Vec<u16> {
        let mut reserved = Vec::new();

        let ids = match self.store.list_run_ids() {
            Ok(ids) => ids,
            Err(err) => {
                warn!(error = %err, "could not scan runs for reserved ports");
                return reserved;
            }
        };

        for id in ids {
            if id == run_id {
                continue;
            }
            match self.store.load(&id) {
                Ok(Some(state)) if state.status != RunStatus::Completed => {
                    if let Some(ports) = state.ports {
                        reserved.push(ports.primary);
                        reserved.push(ports.secondary);
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    // Another run's unreadable record must not break this
                    // run's allocation; its ports simply cannot be reserved.
                    warn!(run_id = %id, error = %err, "skipping unreadable run state");
                }
            }
        }

        reserved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn setup(base: u16, span: u16) -> (PortLedger, StateStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let state_dir = dir.path().join(".runway");
        let runs_dir = state_dir.join("runs");
        let ledger = PortLedger::new(state_dir, runs_dir.clone(), base, span);
        (ledger, StateStore::new(runs_dir), dir)
    }

    #[test]
    fn test_first_allocation_gets_base_pair() {
        let (ledger, _store, _dir) = setup(9100, 20);
        let mut state = RunState::new("aaaa1111", "1");
        let pair = ledger.allocate(&mut state).unwrap();
        assert_eq!(pair.primary, 9100);
        assert_eq!(pair.secondary, 9101);
        assert_eq!(state.ports, Some(pair));
    }

    #[test]
    fn test_allocation_is_durable_before_the_lock_is_released() {
        let (ledger, store, _dir) = setup(9100, 20);
        let mut state = RunState::new("aaaa1111", "1");
        let pair = ledger.allocate(&mut state).unwrap();

        // The reservation is on disk without any caller-side save
        let loaded = store.load("aaaa1111").unwrap().unwrap();
        assert_eq!(loaded.ports, Some(pair));
    }

    #[test]
    fn test_back_to_back_allocations_get_disjoint_pairs() {
        let (ledger, _store, _dir) = setup(9100, 20);

        // No caller-side persist between calls: this is the window in which
        // two simultaneously starting runs would race
        let mut a = RunState::new("aaaa1111", "1");
        let mut b = RunState::new("bbbb2222", "2");
        let mut c = RunState::new("cccc3333", "3");
        let first = ledger.allocate(&mut a).unwrap();
        let second = ledger.allocate(&mut b).unwrap();
        let third = ledger.allocate(&mut c).unwrap();

        let all = [
            first.primary,
            first.secondary,
            second.primary,
            second.secondary,
            third.primary,
            third.secondary,
        ];
        let mut dedup = all.to_vec();
        dedup.sort_unstable();
        dedup.dedup();
        assert_eq!(dedup.len(), all.len(), "port pairs must be disjoint");
        assert_eq!(second.primary, 9102);
        assert_eq!(third.primary, 9104);
    }

    #[test]
    fn test_completed_run_releases_its_pair() {
        let (ledger, store, _dir) = setup(9100, 20);

        let mut done = RunState::new("aaaa1111", "1");
        done.ports = Some(PortPair {
            primary: 9100,
            secondary: 9101,
        });
        done.status = RunStatus::Completed;
        store.save(&mut done, "document").unwrap();

        let mut next = RunState::new("bbbb2222", "2");
        let pair = ledger.allocate(&mut next).unwrap();
        assert_eq!(pair.primary, 9100);
    }

    #[test]
    fn test_failed_run_keeps_its_pair() {
        let (ledger, store, _dir) = setup(9100, 20);

        let mut failed = RunState::new("aaaa1111", "1");
        failed.ports = Some(PortPair {
            primary: 9100,
            secondary: 9101,
        });
        failed.status = RunStatus::Failed;
        store.save(&mut failed, "plan").unwrap();

        let mut next = RunState::new("bbbb2222", "2");
        let pair = ledger.allocate(&mut next).unwrap();
        assert_eq!(pair.primary, 9102);
    }

    #[test]
    fn test_own_record_is_treated_as_free() {
        let (ledger, store, _dir) = setup(9100, 20);

        let mut state = RunState::new("aaaa1111", "1");
        ledger.allocate(&mut state).unwrap();
        store.save(&mut state, "plan").unwrap();

        // Re-allocation for the same run must not collide with itself
        let pair = ledger.allocate(&mut state).unwrap();
        assert_eq!(pair.primary, 9100);
    }

    #[test]
    fn test_exhaustion_is_a_distinct_error() {
        let (ledger, _store, _dir) = setup(9100, 4);

        let mut a = RunState::new("aaaa1111", "1");
        let mut b = RunState::new("bbbb2222", "2");
        ledger.allocate(&mut a).unwrap();
        ledger.allocate(&mut b).unwrap();

        let mut c = RunState::new("cccc3333", "3");
        let result = ledger.allocate(&mut c);
        assert!(matches!(
            result,
            Err(WorkspaceError::PortsExhausted { base: 9100, .. })
        ));
        // A failed allocation records nothing
        assert!(c.ports.is_none());
    }
}
