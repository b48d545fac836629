//! Document store handle.
//!
//! Holds the `users`, `teams`, `files` and `invitations` collections. A
//! `Database` is constructed once at bootstrap and cloned into every service;
//! there is no process-wide singleton. Mutations go through
//! [`Database::transaction`], which serialises read-modify-write cycles so
//! invariants checked inside the closure still hold when its writes commit.

use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
#[cfg(test)]
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

use crate::models::{FileRecord, Invitation, ServiceError, Team, User};

mod transaction;
pub use transaction::Transaction;

const CHANGE_FEED_CAPACITY: usize = 256;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Collections {
    #[serde(default)]
    pub users: BTreeMap<String, User>,
    #[serde(default)]
    pub teams: BTreeMap<String, Team>,
    #[serde(default)]
    pub files: BTreeMap<String, FileRecord>,
    #[serde(default)]
    pub invitations: BTreeMap<String, Invitation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Users,
    Teams,
    Files,
    Invitations,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Upserted,
    Deleted,
}

// Emitted once per committed document write
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeEvent {
    pub collection: Collection,
    pub id: String,
    pub kind: ChangeKind,
}

struct Inner {
    state: RwLock<Collections>,
    snapshot_path: Option<PathBuf>,
    changes: broadcast::Sender<ChangeEvent>,
    #[cfg(test)]
    fail_next_commit: AtomicBool,
}

#[derive(Clone)]
pub struct Database {
    inner: Arc<Inner>,
}

impl Database {
    // Store that lives only as long as the process
    pub fn in_memory() -> Self {
        Self::with_state(Collections::default(), None)
    }

    // Store backed by a JSON snapshot, rewritten after every commit
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ServiceError> {
        let path = path.into();

        let state = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|e| {
                error!("Failed to read database snapshot {}: {:?}", path.display(), e);
                ServiceError::InternalServerError
            })?;
            serde_json::from_str(&content).map_err(|e| {
                error!("Failed to parse database snapshot {}: {:?}", path.display(), e);
                ServiceError::InternalServerError
            })?
        } else {
            info!("No snapshot at {}, starting with an empty store", path.display());
            Collections::default()
        };

        Ok(Self::with_state(state, Some(path)))
    }

    fn with_state(state: Collections, snapshot_path: Option<PathBuf>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(state),
                snapshot_path,
                changes,
                #[cfg(test)]
                fail_next_commit: AtomicBool::new(false),
            }),
        }
    }

    // Consistent read of the committed state
    pub fn read<T>(&self, f: impl FnOnce(&Collections) -> T) -> Result<T, ServiceError> {
        let state = self.inner.state.read().map_err(|_| {
            error!("Database lock poisoned");
            ServiceError::InternalServerError
        })?;
        Ok(f(&state))
    }

    /// Runs `f` as one atomic unit.
    ///
    /// Transactions are serialised. If `f` fails nothing is written; if it
    /// succeeds every staged write commits together. When the snapshot cannot
    /// be persisted the in-memory state is rolled back as well.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&mut Transaction<'_>) -> Result<T, ServiceError>,
    ) -> Result<T, ServiceError> {
        let mut state = self.inner.state.write().map_err(|_| {
            error!("Database lock poisoned");
            ServiceError::InternalServerError
        })?;

        let mut tx = Transaction::new(&state);
        let value = f(&mut tx)?;
        let writes = tx.into_writes();
        if writes.is_empty() {
            return Ok(value);
        }

        let (undo, events) = writes.apply(&mut state);

        if let Err(e) = self.persist(&state) {
            error!("Failed to persist database snapshot: {}", e);
            undo.restore(&mut state);
            return Err(ServiceError::InternalServerError);
        }
        drop(state);

        for event in events {
            debug!("Committed {:?} {} ({:?})", event.collection, event.id, event.kind);
            // no subscribers is fine
            let _ = self.inner.changes.send(event);
        }

        Ok(value)
    }

    fn persist(&self, state: &Collections) -> Result<(), String> {
        if self.commit_fault_injected() {
            return Err("snapshot write refused".to_string());
        }
        match &self.inner.snapshot_path {
            Some(path) => persist_snapshot(path, state),
            None => Ok(()),
        }
    }

    #[cfg(not(test))]
    fn commit_fault_injected(&self) -> bool {
        false
    }

    #[cfg(test)]
    fn commit_fault_injected(&self) -> bool {
        self.inner.fail_next_commit.swap(false, Ordering::SeqCst)
    }

    // The next transaction that writes anything fails as if its snapshot could not be saved
    #[cfg(test)]
    pub(crate) fn fail_next_commit(&self) {
        self.inner.fail_next_commit.store(true, Ordering::SeqCst);
    }

    // Change-notification hook for whatever pushes updates to clients
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.inner.changes.subscribe()
    }
}

fn persist_snapshot(path: &Path, state: &Collections) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
    }

    let json = serde_json::to_string_pretty(state).map_err(|e| e.to_string())?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, json).map_err(|e| e.to_string())?;
    fs::rename(&tmp_path, path).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(id: &str) -> User {
        User {
            id: id.to_string(),
            email: format!("{}@example.com", id),
            name: id.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_transaction_commits_all_writes() {
        let db = Database::in_memory();

        db.transaction(|tx| {
            tx.put_user(user("a"));
            tx.put_user(user("b"));
            Ok(())
        })
        .unwrap();

        let count = db.read(|c| c.users.len()).unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_failed_transaction_writes_nothing() {
        let db = Database::in_memory();

        let result: Result<(), ServiceError> = db.transaction(|tx| {
            tx.put_user(user("a"));
            Err(ServiceError::Conflict("nope".into()))
        });

        assert!(result.is_err());
        assert!(db.read(|c| c.users.is_empty()).unwrap());
    }

    #[test]
    fn test_reads_inside_transaction_see_staged_writes() {
        let db = Database::in_memory();
        db.transaction(|tx| {
            tx.put_user(user("a"));
            Ok(())
        })
        .unwrap();

        db.transaction(|tx| {
            tx.put_user(user("b"));
            assert!(tx.user("b").is_some());
            assert_eq!(tx.users().count(), 2);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_deleted_file_is_invisible_inside_transaction() {
        use crate::models::FileRecord;

        let db = Database::in_memory();
        let file = FileRecord::pending(
            "f1".into(),
            "a.csv",
            "uploads/u/f1/a.csv".into(),
            1,
            "text/csv".into(),
            "u",
            Utc::now(),
        );
        db.transaction(|tx| {
            tx.put_file(file.clone());
            Ok(())
        })
        .unwrap();

        db.transaction(|tx| {
            tx.delete_file("f1");
            assert!(tx.file("f1").is_none());
            assert_eq!(tx.files().count(), 0);
            Ok(())
        })
        .unwrap();

        assert!(db.read(|c| c.files.is_empty()).unwrap());
    }

    #[test]
    fn test_commit_publishes_change_events() {
        let db = Database::in_memory();
        let mut feed = db.subscribe();

        db.transaction(|tx| {
            tx.put_user(user("a"));
            Ok(())
        })
        .unwrap();

        let event = feed.try_recv().unwrap();
        assert_eq!(event.collection, Collection::Users);
        assert_eq!(event.id, "a");
        assert_eq!(event.kind, ChangeKind::Upserted);
    }

    #[test]
    fn test_failed_commit_rolls_back_and_only_once() {
        let db = Database::in_memory();
        db.fail_next_commit();

        let result = db.transaction(|tx| {
            tx.put_user(user("a"));
            Ok(())
        });
        assert_eq!(result, Err(ServiceError::InternalServerError));
        assert!(!db.read(|c| c.users.contains_key("a")).unwrap());

        db.transaction(|tx| {
            tx.put_user(user("a"));
            Ok(())
        })
        .unwrap();
        assert!(db.read(|c| c.users.contains_key("a")).unwrap());
    }

    #[test]
    fn test_snapshot_survives_reopen() {
        let path = std::env::temp_dir()
            .join(format!("tabula-db-{}", uuid::Uuid::new_v4()))
            .join("db.json");

        let db = Database::open(&path).unwrap();
        db.transaction(|tx| {
            tx.put_user(user("a"));
            Ok(())
        })
        .unwrap();

        let reopened = Database::open(&path).unwrap();
        assert!(reopened.read(|c| c.users.contains_key("a")).unwrap());

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}
