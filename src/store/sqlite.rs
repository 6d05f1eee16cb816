//! Persistent [`KeyValueStore`] on SQLite.
//!
//! `rusqlite::Connection` is `!Sync` and its calls block, so one thread owns
//! the connection and runs queued closures in order. Async callers never
//! block the runtime, and each `set` commits all of its keys in a single
//! transaction on that thread.

use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use log::{error, info, warn};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tokio::sync::oneshot;

use super::{migrations::run_migrations, KeyValueStore, Record};

type StoreTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum StoreCommand {
    Execute(StoreTask),
    Shutdown,
}

struct StoreInner {
    sender: mpsc::Sender<StoreCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(StoreCommand::Shutdown) {
                error!("Failed to send shutdown to store thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join store thread: {join_err:?}");
            }
        }
    }
}

/// SQLite-backed key-value store. All statements run on one dedicated thread;
/// async callers hand it closures and await the reply.
#[derive(Clone)]
pub struct SqliteStore {
    inner: Arc<StoreInner>,
    path: Arc<PathBuf>,
}

impl SqliteStore {
    pub fn open(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create store directory {}", parent.display())
                })?;
            }
        }

        let (command_tx, command_rx) = mpsc::channel::<StoreCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = path.clone();

        let worker = thread::Builder::new()
            .name("duration-flagger-store".into())
            .spawn(move || {
                let mut conn = match Connection::open(&path_for_thread) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(Err(anyhow::Error::new(err)
                            .context("failed to open SQLite store")));
                        return;
                    }
                };

                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("Failed to enable WAL mode: {err}");
                }

                let init_result =
                    run_migrations(&mut conn).context("failed to run store migrations");
                if ready_tx.send(init_result).is_err() {
                    error!("Store initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        StoreCommand::Execute(task) => task(&mut conn),
                        StoreCommand::Shutdown => break,
                    }
                }

                info!("Store thread shutting down");
            })
            .with_context(|| "failed to spawn store worker thread")?;

        ready_rx
            .recv()
            .context("store worker exited before signaling readiness")??;

        info!("Store opened at {}", path.display());

        Ok(Self {
            inner: Arc::new(StoreInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            path: Arc::new(path),
        })
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = StoreCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("Store caller dropped before receiving result");
            }
        }));

        self.inner
            .sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to store thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("store thread terminated unexpectedly"))?
    }
}

impl KeyValueStore for SqliteStore {
    async fn get(&self, keys: &[&str]) -> Result<Record> {
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        self.execute(move |conn| {
            let mut stmt = conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
            let mut record = Record::new();
            for key in keys {
                let raw: Option<String> = stmt
                    .query_row(params![key], |row| row.get(0))
                    .optional()
                    .with_context(|| format!("failed to read key {key}"))?;
                let Some(raw) = raw else { continue };
                match serde_json::from_str::<Value>(&raw) {
                    Ok(value) => {
                        record.insert(key, value);
                    }
                    // Undecodable rows read as absent so callers reinitialise them.
                    Err(err) => warn!("Ignoring undecodable value for key {key}: {err}"),
                }
            }
            Ok(record)
        })
        .await
    }

    async fn set(&self, record: Record) -> Result<()> {
        self.execute(move |conn| {
            let now = Utc::now().to_rfc3339();
            let tx = conn
                .transaction()
                .context("failed to open store transaction")?;
            for (key, value) in &record {
                let encoded = serde_json::to_string(value)?;
                tx.execute(
                    "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                    params![key, encoded, now],
                )
                .with_context(|| format!("failed to write key {key}"))?;
            }
            tx.commit().context("failed to commit store transaction")?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.sqlite3");

        {
            let store = SqliteStore::open(path.clone()).unwrap();
            let mut record = Record::new();
            record.insert("thresholdMinutes".into(), json!(2.5));
            record.insert("seenKeySet".into(), json!({ "a||1 s||x": true }));
            store.set(record).await.unwrap();
        }

        let store = SqliteStore::open(path).unwrap();
        let got = store
            .get(&["thresholdMinutes", "seenKeySet", "missing"])
            .await
            .unwrap();
        assert_eq!(got.get("thresholdMinutes"), Some(&json!(2.5)));
        assert_eq!(got.get("seenKeySet"), Some(&json!({ "a||1 s||x": true })));
        assert!(!got.contains_key("missing"));
    }

    #[tokio::test]
    async fn undecodable_rows_read_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("store.sqlite3")).unwrap();
        store
            .execute(|conn| {
                conn.execute(
                    "INSERT INTO kv (key, value, updated_at) VALUES ('seenKeySet', '{not json', 'x')",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap();

        let got = store.get(&["seenKeySet"]).await.unwrap();
        assert!(got.is_empty());
    }
}
