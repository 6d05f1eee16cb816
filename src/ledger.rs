use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::csv;
use crate::store::{KeyValueStore, Record};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

pub const LOG_KEY: &str = "ledgerLog";
pub const SEEN_KEY: &str = "seenKeySet";
pub const HEADER: [&str; 4] = ["identifier", "duration", "detected_at", "source_context"];

pub fn header_line() -> String {
    csv::format_row(&HEADER)
}

/// One flagged observation, as persisted in the ledger log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub identifier: String,
    /// Original duration text with the `duration: ` prefix.
    pub duration_label: String,
    pub detected_at: DateTime<Utc>,
    pub source_context: String,
}

impl LedgerEntry {
    fn to_row(&self) -> String {
        csv::format_row(&[
            self.identifier.as_str(),
            self.duration_label.as_str(),
            self.detected_at.to_rfc3339().as_str(),
            self.source_context.as_str(),
        ])
    }

    fn from_row(row: &[String]) -> Option<Self> {
        let [identifier, duration_label, detected_at, source_context] = row else {
            return None;
        };
        let detected_at = DateTime::parse_from_rfc3339(detected_at)
            .ok()?
            .with_timezone(&Utc);
        Some(Self {
            identifier: identifier.clone(),
            duration_label: duration_label.clone(),
            detected_at,
            source_context: source_context.clone(),
        })
    }
}

/// Dedup key for one observation. The same record seen on another page is a
/// different key.
pub fn composite_key(identifier: &str, duration_text: &str, source_context: &str) -> String {
    format!("{identifier}||{duration_text}||{source_context}")
}

fn log_or_header(value: Option<&Value>) -> String {
    match value.and_then(Value::as_str) {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => header_line(),
    }
}

fn seen_or_empty(value: Option<&Value>) -> Map<String, Value> {
    match value {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    }
}

/// Append-only, deduplicated log of flagged records plus its key index.
///
/// The log and the key-set always travel in the same `set` call, so a reader
/// never sees one updated without the other.
pub struct DedupLedger<S> {
    store: Arc<S>,
}

impl<S> Clone for DedupLedger<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: KeyValueStore> DedupLedger<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Write the header and an empty key-set where they are missing or
    /// malformed. Safe to call on every start.
    pub async fn ensure_initialized(&self) -> Result<()> {
        let current = self
            .store
            .get(&[LOG_KEY, SEEN_KEY])
            .await
            .context("failed to read ledger state")?;

        let mut init = Record::new();
        let log_missing = !matches!(current.get(LOG_KEY), Some(Value::String(s)) if !s.is_empty());
        if log_missing {
            init.insert(LOG_KEY.into(), Value::String(header_line()));
        }
        if !matches!(current.get(SEEN_KEY), Some(Value::Object(_))) {
            init.insert(SEEN_KEY.into(), Value::Object(Map::new()));
        }

        if !init.is_empty() {
            log_info!("Initializing ledger keys: {:?}", init.keys().collect::<Vec<_>>());
            self.store
                .set(init)
                .await
                .context("failed to initialize ledger")?;
        }
        Ok(())
    }

    /// Record a flagged observation unless the same
    /// `(identifier, duration_text, source_context)` was recorded before.
    /// Returns whether a row was appended.
    pub async fn append_if_new(
        &self,
        identifier: &str,
        duration_text: &str,
        source_context: &str,
    ) -> Result<bool> {
        let current = self
            .store
            .get(&[LOG_KEY, SEEN_KEY])
            .await
            .context("failed to read ledger state")?;

        let mut seen = seen_or_empty(current.get(SEEN_KEY));
        let key = composite_key(identifier, duration_text, source_context);
        if seen.contains_key(&key) {
            log_debug!("Ledger already holds {key}");
            return Ok(false);
        }

        let entry = LedgerEntry {
            identifier: identifier.to_string(),
            duration_label: format!("duration: {duration_text}"),
            detected_at: Utc::now(),
            source_context: source_context.to_string(),
        };

        let mut log = log_or_header(current.get(LOG_KEY));
        if !log.ends_with('\n') {
            log.push('\n');
        }
        log.push_str(&entry.to_row());
        seen.insert(key, Value::Bool(true));

        let mut update = Record::new();
        update.insert(LOG_KEY.into(), Value::String(log));
        update.insert(SEEN_KEY.into(), Value::Object(seen));
        self.store
            .set(update)
            .await
            .context("failed to persist ledger append")?;

        log_info!(
            "Ledger appended {} ({}) from {}",
            entry.identifier,
            duration_text,
            entry.source_context
        );
        Ok(true)
    }

    /// Reset the log to its header and forget every key, in one write.
    pub async fn clear_all(&self) -> Result<()> {
        let mut update = Record::new();
        update.insert(LOG_KEY.into(), Value::String(header_line()));
        update.insert(SEEN_KEY.into(), Value::Object(Map::new()));
        self.store
            .set(update)
            .await
            .context("failed to clear ledger")?;
        log_info!("Ledger cleared");
        Ok(())
    }

    /// The serialized log, always starting with the header line.
    pub async fn export_csv(&self) -> Result<String> {
        let current = self
            .store
            .get(&[LOG_KEY])
            .await
            .context("failed to read ledger log")?;
        Ok(log_or_header(current.get(LOG_KEY)))
    }

    pub async fn row_count(&self) -> Result<usize> {
        Ok(csv::count_data_rows(&self.export_csv().await?))
    }

    /// Parsed ledger rows in append order. Rows that cannot be read back are
    /// skipped.
    pub async fn entries(&self) -> Result<Vec<LedgerEntry>> {
        let text = self.export_csv().await?;
        Ok(csv::parse_rows(&text)
            .iter()
            .skip(1)
            .filter_map(|row| LedgerEntry::from_row(row))
            .collect())
    }
}

/// Download name for an export taken at `now`.
pub fn export_file_name(now: DateTime<Utc>) -> String {
    format!("duration_flags_{}.csv", now.format("%Y-%m-%d-%H-%M-%S"))
}
