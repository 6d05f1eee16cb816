use anyhow::{Context, Result};
use serde_json::{Number, Value};

use crate::store::{KeyValueStore, Record};

pub const THRESHOLD_KEY: &str = "thresholdMinutes";
pub const DEFAULT_THRESHOLD_MINUTES: f64 = 3.0;

fn finite_minutes(value: Option<&Value>) -> Option<f64> {
    value.and_then(Value::as_f64).filter(|v| v.is_finite())
}

/// Current threshold, read from the store on every call. Anything missing,
/// non-numeric or unreadable falls back to the default.
pub async fn threshold_minutes<S: KeyValueStore>(store: &S) -> f64 {
    match store.get(&[THRESHOLD_KEY]).await {
        Ok(record) => finite_minutes(record.get(THRESHOLD_KEY)).unwrap_or(DEFAULT_THRESHOLD_MINUTES),
        Err(err) => {
            log::warn!("Failed to read threshold, using default: {err:#}");
            DEFAULT_THRESHOLD_MINUTES
        }
    }
}

/// Persist a new threshold. Non-finite input stores the default instead.
/// Returns the value actually written.
pub async fn set_threshold_minutes<S: KeyValueStore>(store: &S, minutes: f64) -> Result<f64> {
    let next = if minutes.is_finite() {
        minutes
    } else {
        DEFAULT_THRESHOLD_MINUTES
    };
    let number = Number::from_f64(next).context("threshold is not representable")?;

    let mut record = Record::new();
    record.insert(THRESHOLD_KEY.into(), Value::Number(number));
    store
        .set(record)
        .await
        .context("failed to persist threshold")?;
    Ok(next)
}

/// Threshold in whole-second units; negative thresholds clamp to zero.
pub fn threshold_seconds(minutes: f64) -> f64 {
    (minutes * 60.0).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn defaults_when_absent() {
        let store = MemoryStore::new();
        assert_eq!(threshold_minutes(&store).await, DEFAULT_THRESHOLD_MINUTES);
    }

    #[tokio::test]
    async fn defaults_when_not_a_number() {
        let store = MemoryStore::new();
        let mut record = Record::new();
        record.insert(THRESHOLD_KEY.into(), json!("five"));
        store.set(record).await.unwrap();
        assert_eq!(threshold_minutes(&store).await, DEFAULT_THRESHOLD_MINUTES);
    }

    #[tokio::test]
    async fn stored_value_is_read_fresh() {
        let store = MemoryStore::new();
        assert_eq!(set_threshold_minutes(&store, 1.5).await.unwrap(), 1.5);
        assert_eq!(threshold_minutes(&store).await, 1.5);

        set_threshold_minutes(&store, 10.0).await.unwrap();
        assert_eq!(threshold_minutes(&store).await, 10.0);
    }

    #[tokio::test]
    async fn non_finite_input_stores_default() {
        let store = MemoryStore::new();
        let stored = set_threshold_minutes(&store, f64::NAN).await.unwrap();
        assert_eq!(stored, DEFAULT_THRESHOLD_MINUTES);
        assert_eq!(threshold_minutes(&store).await, DEFAULT_THRESHOLD_MINUTES);
    }

    #[test]
    fn seconds_clamp_at_zero() {
        assert_eq!(threshold_seconds(3.0), 180.0);
        assert_eq!(threshold_seconds(-2.0), 0.0);
    }
}
