//! Marker records: `service -> YYYYMMDDHHMM` mappings held in a parameter.
//!
//! Both the high-water mark and the latest-available mark use this shape.
//! Writes never lower a service's mark: [`MarkStore::advance`] re-reads the
//! parameter and keeps the per-service maximum, so a slower concurrent
//! writer cannot move a mark backwards.

use super::ParameterStore;
use crate::errors::ParameterError;
use crate::utils::MarkTimestamp;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// A marker mapping.
pub type Marks = BTreeMap<String, MarkTimestamp>;

/// Result of an advance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advance {
    /// Marks after the merge.
    pub marks: Marks,
    /// Whether anything was written.
    pub changed: bool,
}

/// Typed access to one marker parameter.
#[derive(Debug, Clone)]
pub struct MarkStore {
    store: Arc<dyn ParameterStore>,
    name: String,
}

impl MarkStore {
    /// Creates a mark store over a parameter.
    #[must_use]
    pub fn new(store: Arc<dyn ParameterStore>, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
        }
    }

    /// Returns the parameter name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reads the marks. A missing parameter reads as no marks.
    ///
    /// Services recorded as `"0"` or `""` (the bootstrap placeholder) are
    /// treated as having no mark.
    pub async fn load(&self) -> Result<Marks, ParameterError> {
        let Some(raw) = self.store.get(&self.name).await? else {
            debug!(parameter = %self.name, "Marker parameter absent, no marks");
            return Ok(Marks::new());
        };
        self.parse(&raw)
    }

    fn parse(&self, raw: &str) -> Result<Marks, ParameterError> {
        let entries: BTreeMap<String, String> =
            serde_json::from_str(raw).map_err(|e| ParameterError::Malformed {
                name: self.name.clone(),
                reason: e.to_string(),
            })?;

        entries
            .into_iter()
            .filter(|(_, value)| !value.is_empty() && value != "0")
            .map(|(service, value)| {
                value
                    .parse::<MarkTimestamp>()
                    .map(|ts| (service, ts))
                    .map_err(|e| ParameterError::Malformed {
                        name: self.name.clone(),
                        reason: e.to_string(),
                    })
            })
            .collect()
    }

    /// Overwrites the parameter with `marks`.
    pub async fn store(&self, marks: &Marks) -> Result<(), ParameterError> {
        let value = serde_json::to_string(marks).map_err(|e| ParameterError::Malformed {
            name: self.name.clone(),
            reason: e.to_string(),
        })?;
        self.store.put_overwrite(&self.name, &value).await
    }

    /// Merges `updates` into the current marks, keeping each service's
    /// maximum, and writes the result if it differs from what was read.
    pub async fn advance(&self, updates: &Marks) -> Result<Advance, ParameterError> {
        let current = self.load().await?;
        let mut merged = current.clone();
        for (service, ts) in updates {
            merged
                .entry(service.clone())
                .and_modify(|existing| {
                    if ts > existing {
                        existing.clone_from(ts);
                    }
                })
                .or_insert_with(|| ts.clone());
        }

        let changed = merged != current;
        if changed {
            self.store(&merged).await?;
            info!(parameter = %self.name, marks = ?merged, "Marks advanced");
        } else {
            debug!(parameter = %self.name, "Marks unchanged, nothing written");
        }
        Ok(Advance {
            marks: merged,
            changed,
        })
    }

    /// Creates the parameter as an empty mapping if it does not exist.
    ///
    /// Returns true if it was created.
    pub async fn bootstrap(&self) -> Result<bool, ParameterError> {
        if self.store.get(&self.name).await?.is_some() {
            info!(parameter = %self.name, "Marker parameter exists, leaving it untouched");
            return Ok(false);
        }
        self.store.put_overwrite(&self.name, "{}").await?;
        info!(parameter = %self.name, "Marker parameter created");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::InMemoryParameterStore;
    use pretty_assertions::assert_eq;

    fn ts(s: &str) -> MarkTimestamp {
        s.parse().unwrap()
    }

    fn marks(pairs: &[(&str, &str)]) -> Marks {
        pairs.iter().map(|(k, v)| ((*k).to_string(), ts(v))).collect()
    }

    fn setup() -> (Arc<InMemoryParameterStore>, MarkStore) {
        let params = Arc::new(InMemoryParameterStore::new());
        let store = MarkStore::new(params.clone(), "/hwm");
        (params, store)
    }

    #[tokio::test]
    async fn test_missing_parameter_is_empty() {
        let (_, store) = setup();
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_placeholder_values_are_ignored() {
        let (params, store) = setup();
        params.seed("/hwm", r#"{"rad": "0", "clm": "202401010000"}"#);
        assert_eq!(store.load().await.unwrap(), marks(&[("clm", "202401010000")]));
    }

    #[tokio::test]
    async fn test_malformed_value() {
        let (params, store) = setup();
        params.seed("/hwm", r#"{"rad": "yesterday"}"#);
        assert!(matches!(
            store.load().await,
            Err(ParameterError::Malformed { .. })
        ));
        params.seed("/hwm", "not json");
        assert!(store.load().await.is_err());
    }

    #[tokio::test]
    async fn test_advance_keeps_maximum() {
        let (params, store) = setup();
        params.seed("/hwm", r#"{"rad": "202401010020"}"#);

        let advance = store
            .advance(&marks(&[("rad", "202401010010"), ("clm", "202401010010")]))
            .await
            .unwrap();

        assert!(advance.changed);
        assert_eq!(
            advance.marks,
            marks(&[("rad", "202401010020"), ("clm", "202401010010")])
        );
    }

    #[tokio::test]
    async fn test_advance_without_change_does_not_write() {
        let (params, store) = setup();
        params.seed("/hwm", r#"{"rad": "202401010020"}"#);

        let advance = store
            .advance(&marks(&[("rad", "202401010020")]))
            .await
            .unwrap();

        assert!(!advance.changed);
        assert_eq!(params.write_count("/hwm"), 0);
    }

    #[tokio::test]
    async fn test_bootstrap_never_overwrites() {
        let (params, store) = setup();
        assert!(store.bootstrap().await.unwrap());
        assert_eq!(params.value("/hwm").as_deref(), Some("{}"));

        params.seed("/hwm", r#"{"rad": "202401010020"}"#);
        assert!(!store.bootstrap().await.unwrap());
        assert_eq!(params.value("/hwm").as_deref(), Some(r#"{"rad": "202401010020"}"#));
    }
}
