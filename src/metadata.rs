//! The external metadata store seam.
//!
//! The gateway persists the inferred `Cn -> field` mapping (and a
//! needs-configuration flag when inference fails) so that a dashboard
//! backed by the same store can show operators what each column means
//! without replaying upstream traffic. Persistence is always best-effort:
//! a slow or failing store must never stall frame decoding.

use async_trait::async_trait;

use crate::ids::CircuitId;
use crate::session::Mapping;

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("metadata store write failed: {0}")]
    Write(String),
}

#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn write_mapping(&self, circuit_id: &CircuitId, mapping: &Mapping) -> Result<(), MetadataError>;

    async fn write_needs_configuration(&self, circuit_id: &CircuitId) -> Result<(), MetadataError>;
}

/// Expands a sparse `Cn -> field` mapping into the full `c1..c14` object the
/// downstream consumer expects, with `null` standing in for any column that
/// has never been assigned a field.
pub fn mapping_to_wire(mapping: &Mapping) -> serde_json::Value {
    let mut object = serde_json::Map::with_capacity(14);
    for n in crate::ids::ColumnIndex::MIN..=crate::ids::ColumnIndex::MAX {
        let key = format!("c{n}");
        let index = crate::ids::ColumnIndex::try_from(n as u32).expect("n is within range by construction");
        let value = mapping
            .get(&index)
            .map(|field| serde_json::Value::String(field.clone()))
            .unwrap_or(serde_json::Value::Null);
        object.insert(key, value);
    }
    serde_json::Value::Object(object)
}

/// Logs instead of persisting; used when no real metadata store is wired
/// up (local runs, tests).
#[derive(Debug, Default)]
pub struct LoggingMetadataStore;

#[async_trait]
impl MetadataStore for LoggingMetadataStore {
    async fn write_mapping(&self, circuit_id: &CircuitId, mapping: &Mapping) -> Result<(), MetadataError> {
        tracing::info!(circuit = %circuit_id.as_str(), mapping = ?mapping, "mapping inferred");
        Ok(())
    }

    async fn write_needs_configuration(&self, circuit_id: &CircuitId) -> Result<(), MetadataError> {
        tracing::warn!(circuit = %circuit_id.as_str(), "inference failed, circuit needs manual configuration");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::convert::TryFrom;

    #[test]
    fn wire_mapping_has_all_fourteen_slots() {
        let mut mapping = BTreeMap::new();
        mapping.insert(
            crate::ids::ColumnIndex::try_from(1u32).unwrap(),
            "Position".to_string(),
        );
        let wire = mapping_to_wire(&mapping);
        let object = wire.as_object().unwrap();
        assert_eq!(object.len(), 14);
        assert_eq!(object["c1"], "Position");
        assert!(object["c2"].is_null());
        assert!(object["c14"].is_null());
    }

    #[tokio::test]
    async fn logging_store_never_errors() {
        let store = LoggingMetadataStore;
        let circuit = CircuitId::new("spa");
        assert!(store.write_mapping(&circuit, &BTreeMap::new()).await.is_ok());
        assert!(store.write_needs_configuration(&circuit).await.is_ok());
    }
}
