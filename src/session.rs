//! Component C: per-circuit session state.
//!
//! Holds the active `Cn -> field` mapping, the raw per-driver column table,
//! the derived driver records, the column display order, and the latest
//! broadcast cache. Raw upstream data is kept separately from anything
//! derived from it, so a later mapping change can rederive every known
//! driver without needing to see its raw cells again.

use std::collections::BTreeMap;

use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};

use crate::decoder::{DecodedFrame, MappingStatus};
use crate::ids::{ColumnIndex, DriverId};

/// The active `Cn -> field` association for a circuit, ordered by `Cn`.
pub type Mapping = BTreeMap<ColumnIndex, String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellValue {
    pub code: String,
    pub value: String,
}

pub type RawTable = FnvHashMap<ColumnIndex, CellValue>;

/// A derived, consumer-facing projection of one driver's raw column table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriverRecord {
    pub fields: FnvHashMap<String, String>,
}

/// What the session state wants written to the external metadata store,
/// after applying one frame. Best-effort: the caller must not block frame
/// processing on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceDirective {
    PersistMapping(Mapping),
    PersistNeedsConfig,
    None,
}

/// The result of [`SessionState::apply`].
#[derive(Debug)]
pub struct ApplyOutcome {
    pub affected: Vec<DriverId>,
    pub records: FnvHashMap<DriverId, DriverRecord>,
    pub column_order: Vec<String>,
    pub persistence: PersistenceDirective,
    pub message_count: u64,
}

/// A serializable snapshot of session state, used by `export_session` /
/// `import_session` on the control surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub mapping: Mapping,
    pub raw: FnvHashMap<DriverId, RawTable>,
    pub message_count: u64,
}

#[derive(Debug, Default)]
pub struct SessionState {
    mapping: Mapping,
    raw: FnvHashMap<DriverId, RawTable>,
    records: FnvHashMap<DriverId, DriverRecord>,
    column_order: Vec<String>,
    message_count: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one decoded frame into raw state, replacing and rederiving the
    /// mapping when the frame carries one.
    pub fn apply(&mut self, frame: DecodedFrame) -> ApplyOutcome {
        self.message_count += 1;

        let mut affected: Vec<DriverId> = Vec::with_capacity(frame.driver_updates.len());
        for (driver_id, columns) in frame.driver_updates {
            let entry = self.raw.entry(driver_id.clone()).or_default();
            for (column, value) in columns {
                entry.insert(column, value);
            }
            affected.push(driver_id);
        }

        let persistence = match (frame.mapping_status, frame.inferred_mapping) {
            (MappingStatus::InferredOk, Some(mapping)) => {
                self.set_mapping(mapping.clone());
                // set_mapping rederives every known driver, not just those
                // touched by this frame.
                affected = self.raw.keys().cloned().collect();
                PersistenceDirective::PersistMapping(mapping)
            }
            (MappingStatus::InferenceFailed, _) => {
                self.rederive(&affected);
                PersistenceDirective::PersistNeedsConfig
            }
            _ => {
                self.rederive(&affected);
                PersistenceDirective::None
            }
        };

        let records = affected
            .iter()
            .filter_map(|id| self.records.get(id).map(|r| (id.clone(), r.clone())))
            .collect();

        ApplyOutcome {
            affected,
            records,
            column_order: self.column_order.clone(),
            persistence,
            message_count: self.message_count,
        }
    }

    /// Externally override the active mapping (e.g. loaded by the control
    /// layer from the metadata store before the first snapshot arrives).
    pub fn set_mapping(&mut self, mapping: Mapping) {
        self.mapping = mapping;
        self.column_order = self.mapping.values().cloned().collect();
        let ids: Vec<DriverId> = self.raw.keys().cloned().collect();
        self.rederive(&ids);
    }

    fn rederive(&mut self, driver_ids: &[DriverId]) {
        for id in driver_ids {
            let Some(raw) = self.raw.get(id) else { continue };
            let mut fields = FnvHashMap::default();
            for (column, cell) in raw {
                if let Some(field) = self.mapping.get(column) {
                    fields.insert(field.clone(), cell.value.clone());
                }
            }
            self.records.insert(id.clone(), DriverRecord { fields });
        }
    }

    pub fn project(&self, driver_id: &DriverId) -> Option<DriverRecord> {
        self.records.get(driver_id).cloned()
    }

    pub fn project_all(&self) -> FnvHashMap<DriverId, DriverRecord> {
        self.records.clone()
    }

    pub fn column_order(&self) -> &[String] {
        &self.column_order
    }

    pub fn message_count(&self) -> u64 {
        self.message_count
    }

    /// Empties raw table and derived records; preserves the active mapping.
    pub fn clear(&mut self) {
        self.raw.clear();
        self.records.clear();
    }

    pub fn export(&self) -> SessionSnapshot {
        SessionSnapshot {
            mapping: self.mapping.clone(),
            raw: self.raw.clone(),
            message_count: self.message_count,
        }
    }

    pub fn import(&mut self, snapshot: SessionSnapshot) {
        self.mapping = snapshot.mapping;
        self.raw = snapshot.raw;
        self.message_count = snapshot.message_count;
        self.column_order = self.mapping.values().cloned().collect();
        let ids: Vec<DriverId> = self.raw.keys().cloned().collect();
        self.rederive(&ids);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::decode;

    #[test]
    fn apply_snapshot_then_delta() {
        let mut state = SessionState::new();
        let snapshot = r#"grid||<tbody><tr data-id="r0"><td data-id="c1">Clt</td><td data-id="c2">Pilote</td><td data-id="c3">Kart</td><td data-id="c4">Dernier T.</td></tr><tr data-id="r141"><td>1</td><td>Jean</td><td>25</td><td>58.312</td></tr></tbody>"#;
        let outcome = state.apply(decode(snapshot));
        assert!(matches!(
            outcome.persistence,
            PersistenceDirective::PersistMapping(_)
        ));

        let record = state.project(&DriverId::new("141")).unwrap();
        assert_eq!(record.fields["Position"], "1");
        assert_eq!(record.fields["Driver"], "Jean");
        assert_eq!(record.fields["LastLap"], "58.312");

        let delta_outcome = state.apply(decode("r141c4|tn|57.998\nr141c1|rk|2"));
        assert_eq!(delta_outcome.persistence, PersistenceDirective::None);

        let record = state.project(&DriverId::new("141")).unwrap();
        assert_eq!(record.fields["LastLap"], "57.998");
        assert_eq!(record.fields["Position"], "2");
        assert_eq!(record.fields["Driver"], "Jean");
    }

    #[test]
    fn inference_failure_requests_needs_configuration() {
        let mut state = SessionState::new();
        let frame = r#"grid||<tbody><tr data-id="r0"><td data-id="c1">Foo</td><td data-id="c2">Bar</td></tr></tbody>"#;
        let outcome = state.apply(decode(frame));
        assert_eq!(outcome.persistence, PersistenceDirective::PersistNeedsConfig);
    }

    #[test]
    fn mapping_change_rederives_every_known_driver_not_only_this_frames() {
        let mut state = SessionState::new();
        state.apply(decode("r1c1|tn|10\nr2c1|tn|20"));
        state.set_mapping(BTreeMap::from([(
            ColumnIndex::try_from(1u32).unwrap(),
            "Position".to_string(),
        )]));
        assert_eq!(state.project(&DriverId::new("1")).unwrap().fields["Position"], "10");
        assert_eq!(state.project(&DriverId::new("2")).unwrap().fields["Position"], "20");
    }

    #[test]
    fn set_mapping_overrides_inferred_mapping() {
        let mut state = SessionState::new();
        let frame = r#"grid||<tbody><tr data-id="r0"><td data-id="c1">Clt</td><td data-id="c2">Pilote</td><td data-id="c3">Kart</td></tr><tr data-id="r1"><td>1</td><td>Jean</td><td>25</td></tr></tbody>"#;
        state.apply(decode(frame));
        state.set_mapping(BTreeMap::from([(
            ColumnIndex::try_from(1u32).unwrap(),
            "Custom".to_string(),
        )]));
        let record = state.project(&DriverId::new("1")).unwrap();
        assert!(record.fields.contains_key("Custom"));
        assert!(!record.fields.contains_key("Position"));
    }

    #[test]
    fn export_import_round_trips() {
        let mut state = SessionState::new();
        state.apply(decode("r1c1|tn|10"));
        state.set_mapping(BTreeMap::from([(
            ColumnIndex::try_from(1u32).unwrap(),
            "Position".to_string(),
        )]));
        let snapshot = state.export();

        let mut restored = SessionState::new();
        restored.import(snapshot);

        assert_eq!(restored.column_order(), state.column_order());
        assert_eq!(
            restored.project(&DriverId::new("1")).unwrap().fields,
            state.project(&DriverId::new("1")).unwrap().fields
        );
    }

    #[test]
    fn clear_preserves_mapping() {
        let mut state = SessionState::new();
        state.set_mapping(BTreeMap::from([(
            ColumnIndex::try_from(1u32).unwrap(),
            "Position".to_string(),
        )]));
        state.apply(decode("r1c1|tn|10"));
        state.clear();
        assert!(state.project(&DriverId::new("1")).is_none());
        assert_eq!(state.column_order(), &["Position".to_string()]);
    }

    #[test]
    fn idempotent_delta_reapplication_yields_identical_state() {
        let mut state = SessionState::new();
        state.set_mapping(BTreeMap::from([(
            ColumnIndex::try_from(1u32).unwrap(),
            "Position".to_string(),
        )]));
        state.apply(decode("r1c1|tn|10"));
        let first = state.project(&DriverId::new("1")).unwrap().fields;
        state.apply(decode("r1c1|tn|10"));
        let second = state.project(&DriverId::new("1")).unwrap().fields;
        assert_eq!(first, second);
    }
}
