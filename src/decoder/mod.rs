//! Component B: the streaming decoder.
//!
//! `decode` never fails in the `Result` sense — a frame that is neither a
//! well-formed snapshot nor contains any well-formed delta line simply
//! produces an empty, `NotApplicable` outcome. Malformed input is a no-op,
//! not an error.

mod delta;
mod snapshot;

use std::collections::BTreeMap;
use std::convert::TryFrom;

use fnv::FnvHashMap;

use crate::ids::{ColumnIndex, DriverId};
use crate::lexicon;
use crate::session::{CellValue, Mapping};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Snapshot,
    Delta,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingStatus {
    InferredOk,
    InferenceFailed,
    NotApplicable,
}

/// The minimum number of header columns that must produce a field mapping
/// (lexicon hit, the empty-string-to-`Status` rule, or a verbatim fallback)
/// for inference to be considered successful.
const MIN_MAPPED_COLUMNS: usize = 3;

#[derive(Debug, Default)]
pub struct DecodedFrame {
    pub kind: Option<FrameKind>,
    pub driver_updates: FnvHashMap<DriverId, FnvHashMap<ColumnIndex, CellValue>>,
    pub inferred_mapping: Option<Mapping>,
    pub mapping_status: MappingStatus,
}

impl Default for MappingStatus {
    fn default() -> Self {
        MappingStatus::NotApplicable
    }
}

/// Decode one upstream message (one frame) into driver-column updates and,
/// for snapshots, an inferred `Cn -> field` mapping.
pub fn decode(frame: &str) -> DecodedFrame {
    if is_snapshot(frame) {
        decode_snapshot(frame)
    } else {
        decode_delta(frame)
    }
}

/// A frame is a snapshot if it contains the literal `init` marker or carries
/// a `grid||`-prefixed line. Both predicates are accepted: older deployments
/// of the upstream feed tested only for `grid||`, newer ones test for
/// `init`, and neither should regress under a single target.
fn is_snapshot(frame: &str) -> bool {
    frame.contains("init") || frame.lines().any(|line| line.starts_with("grid||"))
}

fn decode_delta(frame: &str) -> DecodedFrame {
    let mut driver_updates: FnvHashMap<DriverId, FnvHashMap<ColumnIndex, CellValue>> =
        FnvHashMap::default();

    for line in frame.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        if let Some(record) = delta::parse_line(line) {
            driver_updates
                .entry(DriverId::new(record.driver_id))
                .or_default()
                .insert(
                    record.column,
                    CellValue {
                        code: record.code,
                        value: record.value,
                    },
                );
        }
    }

    DecodedFrame {
        kind: Some(FrameKind::Delta),
        driver_updates,
        inferred_mapping: None,
        mapping_status: MappingStatus::NotApplicable,
    }
}

fn decode_snapshot(frame: &str) -> DecodedFrame {
    let rows = snapshot::rows(frame);
    let Some(header_row) = rows.iter().find(|r| r.row_id == "0") else {
        tracing::debug!("snapshot frame carried no header row; treating as no-op");
        return DecodedFrame {
            kind: Some(FrameKind::Snapshot),
            driver_updates: FnvHashMap::default(),
            inferred_mapping: None,
            mapping_status: MappingStatus::NotApplicable,
        };
    };

    let mut mapping: Mapping = BTreeMap::new();
    for (position, cell) in header_row.cells.iter().enumerate() {
        let index = cell
            .explicit_index
            .and_then(|n| ColumnIndex::try_from(n).ok())
            .or_else(|| ColumnIndex::try_from((position + 1) as u32).ok());
        if let Some(index) = index {
            mapping.insert(index, lexicon::classify(cell.text));
        }
    }

    let mapping_status = if mapping.len() >= MIN_MAPPED_COLUMNS {
        MappingStatus::InferredOk
    } else {
        MappingStatus::InferenceFailed
    };

    let mut driver_updates: FnvHashMap<DriverId, FnvHashMap<ColumnIndex, CellValue>> =
        FnvHashMap::default();

    for row in rows.iter().filter(|r| r.row_id != "0") {
        let mut columns: FnvHashMap<ColumnIndex, CellValue> = FnvHashMap::default();
        for (position, cell) in row.cells.iter().enumerate() {
            if cell.text.is_empty() {
                continue;
            }
            if let Ok(index) = ColumnIndex::try_from((position + 1) as u32) {
                columns.insert(
                    index,
                    CellValue {
                        code: "HTML".to_string(),
                        value: cell.text.to_string(),
                    },
                );
            }
        }
        driver_updates.insert(DriverId::new(row.row_id.to_string()), columns);
    }

    DecodedFrame {
        kind: Some(FrameKind::Snapshot),
        driver_updates,
        inferred_mapping: if mapping_status == MappingStatus::InferredOk {
            Some(mapping)
        } else {
            None
        },
        mapping_status,
    }
}
