// src/snapshot.rs
//
// Typed detection metadata as it arrives in a `frame_data` message.
//
// Every field is optional: absence means "not reported for this frame".
// Box shapes are checked at parse time, so a payload with a malformed box
// is rejected as a whole instead of being drawn half-right.

use crate::types::Size;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// BOXES
// ============================================================================

/// Two-corner box `[x1, y1, x2, y2]` in source-frame pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct CornerBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl From<[f64; 4]> for CornerBox {
    fn from([x1, y1, x2, y2]: [f64; 4]) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

impl From<CornerBox> for [f64; 4] {
    fn from(b: CornerBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

impl CornerBox {
    pub fn to_sized(self) -> SizedBox {
        SizedBox {
            x: self.x1,
            y: self.y1,
            w: self.x2 - self.x1,
            h: self.y2 - self.y1,
        }
    }
}

/// Position + size box `[x, y, w, h]` in source-frame pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct SizedBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl From<[f64; 4]> for SizedBox {
    fn from([x, y, w, h]: [f64; 4]) -> Self {
        Self { x, y, w, h }
    }
}

impl From<SizedBox> for [f64; 4] {
    fn from(b: SizedBox) -> Self {
        [b.x, b.y, b.w, b.h]
    }
}

// ============================================================================
// OBJECTS
// ============================================================================

/// Tracker identifier. The backend sends integers (`-1` when the tracker has
/// not assigned one yet) but string ids are accepted as well.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "RawObjectId")]
pub struct ObjectId(pub String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawObjectId {
    Int(i64),
    Text(String),
}

impl From<RawObjectId> for ObjectId {
    fn from(raw: RawObjectId) -> Self {
        match raw {
            RawObjectId::Int(n) => ObjectId(n.to_string()),
            RawObjectId::Text(s) => ObjectId(s),
        }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedObject {
    pub bbox: CornerBox,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub id: Option<ObjectId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleState {
    #[serde(default)]
    pub crossed: bool,
    #[serde(default)]
    pub crossed_on_red: bool,
}

// ============================================================================
// SNAPSHOT
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSnapshot {
    pub vehicles: Option<Vec<TrackedObject>>,
    pub traffic_lights: Option<Vec<TrackedObject>>,
    pub crosswalk_bbox: Option<SizedBox>,
    pub total_crossings: Option<u64>,
    pub red_light_violations: Option<u64>,
    pub frame_width: Option<u32>,
    pub frame_height: Option<u32>,
    pub vehicle_states: Option<BTreeMap<String, VehicleState>>,
    pub output_path: Option<String>,
}

impl DetectionSnapshot {
    /// Dimensions the boxes are expressed in. Each axis falls back to the
    /// displayed image's natural size when unreported (or reported as 0).
    pub fn source_size(&self, natural: Size) -> Size {
        let pick = |reported: Option<u32>, fallback: u32| match reported {
            Some(v) if v > 0 => v,
            _ => fallback,
        };
        Size::new(
            pick(self.frame_width, natural.width),
            pick(self.frame_height, natural.height),
        )
    }

    pub fn red_light_violators(&self) -> Vec<String> {
        self.vehicle_states
            .iter()
            .flatten()
            .filter(|(_, state)| state.crossed_on_red)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn recording_handle(&self) -> Option<RecordingHandle> {
        self.output_path
            .as_deref()
            .and_then(RecordingHandle::from_output_path)
    }
}

/// Filename of the recording the backend writes for a session. The only way
/// to build a download request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingHandle(String);

impl RecordingHandle {
    /// Last path segment, accepting both `/` and `\` separators.
    pub fn from_output_path(path: &str) -> Option<Self> {
        path.rsplit(|c| c == '/' || c == '\\')
            .next()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| RecordingHandle(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordingHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Session-wide vehicle state. Entries are added or updated, never removed,
/// so a vehicle that once ran the light stays flagged even if a later
/// message omits it.
#[derive(Debug, Clone, Default)]
pub struct VehicleLedger {
    states: BTreeMap<String, VehicleState>,
}

impl VehicleLedger {
    pub fn merge(&mut self, states: &BTreeMap<String, VehicleState>) {
        for (id, state) in states {
            let entry = self.states.entry(id.clone()).or_default();
            // crossing is a one-way event
            entry.crossed |= state.crossed;
            entry.crossed_on_red |= state.crossed_on_red;
        }
    }

    pub fn red_light_violators(&self) -> Vec<String> {
        self.states
            .iter()
            .filter(|(_, s)| s.crossed_on_red)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn crossed_count(&self) -> usize {
        self.states.values().filter(|s| s.crossed).count()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }
}

#[cfg(test)]
impl VehicleLedger {
    pub fn get(&self, id: &str) -> Option<&VehicleState> {
        self.states.get(id)
    }
}
