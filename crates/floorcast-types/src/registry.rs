//! Registry topology: floors, areas, devices and entities.
//!
//! The registry is owned upstream and arrives whole over the live stream.
//! The timeline core only needs it as the set of known entities; the
//! projection helpers here back the dashboard's per-floor grouping.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::{AreaId, DeviceId, EntityId, FloorId};

/// A monitored entity as described by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Entity {
    /// Entity key.
    pub id: EntityId,
    /// Upstream category (`config`, `diagnostic`), if any.
    #[serde(default)]
    pub entity_category: Option<String>,
    /// Integration domain, the prefix of the entity key (`light`, `sensor`).
    pub domain: String,
    /// Human-readable name.
    pub display_name: String,
    /// Owning device, if the entity belongs to one.
    #[serde(default)]
    pub device_id: Option<DeviceId>,
    /// Area the entity is directly assigned to, overriding its device's.
    #[serde(default)]
    pub area_id: Option<AreaId>,
}

/// A physical device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Device {
    /// Device key.
    pub id: DeviceId,
    /// Area the device is installed in.
    #[serde(default)]
    pub area_id: Option<AreaId>,
    /// Human-readable name.
    pub display_name: String,
}

/// A room or zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Area {
    /// Area key.
    pub id: AreaId,
    /// Human-readable name.
    pub display_name: String,
    /// Floor the area is on.
    #[serde(default)]
    pub floor_id: Option<FloorId>,
}

/// A floor of the building.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Floor {
    /// Floor key.
    pub id: FloorId,
    /// Human-readable name.
    pub display_name: String,
    /// Vertical order (0 = ground), if configured.
    #[serde(default)]
    pub level: Option<i32>,
}

/// Full topology snapshot. A newly received registry replaces the old one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Registry {
    /// Entities keyed by id.
    #[serde(default)]
    pub entities: BTreeMap<EntityId, Entity>,
    /// Devices keyed by id.
    #[serde(default)]
    pub devices: BTreeMap<DeviceId, Device>,
    /// Areas keyed by id.
    #[serde(default)]
    pub areas: BTreeMap<AreaId, Area>,
    /// Floors keyed by id.
    #[serde(default)]
    pub floors: BTreeMap<FloorId, Floor>,
}

impl Registry {
    /// Floors in display order: by level (unset counts as 0), then by id.
    pub fn floors_by_level(&self) -> Vec<&Floor> {
        let mut floors: Vec<&Floor> = self.floors.values().collect();
        floors.sort_by(|a, b| {
            a.level
                .unwrap_or(0)
                .cmp(&b.level.unwrap_or(0))
                .then_with(|| a.id.cmp(&b.id))
        });
        floors
    }

    /// The area an entity effectively lives in: its own assignment if set,
    /// otherwise its device's.
    pub fn effective_area<'a>(&'a self, entity: &'a Entity) -> Option<&'a AreaId> {
        entity.area_id.as_ref().or_else(|| {
            entity
                .device_id
                .as_ref()
                .and_then(|device_id| self.devices.get(device_id))
                .and_then(|device| device.area_id.as_ref())
        })
    }

    /// Entities whose effective area is on the given floor.
    pub fn entities_on_floor<'a>(&'a self, floor_id: &'a FloorId) -> impl Iterator<Item = &'a Entity> + 'a {
        self.entities.values().filter(move |entity| {
            self.effective_area(entity)
                .and_then(|area_id| self.areas.get(area_id))
                .and_then(|area| area.floor_id.as_ref())
                .is_some_and(|floor| floor == floor_id)
        })
    }
}

/// Render a state for display.
///
/// `None` becomes `"unknown"`. Numeric states are shown with at most three
/// decimals and trailing zeros trimmed (`"21.500"` → `"21.5"`). Anything
/// else is returned verbatim.
pub fn format_state(state: Option<&str>) -> String {
    let Some(state) = state else {
        return "unknown".to_owned();
    };
    match state.trim().parse::<f64>() {
        Ok(num) if num.is_finite() => {
            let fixed = format!("{num:.3}");
            let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
            if trimmed == "-0" {
                "0".to_owned()
            } else {
                trimmed.to_owned()
            }
        }
        _ => state.to_owned(),
    }
}
