//! Per-floor rendering of a resolved state map.

use floorcast_types::{format_state, EntityValue, Registry, StateMap};

/// One floor's worth of rendered entity states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloorSummary {
    /// Floor display name.
    pub floor: String,
    /// `"<entity name>: <state>[ <unit>]"` lines, sorted by entity id.
    pub lines: Vec<String>,
}

/// Group the states in `state` by floor, in floor display order.
///
/// Entities without a state in `state` are left out. Floors with nothing
/// to show are skipped.
pub fn summarize(registry: &Registry, state: &StateMap) -> Vec<FloorSummary> {
    registry
        .floors_by_level()
        .into_iter()
        .filter_map(|floor| {
            let lines: Vec<String> = registry
                .entities_on_floor(&floor.id)
                .filter_map(|entity| {
                    state
                        .get(&entity.id)
                        .map(|value| render(&entity.display_name, value))
                })
                .collect();
            (!lines.is_empty()).then(|| FloorSummary {
                floor: floor.display_name.clone(),
                lines,
            })
        })
        .collect()
}

fn render(name: &str, value: &EntityValue) -> String {
    let state = format_state(value.value.as_deref());
    match value.unit.as_deref() {
        Some(unit) if value.value.is_some() => format!("{name}: {state} {unit}"),
        _ => format!("{name}: {state}"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use floorcast_types::{Area, AreaId, Entity, EntityId, Floor, FloorId};

    use super::*;

    fn registry() -> Registry {
        let mut registry = Registry::default();
        for (id, name, level) in [("up", "Upstairs", 1), ("ground", "Ground", 0)] {
            registry.floors.insert(
                FloorId::new(id),
                Floor {
                    id: FloorId::new(id),
                    display_name: name.to_owned(),
                    level: Some(level),
                },
            );
            registry.areas.insert(
                AreaId::new(id),
                Area {
                    id: AreaId::new(id),
                    display_name: name.to_owned(),
                    floor_id: Some(FloorId::new(id)),
                },
            );
        }
        for (id, name, area) in [
            ("sensor.temp", "Temperature", "ground"),
            ("light.hall", "Hall light", "ground"),
            ("light.bed", "Bedroom light", "up"),
        ] {
            registry.entities.insert(
                EntityId::new(id),
                Entity {
                    id: EntityId::new(id),
                    entity_category: None,
                    domain: id.split('.').next().unwrap().to_owned(),
                    display_name: name.to_owned(),
                    device_id: None,
                    area_id: Some(AreaId::new(area)),
                },
            );
        }
        registry
    }

    #[test]
    fn groups_by_floor_in_level_order() {
        let mut state = StateMap::new();
        state.insert(
            EntityId::new("sensor.temp"),
            EntityValue::new(Some("21.500"), Some("°C")),
        );
        state.insert(EntityId::new("light.hall"), EntityValue::new(Some("on"), None));
        state.insert(EntityId::new("light.bed"), EntityValue::new(None, None));

        let floors = summarize(&registry(), &state);
        assert_eq!(floors.len(), 2);
        assert_eq!(floors[0].floor, "Ground");
        assert_eq!(
            floors[0].lines,
            vec!["Hall light: on".to_owned(), "Temperature: 21.5 °C".to_owned()]
        );
        assert_eq!(floors[1].floor, "Upstairs");
        assert_eq!(floors[1].lines, vec!["Bedroom light: unknown".to_owned()]);
    }

    #[test]
    fn floors_without_states_are_skipped() {
        let mut state = StateMap::new();
        state.insert(EntityId::new("light.bed"), EntityValue::new(Some("off"), None));

        let floors = summarize(&registry(), &state);
        assert_eq!(floors.len(), 1);
        assert_eq!(floors[0].floor, "Upstairs");
    }
}
