//! Vehicle kind definitions.

use serde::{Deserialize, Serialize};

use crate::agent::VehicleParams;

/// Definition of one vehicle kind.
///
/// # Example RON
/// ```ron
/// VehicleDef(
///     id: "carriage",
///     name_key: "vehicle.carriage.name",
///     speed: 1.4,
///     load_duration: 2.0,
///     step_sound_period: 0.45,
///     draft_animals: [1.1, 1.9],
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleDef {
    /// Unique string identifier for this vehicle kind.
    pub id: String,
    /// Localization key for the display name.
    pub name_key: String,
    /// Travel speed in world units per second.
    pub speed: f64,
    /// Seconds spent stopped at a target before the exchange happens.
    pub load_duration: f64,
    /// Seconds between step sounds while moving.
    pub step_sound_period: f64,
    /// Draft animal offsets along the heading, in world units ahead of
    /// the vehicle. Empty for self-propelled vehicles.
    #[serde(default)]
    pub draft_animals: Vec<f64>,
}

impl VehicleDef {
    /// Creates a vehicle definition with no draft animals.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name_key: impl Into<String>,
        speed: f64,
        load_duration: f64,
        step_sound_period: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name_key: name_key.into(),
            speed,
            load_duration,
            step_sound_period,
            draft_animals: Vec::new(),
        }
    }

    /// Sets the draft animal offsets.
    #[must_use]
    pub fn with_draft_animals(mut self, offsets: Vec<f64>) -> Self {
        self.draft_animals = offsets;
        self
    }

    /// The runtime movement parameters of this vehicle kind.
    #[must_use]
    pub fn params(&self) -> VehicleParams {
        VehicleParams::new(self.speed, self.load_duration, self.step_sound_period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vehicle_def_from_ron() {
        let def: VehicleDef = ron::from_str(
            r#"VehicleDef(
                id: "carriage",
                name_key: "vehicle.carriage.name",
                speed: 1.4,
                load_duration: 2.0,
                step_sound_period: 0.45,
                draft_animals: [1.1, 1.9],
            )"#,
        )
        .unwrap();

        assert_eq!(def.id, "carriage");
        assert_eq!(def.draft_animals, vec![1.1, 1.9]);
        assert!((def.params().speed - 1.4).abs() < f64::EPSILON);
    }

    #[test]
    fn test_draft_animals_default_to_none() {
        let def: VehicleDef = ron::from_str(
            r#"VehicleDef(
                id: "train",
                name_key: "vehicle.train.name",
                speed: 8.0,
                load_duration: 6.0,
                step_sound_period: 0.3,
            )"#,
        )
        .unwrap();

        assert!(def.draft_animals.is_empty());
    }
}
