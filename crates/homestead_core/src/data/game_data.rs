//! The aggregate game data set and its resolved registry.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::agent::VehicleParams;
use crate::complex::Conversion;
use crate::data::{BuildingDef, ConversionDef, ItemDef, VehicleDef};
use crate::error::{CoreError, Result};
use crate::items::{ItemCount, ItemId};

/// A complete game data set: item kinds, building types, and vehicle
/// kinds.
///
/// # Example RON
/// ```ron
/// GameData(
///     items: [
///         ItemDef(id: "wheat", name_key: "item.wheat.name"),
///     ],
///     buildings: [
///         BuildingDef(
///             id: "farm",
///             name_key: "building.farm.name",
///             footprint: (3, 3),
///             conversions: [
///                 ConversionDef(outputs: [(2, "wheat")], period: 30.0),
///             ],
///         ),
///     ],
///     vehicles: [
///         VehicleDef(
///             id: "carriage",
///             name_key: "vehicle.carriage.name",
///             speed: 1.4,
///             load_duration: 2.0,
///             step_sound_period: 0.45,
///             draft_animals: [1.1, 1.9],
///         ),
///     ],
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GameData {
    /// All item kind definitions. List position fixes the runtime id.
    #[serde(default)]
    pub items: Vec<ItemDef>,
    /// All building type definitions.
    #[serde(default)]
    pub buildings: Vec<BuildingDef>,
    /// All vehicle kind definitions.
    #[serde(default)]
    pub vehicles: Vec<VehicleDef>,
}

impl GameData {
    /// Parses a game data set from a RON document.
    ///
    /// # Errors
    /// Returns [`CoreError::DataError`] when the document does not parse.
    pub fn from_ron(source: &str) -> Result<Self> {
        ron::from_str(source)
            .map_err(|err| CoreError::DataError(format!("game data parse error: {err}")))
    }

    /// The built-in base game set used by tests and default scenarios.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            items: vec![
                ItemDef::new("wheat", "item.wheat.name"),
                ItemDef::new("flour", "item.flour.name"),
                ItemDef::new("log", "item.log.name"),
                ItemDef::new("plank", "item.plank.name"),
                ItemDef::new("ore", "item.ore.name"),
            ],
            buildings: vec![
                BuildingDef::new("farm", "building.farm.name")
                    .with_footprint(3, 3)
                    .with_conversion(ConversionDef::new(
                        vec![],
                        vec![(2, "wheat".to_string())],
                        30.0,
                    )),
                BuildingDef::new("mill", "building.mill.name")
                    .with_footprint(2, 2)
                    .with_conversion(ConversionDef::new(
                        vec![(2, "wheat".to_string())],
                        vec![(1, "flour".to_string())],
                        12.0,
                    )),
                BuildingDef::new("sawmill", "building.sawmill.name")
                    .with_footprint(2, 3)
                    .with_conversion(ConversionDef::new(
                        vec![(1, "log".to_string())],
                        vec![(2, "plank".to_string())],
                        10.0,
                    )),
                BuildingDef::new("mine", "building.mine.name")
                    .with_footprint(2, 2)
                    .with_conversion(ConversionDef::new(
                        vec![],
                        vec![(1, "ore".to_string())],
                        20.0,
                    )),
                BuildingDef::new("warehouse", "building.warehouse.name").with_footprint(4, 4),
            ],
            vehicles: vec![
                VehicleDef::new("carriage", "vehicle.carriage.name", 1.4, 2.0, 0.45)
                    .with_draft_animals(vec![1.1, 1.9]),
                VehicleDef::new("train", "vehicle.train.name", 8.0, 6.0, 0.3),
                VehicleDef::new("boat", "vehicle.boat.name", 3.0, 5.0, 1.6),
            ],
        }
    }

    /// Finds an item definition by string id.
    #[must_use]
    pub fn item(&self, id: &str) -> Option<&ItemDef> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Finds a building definition by string id.
    #[must_use]
    pub fn building(&self, id: &str) -> Option<&BuildingDef> {
        self.buildings.iter().find(|building| building.id == id)
    }

    /// Finds a vehicle definition by string id.
    #[must_use]
    pub fn vehicle(&self, id: &str) -> Option<&VehicleDef> {
        self.vehicles.iter().find(|vehicle| vehicle.id == id)
    }
}

/// A validated game data set with string references resolved into
/// runtime handles.
///
/// Item ids are assigned by position in the item list, so the same data
/// set yields the same handles on every run.
#[derive(Debug, Clone)]
pub struct DataRegistry {
    data: GameData,
    item_ids: HashMap<String, ItemId>,
}

impl DataRegistry {
    /// Builds a registry from a data set, validating every reference up
    /// front.
    ///
    /// # Errors
    /// Returns [`CoreError::DataError`] on duplicate ids, unknown item
    /// references in conversions, or non-positive conversion periods.
    pub fn new(data: GameData) -> Result<Self> {
        if data.items.len() > usize::from(u16::MAX) + 1 {
            return Err(CoreError::DataError(format!(
                "too many item kinds: {}",
                data.items.len()
            )));
        }

        let mut item_ids = HashMap::new();
        for (index, item) in data.items.iter().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            let id = ItemId::new(index as u16);
            if item_ids.insert(item.id.clone(), id).is_some() {
                return Err(CoreError::DataError(format!(
                    "duplicate item id {:?}",
                    item.id
                )));
            }
        }

        let registry = Self { data, item_ids };
        registry.validate()?;
        Ok(registry)
    }

    fn validate(&self) -> Result<()> {
        let mut seen_buildings = HashMap::new();
        for building in &self.data.buildings {
            if seen_buildings.insert(&building.id, ()).is_some() {
                return Err(CoreError::DataError(format!(
                    "duplicate building id {:?}",
                    building.id
                )));
            }
            for conversion in &building.conversions {
                if conversion.period <= 0.0 {
                    return Err(CoreError::DataError(format!(
                        "building {:?} has a non-positive conversion period",
                        building.id
                    )));
                }
                for (_, item) in conversion.inputs.iter().chain(&conversion.outputs) {
                    self.item_id(item)?;
                }
            }
        }

        let mut seen_vehicles = HashMap::new();
        for vehicle in &self.data.vehicles {
            if seen_vehicles.insert(&vehicle.id, ()).is_some() {
                return Err(CoreError::DataError(format!(
                    "duplicate vehicle id {:?}",
                    vehicle.id
                )));
            }
        }

        Ok(())
    }

    /// The runtime handle of an item by string id.
    ///
    /// # Errors
    /// Returns [`CoreError::DataError`] for an unknown id.
    pub fn item_id(&self, id: &str) -> Result<ItemId> {
        self.item_ids
            .get(id)
            .copied()
            .ok_or_else(|| CoreError::DataError(format!("unknown item id {id:?}")))
    }

    /// The definition behind an item handle, if the handle came from this
    /// registry.
    #[must_use]
    pub fn item_def(&self, id: ItemId) -> Option<&ItemDef> {
        self.data.items.get(usize::from(id.as_u16()))
    }

    /// A building definition by string id.
    ///
    /// # Errors
    /// Returns [`CoreError::DataError`] for an unknown id.
    pub fn building(&self, id: &str) -> Result<&BuildingDef> {
        self.data
            .building(id)
            .ok_or_else(|| CoreError::DataError(format!("unknown building id {id:?}")))
    }

    /// A vehicle definition by string id.
    ///
    /// # Errors
    /// Returns [`CoreError::DataError`] for an unknown id.
    pub fn vehicle(&self, id: &str) -> Result<&VehicleDef> {
        self.data
            .vehicle(id)
            .ok_or_else(|| CoreError::DataError(format!("unknown vehicle id {id:?}")))
    }

    /// The runtime movement parameters of a vehicle by string id.
    ///
    /// # Errors
    /// Returns [`CoreError::DataError`] for an unknown id.
    pub fn vehicle_params(&self, id: &str) -> Result<VehicleParams> {
        Ok(self.vehicle(id)?.params())
    }

    /// Resolves a building definition's recipes into runtime conversions.
    ///
    /// # Errors
    /// Returns [`CoreError::DataError`] for an unknown item reference.
    pub fn conversions_for(&self, building: &BuildingDef) -> Result<Vec<Conversion>> {
        building
            .conversions
            .iter()
            .map(|def| self.resolve_conversion(def))
            .collect()
    }

    fn resolve_conversion(&self, def: &ConversionDef) -> Result<Conversion> {
        if def.period <= 0.0 {
            return Err(CoreError::DataError(format!(
                "non-positive conversion period {}",
                def.period
            )));
        }
        let inputs = self.resolve_item_counts(&def.inputs)?;
        let outputs = self.resolve_item_counts(&def.outputs)?;
        Ok(Conversion::new(inputs, outputs, def.period))
    }

    fn resolve_item_counts(&self, counts: &[(u32, String)]) -> Result<Vec<ItemCount>> {
        counts
            .iter()
            .map(|(count, id)| Ok(ItemCount::new(*count, self.item_id(id)?)))
            .collect()
    }

    /// The underlying data set.
    #[must_use]
    pub fn data(&self) -> &GameData {
        &self.data
    }
}
