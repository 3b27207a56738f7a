//! Building type definitions.

use serde::{Deserialize, Serialize};

/// One conversion recipe of a building, with string item references.
///
/// A firing consumes every input and yields every output. Definitions
/// with no inputs describe pure producers such as farms and mines.
///
/// # Example RON
/// ```ron
/// ConversionDef(
///     inputs: [(2, "wheat")],
///     outputs: [(1, "flour")],
///     period: 12.0,
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionDef {
    /// Items consumed per firing, as `(count, item id)` pairs.
    #[serde(default)]
    pub inputs: Vec<(u32, String)>,
    /// Items produced per firing, as `(count, item id)` pairs.
    #[serde(default)]
    pub outputs: Vec<(u32, String)>,
    /// Seconds between firings.
    pub period: f64,
}

impl ConversionDef {
    /// Creates a conversion recipe.
    #[must_use]
    pub fn new(inputs: Vec<(u32, String)>, outputs: Vec<(u32, String)>, period: f64) -> Self {
        Self {
            inputs,
            outputs,
            period,
        }
    }

    /// Whether this recipe produces without consuming anything.
    #[must_use]
    pub fn is_producer(&self) -> bool {
        self.inputs.is_empty()
    }
}

/// Definition of one building type.
///
/// # Example RON
/// ```ron
/// BuildingDef(
///     id: "mill",
///     name_key: "building.mill.name",
///     footprint: (2, 2),
///     conversions: [
///         ConversionDef(
///             inputs: [(2, "wheat")],
///             outputs: [(1, "flour")],
///             period: 12.0,
///         ),
///     ],
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingDef {
    /// Unique string identifier for this building type.
    pub id: String,
    /// Localization key for the display name.
    pub name_key: String,
    /// Footprint in tiles as `(width, height)`.
    #[serde(default = "default_footprint")]
    pub footprint: (u32, u32),
    /// Conversions this building runs. Empty for pure storage buildings.
    #[serde(default)]
    pub conversions: Vec<ConversionDef>,
}

const fn default_footprint() -> (u32, u32) {
    (1, 1)
}

impl BuildingDef {
    /// Creates a building definition with a 1x1 footprint and no
    /// conversions.
    #[must_use]
    pub fn new(id: impl Into<String>, name_key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name_key: name_key.into(),
            footprint: default_footprint(),
            conversions: Vec::new(),
        }
    }

    /// Sets the footprint in tiles.
    #[must_use]
    pub fn with_footprint(mut self, width: u32, height: u32) -> Self {
        self.footprint = (width, height);
        self
    }

    /// Adds a conversion recipe.
    #[must_use]
    pub fn with_conversion(mut self, conversion: ConversionDef) -> Self {
        self.conversions.push(conversion);
        self
    }

    /// Whether this building runs any conversions.
    #[must_use]
    pub fn has_production(&self) -> bool {
        !self.conversions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_mill() -> BuildingDef {
        BuildingDef::new("mill", "building.mill.name")
            .with_footprint(2, 2)
            .with_conversion(ConversionDef::new(
                vec![(2, "wheat".to_string())],
                vec![(1, "flour".to_string())],
                12.0,
            ))
    }

    #[test]
    fn test_building_def_from_ron() {
        let def: BuildingDef = ron::from_str(
            r#"BuildingDef(
                id: "mill",
                name_key: "building.mill.name",
                footprint: (2, 2),
                conversions: [
                    ConversionDef(
                        inputs: [(2, "wheat")],
                        outputs: [(1, "flour")],
                        period: 12.0,
                    ),
                ],
            )"#,
        )
        .unwrap();

        assert_eq!(def, create_test_mill());
    }

    #[test]
    fn test_footprint_defaults_to_single_tile() {
        let def: BuildingDef = ron::from_str(
            r#"BuildingDef(
                id: "well",
                name_key: "building.well.name",
            )"#,
        )
        .unwrap();

        assert_eq!(def.footprint, (1, 1));
        assert!(def.conversions.is_empty());
        assert!(!def.has_production());
    }

    #[test]
    fn test_producer_recipe_has_no_inputs() {
        let farm = ConversionDef::new(vec![], vec![(2, "wheat".to_string())], 30.0);
        let mill = create_test_mill();

        assert!(farm.is_producer());
        assert!(!mill.conversions[0].is_producer());
    }
}
