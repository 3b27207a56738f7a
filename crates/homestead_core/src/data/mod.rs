//! Data-driven definitions for items, buildings, and vehicles.
//!
//! This module contains pure data structures that define the item kinds,
//! building types, and vehicle kinds of a game set. All structs are
//! designed to be deserialized from RON documents; the registry resolves
//! their string references into runtime handles.
//!
//! **Note:** This module contains no file IO - binaries read files and
//! hand the text to the parser.

mod building_data;
mod game_data;
mod item_data;
mod vehicle_data;

pub use building_data::{BuildingDef, ConversionDef};
pub use game_data::{DataRegistry, GameData};
pub use item_data::ItemDef;
pub use vehicle_data::VehicleDef;
