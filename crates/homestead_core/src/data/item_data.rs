//! Item kind definitions.

use serde::{Deserialize, Serialize};

/// Definition of one item kind.
///
/// Runtime code never sees these strings; the registry assigns each item
/// an [`ItemId`](crate::items::ItemId) by its position in the item list.
///
/// # Example RON
/// ```ron
/// ItemDef(
///     id: "wheat",
///     name_key: "item.wheat.name",
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDef {
    /// Unique string identifier, referenced by conversions.
    pub id: String,
    /// Localization key for the display name.
    pub name_key: String,
}

impl ItemDef {
    /// Creates an item definition.
    #[must_use]
    pub fn new(id: impl Into<String>, name_key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name_key: name_key.into(),
        }
    }
}
