//! Vehicle list entries and the per-vehicle permission tree.

use serde_json::Value;

use crate::models::field;
use crate::normalize;

/// A granted permission scope. Owners get an empty tree; shared users get
/// the scopes granted to them (e.g. "Basic control"), possibly nested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionNode {
    pub code: String,
    pub name: String,
    pub children: Vec<PermissionNode>,
}

impl PermissionNode {
    fn parse_list(raw: Option<&Value>) -> Vec<PermissionNode> {
        let Some(Value::Array(items)) = raw else {
            return Vec::new();
        };
        items
            .iter()
            .filter_map(|item| {
                item.as_object().map(|obj| PermissionNode {
                    code: obj.get("code").and_then(normalize::as_string).unwrap_or_default(),
                    name: obj.get("name").and_then(normalize::as_string).unwrap_or_default(),
                    children: Self::parse_list(obj.get("childList")),
                })
            })
            .collect()
    }

    /// Depth-first check over codes and names.
    #[must_use]
    pub fn matches(&self, needle: &str) -> bool {
        self.code.eq_ignore_ascii_case(needle)
            || self.name.eq_ignore_ascii_case(needle)
            || self.children.iter().any(|c| c.matches(needle))
    }
}

/// One entry from the account's vehicle list.
#[derive(Debug, Clone, Default)]
pub struct Vehicle {
    pub vin: String,
    pub model_name: String,
    pub brand_name: String,
    pub alias: String,
    pub plate: String,
    pub energy_type: String,
    pub default_car: bool,
    pub tbox_version: String,
    /// Permission scopes granted to a shared user; empty for owners.
    pub permissions: Vec<PermissionNode>,
}

impl Vehicle {
    #[must_use]
    pub fn from_value(item: &Value) -> Option<Self> {
        let vin = field(item, &["vin"]).and_then(normalize::as_string)?;
        let text = |aliases: &[&str]| {
            field(item, aliases)
                .and_then(normalize::as_string)
                .unwrap_or_default()
        };
        Some(Self {
            vin,
            model_name: text(&["modelName"]),
            brand_name: text(&["brandName"]),
            alias: text(&["autoAlias"]),
            plate: text(&["autoPlate"]),
            energy_type: text(&["energyType"]),
            default_car: field(item, &["defaultCar"]).and_then(normalize::as_i64) == Some(1),
            tbox_version: text(&["tboxVersion"]),
            permissions: PermissionNode::parse_list(field(item, &["rangeDetailList"])),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_owner_entry() {
        let v = Vehicle::from_value(&json!({
            "vin": "LC0C1234567890123",
            "modelName": "SEAL",
            "brandName": "BYD",
            "autoAlias": "Daily",
            "defaultCar": 1,
            "tboxVersion": "3"
        }))
        .unwrap();
        assert_eq!(v.vin, "LC0C1234567890123");
        assert!(v.default_car);
        assert!(v.permissions.is_empty());
    }

    #[test]
    fn parses_permission_tree() {
        let v = Vehicle::from_value(&json!({
            "vin": "V1",
            "rangeDetailList": [
                {"code": "10", "name": "Basic control", "childList": [
                    {"code": "LOCKDOOR", "name": "Lock"}
                ]}
            ]
        }))
        .unwrap();
        assert_eq!(v.permissions.len(), 1);
        assert!(v.permissions[0].matches("basic control"));
        assert!(v.permissions[0].matches("LOCKDOOR"));
        assert!(!v.permissions[0].matches("BATTERYHEAT"));
    }

    #[test]
    fn entry_without_vin_is_skipped() {
        assert!(Vehicle::from_value(&json!({"modelName": "X"})).is_none());
    }
}
