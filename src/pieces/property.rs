/// Piece property schema
///
/// Every action and trigger declares the props it accepts. The schema drives
/// input processing (type coercion, defaults) and validation after templates are
/// resolved, and is published through piece metadata.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Props keyed by name, in declaration order
pub type PropertyMap = IndexMap<String, PropertyDefinition>;

/// Declaration of one prop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDefinition {
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub kind: PropertyKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
}

/// Value type of a prop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PropertyKind {
    ShortText,
    LongText,
    Number,
    Checkbox,
    /// Fixed list of choices
    StaticDropdown { options: DropdownState },
    /// Choices computed by the piece at edit time (EXECUTE_PROPERTY)
    Dropdown {
        #[serde(default)]
        refreshers: Vec<String>,
    },
    Json,
    Object,
    Array,
    DateTime,
    File,
    SecretText,
    /// Group of props used as piece authentication
    CustomAuth { props: PropertyMap },
}

/// One selectable choice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropdownOption {
    pub label: String,
    pub value: Value,
}

/// Dropdown options, also the result of EXECUTE_PROPERTY
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DropdownState {
    #[serde(default)]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub options: Vec<DropdownOption>,
}

impl DropdownState {
    pub fn new(options: Vec<DropdownOption>) -> Self {
        Self {
            disabled: false,
            placeholder: None,
            options,
        }
    }

    pub fn contains(&self, value: &Value) -> bool {
        self.options.iter().any(|option| &option.value == value)
    }
}

impl PropertyDefinition {
    pub fn new(display_name: &str, kind: PropertyKind) -> Self {
        Self {
            display_name: display_name.to_string(),
            description: None,
            kind,
            required: false,
            default_value: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }
}

impl DropdownOption {
    pub fn new(label: &str, value: Value) -> Self {
        Self {
            label: label.to_string(),
            value,
        }
    }
}
