//! Parameter metadata for CoverageJSON documents.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Internationalized string supporting multiple languages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum I18nString {
    /// Simple string (assumes English).
    Simple(String),
    /// Map of language codes to strings.
    Localized(HashMap<String, String>),
}

impl I18nString {
    /// Create an English-only i18n string.
    pub fn english(s: &str) -> Self {
        let mut map = HashMap::new();
        map.insert("en".to_string(), s.to_string());
        I18nString::Localized(map)
    }

    /// Get the English text, or any available text.
    pub fn text(&self) -> &str {
        match self {
            I18nString::Simple(s) => s,
            I18nString::Localized(map) => map
                .get("en")
                .map(|s| s.as_str())
                .unwrap_or_else(|| map.values().next().map(|s| s.as_str()).unwrap_or("")),
        }
    }
}

/// The observed property a parameter measures.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObservedProperty {
    /// Identifier of the property; equals the parameter name for NWM output.
    pub id: String,

    /// Human-readable label.
    pub label: I18nString,
}

/// Unit of measurement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Unit {
    /// Symbol or abbreviation (e.g., "m3 s-1").
    pub symbol: String,
}

impl Unit {
    /// Create a unit from a symbol string.
    pub fn from_symbol(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
        }
    }

    /// Dimensionless unit, used when a variable carries no units attribute.
    pub fn dimensionless() -> Self {
        Self::from_symbol("1")
    }
}

/// A parameter entry in a CoverageJSON document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CovParameter {
    /// Type (always "Parameter").
    #[serde(rename = "type")]
    pub type_: String,

    /// Human-readable description.
    pub description: I18nString,

    /// Unit of measurement.
    pub unit: Unit,

    /// The observed property.
    #[serde(rename = "observedProperty")]
    pub observed_property: ObservedProperty,
}

impl CovParameter {
    /// Create a parameter whose observed-property id is its own name.
    pub fn named(name: &str) -> Self {
        Self {
            type_: "Parameter".to_string(),
            description: I18nString::english(name),
            unit: Unit::dimensionless(),
            observed_property: ObservedProperty {
                id: name.to_string(),
                label: I18nString::english(name),
            },
        }
    }

    /// Set the unit symbol.
    pub fn with_unit_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.unit = Unit::from_symbol(symbol);
        self
    }

    /// Set the description.
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = I18nString::english(&desc.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_parameter_shape() {
        let param = CovParameter::named("streamflow");

        assert_eq!(param.type_, "Parameter");
        assert_eq!(param.observed_property.id, "streamflow");
        assert_eq!(param.unit.symbol, "1");
        assert_eq!(param.description.text(), "streamflow");
    }

    #[test]
    fn test_parameter_serialization() {
        let param = CovParameter::named("streamflow").with_unit_symbol("m3 s-1");
        let json = serde_json::to_value(&param).unwrap();

        assert_eq!(json["type"], "Parameter");
        assert_eq!(json["unit"]["symbol"], "m3 s-1");
        assert_eq!(json["observedProperty"]["id"], "streamflow");
        assert_eq!(json["observedProperty"]["label"]["en"], "streamflow");
        assert_eq!(json["description"]["en"], "streamflow");
    }

    #[test]
    fn test_i18n_text_fallback() {
        let simple = I18nString::Simple("velocity".to_string());
        assert_eq!(simple.text(), "velocity");

        let localized = I18nString::english("velocity");
        assert_eq!(localized.text(), "velocity");
    }
}
