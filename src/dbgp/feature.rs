use crate::bridge::error::{Error, Result};
use std::collections::BTreeMap;

/// One typed feature cell; each arm owns its parsing and wire rendering.
/// Values travel as strings over the wire regardless of type.
#[derive(Debug, Clone, PartialEq)]
pub enum Feature {
    Bool { value: bool, read_only: bool },
    Int { value: i64, read_only: bool },
    Str { value: String, read_only: bool },
}

impl Feature {
    fn read_only(&self) -> bool {
        match self {
            Feature::Bool { read_only, .. }
            | Feature::Int { read_only, .. }
            | Feature::Str { read_only, .. } => *read_only,
        }
    }

    pub fn text(&self) -> String {
        match self {
            Feature::Bool { value: true, .. } => "1".to_string(),
            Feature::Bool { value: false, .. } => "0".to_string(),
            Feature::Int { value, .. } => value.to_string(),
            Feature::Str { value, .. } => value.clone(),
        }
    }

    fn assign(&mut self, name: &str, raw: &str) -> Result<()> {
        if self.read_only() {
            return Err(Error::FeatureReadOnly(name.to_string()));
        }
        match self {
            Feature::Bool { value, .. } => {
                *value = match raw {
                    "0" => false,
                    "1" => true,
                    other => {
                        return Err(Error::FeatureValue(name.to_string(), other.to_string()))
                    }
                };
            }
            Feature::Int { value, .. } => {
                *value = raw
                    .parse()
                    .map_err(|_| Error::FeatureValue(name.to_string(), raw.to_string()))?;
            }
            Feature::Str { value, .. } => *value = raw.to_string(),
        }
        Ok(())
    }
}

/// The negotiable (and the fixed) capabilities of the debug engine.
pub struct FeatureMap(BTreeMap<&'static str, Feature>);

impl FeatureMap {
    pub fn new() -> Self {
        let ro_bool = |value| Feature::Bool {
            value,
            read_only: true,
        };
        let rw_bool = |value| Feature::Bool {
            value,
            read_only: false,
        };
        let rw_int = |value| Feature::Int {
            value,
            read_only: false,
        };
        let ro_str = |value: &str| Feature::Str {
            value: value.to_string(),
            read_only: true,
        };

        FeatureMap(BTreeMap::from([
            ("language_supports_threads", ro_bool(false)),
            ("language_name", ro_str("PHP")),
            ("language_version", ro_str("7.0")),
            ("encoding", ro_str("ISO-8859-1")),
            ("protocol_version", Feature::Int { value: 1, read_only: true }),
            ("supports_async", ro_bool(false)),
            ("supports_reverse_debugging", ro_bool(true)),
            ("breakpoint_types", ro_str("line")),
            ("multiple_sessions", rw_bool(false)),
            ("max_children", rw_int(64)),
            ("max_data", rw_int(2048)),
            ("max_depth", rw_int(1)),
            ("extended_properties", rw_bool(false)),
            ("show_hidden", rw_bool(false)),
        ]))
    }

    pub fn get(&self, name: &str) -> Option<&Feature> {
        self.0.get(name)
    }

    pub fn set(&mut self, name: &str, raw: &str) -> Result<()> {
        let feature = self
            .0
            .get_mut(name)
            .ok_or_else(|| Error::UnknownFeature(name.to_string()))?;
        feature.assign(name, raw)
    }
}

impl Default for FeatureMap {
    fn default() -> Self {
        Self::new()
    }
}
