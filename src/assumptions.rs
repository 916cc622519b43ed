use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_yaml::Value;
use tracing::debug;

use crate::error::{CalcError, CalcResult, ConfigLoadError};

/// Top-level sections every assumptions file must carry.
pub const REQUIRED_SECTIONS: [&str; 6] = [
    "device",
    "network",
    "resolution",
    "region",
    "datacenter",
    "equivalence",
];

/// Named coefficient table: shared, immutable defaults plus a local override
/// layer. Cloning is cheap and overrides on a clone stay on that clone.
#[derive(Debug, Clone)]
pub struct AssumptionSet {
    defaults: Arc<IndexMap<String, f64>>,
    overrides: IndexMap<String, f64>,
}

impl AssumptionSet {
    /// Load the coefficient table from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> CalcResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let set = Self::from_yaml_str(&text)?;
        debug!(path = %path.display(), keys = set.len(), "loaded assumptions");
        Ok(set)
    }

    /// Parse a YAML document. Nested mappings become dotted keys in file order.
    pub fn from_yaml_str(text: &str) -> CalcResult<Self> {
        let root: Value = serde_yaml::from_str(text).map_err(ConfigLoadError::from)?;
        let Value::Mapping(map) = &root else {
            return Err(ConfigLoadError::NotAMapping.into());
        };
        for section in REQUIRED_SECTIONS {
            if !matches!(map.get(section), Some(Value::Mapping(_))) {
                return Err(ConfigLoadError::MissingSection(section).into());
            }
        }

        let mut flat = IndexMap::new();
        flatten("", &root, &mut flat)?;
        Ok(Self::from_defaults(flat))
    }

    /// Build a set directly from flattened defaults.
    pub fn from_defaults(defaults: IndexMap<String, f64>) -> Self {
        Self {
            defaults: Arc::new(defaults),
            overrides: IndexMap::new(),
        }
    }

    /// Effective value for `key`: the override when present, else the default.
    pub fn resolve(&self, key: &str) -> CalcResult<f64> {
        self.get(key)
            .ok_or_else(|| CalcError::MissingAssumption(key.to_string()))
    }

    /// Like `resolve`, without the error.
    pub fn get(&self, key: &str) -> Option<f64> {
        self.overrides
            .get(key)
            .or_else(|| self.defaults.get(key))
            .copied()
    }

    /// Value loaded from the file, ignoring any override.
    pub fn default_value(&self, key: &str) -> Option<f64> {
        self.defaults.get(key).copied()
    }

    /// Whether `key` is a known coefficient name.
    pub fn contains(&self, key: &str) -> bool {
        self.defaults.contains_key(key)
    }

    /// Number of coefficients loaded.
    pub fn len(&self) -> usize {
        self.defaults.len()
    }

    /// True when no coefficient was loaded.
    pub fn is_empty(&self) -> bool {
        self.defaults.is_empty()
    }

    /// Replace `key` on this set only.
    pub fn set_override(&mut self, key: &str, value: f64) -> CalcResult<()> {
        if !self.contains(key) {
            return Err(CalcError::InvalidOverride {
                key: key.to_string(),
                reason: "unknown coefficient",
            });
        }
        if !value.is_finite() {
            return Err(CalcError::InvalidOverride {
                key: key.to_string(),
                reason: "value must be finite",
            });
        }
        if value < 0.0 {
            return Err(CalcError::InvalidOverride {
                key: key.to_string(),
                reason: "value must be non-negative",
            });
        }
        debug!(key, value, "override applied");
        self.overrides.insert(key.to_string(), value);
        Ok(())
    }

    /// Copy-on-override: `self` is left untouched.
    pub fn with_override(&self, key: &str, value: f64) -> CalcResult<Self> {
        let mut next = self.clone();
        next.set_override(key, value)?;
        Ok(next)
    }

    /// Drop the override for `key`, returning the value it had.
    pub fn clear_override(&mut self, key: &str) -> Option<f64> {
        self.overrides.shift_remove(key)
    }

    /// Active overrides, in the order they were first set.
    pub fn overrides(&self) -> impl Iterator<Item = (&str, f64)> {
        self.overrides.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Effective (key, value) pairs in file order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.defaults.iter().map(move |(k, v)| {
            let v = self.overrides.get(k).copied().unwrap_or(*v);
            (k.as_str(), v)
        })
    }

    /// Ids directly below `section`, e.g. `device` -> `laptop`, `smartphone`.
    pub fn categories(&self, section: &str) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for key in self.defaults.keys() {
            let Some(rest) = key
                .strip_prefix(section)
                .and_then(|r| r.strip_prefix('.'))
            else {
                continue;
            };
            if let Some((id, _)) = rest.split_once('.') {
                if !out.contains(&id) {
                    out.push(id);
                }
            }
        }
        out
    }

    /// Whether any coefficient exists under `section.id`.
    pub fn has_category(&self, section: &str, id: &str) -> bool {
        let prefix = format!("{section}.{id}.");
        self.defaults.keys().any(|k| k.starts_with(&prefix))
    }
}

fn key_segment(key: &Value, parent: &str) -> Result<String, ConfigLoadError> {
    let segment = match key {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => {
            return Err(ConfigLoadError::InvalidValue {
                key: parent.to_string(),
                reason: "mapping keys must be strings",
            })
        }
    };
    if segment.is_empty() || segment.contains('.') {
        return Err(ConfigLoadError::InvalidValue {
            key: format!("{parent}.{segment}"),
            reason: "key segments must be non-empty and must not contain '.'",
        });
    }
    Ok(segment)
}

fn flatten(
    prefix: &str,
    value: &Value,
    out: &mut IndexMap<String, f64>,
) -> Result<(), ConfigLoadError> {
    match value {
        Value::Mapping(map) => {
            for (k, v) in map {
                let segment = key_segment(k, prefix)?;
                let full = if prefix.is_empty() {
                    segment
                } else {
                    format!("{prefix}.{segment}")
                };
                flatten(&full, v, out)?;
            }
            Ok(())
        }
        Value::Number(n) => {
            let x = n.as_f64().ok_or_else(|| ConfigLoadError::InvalidValue {
                key: prefix.to_string(),
                reason: "number out of range",
            })?;
            if !x.is_finite() {
                return Err(ConfigLoadError::InvalidValue {
                    key: prefix.to_string(),
                    reason: "value must be finite",
                });
            }
            if x < 0.0 {
                return Err(ConfigLoadError::InvalidValue {
                    key: prefix.to_string(),
                    reason: "value must be non-negative",
                });
            }
            out.insert(prefix.to_string(), x);
            Ok(())
        }
        _ => Err(ConfigLoadError::InvalidValue {
            key: prefix.to_string(),
            reason: "expected a number or a mapping",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::io::Write;

    const YAML: &str = r#"
device:
  laptop:
    power_watts: 50
  smartphone:
    power_watts: 3.5
network:
  wifi:
    gco2_per_gb: 0.5
resolution:
  hd:
    gb_per_hour: 1.0
region:
  fr:
    gco2_per_kwh: 52
datacenter:
  gco2_per_gb: 0
equivalence:
  meatless_meals:
    gco2_per_unit: 120
"#;

    #[test]
    fn flattens_into_dotted_keys_in_order() {
        let set = AssumptionSet::from_yaml_str(YAML).unwrap();
        assert!(!set.is_empty());
        assert_eq!(set.len(), 7);
        assert!(set.contains("network.wifi.gco2_per_gb"));
        assert!(!set.contains("network.wifi"));
        assert!(AssumptionSet::from_defaults(IndexMap::new()).is_empty());
        assert_eq!(set.resolve("device.laptop.power_watts").unwrap(), 50.0);
        assert_eq!(set.resolve("network.wifi.gco2_per_gb").unwrap(), 0.5);
        assert_eq!(set.resolve("datacenter.gco2_per_gb").unwrap(), 0.0);
        assert_eq!(set.categories("device"), vec!["laptop", "smartphone"]);
        assert!(set.categories("datacenter").is_empty());
        assert!(set.has_category("resolution", "hd"));
        assert!(!set.has_category("resolution", "8K_ultra"));
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(YAML.as_bytes()).unwrap();
        let set = AssumptionSet::load(file.path()).unwrap();
        assert_eq!(set.resolve("region.fr.gco2_per_kwh").unwrap(), 52.0);
    }

    #[test]
    fn load_missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AssumptionSet::load(dir.path().join("absent.yaml")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigLoad);
        assert!(matches!(
            err,
            CalcError::ConfigLoad(ConfigLoadError::Io { .. })
        ));
    }

    #[test]
    fn rejects_malformed_and_incomplete_files() {
        let err = AssumptionSet::from_yaml_str("device: [unterminated").unwrap_err();
        assert!(matches!(err, CalcError::ConfigLoad(ConfigLoadError::Yaml(_))));

        let err = AssumptionSet::from_yaml_str("- 1\n- 2\n").unwrap_err();
        assert!(matches!(
            err,
            CalcError::ConfigLoad(ConfigLoadError::NotAMapping)
        ));

        let without_region = YAML.replace("region:\n  fr:\n    gco2_per_kwh: 52\n", "");
        let err = AssumptionSet::from_yaml_str(&without_region).unwrap_err();
        assert!(matches!(
            err,
            CalcError::ConfigLoad(ConfigLoadError::MissingSection("region"))
        ));
    }

    #[test]
    fn rejects_negative_and_non_numeric_leaves() {
        let negative = YAML.replace("power_watts: 50", "power_watts: -50");
        let err = AssumptionSet::from_yaml_str(&negative).unwrap_err();
        match err {
            CalcError::ConfigLoad(ConfigLoadError::InvalidValue { key, .. }) => {
                assert_eq!(key, "device.laptop.power_watts")
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let text = YAML.replace("power_watts: 50", "power_watts: fifty");
        assert!(AssumptionSet::from_yaml_str(&text).is_err());
    }

    #[test]
    fn override_is_copy_on_write() {
        let base = AssumptionSet::from_yaml_str(YAML).unwrap();
        let session = base
            .with_override("device.laptop.power_watts", 80.0)
            .unwrap();
        assert_eq!(session.resolve("device.laptop.power_watts").unwrap(), 80.0);
        assert_eq!(base.resolve("device.laptop.power_watts").unwrap(), 50.0);
        assert_eq!(
            session.default_value("device.laptop.power_watts"),
            Some(50.0)
        );
        assert_eq!(session.overrides().count(), 1);
    }

    #[test]
    fn override_validation() {
        let mut set = AssumptionSet::from_yaml_str(YAML).unwrap();
        for (key, value) in [
            ("device.laptop.volts", 1.0),
            ("device.laptop.power_watts", -1.0),
            ("device.laptop.power_watts", f64::NAN),
            ("device.laptop.power_watts", f64::INFINITY),
        ] {
            let err = set.set_override(key, value).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidOverride, "{key}={value}");
        }
        assert_eq!(set.overrides().count(), 0);

        set.set_override("device.laptop.power_watts", 0.0).unwrap();
        assert_eq!(set.clear_override("device.laptop.power_watts"), Some(0.0));
        assert_eq!(set.resolve("device.laptop.power_watts").unwrap(), 50.0);
    }

    #[test]
    fn resolve_missing_names_key() {
        let set = AssumptionSet::from_yaml_str(YAML).unwrap();
        match set.resolve("device.tv.power_watts") {
            Err(CalcError::MissingAssumption(key)) => assert_eq!(key, "device.tv.power_watts"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
