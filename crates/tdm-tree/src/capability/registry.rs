//! Capability registry: announced capability key to node constructor.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use crate::error::TreeError;

use super::{
    CapabilityKind, CapabilityNode, CompositeNode, SensorNode, StatusNode, ToggleNode,
};

type CapabilityCreate = fn(&CapabilityTemplate) -> Box<dyn CapabilityNode>;

/// Keys are matched exactly first; the case-folded map is the fallback and
/// keeps the first key registered under each folded spelling.
pub struct CapabilityRegistry {
    entries: FxHashMap<SmolStr, CapabilityFactory>,
    folded: FxHashMap<SmolStr, SmolStr>,
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Static description handed to a constructor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityTemplate {
    pub canonical: SmolStr,
    pub kind: CapabilityKind,
    pub unit: Option<SmolStr>,
}

/// Resolved registry entry; cheap to clone.
#[derive(Clone)]
pub struct CapabilityFactory {
    template: CapabilityTemplate,
    create: CapabilityCreate,
}

impl CapabilityFactory {
    #[must_use]
    pub fn create(&self) -> Box<dyn CapabilityNode> {
        (self.create)(&self.template)
    }

    #[must_use]
    pub fn template(&self) -> &CapabilityTemplate {
        &self.template
    }
}

impl std::fmt::Debug for CapabilityFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityFactory")
            .field("template", &self.template)
            .finish_non_exhaustive()
    }
}

impl CapabilityRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: FxHashMap::default(),
            folded: FxHashMap::default(),
        }
    }

    /// Fixed capability table for Tasmota firmware telemetry.
    #[must_use]
    pub fn default_registry() -> Self {
        let mut registry = Self::new();
        for (key, unit) in [
            ("Temperature", "°C"),
            ("Humidity", "%"),
            ("Pressure", "hPa"),
            ("DewPoint", "°C"),
            ("Illuminance", "lx"),
            ("Power", "W"),
            ("Voltage", "V"),
            ("Current", "A"),
            ("RSSI", "%"),
        ] {
            registry.register(key, CapabilityKind::Sensor, Some(unit), create_sensor);
        }
        for key in [
            "LWT", "Module", "Firmware", "IPAddress", "Hostname", "Uptime", "LoadAvg", "Mac",
        ] {
            registry.register(key, CapabilityKind::Status, None, create_status);
        }
        registry.register("POWER", CapabilityKind::Toggle, None, create_toggle);
        for relay in 1..=8 {
            registry.register(
                format!("POWER{relay}"),
                CapabilityKind::Toggle,
                None,
                create_toggle,
            );
        }
        for key in ["Energy", "Wifi", "Status"] {
            registry.register(key, CapabilityKind::Composite, None, create_composite);
        }

        registry.register_alias("Temp", "Temperature");
        registry.register_alias("Humid", "Humidity");
        registry.register_alias("IP", "IPAddress");
        registry.register_alias("State", "Status");
        registry
    }

    pub fn register(
        &mut self,
        key: impl Into<SmolStr>,
        kind: CapabilityKind,
        unit: Option<&str>,
        create: CapabilityCreate,
    ) {
        let canonical: SmolStr = key.into();
        let factory = CapabilityFactory {
            template: CapabilityTemplate {
                canonical: canonical.clone(),
                kind,
                unit: unit.map(SmolStr::new),
            },
            create,
        };
        self.insert(SmolStr::new(canonical.trim()), factory);
    }

    pub fn register_alias(&mut self, alias: impl Into<SmolStr>, target: &str) {
        let alias: SmolStr = alias.into();
        if let Some(factory) = self.lookup(target).cloned() {
            self.insert(SmolStr::new(alias.trim()), factory);
        }
    }

    pub fn resolve(&self, key: &str) -> Result<CapabilityFactory, TreeError> {
        self.lookup(key)
            .cloned()
            .ok_or_else(|| TreeError::UnknownCapability(SmolStr::new(key)))
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    /// Canonical keys with their kinds (stable sorted, aliases folded).
    #[must_use]
    pub fn canonical_keys(&self) -> Vec<(SmolStr, CapabilityKind)> {
        let keys: BTreeMap<SmolStr, CapabilityKind> = self
            .entries
            .values()
            .map(|factory| (factory.template.canonical.clone(), factory.template.kind))
            .collect();
        keys.into_iter().collect()
    }

    fn insert(&mut self, key: SmolStr, factory: CapabilityFactory) {
        self.folded
            .entry(fold_key(&key))
            .or_insert_with(|| key.clone());
        self.entries.insert(key, factory);
    }

    fn lookup(&self, key: &str) -> Option<&CapabilityFactory> {
        let key = key.trim();
        self.entries.get(key).or_else(|| {
            self.folded
                .get(&fold_key(key))
                .and_then(|exact| self.entries.get(exact))
        })
    }
}

fn fold_key(key: &str) -> SmolStr {
    SmolStr::new(key.to_ascii_lowercase())
}

fn create_sensor(template: &CapabilityTemplate) -> Box<dyn CapabilityNode> {
    Box::new(SensorNode::new(template.unit.clone()))
}

fn create_status(_template: &CapabilityTemplate) -> Box<dyn CapabilityNode> {
    Box::new(StatusNode::default())
}

fn create_toggle(_template: &CapabilityTemplate) -> Box<dyn CapabilityNode> {
    Box::new(ToggleNode::default())
}

fn create_composite(_template: &CapabilityTemplate) -> Box<dyn CapabilityNode> {
    Box::new(CompositeNode::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let registry = CapabilityRegistry::default_registry();
        let factory = registry.resolve(" temperature ").expect("temperature");
        assert_eq!(factory.template().canonical.as_str(), "Temperature");
        assert_eq!(factory.create().kind(), CapabilityKind::Sensor);
    }

    #[test]
    fn exact_key_wins_over_case_folding() {
        let registry = CapabilityRegistry::default_registry();

        let power = registry.resolve("Power").expect("sensor");
        assert_eq!(power.template().canonical.as_str(), "Power");
        assert_eq!(power.template().kind, CapabilityKind::Sensor);
        assert_eq!(power.template().unit.as_deref(), Some("W"));

        let relay = registry.resolve("POWER").expect("toggle");
        assert_eq!(relay.template().canonical.as_str(), "POWER");
        assert_eq!(relay.template().kind, CapabilityKind::Toggle);

        let folded = registry.resolve("power").expect("first registered");
        assert_eq!(folded.template().canonical.as_str(), "Power");
    }

    #[test]
    fn alias_resolves_to_canonical_capability() {
        let registry = CapabilityRegistry::default_registry();
        let factory = registry.resolve("IP").expect("alias");
        assert_eq!(factory.template().canonical.as_str(), "IPAddress");
        assert_eq!(factory.template().kind, CapabilityKind::Status);
    }

    #[test]
    fn unknown_key_is_reported() {
        let registry = CapabilityRegistry::default_registry();
        let err = registry.resolve("Flux").unwrap_err();
        assert_eq!(err, TreeError::UnknownCapability("Flux".into()));
    }

    #[test]
    fn canonical_keys_fold_aliases() {
        let registry = CapabilityRegistry::default_registry();
        let keys = registry.canonical_keys();
        assert_eq!(keys.len(), 29);
        assert!(keys.iter().all(|(key, _)| key.as_str() != "Temp"));
        assert!(keys.contains(&("POWER8".into(), CapabilityKind::Toggle)));
        assert!(keys.contains(&("POWER".into(), CapabilityKind::Toggle)));
        assert!(keys.contains(&("Power".into(), CapabilityKind::Sensor)));
        let mut sorted = keys.clone();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(keys, sorted);
    }

    #[test]
    fn alias_to_missing_target_is_ignored() {
        let mut registry = CapabilityRegistry::new();
        registry.register_alias("Temp", "Temperature");
        assert!(!registry.contains("Temp"));
    }
}
