//! Capability module registry
//!
//! Each capability attaches its own functions through [`Capability::register`].
//! The registry only owns the list; it never needs editing when a
//! capability is added, and registration order does not matter.

use crate::namespace::Namespace;
use std::fmt;
use tracing::debug;

/// The built-in capability modules and their namespace keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleKind {
    Network,
    Markup,
    Filesystem,
    Presentation,
    Vault,
}

impl ModuleKind {
    pub fn key(&self) -> &'static str {
        match self {
            ModuleKind::Network => "http",
            ModuleKind::Markup => "dom",
            ModuleKind::Filesystem => "sys",
            ModuleKind::Presentation => "tui",
            ModuleKind::Vault => "secure",
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A bounded set of host operations attached under one namespace key
pub trait Capability: Send + Sync {
    /// Key this capability attaches under
    fn key(&self) -> &str;

    fn register(&self, namespace: &mut Namespace);
}

#[derive(Default)]
pub struct Registry {
    capabilities: Vec<Box<dyn Capability>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, capability: Box<dyn Capability>) -> &mut Self {
        self.capabilities.push(capability);
        self
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// Build a fresh namespace from every registered capability
    pub fn build(&self) -> Namespace {
        let mut namespace = Namespace::new();
        for capability in &self.capabilities {
            capability.register(&mut namespace);
            debug!(module = capability.key(), "capability registered");
        }
        namespace
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    struct Echo;

    impl Capability for Echo {
        fn key(&self) -> &str {
            "echo"
        }

        fn register(&self, namespace: &mut Namespace) {
            namespace
                .module(self.key())
                .function("say", 1..=1, |args| Ok(json!(args.string(0)?)));
        }
    }

    struct Clock;

    impl Capability for Clock {
        fn key(&self) -> &str {
            "clock"
        }

        fn register(&self, namespace: &mut Namespace) {
            namespace
                .module(self.key())
                .function("now", 0..=0, |_| Ok(json!(0)));
        }
    }

    fn signature(ns: &Namespace) -> Vec<String> {
        ns.modules()
            .flat_map(|m| m.functions().map(|f| f.qualified_name().to_string()))
            .collect()
    }

    #[test]
    fn test_registration_order_irrelevant() {
        let mut forward = Registry::new();
        forward.add(Box::new(Echo)).add(Box::new(Clock));
        let mut backward = Registry::new();
        backward.add(Box::new(Clock)).add(Box::new(Echo));

        assert_eq!(signature(&forward.build()), signature(&backward.build()));
        assert_eq!(
            signature(&forward.build()),
            vec!["nexus::clock::now", "nexus::echo::say"]
        );
    }

    #[test]
    fn test_each_build_is_independent() {
        let mut registry = Registry::new();
        registry.add(Box::new(Echo));
        let mut first = registry.build();
        first.module("extra").function("x", 0..=0, |_| Ok(Value::Null));

        assert!(registry.build().get("extra").is_none());
    }

    #[test]
    fn test_module_keys() {
        let keys: Vec<_> = [
            ModuleKind::Network,
            ModuleKind::Markup,
            ModuleKind::Filesystem,
            ModuleKind::Presentation,
            ModuleKind::Vault,
        ]
        .iter()
        .map(ModuleKind::key)
        .collect();
        assert_eq!(keys, vec!["http", "dom", "sys", "tui", "secure"]);
    }
}
