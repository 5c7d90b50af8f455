//! Language driver registry.
//!
//! Central registration point for all language drivers. Initialized once
//! at startup and shared across threads.

use std::collections::HashMap;
use std::sync::OnceLock;

use super::{Language, LanguageParser};

/// Global registry instance.
static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Get the global language driver registry.
pub fn global_registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

/// Registry of language drivers.
pub struct Registry {
    drivers: HashMap<Language, Box<dyn LanguageParser>>,
}

impl Registry {
    fn new() -> Self {
        let mut drivers: HashMap<Language, Box<dyn LanguageParser>> = HashMap::new();

        drivers.insert(
            Language::TypeScript,
            Box::new(super::languages::typescript::TypeScriptParser::typescript()),
        );
        drivers.insert(
            Language::JavaScript,
            Box::new(super::languages::typescript::TypeScriptParser::javascript()),
        );
        drivers.insert(
            Language::Python,
            Box::new(super::languages::python::PythonParser),
        );

        Self { drivers }
    }

    /// Get the driver for a given language.
    pub fn get(&self, language: Language) -> Option<&dyn LanguageParser> {
        self.drivers.get(&language).map(|d| d.as_ref())
    }

    /// List all registered languages.
    pub fn languages(&self) -> Vec<Language> {
        self.drivers.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_has_reference_drivers() {
        let reg = global_registry();
        assert!(reg.get(Language::TypeScript).is_some());
        assert!(reg.get(Language::JavaScript).is_some());
        assert!(reg.get(Language::Python).is_some());
    }

    #[test]
    fn test_registry_returns_none_for_unknown() {
        let reg = global_registry();
        assert!(reg.get(Language::Unknown).is_none());
    }
}
