//! Rule engine: rewriting code effects into domain effects.
//!
//! Rules are evaluated in descending priority (definition order within a
//! priority level); the first rule matching an effect emits its domain
//! effect, so no effect produces more than one. `callee` patterns match
//! the raw callee identifier path without call parentheses
//! (`db.select`, never `db.select(`) -- built-in rules and the parsers
//! agree on that form.

pub mod builtin;

use std::collections::HashMap;
use std::time::Instant;

use regex::Regex;
use serde_json::json;

use crate::error::{DevacError, DevacResult};
use crate::types::{CodeEffect, DomainEffect};

/// Conjunction of predicates over a code effect. Omitted fields are
/// ignored; present booleans require the exact value.
#[derive(Debug, Clone, Default)]
pub struct RuleMatch {
    /// Exact match on the effect discriminant.
    pub effect_type: Option<String>,
    /// Regular expression over `callee_name`.
    pub callee: Option<Regex>,
    /// Require `is_external`.
    pub is_external: Option<bool>,
    /// Require `is_async`.
    pub is_async: Option<bool>,
    /// Require `is_constructor`.
    pub is_constructor: Option<bool>,
    /// Require `properties[key] == value` for each pair.
    pub properties: Vec<(String, serde_json::Value)>,
}

impl RuleMatch {
    /// Whether every present predicate holds for the effect.
    pub fn matches(&self, effect: &CodeEffect) -> bool {
        if let Some(effect_type) = &self.effect_type {
            if effect_type != &effect.effect_type {
                return false;
            }
        }
        if let Some(callee) = &self.callee {
            if !callee.is_match(&effect.callee_name) {
                return false;
            }
        }
        if let Some(expected) = self.is_external {
            if effect.is_external != expected {
                return false;
            }
        }
        if let Some(expected) = self.is_async {
            if effect.is_async != expected {
                return false;
            }
        }
        if let Some(expected) = self.is_constructor {
            if effect.is_constructor != expected {
                return false;
            }
        }
        for (key, expected) in &self.properties {
            let actual = effect.properties.as_ref().and_then(|p| p.get(key));
            if actual != Some(expected) {
                return false;
            }
        }
        true
    }
}

/// What a matching rule emits.
#[derive(Debug, Clone)]
pub struct RuleEmit {
    /// Domain classification (e.g. `"Database"`).
    pub domain: String,
    /// Action within the domain (e.g. `"Write"`).
    pub action: String,
    /// Extra metadata merged into the domain effect.
    pub metadata: Option<serde_json::Value>,
}

/// A prioritized rewrite rule.
#[derive(Debug, Clone)]
pub struct Rule {
    /// Unique rule id.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Match predicates.
    pub matcher: RuleMatch,
    /// Emission.
    pub emit: RuleEmit,
    /// Evaluation priority; higher wins. Default 0.
    pub priority: i32,
    /// Disabled rules are skipped without counting toward statistics.
    pub enabled: bool,
}

impl Rule {
    /// A rule matching `FunctionCall` effects whose callee matches
    /// `callee_pattern`.
    pub fn on_callee(
        id: &str,
        name: &str,
        callee_pattern: &str,
        domain: &str,
        action: &str,
    ) -> DevacResult<Self> {
        let callee = Regex::new(callee_pattern)
            .map_err(|e| DevacError::Config { details: format!("rule {id}: bad pattern: {e}") })?;
        Ok(Self {
            id: id.to_string(),
            name: name.to_string(),
            description: None,
            matcher: RuleMatch {
                effect_type: Some("FunctionCall".into()),
                callee: Some(callee),
                ..RuleMatch::default()
            },
            emit: RuleEmit {
                domain: domain.to_string(),
                action: action.to_string(),
                metadata: None,
            },
            priority: 0,
            enabled: true,
        })
    }

    /// Attach emission metadata.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.emit.metadata = Some(metadata);
        self
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// Result of one `process` call.
#[derive(Debug, Clone, Default)]
pub struct ProcessReport {
    /// Emitted domain effects, at most one per input effect.
    pub domain_effects: Vec<DomainEffect>,
    /// Match count per enabled rule id (zero entries included).
    pub rule_stats: HashMap<String, usize>,
    /// Effects matched by some rule.
    pub matched_count: usize,
    /// Effects no rule matched.
    pub unmatched_count: usize,
    /// Wall-clock processing time.
    pub process_time_ms: u64,
}

/// Prioritized first-match rule engine.
pub struct RuleEngine {
    rules: Vec<Rule>,
    /// Hard cap on effects processed per call; 0 means unlimited.
    max_effects: usize,
}

impl RuleEngine {
    /// Engine with the built-in rule library.
    pub fn with_builtin_rules(max_effects: usize) -> Self {
        Self::with_rules(builtin::builtin_rules(), max_effects)
    }

    /// Engine with an explicit rule set.
    pub fn with_rules(rules: Vec<Rule>, max_effects: usize) -> Self {
        let mut engine = Self { rules, max_effects };
        engine.sort_rules();
        engine
    }

    /// Add a rule; the internal vector is re-sorted.
    pub fn add_rule(&mut self, rule: Rule) {
        self.rules.push(rule);
        self.sort_rules();
    }

    /// Remove a rule by id; returns whether it existed.
    pub fn remove_rule(&mut self, id: &str) -> bool {
        let before = self.rules.len();
        self.rules.retain(|r| r.id != id);
        let removed = self.rules.len() != before;
        if removed {
            self.sort_rules();
        }
        removed
    }

    /// The current rules, in evaluation order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Stable descending-priority sort: definition order is preserved
    /// within a priority level.
    fn sort_rules(&mut self) {
        self.rules.sort_by_key(|r| std::cmp::Reverse(r.priority));
    }

    /// Run every live effect through the rules.
    pub fn process(&self, effects: &[CodeEffect]) -> ProcessReport {
        let started = Instant::now();
        let mut report = ProcessReport::default();
        for rule in self.rules.iter().filter(|r| r.enabled) {
            report.rule_stats.insert(rule.id.clone(), 0);
        }

        let limit = if self.max_effects == 0 { effects.len() } else { self.max_effects };

        for effect in effects.iter().take(limit) {
            let matched = self
                .rules
                .iter()
                .filter(|r| r.enabled)
                .find(|r| r.matcher.matches(effect));

            match matched {
                Some(rule) => {
                    report.matched_count += 1;
                    if let Some(count) = report.rule_stats.get_mut(&rule.id) {
                        *count += 1;
                    }
                    report.domain_effects.push(emit_domain_effect(rule, effect));
                }
                None => report.unmatched_count += 1,
            }
        }

        report.process_time_ms = started.elapsed().as_millis() as u64;
        report
    }
}

/// Build the enriched domain effect for a matched rule.
fn emit_domain_effect(rule: &Rule, effect: &CodeEffect) -> DomainEffect {
    let mut metadata = match &rule.emit.metadata {
        Some(serde_json::Value::Object(map)) => map.clone(),
        _ => serde_json::Map::new(),
    };
    metadata.insert("callee".into(), json!(effect.callee_name));
    metadata.insert("isExternal".into(), json!(effect.is_external));
    metadata.insert("isAsync".into(), json!(effect.is_async));

    DomainEffect {
        source_effect_id: effect.effect_id.clone(),
        domain: rule.emit.domain.clone(),
        action: rule.emit.action.clone(),
        rule_id: rule.id.clone(),
        rule_name: rule.name.clone(),
        original_effect_type: effect.effect_type.clone(),
        source_entity_id: effect.source_entity_id.clone(),
        file_path: effect.file_path.clone(),
        start_line: effect.start_line,
        metadata: serde_json::Value::Object(metadata),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn effect(callee: &str) -> CodeEffect {
        CodeEffect {
            effect_id: format!("fx-{callee}"),
            effect_type: "FunctionCall".into(),
            source_entity_id: "r:p:function:00000001".into(),
            file_path: "main.ts".into(),
            start_line: 4,
            callee_name: callee.into(),
            is_external: true,
            is_async: false,
            is_constructor: false,
            branch: "base".into(),
            is_deleted: false,
            updated_at: 0,
            properties: None,
        }
    }

    fn rule(id: &str, pattern: &str, priority: i32) -> Rule {
        Rule::on_callee(id, id, pattern, "Test", "Hit")
            .expect("rule")
            .with_priority(priority)
    }

    #[test]
    fn test_higher_priority_wins() {
        let engine = RuleEngine::with_rules(
            vec![rule("low", "db\\.put", 1), rule("high", "db\\.put", 10)],
            0,
        );
        let report = engine.process(&[effect("db.put")]);
        assert_eq!(report.domain_effects.len(), 1);
        assert_eq!(report.domain_effects[0].rule_id, "high");
        assert_eq!(report.rule_stats["high"], 1);
        assert_eq!(report.rule_stats["low"], 0);
    }

    #[test]
    fn test_definition_order_within_priority() {
        let engine = RuleEngine::with_rules(
            vec![rule("first", "x\\.y", 5), rule("second", "x\\.y", 5)],
            0,
        );
        let report = engine.process(&[effect("x.y")]);
        assert_eq!(report.domain_effects[0].rule_id, "first");
    }

    #[test]
    fn test_at_most_one_domain_effect_per_input() {
        let engine = RuleEngine::with_rules(
            vec![rule("a", ".*", 0), rule("b", ".*", 0)],
            0,
        );
        let inputs = vec![effect("one"), effect("two"), effect("three")];
        let report = engine.process(&inputs);
        assert!(report.domain_effects.len() <= inputs.len());
        assert_eq!(report.matched_count + report.unmatched_count, inputs.len());
    }

    #[test]
    fn test_max_effects_limit() {
        let engine = RuleEngine::with_rules(vec![rule("a", "match", 0)], 2);
        let inputs = vec![effect("match"), effect("nomatch-x"), effect("match")];
        let report = engine.process(&inputs);
        assert_eq!(report.matched_count + report.unmatched_count, 2);
        assert_eq!(report.matched_count, 1);
        assert_eq!(report.unmatched_count, 1);
    }

    #[test]
    fn test_disabled_rule_skipped_without_stats() {
        let mut disabled = rule("off", ".*", 100);
        disabled.enabled = false;
        let engine = RuleEngine::with_rules(vec![disabled, rule("on", ".*", 0)], 0);
        let report = engine.process(&[effect("anything")]);
        assert_eq!(report.domain_effects[0].rule_id, "on");
        assert!(!report.rule_stats.contains_key("off"));
    }

    #[test]
    fn test_tri_valued_predicates() {
        let mut only_constructors = rule("ctor", ".*", 0);
        only_constructors.matcher.is_constructor = Some(true);
        let engine = RuleEngine::with_rules(vec![only_constructors], 0);

        let plain = effect("Database");
        let mut ctor = effect("Database");
        ctor.is_constructor = true;

        let report = engine.process(&[plain, ctor]);
        assert_eq!(report.matched_count, 1);
        assert_eq!(report.unmatched_count, 1);
    }

    #[test]
    fn test_property_predicate() {
        let mut with_prop = rule("prop", ".*", 0);
        with_prop.matcher.properties = vec![("table".into(), json!("users"))];
        let engine = RuleEngine::with_rules(vec![with_prop], 0);

        let mut hit = effect("db.put");
        hit.properties = Some(json!({"table": "users"}));
        let miss = effect("db.put");

        let report = engine.process(&[hit, miss]);
        assert_eq!(report.matched_count, 1);
    }

    #[test]
    fn test_add_remove_resorts() {
        let mut engine = RuleEngine::with_rules(vec![rule("low", ".*", 1)], 0);
        engine.add_rule(rule("high", ".*", 9));
        assert_eq!(engine.rules()[0].id, "high");
        assert!(engine.remove_rule("high"));
        assert_eq!(engine.rules()[0].id, "low");
        assert!(!engine.remove_rule("high"));
    }

    #[test]
    fn test_domain_effect_shape() {
        let engine = RuleEngine::with_rules(
            vec![rule("db", "db\\.put", 0).with_metadata(json!({"provider": "dynamodb"}))],
            0,
        );
        let report = engine.process(&[effect("db.put")]);
        let de = &report.domain_effects[0];
        assert_eq!(de.source_effect_id, "fx-db.put");
        assert_eq!(de.original_effect_type, "FunctionCall");
        assert_eq!(de.start_line, 4);
        assert_eq!(de.metadata["provider"], "dynamodb");
        assert_eq!(de.metadata["callee"], "db.put");
        assert_eq!(de.metadata["isExternal"], true);
    }
}
