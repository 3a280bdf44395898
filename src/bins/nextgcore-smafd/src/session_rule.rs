//! Session Rules
//!
//! Session rules delivered by the policy function. At most one rule of a
//! session is active; when a decision leaves none active the configured
//! [`SessionRuleSelector`] picks one.

use std::collections::BTreeMap;
use std::fmt;

use crate::models::{SessionRuleModel, SmPolicyDecision};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRule {
    pub model: SessionRuleModel,
    pub is_activate: bool,
}

impl SessionRule {
    pub fn new(model: SessionRuleModel) -> Self {
        Self {
            model,
            is_activate: false,
        }
    }
}

/// Rules keyed by rule id; the map order is the enumeration order
pub type SessionRules = BTreeMap<String, SessionRule>;

// ============================================================================
// Selection policy
// ============================================================================

/// Picks the rule to activate when no rule is active
pub trait SessionRuleSelector: Send + Sync + fmt::Debug {
    fn select<'a>(&self, rules: &'a SessionRules) -> Option<&'a str>;
}

/// Smallest rule id first
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstByRuleId;

impl SessionRuleSelector for FirstByRuleId {
    fn select<'a>(&self, rules: &'a SessionRules) -> Option<&'a str> {
        rules.keys().next().map(String::as_str)
    }
}

/// Ordered preference list, falling back to [`FirstByRuleId`]
#[derive(Debug, Default, Clone)]
pub struct PreferredRuleIds(pub Vec<String>);

impl SessionRuleSelector for PreferredRuleIds {
    fn select<'a>(&self, rules: &'a SessionRules) -> Option<&'a str> {
        self.0
            .iter()
            .find_map(|id| rules.get_key_value(id).map(|(k, _)| k.as_str()))
            .or_else(|| FirstByRuleId.select(rules))
    }
}

// ============================================================================
// Decision application
// ============================================================================

pub fn selected_session_rule(rules: &SessionRules) -> Option<&SessionRule> {
    rules.values().find(|rule| rule.is_activate)
}

/// Merge a policy decision into `rules`.
///
/// A `null` rule deletes the entry; any other rule installs or replaces
/// it. The previously active rule stays active if it survived, otherwise
/// `selector` picks the new one. Returns the id of the active rule.
pub fn apply_sm_policy_from_decision(
    rules: &mut SessionRules,
    decision: &SmPolicyDecision,
    selector: &dyn SessionRuleSelector,
) -> Option<String> {
    let previous = rules
        .iter()
        .find(|(_, rule)| rule.is_activate)
        .map(|(id, _)| id.clone());

    for (id, rule) in &decision.sess_rules {
        match rule {
            Some(model) => {
                log::debug!("[Session Rule] install {}", id);
                rules.insert(id.clone(), SessionRule::new(model.clone()));
            }
            None => {
                log::debug!("[Session Rule] delete {}", id);
                rules.remove(id);
            }
        }
    }

    for rule in rules.values_mut() {
        rule.is_activate = false;
    }

    let active = match previous.filter(|id| rules.contains_key(id)) {
        Some(id) => Some(id),
        None => selector.select(rules).map(str::to_string),
    };
    if let Some(rule) = active.as_ref().and_then(|id| rules.get_mut(id)) {
        rule.is_activate = true;
    }
    active
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Ambr, DefaultQos};

    fn model(id: &str) -> SessionRuleModel {
        SessionRuleModel {
            sess_rule_id: id.to_string(),
            auth_sess_ambr: Some(Ambr {
                uplink: "1000 Mbps".into(),
                downlink: "1000 Mbps".into(),
            }),
            auth_def_qos: Some(DefaultQos { var5qi: 9, arp: None }),
        }
    }

    fn decision(entries: &[(&str, bool)]) -> SmPolicyDecision {
        SmPolicyDecision {
            sess_rules: entries
                .iter()
                .map(|(id, present)| (id.to_string(), present.then(|| model(id))))
                .collect(),
        }
    }

    fn active_count(rules: &SessionRules) -> usize {
        rules.values().filter(|r| r.is_activate).count()
    }

    #[test]
    fn test_first_decision_selects_smallest_id() {
        let mut rules = SessionRules::new();
        let active = apply_sm_policy_from_decision(&mut rules, &decision(&[("b", true), ("a", true)]), &FirstByRuleId);
        assert_eq!(active.as_deref(), Some("a"));
        assert_eq!(active_count(&rules), 1);
        assert_eq!(selected_session_rule(&rules).unwrap().model.sess_rule_id, "a");
    }

    #[test]
    fn test_active_rule_survives_update() {
        let mut rules = SessionRules::new();
        apply_sm_policy_from_decision(&mut rules, &decision(&[("b", true)]), &FirstByRuleId);
        let active = apply_sm_policy_from_decision(&mut rules, &decision(&[("a", true)]), &FirstByRuleId);
        assert_eq!(active.as_deref(), Some("b"));
        assert_eq!(rules.len(), 2);
        assert_eq!(active_count(&rules), 1);
    }

    #[test]
    fn test_null_rule_deletes_and_reselects() {
        let mut rules = SessionRules::new();
        apply_sm_policy_from_decision(&mut rules, &decision(&[("a", true), ("b", true)]), &FirstByRuleId);
        let active = apply_sm_policy_from_decision(&mut rules, &decision(&[("a", false)]), &FirstByRuleId);
        assert_eq!(active.as_deref(), Some("b"));
        assert!(!rules.contains_key("a"));

        let active = apply_sm_policy_from_decision(&mut rules, &decision(&[("b", false)]), &FirstByRuleId);
        assert_eq!(active, None);
        assert!(selected_session_rule(&rules).is_none());
    }

    #[test]
    fn test_preferred_selector() {
        let selector = PreferredRuleIds(vec!["z".into(), "c".into()]);
        let mut rules = SessionRules::new();
        let active = apply_sm_policy_from_decision(&mut rules, &decision(&[("a", true), ("c", true)]), &selector);
        assert_eq!(active.as_deref(), Some("c"));

        let mut rules = SessionRules::new();
        let active = apply_sm_policy_from_decision(&mut rules, &decision(&[("a", true), ("b", true)]), &selector);
        assert_eq!(active.as_deref(), Some("a"));
    }
}
