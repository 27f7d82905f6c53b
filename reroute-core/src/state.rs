//! Persisted Rule State
//!
//! This module defines the user-facing rewrite rules and the top-level
//! aggregate that is persisted as a single JSON value. The wire shape is
//! camelCase: `{masterSwitch, rules: [{id, active, search, replace,
//! preserveAuth, capturedHeaders?}]}`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user-defined search → replace URL rewrite intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    /// Opaque unique identifier, assigned at creation, never reused.
    pub id: String,

    /// Inactive rules are excluded from compilation entirely.
    pub active: bool,

    /// Literal substring to match in a request URL. Not a pattern language;
    /// it is escaped before being used inside one.
    pub search: String,

    /// Literal substring substituted in place of `search`.
    pub replace: String,

    /// When true, the redirect is gated on having captured headers and
    /// header-mirroring rules are installed alongside it.
    pub preserve_auth: bool,

    /// Headers observed on traffic to the original destination, populated
    /// only by the header sniffer. Absent until a matching request has been
    /// seen.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_headers: Option<BTreeMap<String, String>>,
}

impl Rule {
    /// Create a rule with the defaults the UI uses for new entries:
    /// active, auth preservation on, nothing captured yet.
    pub fn new(search: impl Into<String>, replace: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            active: true,
            search: search.into(),
            replace: replace.into(),
            preserve_auth: true,
            captured_headers: None,
        }
    }

    /// Whether at least one header has been captured for this rule.
    pub fn has_captured_headers(&self) -> bool {
        self.captured_headers
            .as_ref()
            .map_or(false, |headers| !headers.is_empty())
    }
}

/// Partial update for a rule, as submitted by the UI. Absent fields are left
/// untouched. Captured headers are owned by the sniffer and cannot be edited
/// through this path.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleUpdate {
    pub active: Option<bool>,
    pub search: Option<String>,
    pub replace: Option<String>,
    pub preserve_auth: Option<bool>,
}

impl RuleUpdate {
    /// Apply the present fields onto `rule`.
    pub fn apply(&self, rule: &mut Rule) {
        if let Some(active) = self.active {
            rule.active = active;
        }
        if let Some(search) = &self.search {
            rule.search = search.clone();
        }
        if let Some(replace) = &self.replace {
            rule.replace = replace.clone();
        }
        if let Some(preserve_auth) = self.preserve_auth {
            rule.preserve_auth = preserve_auth;
        }
    }
}

/// Top-level persisted aggregate: the master kill switch plus the ordered
/// rule list. Read in full at the start of every event and written back in
/// full at the end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    /// Global kill switch; when off, no compiled rules are installed
    /// regardless of individual rule state.
    pub master_switch: bool,

    pub rules: Vec<Rule>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            master_switch: true,
            rules: Vec::new(),
        }
    }
}

impl AppState {
    pub fn rule(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|rule| rule.id == id)
    }

    pub fn rule_mut(&mut self, id: &str) -> Option<&mut Rule> {
        self.rules.iter_mut().find(|rule| rule.id == id)
    }

    /// Remove the rule with the given id; returns whether it existed.
    pub fn remove_rule(&mut self, id: &str) -> bool {
        let before = self.rules.len();
        self.rules.retain(|rule| rule.id != id);
        self.rules.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state() {
        let state = AppState::default();
        assert!(state.master_switch);
        assert!(state.rules.is_empty());
    }

    #[test]
    fn test_new_rule_defaults() {
        let rule = Rule::new("api.old.com", "api.new.com");
        assert!(rule.active);
        assert!(rule.preserve_auth);
        assert!(rule.captured_headers.is_none());
        assert!(!rule.has_captured_headers());
        assert!(!rule.id.is_empty());
    }

    #[test]
    fn test_wire_shape_is_camel_case() {
        let mut rule = Rule::new("a", "b");
        rule.id = "r1".to_string();
        let state = AppState {
            master_switch: false,
            rules: vec![rule],
        };

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["masterSwitch"], serde_json::json!(false));
        assert_eq!(json["rules"][0]["preserveAuth"], serde_json::json!(true));
        // Absent captured headers are omitted, not serialized as null
        assert!(json["rules"][0].get("capturedHeaders").is_none());
    }

    #[test]
    fn test_round_trip_with_captured_headers() {
        let mut rule = Rule::new("api.old.com", "api.new.com");
        rule.captured_headers = Some(BTreeMap::from([(
            "Authorization".to_string(),
            "Bearer xyz".to_string(),
        )]));
        let state = AppState {
            master_switch: true,
            rules: vec![rule],
        };

        let json = serde_json::to_string(&state).unwrap();
        let parsed: AppState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, state);
    }

    #[test]
    fn test_partial_update() {
        let mut rule = Rule::new("api.old.com", "api.new.com");
        rule.captured_headers = Some(BTreeMap::from([("X".to_string(), "1".to_string())]));

        let update = RuleUpdate {
            active: Some(false),
            preserve_auth: Some(false),
            ..Default::default()
        };
        update.apply(&mut rule);

        assert!(!rule.active);
        assert!(!rule.preserve_auth);
        // Untouched fields survive
        assert_eq!(rule.search, "api.old.com");
        assert!(rule.has_captured_headers());
    }

    #[test]
    fn test_remove_rule() {
        let mut state = AppState::default();
        let rule = Rule::new("a", "b");
        let id = rule.id.clone();
        state.rules.push(rule);

        assert!(state.remove_rule(&id));
        assert!(!state.remove_rule(&id));
        assert!(state.rules.is_empty());
    }
}
