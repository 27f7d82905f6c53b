//! Rule Engine seam
//!
//! The interception runtime that actually applies compiled rules to live
//! traffic is an external collaborator; this module defines its interface
//! and an in-memory implementation used by the daemon's inspection API and
//! by tests. The one hard requirement is that `replace` is all-or-nothing:
//! live matching never observes a half-swapped rule set.

use std::collections::BTreeMap;

use async_trait::async_trait;
use regex::Regex;
use tokio::sync::RwLock;

use crate::compiler::{CompiledAction, CompiledRule, UrlMatch};
use crate::error::EngineError;

#[async_trait]
pub trait RuleEngine: Send + Sync {
    /// Ids of every currently installed compiled rule, whatever installed it.
    async fn installed_ids(&self) -> Vec<u32>;

    /// Atomically remove `remove_ids` and install `add_rules`. On error
    /// nothing changes.
    async fn replace(
        &self,
        remove_ids: &[u32],
        add_rules: Vec<CompiledRule>,
    ) -> Result<(), EngineError>;
}

/// Priority-ordered declarative matcher over an installed rule set.
#[derive(Default)]
pub struct InMemoryEngine {
    rules: RwLock<BTreeMap<u32, CompiledRule>>,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installed rules in id order.
    pub async fn snapshot(&self) -> Vec<CompiledRule> {
        self.rules.read().await.values().cloned().collect()
    }

    /// Apply the first matching redirect rule to `url`, substituting the
    /// matched search text and keeping prefix and suffix.
    pub async fn rewrite(&self, url: &str) -> Option<String> {
        let rules = self.rules.read().await;
        for rule in rules.values() {
            let CompiledAction::Redirect { substitution } = &rule.action else {
                continue;
            };
            let UrlMatch::Pattern(pattern) = &rule.condition.url else {
                continue;
            };
            // Patterns were validated on install
            let Ok(re) = Regex::new(pattern) else {
                continue;
            };
            if re.is_match(url) {
                return Some(re.replace(url, substitution.as_str()).into_owned());
            }
        }
        None
    }

    /// Headers that request-header rules would set on a request to `url`.
    pub async fn request_headers_for(&self, url: &str) -> Vec<(String, String)> {
        self.headers_for(url, true).await
    }

    /// Headers that response-header rules would set on a response from `url`.
    pub async fn response_headers_for(&self, url: &str) -> Vec<(String, String)> {
        self.headers_for(url, false).await
    }

    async fn headers_for(&self, url: &str, request: bool) -> Vec<(String, String)> {
        let rules = self.rules.read().await;
        rules
            .values()
            .filter(|rule| rule.condition.matches_url(url))
            .flat_map(|rule| match (&rule.action, request) {
                (CompiledAction::SetRequestHeaders { headers }, true)
                | (CompiledAction::SetResponseHeaders { headers }, false) => headers.clone(),
                _ => Vec::new(),
            })
            .map(|header| (header.name, header.value))
            .collect()
    }
}

#[async_trait]
impl RuleEngine for InMemoryEngine {
    async fn installed_ids(&self) -> Vec<u32> {
        self.rules.read().await.keys().copied().collect()
    }

    async fn replace(
        &self,
        remove_ids: &[u32],
        add_rules: Vec<CompiledRule>,
    ) -> Result<(), EngineError> {
        // Validate patterns up front so a malformed rule cannot land
        for rule in &add_rules {
            if let UrlMatch::Pattern(pattern) = &rule.condition.url {
                Regex::new(pattern).map_err(|source| EngineError::InvalidPattern {
                    pattern: pattern.clone(),
                    source,
                })?;
            }
        }

        let mut installed = self.rules.write().await;
        let mut next = installed.clone();
        for id in remove_ids {
            next.remove(id);
        }
        for rule in add_rules {
            let id = rule.id;
            if next.insert(id, rule).is_some() {
                return Err(EngineError::DuplicateId(id));
            }
        }
        *installed = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{self, CompiledAction, MatchCondition, UrlMatch};
    use crate::state::{AppState, Rule};

    fn redirect_rule(id: u32, search: &str, replace: &str) -> CompiledRule {
        CompiledRule {
            id,
            priority: compiler::REDIRECT_PRIORITY,
            condition: MatchCondition {
                url: UrlMatch::Pattern(format!("^(.*?){}(.*)$", regex::escape(search))),
                resource_types: compiler::ALL_RESOURCE_TYPES.to_vec(),
            },
            action: CompiledAction::Redirect {
                substitution: format!("${{1}}{replace}${{2}}"),
            },
        }
    }

    #[tokio::test]
    async fn test_replace_swaps_the_full_set() {
        let engine = InMemoryEngine::new();
        engine
            .replace(&[], vec![redirect_rule(1, "a.example", "b.example")])
            .await
            .unwrap();
        assert_eq!(engine.installed_ids().await, vec![1]);

        engine
            .replace(&[1], vec![redirect_rule(5, "c.example", "d.example")])
            .await
            .unwrap();
        assert_eq!(engine.installed_ids().await, vec![5]);
    }

    #[tokio::test]
    async fn test_duplicate_id_leaves_engine_untouched() {
        let engine = InMemoryEngine::new();
        engine
            .replace(&[], vec![redirect_rule(1, "a.example", "b.example")])
            .await
            .unwrap();

        let err = engine
            .replace(&[], vec![redirect_rule(1, "c.example", "d.example")])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateId(1)));

        // The original rule is still the installed one
        let rewritten = engine.rewrite("https://a.example/path").await.unwrap();
        assert_eq!(rewritten, "https://b.example/path");
    }

    #[tokio::test]
    async fn test_rewrite_preserves_prefix_and_suffix() {
        let engine = InMemoryEngine::new();
        engine
            .replace(&[], vec![redirect_rule(1, "api.old.com", "api.new.com")])
            .await
            .unwrap();

        let rewritten = engine
            .rewrite("https://api.old.com/v1/users?page=2")
            .await
            .unwrap();
        assert_eq!(rewritten, "https://api.new.com/v1/users?page=2");

        assert!(engine.rewrite("https://unrelated.example/").await.is_none());
    }

    #[tokio::test]
    async fn test_header_rules_match_the_destination() {
        let engine = InMemoryEngine::new();

        let mut rule = Rule::new("api.old.com", "api.new.com");
        rule.captured_headers = Some(std::collections::BTreeMap::from([(
            "Authorization".to_string(),
            "Bearer xyz".to_string(),
        )]));
        let state = AppState {
            master_switch: true,
            rules: vec![rule],
        };
        engine
            .replace(&[], compiler::compile(&state).unwrap())
            .await
            .unwrap();

        let request_headers = engine
            .request_headers_for("https://api.new.com/v1/users")
            .await;
        assert_eq!(
            request_headers,
            vec![("Authorization".to_string(), "Bearer xyz".to_string())]
        );

        let response_headers = engine.response_headers_for("https://api.new.com/").await;
        assert!(response_headers
            .iter()
            .any(|(name, value)| name == "Access-Control-Allow-Origin" && value == "*"));

        assert!(engine
            .request_headers_for("https://api.old.com/")
            .await
            .is_empty());
    }
}
