//! Rule Compiler
//!
//! Deterministic mapping from the persisted [`AppState`] to the full set of
//! declarative engine rules that should be installed. The compiler is pure:
//! it rederives everything from the aggregate on every pass and leaves the
//! atomic install to the caller.
//!
//! Id allocation is an explicit policy: the u32 id space is partitioned into
//! three disjoint ranges keyed by role (redirect, request-header,
//! response-header), each holding [`MAX_RULES_PER_ROLE`] entries. A rule at
//! index `i` owns id `offset + i + 1` in each range it emits into.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CompileError;
use crate::state::AppState;

pub const REDIRECT_ID_OFFSET: u32 = 0;
pub const REQUEST_HEADER_ID_OFFSET: u32 = 20_000;
pub const RESPONSE_HEADER_ID_OFFSET: u32 = 40_000;

/// Capacity of each role's id range.
pub const MAX_RULES_PER_ROLE: u32 = 20_000;

// The three ranges must never overlap, whatever the offsets are tuned to.
const _: () = assert!(REDIRECT_ID_OFFSET + MAX_RULES_PER_ROLE <= REQUEST_HEADER_ID_OFFSET);
const _: () = assert!(REQUEST_HEADER_ID_OFFSET + MAX_RULES_PER_ROLE <= RESPONSE_HEADER_ID_OFFSET);

/// Redirects are evaluated ahead of header rules only to break ties when
/// several rules could apply to one request; the rules stay independent.
pub const REDIRECT_PRIORITY: u32 = 1;
pub const HEADER_PRIORITY: u32 = 2;

/// Resource kinds the interception engine distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    MainFrame,
    SubFrame,
    Stylesheet,
    Script,
    Image,
    Font,
    Object,
    XmlHttpRequest,
    Ping,
    CspReport,
    Media,
    Websocket,
    Other,
}

/// Redirect rules apply across every resource kind.
pub const ALL_RESOURCE_TYPES: &[ResourceType] = &[
    ResourceType::MainFrame,
    ResourceType::SubFrame,
    ResourceType::Stylesheet,
    ResourceType::Script,
    ResourceType::Image,
    ResourceType::Font,
    ResourceType::Object,
    ResourceType::XmlHttpRequest,
    ResourceType::Ping,
    ResourceType::CspReport,
    ResourceType::Media,
    ResourceType::Websocket,
    ResourceType::Other,
];

/// Header rules only target the kinds that carry credentials worth mirroring.
pub const MIRROR_RESOURCE_TYPES: &[ResourceType] = &[
    ResourceType::MainFrame,
    ResourceType::SubFrame,
    ResourceType::XmlHttpRequest,
    ResourceType::Script,
    ResourceType::Other,
];

/// URL condition of a compiled rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum UrlMatch {
    /// Anchored regex applied to the whole request URL.
    Pattern(String),
    /// Literal substring filter.
    Filter(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchCondition {
    pub url: UrlMatch,
    pub resource_types: Vec<ResourceType>,
}

impl MatchCondition {
    /// Check the URL part of the condition against a concrete request URL.
    pub fn matches_url(&self, url: &str) -> bool {
        match &self.url {
            UrlMatch::Pattern(pattern) => Regex::new(pattern)
                .map(|re| re.is_match(url))
                .unwrap_or(false),
            UrlMatch::Filter(substring) => url.contains(substring),
        }
    }
}

/// One header set operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderSet {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CompiledAction {
    /// Substitute the matched search text, keeping prefix and suffix. The
    /// template uses `regex` replacement syntax (`${1}`, `${2}`) so an
    /// engine can hand it to [`Regex::replace`] verbatim.
    Redirect { substitution: String },
    /// Mirror captured headers onto requests to the replacement URL.
    SetRequestHeaders { headers: Vec<HeaderSet> },
    /// Force permissive CORS headers on responses from the replacement URL.
    SetResponseHeaders { headers: Vec<HeaderSet> },
}

/// One declarative match/action unit installed into the interception engine.
/// Fully regenerated on every compilation pass; its only identity across
/// passes is the deterministic id scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledRule {
    pub id: u32,
    pub priority: u32,
    pub condition: MatchCondition,
    pub action: CompiledAction,
}

fn cors_headers() -> Vec<HeaderSet> {
    [
        ("Access-Control-Allow-Origin", "*"),
        (
            "Access-Control-Allow-Methods",
            "GET, POST, PUT, DELETE, OPTIONS, PATCH",
        ),
        ("Access-Control-Allow-Headers", "*"),
    ]
    .iter()
    .map(|(name, value)| HeaderSet {
        name: name.to_string(),
        value: value.to_string(),
    })
    .collect()
}

/// Compile the current state into the full set of rules to install.
///
/// With the master switch off the result is empty; the caller still removes
/// every previously installed id. Otherwise rules are filtered to
/// `active && search non-empty` and each surviving rule emits up to three
/// compiled rules:
///
/// - a redirect, unless the rule wants auth preservation and has not yet
///   captured any headers (in that case traffic keeps flowing to the origin
///   so the sniffer can observe it first),
/// - a request-header mirror, only when auth preservation is on and headers
///   exist,
/// - a CORS response-header rule, whenever the redirect is emitted.
pub fn compile(state: &AppState) -> Result<Vec<CompiledRule>, CompileError> {
    if !state.master_switch {
        return Ok(Vec::new());
    }

    let eligible: Vec<_> = state
        .rules
        .iter()
        .filter(|rule| rule.active && !rule.search.is_empty())
        .collect();

    if eligible.len() > MAX_RULES_PER_ROLE as usize {
        return Err(CompileError::TooManyRules {
            count: eligible.len(),
            max: MAX_RULES_PER_ROLE as usize,
        });
    }

    let mut compiled = Vec::new();

    for (index, rule) in eligible.iter().enumerate() {
        let index = index as u32;
        let has_headers = rule.has_captured_headers();
        let should_redirect = !rule.preserve_auth || has_headers;

        if should_redirect {
            // Minimal prefix, greedy suffix: replace only the first
            // occurrence of the search text, keep everything around it.
            compiled.push(CompiledRule {
                id: REDIRECT_ID_OFFSET + index + 1,
                priority: REDIRECT_PRIORITY,
                condition: MatchCondition {
                    url: UrlMatch::Pattern(format!("^(.*?){}(.*)$", regex::escape(&rule.search))),
                    resource_types: ALL_RESOURCE_TYPES.to_vec(),
                },
                action: CompiledAction::Redirect {
                    substitution: format!("${{1}}{}${{2}}", rule.replace),
                },
            });
        }

        if rule.preserve_auth && has_headers {
            let headers = rule
                .captured_headers
                .iter()
                .flatten()
                .map(|(name, value)| HeaderSet {
                    name: name.clone(),
                    value: value.clone(),
                })
                .collect();

            compiled.push(CompiledRule {
                id: REQUEST_HEADER_ID_OFFSET + index + 1,
                priority: HEADER_PRIORITY,
                condition: MatchCondition {
                    // Header mirroring matches the destination, not the origin.
                    url: UrlMatch::Filter(rule.replace.clone()),
                    resource_types: MIRROR_RESOURCE_TYPES.to_vec(),
                },
                action: CompiledAction::SetRequestHeaders { headers },
            });
        }

        if should_redirect {
            compiled.push(CompiledRule {
                id: RESPONSE_HEADER_ID_OFFSET + index + 1,
                priority: HEADER_PRIORITY,
                condition: MatchCondition {
                    url: UrlMatch::Filter(rule.replace.clone()),
                    resource_types: MIRROR_RESOURCE_TYPES.to_vec(),
                },
                action: CompiledAction::SetResponseHeaders {
                    headers: cors_headers(),
                },
            });
        }
    }

    Ok(compiled)
}
