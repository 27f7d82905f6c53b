//! Header Sniffer
//!
//! Observes outbound request headers and folds a safe subset of them into
//! the rule that matched the request's URL. Observation is advisory: it
//! never touches the request itself, and [`capture`] only mutates the given
//! state copy — persisting a changed aggregate is the caller's job.

use std::collections::BTreeMap;

use tracing::debug;

use crate::state::AppState;

/// Header names excluded from mirroring: browser-managed, transport-critical,
/// or unsafe to copy verbatim across origins.
pub const UNSAFE_HEADERS: &[&str] = &[
    "host",
    "connection",
    "content-length",
    "expect",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "cookie",
    "sec-ch-ua",
    "sec-ch-ua-mobile",
    "sec-ch-ua-platform",
    "sec-fetch-dest",
    "sec-fetch-mode",
    "sec-fetch-site",
    "sec-fetch-user",
    "user-agent",
];

/// Case-insensitive membership test against [`UNSAFE_HEADERS`].
pub fn is_unsafe_header(name: &str) -> bool {
    UNSAFE_HEADERS
        .iter()
        .any(|unsafe_name| name.eq_ignore_ascii_case(unsafe_name))
}

/// Build the captured-header map for one observed request, dropping unsafe
/// names and empty values.
fn build_capture(headers: &[(String, String)]) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter(|(name, value)| !is_unsafe_header(name) && !value.is_empty())
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Whether the freshly built map differs from the previous capture: any
/// included value changed, or the number of captured headers changed (which
/// also covers headers that disappeared between observations).
fn capture_changed(
    previous: Option<&BTreeMap<String, String>>,
    fresh: &BTreeMap<String, String>,
) -> bool {
    match previous {
        Some(old) => {
            old.len() != fresh.len()
                || fresh.iter().any(|(name, value)| old.get(name) != Some(value))
        }
        None => !fresh.is_empty(),
    }
}

/// Fold one observed request into the state. Returns whether any rule's
/// captured headers changed, in which case the caller persists the whole
/// aggregate (which in turn triggers recompilation).
///
/// Capture matches by raw substring containment of `search` in the URL —
/// deliberately broader than the compiled redirect's anchored pattern, so
/// header state can populate before any redirect is installed.
pub fn capture(state: &mut AppState, url: &str, headers: &[(String, String)]) -> bool {
    if !state.master_switch {
        return false;
    }

    let mut changed = false;

    for rule in state
        .rules
        .iter_mut()
        .filter(|rule| rule.active && rule.preserve_auth)
    {
        if !url.contains(&rule.search) {
            continue;
        }

        let fresh = build_capture(headers);
        if capture_changed(rule.captured_headers.as_ref(), &fresh) {
            debug!(
                rule_id = %rule.id,
                search = %rule.search,
                count = fresh.len(),
                "captured headers from origin traffic"
            );
            // Full replace, not merge: headers absent from the latest
            // request are dropped.
            rule.captured_headers = Some(fresh);
            changed = true;
        }
    }

    changed
}
