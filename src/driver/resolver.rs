//! Correlates control-endpoint targets with automation-layer page handles.
//!
//! The two surfaces share no identifiers, so binding is heuristic: an
//! ordered chain of rules, first match wins. URL equality beats recency,
//! recency beats arbitrary choice. Two tabs opened concurrently to the same
//! URL can still bind to the wrong handle; callers that need exact
//! correlation must serialize tab creation.

use std::time::SystemTime;

use chromiumoxide::page::Page;
use tokio::time::sleep;

use super::{DriverSession, PageBinding};
use crate::error::{DriverError, Result};

/// Snapshot of one open automation handle at resolution time
#[derive(Debug, Clone)]
pub(crate) struct HandleInfo {
    /// The handle's own identity within the automation layer
    pub handle_id: String,
    /// URL the handle currently reports
    pub url: String,
}

/// One correlation rule over the handle snapshot. Returns the index of the
/// candidate to bind, or None when the rule does not apply. Rules are pure
/// so each is independently testable and the chain order stays an explicit
/// contract rather than incidental control flow.
type Matcher = fn(Option<&str>, &[HandleInfo], &[String]) -> Option<usize>;

pub(crate) const MATCHER_CHAIN: &[(&str, Matcher)] = &[
    ("exact-url", match_exact_url),
    ("single-handle", match_single_handle),
    ("most-recent-unbound", match_most_recent_unbound),
];

/// The target's last-known URL equals exactly one handle's current URL
fn match_exact_url(
    target_url: Option<&str>,
    candidates: &[HandleInfo],
    _bound: &[String],
) -> Option<usize> {
    let url = target_url?;
    let mut hits = candidates.iter().enumerate().filter(|(_, c)| c.url == url);
    let (index, _) = hits.next()?;
    if hits.next().is_some() {
        // Ambiguous; defer to later rules
        return None;
    }
    Some(index)
}

/// Exactly one handle is open and nothing has been bound yet
fn match_single_handle(
    _target_url: Option<&str>,
    candidates: &[HandleInfo],
    bound: &[String],
) -> Option<usize> {
    (candidates.len() == 1 && bound.is_empty()).then_some(0)
}

/// The most recently created handle not already bound to another target
fn match_most_recent_unbound(
    _target_url: Option<&str>,
    candidates: &[HandleInfo],
    bound: &[String],
) -> Option<usize> {
    candidates
        .iter()
        .enumerate()
        .rev()
        .find(|(_, c)| !bound.contains(&c.handle_id))
        .map(|(index, _)| index)
}

/// A handle is considered open while it still answers a URL round-trip
async fn handle_is_open(page: &Page) -> bool {
    page.url().await.is_ok()
}

pub(crate) fn handle_id(page: &Page) -> String {
    page.target_id().inner().clone()
}

impl DriverSession {
    /// Resolve the automation handle for a target, binding one lazily.
    /// Idempotent: consecutive calls while the tab stays open return the
    /// same handle.
    pub async fn resolve(&self, target_id: &str) -> Result<Page> {
        let cached = {
            let state = self.state.lock().await;
            state.bindings.get(target_id).map(|b| b.page.clone())
        };
        if let Some(page) = cached {
            if handle_is_open(&page).await {
                return Ok(page);
            }
            tracing::debug!("Evicting closed handle binding for target {}", target_id);
            self.state.lock().await.bindings.remove(target_id);
        }

        let browser = self
            .automation_browser()
            .map_err(|_| DriverError::ResolutionFailed(target_id.to_string()))?;

        // Let the automation layer observe a just-created tab
        sleep(self.settle_delay).await;

        let pages = browser
            .pages()
            .await
            .map_err(|_| DriverError::ResolutionFailed(target_id.to_string()))?;

        let mut candidates = Vec::new();
        let mut handles = Vec::new();
        for page in pages {
            // A handle that no longer answers is already on its way out
            match page.url().await {
                Ok(url) => {
                    candidates.push(HandleInfo {
                        handle_id: handle_id(&page),
                        url: url.unwrap_or_default(),
                    });
                    handles.push(page);
                }
                Err(_) => continue,
            }
        }

        let target_url = self.target_url(target_id).await;

        let mut state = self.state.lock().await;
        // Another in-flight resolution may have bound while we enumerated
        if let Some(binding) = state.bindings.get(target_id) {
            return Ok(binding.page.clone());
        }

        let bound: Vec<String> = state
            .bindings
            .values()
            .map(|b| handle_id(&b.page))
            .collect();

        for (rule, matcher) in MATCHER_CHAIN {
            if let Some(index) = matcher(target_url.as_deref(), &candidates, &bound) {
                let page = handles[index].clone();
                tracing::debug!("Bound target {} via '{}' rule", target_id, rule);
                state.bindings.insert(
                    target_id.to_string(),
                    PageBinding {
                        page: page.clone(),
                        bound_at: SystemTime::now(),
                    },
                );
                return Ok(page);
            }
        }

        Err(DriverError::ResolutionFailed(target_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, url: &str) -> HandleInfo {
        HandleInfo {
            handle_id: id.to_string(),
            url: url.to_string(),
        }
    }

    #[test]
    fn chain_order_is_url_then_single_then_recency() {
        let names: Vec<&str> = MATCHER_CHAIN.iter().map(|(name, _)| *name).collect();
        assert_eq!(
            names,
            vec!["exact-url", "single-handle", "most-recent-unbound"]
        );
    }

    #[test]
    fn exact_url_matches_single_hit() {
        let candidates = vec![
            candidate("h1", "https://a.example/"),
            candidate("h2", "https://b.example/"),
        ];
        assert_eq!(
            match_exact_url(Some("https://b.example/"), &candidates, &[]),
            Some(1)
        );
    }

    #[test]
    fn exact_url_refuses_ambiguous_hits() {
        let candidates = vec![
            candidate("h1", "https://dup.example/"),
            candidate("h2", "https://dup.example/"),
        ];
        assert_eq!(
            match_exact_url(Some("https://dup.example/"), &candidates, &[]),
            None
        );
    }

    #[test]
    fn exact_url_needs_a_known_target_url() {
        let candidates = vec![candidate("h1", "https://a.example/")];
        assert_eq!(match_exact_url(None, &candidates, &[]), None);
    }

    #[test]
    fn single_handle_applies_only_with_no_bindings() {
        let candidates = vec![candidate("h1", "https://a.example/")];
        assert_eq!(match_single_handle(None, &candidates, &[]), Some(0));
        assert_eq!(
            match_single_handle(None, &candidates, &["h9".to_string()]),
            None
        );
    }

    #[test]
    fn single_handle_refuses_multiple_candidates() {
        let candidates = vec![
            candidate("h1", "https://a.example/"),
            candidate("h2", "https://b.example/"),
        ];
        assert_eq!(match_single_handle(None, &candidates, &[]), None);
    }

    #[test]
    fn most_recent_unbound_scans_from_the_tail() {
        let candidates = vec![
            candidate("h1", "https://a.example/"),
            candidate("h2", "https://b.example/"),
            candidate("h3", "https://c.example/"),
        ];
        assert_eq!(
            match_most_recent_unbound(None, &candidates, &["h3".to_string()]),
            Some(1)
        );
    }

    #[test]
    fn most_recent_unbound_fails_when_everything_is_bound() {
        let candidates = vec![candidate("h1", "https://a.example/")];
        assert_eq!(
            match_most_recent_unbound(None, &candidates, &["h1".to_string()]),
            None
        );
    }

    #[test]
    fn chain_prefers_url_match_over_recency() {
        let candidates = vec![
            candidate("h1", "https://wanted.example/"),
            candidate("h2", "https://other.example/"),
        ];
        let bound: Vec<String> = Vec::new();

        let selected = MATCHER_CHAIN
            .iter()
            .find_map(|(_, m)| m(Some("https://wanted.example/"), &candidates, &bound));
        assert_eq!(selected, Some(0));
    }
}
