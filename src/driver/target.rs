use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::DriverSession;
use crate::error::{DriverError, Result};

/// One open tab as reported by the control endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(rename = "type", default)]
    pub target_type: String,
    pub web_socket_debugger_url: Option<String>,
}

impl Target {
    pub fn is_page(&self) -> bool {
        self.target_type == "page"
    }
}

/// Ids in the known set that the fresh listing no longer contains. The
/// listing is the only source of truth for target existence, so these are
/// dropped together with their bindings and buffers.
fn vanished_ids(known: &HashMap<String, Target>, listed: &[Target]) -> Vec<String> {
    known
        .keys()
        .filter(|id| !listed.iter().any(|t| &t.id == *id))
        .cloned()
        .collect()
}

impl DriverSession {
    fn control_url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.cdp_port, path)
    }

    /// Query the control endpoint for all page-type targets and replace the
    /// known set with the result.
    pub async fn list_targets(&self) -> Result<Vec<Target>> {
        let response = self
            .http
            .get(self.control_url("/json/list"))
            .send()
            .await
            .map_err(|e| DriverError::ControlEndpoint(format!("Failed to list targets: {}", e)))?;

        let listed: Vec<Target> = response.json().await.map_err(|e| {
            DriverError::ControlEndpoint(format!("Malformed /json/list response: {}", e))
        })?;

        let pages: Vec<Target> = listed.into_iter().filter(Target::is_page).collect();

        let mut state = self.state.lock().await;
        for id in vanished_ids(&state.targets, &pages) {
            self.forget_target(&mut state, &id).await;
        }
        for target in &pages {
            state.targets.insert(target.id.clone(), target.clone());
        }

        Ok(pages)
    }

    /// Open a new tab at the given URL
    pub async fn open_target(&self, url: &str) -> Result<Target> {
        let endpoint = format!(
            "{}?{}",
            self.control_url("/json/new"),
            urlencoding::encode(url)
        );

        let response = self.http.put(&endpoint).send().await.map_err(|e| {
            DriverError::ControlEndpoint(format!("Failed to open target: {}", e))
        })?;

        if !response.status().is_success() {
            return Err(DriverError::ControlEndpoint(format!(
                "/json/new returned {}",
                response.status()
            )));
        }

        let mut target: Target = response.json().await.map_err(|e| {
            DriverError::ControlEndpoint(format!("Malformed /json/new response: {}", e))
        })?;

        // The tab reports a real title once it has loaded
        if target.title.is_empty() {
            target.title = "Loading...".to_string();
        }
        if target.target_type.is_empty() {
            target.target_type = "page".to_string();
        }

        tracing::debug!("Opened target {} at {}", target.id, target.url);

        let mut state = self.state.lock().await;
        state.targets.insert(target.id.clone(), target.clone());

        Ok(target)
    }

    /// Bring a tab to the foreground
    pub async fn activate_target(&self, target_id: &str) -> Result<()> {
        let response = self
            .http
            .get(self.control_url(&format!("/json/activate/{}", target_id)))
            .send()
            .await
            .map_err(|e| {
                DriverError::ControlEndpoint(format!("Failed to activate target: {}", e))
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(DriverError::TargetNotFound(target_id.to_string()))
        }
    }

    /// Close a tab. Local state is cleaned up only after the endpoint
    /// confirms the close.
    pub async fn close_target(&self, target_id: &str) -> Result<()> {
        let response = self
            .http
            .get(self.control_url(&format!("/json/close/{}", target_id)))
            .send()
            .await
            .map_err(|e| DriverError::ControlEndpoint(format!("Failed to close target: {}", e)))?;

        if !response.status().is_success() {
            return Err(DriverError::TargetNotFound(target_id.to_string()));
        }

        let mut state = self.state.lock().await;
        self.forget_target(&mut state, target_id).await;

        tracing::debug!("Closed target {}", target_id);
        Ok(())
    }

    /// Last-known URL of a target, if the registry has seen it
    pub(crate) async fn target_url(&self, target_id: &str) -> Option<String> {
        let state = self.state.lock().await;
        state.targets.get(target_id).map(|t| t.url.clone())
    }

    /// Debug WebSocket URL for a target, refreshing the listing once when
    /// the target is unknown.
    pub(crate) async fn target_ws_url(&self, target_id: &str) -> Result<String> {
        if let Some(url) = self.lookup_ws_url(target_id).await {
            return Ok(url);
        }

        self.list_targets().await?;

        self.lookup_ws_url(target_id)
            .await
            .ok_or_else(|| DriverError::TargetNotFound(target_id.to_string()))
    }

    async fn lookup_ws_url(&self, target_id: &str) -> Option<String> {
        let state = self.state.lock().await;
        state
            .targets
            .get(target_id)
            .and_then(|t| t.web_socket_debugger_url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(id: &str, url: &str) -> Target {
        Target {
            id: id.to_string(),
            title: String::new(),
            url: url.to_string(),
            target_type: "page".to_string(),
            web_socket_debugger_url: None,
        }
    }

    #[test]
    fn parses_control_endpoint_listing() {
        let body = r#"[
            {
                "id": "A1B2",
                "title": "Example Domain",
                "type": "page",
                "url": "https://example.com/",
                "webSocketDebuggerUrl": "ws://127.0.0.1:9222/devtools/page/A1B2"
            },
            {
                "id": "SW01",
                "title": "worker",
                "type": "service_worker",
                "url": "https://example.com/sw.js"
            }
        ]"#;

        let targets: Vec<Target> = serde_json::from_str(body).unwrap();
        assert_eq!(targets.len(), 2);
        assert!(targets[0].is_page());
        assert!(!targets[1].is_page());
        assert_eq!(
            targets[0].web_socket_debugger_url.as_deref(),
            Some("ws://127.0.0.1:9222/devtools/page/A1B2")
        );
    }

    #[test]
    fn vanished_ids_reports_targets_missing_from_listing() {
        let mut known = HashMap::new();
        known.insert("keep".to_string(), target("keep", "https://a.example"));
        known.insert("gone".to_string(), target("gone", "https://b.example"));

        let listed = vec![target("keep", "https://a.example")];

        let vanished = vanished_ids(&known, &listed);
        assert_eq!(vanished, vec!["gone".to_string()]);
    }

    #[test]
    fn vanished_ids_empty_when_listing_covers_known_set() {
        let mut known = HashMap::new();
        known.insert("a".to_string(), target("a", "https://a.example"));

        let listed = vec![
            target("a", "https://a.example"),
            target("b", "https://b.example"),
        ];

        assert!(vanished_ids(&known, &listed).is_empty());
    }
}
