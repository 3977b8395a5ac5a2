//! Compute Engine REST client
//!
//! Builds project-scoped URLs and walks `nextPageToken` pagination on top of
//! the retrying [`ApiClient`].

use crate::backends::json::extract_items;
use crate::error::Result;
use crate::session::ApiClient;
use serde_json::{json, Value};

/// Safety valve for runaway pagination
const MAX_PAGES: usize = 1000;

#[derive(Clone)]
pub struct ComputeClient {
    api: ApiClient,
    endpoint: String,
    project_id: String,
    region: String,
}

impl ComputeClient {
    pub fn new(api: ApiClient, endpoint: &str, project_id: &str, region: &str) -> Self {
        Self {
            api,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            project_id: project_id.to_string(),
            region: region.to_string(),
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Build Compute Engine API URL
    pub fn compute_url(&self, path: &str) -> String {
        format!("{}/projects/{}/{}", self.endpoint, self.project_id, path)
    }

    pub fn compute_zonal_url(&self, zone: &str, resource: &str) -> String {
        self.compute_url(&format!("zones/{}/{}", zone, resource))
    }

    /// Regional URL for the configured region; empty `resource` yields the
    /// region itself
    pub fn compute_regional_url(&self, resource: &str) -> String {
        if resource.is_empty() {
            self.compute_url(&format!("regions/{}", self.region))
        } else {
            self.compute_url(&format!("regions/{}/{}", self.region, resource))
        }
    }

    /// Aggregated URL (all zones)
    pub fn compute_aggregated_url(&self, resource: &str) -> String {
        self.compute_url(&format!("aggregated/{}", resource))
    }

    pub async fn get(&self, url: &str) -> Result<Value> {
        self.api.get(url).await
    }

    pub async fn post(&self, url: &str, body: Option<&Value>) -> Result<Value> {
        self.api.post(url, body).await
    }

    pub async fn delete(&self, url: &str) -> Result<Value> {
        self.api.delete(url).await
    }

    /// Fetch every page of a list call, collecting the `items` array
    pub async fn list_all(&self, url: &str) -> Result<Vec<Value>> {
        self.collect_pages(url, |response| extract_items(response, "items"))
            .await
    }

    /// Fetch every page of an aggregated list call, flattening the per-scope
    /// entries
    pub async fn list_aggregated(&self, resource: &str) -> Result<Vec<Value>> {
        let url = self.compute_aggregated_url(resource);
        self.collect_pages(&url, |response| {
            extract_items(&flatten_aggregated_response(response), "items")
        })
        .await
    }

    async fn collect_pages<F>(&self, url: &str, extract: F) -> Result<Vec<Value>>
    where
        F: Fn(&Value) -> Vec<Value>,
    {
        let mut all_items = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let page_url = match &page_token {
                Some(token) => add_page_token(url, token),
                None => url.to_string(),
            };
            let response = self.api.get(&page_url).await?;
            all_items.extend(extract(&response));

            page_token = response
                .get("nextPageToken")
                .and_then(|v| v.as_str())
                .filter(|t| !t.is_empty())
                .map(str::to_string);
            if page_token.is_none() {
                break;
            }
        }

        Ok(all_items)
    }
}

fn add_page_token(url: &str, token: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}pageToken={}", url, separator, urlencoding::encode(token))
}

/// Merge the per-zone buckets of an aggregated response into one `items` array
///
/// Each bucket carries its resources under a type-specific key (`instances`,
/// `machineTypes`) next to an optional `warning` for empty scopes.
pub fn flatten_aggregated_response(response: &Value) -> Value {
    let Some(items) = response.get("items").and_then(|v| v.as_object()) else {
        return json!({ "items": [] });
    };

    let all_items: Vec<Value> = items
        .values()
        .filter_map(|scope| scope.as_object())
        .flat_map(|scope| {
            scope
                .iter()
                .filter(|(key, _)| key.as_str() != "warning")
                .filter_map(|(_, value)| value.as_array())
                .flatten()
                .cloned()
        })
        .collect();

    json!({ "items": all_items })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_aggregated_response() {
        let response = json!({
            "items": {
                "zones/us-central1-a": {"instances": [{"name": "a"}, {"name": "b"}]},
                "zones/us-central1-b": {"warning": {"code": "NO_RESULTS_ON_PAGE"}},
                "zones/us-central1-c": {"instances": [{"name": "c"}]}
            }
        });
        let flat = flatten_aggregated_response(&response);
        assert_eq!(flat["items"].as_array().map(|a| a.len()), Some(3));
    }

    #[test]
    fn test_flatten_without_items() {
        assert_eq!(flatten_aggregated_response(&json!({})), json!({ "items": [] }));
    }

    #[test]
    fn test_add_page_token() {
        assert_eq!(add_page_token("https://x/y", "a b"), "https://x/y?pageToken=a%20b");
        assert_eq!(add_page_token("https://x/y?filter=1", "t"), "https://x/y?filter=1&pageToken=t");
    }
}
