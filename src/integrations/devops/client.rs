//! Azure DevOps REST client.

use serde::Deserialize;

use super::{
    DevOpsError, DevOpsResult, Project, ProjectList, SearchResults, WorkItem, WorkItemQuery,
};
use crate::core::DevOpsConfig;

/// The work-items endpoint accepts at most this many IDs per call.
const BATCH_SIZE: usize = 200;

/// Azure DevOps API client.
#[derive(Debug, Clone)]
pub struct DevOpsClient {
    /// Organization name
    organization: String,
    /// Personal access token
    token: String,
    /// Service root (cloud or on-premises collection URL)
    base_url: String,
    /// REST API version
    api_version: String,
    /// Recency window for unfiltered searches
    default_window_days: u32,
    /// Result cap when a query sets none
    max_results: u32,
    /// HTTP client
    client: reqwest::Client,
}

impl DevOpsClient {
    /// Create a new client for an organization.
    pub fn new(organization: impl Into<String>, token: impl Into<String>) -> Self {
        let defaults = DevOpsConfig::default();
        Self {
            organization: organization.into(),
            token: token.into(),
            base_url: "https://dev.azure.com".to_string(),
            api_version: defaults.api_version,
            default_window_days: defaults.default_window_days,
            max_results: defaults.max_results,
            client: reqwest::Client::new(),
        }
    }

    /// Create from environment variables and configuration.
    ///
    /// Reads AZURE_DEVOPS_PAT and AZURE_DEVOPS_ORG (falling back to
    /// `devops.organization`). Missing values are a configuration error.
    pub fn from_env(config: &DevOpsConfig) -> DevOpsResult<Self> {
        let organization = std::env::var("AZURE_DEVOPS_ORG")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| config.organization.clone())
            .ok_or_else(|| DevOpsError::Configuration("AZURE_DEVOPS_ORG not set".to_string()))?;
        let token = std::env::var("AZURE_DEVOPS_PAT")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| DevOpsError::Configuration("AZURE_DEVOPS_PAT not set".to_string()))?;

        Ok(Self::new(organization, token).with_config(config))
    }

    /// Apply window, cap and API version from configuration.
    pub fn with_config(mut self, config: &DevOpsConfig) -> Self {
        self.api_version = config.api_version.clone();
        self.default_window_days = config.default_window_days;
        self.max_results = config.max_results;
        self
    }

    /// Use a different service root (e.g. an on-premises server).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Build an organization-scoped API URL.
    fn org_url(&self, path: &str) -> String {
        format!(
            "{}/{}/_apis/{}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(&self.organization),
            path
        )
    }

    /// Make an authenticated request.
    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .basic_auth("", Some(&self.token))
            .header("Accept", "application/json")
            .header("User-Agent", "docforge")
    }

    /// Parse error response from the API.
    async fn parse_error(&self, response: reqwest::Response) -> DevOpsError {
        let status = response.status().as_u16();

        match status {
            // 203 is the sign-in page served for an invalid token
            203 | 401 => DevOpsError::Unauthorized,
            404 => DevOpsError::NotFound("Resource not found".to_string()),
            _ => {
                let message = response
                    .json::<serde_json::Value>()
                    .await
                    .ok()
                    .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
                    .unwrap_or_else(|| format!("HTTP {}", status));
                DevOpsError::Api { status, message }
            }
        }
    }

    /// List team projects in the organization.
    pub async fn list_projects(&self) -> DevOpsResult<ProjectList> {
        #[derive(Deserialize)]
        struct Response {
            value: Vec<Project>,
        }

        let url = format!("{}?api-version={}", self.org_url("projects"), self.api_version);
        let response = self.request(reqwest::Method::GET, &url).send().await?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(self.parse_error(response).await);
        }

        let mut projects = response.json::<Response>().await?.value;
        projects.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));

        tracing::debug!(count = projects.len(), "Listed Azure DevOps projects");
        Ok(ProjectList { success: true, count: projects.len(), projects })
    }

    /// Search work items.
    pub async fn search(&self, query: &WorkItemQuery) -> DevOpsResult<SearchResults> {
        #[derive(Deserialize)]
        struct Reference {
            id: u64,
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct WiqlResponse {
            #[serde(default)]
            work_items: Vec<Reference>,
        }

        let wiql = query.to_wiql(self.default_window_days)?;
        let top = query.max_results.unwrap_or(self.max_results).max(1);

        tracing::debug!(%wiql, top, "Running work item query");

        let url = format!(
            "{}?api-version={}&$top={}",
            self.org_url("wit/wiql"),
            self.api_version,
            top
        );
        let response = self
            .request(reqwest::Method::POST, &url)
            .json(&serde_json::json!({ "query": wiql }))
            .send()
            .await?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(self.parse_error(response).await);
        }

        let ids: Vec<u64> = response
            .json::<WiqlResponse>()
            .await?
            .work_items
            .into_iter()
            .map(|r| r.id)
            .take(top as usize)
            .collect();

        let work_items = self.fetch_work_items(&ids).await?;

        tracing::info!(count = work_items.len(), "Work item search complete");
        Ok(SearchResults { success: true, count: work_items.len(), work_items })
    }

    /// Fetch full work items in query order, skipping deleted ones.
    async fn fetch_work_items(&self, ids: &[u64]) -> DevOpsResult<Vec<WorkItem>> {
        #[derive(Deserialize)]
        struct Response {
            value: Vec<Option<WorkItem>>,
        }

        let mut items = Vec::with_capacity(ids.len());

        for chunk in ids.chunks(BATCH_SIZE) {
            let id_list: Vec<String> = chunk.iter().map(u64::to_string).collect();
            let url = format!(
                "{}?ids={}&errorPolicy=omit&api-version={}",
                self.org_url("wit/workitems"),
                id_list.join(","),
                self.api_version
            );

            let response = self.request(reqwest::Method::GET, &url).send().await?;

            if response.status() != reqwest::StatusCode::OK {
                return Err(self.parse_error(response).await);
            }

            items.extend(response.json::<Response>().await?.value.into_iter().flatten());
        }

        Ok(items)
    }
}
