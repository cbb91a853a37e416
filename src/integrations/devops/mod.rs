//! Azure DevOps work-item import.
//!
//! Lists projects and searches work items so their titles and descriptions
//! can be ingested as source content. Searches are expressed as a
//! [`WorkItemQuery`] and rendered to WIQL; an unfiltered search is bounded
//! by a recency window on the changed date.

#[cfg(feature = "devops")]
mod client;

#[cfg(feature = "devops")]
pub use client::DevOpsClient;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A team project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Project ID (GUID)
    pub id: String,
    /// Project name
    pub name: String,
    /// Project description
    #[serde(default)]
    pub description: Option<String>,
}

/// Result of listing projects.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectList {
    pub success: bool,
    pub projects: Vec<Project>,
    pub count: usize,
}

/// A work item as returned by the work-items API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    /// Work item ID
    pub id: u64,
    /// REST URL of the work item
    #[serde(default)]
    pub url: String,
    /// Field values
    #[serde(default)]
    pub fields: WorkItemFields,
}

/// Work item fields of interest. Everything else lands in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkItemFields {
    #[serde(rename = "System.Title", default)]
    pub title: String,

    #[serde(rename = "System.Description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(rename = "System.State", default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    #[serde(rename = "System.WorkItemType", default, skip_serializing_if = "Option::is_none")]
    pub work_item_type: Option<String>,

    #[serde(rename = "System.TeamProject", default, skip_serializing_if = "Option::is_none")]
    pub team_project: Option<String>,

    #[serde(rename = "System.CreatedDate", default, skip_serializing_if = "Option::is_none")]
    pub created_date: Option<String>,

    #[serde(rename = "System.ChangedDate", default, skip_serializing_if = "Option::is_none")]
    pub changed_date: Option<String>,

    #[serde(rename = "System.Tags", default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,

    #[serde(rename = "System.AreaPath", default, skip_serializing_if = "Option::is_none")]
    pub area_path: Option<String>,

    #[serde(rename = "System.IterationPath", default, skip_serializing_if = "Option::is_none")]
    pub iteration_path: Option<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Result of a work-item search.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    pub success: bool,
    pub work_items: Vec<WorkItem>,
    pub count: usize,
}

/// Work item search filters. Every filter is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkItemQuery {
    /// Free text matched against title and description
    pub search_text: Option<String>,
    /// Work item types (Bug, User Story, ...)
    pub work_item_types: Vec<String>,
    /// States (Active, Closed, ...)
    pub states: Vec<String>,
    /// Team project names
    pub projects: Vec<String>,
    /// Iteration path (matches the path and everything under it)
    pub iteration_path: Option<String>,
    /// Assignee display name, email, or `@Me`
    pub assigned_to: Option<String>,
    /// Creator display name, email, or `@Me`
    pub created_by: Option<String>,
    pub created_date_from: Option<NaiveDate>,
    pub created_date_to: Option<NaiveDate>,
    pub changed_date_from: Option<NaiveDate>,
    pub changed_date_to: Option<NaiveDate>,
    /// Result cap
    pub max_results: Option<u32>,
}

/// Result type for Azure DevOps operations.
pub type DevOpsResult<T> = Result<T, DevOpsError>;

/// Error types for Azure DevOps operations.
#[derive(Debug, thiserror::Error)]
pub enum DevOpsError {
    #[error("Azure DevOps not configured: {0}")]
    Configuration(String),

    #[error("HTTP request failed: {0}")]
    Transport(String),

    #[error("Azure DevOps API error: {message} (status: {status})")]
    Api { status: u16, message: String },

    #[error("Authentication failed, check AZURE_DEVOPS_PAT")]
    Unauthorized,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid filter: {0}")]
    InvalidInput(String),

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
}

#[cfg(feature = "devops")]
impl From<reqwest::Error> for DevOpsError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::InvalidResponse(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

fn non_blank(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

fn non_blank_list(values: &[String]) -> Vec<&str> {
    values.iter().map(|v| v.trim()).filter(|v| !v.is_empty()).collect()
}

/// Quote a WIQL string literal.
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn identity(value: &str) -> String {
    if value.eq_ignore_ascii_case("@me") {
        "@Me".to_string()
    } else {
        quote(value)
    }
}

impl WorkItemQuery {
    /// Whether any filter is set.
    pub fn has_filters(&self) -> bool {
        non_blank(self.search_text.as_ref()).is_some()
            || !non_blank_list(&self.work_item_types).is_empty()
            || !non_blank_list(&self.states).is_empty()
            || !non_blank_list(&self.projects).is_empty()
            || non_blank(self.iteration_path.as_ref()).is_some()
            || non_blank(self.assigned_to.as_ref()).is_some()
            || non_blank(self.created_by.as_ref()).is_some()
            || self.created_date_from.is_some()
            || self.created_date_to.is_some()
            || self.changed_date_from.is_some()
            || self.changed_date_to.is_some()
    }

    /// Render the query as WIQL.
    ///
    /// Without filters, only items changed in the last `default_window_days`
    /// days are matched.
    pub fn to_wiql(&self, default_window_days: u32) -> DevOpsResult<String> {
        check_range("created", self.created_date_from, self.created_date_to)?;
        check_range("changed", self.changed_date_from, self.changed_date_to)?;

        let mut clauses = Vec::new();

        if let Some(text) = non_blank(self.search_text.as_ref()) {
            let text = quote(text);
            clauses.push(format!(
                "([System.Title] CONTAINS {text} OR [System.Description] CONTAINS {text})"
            ));
        }

        let in_clause = |field: &str, values: &[String]| {
            let values = non_blank_list(values);
            (!values.is_empty()).then(|| {
                let quoted: Vec<String> = values.iter().map(|v| quote(v)).collect();
                format!("[{}] IN ({})", field, quoted.join(", "))
            })
        };

        clauses.extend(in_clause("System.WorkItemType", &self.work_item_types));
        clauses.extend(in_clause("System.State", &self.states));
        clauses.extend(in_clause("System.TeamProject", &self.projects));

        if let Some(path) = non_blank(self.iteration_path.as_ref()) {
            clauses.push(format!("[System.IterationPath] UNDER {}", quote(path)));
        }
        if let Some(who) = non_blank(self.assigned_to.as_ref()) {
            clauses.push(format!("[System.AssignedTo] = {}", identity(who)));
        }
        if let Some(who) = non_blank(self.created_by.as_ref()) {
            clauses.push(format!("[System.CreatedBy] = {}", identity(who)));
        }

        let dates = [
            ("System.CreatedDate", ">=", self.created_date_from),
            ("System.CreatedDate", "<=", self.created_date_to),
            ("System.ChangedDate", ">=", self.changed_date_from),
            ("System.ChangedDate", "<=", self.changed_date_to),
        ];
        for (field, op, date) in dates {
            if let Some(date) = date {
                clauses.push(format!("[{}] {} '{}'", field, op, date.format("%Y-%m-%d")));
            }
        }

        if clauses.is_empty() {
            clauses.push(format!("[System.ChangedDate] >= @Today - {default_window_days}"));
        }

        Ok(format!(
            "SELECT [System.Id] FROM WorkItems WHERE {} ORDER BY [System.ChangedDate] DESC",
            clauses.join(" AND ")
        ))
    }
}

fn check_range(name: &str, from: Option<NaiveDate>, to: Option<NaiveDate>) -> DevOpsResult<()> {
    match (from, to) {
        (Some(from), Some(to)) if from > to => Err(DevOpsError::InvalidInput(format!(
            "{name} date range starts ({from}) after it ends ({to})"
        ))),
        _ => Ok(()),
    }
}

/// Format a work item for display.
pub fn format_work_item(item: &WorkItem) -> String {
    let fields = &item.fields;
    let kind = fields.work_item_type.as_deref().unwrap_or("Item");
    let state = fields.state.as_deref().map(|s| format!(" [{s}]")).unwrap_or_default();
    format!("#{} {}: {}{}", item.id, kind, fields.title, state)
}
