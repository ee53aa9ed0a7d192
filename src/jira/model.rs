use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::case::model::ProjectKey;

#[derive(Builder, Clone, Debug, PartialEq)]
pub struct NewTestIssue {
    pub project_key: ProjectKey,
    #[builder(into)]
    pub summary: String,
    #[builder(into)]
    pub description: Option<String>,
    #[builder(into)]
    pub issue_type: String,
    #[builder(into)]
    pub priority: Option<String>,
}

impl NewTestIssue {
    pub fn to_body(&self) -> Value {
        let mut fields = json!({
            "project": { "key": self.project_key.as_str() },
            "summary": self.summary,
            "issuetype": { "name": self.issue_type },
            "description": adf_paragraph(self.description.as_deref().unwrap_or("")),
        });
        if let Some(priority) = &self.priority {
            fields["priority"] = json!({ "name": priority });
        }
        json!({ "fields": fields })
    }
}

/// Atlassian Document Format: one paragraph. Text nodes may not be empty,
/// so an empty description is a paragraph with no content.
pub fn adf_paragraph(text: &str) -> Value {
    let content = if text.is_empty() {
        json!([])
    } else {
        json!([{ "type": "text", "text": text }])
    };
    json!({
        "type": "doc",
        "version": 1,
        "content": [{ "type": "paragraph", "content": content }]
    })
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssueLink {
    pub link_type: String,
    pub inward_key: String,
    pub outward_key: String,
}

impl IssueLink {
    pub fn to_body(&self) -> Value {
        json!({
            "type": { "name": self.link_type },
            "inwardIssue": { "key": self.inward_key },
            "outwardIssue": { "key": self.outward_key },
        })
    }
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub jql: String,
    pub fields: Vec<String>,
    pub max_results: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

/// One page of `search/jql` results.
#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    #[serde(default)]
    pub issues: Vec<IssueSummary>,
    #[serde(default)]
    pub next_page_token: Option<String>,
    #[serde(default)]
    pub is_last: Option<bool>,
}

impl SearchResponse {
    /// Token for the following page, `None` once the result set is exhausted.
    pub fn next_page(&self) -> Option<&str> {
        if self.is_last == Some(true) {
            return None;
        }
        self.next_page_token.as_deref().filter(|token| !token.is_empty())
    }
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct IssueSummary {
    pub key: String,
    #[serde(default)]
    pub fields: SummaryFields,
}

#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SummaryFields {
    #[serde(default)]
    pub summary: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ProjectResponse {
    pub id: String,
}
