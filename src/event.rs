use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// The webhook payload, narrowed to the fields the classifier consumes.
/// Everything else in the document is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct Event {
    pub action: Option<String>,
    pub pull_request: Option<PullRequest>,
    pub review: Option<Review>,
    pub comment: Option<Comment>,
    pub issue: Option<Issue>,
    pub repository: Option<Repository>,
    pub sender: Option<User>,
    pub requested_reviewer: Option<User>,
    pub assignee: Option<User>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub login: String,
    #[serde(default)]
    pub avatar_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    pub full_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    pub title: String,
    pub html_url: String,
    pub user: User,
    pub head: GitRef,
    pub base: GitRef,
    #[serde(default)]
    pub merged: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitRef {
    #[serde(rename = "ref")]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Review {
    pub state: String,
    pub html_url: String,
    pub user: User,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Comment {
    pub body: String,
    pub html_url: String,
    pub user: User,
}

/// Issue payload attached to `issue_comment` events. The `pull_request`
/// sub-object is only checked for presence: comments on plain issues are
/// not pull-request activity and get skipped.
#[derive(Debug, Clone, Deserialize)]
pub struct Issue {
    pub title: String,
    pub html_url: String,
    pub user: User,
    pub pull_request: Option<serde_json::Value>,
}

impl Event {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read event payload: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse event payload: {}", path.display()))
    }
}
