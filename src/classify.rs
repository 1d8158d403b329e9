use anyhow::{Context, Result};
use regex::Regex;

use crate::config::Palette;
use crate::embed::{Embed, EmbedAuthor, EmbedField, EmbedFooter};
use crate::event::Event;

/// Display-field budget for comment bodies, in characters.
const COMMENT_PREVIEW_CHARS: usize = 200;

/// The declared webhook event type, from `GITHUB_EVENT_NAME`.
#[derive(Debug, Clone, PartialEq)]
pub enum EventName {
    PullRequest,
    PullRequestReview,
    IssueComment,
    PullRequestReviewComment,
    Other(String),
}

impl EventName {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "pull_request" => Self::PullRequest,
            "pull_request_review" => Self::PullRequestReview,
            "issue_comment" => Self::IssueComment,
            "pull_request_review_comment" => Self::PullRequestReviewComment,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn raw(&self) -> &str {
        match self {
            Self::PullRequest => "pull_request",
            Self::PullRequestReview => "pull_request_review",
            Self::IssueComment => "issue_comment",
            Self::PullRequestReviewComment => "pull_request_review_comment",
            Self::Other(s) => s,
        }
    }

    /// Human form for the embed author line: "pull_request" → "Pull Request".
    pub fn display(&self) -> String {
        self.raw()
            .split('_')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Kind-specific payload carried alongside the shared context fields.
#[derive(Debug, Clone)]
pub enum ContextKind {
    Pr { merged: bool },
    ReviewSubmit { verdict: String },
    Comment { body: String },
}

/// Flat record the rules operate on, extracted from the raw payload.
/// `head`/`base` are empty for comment events, which have no branch info.
#[derive(Debug, Clone)]
pub struct NormalizedContext {
    pub kind: ContextKind,
    pub title: String,
    pub url: String,
    pub repo: String,
    pub sender: String,
    pub avatar: String,
    pub author: String,
    pub head: String,
    pub base: String,
}

/// What classification decided for this run.
#[derive(Debug)]
pub enum Outcome {
    Notify(Notification),
    Skip(String),
}

/// One embed, shared verbatim by every delivery, plus the usernames that
/// should receive it. The sender is already excluded and duplicates are
/// already collapsed.
#[derive(Debug)]
pub struct Notification {
    pub embed: Embed,
    pub recipients: Vec<String>,
}

/// Single-level dispatch over the declared event type. A payload that is
/// structurally wrong for its declared type is an error; an event type or
/// action with no notification rule is a skip.
pub fn classify(event_name: &EventName, event: &Event, palette: &Palette) -> Result<Outcome> {
    let ctx = match normalize(event_name, event)? {
        Some(ctx) => ctx,
        None => {
            return Ok(Outcome::Skip(format!(
                "unsupported event: {}",
                event_name.raw()
            )))
        }
    };

    let mut embed = base_embed(&ctx, event_name);
    let mut recipients: Vec<String> = Vec::new();
    let action = event.action.as_deref().unwrap_or("");

    match &ctx.kind {
        ContextKind::ReviewSubmit { verdict } => match verdict.as_str() {
            "approved" => {
                recipients.push(ctx.author.clone());
                embed.color = Some(palette.approved);
                embed.description = Some("**✅ PR Approved!**".to_string());
                embed.fields.push(EmbedField::block(
                    "Reviewer",
                    format!("Approved by {}", ctx.sender),
                ));
            }
            "changes_requested" => {
                recipients.push(ctx.author.clone());
                embed.color = Some(palette.changes);
                embed.description = Some("**⚠️ Changes Requested**".to_string());
                embed.fields.push(EmbedField::block(
                    "Reviewer",
                    format!("{} requested changes.", ctx.sender),
                ));
            }
            // A "commented" review fires a review-comment event of its own;
            // notifying here too would double up.
            other => {
                return Ok(Outcome::Skip(format!(
                    "review verdict '{}' handled by comment events",
                    other
                )))
            }
        },
        ContextKind::Pr { merged } => match action {
            // Team review requests carry `requested_team` instead of
            // `requested_reviewer`; there is no single user to DM.
            "review_requested" => match &event.requested_reviewer {
                Some(reviewer) => {
                    recipients.push(reviewer.login.clone());
                    embed.color = Some(palette.info);
                    embed.description = Some(
                        "**Review Requested**\nYou were requested to review this PR.".to_string(),
                    );
                }
                None => {
                    return Ok(Outcome::Skip(
                        "review_requested event without requested_reviewer".to_string(),
                    ))
                }
            },
            "assigned" => match &event.assignee {
                Some(assignee) => {
                    recipients.push(assignee.login.clone());
                    embed.color = Some(palette.info);
                    embed.description = Some("**Assigned to You**".to_string());
                }
                None => {
                    return Ok(Outcome::Skip("assigned event without assignee".to_string()))
                }
            },
            "closed" => {
                if ctx.author != ctx.sender {
                    recipients.push(ctx.author.clone());
                }
                if *merged {
                    embed.color = Some(palette.merged);
                    embed.description = Some("**Your PR was Merged!**".to_string());
                } else {
                    embed.color = Some(palette.closed);
                    embed.description = Some("**Your PR was Closed** (Unmerged)".to_string());
                }
            }
            other => {
                return Ok(Outcome::Skip(format!(
                    "no notification rule for pull_request action '{}'",
                    other
                )))
            }
        },
        ContextKind::Comment { body } => {
            embed.color = Some(palette.comment);
            embed.description = Some("**New Comment**".to_string());
            embed
                .fields
                .push(EmbedField::block("Message", preview(body)));

            if ctx.author != ctx.sender {
                recipients.push(ctx.author.clone());
            }
            recipients.extend(extract_mentions(body));
        }
    }

    Ok(Outcome::Notify(Notification {
        embed,
        recipients: finalize_recipients(recipients, &ctx.sender),
    }))
}

/// Extracts the flat context, or `None` when the event carries nothing we
/// notify about (unknown type, or a comment on a plain issue).
fn normalize(event_name: &EventName, event: &Event) -> Result<Option<NormalizedContext>> {
    let repo = || -> Result<String> {
        Ok(event
            .repository
            .as_ref()
            .context("event payload missing repository")?
            .full_name
            .clone())
    };

    match event_name {
        EventName::PullRequest => {
            let pr = event
                .pull_request
                .as_ref()
                .context("pull_request event missing pull_request")?;
            let sender = event
                .sender
                .as_ref()
                .context("pull_request event missing sender")?;
            Ok(Some(NormalizedContext {
                kind: ContextKind::Pr { merged: pr.merged },
                title: pr.title.clone(),
                url: pr.html_url.clone(),
                repo: repo()?,
                sender: sender.login.clone(),
                avatar: sender.avatar_url.clone(),
                author: pr.user.login.clone(),
                head: pr.head.name.clone(),
                base: pr.base.name.clone(),
            }))
        }
        EventName::PullRequestReview => {
            let pr = event
                .pull_request
                .as_ref()
                .context("pull_request_review event missing pull_request")?;
            let review = event
                .review
                .as_ref()
                .context("pull_request_review event missing review")?;
            Ok(Some(NormalizedContext {
                kind: ContextKind::ReviewSubmit {
                    verdict: review.state.to_lowercase(),
                },
                title: pr.title.clone(),
                url: review.html_url.clone(),
                repo: repo()?,
                // The reviewer triggered this, not the PR author.
                sender: review.user.login.clone(),
                avatar: review.user.avatar_url.clone(),
                author: pr.user.login.clone(),
                head: pr.head.name.clone(),
                base: pr.base.name.clone(),
            }))
        }
        EventName::IssueComment | EventName::PullRequestReviewComment => {
            let comment = event
                .comment
                .as_ref()
                .with_context(|| format!("{} event missing comment", event_name.raw()))?;
            // Comments on plain issues are not pull-request activity.
            if *event_name == EventName::IssueComment {
                let issue = event
                    .issue
                    .as_ref()
                    .context("issue_comment event missing issue")?;
                if issue.pull_request.is_none() {
                    return Ok(None);
                }
            }
            let (title, author) = match (&event.pull_request, &event.issue) {
                (Some(pr), _) => (pr.title.clone(), pr.user.login.clone()),
                (None, Some(issue)) => (issue.title.clone(), issue.user.login.clone()),
                (None, None) => anyhow::bail!(
                    "{} event missing both pull_request and issue",
                    event_name.raw()
                ),
            };
            Ok(Some(NormalizedContext {
                kind: ContextKind::Comment {
                    body: comment.body.clone(),
                },
                title,
                url: comment.html_url.clone(),
                repo: repo()?,
                sender: comment.user.login.clone(),
                avatar: comment.user.avatar_url.clone(),
                author,
                head: String::new(),
                base: String::new(),
            }))
        }
        EventName::Other(_) => Ok(None),
    }
}

/// Fields shared by every notification kind; rules add color, description,
/// and their own fields on top.
fn base_embed(ctx: &NormalizedContext, event_name: &EventName) -> Embed {
    let mut fields = vec![
        EmbedField::inline("📂 Repo", ctx.repo.clone()),
        EmbedField::inline("👤 Author", ctx.author.clone()),
    ];
    if !ctx.head.is_empty() {
        fields.push(EmbedField::inline(
            "🌿 Branch",
            format!("`{}` ➝ `{}`", ctx.head, ctx.base),
        ));
    }
    Embed {
        title: ctx.title.clone(),
        url: ctx.url.clone(),
        author: EmbedAuthor {
            name: format!("{} ({})", ctx.sender, event_name.display()),
            icon_url: ctx.avatar.clone(),
        },
        fields,
        footer: EmbedFooter {
            text: "GitHub Notification".to_string(),
        },
        color: None,
        description: None,
    }
}

/// `@handle` tokens in a comment body, in order of appearance.
fn extract_mentions(body: &str) -> Vec<String> {
    let re = Regex::new(r"@([a-zA-Z0-9-]+)").unwrap();
    re.captures_iter(body).map(|cap| cap[1].to_string()).collect()
}

/// Collapses duplicates (keeping first appearance) and drops the sender:
/// nobody gets DMed about their own action.
fn finalize_recipients(recipients: Vec<String>, sender: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    recipients
        .into_iter()
        .filter(|r| r != sender && seen.insert(r.clone()))
        .collect()
}

/// Comment bodies are clipped for display; the clip is by character so a
/// multi-byte boundary can't split.
fn preview(body: &str) -> String {
    if body.chars().count() > COMMENT_PREVIEW_CHARS {
        let clipped: String = body.chars().take(COMMENT_PREVIEW_CHARS).collect();
        format!("{}...", clipped)
    } else {
        body.to_string()
    }
}
