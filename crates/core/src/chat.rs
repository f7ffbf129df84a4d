//! Chat turn model and prompt construction for the analytics assistant.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::aggregation::AggregateStats;
use crate::feed::FeedStatus;
use crate::types::Timestamp;

/// Reply appended when the completion service cannot be reached.
pub const APOLOGY_REPLY: &str =
    "Sorry, I could not reach the analytics assistant right now. Please try again.";

/// Reply used when the service answers without any choice.
pub const EMPTY_REPLY: &str = "Sorry, I could not generate a response.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// A role + content pair as exchanged with the completion API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

/// One entry of a chat session's history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: Timestamp,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn to_message(&self) -> ChatMessage {
        ChatMessage {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// Per-feed line of the analytics snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSummary {
    pub name: String,
    pub location: String,
    #[serde(default)]
    pub people_count: u32,
    pub status: FeedStatus,
    #[serde(default)]
    pub alerts: u32,
}

/// Snapshot of the aggregation state sent alongside each chat request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsContext {
    pub active_cameras: u32,
    pub total_people: u64,
    pub total_alerts: u64,
    /// Free-form, the dashboard sends a locale-formatted string.
    #[serde(default)]
    pub last_update: Option<String>,
    #[serde(default)]
    pub feeds: Vec<FeedSummary>,
}

/// Build the system prompt, embedding the snapshot when present.
pub fn system_prompt(context: Option<&AnalyticsContext>) -> String {
    let mut prompt = String::from(
        "You are the AI assistant of a CCTV analytics dashboard. \
         You help operators interpret camera monitoring data and give insight.\n",
    );

    if let Some(ctx) = context {
        let last_update = ctx.last_update.as_deref().unwrap_or("never");
        let _ = write!(
            prompt,
            "\nReal-time data:\n\
             - Active cameras: {}\n\
             - People detected: {}\n\
             - Alerts: {}\n\
             - Last update: {}\n\
             \nPer camera:\n",
            ctx.active_cameras, ctx.total_people, ctx.total_alerts, last_update,
        );
        if ctx.feeds.is_empty() {
            prompt.push_str("No data\n");
        }
        for feed in &ctx.feeds {
            let _ = writeln!(
                prompt,
                "- {} ({}): {} people",
                feed.name, feed.location, feed.people_count
            );
        }
    }

    prompt.push_str(
        "\nAnswer briefly and helpfully. When asked for analysis, base your \
         insight on the data above.",
    );
    prompt
}

/// Opening assistant turn of a new session.
pub fn welcome_message(stats: &AggregateStats) -> String {
    format!(
        "Hello! I am the analytics assistant.\n\n\
         Current monitoring status:\n\
         - {} active cameras\n\
         - {} people detected\n\
         - {} active alerts\n\n\
         Ask me anything about your CCTV data.",
        stats.active_cameras, stats.total_people, stats.total_alerts
    )
}
