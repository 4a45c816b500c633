//! Chat notification payloads (Slack incoming-webhook format) and delivery.

use serde::Serialize;

use crate::delta::NO_COMMIT;
use crate::error::{Error, Result};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Attachment color for a delta that is about to be deployed.
pub const PENDING_COLOR: &str = "#aaccaa";
/// Attachment color for a delta that has been deployed.
pub const PUBLISHED_COLOR: &str = "#D00000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Pending,
    Published,
}

impl Phase {
    pub fn color(&self) -> &'static str {
        match self {
            Phase::Pending => PENDING_COLOR,
            Phase::Published => PUBLISHED_COLOR,
        }
    }

    pub fn notes(&self, target: &str) -> String {
        match self {
            Phase::Pending => format!(
                "@channel Please check if the above commits are ready to deploy to {}.",
                target
            ),
            Phase::Published => format!(
                "@channel the above commits are deployed to {}. Please check if it works properly.",
                target
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Field {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Attachment {
    pub fallback: String,
    pub color: String,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Payload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    pub icon_emoji: String,
}

impl Payload {
    pub fn text(text: impl Into<String>, icon_emoji: &str) -> Self {
        Self {
            text: Some(text.into()),
            attachments: Vec::new(),
            channel: None,
            icon_emoji: icon_emoji.to_string(),
        }
    }

    pub fn with_channel(mut self, channel: Option<&str>) -> Self {
        self.channel = channel.map(str::to_string);
        self
    }
}

/// Build the delta message: a fenced code block of the plain delta followed by
/// the notes. When a rich rendering is available, the message becomes an
/// attachment with a commits field and a notes field.
pub fn delta_payload(
    delta_plain: &str,
    delta_rich: Option<&str>,
    target: &str,
    phase: Phase,
    icon_emoji: &str,
) -> Payload {
    let body = if delta_plain.is_empty() { NO_COMMIT } else { delta_plain };
    let notes = phase.notes(target);
    let text = format!("```{}```\n{}", body, notes);

    let Some(rich) = delta_rich else {
        return Payload::text(text, icon_emoji);
    };

    Payload {
        text: None,
        attachments: vec![Attachment {
            fallback: text,
            color: phase.color().to_string(),
            fields: vec![
                Field {
                    title: None,
                    value: if rich.is_empty() { NO_COMMIT.to_string() } else { rich.to_string() },
                },
                Field {
                    title: Some("Notes".to_string()),
                    value: notes,
                },
            ],
        }],
        channel: None,
        icon_emoji: icon_emoji.to_string(),
    }
}

pub fn reverted_payload(target: &str, head: &str, icon_emoji: &str) -> Payload {
    Payload::text(
        format!("@channel {} was rolled back to `{}`.", target, head),
        icon_emoji,
    )
}

pub fn head_payload(target: &str, head: &str, icon_emoji: &str) -> Payload {
    Payload::text(format!("{} is running `{}`.", target, head), icon_emoji)
}

/// Delivers payloads to a chat service.
pub trait Notifier {
    fn send(&self, payload: &Payload) -> Result<()>;
}

/// Notifier posting to a Slack incoming webhook.
pub struct WebhookNotifier {
    webhook: String,
}

impl WebhookNotifier {
    pub fn new(webhook: impl Into<String>) -> Self {
        Self {
            webhook: webhook.into(),
        }
    }
}

impl Notifier for WebhookNotifier {
    fn send(&self, payload: &Payload) -> Result<()> {
        post(&self.webhook, payload)
    }
}

/// POST a payload to an incoming webhook.
pub fn post(webhook: &str, payload: &Payload) -> Result<()> {
    let client = reqwest::blocking::Client::builder()
        .user_agent(format!("capstan/{}", VERSION))
        .timeout(std::time::Duration::from_secs(10))
        .build()
        .map_err(|e| Error::internal_io(e.to_string(), Some("create HTTP client".to_string())))?;

    let response = client
        .post(webhook)
        .json(payload)
        .send()
        .map_err(|e| Error::notify_failed("slack", e.to_string()))?;

    if !response.status().is_success() {
        return Err(Error::notify_failed(
            "slack",
            format!("webhook answered {}", response.status()),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_payload_wraps_delta_in_code_block() {
        let payload = delta_payload(
            "a1b2c3d #7/bob: Fix",
            None,
            "shop-production",
            Phase::Pending,
            ":rocket:",
        );
        let text = payload.text.unwrap();
        assert!(text.starts_with("```a1b2c3d #7/bob: Fix```\n"));
        assert!(text.contains("ready to deploy to shop-production"));
        assert!(payload.attachments.is_empty());
    }

    #[test]
    fn empty_delta_still_has_a_body() {
        let payload = delta_payload("", None, "shop-production", Phase::Published, ":rocket:");
        assert!(payload.text.unwrap().starts_with("```No commit.```"));
    }

    #[test]
    fn rich_payload_uses_phase_color() {
        let payload = delta_payload(
            "a1b2c3d #7/bob: Fix",
            Some("<https://git/a1b2c3d|a1b2c3d> #7/bob: Fix"),
            "shop-production",
            Phase::Published,
            ":rocket:",
        );
        assert!(payload.text.is_none());
        let attachment = &payload.attachments[0];
        assert_eq!(attachment.color, PUBLISHED_COLOR);
        assert_eq!(attachment.fields[1].title.as_deref(), Some("Notes"));
        assert!(attachment.fallback.contains("deployed to shop-production"));
    }

    #[test]
    fn payload_serializes_without_empty_fields() {
        let payload = Payload::text("hi", ":rocket:").with_channel(Some("#deploys"));
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["channel"], "#deploys");
        assert!(json.get("attachments").is_none());
    }
}
