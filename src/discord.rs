use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::embed::Embed;
use crate::identity::IdentityMap;

#[derive(Debug, Serialize)]
struct CreateDmRequest<'a> {
    recipient_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct DmChannel {
    id: String,
}

#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    embeds: [&'a Embed; 1],
}

/// What happened for one recipient. Collected per run so the caller can
/// report an aggregate instead of grepping logs.
#[derive(Debug)]
pub enum DeliveryOutcome {
    Sent { user_id: String },
    Unmapped,
    Failed { error: anyhow::Error },
}

#[derive(Debug)]
pub struct DeliveryReport {
    pub username: String,
    pub outcome: DeliveryOutcome,
}

pub struct DiscordClient {
    client: reqwest::Client,
    token: String,
    base_url: String,
}

impl DiscordClient {
    pub fn new(token: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            base_url,
        }
    }

    /// DMs the embed to every mapped recipient, one at a time. A failure
    /// for one recipient never aborts delivery to the rest.
    pub async fn deliver_all(
        &self,
        recipients: &[String],
        identity_map: &IdentityMap,
        embed: &Embed,
    ) -> Vec<DeliveryReport> {
        let mut reports = Vec::with_capacity(recipients.len());
        for username in recipients {
            let outcome = match identity_map.resolve(username) {
                Some(user_id) => {
                    info!("Sending DM to {} ({})", username, user_id);
                    match self.send_dm(user_id, embed).await {
                        Ok(()) => DeliveryOutcome::Sent {
                            user_id: user_id.to_string(),
                        },
                        Err(error) => {
                            error!("Failed to DM {} ({}): {:#}", username, user_id, error);
                            DeliveryOutcome::Failed { error }
                        }
                    }
                }
                None => {
                    warn!("Skipping {}: no Discord ID mapped", username);
                    DeliveryOutcome::Unmapped
                }
            };
            reports.push(DeliveryReport {
                username: username.clone(),
                outcome,
            });
        }
        reports
    }

    async fn send_dm(&self, user_id: &str, embed: &Embed) -> Result<()> {
        anyhow::ensure!(!self.token.is_empty(), "DISCORD_BOT_TOKEN is not set");

        let channel_id = self
            .open_dm_channel(user_id)
            .await
            .with_context(|| format!("Could not open DM channel with {}", user_id))?;

        self.post_message(&channel_id, embed)
            .await
            .with_context(|| format!("Could not post message to channel {}", channel_id))
    }

    async fn open_dm_channel(&self, user_id: &str) -> Result<String> {
        let url = format!("{}/users/@me/channels", self.base_url);
        debug!("POST {}", url);

        let response = self
            .request(&url)
            .json(&CreateDmRequest {
                recipient_id: user_id,
            })
            .send()
            .await
            .context("Failed to send DM-channel request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Discord API error ({}): {}", status, body);
        }

        let channel: DmChannel = response
            .json()
            .await
            .context("Failed to parse DM-channel response")?;
        Ok(channel.id)
    }

    async fn post_message(&self, channel_id: &str, embed: &Embed) -> Result<()> {
        let url = format!("{}/channels/{}/messages", self.base_url, channel_id);
        debug!("POST {}", url);

        let response = self
            .request(&url)
            .json(&MessageRequest { embeds: [embed] })
            .send()
            .await
            .context("Failed to send message request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Discord API error ({}): {}", status, body);
        }
        Ok(())
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .header("Authorization", format!("Bot {}", self.token))
            .header(
                "User-Agent",
                concat!("prnotify/", env!("CARGO_PKG_VERSION")),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::{EmbedAuthor, EmbedFooter};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn embed() -> Embed {
        Embed {
            title: "t".to_string(),
            url: "u".to_string(),
            author: EmbedAuthor {
                name: "a".to_string(),
                icon_url: "i".to_string(),
            },
            fields: vec![],
            footer: EmbedFooter {
                text: "GitHub Notification".to_string(),
            },
            color: Some(1),
            description: Some("d".to_string()),
        }
    }

    #[test]
    fn test_message_body_wraps_embed_in_array() {
        let e = embed();
        let body = serde_json::to_value(MessageRequest { embeds: [&e] }).unwrap();
        assert!(body["embeds"].is_array());
        assert_eq!(body["embeds"].as_array().unwrap().len(), 1);
        assert_eq!(body["embeds"][0]["title"], "t");
    }

    #[test]
    fn test_dm_request_body_shape() {
        let body = serde_json::to_value(CreateDmRequest { recipient_id: "111" }).unwrap();
        assert_eq!(body, serde_json::json!({"recipient_id": "111"}));
    }

    // Reads one HTTP request off the socket, honoring Content-Length so a
    // body split across reads is captured whole.
    async fn read_request(socket: &mut TcpStream) -> String {
        let mut data = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            data.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&data).into_owned();
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text
                    .lines()
                    .find_map(|line| {
                        let lower = line.to_ascii_lowercase();
                        lower
                            .strip_prefix("content-length:")
                            .and_then(|v| v.trim().parse::<usize>().ok())
                    })
                    .unwrap_or(0);
                if data.len() >= header_end + 4 + content_length {
                    return text;
                }
            }
            if n == 0 {
                return text;
            }
        }
    }

    async fn respond_json(socket: &mut TcpStream, body: &str) {
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
    }

    #[tokio::test]
    async fn test_merged_pr_delivers_exactly_once_to_mapped_id() {
        use crate::classify::{classify, EventName, Outcome};
        use crate::config::Palette;
        use crate::event::Event;
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let mut requests = Vec::new();
            for body in [r#"{"id": "900"}"#, "{}"] {
                let (mut socket, _) = listener.accept().await.unwrap();
                requests.push(read_request(&mut socket).await);
                respond_json(&mut socket, body).await;
            }
            requests
        });

        let event: Event = serde_json::from_value(serde_json::json!({
            "action": "closed",
            "pull_request": {
                "title": "Add feature",
                "html_url": "https://github.com/acme/widgets/pull/7",
                "user": {"login": "alice", "avatar_url": "https://a.example/alice.png"},
                "head": {"ref": "feature"},
                "base": {"ref": "main"},
                "merged": true
            },
            "repository": {"full_name": "acme/widgets"},
            "sender": {"login": "bob", "avatar_url": "https://a.example/bob.png"}
        }))
        .unwrap();
        let notification =
            match classify(&EventName::PullRequest, &event, &Palette::default()).unwrap() {
                Outcome::Notify(n) => n,
                Outcome::Skip(reason) => panic!("expected a notification, got skip: {}", reason),
            };

        let map = IdentityMap::from_base64(Some(&STANDARD.encode(r#"{"alice": "111"}"#)));
        let client = DiscordClient::new("token".to_string(), format!("http://{}", addr));
        let reports = client
            .deliver_all(&notification.recipients, &map, &notification.embed)
            .await;

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].username, "alice");
        assert!(
            matches!(&reports[0].outcome, DeliveryOutcome::Sent { user_id } if user_id == "111")
        );

        let requests = server.await.unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].starts_with("POST /users/@me/channels"));
        assert!(requests[0].contains(r#""recipient_id":"111""#));
        assert!(requests[1].starts_with("POST /channels/900/messages"));
        assert!(requests[1].contains("Your PR was Merged!"));
        assert!(requests[1].contains(&Palette::default().merged.to_string()));
    }

    #[tokio::test]
    async fn test_unmapped_recipient_is_reported_not_attempted() {
        let client = DiscordClient::new("token".to_string(), "http://127.0.0.1:0".to_string());
        let map = IdentityMap::from_base64(None);
        let reports = client
            .deliver_all(&["ghost".to_string()], &map, &embed())
            .await;
        assert_eq!(reports.len(), 1);
        assert!(matches!(reports[0].outcome, DeliveryOutcome::Unmapped));
    }

    #[tokio::test]
    async fn test_missing_token_fails_delivery_without_aborting() {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine;

        let client = DiscordClient::new(String::new(), "http://127.0.0.1:0".to_string());
        let map = IdentityMap::from_base64(Some(
            &STANDARD.encode(r#"{"alice": "111", "ghost-user": "0"}"#),
        ));
        let reports = client
            .deliver_all(
                &["alice".to_string(), "unmapped".to_string()],
                &map,
                &embed(),
            )
            .await;
        assert_eq!(reports.len(), 2);
        assert!(matches!(reports[0].outcome, DeliveryOutcome::Failed { .. }));
        assert!(matches!(reports[1].outcome, DeliveryOutcome::Unmapped));
    }
}
