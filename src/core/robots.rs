//! Minimal robots.txt policy for the `*` user agent.

use reqwest::Client;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RobotsRules {
    allow: Vec<String>,
    disallow: Vec<String>,
}

impl RobotsRules {
    /// Collects the rules of every group that names `User-agent: *`.
    pub fn parse(content: &str) -> Self {
        let mut rules = Self::default();
        let mut group_agents: Vec<String> = Vec::new();
        let mut in_rules = false;

        for line in content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            let Some((field, value)) = line.split_once(':') else {
                continue;
            };
            let field = field.trim().to_ascii_lowercase();
            let value = value.trim();

            match field.as_str() {
                "user-agent" => {
                    if in_rules {
                        group_agents.clear();
                        in_rules = false;
                    }
                    group_agents.push(value.to_ascii_lowercase());
                }
                "allow" | "disallow" => {
                    in_rules = true;
                    if value.is_empty() || !group_agents.iter().any(|a| a == "*") {
                        continue;
                    }
                    if field == "allow" {
                        rules.allow.push(value.to_string());
                    } else {
                        rules.disallow.push(value.to_string());
                    }
                }
                _ => {}
            }
        }

        rules
    }

    /// Longest matching prefix wins; `Allow` wins a tie.
    pub fn is_allowed(&self, path: &str) -> bool {
        let longest = |prefixes: &[String]| {
            prefixes
                .iter()
                .filter(|p| path.starts_with(p.as_str()))
                .map(|p| p.len())
                .max()
        };

        match (longest(&self.allow), longest(&self.disallow)) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(allow), Some(disallow)) => allow >= disallow,
        }
    }
}

/// Largest robots.txt prefix that is parsed.
pub const ROBOTS_MAX_BYTES: u64 = 512 * 1024;

/// Checks `url` against its origin's robots.txt. Any failure to obtain the
/// file counts as permission. At most `max_bytes` (and never more than
/// [`ROBOTS_MAX_BYTES`]) are read; rules past the cap are ignored.
pub async fn is_allowed(
    client: &Client,
    url: &Url,
    user_agent: &str,
    timeout: Duration,
    max_bytes: u64,
) -> bool {
    let robots_url = match url.join("/robots.txt") {
        Ok(u) => u,
        Err(_) => return true,
    };
    let limit = max_bytes.min(ROBOTS_MAX_BYTES) as usize;

    let content = match tokio::time::timeout(timeout, read_capped(client, &robots_url, user_agent, limit)).await {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            tracing::debug!("robots.txt unavailable at {}: {}", robots_url, e);
            return true;
        }
        Err(_) => {
            tracing::debug!("robots.txt timed out at {}", robots_url);
            return true;
        }
    };

    let mut path = url.path().to_string();
    if let Some(query) = url.query() {
        path.push('?');
        path.push_str(query);
    }

    let allowed = RobotsRules::parse(&content).is_allowed(&path);
    if !allowed {
        tracing::warn!("Fetching {} is disallowed by robots.txt", url);
    }
    allowed
}

async fn read_capped(client: &Client, url: &Url, user_agent: &str, limit: usize) -> reqwest::Result<String> {
    let mut response = client
        .get(url.clone())
        .header(reqwest::header::USER_AGENT, user_agent)
        .send()
        .await?
        .error_for_status()?;

    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let room = limit.saturating_sub(body.len());
        body.extend_from_slice(&chunk[..chunk.len().min(room)]);
        if body.len() >= limit {
            tracing::debug!("robots.txt at {} cut at {} bytes", url, limit);
            // A partial last line could shorten a Disallow prefix.
            let end = body.iter().rposition(|&b| b == b'\n').map_or(0, |i| i + 1);
            body.truncate(end);
            break;
        }
    }
    Ok(String::from_utf8_lossy(&body).into_owned())
}
