use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::info;

const USER_AGENT: &str = concat!("readable/", env!("CARGO_PKG_VERSION"));

/// Raw page HTML plus the URL it came from, when known.
#[derive(Debug, Clone)]
pub struct Page {
    pub url: Option<String>,
    pub html: String,
}

pub fn is_remote(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Fetch `input` over HTTP, or read it from disk. `url` overrides the page URL used for
/// thread detection, handy for saved pages.
pub async fn load_page(input: &str, url: Option<&str>) -> Result<Page> {
    if is_remote(input) {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        info!("Fetching {}", input);
        let response = client
            .get(input)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", input))?;
        if !response.status().is_success() {
            bail!("Fetching {} returned {}", input, response.status());
        }
        let html = response
            .text()
            .await
            .with_context(|| format!("Failed to read body of {}", input))?;
        return Ok(Page {
            url: Some(url.unwrap_or(input).to_string()),
            html,
        });
    }

    let html = std::fs::read_to_string(Path::new(input))
        .with_context(|| format!("Failed to read {}", input))?;
    Ok(Page {
        url: url.map(str::to_string),
        html,
    })
}
