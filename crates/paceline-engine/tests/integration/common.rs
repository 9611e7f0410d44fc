//! Shared test helpers for engine integration tests
//!
//! Provides a reqwest-backed [`PageSource`] speaking a simple JSON page
//! protocol (`{"items": [...], "next_cursor": "..."}`) against a wiremock
//! server, the way a real connector's fetcher would.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use paceline_core::domain::errors::FetchError;
use paceline_core::domain::newtypes::Cursor;
use paceline_engine::paginate::{FetchedPage, PageSource};
use paceline_engine::retry::parse_retry_after;

/// Installs a tracing subscriber once so `RUST_LOG` works in tests.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// JSON body served by the mock provider.
#[derive(Debug, Deserialize)]
struct PageBody {
    #[serde(default)]
    items: Vec<serde_json::Value>,
    next_cursor: Option<String>,
}

/// Page source fetching JSON pages over HTTP, continuation via a `cursor`
/// query parameter.
pub struct JsonPageSource {
    client: reqwest::Client,
    base_url: String,
    path: String,
}

impl JsonPageSource {
    pub fn new(base_url: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            path: path.into(),
        }
    }
}

#[async_trait]
impl PageSource for JsonPageSource {
    type Item = serde_json::Value;

    async fn fetch_page(
        &self,
        cursor: Option<&Cursor>,
    ) -> Result<FetchedPage<serde_json::Value>, FetchError> {
        let url = match cursor {
            Some(cursor) => format!("{}{}?cursor={}", self.base_url, self.path, cursor.as_str()),
            None => format!("{}{}", self.base_url, self.path),
        };

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        let headers = response.headers().clone();

        if !status.is_success() {
            if status.as_u16() == 429 {
                let retry_after = headers
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .map(|v| parse_retry_after(v, Duration::from_secs(1)));
                return Err(FetchError::Throttled {
                    retry_after,
                    reset_at: None,
                });
            }

            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::from_status(status.as_u16(), body));
        }

        let body: PageBody = response
            .json()
            .await
            .map_err(|e| FetchError::Network(format!("malformed page body: {e}")))?;

        let next_cursor = body
            .next_cursor
            .filter(|token| !token.is_empty())
            .map(|token| Cursor::new(token).unwrap());

        Ok(FetchedPage::new(body.items, next_cursor).with_headers(headers))
    }
}
