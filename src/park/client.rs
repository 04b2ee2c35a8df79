//! HTTP client for the park API: channel changes feed and daily schedules.

use std::time::Duration;

use chrono::NaiveDate;
use reqwest::{header, Client, Response};
use tracing::{debug, warn};
use url::Url;

use super::api_types::ApiChangesResponse;
use super::ScheduleSource;
use crate::cache::{ChangeBatch, ChannelSource};
use crate::config::Config;
use crate::{Error, Result};

/// Park API client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ParkClient {
  http: Client,
  api_url: Url,
  sync_url: Url,
  token: Option<String>,
}

impl ParkClient {
  pub fn new(config: &Config) -> Result<Self> {
    let http = Client::builder()
      .timeout(Duration::from_secs(config.request_timeout_secs))
      .build()?;

    Ok(Self {
      http,
      api_url: Url::parse(&config.api_url)?,
      sync_url: Url::parse(&config.sync_url)?,
      token: Config::get_api_token(),
    })
  }

  /// Append path segments to a base URL, keeping any base path.
  fn endpoint(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url
      .path_segments_mut()
      .map_err(|_| Error::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
      .pop_if_empty()
      .extend(segments);
    Ok(url)
  }

  async fn send(&self, url: Url) -> Result<Response> {
    debug!(%url, "GET");

    let mut request = self
      .http
      .get(url)
      .header(header::ACCEPT, "application/json");
    if let Some(token) = &self.token {
      request = request.bearer_auth(token);
    }

    Ok(request.send().await?)
  }

  async fn get_text(&self, url: Url, what: &str) -> Result<String> {
    let response = self.send(url).await?;
    let status = response.status();
    if !status.is_success() {
      return Err(Error::from_status(status, what));
    }

    Ok(response.text().await?)
  }
}

impl ChannelSource for ParkClient {
  async fn fetch_changes(&self, channel: &str, since: Option<&str>) -> Result<ChangeBatch> {
    let mut url = Self::endpoint(&self.sync_url, &["_changes"])?;
    {
      let mut query = url.query_pairs_mut();
      query
        .append_pair("filter", "sync_gateway/bychannel")
        .append_pair("channels", channel)
        .append_pair("style", "all_docs")
        .append_pair("include_docs", "true");
      if let Some(since) = since {
        query.append_pair("since", since);
      }
    }

    let body = self.get_text(url, &format!("channel {}", channel)).await?;
    let response: ApiChangesResponse = serde_json::from_str(&body)?;
    Ok(response.into_batch())
  }
}

impl ScheduleSource for ParkClient {
  /// A non-success status means no schedule is published for that day and
  /// yields an empty body; only transport failures are errors.
  async fn fetch_schedule(&self, entity_id: &str, date: NaiveDate) -> Result<String> {
    let mut url = Self::endpoint(
      &self.api_url,
      &["facility-service", "schedules", entity_id],
    )?;
    url
      .query_pairs_mut()
      .append_pair("date", &date.format("%Y-%m-%d").to_string());

    let response = self.send(url).await?;
    let status = response.status();
    if !status.is_success() {
      warn!(entity_id, %date, %status, "schedule request rejected, no hours available");
      return Ok(String::new());
    }

    Ok(response.text().await?)
  }
}
