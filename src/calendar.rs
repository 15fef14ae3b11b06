//! Outlook calendar client
//!
//! Reads the `calendarView` of the signed-in user for a time window,
//! following `@odata.nextLink` until every page has been collected.

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::Url;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info};

use crate::auth::AccessTokenProvider;
use crate::error::FetchError;

/// Events requested per page
pub const PAGE_SIZE: u32 = 100;

/// Calendar event as returned by Microsoft Graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteEvent {
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub subject: String,
    #[serde(deserialize_with = "null_as_default")]
    pub body_preview: String,
    pub is_all_day: bool,
    pub is_cancelled: bool,
    /// "normal", "personal", "private" or "confidential"
    #[serde(deserialize_with = "null_as_default")]
    pub sensitivity: String,
    /// "free", "tentative", "busy", "oof", "workingElsewhere" or "unknown"
    #[serde(deserialize_with = "null_as_default")]
    pub show_as: String,
    #[serde(deserialize_with = "null_as_default")]
    pub start: EventTime,
    #[serde(deserialize_with = "null_as_default")]
    pub end: EventTime,
    #[serde(deserialize_with = "null_as_default")]
    pub location: EventLocation,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventTime {
    #[serde(deserialize_with = "null_as_default")]
    pub date_time: String,
    #[serde(deserialize_with = "null_as_default")]
    pub time_zone: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventLocation {
    #[serde(deserialize_with = "null_as_default")]
    pub display_name: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Deserialize)]
struct CalendarPage {
    #[serde(default)]
    value: Vec<RemoteEvent>,
    #[serde(rename = "@odata.nextLink", default)]
    next_link: Option<String>,
}

/// Paginated reader for the calendar view endpoint
pub struct CalendarFetcher<A> {
    auth: A,
    http: reqwest::Client,
    graph_url: String,
}

impl<A: AccessTokenProvider> CalendarFetcher<A> {
    /// `graph_url` is the API root, e.g. `https://graph.microsoft.com/v1.0`
    pub fn new(auth: A, graph_url: impl Into<String>) -> Self {
        Self {
            auth,
            http: reqwest::Client::new(),
            graph_url: graph_url.into(),
        }
    }

    pub fn auth_mut(&mut self) -> &mut A {
        &mut self.auth
    }

    /// First-page URL for the window `[from, to)`
    pub fn calendar_view_url(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Url, FetchError> {
        let base = format!("{}/me/calendarView", self.graph_url.trim_end_matches('/'));
        let top = PAGE_SIZE.to_string();
        Url::parse_with_params(
            &base,
            &[
                (
                    "startDateTime",
                    from.to_rfc3339_opts(SecondsFormat::Secs, true),
                ),
                ("endDateTime", to.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ("$top", top),
            ],
        )
        .map_err(|e| FetchError::InvalidUrl {
            url: base,
            reason: e.to_string(),
        })
    }

    /// Fetch every event in `[from, to)`.
    ///
    /// `timezone` is an IANA zone name sent as the `outlook.timezone`
    /// preference; an empty string leaves times in UTC. Either all pages are
    /// returned or the first failure is.
    pub async fn get_events(
        &mut self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        timezone: &str,
    ) -> Result<Vec<RemoteEvent>, FetchError> {
        let mut next = Some(self.calendar_view_url(from, to)?.to_string());
        let mut events = Vec::new();
        let mut pages = 0usize;

        while let Some(url) = next.take() {
            let page = self.get_page(&url, timezone).await?;
            pages += 1;
            debug!("Page {} returned {} events", pages, page.value.len());
            events.extend(page.value);
            next = page.next_link.filter(|link| !link.is_empty());
        }

        info!(
            "Fetched {} calendar events ({} page{})",
            events.len(),
            pages,
            if pages == 1 { "" } else { "s" }
        );
        Ok(events)
    }

    async fn get_page(&mut self, url: &str, timezone: &str) -> Result<CalendarPage, FetchError> {
        let token = self.auth.access_token().await?;

        let mut request = self
            .http
            .get(url)
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .header(ACCEPT, "application/json");
        if !timezone.is_empty() {
            request = request.header("Prefer", format!("outlook.timezone=\"{}\"", timezone));
        }

        let response = request.send().await.map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;

        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|source| FetchError::Decode {
            url: url.to_string(),
            source,
        })
    }
}
