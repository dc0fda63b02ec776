//! Google Calendar v3 adapter.
//!
//! Implements [`CalendarGateway`] over the REST API. Every call runs under the
//! named user's credentials, fetched from an [`AccessTokenSource`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use domain::models::{
    ActingAs, AttendeeResponse, CreatedEvent, NewCalendarEvent, RemoteAttendee, RemoteEvent,
    WatchRegistration, WatchRequest,
};
use domain::services::CalendarGateway;
use domain::CalendarError;
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::token_vault::{transport_error, AccessTokenSource};
use crate::config::CalendarConfig;

const LIST_PAGE_SIZE: &str = "250";

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventDateTime {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    date_time: Option<DateTime<chrono::FixedOffset>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    time_zone: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleAttendee {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    response_status: Option<String>,
    #[serde(default)]
    organizer: bool,
    #[serde(default, rename = "self")]
    is_self: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AttendeePatch {
    email: String,
    response_status: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleEvent {
    id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    html_link: Option<String>,
    #[serde(default)]
    start: Option<EventDateTime>,
    #[serde(default)]
    end: Option<EventDateTime>,
    #[serde(default)]
    attendees: Vec<GoogleAttendee>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventList {
    #[serde(default)]
    items: Vec<GoogleEvent>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelResponse {
    resource_id: String,
    /// Milliseconds since the epoch, as a string.
    #[serde(default)]
    expiration: Option<String>,
}

// ============================================================================
// Client
// ============================================================================

/// Calendar gateway backed by Google Calendar.
pub struct GoogleCalendarClient {
    http: Client,
    base_url: Url,
    timezone: Tz,
    tokens: Arc<dyn AccessTokenSource>,
}

impl GoogleCalendarClient {
    /// `timezone` anchors all-day events when listing.
    pub fn new(
        config: &CalendarConfig,
        timezone: Tz,
        tokens: Arc<dyn AccessTokenSource>,
    ) -> Result<Self, CalendarError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| CalendarError::Transient(e.to_string()))?;
        let base_url = Url::parse(&config.api_base_url).map_err(|e| CalendarError::Permanent {
            status: 0,
            body: format!("Invalid calendar API base URL: {}", e),
        })?;

        Ok(Self {
            http,
            base_url,
            timezone,
            tokens,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, CalendarError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| CalendarError::Permanent {
                status: 0,
                body: "Calendar API base URL cannot be a base".into(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn events_url(&self, rest: &[&str]) -> Result<Url, CalendarError> {
        let mut segments = vec!["calendars", "primary", "events"];
        segments.extend_from_slice(rest);
        self.endpoint(&segments)
    }

    /// Sends an authorized request and maps non-success statuses.
    async fn send(
        &self,
        operation: &'static str,
        user_id: Uuid,
        request: RequestBuilder,
    ) -> Result<Response, CalendarError> {
        let token = self.tokens.access_token(user_id).await?;
        let start = Instant::now();
        let result = request.bearer_auth(token).send().await;
        metrics::histogram!("calendar_api_duration_seconds", "operation" => operation)
            .record(start.elapsed().as_secs_f64());

        let response = result.map_err(|e| {
            record_failure(operation, "transport");
            transport_error(e)
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let error = CalendarError::from_status(status.as_u16(), body);
        if error != CalendarError::NotFound {
            warn!(operation, user_id = %user_id, status = status.as_u16(), "Calendar API call failed");
        }
        record_failure(operation, error.kind().as_str());
        Err(error)
    }

    async fn fetch_event(&self, user_id: Uuid, event_id: &str) -> Result<GoogleEvent, CalendarError> {
        let url = self.events_url(&[event_id])?;
        let response = self
            .send("get_event", user_id, self.http.request(Method::GET, url))
            .await?;
        decode(response).await
    }

    fn to_remote(&self, event: GoogleEvent) -> RemoteEvent {
        RemoteEvent {
            start: event.start.as_ref().and_then(|t| self.instant(t)),
            end: event.end.as_ref().and_then(|t| self.instant(t)),
            id: event.id,
            status: event.status,
            summary: event.summary,
            html_link: event.html_link,
            attendees: event
                .attendees
                .into_iter()
                .filter_map(|a| {
                    Some(RemoteAttendee {
                        email: a.email?,
                        response_status: AttendeeResponse::from_provider(
                            a.response_status.as_deref().unwrap_or("needsAction"),
                        ),
                        organizer: a.organizer,
                        is_self: a.is_self,
                    })
                })
                .collect(),
        }
    }

    fn instant(&self, value: &EventDateTime) -> Option<DateTime<Utc>> {
        if let Some(date_time) = value.date_time {
            return Some(date_time.with_timezone(&Utc));
        }
        let date = value.date?;
        self.timezone
            .from_local_datetime(&date.and_hms_opt(0, 0, 0)?)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

fn record_failure(operation: &'static str, kind: &'static str) {
    metrics::counter!("calendar_api_errors_total", "operation" => operation, "kind" => kind)
        .increment(1);
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, CalendarError> {
    response
        .json::<T>()
        .await
        .map_err(|e| CalendarError::Transient(format!("Malformed calendar response: {}", e)))
}

fn event_time(at: DateTime<Utc>, tz: Tz) -> EventDateTime {
    EventDateTime {
        date_time: Some(at.with_timezone(&tz).fixed_offset()),
        date: None,
        time_zone: Some(tz.name().to_string()),
    }
}

fn treat_missing_as_done(result: Result<Response, CalendarError>) -> Result<(), CalendarError> {
    match result {
        Ok(_) | Err(CalendarError::NotFound) => Ok(()),
        Err(e) => Err(e),
    }
}

#[async_trait::async_trait]
impl CalendarGateway for GoogleCalendarClient {
    async fn create_event(
        &self,
        organizer_user_id: Uuid,
        event: &NewCalendarEvent,
    ) -> Result<CreatedEvent, CalendarError> {
        let mut url = self.events_url(&[])?;
        url.query_pairs_mut()
            .append_pair("conferenceDataVersion", "1")
            .append_pair("sendUpdates", "all");

        let attendees: Vec<AttendeePatch> = event
            .attendees
            .iter()
            .map(|email| AttendeePatch {
                email: email.clone(),
                response_status: AttendeeResponse::NeedsAction.as_str(),
            })
            .collect();

        let mut body = serde_json::json!({
            "summary": event.title,
            "description": event.description,
            "location": event.location,
            "start": event_time(event.start, event.timezone),
            "end": event_time(event.end, event.timezone),
            "attendees": attendees,
        });
        if event.create_meet_link {
            body["conferenceData"] = serde_json::json!({
                "createRequest": {
                    "requestId": Uuid::new_v4().to_string(),
                    "conferenceSolutionKey": { "type": "hangoutsMeet" }
                }
            });
        }

        let response = self
            .send(
                "create_event",
                organizer_user_id,
                self.http.request(Method::POST, url).json(&body),
            )
            .await?;
        let created: GoogleEvent = decode(response).await?;

        info!(user_id = %organizer_user_id, event_id = %created.id, "Calendar event created");
        Ok(CreatedEvent {
            provider_event_id: created.id,
            html_link: created.html_link,
        })
    }

    async fn get_event(
        &self,
        organizer_user_id: Uuid,
        event_id: &str,
    ) -> Result<RemoteEvent, CalendarError> {
        let event = self.fetch_event(organizer_user_id, event_id).await?;
        Ok(self.to_remote(event))
    }

    async fn delete_event(
        &self,
        organizer_user_id: Uuid,
        event_id: &str,
    ) -> Result<(), CalendarError> {
        let mut url = self.events_url(&[event_id])?;
        url.query_pairs_mut().append_pair("sendUpdates", "all");

        let result = self
            .send(
                "delete_event",
                organizer_user_id,
                self.http.request(Method::DELETE, url),
            )
            .await;
        treat_missing_as_done(result)?;
        info!(user_id = %organizer_user_id, event_id, "Calendar event deleted");
        Ok(())
    }

    async fn set_attendee_response(
        &self,
        acting_user_id: Uuid,
        acting_as: ActingAs,
        event_id: &str,
        attendee_email: &str,
        response: AttendeeResponse,
    ) -> Result<(), CalendarError> {
        let current = self.fetch_event(acting_user_id, event_id).await?;

        let mut found = false;
        let mut attendees: Vec<AttendeePatch> = current
            .attendees
            .into_iter()
            .filter_map(|a| {
                let email = a.email?;
                let status = if email.eq_ignore_ascii_case(attendee_email) {
                    found = true;
                    response.as_str()
                } else {
                    AttendeeResponse::from_provider(
                        a.response_status.as_deref().unwrap_or("needsAction"),
                    )
                    .as_str()
                };
                Some(AttendeePatch {
                    email,
                    response_status: status,
                })
            })
            .collect();

        if !found {
            if acting_as == ActingAs::Attendee {
                return Err(CalendarError::NotFound);
            }
            attendees.push(AttendeePatch {
                email: attendee_email.to_string(),
                response_status: response.as_str(),
            });
        }

        let mut url = self.events_url(&[event_id])?;
        url.query_pairs_mut().append_pair("sendUpdates", "all");
        self.send(
            "patch_attendees",
            acting_user_id,
            self.http
                .request(Method::PATCH, url)
                .json(&serde_json::json!({ "attendees": attendees })),
        )
        .await?;

        debug!(event_id, ?acting_as, response = %response, "Attendee response updated");
        Ok(())
    }

    async fn watch_primary_calendar(
        &self,
        user_id: Uuid,
        request: &WatchRequest,
    ) -> Result<WatchRegistration, CalendarError> {
        let url = self.events_url(&["watch"])?;
        let body = serde_json::json!({
            "id": request.channel_id.to_string(),
            "type": "web_hook",
            "address": request.callback_url,
            "token": request.token,
            "params": { "ttl": request.ttl_secs.to_string() },
        });

        let response = self
            .send(
                "watch_calendar",
                user_id,
                self.http.request(Method::POST, url).json(&body),
            )
            .await?;
        let channel: ChannelResponse = decode(response).await?;

        let expires_at = channel
            .expiration
            .as_deref()
            .and_then(|ms| ms.parse::<i64>().ok())
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single());

        Ok(WatchRegistration {
            resource_id: channel.resource_id,
            expires_at,
        })
    }

    async fn stop_channel(
        &self,
        user_id: Uuid,
        channel_id: Uuid,
        resource_id: &str,
    ) -> Result<(), CalendarError> {
        let url = self.endpoint(&["channels", "stop"])?;
        let body = serde_json::json!({
            "id": channel_id.to_string(),
            "resourceId": resource_id,
        });
        let result = self
            .send(
                "stop_channel",
                user_id,
                self.http.request(Method::POST, url).json(&body),
            )
            .await;
        treat_missing_as_done(result)
    }

    async fn list_events(
        &self,
        user_id: Uuid,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<RemoteEvent>, CalendarError> {
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.events_url(&[])?;
            {
                let mut query = url.query_pairs_mut();
                query
                    .append_pair("timeMin", &time_min.to_rfc3339())
                    .append_pair("timeMax", &time_max.to_rfc3339())
                    .append_pair("singleEvents", "true")
                    .append_pair("orderBy", "startTime")
                    .append_pair("maxResults", LIST_PAGE_SIZE);
                if let Some(token) = page_token.as_deref() {
                    query.append_pair("pageToken", token);
                }
            }

            let response = self
                .send("list_events", user_id, self.http.request(Method::GET, url))
                .await?;
            let page: EventList = decode(response).await?;
            events.extend(page.items.into_iter().map(|e| self.to_remote(e)));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(events)
    }
}
