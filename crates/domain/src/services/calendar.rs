//! Calendar provider abstraction.
//!
//! The scheduling core talks to the provider only through [`CalendarGateway`].
//! Every call names the user whose credentials it runs under.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use crate::errors::CalendarError;
use crate::models::{
    ActingAs, AttendeeResponse, CreatedEvent, NewCalendarEvent, RemoteAttendee, RemoteEvent,
    WatchRegistration, WatchRequest,
};

/// Outbound adapter to the calendar provider.
#[async_trait::async_trait]
pub trait CalendarGateway: Send + Sync {
    /// Creates an event on the organizer's primary calendar.
    async fn create_event(
        &self,
        organizer_user_id: Uuid,
        event: &NewCalendarEvent,
    ) -> Result<CreatedEvent, CalendarError>;

    /// Fetches an event from the organizer's primary calendar.
    async fn get_event(
        &self,
        organizer_user_id: Uuid,
        event_id: &str,
    ) -> Result<RemoteEvent, CalendarError>;

    /// Deletes an event and notifies attendees. A missing event is success.
    async fn delete_event(&self, organizer_user_id: Uuid, event_id: &str)
        -> Result<(), CalendarError>;

    /// Sets one attendee's response, acting as organizer or as the attendee.
    async fn set_attendee_response(
        &self,
        acting_user_id: Uuid,
        acting_as: ActingAs,
        event_id: &str,
        attendee_email: &str,
        response: AttendeeResponse,
    ) -> Result<(), CalendarError>;

    /// Opens a push channel on the user's primary calendar.
    async fn watch_primary_calendar(
        &self,
        user_id: Uuid,
        request: &WatchRequest,
    ) -> Result<WatchRegistration, CalendarError>;

    /// Stops a push channel.
    async fn stop_channel(
        &self,
        user_id: Uuid,
        channel_id: Uuid,
        resource_id: &str,
    ) -> Result<(), CalendarError>;

    /// Lists single events overlapping `[time_min, time_max)` on the primary
    /// calendar.
    async fn list_events(
        &self,
        user_id: Uuid,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<RemoteEvent>, CalendarError>;
}

/// A call recorded by [`MockCalendarGateway`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub operation: &'static str,
    pub user_id: Uuid,
    pub target: Option<String>,
}

#[derive(Debug, Default)]
struct MockState {
    events: HashMap<String, RemoteEvent>,
    calls: Vec<MockCall>,
    failure: Option<CalendarError>,
    next_id: u64,
}

/// In-memory calendar for development and testing.
///
/// Events live in a map keyed by event id. A configured failure is returned
/// by every call until cleared.
#[derive(Debug, Default)]
pub struct MockCalendarGateway {
    state: Mutex<MockState>,
}

impl MockCalendarGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock whose calls all fail with `error`.
    pub fn failing(error: CalendarError) -> Self {
        let mock = Self::default();
        mock.set_failure(Some(error));
        mock
    }

    pub fn set_failure(&self, error: Option<CalendarError>) {
        self.lock().failure = error;
    }

    /// Stores or replaces an event.
    pub fn insert_event(&self, event: RemoteEvent) {
        self.lock().events.insert(event.id.clone(), event);
    }

    /// Removes an event as if the organizer deleted it.
    pub fn remove_event(&self, event_id: &str) -> Option<RemoteEvent> {
        self.lock().events.remove(event_id)
    }

    pub fn event(&self, event_id: &str) -> Option<RemoteEvent> {
        self.lock().events.get(event_id).cloned()
    }

    /// Sets an attendee's response as if they answered in their own client.
    pub fn respond(&self, event_id: &str, email: &str, response: AttendeeResponse) -> bool {
        let mut state = self.lock();
        let Some(event) = state.events.get_mut(event_id) else {
            return false;
        };
        upsert_attendee(event, email, response);
        true
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // Poisoning is ignored; a failed test must not break the others.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Logs a call and fails it if a failure is injected.
    fn record(
        &self,
        operation: &'static str,
        user_id: Uuid,
        target: Option<String>,
    ) -> Result<(), CalendarError> {
        self.record_locked(operation, user_id, target).map(drop)
    }

    /// Like `record`, but keeps the state locked for the caller.
    fn record_locked(
        &self,
        operation: &'static str,
        user_id: Uuid,
        target: Option<String>,
    ) -> Result<MutexGuard<'_, MockState>, CalendarError> {
        let mut state = self.lock();
        state.calls.push(MockCall {
            operation,
            user_id,
            target,
        });
        match state.failure.clone() {
            Some(error) => {
                tracing::warn!(operation, user_id = %user_id, "Mock calendar simulating failure");
                Err(error)
            }
            None => Ok(state),
        }
    }
}

fn upsert_attendee(event: &mut RemoteEvent, email: &str, response: AttendeeResponse) {
    match event
        .attendees
        .iter_mut()
        .find(|a| a.email.eq_ignore_ascii_case(email))
    {
        Some(attendee) => attendee.response_status = response,
        None => event.attendees.push(RemoteAttendee {
            email: email.to_string(),
            response_status: response,
            organizer: false,
            is_self: false,
        }),
    }
}

#[async_trait::async_trait]
impl CalendarGateway for MockCalendarGateway {
    async fn create_event(
        &self,
        organizer_user_id: Uuid,
        event: &NewCalendarEvent,
    ) -> Result<CreatedEvent, CalendarError> {
        let mut state = self.record_locked("create_event", organizer_user_id, None)?;
        state.next_id += 1;
        let id = format!("mock-evt-{}", state.next_id);
        let html_link = format!("https://calendar.example.test/event?eid={id}");

        state.events.insert(
            id.clone(),
            RemoteEvent {
                id: id.clone(),
                status: Some("confirmed".into()),
                summary: Some(event.title.clone()),
                html_link: Some(html_link.clone()),
                start: Some(event.start),
                end: Some(event.end),
                attendees: event
                    .attendees
                    .iter()
                    .map(|email| RemoteAttendee {
                        email: email.clone(),
                        response_status: AttendeeResponse::NeedsAction,
                        organizer: false,
                        is_self: false,
                    })
                    .collect(),
            },
        );

        tracing::info!(event_id = %id, "Mock: created calendar event");
        Ok(CreatedEvent {
            provider_event_id: id,
            html_link: Some(html_link),
        })
    }

    async fn get_event(
        &self,
        organizer_user_id: Uuid,
        event_id: &str,
    ) -> Result<RemoteEvent, CalendarError> {
        let state =
            self.record_locked("get_event", organizer_user_id, Some(event_id.to_string()))?;
        state
            .events
            .get(event_id)
            .cloned()
            .ok_or(CalendarError::NotFound)
    }

    async fn delete_event(
        &self,
        organizer_user_id: Uuid,
        event_id: &str,
    ) -> Result<(), CalendarError> {
        let mut state =
            self.record_locked("delete_event", organizer_user_id, Some(event_id.to_string()))?;
        state.events.remove(event_id);
        Ok(())
    }

    async fn set_attendee_response(
        &self,
        acting_user_id: Uuid,
        _acting_as: ActingAs,
        event_id: &str,
        attendee_email: &str,
        response: AttendeeResponse,
    ) -> Result<(), CalendarError> {
        let mut state = self.record_locked(
            "set_attendee_response",
            acting_user_id,
            Some(event_id.to_string()),
        )?;
        let event = state.events.get_mut(event_id).ok_or(CalendarError::NotFound)?;
        upsert_attendee(event, attendee_email, response);
        Ok(())
    }

    async fn watch_primary_calendar(
        &self,
        user_id: Uuid,
        request: &WatchRequest,
    ) -> Result<WatchRegistration, CalendarError> {
        self.record(
            "watch_primary_calendar",
            user_id,
            Some(request.channel_id.to_string()),
        )?;
        Ok(WatchRegistration {
            resource_id: format!("mock-res-{}", request.channel_id),
            expires_at: Some(Utc::now() + chrono::Duration::seconds(request.ttl_secs)),
        })
    }

    async fn stop_channel(
        &self,
        user_id: Uuid,
        channel_id: Uuid,
        _resource_id: &str,
    ) -> Result<(), CalendarError> {
        self.record("stop_channel", user_id, Some(channel_id.to_string()))?;
        Ok(())
    }

    async fn list_events(
        &self,
        user_id: Uuid,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<RemoteEvent>, CalendarError> {
        let state = self.record_locked("list_events", user_id, None)?;
        let mut events: Vec<RemoteEvent> = state
            .events
            .values()
            .filter(|e| !e.is_cancelled())
            .filter(|e| match (e.start, e.end) {
                (Some(start), Some(end)) => start < time_max && time_min < end,
                _ => false,
            })
            .cloned()
            .collect();
        events.sort_by_key(|e| e.start);
        Ok(events)
    }
}
