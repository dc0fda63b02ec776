//! Push-notification reconciler.
//!
//! Notifications only say "something changed" on a watched calendar, so each
//! pass re-reads every linked appointment of the channel owner and converges
//! local state towards the remote event.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use domain::models::{
    Appointment, ReconcileReport, Slot, CALENDAR_PROVIDER_GOOGLE,
};
use domain::services::{apply, decide, CalendarGateway, ReconcileAction, RemoteObservation, Transition};
use domain::SchedulingError;
use persistence::entities::ReconcileCandidateEntity;
use persistence::repositories::{
    AppointmentRepository, CalendarLinkRepository, OAuthIdentityRepository, SlotRepository,
    WatchChannelRepository,
};
use shared::crypto::verify_hmac_sha256_hex;
use shared::time::Clock;
use sqlx::PgPool;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::reservation::persist_outcome;
use crate::middleware::metrics::{record_reconcile, record_webhook_notification};

/// Resource state sent once when a channel is opened.
const SYNC_STATE: &str = "sync";

/// A provider notification, as read from the request headers.
#[derive(Debug, Clone)]
pub struct Notification {
    pub channel_id: Uuid,
    pub channel_token: Option<String>,
    pub resource_state: String,
    pub resource_id: Option<String>,
    pub message_number: Option<u64>,
}

/// Serializes work per channel id; different channels run in parallel.
#[derive(Debug, Default)]
pub struct ChannelGate {
    locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

/// Held while one channel is processed. An idle channel leaves the gate on drop.
#[derive(Debug)]
pub struct ChannelPermit<'a> {
    gate: &'a ChannelGate,
    channel_id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
}

impl ChannelGate {
    pub async fn acquire(&self, channel_id: Uuid) -> ChannelPermit<'_> {
        let lock = self.locks().entry(channel_id).or_default().clone();
        let guard = lock.lock_owned().await;
        ChannelPermit {
            gate: self,
            channel_id,
            guard: Some(guard),
        }
    }

    fn locks(&self) -> MutexGuard<'_, HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>> {
        self.locks.lock().unwrap_or_else(|p| p.into_inner())
    }

    #[cfg(test)]
    fn tracked_channels(&self) -> usize {
        self.locks().len()
    }
}

impl Drop for ChannelPermit<'_> {
    fn drop(&mut self) {
        self.guard.take();
        // Only the map holds the lock once no holder or waiter is left.
        let mut locks = self.gate.locks();
        if locks
            .get(&self.channel_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.channel_id);
        }
    }
}

/// What one appointment pass changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Applied {
    Confirmed,
    Cancelled { link_removed: bool },
    Reaccepted,
    LinkRemoved,
    Unchanged,
}

pub struct WebhookReconciler {
    pool: PgPool,
    appointments: AppointmentRepository,
    channels: WatchChannelRepository,
    identities: OAuthIdentityRepository,
    calendar: Arc<dyn CalendarGateway>,
    clock: Arc<dyn Clock>,
    webhook_secret: String,
    gate: ChannelGate,
}

impl WebhookReconciler {
    pub fn new(
        pool: PgPool,
        calendar: Arc<dyn CalendarGateway>,
        clock: Arc<dyn Clock>,
        webhook_secret: impl Into<String>,
    ) -> Self {
        Self {
            appointments: AppointmentRepository::new(pool.clone()),
            channels: WatchChannelRepository::new(pool.clone()),
            identities: OAuthIdentityRepository::new(pool.clone()),
            pool,
            calendar,
            clock,
            webhook_secret: webhook_secret.into(),
            gate: ChannelGate::default(),
        }
    }

    /// Handles one notification. Unknown channels and bad tokens are ignored.
    pub async fn handle(&self, notification: Notification) -> Result<ReconcileReport, SchedulingError> {
        let channel_id = notification.channel_id;
        let token_valid = notification.channel_token.as_deref().is_some_and(|token| {
            verify_hmac_sha256_hex(&self.webhook_secret, &channel_id.to_string(), token)
        });
        if !token_valid {
            warn!(channel_id = %channel_id, "Webhook channel token mismatch; ignoring");
            return Ok(ReconcileReport::default());
        }
        record_webhook_notification(&notification.resource_state);

        if notification.resource_state == SYNC_STATE {
            debug!(channel_id = %channel_id, "Channel sync handshake");
            return Ok(ReconcileReport::default());
        }

        let _guard = self.gate.acquire(channel_id).await;

        let Some(channel) = self.channels.find_by_channel_id(channel_id).await? else {
            debug!(channel_id = %channel_id, "Notification for unknown channel");
            return Ok(ReconcileReport::default());
        };

        debug!(
            channel_id = %channel_id,
            user_id = %channel.user_id,
            resource_state = %notification.resource_state,
            message_number = ?notification.message_number,
            "Reconciling calendar notification"
        );
        self.reconcile_user(channel.user_id).await
    }

    /// Re-reads every linked appointment where the user is advisor or teacher.
    pub async fn reconcile_user(&self, user_id: Uuid) -> Result<ReconcileReport, SchedulingError> {
        let candidates = self.appointments.find_reconcile_candidates(user_id).await?;

        let mut report = ReconcileReport::default();
        for candidate in &candidates {
            report.examined += 1;
            match self.reconcile_one(candidate).await {
                Ok(Applied::Confirmed) => report.confirmed += 1,
                Ok(Applied::Cancelled { link_removed }) => {
                    report.cancelled += 1;
                    if link_removed {
                        report.links_removed += 1;
                    }
                }
                Ok(Applied::Reaccepted) => report.reaccepted += 1,
                Ok(Applied::LinkRemoved) => report.links_removed += 1,
                Ok(Applied::Unchanged) => {}
                Err(e) => {
                    warn!(
                        appointment_id = %candidate.appointment_id,
                        error = %e,
                        "Reconcile failed for appointment"
                    );
                    report.failed += 1;
                }
            }
        }

        if let Some(identity) = self
            .identities
            .find_by_user(user_id, CALENDAR_PROVIDER_GOOGLE)
            .await?
        {
            self.identities.touch_sync(identity.id, self.clock.now()).await?;
        }

        record_reconcile(&report);
        if report.confirmed + report.cancelled + report.reaccepted + report.links_removed > 0 {
            info!(
                user_id = %user_id,
                examined = report.examined,
                confirmed = report.confirmed,
                cancelled = report.cancelled,
                reaccepted = report.reaccepted,
                links_removed = report.links_removed,
                failed = report.failed,
                "Calendar changes reconciled"
            );
        }
        Ok(report)
    }

    async fn reconcile_one(&self, candidate: &ReconcileCandidateEntity) -> Result<Applied, SchedulingError> {
        let fetched = self
            .calendar
            .get_event(candidate.advisor_user_id, &candidate.provider_event_id)
            .await;
        let observation = match RemoteObservation::from_fetch(&fetched, &candidate.teacher_email) {
            Some(observation) => observation,
            None => {
                return Err(fetched
                    .err()
                    .map(SchedulingError::from)
                    .unwrap_or_else(|| SchedulingError::validation("Unreadable remote event")))
            }
        };

        let unlocked = decide(
            candidate.appointment_state.into(),
            candidate.slot_state.into(),
            observation,
        );
        if unlocked == ReconcileAction::Nothing {
            return Ok(Applied::Unchanged);
        }

        let mut tx = self.pool.begin().await?;
        let slot = SlotRepository::lock_by_id(&mut *tx, candidate.slot_id)
            .await?
            .map(Slot::from);
        let appointment = AppointmentRepository::lock_by_id(&mut *tx, candidate.appointment_id)
            .await?
            .map(Appointment::from);
        let (Some(slot), Some(appointment)) = (slot, appointment) else {
            return Ok(Applied::Unchanged);
        };

        let applied = match decide(appointment.state, slot.state, observation) {
            ReconcileAction::Nothing => Applied::Unchanged,
            ReconcileAction::ForgetLink => {
                let removed =
                    CalendarLinkRepository::delete_by_appointment(&mut *tx, appointment.id).await?;
                if removed {
                    Applied::LinkRemoved
                } else {
                    Applied::Unchanged
                }
            }
            ReconcileAction::Apply(transition) => {
                let outcome = match apply(transition, slot.state, Some(appointment.state)) {
                    Ok(outcome) if outcome.changed => outcome,
                    Ok(_) => return Ok(Applied::Unchanged),
                    Err(rejected) => {
                        debug!(appointment_id = %appointment.id, %rejected, "Remote change not applicable");
                        return Ok(Applied::Unchanged);
                    }
                };
                persist_outcome(&mut *tx, &slot, &appointment, outcome.slot, outcome.appointment)
                    .await?;

                match transition {
                    Transition::Confirm => Applied::Confirmed,
                    Transition::Reaccept => Applied::Reaccepted,
                    Transition::RemoteDeleted => Applied::Cancelled {
                        link_removed: CalendarLinkRepository::delete_by_appointment(
                            &mut *tx,
                            appointment.id,
                        )
                        .await?,
                    },
                    _ => Applied::Cancelled {
                        link_removed: false,
                    },
                }
            }
        };

        tx.commit().await?;
        Ok(applied)
    }
}
