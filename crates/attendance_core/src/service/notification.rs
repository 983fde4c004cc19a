//! Alert tracking and idempotent parent notification.
//!
//! # Responsibility
//! - Keep the working set of detected alerts and their delivery state.
//! - Hand messages to an external gateway and record the outcome.
//!
//! # Invariants
//! - `dispatch` on a notified alert is a no-op; `notified_at` never changes
//!   after the first successful delivery.
//! - Delivery failure leaves the alert `Unsent`, so retries are safe.
//! - `Notified` and `Dismissed` are terminal.
//! - Dismissing never touches attendance records.
//! - Pruning only drops terminal alerts; unsent alerts stay tracked whatever
//!   their date.

use crate::model::alert::{AbsenceAlert, AlertId, AlertState};
use chrono::{NaiveDate, Utc};
use log::{info, warn};
use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Failure reported by the delivery gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayError {
    pub message: String,
}

impl GatewayError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Display for GatewayError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "gateway delivery failed: {}", self.message)
    }
}

impl Error for GatewayError {}

/// External email/SMS transport.
pub trait NotificationGateway {
    fn send(&self, contact: &str, message: &str) -> Result<(), GatewayError>;
}

/// Lookup of the parent contact for a student.
pub trait ContactDirectory {
    fn parent_contact(&self, student_id: &str) -> Option<String>;
}

impl ContactDirectory for HashMap<String, String> {
    fn parent_contact(&self, student_id: &str) -> Option<String> {
        self.get(student_id).cloned()
    }
}

impl ContactDirectory for BTreeMap<String, String> {
    fn parent_contact(&self, student_id: &str) -> Option<String> {
        self.get(student_id).cloned()
    }
}

/// Source of `notified_at` timestamps in epoch milliseconds.
pub trait Clock {
    fn now_ms(&self) -> i64;
}

/// Wall clock in UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

#[derive(Debug)]
pub enum DispatchError {
    AlertNotFound(AlertId),
    AlertDismissed(AlertId),
    MissingContact(String),
    Delivery(GatewayError),
}

impl Display for DispatchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlertNotFound(id) => write!(f, "alert not found: {id}"),
            Self::AlertDismissed(id) => write!(f, "alert was dismissed: {id}"),
            Self::MissingContact(student_id) => {
                write!(f, "no parent contact for student `{student_id}`")
            }
            Self::Delivery(err) => write!(f, "{err}"),
        }
    }
}

impl Error for DispatchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Delivery(err) => Some(err),
            _ => None,
        }
    }
}

impl From<GatewayError> for DispatchError {
    fn from(value: GatewayError) -> Self {
        Self::Delivery(value)
    }
}

/// Result of a successful `dispatch` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent { notified_at: i64 },
    AlreadyNotified { notified_at: i64 },
}

#[derive(Debug, Clone)]
struct TrackedAlert {
    alert: AbsenceAlert,
    dismissed: bool,
}

impl TrackedAlert {
    fn state(&self) -> AlertState {
        if self.alert.notified {
            AlertState::Notified
        } else if self.dismissed {
            AlertState::Dismissed
        } else {
            AlertState::Unsent
        }
    }
}

/// Working set of alerts plus delivery collaborators.
pub struct NotificationDispatcher<G, D, C = SystemClock>
where
    G: NotificationGateway,
    D: ContactDirectory,
    C: Clock,
{
    gateway: G,
    contacts: D,
    clock: C,
    alerts: BTreeMap<AlertId, TrackedAlert>,
}

impl<G, D> NotificationDispatcher<G, D, SystemClock>
where
    G: NotificationGateway,
    D: ContactDirectory,
{
    pub fn new(gateway: G, contacts: D) -> Self {
        Self::with_clock(gateway, contacts, SystemClock)
    }
}

impl<G, D, C> NotificationDispatcher<G, D, C>
where
    G: NotificationGateway,
    D: ContactDirectory,
    C: Clock,
{
    pub fn with_clock(gateway: G, contacts: D, clock: C) -> Self {
        Self {
            gateway,
            contacts,
            clock,
            alerts: BTreeMap::new(),
        }
    }

    /// Adds an alert to the working set.
    ///
    /// An id already tracked keeps its current state, so re-detection never
    /// resets a notified or dismissed alert.
    pub fn track(&mut self, alert: AbsenceAlert) -> AlertId {
        let id = alert.id;
        self.alerts.entry(id).or_insert(TrackedAlert {
            alert,
            dismissed: false,
        });
        id
    }

    /// Tracks every alert in `alerts`.
    pub fn track_all(&mut self, alerts: impl IntoIterator<Item = AbsenceAlert>) -> Vec<AlertId> {
        alerts.into_iter().map(|alert| self.track(alert)).collect()
    }

    /// Tracks `alert` if needed, then delivers it once.
    pub fn dispatch(&mut self, alert: AbsenceAlert) -> Result<DispatchOutcome, DispatchError> {
        let id = self.track(alert);
        self.dispatch_by_id(id)
    }

    /// Delivers a tracked alert once.
    ///
    /// # Errors
    /// - `AlertNotFound` for an untracked id.
    /// - `AlertDismissed` for a dismissed alert.
    /// - `MissingContact` / `Delivery` leave the alert `Unsent`.
    pub fn dispatch_by_id(&mut self, id: AlertId) -> Result<DispatchOutcome, DispatchError> {
        let tracked = self
            .alerts
            .get_mut(&id)
            .ok_or(DispatchError::AlertNotFound(id))?;

        match tracked.state() {
            AlertState::Notified => {
                let notified_at = tracked.alert.notified_at.unwrap_or_default();
                info!("event=alert_dispatch module=notify status=noop alert_id={id}");
                return Ok(DispatchOutcome::AlreadyNotified { notified_at });
            }
            AlertState::Dismissed => return Err(DispatchError::AlertDismissed(id)),
            AlertState::Unsent => {}
        }

        let contact = self
            .contacts
            .parent_contact(&tracked.alert.student_id)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| DispatchError::MissingContact(tracked.alert.student_id.clone()))?;

        if let Err(err) = self.gateway.send(&contact, &tracked.alert.message()) {
            warn!(
                "event=alert_dispatch module=notify status=error alert_id={id} tier={} error_code=delivery_failed",
                tracked.alert.tier.as_str()
            );
            return Err(err.into());
        }

        let notified_at = self.clock.now_ms();
        tracked.alert.notified = true;
        tracked.alert.notified_at = Some(notified_at);
        info!(
            "event=alert_dispatch module=notify status=ok alert_id={id} tier={} consecutive_days={}",
            tracked.alert.tier.as_str(),
            tracked.alert.consecutive_days
        );
        Ok(DispatchOutcome::Sent { notified_at })
    }

    /// Removes an unsent alert from the active set without notifying.
    ///
    /// Returns the resulting state. Notified alerts stay notified.
    pub fn dismiss(&mut self, id: AlertId) -> Result<AlertState, DispatchError> {
        let tracked = self
            .alerts
            .get_mut(&id)
            .ok_or(DispatchError::AlertNotFound(id))?;
        if tracked.state() == AlertState::Unsent {
            tracked.dismissed = true;
            info!("event=alert_dismiss module=notify status=ok alert_id={id}");
        }
        Ok(tracked.state())
    }

    pub fn alert(&self, id: AlertId) -> Option<&AbsenceAlert> {
        self.alerts.get(&id).map(|tracked| &tracked.alert)
    }

    pub fn alert_state(&self, id: AlertId) -> Option<AlertState> {
        self.alerts.get(&id).map(TrackedAlert::state)
    }

    /// Number of alerts in the working set, terminal ones included.
    pub fn tracked_len(&self) -> usize {
        self.alerts.len()
    }

    /// Drops notified and dismissed alerts dated before `cutoff`.
    ///
    /// Returns how many were removed. A pruned alert that is detected again
    /// is tracked as new, so callers pick a cutoff past which records no
    /// longer produce alerts.
    pub fn prune_settled_before(&mut self, cutoff: NaiveDate) -> usize {
        let before = self.alerts.len();
        self.alerts.retain(|_, tracked| {
            tracked.state() == AlertState::Unsent || tracked.alert.date >= cutoff
        });
        let pruned = before - self.alerts.len();
        if pruned > 0 {
            info!(
                "event=alert_prune module=notify status=ok cutoff={cutoff} pruned={pruned} remaining={}",
                self.alerts.len()
            );
        }
        pruned
    }

    /// Alerts still awaiting a decision.
    pub fn active_alerts(&self) -> Vec<&AbsenceAlert> {
        self.alerts
            .values()
            .filter(|tracked| tracked.state() == AlertState::Unsent)
            .map(|tracked| &tracked.alert)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::alert::AlertTier;
    use std::cell::{Cell, RefCell};

    #[derive(Default)]
    struct RecordingGateway {
        sent: RefCell<Vec<(String, String)>>,
        fail_next: Cell<bool>,
    }

    impl NotificationGateway for &RecordingGateway {
        fn send(&self, contact: &str, message: &str) -> Result<(), GatewayError> {
            if self.fail_next.replace(false) {
                return Err(GatewayError::new("smtp timeout"));
            }
            self.sent
                .borrow_mut()
                .push((contact.to_string(), message.to_string()));
            Ok(())
        }
    }

    struct StepClock(Cell<i64>);

    impl Clock for &StepClock {
        fn now_ms(&self) -> i64 {
            let value = self.0.get();
            self.0.set(value + 1_000);
            value
        }
    }

    fn contacts() -> HashMap<String, String> {
        HashMap::from([("S1".to_string(), "parent@example.com".to_string())])
    }

    fn alert(student_id: &str) -> AbsenceAlert {
        alert_on(student_id, 10)
    }

    fn alert_on(student_id: &str, october_day: u32) -> AbsenceAlert {
        let day = NaiveDate::from_ymd_opt(2025, 10, october_day).unwrap();
        AbsenceAlert::new(student_id, "Ada", day, 3, AlertTier::ConsecutiveAbsence)
    }

    #[test]
    fn dispatch_twice_keeps_first_notified_at() {
        let gateway = RecordingGateway::default();
        let clock = StepClock(Cell::new(10_000));
        let mut dispatcher = NotificationDispatcher::with_clock(&gateway, contacts(), &clock);

        let first = dispatcher.dispatch(alert("S1")).unwrap();
        let second = dispatcher.dispatch(alert("S1")).unwrap();

        assert_eq!(first, DispatchOutcome::Sent { notified_at: 10_000 });
        assert_eq!(
            second,
            DispatchOutcome::AlreadyNotified {
                notified_at: 10_000
            }
        );
        assert_eq!(gateway.sent.borrow().len(), 1);
        let stored = dispatcher.alert(alert("S1").id).unwrap();
        assert!(stored.notified);
        assert_eq!(stored.notified_at, Some(10_000));
    }

    #[test]
    fn delivery_failure_leaves_alert_unsent_and_retry_succeeds() {
        let gateway = RecordingGateway::default();
        gateway.fail_next.set(true);
        let mut dispatcher = NotificationDispatcher::new(&gateway, contacts());

        let err = dispatcher.dispatch(alert("S1")).unwrap_err();
        assert!(matches!(err, DispatchError::Delivery(_)));
        let id = alert("S1").id;
        assert_eq!(dispatcher.alert_state(id), Some(AlertState::Unsent));
        assert!(!dispatcher.alert(id).unwrap().notified);

        let outcome = dispatcher.dispatch_by_id(id).unwrap();
        assert!(matches!(outcome, DispatchOutcome::Sent { .. }));
        assert_eq!(dispatcher.alert_state(id), Some(AlertState::Notified));
    }

    #[test]
    fn missing_contact_is_reported() {
        let gateway = RecordingGateway::default();
        let mut dispatcher = NotificationDispatcher::new(&gateway, contacts());

        let err = dispatcher.dispatch(alert("S9")).unwrap_err();
        assert!(matches!(err, DispatchError::MissingContact(ref id) if id == "S9"));
        assert_eq!(dispatcher.active_alerts().len(), 1);
    }

    #[test]
    fn dismissed_alert_is_terminal_and_never_sent() {
        let gateway = RecordingGateway::default();
        let mut dispatcher = NotificationDispatcher::new(&gateway, contacts());
        let id = dispatcher.track(alert("S1"));

        assert_eq!(dispatcher.dismiss(id).unwrap(), AlertState::Dismissed);
        assert!(dispatcher.active_alerts().is_empty());
        assert!(matches!(
            dispatcher.dispatch_by_id(id),
            Err(DispatchError::AlertDismissed(_))
        ));

        // Re-detection keeps the dismissal.
        dispatcher.track(alert("S1"));
        assert_eq!(dispatcher.alert_state(id), Some(AlertState::Dismissed));
        assert!(gateway.sent.borrow().is_empty());
    }

    #[test]
    fn dismiss_does_not_leave_notified() {
        let gateway = RecordingGateway::default();
        let mut dispatcher = NotificationDispatcher::new(&gateway, contacts());
        dispatcher.dispatch(alert("S1")).unwrap();

        assert_eq!(
            dispatcher.dismiss(alert("S1").id).unwrap(),
            AlertState::Notified
        );
    }

    #[test]
    fn unknown_alert_id_is_not_found() {
        let gateway = RecordingGateway::default();
        let mut dispatcher = NotificationDispatcher::new(&gateway, contacts());
        let id = alert("S1").id;
        assert!(matches!(
            dispatcher.dispatch_by_id(id),
            Err(DispatchError::AlertNotFound(_))
        ));
        assert!(matches!(
            dispatcher.dismiss(id),
            Err(DispatchError::AlertNotFound(_))
        ));
    }

    #[test]
    fn prune_drops_only_settled_alerts_before_cutoff() {
        let gateway = RecordingGateway::default();
        let mut dispatcher = NotificationDispatcher::new(&gateway, contacts());

        let old_sent = alert_on("S1", 1);
        let old_dismissed = alert_on("S2", 1);
        let old_unsent = alert_on("S3", 1);
        let recent_sent = alert_on("S1", 10);
        dispatcher.dispatch(old_sent.clone()).unwrap();
        dispatcher.track(old_dismissed.clone());
        dispatcher.dismiss(old_dismissed.id).unwrap();
        dispatcher.track(old_unsent.clone());
        dispatcher.dispatch(recent_sent.clone()).unwrap();
        assert_eq!(dispatcher.tracked_len(), 4);

        let cutoff = NaiveDate::from_ymd_opt(2025, 10, 10).unwrap();
        assert_eq!(dispatcher.prune_settled_before(cutoff), 2);
        assert_eq!(dispatcher.tracked_len(), 2);
        assert_eq!(dispatcher.alert_state(old_sent.id), None);
        assert_eq!(dispatcher.alert_state(old_dismissed.id), None);
        assert_eq!(dispatcher.alert_state(old_unsent.id), Some(AlertState::Unsent));
        assert_eq!(
            dispatcher.alert_state(recent_sent.id),
            Some(AlertState::Notified)
        );

        assert_eq!(dispatcher.prune_settled_before(cutoff), 0);
    }

    #[test]
    fn settled_alert_inside_window_still_deduplicates_after_prune() {
        let gateway = RecordingGateway::default();
        let mut dispatcher = NotificationDispatcher::new(&gateway, contacts());
        dispatcher.dispatch(alert("S1")).unwrap();

        dispatcher.prune_settled_before(NaiveDate::from_ymd_opt(2025, 10, 10).unwrap());
        let again = dispatcher.dispatch(alert("S1")).unwrap();

        assert!(matches!(again, DispatchOutcome::AlreadyNotified { .. }));
        assert_eq!(gateway.sent.borrow().len(), 1);
    }
}
