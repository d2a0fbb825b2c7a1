//! In-process stores.
//!
//! `MemoryStore` implements the intent, meeting and device interfaces over a
//! single mutex, with the same conditional-write semantics as the Postgres
//! repositories. `MemoryDispatchQueue` is a leased FIFO. Both back the
//! scheduler and worker tests and single-process local runs.
//!
//! Neither lock is ever held across an `.await`.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Notify;
use tokio::time::Instant;
use uuid::Uuid;

use huddle_core::defaults::DISPATCH_VISIBILITY_TIMEOUT_SECS;
use huddle_core::{
    DeviceRegistry, DispatchQueue, DispatchTask, DueReminder, Error, IntentRepository,
    IntentStats, IntentStatus, Meeting, MeetingSource, MeetingStatus, NotificationIntent,
    NotificationType, QueuedDispatch, Result,
};

// =============================================================================
// MEMORY STORE
// =============================================================================

#[derive(Default)]
struct StoreState {
    intents: BTreeMap<Uuid, NotificationIntent>,
    meetings: HashMap<Uuid, Meeting>,
    tokens: HashMap<Uuid, Vec<String>>,
    faults: Faults,
}

/// Injected failures, for exercising error paths.
#[derive(Default)]
struct Faults {
    meeting_fetch: bool,
    reminder_fetch: bool,
    claim: HashSet<Uuid>,
    finalize: bool,
}

fn injected(what: &str) -> Error {
    Error::Internal(format!("injected {what} failure"))
}

/// In-process intent store, meeting source and device registry.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace a meeting.
    pub fn insert_meeting(&self, meeting: Meeting) {
        self.state().meetings.insert(meeting.id, meeting);
    }

    /// Change a meeting's status, e.g. to cancel it.
    pub fn set_meeting_status(&self, meeting_id: Uuid, status: MeetingStatus) -> Result<()> {
        let mut state = self.state();
        let meeting = state
            .meetings
            .get_mut(&meeting_id)
            .ok_or(Error::MeetingNotFound(meeting_id))?;
        meeting.status = status;
        Ok(())
    }

    /// Register an endpoint token for a user. Duplicates are ignored.
    pub fn register_token(&self, user_id: Uuid, token: impl Into<String>) {
        let token = token.into();
        let mut state = self.state();
        let tokens = state.tokens.entry(user_id).or_default();
        if !tokens.contains(&token) {
            tokens.push(token);
        }
    }

    /// Snapshot of a user's tokens.
    pub fn tokens(&self, user_id: Uuid) -> Vec<String> {
        self.state().tokens.get(&user_id).cloned().unwrap_or_default()
    }

    /// Snapshot of every intent, oldest first.
    pub fn intents(&self) -> Vec<NotificationIntent> {
        let mut all: Vec<_> = self.state().intents.values().cloned().collect();
        all.sort_by_key(|i| (i.created_at, i.id));
        all
    }

    /// Make `meetings_on` fail.
    pub fn fail_meeting_fetch(&self, fail: bool) {
        self.state().faults.meeting_fetch = fail;
    }

    /// Make `due_reminders` fail.
    pub fn fail_reminder_fetch(&self, fail: bool) {
        self.state().faults.reminder_fetch = fail;
    }

    /// Make `claim` fail for one intent.
    pub fn fail_claim_for(&self, intent_id: Uuid) {
        self.state().faults.claim.insert(intent_id);
    }

    /// Make `mark_delivered` and `mark_failed` fail.
    pub fn fail_finalize(&self, fail: bool) {
        self.state().faults.finalize = fail;
    }
}

/// Same prefix rule as the Postgres query: `YYYY-MM-DD` or an ISO timestamp on that day.
fn stored_on(start_date: &str, day: &str) -> bool {
    start_date == day
        || start_date
            .strip_prefix(day)
            .is_some_and(|rest| rest.starts_with('T'))
}

/// Pending, or claimed but never confirmed.
fn finalizable(intent: &NotificationIntent) -> bool {
    matches!(intent.status, IntentStatus::Pending | IntentStatus::Sent) && intent.sent_at.is_none()
}

#[async_trait]
impl IntentRepository for MemoryStore {
    async fn create_reminders(
        &self,
        meeting_id: Uuid,
        user_id: Uuid,
        scheduled_at: &[DateTime<Utc>],
    ) -> Result<Vec<Uuid>> {
        let now = Utc::now();
        let mut state = self.state();
        let mut inserted = Vec::new();

        for at in scheduled_at {
            let exists = state.intents.values().any(|i| {
                i.meeting_id == meeting_id
                    && i.user_id == user_id
                    && i.notification_type == NotificationType::Reminder
                    && i.scheduled_at == Some(*at)
            });
            if exists {
                continue;
            }
            let intent = NotificationIntent::pending(
                meeting_id,
                user_id,
                NotificationType::Reminder,
                Some(*at),
                now,
            );
            inserted.push(intent.id);
            state.intents.insert(intent.id, intent);
        }
        Ok(inserted)
    }

    async fn ensure_starting(
        &self,
        meeting_id: Uuid,
        user_id: Uuid,
    ) -> Result<NotificationIntent> {
        let mut state = self.state();
        let existing = state.intents.values().find(|i| {
            i.meeting_id == meeting_id
                && i.user_id == user_id
                && i.notification_type == NotificationType::Starting
        });
        if let Some(intent) = existing {
            return Ok(intent.clone());
        }

        let intent = NotificationIntent::pending(
            meeting_id,
            user_id,
            NotificationType::Starting,
            None,
            Utc::now(),
        );
        state.intents.insert(intent.id, intent.clone());
        Ok(intent)
    }

    async fn has_sent(
        &self,
        meeting_id: Uuid,
        user_id: Uuid,
        notification_type: NotificationType,
    ) -> Result<bool> {
        Ok(self.state().intents.values().any(|i| {
            i.meeting_id == meeting_id
                && i.user_id == user_id
                && i.notification_type == notification_type
                && i.status == IntentStatus::Sent
        }))
    }

    async fn due_reminders(&self, horizon: DateTime<Utc>, limit: i64) -> Result<Vec<DueReminder>> {
        let state = self.state();
        if state.faults.reminder_fetch {
            return Err(injected("reminder fetch"));
        }

        let mut due: Vec<DueReminder> = state
            .intents
            .values()
            .filter(|i| {
                i.notification_type == NotificationType::Reminder
                    && i.status == IntentStatus::Pending
                    && i.scheduled_at.is_some_and(|at| at <= horizon)
            })
            .filter_map(|i| {
                let meeting = state.meetings.get(&i.meeting_id)?;
                (!meeting.status.is_cancelled()).then(|| DueReminder {
                    intent: i.clone(),
                    meeting: meeting.clone(),
                })
            })
            .collect();

        due.sort_by_key(|d| (d.intent.scheduled_at, d.intent.id));
        due.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        Ok(due)
    }

    async fn get(&self, id: Uuid) -> Result<Option<NotificationIntent>> {
        Ok(self.state().intents.get(&id).cloned())
    }

    async fn claim(&self, id: Uuid) -> Result<bool> {
        let mut state = self.state();
        if state.faults.claim.contains(&id) {
            return Err(injected("claim"));
        }
        match state.intents.get_mut(&id) {
            Some(intent) if intent.status == IntentStatus::Pending => {
                intent.status = IntentStatus::Sent;
                intent.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_delivered(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let mut state = self.state();
        if state.faults.finalize {
            return Err(injected("finalize"));
        }
        match state.intents.get_mut(&id) {
            Some(intent) if finalizable(intent) => {
                intent.status = IntentStatus::Sent;
                intent.sent_at = Some(at);
                intent.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<bool> {
        let mut state = self.state();
        if state.faults.finalize {
            return Err(injected("finalize"));
        }
        match state.intents.get_mut(&id) {
            Some(intent) if finalizable(intent) => {
                intent.status = IntentStatus::Failed;
                intent.error_message = Some(error.to_string());
                intent.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_for_meeting(&self, meeting_id: Uuid) -> Result<Vec<NotificationIntent>> {
        let mut found: Vec<_> = self
            .state()
            .intents
            .values()
            .filter(|i| i.meeting_id == meeting_id)
            .cloned()
            .collect();
        found.sort_by_key(|i| (i.created_at, i.id));
        Ok(found)
    }

    async fn stats(&self) -> Result<IntentStats> {
        let state = self.state();
        let mut stats = IntentStats::default();
        for intent in state.intents.values() {
            match intent.status {
                IntentStatus::Pending => stats.pending += 1,
                IntentStatus::Sent if intent.sent_at.is_some() => stats.delivered += 1,
                IntentStatus::Sent => stats.claimed += 1,
                IntentStatus::Failed => stats.failed += 1,
            }
            match intent.notification_type {
                NotificationType::Starting => stats.starting += 1,
                NotificationType::Reminder => stats.reminder += 1,
            }
        }
        Ok(stats)
    }
}

#[async_trait]
impl MeetingSource for MemoryStore {
    async fn meetings_on(&self, date: NaiveDate) -> Result<Vec<Meeting>> {
        let state = self.state();
        if state.faults.meeting_fetch {
            return Err(injected("meeting fetch"));
        }
        let day = date.format("%Y-%m-%d").to_string();
        let mut found: Vec<Meeting> = state
            .meetings
            .values()
            .filter(|m| stored_on(&m.start_date, &day) && !m.status.is_cancelled())
            .cloned()
            .collect();
        found.sort_by(|a, b| a.start_time.cmp(&b.start_time).then(a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn get_meeting(&self, id: Uuid) -> Result<Option<Meeting>> {
        Ok(self.state().meetings.get(&id).cloned())
    }
}

#[async_trait]
impl DeviceRegistry for MemoryStore {
    async fn tokens_for_user(&self, user_id: Uuid) -> Result<Vec<String>> {
        Ok(self.tokens(user_id))
    }

    async fn remove_token(&self, user_id: Uuid, token: &str) -> Result<bool> {
        let mut state = self.state();
        let Some(tokens) = state.tokens.get_mut(&user_id) else {
            return Ok(false);
        };
        let before = tokens.len();
        tokens.retain(|t| t != token);
        Ok(tokens.len() < before)
    }
}

// =============================================================================
// MEMORY DISPATCH QUEUE
// =============================================================================

struct Entry {
    id: Uuid,
    task: DispatchTask,
    attempts: i32,
    available_at: Instant,
}

#[derive(Default)]
struct QueueState {
    entries: VecDeque<Entry>,
    fail_enqueue: HashSet<Uuid>,
}

/// In-process leased FIFO with the same redelivery semantics as the
/// Postgres queue. Leases are measured on the tokio clock, so paused-time
/// tests can expire them with `tokio::time::advance`.
#[derive(Clone)]
pub struct MemoryDispatchQueue {
    state: Arc<Mutex<QueueState>>,
    visibility_timeout: Duration,
    notify: Arc<Notify>,
}

impl Default for MemoryDispatchQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDispatchQueue {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::default())),
            visibility_timeout: Duration::from_secs(DISPATCH_VISIBILITY_TIMEOUT_SECS as u64),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handle notified on every enqueue.
    pub fn dispatch_notify(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    /// Make `enqueue` fail for tasks referencing this intent.
    pub fn fail_enqueue_for(&self, intent_id: Uuid) {
        self.state().fail_enqueue.insert(intent_id);
    }

    /// Snapshot of unacknowledged tasks in queue order.
    pub fn tasks(&self) -> Vec<DispatchTask> {
        self.state().entries.iter().map(|e| e.task.clone()).collect()
    }
}

#[async_trait]
impl DispatchQueue for MemoryDispatchQueue {
    async fn enqueue(&self, task: DispatchTask) -> Result<Uuid> {
        let id = Uuid::now_v7();
        {
            let mut state = self.state();
            if state.fail_enqueue.contains(&task.intent_id) {
                return Err(Error::Queue(format!(
                    "injected enqueue failure for intent {}",
                    task.intent_id
                )));
            }
            state.entries.push_back(Entry {
                id,
                task,
                attempts: 0,
                available_at: Instant::now(),
            });
        }
        self.notify.notify_one();
        Ok(id)
    }

    async fn receive(&self) -> Result<Option<QueuedDispatch>> {
        let now = Instant::now();
        let mut state = self.state();
        let Some(entry) = state.entries.iter_mut().find(|e| e.available_at <= now) else {
            return Ok(None);
        };
        entry.attempts += 1;
        entry.available_at = now + self.visibility_timeout;
        Ok(Some(QueuedDispatch {
            delivery_id: entry.id,
            task: entry.task.clone(),
            attempts: entry.attempts,
        }))
    }

    async fn ack(&self, delivery_id: Uuid) -> Result<()> {
        self.state().entries.retain(|e| e.id != delivery_id);
        Ok(())
    }

    async fn pending_count(&self) -> Result<i64> {
        Ok(self.state().entries.len() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn meeting(date: &str, time: &str) -> Meeting {
        Meeting {
            id: Uuid::new_v4(),
            creator_id: Uuid::new_v4(),
            attendee_ids: vec![],
            title: "Standup".to_string(),
            start_date: date.to_string(),
            start_time: time.to_string(),
            status: MeetingStatus::Scheduled,
        }
    }

    fn task(intent_id: Uuid) -> DispatchTask {
        DispatchTask {
            intent_id,
            user_id: Uuid::new_v4(),
            meeting_id: Uuid::new_v4(),
            notification_type: NotificationType::Starting,
            title: "Meeting starting".to_string(),
            body: "Standup starts in 5 minutes".to_string(),
            data: BTreeMap::new(),
        }
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, h, m, s).unwrap()
    }

    #[tokio::test]
    async fn test_claim_twice_succeeds_once() {
        let store = MemoryStore::new();
        let intent = store
            .ensure_starting(Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap();

        assert!(store.claim(intent.id).await.unwrap());
        assert!(!store.claim(intent.id).await.unwrap());

        let stored = store.get(intent.id).await.unwrap().unwrap();
        assert!(stored.is_claimed());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_have_one_winner() {
        let store = MemoryStore::new();
        let intent = store
            .ensure_starting(Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap();
        let id = intent.id;

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.claim(id).await.unwrap() })
            })
            .collect();
        let results = futures::future::join_all(handles).await;
        let winners = results.into_iter().filter(|r| *r.as_ref().unwrap()).count();

        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_claim_unknown_intent_is_false() {
        let store = MemoryStore::new();
        assert!(!store.claim(Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn test_ensure_starting_returns_same_row() {
        let store = MemoryStore::new();
        let (m, u) = (Uuid::new_v4(), Uuid::new_v4());

        let first = store.ensure_starting(m, u).await.unwrap();
        store.claim(first.id).await.unwrap();
        let second = store.ensure_starting(m, u).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.status, IntentStatus::Sent);
        assert_eq!(store.intents().len(), 1);
    }

    #[tokio::test]
    async fn test_create_reminders_skips_existing() {
        let store = MemoryStore::new();
        let (m, u) = (Uuid::new_v4(), Uuid::new_v4());

        let first = store
            .create_reminders(m, u, &[at(16, 30, 0), at(16, 35, 0)])
            .await
            .unwrap();
        let second = store
            .create_reminders(m, u, &[at(16, 30, 0), at(16, 35, 0), at(16, 39, 0)])
            .await
            .unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 1);
        assert_eq!(store.intents().len(), 3);
    }

    #[tokio::test]
    async fn test_mark_delivered_is_idempotent() {
        let store = MemoryStore::new();
        let intent = store
            .ensure_starting(Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap();
        store.claim(intent.id).await.unwrap();

        assert!(store.mark_delivered(intent.id, at(16, 40, 0)).await.unwrap());
        assert!(!store.mark_delivered(intent.id, at(16, 41, 0)).await.unwrap());

        let stored = store.get(intent.id).await.unwrap().unwrap();
        assert_eq!(stored.sent_at, Some(at(16, 40, 0)));
    }

    #[tokio::test]
    async fn test_mark_failed_never_downgrades_delivered() {
        let store = MemoryStore::new();
        let intent = store
            .ensure_starting(Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap();
        store.claim(intent.id).await.unwrap();
        store.mark_delivered(intent.id, at(16, 40, 0)).await.unwrap();

        assert!(!store.mark_failed(intent.id, "late failure").await.unwrap());
        let stored = store.get(intent.id).await.unwrap().unwrap();
        assert!(stored.is_delivered());
        assert!(stored.error_message.is_none());
    }

    #[tokio::test]
    async fn test_mark_failed_downgrades_unconfirmed_claim() {
        let store = MemoryStore::new();
        let intent = store
            .ensure_starting(Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap();
        store.claim(intent.id).await.unwrap();

        assert!(store.mark_failed(intent.id, "no endpoints").await.unwrap());
        let stored = store.get(intent.id).await.unwrap().unwrap();
        assert_eq!(stored.status, IntentStatus::Failed);
        assert_eq!(stored.error_message.as_deref(), Some("no endpoints"));
        assert!(!store.claim(intent.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_due_reminders_excludes_cancelled_meetings() {
        let store = MemoryStore::new();
        let live = meeting("2025-01-01", "16:40");
        let cancelled = meeting("2025-01-01", "16:40");
        store.insert_meeting(live.clone());
        store.insert_meeting(cancelled.clone());
        store
            .create_reminders(live.id, live.creator_id, &[at(16, 30, 0)])
            .await
            .unwrap();
        store
            .create_reminders(cancelled.id, cancelled.creator_id, &[at(16, 30, 0)])
            .await
            .unwrap();
        store
            .set_meeting_status(cancelled.id, MeetingStatus::Cancelled)
            .unwrap();

        let due = store.due_reminders(at(16, 31, 0), 10).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].meeting.id, live.id);
    }

    #[tokio::test]
    async fn test_due_reminders_respects_horizon_and_limit() {
        let store = MemoryStore::new();
        let m = meeting("2025-01-01", "16:40");
        store.insert_meeting(m.clone());
        store
            .create_reminders(
                m.id,
                m.creator_id,
                &[at(16, 35, 0), at(16, 30, 0), at(16, 38, 0)],
            )
            .await
            .unwrap();

        let due = store.due_reminders(at(16, 36, 0), 10).await.unwrap();
        let times: Vec<_> = due.iter().map(|d| d.intent.scheduled_at.unwrap()).collect();
        assert_eq!(times, vec![at(16, 30, 0), at(16, 35, 0)]);

        let limited = store.due_reminders(at(16, 40, 0), 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_meetings_on_matches_iso_prefix_and_skips_cancelled() {
        let store = MemoryStore::new();
        let plain = meeting("2025-01-01", "16:40");
        let iso = meeting("2025-01-01T00:00:00.000Z", "09:00");
        let other_day = meeting("2025-01-02", "09:00");
        let mut cancelled = meeting("2025-01-01", "10:00");
        cancelled.status = MeetingStatus::Cancelled;
        for m in [&plain, &iso, &other_day, &cancelled] {
            store.insert_meeting(m.clone());
        }

        let day = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let found = store.meetings_on(day).await.unwrap();
        let ids: Vec<_> = found.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![iso.id, plain.id]);
    }

    #[tokio::test]
    async fn test_remove_token() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        store.register_token(user, "ExponentPushToken[a]");
        store.register_token(user, "ExponentPushToken[b]");
        store.register_token(user, "ExponentPushToken[a]");

        assert!(store.remove_token(user, "ExponentPushToken[a]").await.unwrap());
        assert!(!store.remove_token(user, "ExponentPushToken[a]").await.unwrap());
        assert_eq!(store.tokens(user), vec!["ExponentPushToken[b]".to_string()]);
    }

    #[tokio::test]
    async fn test_stats_split_claimed_and_delivered() {
        let store = MemoryStore::new();
        let a = store.ensure_starting(Uuid::new_v4(), Uuid::new_v4()).await.unwrap();
        let b = store.ensure_starting(Uuid::new_v4(), Uuid::new_v4()).await.unwrap();
        store
            .create_reminders(Uuid::new_v4(), Uuid::new_v4(), &[at(16, 30, 0)])
            .await
            .unwrap();
        store.claim(a.id).await.unwrap();
        store.claim(b.id).await.unwrap();
        store.mark_delivered(b.id, Utc::now()).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.claimed, 1);
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.starting, 2);
        assert_eq!(stats.reminder, 1);
        assert_eq!(stats.total(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_lease_hides_entry_until_timeout() {
        let queue = MemoryDispatchQueue::new().with_visibility_timeout(Duration::from_secs(30));
        let intent_id = Uuid::new_v4();
        queue.enqueue(task(intent_id)).await.unwrap();

        let first = queue.receive().await.unwrap().unwrap();
        assert_eq!(first.attempts, 1);
        assert!(queue.receive().await.unwrap().is_none());

        tokio::time::advance(Duration::from_secs(31)).await;

        let again = queue.receive().await.unwrap().unwrap();
        assert_eq!(again.delivery_id, first.delivery_id);
        assert_eq!(again.attempts, 2);
        assert_eq!(again.task.intent_id, intent_id);
    }

    #[tokio::test]
    async fn test_queue_ack_removes_entry() {
        let queue = MemoryDispatchQueue::new();
        queue.enqueue(task(Uuid::new_v4())).await.unwrap();
        queue.enqueue(task(Uuid::new_v4())).await.unwrap();
        assert_eq!(queue.pending_count().await.unwrap(), 2);

        let leased = queue.receive().await.unwrap().unwrap();
        queue.ack(leased.delivery_id).await.unwrap();
        queue.ack(leased.delivery_id).await.unwrap();

        assert_eq!(queue.pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_queue_injected_enqueue_failure() {
        let queue = MemoryDispatchQueue::new();
        let intent_id = Uuid::new_v4();
        queue.fail_enqueue_for(intent_id);

        let err = queue.enqueue(task(intent_id)).await.unwrap_err();
        assert!(matches!(err, Error::Queue(_)));
        assert_eq!(queue.pending_count().await.unwrap(), 0);
    }
}
