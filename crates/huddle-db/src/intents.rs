//! Notification intent repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use huddle_core::{
    DueReminder, Error, IntentRepository, IntentStats, Meeting, MeetingStatus, NotificationIntent,
    NotificationType, Result,
};

const INTENT_COLUMNS: &str = "id, meeting_id, user_id, notification_type::text AS notification_type,
     status::text AS status, scheduled_at, sent_at, error_message, created_at, updated_at";

/// PostgreSQL implementation of IntentRepository.
#[derive(Clone)]
pub struct PgIntentRepository {
    pool: Pool<Postgres>,
}

impl PgIntentRepository {
    /// Create a new PgIntentRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Parse an intent row selected with [`INTENT_COLUMNS`].
    fn parse_intent_row(row: &PgRow) -> Result<NotificationIntent> {
        let notification_type: String = row.try_get("notification_type")?;
        let status: String = row.try_get("status")?;
        Ok(NotificationIntent {
            id: row.try_get("id")?,
            meeting_id: row.try_get("meeting_id")?,
            user_id: row.try_get("user_id")?,
            notification_type: notification_type.parse()?,
            status: status.parse()?,
            scheduled_at: row.try_get("scheduled_at")?,
            sent_at: row.try_get("sent_at")?,
            error_message: row.try_get("error_message")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    /// Parse the meeting half of a due-reminder join row.
    fn parse_joined_meeting(row: &PgRow) -> Result<Meeting> {
        let status: String = row.try_get("m_status")?;
        Ok(Meeting {
            id: row.try_get("m_id")?,
            creator_id: row.try_get("m_creator_id")?,
            attendee_ids: row.try_get("m_attendee_ids")?,
            title: row.try_get("m_title")?,
            start_date: row.try_get("m_start_date")?,
            start_time: row.try_get("m_start_time")?,
            status: MeetingStatus::parse(&status),
        })
    }
}

#[async_trait]
impl IntentRepository for PgIntentRepository {
    async fn create_reminders(
        &self,
        meeting_id: Uuid,
        user_id: Uuid,
        scheduled_at: &[DateTime<Utc>],
    ) -> Result<Vec<Uuid>> {
        if scheduled_at.is_empty() {
            return Ok(Vec::new());
        }
        let now = Utc::now();
        let ids: Vec<Uuid> = scheduled_at.iter().map(|_| Uuid::now_v7()).collect();

        // Insert-if-absent against the partial unique index so repeated
        // planning for the same meeting is harmless.
        let inserted = sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO notification_intent
                 (id, meeting_id, user_id, notification_type, status, scheduled_at, created_at, updated_at)
             SELECT r.id, $1, $2, 'reminder'::notification_type, 'pending'::notification_status,
                    r.scheduled_at, $5, $5
             FROM UNNEST($3::uuid[], $4::timestamptz[]) AS r(id, scheduled_at)
             ON CONFLICT (meeting_id, user_id, scheduled_at)
                 WHERE notification_type = 'reminder'::notification_type
             DO NOTHING
             RETURNING id",
        )
        .bind(meeting_id)
        .bind(user_id)
        .bind(&ids)
        .bind(scheduled_at)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(inserted)
    }

    async fn ensure_starting(
        &self,
        meeting_id: Uuid,
        user_id: Uuid,
    ) -> Result<NotificationIntent> {
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO notification_intent
                 (id, meeting_id, user_id, notification_type, status, created_at, updated_at)
             VALUES ($1, $2, $3, 'starting'::notification_type, 'pending'::notification_status, $4, $4)
             ON CONFLICT (meeting_id, user_id)
                 WHERE notification_type = 'starting'::notification_type
             DO NOTHING",
        )
        .bind(Uuid::now_v7())
        .bind(meeting_id)
        .bind(user_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        let row = sqlx::query(&format!(
            "SELECT {INTENT_COLUMNS} FROM notification_intent
             WHERE meeting_id = $1 AND user_id = $2
               AND notification_type = 'starting'::notification_type"
        ))
        .bind(meeting_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?
        .ok_or_else(|| {
            Error::Internal(format!(
                "starting intent for meeting {meeting_id} user {user_id} vanished after insert"
            ))
        })?;

        Self::parse_intent_row(&row)
    }

    async fn has_sent(
        &self,
        meeting_id: Uuid,
        user_id: Uuid,
        notification_type: NotificationType,
    ) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (
                 SELECT 1 FROM notification_intent
                 WHERE meeting_id = $1 AND user_id = $2
                   AND notification_type = $3::notification_type
                   AND status = 'sent'::notification_status
             )",
        )
        .bind(meeting_id)
        .bind(user_id)
        .bind(notification_type.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(exists)
    }

    async fn due_reminders(&self, horizon: DateTime<Utc>, limit: i64) -> Result<Vec<DueReminder>> {
        let rows = sqlx::query(
            "SELECT i.id, i.meeting_id, i.user_id, i.notification_type::text AS notification_type,
                    i.status::text AS status, i.scheduled_at, i.sent_at, i.error_message,
                    i.created_at, i.updated_at,
                    m.id AS m_id, m.creator_id AS m_creator_id, m.attendee_ids AS m_attendee_ids,
                    m.title AS m_title, m.start_date AS m_start_date, m.start_time AS m_start_time,
                    m.status AS m_status
             FROM notification_intent i
             JOIN meeting m ON m.id = i.meeting_id
             WHERE i.notification_type = 'reminder'::notification_type
               AND i.status = 'pending'::notification_status
               AND i.scheduled_at <= $1
               AND lower(m.status) NOT IN ('cancelled', 'canceled')
             ORDER BY i.scheduled_at ASC, i.id ASC
             LIMIT $2",
        )
        .bind(horizon)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter()
            .map(|row| {
                Ok(DueReminder {
                    intent: Self::parse_intent_row(row)?,
                    meeting: Self::parse_joined_meeting(row)?,
                })
            })
            .collect()
    }

    async fn get(&self, id: Uuid) -> Result<Option<NotificationIntent>> {
        let row = sqlx::query(&format!(
            "SELECT {INTENT_COLUMNS} FROM notification_intent WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(Self::parse_intent_row).transpose()
    }

    async fn claim(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE notification_intent
             SET status = 'sent'::notification_status, updated_at = $2
             WHERE id = $1 AND status = 'pending'::notification_status",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_delivered(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE notification_intent
             SET status = 'sent'::notification_status, sent_at = $2, updated_at = $2
             WHERE id = $1
               AND status IN ('pending'::notification_status, 'sent'::notification_status)
               AND sent_at IS NULL",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<bool> {
        // The only permitted Sent -> Failed move: a claim whose delivery
        // never got confirmed.
        let result = sqlx::query(
            "UPDATE notification_intent
             SET status = 'failed'::notification_status, error_message = $2, updated_at = $3
             WHERE id = $1
               AND status IN ('pending'::notification_status, 'sent'::notification_status)
               AND sent_at IS NULL",
        )
        .bind(id)
        .bind(error)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_for_meeting(&self, meeting_id: Uuid) -> Result<Vec<NotificationIntent>> {
        let rows = sqlx::query(&format!(
            "SELECT {INTENT_COLUMNS} FROM notification_intent
             WHERE meeting_id = $1
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(meeting_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(Self::parse_intent_row).collect()
    }

    async fn stats(&self) -> Result<IntentStats> {
        let row = sqlx::query(
            "SELECT
                 COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                 COUNT(*) FILTER (WHERE status = 'sent' AND sent_at IS NOT NULL) AS delivered,
                 COUNT(*) FILTER (WHERE status = 'sent' AND sent_at IS NULL) AS claimed,
                 COUNT(*) FILTER (WHERE status = 'failed') AS failed,
                 COUNT(*) FILTER (WHERE notification_type = 'starting') AS starting,
                 COUNT(*) FILTER (WHERE notification_type = 'reminder') AS reminder
             FROM notification_intent",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(IntentStats {
            pending: row.try_get("pending")?,
            delivered: row.try_get("delivered")?,
            claimed: row.try_get("claimed")?,
            failed: row.try_get("failed")?,
            starting: row.try_get("starting")?,
            reminder: row.try_get("reminder")?,
        })
    }
}
