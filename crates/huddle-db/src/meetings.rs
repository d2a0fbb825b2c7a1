//! Read access to the meeting service's table.
//!
//! The pipeline never writes meetings in production; `insert` exists for
//! fixtures and local setups without a meeting service.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use huddle_core::{Error, Meeting, MeetingSource, MeetingStatus, Result};

const MEETING_COLUMNS: &str =
    "id, creator_id, attendee_ids, title, start_date, start_time, status";

/// PostgreSQL implementation of MeetingSource.
#[derive(Clone)]
pub struct PgMeetingRepository {
    pool: Pool<Postgres>,
}

impl PgMeetingRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(row: &PgRow) -> Result<Meeting> {
        let status: String = row.try_get("status")?;
        Ok(Meeting {
            id: row.try_get("id")?,
            creator_id: row.try_get("creator_id")?,
            attendee_ids: row.try_get("attendee_ids")?,
            title: row.try_get("title")?,
            start_date: row.try_get("start_date")?,
            start_time: row.try_get("start_time")?,
            status: MeetingStatus::parse(&status),
        })
    }

    /// Insert or replace a meeting row.
    pub async fn insert(&self, meeting: &Meeting) -> Result<()> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO meeting
                 (id, creator_id, attendee_ids, title, start_date, start_time, status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
             ON CONFLICT (id) DO UPDATE SET
                 creator_id = EXCLUDED.creator_id,
                 attendee_ids = EXCLUDED.attendee_ids,
                 title = EXCLUDED.title,
                 start_date = EXCLUDED.start_date,
                 start_time = EXCLUDED.start_time,
                 status = EXCLUDED.status,
                 updated_at = EXCLUDED.updated_at",
        )
        .bind(meeting.id)
        .bind(meeting.creator_id)
        .bind(&meeting.attendee_ids)
        .bind(&meeting.title)
        .bind(&meeting.start_date)
        .bind(&meeting.start_time)
        .bind(meeting.status.as_str())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }
}

#[async_trait]
impl MeetingSource for PgMeetingRepository {
    async fn meetings_on(&self, date: NaiveDate) -> Result<Vec<Meeting>> {
        // Some clients store the date as a full ISO timestamp; match the prefix.
        let day = date.format("%Y-%m-%d").to_string();
        let rows = sqlx::query(&format!(
            "SELECT {MEETING_COLUMNS} FROM meeting
             WHERE (start_date = $1 OR start_date LIKE $1 || 'T%')
               AND lower(status) NOT IN ('cancelled', 'canceled')
             ORDER BY start_time ASC, id ASC"
        ))
        .bind(&day)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(Self::parse_row).collect()
    }

    async fn get_meeting(&self, id: Uuid) -> Result<Option<Meeting>> {
        let row = sqlx::query(&format!("SELECT {MEETING_COLUMNS} FROM meeting WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.as_ref().map(Self::parse_row).transpose()
    }
}
