use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;

use crate::context::ConversationStore;
use crate::models::*;
use crate::types::AppResult;

// The collaborator owns the schema; timestamps there are naive UTC and ids may
// be 32-bit, so every read normalises both.

const CONVERSATION_COLUMNS: &str = r#"
    CAST(id AS BIGINT) AS id,
    CAST(user_id AS BIGINT) AS user_id,
    CAST(trip_id AS BIGINT) AS trip_id,
    title,
    created_at AT TIME ZONE 'UTC' AS created_at,
    updated_at AT TIME ZONE 'UTC' AS updated_at
"#;

const MESSAGE_COLUMNS: &str = r#"
    CAST(id AS BIGINT) AS id,
    CAST(conversation_id AS BIGINT) AS conversation_id,
    role,
    content,
    agent_type,
    CAST(metadata AS JSONB) AS metadata,
    created_at AT TIME ZONE 'UTC' AS created_at
"#;

#[derive(sqlx::FromRow)]
struct TripRow {
    id: i64,
    destination: String,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    travelers_count: i32,
    budget: f64,
    currency: String,
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ConversationStore for PgStore {
    fn kind(&self) -> &'static str {
        "postgres"
    }

    async fn create_conversation(
        &self,
        user_id: i64,
        trip_id: Option<i64>,
        title: Option<String>,
    ) -> AppResult<Conversation> {
        let sql = format!(
            "INSERT INTO conversations (user_id, trip_id, title, created_at, updated_at)
             VALUES ($1, $2, $3, NOW() AT TIME ZONE 'UTC', NOW() AT TIME ZONE 'UTC')
             RETURNING {}",
            CONVERSATION_COLUMNS
        );
        let conversation = sqlx::query_as::<_, Conversation>(&sql)
            .bind(user_id)
            .bind(trip_id)
            .bind(title)
            .fetch_one(&self.pool)
            .await?;
        Ok(conversation)
    }

    async fn get_conversation(&self, conversation_id: i64) -> AppResult<Option<Conversation>> {
        let sql = format!("SELECT {} FROM conversations WHERE id = $1", CONVERSATION_COLUMNS);
        let conversation = sqlx::query_as::<_, Conversation>(&sql)
            .bind(conversation_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(conversation)
    }

    async fn get_recent_messages(&self, conversation_id: i64, limit: usize) -> AppResult<Vec<Message>> {
        let sql = format!(
            "SELECT * FROM (
                 SELECT {} FROM messages
                 WHERE conversation_id = $1
                 ORDER BY created_at DESC, id DESC
                 LIMIT $2
             ) recent
             ORDER BY created_at ASC, id ASC",
            MESSAGE_COLUMNS
        );
        let messages = sqlx::query_as::<_, Message>(&sql)
            .bind(conversation_id)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(messages)
    }

    async fn append_message(&self, message: NewMessage) -> AppResult<Message> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "INSERT INTO messages (conversation_id, role, content, agent_type, metadata, created_at)
             VALUES ($1, $2, $3, $4, CAST($5 AS JSON), NOW() AT TIME ZONE 'UTC')
             RETURNING {}",
            MESSAGE_COLUMNS
        );
        let stored = sqlx::query_as::<_, Message>(&sql)
            .bind(message.conversation_id)
            .bind(message.role.as_str())
            .bind(&message.content)
            .bind(&message.agent_type)
            .bind(&message.metadata)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query("UPDATE conversations SET updated_at = NOW() AT TIME ZONE 'UTC' WHERE id = $1")
            .bind(message.conversation_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(stored)
    }

    async fn get_trip_snapshot(&self, trip_id: i64) -> AppResult<Option<TripContext>> {
        let row = sqlx::query_as::<_, TripRow>(
            r#"
            SELECT CAST(id AS BIGINT) AS id, destination, start_date, end_date,
                   CAST(travelers_count AS INTEGER) AS travelers_count,
                   CAST(budget AS DOUBLE PRECISION) AS budget, currency
            FROM trips WHERE id = $1
            "#,
        )
        .bind(trip_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let accommodations = sqlx::query_as::<_, TripAccommodation>(
            r#"
            SELECT CAST(id AS BIGINT) AS id, name, type, address,
                   CAST(price_per_night AS DOUBLE PRECISION) AS price_per_night,
                   CAST(total_price AS DOUBLE PRECISION) AS total_price, status
            FROM trip_accommodations WHERE trip_id = $1 ORDER BY id
            "#,
        )
        .bind(trip_id)
        .fetch_all(&self.pool)
        .await?;

        let restaurants = sqlx::query_as::<_, TripRestaurant>(
            r#"
            SELECT CAST(id AS BIGINT) AS id, name, cuisine_type, address, price_range, status
            FROM trip_restaurants WHERE trip_id = $1 ORDER BY id
            "#,
        )
        .bind(trip_id)
        .fetch_all(&self.pool)
        .await?;

        let transportations = sqlx::query_as::<_, TripTransportation>(
            r#"
            SELECT CAST(id AS BIGINT) AS id, type, from_location, to_location,
                   CAST(price AS DOUBLE PRECISION) AS price, status
            FROM trip_transportations WHERE trip_id = $1 ORDER BY departure_time, id
            "#,
        )
        .bind(trip_id)
        .fetch_all(&self.pool)
        .await?;

        let activities = sqlx::query_as::<_, TripActivity>(
            r#"
            SELECT CAST(id AS BIGINT) AS id, name, location,
                   CAST(day_number AS INTEGER) AS day_number,
                   LEFT(CAST(start_time AS TEXT), 5) AS start_time,
                   LEFT(CAST(end_time AS TEXT), 5) AS end_time,
                   CAST(duration_minutes AS INTEGER) AS duration_minutes,
                   category, status
            FROM trip_activities WHERE trip_id = $1 ORDER BY day_number, start_time
            "#,
        )
        .bind(trip_id)
        .fetch_all(&self.pool)
        .await?;

        let expenses = sqlx::query_as::<_, TripExpense>(
            r#"
            SELECT CAST(id AS BIGINT) AS id, category, description,
                   CAST(amount AS DOUBLE PRECISION) AS amount, currency, date, is_planned
            FROM trip_expenses WHERE trip_id = $1 ORDER BY date, id
            "#,
        )
        .bind(trip_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(TripContext {
            trip_id: row.id,
            destination: row.destination,
            start_date: row.start_date,
            end_date: row.end_date,
            travelers_count: row.travelers_count,
            budget: row.budget,
            currency: row.currency,
            accommodations,
            restaurants,
            transportations,
            activities,
            expenses,
        }))
    }
}
