use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::{NewOrder, Order, OrderPatch, OrderStatus, OrderType};
use crate::error::{DexFlowError, Result};
use crate::persistence::{Job, JobCounts, JobState, JobStore, OrderStore};

const ORDER_COLUMNS: &str = r#"
    id, order_type, token_in, token_out, amount_in, target_price, status,
    selected_venue, expected_output, executed_price, tx_ref, error_message,
    retry_count, created_at, updated_at
"#;

const JOB_COLUMNS: &str = r#"
    order_id, state, attempts_made, max_attempts, run_at, locked_until, last_error, created_at
"#;

/// PostgreSQL storage adapter for orders and their jobs
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Create a PostgreSQL store from an existing connection pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn order_from_row(r: &PgRow) -> Result<Order> {
        let order_type: String = r.get("order_type");
        let status: String = r.get("status");
        let retry_count: i32 = r.get("retry_count");

        Ok(Order {
            id: r.get("id"),
            order_type: order_type
                .parse::<OrderType>()
                .map_err(DexFlowError::Store)?,
            token_in: r.get("token_in"),
            token_out: r.get("token_out"),
            amount_in: r.get("amount_in"),
            target_price: r.get("target_price"),
            status: OrderStatus::try_from(status.as_str()).map_err(DexFlowError::Store)?,
            selected_venue: r.get("selected_venue"),
            expected_output: r.get("expected_output"),
            executed_price: r.get("executed_price"),
            tx_ref: r.get("tx_ref"),
            error_message: r.get("error_message"),
            retry_count: retry_count.max(0) as u32,
            created_at: r.get("created_at"),
            updated_at: r.get("updated_at"),
        })
    }

    fn job_from_row(r: &PgRow) -> Result<Job> {
        let state: String = r.get("state");
        let attempts_made: i32 = r.get("attempts_made");
        let max_attempts: i32 = r.get("max_attempts");

        Ok(Job {
            order_id: r.get("order_id"),
            attempts_made: attempts_made.max(0) as u32,
            max_attempts: max_attempts.max(0) as u32,
            state: JobState::try_from(state.as_str()).map_err(DexFlowError::Queue)?,
            run_at: r.get("run_at"),
            locked_until: r.get("locked_until"),
            last_error: r.get("last_error"),
            created_at: r.get("created_at"),
        })
    }

    fn active_job_missing(order_id: Uuid) -> DexFlowError {
        DexFlowError::Queue(format!("no active job for order {}", order_id))
    }
}

// ==================== Orders ====================

#[async_trait]
impl OrderStore for PostgresStore {
    #[instrument(skip(self, input))]
    async fn create(&self, input: NewOrder) -> Result<Order> {
        let query = format!(
            r#"
            INSERT INTO orders (id, order_type, token_in, token_out, amount_in, target_price, status)
            VALUES ($1, $2, $3, $4, $5, $6, 'pending')
            RETURNING {}
            "#,
            ORDER_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(Uuid::new_v4())
            .bind(input.order_type.as_str())
            .bind(&input.token_in)
            .bind(&input.token_out)
            .bind(input.amount_in)
            .bind(input.target_price)
            .fetch_one(&self.pool)
            .await?;

        let order = Self::order_from_row(&row)?;
        debug!(order_id = %order.id, "Order created");
        Ok(order)
    }

    #[instrument(skip(self, patch))]
    async fn update_status(&self, id: Uuid, status: OrderStatus, patch: OrderPatch) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query("SELECT status FROM orders WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(DexFlowError::OrderNotFound(id))?;
        let current: String = current.get("status");
        let current = OrderStatus::try_from(current.as_str()).map_err(DexFlowError::Store)?;

        if !current.can_transition_to(status) {
            warn!(order_id = %id, from = %current, to = %status, "Rejected status change");
            return Err(DexFlowError::InvalidStateTransition {
                from: current.to_string(),
                to: status.to_string(),
            });
        }

        let query = format!(
            r#"
            UPDATE orders SET
                status = $2,
                selected_venue = COALESCE($3, selected_venue),
                expected_output = COALESCE($4, expected_output),
                executed_price = COALESCE($5, executed_price),
                tx_ref = COALESCE($6, tx_ref),
                error_message = COALESCE($7, error_message),
                retry_count = COALESCE($8, retry_count),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            ORDER_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(id)
            .bind(status.as_str())
            .bind(patch.selected_venue)
            .bind(patch.expected_output)
            .bind(patch.executed_price)
            .bind(patch.tx_ref)
            .bind(patch.error_message)
            .bind(patch.retry_count.map(|n| n as i32))
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Self::order_from_row(&row)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>> {
        let query = format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS);
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::order_from_row).transpose()
    }
}

// ==================== Jobs ====================

#[async_trait]
impl JobStore for PostgresStore {
    #[instrument(skip(self))]
    async fn enqueue(&self, order_id: Uuid, max_attempts: u32) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO order_jobs (order_id, max_attempts)
            VALUES ($1, $2)
            ON CONFLICT (order_id) DO NOTHING
            "#,
        )
        .bind(order_id)
        .bind(max_attempts as i32)
        .execute(&self.pool)
        .await?;

        let inserted = result.rows_affected() > 0;
        if !inserted {
            debug!("Job for order {} already exists, skipping enqueue", order_id);
        }
        Ok(inserted)
    }

    async fn claim_next(&self, lease: Duration) -> Result<Option<Job>> {
        let query = format!(
            r#"
            UPDATE order_jobs SET
                state = 'active',
                locked_until = NOW() + make_interval(secs => $1)
            WHERE order_id = (
                SELECT order_id FROM order_jobs
                WHERE (state = 'waiting' AND run_at <= NOW())
                   OR (state = 'active' AND (locked_until IS NULL OR locked_until <= NOW()))
                ORDER BY run_at, created_at
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING {}
            "#,
            JOB_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(lease.as_secs_f64())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::job_from_row).transpose()
    }

    async fn renew(&self, order_id: Uuid, lease: Duration) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE order_jobs SET locked_until = NOW() + make_interval(secs => $2)
            WHERE order_id = $1 AND state = 'active'
            "#,
        )
        .bind(order_id)
        .bind(lease.as_secs_f64())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn complete(&self, order_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM order_jobs WHERE order_id = $1")
            .bind(order_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, error))]
    async fn schedule_retry(&self, order_id: Uuid, delay: Duration, error: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE order_jobs SET
                state = 'waiting',
                attempts_made = attempts_made + 1,
                locked_until = NULL,
                last_error = $2,
                run_at = NOW() + make_interval(secs => $3)
            WHERE order_id = $1 AND state = 'active'
            "#,
        )
        .bind(order_id)
        .bind(error)
        .bind(delay.as_secs_f64())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Self::active_job_missing(order_id));
        }
        Ok(())
    }

    async fn release(&self, order_id: Uuid) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE order_jobs SET state = 'waiting', locked_until = NULL
            WHERE order_id = $1 AND state = 'active'
            "#,
        )
        .bind(order_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Self::active_job_missing(order_id));
        }
        Ok(())
    }

    #[instrument(skip(self, error))]
    async fn fail(&self, order_id: Uuid, error: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE order_jobs SET
                state = 'failed',
                attempts_made = attempts_made + 1,
                locked_until = NULL,
                last_error = $2
            WHERE order_id = $1 AND state = 'active'
            "#,
        )
        .bind(order_id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Self::active_job_missing(order_id));
        }
        Ok(())
    }

    async fn recover_expired(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE order_jobs SET state = 'waiting', locked_until = NULL
            WHERE state = 'active' AND (locked_until IS NULL OR locked_until <= NOW())
            "#,
        )
        .execute(&self.pool)
        .await?;

        let recovered = result.rows_affected();
        if recovered > 0 {
            info!("Recovered {} jobs with expired leases", recovered);
        }
        Ok(recovered)
    }

    async fn purge_failed(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM order_jobs WHERE state = 'failed'")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn counts(&self) -> Result<JobCounts> {
        let rows = sqlx::query("SELECT state, COUNT(*) AS n FROM order_jobs GROUP BY state")
            .fetch_all(&self.pool)
            .await?;

        let mut counts = JobCounts::default();
        for r in rows {
            let state: String = r.get("state");
            let n: i64 = r.get("n");
            match JobState::try_from(state.as_str()) {
                Ok(JobState::Waiting) => counts.waiting = n as u64,
                Ok(JobState::Active) => counts.active = n as u64,
                Ok(JobState::Failed) => counts.failed = n as u64,
                Err(e) => warn!("Skipping job count row: {}", e),
            }
        }
        Ok(counts)
    }

    async fn get(&self, order_id: Uuid) -> Result<Option<Job>> {
        let query = format!("SELECT {} FROM order_jobs WHERE order_id = $1", JOB_COLUMNS);
        let row = sqlx::query(&query)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::job_from_row).transpose()
    }
}
