use async_trait::async_trait;
use dcron_core::{
    models::{JobLog, LogBatch},
    traits::{JobLogRepository, LogSink},
    SchedulerResult,
};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use tracing::{debug, instrument};

pub struct PostgresLogStore {
    pool: PgPool,
    max_field_length: usize,
}

impl PostgresLogStore {
    pub fn new(pool: PgPool, max_field_length: usize) -> Self {
        Self {
            pool,
            max_field_length,
        }
    }

    pub async fn connect(
        url: &str,
        max_connections: u32,
        max_field_length: usize,
    ) -> SchedulerResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self::new(pool, max_field_length))
    }

    pub async fn migrate(&self) -> SchedulerResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS job_logs (
                id BIGSERIAL PRIMARY KEY,
                job_name VARCHAR(255) NOT NULL,
                command TEXT NOT NULL,
                err TEXT NOT NULL,
                output TEXT NOT NULL,
                plan_time BIGINT NOT NULL,
                schedule_time BIGINT NOT NULL,
                start_time BIGINT NOT NULL,
                end_time BIGINT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_job_logs_job_name ON job_logs (job_name, id DESC)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn row_to_job_log(row: &sqlx::postgres::PgRow) -> SchedulerResult<JobLog> {
        Ok(JobLog {
            id: row.try_get("id")?,
            job_name: row.try_get("job_name")?,
            command: row.try_get("command")?,
            err: row.try_get("err")?,
            output: row.try_get("output")?,
            plan_time: row.try_get("plan_time")?,
            schedule_time: row.try_get("schedule_time")?,
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
        })
    }
}

#[async_trait]
impl LogSink for PostgresLogStore {
    #[instrument(skip(self, batch), fields(batch_size = batch.len()))]
    async fn append_batch(&self, batch: &LogBatch) -> SchedulerResult<()> {
        let mut tx = self.pool.begin().await?;
        for log in &batch.logs {
            let mut log = log.clone();
            log.truncate_fields(self.max_field_length);
            sqlx::query(
                r#"
                INSERT INTO job_logs (job_name, command, err, output, plan_time, schedule_time, start_time, end_time)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(&log.job_name)
            .bind(&log.command)
            .bind(&log.err)
            .bind(&log.output)
            .bind(log.plan_time)
            .bind(log.schedule_time)
            .bind(log.start_time)
            .bind(log.end_time)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!("写入 {} 条执行日志", batch.len());
        Ok(())
    }
}

#[async_trait]
impl JobLogRepository for PostgresLogStore {
    async fn list_by_job(
        &self,
        job_name: &str,
        skip: i64,
        limit: i64,
    ) -> SchedulerResult<Vec<JobLog>> {
        let rows = sqlx::query(
            r#"
            SELECT id, job_name, command, err, output, plan_time, schedule_time, start_time, end_time
            FROM job_logs WHERE job_name = $1
            ORDER BY id DESC LIMIT $2 OFFSET $3
            "#,
        )
        .bind(job_name)
        .bind(limit)
        .bind(skip)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_job_log).collect()
    }
}
