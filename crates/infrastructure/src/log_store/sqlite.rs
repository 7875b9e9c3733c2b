use async_trait::async_trait;
use dcron_core::{
    models::{JobLog, LogBatch},
    traits::{JobLogRepository, LogSink},
    SchedulerResult,
};
use sqlx::{sqlite::SqlitePoolOptions, Row, SqlitePool};
use tracing::{debug, instrument};

pub struct SqliteLogStore {
    pool: SqlitePool,
    max_field_length: usize,
}

impl SqliteLogStore {
    pub fn new(pool: SqlitePool, max_field_length: usize) -> Self {
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
        // 内存数据库每个连接各自独立，只能用单连接
        let max_connections = if url.contains(":memory:") {
            1
        } else {
            max_connections
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self::new(pool, max_field_length))
    }

    pub async fn migrate(&self) -> SchedulerResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS job_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                job_name TEXT NOT NULL,
                command TEXT NOT NULL,
                err TEXT NOT NULL,
                output TEXT NOT NULL,
                plan_time INTEGER NOT NULL,
                schedule_time INTEGER NOT NULL,
                start_time INTEGER NOT NULL,
                end_time INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_job_logs_job_name ON job_logs (job_name, id)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn row_to_job_log(row: &sqlx::sqlite::SqliteRow) -> SchedulerResult<JobLog> {
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
impl LogSink for SqliteLogStore {
    #[instrument(skip(self, batch), fields(batch_size = batch.len()))]
    async fn append_batch(&self, batch: &LogBatch) -> SchedulerResult<()> {
        let mut tx = self.pool.begin().await?;
        for log in &batch.logs {
            let mut log = log.clone();
            log.truncate_fields(self.max_field_length);
            sqlx::query(
                r#"
                INSERT INTO job_logs (job_name, command, err, output, plan_time, schedule_time, start_time, end_time)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
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
impl JobLogRepository for SqliteLogStore {
    async fn list_by_job(
        &self,
        job_name: &str,
        skip: i64,
        limit: i64,
    ) -> SchedulerResult<Vec<JobLog>> {
        let rows = sqlx::query(
            r#"
            SELECT id, job_name, command, err, output, plan_time, schedule_time, start_time, end_time
            FROM job_logs WHERE job_name = ?
            ORDER BY id DESC LIMIT ? OFFSET ?
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
