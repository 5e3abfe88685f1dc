use anyhow::Context;
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};

use super::history::{ActivityOutcome, HistoryEvent, HistoryStore, RunStatus, WorkflowRun};

// ============================================================================
// PostgreSQL History Store
// ============================================================================
//
// workflow_runs     one row per run; `status` is the plain label for queries,
//                   `status_detail` the full serialized RunStatus
// workflow_history  one row per finished step, PK (run_id, sequence); the
//                   primary key is what rejects a second record of a step
//
// ============================================================================

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS workflow_runs (
        run_id TEXT PRIMARY KEY,
        workflow_type TEXT NOT NULL,
        input JSONB NOT NULL,
        status TEXT NOT NULL,
        status_detail JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_workflow_runs_status ON workflow_runs (workflow_type, status)",
    r#"
    CREATE TABLE IF NOT EXISTS workflow_history (
        run_id TEXT NOT NULL REFERENCES workflow_runs (run_id) ON DELETE CASCADE,
        sequence INT NOT NULL,
        activity TEXT NOT NULL,
        input JSONB NOT NULL,
        outcome JSONB NOT NULL,
        attempts INT NOT NULL,
        recorded_at TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (run_id, sequence)
    )
    "#,
];

pub struct PgHistoryStore {
    pool: PgPool,
}

impl PgHistoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::info!("Workflow history schema ready");
        Ok(())
    }
}

fn run_from_row(row: &PgRow) -> anyhow::Result<WorkflowRun> {
    let Json(status): Json<RunStatus> = row.try_get("status_detail")?;
    Ok(WorkflowRun {
        run_id: row.try_get("run_id")?,
        workflow_type: row.try_get("workflow_type")?,
        input: row.try_get("input")?,
        status,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn event_from_row(row: &PgRow) -> anyhow::Result<HistoryEvent> {
    let sequence: i32 = row.try_get("sequence")?;
    let attempts: i32 = row.try_get("attempts")?;
    let Json(outcome): Json<ActivityOutcome> = row.try_get("outcome")?;
    Ok(HistoryEvent {
        run_id: row.try_get("run_id")?,
        sequence: u32::try_from(sequence).context("negative step sequence in history")?,
        activity: row.try_get("activity")?,
        input: row.try_get("input")?,
        outcome,
        attempts: u32::try_from(attempts).unwrap_or_default(),
        recorded_at: row.try_get("recorded_at")?,
    })
}

#[async_trait]
impl HistoryStore for PgHistoryStore {
    async fn create_run(&self, run: &WorkflowRun) -> anyhow::Result<bool> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO workflow_runs (run_id, workflow_type, input, status, status_detail, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (run_id) DO NOTHING
            "#,
        )
        .bind(&run.run_id)
        .bind(&run.workflow_type)
        .bind(&run.input)
        .bind(run.status.as_str())
        .bind(Json(&run.status))
        .bind(run.created_at)
        .bind(run.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(inserted.rows_affected() == 1)
    }

    async fn get_run(&self, run_id: &str) -> anyhow::Result<Option<WorkflowRun>> {
        sqlx::query(
            "SELECT run_id, workflow_type, input, status_detail, created_at, updated_at FROM workflow_runs WHERE run_id = $1",
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?
        .as_ref()
        .map(run_from_row)
        .transpose()
    }

    async fn running_runs(&self, workflow_type: &str) -> anyhow::Result<Vec<WorkflowRun>> {
        sqlx::query(
            r#"
            SELECT run_id, workflow_type, input, status_detail, created_at, updated_at
            FROM workflow_runs
            WHERE workflow_type = $1 AND status = $2
            ORDER BY created_at
            "#,
        )
        .bind(workflow_type)
        .bind(RunStatus::Running.as_str())
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(run_from_row)
        .collect()
    }

    async fn load_history(&self, run_id: &str) -> anyhow::Result<Vec<HistoryEvent>> {
        sqlx::query(
            r#"
            SELECT run_id, sequence, activity, input, outcome, attempts, recorded_at
            FROM workflow_history
            WHERE run_id = $1
            ORDER BY sequence
            "#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(event_from_row)
        .collect()
    }

    async fn append_event(&self, event: &HistoryEvent) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO workflow_history (run_id, sequence, activity, input, outcome, attempts, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&event.run_id)
        .bind(i32::try_from(event.sequence)?)
        .bind(&event.activity)
        .bind(&event.input)
        .bind(Json(&event.outcome))
        .bind(i32::try_from(event.attempts)?)
        .bind(event.recorded_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("recording step {} of run {}", event.sequence, event.run_id))?;

        Ok(())
    }

    async fn finish_run(&self, run_id: &str, status: RunStatus) -> anyhow::Result<()> {
        let updated = sqlx::query(
            "UPDATE workflow_runs SET status = $2, status_detail = $3, updated_at = $4 WHERE run_id = $1",
        )
        .bind(run_id)
        .bind(status.as_str())
        .bind(Json(&status))
        .bind(crate::domain::order::now())
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            anyhow::bail!("workflow run {run_id} not found");
        }
        Ok(())
    }
}
