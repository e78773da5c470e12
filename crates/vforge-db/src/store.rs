//! SQLite-backed repository for the job aggregate.
//!
//! A job is split across three tables: `jobs` (scalar columns plus JSON
//! text for nested objects), `shot_assets` (one row per candidate, the
//! upsert key matching the in-memory `(shot_id, seed)` semantics) and
//! `job_transitions` (append-only history). Reads reassemble the full
//! aggregate; writes that touch more than one table run in a transaction.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use tracing::{debug, info};

use vforge_models::{
    Intent, InvalidTransition, Job, JobError, JobId, JobState, QualityMode, ShotAsset, ShotError,
    ShotPlan, ShotRequest, StateTransition, TemplateId,
};

use crate::config::DbConfig;
use crate::error::{DbError, DbResult};

/// Column list for `jobs` queries.
const JOB_COLUMNS: &str = "\
    job_id, client_id, state, quality_mode, resolution, total_duration_s, \
    intent, template_id, shot_plan, shot_requests, shot_errors, \
    selected_seeds, external_task_ids, error, revision_of, targeted_fields, \
    created_at, updated_at, submitted_at, running_at, finished_at";

/// Column list for `shot_assets` queries.
const ASSET_COLUMNS: &str = "\
    shot_id, seed, model_task_id, raw_video_url, video_url, audio_url, \
    video_path, audio_path, duration_s, resolution";

/// Maximum page size for job listing.
pub const MAX_LIST_LIMIT: i64 = 100;

/// Default page size for job listing.
pub const DEFAULT_LIST_LIMIT: i64 = 50;

/// Pooled handle to the job database.
#[derive(Debug, Clone)]
pub struct JobStore {
    pool: SqlitePool,
}

impl JobStore {
    /// Open the database, creating the file and schema when missing.
    pub async fn connect(config: &DbConfig) -> DbResult<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!(url = %config.url, "job store ready");
        Ok(Self { pool })
    }

    /// The underlying pool, for health probes and ad-hoc queries.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Cheap liveness check.
    pub async fn ping(&self) -> DbResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Persist a freshly built job, including its opening history entry.
    pub async fn create_job(&self, job: &Job) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        let query = format!(
            "INSERT INTO jobs ({JOB_COLUMNS}) VALUES \
             (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, \
              ?15, ?16, ?17, ?18, ?19, ?20, ?21)"
        );
        sqlx::query(&query)
            .bind(job.job_id.as_str())
            .bind(&job.client_id)
            .bind(job.state.as_str())
            .bind(job.quality_mode.as_str())
            .bind(&job.resolution)
            .bind(job.total_duration_s)
            .bind(to_json_opt(&job.intent)?)
            .bind(job.template_id.as_ref().map(|t| t.as_str()))
            .bind(to_json_opt(&job.shot_plan)?)
            .bind(to_json(&job.shot_requests)?)
            .bind(to_json(&job.shot_errors)?)
            .bind(to_json(&job.selected_seeds)?)
            .bind(to_json(&job.external_task_ids)?)
            .bind(to_json_opt(&job.error)?)
            .bind(job.revision_of.as_ref().map(|id| id.as_str()))
            .bind(to_json(&job.targeted_fields)?)
            .bind(job.created_at)
            .bind(job.updated_at)
            .bind(job.submitted_at)
            .bind(job.running_at)
            .bind(job.finished_at)
            .execute(&mut *tx)
            .await?;

        for t in &job.state_transitions {
            insert_transition(
                &mut tx,
                job.job_id.as_str(),
                t.from_state,
                t.to_state,
                &t.label,
                t.at,
            )
            .await?;
        }
        for asset in &job.shot_assets {
            upsert_asset_row(&mut tx, job.job_id.as_str(), asset).await?;
        }

        tx.commit().await?;
        debug!(job_id = %job.job_id, client_id = %job.client_id, "job record created");
        Ok(())
    }

    /// Load the full aggregate, or `None` when unknown.
    pub async fn get_job(&self, job_id: &JobId) -> DbResult<Option<Job>> {
        let query = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE job_id = ?1");
        let Some(row) = sqlx::query_as::<_, JobRow>(&query)
            .bind(job_id.as_str())
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        Ok(Some(self.assemble(row).await?))
    }

    /// Move a job along the state graph, appending a history entry.
    ///
    /// The stored state is re-read inside the transaction and the edge is
    /// checked against the state machine, so a stale caller gets an
    /// `InvalidTransition` instead of silently clobbering a settled job.
    pub async fn update_state(
        &self,
        job_id: &JobId,
        to: JobState,
        label: &str,
    ) -> DbResult<Job> {
        let mut tx = self.pool.begin().await?;

        let from = current_state(&mut tx, job_id).await?;
        if !from.can_transition(to) {
            return Err(InvalidTransition { from, to }.into());
        }

        let now = Utc::now();
        let timestamp_column = match to {
            JobState::Submitted => Some("submitted_at"),
            JobState::Running => Some("running_at"),
            JobState::Succeeded | JobState::Failed => Some("finished_at"),
            JobState::Created => None,
        };
        let query = match timestamp_column {
            Some(column) => format!(
                "UPDATE jobs SET state = ?2, updated_at = ?3, {column} = ?3 WHERE job_id = ?1"
            ),
            None => "UPDATE jobs SET state = ?2, updated_at = ?3 WHERE job_id = ?1".to_string(),
        };
        sqlx::query(&query)
            .bind(job_id.as_str())
            .bind(to.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await?;

        insert_transition(&mut tx, job_id.as_str(), from, to, label, now).await?;
        tx.commit().await?;

        debug!(job_id = %job_id, from = %from, to = %to, label, "job state updated");
        self.require_job(job_id).await
    }

    /// Record the planning outputs on a job.
    pub async fn set_plan_artifacts(
        &self,
        job_id: &JobId,
        intent: &Intent,
        template_id: &TemplateId,
        shot_plan: &ShotPlan,
        shot_requests: &[ShotRequest],
        total_duration_s: f64,
    ) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE jobs SET intent = ?2, template_id = ?3, shot_plan = ?4, \
                 shot_requests = ?5, total_duration_s = ?6, updated_at = ?7 \
             WHERE job_id = ?1",
        )
        .bind(job_id.as_str())
        .bind(to_json(intent)?)
        .bind(template_id.as_str())
        .bind(to_json(shot_plan)?)
        .bind(to_json(shot_requests)?)
        .bind(total_duration_s)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found(job_id.as_str()));
        }
        Ok(())
    }

    /// Insert or replace one produced asset, keyed by `(shot_id, seed)`.
    pub async fn upsert_shot_asset(&self, job_id: &JobId, asset: &ShotAsset) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        touch_job(&mut tx, job_id, Utc::now()).await?;
        upsert_asset_row(&mut tx, job_id.as_str(), asset).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Drop every candidate for the asset's shot and keep only `asset`.
    ///
    /// Finalize and shot regeneration use this to collapse preview
    /// candidates into the single chosen output.
    pub async fn replace_shot_assets(&self, job_id: &JobId, asset: &ShotAsset) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        touch_job(&mut tx, job_id, Utc::now()).await?;
        sqlx::query("DELETE FROM shot_assets WHERE job_id = ?1 AND shot_id = ?2")
            .bind(job_id.as_str())
            .bind(asset.shot_id as i64)
            .execute(&mut *tx)
            .await?;
        upsert_asset_row(&mut tx, job_id.as_str(), asset).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Append one per-shot failure to the job's error list.
    pub async fn record_shot_error(&self, job_id: &JobId, error: &ShotError) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        let raw: Option<String> =
            sqlx::query_scalar("SELECT shot_errors FROM jobs WHERE job_id = ?1")
                .bind(job_id.as_str())
                .fetch_optional(&mut *tx)
                .await?;
        let raw = raw.ok_or_else(|| DbError::not_found(job_id.as_str()))?;

        let mut errors: Vec<ShotError> = from_json(job_id.as_str(), "shot_errors", &raw)?;
        errors.push(error.clone());

        sqlx::query("UPDATE jobs SET shot_errors = ?2, updated_at = ?3 WHERE job_id = ?1")
            .bind(job_id.as_str())
            .bind(to_json(&errors)?)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Store the chosen candidate seed per shot.
    pub async fn set_selected_seeds(
        &self,
        job_id: &JobId,
        seeds: &HashMap<u32, i64>,
    ) -> DbResult<()> {
        let result =
            sqlx::query("UPDATE jobs SET selected_seeds = ?2, updated_at = ?3 WHERE job_id = ?1")
                .bind(job_id.as_str())
                .bind(to_json(seeds)?)
                .bind(Utc::now())
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found(job_id.as_str()));
        }
        Ok(())
    }

    /// Append task handles issued by the external generator.
    pub async fn append_external_task_ids(
        &self,
        job_id: &JobId,
        task_ids: &[String],
    ) -> DbResult<()> {
        if task_ids.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;

        let raw: Option<String> =
            sqlx::query_scalar("SELECT external_task_ids FROM jobs WHERE job_id = ?1")
                .bind(job_id.as_str())
                .fetch_optional(&mut *tx)
                .await?;
        let raw = raw.ok_or_else(|| DbError::not_found(job_id.as_str()))?;

        let mut ids: Vec<String> = from_json(job_id.as_str(), "external_task_ids", &raw)?;
        ids.extend_from_slice(task_ids);

        sqlx::query("UPDATE jobs SET external_task_ids = ?2, updated_at = ?3 WHERE job_id = ?1")
            .bind(job_id.as_str())
            .bind(to_json(&ids)?)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Fail a job and record its terminal error.
    ///
    /// A job whose state cannot legally reach `Failed` (already settled as
    /// `Succeeded`, or already failed) keeps its state and assets; only the
    /// error detail is recorded.
    pub async fn fail_job(&self, job_id: &JobId, error: &JobError, label: &str) -> DbResult<Job> {
        let mut tx = self.pool.begin().await?;

        let from = current_state(&mut tx, job_id).await?;
        let now = Utc::now();
        let error_json = to_json(error)?;

        if from.can_transition(JobState::Failed) {
            sqlx::query(
                "UPDATE jobs SET state = ?2, error = ?3, updated_at = ?4, finished_at = ?4 \
                 WHERE job_id = ?1",
            )
            .bind(job_id.as_str())
            .bind(JobState::Failed.as_str())
            .bind(&error_json)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            insert_transition(&mut tx, job_id.as_str(), from, JobState::Failed, label, now)
                .await?;
        } else {
            sqlx::query("UPDATE jobs SET error = ?2, updated_at = ?3 WHERE job_id = ?1")
                .bind(job_id.as_str())
                .bind(&error_json)
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!(job_id = %job_id, from = %from, label, "job failed");
        self.require_job(job_id).await
    }

    /// Page through one client's jobs, newest first.
    pub async fn list_jobs(
        &self,
        client_id: &str,
        state: Option<JobState>,
        limit: i64,
        offset: i64,
    ) -> DbResult<Vec<Job>> {
        let limit = limit.clamp(1, MAX_LIST_LIMIT);
        let offset = offset.max(0);

        let state_clause = if state.is_some() { " AND state = ?" } else { "" };
        let query = format!(
            "SELECT {JOB_COLUMNS} FROM jobs \
             WHERE client_id = ?{state_clause} \
             ORDER BY created_at DESC \
             LIMIT ? OFFSET ?"
        );

        let mut q = sqlx::query_as::<_, JobRow>(&query).bind(client_id);
        if let Some(state) = state {
            q = q.bind(state.as_str());
        }
        let rows = q.bind(limit).bind(offset).fetch_all(&self.pool).await?;

        let mut jobs = Vec::with_capacity(rows.len());
        for row in rows {
            jobs.push(self.assemble(row).await?);
        }
        Ok(jobs)
    }

    /// Jobs stuck in `Running` since before `cutoff`, oldest first.
    ///
    /// The worker's sweeper fails these as timed out.
    pub async fn find_stale_running(&self, cutoff: DateTime<Utc>) -> DbResult<Vec<Job>> {
        let query = format!(
            "SELECT {JOB_COLUMNS} FROM jobs \
             WHERE state = ?1 AND running_at IS NOT NULL \
               AND datetime(running_at) < datetime(?2) \
             ORDER BY running_at ASC"
        );
        let rows = sqlx::query_as::<_, JobRow>(&query)
            .bind(JobState::Running.as_str())
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?;

        let mut jobs = Vec::with_capacity(rows.len());
        for row in rows {
            jobs.push(self.assemble(row).await?);
        }
        Ok(jobs)
    }

    /// Delete jobs created before `cutoff`, cascading to assets and
    /// history. Returns the number of jobs removed.
    pub async fn delete_expired(&self, cutoff: DateTime<Utc>) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM jobs WHERE datetime(created_at) < datetime(?1)")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected();
        if removed > 0 {
            info!(removed, "expired job records deleted");
        }
        Ok(removed)
    }

    async fn require_job(&self, job_id: &JobId) -> DbResult<Job> {
        self.get_job(job_id)
            .await?
            .ok_or_else(|| DbError::not_found(job_id.as_str()))
    }

    async fn assemble(&self, row: JobRow) -> DbResult<Job> {
        let assets = self.load_assets(&row.job_id).await?;
        let transitions = self.load_transitions(&row.job_id).await?;
        row.into_job(assets, transitions)
    }

    async fn load_assets(&self, job_id: &str) -> DbResult<Vec<ShotAsset>> {
        let query =
            format!("SELECT {ASSET_COLUMNS} FROM shot_assets WHERE job_id = ?1 ORDER BY rowid");
        let rows = sqlx::query_as::<_, AssetRow>(&query)
            .bind(job_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(ShotAsset::from).collect())
    }

    async fn load_transitions(&self, job_id: &str) -> DbResult<Vec<StateTransition>> {
        let rows = sqlx::query_as::<_, TransitionRow>(
            "SELECT from_state, to_state, label, at FROM job_transitions \
             WHERE job_id = ?1 ORDER BY id",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| row.into_transition(job_id))
            .collect()
    }
}

/// Raw `jobs` row before JSON columns are decoded.
#[derive(Debug, FromRow)]
struct JobRow {
    job_id: String,
    client_id: String,
    state: String,
    quality_mode: String,
    resolution: String,
    total_duration_s: f64,
    intent: Option<String>,
    template_id: Option<String>,
    shot_plan: Option<String>,
    shot_requests: String,
    shot_errors: String,
    selected_seeds: String,
    external_task_ids: String,
    error: Option<String>,
    revision_of: Option<String>,
    targeted_fields: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    submitted_at: Option<DateTime<Utc>>,
    running_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl JobRow {
    fn into_job(
        self,
        shot_assets: Vec<ShotAsset>,
        state_transitions: Vec<StateTransition>,
    ) -> DbResult<Job> {
        let state = parse_state(&self.job_id, &self.state)?;
        let quality_mode = self
            .quality_mode
            .parse::<QualityMode>()
            .map_err(|e| DbError::corrupt_record(format!("job {}: {e}", self.job_id)))?;

        let intent: Option<Intent> = match self.intent.as_deref() {
            Some(raw) => Some(from_json(&self.job_id, "intent", raw)?),
            None => None,
        };
        let shot_plan: Option<ShotPlan> = match self.shot_plan.as_deref() {
            Some(raw) => Some(from_json(&self.job_id, "shot_plan", raw)?),
            None => None,
        };
        let error: Option<JobError> = match self.error.as_deref() {
            Some(raw) => Some(from_json(&self.job_id, "error", raw)?),
            None => None,
        };
        let shot_requests: Vec<ShotRequest> =
            from_json(&self.job_id, "shot_requests", &self.shot_requests)?;
        let shot_errors: Vec<ShotError> =
            from_json(&self.job_id, "shot_errors", &self.shot_errors)?;
        let selected_seeds: HashMap<u32, i64> =
            from_json(&self.job_id, "selected_seeds", &self.selected_seeds)?;
        let external_task_ids: Vec<String> =
            from_json(&self.job_id, "external_task_ids", &self.external_task_ids)?;
        let targeted_fields: Vec<String> =
            from_json(&self.job_id, "targeted_fields", &self.targeted_fields)?;

        Ok(Job {
            job_id: JobId::from_string(self.job_id),
            client_id: self.client_id,
            state,
            state_transitions,
            intent,
            template_id: self.template_id.map(TemplateId::from_string),
            shot_plan,
            shot_requests,
            shot_assets,
            shot_errors,
            selected_seeds,
            external_task_ids,
            quality_mode,
            resolution: self.resolution,
            total_duration_s: self.total_duration_s,
            error,
            revision_of: self.revision_of.map(JobId::from_string),
            targeted_fields,
            created_at: self.created_at,
            updated_at: self.updated_at,
            submitted_at: self.submitted_at,
            running_at: self.running_at,
            finished_at: self.finished_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct AssetRow {
    shot_id: i64,
    seed: i64,
    model_task_id: String,
    raw_video_url: String,
    video_url: String,
    audio_url: Option<String>,
    video_path: String,
    audio_path: Option<String>,
    duration_s: f64,
    resolution: String,
}

impl From<AssetRow> for ShotAsset {
    fn from(row: AssetRow) -> Self {
        ShotAsset {
            shot_id: row.shot_id as u32,
            seed: row.seed,
            model_task_id: row.model_task_id,
            raw_video_url: row.raw_video_url,
            video_url: row.video_url,
            audio_url: row.audio_url,
            video_path: row.video_path,
            audio_path: row.audio_path,
            duration_s: row.duration_s,
            resolution: row.resolution,
        }
    }
}

#[derive(Debug, FromRow)]
struct TransitionRow {
    from_state: String,
    to_state: String,
    label: String,
    at: DateTime<Utc>,
}

impl TransitionRow {
    fn into_transition(self, job_id: &str) -> DbResult<StateTransition> {
        Ok(StateTransition {
            from_state: parse_state(job_id, &self.from_state)?,
            to_state: parse_state(job_id, &self.to_state)?,
            at: self.at,
            label: self.label,
        })
    }
}

async fn current_state(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    job_id: &JobId,
) -> DbResult<JobState> {
    let raw: Option<String> = sqlx::query_scalar("SELECT state FROM jobs WHERE job_id = ?1")
        .bind(job_id.as_str())
        .fetch_optional(&mut **tx)
        .await?;
    let raw = raw.ok_or_else(|| DbError::not_found(job_id.as_str()))?;
    parse_state(job_id.as_str(), &raw)
}

async fn touch_job(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    job_id: &JobId,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let result = sqlx::query("UPDATE jobs SET updated_at = ?2 WHERE job_id = ?1")
        .bind(job_id.as_str())
        .bind(now)
        .execute(&mut **tx)
        .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::not_found(job_id.as_str()));
    }
    Ok(())
}

async fn insert_transition(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    job_id: &str,
    from: JobState,
    to: JobState,
    label: &str,
    at: DateTime<Utc>,
) -> DbResult<()> {
    sqlx::query(
        "INSERT INTO job_transitions (job_id, from_state, to_state, label, at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(job_id)
    .bind(from.as_str())
    .bind(to.as_str())
    .bind(label)
    .bind(at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn upsert_asset_row(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    job_id: &str,
    asset: &ShotAsset,
) -> DbResult<()> {
    sqlx::query(
        "INSERT INTO shot_assets \
             (job_id, shot_id, seed, model_task_id, raw_video_url, video_url, \
              audio_url, video_path, audio_path, duration_s, resolution) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11) \
         ON CONFLICT (job_id, shot_id, seed) DO UPDATE SET \
             model_task_id = excluded.model_task_id, \
             raw_video_url = excluded.raw_video_url, \
             video_url = excluded.video_url, \
             audio_url = excluded.audio_url, \
             video_path = excluded.video_path, \
             audio_path = excluded.audio_path, \
             duration_s = excluded.duration_s, \
             resolution = excluded.resolution",
    )
    .bind(job_id)
    .bind(asset.shot_id as i64)
    .bind(asset.seed)
    .bind(&asset.model_task_id)
    .bind(&asset.raw_video_url)
    .bind(&asset.video_url)
    .bind(asset.audio_url.as_deref())
    .bind(&asset.video_path)
    .bind(asset.audio_path.as_deref())
    .bind(asset.duration_s)
    .bind(&asset.resolution)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn parse_state(job_id: &str, raw: &str) -> DbResult<JobState> {
    raw.parse::<JobState>()
        .map_err(|e| DbError::corrupt_record(format!("job {job_id}: {e}")))
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> DbResult<String> {
    Ok(serde_json::to_string(value)?)
}

fn to_json_opt<T: serde::Serialize>(value: &Option<T>) -> DbResult<Option<String>> {
    Ok(value.as_ref().map(serde_json::to_string).transpose()?)
}

fn from_json<T: serde::de::DeserializeOwned>(job_id: &str, field: &str, raw: &str) -> DbResult<T> {
    serde_json::from_str(raw)
        .map_err(|e| DbError::corrupt_record(format!("job {job_id}: bad {field} JSON: {e}")))
}
