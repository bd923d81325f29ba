use crate::farm::BuildFarm;
use crate::metrics::Labels;
use crate::models::{BuildQueue, Builder, NewBuildQueue};
use crate::schema::*;
use buildfarm_common::errors::*;
use buildfarm_common::utils;
use buildfarm_common::{BuildQueueStatus, BuildStatus, JobType};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::Serialize;

#[derive(Identifiable, Queryable, Selectable, AsChangeset, Serialize, Clone, PartialEq, Eq, Debug)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(treat_none_as_null = true)]
#[diesel(table_name = build_farm_jobs)]
pub struct BuildFarmJob {
    pub id: i32,
    pub job_type: JobType,
    pub status: BuildStatus,
    pub date_created: NaiveDateTime,
    pub date_started: Option<NaiveDateTime>,
    pub date_first_dispatched: Option<NaiveDateTime>,
    pub date_finished: Option<NaiveDateTime>,
    pub builder_id: Option<i32>,
    pub archive_id: Option<i32>,
    pub failure_count: i32,
    pub log: Option<String>,
    pub dependencies: Option<String>,
}

/// Optional details of a status update.
#[derive(Debug, Default, Clone, Copy)]
pub struct StatusUpdate<'a> {
    /// The builder running the job, recorded the first time it's given
    pub builder: Option<&'a Builder>,
    pub date_started: Option<NaiveDateTime>,
    pub date_finished: Option<NaiveDateTime>,
    /// Skip the transition table, for administrative overrides
    pub force: bool,
}

impl<'a> StatusUpdate<'a> {
    pub fn builder(builder: &'a Builder) -> Self {
        StatusUpdate {
            builder: Some(builder),
            ..Default::default()
        }
    }

    pub fn forced() -> Self {
        StatusUpdate {
            force: true,
            ..Default::default()
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct QueueOptions {
    /// Start out suspended instead of waiting
    pub suspended: bool,
    /// Use this score instead of asking the specific build
    pub lastscore: Option<i32>,
}

impl BuildFarmJob {
    pub fn get_id(my_id: i32, connection: &mut SqliteConnection) -> Result<BuildFarmJob> {
        build_farm_jobs::table
            .filter(build_farm_jobs::id.eq(my_id))
            .select(BuildFarmJob::as_select())
            .first::<BuildFarmJob>(connection)
            .optional()?
            .ok_or_else(|| SchedulingError::not_found("Build farm job", my_id).into())
    }

    pub fn list(
        status: Option<BuildStatus>,
        limit: Option<i64>,
        connection: &mut SqliteConnection,
    ) -> Result<Vec<BuildFarmJob>> {
        let mut query = build_farm_jobs::table
            .select(BuildFarmJob::as_select())
            .order_by(build_farm_jobs::id)
            .into_boxed();

        if let Some(status) = status {
            query = query.filter(build_farm_jobs::status.eq(status));
        }
        if let Some(limit) = limit {
            query = query.limit(limit);
        }

        Ok(query.load::<BuildFarmJob>(connection)?)
    }

    pub fn update(&self, connection: &mut SqliteConnection) -> Result<()> {
        diesel::update(build_farm_jobs::table.filter(build_farm_jobs::id.eq(self.id)))
            .set(self)
            .execute(connection)?;
        Ok(())
    }

    pub fn build_queue(&self, connection: &mut SqliteConnection) -> Result<Option<BuildQueue>> {
        BuildQueue::get_by_build_farm_job(self.id, connection)
    }

    /// Move the job to a new status.
    ///
    /// Fails with `InvalidStatusTransition` if the transition isn't allowed,
    /// unless the update is forced, and with `InconsistentBuilder` if a different
    /// builder than the recorded one is given.
    pub fn update_status(
        &mut self,
        farm: &BuildFarm,
        status: BuildStatus,
        opts: StatusUpdate<'_>,
        connection: &mut SqliteConnection,
    ) -> Result<()> {
        if !opts.force {
            self.status.check_transition(status)?;
        }

        if let (Some(builder), Some(current)) = (opts.builder, self.builder_id) {
            if builder.id != current {
                return Err(SchedulingError::InconsistentBuilder {
                    job: self.id,
                    current,
                    requested: builder.id,
                }
                .into());
            }
        }

        let now = utils::now();
        if let Some(builder) = opts.builder {
            self.builder_id = Some(builder.id);
        }

        let previous = self.status;
        self.status = status;

        if status == BuildStatus::Building {
            if self.date_first_dispatched.is_none() {
                self.date_first_dispatched = Some(now);
            }
            if self.date_started.is_none() {
                self.date_started = Some(opts.date_started.unwrap_or(now));
            }
        }

        let finished =
            !status.is_active() && self.date_started.is_some() && self.date_finished.is_none();
        if finished {
            self.date_finished = Some(opts.date_finished.unwrap_or(now));
        }

        self.update(connection)?;
        debug!("Build farm job {} changed {} -> {}", self.id, previous, status);

        if finished {
            self.emit_metric(farm, "build.finished", &[("status", status.as_str())], connection)?;
        }

        Ok(())
    }

    pub fn can_be_retried(&self) -> bool {
        self.status.is_retryable()
    }

    pub fn can_be_rescored(&self, connection: &mut SqliteConnection) -> Result<bool> {
        Ok(self.status == BuildStatus::NeedsBuild && self.build_queue(connection)?.is_some())
    }

    pub fn can_be_cancelled(&self, connection: &mut SqliteConnection) -> Result<bool> {
        Ok(matches!(
            self.status,
            BuildStatus::Building | BuildStatus::NeedsBuild
        ) && self.build_queue(connection)?.is_some())
    }

    /// Reset a finished build and put it back into the queue.
    pub fn retry(
        &mut self,
        farm: &BuildFarm,
        connection: &mut SqliteConnection,
    ) -> Result<BuildQueue> {
        if !self.can_be_retried() {
            return Err(SchedulingError::CannotBeRetried {
                job: self.id,
                status: self.status,
            }
            .into());
        }

        let mut job = self.clone();
        let entry = connection.transaction::<_, Error, _>(|connection| {
            if let Some(stale) = job.build_queue(connection)? {
                debug!("Removing stale queue entry {} of job {}", stale.id, job.id);
                stale.destroy(connection)?;
            }

            job.status = BuildStatus::NeedsBuild;
            job.date_started = None;
            job.date_finished = None;
            job.builder_id = None;
            job.log = None;
            job.dependencies = None;
            job.failure_count = 0;
            job.update(connection)?;

            job.queue_build(farm, QueueOptions::default(), connection)
        })?;

        info!("Retrying build farm job {} as queue entry {}", job.id, entry.id);
        *self = job;
        Ok(entry)
    }

    /// Pin the score of a queued build.
    pub fn rescore(&self, score: i32, connection: &mut SqliteConnection) -> Result<()> {
        let mut entry = match self.build_queue(connection)? {
            Some(entry) if self.status == BuildStatus::NeedsBuild => entry,
            _ => {
                return Err(SchedulingError::CannotBeRescored {
                    job: self.id,
                    status: self.status,
                }
                .into())
            }
        };

        entry.manual_score(score, connection)
    }

    /// Cancel the build, this is a no-op if it can't be cancelled.
    pub fn cancel(&mut self, farm: &BuildFarm, connection: &mut SqliteConnection) -> Result<()> {
        if !self.can_be_cancelled(connection)? {
            debug!(
                "Ignoring cancel of build farm job {} in state {}",
                self.id, self.status
            );
            return Ok(());
        }

        if let Some(mut entry) = self.build_queue(connection)? {
            entry.cancel(farm, connection)?;
        }
        *self = BuildFarmJob::get_id(self.id, connection)?;
        Ok(())
    }

    /// Create the queue entry for this job.
    pub fn queue_build(
        &self,
        farm: &BuildFarm,
        opts: QueueOptions,
        connection: &mut SqliteConnection,
    ) -> Result<BuildQueue> {
        let specific = farm.registry.get(self.job_type)?;
        let requirements = specific.requirements(connection, self)?;
        let duration = specific.estimate_duration(connection, self)?;

        let new = NewBuildQueue {
            build_farm_job_id: self.id,
            status: BuildQueueStatus::Waiting,
            processor: requirements.processor,
            virtualized: requirements.virtualized,
            builder_constraints: requirements.builder_constraints,
            lastscore: opts.lastscore.unwrap_or(0),
            manual: false,
            estimated_duration: duration.num_seconds().clamp(0, i32::MAX as i64) as i32,
        };

        // an entry that couldn't be scored must not become visible with score 0
        let entry = connection.transaction::<_, Error, _>(|connection| {
            let mut entry = new.insert(connection)?;
            if opts.lastscore.is_none() {
                entry.score(farm, connection)?;
            }
            if opts.suspended {
                entry.suspend(connection)?;
            }
            Ok(entry)
        })?;

        self.emit_metric(farm, "build.queued", &[], connection)?;
        Ok(entry)
    }

    /// Report an event about this job with the standard labels attached.
    pub fn emit_metric(
        &self,
        farm: &BuildFarm,
        name: &str,
        extra: &[(&str, &str)],
        connection: &mut SqliteConnection,
    ) -> Result<()> {
        let labels = self.metric_labels(extra, connection)?;
        farm.emit(name, &labels);
        Ok(())
    }

    /// The labels of an event about this job, as of now.
    pub fn metric_labels(
        &self,
        extra: &[(&str, &str)],
        connection: &mut SqliteConnection,
    ) -> Result<Labels> {
        let mut labels = Labels::new();
        labels.insert("job_type".to_string(), self.job_type.to_string());

        if let Some(entry) = self.build_queue(connection)? {
            labels.insert("arch".to_string(), entry.processor);
            labels.insert("virtualized".to_string(), entry.virtualized.to_string());
        }

        if let Some(builder_id) = self.builder_id {
            let builder = Builder::get_id(builder_id, connection)?;
            labels.insert("region".to_string(), builder.region());
            labels.insert("builder_name".to_string(), builder.name);
        }

        for (key, value) in extra {
            labels.insert(key.to_string(), value.to_string());
        }

        Ok(labels)
    }
}

#[derive(Insertable, PartialEq, Eq, Debug, Clone)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(table_name = build_farm_jobs)]
pub struct NewBuildFarmJob {
    pub job_type: JobType,
    pub status: BuildStatus,
    pub date_created: NaiveDateTime,
    pub archive_id: Option<i32>,
}

impl NewBuildFarmJob {
    pub fn new(job_type: JobType, archive_id: Option<i32>) -> NewBuildFarmJob {
        NewBuildFarmJob {
            job_type,
            status: BuildStatus::NeedsBuild,
            date_created: utils::now(),
            archive_id,
        }
    }

    pub fn insert(&self, connection: &mut SqliteConnection) -> Result<BuildFarmJob> {
        let job = diesel::insert_into(build_farm_jobs::table)
            .values(self)
            .returning(BuildFarmJob::as_returning())
            .get_result::<BuildFarmJob>(connection)?;
        Ok(job)
    }
}
