use crate::farm::BuildFarm;
use crate::models::{BuildFarmJob, Builder, StatusUpdate};
use crate::schema::*;
use buildfarm_common::errors::*;
use buildfarm_common::utils;
use buildfarm_common::{BuildQueueStatus, BuildStatus, ResourceSet};
use chrono::{Duration, NaiveDateTime};
use diesel::prelude::*;
use serde::Serialize;

#[derive(Identifiable, Queryable, Selectable, AsChangeset, Serialize, Clone, PartialEq, Eq, Debug)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(treat_none_as_null = true)]
#[diesel(table_name = build_queue)]
pub struct BuildQueue {
    pub id: i32,
    pub build_farm_job_id: i32,
    pub status: BuildQueueStatus,
    pub processor: String,
    pub virtualized: bool,
    pub builder_constraints: Option<ResourceSet>,
    pub builder_id: Option<i32>,
    pub lastscore: i32,
    pub manual: bool,
    /// Seconds
    pub estimated_duration: i32,
    pub date_started: Option<NaiveDateTime>,
    pub logtail: Option<String>,
}

/// Result of trying to take a waiting entry for a builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    /// Somebody else got there first, try the next candidate
    Lost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The build never started and is gone from the queue
    Cancelled,
    /// The builder has to be told to stop, see [`BuildQueue::mark_as_cancelled`]
    Cancelling,
}

impl BuildQueue {
    pub fn get_id(my_id: i32, connection: &mut SqliteConnection) -> Result<BuildQueue> {
        build_queue::table
            .filter(build_queue::id.eq(my_id))
            .select(BuildQueue::as_select())
            .first::<BuildQueue>(connection)
            .optional()?
            .ok_or_else(|| SchedulingError::not_found("Build queue entry", my_id).into())
    }

    pub fn get_by_build_farm_job(
        my_job_id: i32,
        connection: &mut SqliteConnection,
    ) -> Result<Option<BuildQueue>> {
        let entry = build_queue::table
            .filter(build_queue::build_farm_job_id.eq(my_job_id))
            .select(BuildQueue::as_select())
            .first::<BuildQueue>(connection)
            .optional()?;
        Ok(entry)
    }

    pub fn get_by_builder(
        my_builder_id: i32,
        connection: &mut SqliteConnection,
    ) -> Result<Option<BuildQueue>> {
        let entry = build_queue::table
            .filter(build_queue::builder_id.eq(my_builder_id))
            .select(BuildQueue::as_select())
            .first::<BuildQueue>(connection)
            .optional()?;
        Ok(entry)
    }

    /// List queue entries in dispatch order.
    pub fn list(
        status: Option<BuildQueueStatus>,
        processor: Option<&str>,
        limit: Option<i64>,
        connection: &mut SqliteConnection,
    ) -> Result<Vec<BuildQueue>> {
        let mut query = build_queue::table
            .select(BuildQueue::as_select())
            .order_by((build_queue::lastscore.desc(), build_queue::id))
            .into_boxed();

        if let Some(status) = status {
            query = query.filter(build_queue::status.eq(status));
        }
        if let Some(processor) = processor {
            query = query.filter(build_queue::processor.eq(processor));
        }
        if let Some(limit) = limit {
            query = query.limit(limit);
        }

        Ok(query.load::<BuildQueue>(connection)?)
    }

    pub fn update(&self, connection: &mut SqliteConnection) -> Result<()> {
        diesel::update(build_queue::table.filter(build_queue::id.eq(self.id)))
            .set(self)
            .execute(connection)?;
        Ok(())
    }

    pub fn build_farm_job(&self, connection: &mut SqliteConnection) -> Result<BuildFarmJob> {
        BuildFarmJob::get_id(self.build_farm_job_id, connection)
    }

    pub fn estimated_duration(&self) -> Duration {
        Duration::seconds(self.estimated_duration.into())
    }

    /// Recalculate the score, unless it has been set by hand.
    pub fn score(&mut self, farm: &BuildFarm, connection: &mut SqliteConnection) -> Result<()> {
        if self.manual {
            return Ok(());
        }

        let job = self.build_farm_job(connection)?;
        let score = farm
            .registry
            .get(job.job_type)?
            .calculate_score(connection, &job)
            .with_context(|| anyhow!("Failed to score build farm job {}", job.id))?;

        if score != self.lastscore {
            debug!("Rescoring queue entry {}: {} -> {}", self.id, self.lastscore, score);
            self.lastscore = score;
            self.update(connection)?;
        }
        Ok(())
    }

    /// Pin the score, automatic scoring leaves it alone from now on.
    pub fn manual_score(&mut self, value: i32, connection: &mut SqliteConnection) -> Result<()> {
        info!("Pinning score of queue entry {} to {}", self.id, value);
        self.lastscore = value;
        self.manual = true;
        self.update(connection)
    }

    /// Atomically assign a waiting, unclaimed entry to a builder.
    ///
    /// Only one of any number of concurrent callers gets `Claimed`, everybody
    /// else sees `Lost` and should move on to their next candidate.
    pub fn claim(
        my_id: i32,
        my_builder_id: i32,
        connection: &mut SqliteConnection,
    ) -> Result<ClaimOutcome> {
        let rows = diesel::update(
            build_queue::table
                .filter(build_queue::id.eq(my_id))
                .filter(build_queue::builder_id.is_null())
                .filter(build_queue::status.eq(BuildQueueStatus::Waiting)),
        )
        .set((
            build_queue::builder_id.eq(Some(my_builder_id)),
            build_queue::status.eq(BuildQueueStatus::Running),
            build_queue::date_started.eq(Some(utils::now())),
        ))
        .execute(connection)?;

        if rows == 1 {
            Ok(ClaimOutcome::Claimed)
        } else {
            debug!("Lost race for queue entry {} (builder {})", my_id, my_builder_id);
            Ok(ClaimOutcome::Lost)
        }
    }

    /// Hand a claimed entry back to the queue without touching the build.
    pub fn release(&mut self, connection: &mut SqliteConnection) -> Result<()> {
        self.builder_id = None;
        self.status = BuildQueueStatus::Waiting;
        self.date_started = None;
        self.update(connection)
    }

    /// Start the build on `builder`.
    ///
    /// The entry either has to be waiting without a builder, or already be
    /// claimed by this very builder.
    pub fn mark_as_building(
        &mut self,
        farm: &BuildFarm,
        builder: &Builder,
        connection: &mut SqliteConnection,
    ) -> Result<()> {
        match (self.status, self.builder_id) {
            (BuildQueueStatus::Waiting, None) => (),
            (BuildQueueStatus::Running, Some(id)) if id == builder.id => (),
            (status, _) => {
                return Err(SchedulingError::IllegalQueueTransition {
                    id: self.id,
                    action: "start",
                    status,
                }
                .into())
            }
        }

        let mut entry = self.clone();
        entry.builder_id = Some(builder.id);
        entry.status = BuildQueueStatus::Running;
        if entry.date_started.is_none() {
            entry.date_started = Some(utils::now());
        }

        connection.transaction::<_, Error, _>(|connection| {
            entry.update(connection)?;
            let mut job = entry.build_farm_job(connection)?;
            job.update_status(
                farm,
                BuildStatus::Building,
                StatusUpdate::builder(builder),
                connection,
            )
        })?;

        info!("Builder {:?} started queue entry {}", builder.name, entry.id);
        *self = entry;
        Ok(())
    }

    pub fn suspend(&mut self, connection: &mut SqliteConnection) -> Result<()> {
        if self.status != BuildQueueStatus::Waiting {
            return Err(SchedulingError::IllegalQueueTransition {
                id: self.id,
                action: "suspend",
                status: self.status,
            }
            .into());
        }
        self.status = BuildQueueStatus::Suspended;
        self.update(connection)
    }

    pub fn resume(&mut self, connection: &mut SqliteConnection) -> Result<()> {
        if self.status != BuildQueueStatus::Suspended {
            return Err(SchedulingError::IllegalQueueTransition {
                id: self.id,
                action: "resume",
                status: self.status,
            }
            .into());
        }
        self.status = BuildQueueStatus::Waiting;
        self.update(connection)
    }

    /// Put a build whose builder went away back into the pool.
    pub fn reset(&mut self, farm: &BuildFarm, connection: &mut SqliteConnection) -> Result<()> {
        let mut job = self.build_farm_job(connection)?;
        let lost = if let Some(builder_id) = self.builder_id {
            info!("Resetting queue entry {} (builder {})", self.id, builder_id);
            Some(job.metric_labels(&[], connection)?)
        } else {
            None
        };

        let mut entry = self.clone();
        entry.builder_id = None;
        entry.status = BuildQueueStatus::Waiting;
        entry.date_started = None;
        entry.logtail = None;

        connection.transaction::<_, Error, _>(|connection| {
            entry.update(connection)?;
            job.builder_id = None;
            job.update_status(
                farm,
                BuildStatus::NeedsBuild,
                StatusUpdate::forced(),
                connection,
            )
        })?;
        *self = entry;

        if let Some(labels) = lost {
            farm.emit("build.reset", &labels);
        }
        Ok(())
    }

    /// Cancel the build, right away if it's still waiting.
    pub fn cancel(
        &mut self,
        farm: &BuildFarm,
        connection: &mut SqliteConnection,
    ) -> Result<CancelOutcome> {
        match self.status {
            BuildQueueStatus::Waiting => {
                self.clone().mark_as_cancelled(farm, connection)?;
                Ok(CancelOutcome::Cancelled)
            }
            BuildQueueStatus::Running => {
                let mut entry = self.clone();
                entry.status = BuildQueueStatus::Cancelling;

                connection.transaction::<_, Error, _>(|connection| {
                    entry.update(connection)?;
                    let mut job = entry.build_farm_job(connection)?;
                    job.update_status(
                        farm,
                        BuildStatus::Cancelling,
                        StatusUpdate::default(),
                        connection,
                    )
                })?;

                info!("Requested cancellation of queue entry {}", entry.id);
                *self = entry;
                Ok(CancelOutcome::Cancelling)
            }
            status => Err(SchedulingError::IllegalQueueTransition {
                id: self.id,
                action: "cancel",
                status,
            }
            .into()),
        }
    }

    /// Finish a cancellation, the build ends up CANCELLED and the entry is removed.
    pub fn mark_as_cancelled(
        self,
        farm: &BuildFarm,
        connection: &mut SqliteConnection,
    ) -> Result<()> {
        let job_id = connection.transaction::<_, Error, _>(|connection| {
            let mut job = self.build_farm_job(connection)?;
            job.update_status(
                farm,
                BuildStatus::Cancelled,
                StatusUpdate::default(),
                connection,
            )?;
            self.destroy(connection)?;
            Ok(job.id)
        })?;
        info!("Cancelled build farm job {}", job_id);
        Ok(())
    }

    pub fn destroy(self, connection: &mut SqliteConnection) -> Result<()> {
        diesel::delete(build_queue::table.filter(build_queue::id.eq(self.id)))
            .execute(connection)?;
        Ok(())
    }
}

#[derive(Insertable, PartialEq, Eq, Debug, Clone)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(table_name = build_queue)]
pub struct NewBuildQueue {
    pub build_farm_job_id: i32,
    pub status: BuildQueueStatus,
    pub processor: String,
    pub virtualized: bool,
    pub builder_constraints: Option<ResourceSet>,
    pub lastscore: i32,
    pub manual: bool,
    pub estimated_duration: i32,
}

impl NewBuildQueue {
    pub fn insert(&self, connection: &mut SqliteConnection) -> Result<BuildQueue> {
        let entry = diesel::insert_into(build_queue::table)
            .values(self)
            .returning(BuildQueue::as_returning())
            .get_result::<BuildQueue>(connection)
            .with_context(|| {
                anyhow!(
                    "Failed to queue build farm job {}",
                    self.build_farm_job_id
                )
            })?;
        Ok(entry)
    }
}
