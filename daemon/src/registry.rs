//! Extension points for the specific build kinds.
//!
//! The scheduler only knows the generic [`BuildFarmJob`] record. Everything that
//! depends on what is actually being built (the score, the expected duration,
//! the processor it needs) is asked from the [`SpecificBuild`] registered for
//! the job's [`JobType`].

use crate::models::{BuildFarmJob, BuildQueue};
use buildfarm_common::errors::*;
use buildfarm_common::{JobType, ResourceSet};
use chrono::Duration;
use diesel::SqliteConnection;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// What a build needs from the builder that runs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequirements {
    pub processor: String,
    pub virtualized: bool,
    pub builder_constraints: Option<ResourceSet>,
}

pub trait Scorable {
    fn calculate_score(&self, connection: &mut SqliteConnection, job: &BuildFarmJob)
        -> Result<i32>;
}

pub trait DurationEstimable {
    fn estimate_duration(
        &self,
        connection: &mut SqliteConnection,
        job: &BuildFarmJob,
    ) -> Result<Duration>;
}

pub trait CandidateFilterable {
    /// Additional eligibility check applied during candidate selection.
    fn accepts_candidate(
        &self,
        _connection: &mut SqliteConnection,
        _job: &BuildFarmJob,
        _candidate: &BuildQueue,
    ) -> Result<bool> {
        Ok(true)
    }

    /// Last chance to turn down a candidate after it has been claimed.
    ///
    /// Runs inside the claiming transaction, returning `false` hands the entry
    /// back to the queue and the dispatcher moves on to the next candidate.
    fn postprocess_candidate(
        &self,
        _connection: &mut SqliteConnection,
        _job: &BuildFarmJob,
        _candidate: &BuildQueue,
    ) -> Result<bool> {
        Ok(true)
    }
}

pub trait SpecificBuild: Scorable + DurationEstimable + CandidateFilterable + Send + Sync {
    fn requirements(
        &self,
        connection: &mut SqliteConnection,
        job: &BuildFarmJob,
    ) -> Result<BuildRequirements>;
}

#[derive(Default, Clone)]
pub struct Registry {
    builds: HashMap<JobType, Arc<dyn SpecificBuild>>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    pub fn register<B: SpecificBuild + 'static>(&mut self, job_type: JobType, build: B) -> &mut Self {
        if self.builds.insert(job_type, Arc::new(build)).is_some() {
            warn!("Replacing specific build registered for {}", job_type);
        }
        self
    }

    pub fn find(&self, job_type: JobType) -> Option<&dyn SpecificBuild> {
        self.builds.get(&job_type).map(|b| b.as_ref())
    }

    pub fn get(&self, job_type: JobType) -> Result<&dyn SpecificBuild> {
        self.find(job_type)
            .ok_or_else(|| SchedulingError::UnregisteredJobType(job_type).into())
    }

    pub fn job_types(&self) -> Vec<JobType> {
        let mut types = self.builds.keys().copied().collect::<Vec<_>>();
        types.sort();
        types
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("job_types", &self.job_types())
            .finish()
    }
}
