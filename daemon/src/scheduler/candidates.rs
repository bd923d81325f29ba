use crate::farm::BuildFarm;
use crate::models::{BuildFarmJob, BuildQueue, Builder};
use crate::schema::*;
use buildfarm_common::errors::*;
use buildfarm_common::{BuildQueueStatus, WorkerResources};
use diesel::prelude::*;

/// The capabilities of the worker asking for work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateQuery {
    pub processor: String,
    pub virtualized: bool,
    pub limit: i64,
    pub resources: WorkerResources,
}

impl CandidateQuery {
    pub fn new(processor: &str, virtualized: bool, limit: i64) -> CandidateQuery {
        CandidateQuery {
            processor: processor.to_string(),
            virtualized,
            limit,
            resources: WorkerResources::default(),
        }
    }

    pub fn resources(mut self, resources: WorkerResources) -> CandidateQuery {
        self.resources = resources;
        self
    }
}

/// Check everything about an entry that doesn't need the specific build.
pub fn is_eligible(entry: &BuildQueue, query: &CandidateQuery, floor: Option<i32>) -> bool {
    if entry.status != BuildQueueStatus::Waiting || entry.builder_id.is_some() {
        return false;
    }
    if entry.processor != query.processor || entry.virtualized != query.virtualized {
        return false;
    }
    if let Some(floor) = floor {
        if entry.lastscore < floor {
            return false;
        }
    }
    query.resources.can_serve(entry.builder_constraints.as_ref())
}

/// Rank `rows` for the worker described by `query`.
///
/// Entries are ordered by descending score, then ascending id, and `accepts`
/// is only asked about entries that passed every other check, stopping as
/// soon as `query.limit` entries were accepted.
pub fn select_candidates<F>(
    mut rows: Vec<(BuildQueue, BuildFarmJob)>,
    query: &CandidateQuery,
    floor: Option<i32>,
    mut accepts: F,
) -> Result<Vec<BuildQueue>>
where
    F: FnMut(&BuildFarmJob, &BuildQueue) -> Result<bool>,
{
    rows.retain(|(entry, _)| is_eligible(entry, query, floor));
    rows.sort_by(|(a, _), (b, _)| b.lastscore.cmp(&a.lastscore).then(a.id.cmp(&b.id)));

    let limit = usize::try_from(query.limit).unwrap_or(0);
    let mut candidates = Vec::new();
    for (entry, job) in rows {
        if candidates.len() >= limit {
            break;
        }
        if accepts(&job, &entry)? {
            candidates.push(entry);
        } else {
            trace!("Queue entry {} rejected by its specific build", entry.id);
        }
    }
    Ok(candidates)
}

/// Find the waiting entries a worker could run next, best first.
///
/// This only reads, nothing is claimed.
pub fn find_build_candidates(
    farm: &BuildFarm,
    query: &CandidateQuery,
    connection: &mut SqliteConnection,
) -> Result<Vec<BuildQueue>> {
    let floor = farm.schedule.score_floor(&query.processor);

    let mut sql = build_queue::table
        .inner_join(build_farm_jobs::table)
        .filter(build_queue::status.eq(BuildQueueStatus::Waiting))
        .filter(build_queue::builder_id.is_null())
        .filter(build_queue::processor.eq(&query.processor))
        .filter(build_queue::virtualized.eq(query.virtualized))
        .order_by((build_queue::lastscore.desc(), build_queue::id))
        .select((BuildQueue::as_select(), BuildFarmJob::as_select()))
        .into_boxed();

    if let Some(floor) = floor {
        sql = sql.filter(build_queue::lastscore.ge(floor));
    }

    let rows = sql.load::<(BuildQueue, BuildFarmJob)>(connection)?;
    debug!(
        "Considering {} waiting entries for {} (virtualized={}, floor={:?})",
        rows.len(),
        query.processor,
        query.virtualized,
        floor
    );

    select_candidates(rows, query, floor, |job, entry| {
        match farm.registry.find(job.job_type) {
            Some(specific) => specific.accepts_candidate(connection, job, entry),
            None => Ok(true),
        }
    })
}

/// Candidates for every processor `builder` serves, merged into one ranking.
pub fn find_candidates_for_builder(
    farm: &BuildFarm,
    builder: &Builder,
    limit: i64,
    connection: &mut SqliteConnection,
) -> Result<Vec<BuildQueue>> {
    let mut candidates = Vec::new();
    for processor in builder.processors(connection)? {
        let query = CandidateQuery::new(&processor, builder.virtualized, limit)
            .resources(builder.resources());
        candidates.extend(find_build_candidates(farm, &query, connection)?);
    }

    candidates.sort_by(|a, b| b.lastscore.cmp(&a.lastscore).then(a.id.cmp(&b.id)));
    candidates.truncate(usize::try_from(limit).unwrap_or(0));
    Ok(candidates)
}
