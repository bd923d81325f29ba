//! Queue depth reporting, based on the estimated duration of each entry.
//!
//! Nothing here influences dispatch order.

use crate::models::{BuildQueue, Builder};
use crate::schema::*;
use buildfarm_common::errors::*;
use buildfarm_common::utils;
use buildfarm_common::BuildQueueStatus;
use chrono::{Duration, NaiveDateTime};
use diesel::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueSize {
    pub processor: String,
    pub virtualized: bool,
    pub count: i64,
    /// Seconds of work waiting in this queue
    pub duration: i64,
}

impl QueueSize {
    pub fn duration(&self) -> Duration {
        Duration::seconds(self.duration)
    }
}

/// Waiting work per processor and virtualization.
pub fn queue_sizes(connection: &mut SqliteConnection) -> Result<Vec<QueueSize>> {
    let rows = build_queue::table
        .filter(build_queue::status.eq(BuildQueueStatus::Waiting))
        .select((
            build_queue::processor,
            build_queue::virtualized,
            build_queue::estimated_duration,
        ))
        .load::<(String, bool, i32)>(connection)?;

    let mut sizes = BTreeMap::<(String, bool), (i64, i64)>::new();
    for (processor, virtualized, duration) in rows {
        let size = sizes.entry((processor, virtualized)).or_default();
        size.0 += 1;
        size.1 += i64::from(duration);
    }

    Ok(sizes
        .into_iter()
        .map(|((processor, virtualized), (count, duration))| QueueSize {
            processor,
            virtualized,
            count,
            duration,
        })
        .collect())
}

/// Time left for a build that started at `started` and is expected to take `estimate` seconds.
pub fn remaining(started: Option<NaiveDateTime>, estimate: i32, now: NaiveDateTime) -> i64 {
    let elapsed = started
        .map(|started| (now - started).num_seconds())
        .unwrap_or(0);
    (i64::from(estimate) - elapsed).max(0)
}

/// How long until `entry` is expected to be dispatched.
///
/// The work ahead of the entry in its queue plus what's left of the running
/// builds is spread over the builders serving that queue. Returns `None` if
/// the entry isn't waiting or no builder is able to take it.
pub fn estimated_start_delay(
    entry: &BuildQueue,
    connection: &mut SqliteConnection,
) -> Result<Option<Duration>> {
    if entry.status != BuildQueueStatus::Waiting {
        return Ok(None);
    }

    let builders = Builder::for_queue(&entry.processor, entry.virtualized, connection)?;
    if builders.is_empty() {
        return Ok(None);
    }

    let ahead = build_queue::table
        .filter(build_queue::status.eq(BuildQueueStatus::Waiting))
        .filter(build_queue::processor.eq(&entry.processor))
        .filter(build_queue::virtualized.eq(entry.virtualized))
        .filter(
            build_queue::lastscore.gt(entry.lastscore).or(build_queue::lastscore
                .eq(entry.lastscore)
                .and(build_queue::id.lt(entry.id))),
        )
        .select(build_queue::estimated_duration)
        .load::<i32>(connection)?
        .into_iter()
        .map(i64::from)
        .sum::<i64>();

    let now = utils::now();
    let running = build_queue::table
        .filter(build_queue::status.eq(BuildQueueStatus::Running))
        .filter(build_queue::processor.eq(&entry.processor))
        .filter(build_queue::virtualized.eq(entry.virtualized))
        .select((build_queue::date_started, build_queue::estimated_duration))
        .load::<(Option<NaiveDateTime>, i32)>(connection)?
        .into_iter()
        .map(|(started, estimate)| remaining(started, estimate, now))
        .sum::<i64>();

    let delay = (ahead + running) / builders.len() as i64;
    Ok(Some(Duration::seconds(delay)))
}
