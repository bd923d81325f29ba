use crate::data::*;
use crate::fixtures::*;
use crate::setup::*;
use buildfarm::models::{BuildQueue, CancelOutcome, NewBuildFarmJob, QueueOptions, StatusUpdate};
use buildfarm::scheduler::{self, CandidateQuery};
use buildfarm_common::errors::{scheduling_error, Error, SchedulingError};
use buildfarm_common::{BuildQueueStatus, BuildStatus, JobType};
use rstest::rstest;

fn assert_invalid_transition(err: &Error, from: BuildStatus, to: BuildStatus) {
    assert_eq!(
        scheduling_error(err),
        Some(&SchedulingError::InvalidStatusTransition { from, to })
    );
}

fn assert_illegal(err: &Error, expected: &str) {
    match scheduling_error(err) {
        Some(SchedulingError::IllegalQueueTransition { action, .. }) => {
            assert_eq!(*action, expected)
        }
        other => panic!("Unexpected error: {:?} ({:#})", other, err),
    }
}

#[rstest]
pub fn suspend_and_resume(isolated_farm: IsolatedFarm) {
    let mut connection = isolated_farm.connection();
    let connection = &mut *connection;

    let (_, mut entry) = setup_queued_build(&isolated_farm, connection, 0);

    let err = entry.resume(connection).unwrap_err();
    assert_illegal(&err, "resume");

    entry.suspend(connection).unwrap();
    assert_eq!(reload_entry(&entry, connection).status, BuildQueueStatus::Suspended);
    let err = entry.suspend(connection).unwrap_err();
    assert_illegal(&err, "suspend");

    entry.resume(connection).unwrap();
    assert_eq!(reload_entry(&entry, connection).status, BuildQueueStatus::Waiting);
}

#[rstest]
pub fn running_build_cannot_be_suspended(isolated_farm: IsolatedFarm) {
    let mut connection = isolated_farm.connection();
    let connection = &mut *connection;

    let builder = setup_dummy_builder(connection);
    let (_, mut entry) = setup_running_build(&isolated_farm, connection, &builder);

    let err = entry.suspend(connection).unwrap_err();
    assert_illegal(&err, "suspend");
    assert_eq!(reload_entry(&entry, connection).status, BuildQueueStatus::Running);
}

#[rstest]
pub fn queue_build_suspended(isolated_farm: IsolatedFarm) {
    let mut connection = isolated_farm.connection();
    let connection = &mut *connection;

    let job = NewBuildFarmJob::new(JobType::PackageBuild, None)
        .insert(connection)
        .unwrap();
    let entry = job
        .queue_build(
            &isolated_farm.farm,
            QueueOptions {
                suspended: true,
                lastscore: Some(77),
            },
            connection,
        )
        .unwrap();

    assert_eq!(entry.status, BuildQueueStatus::Suspended);
    assert_eq!(entry.lastscore, 77);
    assert_eq!(reload_entry(&entry, connection), entry);
}

#[rstest]
pub fn unscorable_build_is_not_queued(isolated_farm: IsolatedFarm) {
    let mut connection = isolated_farm.connection();
    let connection = &mut *connection;

    let job = NewBuildFarmJob::new(JobType::PackageBuild, None)
        .insert(connection)
        .unwrap();
    isolated_farm.build.state().broken_scoring = true;

    assert!(job
        .queue_build(&isolated_farm.farm, QueueOptions::default(), connection)
        .is_err());
    assert_eq!(job.build_queue(connection).unwrap(), None);
    assert!(isolated_farm.metrics.named("build.queued").is_empty());

    let query = CandidateQuery::new(DUMMY_PROCESSOR, true, 10);
    let candidates =
        scheduler::find_build_candidates(&isolated_farm.farm, &query, connection).unwrap();
    assert!(candidates.is_empty());

    // once scoring works again the build can be queued
    isolated_farm.build.state().broken_scoring = false;
    isolated_farm.build.score_job(job.id, 5);
    let entry = job
        .queue_build(&isolated_farm.farm, QueueOptions::default(), connection)
        .unwrap();
    assert_eq!(entry.lastscore, 5);
}

#[rstest]
pub fn mark_as_building_requires_a_waiting_entry(isolated_farm: IsolatedFarm) {
    let mut connection = isolated_farm.connection();
    let connection = &mut *connection;

    let builder = setup_dummy_builder(connection);
    let other = setup_builder(connection, "lcy02-amd64-002", &[DUMMY_PROCESSOR], true);

    let (_, mut suspended) = setup_queued_build(&isolated_farm, connection, 0);
    suspended.suspend(connection).unwrap();
    let err = suspended
        .mark_as_building(&isolated_farm.farm, &builder, connection)
        .unwrap_err();
    assert_illegal(&err, "start");

    let (_, mut running) = setup_running_build(&isolated_farm, connection, &builder);
    let err = running
        .mark_as_building(&isolated_farm.farm, &other, connection)
        .unwrap_err();
    assert_illegal(&err, "start");
    assert_eq!(reload_entry(&running, connection).builder_id, Some(builder.id));
}

#[rstest]
pub fn rejected_start_leaves_the_entry_waiting(isolated_farm: IsolatedFarm) {
    let mut connection = isolated_farm.connection();
    let connection = &mut *connection;

    let builder = setup_dummy_builder(connection);
    let (mut job, mut entry) = setup_queued_build(&isolated_farm, connection, 0);
    job.update_status(
        &isolated_farm.farm,
        BuildStatus::Superseded,
        StatusUpdate::default(),
        connection,
    )
    .unwrap();

    let err = entry
        .mark_as_building(&isolated_farm.farm, &builder, connection)
        .unwrap_err();
    assert_invalid_transition(&err, BuildStatus::Superseded, BuildStatus::Building);

    assert_eq!(entry.status, BuildQueueStatus::Waiting);
    assert_eq!(entry.builder_id, None);
    assert_eq!(reload_entry(&entry, connection), entry);
    assert_eq!(builder.current_job(connection).unwrap(), None);
}

#[rstest]
pub fn reset_returns_the_build_to_the_pool(isolated_farm: IsolatedFarm) {
    let mut connection = isolated_farm.connection();
    let connection = &mut *connection;

    let builder = setup_dummy_builder(connection);
    let (job, mut entry) = setup_running_build(&isolated_farm, connection, &builder);
    let started = job.date_started;
    assert!(started.is_some());
    entry.logtail = Some("compiling...".to_string());
    entry.update(connection).unwrap();

    entry.reset(&isolated_farm.farm, connection).unwrap();

    let entry = reload_entry(&entry, connection);
    assert_eq!(entry.status, BuildQueueStatus::Waiting);
    assert_eq!(entry.builder_id, None);
    assert_eq!(entry.date_started, None);
    assert_eq!(entry.logtail, None);

    let job = reload_job(&job, connection);
    assert_eq!(job.status, BuildStatus::NeedsBuild);
    assert_eq!(job.builder_id, None);
    assert_eq!(builder.current_job(connection).unwrap(), None);

    let reset = isolated_farm.metrics.named("build.reset");
    assert_eq!(reset.len(), 1);
    assert_eq!(reset[0]["builder_name"], DUMMY_BUILDER);

    // another builder can pick it up now
    let other = setup_builder(connection, "lcy02-amd64-002", &[DUMMY_PROCESSOR], true);
    let mut entry = entry;
    entry
        .mark_as_building(&isolated_farm.farm, &other, connection)
        .unwrap();
    let job = reload_job(&job, connection);
    assert_eq!(job.builder_id, Some(other.id));
    assert_eq!(job.date_started, started);
}

#[rstest]
pub fn reset_of_unassigned_entry_is_not_a_lost_build(isolated_farm: IsolatedFarm) {
    let mut connection = isolated_farm.connection();
    let connection = &mut *connection;

    let (job, mut entry) = setup_queued_build(&isolated_farm, connection, 0);
    entry.reset(&isolated_farm.farm, connection).unwrap();

    assert_eq!(reload_entry(&entry, connection).status, BuildQueueStatus::Waiting);
    assert_eq!(reload_job(&job, connection).status, BuildStatus::NeedsBuild);
    assert!(isolated_farm.metrics.named("build.reset").is_empty());
}

#[rstest]
pub fn cancel_waiting_build_finishes_immediately(isolated_farm: IsolatedFarm) {
    let mut connection = isolated_farm.connection();
    let connection = &mut *connection;

    let (job, mut entry) = setup_queued_build(&isolated_farm, connection, 0);

    let outcome = entry.cancel(&isolated_farm.farm, connection).unwrap();
    assert_eq!(outcome, CancelOutcome::Cancelled);

    assert_eq!(reload_job(&job, connection).status, BuildStatus::Cancelled);
    assert_eq!(BuildQueue::get_by_build_farm_job(job.id, connection).unwrap(), None);
}

#[rstest]
pub fn cancel_running_build_waits_for_the_builder(isolated_farm: IsolatedFarm) {
    let mut connection = isolated_farm.connection();
    let connection = &mut *connection;

    let builder = setup_dummy_builder(connection);
    let (job, mut entry) = setup_running_build(&isolated_farm, connection, &builder);

    let outcome = entry.cancel(&isolated_farm.farm, connection).unwrap();
    assert_eq!(outcome, CancelOutcome::Cancelling);

    let entry = reload_entry(&entry, connection);
    assert_eq!(entry.status, BuildQueueStatus::Cancelling);
    assert_eq!(entry.builder_id, Some(builder.id));
    assert_eq!(reload_job(&job, connection).status, BuildStatus::Cancelling);

    entry.mark_as_cancelled(&isolated_farm.farm, connection).unwrap();

    let job = reload_job(&job, connection);
    assert_eq!(job.status, BuildStatus::Cancelled);
    assert!(job.date_finished.is_some());
    assert_eq!(BuildQueue::get_by_build_farm_job(job.id, connection).unwrap(), None);

    let finished = isolated_farm.metrics.named("build.finished");
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0]["status"], "CANCELLED");
}

#[rstest]
pub fn cancel_of_gathering_build_changes_nothing(isolated_farm: IsolatedFarm) {
    let mut connection = isolated_farm.connection();
    let connection = &mut *connection;

    let builder = setup_dummy_builder(connection);
    let (mut job, mut entry) = setup_running_build(&isolated_farm, connection, &builder);
    job.update_status(
        &isolated_farm.farm,
        BuildStatus::Gathering,
        StatusUpdate::builder(&builder),
        connection,
    )
    .unwrap();

    let err = entry.cancel(&isolated_farm.farm, connection).unwrap_err();
    assert_invalid_transition(&err, BuildStatus::Gathering, BuildStatus::Cancelling);

    assert_eq!(entry.status, BuildQueueStatus::Running);
    assert_eq!(reload_entry(&entry, connection).status, BuildQueueStatus::Running);
    assert_eq!(reload_job(&job, connection).status, BuildStatus::Gathering);
}

#[rstest]
pub fn cancel_suspended_build_is_illegal(isolated_farm: IsolatedFarm) {
    let mut connection = isolated_farm.connection();
    let connection = &mut *connection;

    let (job, mut entry) = setup_queued_build(&isolated_farm, connection, 0);
    entry.suspend(connection).unwrap();

    let err = entry.cancel(&isolated_farm.farm, connection).unwrap_err();
    assert_illegal(&err, "cancel");
    assert_eq!(reload_job(&job, connection).status, BuildStatus::NeedsBuild);
}

#[rstest]
pub fn manual_score_is_never_recalculated(isolated_farm: IsolatedFarm) {
    let mut connection = isolated_farm.connection();
    let connection = &mut *connection;

    let (job, mut entry) = setup_queued_build(&isolated_farm, connection, 10);
    entry.manual_score(42, connection).unwrap();

    isolated_farm.build.score_job(job.id, 9000);
    entry.score(&isolated_farm.farm, connection).unwrap();

    let entry = reload_entry(&entry, connection);
    assert_eq!(entry.lastscore, 42);
    assert!(entry.manual);
}

#[rstest]
pub fn score_is_recalculated_from_the_specific_build(isolated_farm: IsolatedFarm) {
    let mut connection = isolated_farm.connection();
    let connection = &mut *connection;

    let (job, mut entry) = setup_queued_build(&isolated_farm, connection, 10);
    isolated_farm.build.score_job(job.id, 250);
    entry.score(&isolated_farm.farm, connection).unwrap();
    assert_eq!(reload_entry(&entry, connection).lastscore, 250);

    isolated_farm.build.state().broken_scoring = true;
    assert!(entry.score(&isolated_farm.farm, connection).is_err());
    assert_eq!(reload_entry(&entry, connection).lastscore, 250);
}

#[rstest]
pub fn finished_builder_reports_through_update_status(isolated_farm: IsolatedFarm) {
    let mut connection = isolated_farm.connection();
    let connection = &mut *connection;

    let builder = setup_dummy_builder(connection);
    let (mut job, entry) = setup_running_build(&isolated_farm, connection, &builder);
    job.update_status(
        &isolated_farm.farm,
        BuildStatus::FailedToBuild,
        StatusUpdate::builder(&builder),
        connection,
    )
    .unwrap();
    entry.destroy(connection).unwrap();

    assert_eq!(builder.current_job(connection).unwrap(), None);
    assert_eq!(reload_job(&job, connection).status, BuildStatus::FailedToBuild);
}
