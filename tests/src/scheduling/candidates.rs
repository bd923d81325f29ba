use crate::data::*;
use crate::fixtures::*;
use crate::setup::*;
use buildfarm::models::{BuildQueue, NewBuildFarmJob, NewBuildQueue};
use buildfarm::scheduler::{self, CandidateQuery};
use buildfarm_common::{BuildQueueStatus, JobType, WorkerResources};
use diesel::SqliteConnection;
use rstest::rstest;

fn candidate_ids(
    isolated_farm: &IsolatedFarm,
    query: &CandidateQuery,
    connection: &mut SqliteConnection,
) -> Vec<i32> {
    scheduler::find_build_candidates(&isolated_farm.farm, query, connection)
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .collect()
}

fn worker(open: &[&str], restricted: &[&str]) -> CandidateQuery {
    CandidateQuery::new(DUMMY_PROCESSOR, true, 10)
        .resources(WorkerResources::new(tags(open), tags(restricted)))
}

#[rstest]
pub fn candidates_below_global_floor_are_invisible(mut isolated_farm: IsolatedFarm) {
    let mut connection = isolated_farm.connection();
    let connection = &mut *connection;

    let (_, low) = setup_queued_build(&isolated_farm, connection, 5);
    let (_, high) = setup_queued_build(&isolated_farm, connection, 10);
    isolated_farm.farm.schedule.minimum_score = Some(10);

    for limit in [1, 10, 1000] {
        let query = CandidateQuery::new(DUMMY_PROCESSOR, true, limit);
        let ids = candidate_ids(&isolated_farm, &query, connection);
        assert_eq!(ids, vec![high.id]);
        assert!(!ids.contains(&low.id));
    }
}

#[rstest]
pub fn processor_floor_and_global_floor_take_the_max(mut isolated_farm: IsolatedFarm) {
    let mut connection = isolated_farm.connection();
    let connection = &mut *connection;

    let (_, a) = setup_queued_build(&isolated_farm, connection, 50);
    let (_, b) = setup_queued_build(&isolated_farm, connection, 150);
    let (_, c) = setup_queued_build_requiring(
        &isolated_farm,
        connection,
        requirements("riscv64", true),
        150,
    );
    let (_, d) = setup_queued_build_requiring(
        &isolated_farm,
        connection,
        requirements("riscv64", true),
        2500,
    );

    let schedule = &mut isolated_farm.farm.schedule;
    schedule.minimum_score = Some(100);
    schedule.minimum_scores.insert("riscv64".to_string(), 2000);
    schedule.minimum_scores.insert(DUMMY_PROCESSOR.to_string(), 10);

    let amd64 = CandidateQuery::new(DUMMY_PROCESSOR, true, 10);
    assert_eq!(candidate_ids(&isolated_farm, &amd64, connection), vec![b.id]);
    assert!(!candidate_ids(&isolated_farm, &amd64, connection).contains(&a.id));

    let riscv64 = CandidateQuery::new("riscv64", true, 10);
    assert_eq!(candidate_ids(&isolated_farm, &riscv64, connection), vec![d.id]);
    assert!(!candidate_ids(&isolated_farm, &riscv64, connection).contains(&c.id));
}

#[rstest]
pub fn open_resources_serve_matching_and_unconstrained_builds(isolated_farm: IsolatedFarm) {
    let mut connection = isolated_farm.connection();
    let connection = &mut *connection;

    let (_, disk) = setup_queued_build_requiring(
        &isolated_farm,
        connection,
        constrained_requirements(&["large-disk"]),
        0,
    );
    let (_, empty) =
        setup_queued_build_requiring(&isolated_farm, connection, constrained_requirements(&[]), 0);
    let (_, gpu) = setup_queued_build_requiring(
        &isolated_farm,
        connection,
        constrained_requirements(&["gpu"]),
        0,
    );

    let ids = candidate_ids(&isolated_farm, &worker(&["large-disk"], &[]), connection);
    assert_eq!(ids, vec![disk.id, empty.id]);
    assert!(!ids.contains(&gpu.id));
}

#[rstest]
pub fn restricted_resources_only_serve_explicit_requests(isolated_farm: IsolatedFarm) {
    let mut connection = isolated_farm.connection();
    let connection = &mut *connection;

    let (_, empty) =
        setup_queued_build_requiring(&isolated_farm, connection, constrained_requirements(&[]), 0);
    let (_, unconstrained) = setup_queued_build_requiring(
        &isolated_farm,
        connection,
        requirements(DUMMY_PROCESSOR, true),
        0,
    );
    let (_, gpu) = setup_queued_build_requiring(
        &isolated_farm,
        connection,
        constrained_requirements(&["gpu"]),
        0,
    );

    let ids = candidate_ids(&isolated_farm, &worker(&[], &["gpu"]), connection);
    assert_eq!(ids, vec![gpu.id]);
    assert!(!ids.contains(&empty.id));
    assert!(!ids.contains(&unconstrained.id));

    // a generic worker can't take the gpu build either
    let ids = candidate_ids(&isolated_farm, &worker(&[], &[]), connection);
    assert_eq!(ids, vec![empty.id, unconstrained.id]);
}

#[rstest]
pub fn candidates_are_ordered_by_score_then_age(isolated_farm: IsolatedFarm) {
    let mut connection = isolated_farm.connection();
    let connection = &mut *connection;

    let (_, first) = setup_queued_build(&isolated_farm, connection, 10);
    let (_, second) = setup_queued_build(&isolated_farm, connection, 30);
    let (_, third) = setup_queued_build(&isolated_farm, connection, 20);
    let (_, older) = setup_queued_build(&isolated_farm, connection, 15);
    let (_, newer) = setup_queued_build(&isolated_farm, connection, 15);

    let query = CandidateQuery::new(DUMMY_PROCESSOR, true, 10);
    assert_eq!(
        candidate_ids(&isolated_farm, &query, connection),
        vec![second.id, third.id, older.id, newer.id, first.id]
    );

    let query = CandidateQuery::new(DUMMY_PROCESSOR, true, 2);
    assert_eq!(
        candidate_ids(&isolated_farm, &query, connection),
        vec![second.id, third.id]
    );
}

#[rstest]
pub fn candidates_must_match_processor_and_virtualization(isolated_farm: IsolatedFarm) {
    let mut connection = isolated_farm.connection();
    let connection = &mut *connection;

    let (_, virt) = setup_queued_build(&isolated_farm, connection, 0);
    let (_, native) = setup_queued_build_requiring(
        &isolated_farm,
        connection,
        requirements(DUMMY_PROCESSOR, false),
        0,
    );
    let (_, arm) =
        setup_queued_build_requiring(&isolated_farm, connection, requirements("arm64", true), 0);

    let query = CandidateQuery::new(DUMMY_PROCESSOR, true, 10);
    assert_eq!(candidate_ids(&isolated_farm, &query, connection), vec![virt.id]);
    let query = CandidateQuery::new(DUMMY_PROCESSOR, false, 10);
    assert_eq!(candidate_ids(&isolated_farm, &query, connection), vec![native.id]);
    let query = CandidateQuery::new("arm64", true, 10);
    assert_eq!(candidate_ids(&isolated_farm, &query, connection), vec![arm.id]);
}

#[rstest]
pub fn suspended_and_running_builds_are_not_candidates(isolated_farm: IsolatedFarm) {
    let mut connection = isolated_farm.connection();
    let connection = &mut *connection;

    let builder = setup_dummy_builder(connection);
    let (_, mut suspended) = setup_queued_build(&isolated_farm, connection, 100);
    suspended.suspend(connection).unwrap();
    let (_, _running) = setup_running_build(&isolated_farm, connection, &builder);
    let (_, waiting) = setup_queued_build(&isolated_farm, connection, 0);

    let query = CandidateQuery::new(DUMMY_PROCESSOR, true, 10);
    assert_eq!(candidate_ids(&isolated_farm, &query, connection), vec![waiting.id]);

    suspended.resume(connection).unwrap();
    assert_eq!(
        candidate_ids(&isolated_farm, &query, connection),
        vec![suspended.id, waiting.id]
    );
}

#[rstest]
pub fn selection_criteria_of_the_specific_build_apply(isolated_farm: IsolatedFarm) {
    let mut connection = isolated_farm.connection();
    let connection = &mut *connection;

    let (hidden_job, _) = setup_queued_build(&isolated_farm, connection, 30);
    let (_, a) = setup_queued_build(&isolated_farm, connection, 20);
    let (_, b) = setup_queued_build(&isolated_farm, connection, 10);
    isolated_farm.build.state().hidden.insert(hidden_job.id);

    let query = CandidateQuery::new(DUMMY_PROCESSOR, true, 2);
    assert_eq!(candidate_ids(&isolated_farm, &query, connection), vec![a.id, b.id]);
}

#[rstest]
pub fn unregistered_job_types_are_always_eligible(isolated_farm: IsolatedFarm) {
    let mut connection = isolated_farm.connection();
    let connection = &mut *connection;

    let job = NewBuildFarmJob::new(JobType::SnapBuild, None)
        .insert(connection)
        .unwrap();
    let entry = NewBuildQueue {
        build_farm_job_id: job.id,
        status: BuildQueueStatus::Waiting,
        processor: DUMMY_PROCESSOR.to_string(),
        virtualized: true,
        builder_constraints: None,
        lastscore: 5,
        manual: false,
        estimated_duration: 60,
    }
    .insert(connection)
    .unwrap();

    let query = CandidateQuery::new(DUMMY_PROCESSOR, true, 10);
    assert_eq!(candidate_ids(&isolated_farm, &query, connection), vec![entry.id]);
}

#[rstest]
pub fn builder_candidates_merge_all_processors(isolated_farm: IsolatedFarm) {
    let mut connection = isolated_farm.connection();
    let connection = &mut *connection;

    let builder = setup_builder(connection, "bos03-amd64-002", &["amd64", "i386"], true);
    let (_, amd64) = setup_queued_build(&isolated_farm, connection, 10);
    let (_, i386) =
        setup_queued_build_requiring(&isolated_farm, connection, requirements("i386", true), 20);
    let (_, arm) =
        setup_queued_build_requiring(&isolated_farm, connection, requirements("arm64", true), 30);

    let candidates =
        scheduler::find_candidates_for_builder(&isolated_farm.farm, &builder, 10, connection)
            .unwrap();
    let ids = candidates.iter().map(|c| c.id).collect::<Vec<_>>();
    assert_eq!(ids, vec![i386.id, amd64.id]);
    assert!(!ids.contains(&arm.id));

    let candidates =
        scheduler::find_candidates_for_builder(&isolated_farm.farm, &builder, 1, connection)
            .unwrap();
    assert_eq!(candidates, vec![BuildQueue::get_id(i386.id, connection).unwrap()]);
}
