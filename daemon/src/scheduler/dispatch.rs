use crate::farm::BuildFarm;
use crate::models::{BuildQueue, Builder, ClaimOutcome};
use crate::scheduler::find_candidates_for_builder;
use buildfarm_common::errors::*;
use diesel::prelude::*;

/// Give up after this many rounds in which every candidate went to somebody else.
pub const MAX_CLAIM_ROUNDS: usize = 5;

enum Attempt {
    Started(BuildQueue),
    Lost,
    Rejected,
}

/// Claim the best candidate for `builder` and start building it.
///
/// Builders that already have a job get nothing. Whether the builder is
/// healthy, clean and in automatic mode is for the caller to decide, see
/// [`Builder::is_available`].
///
/// Each attempt runs in its own `BEGIN IMMEDIATE` transaction: the conditional
/// claim, the specific build's final say and `mark_as_building` either all
/// happen or none of them. A lost race moves on to the next candidate, and the
/// candidates are queried again if the whole list was taken by others.
pub fn acquire_build_candidate(
    farm: &BuildFarm,
    builder: &Builder,
    connection: &mut SqliteConnection,
) -> Result<Option<BuildQueue>> {
    if let Some(current) = builder.current_job(connection)? {
        debug!(
            "Builder {:?} is still busy with queue entry {}",
            builder.name, current.id
        );
        return Ok(None);
    }

    for round in 0..MAX_CLAIM_ROUNDS {
        let candidates =
            find_candidates_for_builder(farm, builder, farm.schedule.candidate_limit(), connection)?;
        if candidates.is_empty() {
            debug!("No candidates for builder {:?}", builder.name);
            return Ok(None);
        }

        let mut lost_any = false;
        for candidate in candidates {
            match try_start(farm, builder, candidate.id, connection)? {
                Attempt::Started(entry) => {
                    let job = entry.build_farm_job(connection)?;
                    job.emit_metric(farm, "build.claimed", &[], connection)?;
                    return Ok(Some(entry));
                }
                Attempt::Lost => lost_any = true,
                Attempt::Rejected => (),
            }
        }

        if !lost_any {
            return Ok(None);
        }
        debug!(
            "Builder {:?} lost every race in round {}, looking again",
            builder.name, round
        );
    }

    warn!(
        "Builder {:?} gave up after {} rounds of lost races",
        builder.name, MAX_CLAIM_ROUNDS
    );
    Ok(None)
}

fn try_start(
    farm: &BuildFarm,
    builder: &Builder,
    candidate_id: i32,
    connection: &mut SqliteConnection,
) -> Result<Attempt> {
    connection.immediate_transaction::<_, Error, _>(|connection| {
        if BuildQueue::claim(candidate_id, builder.id, connection)? == ClaimOutcome::Lost {
            return Ok(Attempt::Lost);
        }

        let mut entry = BuildQueue::get_id(candidate_id, connection)?;
        let job = entry.build_farm_job(connection)?;
        if let Some(specific) = farm.registry.find(job.job_type) {
            if !specific.postprocess_candidate(connection, &job, &entry)? {
                info!(
                    "Queue entry {} turned down by its specific build, releasing",
                    entry.id
                );
                entry.release(connection)?;
                return Ok(Attempt::Rejected);
            }
        }

        entry.mark_as_building(farm, builder, connection)?;
        Ok(Attempt::Started(entry))
    })
}
