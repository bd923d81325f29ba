mod args;

use crate::args::*;
use buildfarm::config;
use buildfarm::db;
use buildfarm::estimate;
use buildfarm::models::{BuildFarmJob, BuildQueue, Builder, CancelOutcome, NewBuilder};
use buildfarm::registry::Registry;
use buildfarm::scheduler::{self, CandidateQuery};
use buildfarm::BuildFarm;
use buildfarm_common::errors::*;
use buildfarm_common::utils;
use buildfarm_common::{BuildQueueStatus, WorkerResources};
use clap::Parser;
use colored::*;
use diesel::SqliteConnection;
use env_logger::Env;
use serde::Serialize;
use std::io::{self, Write};

fn print_json<S: Serialize>(x: &S) -> Result<()> {
    let mut stdout = io::stdout();
    serde_json::to_writer_pretty(&mut stdout, &x)?;
    stdout.write_all(b"\n")?;
    Ok(())
}

fn queued_entry(job: &BuildFarmJob, connection: &mut SqliteConnection) -> Result<BuildQueue> {
    job.build_queue(connection)?
        .ok_or_else(|| format_err!("Build farm job {} is not queued", job.id))
}

fn print_queue(
    entries: &[BuildQueue],
    estimate: bool,
    connection: &mut SqliteConnection,
) -> Result<()> {
    let mut stdout = io::stdout();
    for entry in entries {
        let job = entry.build_farm_job(connection)?;
        let status = match entry.status {
            BuildQueueStatus::Waiting => entry.status.as_str().normal(),
            BuildQueueStatus::Running => entry.status.as_str().green(),
            BuildQueueStatus::Suspended => entry.status.as_str().yellow(),
            BuildQueueStatus::Cancelling => entry.status.as_str().red(),
        };
        let pinned = if entry.manual { "*" } else { " " };
        let mut line = format!(
            "{:>6} {:>8}{} {:10} {:<8} {:24} {}",
            job.id,
            entry.lastscore,
            pinned,
            status,
            entry.processor.bold(),
            job.job_type.as_str(),
            utils::duration_to_human(entry.estimated_duration()),
        );
        if estimate {
            if let Some(delay) = estimate::estimated_start_delay(entry, connection)? {
                line.push_str(&format!(" (starts in {})", utils::duration_to_human(delay)));
            }
        }
        if writeln!(stdout, "{}", line).is_err() {
            break;
        }
    }
    Ok(())
}

fn run(args: Args) -> Result<()> {
    let config = config::load(args.config.as_deref()).context("Failed to load config file")?;
    if args.check_config {
        println!("{:#?}", config);
        return Ok(());
    }
    let subcommand = args
        .subcommand
        .ok_or_else(|| format_err!("No subcommand given, see --help"))?;

    let mut connection = db::setup(&config.database_url)?;
    let connection = &mut connection;
    let farm = BuildFarm::new(Registry::new(), config.schedule.clone());

    match subcommand {
        SubCommand::Builders(args) => {
            let builders = Builder::list(connection)?;
            if args.json {
                print_json(&builders)?;
            } else {
                let mut stdout = io::stdout();
                for builder in builders {
                    let health = if !builder.builderok {
                        "failed".red()
                    } else if builder.manual {
                        "manual".yellow()
                    } else {
                        "ok".green()
                    };
                    let job = match builder.current_job(connection)? {
                        Some(entry) => format!("job {}", entry.build_farm_job_id).bold(),
                        None => "idle".blue(),
                    };
                    let processors = builder.processors(connection)?.join(",");
                    if writeln!(
                        stdout,
                        "{:-30} {:6} {:20} {:8} {}",
                        builder.name.green(),
                        health,
                        processors,
                        builder.clean_status.as_str(),
                        job
                    )
                    .is_err()
                    {
                        break;
                    }
                }
            }
        }
        SubCommand::AddBuilder(args) => {
            let mut new = NewBuilder::new(&args.name, &args.url, !args.native);
            new.open_resources = args.open;
            new.restricted_resources = args.restricted;
            let builder = new.insert(connection)?;
            builder.set_processors(&args.processors, connection)?;
        }
        SubCommand::Queue(args) => {
            let entries = BuildQueue::list(
                args.status,
                args.processor.as_deref(),
                args.limit,
                connection,
            )?;
            if args.json {
                print_json(&entries)?;
            } else {
                print_queue(&entries, args.estimate, connection)?;
            }
        }
        SubCommand::Status(args) => {
            let sizes = estimate::queue_sizes(connection)?;
            if args.json {
                print_json(&sizes)?;
            } else {
                for size in sizes {
                    let kind = if size.virtualized { "virtual" } else { "native" };
                    println!(
                        "{:10} {:8} {:>6} waiting, {}",
                        size.processor.bold(),
                        kind,
                        size.count,
                        utils::duration_to_human(size.duration())
                    );
                }
            }
        }
        SubCommand::Candidates(args) => {
            let limit = args.limit.unwrap_or_else(|| farm.schedule.candidate_limit());
            let candidates = if let Some(name) = args.builder {
                let builder = Builder::get_by_name(&name, connection)?;
                scheduler::find_candidates_for_builder(&farm, &builder, limit, connection)?
            } else {
                let processor = args
                    .processor
                    .ok_or_else(|| format_err!("Either --builder or --processor is required"))?;
                let query = CandidateQuery::new(&processor, !args.native, limit)
                    .resources(WorkerResources::new(args.open, args.restricted));
                scheduler::find_build_candidates(&farm, &query, connection)?
            };
            print_queue(&candidates, false, connection)?;
        }
        SubCommand::Suspend(args) => {
            let job = BuildFarmJob::get_id(args.job, connection)?;
            queued_entry(&job, connection)?.suspend(connection)?;
        }
        SubCommand::Resume(args) => {
            let job = BuildFarmJob::get_id(args.job, connection)?;
            queued_entry(&job, connection)?.resume(connection)?;
        }
        SubCommand::Reset(args) => {
            let job = BuildFarmJob::get_id(args.job, connection)?;
            queued_entry(&job, connection)?.reset(&farm, connection)?;
        }
        SubCommand::Rescore(args) => {
            let job = BuildFarmJob::get_id(args.job, connection)?;
            job.rescore(args.score, connection)?;
        }
        SubCommand::Cancel(args) => {
            let job = BuildFarmJob::get_id(args.job, connection)?;
            if !job.can_be_cancelled(connection)? {
                warn!("Build farm job {} in state {} can't be cancelled", job.id, job.status);
            } else {
                match queued_entry(&job, connection)?.cancel(&farm, connection)? {
                    CancelOutcome::Cancelled => info!("Cancelled build farm job {}", job.id),
                    CancelOutcome::Cancelling => {
                        info!("Build farm job {} is being cancelled", job.id)
                    }
                }
            }
        }
        SubCommand::FailBuilder(args) => {
            let mut builder = Builder::get_by_name(&args.name, connection)?;
            builder.fail_builder(&args.reason, connection)?;
        }
        SubCommand::EnableBuilder(args) => {
            let mut builder = Builder::get_by_name(&args.name, connection)?;
            builder.set_builderok(true, connection)?;
        }
        SubCommand::CleanStatus(args) => {
            let mut builder = Builder::get_by_name(&args.name, connection)?;
            builder.set_clean_status(args.status, connection)?;
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let logging = match args.verbose {
        0 => "info",
        1 => "buildfarm=debug,buildfarm_common=debug,info",
        2 => "debug",
        3 => "buildfarm=trace,buildfarm_common=trace,debug",
        _ => "trace",
    };

    env_logger::init_from_env(Env::default().default_filter_or(logging));

    if args.color {
        debug!("Bypass tty detection and always use colors");
        colored::control::set_override(true);
    }

    dotenvy::dotenv().ok();
    run(args)
}
