use crate::models::BuildQueue;
use crate::schema::*;
use buildfarm_common::errors::*;
use buildfarm_common::utils;
use buildfarm_common::{region_for, CleanStatus, ResourceSet, WorkerResources};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::Serialize;

#[derive(Identifiable, Queryable, Selectable, AsChangeset, Serialize, Clone, PartialEq, Eq, Debug)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(treat_none_as_null = true)]
#[diesel(table_name = builders)]
pub struct Builder {
    pub id: i32,
    pub name: String,
    pub url: String,
    pub title: String,
    pub virtualized: bool,
    pub manual: bool,
    pub active: bool,
    pub builderok: bool,
    pub failnotes: Option<String>,
    pub failure_count: i32,
    pub clean_status: CleanStatus,
    pub date_clean_status_changed: NaiveDateTime,
    pub vm_host: Option<String>,
    pub version: Option<String>,
    pub open_resources: ResourceSet,
    pub restricted_resources: ResourceSet,
    pub date_created: NaiveDateTime,
}

impl Builder {
    pub fn get_id(my_id: i32, connection: &mut SqliteConnection) -> Result<Builder> {
        builders::table
            .filter(builders::id.eq(my_id))
            .select(Builder::as_select())
            .first::<Builder>(connection)
            .optional()?
            .ok_or_else(|| SchedulingError::not_found("Builder", my_id).into())
    }

    pub fn get_by_name(name: &str, connection: &mut SqliteConnection) -> Result<Builder> {
        builders::table
            .filter(builders::name.eq(name))
            .select(Builder::as_select())
            .first::<Builder>(connection)
            .optional()?
            .ok_or_else(|| SchedulingError::not_found("Builder", name).into())
    }

    /// List active builders.
    pub fn list(connection: &mut SqliteConnection) -> Result<Vec<Builder>> {
        let builders = builders::table
            .filter(builders::active.eq(true))
            .order_by(builders::name)
            .select(Builder::as_select())
            .load::<Builder>(connection)?;
        Ok(builders)
    }

    /// Builders that can currently take work from the given queue.
    ///
    /// These are active, healthy builders in automatic mode. Their clean state
    /// isn't considered, a dirty builder is expected to become clean again.
    pub fn for_queue(
        processor: &str,
        virtualized: bool,
        connection: &mut SqliteConnection,
    ) -> Result<Vec<Builder>> {
        let builders = builders::table
            .inner_join(builder_processors::table)
            .filter(builder_processors::processor.eq(processor))
            .filter(builders::virtualized.eq(virtualized))
            .filter(builders::active.eq(true))
            .filter(builders::builderok.eq(true))
            .filter(builders::manual.eq(false))
            .order_by(builders::name)
            .select(Builder::as_select())
            .load::<Builder>(connection)?;
        Ok(builders)
    }

    pub fn update(&self, connection: &mut SqliteConnection) -> Result<()> {
        diesel::update(builders::table.filter(builders::id.eq(self.id)))
            .set(self)
            .execute(connection)?;
        Ok(())
    }

    /// Processors this builder can build for, in order of preference.
    pub fn processors(&self, connection: &mut SqliteConnection) -> Result<Vec<String>> {
        let processors = builder_processors::table
            .filter(builder_processors::builder_id.eq(self.id))
            .order_by(builder_processors::position)
            .select(builder_processors::processor)
            .load::<String>(connection)?;
        Ok(processors)
    }

    /// The preferred processor.
    pub fn processor(&self, connection: &mut SqliteConnection) -> Result<Option<String>> {
        Ok(self.processors(connection)?.into_iter().next())
    }

    pub fn set_processors<S: AsRef<str>>(
        &self,
        processors: &[S],
        connection: &mut SqliteConnection,
    ) -> Result<()> {
        let rows = processors
            .iter()
            .enumerate()
            .map(|(position, processor)| NewBuilderProcessor {
                builder_id: self.id,
                processor: processor.as_ref().to_string(),
                position: position as i32,
            })
            .collect::<Vec<_>>();

        connection.transaction::<_, Error, _>(|connection| {
            diesel::delete(
                builder_processors::table.filter(builder_processors::builder_id.eq(self.id)),
            )
            .execute(connection)?;
            if !rows.is_empty() {
                diesel::insert_into(builder_processors::table)
                    .values(&rows)
                    .execute(connection)?;
            }
            Ok(())
        })
    }

    pub fn resources(&self) -> WorkerResources {
        WorkerResources::new(
            self.open_resources.clone(),
            self.restricted_resources.clone(),
        )
    }

    pub fn region(&self) -> String {
        region_for(&self.name)
    }

    /// The queue entry this builder is working on, read fresh from the database.
    pub fn current_job(&self, connection: &mut SqliteConnection) -> Result<Option<BuildQueue>> {
        BuildQueue::get_by_builder(self.id, connection)
    }

    /// Whether a dispatcher may hand this builder new work right now.
    pub fn is_available(&self) -> bool {
        self.active && self.builderok && !self.manual && self.clean_status.is_clean()
    }

    /// Flag the builder as healthy or broken.
    ///
    /// Marking a builder healthy forgets previous failures and requires it to be
    /// cleaned again before it gets new work.
    pub fn set_builderok(&mut self, value: bool, connection: &mut SqliteConnection) -> Result<()> {
        if !value {
            diesel::update(builders::table.filter(builders::id.eq(self.id)))
                .set(builders::builderok.eq(false))
                .execute(connection)?;
            self.builderok = false;
            return Ok(());
        }

        connection.transaction::<_, Error, _>(|connection| {
            diesel::update(builders::table.filter(builders::id.eq(self.id)))
                .set((
                    builders::builderok.eq(true),
                    builders::failnotes.eq(None::<String>),
                    builders::failure_count.eq(0),
                ))
                .execute(connection)?;
            self.builderok = true;
            self.failnotes = None;
            self.failure_count = 0;
            self.set_clean_status(CleanStatus::Dirty, connection)
        })
    }

    /// Count a failed build attempt on this builder.
    pub fn got_failure(&mut self, connection: &mut SqliteConnection) -> Result<i32> {
        let count = diesel::update(builders::table.filter(builders::id.eq(self.id)))
            .set(builders::failure_count.eq(builders::failure_count + 1))
            .returning(builders::failure_count)
            .get_result::<i32>(connection)?;
        self.failure_count = count;
        Ok(count)
    }

    pub fn reset_failure_count(&mut self, connection: &mut SqliteConnection) -> Result<()> {
        diesel::update(builders::table.filter(builders::id.eq(self.id)))
            .set(builders::failure_count.eq(0))
            .execute(connection)?;
        self.failure_count = 0;
        Ok(())
    }

    pub fn fail_builder(&mut self, reason: &str, connection: &mut SqliteConnection) -> Result<()> {
        warn!("Disabling builder {:?}: {}", self.name, reason);
        diesel::update(builders::table.filter(builders::id.eq(self.id)))
            .set((
                builders::builderok.eq(false),
                builders::failnotes.eq(Some(reason)),
            ))
            .execute(connection)?;
        self.builderok = false;
        self.failnotes = Some(reason.to_string());
        Ok(())
    }

    /// Record a new clean state, the change date is only stamped on an actual change.
    pub fn set_clean_status(
        &mut self,
        status: CleanStatus,
        connection: &mut SqliteConnection,
    ) -> Result<()> {
        let now = utils::now();
        let rows = diesel::update(
            builders::table
                .filter(builders::id.eq(self.id))
                .filter(builders::clean_status.ne(status)),
        )
        .set((
            builders::clean_status.eq(status),
            builders::date_clean_status_changed.eq(now),
        ))
        .execute(connection)?;

        if rows > 0 {
            debug!(
                "Builder {:?} clean status {} -> {}",
                self.name, self.clean_status, status
            );
            self.date_clean_status_changed = now;
        }
        self.clean_status = status;
        Ok(())
    }
}

#[derive(Insertable, PartialEq, Eq, Debug, Clone)]
#[diesel(table_name = builder_processors)]
struct NewBuilderProcessor {
    builder_id: i32,
    processor: String,
    position: i32,
}

#[derive(Insertable, PartialEq, Eq, Debug, Clone)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(table_name = builders)]
pub struct NewBuilder {
    pub name: String,
    pub url: String,
    pub title: String,
    pub virtualized: bool,
    pub manual: bool,
    pub active: bool,
    pub builderok: bool,
    pub clean_status: CleanStatus,
    pub date_clean_status_changed: NaiveDateTime,
    pub vm_host: Option<String>,
    pub open_resources: ResourceSet,
    pub restricted_resources: ResourceSet,
    pub date_created: NaiveDateTime,
}

impl NewBuilder {
    pub fn new(name: &str, url: &str, virtualized: bool) -> NewBuilder {
        let now = utils::now();
        NewBuilder {
            name: name.to_string(),
            url: url.to_string(),
            title: name.to_string(),
            virtualized,
            manual: false,
            active: true,
            builderok: true,
            clean_status: CleanStatus::Dirty,
            date_clean_status_changed: now,
            vm_host: None,
            open_resources: ResourceSet::new(),
            restricted_resources: ResourceSet::new(),
            date_created: now,
        }
    }

    pub fn insert(&self, connection: &mut SqliteConnection) -> Result<Builder> {
        let builder = diesel::insert_into(builders::table)
            .values(self)
            .returning(Builder::as_returning())
            .get_result::<Builder>(connection)
            .with_context(|| anyhow!("Failed to register builder {:?}", self.name))?;
        info!("Registered builder {:?} ({})", builder.name, builder.url);
        Ok(builder)
    }
}
