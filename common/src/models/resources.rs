use crate::errors::*;
#[cfg(feature = "diesel")]
use diesel::{sql_types::Text, AsExpression, FromSqlRow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// A set of free-form resource tags like `gpu` or `large-disk`.
///
/// Stored as a JSON array of strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
#[cfg_attr(feature = "diesel", derive(FromSqlRow, AsExpression))]
#[cfg_attr(feature = "diesel", diesel(sql_type = Text))]
pub struct ResourceSet(BTreeSet<String>);

impl ResourceSet {
    pub fn new() -> ResourceSet {
        ResourceSet::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.contains(tag)
    }

    pub fn insert<S: Into<String>>(&mut self, tag: S) -> bool {
        self.0.insert(tag.into())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_subset(&self, other: &ResourceSet) -> bool {
        self.0.is_subset(&other.0)
    }

    pub fn is_superset(&self, other: &ResourceSet) -> bool {
        self.0.is_superset(&other.0)
    }

    pub fn union(&self, other: &ResourceSet) -> ResourceSet {
        ResourceSet(self.0.union(&other.0).cloned().collect())
    }
}

impl<S: Into<String>> FromIterator<S> for ResourceSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        ResourceSet(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for ResourceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tags = self.iter().collect::<Vec<_>>();
        f.write_str(&tags.join(","))
    }
}

/// Parse a comma separated list of tags, blank entries are ignored.
impl FromStr for ResourceSet {
    type Err = Error;

    fn from_str(s: &str) -> Result<ResourceSet> {
        let mut set = ResourceSet::new();
        for tag in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            if tag.chars().any(char::is_whitespace) {
                bail!("Resource tag must not contain whitespace: {:?}", tag);
            }
            set.insert(tag);
        }
        Ok(set)
    }
}

#[cfg(feature = "diesel")]
impl diesel::deserialize::FromSql<Text, diesel::sqlite::Sqlite> for ResourceSet {
    fn from_sql(bytes: diesel::sqlite::SqliteValue) -> diesel::deserialize::Result<Self> {
        let t = <String as diesel::deserialize::FromSql<Text, diesel::sqlite::Sqlite>>::from_sql(
            bytes,
        )?;
        Ok(serde_json::from_str(&t)?)
    }
}

#[cfg(feature = "diesel")]
impl diesel::serialize::ToSql<Text, diesel::sqlite::Sqlite> for ResourceSet {
    fn to_sql<'b>(
        &'b self,
        out: &mut diesel::serialize::Output<'b, '_, diesel::sqlite::Sqlite>,
    ) -> diesel::serialize::Result {
        out.set_value(serde_json::to_string(self)?);
        Ok(diesel::serialize::IsNull::No)
    }
}

/// The resource tags a worker offers.
///
/// Open tags are available to any build asking for them. Restricted tags turn the
/// worker into dedicated capacity: it only accepts builds that ask for every one
/// of its restricted tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerResources {
    #[serde(default)]
    pub open: ResourceSet,
    #[serde(default)]
    pub restricted: ResourceSet,
}

impl WorkerResources {
    pub fn new(open: ResourceSet, restricted: ResourceSet) -> WorkerResources {
        WorkerResources { open, restricted }
    }

    pub fn offered(&self) -> ResourceSet {
        self.open.union(&self.restricted)
    }

    /// Check if a build with the given constraints may run on this worker.
    pub fn can_serve(&self, required: Option<&ResourceSet>) -> bool {
        let empty = ResourceSet::new();
        let required = required.unwrap_or(&empty);

        if !required.is_subset(&self.offered()) {
            return false;
        }

        self.restricted.is_empty() || required.is_superset(&self.restricted)
    }
}
