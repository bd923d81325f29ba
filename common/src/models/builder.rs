use crate::errors::*;
#[cfg(feature = "diesel")]
use diesel::{sql_types::Text, AsExpression, FromSqlRow};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static REGION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([a-z0-9][a-z0-9+.-]+)-\d+$").unwrap());

/// Whether a builder's filesystem is safe to hand a new build to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[cfg_attr(feature = "diesel", derive(FromSqlRow, AsExpression))]
#[cfg_attr(feature = "diesel", diesel(sql_type = Text))]
pub enum CleanStatus {
    #[serde(rename = "DIRTY")]
    #[clap(name = "dirty")]
    Dirty,
    #[serde(rename = "CLEANING")]
    #[clap(name = "cleaning")]
    Cleaning,
    #[serde(rename = "CLEANED")]
    #[clap(name = "cleaned")]
    Cleaned,
    #[serde(rename = "WAITING_PACKAGE_TEST")]
    #[clap(name = "waiting-package-test")]
    WaitingPackageTest,
    #[serde(rename = "REMOVED")]
    #[clap(name = "removed")]
    Removed,
}

impl CleanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CleanStatus::Dirty => "DIRTY",
            CleanStatus::Cleaning => "CLEANING",
            CleanStatus::Cleaned => "CLEANED",
            CleanStatus::WaitingPackageTest => "WAITING_PACKAGE_TEST",
            CleanStatus::Removed => "REMOVED",
        }
    }

    pub fn is_clean(&self) -> bool {
        *self == CleanStatus::Cleaned
    }
}

impl TryFrom<&str> for CleanStatus {
    type Error = crate::errors::Error;

    fn try_from(value: &str) -> Result<Self> {
        match value {
            "DIRTY" => Ok(CleanStatus::Dirty),
            "CLEANING" => Ok(CleanStatus::Cleaning),
            "CLEANED" => Ok(CleanStatus::Cleaned),
            "WAITING_PACKAGE_TEST" => Ok(CleanStatus::WaitingPackageTest),
            "REMOVED" => Ok(CleanStatus::Removed),
            _ => bail!("Unknown clean status: {:?}", value),
        }
    }
}

text_enum!(CleanStatus);

/// Derive the region of a builder from its name, `lcy02-amd64-001` is in `lcy02-amd64`.
///
/// Names without a numeric suffix have no region and yield an empty string.
pub fn region_for(name: &str) -> String {
    REGION_RE
        .captures(name)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}
