use crate::errors::*;
#[cfg(feature = "diesel")]
use diesel::{sql_types::Text, AsExpression, FromSqlRow};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "diesel", derive(FromSqlRow, AsExpression))]
#[cfg_attr(feature = "diesel", diesel(sql_type = Text))]
pub enum BuildQueueStatus {
    /// Waiting for a builder to pick it up
    #[serde(rename = "WAITING")]
    Waiting,
    /// Assigned to a builder
    #[serde(rename = "RUNNING")]
    Running,
    /// Held back from dispatch until resumed
    #[serde(rename = "SUSPENDED")]
    Suspended,
    /// Cancellation requested, waiting for the builder to stop
    #[serde(rename = "CANCELLING")]
    Cancelling,
}

impl BuildQueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildQueueStatus::Waiting => "WAITING",
            BuildQueueStatus::Running => "RUNNING",
            BuildQueueStatus::Suspended => "SUSPENDED",
            BuildQueueStatus::Cancelling => "CANCELLING",
        }
    }

    /// Whether an entry in this state must have a builder assigned.
    pub fn has_builder(&self) -> bool {
        matches!(self, BuildQueueStatus::Running | BuildQueueStatus::Cancelling)
    }
}

impl TryFrom<&str> for BuildQueueStatus {
    type Error = crate::errors::Error;

    fn try_from(value: &str) -> Result<Self> {
        match value {
            "WAITING" => Ok(BuildQueueStatus::Waiting),
            "RUNNING" => Ok(BuildQueueStatus::Running),
            "SUSPENDED" => Ok(BuildQueueStatus::Suspended),
            "CANCELLING" => Ok(BuildQueueStatus::Cancelling),
            _ => bail!("Unknown build queue status: {:?}", value),
        }
    }
}

text_enum!(BuildQueueStatus);
