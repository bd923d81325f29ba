use crate::errors::*;
use colored::*;
#[cfg(feature = "diesel")]
use diesel::{sql_types::Text, AsExpression, FromSqlRow};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a build farm job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "diesel", derive(FromSqlRow, AsExpression))]
#[cfg_attr(feature = "diesel", diesel(sql_type = Text))]
pub enum BuildStatus {
    #[serde(rename = "NEEDSBUILD")]
    NeedsBuild,
    #[serde(rename = "FULLYBUILT")]
    FullyBuilt,
    #[serde(rename = "FAILEDTOBUILD")]
    FailedToBuild,
    #[serde(rename = "MANUALDEPWAIT")]
    ManualDepWait,
    #[serde(rename = "CHROOTWAIT")]
    ChrootWait,
    #[serde(rename = "SUPERSEDED")]
    Superseded,
    #[serde(rename = "BUILDING")]
    Building,
    #[serde(rename = "FAILEDTOUPLOAD")]
    FailedToUpload,
    #[serde(rename = "UPLOADING")]
    Uploading,
    #[serde(rename = "GATHERING")]
    Gathering,
    #[serde(rename = "CANCELLING")]
    Cancelling,
    #[serde(rename = "CANCELLED")]
    Cancelled,
}

impl BuildStatus {
    pub const ALL: [BuildStatus; 12] = [
        BuildStatus::NeedsBuild,
        BuildStatus::FullyBuilt,
        BuildStatus::FailedToBuild,
        BuildStatus::ManualDepWait,
        BuildStatus::ChrootWait,
        BuildStatus::Superseded,
        BuildStatus::Building,
        BuildStatus::FailedToUpload,
        BuildStatus::Uploading,
        BuildStatus::Gathering,
        BuildStatus::Cancelling,
        BuildStatus::Cancelled,
    ];

    /// Statuses that may be retried, both failures and builds that never ran to completion.
    pub const RETRYABLE: [BuildStatus; 6] = [
        BuildStatus::FailedToBuild,
        BuildStatus::ManualDepWait,
        BuildStatus::ChrootWait,
        BuildStatus::FailedToUpload,
        BuildStatus::Cancelled,
        BuildStatus::Superseded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::NeedsBuild => "NEEDSBUILD",
            BuildStatus::FullyBuilt => "FULLYBUILT",
            BuildStatus::FailedToBuild => "FAILEDTOBUILD",
            BuildStatus::ManualDepWait => "MANUALDEPWAIT",
            BuildStatus::ChrootWait => "CHROOTWAIT",
            BuildStatus::Superseded => "SUPERSEDED",
            BuildStatus::Building => "BUILDING",
            BuildStatus::FailedToUpload => "FAILEDTOUPLOAD",
            BuildStatus::Uploading => "UPLOADING",
            BuildStatus::Gathering => "GATHERING",
            BuildStatus::Cancelling => "CANCELLING",
            BuildStatus::Cancelled => "CANCELLED",
        }
    }

    /// The statuses this one may move to without forcing.
    pub fn valid_transitions(&self) -> &'static [BuildStatus] {
        match self {
            BuildStatus::NeedsBuild | BuildStatus::Building => &Self::ALL,
            BuildStatus::FullyBuilt | BuildStatus::Superseded => &[],
            BuildStatus::FailedToBuild
            | BuildStatus::ManualDepWait
            | BuildStatus::ChrootWait
            | BuildStatus::FailedToUpload
            | BuildStatus::Cancelled => &[BuildStatus::NeedsBuild],
            BuildStatus::Gathering => &[
                BuildStatus::NeedsBuild,
                BuildStatus::FailedToBuild,
                BuildStatus::Uploading,
            ],
            BuildStatus::Uploading => &[
                BuildStatus::FullyBuilt,
                BuildStatus::FailedToUpload,
                BuildStatus::Superseded,
            ],
            BuildStatus::Cancelling => &[BuildStatus::Cancelled],
        }
    }

    pub fn can_transition_to(&self, target: BuildStatus) -> bool {
        self.valid_transitions().contains(&target)
    }

    /// Check a transition, failing with `InvalidStatusTransition` if it's not in the table.
    pub fn check_transition(&self, target: BuildStatus) -> Result<()> {
        if self.can_transition_to(target) {
            Ok(())
        } else {
            Err(SchedulingError::InvalidStatusTransition {
                from: *self,
                to: target,
            }
            .into())
        }
    }

    /// Active builds have not reached an outcome yet, leaving them sets `date_finished`.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            BuildStatus::NeedsBuild
                | BuildStatus::Building
                | BuildStatus::Gathering
                | BuildStatus::Cancelling
        )
    }

    pub fn is_retryable(&self) -> bool {
        Self::RETRYABLE.contains(self)
    }

    pub fn fancy(&self) -> String {
        let name = format!("{:14}", self.as_str());
        match self {
            BuildStatus::FullyBuilt => name.green().to_string(),
            BuildStatus::NeedsBuild => name.blue().to_string(),
            BuildStatus::Building
            | BuildStatus::Gathering
            | BuildStatus::Uploading
            | BuildStatus::Cancelling => name.yellow().to_string(),
            BuildStatus::Superseded | BuildStatus::Cancelled => name.normal().to_string(),
            _ => name.red().to_string(),
        }
    }
}

impl TryFrom<&str> for BuildStatus {
    type Error = crate::errors::Error;

    fn try_from(value: &str) -> Result<Self> {
        BuildStatus::ALL
            .iter()
            .find(|s| s.as_str() == value)
            .copied()
            .ok_or_else(|| format_err!("Unknown build status: {:?}", value))
    }
}

text_enum!(BuildStatus);

/// The kind of specific build a build farm job stands in for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "diesel", derive(FromSqlRow, AsExpression))]
#[cfg_attr(feature = "diesel", diesel(sql_type = Text))]
pub enum JobType {
    #[serde(rename = "PACKAGEBUILD")]
    PackageBuild,
    #[serde(rename = "BRANCHBUILD")]
    BranchBuild,
    #[serde(rename = "RECIPEBRANCHBUILD")]
    RecipeBranchBuild,
    #[serde(rename = "TRANSLATIONTEMPLATESBUILD")]
    TranslationTemplatesBuild,
    #[serde(rename = "SOURCEPACKAGERECIPEBUILD")]
    SourcePackageRecipeBuild,
    #[serde(rename = "LIVEFSBUILD")]
    LiveFsBuild,
    #[serde(rename = "SNAPBUILD")]
    SnapBuild,
    #[serde(rename = "OCIRECIPEBUILD")]
    OciRecipeBuild,
    #[serde(rename = "CIBUILD")]
    CiBuild,
    #[serde(rename = "CHARMRECIPEBUILD")]
    CharmRecipeBuild,
    #[serde(rename = "CRAFTRECIPEBUILD")]
    CraftRecipeBuild,
    #[serde(rename = "ROCKRECIPEBUILD")]
    RockRecipeBuild,
}

impl JobType {
    pub const ALL: [JobType; 12] = [
        JobType::PackageBuild,
        JobType::BranchBuild,
        JobType::RecipeBranchBuild,
        JobType::TranslationTemplatesBuild,
        JobType::SourcePackageRecipeBuild,
        JobType::LiveFsBuild,
        JobType::SnapBuild,
        JobType::OciRecipeBuild,
        JobType::CiBuild,
        JobType::CharmRecipeBuild,
        JobType::CraftRecipeBuild,
        JobType::RockRecipeBuild,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::PackageBuild => "PACKAGEBUILD",
            JobType::BranchBuild => "BRANCHBUILD",
            JobType::RecipeBranchBuild => "RECIPEBRANCHBUILD",
            JobType::TranslationTemplatesBuild => "TRANSLATIONTEMPLATESBUILD",
            JobType::SourcePackageRecipeBuild => "SOURCEPACKAGERECIPEBUILD",
            JobType::LiveFsBuild => "LIVEFSBUILD",
            JobType::SnapBuild => "SNAPBUILD",
            JobType::OciRecipeBuild => "OCIRECIPEBUILD",
            JobType::CiBuild => "CIBUILD",
            JobType::CharmRecipeBuild => "CHARMRECIPEBUILD",
            JobType::CraftRecipeBuild => "CRAFTRECIPEBUILD",
            JobType::RockRecipeBuild => "ROCKRECIPEBUILD",
        }
    }
}

impl TryFrom<&str> for JobType {
    type Error = crate::errors::Error;

    fn try_from(value: &str) -> Result<Self> {
        JobType::ALL
            .iter()
            .find(|t| t.as_str() == value)
            .copied()
            .ok_or_else(|| format_err!("Unknown job type: {:?}", value))
    }
}

text_enum!(JobType);
