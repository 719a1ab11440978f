use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "finalexamstatus", rename_all = "snake_case")]
pub(crate) enum FinalExamStatus {
    NotYet,
    Open,
    Submitted,
    Completed,
    Cancelled,
}

impl FinalExamStatus {
    /// Statuses under which a trainee may submit (or resubmit) a partial.
    pub(crate) fn accepts_submissions(self) -> bool {
        matches!(self, FinalExamStatus::NotYet | FinalExamStatus::Open | FinalExamStatus::Submitted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "partialtype", rename_all = "snake_case")]
pub(crate) enum PartialType {
    Theory,
    Simulation,
    Practical,
}

impl PartialType {
    pub(crate) const ALL: [PartialType; 3] =
        [PartialType::Theory, PartialType::Simulation, PartialType::Practical];

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            PartialType::Theory => "theory",
            PartialType::Simulation => "simulation",
            PartialType::Practical => "practical",
        }
    }

    /// Numeric code used by the training center's reporting (Theory=1, Simulation=2, Practical=3).
    pub(crate) fn code(self) -> i32 {
        match self {
            PartialType::Theory => 1,
            PartialType::Simulation => 2,
            PartialType::Practical => 3,
        }
    }

    /// Theory and simulation partials are entered with an access code.
    pub(crate) fn uses_access_code(self) -> bool {
        matches!(self, PartialType::Theory | PartialType::Simulation)
    }
}

impl fmt::Display for PartialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UnknownPartialType(pub(crate) String);

impl fmt::Display for UnknownPartialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown exam type '{}'", self.0)
    }
}

impl FromStr for PartialType {
    type Err = UnknownPartialType;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "theory" | "te" | "1" => Ok(PartialType::Theory),
            "simulation" | "se" | "2" => Ok(PartialType::Simulation),
            "practical" | "pe" | "3" => Ok(PartialType::Practical),
            _ => Err(UnknownPartialType(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "partialstatus", rename_all = "snake_case")]
pub(crate) enum PartialStatus {
    NotYet,
    Submitted,
    Approved,
}

impl PartialStatus {
    pub(crate) fn is_finished(self) -> bool {
        matches!(self, PartialStatus::Submitted | PartialStatus::Approved)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "setaskstatus", rename_all = "snake_case")]
pub(crate) enum SeTaskStatus {
    Pending,
    Attempted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "learningprogressstatus", rename_all = "snake_case")]
pub(crate) enum LearningProgressStatus {
    NotStarted,
    InProgress,
    Completed,
}
