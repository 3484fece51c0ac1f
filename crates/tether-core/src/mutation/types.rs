use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// What a mutation does to its resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MutationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(format!("unknown mutation kind: {other}")),
        }
    }
}

/// Lifecycle status of a queued mutation.
///
/// `pending → syncing → {synced | conflict | failed}`. A transient failure
/// below the attempt ceiling goes back to `pending` with a retry time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum MutationStatus {
    Pending,
    Syncing,
    Synced,
    Conflict,
    Failed,
}

impl MutationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Conflict => "conflict",
            Self::Failed => "failed",
        }
    }

    /// Ordering used to pick a single badge for an entity with several
    /// queued mutations. Higher wins.
    pub fn severity(&self) -> u8 {
        match self {
            Self::Synced => 0,
            Self::Pending => 1,
            Self::Syncing => 2,
            Self::Failed => 3,
            Self::Conflict => 4,
        }
    }

    /// Statuses that wait for a human decision.
    pub fn needs_attention(&self) -> bool {
        matches!(self, Self::Conflict | Self::Failed)
    }
}

impl fmt::Display for MutationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MutationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "syncing" => Ok(Self::Syncing),
            "synced" => Ok(Self::Synced),
            "conflict" => Ok(Self::Conflict),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown mutation status: {other}")),
        }
    }
}

/// Entity kinds the queue can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ResourceType {
    Document,
    Issue,
    Sprint,
    Plan,
    Program,
    Project,
}

impl ResourceType {
    pub const ALL: [ResourceType; 6] = [
        Self::Document,
        Self::Issue,
        Self::Sprint,
        Self::Plan,
        Self::Program,
        Self::Project,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Issue => "issue",
            Self::Sprint => "sprint",
            Self::Plan => "plan",
            Self::Program => "program",
            Self::Project => "project",
        }
    }

    /// REST collection segment: `/documents`, `/issues`, ...
    pub fn collection(&self) -> &'static str {
        match self {
            Self::Document => "documents",
            Self::Issue => "issues",
            Self::Sprint => "sprints",
            Self::Plan => "plans",
            Self::Program => "programs",
            Self::Project => "projects",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|t| t.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown resource type: {s}"))
    }
}
