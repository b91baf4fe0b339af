//! Profile domain model
//!
//! A profile is a reusable automation identity: a browser session directory,
//! the proxy it egresses through and the credit balance of the account behind
//! it. Profiles belong to exactly one machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Reusable execution identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Globally unique profile name
    pub name: String,

    /// Proxy address this profile egresses through
    pub proxy: String,

    /// Browser session directory
    pub session_dir: String,

    /// Browser fingerprint, set once after the first session negotiation
    pub fingerprint: Option<String>,

    /// Machine that owns this profile
    pub machine_id: String,

    pub status: ProfileStatus,

    /// Remaining generation credit; `None` until first measured
    pub credit_remaining: Option<i32>,

    /// Generations run today
    pub daily_run_count: i32,

    pub last_run_at: Option<DateTime<Utc>>,
    pub last_credit_check_at: Option<DateTime<Utc>>,

    /// Orchestrator instance currently holding this profile
    pub lease_holder: Option<String>,

    /// When the current lease lapses
    pub lease_expires_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    /// Returns true if the profile may be handed to a new generation.
    ///
    /// Unknown credit counts as eligible. A lease that has lapsed no longer
    /// blocks selection.
    pub fn is_eligible(&self, min_credit: i32, now: DateTime<Utc>) -> bool {
        self.status == ProfileStatus::Active
            && self.credit_remaining.is_none_or(|c| c >= min_credit)
            && !self.is_leased(now)
    }

    /// Returns true while an unexpired lease is held on the profile
    pub fn is_leased(&self, now: DateTime<Utc>) -> bool {
        self.lease_expires_at.is_some_and(|expires| expires > now)
    }
}

/// Lifecycle status of a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileStatus {
    /// Usable for generation
    Active,

    /// Rejected by the target application
    Blocked,

    /// Credit fell below the configured threshold
    LowCredit,

    /// Retired by an operator
    Disabled,
}

impl ProfileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileStatus::Active => "active",
            ProfileStatus::Blocked => "blocked",
            ProfileStatus::LowCredit => "low_credit",
            ProfileStatus::Disabled => "disabled",
        }
    }

    /// Status a credit reading moves the profile to.
    ///
    /// Only `active` and `low_credit` follow the credit balance; `blocked`
    /// and `disabled` are operator decisions and stay put.
    pub fn after_credit_check(self, remaining: i32, min_credit: i32) -> ProfileStatus {
        match self {
            ProfileStatus::Active | ProfileStatus::LowCredit => {
                if remaining >= min_credit {
                    ProfileStatus::Active
                } else {
                    ProfileStatus::LowCredit
                }
            }
            other => other,
        }
    }
}

impl std::fmt::Display for ProfileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProfileStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ProfileStatus::Active),
            "blocked" => Ok(ProfileStatus::Blocked),
            "low_credit" => Ok(ProfileStatus::LowCredit),
            "disabled" => Ok(ProfileStatus::Disabled),
            other => Err(format!("unknown profile status '{}'", other)),
        }
    }
}
