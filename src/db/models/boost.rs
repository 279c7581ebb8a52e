use core::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::account::{Account, ChatId, UserId};

/// Effect a boost has on activity accrual
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoostKind {
    /// Doubles every activity award
    DoublePoints,
    /// Adds a chance at bonus points on every activity award
    LuckyBonus,
    /// Catalog types with no accrual effect
    Cosmetic(String),
}

/// Row of `boosts`. A boost without `expires_at` never lapses.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Boost {
    pub id: i64,
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub item_id: i64,
    #[sqlx(rename = "boost_type", try_from = "String")]
    pub kind: BoostKind,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a committed shop purchase
#[derive(Debug, Clone, PartialEq)]
pub struct Purchase {
    pub boost: Boost,
    pub account: Account,
}

impl Boost {
    /// Lazy expiry: a boost is active while its expiry is strictly after `now`
    #[cfg(test)]
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|expires_at| expires_at > now)
    }
}

impl BoostKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::DoublePoints => "double_points",
            Self::LuckyBonus => "lucky_bonus",
            Self::Cosmetic(name) => name,
        }
    }
}

impl From<&str> for BoostKind {
    fn from(value: &str) -> Self {
        match value {
            "double_points" => Self::DoublePoints,
            "lucky_bonus" => Self::LuckyBonus,
            other => Self::Cosmetic(other.to_string()),
        }
    }
}

impl From<String> for BoostKind {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl fmt::Display for BoostKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
