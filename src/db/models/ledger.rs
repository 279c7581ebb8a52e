use core::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UnknownTag;
use super::account::{ChatId, UserId};

/// Whether a ledger entry added or removed points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Gain,
    Loss,
}

/// What caused a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    Chatting,
    Gift,
    BoostPurchase,
    DoublePoints,
    LuckyBonus,
}

/// Immutable row of `point_history`. `amount` is signed, so summing it yields the balance.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct LedgerEntry {
    pub id: i64,
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub amount: i64,
    #[sqlx(rename = "change", try_from = "String")]
    pub direction: Direction,
    #[sqlx(try_from = "String")]
    pub source: Source,
    pub timestamp: DateTime<Utc>,
}

/// A ledger entry that has not been written yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewEntry {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub amount: i64,
    pub direction: Direction,
    pub source: Source,
}

/// Half-open `[start, end)` interval a ranking aggregates over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// One row of a period ranking: the signed sum of a user's entries inside the window
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct RankingRow {
    pub user_id: UserId,
    pub total: i64,
}

impl NewEntry {
    /// Credit of `amount` points
    pub fn gain(chat_id: ChatId, user_id: UserId, amount: i64, source: Source) -> Self {
        Self {
            chat_id,
            user_id,
            amount: amount.abs(),
            direction: Direction::Gain,
            source,
        }
    }

    /// Debit of `amount` points, stored negated
    pub fn loss(chat_id: ChatId, user_id: UserId, amount: i64, source: Source) -> Self {
        Self {
            chat_id,
            user_id,
            amount: -amount.abs(),
            direction: Direction::Loss,
            source,
        }
    }
}

impl Window {
    #[cfg(test)]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gain => "gain",
            Self::Loss => "loss",
        }
    }
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chatting => "chatting",
            Self::Gift => "gift",
            Self::BoostPurchase => "boost-purchase",
            Self::DoublePoints => "double-points",
            Self::LuckyBonus => "lucky-bonus",
        }
    }
}

impl FromStr for Direction {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gain" => Ok(Self::Gain),
            "loss" => Ok(Self::Loss),
            other => Err(UnknownTag(other.to_string())),
        }
    }
}

impl FromStr for Source {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chatting" => Ok(Self::Chatting),
            "gift" => Ok(Self::Gift),
            "boost-purchase" => Ok(Self::BoostPurchase),
            "double-points" => Ok(Self::DoublePoints),
            "lucky-bonus" => Ok(Self::LuckyBonus),
            other => Err(UnknownTag(other.to_string())),
        }
    }
}

impl TryFrom<String> for Direction {
    type Error = UnknownTag;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl TryFrom<String> for Source {
    type Error = UnknownTag;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
