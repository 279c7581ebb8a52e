use chrono::{DateTime, Utc};

use super::account::{ChatId, UserId};

/// Row of `gifts`, written alongside the two ledger entries of a transfer
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Gift {
    pub id: i64,
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub amount: i64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewGift {
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub amount: i64,
}

/// Balances of both parties after a committed transfer
#[derive(Debug, Clone, PartialEq)]
pub struct Transfer {
    pub gift: Gift,
    pub sender: super::Account,
    pub receiver: super::Account,
}
