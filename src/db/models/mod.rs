use thiserror::Error;

pub mod account;
pub mod boost;
pub mod gift;
pub mod ledger;
pub mod shop;

pub use account::{Account, ChatId, UserId};
pub use boost::{Boost, BoostKind, Purchase};
pub use gift::{Gift, NewGift, Transfer};
pub use ledger::{Direction, LedgerEntry, NewEntry, RankingRow, Source, Window};
pub use shop::ShopItem;

/// A stored tag column held a value this build does not know
#[derive(Debug, Error)]
#[error("unknown tag '{0}'")]
pub struct UnknownTag(pub String);
