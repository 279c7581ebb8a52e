use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::db::models::{
    Account, Boost, BoostKind, ChatId, Gift, LedgerEntry, NewEntry, NewGift, Purchase,
    RankingRow, ShopItem, Source, Transfer, UserId, Window,
};
use crate::db::repositories::LedgerStore;
use crate::db::{Conflict, DbError, DbResult};

/// In-process stand-in for [`crate::db::PgLedger`]. Each call holds the state lock for its whole
/// duration, which gives the same all-or-nothing behaviour as a transaction.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<State>,
    offline: AtomicBool,
}

#[derive(Debug, Default)]
pub struct State {
    pub accounts: BTreeMap<(ChatId, UserId), Account>,
    pub entries: Vec<LedgerEntry>,
    pub gifts: Vec<Gift>,
    pub boosts: Vec<Boost>,
    pub shop: Vec<ShopItem>,
}

impl MemoryLedger {
    /// Empty ledger with the default catalog
    pub fn new() -> Self {
        let ledger = Self::default();
        ledger.state.try_lock().expect("fresh lock").shop = default_shop();
        ledger
    }

    /// Makes every following call fail as if the database were unreachable
    pub fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    pub async fn state(&self) -> tokio::sync::MutexGuard<'_, State> {
        self.state.lock().await
    }

    /// Opens (or tops up) an account through a regular chatting entry
    pub async fn seed(&self, chat_id: ChatId, user_id: UserId, points: i64) {
        self.accrue(NewEntry::gain(chat_id, user_id, points, Source::Chatting))
            .await
            .expect("seed accrual");
    }

    /// Appends an entry with an explicit timestamp
    pub async fn seed_at(&self, entry: NewEntry, at: DateTime<Utc>) {
        let mut state = self.state.lock().await;
        state.apply(&entry, at);
    }

    pub async fn sum_of_entries(&self, chat_id: ChatId, user_id: UserId) -> i64 {
        self.state
            .lock()
            .await
            .entries
            .iter()
            .filter(|e| e.chat_id == chat_id && e.user_id == user_id)
            .map(|e| e.amount)
            .sum()
    }

    fn check_online(&self) -> DbResult<()> {
        match self.offline.load(Ordering::SeqCst) {
            true => Err(DbError::Timeout(Duration::ZERO)),
            false => Ok(()),
        }
    }
}

impl State {
    fn apply(&mut self, entry: &NewEntry, at: DateTime<Utc>) -> Account {
        let account = self
            .accounts
            .entry((entry.chat_id, entry.user_id))
            .or_insert_with(|| Account {
                chat_id: entry.chat_id,
                user_id: entry.user_id,
                points: 0,
                created_at: at,
                updated_at: at,
            });

        account.points += entry.amount;
        account.updated_at = at;
        let account = account.clone();

        let id = self.entries.len() as i64 + 1;
        self.entries.push(LedgerEntry {
            id,
            chat_id: entry.chat_id,
            user_id: entry.user_id,
            amount: entry.amount,
            direction: entry.direction,
            source: entry.source,
            timestamp: at,
        });

        account
    }

    fn active_of_kind(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        kind: &BoostKind,
        now: DateTime<Utc>,
    ) -> bool {
        self.boosts.iter().any(|b| {
            b.chat_id == chat_id && b.user_id == user_id && &b.kind == kind && b.is_active_at(now)
        })
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn account(&self, chat_id: ChatId, user_id: UserId) -> DbResult<Option<Account>> {
        self.check_online()?;
        Ok(self
            .state
            .lock()
            .await
            .accounts
            .get(&(chat_id, user_id))
            .cloned())
    }

    async fn accrue(&self, entry: NewEntry) -> DbResult<Account> {
        self.check_online()?;
        Ok(self.state.lock().await.apply(&entry, Utc::now()))
    }

    async fn transfer(&self, gift: NewGift) -> DbResult<Transfer> {
        self.check_online()?;
        let mut state = self.state.lock().await;
        let now = Utc::now();

        let sender = state
            .accounts
            .get(&(gift.chat_id, gift.sender_id))
            .ok_or(Conflict::MissingAccount {
                chat_id: gift.chat_id,
                user_id: gift.sender_id,
            })?;
        if !state.accounts.contains_key(&(gift.chat_id, gift.receiver_id)) {
            return Err(Conflict::MissingAccount {
                chat_id: gift.chat_id,
                user_id: gift.receiver_id,
            }
            .into());
        }
        if sender.points < gift.amount {
            return Err(Conflict::InsufficientPoints {
                balance: sender.points,
                required: gift.amount,
            }
            .into());
        }

        let sender = state.apply(
            &NewEntry::loss(gift.chat_id, gift.sender_id, gift.amount, Source::Gift),
            now,
        );
        let receiver = state.apply(
            &NewEntry::gain(gift.chat_id, gift.receiver_id, gift.amount, Source::Gift),
            now,
        );

        let record = Gift {
            id: state.gifts.len() as i64 + 1,
            chat_id: gift.chat_id,
            sender_id: gift.sender_id,
            receiver_id: gift.receiver_id,
            amount: gift.amount,
            timestamp: now,
        };
        state.gifts.push(record.clone());

        Ok(Transfer {
            gift: record,
            sender,
            receiver,
        })
    }

    async fn purchase(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        item: &ShopItem,
        now: DateTime<Utc>,
    ) -> DbResult<Purchase> {
        self.check_online()?;
        let mut state = self.state.lock().await;

        let balance = state
            .accounts
            .get(&(chat_id, user_id))
            .map(|a| a.points)
            .ok_or(Conflict::MissingAccount { chat_id, user_id })?;
        if state.active_of_kind(chat_id, user_id, &item.kind, now) {
            return Err(Conflict::BoostActive(item.kind.clone()).into());
        }
        if balance < item.price {
            return Err(Conflict::InsufficientPoints {
                balance,
                required: item.price,
            }
            .into());
        }

        let account = state.apply(
            &NewEntry::loss(chat_id, user_id, item.price, Source::BoostPurchase),
            now,
        );
        let boost = Boost {
            id: state.boosts.len() as i64 + 1,
            user_id,
            chat_id,
            item_id: item.id,
            kind: item.kind.clone(),
            expires_at: item.expiry_from(now),
            created_at: now,
        };
        state.boosts.push(boost.clone());

        Ok(Purchase { boost, account })
    }

    async fn active_boost(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> DbResult<Option<Boost>> {
        self.check_online()?;
        Ok(self
            .state
            .lock()
            .await
            .boosts
            .iter()
            .rev()
            .find(|b| b.chat_id == chat_id && b.user_id == user_id && b.is_active_at(now))
            .cloned())
    }

    async fn active_boosts(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> DbResult<Vec<Boost>> {
        self.check_online()?;
        let state = self.state.lock().await;

        let mut newest: BTreeMap<String, Boost> = BTreeMap::new();
        for boost in state
            .boosts
            .iter()
            .filter(|b| b.chat_id == chat_id && b.user_id == user_id && b.is_active_at(now))
        {
            newest.insert(boost.kind.as_str().to_string(), boost.clone());
        }

        Ok(newest.into_values().collect())
    }

    async fn shop_item(&self, item_id: i64) -> DbResult<Option<ShopItem>> {
        self.check_online()?;
        Ok(self
            .state
            .lock()
            .await
            .shop
            .iter()
            .find(|i| i.id == item_id)
            .cloned())
    }

    async fn shop_items(&self) -> DbResult<Vec<ShopItem>> {
        self.check_online()?;
        let mut items = self.state.lock().await.shop.clone();
        items.sort_by_key(|i| (i.price, i.id));
        Ok(items)
    }

    async fn ranking(
        &self,
        chat_id: ChatId,
        window: Window,
        limit: i64,
    ) -> DbResult<Vec<RankingRow>> {
        self.check_online()?;
        let state = self.state.lock().await;

        let mut totals: BTreeMap<UserId, i64> = BTreeMap::new();
        for entry in state
            .entries
            .iter()
            .filter(|e| e.chat_id == chat_id && window.contains(e.timestamp))
        {
            *totals.entry(entry.user_id).or_default() += entry.amount;
        }

        let mut rows: Vec<RankingRow> = totals
            .into_iter()
            .map(|(user_id, total)| RankingRow { user_id, total })
            .collect();
        rows.sort_by(|a, b| b.total.cmp(&a.total).then(a.user_id.cmp(&b.user_id)));
        rows.truncate(limit.max(0) as usize);

        Ok(rows)
    }

    async fn history(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        limit: i64,
    ) -> DbResult<Vec<LedgerEntry>> {
        self.check_online()?;
        let state = self.state.lock().await;

        let mut entries: Vec<LedgerEntry> = state
            .entries
            .iter()
            .filter(|e| e.chat_id == chat_id && e.user_id == user_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        entries.truncate(limit.max(0) as usize);

        Ok(entries)
    }

    async fn leaderboard(&self, chat_id: ChatId, limit: i64) -> DbResult<Vec<Account>> {
        self.check_online()?;
        let state = self.state.lock().await;

        let mut accounts: Vec<Account> = state
            .accounts
            .values()
            .filter(|a| a.chat_id == chat_id)
            .cloned()
            .collect();
        accounts.sort_by(|a, b| b.points.cmp(&a.points).then(a.user_id.cmp(&b.user_id)));
        accounts.truncate(limit.max(0) as usize);

        Ok(accounts)
    }
}

fn default_shop() -> Vec<ShopItem> {
    let now = Utc::now();
    vec![
        ShopItem {
            id: 1,
            name: "Double Points".into(),
            kind: BoostKind::DoublePoints,
            description: "Doubles every point you earn while chatting".into(),
            price: 500,
            duration: 24,
            created_at: now,
        },
        ShopItem {
            id: 2,
            name: "Lucky Charm".into(),
            kind: BoostKind::LuckyBonus,
            description: "A chance at bonus points on every message".into(),
            price: 300,
            duration: 12,
            created_at: now,
        },
    ]
}
