//! Markdown (Telegram's legacy flavour) renderings of every reply the bot sends.

use core::fmt::Write;

use chrono::{DateTime, Utc};

use crate::bot::ChatUser;
use crate::bot::commands::ParseError;
use crate::db::models::{Account, Boost, ChatId, Direction, LedgerEntry, RankingRow, ShopItem, UserId};
use crate::economy::{EconomyError, Period};

pub const NO_STATS: &str = "**No stats found for this user.**";
pub const NO_RANKINGS: &str = "**No rankings yet! Try chatting more to earn points.**";
pub const NO_HISTORY: &str = "**No history found for user!**";
pub const NO_BOOST: &str = "🚫 **No active boosts found!**";
pub const NO_ITEMS: &str = "**Looks like there is no item(s) in shop yet!**";
pub const UNKNOWN: &str = "**Something went wrong!**";
pub const NOT_ADMIN: &str = "🚫 *Permission Denied:* You must be an admin to use this command.";
pub const ADMIN_CHECK_FAILED: &str =
    "⚠️ *Error:* Unable to verify admin status. Please try again later.";

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const HELP: &str = "*Available Commands:*

*/rank [daily|weekly|monthly]* - Show ranking based on activity.
*/top* - Show the all-time points leaderboard.
*/history* - Show the last 50 activity records (admins only).
*/stats* - Display your overall stats in the chat.
*/gift [userid amount]* - Gift points to users.
*/gift [amount]* - Reply to a user's message to gift them points.
*/shop* - List the boosts you can buy.
*/buy [item_id]* - Buy a boost from the shop.
*/boost* - Show your active boosts.
*/id* - Display your user ID and the chat ID.
*/help* - Display this help message.

_Use these commands to track your activity and rankings!_";

pub fn start(bot_name: &str) -> String {
    format!(
        "Hello! I'm *{}*.\n\n\
         I help track user activity, assign points, and generate rankings based on participation \
         in this chat.\n\n\
         Use /help to see all available commands.\n\n\
         ⚠️ *To start counting messages and assigning points, make sure to promote me as an admin.*",
        escape(bot_name)
    )
}

pub fn welcome(bot_name: &str) -> String {
    format!(
        "Hello! I'm {}. Thanks for adding me to this group. Use `/help` to see what I can do!\n\n\
         To unlock my full potential, make me an admin.",
        escape(bot_name)
    )
}

pub fn ids(chat_id: ChatId, user_id: UserId) -> String {
    format!("*Chat ID:* `{chat_id}`\n*User ID:* `{user_id}`")
}

/// `First (@user)`, falling back to whichever half is present
pub fn display_name(user: &ChatUser) -> String {
    let first = escape(&user.first_name);
    match user.username.as_deref() {
        Some(username) if !first.is_empty() => format!("{first} (@{})", escape(username)),
        Some(username) => format!("@{}", escape(username)),
        None if !first.is_empty() => first,
        None => "User".to_string(),
    }
}

pub fn stats(user: &ChatUser, account: &Account) -> String {
    format!(
        "*Stats of {}*\n- *Total Points:* `{}`\n- *Last Activity:* `{}`\n",
        display_name(user),
        account.points,
        account.updated_at.format(TIME_FORMAT)
    )
}

pub fn ranking(period: Period, rows: &[RankingRow]) -> String {
    let title = match period {
        Period::Daily => "🏆 *Daily Rankings*",
        Period::Weekly => "🌟 *Weekly Rankings*",
        Period::Monthly => "🎖 *Monthly Rankings*",
    };

    let mut msg = format!("{title}\n\n");
    for (i, row) in rows.iter().enumerate() {
        _ = writeln!(
            msg,
            "{}. {} - *{} points*",
            i + 1,
            mention(row.user_id),
            row.total
        );
    }
    msg
}

pub fn leaderboard(accounts: &[Account]) -> String {
    let mut msg = String::from("👑 *All-time Leaderboard*\n\n");
    for (i, account) in accounts.iter().enumerate() {
        _ = writeln!(
            msg,
            "{}. {} - *{} points*",
            i + 1,
            mention(account.user_id),
            account.points
        );
    }
    msg
}

pub fn history(user: &ChatUser, entries: &[LedgerEntry], limit: i64) -> String {
    let mut msg = format!(
        "*Last {limit} point history for {}:*\n\n",
        display_name(user)
    );

    for entry in entries {
        let symbol = match entry.direction {
            Direction::Gain => "➕",
            Direction::Loss => "➖",
        };
        _ = writeln!(
            msg,
            "🕒 *{}* - {symbol} *{} points* ({})",
            entry.timestamp.format(TIME_FORMAT),
            entry.amount.abs(),
            entry.source
        );
    }
    msg
}

pub fn shop(items: &[ShopItem]) -> String {
    let mut msg = String::from("🛒 *Shop*\n\n");
    for item in items {
        let lasts = match item.duration {
            0 => "permanent".to_string(),
            hours => format!("{hours}h"),
        };
        _ = writeln!(
            msg,
            "`{}` *{}* - {} points ({lasts})\n_{}_\n",
            item.id,
            escape(&item.name),
            item.price,
            escape(&item.description)
        );
    }
    msg.push_str("Use `/buy item_id` to buy a boost.");
    msg
}

pub fn boosts(boosts: &[Boost]) -> String {
    let mut msg = String::from("⚡ *Active Boosts*\n\n");
    for boost in boosts {
        _ = writeln!(
            msg,
            "- *{}* {}",
            escape(boost.kind.as_str()),
            until(boost.expires_at)
        );
    }
    msg
}

pub fn gift_sent(amount: i64, receiver: UserId) -> String {
    format!("🎁 {amount} points have been gifted to user {}!", mention(receiver))
}

pub fn purchased(item: &ShopItem, boost: &Boost, balance: i64) -> String {
    format!(
        "✅ You bought *{}*, active {}.\nRemaining balance: `{balance}` points.",
        escape(&item.name),
        until(boost.expires_at)
    )
}

pub fn parse_error(err: &ParseError) -> String {
    match err {
        ParseError::RankUsage => {
            "Use `/rank daily`, `/rank weekly`, or `/rank monthly`.".to_string()
        }
        ParseError::GiftReplyUsage => "Usage: Reply to a message with `/gift amount`.".to_string(),
        ParseError::GiftUsage => "Usage: `/gift user_id amount`.".to_string(),
        ParseError::BuyUsage => "Usage: `/buy item_id`.".to_string(),
        ParseError::InvalidId(_) => "Invalid ID format.".to_string(),
    }
}

/// User-facing text for a refused or failed economy operation
pub fn economy_error(err: &EconomyError) -> String {
    match err {
        EconomyError::InvalidAmount(_) => {
            "Invalid gift amount. It must be a positive number.".to_string()
        }
        EconomyError::SelfGift => "You can't send gift to yourself!".to_string(),
        EconomyError::GiftToBot => "No need to gift to bot".to_string(),
        EconomyError::NoAccount(_) => {
            "**You don’t have any points yet! Start chatting to earn some...**".to_string()
        }
        EconomyError::InsufficientPoints { .. } => {
            "**Insufficient points! Start chatting to earn some...**".to_string()
        }
        EconomyError::UnknownReceiver(_) => "User doesn't exist!".to_string(),
        EconomyError::BoostActive(kind) => format!(
            "**You already have an active {} boost!**",
            escape(kind.as_str())
        ),
        EconomyError::UnknownItem(_) => "**No such item found with the specified id!**".to_string(),
        EconomyError::Store(_) => UNKNOWN.to_string(),
    }
}

fn until(expires_at: Option<DateTime<Utc>>) -> String {
    match expires_at {
        Some(at) => format!("until `{} UTC`", at.format(TIME_FORMAT)),
        None => "with no expiry".to_string(),
    }
}

fn mention(user_id: UserId) -> String {
    format!("[{user_id}](tg://user?id={user_id})")
}

/// Escapes the characters legacy Markdown treats as entity delimiters
fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;

    use super::*;
    use crate::db::models::{BoostKind, Source};

    fn user(first: &str, username: Option<&str>) -> ChatUser {
        ChatUser {
            id: UserId(7),
            first_name: first.into(),
            username: username.map(Into::into),
            is_bot: false,
        }
    }

    #[test]
    fn test_display_name_fallbacks() {
        assert_eq!(display_name(&user("Ada", Some("ada"))), "Ada (@ada)");
        assert_eq!(display_name(&user("", Some("ada"))), "@ada");
        assert_eq!(display_name(&user("Ada", None)), "Ada");
        assert_eq!(display_name(&user("", None)), "User");
        assert_eq!(display_name(&user("", Some("snake_case"))), "@snake\\_case");
    }

    #[test]
    fn test_ranking_lists_mentions_in_order() {
        let rows = vec![
            RankingRow {
                user_id: UserId(5),
                total: 40,
            },
            RankingRow {
                user_id: UserId(9),
                total: -3,
            },
        ];

        let msg = ranking(Period::Weekly, &rows);
        assert!(msg.starts_with("🌟 *Weekly Rankings*\n\n"));
        assert!(msg.contains("1. [5](tg://user?id=5) - *40 points*\n"));
        assert!(msg.contains("2. [9](tg://user?id=9) - *-3 points*\n"));
    }

    #[test]
    fn test_history_marks_direction() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let entries = vec![
            LedgerEntry {
                id: 2,
                chat_id: ChatId(-1),
                user_id: UserId(7),
                amount: -30,
                direction: Direction::Loss,
                source: Source::Gift,
                timestamp: at,
            },
            LedgerEntry {
                id: 1,
                chat_id: ChatId(-1),
                user_id: UserId(7),
                amount: 4,
                direction: Direction::Gain,
                source: Source::Chatting,
                timestamp: at,
            },
        ];

        let msg = history(&user("Ada", None), &entries, 50);
        assert!(msg.starts_with("*Last 50 point history for Ada:*"));
        assert!(msg.contains("🕒 *2024-05-01 08:00:00* - ➖ *30 points* (gift)"));
        assert!(msg.contains("➕ *4 points* (chatting)"));
    }

    #[test]
    fn test_boost_expiry_rendering() {
        let at = Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap();
        let boost = |kind, expires_at| Boost {
            id: 1,
            user_id: UserId(7),
            chat_id: ChatId(-1),
            item_id: 1,
            kind,
            expires_at,
            created_at: at,
        };

        let msg = boosts(&[
            boost(BoostKind::DoublePoints, Some(at)),
            boost(BoostKind::Cosmetic("halo".into()), None),
        ]);
        assert!(msg.contains("- *double\\_points* until `2024-05-02 08:00:00 UTC`"));
        assert!(msg.contains("- *halo* with no expiry"));
    }

    #[test]
    fn test_store_errors_stay_generic() {
        let err = EconomyError::Store(crate::db::DbError::Timeout(std::time::Duration::from_secs(5)));
        assert_eq!(economy_error(&err), UNKNOWN);
    }
}
