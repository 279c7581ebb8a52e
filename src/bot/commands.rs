use thiserror::Error;

use crate::db::models::UserId;
use crate::economy::Period;

pub type ParseResult<T> = core::result::Result<T, ParseError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Id,
    Stats,
    Rank(Period),
    History,
    Gift { to: GiftTarget, amount: String },
    Shop,
    Buy(i64),
    Boost,
    Top,
}

/// Who receives a gift
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GiftTarget {
    /// Author of the replied-to message
    Reply,
    User(UserId),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("rank needs one of daily, weekly or monthly")]
    RankUsage,

    #[error("gift by reply takes exactly one amount")]
    GiftReplyUsage,

    #[error("gift takes a user id and an amount")]
    GiftUsage,

    #[error("buy takes exactly one item id")]
    BuyUsage,

    #[error("'{0}' is not a valid id")]
    InvalidId(String),
}

/// Parses `/name[@bot] args...`.
///
/// Returns `None` when the text is not a command this bot knows, including commands addressed to
/// another bot. `replying` tells whether the message replies to another one, which selects the
/// form of `/gift`.
pub fn parse(text: &str, bot_username: &str, replying: bool) -> Option<ParseResult<Command>> {
    let rest = text.trim().strip_prefix('/')?;
    let mut parts = rest.split_whitespace();
    let head = parts.next()?;
    let args: Vec<&str> = parts.collect();

    let name = match head.split_once('@') {
        Some((name, target)) if target.eq_ignore_ascii_case(bot_username) => name,
        Some(_) => return None,
        None => head,
    };

    let command = match name.to_lowercase().as_str() {
        "start" => Ok(Command::Start),
        "help" => Ok(Command::Help),
        "id" => Ok(Command::Id),
        "stats" => Ok(Command::Stats),
        "history" => Ok(Command::History),
        "shop" => Ok(Command::Shop),
        "boost" => Ok(Command::Boost),
        "top" => Ok(Command::Top),
        "rank" => parse_rank(&args),
        "buy" => parse_buy(&args),
        "gift" => parse_gift(&args, replying),
        _ => return None,
    };

    Some(command)
}

fn parse_rank(args: &[&str]) -> ParseResult<Command> {
    match args {
        [period] => period
            .parse::<Period>()
            .map(Command::Rank)
            .map_err(|_| ParseError::RankUsage),
        _ => Err(ParseError::RankUsage),
    }
}

fn parse_buy(args: &[&str]) -> ParseResult<Command> {
    match args {
        [id] => parse_id(id).map(Command::Buy),
        _ => Err(ParseError::BuyUsage),
    }
}

fn parse_gift(args: &[&str], replying: bool) -> ParseResult<Command> {
    match (replying, args) {
        (true, [amount]) => Ok(Command::Gift {
            to: GiftTarget::Reply,
            amount: amount.to_string(),
        }),
        (true, _) => Err(ParseError::GiftReplyUsage),

        (false, [user, amount]) => Ok(Command::Gift {
            to: GiftTarget::User(UserId(parse_id(user)?)),
            amount: amount.to_string(),
        }),
        (false, _) => Err(ParseError::GiftUsage),
    }
}

fn parse_id(raw: &str) -> ParseResult<i64> {
    raw.parse::<i64>()
        .map_err(|_| ParseError::InvalidId(raw.to_string()))
}
