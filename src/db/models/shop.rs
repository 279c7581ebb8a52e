use chrono::{DateTime, Duration, Utc};

use super::boost::BoostKind;

/// Catalog entry of `shop`. `duration` is in hours; `0` means the effect never lapses.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ShopItem {
    pub id: i64,
    pub name: String,
    #[sqlx(rename = "type", try_from = "String")]
    pub kind: BoostKind,
    pub description: String,
    pub price: i64,
    pub duration: i32,
    pub created_at: DateTime<Utc>,
}

impl ShopItem {
    /// Expiry of a boost bought from this item at `now`
    pub fn expiry_from(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self.duration {
            hours if hours > 0 => Some(now + Duration::hours(i64::from(hours))),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn item(duration: i32) -> ShopItem {
        ShopItem {
            id: 1,
            name: "Double Points".into(),
            kind: BoostKind::DoublePoints,
            description: String::new(),
            price: 500,
            duration,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_expiry_from_duration() {
        let now = Utc::now();
        assert_eq!(item(24).expiry_from(now), Some(now + Duration::hours(24)));
        assert_eq!(item(0).expiry_from(now), None);
    }
}
