use core::fmt;

use rand::Rng;

use crate::db::models::{Boost, BoostKind, Source};
use crate::util::env::{Env, EnvErr, EnvResult};

/// Kind of chat activity that earns points. Every inbound message maps to at most one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityKind {
    Text,
    Document,
    Photo,
    Sticker,
    Audio,
    Animation,
}

/// How many base points one activity is worth
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwardRule {
    Fixed(i64),
    /// Uniform draw from `[min, max)`
    Range { min: i64, max: i64 },
}

/// Chance at extra points granted by a `lucky_bonus` boost
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LuckyBonus {
    pub chance: f64,
    pub percent: u32,
}

/// Award rules for every activity kind plus the lucky bonus payout
#[derive(Debug, Clone, PartialEq)]
pub struct PointsConfig {
    pub text: AwardRule,
    pub document: AwardRule,
    pub photo: AwardRule,
    pub sticker: AwardRule,
    pub audio: AwardRule,
    pub animation: AwardRule,
    pub lucky: LuckyBonus,
}

/// Final amount of one activity award and the source it is recorded under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Award {
    pub amount: i64,
    pub source: Source,
}

impl AwardRule {
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> i64 {
        match *self {
            Self::Fixed(n) => n,
            Self::Range { min, max } => rng.random_range(min..max),
        }
    }

    fn validate(&self, kind: ActivityKind) -> EnvResult<()> {
        match *self {
            Self::Fixed(n) if n < 0 => Err(EnvErr::Invalid(format!(
                "{kind} award must not be negative (got {n})"
            ))),
            Self::Range { min, max } if min >= max => Err(EnvErr::Invalid(format!(
                "{kind} award range [{min}, {max}) is empty"
            ))),
            Self::Range { min, .. } if min < 0 => Err(EnvErr::Invalid(format!(
                "{kind} award must not be negative (got {min})"
            ))),
            _ => Ok(()),
        }
    }
}

impl LuckyBonus {
    /// Bonus on top of `base`, or `None` when the roll misses
    pub fn roll<R: Rng + ?Sized>(&self, base: i64, rng: &mut R) -> Option<i64> {
        if !rng.random_bool(self.chance.clamp(0.0, 1.0)) {
            return None;
        }

        let scaled = base.max(0) * i64::from(self.percent);
        Some(((scaled + 99) / 100).max(1))
    }
}

impl PointsConfig {
    pub fn from_env(env: &Env) -> EnvResult<Self> {
        let config = Self {
            text: AwardRule::Range {
                min: env.point_text_min,
                max: env.point_text_max,
            },
            document: AwardRule::Fixed(env.point_document),
            photo: AwardRule::Fixed(env.point_photo),
            sticker: AwardRule::Fixed(env.point_sticker),
            audio: AwardRule::Fixed(env.point_audio),
            animation: AwardRule::Fixed(env.point_animation),
            lucky: LuckyBonus {
                chance: env.lucky_chance,
                percent: env.lucky_percent,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> EnvResult<()> {
        for kind in ActivityKind::ALL {
            self.rule(kind).validate(kind)?;
        }

        if !(0.0..=1.0).contains(&self.lucky.chance) {
            return Err(EnvErr::Invalid(format!(
                "lucky chance must lie in [0, 1] (got {})",
                self.lucky.chance
            )));
        }

        Ok(())
    }

    pub fn rule(&self, kind: ActivityKind) -> AwardRule {
        match kind {
            ActivityKind::Text => self.text,
            ActivityKind::Document => self.document,
            ActivityKind::Photo => self.photo,
            ActivityKind::Sticker => self.sticker,
            ActivityKind::Audio => self.audio,
            ActivityKind::Animation => self.animation,
        }
    }

    /// Draws the base award and applies the effects of `boosts`. A first-ever activity passes no
    /// boosts and is always recorded as plain chatting.
    ///
    /// Must stay synchronous: the thread-local rng cannot be held across an await point.
    pub fn award(&self, kind: ActivityKind, boosts: &[Boost]) -> Award {
        let mut rng = rand::rng();
        self.award_with(kind, boosts, &mut rng)
    }

    pub fn award_with<R: Rng + ?Sized>(
        &self,
        kind: ActivityKind,
        boosts: &[Boost],
        rng: &mut R,
    ) -> Award {
        let base = self.rule(kind).draw(rng);
        let doubled = boosts.iter().any(|b| b.kind == BoostKind::DoublePoints);
        let lucky = boosts.iter().any(|b| b.kind == BoostKind::LuckyBonus);

        let mut award = Award {
            amount: base,
            source: Source::Chatting,
        };

        if doubled {
            award.amount = base * 2;
            award.source = Source::DoublePoints;
        }

        if lucky && let Some(bonus) = self.lucky.roll(base, rng) {
            award.amount += bonus;
            if !doubled {
                award.source = Source::LuckyBonus;
            }
        }

        award
    }
}

impl Default for PointsConfig {
    fn default() -> Self {
        Self {
            text: AwardRule::Range { min: 1, max: 5 },
            document: AwardRule::Fixed(3),
            photo: AwardRule::Fixed(2),
            sticker: AwardRule::Fixed(1),
            audio: AwardRule::Fixed(2),
            animation: AwardRule::Fixed(1),
            lucky: LuckyBonus {
                chance: 0.25,
                percent: 100,
            },
        }
    }
}

impl ActivityKind {
    pub const ALL: [ActivityKind; 6] = [
        Self::Text,
        Self::Document,
        Self::Photo,
        Self::Sticker,
        Self::Audio,
        Self::Animation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Document => "document",
            Self::Photo => "photo",
            Self::Sticker => "sticker",
            Self::Audio => "audio",
            Self::Animation => "animation",
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod test {
    use chrono::Utc;

    use super::*;
    use crate::db::models::{ChatId, UserId};

    fn boost(kind: BoostKind) -> Boost {
        Boost {
            id: 1,
            user_id: UserId(1),
            chat_id: ChatId(-1),
            item_id: 1,
            kind,
            expires_at: None,
            created_at: Utc::now(),
        }
    }

    fn config(text: AwardRule, chance: f64) -> PointsConfig {
        PointsConfig {
            text,
            lucky: LuckyBonus {
                chance,
                percent: 100,
            },
            ..PointsConfig::default()
        }
    }

    #[test]
    fn test_text_draws_from_half_open_range() {
        let config = PointsConfig::default();
        for _ in 0..500 {
            let award = config.award(ActivityKind::Text, &[]);
            assert!((1..5).contains(&award.amount), "{}", award.amount);
            assert_eq!(award.source, Source::Chatting);
        }
    }

    #[test]
    fn test_fixed_kinds_use_their_value() {
        let config = PointsConfig::default();
        assert_eq!(config.award(ActivityKind::Document, &[]).amount, 3);
        assert_eq!(config.award(ActivityKind::Photo, &[]).amount, 2);
        assert_eq!(config.award(ActivityKind::Sticker, &[]).amount, 1);
    }

    #[test]
    fn test_double_points_doubles_and_relabels() {
        let config = config(AwardRule::Range { min: 4, max: 5 }, 0.0);
        let award = config.award(ActivityKind::Text, &[boost(BoostKind::DoublePoints)]);

        assert_eq!(
            award,
            Award {
                amount: 8,
                source: Source::DoublePoints
            }
        );
    }

    #[test]
    fn test_lucky_bonus_fires_on_certain_chance() {
        let config = config(AwardRule::Fixed(4), 1.0);
        let award = config.award(ActivityKind::Text, &[boost(BoostKind::LuckyBonus)]);

        assert_eq!(
            award,
            Award {
                amount: 8,
                source: Source::LuckyBonus
            }
        );
    }

    #[test]
    fn test_lucky_bonus_keeps_double_points_source() {
        let config = config(AwardRule::Fixed(3), 1.0);
        let award = config.award(
            ActivityKind::Text,
            &[
                boost(BoostKind::DoublePoints),
                boost(BoostKind::LuckyBonus),
            ],
        );

        assert_eq!(award.amount, 9);
        assert_eq!(award.source, Source::DoublePoints);
    }

    #[test]
    fn test_lucky_bonus_is_at_least_one_point() {
        let lucky = LuckyBonus {
            chance: 1.0,
            percent: 10,
        };
        assert_eq!(lucky.roll(0, &mut rand::rng()), Some(1));
        assert_eq!(lucky.roll(4, &mut rand::rng()), Some(1));
        assert_eq!(lucky.roll(15, &mut rand::rng()), Some(2));
    }

    #[test]
    fn test_cosmetic_boosts_change_nothing() {
        let config = config(AwardRule::Fixed(4), 1.0);
        let award = config.award(ActivityKind::Text, &[boost(BoostKind::Cosmetic("halo".into()))]);
        assert_eq!(award.amount, 4);
        assert_eq!(award.source, Source::Chatting);
    }

    #[test]
    fn test_invalid_rules_are_rejected() {
        let empty = config(AwardRule::Range { min: 5, max: 5 }, 0.25);
        assert!(matches!(empty.validate(), Err(EnvErr::Invalid(_))));

        let negative = PointsConfig {
            photo: AwardRule::Fixed(-1),
            ..PointsConfig::default()
        };
        assert!(matches!(negative.validate(), Err(EnvErr::Invalid(_))));

        let odds = config(AwardRule::Range { min: 1, max: 5 }, 1.5);
        assert!(matches!(odds.validate(), Err(EnvErr::Invalid(_))));

        assert!(PointsConfig::default().validate().is_ok());
    }
}
