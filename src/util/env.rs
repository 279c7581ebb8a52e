//! Typed configuration read from the process environment.
//!
//! Every key carries the [`ENV_PREFIX`] prefix, which is stripped before the remaining name is
//! matched against the `SCREAMING_SNAKE_CASE` fields of [`Env`]. Values are parsed lazily by the
//! small serde deserializer at the bottom of this file, so numeric and boolean fields need no
//! hand-written parsing.

use std::borrow::Cow;
use std::sync::LazyLock;

use serde::Deserialize;
use serde::de::value::MapDeserializer;
use serde::de::{self, IntoDeserializer};
use thiserror::Error;
use tokio::sync::OnceCell;

pub const ENV_PREFIX: &str = "MODBOT_";

static ENV_VARS: LazyLock<OnceCell<Env>> = LazyLock::new(OnceCell::new);

/// Loads (once) and returns the process-wide configuration
pub async fn env() -> EnvResult<&'static Env> {
    ENV_VARS.get_or_try_init(|| async { Env::new() }).await
}

pub async fn get_var(var: Var) -> EnvResult<&'static str> {
    let vars = env().await?;
    Ok(match var {
        Var::Token => &vars.token,
        Var::DatabaseUrl => &vars.database_url,
    })
}

#[macro_export]
macro_rules! var {
    ($ev:expr) => {
        $crate::util::env::get_var($ev)
    };
}

#[derive(Debug)]
pub enum Var {
    Token,
    DatabaseUrl,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Env {
    pub token: String,
    pub database_url: String,

    /// Delete the triggering command message after replying
    #[serde(default)]
    pub delete_command: bool,

    #[serde(default = "defaults::text_min")]
    pub point_text_min: i64,
    #[serde(default = "defaults::text_max")]
    pub point_text_max: i64,
    #[serde(default = "defaults::document")]
    pub point_document: i64,
    #[serde(default = "defaults::photo")]
    pub point_photo: i64,
    #[serde(default = "defaults::sticker")]
    pub point_sticker: i64,
    #[serde(default = "defaults::audio")]
    pub point_audio: i64,
    #[serde(default = "defaults::animation")]
    pub point_animation: i64,

    #[serde(default = "defaults::lucky_chance")]
    pub lucky_chance: f64,
    #[serde(default = "defaults::lucky_percent")]
    pub lucky_percent: u32,

    #[serde(default = "defaults::store_timeout_secs")]
    pub store_timeout_secs: u64,
    #[serde(default = "defaults::ranking_limit")]
    pub ranking_limit: i64,
    #[serde(default = "defaults::history_limit")]
    pub history_limit: i64,
    #[serde(default = "defaults::poll_timeout_secs")]
    pub poll_timeout_secs: u64,

    #[serde(default)]
    pub log_format: LogFormat,
}

mod defaults {
    pub const fn text_min() -> i64 {
        1
    }
    pub const fn text_max() -> i64 {
        5
    }
    pub const fn document() -> i64 {
        3
    }
    pub const fn photo() -> i64 {
        2
    }
    pub const fn sticker() -> i64 {
        1
    }
    pub const fn audio() -> i64 {
        2
    }
    pub const fn animation() -> i64 {
        1
    }
    pub const fn lucky_chance() -> f64 {
        0.25
    }
    pub const fn lucky_percent() -> u32 {
        100
    }
    pub const fn store_timeout_secs() -> u64 {
        5
    }
    pub const fn ranking_limit() -> i64 {
        20
    }
    pub const fn history_limit() -> i64 {
        50
    }
    pub const fn poll_timeout_secs() -> u64 {
        30
    }
}

impl Env {
    pub fn new() -> EnvResult<Self> {
        Ok(prefixed(ENV_PREFIX).from_env::<Env>()?)
    }
}

// ---
//  Deserializer implementation
// ---

pub struct Prefixed<'a>(Cow<'a, str>);

/// `(key, raw value)`; the key is kept for error messages
struct EnvValue(String, String);
struct EnvKey(String);

struct Pairs<Iter> {
    inner: Iter,
}

struct EnvDeserializer<'de, Iter: Iterator<Item = (String, String)>> {
    inner: MapDeserializer<'de, Pairs<Iter>, EnvDeserializeError>,
}

impl<Iter: Iterator<Item = (String, String)>> Iterator for Pairs<Iter> {
    type Item = (EnvKey, EnvValue);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|(k, v)| (EnvKey(k.clone()), EnvValue(k, v)))
    }
}

impl<'de> IntoDeserializer<'de, EnvDeserializeError> for EnvValue {
    type Deserializer = Self;
    fn into_deserializer(self) -> Self::Deserializer {
        self
    }
}

impl<'de> IntoDeserializer<'de, EnvDeserializeError> for EnvKey {
    type Deserializer = Self;
    fn into_deserializer(self) -> Self::Deserializer {
        self
    }
}

macro_rules! parse_scalars {
    ($($ty:ident => $method:ident,)*) => {
        $(
            fn $method<V>(self, visitor: V) -> Result<V::Value, EnvDeserializeError>
            where
                V: de::Visitor<'de>
            {
                match self.1.trim().parse::<$ty>() {
                    Ok(val) => val.into_deserializer().$method(visitor),
                    Err(e) => Err(de::Error::custom(format_args!(
                        "{}: while parsing '{}' ({})",
                        e, self.1, self.0
                    )))
                }
            }
        )*
    };
}

impl<'de> de::Deserializer<'de> for EnvValue {
    type Error = EnvDeserializeError;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        self.1.into_deserializer().deserialize_any(visitor)
    }

    fn deserialize_enum<V>(
        self,
        _: &'static str,
        _: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        visitor.visit_enum(self.1.trim().to_lowercase().into_deserializer())
    }

    parse_scalars! {
        bool => deserialize_bool,
        u32 => deserialize_u32,
        u64 => deserialize_u64,
        i64 => deserialize_i64,
        f64 => deserialize_f64,
    }

    serde::forward_to_deserialize_any! {
        char str string unit seq option bytes byte_buf map newtype_struct
        unit_struct tuple_struct identifier tuple ignored_any struct
        u8 u16 i8 i16 i32 f32
    }
}

impl<'de> de::Deserializer<'de> for EnvKey {
    type Error = EnvDeserializeError;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        self.0.into_deserializer().deserialize_any(visitor)
    }

    serde::forward_to_deserialize_any! {
        char str string unit seq option bytes byte_buf map newtype_struct
        unit_struct tuple_struct identifier tuple ignored_any
        bool u8 u16 u32 u64 i8 i16 i32 i64 f32 f64 enum struct
    }
}

impl<'de, Iter: Iterator<Item = (String, String)>> de::Deserializer<'de>
    for EnvDeserializer<'de, Iter>
{
    type Error = EnvDeserializeError;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        visitor.visit_map(self.inner)
    }

    serde::forward_to_deserialize_any! {
        char str string unit seq option bytes byte_buf map
        newtype_struct unit_struct tuple_struct identifier
        tuple ignored_any bool u8 u16 u32 u64 i8 i16 i32 i64
        f32 f64 enum struct
    }
}

pub fn from_iter<Iter, T>(iter: Iter) -> Result<T, EnvDeserializeError>
where
    T: de::DeserializeOwned,
    Iter: IntoIterator<Item = (String, String)>,
{
    T::deserialize(EnvDeserializer {
        inner: MapDeserializer::new(Pairs {
            inner: iter.into_iter(),
        }),
    })
}

impl<'a> Prefixed<'a> {
    #[allow(clippy::wrong_self_convention)]
    pub fn from_env<T>(&self) -> Result<T, EnvDeserializeError>
    where
        T: de::DeserializeOwned,
    {
        self.from_iter(dotenvy::vars())
    }

    /// Keeps only the pairs carrying this prefix, with the prefix removed
    #[allow(clippy::wrong_self_convention)]
    pub fn from_iter<Iter, T>(&self, iter: Iter) -> Result<T, EnvDeserializeError>
    where
        T: de::DeserializeOwned,
        Iter: IntoIterator<Item = (String, String)>,
    {
        let prefix = self.0.as_ref();
        from_iter(iter.into_iter().filter_map(|(k, v)| {
            k.strip_prefix(prefix)
                .map(|stripped| (stripped.to_owned(), v))
        }))
    }
}

pub fn prefixed<'a, C>(prefix: C) -> Prefixed<'a>
where
    C: Into<Cow<'a, str>>,
{
    Prefixed(prefix.into())
}

impl de::Error for EnvDeserializeError {
    fn custom<T>(msg: T) -> Self
    where
        T: std::fmt::Display,
    {
        EnvDeserializeError::Custom(msg.to_string())
    }

    fn missing_field(field: &'static str) -> Self {
        EnvDeserializeError::MissingValue(format!("{ENV_PREFIX}{}", field.to_uppercase()))
    }
}

pub type EnvResult<T> = core::result::Result<T, EnvErr>;

#[derive(Debug, Error)]
pub enum EnvErr {
    #[error(transparent)]
    Dotenvy(#[from] dotenvy::Error),

    #[error(transparent)]
    DeserializationError(#[from] EnvDeserializeError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum EnvDeserializeError {
    #[error("env deserialization error: {0}")]
    Custom(String),

    #[error("missing required variable {0}")]
    MissingValue(String),
}

#[cfg(test)]
mod test {
    use super::*;

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_fill_optional_keys() {
        let env: Env = prefixed(ENV_PREFIX)
            .from_iter(pairs(&[
                ("MODBOT_TOKEN", "123:abc"),
                ("MODBOT_DATABASE_URL", "postgres://localhost/modbot"),
                ("PATH", "/usr/bin"),
            ]))
            .unwrap();

        assert_eq!(env.token, "123:abc");
        assert!(!env.delete_command);
        assert_eq!((env.point_text_min, env.point_text_max), (1, 5));
        assert_eq!(env.store_timeout_secs, 5);
        assert_eq!(env.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_typed_values_are_parsed() {
        let env: Env = prefixed(ENV_PREFIX)
            .from_iter(pairs(&[
                ("MODBOT_TOKEN", "123:abc"),
                ("MODBOT_DATABASE_URL", "postgres://localhost/modbot"),
                ("MODBOT_DELETE_COMMAND", "true"),
                ("MODBOT_POINT_PHOTO", "7"),
                ("MODBOT_LUCKY_CHANCE", "0.5"),
                ("MODBOT_LOG_FORMAT", "JSON"),
                ("MODBOT_LUCKY_PERCENT", " 150 "),
                ("MODBOT_POLL_TIMEOUT_SECS", "45"),
            ]))
            .unwrap();

        assert!(env.delete_command);
        assert_eq!(env.point_photo, 7);
        assert_eq!(env.lucky_chance, 0.5);
        assert_eq!(env.lucky_percent, 150);
        assert_eq!(env.poll_timeout_secs, 45);
        assert_eq!(env.log_format, LogFormat::Json);
    }

    #[test]
    fn test_missing_token_is_reported() {
        let err = prefixed(ENV_PREFIX)
            .from_iter::<_, Env>(pairs(&[("MODBOT_DATABASE_URL", "postgres://x")]))
            .unwrap_err();

        assert!(matches!(err, EnvDeserializeError::MissingValue(ref v) if v == "MODBOT_TOKEN"));
    }

    #[test]
    fn test_bad_number_names_the_variable() {
        let err = prefixed(ENV_PREFIX)
            .from_iter::<_, Env>(pairs(&[
                ("MODBOT_TOKEN", "t"),
                ("MODBOT_DATABASE_URL", "postgres://x"),
                ("MODBOT_POINT_STICKER", "lots"),
            ]))
            .unwrap_err();

        assert!(err.to_string().contains("POINT_STICKER"));
    }
}
