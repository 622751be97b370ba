//! Environment configuration.
//!
//! Variables are deserialized straight into [`Env`] through a small serde deserializer over
//! `(key, value)` pairs, so defaults and renames are expressed with the usual derive attributes.
//! Comma-separated values deserialize into sequences.

use std::iter::empty;

use serde::Deserialize;
use serde::de::value::{MapDeserializer, SeqDeserializer};
use serde::de::{self, IntoDeserializer};
use thiserror::Error;

use crate::constants::{DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_PORT, DEFAULT_SERVICE_NAME};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Postgrest,
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Env {
    pub supabase_url: Option<String>,
    pub supabase_key: Option<String>,
    #[serde(default)]
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    #[serde(default = "default_cors_origins")]
    pub cors_allow_origins: Vec<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
    pub otel_exporter_otlp_endpoint: Option<String>,
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Env {
    /// Reads `.env` (if present) on top of the process environment.
    pub fn new() -> EnvResult<Self> {
        if let Err(e) = dotenvy::dotenv()
            && !e.not_found()
        {
            return Err(EnvErr::Dotenvy(e));
        }

        Ok(from_iter(std::env::vars())?)
    }

    pub fn supabase_url(&self) -> EnvResult<&str> {
        self.supabase_url
            .as_deref()
            .ok_or(EnvErr::Required("SUPABASE_URL"))
    }

    pub fn supabase_key(&self) -> EnvResult<&str> {
        self.supabase_key
            .as_deref()
            .ok_or(EnvErr::Required("SUPABASE_KEY"))
    }

    pub fn database_url(&self) -> EnvResult<&str> {
        self.database_url
            .as_deref()
            .ok_or(EnvErr::Required("DATABASE_URL"))
    }
}

#[inline]
fn default_cors_origins() -> Vec<String> {
    vec![String::from("*")]
}

#[inline]
const fn default_port() -> u16 {
    DEFAULT_PORT
}

#[inline]
const fn default_http_timeout() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

#[inline]
fn default_service_name() -> String {
    String::from(DEFAULT_SERVICE_NAME)
}

// ---
//  Deserializer implementation
// ---

/// A single variable: `(name, raw value)`. The name is kept for error messages.
struct Val(String, String);

struct Vars<Iter> {
    inner: Iter,
}

impl<Iter: Iterator<Item = (String, String)>> Iterator for Vars<Iter> {
    type Item = (String, Val);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, v)| (k.clone(), Val(k, v)))
    }
}

impl<'de> IntoDeserializer<'de, EnvDeserializeError> for Val {
    type Deserializer = Self;
    fn into_deserializer(self) -> Self::Deserializer {
        self
    }
}

macro_rules! forward_parsed_vals {
    ($($ty:ident => $method:ident,)*) => {
        $(
            fn $method<V>(self, visitor: V) -> Result<V::Value, EnvDeserializeError>
            where
                V: de::Visitor<'de>
            {
                match self.1.trim().parse::<$ty>() {
                    Ok(val) => val.into_deserializer().$method(visitor),
                    Err(e) => Err(de::Error::custom(format_args!(
                        "{}: while parsing '{}' (variable: {})",
                        e, self.1, self.0
                    )))
                }
            }
        )*
    };
}

impl<'de> de::Deserializer<'de> for Val {
    type Error = EnvDeserializeError;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        self.1.into_deserializer().deserialize_any(visitor)
    }

    fn deserialize_seq<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        if self.1.trim().is_empty() {
            SeqDeserializer::new(empty::<Val>()).deserialize_seq(visitor)
        } else {
            let values = self
                .1
                .split(',')
                .map(|v| Val(self.0.clone(), v.trim().to_owned()))
                .filter(|v| !v.1.is_empty());
            SeqDeserializer::new(values).deserialize_seq(visitor)
        }
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

    fn deserialize_option<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        if self.1.trim().is_empty() {
            visitor.visit_none()
        } else {
            visitor.visit_some(self)
        }
    }

    fn deserialize_bool<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        match self.1.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "t" | "yes" | "y" | "on" => visitor.visit_bool(true),
            "0" | "false" | "f" | "no" | "n" | "off" | "" => visitor.visit_bool(false),
            other => Err(de::Error::custom(format_args!(
                "expected a boolean, got '{other}' (variable: {})",
                self.0
            ))),
        }
    }

    forward_parsed_vals! {
        u8 => deserialize_u8,
        u16 => deserialize_u16,
        u32 => deserialize_u32,
        u64 => deserialize_u64,
        i32 => deserialize_i32,
        i64 => deserialize_i64,
    }

    serde::forward_to_deserialize_any! {
        i8 i16 f32 f64 char str string unit bytes byte_buf map
        unit_struct newtype_struct tuple_struct identifier tuple
        ignored_any struct
    }
}

/// Deserializes `T` from an iterator of `(name, value)` pairs.
pub fn from_iter<Iter, T>(iter: Iter) -> Result<T, EnvDeserializeError>
where
    T: de::DeserializeOwned,
    Iter: IntoIterator<Item = (String, String)>,
{
    let vars = Vars {
        inner: iter.into_iter(),
    };
    T::deserialize(MapDeserializer::<_, EnvDeserializeError>::new(vars))
}

impl de::Error for EnvDeserializeError {
    fn custom<T>(msg: T) -> Self
    where
        T: std::fmt::Display,
    {
        EnvDeserializeError::Custom(msg.to_string())
    }

    fn missing_field(field: &'static str) -> Self {
        EnvDeserializeError::MissingValue(field.into())
    }
}

pub type EnvResult<T> = core::result::Result<T, EnvErr>;

#[derive(Debug, Error)]
pub enum EnvErr {
    #[error(transparent)]
    Dotenvy(#[from] dotenvy::Error),

    #[error(transparent)]
    DeserializationError(#[from] EnvDeserializeError),

    #[error("missing required environment variable {0}")]
    Required(&'static str),
}

#[derive(Debug, Error)]
pub enum EnvDeserializeError {
    #[error("env deserialization error: {0}")]
    Custom(String),

    #[error("missing environment variable {0}")]
    MissingValue(String),
}
