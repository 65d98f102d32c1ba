//! Typed configuration from a Parameter Store document with environment
//! overrides.
//!
//! The parameter holds a JSON object whose keys are the serde names of the
//! target struct's fields. Every field can be overridden by an environment
//! variable, which is looked up by an explicit mapping when one is
//! registered, otherwise by the field's serde name and then by its upper-case
//! form. Environment strings are coerced to the field type.
//!
//! ```no_run
//! use serde::Deserialize;
//! use commonlib_aws::config_reader::ConfigurationReader;
//!
//! #[derive(Deserialize)]
//! struct Config {
//!     host: String,
//!     port: u16,
//!     #[serde(default)]
//!     debug: bool,
//! }
//!
//! # async fn run() -> commonlib_aws::Result<()> {
//! let ssm = commonlib_aws::ssm::new_client().await;
//! let config: Config = ConfigurationReader::new()
//!     .env_name("port", "HTTP_PORT")
//!     .read(&ssm, "/orders/config")
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;

use serde::de::value::MapDeserializer;
use serde::de::{self, DeserializeOwned, IntoDeserializer, Unexpected, Visitor};
use serde::{forward_to_deserialize_any, Deserializer};
use serde_json::{Map, Value};
use tracing::info;

use crate::error::{Error, Result};
use crate::ssm::ParameterSource;

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Read configuration `T` from the parameter `name`, with environment
/// overrides named after the fields.
pub async fn read_configuration<T, S>(source: &S, name: &str) -> Result<T>
where
    T: DeserializeOwned,
    S: ParameterSource + ?Sized,
{
    ConfigurationReader::new().read(source, name).await
}

pub struct ConfigurationReader {
    env_names: HashMap<String, String>,
    lookup: Lookup,
}

impl Default for ConfigurationReader {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConfigurationReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigurationReader")
            .field("env_names", &self.env_names)
            .finish_non_exhaustive()
    }
}

impl ConfigurationReader {
    pub fn new() -> Self {
        Self {
            env_names: HashMap::new(),
            lookup: Box::new(|name| std::env::var(name).ok()),
        }
    }

    /// Read `field` from the variable `variable`.
    pub fn env_name(mut self, field: impl Into<String>, variable: impl Into<String>) -> Self {
        self.env_names.insert(field.into(), variable.into());
        self
    }

    /// Replace the process environment as the source of overrides.
    pub fn with_lookup(
        mut self,
        lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.lookup = Box::new(lookup);
        self
    }

    /// Read the parameter document and apply the environment on top.
    ///
    /// A parameter that cannot be read or parsed is logged and ignored, so
    /// configuration can come from the environment alone.
    pub async fn read<T, S>(&self, source: &S, name: &str) -> Result<T>
    where
        T: DeserializeOwned,
        S: ParameterSource + ?Sized,
    {
        let document = match source.get_parameter(name, true).await {
            Ok(raw) => serde_json::from_str::<Map<String, Value>>(&raw)
                .inspect_err(|e| {
                    info!(error = %e, parameter = name, "parameter store configuration is not a JSON object")
                })
                .ok(),
            Err(e) => {
                info!(error = %e, parameter = name, "failed to read parameter store configuration");
                None
            }
        };
        self.merge(document.unwrap_or_default())
    }

    /// A field found in neither source is an error, except a `bool`, which
    /// reads as `false`.
    fn merge<T: DeserializeOwned>(&self, mut document: Map<String, Value>) -> Result<T> {
        let fields = field_names::<T>().ok_or_else(|| {
            Error::InvalidConfiguration("configuration type must be a struct".to_string())
        })?;

        let mut entries = Vec::with_capacity(fields.len());
        let mut missing = Vec::new();
        for field in fields {
            if let Some(raw) = self.lookup_env(field) {
                entries.push((field.to_string(), FieldValue::Env(raw)));
            } else if let Some(value) = document.remove(*field) {
                entries.push((field.to_string(), FieldValue::Document(value)));
            } else {
                missing.push(*field);
            }
        }

        // Each pass offers one more missing field as an unset value, which
        // only a bool accepts.
        let mut unset: Vec<&'static str> = Vec::new();
        loop {
            let values = entries.iter().cloned().chain(
                unset
                    .iter()
                    .map(|&field| (field.to_string(), FieldValue::Unset(field))),
            );
            let message = match T::deserialize(MapDeserializer::<_, serde_json::Error>::new(values)) {
                Ok(config) => return Ok(config),
                Err(e) => e.to_string(),
            };

            let absent = missing
                .iter()
                .find(|f| message.contains(&format!("missing field `{f}`")));
            match absent {
                Some(&field) if !unset.contains(&field) => unset.push(field),
                _ => {
                    return Err(match unset.iter().find(|f| message == unset_message(f)) {
                        Some(field) => Error::MissingConfiguration {
                            field: field.to_string(),
                            variable: self.variable_name(field),
                        },
                        None => Error::InvalidConfiguration(message),
                    });
                }
            }
        }
    }

    fn lookup_env(&self, field: &str) -> Option<String> {
        match self.env_names.get(field) {
            Some(variable) => (self.lookup)(variable),
            None => (self.lookup)(field).or_else(|| (self.lookup)(&field.to_uppercase())),
        }
    }

    fn variable_name(&self, field: &str) -> String {
        self.env_names
            .get(field)
            .cloned()
            .unwrap_or_else(|| field.to_string())
    }
}

/// `1 t T TRUE true True` and `0 f F FALSE false False`.
fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// Serde field names of `T`, learned by asking it to deserialize itself from
/// a deserializer that stops at the struct.
fn field_names<T: DeserializeOwned>() -> Option<&'static [&'static str]> {
    match T::deserialize(FieldNames) {
        Err(Introspect::Fields(fields)) => Some(fields),
        _ => None,
    }
}

#[derive(Debug)]
enum Introspect {
    Fields(&'static [&'static str]),
    Other(String),
}

impl fmt::Display for Introspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Introspect::Fields(fields) => write!(f, "fields {fields:?}"),
            Introspect::Other(message) => f.write_str(message),
        }
    }
}

impl std::error::Error for Introspect {}

impl de::Error for Introspect {
    fn custom<M: fmt::Display>(msg: M) -> Self {
        Introspect::Other(msg.to_string())
    }
}

struct FieldNames;

impl<'de> Deserializer<'de> for FieldNames {
    type Error = Introspect;

    fn deserialize_any<V: Visitor<'de>>(self, _visitor: V) -> std::result::Result<V::Value, Introspect> {
        Err(Introspect::Other("not a struct".to_string()))
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        _visitor: V,
    ) -> std::result::Result<V::Value, Introspect> {
        Err(Introspect::Fields(fields))
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf option unit unit_struct newtype_struct seq tuple
        tuple_struct map enum identifier ignored_any
    }
}

/// A field value from either source.
#[derive(Clone)]
enum FieldValue {
    Document(Value),
    Env(String),
    /// Set in neither source.
    Unset(&'static str),
}

fn unset_message(field: &str) -> String {
    format!("no value for `{field}`")
}

impl<'de> IntoDeserializer<'de, serde_json::Error> for FieldValue {
    type Deserializer = Self;

    fn into_deserializer(self) -> Self {
        self
    }
}

macro_rules! forward_to_source {
    ($($method:ident)*) => {$(
        fn $method<V: Visitor<'de>>(self, visitor: V) -> std::result::Result<V::Value, Self::Error> {
            match self {
                FieldValue::Document(value) => value.$method(visitor),
                FieldValue::Env(raw) => EnvValue(raw).$method(visitor),
                FieldValue::Unset(field) => Err(de::Error::custom(unset_message(field))),
            }
        }
    )*};
}

impl<'de> Deserializer<'de> for FieldValue {
    type Error = serde_json::Error;

    forward_to_source! {
        deserialize_any deserialize_i8 deserialize_i16 deserialize_i32
        deserialize_i64 deserialize_i128 deserialize_u8 deserialize_u16 deserialize_u32
        deserialize_u64 deserialize_u128 deserialize_f32 deserialize_f64 deserialize_char
        deserialize_str deserialize_string deserialize_bytes deserialize_byte_buf
        deserialize_unit deserialize_seq deserialize_map
        deserialize_identifier deserialize_ignored_any
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> std::result::Result<V::Value, Self::Error> {
        match self {
            FieldValue::Document(value) => value.deserialize_bool(visitor),
            FieldValue::Env(raw) => EnvValue(raw).deserialize_bool(visitor),
            FieldValue::Unset(_) => visitor.visit_bool(false),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> std::result::Result<V::Value, Self::Error> {
        match self {
            FieldValue::Document(value) => value.deserialize_option(visitor),
            FieldValue::Env(raw) => EnvValue(raw).deserialize_option(visitor),
            FieldValue::Unset(_) => visitor.visit_none(),
        }
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        visitor: V,
    ) -> std::result::Result<V::Value, Self::Error> {
        match self {
            FieldValue::Document(value) => value.deserialize_unit_struct(name, visitor),
            FieldValue::Env(raw) => EnvValue(raw).deserialize_unit_struct(name, visitor),
            FieldValue::Unset(field) => Err(de::Error::custom(unset_message(field))),
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        visitor: V,
    ) -> std::result::Result<V::Value, Self::Error> {
        match self {
            FieldValue::Document(value) => value.deserialize_newtype_struct(name, visitor),
            FieldValue::Env(raw) => EnvValue(raw).deserialize_newtype_struct(name, visitor),
            FieldValue::Unset(field) => Err(de::Error::custom(unset_message(field))),
        }
    }

    fn deserialize_tuple<V: Visitor<'de>>(
        self,
        len: usize,
        visitor: V,
    ) -> std::result::Result<V::Value, Self::Error> {
        match self {
            FieldValue::Document(value) => value.deserialize_tuple(len, visitor),
            FieldValue::Env(raw) => EnvValue(raw).deserialize_tuple(len, visitor),
            FieldValue::Unset(field) => Err(de::Error::custom(unset_message(field))),
        }
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        len: usize,
        visitor: V,
    ) -> std::result::Result<V::Value, Self::Error> {
        match self {
            FieldValue::Document(value) => value.deserialize_tuple_struct(name, len, visitor),
            FieldValue::Env(raw) => EnvValue(raw).deserialize_tuple_struct(name, len, visitor),
            FieldValue::Unset(field) => Err(de::Error::custom(unset_message(field))),
        }
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> std::result::Result<V::Value, Self::Error> {
        match self {
            FieldValue::Document(value) => value.deserialize_struct(name, fields, visitor),
            FieldValue::Env(raw) => EnvValue(raw).deserialize_struct(name, fields, visitor),
            FieldValue::Unset(field) => Err(de::Error::custom(unset_message(field))),
        }
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> std::result::Result<V::Value, Self::Error> {
        match self {
            FieldValue::Document(value) => value.deserialize_enum(name, variants, visitor),
            FieldValue::Env(raw) => EnvValue(raw).deserialize_enum(name, variants, visitor),
            FieldValue::Unset(field) => Err(de::Error::custom(unset_message(field))),
        }
    }
}

/// An environment string, parsed according to the type asked for.
struct EnvValue(String);

macro_rules! parse_number {
    ($($method:ident => $visit:ident : $ty:ty,)*) => {$(
        fn $method<V: Visitor<'de>>(self, visitor: V) -> std::result::Result<V::Value, Self::Error> {
            match self.0.trim().parse::<$ty>() {
                Ok(n) => visitor.$visit(n),
                Err(_) => Err(de::Error::invalid_value(Unexpected::Str(&self.0), &visitor)),
            }
        }
    )*};
}

impl EnvValue {
    /// Compound values are written as JSON.
    fn json(&self) -> std::result::Result<Value, serde_json::Error> {
        serde_json::from_str(&self.0)
    }
}

impl<'de> Deserializer<'de> for EnvValue {
    type Error = serde_json::Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> std::result::Result<V::Value, Self::Error> {
        visitor.visit_string(self.0)
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> std::result::Result<V::Value, Self::Error> {
        match parse_bool(&self.0) {
            Some(b) => visitor.visit_bool(b),
            None => Err(de::Error::invalid_value(Unexpected::Str(&self.0), &visitor)),
        }
    }

    parse_number! {
        deserialize_i8 => visit_i8: i8,
        deserialize_i16 => visit_i16: i16,
        deserialize_i32 => visit_i32: i32,
        deserialize_i64 => visit_i64: i64,
        deserialize_i128 => visit_i128: i128,
        deserialize_u8 => visit_u8: u8,
        deserialize_u16 => visit_u16: u16,
        deserialize_u32 => visit_u32: u32,
        deserialize_u64 => visit_u64: u64,
        deserialize_u128 => visit_u128: u128,
        deserialize_f32 => visit_f32: f32,
        deserialize_f64 => visit_f64: f64,
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> std::result::Result<V::Value, Self::Error> {
        visitor.visit_some(self)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> std::result::Result<V::Value, Self::Error> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> std::result::Result<V::Value, Self::Error> {
        self.json()?.deserialize_seq(visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> std::result::Result<V::Value, Self::Error> {
        self.json()?.deserialize_map(visitor)
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> std::result::Result<V::Value, Self::Error> {
        self.json()?.deserialize_struct(name, fields, visitor)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> std::result::Result<V::Value, Self::Error> {
        visitor.visit_enum(<String as IntoDeserializer<'de, serde_json::Error>>::into_deserializer(self.0))
    }

    forward_to_deserialize_any! {
        char str string bytes byte_buf unit unit_struct tuple tuple_struct
        identifier ignored_any
    }
}
