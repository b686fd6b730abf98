//! Provider configuration.
//!
//! Discovery providers receive their options as a flat string-to-string
//! mapping. [`DiscoverConfig`] holds that mapping and can be built from the
//! compact `key=value` form the discovery framework accepts on the command
//! line:
//!
//! ```text
//! provider=libvirt qemu_uri=qemu:///system ns_identifier="http://example.org/xmlns/discover/1.0"
//! ```
//!
//! Values may be wrapped in double quotes; inside quotes `\"` and `\\` escape
//! a quote and a backslash. [`LibvirtOptions`] is the typed view the libvirt
//! provider reads from the mapping.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    iter::Peekable,
    str::{Chars, FromStr},
};

use thiserror::Error;

use crate::hypervisor::AddressSource;

pub const PROVIDER_KEY: &str = "provider";
pub const QEMU_URI_KEY: &str = "qemu_uri";
pub const NS_IDENTIFIER_KEY: &str = "ns_identifier";
pub const METADATA_KEY_KEY: &str = "metadata_key";
pub const METADATA_VALUE_KEY: &str = "metadata_value";
pub const ADDRESS_SOURCE_KEY: &str = "address_source";
pub const ON_MISMATCH_KEY: &str = "on_mismatch";
pub const LEGACY_METADATA_KEY: &str = "legacy_metadata";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing '=' after key {0:?}")]
    MissingValue(String),

    #[error("Empty key in config string")]
    EmptyKey,

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Unterminated quoted value for {0:?}")]
    UnterminatedQuote(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

/// What the provider does when a domain's metadata does not match the filter.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum MismatchPolicy {
    /// Fail the whole lookup on the first mismatching domain.
    #[default]
    Abort,
    /// Leave the mismatching domain out and keep going.
    Skip,
}

/// Flat option mapping handed to a provider.
///
/// Absent keys read as the empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoverConfig {
    values: BTreeMap<String, String>,
}

impl DiscoverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a whitespace separated list of `key=value` pairs.
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let mut values = BTreeMap::new();
        let mut chars = input.chars().peekable();

        loop {
            while chars.next_if(|c| c.is_whitespace()).is_some() {}
            if chars.peek().is_none() {
                break;
            }

            let mut key = String::new();
            while let Some(c) = chars.next_if(|c| *c != '=' && !c.is_whitespace()) {
                key.push(c);
            }
            if chars.next_if_eq(&'=').is_none() {
                return Err(ConfigError::MissingValue(key));
            }
            if key.is_empty() {
                return Err(ConfigError::EmptyKey);
            }

            let value = if chars.next_if_eq(&'"').is_some() {
                parse_quoted(&key, &mut chars)?
            } else {
                let mut value = String::new();
                while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                    value.push(c);
                }
                value
            };

            if values.contains_key(&key) {
                return Err(ConfigError::DuplicateKey(key));
            }
            values.insert(key, value);
        }

        Ok(Self { values })
    }

    pub fn get(&self, key: &str) -> &str {
        self.values.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.values.insert(key.into(), value.into())
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn provider(&self) -> &str {
        self.get(PROVIDER_KEY)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Reads an optional typed option, falling back to `default` when absent.
    pub fn parse_option<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.values.get(key) {
            None => Ok(default),
            Some(raw) => raw.parse::<T>().map_err(|e| ConfigError::InvalidValue {
                field: key.to_string(),
                message: format!("{:?}: {}", raw, e),
            }),
        }
    }
}

fn parse_quoted(key: &str, chars: &mut Peekable<Chars<'_>>) -> Result<String, ConfigError> {
    let mut value = String::new();
    loop {
        match chars.next() {
            None => return Err(ConfigError::UnterminatedQuote(key.to_string())),
            Some('"') => break,
            Some('\\') => match chars.next() {
                Some(escaped) => value.push(escaped),
                None => return Err(ConfigError::UnterminatedQuote(key.to_string())),
            },
            Some(c) => value.push(c),
        }
    }
    match chars.peek() {
        None => Ok(value),
        Some(c) if c.is_whitespace() => Ok(value),
        Some(_) => Err(ConfigError::InvalidValue {
            field: key.to_string(),
            message: "unexpected character after closing quote".to_string(),
        }),
    }
}

fn needs_quoting(value: &str) -> bool {
    value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || c == '"' || c == '\\' || c == '=')
}

fn write_pair(f: &mut fmt::Formatter<'_>, key: &str, value: &str) -> fmt::Result {
    if !needs_quoting(value) {
        return write!(f, "{}={}", key, value);
    }
    write!(f, "{}=\"", key)?;
    for c in value.chars() {
        if c == '"' || c == '\\' {
            write!(f, "\\")?;
        }
        write!(f, "{}", c)?;
    }
    write!(f, "\"")
}

/// Renders `provider` first, then the remaining keys in sorted order.
impl fmt::Display for DiscoverConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let provider = self.values.get(PROVIDER_KEY).map(|v| (PROVIDER_KEY, v));
        let rest = self
            .values
            .iter()
            .filter(|(k, _)| k.as_str() != PROVIDER_KEY)
            .map(|(k, v)| (k.as_str(), v));

        for (i, (key, value)) in provider.into_iter().chain(rest).enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write_pair(f, key, value)?;
        }
        Ok(())
    }
}

impl FromStr for DiscoverConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<HashMap<String, String>> for DiscoverConfig {
    fn from(values: HashMap<String, String>) -> Self {
        Self {
            values: values.into_iter().collect(),
        }
    }
}

impl<K, V> FromIterator<(K, V)> for DiscoverConfig
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Typed view of the options the libvirt provider understands.
///
/// The four filter and connection options have no defaults: a missing key is
/// an empty string and takes part in matching as such.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibvirtOptions {
    pub qemu_uri: String,
    pub ns_identifier: String,
    pub metadata_key: String,
    pub metadata_value: String,
    pub address_source: AddressSource,
    pub on_mismatch: MismatchPolicy,
    /// Reuse the previous domain's decoded fields when a document fails to
    /// decode or omits one of them.
    pub legacy_metadata: bool,
}

impl TryFrom<&DiscoverConfig> for LibvirtOptions {
    type Error = ConfigError;

    fn try_from(config: &DiscoverConfig) -> Result<Self, Self::Error> {
        Ok(Self {
            qemu_uri: config.get(QEMU_URI_KEY).to_string(),
            ns_identifier: config.get(NS_IDENTIFIER_KEY).to_string(),
            metadata_key: config.get(METADATA_KEY_KEY).to_string(),
            metadata_value: config.get(METADATA_VALUE_KEY).to_string(),
            address_source: config.parse_option(ADDRESS_SOURCE_KEY, AddressSource::default())?,
            on_mismatch: config.parse_option(ON_MISMATCH_KEY, MismatchPolicy::default())?,
            legacy_metadata: config.parse_option(LEGACY_METADATA_KEY, false)?,
        })
    }
}
