use std::env;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use config_crate::builder::DefaultState;
use config_crate::{Config as RawConfig, ConfigBuilder, ConfigError, Environment, File};
use failure::Error as FailureError;
use serde::de::{self, Deserializer, SeqAccess, Unexpected, Visitor};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::errors::Error;

pub const DEFAULT_API_URL: &str = "https://supplies-api.wildberries.ru/api/v1/warehouses";

enum Env {
    Development,
    Test,
    Production,
}

impl Env {
    fn new(run_mode: Option<String>) -> Self {
        match run_mode {
            Some(ref s) if s == "test" => Env::Test,
            Some(ref s) if s == "production" => Env::Production,
            _ => Env::Development,
        }
    }

    fn to_string(&self) -> &'static str {
        match self {
            &Env::Development => "development",
            &Env::Production => "production",
            &Env::Test => "test",
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub wb: WbConfig,
    pub supabase: SupabaseConfig,
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct WbConfig {
    /// Sent verbatim in the `Authorization` header.
    pub token: String,
    #[validate(url)]
    pub api_url: String,
    #[validate(range(min = 1))]
    pub timeout_secs: u64,
    /// Wait before each attempt, one entry per attempt. A single number is a one-entry schedule.
    #[validate(length(min = 1))]
    #[serde(deserialize_with = "one_or_many")]
    pub backoff_secs: Vec<u64>,
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct SupabaseConfig {
    #[validate(url)]
    pub url: String,
    pub service_key: String,
    #[validate(custom = "validate_identifier")]
    pub schema: String,
    #[validate(custom = "validate_identifier")]
    pub table: String,
    #[validate(range(min = 1))]
    pub batch_size: usize,
}

impl Config {
    /// Creates config from defaults, overwritten by config/base.toml and then by <env>.toml,
    /// where env is one of development, test, production. After that tunables could be
    /// overwritten by environment variables like WB_SYNC__WB__TIMEOUT_SECS, and finally the
    /// credentials and destination are taken from WB_SUPPLIES_TOKEN, SUPABASE_URL,
    /// SUPABASE_SERVICE_KEY, SUPABASE_SCHEMA and SUPABASE_TABLE.
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_dir(Path::new("config"), env::var("RUN_MODE").ok(), |name| env::var(name).ok())
    }

    /// Same layering as `new`, with the TOML files read from `dir`.
    pub fn from_dir<F>(dir: &Path, run_mode: Option<String>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env::new(run_mode);

        let builder = Self::defaults()?
            .add_source(File::from(dir.join("base")).required(false))
            // Optional file specific for environment
            .add_source(File::from(dir.join(env.to_string())).required(false))
            .add_source(
                Environment::with_prefix("WB_SYNC")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("wb.backoff_secs"),
            );

        Self::build(builder, lookup)
    }

    /// Defaults plus the well-known variables resolved through `lookup`, no files involved.
    pub fn with_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::build(Self::defaults()?, lookup)
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        RawConfig::builder()
            .set_default("wb.token", "")?
            .set_default("wb.api_url", DEFAULT_API_URL)?
            .set_default("wb.timeout_secs", 30i64)?
            .set_default("wb.backoff_secs", vec![0i64, 3, 7])?
            .set_default("supabase.url", "")?
            .set_default("supabase.service_key", "")?
            .set_default("supabase.schema", "public")?
            .set_default("supabase.table", "fbw_warehouses")?
            .set_default("supabase.batch_size", 500i64)
    }

    fn build<F>(builder: ConfigBuilder<DefaultState>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |name: &str| lookup(name).filter(|value| !value.is_empty());

        builder
            .set_override_option("wb.token", lookup("WB_SUPPLIES_TOKEN"))?
            .set_override_option("supabase.url", lookup("SUPABASE_URL"))?
            .set_override_option("supabase.service_key", lookup("SUPABASE_SERVICE_KEY"))?
            .set_override_option("supabase.schema", optional("SUPABASE_SCHEMA"))?
            .set_override_option("supabase.table", optional("SUPABASE_TABLE"))?
            .build()?
            .try_deserialize()
    }

    /// Checks that the sync can start. Credentials are checked first, token before Supabase.
    pub fn validate(&self) -> Result<(), FailureError> {
        if self.wb.token.is_empty() {
            return Err(Error::Config("WB_SUPPLIES_TOKEN is empty".to_string()).into());
        }
        if self.supabase.url.is_empty() || self.supabase.service_key.is_empty() {
            return Err(Error::Config("Supabase URL or SERVICE KEY is empty".to_string()).into());
        }

        self.wb.validate().map_err(|e| invalid_settings("WB", &e))?;
        self.supabase.validate().map_err(|e| invalid_settings("Supabase", &e))?;
        Ok(())
    }
}

impl WbConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff(&self) -> Vec<Duration> {
        self.backoff_secs.iter().cloned().map(Duration::from_secs).collect()
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} -> {}/{}.{}",
            self.wb.api_url,
            self.supabase.url.trim_end_matches('/'),
            self.supabase.schema,
            self.supabase.table
        )
    }
}

struct Schedule;

impl<'de> Visitor<'de> for Schedule {
    type Value = Vec<u64>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("seconds or a list of seconds")
    }

    fn visit_u64<E: de::Error>(self, secs: u64) -> Result<Vec<u64>, E> {
        Ok(vec![secs])
    }

    fn visit_i64<E: de::Error>(self, secs: i64) -> Result<Vec<u64>, E> {
        u64::try_from(secs)
            .map(|secs| vec![secs])
            .map_err(|_| E::invalid_value(Unexpected::Signed(secs), &self))
    }

    fn visit_str<E: de::Error>(self, secs: &str) -> Result<Vec<u64>, E> {
        secs.trim()
            .parse::<u64>()
            .map(|secs| vec![secs])
            .map_err(|_| E::invalid_value(Unexpected::Str(secs), &self))
    }

    // Elements go through the source's own integer parsing, which accepts list items split from env strings.
    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Vec<u64>, A::Error> {
        let mut waits = Vec::new();
        while let Some(secs) = seq.next_element::<u64>()? {
            waits.push(secs);
        }
        Ok(waits)
    }
}

// `WB_SYNC__WB__BACKOFF_SECS=4` arrives as a plain integer rather than a list.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(Schedule)
}

fn invalid_settings(section: &str, errors: &ValidationErrors) -> FailureError {
    let mut fields = errors.field_errors().keys().map(|field| field.to_string()).collect::<Vec<_>>();
    fields.sort();
    Error::Config(format!("Invalid {} settings: {}", section, fields.join(", "))).into()
}

/// Schema and table end up in URL paths and headers, so only plain identifiers pass.
fn validate_identifier(value: &str) -> Result<(), ValidationError> {
    let mut chars = value.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => chars.all(|c| c.is_ascii_alphanumeric() || c == '_'),
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("identifier"))
    }
}
