use super::traits::ConfigSection;
use crate::error::EvoError;
use config::{Config, ConfigError, Environment, File, FileFormat};
use log::debug;
use std::path::Path;

/// Environment variables with this prefix override file values, using `__`
/// between section and key: `ADAPTEVO_EVOLUTION__POPULATION_SIZE=200`.
pub const ENV_PREFIX: &str = "ADAPTEVO";

/// Section/key lookups with typed defaults over a layered `config::Config`.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    inner: Config,
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

fn parse_error(e: ConfigError) -> EvoError {
    EvoError::ConfigParse(e.to_string())
}

impl ConfigSource {
    /// Environment overrides only.
    pub fn from_env() -> Result<Self, EvoError> {
        let inner = Config::builder().add_source(environment()).build().map_err(parse_error)?;
        Ok(Self { inner })
    }

    /// TOML or JSON by extension, then environment overrides.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, EvoError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(EvoError::ConfigNotFound(path.display().to_string()));
        }
        let inner = Config::builder()
            .add_source(File::from(path))
            .add_source(environment())
            .build()
            .map_err(parse_error)?;
        Ok(Self { inner })
    }

    /// In-memory TOML, without environment overrides.
    pub fn from_toml_str(text: &str) -> Result<Self, EvoError> {
        let inner = Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()
            .map_err(parse_error)?;
        Ok(Self { inner })
    }

    fn key(section: &str, key: &str) -> String {
        format!("{}.{}", section, key)
    }

    pub fn has(&self, section: &str, key: &str) -> bool {
        self.inner.get::<config::Value>(&Self::key(section, key)).is_ok()
    }

    pub fn get_string(&self, section: &str, key: &str, default: &str) -> String {
        self.inner
            .get_string(&Self::key(section, key))
            .unwrap_or_else(|_| default.to_string())
    }

    pub fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.inner.get_int(&Self::key(section, key)).unwrap_or(default)
    }

    pub fn get_float(&self, section: &str, key: &str, default: f64) -> f64 {
        self.inner.get_float(&Self::key(section, key)).unwrap_or(default)
    }

    pub fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.inner.get_bool(&Self::key(section, key)).unwrap_or(default)
    }

    /// Deserializes and validates one section; an absent section falls back
    /// to its defaults.
    pub fn section<T: ConfigSection>(&self) -> Result<T, EvoError> {
        let section = match self.inner.get::<T>(T::section_name()) {
            Ok(section) => section,
            Err(ConfigError::NotFound(_)) => {
                debug!("config section [{}] absent, using defaults", T::section_name());
                T::default()
            }
            Err(e) => {
                return Err(EvoError::ConfigParse(format!("[{}]: {}", T::section_name(), e)));
            }
        };
        section.validate()?;
        Ok(section)
    }
}
