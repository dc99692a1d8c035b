//! # Typed Metadata Binder
//!
//! Declarative binding of trigger metadata into typed records. Each field is
//! described once (name, source order, optionality, default) and parsed in
//! one pass, replacing the per-scaler `if present then parse else default`
//! chains that used to drift apart. The binder performs no I/O.
//!
//! ```ignore
//! let queue_length: i64 = config
//!     .param("queueLength")
//!     .default("10")
//!     .get()?;
//! let host: String = config
//!     .param("host")
//!     .from(&[ParamSource::AuthParams, ParamSource::TriggerMetadata])
//!     .get()?;
//! ```

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::scaler::config::ScalerConfig;
use crate::scaler::error::ScalerError;

/// Where a field value may come from, in declared precedence order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamSource {
    /// Secret-derived auth params
    AuthParams,
    /// Raw trigger metadata
    TriggerMetadata,
    /// `<name>FromEnv` indirection into the resolved environment
    ResolvedEnv,
}

/// Default source order for plain configuration fields
pub const DEFAULT_ORDER: &[ParamSource] = &[ParamSource::TriggerMetadata, ParamSource::ResolvedEnv];

/// Source order for credential fields: auth params override everything
pub const CREDENTIAL_ORDER: &[ParamSource] = &[
    ParamSource::AuthParams,
    ParamSource::TriggerMetadata,
    ParamSource::ResolvedEnv,
];

/// One field descriptor, built off a [`ScalerConfig`] and consumed by a
/// terminal `get*` call
#[derive(Debug)]
pub struct Param<'c> {
    config: &'c ScalerConfig,
    name: &'static str,
    order: &'static [ParamSource],
    default: Option<String>,
}

impl ScalerConfig {
    /// Start a field descriptor for `name` with the default source order
    #[must_use]
    pub fn param(&self, name: &'static str) -> Param<'_> {
        Param {
            config: self,
            name,
            order: DEFAULT_ORDER,
            default: None,
        }
    }
}

impl Param<'_> {
    /// Override the source precedence for this field
    #[must_use]
    pub fn from(mut self, order: &'static [ParamSource]) -> Self {
        self.order = order;
        self
    }

    /// Credential shorthand: auth params, then metadata, then env indirection
    #[must_use]
    pub fn credential(self) -> Self {
        self.from(CREDENTIAL_ORDER)
    }

    /// Value used when no source provides one; parsed by the target type
    #[must_use]
    pub fn default(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Walk the source order; first non-empty value wins. A declared env
    /// indirection whose variable is missing errors instead of falling
    /// through.
    fn resolve(&self) -> Result<Option<String>, ScalerError> {
        for source in self.order {
            let value = match source {
                ParamSource::AuthParams => self
                    .config
                    .auth_params
                    .get(self.name)
                    .filter(|v| !v.is_empty())
                    .cloned(),
                ParamSource::TriggerMetadata => self
                    .config
                    .trigger_metadata
                    .get(self.name)
                    .filter(|v| !v.is_empty())
                    .cloned(),
                ParamSource::ResolvedEnv => self.config.get_from_env_indirection(self.name)?,
            };
            if let Some(value) = value {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    /// Bind a required field (or one with a default)
    ///
    /// # Errors
    ///
    /// [`ScalerError::MissingRequiredField`] when absent with no default,
    /// [`ScalerError::BadValue`] when unparseable.
    pub fn get<T: ParamValue>(self) -> Result<T, ScalerError> {
        match self.resolve()? {
            Some(raw) => T::parse_param(self.name, &raw),
            None => match &self.default {
                Some(default) => T::parse_param(self.name, default),
                None => Err(ScalerError::missing_field(self.name)),
            },
        }
    }

    /// Bind an optional field; absence yields `None` unless a default is set
    ///
    /// # Errors
    ///
    /// [`ScalerError::BadValue`] when a present value is unparseable.
    pub fn get_opt<T: ParamValue>(self) -> Result<Option<T>, ScalerError> {
        match self.resolve()? {
            Some(raw) => T::parse_param(self.name, &raw).map(Some),
            None => match &self.default {
                Some(default) => T::parse_param(self.name, default).map(Some),
                None => Ok(None),
            },
        }
    }

    /// Bind an enumerated field: case-insensitive match against a closed set,
    /// returning the canonical spelling from `allowed`
    ///
    /// # Errors
    ///
    /// [`ScalerError::BadValue`] for values outside the set,
    /// [`ScalerError::MissingRequiredField`] when absent with no default.
    pub fn one_of(self, allowed: &[&'static str]) -> Result<&'static str, ScalerError> {
        let name = self.name;
        let raw: String = self.get()?;
        allowed
            .iter()
            .find(|candidate| candidate.eq_ignore_ascii_case(&raw))
            .copied()
            .ok_or_else(|| {
                ScalerError::bad_value(
                    name,
                    format!("must be one of [{}], got {raw:?}", allowed.join(", ")),
                )
            })
    }

    /// Bind a duration field. Accepts `<number><unit>` with unit one of
    /// ns/us/ms/s/m/h; when `bare_seconds` is set, a bare number is read as
    /// seconds.
    ///
    /// # Errors
    ///
    /// [`ScalerError::BadValue`] for malformed strings,
    /// [`ScalerError::MissingRequiredField`] when absent with no default.
    pub fn get_duration(self, bare_seconds: bool) -> Result<Duration, ScalerError> {
        let name = self.name;
        let raw: String = self.get()?;
        parse_duration(name, &raw, bare_seconds)
    }
}

/// A type the binder can parse a field into
pub trait ParamValue: Sized {
    /// Parse `raw` as the target type; `name` feeds the error message
    ///
    /// # Errors
    ///
    /// Returns [`ScalerError::BadValue`] naming the field on parse failure.
    fn parse_param(name: &str, raw: &str) -> Result<Self, ScalerError>;
}

impl ParamValue for String {
    fn parse_param(_name: &str, raw: &str) -> Result<Self, ScalerError> {
        Ok(raw.to_owned())
    }
}

impl ParamValue for i64 {
    fn parse_param(name: &str, raw: &str) -> Result<Self, ScalerError> {
        raw.trim()
            .parse()
            .map_err(|_| ScalerError::bad_value(name, format!("{raw:?} is not a valid integer")))
    }
}

impl ParamValue for u64 {
    fn parse_param(name: &str, raw: &str) -> Result<Self, ScalerError> {
        raw.trim().parse().map_err(|_| {
            ScalerError::bad_value(name, format!("{raw:?} is not a valid unsigned integer"))
        })
    }
}

impl ParamValue for f64 {
    fn parse_param(name: &str, raw: &str) -> Result<Self, ScalerError> {
        let value: Self = raw
            .trim()
            .parse()
            .map_err(|_| ScalerError::bad_value(name, format!("{raw:?} is not a valid number")))?;
        if !value.is_finite() {
            return Err(ScalerError::bad_value(name, "must be a finite number"));
        }
        Ok(value)
    }
}

impl ParamValue for bool {
    fn parse_param(name: &str, raw: &str) -> Result<Self, ScalerError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ScalerError::bad_value(
                name,
                format!("{raw:?} is not a valid boolean (true/false/1/0/yes/no)"),
            )),
        }
    }
}

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<number>\d+)(?P<unit>ns|us|ms|s|m|h)$").expect("duration regex is valid")
});

/// Parse a duration string: `<number><unit>` with unit ns/us/ms/s/m/h, or a
/// bare number as seconds when the field documents so
///
/// # Errors
///
/// Returns [`ScalerError::BadValue`] naming the field on parse failure.
pub fn parse_duration(name: &str, raw: &str, bare_seconds: bool) -> Result<Duration, ScalerError> {
    let trimmed = raw.trim().to_lowercase();
    if trimmed.is_empty() {
        return Err(ScalerError::bad_value(name, "duration cannot be empty"));
    }

    if let Some(captures) = DURATION_RE.captures(&trimmed) {
        let number: u64 = captures["number"]
            .parse()
            .map_err(|_| ScalerError::bad_value(name, format!("{raw:?} overflows a duration")))?;
        let duration = match &captures["unit"] {
            "ns" => Duration::from_nanos(number),
            "us" => Duration::from_micros(number),
            "ms" => Duration::from_millis(number),
            "s" => Duration::from_secs(number),
            "m" => Duration::from_secs(number.saturating_mul(60)),
            "h" => Duration::from_secs(number.saturating_mul(3600)),
            _ => unreachable!("regex restricts the unit set"),
        };
        return Ok(duration);
    }

    if bare_seconds {
        if let Ok(number) = trimmed.parse::<u64>() {
            return Ok(Duration::from_secs(number));
        }
    }

    Err(ScalerError::bad_value(
        name,
        format!("{raw:?} is not a valid duration (expected <number><unit> with unit ns/us/ms/s/m/h)"),
    ))
}

/// A typed metadata record bound from a [`ScalerConfig`]
pub trait TriggerMetadataRecord: Sized {
    /// Bind every field via the declarative descriptors
    ///
    /// # Errors
    ///
    /// Returns the first binding error encountered.
    fn bind(config: &ScalerConfig) -> Result<Self, ScalerError>;

    /// Inter-field validation run after binding; rejects contradictory
    /// combinations the per-field parsers cannot see
    ///
    /// # Errors
    ///
    /// Returns [`ScalerError::ConflictingConfig`] or [`ScalerError::BadValue`].
    fn validate(&self) -> Result<(), ScalerError> {
        Ok(())
    }

    /// Bind and validate in one step; the factory calls this
    ///
    /// # Errors
    ///
    /// Propagates binding and validation errors.
    fn bind_validated(config: &ScalerConfig) -> Result<Self, ScalerError> {
        let record = Self::bind(config)?;
        record.validate()?;
        Ok(record)
    }
}
