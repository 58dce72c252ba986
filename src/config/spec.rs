//! Option declarations.
//!
//! An [`OptionSpec`] names one configuration value by `(section, name)` and
//! says how to resolve it: the default to fall back on, whether it must be
//! supplied, and the validator that checks (and normalizes) whatever value
//! wins precedence.

use std::fmt;
use std::sync::Arc;

use toml::Value;

/// Checks a raw value and returns its normalized form.
///
/// Arguments and environment variables always arrive as strings, so
/// validators are expected to coerce (`"5432"` → `5432`).
pub type Validator = Arc<dyn Fn(&Value) -> Result<Value, String> + Send + Sync>;

/// A declared configuration option.
#[derive(Clone)]
pub struct OptionSpec {
    section: String,
    name: String,
    default: Option<Value>,
    required: bool,
    validator: Option<Validator>,
}

impl OptionSpec {
    /// Declare an option with no default. It is left out of the merged
    /// configuration when no source provides it.
    pub fn new(section: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            section: section.into(),
            name: name.into(),
            default: None,
            required: false,
            validator: None,
        }
    }

    /// Set the built-in default.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Resolution fails if no source provides this option.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Attach a validator.
    pub fn validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn section(&self) -> &str {
        &self.section
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Environment variable read for this option: `PULSE_<SECTION>_<NAME>`.
    pub fn env_var(&self) -> String {
        format!(
            "{}_{}_{}",
            super::ENV_PREFIX,
            self.section.to_uppercase(),
            self.name.to_uppercase()
        )
    }

    /// Run the validator, if any, over a candidate value.
    pub fn validate(&self, value: &Value) -> Result<Value, String> {
        match &self.validator {
            Some(validator) => validator(value),
            None => Ok(value.clone()),
        }
    }

    pub(crate) fn key(&self) -> (&str, &str) {
        (&self.section, &self.name)
    }
}

impl fmt::Debug for OptionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptionSpec")
            .field("section", &self.section)
            .field("name", &self.name)
            .field("default", &self.default)
            .field("required", &self.required)
            .field("validator", &self.validator.is_some())
            .finish()
    }
}
