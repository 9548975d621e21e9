//! Row filters and the per-load influencers that enable them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::value::{Value, ValueType};

/// A named, parameterized filter definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterDef {
    /// Filter name.
    pub name: String,
    /// Parameter types by parameter name.
    #[serde(default)]
    pub parameters: BTreeMap<String, ValueType>,
}

impl FilterDef {
    /// Create a filter definition with no parameters.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: BTreeMap::new(),
        }
    }

    /// Declare a parameter.
    pub fn with_parameter(mut self, name: impl Into<String>, ty: ValueType) -> Self {
        self.parameters.insert(name.into(), ty);
        self
    }
}

/// A filter applied to an entity or collection, written against bare
/// column names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterMapping {
    /// Name of the filter definition.
    pub name: String,
    /// SQL condition, e.g. `tenant_id = :tenant`.
    pub condition: String,
}

impl FilterMapping {
    pub fn new(name: impl Into<String>, condition: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            condition: condition.into(),
        }
    }
}

/// Value supplied for a filter parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    /// Binds to one placeholder.
    Single(Value),
    /// Binds to one placeholder per element.
    List(Vec<Value>),
}

impl FilterValue {
    /// Values in binding order.
    pub fn values(&self) -> &[Value] {
        match self {
            FilterValue::Single(value) => std::slice::from_ref(value),
            FilterValue::List(values) => values,
        }
    }
}

impl From<Value> for FilterValue {
    fn from(value: Value) -> Self {
        FilterValue::Single(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::Single(Value::Int(value))
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Single(Value::from(value))
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Single(Value::Text(value))
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        FilterValue::Single(Value::Bool(value))
    }
}

/// A filter enabled for one load with its parameter values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnabledFilter {
    definition: FilterDef,
    values: BTreeMap<String, FilterValue>,
}

impl EnabledFilter {
    /// Enable a filter definition.
    pub fn new(definition: FilterDef) -> Self {
        Self {
            definition,
            values: BTreeMap::new(),
        }
    }

    /// Set a parameter value.
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Set a list-valued parameter.
    pub fn with_parameter_list(mut self, name: impl Into<String>, values: Vec<Value>) -> Self {
        self.values.insert(name.into(), FilterValue::List(values));
        self
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &FilterDef {
        &self.definition
    }

    /// Value and declared type of a parameter.
    pub fn parameter(&self, name: &str) -> Option<(&FilterValue, &ValueType)> {
        let ty = self.definition.parameters.get(name)?;
        Some((self.values.get(name)?, ty))
    }

    /// Check that every declared parameter has a value and no undeclared
    /// parameter was set.
    pub fn validate(&self) -> Result<()> {
        for name in self.definition.parameters.keys() {
            if !self.values.contains_key(name) {
                return Err(Error::illegal_argument(format!(
                    "filter [{}] parameter [{name}] value not set",
                    self.definition.name
                )));
            }
        }
        for name in self.values.keys() {
            if !self.definition.parameters.contains_key(name) {
                return Err(Error::illegal_argument(format!(
                    "undefined filter parameter [{}.{name}]",
                    self.definition.name
                )));
            }
        }
        Ok(())
    }
}

/// Per-load settings that influence generated SQL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadQueryInfluencers {
    enabled_filters: BTreeMap<String, EnabledFilter>,
}

impl LoadQueryInfluencers {
    /// No filters enabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable a filter.
    pub fn with_filter(mut self, filter: EnabledFilter) -> Self {
        self.enabled_filters.insert(filter.name().to_string(), filter);
        self
    }

    /// Enable a filter in place.
    pub fn enable_filter(&mut self, filter: EnabledFilter) {
        self.enabled_filters.insert(filter.name().to_string(), filter);
    }

    pub fn disable_filter(&mut self, name: &str) {
        self.enabled_filters.remove(name);
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled_filters.contains_key(name)
    }

    pub fn has_enabled_filters(&self) -> bool {
        !self.enabled_filters.is_empty()
    }

    pub fn enabled_filters(&self) -> impl Iterator<Item = &EnabledFilter> {
        self.enabled_filters.values()
    }

    /// Resolve a `filter.param` reference to its value and type.
    pub fn filter_parameter(&self, qualified: &str) -> Result<(&FilterValue, &ValueType)> {
        let (filter, param) = qualified.split_once('.').ok_or_else(|| {
            Error::illegal_argument(format!("malformed filter parameter reference [{qualified}]"))
        })?;
        let enabled = self.enabled_filters.get(filter).ok_or_else(|| {
            Error::illegal_argument(format!("filter [{filter}] is not enabled"))
        })?;
        enabled.parameter(param).ok_or_else(|| {
            Error::illegal_argument(format!("filter parameter [{qualified}] value not set"))
        })
    }

    /// Validate every enabled filter.
    pub fn validate(&self) -> Result<()> {
        self.enabled_filters.values().try_for_each(EnabledFilter::validate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant_filter() -> FilterDef {
        FilterDef::new("tenant").with_parameter("tenantId", ValueType::Long)
    }

    #[test]
    fn test_filter_parameter_lookup() {
        let influencers = LoadQueryInfluencers::new()
            .with_filter(EnabledFilter::new(tenant_filter()).with_parameter("tenantId", 7i64));
        assert!(influencers.is_enabled("tenant"));
        let (value, ty) = influencers.filter_parameter("tenant.tenantId").unwrap();
        assert_eq!(value.values(), &[Value::Int(7)]);
        assert_eq!(ty, &ValueType::Long);
        assert!(influencers.filter_parameter("tenant.other").is_err());
        assert!(influencers.filter_parameter("missing.x").is_err());
    }

    #[test]
    fn test_validate_missing_parameter() {
        let influencers = LoadQueryInfluencers::new().with_filter(EnabledFilter::new(tenant_filter()));
        assert!(matches!(influencers.validate(), Err(Error::IllegalArgument(_))));
    }

    #[test]
    fn test_list_parameter() {
        let filter = EnabledFilter::new(FilterDef::new("status").with_parameter("codes", ValueType::String))
            .with_parameter_list("codes", vec![Value::from("a"), Value::from("b")]);
        let (value, _) = filter.parameter("codes").unwrap();
        assert_eq!(value.values().len(), 2);
        filter.validate().unwrap();
    }
}
