//! Filter Compiler: caller-supplied conference filters to a validated query plan.
//!
//! Callers send filters as loosely typed triples of aliases, for example
//! `("MONTH", "GT", "3")`. [`compile`] resolves each alias through a fixed
//! table, coerces numeric values and enforces the store's query restrictions:
//!
//! - at most one distinct field may carry an inequality operator
//!   (anything other than `EQ`)
//! - when an inequality exists, results sort by that field first, then by name;
//!   otherwise by name alone
//!
//! ```
//! use conference_core::filter::{compile, RawFilter};
//!
//! let plan = compile(&[
//!     RawFilter::new("MONTH", "GT", "3"),
//!     RawFilter::new("CITY", "EQ", "Boston"),
//! ])
//! .unwrap();
//!
//! assert_eq!(plan.order(), ["month", "name"]);
//! ```

use crate::entity::PropertyValue;
use crate::error::{ConferenceError, Result};
use crate::key::Kind;
use crate::store::{Operator, Predicate, Query};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Message returned when filters restrict more than one field by range.
pub const MULTIPLE_INEQUALITY_FIELDS: &str = "Inequality filter is allowed on only one field";

/// Conference properties callers may filter on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FilterField {
    /// `CITY` → `city`
    City,
    /// `TOPIC` → `topics`
    Topic,
    /// `MONTH` → `month`
    Month,
    /// `MAX_ATTENDEES` → `maxAttendees`
    MaxAttendees,
}

impl FilterField {
    /// Every filterable field.
    pub const ALL: [Self; 4] = [Self::City, Self::Topic, Self::Month, Self::MaxAttendees];

    /// Resolve a caller alias.
    #[must_use]
    pub fn from_alias(alias: &str) -> Option<Self> {
        match alias {
            "CITY" => Some(Self::City),
            "TOPIC" => Some(Self::Topic),
            "MONTH" => Some(Self::Month),
            "MAX_ATTENDEES" => Some(Self::MaxAttendees),
            _ => None,
        }
    }

    /// Alias callers use.
    #[must_use]
    pub const fn alias(self) -> &'static str {
        match self {
            Self::City => "CITY",
            Self::Topic => "TOPIC",
            Self::Month => "MONTH",
            Self::MaxAttendees => "MAX_ATTENDEES",
        }
    }

    /// Stored property name.
    #[must_use]
    pub const fn property(self) -> &'static str {
        match self {
            Self::City => "city",
            Self::Topic => "topics",
            Self::Month => "month",
            Self::MaxAttendees => "maxAttendees",
        }
    }

    /// Numeric fields take integer values.
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::Month | Self::MaxAttendees)
    }

    fn coerce(self, value: &str) -> Result<PropertyValue> {
        if !self.is_numeric() {
            return Ok(PropertyValue::text(value));
        }
        value.trim().parse::<i64>().map(PropertyValue::Int).map_err(|_| {
            ConferenceError::BadRequest(format!(
                "Filter value for {} must be an integer, got {value:?}",
                self.alias()
            ))
        })
    }
}

impl fmt::Display for FilterField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.alias())
    }
}

/// Resolve an operator alias (`EQ`, `GT`, `GTEQ`, `LT`, `LTEQ`, `NE`).
#[must_use]
pub fn operator_from_alias(alias: &str) -> Option<Operator> {
    match alias {
        "EQ" => Some(Operator::Eq),
        "GT" => Some(Operator::Gt),
        "GTEQ" => Some(Operator::Gte),
        "LT" => Some(Operator::Lt),
        "LTEQ" => Some(Operator::Lte),
        "NE" => Some(Operator::Ne),
        _ => None,
    }
}

/// A filter exactly as a caller sent it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFilter {
    /// Field alias, e.g. `"CITY"`.
    pub field: String,
    /// Operator alias, e.g. `"EQ"`.
    pub operator: String,
    /// Value, coerced according to the field.
    pub value: String,
}

impl RawFilter {
    /// Build a raw filter.
    #[must_use]
    pub fn new(field: impl Into<String>, operator: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operator: operator.into(),
            value: value.into(),
        }
    }
}

/// Validated conjunction of predicates plus the sort order they require.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryPlan {
    predicates: Vec<Predicate>,
    order: Vec<&'static str>,
    inequality: Option<FilterField>,
}

impl QueryPlan {
    /// Predicates in the order the caller gave them.
    #[must_use]
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Sort keys (property names), most significant first.
    #[must_use]
    pub fn order(&self) -> &[&'static str] {
        &self.order
    }

    /// The single field restricted by an inequality, if any.
    #[must_use]
    pub const fn inequality_field(&self) -> Option<FilterField> {
        self.inequality
    }

    /// Store query over conferences.
    #[must_use]
    pub fn into_query(self) -> Query {
        let mut query = Query::kind(Kind::Conference);
        query.predicates = self.predicates;
        for property in self.order {
            query = query.order_by(property);
        }
        query
    }
}

/// Compile raw filters into a query plan.
///
/// # Errors
///
/// Returns [`ConferenceError::BadRequest`] when a field or operator alias is
/// unknown, a numeric value does not parse, or inequalities touch more than
/// one field.
pub fn compile(filters: &[RawFilter]) -> Result<QueryPlan> {
    let mut predicates = Vec::with_capacity(filters.len());
    let mut inequality: Option<FilterField> = None;

    for filter in filters {
        let field = FilterField::from_alias(&filter.field).ok_or_else(|| {
            ConferenceError::BadRequest(format!("Filter contains invalid field: {}", filter.field))
        })?;
        let operator = operator_from_alias(&filter.operator).ok_or_else(|| {
            ConferenceError::BadRequest(format!(
                "Filter contains invalid operator: {}",
                filter.operator
            ))
        })?;

        if operator.is_inequality() {
            match inequality {
                Some(existing) if existing != field => {
                    return Err(ConferenceError::BadRequest(MULTIPLE_INEQUALITY_FIELDS.to_string()));
                }
                _ => inequality = Some(field),
            }
        }

        predicates.push(Predicate::new(field.property(), operator, field.coerce(&filter.value)?));
    }

    let order = match inequality {
        Some(field) => vec![field.property(), "name"],
        None => vec!["name"],
    };

    Ok(QueryPlan {
        predicates,
        order,
        inequality,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::error::ErrorKind;
    use proptest::prelude::*;

    #[test]
    fn inequality_field_leads_the_sort_order() {
        let plan = compile(&[
            RawFilter::new("MONTH", "GT", "3"),
            RawFilter::new("CITY", "EQ", "Boston"),
        ])
        .unwrap();

        assert_eq!(plan.order(), ["month", "name"]);
        assert_eq!(plan.inequality_field(), Some(FilterField::Month));
        assert_eq!(
            plan.predicates(),
            [
                Predicate::new("month", Operator::Gt, PropertyValue::Int(3)),
                Predicate::eq("city", PropertyValue::text("Boston")),
            ]
        );
    }

    #[test]
    fn two_inequality_fields_are_rejected() {
        let error = compile(&[
            RawFilter::new("MONTH", "GT", "3"),
            RawFilter::new("MAX_ATTENDEES", "LT", "50"),
        ])
        .unwrap_err();

        assert_eq!(error.kind(), ErrorKind::BadRequest);
        assert!(error.to_string().contains(MULTIPLE_INEQUALITY_FIELDS));
    }

    #[test]
    fn range_on_one_field_is_allowed() {
        let plan = compile(&[
            RawFilter::new("MAX_ATTENDEES", "GTEQ", "10"),
            RawFilter::new("MAX_ATTENDEES", "LT", "50"),
        ])
        .unwrap();
        assert_eq!(plan.order(), ["maxAttendees", "name"]);
    }

    #[test]
    fn not_equal_counts_as_inequality() {
        let error = compile(&[
            RawFilter::new("CITY", "NE", "Paris"),
            RawFilter::new("MONTH", "LTEQ", "6"),
        ])
        .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::BadRequest);
    }

    #[test]
    fn equality_only_sorts_by_name() {
        let plan = compile(&[RawFilter::new("TOPIC", "EQ", "Rust")]).unwrap();
        assert_eq!(plan.order(), ["name"]);
        assert_eq!(plan.inequality_field(), None);

        let query = plan.into_query();
        assert_eq!(query.kind, Kind::Conference);
        assert_eq!(query.predicates[0].property, "topics");
    }

    #[test]
    fn unknown_aliases_and_bad_numbers_are_rejected() {
        for filters in [
            vec![RawFilter::new("COUNTRY", "EQ", "US")],
            vec![RawFilter::new("CITY", "LIKE", "B%")],
            vec![RawFilter::new("MONTH", "EQ", "June")],
        ] {
            assert_eq!(compile(&filters).unwrap_err().kind(), ErrorKind::BadRequest);
        }
    }

    fn raw_filter() -> impl Strategy<Value = RawFilter> {
        let field = prop::sample::select(FilterField::ALL.to_vec());
        let operator = prop::sample::select(vec!["EQ", "GT", "GTEQ", "LT", "LTEQ", "NE"]);
        (field, operator, 0i64..100).prop_map(|(field, operator, n)| {
            RawFilter::new(field.alias(), operator, n.to_string())
        })
    }

    proptest! {
        #[test]
        fn compiled_plans_respect_store_restrictions(filters in prop::collection::vec(raw_filter(), 0..6)) {
            let inequality_fields: std::collections::HashSet<&str> = filters
                .iter()
                .filter(|f| f.operator != "EQ")
                .map(|f| f.field.as_str())
                .collect();

            match compile(&filters) {
                Ok(plan) => {
                    prop_assert!(inequality_fields.len() <= 1);
                    prop_assert_eq!(plan.predicates().len(), filters.len());
                    prop_assert_eq!(plan.order().last().copied(), Some("name"));
                    if let Some(field) = plan.inequality_field() {
                        prop_assert_eq!(plan.order()[0], field.property());
                        prop_assert!(plan
                            .predicates()
                            .iter()
                            .filter(|p| p.operator.is_inequality())
                            .all(|p| p.property == field.property()));
                    } else {
                        prop_assert_eq!(plan.order().len(), 1);
                    }
                }
                Err(error) => {
                    prop_assert!(inequality_fields.len() > 1);
                    prop_assert_eq!(error.kind(), ErrorKind::BadRequest);
                }
            }
        }
    }
}
