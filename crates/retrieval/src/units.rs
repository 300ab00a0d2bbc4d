//! Conversion of measurements into the desired unit of an evaluation.

use crate::error::{Result, RetrieverError};
use crate::source::{TimeSeriesSource, UnitConversion};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use verify_common::MISSING_DOUBLE;

/// A pure conversion from a source unit into the desired unit.
pub type UnitConverter = Arc<dyn Fn(f64) -> f64 + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Conversion {
    initial_offset: f64,
    factor: f64,
    final_offset: f64,
}

impl Conversion {
    const IDENTITY: Conversion = Conversion {
        initial_offset: 0.0,
        factor: 1.0,
        final_offset: 0.0,
    };

    fn converter(self) -> UnitConverter {
        Arc::new(move |value: f64| {
            if !value.is_finite() {
                return MISSING_DOUBLE;
            }
            (value + self.initial_offset) * self.factor + self.final_offset
        })
    }
}

impl From<&UnitConversion> for Conversion {
    fn from(c: &UnitConversion) -> Self {
        Self {
            initial_offset: c.initial_offset,
            factor: c.factor,
            final_offset: c.final_offset,
        }
    }
}

/// Precomputed conversions from every known source unit into one desired unit.
///
/// Construction issues a single bulk query; lookups afterwards never touch
/// the source.
#[derive(Debug, Clone)]
pub struct UnitMapper {
    desired_unit: String,
    by_id: HashMap<i64, Conversion>,
    by_name: HashMap<String, Conversion>,
}

impl UnitMapper {
    pub fn new(source: &dyn TimeSeriesSource, desired_unit: impl Into<String>) -> Result<Self> {
        let desired_unit = desired_unit.into();
        let conversions = source.unit_conversions(&desired_unit)?;

        let mut by_id = HashMap::with_capacity(conversions.len());
        let mut by_name = HashMap::with_capacity(conversions.len());
        for conversion in &conversions {
            by_id.insert(conversion.from_unit_id, Conversion::from(conversion));
            by_name.insert(conversion.from_unit.clone(), Conversion::from(conversion));
        }

        debug!(
            desired_unit = %desired_unit,
            conversions = conversions.len(),
            "Built unit mapper"
        );

        Ok(Self {
            desired_unit,
            by_id,
            by_name,
        })
    }

    pub fn desired_unit(&self) -> &str {
        &self.desired_unit
    }

    /// Converter for a source unit identified by its storage id.
    pub fn unit_mapper_by_id(&self, id: i64) -> Result<UnitConverter> {
        self.by_id
            .get(&id)
            .map(|c| c.converter())
            .ok_or_else(|| {
                RetrieverError::no_such_unit_conversion(format!("unit id {id}"), &self.desired_unit)
            })
    }

    /// Converter for a source unit identified by name. The desired unit maps
    /// to the identity.
    pub fn unit_mapper_by_name(&self, name: &str) -> Result<UnitConverter> {
        if name == self.desired_unit {
            return Ok(Conversion::IDENTITY.converter());
        }
        self.by_name
            .get(name)
            .map(|c| c.converter())
            .ok_or_else(|| RetrieverError::no_such_unit_conversion(name, &self.desired_unit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{InMemoryData, InMemorySource};

    fn source() -> InMemorySource {
        InMemorySource::new(InMemoryData {
            series: vec![],
            unit_conversions: vec![
                UnitConversion {
                    from_unit_id: 7,
                    from_unit: "CFS".to_string(),
                    to_unit: "CMS".to_string(),
                    initial_offset: 0.0,
                    factor: 0.5,
                    final_offset: 0.0,
                },
                UnitConversion {
                    from_unit_id: 8,
                    from_unit: "F".to_string(),
                    to_unit: "CMS".to_string(),
                    initial_offset: -32.0,
                    factor: 2.0,
                    final_offset: 1.0,
                },
            ],
        })
    }

    #[test]
    fn test_construction_issues_one_query() {
        let source = source();
        let mapper = UnitMapper::new(&source, "CMS").unwrap();
        mapper.unit_mapper_by_name("CFS").unwrap();
        mapper.unit_mapper_by_id(8).unwrap();
        assert_eq!(source.stats().unit_queries, 1);
    }

    #[test]
    fn test_conversion_by_name_and_id() {
        let mapper = UnitMapper::new(&source(), "CMS").unwrap();
        assert_eq!(mapper.unit_mapper_by_name("CFS").unwrap()(10.0), 5.0);
        assert_eq!(mapper.unit_mapper_by_id(8).unwrap()(33.0), 3.0);
    }

    #[test]
    fn test_desired_unit_is_identity() {
        let mapper = UnitMapper::new(&source(), "CMS").unwrap();
        let identity = mapper.unit_mapper_by_name("CMS").unwrap();
        assert_eq!(identity(12.5), 12.5);
    }

    #[test]
    fn test_unknown_unit_fails() {
        let mapper = UnitMapper::new(&source(), "CMS").unwrap();
        assert!(matches!(
            mapper.unit_mapper_by_name("FURLONGS"),
            Err(RetrieverError::NoSuchUnitConversion { .. })
        ));
        assert!(mapper.unit_mapper_by_id(99).is_err());
    }

    #[test]
    fn test_non_finite_input_is_missing() {
        let mapper = UnitMapper::new(&source(), "CMS").unwrap();
        let convert = mapper.unit_mapper_by_name("CFS").unwrap();
        assert!(convert(f64::NAN).is_nan());
        assert!(convert(f64::INFINITY).is_nan());
        assert!(mapper.unit_mapper_by_name("CMS").unwrap()(f64::NEG_INFINITY).is_nan());
    }
}
