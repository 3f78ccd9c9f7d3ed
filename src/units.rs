//! Variable types and physical units
//!
//! Both are closed sets so that mismatched operands are rejected before any
//! integral is evaluated. Unknown units are carried as `None` and never block
//! an operation on their own.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Result, SlipRateError};

/// Quantity sampled by a PDF
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VariableType {
    Age,
    Displacement,
    SlipRate,
    #[default]
    Other,
}

impl VariableType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariableType::Age => "age",
            VariableType::Displacement => "displacement",
            VariableType::SlipRate => "slip rate",
            VariableType::Other => "other",
        }
    }

    /// Whether `unit` has the dimension this quantity is measured in.
    pub fn admits(&self, unit: Unit) -> bool {
        matches!(
            (self, unit),
            (VariableType::Other, _)
                | (VariableType::Age, Unit::Time(_))
                | (VariableType::Displacement, Unit::Length(_))
                | (VariableType::SlipRate, Unit::Rate(_, _))
        )
    }
}

impl fmt::Display for VariableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VariableType {
    type Err = SlipRateError;

    fn from_str(s: &str) -> Result<Self> {
        let key: String = s
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .collect();
        match key.as_str() {
            "age" => Ok(VariableType::Age),
            "displacement" | "disp" | "offset" => Ok(VariableType::Displacement),
            "sliprate" | "rate" => Ok(VariableType::SlipRate),
            "other" | "" => Ok(VariableType::Other),
            _ => Err(SlipRateError::InvalidConfig(format!(
                "unknown variable type '{s}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    Years,
    Kiloyears,
    Megayears,
}

impl TimeUnit {
    fn in_years(self) -> f64 {
        match self {
            TimeUnit::Years => 1.0,
            TimeUnit::Kiloyears => 1.0e3,
            TimeUnit::Megayears => 1.0e6,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            TimeUnit::Years => "y",
            TimeUnit::Kiloyears => "ky",
            TimeUnit::Megayears => "My",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "y" | "yr" | "a" | "years" => Some(TimeUnit::Years),
            "ky" | "kyr" | "ka" | "kiloyears" => Some(TimeUnit::Kiloyears),
            "My" | "Myr" | "Ma" | "my" | "megayears" => Some(TimeUnit::Megayears),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LengthUnit {
    Millimeters,
    Meters,
    Kilometers,
}

impl LengthUnit {
    fn in_meters(self) -> f64 {
        match self {
            LengthUnit::Millimeters => 1.0e-3,
            LengthUnit::Meters => 1.0,
            LengthUnit::Kilometers => 1.0e3,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            LengthUnit::Millimeters => "mm",
            LengthUnit::Meters => "m",
            LengthUnit::Kilometers => "km",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "mm" => Some(LengthUnit::Millimeters),
            "m" => Some(LengthUnit::Meters),
            "km" => Some(LengthUnit::Kilometers),
            _ => None,
        }
    }
}

/// Physical unit of a PDF's values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Unit {
    Time(TimeUnit),
    Length(LengthUnit),
    /// Length per time, e.g. `mm/y`
    Rate(LengthUnit, TimeUnit),
}

impl Unit {
    pub const YEARS: Unit = Unit::Time(TimeUnit::Years);
    pub const KILOYEARS: Unit = Unit::Time(TimeUnit::Kiloyears);
    pub const MILLIMETERS: Unit = Unit::Length(LengthUnit::Millimeters);
    pub const METERS: Unit = Unit::Length(LengthUnit::Meters);

    /// Factor converting a value expressed in `self` into `target`.
    pub fn factor_to(self, target: Unit) -> Result<f64> {
        match (self, target) {
            (Unit::Time(from), Unit::Time(to)) => Ok(from.in_years() / to.in_years()),
            (Unit::Length(from), Unit::Length(to)) => Ok(from.in_meters() / to.in_meters()),
            (Unit::Rate(fl, ft), Unit::Rate(tl, tt)) => {
                Ok((fl.in_meters() / tl.in_meters()) / (ft.in_years() / tt.in_years()))
            }
            _ => Err(incompatible("unit conversion", Some(self), Some(target))),
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Time(t) => f.write_str(t.symbol()),
            Unit::Length(l) => f.write_str(l.symbol()),
            Unit::Rate(l, t) => write!(f, "{}/{}", l.symbol(), t.symbol()),
        }
    }
}

impl FromStr for Unit {
    type Err = SlipRateError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some((num, den)) = s.split_once('/') {
            if let (Some(l), Some(t)) = (LengthUnit::parse(num.trim()), TimeUnit::parse(den.trim())) {
                return Ok(Unit::Rate(l, t));
            }
        } else if let Some(t) = TimeUnit::parse(s) {
            return Ok(Unit::Time(t));
        } else if let Some(l) = LengthUnit::parse(s) {
            return Ok(Unit::Length(l));
        }
        Err(SlipRateError::InvalidConfig(format!("unknown unit '{s}'")))
    }
}

impl TryFrom<String> for Unit {
    type Error = SlipRateError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Unit> for String {
    fn from(unit: Unit) -> Self {
        unit.to_string()
    }
}

/// Variable type and unit of one operand.
pub type Quantity = (VariableType, Option<Unit>);

fn describe(unit: Option<Unit>) -> String {
    unit.map_or_else(|| "unspecified".to_string(), |u| u.to_string())
}

fn incompatible(operation: &'static str, left: Option<Unit>, right: Option<Unit>) -> SlipRateError {
    SlipRateError::IncompatibleUnits {
        operation,
        left: describe(left),
        right: describe(right),
    }
}

fn type_mismatch(operation: &'static str, left: VariableType, right: VariableType) -> SlipRateError {
    SlipRateError::IncompatibleUnits {
        operation,
        left: left.to_string(),
        right: right.to_string(),
    }
}

/// Operands describing the same kind of quantity: sums, differences,
/// mixtures and all similarity metrics.
pub fn same_quantity(operation: &'static str, left: Quantity, right: Quantity) -> Result<Quantity> {
    let variable_type = match (left.0, right.0) {
        (a, b) if a == b => a,
        (VariableType::Other, b) => b,
        (a, VariableType::Other) => a,
        (a, b) => return Err(type_mismatch(operation, a, b)),
    };
    let unit = match (left.1, right.1) {
        (Some(a), Some(b)) if a != b => return Err(incompatible(operation, Some(a), Some(b))),
        (a, b) => a.or(b),
    };
    Ok((variable_type, unit))
}

/// Quantity of `numerator / denominator`.
pub fn quotient(numerator: Quantity, denominator: Quantity) -> Result<Quantity> {
    const OP: &str = "division";
    let variable_type = match (numerator.0, denominator.0) {
        (VariableType::Displacement, VariableType::Age) => VariableType::SlipRate,
        (VariableType::Other, _) | (_, VariableType::Other) => VariableType::Other,
        (a, b) if a == b => VariableType::Other,
        (a, b) => return Err(type_mismatch(OP, a, b)),
    };
    let unit = match (numerator.1, denominator.1) {
        (Some(Unit::Length(l)), Some(Unit::Time(t))) => Some(Unit::Rate(l, t)),
        (Some(a), Some(b)) if a == b => None,
        (Some(a), Some(b)) => return Err(incompatible(OP, Some(a), Some(b))),
        _ => None,
    };
    Ok((variable_type, unit))
}

/// Quantity of `left * right`.
pub fn product(left: Quantity, right: Quantity) -> Result<Quantity> {
    const OP: &str = "multiplication";
    let variable_type = match (left.0, right.0) {
        (VariableType::SlipRate, VariableType::Age) | (VariableType::Age, VariableType::SlipRate) => {
            VariableType::Displacement
        }
        (VariableType::Other, _) | (_, VariableType::Other) => VariableType::Other,
        (a, b) => return Err(type_mismatch(OP, a, b)),
    };
    let unit = match (left.1, right.1) {
        (Some(Unit::Rate(l, rt)), Some(Unit::Time(t))) | (Some(Unit::Time(t)), Some(Unit::Rate(l, rt)))
            if rt == t =>
        {
            Some(Unit::Length(l))
        }
        (Some(a), Some(b)) => return Err(incompatible(OP, Some(a), Some(b))),
        _ => None,
    };
    Ok((variable_type, unit))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_round_trip_strings() {
        for s in ["y", "ky", "My", "mm", "m", "km", "mm/y", "m/ky"] {
            let unit: Unit = s.parse().unwrap();
            assert_eq!(unit.to_string(), s);
        }
        assert_eq!("ka".parse::<Unit>().unwrap(), Unit::KILOYEARS);
        assert!("furlong".parse::<Unit>().is_err());
    }

    #[test]
    fn test_conversion_factors() {
        assert!((Unit::KILOYEARS.factor_to(Unit::YEARS).unwrap() - 1000.0).abs() < 1e-12);
        assert!((Unit::METERS.factor_to(Unit::MILLIMETERS).unwrap() - 1000.0).abs() < 1e-12);
        // 1 m/ky is 1 mm/y
        let m_ky: Unit = "m/ky".parse().unwrap();
        let mm_y: Unit = "mm/y".parse().unwrap();
        assert!((m_ky.factor_to(mm_y).unwrap() - 1.0).abs() < 1e-12);
        assert!(Unit::YEARS.factor_to(Unit::METERS).is_err());
    }

    #[test]
    fn test_same_quantity_rejects_age_plus_displacement() {
        let age = (VariableType::Age, Some(Unit::KILOYEARS));
        let disp = (VariableType::Displacement, Some(Unit::METERS));
        assert!(matches!(
            same_quantity("addition", age, disp),
            Err(SlipRateError::IncompatibleUnits { .. })
        ));
        let other = (VariableType::Other, None);
        assert_eq!(same_quantity("addition", age, other).unwrap(), age);
    }

    #[test]
    fn test_quotient_gives_rate() {
        let disp = (VariableType::Displacement, Some(Unit::METERS));
        let age = (VariableType::Age, Some(Unit::KILOYEARS));
        let (t, u) = quotient(disp, age).unwrap();
        assert_eq!(t, VariableType::SlipRate);
        assert_eq!(u.unwrap().to_string(), "m/ky");
        assert!(quotient(age, disp).is_err());
    }

    #[test]
    fn test_product_recovers_displacement() {
        let rate = (VariableType::SlipRate, Some("mm/y".parse().unwrap()));
        let age = (VariableType::Age, Some(Unit::YEARS));
        let (t, u) = product(rate, age).unwrap();
        assert_eq!(t, VariableType::Displacement);
        assert_eq!(u, Some(Unit::MILLIMETERS));
    }
}
