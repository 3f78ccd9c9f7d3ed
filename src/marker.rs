//! Dated markers and ordered slip histories

use tracing::warn;

use crate::pdf::DiscretePdf;
use crate::units::{self, Unit, VariableType};
use crate::{Result, SlipRateError};

/// A displacement observation paired with its age
#[derive(Debug, Clone, PartialEq)]
pub struct DatedMarker {
    name: String,
    age: DiscretePdf,
    displacement: DiscretePdf,
}

fn claim(pdf: DiscretePdf, expected: VariableType) -> Result<DiscretePdf> {
    match pdf.variable_type() {
        VariableType::Other => {
            let unit = pdf.unit();
            pdf.tagged(expected, unit)
        }
        t if t == expected => Ok(pdf),
        t => Err(SlipRateError::IncompatibleUnits {
            operation: "dated marker",
            left: t.to_string(),
            right: expected.to_string(),
        }),
    }
}

impl DatedMarker {
    /// Pair an age PDF with a displacement PDF.
    ///
    /// Untyped PDFs are tagged as age and displacement; a PDF already tagged
    /// as something else, or carrying a unit of the wrong dimension, is
    /// rejected with `IncompatibleUnits`.
    pub fn new(name: impl Into<String>, age: DiscretePdf, displacement: DiscretePdf) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            age: claim(age, VariableType::Age)?,
            displacement: claim(displacement, VariableType::Displacement)?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn age(&self) -> &DiscretePdf {
        &self.age
    }

    pub fn displacement(&self) -> &DiscretePdf {
        &self.displacement
    }

    /// Express age and displacement in the given units, where requested.
    pub fn convert_units(&self, age_unit: Option<Unit>, displacement_unit: Option<Unit>) -> Result<Self> {
        let age = match age_unit {
            Some(u) => self.age.convert_unit(u)?,
            None => self.age.clone(),
        };
        let displacement = match displacement_unit {
            Some(u) => self.displacement.convert_unit(u)?,
            None => self.displacement.clone(),
        };
        Ok(Self {
            name: self.name.clone(),
            age,
            displacement,
        })
    }
}

/// Markers of one slip history, youngest first.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerSequence {
    markers: Vec<DatedMarker>,
}

impl MarkerSequence {
    /// # Errors
    /// * `InvalidConfig` for an empty sequence
    /// * `IncompatibleUnits` if ages or displacements disagree on units
    pub fn new(markers: Vec<DatedMarker>) -> Result<Self> {
        let Some(first) = markers.first() else {
            return Err(SlipRateError::InvalidConfig(
                "a marker sequence needs at least one marker".to_string(),
            ));
        };
        let mut age = (VariableType::Age, first.age.unit());
        let mut disp = (VariableType::Displacement, first.displacement.unit());
        for m in &markers[1..] {
            age = units::same_quantity("marker ages", age, (VariableType::Age, m.age.unit()))?;
            disp = units::same_quantity(
                "marker displacements",
                disp,
                (VariableType::Displacement, m.displacement.unit()),
            )?;
        }
        Ok(Self { markers })
    }

    pub fn markers(&self) -> &[DatedMarker] {
        &self.markers
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Number of closed intervals between consecutive markers.
    pub fn interval_count(&self) -> usize {
        self.markers.len().saturating_sub(1)
    }

    /// Consecutive `(younger, older)` marker pairs.
    pub fn intervals(&self) -> impl Iterator<Item = (&DatedMarker, &DatedMarker)> + '_ {
        self.markers.windows(2).map(|w| (&w[0], &w[1]))
    }

    /// Interval labels, `"<older>-<younger>"`.
    pub fn interval_names(&self) -> Vec<String> {
        self.intervals()
            .map(|(younger, older)| format!("{}-{}", older.name, younger.name))
            .collect()
    }

    pub fn age_unit(&self) -> Option<Unit> {
        self.markers.iter().find_map(|m| m.age.unit())
    }

    pub fn displacement_unit(&self) -> Option<Unit> {
        self.markers.iter().find_map(|m| m.displacement.unit())
    }

    /// Intervals whose older marker has a smaller mean age or displacement
    /// than the younger one. Each is logged as a warning.
    pub fn check_order(&self) -> Vec<String> {
        let mut suspicious = Vec::new();
        for ((younger, older), name) in self.intervals().zip(self.interval_names()) {
            let age_reversed = older.age.mean() < younger.age.mean();
            let disp_reversed = older.displacement.mean() < younger.displacement.mean();
            if age_reversed || disp_reversed {
                warn!(
                    interval = %name,
                    age_reversed,
                    disp_reversed,
                    "markers may be out of order; expected youngest first"
                );
                suspicious.push(name);
            }
        }
        suspicious
    }

    pub fn convert_units(&self, age_unit: Option<Unit>, displacement_unit: Option<Unit>) -> Result<Self> {
        let markers = self
            .markers
            .iter()
            .map(|m| m.convert_units(age_unit, displacement_unit))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { markers })
    }
}
