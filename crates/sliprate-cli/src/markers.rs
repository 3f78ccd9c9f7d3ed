//! Marker-set files
//!
//! One TOML table per marker, youngest first:
//!
//! ```toml
//! [T1]
//! "age file" = "t1_age.txt"
//! "displacement file" = "t1_disp.txt"
//! "age unit" = "ky"
//! "displacement unit" = "m"
//! ```
//!
//! Relative paths resolve against the marker file's directory. Units given
//! in a PDF file take precedence over the units given here.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use sliprate::{DatedMarker, DiscretePdf, MarkerSequence, Unit, VariableType};

use crate::io::read_pdf;

#[derive(Debug, Clone, Deserialize)]
struct MarkerEntry {
    #[serde(rename = "age file")]
    age_file: PathBuf,
    #[serde(rename = "displacement file")]
    displacement_file: PathBuf,
    #[serde(rename = "age unit", default)]
    age_unit: Option<Unit>,
    #[serde(rename = "displacement unit", default)]
    displacement_unit: Option<Unit>,
}

fn load_component(
    base: &Path,
    file: &Path,
    variable_type: VariableType,
    fallback_unit: Option<Unit>,
) -> Result<DiscretePdf> {
    let path = base.join(file);
    let pdf = read_pdf(&path)?;
    let declared = pdf.variable_type();
    if declared != VariableType::Other && declared != variable_type {
        bail!(
            "{} is listed as the {variable_type} file but declares variable_type {declared}",
            path.display()
        );
    }
    let unit = pdf.unit().or(fallback_unit);
    pdf.tagged(variable_type, unit).with_context(|| {
        format!("{} in {} has a conflicting type or unit", variable_type, path.display())
    })
}

pub fn load_markers(path: &Path) -> Result<MarkerSequence> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read marker file: {}", path.display()))?;
    let table: toml::Table = toml::from_str(&raw)
        .with_context(|| format!("failed to parse TOML marker file: {}", path.display()))?;
    if table.is_empty() {
        bail!("marker file {} lists no markers", path.display());
    }
    let base = path.parent().unwrap_or_else(|| Path::new("."));

    let mut markers = Vec::with_capacity(table.len());
    for (name, value) in table {
        let entry: MarkerEntry = value
            .try_into()
            .with_context(|| format!("marker [{name}] in {}", path.display()))?;
        let age = load_component(base, &entry.age_file, VariableType::Age, entry.age_unit)?;
        let displacement = load_component(
            base,
            &entry.displacement_file,
            VariableType::Displacement,
            entry.displacement_unit,
        )?;
        markers.push(DatedMarker::new(name, age, displacement)?);
    }
    Ok(MarkerSequence::new(markers)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::write_pdf;
    use sliprate::parametric::gaussian;
    use tempfile::tempdir;

    fn write_gaussian(dir: &Path, file: &str, mean: f64, sd: f64) {
        let pdf = gaussian(mean, sd, 0.1).unwrap();
        write_pdf(&dir.join(file), &pdf).unwrap();
    }

    #[test]
    fn test_markers_keep_file_order() {
        let dir = tempdir().unwrap();
        write_gaussian(dir.path(), "z_age.txt", 2.0, 0.5);
        write_gaussian(dir.path(), "z_disp.txt", 5.0, 1.0);
        write_gaussian(dir.path(), "a_age.txt", 6.0, 0.5);
        write_gaussian(dir.path(), "a_disp.txt", 25.0, 1.0);
        let toml_path = dir.path().join("markers.toml");
        fs::write(
            &toml_path,
            r#"
[Z]
"age file" = "z_age.txt"
"displacement file" = "z_disp.txt"
"age unit" = "ky"
"displacement unit" = "m"

[A]
"age file" = "a_age.txt"
"displacement file" = "a_disp.txt"
"age unit" = "ky"
"displacement unit" = "m"
"#,
        )
        .unwrap();

        let seq = load_markers(&toml_path).unwrap();
        assert_eq!(seq.interval_names(), vec!["A-Z"]);
        assert_eq!(seq.age_unit(), Some(Unit::KILOYEARS));
        assert_eq!(seq.markers()[0].displacement().variable_type(), VariableType::Displacement);
    }

    #[test]
    fn test_file_unit_wins() {
        let dir = tempdir().unwrap();
        let age = gaussian(2.0, 0.5, 0.1)
            .unwrap()
            .tagged(VariableType::Age, Some(Unit::YEARS))
            .unwrap();
        write_pdf(&dir.path().join("age.txt"), &age).unwrap();
        write_gaussian(dir.path(), "disp.txt", 5.0, 1.0);
        let toml_path = dir.path().join("markers.toml");
        fs::write(
            &toml_path,
            "[T]\n\"age file\" = \"age.txt\"\n\"displacement file\" = \"disp.txt\"\n\"age unit\" = \"ky\"\n",
        )
        .unwrap();
        let seq = load_markers(&toml_path).unwrap();
        assert_eq!(seq.age_unit(), Some(Unit::YEARS));
        assert_eq!(seq.displacement_unit(), None);
    }

    #[test]
    fn test_declared_type_must_match_role() {
        let dir = tempdir().unwrap();
        let disp = gaussian(5.0, 1.0, 0.1)
            .unwrap()
            .tagged(VariableType::Displacement, None)
            .unwrap();
        write_pdf(&dir.path().join("disp.txt"), &disp).unwrap();
        write_gaussian(dir.path(), "plain.txt", 5.0, 1.0);
        let toml_path = dir.path().join("markers.toml");

        fs::write(
            &toml_path,
            "[T]\n\"age file\" = \"disp.txt\"\n\"displacement file\" = \"plain.txt\"\n",
        )
        .unwrap();
        let err = load_markers(&toml_path).unwrap_err();
        assert!(err.to_string().contains("declares variable_type displacement"));

        fs::write(
            &toml_path,
            "[T]\n\"age file\" = \"plain.txt\"\n\"displacement file\" = \"disp.txt\"\n",
        )
        .unwrap();
        let seq = load_markers(&toml_path).unwrap();
        assert_eq!(seq.markers()[0].age().variable_type(), VariableType::Age);
    }

    #[test]
    fn test_missing_keys_and_files() {
        let dir = tempdir().unwrap();
        let toml_path = dir.path().join("markers.toml");
        fs::write(&toml_path, "[T]\n\"age file\" = \"age.txt\"\n").unwrap();
        assert!(load_markers(&toml_path).is_err());
        fs::write(
            &toml_path,
            "[T]\n\"age file\" = \"nope.txt\"\n\"displacement file\" = \"nope.txt\"\n",
        )
        .unwrap();
        assert!(load_markers(&toml_path).is_err());
        fs::write(&toml_path, "").unwrap();
        assert!(load_markers(&toml_path).is_err());
    }
}
