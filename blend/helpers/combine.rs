//! Fixed-weight linear blending: line `k` of the output is `sum_i w_i x_ik`. The
//! weights come either from the command line or from a plan written by
//! [`super::probe`].

use super::HelperError;
use crate::io::{self, PredictionFile};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Decimal digits kept in combined predictions.
pub const COMBINE_PRECISION: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WeightedInput {
    pub path: PathBuf,
    pub weight: f64,
}

impl FromStr for WeightedInput {
    type Err = String;

    /// Parses `PATH=WEIGHT`. The weight follows the last `=`.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let (path, weight) = text
            .rsplit_once('=')
            .ok_or_else(|| format!("expected PATH=WEIGHT, got '{text}'"))?;
        if path.is_empty() {
            return Err(format!("missing path in '{text}'"));
        }
        let weight = weight
            .trim()
            .parse()
            .map_err(|_| format!("'{weight}' is not a valid weight"))?;
        Ok(Self {
            path: PathBuf::from(path),
            weight,
        })
    }
}

/// A list of prediction files and their blending weights, stored as TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CombinePlan {
    pub inputs: Vec<WeightedInput>,
}

impl CombinePlan {
    pub fn from_toml_file(path: &Path) -> Result<Self, HelperError> {
        let text = fs::read_to_string(path).map_err(|source| HelperError::PlanRead {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| HelperError::PlanParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn write_toml_file(&self, path: &Path) -> Result<(), HelperError> {
        let text = toml::to_string_pretty(self)?;
        io::write_lines_atomically(path, |writer| writer.write_all(text.as_bytes()))
            .map_err(|source| HelperError::write(path, source))
    }
}

/// Combines the plan's inputs into `output` and returns the number of lines written.
///
/// Every input must have as many lines as the first one.
pub fn combine_files(plan: &CombinePlan, output: &Path) -> Result<usize, HelperError> {
    let Some((first, rest)) = plan.inputs.split_first() else {
        return Err(HelperError::NoInputs("weighted input"));
    };
    for input in &plan.inputs {
        if !input.weight.is_finite() {
            return Err(HelperError::NonFiniteWeight {
                path: input.path.clone(),
                weight: input.weight,
            });
        }
    }

    let mut combined = Array1::from(PredictionFile::open(&first.path)?.read_all()?) * first.weight;
    for input in rest {
        let file = PredictionFile::open(&input.path)?;
        let mut values = Array1::<f64>::zeros(combined.len());
        file.read_into(values.view_mut())?;
        combined.scaled_add(input.weight, &values);
        log::debug!("Added {} with weight {}", input.path.display(), input.weight);
    }

    io::write_predictions(output, combined.iter().copied(), COMBINE_PRECISION)
        .map_err(|source| HelperError::write(output, source))?;
    log::info!(
        "Combined {} prediction file(s) into {} ({} lines)",
        plan.inputs.len(),
        output.display(),
        combined.len()
    );
    Ok(combined.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::PredictionReadError;
    use tempfile::tempdir;

    #[test]
    fn parses_weighted_input_arguments() {
        let input: WeightedInput = "data/probe/svdpp=0.2.dta=0.35".parse().unwrap();
        assert_eq!(input.path, PathBuf::from("data/probe/svdpp=0.2.dta"));
        assert_eq!(input.weight, 0.35);

        assert!("no_weight.dta".parse::<WeightedInput>().is_err());
        assert!("=0.5".parse::<WeightedInput>().is_err());
        assert!("a.dta=heavy".parse::<WeightedInput>().is_err());
    }

    #[test]
    fn combines_with_weights_and_four_decimals() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.dta");
        let b = dir.path().join("b.dta");
        fs::write(&a, "3.0\n4.0\n1.5\n").unwrap();
        fs::write(&b, "2.0\n5.0\n1.0\n").unwrap();
        let plan = CombinePlan {
            inputs: vec![
                WeightedInput { path: a, weight: 0.6 },
                WeightedInput { path: b, weight: 0.4 },
            ],
        };
        let output = dir.path().join("combined.dta");
        assert_eq!(combine_files(&plan, &output).unwrap(), 3);
        assert_eq!(
            fs::read_to_string(&output).unwrap(),
            "2.6000\n4.4000\n1.3000\n"
        );
    }

    #[test]
    fn mismatched_inputs_are_rejected() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.dta");
        let b = dir.path().join("b.dta");
        fs::write(&a, "3.0\n4.0\n").unwrap();
        fs::write(&b, "2.0\n").unwrap();
        let plan = CombinePlan {
            inputs: vec![
                WeightedInput { path: a, weight: 0.5 },
                WeightedInput { path: b, weight: 0.5 },
            ],
        };
        let output = dir.path().join("combined.dta");
        assert!(matches!(
            combine_files(&plan, &output),
            Err(HelperError::PredictionRead(
                PredictionReadError::PredictionCountMismatch {
                    expected: 2,
                    found: 1,
                    ..
                }
            ))
        ));
        assert!(!output.exists());
    }

    #[test]
    fn empty_plan_is_rejected() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            combine_files(&CombinePlan::default(), &dir.path().join("x.dta")),
            Err(HelperError::NoInputs(_))
        ));
    }

    #[test]
    fn plan_round_trips_through_toml() {
        let dir = tempdir().unwrap();
        let plan = CombinePlan {
            inputs: vec![WeightedInput {
                path: PathBuf::from("probe/rbm.dta"),
                weight: -0.125,
            }],
        };
        let path = dir.path().join("plan.toml");
        plan.write_toml_file(&path).unwrap();
        assert_eq!(CombinePlan::from_toml_file(&path).unwrap(), plan);
    }
}
