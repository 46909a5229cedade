// Matrix Expansion
// Expands a declared axis grid plus include entries into concrete job configurations

use serde::{Deserialize, Serialize};

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use thiserror::Error;

/// Errors produced while expanding a matrix specification.
///
/// All of these are fatal configuration problems detected before any job
/// launches.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("include entry {index} references unknown axis '{axis}'")]
    UnknownAxis { index: usize, axis: String },

    #[error("include entry {index} does not specify axis '{axis}'; include entries must specify every axis")]
    PartialInclude { index: usize, axis: String },

    #[error("axis '{axis}' has no values")]
    EmptyAxis { axis: String },

    #[error("axis '{axis}' is declared more than once")]
    DuplicateAxis { axis: String },
}

/// One named axis of the matrix with its candidate values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Axis {
    /// Axis name (e.g. "os", "python", "requires")
    pub name: String,

    /// Candidate values for this axis
    pub values: Vec<String>,
}

/// Declarative input to matrix expansion: a base grid of axes plus an
/// ordered list of include entries appended onto the cross-product.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MatrixSpec {
    /// Axes in declaration order. Order matters: it fixes the expansion
    /// order of the base cross-product.
    #[serde(default)]
    pub axes: Vec<Axis>,

    /// Additional fully-specified combinations appended after the base
    /// product. Includes are additive: they are never merged into base
    /// entries, and duplicating a base combination yields a second
    /// independent job.
    #[serde(default)]
    pub include: Vec<HashMap<String, String>>,
}

impl MatrixSpec {
    /// Total number of job configs this spec expands to, assuming it is
    /// valid. Base product plus one per include entry.
    pub fn expected_len(&self) -> usize {
        let base: usize = if self.axes.is_empty() {
            0
        } else {
            self.axes
                .iter()
                .map(|a| {
                    let unique: HashSet<&String> = a.values.iter().collect();
                    unique.len()
                })
                .product()
        };
        base + self.include.len()
    }
}

/// One concrete point in the matrix: an immutable set of axis values.
///
/// Created by the expander, consumed by the scheduler, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobConfig {
    /// Stable identifier derived from the axis values
    id: String,

    /// Axis name to value, in a deterministic order
    values: BTreeMap<String, String>,
}

impl JobConfig {
    fn new(pairs: Vec<(String, String)>) -> Self {
        let id = pairs
            .iter()
            .map(|(_, v)| v.as_str())
            .collect::<Vec<_>>()
            .join("/");
        Self {
            id,
            values: pairs.into_iter().collect(),
        }
    }

    /// Build a config directly from axis values. Used for stages that run
    /// a single job without a matrix.
    pub fn from_values(values: BTreeMap<String, String>) -> Self {
        let id = if values.is_empty() {
            "default".to_string()
        } else {
            values
                .values()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join("/")
        };
        Self { id, values }
    }

    /// Stable identifier for this configuration (axis values joined with '/')
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Value of a single axis, if present
    pub fn get(&self, axis: &str) -> Option<&str> {
        self.values.get(axis).map(String::as_str)
    }

    /// All axis/value pairs
    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    /// Axis values as environment variables for the job runner.
    ///
    /// Axis names are uppercased and prefixed so a config
    /// `{os: ubuntu-22.04, python: "3.12"}` becomes
    /// `MATRIX_OS=ubuntu-22.04`, `MATRIX_PYTHON=3.12`.
    pub fn to_env(&self) -> HashMap<String, String> {
        self.values
            .iter()
            .map(|(k, v)| (format!("MATRIX_{}", k.to_uppercase()), v.clone()))
            .collect()
    }
}

impl fmt::Display for JobConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Matrix expander: turns a `MatrixSpec` into an ordered list of job configs.
pub struct MatrixExpander;

impl MatrixExpander {
    /// Expand a spec into the ordered, deduplicated base cross-product plus
    /// appended include entries.
    ///
    /// Ordering is deterministic: axes iterate in declaration order with the
    /// first axis varying slowest, values sorted lexically within each axis.
    /// Include entries keep their declared order and are appended after the
    /// base product even when they duplicate a base combination.
    pub fn expand(spec: &MatrixSpec) -> Result<Vec<JobConfig>, ConfigError> {
        Self::validate(spec)?;

        let mut configs = Vec::with_capacity(spec.expected_len());
        let mut seen: HashSet<JobConfig> = HashSet::new();

        // Base cross-product, deduplicated by full attribute tuple. Axes
        // iterate in declaration order, first axis varying slowest.
        if !spec.axes.is_empty() {
            let mut rows: Vec<Vec<(String, String)>> = vec![Vec::new()];
            for axis in &spec.axes {
                let mut values: Vec<&String> = axis.values.iter().collect();
                values.sort();

                let mut next = Vec::with_capacity(rows.len() * values.len());
                for prefix in &rows {
                    for value in &values {
                        let mut row = prefix.clone();
                        row.push((axis.name.clone(), (*value).clone()));
                        next.push(row);
                    }
                }
                rows = next;
            }

            for pairs in rows {
                let config = JobConfig::new(pairs);
                if seen.insert(config.clone()) {
                    configs.push(config);
                }
            }
        }

        Self::append_includes(spec, configs)
    }

    fn append_includes(
        spec: &MatrixSpec,
        mut configs: Vec<JobConfig>,
    ) -> Result<Vec<JobConfig>, ConfigError> {
        for entry in &spec.include {
            let pairs: Vec<(String, String)> = spec
                .axes
                .iter()
                .map(|axis| {
                    (
                        axis.name.clone(),
                        entry.get(&axis.name).cloned().unwrap_or_default(),
                    )
                })
                .collect();
            configs.push(JobConfig::new(pairs));
        }
        Ok(configs)
    }

    /// Validate a spec without expanding it.
    pub fn validate(spec: &MatrixSpec) -> Result<(), ConfigError> {
        let mut names: HashSet<&str> = HashSet::new();
        for axis in &spec.axes {
            if !names.insert(axis.name.as_str()) {
                return Err(ConfigError::DuplicateAxis {
                    axis: axis.name.clone(),
                });
            }
            if axis.values.is_empty() {
                return Err(ConfigError::EmptyAxis {
                    axis: axis.name.clone(),
                });
            }
        }

        for (index, entry) in spec.include.iter().enumerate() {
            for key in entry.keys() {
                if !names.contains(key.as_str()) {
                    return Err(ConfigError::UnknownAxis {
                        index,
                        axis: key.clone(),
                    });
                }
            }
            for axis in &spec.axes {
                if !entry.contains_key(&axis.name) {
                    return Err(ConfigError::PartialInclude {
                        index,
                        axis: axis.name.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}
