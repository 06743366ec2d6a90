//! Aggregated data-integrity warnings.
//!
//! Warnings raised while a synchronization pass runs are collected here and
//! logged once when the pass finishes. A cancelled pass drops them unlogged.

use std::fmt;

use log::warn;

#[derive(Debug, Clone, PartialEq)]
pub enum Warning {
    /// Render-set ids absent from a referenced table.
    MissingIds {
        table: String,
        missing: usize,
        total: usize,
    },
    MissingValueMap {
        map: String,
    },
    InferredRange {
        table: String,
        column: String,
        range: [f64; 2],
    },
    DegenerateRange {
        table: String,
        column: String,
        range: [f64; 2],
    },
    UnknownPalette {
        name: String,
    },
    UnparsableValues {
        table: String,
        column: String,
        count: usize,
    },
    Truncated {
        kind: &'static str,
        dropped: usize,
        cap: usize,
    },
    LoadFailed {
        object: String,
        message: String,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::MissingIds {
                table,
                missing,
                total,
            } => write!(f, "{missing} of {total} IDs missing from table '{table}'"),
            Warning::MissingValueMap { map } => {
                write!(f, "value map '{map}' not found, using defaults")
            }
            Warning::InferredRange {
                table,
                column,
                range: [min, max],
            } => write!(f, "no range given for '{table}.{column}', inferred [{min}, {max}]"),
            Warning::DegenerateRange {
                table,
                column,
                range: [min, max],
            } => write!(f, "range [{min}, {max}] of '{table}.{column}' is empty, using [0, 1]"),
            Warning::UnknownPalette { name } => {
                write!(f, "unknown palette '{name}', using the default palette")
            }
            Warning::UnparsableValues {
                table,
                column,
                count,
            } => write!(f, "{count} values of '{table}.{column}' could not be read"),
            Warning::Truncated { kind, dropped, cap } => write!(
                f,
                "too many {kind} objects: {dropped} not rendered (limit is {cap})"
            ),
            Warning::LoadFailed { object, message } => {
                write!(f, "failed to load data of '{object}': {message}")
            }
        }
    }
}

/// Warnings of one pass.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, warning: Warning) {
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn len(&self) -> usize {
        self.warnings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Logs every warning and hands them back.
    pub fn flush(self) -> Vec<Warning> {
        for warning in &self.warnings {
            warn!("{warning}");
        }
        self.warnings
    }
}
