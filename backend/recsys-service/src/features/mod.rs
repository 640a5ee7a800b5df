//! In-memory feature tables
//!
//! The post, user and liked-interaction tables are loaded once at startup and
//! shared read-only between HTTP workers.

mod snapshot;

pub use snapshot::{FeatureSnapshot, LikedIndex, Post, PostTable, SnapshotStats, UserTable};

use std::borrow::Cow;
use std::collections::HashMap;

use crate::error::{AppError, Result};

/// A single cell of a feature table
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Null,
}

impl FeatureValue {
    /// Numeric view used for float model features; text and nulls are missing
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            FeatureValue::Int(v) => Some(*v as f32),
            FeatureValue::Float(v) => Some(*v as f32),
            FeatureValue::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            FeatureValue::Text(_) | FeatureValue::Null => None,
        }
    }

    /// Integer key view used for `post_id` / `user_id` columns
    pub fn as_key(&self) -> Option<i64> {
        match self {
            FeatureValue::Int(v) => Some(*v),
            FeatureValue::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            _ => None,
        }
    }

    /// String form used for categorical model features.
    ///
    /// Matches the training pipeline's `astype(str)`: `5`, `3.0`, `0.25`,
    /// `True`, `nan`.
    pub fn to_category(&self) -> Cow<'_, str> {
        match self {
            FeatureValue::Int(v) => Cow::Owned(v.to_string()),
            FeatureValue::Float(v) => Cow::Owned(format_float(*v)),
            FeatureValue::Bool(true) => Cow::Borrowed("True"),
            FeatureValue::Bool(false) => Cow::Borrowed("False"),
            FeatureValue::Text(s) => Cow::Borrowed(s.as_str()),
            FeatureValue::Null => Cow::Borrowed("nan"),
        }
    }
}

/// Python `repr` of a float: a trailing `.0` on whole numbers and exponent
/// form below 1e-4 or from 1e16 on
fn format_float(v: f64) -> String {
    if v.is_nan() {
        return "nan".to_string();
    }
    if v.is_infinite() {
        let sign = if v > 0.0 { "" } else { "-" };
        return format!("{}inf", sign);
    }
    if v == 0.0 {
        let sign = if v.is_sign_negative() { "-" } else { "" };
        return format!("{}0.0", sign);
    }

    // shortest round-trip digits, e.g. "1.5e-5"
    let scientific = format!("{:e}", v);
    let (mantissa, exponent) = match scientific.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (scientific.as_str(), 0),
    };

    if !(-4..16).contains(&exponent) {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, sign, exponent.abs())
    } else if v.fract() == 0.0 {
        format!("{:.1}", v)
    } else {
        v.to_string()
    }
}

/// Column-named, row-major table of feature values
#[derive(Debug, Clone, Default)]
pub struct FeatureTable {
    columns: Vec<String>,
    positions: HashMap<String, usize>,
    rows: Vec<Vec<FeatureValue>>,
}

impl FeatureTable {
    pub fn new(columns: Vec<String>) -> Self {
        let mut positions = HashMap::with_capacity(columns.len());
        for (idx, name) in columns.iter().enumerate() {
            positions.entry(name.clone()).or_insert(idx);
        }

        Self {
            columns,
            positions,
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<FeatureValue>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(AppError::FeatureTable(format!(
                "row has {} values but table has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Turn columns holding only integers and nulls into float columns, the
    /// way pandas reads them. Returns the promoted column names.
    pub fn promote_nullable_int_columns(&mut self) -> Vec<String> {
        let mut promoted = Vec::new();
        for (col, name) in self.columns.iter().enumerate() {
            let mut has_int = false;
            let mut has_null = false;
            let mut int_or_null = true;
            for row in &self.rows {
                match row[col] {
                    FeatureValue::Int(_) => has_int = true,
                    FeatureValue::Null => has_null = true,
                    _ => {
                        int_or_null = false;
                        break;
                    }
                }
            }
            if !(int_or_null && has_int && has_null) {
                continue;
            }

            for row in &mut self.rows {
                if let FeatureValue::Int(v) = row[col] {
                    row[col] = FeatureValue::Float(v as f64);
                }
            }
            promoted.push(name.clone());
        }
        promoted
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    pub fn row(&self, idx: usize) -> &[FeatureValue] {
        &self.rows[idx]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[FeatureValue]> {
        self.rows.iter().map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
