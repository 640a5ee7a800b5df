/// Gradient-Boosted Classifier Inference
///
/// Loads a pretrained ensemble of oblivious (symmetric) decision trees from a
/// JSON model file and computes the positive-class probability for a batch of
/// candidate rows.
///
/// Every level of an oblivious tree applies the same split, so split `i`
/// contributes bit `i` of the leaf index. The raw score is
/// `bias + scale * sum(leaf values)` and the probability is its sigmoid.
use super::{RankingError, Result};
use crate::features::FeatureValue;
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

/// Deepest tree accepted (leaf table of 65536 entries)
const MAX_TREE_DEPTH: usize = 16;

/// Encoded value of a category never seen in any split
pub const UNKNOWN_CATEGORY: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    Float,
    Categorical,
}

/// One model input, in training order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub name: String,
    pub kind: FeatureKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Split {
    /// True when the feature value is strictly greater than `border`
    Border { feature: usize, border: f32 },
    /// True when the categorical value equals `value`
    Category { feature: usize, value: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObliviousTree {
    pub splits: Vec<Split>,
    pub leaf_values: Vec<f32>,
}

/// On-disk model layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDefinition {
    pub features: Vec<FeatureSpec>,
    pub trees: Vec<ObliviousTree>,
    #[serde(default = "default_scale")]
    pub scale: f32,
    #[serde(default)]
    pub bias: f32,
}

fn default_scale() -> f32 {
    1.0
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Float(usize),
    Categorical(usize),
}

#[derive(Debug, Clone, Copy)]
enum CompiledSplit {
    Border { column: usize, border: f32 },
    Category { column: usize, code: u32 },
}

#[derive(Debug, Clone)]
struct CompiledTree {
    splits: Vec<CompiledSplit>,
    leaf_values: Vec<f32>,
}

impl CompiledTree {
    fn leaf(&self, floats: ArrayView1<'_, f32>, categories: ArrayView1<'_, u32>) -> f32 {
        let mut index = 0usize;
        for (bit, split) in self.splits.iter().enumerate() {
            let passed = match *split {
                // NaN compares false, so missing values take the 0 branch
                CompiledSplit::Border { column, border } => floats[column] > border,
                CompiledSplit::Category { column, code } => categories[column] == code,
            };
            if passed {
                index |= 1 << bit;
            }
        }
        self.leaf_values[index]
    }
}

/// Model input: a float block and an encoded categorical block, one row per
/// candidate. Built through [`RankingModel::new_matrix`] and
/// [`RankingModel::encode`].
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    floats: Array2<f32>,
    categories: Array2<u32>,
}

impl FeatureMatrix {
    pub fn rows(&self) -> usize {
        self.floats.nrows()
    }
}

/// Pretrained gradient-boosted classifier
#[derive(Debug, Clone)]
pub struct RankingModel {
    features: Vec<FeatureSpec>,
    slots: Vec<Slot>,
    vocabularies: Vec<HashMap<String, u32>>,
    trees: Vec<CompiledTree>,
    float_count: usize,
    scale: f32,
    bias: f32,
}

impl RankingModel {
    /// Load a JSON model file
    pub fn load<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let path = model_path.as_ref();

        let raw = std::fs::read_to_string(path).map_err(|e| {
            RankingError::ModelLoad(format!("failed to read {}: {}", path.display(), e))
        })?;
        let definition: ModelDefinition = serde_json::from_str(&raw).map_err(|e| {
            RankingError::ModelLoad(format!("failed to parse {}: {}", path.display(), e))
        })?;

        let model = Self::from_definition(definition)?;
        info!(
            path = %path.display(),
            trees = model.tree_count(),
            features = model.features.len(),
            "Loaded ranking model"
        );
        Ok(model)
    }

    /// Validate a model definition and compile it for evaluation
    pub fn from_definition(definition: ModelDefinition) -> Result<Self> {
        let ModelDefinition {
            features,
            trees,
            scale,
            bias,
        } = definition;

        if features.is_empty() {
            return Err(RankingError::InvalidModel(
                "model declares no features".to_string(),
            ));
        }
        if !scale.is_finite() || !bias.is_finite() {
            return Err(RankingError::InvalidModel(
                "scale and bias must be finite".to_string(),
            ));
        }

        let mut names = HashSet::with_capacity(features.len());
        let mut slots = Vec::with_capacity(features.len());
        let mut float_count = 0;
        let mut categorical_count = 0;
        for spec in &features {
            if !names.insert(spec.name.as_str()) {
                return Err(RankingError::InvalidModel(format!(
                    "duplicate feature '{}'",
                    spec.name
                )));
            }
            match spec.kind {
                FeatureKind::Float => {
                    slots.push(Slot::Float(float_count));
                    float_count += 1;
                }
                FeatureKind::Categorical => {
                    slots.push(Slot::Categorical(categorical_count));
                    categorical_count += 1;
                }
            }
        }

        let mut vocabularies: Vec<HashMap<String, u32>> = vec![HashMap::new(); categorical_count];
        let mut compiled = Vec::with_capacity(trees.len());

        for (tree_idx, tree) in trees.into_iter().enumerate() {
            if tree.splits.len() > MAX_TREE_DEPTH {
                return Err(RankingError::InvalidModel(format!(
                    "tree {} has depth {} (max {})",
                    tree_idx,
                    tree.splits.len(),
                    MAX_TREE_DEPTH
                )));
            }
            let expected_leaves = 1usize << tree.splits.len();
            if tree.leaf_values.len() != expected_leaves {
                return Err(RankingError::InvalidModel(format!(
                    "tree {} has {} leaf values, expected {}",
                    tree_idx,
                    tree.leaf_values.len(),
                    expected_leaves
                )));
            }
            if tree.leaf_values.iter().any(|v| !v.is_finite()) {
                return Err(RankingError::InvalidModel(format!(
                    "tree {} has non-finite leaf values",
                    tree_idx
                )));
            }

            let mut splits = Vec::with_capacity(tree.splits.len());
            for split in tree.splits {
                let feature = match &split {
                    Split::Border { feature, .. } | Split::Category { feature, .. } => *feature,
                };
                let slot = slots.get(feature).copied().ok_or_else(|| {
                    RankingError::InvalidModel(format!(
                        "tree {} splits on feature {} but only {} features are declared",
                        tree_idx,
                        feature,
                        features.len()
                    ))
                })?;

                let compiled_split = match (split, slot) {
                    (Split::Border { border, .. }, Slot::Float(column)) => {
                        if border.is_nan() {
                            return Err(RankingError::InvalidModel(format!(
                                "tree {} has a NaN border",
                                tree_idx
                            )));
                        }
                        CompiledSplit::Border { column, border }
                    }
                    (Split::Category { value, .. }, Slot::Categorical(column)) => {
                        let vocabulary = &mut vocabularies[column];
                        let next_code = vocabulary.len() as u32;
                        let code = *vocabulary.entry(value).or_insert(next_code);
                        CompiledSplit::Category { column, code }
                    }
                    (Split::Border { .. }, Slot::Categorical(_)) => {
                        return Err(RankingError::InvalidModel(format!(
                            "tree {} applies a border split to categorical feature '{}'",
                            tree_idx, features[feature].name
                        )));
                    }
                    (Split::Category { .. }, Slot::Float(_)) => {
                        return Err(RankingError::InvalidModel(format!(
                            "tree {} applies a category split to float feature '{}'",
                            tree_idx, features[feature].name
                        )));
                    }
                };
                splits.push(compiled_split);
            }

            compiled.push(CompiledTree {
                splits,
                leaf_values: tree.leaf_values,
            });
        }

        debug!(
            trees = compiled.len(),
            float_features = float_count,
            categorical_features = categorical_count,
            "Compiled ranking model"
        );

        Ok(Self {
            features,
            slots,
            vocabularies,
            trees: compiled,
            float_count,
            scale,
            bias,
        })
    }

    /// Input features in training order
    pub fn features(&self) -> &[FeatureSpec] {
        &self.features
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    /// Empty input for `rows` candidates: floats missing, categories unknown
    pub fn new_matrix(&self, rows: usize) -> FeatureMatrix {
        FeatureMatrix {
            floats: Array2::from_elem((rows, self.float_count), f32::NAN),
            categories: Array2::from_elem((rows, self.vocabularies.len()), UNKNOWN_CATEGORY),
        }
    }

    /// Write `value` as input `feature` of `row`, casting categorical
    /// features to their string form
    pub fn encode(
        &self,
        matrix: &mut FeatureMatrix,
        row: usize,
        feature: usize,
        value: &FeatureValue,
    ) {
        match self.slots[feature] {
            Slot::Float(column) => {
                matrix.floats[[row, column]] = value.as_f32().unwrap_or(f32::NAN);
            }
            Slot::Categorical(column) => {
                matrix.categories[[row, column]] = self.vocabularies[column]
                    .get(value.to_category().as_ref())
                    .copied()
                    .unwrap_or(UNKNOWN_CATEGORY);
            }
        }
    }

    /// Positive-class probability for every row of `matrix`
    pub fn predict_proba(&self, matrix: &FeatureMatrix) -> Result<Array1<f32>> {
        if matrix.floats.ncols() != self.float_count
            || matrix.categories.ncols() != self.vocabularies.len()
        {
            return Err(RankingError::InvalidInput(format!(
                "Expected {} float and {} categorical features, got {} and {}",
                self.float_count,
                self.vocabularies.len(),
                matrix.floats.ncols(),
                matrix.categories.ncols()
            )));
        }
        if matrix.floats.nrows() != matrix.categories.nrows() {
            return Err(RankingError::InvalidInput(format!(
                "Float block has {} rows but categorical block has {}",
                matrix.floats.nrows(),
                matrix.categories.nrows()
            )));
        }

        let scores = matrix
            .floats
            .outer_iter()
            .zip(matrix.categories.outer_iter())
            .map(|(floats, categories)| {
                let sum: f32 = self
                    .trees
                    .iter()
                    .map(|tree| tree.leaf(floats, categories))
                    .sum();
                sigmoid(self.bias + self.scale * sum)
            })
            .collect::<Array1<f32>>();

        if scores.iter().any(|s| s.is_nan()) {
            return Err(RankingError::Inference(
                "model produced NaN probabilities".to_string(),
            ));
        }

        Ok(scores)
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
