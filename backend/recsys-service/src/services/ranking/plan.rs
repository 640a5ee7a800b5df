/// Feature Assembly
///
/// Maps every model input to where its value comes from. Resolved once at
/// startup so a model asking for a column the tables lack fails before the
/// service starts serving.
use chrono::{Datelike, NaiveDateTime, Timelike};
use tracing::info;

use super::model::{FeatureMatrix, RankingModel};
use super::{RankingError, Result};
use crate::features::{FeatureSnapshot, FeatureValue, PostTable, UserTable};

pub const HOUR_FEATURE: &str = "hour";
pub const MONTH_FEATURE: &str = "month";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeatureSource {
    Hour,
    Month,
    User(usize),
    Post(usize),
}

#[derive(Debug, Clone)]
pub struct FeaturePlan {
    sources: Vec<FeatureSource>,
}

impl FeaturePlan {
    /// Request time wins over user columns, which win over post columns.
    /// Key columns are never model inputs.
    pub fn resolve(model: &RankingModel, snapshot: &FeatureSnapshot) -> Result<Self> {
        let users = snapshot.users().table();
        let posts = snapshot.posts().table();

        let sources = model
            .features()
            .iter()
            .map(|spec| {
                let name = spec.name.as_str();
                if name == HOUR_FEATURE {
                    return Ok(FeatureSource::Hour);
                }
                if name == MONTH_FEATURE {
                    return Ok(FeatureSource::Month);
                }
                if name != UserTable::KEY_COLUMN {
                    if let Some(idx) = users.column_index(name) {
                        return Ok(FeatureSource::User(idx));
                    }
                }
                if name != PostTable::KEY_COLUMN {
                    if let Some(idx) = posts.column_index(name) {
                        return Ok(FeatureSource::Post(idx));
                    }
                }
                Err(RankingError::MissingFeature(spec.name.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        let from_users = sources
            .iter()
            .filter(|s| matches!(s, FeatureSource::User(_)))
            .count();
        let from_posts = sources
            .iter()
            .filter(|s| matches!(s, FeatureSource::Post(_)))
            .count();
        info!(
            features = sources.len(),
            from_users, from_posts, "Resolved model feature plan"
        );

        Ok(Self { sources })
    }

    /// Build the model input for the candidate posts at `post_rows`, all
    /// sharing the same user row and request time
    pub fn assemble(
        &self,
        model: &RankingModel,
        snapshot: &FeatureSnapshot,
        user_row: &[FeatureValue],
        post_rows: &[usize],
        time: &NaiveDateTime,
    ) -> FeatureMatrix {
        let posts = snapshot.posts().table();
        let hour = FeatureValue::Int(i64::from(time.hour()));
        let month = FeatureValue::Int(i64::from(time.month()));

        let mut matrix = model.new_matrix(post_rows.len());
        for (row, &post_idx) in post_rows.iter().enumerate() {
            let post_row = posts.row(post_idx);
            for (feature, source) in self.sources.iter().enumerate() {
                let value = match *source {
                    FeatureSource::Hour => &hour,
                    FeatureSource::Month => &month,
                    FeatureSource::User(col) => &user_row[col],
                    FeatureSource::Post(col) => &post_row[col],
                };
                model.encode(&mut matrix, row, feature, value);
            }
        }
        matrix
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
