/// Recommendation Engine
///
/// Ranks the post catalogue for a single user against the startup feature
/// snapshot.
use chrono::NaiveDateTime;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, warn};

use super::model::RankingModel;
use super::plan::FeaturePlan;
use super::Result;
use crate::features::{FeatureSnapshot, PostTable};
use crate::metrics;

/// A candidate row with its predicted like probability
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredCandidate {
    /// Row of the post in the post table
    pub row: usize,
    pub post_id: i64,
    pub score: f32,
}

/// A ranked post returned to the caller
#[derive(Debug, Clone, PartialEq)]
pub struct Recommendation {
    pub post_id: i64,
    pub topic: String,
    pub text: Option<String>,
    pub score: f32,
}

pub struct RecommendationEngine {
    model: Arc<RankingModel>,
    snapshot: Arc<FeatureSnapshot>,
    plan: FeaturePlan,
}

impl RecommendationEngine {
    /// Fails when the model needs a feature the snapshot cannot provide
    pub fn new(model: Arc<RankingModel>, snapshot: Arc<FeatureSnapshot>) -> Result<Self> {
        let plan = FeaturePlan::resolve(&model, &snapshot)?;
        Ok(Self {
            model,
            snapshot,
            plan,
        })
    }

    pub fn model(&self) -> &RankingModel {
        &self.model
    }

    pub fn snapshot(&self) -> &FeatureSnapshot {
        &self.snapshot
    }

    /// Top `limit` posts for `user_id` by predicted like probability.
    ///
    /// Unknown users get an empty list. Posts the user already liked are
    /// never returned. Equal probabilities are ordered by ascending post id.
    pub fn rank(
        &self,
        user_id: i64,
        time: NaiveDateTime,
        limit: usize,
    ) -> Result<Vec<Recommendation>> {
        let scored = self.score(user_id, time)?;
        let top = select_top(scored, limit);

        let posts = self.snapshot.posts();
        debug!(
            user_id,
            returned = top.len(),
            top_score = top.first().map(|c| c.score),
            "Ranking complete"
        );

        Ok(top
            .into_iter()
            .map(|candidate| {
                let post = posts.post(candidate.row);
                Recommendation {
                    post_id: post.id,
                    topic: post.topic.clone(),
                    text: post.text.clone(),
                    score: candidate.score,
                }
            })
            .collect())
    }

    /// Every eligible candidate with its score, in post table order
    pub fn score(&self, user_id: i64, time: NaiveDateTime) -> Result<Vec<ScoredCandidate>> {
        let Some(user_row) = self.snapshot.users().features(user_id) else {
            warn!(user_id, "User not found in user features");
            return Ok(Vec::new());
        };

        let candidates = eligible_rows(self.snapshot.posts(), &self.snapshot, user_id);
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            user_id,
            candidate_count = candidates.len(),
            "Scoring candidates"
        );
        metrics::observe_candidates(candidates.len());

        let matrix = self.plan.assemble(
            &self.model,
            &self.snapshot,
            user_row,
            &candidates,
            &time,
        );
        let scores = self.model.predict_proba(&matrix)?;

        let posts = self.snapshot.posts();
        Ok(candidates
            .iter()
            .zip(scores.iter())
            .map(|(&row, &score)| ScoredCandidate {
                row,
                post_id: posts.post(row).id,
                score,
            })
            .collect())
    }
}

/// Post rows the user has not liked yet
fn eligible_rows(posts: &PostTable, snapshot: &FeatureSnapshot, user_id: i64) -> Vec<usize> {
    match snapshot.liked().liked_by(user_id) {
        Some(liked) => posts
            .posts()
            .iter()
            .enumerate()
            .filter(|(_, post)| !liked.contains(&post.id))
            .map(|(row, _)| row)
            .collect(),
        None => (0..posts.len()).collect(),
    }
}

/// Descending score, then ascending post id
fn rank_order(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.post_id.cmp(&b.post_id))
}

fn select_top(mut scored: Vec<ScoredCandidate>, limit: usize) -> Vec<ScoredCandidate> {
    if limit == 0 {
        return Vec::new();
    }
    if limit < scored.len() {
        scored.select_nth_unstable_by(limit, rank_order);
        scored.truncate(limit);
    }
    scored.sort_unstable_by(rank_order);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{FeatureTable, FeatureValue, LikedIndex, UserTable};
    use crate::services::ranking::model::{
        FeatureKind, FeatureSpec, ModelDefinition, ObliviousTree, Split,
    };
    use chrono::NaiveDate;
    use std::collections::HashSet;

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 12, 20)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    /// Posts 1..=6; `boost` grows with post id except post 6, which ties post 5
    fn snapshot(liked: &[(i64, i64)]) -> Arc<FeatureSnapshot> {
        let mut posts = FeatureTable::new(vec![
            "post_id".into(),
            "topic".into(),
            "boost".into(),
        ]);
        for (id, boost) in [(3, 3.0), (1, 1.0), (2, 2.0), (5, 5.0), (4, 4.0), (6, 5.0)] {
            posts
                .push_row(vec![
                    FeatureValue::Int(id),
                    FeatureValue::Text(format!("topic-{}", id)),
                    FeatureValue::Float(boost),
                ])
                .unwrap();
        }

        let mut users = FeatureTable::new(vec!["user_id".into(), "gender".into()]);
        users
            .push_row(vec![FeatureValue::Int(100), FeatureValue::Int(1)])
            .unwrap();
        users
            .push_row(vec![FeatureValue::Int(200), FeatureValue::Int(0)])
            .unwrap();

        Arc::new(FeatureSnapshot::new(
            PostTable::from_table(posts).unwrap(),
            UserTable::from_table(users).unwrap(),
            liked.iter().copied().collect::<LikedIndex>(),
        ))
    }

    /// Score rises with `boost` in unit steps; hour 20 flips the order
    fn model() -> Arc<RankingModel> {
        let borders = [1.5, 2.5, 3.5, 4.5];
        let mut trees: Vec<ObliviousTree> = borders
            .iter()
            .map(|&border| ObliviousTree {
                splits: vec![
                    Split::Border { feature: 0, border },
                    Split::Category {
                        feature: 1,
                        value: "20".to_string(),
                    },
                ],
                leaf_values: vec![0.0, 0.5, 0.0, -0.5],
            })
            .collect();
        trees.push(ObliviousTree {
            splits: vec![Split::Category {
                feature: 2,
                value: "1".to_string(),
            }],
            leaf_values: vec![0.0, 0.1],
        });

        Arc::new(
            RankingModel::from_definition(ModelDefinition {
                features: vec![
                    FeatureSpec {
                        name: "boost".into(),
                        kind: FeatureKind::Float,
                    },
                    FeatureSpec {
                        name: "hour".into(),
                        kind: FeatureKind::Categorical,
                    },
                    FeatureSpec {
                        name: "gender".into(),
                        kind: FeatureKind::Categorical,
                    },
                ],
                trees,
                scale: 1.0,
                bias: -1.0,
            })
            .unwrap(),
        )
    }

    fn engine(liked: &[(i64, i64)]) -> RecommendationEngine {
        RecommendationEngine::new(model(), snapshot(liked)).unwrap()
    }

    fn ids(recs: &[Recommendation]) -> Vec<i64> {
        recs.iter().map(|r| r.post_id).collect()
    }

    #[test]
    fn test_all_posts_eligible_without_likes() {
        let engine = engine(&[]);
        let scored = engine.score(100, at(9)).unwrap();
        assert_eq!(scored.len(), 6);

        let recs = engine.rank(100, at(9), 100).unwrap();
        assert_eq!(recs.len(), 6);
    }

    #[test]
    fn test_ranks_by_descending_score_with_id_tie_break() {
        let recs = engine(&[]).rank(100, at(9), 10).unwrap();
        // posts 5 and 6 share the top score
        assert_eq!(ids(&recs), vec![5, 6, 4, 3, 2, 1]);
        assert!(recs.windows(2).all(|w| w[0].score >= w[1].score));
        assert_eq!(recs[0].topic, "topic-5");
    }

    #[test]
    fn test_excludes_liked_posts() {
        let engine = engine(&[(100, 5), (100, 2), (200, 4)]);
        let recs = engine.rank(100, at(9), 10).unwrap();

        let returned: HashSet<i64> = ids(&recs).into_iter().collect();
        assert!(!returned.contains(&5));
        assert!(!returned.contains(&2));
        assert!(returned.contains(&4));
        assert_eq!(ids(&recs), vec![6, 4, 3, 1]);
    }

    #[test]
    fn test_limit_bounds_result() {
        let engine = engine(&[(100, 1)]);
        assert_eq!(ids(&engine.rank(100, at(9), 2).unwrap()), vec![5, 6]);
        assert!(engine.rank(100, at(9), 0).unwrap().is_empty());
        // fewer eligible posts than the limit
        assert_eq!(engine.rank(100, at(9), 50).unwrap().len(), 5);
    }

    #[test]
    fn test_unknown_user_gets_empty_list() {
        let recs = engine(&[]).rank(999, at(9), 10).unwrap();
        assert!(recs.is_empty());
    }

    #[test]
    fn test_request_hour_reaches_model() {
        let engine = engine(&[]);
        let evening = engine.rank(100, at(20), 10).unwrap();
        // at hour 20 every boost border subtracts instead of adding
        assert_eq!(ids(&evening), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_user_features_are_broadcast() {
        let engine = engine(&[]);
        let male = engine.rank(100, at(9), 1).unwrap();
        let female = engine.rank(200, at(9), 1).unwrap();
        assert_eq!(male[0].post_id, female[0].post_id);
        assert!(male[0].score > female[0].score);
    }

    #[test]
    fn test_select_top_matches_full_sort() {
        let scored: Vec<ScoredCandidate> = (0..50)
            .map(|i| ScoredCandidate {
                row: i,
                post_id: (i as i64 * 37) % 50,
                score: ((i * 7) % 5) as f32 / 10.0,
            })
            .collect();

        let mut full = scored.clone();
        full.sort_by(rank_order);

        for limit in [1, 5, 13, 49, 50, 80] {
            let top = select_top(scored.clone(), limit);
            assert_eq!(top, full[..limit.min(50)].to_vec());
        }
    }
}
