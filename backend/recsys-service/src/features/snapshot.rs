use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::warn;

use super::{FeatureTable, FeatureValue};
use crate::error::{AppError, Result};

/// Content returned to clients for a recommended post
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub id: i64,
    pub topic: String,
    pub text: Option<String>,
}

/// Post feature table keyed by `post_id`
#[derive(Debug, Clone)]
pub struct PostTable {
    table: FeatureTable,
    posts: Vec<Post>,
    key_column: usize,
}

impl PostTable {
    pub const KEY_COLUMN: &'static str = "post_id";
    pub const TOPIC_COLUMN: &'static str = "topic";
    pub const TEXT_COLUMN: &'static str = "text";

    pub fn from_table(source: FeatureTable) -> Result<Self> {
        let key_column = required_column(&source, Self::KEY_COLUMN)?;
        let topic_column = required_column(&source, Self::TOPIC_COLUMN)?;
        let text_column = source.column_index(Self::TEXT_COLUMN);

        let mut table = FeatureTable::new(source.columns().to_vec());
        let mut posts = Vec::with_capacity(source.len());
        let mut seen = HashSet::with_capacity(source.len());

        for row in source.rows() {
            let id = row_key(row, key_column, Self::KEY_COLUMN)?;
            if !seen.insert(id) {
                warn!(post_id = id, "Duplicate post_id in post features, keeping first row");
                continue;
            }

            let text = text_column.and_then(|idx| match &row[idx] {
                FeatureValue::Null => None,
                value => Some(value.to_category().into_owned()),
            });

            posts.push(Post {
                id,
                topic: row[topic_column].to_category().into_owned(),
                text,
            });
            table.push_row(row.to_vec())?;
        }

        Ok(Self {
            table,
            posts,
            key_column,
        })
    }

    pub fn table(&self) -> &FeatureTable {
        &self.table
    }

    /// Content of the post stored at row `idx`
    pub fn post(&self, idx: usize) -> &Post {
        &self.posts[idx]
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn key_column(&self) -> usize {
        self.key_column
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }
}

/// User feature table keyed by `user_id`
#[derive(Debug, Clone)]
pub struct UserTable {
    table: FeatureTable,
    by_id: HashMap<i64, usize>,
    key_column: usize,
}

impl UserTable {
    pub const KEY_COLUMN: &'static str = "user_id";

    pub fn from_table(table: FeatureTable) -> Result<Self> {
        let key_column = required_column(&table, Self::KEY_COLUMN)?;

        let mut by_id = HashMap::with_capacity(table.len());
        for (idx, row) in table.rows().enumerate() {
            let id = row_key(row, key_column, Self::KEY_COLUMN)?;
            if by_id.contains_key(&id) {
                warn!(user_id = id, "Duplicate user_id in user features, keeping first row");
                continue;
            }
            by_id.insert(id, idx);
        }

        Ok(Self {
            table,
            by_id,
            key_column,
        })
    }

    pub fn table(&self) -> &FeatureTable {
        &self.table
    }

    /// Feature row of `user_id`, if the user is known
    pub fn features(&self, user_id: i64) -> Option<&[FeatureValue]> {
        self.by_id.get(&user_id).map(|&idx| self.table.row(idx))
    }

    pub fn key_column(&self) -> usize {
        self.key_column
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Posts each user has liked
#[derive(Debug, Clone, Default)]
pub struct LikedIndex {
    by_user: HashMap<i64, HashSet<i64>>,
    pairs: usize,
}

impl LikedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a like; returns false if the pair was already present
    pub fn insert(&mut self, user_id: i64, post_id: i64) -> bool {
        let inserted = self.by_user.entry(user_id).or_default().insert(post_id);
        if inserted {
            self.pairs += 1;
        }
        inserted
    }

    pub fn liked_by(&self, user_id: i64) -> Option<&HashSet<i64>> {
        self.by_user.get(&user_id)
    }

    pub fn is_liked(&self, user_id: i64, post_id: i64) -> bool {
        self.liked_by(user_id)
            .map(|posts| posts.contains(&post_id))
            .unwrap_or(false)
    }

    pub fn pair_count(&self) -> usize {
        self.pairs
    }

    pub fn user_count(&self) -> usize {
        self.by_user.len()
    }
}

impl FromIterator<(i64, i64)> for LikedIndex {
    /// Builds from `(user_id, post_id)` pairs
    fn from_iter<I: IntoIterator<Item = (i64, i64)>>(iter: I) -> Self {
        let mut index = Self::new();
        for (user_id, post_id) in iter {
            index.insert(user_id, post_id);
        }
        index
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct SnapshotStats {
    pub posts: usize,
    pub users: usize,
    pub liked_pairs: usize,
}

/// Read-only feature snapshot taken at startup
#[derive(Debug, Clone)]
pub struct FeatureSnapshot {
    posts: PostTable,
    users: UserTable,
    liked: LikedIndex,
}

impl FeatureSnapshot {
    pub fn new(posts: PostTable, users: UserTable, liked: LikedIndex) -> Self {
        Self {
            posts,
            users,
            liked,
        }
    }

    pub fn posts(&self) -> &PostTable {
        &self.posts
    }

    pub fn users(&self) -> &UserTable {
        &self.users
    }

    pub fn liked(&self) -> &LikedIndex {
        &self.liked
    }

    pub fn stats(&self) -> SnapshotStats {
        SnapshotStats {
            posts: self.posts.len(),
            users: self.users.len(),
            liked_pairs: self.liked.pair_count(),
        }
    }
}

fn required_column(table: &FeatureTable, name: &str) -> Result<usize> {
    table.column_index(name).ok_or_else(|| {
        AppError::FeatureTable(format!(
            "required column '{}' missing (columns: {})",
            name,
            table.columns().join(", ")
        ))
    })
}

fn row_key(row: &[FeatureValue], column: usize, name: &str) -> Result<i64> {
    row[column].as_key().ok_or_else(|| {
        AppError::FeatureTable(format!(
            "column '{}' must hold integer ids, found {:?}",
            name, row[column]
        ))
    })
}
