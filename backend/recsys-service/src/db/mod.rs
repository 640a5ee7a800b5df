// Feature store loader
// Pulls the liked interactions, post features and user features out of
// PostgreSQL into the in-memory snapshot at startup.

use futures::TryStreamExt;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Column, Executor, Row, TypeInfo};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::features::{
    FeatureSnapshot, FeatureTable, FeatureValue, LikedIndex, PostTable, UserTable,
};

/// Tables and batching used by the loader
#[derive(Debug, Clone)]
pub struct FeatureSources {
    pub post_features_table: String,
    pub user_features_table: String,
    pub feed_table: String,
    pub like_action: String,
    pub like_batch_size: usize,
}

impl From<&Config> for FeatureSources {
    fn from(config: &Config) -> Self {
        Self {
            post_features_table: config.post_features_table.clone(),
            user_features_table: config.user_features_table.clone(),
            feed_table: config.feed_table.clone(),
            like_action: config.like_action.clone(),
            like_batch_size: config.like_batch_size,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Bool,
    Text,
}

impl ColumnKind {
    fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "INT2" => Some(Self::Int2),
            "INT4" => Some(Self::Int4),
            "INT8" => Some(Self::Int8),
            "FLOAT4" => Some(Self::Float4),
            "FLOAT8" => Some(Self::Float8),
            "BOOL" => Some(Self::Bool),
            // sqlx names blank-padded `CHAR(n)` columns "CHAR"
            "TEXT" | "VARCHAR" | "CHAR" | "NAME" => Some(Self::Text),
            _ => None,
        }
    }

    fn read(self, row: &PgRow, idx: usize) -> std::result::Result<FeatureValue, sqlx::Error> {
        let value = match self {
            Self::Int2 => row
                .try_get::<Option<i16>, _>(idx)?
                .map(|v| FeatureValue::Int(i64::from(v))),
            Self::Int4 => row
                .try_get::<Option<i32>, _>(idx)?
                .map(|v| FeatureValue::Int(i64::from(v))),
            Self::Int8 => row.try_get::<Option<i64>, _>(idx)?.map(FeatureValue::Int),
            Self::Float4 => row
                .try_get::<Option<f32>, _>(idx)?
                .map(|v| FeatureValue::Float(f64::from(v))),
            Self::Float8 => row.try_get::<Option<f64>, _>(idx)?.map(FeatureValue::Float),
            Self::Bool => row.try_get::<Option<bool>, _>(idx)?.map(FeatureValue::Bool),
            Self::Text => row.try_get::<Option<String>, _>(idx)?.map(FeatureValue::Text),
        };
        Ok(value.unwrap_or(FeatureValue::Null))
    }
}

pub struct FeatureRepository {
    pool: PgPool,
    sources: FeatureSources,
}

impl FeatureRepository {
    pub fn new(pool: PgPool, sources: FeatureSources) -> Self {
        Self { pool, sources }
    }

    /// Load everything the engine needs; any failure is fatal for startup
    pub async fn load_snapshot(&self) -> Result<FeatureSnapshot> {
        info!("Loading liked posts");
        let liked = self.load_liked_posts().await?;

        info!("Loading post features");
        let posts = self.load_table(&self.sources.post_features_table).await?;
        let posts = PostTable::from_table(posts)?;

        info!("Loading user features");
        let users = self.load_table(&self.sources.user_features_table).await?;
        let users = UserTable::from_table(users)?;

        let snapshot = FeatureSnapshot::new(posts, users, liked);
        let stats = snapshot.stats();
        info!(
            posts = stats.posts,
            users = stats.users,
            liked_pairs = stats.liked_pairs,
            "Feature snapshot loaded"
        );
        Ok(snapshot)
    }

    /// Distinct (user, post) like pairs, streamed and logged in chunks
    pub async fn load_liked_posts(&self) -> Result<LikedIndex> {
        let sql = liked_posts_query(&self.sources.feed_table);
        let batch = self.sources.like_batch_size;

        let mut rows = sqlx::query_as::<_, (i64, i64)>(&sql)
            .bind(&self.sources.like_action)
            .fetch(&self.pool);

        let mut liked = LikedIndex::new();
        let mut in_chunk = 0usize;
        let mut chunks = 0usize;
        while let Some((post_id, user_id)) = rows.try_next().await? {
            liked.insert(user_id, post_id);
            in_chunk += 1;
            if in_chunk == batch {
                chunks += 1;
                info!(chunk = chunks, rows = in_chunk, "Loaded liked-posts chunk");
                in_chunk = 0;
            }
        }
        if in_chunk > 0 {
            chunks += 1;
            info!(chunk = chunks, rows = in_chunk, "Loaded liked-posts chunk");
        }

        info!(
            pairs = liked.pair_count(),
            users = liked.user_count(),
            "Liked posts loaded"
        );
        Ok(liked)
    }

    /// `SELECT *` into a feature table; columns of unsupported types are skipped
    pub async fn load_table(&self, table: &str) -> Result<FeatureTable> {
        let sql = format!("SELECT * FROM {}", table);

        let describe = (&self.pool).describe(sql.as_str()).await?;
        let mut kept: Vec<(usize, String, ColumnKind)> = Vec::new();
        for (idx, column) in describe.columns().iter().enumerate() {
            let type_name = column.type_info().name();
            match ColumnKind::from_type_name(type_name) {
                Some(kind) => kept.push((idx, column.name().to_string(), kind)),
                None => warn!(
                    table,
                    column = column.name(),
                    type_name,
                    "Skipping column of unsupported type"
                ),
            }
        }

        let columns = kept.iter().map(|(_, name, _)| name.clone()).collect();
        let mut features = FeatureTable::new(columns);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        for row in &rows {
            let values = kept
                .iter()
                .map(|(idx, _, kind)| kind.read(row, *idx))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            features.push_row(values)?;
        }

        let promoted = features.promote_nullable_int_columns();
        if !promoted.is_empty() {
            info!(table, columns = ?promoted, "Integer columns with nulls read as floats");
        }

        info!(
            table,
            rows = features.len(),
            columns = features.columns().len(),
            "Loaded feature table"
        );
        Ok(features)
    }
}

fn liked_posts_query(feed_table: &str) -> String {
    format!(
        "SELECT DISTINCT post_id::BIGINT AS post_id, user_id::BIGINT AS user_id \
         FROM {} WHERE action = $1",
        feed_table
    )
}
