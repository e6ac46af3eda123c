use anyhow::Result;
use async_trait::async_trait;
use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{FactRow, StoredBlob};
use crate::filter::FactQuery;
use crate::gateway::{Gateway, GatewayError, ProgressFn, UploadOptions};
use crate::model::{Fact, FactId, FactPatch, NewFact, VoteCounter};

const FACT_COLUMNS: &str = "id, created_at, text, source, category, image_url, \
     votes_interesting, votes_mindblowing, votes_false";

fn sql_column(counter: VoteCounter) -> &'static str {
    match counter {
        VoteCounter::Interesting => "votes_interesting",
        VoteCounter::Mindblowing => "votes_mindblowing",
        VoteCounter::False => "votes_false",
    }
}

impl Database {
    /// Read back a stored blob.
    pub async fn get_blob(&self, container: &str, name: &str) -> Result<Option<StoredBlob>> {
        let blob = sqlx::query_as(
            "SELECT bytes, content_type, cache_control FROM fact_images WHERE container = ? AND name = ?",
        )
        .bind(container)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(blob)
    }

    /// Number of facts in the table.
    pub async fn count_facts(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM facts")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl Gateway for Database {
    async fn read_facts(&self, query: &FactQuery) -> Result<Vec<Fact>, GatewayError> {
        let mut builder: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new(format!("SELECT {FACT_COLUMNS} FROM facts WHERE 1 = 1"));

        if let Some(category) = query.category {
            builder.push(" AND category = ").push_bind(category.name());
        }

        let direction = if query.descending { "DESC" } else { "ASC" };
        builder.push(format!(
            " ORDER BY {} {}, id ASC",
            sql_column(query.order_by),
            direction
        ));

        // SQLite's LIKE folds ASCII only, so text search runs on the
        // ordered rows here and the limit applies after it.
        if query.text_contains.is_none() {
            builder
                .push(" LIMIT ")
                .push_bind(i64::try_from(query.limit).unwrap_or(i64::MAX));
        }

        let rows: Vec<FactRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .filter_map(FactRow::into_fact)
            .filter(|fact| query.matches(fact))
            .take(query.limit)
            .collect())
    }

    async fn insert_fact(&self, fact: &NewFact) -> Result<Fact, GatewayError> {
        let row: FactRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO facts (created_at, text, source, category, image_url,
                               votes_interesting, votes_mindblowing, votes_false)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {FACT_COLUMNS}
        "#
        ))
        .bind(chrono::Utc::now().timestamp_millis())
        .bind(&fact.text)
        .bind(&fact.source)
        .bind(fact.category.name())
        .bind(&fact.image_url)
        .bind(i64::from(fact.votes_interesting))
        .bind(i64::from(fact.votes_mindblowing))
        .bind(i64::from(fact.votes_false))
        .fetch_one(&self.pool)
        .await?;

        let id = FactId(row.id);
        tracing::debug!(%id, "Inserted fact");
        row.into_fact().ok_or(GatewayError::NotFound(id))
    }

    async fn update_fact(&self, id: FactId, patch: &FactPatch) -> Result<Fact, GatewayError> {
        let row: Option<FactRow> = sqlx::query_as(&format!(
            r#"
            UPDATE facts SET
                image_url = COALESCE(?, image_url),
                votes_interesting = COALESCE(?, votes_interesting),
                votes_mindblowing = COALESCE(?, votes_mindblowing),
                votes_false = COALESCE(?, votes_false)
            WHERE id = ?
            RETURNING {FACT_COLUMNS}
        "#
        ))
        .bind(patch.image_url.as_deref())
        .bind(patch.votes_interesting.map(i64::from))
        .bind(patch.votes_mindblowing.map(i64::from))
        .bind(patch.votes_false.map(i64::from))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.and_then(FactRow::into_fact)
            .ok_or(GatewayError::NotFound(id))
    }

    async fn upload_blob(
        &self,
        container: &str,
        object: &str,
        bytes: Vec<u8>,
        content_type: &str,
        options: &UploadOptions,
        progress: Option<ProgressFn>,
    ) -> Result<(), GatewayError> {
        if let Some(report) = &progress {
            report(0);
        }

        let mut sql = String::from(
            "INSERT INTO fact_images (container, name, bytes, content_type, cache_control, uploaded_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        );
        if options.overwrite {
            sql.push_str(
                " ON CONFLICT(container, name) DO UPDATE SET bytes = excluded.bytes, \
                 content_type = excluded.content_type, cache_control = excluded.cache_control, \
                 uploaded_at = excluded.uploaded_at",
            );
        }

        let size = bytes.len();
        sqlx::query(&sql)
            .bind(container)
            .bind(object)
            .bind(bytes)
            .bind(content_type)
            .bind(&options.cache_control)
            .bind(chrono::Utc::now().timestamp_millis())
            .execute(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                    GatewayError::Conflict(format!("{container}/{object}"))
                }
                other => GatewayError::Database(other),
            })?;

        tracing::debug!(container, object, bytes = size, "Stored blob");
        if let Some(report) = &progress {
            report(100);
        }
        Ok(())
    }

    fn public_url(&self, container: &str, object: &str) -> String {
        format!("{}/{}/{}", self.public_url_base, container, object)
    }
}
