//! Article store operations: the dedup upsert and read-side queries.

use crate::data::models::{Article, ArticleCandidate, UpsertOutcome};
use crate::error::{CoreError, Result};
use crate::matching::hash;
use crate::matching::linker::CategoryMatch;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, warn};
use uuid::Uuid;

/// Insert-or-update an article and merge its category links, keyed by
/// `url_hash`. Atomic per article.
///
/// On first sighting the article and all links are inserted. On re-sighting,
/// `last_seen` advances, missing fields are backfilled from the candidate,
/// and each incoming link is inserted or raised to the higher relevance.
/// Concurrent upserts of the same URL are resolved by retrying the losing
/// insert as an update.
pub async fn upsert_article_with_links(
    candidate: &ArticleCandidate,
    links: &[CategoryMatch],
    pool: &PgPool,
) -> Result<UpsertOutcome> {
    let url_hash = hash::url_hash(&candidate.source_url);
    let content_hash = candidate.content.as_deref().map(hash::content_hash);

    // Two passes at most: a concurrent insert of the same url_hash turns our
    // insert into an update on the second pass.
    for attempt in 0..2 {
        let mut tx = pool.begin().await?;

        let existing = sqlx::query_as::<_, Article>(
            "SELECT * FROM articles WHERE url_hash = $1 FOR UPDATE",
        )
        .bind(&url_hash)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(existing) = existing {
            merge_existing(&mut tx, &existing, candidate, content_hash.as_deref()).await?;
            insert_links(&mut tx, existing.id, links).await?;
            tx.commit().await?;
            return Ok(UpsertOutcome::Updated);
        }

        let inserted = sqlx::query_as::<_, Article>(
            r#"
            INSERT INTO articles (
                title, content, author, publish_date, source_url, image_url,
                url_hash, content_hash, keywords_matched, relevance_score,
                last_seen, crawl_job_id
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW(), $11)
            RETURNING *
            "#,
        )
        .bind(&candidate.title)
        .bind(&candidate.content)
        .bind(&candidate.author)
        .bind(candidate.publish_date)
        .bind(candidate.source_url.trim())
        .bind(&candidate.image_url)
        .bind(&url_hash)
        .bind(&content_hash)
        .bind(&candidate.keywords_matched)
        .bind(candidate.relevance_score)
        .bind(candidate.crawl_job_id)
        .fetch_one(&mut *tx)
        .await;

        match inserted {
            Ok(article) => {
                insert_links(&mut tx, article.id, links).await?;
                tx.commit().await?;
                report_content_collision(&article, pool).await;
                return Ok(UpsertOutcome::Inserted);
            }
            Err(e) if crate::data::categories::is_unique_violation(&e, "articles_url_hash_key") => {
                // Lost the race; roll back and merge into the winner's row.
                drop(tx);
                debug!(url_hash = %url_hash, attempt, "concurrent upsert detected, retrying as update");
                continue;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(CoreError::Application(format!(
        "upsert for url_hash {url_hash} did not converge"
    )))
}

async fn merge_existing(
    tx: &mut Transaction<'_, Postgres>,
    existing: &Article,
    candidate: &ArticleCandidate,
    content_hash: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE articles SET
            last_seen = NOW(),
            content = COALESCE(content, $2),
            content_hash = COALESCE(content_hash, $3),
            author = COALESCE(author, $4),
            publish_date = COALESCE(publish_date, $5),
            image_url = COALESCE(image_url, $6),
            crawl_job_id = COALESCE($7, crawl_job_id),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(existing.id)
    .bind(&candidate.content)
    .bind(content_hash)
    .bind(&candidate.author)
    .bind(candidate.publish_date)
    .bind(&candidate.image_url)
    .bind(candidate.crawl_job_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn insert_links(
    tx: &mut Transaction<'_, Postgres>,
    article_id: Uuid,
    links: &[CategoryMatch],
) -> Result<()> {
    for link in links {
        sqlx::query(
            r#"
            INSERT INTO article_categories (article_id, category_id, relevance_score)
            VALUES ($1, $2, $3)
            ON CONFLICT (article_id, category_id) DO UPDATE SET
                relevance_score = GREATEST(article_categories.relevance_score, EXCLUDED.relevance_score)
            "#,
        )
        .bind(article_id)
        .bind(link.category_id)
        .bind(link.relevance_score)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

/// Content-hash equality across different URLs is reported, never merged.
async fn report_content_collision(article: &Article, pool: &PgPool) {
    let Some(content_hash) = &article.content_hash else {
        return;
    };

    let twins: std::result::Result<Vec<(Uuid,)>, _> = sqlx::query_as(
        "SELECT id FROM articles WHERE content_hash = $1 AND id != $2 LIMIT 5",
    )
    .bind(content_hash)
    .bind(article.id)
    .fetch_all(pool)
    .await;

    match twins {
        Ok(twins) if !twins.is_empty() => {
            let ids: Vec<Uuid> = twins.into_iter().map(|(id,)| id).collect();
            warn!(
                article_id = %article.id,
                content_hash = %content_hash,
                twins = ?ids,
                "identical content under different URLs"
            );
        }
        Ok(_) => {}
        Err(e) => debug!(error = ?e, "content collision check failed"),
    }
}

pub async fn get_article(article_id: Uuid, pool: &PgPool) -> Result<Article> {
    sqlx::query_as::<_, Article>("SELECT * FROM articles WHERE id = $1")
        .bind(article_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| CoreError::not_found("article", article_id))
}

/// A category association as seen from an article.
#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct ArticleCategoryRef {
    pub category_id: Uuid,
    pub name: String,
    pub relevance_score: f64,
}

pub async fn get_article_categories(
    article_id: Uuid,
    pool: &PgPool,
) -> Result<Vec<ArticleCategoryRef>> {
    let rows = sqlx::query_as::<_, ArticleCategoryRef>(
        "SELECT ac.category_id, c.name, ac.relevance_score \
         FROM article_categories ac \
         JOIN categories c ON c.id = ac.category_id \
         WHERE ac.article_id = $1 \
         ORDER BY ac.relevance_score DESC, c.name ASC",
    )
    .bind(article_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Filters for article listings and exports.
#[derive(Debug, Clone, Default)]
pub struct ArticleFilter {
    pub category_id: Option<Uuid>,
    pub published_after: Option<DateTime<Utc>>,
    pub published_before: Option<DateTime<Utc>>,
    pub title_query: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

/// Paginated article listing, newest publish date first (unknown dates last).
/// Returns the page and the total row count for the filter.
pub async fn list_articles(filter: &ArticleFilter, pool: &PgPool) -> Result<(Vec<Article>, i64)> {
    let limit = if filter.limit <= 0 { 50 } else { filter.limit };
    let title_pattern = filter
        .title_query
        .as_ref()
        .map(|q| format!("%{}%", q.replace('%', "\\%").replace('_', "\\_")));

    let rows = sqlx::query_as::<_, Article>(
        r#"
        SELECT a.* FROM articles a
        WHERE ($1::uuid IS NULL OR EXISTS (
            SELECT 1 FROM article_categories ac
            WHERE ac.article_id = a.id AND ac.category_id = $1
        ))
        AND ($2::timestamptz IS NULL OR a.publish_date >= $2)
        AND ($3::timestamptz IS NULL OR a.publish_date <= $3)
        AND ($4::text IS NULL OR a.title ILIKE $4)
        ORDER BY a.publish_date DESC NULLS LAST, a.created_at DESC
        LIMIT $5 OFFSET $6
        "#,
    )
    .bind(filter.category_id)
    .bind(filter.published_after)
    .bind(filter.published_before)
    .bind(&title_pattern)
    .bind(limit)
    .bind(filter.offset.max(0))
    .fetch_all(pool)
    .await?;

    let (total,): (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FROM articles a
        WHERE ($1::uuid IS NULL OR EXISTS (
            SELECT 1 FROM article_categories ac
            WHERE ac.article_id = a.id AND ac.category_id = $1
        ))
        AND ($2::timestamptz IS NULL OR a.publish_date >= $2)
        AND ($3::timestamptz IS NULL OR a.publish_date <= $3)
        AND ($4::text IS NULL OR a.title ILIKE $4)
        "#,
    )
    .bind(filter.category_id)
    .bind(filter.published_after)
    .bind(filter.published_before)
    .bind(&title_pattern)
    .fetch_one(pool)
    .await?;

    Ok((rows, total))
}

/// Aggregate article statistics.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ArticleStats {
    pub total: i64,
    pub with_content: i64,
    pub seen_last_24h: i64,
    pub by_category: Vec<CategoryCount>,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct CategoryCount {
    pub category_id: Uuid,
    pub name: String,
    pub article_count: i64,
}

pub async fn get_article_stats(pool: &PgPool) -> Result<ArticleStats> {
    let since = Utc::now() - Duration::hours(24);

    let (total, with_content, seen_last_24h): (i64, i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), \
                COUNT(*) FILTER (WHERE content IS NOT NULL), \
                COUNT(*) FILTER (WHERE last_seen >= $1) \
         FROM articles",
    )
    .bind(since)
    .fetch_one(pool)
    .await?;

    let by_category = sqlx::query_as::<_, CategoryCount>(
        "SELECT c.id AS category_id, c.name, COUNT(ac.article_id)::BIGINT AS article_count \
         FROM categories c \
         LEFT JOIN article_categories ac ON ac.category_id = c.id \
         GROUP BY c.id, c.name \
         ORDER BY article_count DESC, c.name ASC",
    )
    .fetch_all(pool)
    .await?;

    Ok(ArticleStats {
        total,
        with_content,
        seen_last_24h,
        by_category,
    })
}

/// Delete an article explicitly. Links cascade.
pub async fn delete_article(article_id: Uuid, pool: &PgPool) -> Result<bool> {
    let result = sqlx::query("DELETE FROM articles WHERE id = $1")
        .bind(article_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
