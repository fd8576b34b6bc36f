use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::debug;

use stylematch_core::domain::product::{Product, ProductId};
use stylematch_core::recommend::{CandidateFilter, CatalogStore, StoreError};

use super::{decode_err, parse_timestamp, RepositoryError, MAX_BIND_CHUNK};
use crate::DbPool;

const PRODUCT_COLUMNS: &str = "id, title, brand, price, category, tags_json, image_url, style, \
                               rating, review_count, is_active, created_at";

pub struct SqlProductRepository {
    pool: DbPool,
}

impl SqlProductRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, product: &Product) -> Result<(), RepositoryError> {
        let tags_json = serde_json::to_string(&product.tags).map_err(decode_err)?;
        sqlx::query(
            "INSERT INTO product (
                id, title, brand, price, category, tags_json, image_url, style,
                rating, review_count, is_active, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                brand = excluded.brand,
                price = excluded.price,
                category = excluded.category,
                tags_json = excluded.tags_json,
                image_url = excluded.image_url,
                style = excluded.style,
                rating = excluded.rating,
                review_count = excluded.review_count,
                is_active = excluded.is_active,
                created_at = excluded.created_at",
        )
        .bind(product.id.as_str())
        .bind(&product.title)
        .bind(product.brand.as_deref())
        .bind(product.price)
        .bind(product.category.as_deref())
        .bind(tags_json)
        .bind(product.image_url.as_deref())
        .bind(product.style.as_deref())
        .bind(product.rating)
        .bind(product.review_count.map(i64::from))
        .bind(product.active)
        .bind(product.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn count_active(&self) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM product WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn query_candidates(
        &self,
        filter: &CandidateFilter,
    ) -> Result<Vec<Product>, RepositoryError> {
        if filter.limit == 0 {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {PRODUCT_COLUMNS} FROM product WHERE 1=1"));

        if filter.active_only {
            builder.push(" AND is_active = 1");
        }
        if filter.require_image {
            builder.push(" AND image_url IS NOT NULL AND trim(image_url) <> ''");
        }
        if let Some(min) = filter.min_price {
            builder.push(" AND price IS NOT NULL AND price >= ").push_bind(min);
        }
        if let Some(max) = filter.max_price {
            builder.push(" AND price IS NOT NULL AND price <= ").push_bind(max);
        }
        // List predicates bind one JSON array each, so their size never counts
        // against SQLite's bound-parameter limit.
        if !filter.exclude_brands.is_empty() {
            let brands = json_array(&filter.exclude_brands)?;
            builder.push(" AND (brand IS NULL OR lower(trim(brand)) NOT IN ");
            builder.push(JSON_VALUES).push_bind(brands).push(")))");
        }
        if !filter.exclude_categories.is_empty() {
            let categories = json_array(&filter.exclude_categories)?;
            builder.push(" AND (category IS NULL OR lower(trim(category)) NOT IN ");
            builder.push(JSON_VALUES).push_bind(categories).push(")))");
        }
        if !filter.exclude_ids.is_empty() {
            let ids = json_array(&filter.exclude_ids)?;
            builder.push(" AND id NOT IN ").push(JSON_VALUES).push_bind(ids).push("))");
        }
        if !filter.require_any_tags.is_empty() {
            let tags = json_array(&filter.require_any_tags)?;
            builder.push(" AND EXISTS (SELECT 1 FROM json_each(product.tags_json) AS tag");
            builder.push(" WHERE tag.value IN ").push(JSON_VALUES).push_bind(tags).push(")))");
        }

        let limit = i64::try_from(filter.limit).unwrap_or(i64::MAX);
        builder.push(" ORDER BY created_at DESC, id ASC LIMIT ").push_bind(limit);

        let rows = builder.build().fetch_all(&self.pool).await?;
        debug!(
            event_name = "catalog.candidates",
            limit = filter.limit,
            excluded_ids = filter.exclude_ids.len(),
            tag_filtered = !filter.require_any_tags.is_empty(),
            returned = rows.len(),
            "candidate query finished"
        );
        rows.iter().map(row_to_product).collect()
    }

    async fn query_many(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        let mut products = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_BIND_CHUNK) {
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new(format!("SELECT {PRODUCT_COLUMNS} FROM product WHERE id IN ("));
            let mut separated = builder.separated(", ");
            for id in chunk {
                separated.push_bind(id.as_str().to_string());
            }
            builder.push(")");

            let rows = builder.build().fetch_all(&self.pool).await?;
            for row in &rows {
                products.push(row_to_product(row)?);
            }
        }
        Ok(products)
    }
}

const JSON_VALUES: &str = "(SELECT value FROM json_each(";

fn json_array<T: Serialize>(values: &BTreeSet<T>) -> Result<String, RepositoryError> {
    serde_json::to_string(values).map_err(decode_err)
}

fn row_to_product(row: &SqliteRow) -> Result<Product, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_err)?;
    let title: String = row.try_get("title").map_err(decode_err)?;
    let tags_json: String = row.try_get("tags_json").map_err(decode_err)?;
    let created_at: String = row.try_get("created_at").map_err(decode_err)?;
    let review_count: Option<i64> = row.try_get("review_count").map_err(decode_err)?;

    let tags: Vec<String> = serde_json::from_str(&tags_json)
        .map_err(|e| RepositoryError::Decode(format!("invalid tags_json for {id}: {e}")))?;

    let mut product = Product::new(id, title, parse_timestamp("created_at", &created_at)?)
        .with_tags(tags);
    product.brand = row.try_get("brand").map_err(decode_err)?;
    product.price = row.try_get("price").map_err(decode_err)?;
    product.category = row.try_get("category").map_err(decode_err)?;
    product.image_url = row.try_get("image_url").map_err(decode_err)?;
    product.style = row.try_get("style").map_err(decode_err)?;
    product.rating = row.try_get("rating").map_err(decode_err)?;
    product.review_count =
        review_count.map(|count| u32::try_from(count.max(0)).unwrap_or(u32::MAX));
    product.active = row.try_get("is_active").map_err(decode_err)?;
    Ok(product)
}

#[async_trait]
impl CatalogStore for SqlProductRepository {
    async fn fetch_candidates(&self, filter: &CandidateFilter) -> Result<Vec<Product>, StoreError> {
        Ok(self.query_candidates(filter).await?)
    }

    async fn find_many(&self, ids: &[ProductId]) -> Result<Vec<Product>, StoreError> {
        Ok(self.query_many(ids).await?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use stylematch_core::domain::product::{Product, ProductId};
    use stylematch_core::recommend::{CandidateFilter, CatalogStore};

    use super::SqlProductRepository;
    use crate::{connect_with_settings, migrations};

    async fn repository() -> SqlProductRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");
        SqlProductRepository::new(pool)
    }

    fn product(id: &str, minutes: i64) -> Product {
        let base = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().expect("valid timestamp");
        Product::new(id, format!("Item {id}"), base + Duration::minutes(minutes))
            .with_image(format!("https://img.example/{id}.jpg"))
    }

    async fn seed(repo: &SqlProductRepository, products: &[Product]) {
        for product in products {
            repo.upsert(product).await.expect("upsert product");
        }
    }

    fn ids(products: &[Product]) -> Vec<&str> {
        products.iter().map(|p| p.id.as_str()).collect()
    }

    #[tokio::test]
    async fn upsert_round_trips_optional_attributes() {
        let repo = repository().await;
        let original = product("p-1", 0)
            .with_brand("Aster")
            .with_category("Tops")
            .with_price(4_500.0)
            .with_tags(["linen", "summer"])
            .with_reviews(4.5, 120)
            .with_style("minimal");
        seed(&repo, std::slice::from_ref(&original)).await;

        let found = repo.find_many(&[ProductId::new("p-1")]).await.expect("find product");
        assert_eq!(found, vec![original]);

        let bare = Product::new("p-2", "Bare", Utc::now());
        seed(&repo, std::slice::from_ref(&bare)).await;
        let found = repo.find_many(&[ProductId::new("p-2")]).await.expect("find bare product");
        assert_eq!(found[0].brand, None);
        assert_eq!(found[0].review_count, None);
        assert!(found[0].tags.is_empty());
    }

    #[tokio::test]
    async fn candidates_respect_active_image_and_limit() {
        let repo = repository().await;
        let mut no_image = product("no-image", 3);
        no_image.image_url = Some("  ".to_string());
        seed(
            &repo,
            &[product("old", 0), product("new", 2), product("gone", 4).inactive(), no_image],
        )
        .await;

        let all = repo
            .fetch_candidates(&CandidateFilter::active(10).with_image_required(true))
            .await
            .expect("fetch candidates");
        assert_eq!(ids(&all), vec!["new", "old"]);

        let limited =
            repo.fetch_candidates(&CandidateFilter::active(1)).await.expect("fetch limited");
        assert_eq!(ids(&limited), vec!["no-image"]);

        let none = repo.fetch_candidates(&CandidateFilter::active(0)).await.expect("fetch none");
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn exclusions_are_case_insensitive_and_keep_unlabeled_items() {
        let repo = repository().await;
        seed(
            &repo,
            &[
                product("a", 0).with_brand("NORTHWIND").with_category("Outerwear"),
                product("b", 1).with_brand("Aster").with_category("Tops"),
                product("c", 2),
            ],
        )
        .await;

        let filter = CandidateFilter::active(10)
            .excluding_brands(["northwind".to_string()])
            .excluding_categories(["TOPS".to_string()]);
        let found = repo.fetch_candidates(&filter).await.expect("fetch candidates");
        assert_eq!(ids(&found), vec!["c"]);

        let by_id = CandidateFilter::active(10).excluding_ids([ProductId::new("c")]);
        let found = repo.fetch_candidates(&by_id).await.expect("fetch by id exclusion");
        assert_eq!(ids(&found), vec!["b", "a"]);
    }

    #[tokio::test]
    async fn long_answered_history_does_not_exhaust_bind_parameters() {
        let repo = repository().await;
        seed(&repo, &[product("answered", 0), product("fresh", 1)]).await;

        let answered = (0..40_000)
            .map(|i| ProductId::new(format!("gone-{i}")))
            .chain(std::iter::once(ProductId::new("answered")));
        let filter = CandidateFilter::active(10).excluding_ids(answered);
        assert!(filter.exclude_ids.len() > 32_766);

        let found = repo.fetch_candidates(&filter).await.expect("fetch with long exclusion");
        assert_eq!(ids(&found), vec!["fresh"]);
    }

    #[tokio::test]
    async fn price_bounds_and_tag_requirement_push_down() {
        let repo = repository().await;
        seed(
            &repo,
            &[
                product("cheap", 0).with_price(1_000.0).with_tags(["trend"]),
                product("mid", 1).with_price(8_000.0).with_tags(["basic"]),
                product("dear", 2).with_price(40_000.0).with_tags(["unique"]),
                product("unpriced", 3).with_tags(["trend"]),
            ],
        )
        .await;

        let bounded = CandidateFilter::active(10).with_price_bounds(Some(500.0), Some(10_000.0));
        let found = repo.fetch_candidates(&bounded).await.expect("fetch bounded");
        assert_eq!(ids(&found), vec!["mid", "cheap"]);

        let tagged = CandidateFilter::active(10).requiring_any_tag(["trend", "unique"]);
        let found = repo.fetch_candidates(&tagged).await.expect("fetch tagged");
        assert_eq!(ids(&found), vec!["unpriced", "dear", "cheap"]);
    }

    #[tokio::test]
    async fn find_many_skips_unknown_ids() {
        let repo = repository().await;
        seed(&repo, &[product("a", 0), product("b", 1)]).await;

        let found = repo
            .find_many(&[ProductId::new("a"), ProductId::new("missing")])
            .await
            .expect("find many");
        assert_eq!(ids(&found), vec!["a"]);
        assert!(repo.find_many(&[]).await.expect("empty lookup").is_empty());
        assert_eq!(repo.count_active().await.expect("count"), 2);
    }
}
