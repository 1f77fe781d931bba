use async_trait::async_trait;
use chrono::Utc;
use pricewatch_core::{
    Category, Distributor, DistributorPrices, NormalizedRecord, PageRequest, Product,
    ProductFilter, ProductPage, UpdateOp,
};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{CatalogStore, StoreError};

const PRODUCT_COLUMNS: &str =
    "id, name, image_url, price_d1, price_exito, price_olim, category_id, created_at";

// 8 bind parameters per row keeps each statement well under the 65535 limit.
const INSERT_CHUNK_ROWS: usize = 1000;

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        info!("catalog migrations applied");
        Ok(())
    }
}

fn price_column(distributor: Distributor) -> &'static str {
    match distributor {
        Distributor::D1 => "price_d1",
        Distributor::Exito => "price_exito",
        Distributor::Olimpica => "price_olim",
    }
}

fn category_from_row(row: &PgRow) -> Result<Category, sqlx::Error> {
    Ok(Category {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        created_at: row.try_get("created_at")?,
    })
}

fn product_from_row(row: &PgRow) -> Result<Product, sqlx::Error> {
    Ok(Product {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        image_url: row.try_get("image_url")?,
        prices: DistributorPrices {
            d1: row.try_get("price_d1")?,
            exito: row.try_get("price_exito")?,
            olimpica: row.try_get("price_olim")?,
        },
        category_id: row.try_get("category_id")?,
        created_at: row.try_get("created_at")?,
    })
}

fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Translates a `ProductFilter` into WHERE clauses on `builder`.
fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &ProductFilter) {
    builder.push(" WHERE TRUE");
    if let Some(category_id) = filter.category_id {
        builder.push(" AND category_id = ").push_bind(category_id);
    }
    if let Some(needle) = filter.search_needle() {
        builder
            .push(" AND name ILIKE ")
            .push_bind(format!("%{}%", escape_like(&needle)));
    }
    if let Some(max_price) = filter.max_price {
        builder.push(" AND (");
        for (idx, distributor) in Distributor::ALL.into_iter().enumerate() {
            if idx > 0 {
                builder.push(" OR ");
            }
            let column = price_column(distributor);
            builder
                .push(format!("({column} > 0 AND {column} <= "))
                .push_bind(max_price)
                .push(")");
        }
        builder.push(")");
    }
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn find_category_by_name(&self, name: &str) -> Result<Option<Category>, StoreError> {
        let row = sqlx::query("SELECT id, name, created_at FROM categories WHERE name = $1 LIMIT 1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(category_from_row).transpose()?)
    }

    async fn create_category(&self, name: &str) -> Result<Category, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO categories (id, name, created_at)
            VALUES ($1, $2, $3)
            RETURNING id, name, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(category_from_row(&row)?)
    }

    async fn list_categories(&self) -> Result<Vec<Category>, StoreError> {
        let rows = sqlx::query("SELECT id, name, created_at FROM categories ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(category_from_row).collect::<Result<_, _>>()?)
    }

    async fn find_all_products(&self) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY created_at, id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(product_from_row).collect::<Result<_, _>>()?)
    }

    async fn find_product_by_id(&self, id: Uuid) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(product_from_row).transpose()?)
    }

    async fn find_products_by_category(
        &self,
        category_id: Uuid,
        excluding: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {PRODUCT_COLUMNS}
              FROM products
             WHERE category_id = $1
               AND ($2::uuid IS NULL OR id <> $2)
             ORDER BY created_at, id
             LIMIT $3
            "#
        ))
        .bind(category_id)
        .bind(excluding)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(product_from_row).collect::<Result<_, _>>()?)
    }

    async fn list_products(
        &self,
        filter: &ProductFilter,
        page: PageRequest,
    ) -> Result<ProductPage, StoreError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) AS total FROM products");
        push_filter(&mut count, filter);
        let total: i64 = count.build().fetch_one(&self.pool).await?.try_get("total")?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {PRODUCT_COLUMNS} FROM products"));
        push_filter(&mut select, filter);
        select
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(i64::from(page.limit))
            .push(" OFFSET ")
            .push_bind(page.offset() as i64);
        let rows = select.build().fetch_all(&self.pool).await?;
        let data = rows.iter().map(product_from_row).collect::<Result<_, _>>()?;

        Ok(ProductPage::new(data, total.max(0) as u64, page))
    }

    async fn update_products(&self, updates: &[UpdateOp]) -> Result<usize, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut applied = 0usize;

        for update in updates.iter().filter(|u| !u.is_empty()) {
            let mut builder = QueryBuilder::<Postgres>::new("UPDATE products SET ");
            let mut assignments = builder.separated(", ");
            for (distributor, amount) in &update.prices {
                assignments.push(format!("{} = ", price_column(*distributor)));
                assignments.push_bind_unseparated(*amount);
            }
            if let Some(image_url) = &update.image_url {
                assignments.push("image_url = ");
                assignments.push_bind_unseparated(image_url.clone());
            }
            builder.push(" WHERE id = ").push_bind(update.product_id);

            let result = builder.build().execute(&mut *tx).await?;
            if result.rows_affected() == 0 {
                // dropping `tx` rolls back every earlier statement
                return Err(StoreError::ProductNotFound(update.product_id));
            }
            applied += 1;
        }

        tx.commit().await?;
        debug!(applied, "product update transaction committed");
        Ok(applied)
    }

    async fn create_products(&self, records: &[NormalizedRecord]) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        for chunk in records.chunks(INSERT_CHUNK_ROWS) {
            let mut builder = QueryBuilder::<Postgres>::new(format!("INSERT INTO products ({PRODUCT_COLUMNS}) "));
            builder.push_values(chunk, |mut row, record| {
                row.push_bind(Uuid::new_v4())
                    .push_bind(record.name.clone())
                    .push_bind(record.image_url.clone())
                    .push_bind(record.prices.d1)
                    .push_bind(record.prices.exito)
                    .push_bind(record.prices.olimpica)
                    .push_bind(record.category_id)
                    .push_bind(now);
            });
            builder.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(records.len())
    }
}
