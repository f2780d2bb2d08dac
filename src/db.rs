use crate::config::{env_parse, env_string};
use crate::targets::Column;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_with::skip_serializing_none;
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::{collections::BTreeMap, sync::Arc};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("query failed: {0}")]
    Query(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(value: sqlx::Error) -> Self {
        Self::Query(value.to_string())
    }
}

/// One row of `products`.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, sqlx::FromRow)]
pub struct ProductRecord {
    pub sku: String,
    pub category: Option<String>,
    pub pre_image: Option<String>,
    pub sketch_image: Option<String>,
    pub wax_image: Option<String>,
    pub cast_image: Option<String>,
    pub final_image: Option<String>,
    pub sketch_description: Option<String>,
    pub wax_description: Option<String>,
    pub cast_description: Option<String>,
    pub final_description: Option<String>,
    pub sketch_alt_text: Option<String>,
    pub wax_alt_text: Option<String>,
    pub cast_alt_text: Option<String>,
    pub final_alt_text: Option<String>,
    pub product_name: Option<String>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProductRecord {
    pub fn new(sku: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            sku: sku.into(),
            category: Some(category.into()),
            ..Self::default()
        }
    }

    fn slot(&self, column: Column) -> &Option<String> {
        match column {
            Column::PreImage => &self.pre_image,
            Column::SketchImage => &self.sketch_image,
            Column::WaxImage => &self.wax_image,
            Column::CastImage => &self.cast_image,
            Column::FinalImage => &self.final_image,
            Column::SketchDescription => &self.sketch_description,
            Column::WaxDescription => &self.wax_description,
            Column::CastDescription => &self.cast_description,
            Column::FinalDescription => &self.final_description,
            Column::SketchAltText => &self.sketch_alt_text,
            Column::WaxAltText => &self.wax_alt_text,
            Column::CastAltText => &self.cast_alt_text,
            Column::FinalAltText => &self.final_alt_text,
            Column::ProductName => &self.product_name,
            Column::MetaTitle => &self.meta_title,
            Column::MetaDescription => &self.meta_description,
        }
    }

    fn slot_mut(&mut self, column: Column) -> &mut Option<String> {
        match column {
            Column::PreImage => &mut self.pre_image,
            Column::SketchImage => &mut self.sketch_image,
            Column::WaxImage => &mut self.wax_image,
            Column::CastImage => &mut self.cast_image,
            Column::FinalImage => &mut self.final_image,
            Column::SketchDescription => &mut self.sketch_description,
            Column::WaxDescription => &mut self.wax_description,
            Column::CastDescription => &mut self.cast_description,
            Column::FinalDescription => &mut self.final_description,
            Column::SketchAltText => &mut self.sketch_alt_text,
            Column::WaxAltText => &mut self.wax_alt_text,
            Column::CastAltText => &mut self.cast_alt_text,
            Column::FinalAltText => &mut self.final_alt_text,
            Column::ProductName => &mut self.product_name,
            Column::MetaTitle => &mut self.meta_title,
            Column::MetaDescription => &mut self.meta_description,
        }
    }

    /// Blank strings count as unset.
    pub fn get(&self, column: Column) -> Option<&str> {
        self.slot(column)
            .as_deref()
            .filter(|value| !value.trim().is_empty())
    }

    pub fn set(&mut self, column: Column, value: impl Into<String>) {
        *self.slot_mut(column) = Some(value.into());
    }

    pub fn has_meta_title(&self) -> bool {
        self.get(Column::MetaTitle).is_some()
    }

    pub fn has_original(&self) -> bool {
        self.get(Column::PreImage).is_some()
    }
}

/// A single-row write: one column, optionally the write-once original image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnWrite {
    pub column: Column,
    pub value: String,
    pub original: Option<String>,
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn find(&self, sku: &str) -> Result<Option<ProductRecord>, StoreError>;

    async fn list(&self) -> Result<Vec<ProductRecord>, StoreError>;

    /// Applies `write` and stamps `updated_at` in one statement. `pre_image`
    /// is only ever filled when it is still null. Returns the affected row count.
    async fn apply(
        &self,
        sku: &str,
        write: &ColumnWrite,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError>;
}

const SELECT_COLUMNS: &str = "sku, category, pre_image, sketch_image, wax_image, cast_image, \
    final_image, sketch_description, wax_description, cast_description, final_description, \
    sketch_alt_text, wax_alt_text, cast_alt_text, final_alt_text, product_name, meta_title, \
    meta_description, updated_at";

#[derive(Clone)]
pub struct PgProductStore {
    pool: PgPool,
}

impl PgProductStore {
    /// Connects when `DATABASE_URL` is set. Migrations only run with
    /// `DATABASE_RUN_MIGRATIONS=true`; the table is normally owned elsewhere.
    pub async fn from_env() -> Result<Option<Self>, StoreError> {
        let Some(url) = env_string("DATABASE_URL") else {
            return Ok(None);
        };
        let max_connections =
            env_parse("DATABASE_MAX_CONNECTIONS", |v: &u32| *v > 0).unwrap_or(5);
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(&url)
            .await?;
        if env_parse("DATABASE_RUN_MIGRATIONS", |_: &bool| true).unwrap_or(false) {
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .map_err(|err| StoreError::Query(err.to_string()))?;
        }
        info!(target = "studio.db", max_connections, "postgres pool ready");
        Ok(Some(Self { pool }))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn update_statement(write: &ColumnWrite) -> String {
        let column = write.column.as_str();
        let assignment = if write.column == Column::PreImage {
            format!("{column} = {}", keep_original("$1"))
        } else {
            format!("{column} = $1")
        };
        let original = if write.original.is_some() && write.column != Column::PreImage {
            format!(", pre_image = {}", keep_original("$4"))
        } else {
            String::new()
        };
        format!("UPDATE products SET {assignment}{original}, updated_at = $2 WHERE sku = $3")
    }
}

/// Writes `param` into `pre_image` only while it is null or blank, matching
/// [`ProductRecord::has_original`].
fn keep_original(param: &str) -> String {
    format!("CASE WHEN NULLIF(TRIM(pre_image), '') IS NULL THEN {param} ELSE pre_image END")
}

#[async_trait]
impl ProductStore for PgProductStore {
    async fn find(&self, sku: &str) -> Result<Option<ProductRecord>, StoreError> {
        let query = format!("SELECT {SELECT_COLUMNS} FROM products WHERE sku = $1");
        let row = sqlx::query_as::<_, ProductRecord>(&query)
            .bind(sku)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list(&self) -> Result<Vec<ProductRecord>, StoreError> {
        let query = format!("SELECT {SELECT_COLUMNS} FROM products ORDER BY sku");
        let rows = sqlx::query_as::<_, ProductRecord>(&query)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn apply(
        &self,
        sku: &str,
        write: &ColumnWrite,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let statement = Self::update_statement(write);
        let mut query = sqlx::query(&statement)
            .bind(&write.value)
            .bind(now)
            .bind(sku);
        if write.column != Column::PreImage
            && let Some(original) = &write.original
        {
            query = query.bind(original);
        }
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

/// In-process store used when no database is configured, and by tests.
#[derive(Clone, Default)]
pub struct MemoryProductStore {
    rows: Arc<Mutex<BTreeMap<String, ProductRecord>>>,
}

impl MemoryProductStore {
    pub fn new(records: impl IntoIterator<Item = ProductRecord>) -> Self {
        let rows = records
            .into_iter()
            .map(|record| (record.sku.clone(), record))
            .collect();
        Self {
            rows: Arc::new(Mutex::new(rows)),
        }
    }

    pub fn demo() -> Self {
        let mut ring = ProductRecord::new("RNG-1001", "Rings");
        ring.product_name = Some("Solitaire Engagement Ring".into());
        ring.meta_title = Some("Handmade Solitaire Engagement Ring in 18k Gold".into());
        let mut pendant = ProductRecord::new("PND-2001", "Pendants");
        pendant.product_name = Some("Moonstone Drop Pendant".into());
        Self::new([
            ring,
            pendant,
            ProductRecord::new("BRC-3001", "Bracelets"),
        ])
    }
}

#[async_trait]
impl ProductStore for MemoryProductStore {
    async fn find(&self, sku: &str) -> Result<Option<ProductRecord>, StoreError> {
        Ok(self.rows.lock().await.get(sku).cloned())
    }

    async fn list(&self) -> Result<Vec<ProductRecord>, StoreError> {
        Ok(self.rows.lock().await.values().cloned().collect())
    }

    async fn apply(
        &self,
        sku: &str,
        write: &ColumnWrite,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut guard = self.rows.lock().await;
        let Some(record) = guard.get_mut(sku) else {
            return Ok(0);
        };
        if write.column != Column::PreImage || !record.has_original() {
            record.set(write.column, write.value.clone());
        }
        if let Some(original) = &write.original
            && !record.has_original()
        {
            record.pre_image = Some(original.clone());
        }
        record.updated_at = Some(now);
        Ok(1)
    }
}
