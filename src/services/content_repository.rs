use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use serde::Serialize;
use sqlx::PgPool;

use crate::errors::AppError;
use crate::models::elearning::Module;

pub const DEFAULT_CATEGORY: &str = "Standard";

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ImageRecord {
    pub name: String,
    pub url: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ArticleRecord {
    pub title: String,
    pub url: String,
    pub json_content: Option<serde_json::Value>,
}

#[derive(Serialize, Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct SavedArticle {
    pub id: i64,
    pub title: String,
    pub created: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ModuleStatistics {
    pub module_name: String,
    pub module_id: i64,
    pub is_public: bool,
    pub category: Option<String>,
    pub images_count: i64,
    pub articles_count: i64,
    pub content_count: i64,
    pub tasks_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Checks module data before it is written.
pub fn validate_module_data(module_name: &str, images: &[ImageRecord], articles: &[ArticleRecord]) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if module_name.trim().is_empty() {
        errors.push("Module name is empty".to_string());
    }
    for (i, image) in images.iter().enumerate() {
        if image.name.is_empty() {
            errors.push(format!("Image {}: name missing", i));
        }
        if image.url.is_empty() {
            errors.push(format!("Image {}: URL missing", i));
        }
    }
    for (i, article) in articles.iter().enumerate() {
        if article.title.is_empty() {
            errors.push(format!("Article {}: title missing", i));
        }
        if article.url.is_empty() {
            errors.push(format!("Article {}: URL missing", i));
        }
        if article.json_content.as_ref().map_or(true, |v| v.is_null()) {
            warnings.push(format!("Article {}: JSON content missing", i));
        }
    }

    ValidationReport { valid: errors.is_empty(), errors, warnings }
}

/// Persistence of modules, articles and their images.
#[async_trait]
pub trait ContentRepository: Send + Sync {
    async fn ping(&self) -> Result<(), AppError>;

    /// Finds the module by title or creates it in the default category.
    async fn get_or_create_module(&self, module_name: &str) -> Result<Module, AppError>;

    async fn module_by_id(&self, module_id: i64) -> Result<Option<Module>, AppError>;

    async fn module_by_title(&self, module_name: &str) -> Result<Option<Module>, AppError>;

    /// Inserts or updates images by (module, name). Returns the number written.
    async fn save_article_images(&self, module_id: i64, images: &[ImageRecord]) -> Result<usize, AppError>;

    /// Inserts or updates articles by (module, title).
    async fn save_articles(&self, module_id: i64, articles: &[ArticleRecord]) -> Result<Vec<SavedArticle>, AppError>;

    async fn module_statistics(&self, module_name: &str) -> Result<Option<ModuleStatistics>, AppError>;

    /// Deletes image rows whose name is not in `keep`. Returns the number removed.
    async fn remove_orphaned_images(&self, module_id: i64, keep: &[String]) -> Result<u64, AppError>;
}

pub struct PgContentRepository {
    pool: PgPool,
}

impl PgContentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const MODULE_COLUMNS: &str = "id, title, category_id, is_public, created_at";

#[async_trait]
impl ContentRepository for PgContentRepository {
    async fn ping(&self) -> Result<(), AppError> {
        crate::db::ping(&self.pool).await
    }

    async fn get_or_create_module(&self, module_name: &str) -> Result<Module, AppError> {
        if let Some(module) = self.module_by_title(module_name).await? {
            return Ok(module);
        }

        let mut tx = self.pool.begin().await?;
        let (category_id,): (i64,) = sqlx::query_as(
            "INSERT INTO elearning_module_category (name) VALUES ($1) \
             ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name RETURNING id",
        )
        .bind(DEFAULT_CATEGORY)
        .fetch_one(&mut *tx)
        .await?;

        let module = sqlx::query_as::<_, Module>(&format!(
            "INSERT INTO elearning_module (title, category_id, is_public) VALUES ($1, $2, TRUE) \
             ON CONFLICT (title) DO UPDATE SET title = EXCLUDED.title RETURNING {}",
            MODULE_COLUMNS
        ))
        .bind(module_name)
        .bind(category_id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        info!("Created module {} (id {})", module.title, module.id);
        Ok(module)
    }

    async fn module_by_id(&self, module_id: i64) -> Result<Option<Module>, AppError> {
        let module = sqlx::query_as::<_, Module>(&format!(
            "SELECT {} FROM elearning_module WHERE id = $1",
            MODULE_COLUMNS
        ))
        .bind(module_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(module)
    }

    async fn module_by_title(&self, module_name: &str) -> Result<Option<Module>, AppError> {
        let module = sqlx::query_as::<_, Module>(&format!(
            "SELECT {} FROM elearning_module WHERE title = $1",
            MODULE_COLUMNS
        ))
        .bind(module_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(module)
    }

    async fn save_article_images(&self, module_id: i64, images: &[ImageRecord]) -> Result<usize, AppError> {
        let mut tx = self.pool.begin().await?;
        for image in images {
            sqlx::query(
                "INSERT INTO elearning_article_image (module_id, image_name, cloud_url) VALUES ($1, $2, $3) \
                 ON CONFLICT (module_id, image_name) DO UPDATE SET cloud_url = EXCLUDED.cloud_url",
            )
            .bind(module_id)
            .bind(&image.name)
            .bind(&image.url)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        info!("Saved {} images for module {}", images.len(), module_id);
        Ok(images.len())
    }

    async fn save_articles(&self, module_id: i64, articles: &[ArticleRecord]) -> Result<Vec<SavedArticle>, AppError> {
        let mut tx = self.pool.begin().await?;
        let mut saved = Vec::with_capacity(articles.len());
        for article in articles {
            let row = sqlx::query_as::<_, SavedArticle>(
                "INSERT INTO elearning_article (module_id, title, url, json_content) VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (module_id, title) DO UPDATE \
                 SET url = EXCLUDED.url, json_content = EXCLUDED.json_content, updated_at = NOW() \
                 RETURNING id, title, (xmax = 0) AS created",
            )
            .bind(module_id)
            .bind(&article.title)
            .bind(&article.url)
            .bind(&article.json_content)
            .fetch_one(&mut *tx)
            .await?;
            saved.push(row);
        }
        tx.commit().await?;
        info!("Saved {} articles for module {}", saved.len(), module_id);
        Ok(saved)
    }

    async fn module_statistics(&self, module_name: &str) -> Result<Option<ModuleStatistics>, AppError> {
        let stats = sqlx::query_as::<_, ModuleStatistics>(
            "SELECT m.title AS module_name, m.id AS module_id, m.is_public, c.name AS category, \
                    (SELECT COUNT(*) FROM elearning_article_image i WHERE i.module_id = m.id) AS images_count, \
                    (SELECT COUNT(*) FROM elearning_article a WHERE a.module_id = m.id) AS articles_count, \
                    (SELECT COUNT(*) FROM elearning_content ct WHERE ct.module_id = m.id) AS content_count, \
                    (SELECT COUNT(*) FROM elearning_task t WHERE t.module_id = m.id) AS tasks_count, \
                    m.created_at \
             FROM elearning_module m \
             LEFT JOIN elearning_module_category c ON c.id = m.category_id \
             WHERE m.title = $1",
        )
        .bind(module_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(stats)
    }

    async fn remove_orphaned_images(&self, module_id: i64, keep: &[String]) -> Result<u64, AppError> {
        let result = sqlx::query(
            "DELETE FROM elearning_article_image WHERE module_id = $1 AND NOT (image_name = ANY($2))",
        )
        .bind(module_id)
        .bind(keep)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
