use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::json;
use sqlx::PgPool;

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::models::elearning::{Module, Task};
use crate::utils::auth::authenticate;

pub async fn get_module_tasks(
    req: HttpRequest,
    module_id: web::Path<i64>,
    pool: web::Data<PgPool>,
    config: web::Data<AppConfig>,
) -> Result<HttpResponse, AppError> {
    authenticate(&req, &config.jwt)?;
    let module_id = module_id.into_inner();

    let module = sqlx::query_as::<_, Module>(
        "SELECT id, title, category_id, is_public, created_at FROM elearning_module WHERE id = $1",
    )
    .bind(module_id)
    .fetch_optional(&**pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Module with ID {} not found", module_id)))?;

    let tasks = sqlx::query_as::<_, Task>(
        r#"
        SELECT id, module_id, title, description, difficulty, task_type, "order"
        FROM elearning_task
        WHERE module_id = $1
        ORDER BY "order", id
        "#,
    )
    .bind(module.id)
    .fetch_all(&**pool)
    .await?;

    Ok(HttpResponse::Ok().json(json!({
        "module": {"id": module.id, "title": module.title},
        "count": tasks.len(),
        "tasks": tasks,
    })))
}
