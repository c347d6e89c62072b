use actix_web::{web, HttpResponse};
use log::error;
use serde_json::json;
use sqlx::PgPool;

use crate::db;

pub async fn health(pool: web::Data<PgPool>) -> HttpResponse {
    match db::ping(&pool).await {
        Ok(()) => HttpResponse::Ok().json(json!({"status": "ok", "database": "ok"})),
        Err(e) => {
            error!("Health check failed: {}", e);
            HttpResponse::ServiceUnavailable().json(json!({"status": "degraded", "database": "unavailable"}))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::tests::lazy_pool;
    use actix_web::{test, App};

    #[actix_web::test]
    async fn unreachable_database_reports_503() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .route("/health", web::get().to(health)),
        )
        .await;
        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 503);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["database"], "unavailable");
    }
}
