use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::services::cloud_storage::ContentStore;
use crate::utils::auth::authenticate;

#[derive(Deserialize)]
pub struct SignQuery {
    key: Option<String>,
}

/// Presigned GET URL for a single object.
pub async fn sign_object(
    req: HttpRequest,
    query: web::Query<SignQuery>,
    config: web::Data<AppConfig>,
    store: web::Data<dyn ContentStore>,
) -> Result<HttpResponse, AppError> {
    authenticate(&req, &config.jwt)?;
    let key = query
        .key
        .as_deref()
        .map(|k| k.trim_start_matches('/'))
        .filter(|k| !k.is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing key parameter".into()))?;

    let expires_in = config.storage.presign_seconds;
    let url = store.presigned_url(key, Duration::from_secs(expires_in)).await?;
    Ok(HttpResponse::Ok().json(json!({
        "presigned_url": url,
        "expires_in": expires_in,
        "key": key,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::tests::{bearer, test_config};
    use crate::services::cloud_storage::tests::MemoryStore;
    use actix_web::{test, App};
    use std::sync::Arc;

    #[actix_web::test]
    async fn signs_requested_key() {
        let store: Arc<dyn ContentStore> = Arc::new(MemoryStore::new(vec![]));
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(test_config()))
                .app_data(web::Data::from(store))
                .route("/sign/", web::get().to(sign_object)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/sign/?key=Lerninhalte/SQL/Videos/Intro.mp4")
            .insert_header(bearer(false))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["expires_in"], 7200);
        assert_eq!(body["key"], "Lerninhalte/SQL/Videos/Intro.mp4");
        assert!(body["presigned_url"].as_str().unwrap().ends_with("?expires=7200"));

        let req = test::TestRequest::get().uri("/sign/").insert_header(bearer(false)).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 400);
    }
}
