use actix_web::{web, HttpRequest, HttpResponse};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::Validate;

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::services::cloud_storage::ContentStore;
use crate::services::content_orchestration::ContentOrchestrator;
use crate::services::content_repository::ContentRepository;
use crate::services::word_processing::{
    document_statistics, is_word_upload, process_word_document, validate_word_document,
};
use crate::utils::auth::{authenticate, require_staff};
use crate::utils::validation::{validate_not_blank, validate_payload};

#[derive(Deserialize, Validate)]
pub struct ModuleRequest {
    #[validate(custom = "validate_not_blank")]
    module_name: String,
}

#[derive(Deserialize, Validate)]
pub struct MultipleModulesRequest {
    #[validate(length(min = 1))]
    module_names: Vec<String>,
}

#[derive(Deserialize)]
pub struct ModuleQuery {
    module_name: Option<String>,
}

#[derive(Deserialize, Validate)]
pub struct ArticleRequest {
    #[validate(range(min = 1))]
    module_id: i64,
    #[validate(url)]
    cloud_url: String,
}

#[derive(Deserialize)]
pub struct CloudUrlRequest {
    cloud_url: String,
}

#[derive(Deserialize)]
pub struct VideoUrlRequest {
    video_url: String,
}

#[derive(Deserialize)]
pub struct UploadQuery {
    file_name: Option<String>,
}

/// Adds `success` next to the fields of `body` instead of nesting it.
#[derive(Serialize)]
struct Flat<T: Serialize> {
    success: bool,
    #[serde(flatten)]
    body: T,
}

type Store = web::Data<dyn ContentStore>;
type Repository = web::Data<dyn ContentRepository>;

pub async fn process_module(
    req: HttpRequest,
    body: web::Json<ModuleRequest>,
    config: web::Data<AppConfig>,
    store: Store,
    repo: Repository,
) -> Result<HttpResponse, AppError> {
    authenticate(&req, &config.jwt)?;
    validate_payload(&body.0)?;

    let result = ContentOrchestrator::new(store.get_ref(), repo.get_ref())
        .process_module_content(body.module_name.trim())
        .await;
    if result.success {
        Ok(HttpResponse::Ok().json(result))
    } else {
        Ok(HttpResponse::BadRequest().json(result))
    }
}

pub async fn process_multiple_modules(
    req: HttpRequest,
    body: web::Json<MultipleModulesRequest>,
    config: web::Data<AppConfig>,
    store: Store,
    repo: Repository,
) -> Result<HttpResponse, AppError> {
    authenticate(&req, &config.jwt)?;
    validate_payload(&body.0)?;

    let results = ContentOrchestrator::new(store.get_ref(), repo.get_ref())
        .process_multiple_modules(&body.module_names)
        .await;
    let successful = results.iter().filter(|r| r.success).count();
    Ok(HttpResponse::Ok().json(json!({
        "success": successful == results.len(),
        "total_modules": results.len(),
        "successful_modules": successful,
        "results": results,
    })))
}

pub async fn available_modules(
    req: HttpRequest,
    config: web::Data<AppConfig>,
    store: Store,
    repo: Repository,
) -> Result<HttpResponse, AppError> {
    authenticate(&req, &config.jwt)?;
    let modules = ContentOrchestrator::new(store.get_ref(), repo.get_ref())
        .available_modules()
        .await?;
    Ok(HttpResponse::Ok().json(json!({"success": true, "count": modules.len(), "modules": modules})))
}

pub async fn module_statistics(
    req: HttpRequest,
    query: web::Query<ModuleQuery>,
    config: web::Data<AppConfig>,
    store: Store,
    repo: Repository,
) -> Result<HttpResponse, AppError> {
    authenticate(&req, &config.jwt)?;
    let module_name = query
        .module_name
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("module_name is required".into()))?;

    let statistics = ContentOrchestrator::new(store.get_ref(), repo.get_ref())
        .module_statistics(module_name)
        .await?;
    Ok(HttpResponse::Ok().json(Flat { success: true, body: statistics }))
}

pub async fn test_services(
    req: HttpRequest,
    config: web::Data<AppConfig>,
    store: Store,
    repo: Repository,
) -> Result<HttpResponse, AppError> {
    require_staff(&req, &config.jwt)?;
    let status = ContentOrchestrator::new(store.get_ref(), repo.get_ref())
        .test_all_services()
        .await;
    Ok(HttpResponse::Ok().json(Flat { success: status.all_ok(), body: status }))
}

pub async fn cleanup_module(
    req: HttpRequest,
    body: web::Json<ModuleRequest>,
    config: web::Data<AppConfig>,
    store: Store,
    repo: Repository,
) -> Result<HttpResponse, AppError> {
    let claims = require_staff(&req, &config.jwt)?;
    validate_payload(&body.0)?;

    let result = ContentOrchestrator::new(store.get_ref(), repo.get_ref())
        .cleanup_module(body.module_name.trim())
        .await?;
    info!("Module {} cleaned up by user {}", result.module_name, claims.user_id);
    Ok(HttpResponse::Ok().json(result))
}

pub async fn process_article(
    req: HttpRequest,
    body: web::Json<ArticleRequest>,
    config: web::Data<AppConfig>,
    store: Store,
    repo: Repository,
) -> Result<HttpResponse, AppError> {
    authenticate(&req, &config.jwt)?;
    validate_payload(&body.0)?;

    let validation = store.layout().validate_cloud_url(&body.cloud_url);
    if !validation.valid {
        return Ok(HttpResponse::BadRequest().json(json!({"success": false, "errors": validation.errors})));
    }

    let result = ContentOrchestrator::new(store.get_ref(), repo.get_ref())
        .process_article_from_url(body.module_id, &body.cloud_url)
        .await;
    if result.success {
        Ok(HttpResponse::Created().json(result))
    } else {
        Ok(HttpResponse::BadRequest().json(result))
    }
}

pub async fn validate_cloud_url(
    req: HttpRequest,
    body: web::Json<CloudUrlRequest>,
    config: web::Data<AppConfig>,
    store: Store,
) -> Result<HttpResponse, AppError> {
    authenticate(&req, &config.jwt)?;
    Ok(HttpResponse::Ok().json(store.layout().validate_cloud_url(body.cloud_url.trim())))
}

pub async fn validate_video_url(
    req: HttpRequest,
    body: web::Json<VideoUrlRequest>,
    config: web::Data<AppConfig>,
    store: Store,
) -> Result<HttpResponse, AppError> {
    authenticate(&req, &config.jwt)?;
    let video_url = body.video_url.trim();
    let video = store.layout().video_reference(video_url)?;

    if !store.object_exists(&video.object_key).await? {
        return Err(AppError::NotFound("Video file not found in storage".into()));
    }
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "video_url": video_url,
        "filename": video.filename,
        "title": video.title,
        "is_valid": true,
    })))
}

fn upload_name(query: &UploadQuery) -> String {
    query
        .file_name
        .clone()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| "upload.docx".to_string())
}

fn check_upload(body: &[u8], file_name: &str) -> Result<(), AppError> {
    if !is_word_upload(body, file_name) {
        return Err(AppError::BadRequest("Only .docx Word documents are supported".into()));
    }
    if !validate_word_document(body, file_name) {
        return Err(AppError::BadRequest("Word document is empty or unreadable".into()));
    }
    Ok(())
}

/// Runs the content extraction on an uploaded .docx body.
pub async fn extract(
    req: HttpRequest,
    query: web::Query<UploadQuery>,
    body: web::Bytes,
    config: web::Data<AppConfig>,
) -> Result<HttpResponse, AppError> {
    authenticate(&req, &config.jwt)?;
    let file_name = upload_name(&query);
    check_upload(&body, &file_name)?;

    let article = process_word_document(&body, &file_name, "")?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "title": article.title,
        "file_name": article.file_name,
        "json_content": article.json_content,
    })))
}

pub async fn statistics(
    req: HttpRequest,
    query: web::Query<UploadQuery>,
    body: web::Bytes,
    config: web::Data<AppConfig>,
) -> Result<HttpResponse, AppError> {
    authenticate(&req, &config.jwt)?;
    let file_name = upload_name(&query);
    check_upload(&body, &file_name)?;
    Ok(HttpResponse::Ok().json(document_statistics(&body, &file_name)?))
}

/// Registers the content routes. `upload_limit` caps the raw .docx bodies
/// taken by `extract` and `statistics`.
pub fn routes(cfg: &mut web::ServiceConfig, upload_limit: usize) {
    cfg.app_data(web::PayloadConfig::new(upload_limit))
        .service(web::resource("/process-module/").route(web::post().to(process_module)))
        .service(web::resource("/process-multiple-modules/").route(web::post().to(process_multiple_modules)))
        .service(web::resource("/available-modules/").route(web::get().to(available_modules)))
        .service(web::resource("/module-statistics/").route(web::get().to(module_statistics)))
        .service(web::resource("/test-services/").route(web::post().to(test_services)))
        .service(web::resource("/cleanup-module/").route(web::post().to(cleanup_module)))
        .service(web::resource("/process-article/").route(web::post().to(process_article)))
        .service(web::resource("/validate-cloud-url/").route(web::post().to(validate_cloud_url)))
        .service(web::resource("/validate-video-url/").route(web::post().to(validate_video_url)))
        .service(web::resource("/extract/").route(web::post().to(extract)))
        .service(web::resource("/document-statistics/").route(web::post().to(statistics)));
}
