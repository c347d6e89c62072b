mod config;
mod db;
mod errors;
mod handlers;
mod models;
mod services;
mod utils;

use actix_web::{web, App, HttpServer};
use clap::Parser;
use dotenv::dotenv;
use log::{info, warn};
use sqlx::PgPool;
use std::io;
use std::sync::Arc;

use crate::config::{AppConfig, Cli, Command};
use crate::errors::AppError;
use crate::services::cloud_storage::{ContentStore, S3ContentStore, StorageLayout};
use crate::services::content_repository::{ContentRepository, PgContentRepository};
use crate::services::identity::{IdentityServices, IdentityState};
use crate::services::oauth_state::{short, OAuthStateManager, PgStateStore};

const CONTENT_SCOPE: &str = "/api/elearning/modules/content";

fn io_error(err: AppError) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err.to_string())
}

async fn cleanup_oauth_states(pool: &PgPool, config: &AppConfig, dry_run: bool, verbose: bool) -> Result<(), AppError> {
    let store = PgStateStore::new(pool.clone());
    let manager = OAuthStateManager::new(&store, config.oauth_state_timeout_seconds);
    let summary = manager.expired_summary().await?;

    if verbose {
        for state in &summary.states {
            println!(
                "  {}... tool={} created={} expired={}",
                short(&state.state),
                state.tool_slug,
                state.created_at,
                state.expires_at
            );
        }
    }

    if dry_run {
        println!(
            "Dry run: {} expired state(s) would be deleted, {} active state(s) remain",
            summary.expired, summary.active
        );
        return Ok(());
    }

    let deleted = manager.cleanup_expired().await?;
    println!("Deleted {} expired state(s), {} active state(s) remain", deleted, manager.active_count().await?);
    Ok(())
}

async fn seed_tools(pool: &PgPool, grant_elearning_all: bool) -> Result<(), AppError> {
    let tools = [
        ("shift-planner", "Schichtplaner", "Shift planning tool", "http://localhost:5174"),
        ("elearning", "E-Learning", "E-learning platform", "http://localhost:5173"),
    ];

    for (slug, name, description, frontend_url) in tools {
        let created: bool = sqlx::query_scalar(
            r#"
            INSERT INTO tools (slug, name, description, frontend_url)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (slug) DO UPDATE SET slug = EXCLUDED.slug
            RETURNING (xmax = 0) AS created
            "#,
        )
        .bind(slug)
        .bind(name)
        .bind(description)
        .bind(frontend_url)
        .fetch_one(pool)
        .await?;
        println!("{} tool '{}'", if created { "Created" } else { "Kept existing" }, slug);
    }

    if grant_elearning_all {
        let granted = sqlx::query(
            r#"
            INSERT INTO employee_tool_access (employee_id, tool_id)
            SELECT e.id, t.id
            FROM employees e
            CROSS JOIN tools t
            WHERE e.is_active AND t.slug = 'elearning'
            ON CONFLICT (employee_id, tool_id) DO NOTHING
            "#,
        )
        .execute(pool)
        .await?
        .rows_affected();
        println!("Granted e-learning access to {} employee(s)", granted);
    }
    Ok(())
}

async fn serve(pool: PgPool, config: AppConfig) -> io::Result<()> {
    let s3_client = utils::s3::create_s3_client(&config.storage).await;
    let store: Arc<dyn ContentStore> = Arc::new(S3ContentStore::new(s3_client, StorageLayout::from(&config.storage)));
    let repository: Arc<dyn ContentRepository> = Arc::new(PgContentRepository::new(pool.clone()));

    let identity = match &config.identity {
        Some(identity_config) => IdentityState(Some(IdentityServices::from_config(identity_config).map_err(io_error)?)),
        None => {
            warn!("Identity provider is not configured; OAuth routes will answer 503");
            IdentityState(None)
        }
    };

    let addr = config.addr();
    let upload_limit = config.max_upload_bytes;
    let config = web::Data::new(config);
    let pool = web::Data::new(pool);
    let identity = web::Data::new(identity);
    let store = web::Data::from(store);
    let repository = web::Data::from(repository);

    info!("Starting server at {}", addr);

    HttpServer::new(move || {
        App::new()
            .app_data(config.clone())
            .app_data(pool.clone())
            .app_data(identity.clone())
            .app_data(store.clone())
            .app_data(repository.clone())
            .service(web::resource("/health").route(web::get().to(handlers::health::health)))
            .service(web::resource("/api/token/").route(web::post().to(handlers::auth::obtain_token)))
            .service(web::resource("/api/token/refresh/").route(web::post().to(handlers::auth::refresh_token)))
            .service(web::resource("/api/token/verify/").route(web::post().to(handlers::auth::verify_token)))
            .service(
                web::resource("/api/microsoft/auth/login/{tool_slug}/")
                    .route(web::get().to(handlers::microsoft_auth::login)),
            )
            .service(
                web::resource("/api/microsoft/auth/callback/")
                    .route(web::get().to(handlers::microsoft_auth::callback_redirect)),
            )
            .service(
                web::resource("/api/microsoft/auth/callback/{tool_slug}/")
                    .route(web::post().to(handlers::microsoft_auth::callback_exchange)),
            )
            .service(
                web::resource("/api/microsoft/auth/logout/").route(web::post().to(handlers::microsoft_auth::logout)),
            )
            .service(
                web::resource("/api/microsoft/token/status/")
                    .route(web::get().to(handlers::microsoft_auth::token_status)),
            )
            .service(
                web::resource("/api/microsoft/token/invalidate/")
                    .route(web::post().to(handlers::microsoft_auth::token_invalidate)),
            )
            .service(
                web::scope(CONTENT_SCOPE).configure(|cfg| handlers::content::routes(cfg, upload_limit)),
            )
            .service(
                web::resource("/api/elearning/modules/storage/sign/")
                    .route(web::get().to(handlers::storage::sign_object)),
            )
            .service(
                web::resource("/api/elearning/modules/{id}/tasks/")
                    .route(web::get().to(handlers::tasks::get_module_tasks)),
            )
            .service(
                web::resource("/api/db-overview/schema/").route(web::get().to(handlers::db_overview::get_schema)),
            )
    })
    .bind(addr)?
    .run()
    .await
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let config = AppConfig::from_env().map_err(io_error)?.with_cli(&cli);
    let pool = db::create_pool(&config.database_url).await.map_err(io_error)?;

    match cli.command.clone().unwrap_or(Command::Serve) {
        Command::Serve => serve(pool, config).await,
        Command::Migrate => db::run_migrations(&pool).await.map_err(io_error),
        Command::CleanupOauthStates { dry_run, verbose } => {
            cleanup_oauth_states(&pool, &config, dry_run, verbose).await.map_err(io_error)
        }
        Command::SeedTools { grant_elearning_all } => seed_tools(&pool, grant_elearning_all).await.map_err(io_error),
    }
}
