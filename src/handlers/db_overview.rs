use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use std::collections::BTreeMap;

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::utils::auth::authenticate;

#[derive(FromRow, Debug, Clone)]
pub struct ColumnRow {
    pub table_name: String,
    pub column_name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub column_default: Option<String>,
    pub max_length: Option<i32>,
    pub is_primary_key: bool,
}

#[derive(FromRow, Debug, Clone, Serialize, PartialEq)]
pub struct Relationship {
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
    pub constraint_name: String,
}

#[derive(Serialize, Debug, PartialEq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub max_length: Option<i32>,
    pub primary_key: bool,
}

#[derive(Serialize, Debug)]
pub struct TableInfo {
    pub name: String,
    pub estimated_rows: i64,
    pub column_count: usize,
    pub relationship_count: usize,
    pub columns: Vec<ColumnInfo>,
}

#[derive(Serialize, Debug)]
pub struct SchemaOverview {
    pub total_tables: usize,
    pub total_columns: usize,
    pub total_relationships: usize,
    pub generated_at: DateTime<Utc>,
    pub database_engine: String,
}

#[derive(Serialize, Debug)]
pub struct SchemaReport {
    pub success: bool,
    pub overview: SchemaOverview,
    pub tables: Vec<TableInfo>,
    pub relationships: Vec<Relationship>,
}

/// Groups column rows by table. Tables come out in name order, columns in
/// the order the catalog returned them.
pub fn build_overview(
    columns: Vec<ColumnRow>,
    row_estimates: &BTreeMap<String, i64>,
    relationships: Vec<Relationship>,
    engine: String,
) -> SchemaReport {
    let total_columns = columns.len();
    let mut grouped: BTreeMap<String, Vec<ColumnInfo>> = BTreeMap::new();
    for row in columns {
        grouped.entry(row.table_name).or_default().push(ColumnInfo {
            name: row.column_name,
            data_type: row.data_type,
            nullable: row.is_nullable,
            default: row.column_default,
            max_length: row.max_length,
            primary_key: row.is_primary_key,
        });
    }

    let tables: Vec<TableInfo> = grouped
        .into_iter()
        .map(|(name, columns)| TableInfo {
            estimated_rows: row_estimates.get(&name).copied().unwrap_or(0).max(0),
            column_count: columns.len(),
            relationship_count: relationships.iter().filter(|r| r.from_table == name).count(),
            name,
            columns,
        })
        .collect();

    SchemaReport {
        success: true,
        overview: SchemaOverview {
            total_tables: tables.len(),
            total_columns,
            total_relationships: relationships.len(),
            generated_at: Utc::now(),
            database_engine: engine,
        },
        tables,
        relationships,
    }
}

async fn load_columns(pool: &PgPool) -> Result<Vec<ColumnRow>, AppError> {
    Ok(sqlx::query_as::<_, ColumnRow>(
        r#"
        SELECT
            c.table_name::text AS table_name,
            c.column_name::text AS column_name,
            c.data_type::text AS data_type,
            (c.is_nullable = 'YES') AS is_nullable,
            c.column_default::text AS column_default,
            c.character_maximum_length::int4 AS max_length,
            EXISTS (
                SELECT 1
                FROM information_schema.table_constraints tc
                JOIN information_schema.key_column_usage kcu
                  ON tc.constraint_name = kcu.constraint_name
                 AND tc.table_schema = kcu.table_schema
                WHERE tc.constraint_type = 'PRIMARY KEY'
                  AND tc.table_schema = c.table_schema
                  AND tc.table_name = c.table_name
                  AND kcu.column_name = c.column_name
            ) AS is_primary_key
        FROM information_schema.columns c
        JOIN information_schema.tables t
          ON t.table_schema = c.table_schema AND t.table_name = c.table_name
        WHERE c.table_schema = 'public' AND t.table_type = 'BASE TABLE'
        ORDER BY c.table_name, c.ordinal_position
        "#,
    )
    .fetch_all(pool)
    .await?)
}

async fn load_row_estimates(pool: &PgPool) -> Result<BTreeMap<String, i64>, AppError> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        r#"
        SELECT cls.relname::text, cls.reltuples::int8
        FROM pg_class cls
        JOIN pg_namespace ns ON ns.oid = cls.relnamespace
        WHERE ns.nspname = 'public' AND cls.relkind = 'r'
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().collect())
}

async fn load_relationships(pool: &PgPool) -> Result<Vec<Relationship>, AppError> {
    Ok(sqlx::query_as::<_, Relationship>(
        r#"
        SELECT
            tc.table_name::text AS from_table,
            kcu.column_name::text AS from_column,
            ccu.table_name::text AS to_table,
            ccu.column_name::text AS to_column,
            tc.constraint_name::text AS constraint_name
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
          ON tc.constraint_name = kcu.constraint_name
         AND tc.table_schema = kcu.table_schema
        JOIN information_schema.constraint_column_usage ccu
          ON ccu.constraint_name = tc.constraint_name
         AND ccu.table_schema = tc.table_schema
        WHERE tc.constraint_type = 'FOREIGN KEY' AND tc.table_schema = 'public'
        ORDER BY tc.table_name, kcu.column_name
        "#,
    )
    .fetch_all(pool)
    .await?)
}

/// Tables, columns and foreign keys of the public schema.
pub async fn get_schema(
    req: HttpRequest,
    pool: web::Data<PgPool>,
    config: web::Data<AppConfig>,
) -> Result<HttpResponse, AppError> {
    authenticate(&req, &config.jwt)?;

    let columns = load_columns(&pool).await?;
    let estimates = load_row_estimates(&pool).await?;
    let relationships = load_relationships(&pool).await?;
    let engine: String = sqlx::query_scalar("SELECT version()").fetch_one(&**pool).await?;

    Ok(HttpResponse::Ok().json(build_overview(columns, &estimates, relationships, engine)))
}
