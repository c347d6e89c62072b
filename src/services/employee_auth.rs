use async_trait::async_trait;
use chrono::Utc;
use log::{info, warn};
use serde::Serialize;
use sqlx::PgPool;

use crate::config::JwtConfig;
use crate::errors::AppError;
use crate::models::employee::{EmployeeRecord, Tool, ToolAccess};
use crate::models::user::{User, UserSummary};
use crate::services::identity_provider::UserProfile;
use crate::services::roles::{RoleAssignment, RoleMappings};
use crate::utils::jwt::{generate_token_pair, TokenPair, TokenSubject};

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct NamedRef {
    pub id: i64,
    pub name: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PositionRef {
    pub id: i64,
    pub title: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct EmployeeInfo {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub department: NamedRef,
    pub position: PositionRef,
    pub max_working_hours: i32,
    pub is_active: bool,
}

impl From<&EmployeeRecord> for EmployeeInfo {
    fn from(e: &EmployeeRecord) -> Self {
        Self {
            id: e.id,
            first_name: e.first_name.clone(),
            last_name: e.last_name.clone(),
            email: e.email.clone(),
            department: NamedRef { id: e.department_id, name: e.department_name.clone() },
            position: PositionRef { id: e.position_id, title: e.position_title.clone() },
            max_working_hours: e.max_working_hours,
            is_active: e.is_active,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ToolRef {
    pub slug: String,
    pub name: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RoleSummary {
    pub name: String,
    pub level: i32,
    pub reason: String,
    pub groups: Vec<String>,
}

#[derive(Serialize, Debug, Clone)]
pub struct EmployeeAuthResult {
    pub success: bool,
    pub user: UserSummary,
    pub employee_info: EmployeeInfo,
    pub tool: ToolRef,
    pub tokens: TokenPair,
    pub created: bool,
    pub role: RoleSummary,
}

/// Employee, tool and user lookups needed to sign an employee in.
#[async_trait]
pub trait EmployeeStore: Send + Sync {
    async fn active_employee_by_email(&self, email: &str) -> Result<Option<EmployeeRecord>, AppError>;

    async fn tool_access(&self, employee_id: i64, tool_id: i64) -> Result<Option<ToolAccess>, AppError>;

    /// Creates or updates the user for an employee. Returns the user and whether it was created.
    async fn upsert_user(&self, employee: &EmployeeRecord, role: &RoleAssignment) -> Result<(User, bool), AppError>;
}

pub struct PgEmployeeStore {
    pool: PgPool,
}

impl PgEmployeeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn active_tool(&self, slug: &str) -> Result<Option<Tool>, AppError> {
        let tool = sqlx::query_as::<_, Tool>(
            "SELECT id, slug, name, description, frontend_url, is_active FROM tools WHERE slug = $1 AND is_active",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;
        Ok(tool)
    }
}

#[async_trait]
impl EmployeeStore for PgEmployeeStore {
    async fn active_employee_by_email(&self, email: &str) -> Result<Option<EmployeeRecord>, AppError> {
        let employee = sqlx::query_as::<_, EmployeeRecord>(
            "SELECT e.id, e.first_name, e.last_name, e.email, \
                    d.id AS department_id, d.name AS department_name, \
                    p.id AS position_id, p.title AS position_title, \
                    e.max_working_hours, e.is_active \
             FROM employees e \
             JOIN departments d ON d.id = e.department_id \
             JOIN positions p ON p.id = e.position_id \
             WHERE LOWER(e.email) = LOWER($1) AND e.is_active",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(employee)
    }

    async fn tool_access(&self, employee_id: i64, tool_id: i64) -> Result<Option<ToolAccess>, AppError> {
        let access = sqlx::query_as::<_, ToolAccess>(
            "SELECT employee_id, tool_id, granted_at, expires_at \
             FROM employee_tool_access WHERE employee_id = $1 AND tool_id = $2",
        )
        .bind(employee_id)
        .bind(tool_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(access)
    }

    async fn upsert_user(&self, employee: &EmployeeRecord, role: &RoleAssignment) -> Result<(User, bool), AppError> {
        #[derive(sqlx::FromRow)]
        struct Upserted {
            #[sqlx(flatten)]
            user: User,
            created: bool,
        }

        let row = sqlx::query_as::<_, Upserted>(
            "INSERT INTO users (email, first_name, last_name, is_staff, is_superuser, last_login) \
             VALUES ($1, $2, $3, $4, $5, NOW()) \
             ON CONFLICT (email) DO UPDATE SET \
                first_name = EXCLUDED.first_name, last_name = EXCLUDED.last_name, \
                is_staff = EXCLUDED.is_staff, is_superuser = EXCLUDED.is_superuser, \
                last_login = NOW(), updated_at = NOW() \
             RETURNING id, email, first_name, last_name, password_hash, is_staff, is_superuser, \
                       is_active, last_login, (xmax = 0) AS created",
        )
        .bind(employee.email.to_lowercase())
        .bind(&employee.first_name)
        .bind(&employee.last_name)
        .bind(role.role.is_staff)
        .bind(role.role.is_superuser)
        .fetch_one(&self.pool)
        .await?;
        Ok((row.user, row.created))
    }
}

pub fn email_domain_allowed(email: &str, allowed: &[String]) -> bool {
    if allowed.is_empty() {
        return true;
    }
    let domain = email.rsplit('@').next().unwrap_or_default().to_lowercase();
    allowed.iter().any(|d| *d == domain)
}

/// Signs an employee into a tool: checks the profile against the employee
/// records and tool grants, resolves the role and issues tokens. Every
/// rejection is `Forbidden`.
pub struct EmployeeAuthenticator<'a> {
    pub store: &'a dyn EmployeeStore,
    pub roles: &'a RoleMappings,
    pub jwt: &'a JwtConfig,
    pub allowed_domains: &'a [String],
}

impl<'a> EmployeeAuthenticator<'a> {
    pub async fn authenticate(&self, profile: &UserProfile, groups: &[String], tool: &Tool) -> Result<EmployeeAuthResult, AppError> {
        let email = profile
            .email()
            .ok_or_else(|| AppError::Forbidden("No email address found in profile".into()))?;

        if !email_domain_allowed(email, self.allowed_domains) {
            warn!("Rejected sign-in from domain of {}", email);
            return Err(AppError::Forbidden(format!(
                "Email domain not allowed: {}",
                email.rsplit('@').next().unwrap_or_default()
            )));
        }

        let employee = self
            .store
            .active_employee_by_email(email)
            .await?
            .ok_or_else(|| AppError::Forbidden(format!("No active employee record found for email: {}", email)))?;

        let has_access = self
            .store
            .tool_access(employee.id, tool.id)
            .await?
            .map_or(false, |access| access.is_valid_at(Utc::now()));
        if !tool.is_active || !has_access {
            return Err(AppError::Forbidden(format!(
                "Employee {} does not have access to tool '{}'",
                email, tool.slug
            )));
        }

        let role = self
            .roles
            .elevate_for_position(self.roles.resolve(groups), &employee.position_title);
        let (user, created) = self.store.upsert_user(&employee, &role).await?;

        let tokens = generate_token_pair(
            self.jwt,
            &TokenSubject {
                user_id: user.id,
                email: user.email.clone(),
                role: role.role.role_name.clone(),
                role_level: role.role.level.value(),
                is_staff: user.is_staff,
            },
        )?;

        info!(
            "Employee {} signed into {} as {} ({})",
            user.email, tool.slug, role.role.role_name, role.reason
        );

        Ok(EmployeeAuthResult {
            success: true,
            user: UserSummary::from(&user),
            employee_info: EmployeeInfo::from(&employee),
            tool: ToolRef { slug: tool.slug.clone(), name: tool.name.clone() },
            tokens,
            created,
            role: RoleSummary {
                name: role.role.role_name,
                level: role.role.level.value(),
                reason: role.reason,
                groups: role.groups,
            },
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::utils::jwt::tests::jwt_config;
    use crate::utils::jwt::validate_token;
    use chrono::Duration;
    use std::sync::Mutex;

    pub(crate) fn employee(position: &str) -> EmployeeRecord {
        EmployeeRecord {
            id: 5,
            first_name: "Erika".into(),
            last_name: "Muster".into(),
            email: "Erika.Muster@firma.de".into(),
            department_id: 1,
            department_name: "IT".into(),
            position_id: 2,
            position_title: position.into(),
            max_working_hours: 40,
            is_active: true,
        }
    }

    pub(crate) fn tool() -> Tool {
        Tool {
            id: 9,
            slug: "elearning".into(),
            name: "E-Learning".into(),
            description: String::new(),
            frontend_url: "http://localhost:5173".into(),
            is_active: true,
        }
    }

    #[derive(Default)]
    pub(crate) struct MemoryEmployees {
        pub employees: Vec<EmployeeRecord>,
        pub grants: Vec<ToolAccess>,
        pub users: Mutex<Vec<User>>,
    }

    impl MemoryEmployees {
        pub(crate) fn granted(position: &str, expires_in_days: Option<i64>) -> Self {
            Self {
                employees: vec![employee(position)],
                grants: vec![ToolAccess {
                    employee_id: 5,
                    tool_id: 9,
                    granted_at: Utc::now(),
                    expires_at: expires_in_days.map(|d| Utc::now() + Duration::days(d)),
                }],
                users: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl EmployeeStore for MemoryEmployees {
        async fn active_employee_by_email(&self, email: &str) -> Result<Option<EmployeeRecord>, AppError> {
            Ok(self
                .employees
                .iter()
                .find(|e| e.is_active && e.email.eq_ignore_ascii_case(email))
                .cloned())
        }

        async fn tool_access(&self, employee_id: i64, tool_id: i64) -> Result<Option<ToolAccess>, AppError> {
            Ok(self
                .grants
                .iter()
                .find(|g| g.employee_id == employee_id && g.tool_id == tool_id)
                .cloned())
        }

        async fn upsert_user(&self, employee: &EmployeeRecord, role: &RoleAssignment) -> Result<(User, bool), AppError> {
            let mut users = self.users.lock().unwrap();
            let email = employee.email.to_lowercase();
            let created = !users.iter().any(|u| u.email == email);
            users.retain(|u| u.email != email);
            let user = User {
                id: 100,
                email,
                first_name: employee.first_name.clone(),
                last_name: employee.last_name.clone(),
                password_hash: None,
                is_staff: role.role.is_staff,
                is_superuser: role.role.is_superuser,
                is_active: true,
                last_login: Some(Utc::now()),
            };
            users.push(user.clone());
            Ok((user, created))
        }
    }

    pub(crate) fn profile(mail: Option<&str>) -> UserProfile {
        UserProfile {
            id: "aad-1".into(),
            mail: mail.map(String::from),
            user_principal_name: Some("erika.muster@firma.de".into()),
            ..Default::default()
        }
    }

    async fn run(store: &MemoryEmployees, profile: &UserProfile, groups: &[String], allowed: &[String]) -> Result<EmployeeAuthResult, AppError> {
        let roles = RoleMappings::default();
        let jwt = jwt_config();
        EmployeeAuthenticator { store, roles: &roles, jwt: &jwt, allowed_domains: allowed }
            .authenticate(profile, groups, &tool())
            .await
    }

    #[tokio::test]
    async fn employee_with_grant_gets_tokens() {
        let store = MemoryEmployees::granted("Entwickler", None);
        let result = run(&store, &profile(Some("erika.muster@firma.de")), &["Staff".into()], &["firma.de".into()])
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.created);
        assert_eq!(result.user.email, "erika.muster@firma.de");
        assert_eq!(result.employee_info.department, NamedRef { id: 1, name: "IT".into() });
        assert_eq!(result.tool, ToolRef { slug: "elearning".into(), name: "E-Learning".into() });
        assert_eq!(result.role.name, "Staff");

        let claims = validate_token("test-secret", &result.tokens.access, None).unwrap();
        assert_eq!(claims.user_id, 100);
        assert_eq!(claims.role_level, 3);
        assert!(claims.is_staff);

        let again = run(&store, &profile(None), &[], &[]).await.unwrap();
        assert!(!again.created);
        assert_eq!(again.role.name, "User");
    }

    #[tokio::test]
    async fn foreign_domain_is_forbidden() {
        let store = MemoryEmployees::granted("Entwickler", None);
        let err = run(&store, &profile(Some("x@other.org")), &[], &["firma.de".into()]).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert_eq!(err.message(), "Email domain not allowed: other.org");
    }

    #[tokio::test]
    async fn unknown_employee_is_forbidden() {
        let store = MemoryEmployees::granted("Entwickler", None);
        let err = run(&store, &profile(Some("nobody@firma.de")), &[], &[]).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn expired_grant_is_forbidden() {
        let store = MemoryEmployees::granted("Entwickler", Some(-1));
        let err = run(&store, &profile(None), &[], &[]).await.unwrap_err();
        assert_eq!(err.message(), "Employee erika.muster@firma.de does not have access to tool 'elearning'");
    }

    #[tokio::test]
    async fn missing_email_is_forbidden() {
        let store = MemoryEmployees::granted("Entwickler", None);
        let profile = UserProfile { id: "1".into(), ..Default::default() };
        assert!(matches!(run(&store, &profile, &[], &[]).await, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn admin_position_gets_administrator_role() {
        let store = MemoryEmployees::granted("IT-Admin", Some(30));
        let result = run(&store, &profile(None), &[], &[]).await.unwrap();
        assert_eq!(result.role.name, "Administrator");
        assert!(store.users.lock().unwrap()[0].is_superuser);
    }

    #[test]
    fn domain_check() {
        assert!(email_domain_allowed("a@FIRMA.de", &["firma.de".into()]));
        assert!(!email_domain_allowed("a@firma.com", &["firma.de".into()]));
        assert!(email_domain_allowed("a@any.org", &[]));
    }
}
