use log::info;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::errors::AppError;

pub const DEFAULT_GROUP: &str = "default";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleLevel {
    User = 1,
    Moderator = 2,
    Staff = 3,
    Administrator = 4,
}

impl RoleLevel {
    pub fn value(self) -> i32 {
        self as i32
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RoleConfiguration {
    pub role_name: String,
    pub level: RoleLevel,
    #[serde(default)]
    pub is_staff: bool,
    #[serde(default)]
    pub is_superuser: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub permissions: BTreeSet<String>,
}

fn role(name: &str, level: RoleLevel, is_staff: bool, is_superuser: bool, description: &str, permissions: &[&str]) -> RoleConfiguration {
    RoleConfiguration {
        role_name: name.to_string(),
        level,
        is_staff,
        is_superuser,
        description: description.to_string(),
        permissions: permissions.iter().map(|p| p.to_string()).collect(),
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RoleAssignment {
    pub role: RoleConfiguration,
    pub groups: Vec<String>,
    pub reason: String,
}

/// Group name to role table.
#[derive(Debug, Clone)]
pub struct RoleMappings {
    mappings: BTreeMap<String, RoleConfiguration>,
}

impl Default for RoleMappings {
    fn default() -> Self {
        let mut mappings = BTreeMap::new();
        mappings.insert(
            "Admin".to_string(),
            role(
                "Administrator",
                RoleLevel::Administrator,
                true,
                true,
                "Full system administrator with all permissions",
                &["admin.access", "user.manage", "content.manage", "system.configure"],
            ),
        );
        mappings.insert(
            "Staff".to_string(),
            role(
                "Staff",
                RoleLevel::Staff,
                true,
                false,
                "Staff member with content management permissions",
                &["content.manage", "user.view", "reports.view"],
            ),
        );
        mappings.insert(
            "Moderator".to_string(),
            role(
                "Moderator",
                RoleLevel::Moderator,
                true,
                false,
                "Content moderator with limited management permissions",
                &["content.moderate", "user.view"],
            ),
        );
        mappings.insert(
            DEFAULT_GROUP.to_string(),
            role("User", RoleLevel::User, false, false, "Standard authenticated user", &["content.view"]),
        );
        Self { mappings }
    }
}

impl RoleMappings {
    /// Defaults, overridden entry by entry with a JSON object of
    /// `{"<group>": {"role_name": .., "level": "STAFF", ..}}`.
    pub fn with_overrides(raw: Option<&str>) -> Result<Self, AppError> {
        let mut roles = Self::default();
        if let Some(raw) = raw {
            let custom: BTreeMap<String, RoleConfiguration> = serde_json::from_str(raw)
                .map_err(|e| AppError::ConfigurationError(format!("invalid ROLE_MAPPINGS: {}", e)))?;
            info!("Loaded {} custom role mappings", custom.len());
            roles.mappings.extend(custom);
        }
        Ok(roles)
    }

    pub fn default_role(&self) -> RoleConfiguration {
        self.mappings
            .get(DEFAULT_GROUP)
            .cloned()
            .unwrap_or_else(|| role("User", RoleLevel::User, false, false, "", &["content.view"]))
    }

    pub fn administrator(&self) -> RoleConfiguration {
        self.mappings
            .values()
            .find(|r| r.level == RoleLevel::Administrator)
            .cloned()
            .unwrap_or_else(|| role("Administrator", RoleLevel::Administrator, true, true, "", &["admin.access"]))
    }

    /// Highest role among the user's groups; groups at user level never win
    /// over the default.
    pub fn resolve(&self, groups: &[String]) -> RoleAssignment {
        let mut best: Option<(&String, &RoleConfiguration)> = None;
        for group in groups {
            if group == DEFAULT_GROUP {
                continue;
            }
            if let Some(config) = self.mappings.get(group) {
                let current = best.map_or(RoleLevel::User, |(_, r)| r.level);
                if config.level > current {
                    best = Some((group, config));
                }
            }
        }

        match best {
            Some((group, config)) => RoleAssignment {
                role: config.clone(),
                groups: groups.to_vec(),
                reason: format!("member of '{}' group", group),
            },
            None => RoleAssignment {
                role: self.default_role(),
                groups: groups.to_vec(),
                reason: "no matching groups, using default role".to_string(),
            },
        }
    }

    /// Employees whose position title mentions "admin" are at least administrators.
    pub fn elevate_for_position(&self, assignment: RoleAssignment, position_title: &str) -> RoleAssignment {
        if position_title.to_lowercase().contains("admin") && assignment.role.level < RoleLevel::Administrator {
            RoleAssignment {
                role: self.administrator(),
                groups: assignment.groups,
                reason: format!("position '{}'", position_title),
            }
        } else {
            assignment
        }
    }

    pub fn hierarchy(&self) -> serde_json::Value {
        let roles: BTreeMap<&String, &RoleConfiguration> =
            self.mappings.iter().filter(|(group, _)| group.as_str() != DEFAULT_GROUP).collect();
        serde_json::json!({
            "roles": roles,
            "default": self.default_role(),
            "hierarchy_levels": ["USER", "MODERATOR", "STAFF", "ADMINISTRATOR"],
            "total_roles": roles.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn groups(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn highest_matching_group_wins() {
        let roles = RoleMappings::default();
        let assignment = roles.resolve(&groups(&["Moderator", "Marketing", "Admin", "Staff"]));
        assert_eq!(assignment.role.role_name, "Administrator");
        assert!(assignment.role.is_superuser);
        assert_eq!(assignment.reason, "member of 'Admin' group");
    }

    #[test]
    fn unknown_groups_get_default_role() {
        let roles = RoleMappings::default();
        let assignment = roles.resolve(&groups(&["Marketing"]));
        assert_eq!(assignment.role.role_name, "User");
        assert_eq!(assignment.role.level, RoleLevel::User);
        assert_eq!(assignment.reason, "no matching groups, using default role");
        assert_eq!(assignment.groups, vec!["Marketing".to_string()]);
    }

    #[test]
    fn admin_position_elevates() {
        let roles = RoleMappings::default();
        let base = roles.resolve(&groups(&["Staff"]));
        let elevated = roles.elevate_for_position(base.clone(), "System Administrator");
        assert_eq!(elevated.role.level, RoleLevel::Administrator);
        assert_eq!(roles.elevate_for_position(base, "Kassierer").role.role_name, "Staff");
    }

    #[test]
    fn overrides_replace_and_add_groups() {
        let raw = r#"{
            "Dozenten": {"role_name": "Lecturer", "level": "STAFF", "is_staff": true, "permissions": ["content.manage"]},
            "Staff": {"role_name": "Helper", "level": "MODERATOR"}
        }"#;
        let roles = RoleMappings::with_overrides(Some(raw)).unwrap();
        assert_eq!(roles.resolve(&groups(&["Dozenten"])).role.role_name, "Lecturer");
        let helper = roles.resolve(&groups(&["Staff"])).role;
        assert_eq!(helper.level, RoleLevel::Moderator);
        assert!(!helper.is_staff);

        assert!(RoleMappings::with_overrides(Some("[1,2]")).is_err());
    }

    #[test]
    fn levels_are_ordered() {
        assert!(RoleLevel::User < RoleLevel::Moderator);
        assert!(RoleLevel::Staff < RoleLevel::Administrator);
        assert_eq!(RoleLevel::Staff.value(), 3);
        assert_eq!(serde_json::to_value(RoleLevel::Administrator).unwrap(), "ADMINISTRATOR");
    }

    #[test]
    fn hierarchy_excludes_default() {
        let hierarchy = RoleMappings::default().hierarchy();
        assert_eq!(hierarchy["total_roles"], 3);
        assert_eq!(hierarchy["default"]["role_name"], "User");
    }
}
