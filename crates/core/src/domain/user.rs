use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Employee,
    Hr,
    Admin,
    Manager,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Employee => "employee",
            Self::Hr => "hr",
            Self::Admin => "admin",
            Self::Manager => "manager",
        }
    }

    /// HR and managers may decide on leave requests and read leave reports.
    pub fn can_decide_leave(&self) -> bool {
        matches!(self, Self::Hr | Self::Manager)
    }

    pub fn is_hr(&self) -> bool {
        matches!(self, Self::Hr)
    }

    /// Unknown role strings degrade to the least privileged role.
    pub fn parse_lossy(value: &str) -> Self {
        value.parse().unwrap_or_default()
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "employee" => Ok(Self::Employee),
            "hr" => Ok(Self::Hr),
            "admin" => Ok(Self::Admin),
            "manager" => Ok(Self::Manager),
            other => Err(format!("unsupported role `{other}`")),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: Role,
    /// Weak reference to the user's manager; resolved by lookup only.
    pub manager_id: Option<UserId>,
}

impl User {
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            user_id: self.id.clone(),
            display_name: self.username.clone(),
            email: Some(self.email.clone()),
            role: self.role,
        }
    }
}

/// Caller identity handed to the router by the transport layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    pub display_name: String,
    pub email: Option<String>,
    pub role: Role,
}

#[cfg(test)]
mod tests {
    use super::Role;

    #[test]
    fn role_parsing_is_case_insensitive() {
        assert_eq!(" HR ".parse::<Role>(), Ok(Role::Hr));
        assert_eq!("Manager".parse::<Role>(), Ok(Role::Manager));
        assert!("ceo".parse::<Role>().is_err());
    }

    #[test]
    fn unknown_roles_degrade_to_employee() {
        assert_eq!(Role::parse_lossy("contractor"), Role::Employee);
        assert!(!Role::parse_lossy("contractor").can_decide_leave());
        assert!(Role::Manager.can_decide_leave());
        assert!(!Role::Admin.can_decide_leave());
    }
}
