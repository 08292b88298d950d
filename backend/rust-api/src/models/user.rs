use serde::{Deserialize, Serialize};

/// Roles carried in access tokens
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    Student,
    Teacher,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &str {
        match self {
            UserRole::Student => "student",
            UserRole::Teacher => "teacher",
            UserRole::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "student" => Some(UserRole::Student),
            "teacher" => Some(UserRole::Teacher),
            "admin" => Some(UserRole::Admin),
            _ => None,
        }
    }
}

/// The authenticated caller, passed explicitly into every service call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub role: UserRole,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: UserRole) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    pub fn is_staff(&self) -> bool {
        matches!(self.role, UserRole::Teacher | UserRole::Admin)
    }

    pub fn is_student(&self) -> bool {
        self.role == UserRole::Student
    }
}
