use serde::{Deserialize, Serialize};

/// The authenticated user as reported by `GET /api/v1/users/me`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Principal {
    pub user_id: i64,
    pub username: String,
    #[serde(default)]
    pub role_id: i64,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool { true }

/// Role id 1 is the seeded administrator role.
pub const ADMIN_ROLE_ID: i64 = 1;

impl Principal {
    pub fn display_name(&self) -> String {
        let full = [self.first_name.as_deref(), self.last_name.as_deref()]
            .iter()
            .flatten()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if full.is_empty() { self.username.clone() } else { full }
    }

    pub fn is_admin(&self) -> bool { self.role_id == ADMIN_ROLE_ID }
}
