use crate::user;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::User => "USER",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Some(Role::Admin),
            "USER" => Some(Role::User),
            _ => None,
        }
    }
}

impl From<Role> for user::Role {
    fn from(role: Role) -> Self {
        match role {
            Role::Admin => user::Role::Admin,
            Role::User => user::Role::User,
        }
    }
}

impl TryFrom<user::Role> for Role {
    type Error = ();

    fn try_from(role: user::Role) -> Result<Self, Self::Error> {
        match role {
            user::Role::Admin => Ok(Role::Admin),
            user::Role::User => Ok(Role::User),
            user::Role::Unspecified => Err(()),
        }
    }
}

/// 数据库中的用户记录，password 为 bcrypt 哈希
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppUser {
    pub id: i64,
    pub full_name: String,
    pub username: String,
    pub password: String,
    pub role: Role,
}

impl AppUser {
    /// 对外的用户信息，不包含密码
    pub fn to_proto(&self) -> user::User {
        user::User {
            id: self.id,
            full_name: self.full_name.clone(),
            username: self.username.clone(),
            role: user::Role::from(self.role) as i32,
        }
    }
}

/// 待保存的新用户
#[derive(Debug, Clone)]
pub struct NewUser {
    pub full_name: String,
    pub username: String,
    pub password: String,
    pub role: Role,
}
