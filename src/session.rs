use crate::models::{LoginResponse, Role};

/// Identity of the signed-in user. Built once from the login response and
/// handed to every flow that needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: u64,
    pub name: String,
    pub role: Role,
    pub token: String,
    pub child_id: Option<u64>,
}

impl Session {
    /// Restrictions are managed per child. Accounts without a linked child
    /// manage their own.
    pub fn restriction_target(&self) -> u64 {
        match self.role {
            Role::Parent => self.child_id.unwrap_or(self.user_id),
            _ => self.user_id,
        }
    }
}

impl From<LoginResponse> for Session {
    fn from(login: LoginResponse) -> Self {
        Self {
            user_id: login.user_id,
            name: login.name,
            role: login.role,
            token: login.token,
            child_id: login.child_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_targets_child() {
        let login: LoginResponse = serde_json::from_str(
            r#"{"user_id": 40, "name": "Pat", "role": "parent", "token": "t", "child_id": 12}"#,
        )
        .unwrap();
        let session = Session::from(login);
        assert_eq!(session.role, Role::Parent);
        assert_eq!(session.restriction_target(), 12);

        let student = Session {
            role: Role::Student,
            child_id: None,
            ..session
        };
        assert_eq!(student.restriction_target(), 40);
    }
}
