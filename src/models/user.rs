use serde::{Deserialize, Serialize};

/// The signed-in user kept in the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub name: String,
}

impl User {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Identity of a caller authenticated by an application key.
    pub fn application(app: &str) -> Self {
        Self {
            name: format!("[{app}]"),
        }
    }
}
