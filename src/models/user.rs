use serde::{Deserialize, Serialize};

/// Customer identity as delivered by the upstream authenticator. The core
/// only needs the email key and the account-hold flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub email: String,
    pub name: Option<String>,
    pub is_on_hold: bool,
}
