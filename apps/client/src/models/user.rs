#![allow(dead_code)]

use serde::{Deserialize, Serialize};

/// Bearer token issued by `/auth/login` and `/auth/register`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthToken {
    pub access_token: String,
    pub token_type: String,
    pub username: String,
}

/// Current-user details from `/auth/user`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub username: String,
    pub email: String,
}
