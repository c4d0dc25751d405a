//! Authentication against the backend's token endpoints. The bearer token
//! lives on the `ApiClient` for the rest of the process; nothing is
//! persisted across restarts.

use serde::Serialize;
use tracing::info;

use crate::api::ApiClient;
use crate::errors::ClientError;
use crate::models::user::{AuthToken, UserInfo};

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    username: &'a str,
    email: &'a str,
    password: &'a str,
}

pub async fn login(
    api: &ApiClient,
    username: &str,
    password: &str,
) -> Result<AuthToken, ClientError> {
    let token: AuthToken = api
        .post_json("/auth/login", &LoginRequest { username, password })
        .await?;
    api.set_token(&token.access_token);
    info!("Logged in as {}", token.username);
    Ok(token)
}

pub async fn register(
    api: &ApiClient,
    username: &str,
    email: &str,
    password: &str,
) -> Result<AuthToken, ClientError> {
    let token: AuthToken = api
        .post_json(
            "/auth/register",
            &RegisterRequest {
                username,
                email,
                password,
            },
        )
        .await?;
    api.set_token(&token.access_token);
    info!("Registered and logged in as {}", token.username);
    Ok(token)
}

pub async fn current_user(api: &ApiClient) -> Result<UserInfo, ClientError> {
    api.get_json("/auth/user").await
}

pub fn logout(api: &ApiClient) {
    api.clear_token();
}
