//! Session establishment against the manager REST API.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::error::{CephError, CephResult};
use crate::transport::{ApiRequest, HttpTransport, Transport};

const STATUS_CREATED: u16 = 201;
const STATUS_SEE_OTHER: u16 = 303;

/// Document returned by `POST /api/auth`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Auth {
    pub token: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub permissions: HashMap<String, Vec<String>>,
    #[serde(default, rename = "pwdExpirationDate")]
    pub pwd_expiration_date: Value,
    #[serde(default)]
    pub sso: bool,
    #[serde(default, rename = "pwdUpdateRequired")]
    pub pwd_update_required: bool,
}

/// Log in and attach the bearer token to `transport`.
pub async fn login(transport: &HttpTransport, username: &str, password: &str) -> CephResult<Auth> {
    if username.is_empty() {
        return Err(CephError::Validation { field: "username" });
    }
    if password.is_empty() {
        return Err(CephError::Validation { field: "password" });
    }

    let body = json!({ "username": username, "password": password });
    let response = transport.execute(ApiRequest::post(&["auth"], body)).await?;

    if response.status != STATUS_CREATED {
        return Err(CephError::Authentication(format!(
            "could not login as '{}': expected http status 201, got {}: {}",
            username, response.status, response.body
        )));
    }

    let auth: Auth = response.json()?;
    transport.set_token(auth.token.clone()).await;
    Ok(auth)
}

/// End the session and drop the token.
pub async fn logout(transport: &HttpTransport) -> CephResult<()> {
    let response = transport
        .execute(ApiRequest::new(reqwest::Method::POST, &["auth", "logout"]))
        .await?;

    if !response.is_success() {
        return Err(CephError::from_response("could not logout", &response));
    }

    transport.clear_token().await;
    Ok(())
}

/// Follow a standby manager's `303 See Other` to the active one.
///
/// Returns whether the transport was re-targeted.
pub async fn discover_manager(transport: &HttpTransport) -> CephResult<bool> {
    let response = transport.execute(ApiRequest::get(&[""])).await?;

    if response.status != STATUS_SEE_OTHER {
        return Ok(false);
    }
    match response.location() {
        Some(location) if !location.is_empty() => {
            let location = location.to_string();
            transport.retarget(&location).await?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_decoding() {
        let auth: Auth = serde_json::from_str(
            r#"{"token": "eyJ0", "username": "admin",
                "permissions": {"rbd-image": ["create", "delete", "read", "update"]},
                "pwdExpirationDate": null, "sso": false, "pwdUpdateRequired": false}"#,
        )
        .unwrap();
        assert_eq!(auth.token, "eyJ0");
        assert_eq!(auth.permissions["rbd-image"].len(), 4);
        assert!(auth.pwd_expiration_date.is_null());
    }
}
