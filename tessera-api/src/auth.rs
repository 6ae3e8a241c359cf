use axum::{extract::State, routing::post, Json, Router};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::{StaffClaims, ROLE_ADMIN, ROLE_WORKER};
use crate::state::{AppState, AuthConfig};

#[derive(Debug, Deserialize)]
pub struct StaffLoginRequest {
    pub access_key: String,
    #[serde(default)]
    pub staff_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct AuthResponse {
    token: String,
    role: String,
    expires_in: u64,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/auth/staff", post(login_staff))
}

/// Sign a staff token for `sub` with `role`.
pub fn issue_token(auth: &AuthConfig, sub: &str, role: &str) -> Result<String, AppError> {
    let claims = StaffClaims {
        sub: sub.to_string(),
        role: role.to_string(),
        exp: (Utc::now() + Duration::seconds(auth.expiration as i64)).timestamp() as usize,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(auth.secret.as_bytes()))
        .map_err(|e| AppError::Anyhow(anyhow::anyhow!("Token encoding failed: {}", e)))
}

fn keys_match(given: &str, expected: &str) -> bool {
    given.len() == expected.len()
        && given
            .bytes()
            .zip(expected.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

async fn login_staff(
    State(state): State<AppState>,
    Json(req): Json<StaffLoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let role = if keys_match(&req.access_key, &state.auth.admin_access_key) {
        ROLE_ADMIN
    } else if keys_match(&req.access_key, &state.auth.worker_access_key) {
        ROLE_WORKER
    } else {
        tracing::warn!("Rejected staff login with unknown access key");
        return Err(AppError::AuthenticationError("Invalid access key".to_string()));
    };

    let staff_id = match req.staff_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => format!("staff-{}", Uuid::new_v4().simple()),
    };

    let token = issue_token(&state.auth, &staff_id, role)?;
    tracing::info!(staff_id = %staff_id, role, "Issued staff token");

    Ok(Json(AuthResponse {
        token,
        role: role.to_string(),
        expires_in: state.auth.expiration,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{decode, DecodingKey, Validation};

    #[test]
    fn test_key_comparison() {
        assert!(keys_match("door-key", "door-key"));
        assert!(!keys_match("door-key", "door-kez"));
        assert!(!keys_match("door", "door-key"));
    }

    #[test]
    fn test_token_round_trips_claims() {
        let auth = AuthConfig {
            secret: "secret".to_string(),
            expiration: 60,
            worker_access_key: "w".to_string(),
            admin_access_key: "a".to_string(),
        };
        let token = issue_token(&auth, "gate-3", ROLE_WORKER).unwrap();

        let data = decode::<StaffClaims>(
            &token,
            &DecodingKey::from_secret(b"secret"),
            &Validation::default(),
        )
        .unwrap();
        assert_eq!(data.claims.sub, "gate-3");
        assert_eq!(data.claims.role, ROLE_WORKER);
        assert!(!data.claims.is_admin());
    }
}
