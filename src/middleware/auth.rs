use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::user::{CurrentUser, Role};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub role: Option<String>,
}

/// Verification key for bearer tokens, injected through router state.
#[derive(Clone)]
pub struct AuthKeys {
    decoding: Arc<DecodingKey>,
}

impl AuthKeys {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding: Arc::new(DecodingKey::from_secret(secret.as_bytes())),
        }
    }

    fn current_user(&self, token: &str) -> Option<CurrentUser> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        let data = decode::<Claims>(token, &self.decoding, &validation).ok()?;
        let id = Uuid::parse_str(&data.claims.sub).ok()?;
        let role = Role::parse(data.claims.role.as_deref().unwrap_or_default())?;
        Some(CurrentUser::new(id, role))
    }
}

fn reject(status: StatusCode, code: &str) -> Response {
    (status, Json(json!({ "error": code }))).into_response()
}

/// Resolves the bearer token into a `CurrentUser` request extension.
pub async fn require_user(State(keys): State<AuthKeys>, mut req: Request, next: Next) -> Response {
    let Some(auth_header) = req.headers().get(axum::http::header::AUTHORIZATION) else {
        return reject(StatusCode::UNAUTHORIZED, "missing_authorization");
    };
    let Ok(auth_str) = auth_header.to_str() else {
        return reject(StatusCode::UNAUTHORIZED, "bad_authorization");
    };
    let Some(token) = auth_str.strip_prefix("Bearer ") else {
        return reject(StatusCode::UNAUTHORIZED, "unsupported_scheme");
    };

    match keys.current_user(token) {
        Some(user) => {
            req.extensions_mut().insert(user);
            next.run(req).await
        }
        None => reject(StatusCode::UNAUTHORIZED, "invalid_token"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token(secret: &str, sub: &str, role: &str) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
            role: Some(role.to_string()),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn resolves_user_and_role_from_token() {
        let keys = AuthKeys::new("secret");
        let id = Uuid::new_v4();
        let user = keys
            .current_user(&token("secret", &id.to_string(), "Student"))
            .unwrap();
        assert_eq!(user, CurrentUser::new(id, Role::Student));
    }

    #[test]
    fn rejects_foreign_signature_and_unknown_roles() {
        let keys = AuthKeys::new("secret");
        let id = Uuid::new_v4().to_string();
        assert!(keys.current_user(&token("other", &id, "student")).is_none());
        assert!(keys.current_user(&token("secret", &id, "hr")).is_none());
    }
}
