//! # Authentication
//!
//! Resolves the bearer token on each request into a [`Principal`].
//!
//! Tokens are issued by the session service and have the form
//! `v1.{user_id}.{role}.{expires_unix}.{hex hmac-sha256}`, signed with the
//! shared `AUTH_SECRET` over everything before the last dot.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::FromRequestParts;
use axum::http::{header::AUTHORIZATION, request::Parts};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use shop_core::{AdminPrincipal, Principal, Role, ShopError, ShopResult, UserId};

type HmacSha256 = Hmac<Sha256>;

const TOKEN_VERSION: &str = "v1";

/// Turns a bearer credential into an authenticated principal
pub trait IdentityProvider: Send + Sync {
    fn authenticate(&self, token: &str) -> ShopResult<Principal>;
}

/// Issues and verifies HMAC-signed bearer tokens
#[derive(Clone)]
pub struct TokenAuthority {
    key: Vec<u8>,
}

impl TokenAuthority {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            key: secret.as_ref().to_vec(),
        }
    }

    fn mac(&self) -> ShopResult<HmacSha256> {
        HmacSha256::new_from_slice(&self.key)
            .map_err(|e| ShopError::Configuration(format!("invalid auth secret: {e}")))
    }

    /// Token for `principal` that expires at `expires_unix`
    pub fn issue(&self, principal: &Principal, expires_unix: i64) -> ShopResult<String> {
        let claims = format!(
            "{TOKEN_VERSION}.{}.{}.{expires_unix}",
            principal.user_id(),
            principal.role()
        );
        let mut mac = self.mac()?;
        mac.update(claims.as_bytes());
        Ok(format!("{claims}.{}", hex::encode(mac.finalize().into_bytes())))
    }

    /// Check the signature and expiry of `token` as of `now_unix`
    pub fn verify_at(&self, token: &str, now_unix: i64) -> ShopResult<Principal> {
        let invalid = || ShopError::Unauthorized("invalid token".to_string());

        let (claims, signature) = token.rsplit_once('.').ok_or_else(invalid)?;
        let signature = hex::decode(signature).map_err(|_| invalid())?;
        let mut mac = self.mac()?;
        mac.update(claims.as_bytes());
        mac.verify_slice(&signature).map_err(|_| invalid())?;

        let mut parts = claims.split('.');
        let (Some(TOKEN_VERSION), Some(user_id), Some(role), Some(expires), None) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return Err(invalid());
        };

        let expires: i64 = expires.parse().map_err(|_| invalid())?;
        if expires <= now_unix {
            return Err(ShopError::Unauthorized("token expired".to_string()));
        }

        let user_id: UserId = user_id.parse().map_err(|_| invalid())?;
        let role: Role = role.parse()?;
        Ok(Principal::new(user_id, role))
    }
}

impl IdentityProvider for TokenAuthority {
    fn authenticate(&self, token: &str) -> ShopResult<Principal> {
        self.verify_at(token, Utc::now().timestamp())
    }
}

/// Any authenticated caller
#[derive(Debug, Clone, Copy)]
pub struct Authenticated(pub Principal);

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ShopError::Unauthorized("missing bearer token".to_string()))?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ShopError::Unauthorized("expected a bearer token".to_string()))?;

        let principal = state.identity.authenticate(token.trim())?;
        Ok(Authenticated(principal))
    }
}

/// An authenticated caller holding the admin role; others get 403
#[derive(Debug, Clone, Copy)]
pub struct Admin(pub AdminPrincipal);

impl FromRequestParts<AppState> for Admin {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Authenticated(principal) = Authenticated::from_request_parts(parts, state).await?;
        Ok(Admin(principal.into_admin()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn test_issued_token_verifies() {
        let authority = TokenAuthority::new("secret");
        let token = authority.issue(&Principal::admin(UserId(5)), NOW + 60).unwrap();

        let principal = authority.verify_at(&token, NOW).unwrap();
        assert_eq!(principal.user_id(), UserId(5));
        assert!(principal.is_admin());
    }

    #[test]
    fn test_expired_token_rejected() {
        let authority = TokenAuthority::new("secret");
        let token = authority.issue(&Principal::customer(UserId(5)), NOW).unwrap();
        assert!(matches!(
            authority.verify_at(&token, NOW),
            Err(ShopError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_tampered_token_rejected() {
        let authority = TokenAuthority::new("secret");
        let token = authority.issue(&Principal::customer(UserId(5)), NOW + 60).unwrap();
        let forged = token.replacen(".customer.", ".admin.", 1);
        assert!(authority.verify_at(&forged, NOW).is_err());

        let other = TokenAuthority::new("other-secret");
        assert!(other.verify_at(&token, NOW).is_err());
        assert!(authority.verify_at("not-a-token", NOW).is_err());
    }
}
