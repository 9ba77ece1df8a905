use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Tenant id.
    pub sub: Uuid,
    pub adm: bool,
    pub exp: i64,
}

impl Claims {
    pub fn new(tenant_id: Uuid, is_system_admin: bool) -> Self {
        Self {
            sub: tenant_id,
            adm: is_system_admin,
            exp: (Utc::now() + Duration::hours(12)).timestamp(),
        }
    }
}

pub fn encode_token(claims: &Claims, secret: &str) -> Result<String, String> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| format!("JWT encode failed: {e}"))
}

pub fn decode_token(token: &str, secret: &str) -> Result<Claims, String> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| format!("JWT decode failed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trips_claims() {
        let tenant = Uuid::now_v7();
        let token = encode_token(&Claims::new(tenant, true), "secret").unwrap();
        let claims = decode_token(&token, "secret").unwrap();
        assert_eq!(claims.sub, tenant);
        assert!(claims.adm);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = encode_token(&Claims::new(Uuid::now_v7(), false), "secret").unwrap();
        assert!(decode_token(&token, "other").is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let mut claims = Claims::new(Uuid::now_v7(), false);
        claims.exp = (Utc::now() - Duration::hours(1)).timestamp();
        let token = encode_token(&claims, "secret").unwrap();
        assert!(decode_token(&token, "secret").is_err());
    }
}
