use hmac::{Hmac, Mac};
use secrecy::ExposeSecret;
use sha2::Sha256;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{ApiKey, Scope};

type HmacSha256 = Hmac<Sha256>;

/// The authenticated caller identity the core consumes from the outer
/// layer (sec 1): organization, api key, and its granted scope set.
#[derive(Debug, Clone)]
pub struct ApiKeyPrincipal {
    pub organization_id: Uuid,
    pub api_key_id: Uuid,
    pub scopes: Vec<String>,
}

impl ApiKeyPrincipal {
    pub fn has_scope(&self, required: Scope) -> bool {
        self.scopes.iter().any(|s| s == "*" || s == required.as_str())
    }
}

/// Validates bearer API keys: `hash = sha256(salt || pepper || token)`,
/// compared in constant time.
#[derive(Clone)]
pub struct AuthService {
    pool: PgPool,
    config: Config,
}

impl AuthService {
    pub fn new(pool: PgPool, config: Config) -> Self {
        Self { pool, config }
    }

    fn compute_hash(&self, salt: &str, token: &str) -> AppResult<String> {
        let pepper = self.config.api_key_pepper.expose_secret();
        let mut mac = HmacSha256::new_from_slice(pepper.as_bytes())
            .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid pepper key: {e}")))?;
        mac.update(salt.as_bytes());
        mac.update(token.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Look up the api key by its salt-prefixed token and verify the hash
    /// in constant time. The token format is `<salt>.<secret>`.
    pub async fn authenticate(&self, token: &str) -> AppResult<ApiKeyPrincipal> {
        let (salt, _secret) = token
            .split_once('.')
            .ok_or(AppError::Unauthorized)?;

        let expected_hash = self.compute_hash(salt, token)?;

        let key = sqlx::query_as::<_, ApiKey>(
            r#"
            SELECT * FROM api_keys
            WHERE salt = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(salt)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::Unauthorized)?;

        if !constant_time_eq(expected_hash.as_bytes(), key.hash.as_bytes()) {
            return Err(AppError::Unauthorized);
        }

        Ok(ApiKeyPrincipal {
            organization_id: key.organization_id,
            api_key_id: key.id,
            scopes: key.scopes,
        })
    }

    /// Generate a new api key secret and its stored hash, for key creation.
    pub fn issue(&self, salt: &str) -> AppResult<(String, String)> {
        use rand::Rng;
        let secret: String = rand::thread_rng()
            .sample_iter(&rand::distributions::Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        let token = format!("{salt}.{secret}");
        let hash = self.compute_hash(salt, &token)?;
        Ok((token, hash))
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Require the principal to hold `scope` (or `*`), per the endpoint's
/// declared requirement (sec 6: "An endpoint requires its listed scope
/// or `*`").
pub fn require_scope(principal: &ApiKeyPrincipal, scope: Scope) -> AppResult<()> {
    if principal.has_scope(scope) {
        Ok(())
    } else {
        Err(AppError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_matches_identical_slices() {
        assert!(constant_time_eq(b"abcdef", b"abcdef"));
    }

    #[test]
    fn constant_time_eq_rejects_different_length() {
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }

    #[test]
    fn constant_time_eq_rejects_different_content() {
        assert!(!constant_time_eq(b"abcdef", b"abcxef"));
    }

    #[test]
    fn principal_wildcard_scope_grants_everything() {
        let principal = ApiKeyPrincipal {
            organization_id: Uuid::new_v4(),
            api_key_id: Uuid::new_v4(),
            scopes: vec!["*".to_string()],
        };
        assert!(principal.has_scope(Scope::Chat));
        assert!(principal.has_scope(Scope::DataWrite));
    }

    #[test]
    fn principal_without_wildcard_is_scope_restricted() {
        let principal = ApiKeyPrincipal {
            organization_id: Uuid::new_v4(),
            api_key_id: Uuid::new_v4(),
            scopes: vec!["retrieval".to_string()],
        };
        assert!(principal.has_scope(Scope::Retrieval));
        assert!(!principal.has_scope(Scope::Chat));
    }
}
