use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::{
    auth::repo_types::User,
    config::{JwtConfig, MAX_MINUTES},
    state::AppState,
};

/// Something a bearer token can be issued for.
pub trait JwtSubject {
    /// Value stored in the `sub` claim.
    fn jwt_identifier(&self) -> Uuid;

    /// Extra claims merged into the payload. Registered claim names are ignored.
    fn jwt_custom_claims(&self) -> Map<String, Value> {
        Map::new()
    }
}

impl JwtSubject for User {
    fn jwt_identifier(&self) -> Uuid {
        self.id
    }
}

const REGISTERED_CLAIMS: [&str; 6] = ["sub", "iat", "exp", "iss", "aud", "jti"];

/// JWT payload used for authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
    pub jti: Uuid,
    #[serde(flatten)]
    pub custom: Map<String, Value>,
}

/// A freshly signed token plus what the client is told about it.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
}

impl IssuedToken {
    /// Seconds until expiry, as reported in `expires_in`.
    pub fn expires_in(&self) -> i64 {
        self.claims.exp - self.claims.iat
    }
}

/// Holds JWT signing and verification keys with config data.
#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub ttl: Duration,
    pub refresh_grace: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        Self::from_config(&state.config.jwt)
    }
}

impl JwtKeys {
    pub fn from_config(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            ttl: minutes(cfg.ttl_minutes),
            refresh_grace: minutes(cfg.refresh_grace_minutes),
        }
    }

    /// Issue a token for `subject` with the configured TTL.
    pub fn issue<S: JwtSubject + ?Sized>(&self, subject: &S) -> anyhow::Result<IssuedToken> {
        self.issue_after(subject, None)
    }

    /// Issue a token whose `exp` is strictly later than `previous_exp`, when given.
    pub fn issue_after<S: JwtSubject + ?Sized>(
        &self,
        subject: &S,
        previous_exp: Option<i64>,
    ) -> anyhow::Result<IssuedToken> {
        let now = now_unix();
        let mut exp = now.saturating_add(self.ttl.as_secs() as i64);
        if let Some(prev) = previous_exp {
            // two refreshes inside the same second would otherwise produce equal `exp`
            exp = exp.max(prev.saturating_add(1));
        }

        let mut custom = subject.jwt_custom_claims();
        custom.retain(|k, _| !REGISTERED_CLAIMS.contains(&k.as_str()));

        let claims = Claims {
            sub: subject.jwt_identifier(),
            iat: now,
            exp,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            jti: Uuid::new_v4(),
            custom,
        };
        let token = self.encode(&claims)?;
        debug!(user_id = %claims.sub, exp = claims.exp, "jwt signed");
        Ok(IssuedToken { token, claims })
    }

    pub fn encode(&self, claims: &Claims) -> anyhow::Result<String> {
        Ok(encode(&Header::new(Algorithm::HS256), claims, &self.encoding)?)
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);
        validation
    }

    /// Verify signature, issuer, audience and expiry.
    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation())?;
        debug!(user_id = %data.claims.sub, "jwt verified");
        Ok(data.claims)
    }

    /// Like [`verify`](Self::verify), but an expired token is still accepted
    /// while it is within the refresh grace window.
    pub fn verify_for_refresh(&self, token: &str) -> anyhow::Result<Claims> {
        let mut validation = self.validation();
        validation.validate_exp = false;
        let claims = decode::<Claims>(token, &self.decoding, &validation)?.claims;

        let deadline = claims.exp + self.refresh_grace.as_secs() as i64;
        if deadline < now_unix() {
            anyhow::bail!("token expired beyond refresh window");
        }
        Ok(claims)
    }
}

fn minutes(value: i64) -> Duration {
    Duration::from_secs(value.clamp(0, MAX_MINUTES) as u64 * 60)
}

fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Subject(Uuid);

    impl JwtSubject for Subject {
        fn jwt_identifier(&self) -> Uuid {
            self.0
        }
    }

    struct NoisySubject(Uuid);

    impl JwtSubject for NoisySubject {
        fn jwt_identifier(&self) -> Uuid {
            self.0
        }

        fn jwt_custom_claims(&self) -> Map<String, Value> {
            let mut m = Map::new();
            m.insert("sub".into(), Value::String("someone-else".into()));
            m.insert("course".into(), Value::String("rust-101".into()));
            m
        }
    }

    fn make_keys(issuer: &str, audience: &str, grace_minutes: i64) -> JwtKeys {
        JwtKeys::from_config(&JwtConfig {
            secret: "dev-secret".into(),
            issuer: issuer.into(),
            audience: audience.into(),
            ttl_minutes: 5,
            refresh_grace_minutes: grace_minutes,
        })
    }

    fn expired_claims(keys: &JwtKeys, sub: Uuid, seconds_ago: i64) -> Claims {
        let now = now_unix();
        Claims {
            sub,
            iat: now - 3600,
            exp: now - seconds_ago,
            iss: keys.issuer.clone(),
            aud: keys.audience.clone(),
            jti: Uuid::new_v4(),
            custom: Map::new(),
        }
    }

    #[test]
    fn sign_and_verify_token() {
        let keys = make_keys("test-issuer", "test-aud", 0);
        let user_id = Uuid::new_v4();
        let issued = keys.issue(&Subject(user_id)).expect("sign");
        let claims = keys.verify(&issued.token).expect("verify token");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert!(claims.custom.is_empty());
        assert_eq!(issued.expires_in(), 5 * 60);
    }

    #[test]
    fn verify_rejects_wrong_issuer_or_audience() {
        let good_keys = make_keys("good-iss", "good-aud", 0);
        let bad_keys = make_keys("bad-iss", "bad-aud", 0);
        let issued = good_keys.issue(&Subject(Uuid::new_v4())).expect("sign");
        assert!(bad_keys.verify(&issued.token).is_err());
    }

    #[test]
    fn verify_rejects_foreign_signature_and_garbage() {
        let keys = make_keys("iss", "aud", 0);
        let mut other = make_keys("iss", "aud", 0);
        other.encoding = EncodingKey::from_secret(b"another-secret");
        let forged = other.issue(&Subject(Uuid::new_v4())).unwrap();

        assert!(keys.verify(&forged.token).is_err());
        assert!(keys.verify("not.a.jwt").is_err());
        assert!(keys.verify("").is_err());
    }

    #[test]
    fn expired_token_is_rejected_without_leeway() {
        let keys = make_keys("iss", "aud", 0);
        let token = keys
            .encode(&expired_claims(&keys, Uuid::new_v4(), 1))
            .unwrap();
        assert!(keys.verify(&token).is_err());
        assert!(keys.verify_for_refresh(&token).is_err());
    }

    #[test]
    fn refresh_grace_window_accepts_recently_expired_token() {
        let keys = make_keys("iss", "aud", 10);
        let sub = Uuid::new_v4();

        let recent = keys.encode(&expired_claims(&keys, sub, 60)).unwrap();
        assert!(keys.verify(&recent).is_err());
        assert_eq!(keys.verify_for_refresh(&recent).unwrap().sub, sub);

        let stale = keys.encode(&expired_claims(&keys, sub, 11 * 60)).unwrap();
        assert!(keys.verify_for_refresh(&stale).is_err());
    }

    #[test]
    fn issue_after_moves_expiry_strictly_forward() {
        let keys = make_keys("iss", "aud", 0);
        let first = keys.issue(&Subject(Uuid::new_v4())).unwrap();
        let second = keys
            .issue_after(&Subject(first.claims.sub), Some(first.claims.exp))
            .unwrap();
        assert!(second.claims.exp > first.claims.exp);
        assert_ne!(first.token, second.token);
    }

    #[test]
    fn oversized_ttl_is_capped_instead_of_overflowing() {
        let keys = JwtKeys::from_config(&JwtConfig {
            secret: "dev-secret".into(),
            issuer: "iss".into(),
            audience: "aud".into(),
            ttl_minutes: i64::MAX,
            refresh_grace_minutes: i64::MAX,
        });
        assert_eq!(keys.ttl, Duration::from_secs(MAX_MINUTES as u64 * 60));
        assert_eq!(keys.refresh_grace, keys.ttl);

        let issued = keys.issue(&Subject(Uuid::new_v4())).unwrap();
        assert_eq!(issued.claims.exp - issued.claims.iat, MAX_MINUTES * 60);
        assert!(keys.verify(&issued.token).is_ok());

        let again = keys
            .issue_after(&Subject(issued.claims.sub), Some(i64::MAX))
            .unwrap();
        assert_eq!(again.claims.exp, i64::MAX);
    }

    #[test]
    fn custom_claims_cannot_override_registered_ones() {
        let keys = make_keys("iss", "aud", 0);
        let user_id = Uuid::new_v4();
        let issued = keys.issue(&NoisySubject(user_id)).unwrap();
        let claims = keys.verify(&issued.token).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.custom.get("course"), Some(&Value::from("rust-101")));
        assert!(!claims.custom.contains_key("sub"));
    }
}
