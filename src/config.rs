use serde::Deserialize;

/// Upper bound for any minutes setting (ten years); keeps `now + ttl` in range.
pub const MAX_MINUTES: i64 = 10 * 365 * 24 * 60;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    /// How long after expiry a token may still be exchanged on /refresh.
    pub refresh_grace_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "classroom-auth".into()),
            audience: std::env::var("JWT_AUDIENCE")
                .unwrap_or_else(|_| "classroom-auth-users".into()),
            ttl_minutes: env_minutes("JWT_TTL_MINUTES", 60),
            refresh_grace_minutes: env_minutes("JWT_REFRESH_GRACE_MINUTES", 0),
        };
        Ok(Self { database_url, jwt })
    }
}

fn env_minutes(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .filter(|v| (0..=MAX_MINUTES).contains(v))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_minutes_falls_back_on_garbage_negatives_and_overflow() {
        std::env::set_var("CLASSROOM_AUTH_TEST_GARBAGE", "soon");
        std::env::set_var("CLASSROOM_AUTH_TEST_NEGATIVE", "-5");
        std::env::set_var("CLASSROOM_AUTH_TEST_OK", "15");
        std::env::set_var("CLASSROOM_AUTH_TEST_HUGE", i64::MAX.to_string());
        std::env::set_var("CLASSROOM_AUTH_TEST_CAP", MAX_MINUTES.to_string());

        assert_eq!(env_minutes("CLASSROOM_AUTH_TEST_GARBAGE", 60), 60);
        assert_eq!(env_minutes("CLASSROOM_AUTH_TEST_NEGATIVE", 60), 60);
        assert_eq!(env_minutes("CLASSROOM_AUTH_TEST_OK", 60), 15);
        assert_eq!(env_minutes("CLASSROOM_AUTH_TEST_MISSING", 7), 7);
        assert_eq!(env_minutes("CLASSROOM_AUTH_TEST_HUGE", 60), 60);
        assert_eq!(env_minutes("CLASSROOM_AUTH_TEST_CAP", 60), MAX_MINUTES);
    }
}
