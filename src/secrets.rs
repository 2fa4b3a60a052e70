use std::fmt;

use crate::config::Env;
use crate::{Result, StudioError};

/// Environment keys checked, in order, when no key is given explicitly.
pub const DEFAULT_API_KEY_ENV: &[&str] = &["GEMINI_API_KEY", "GOOGLE_API_KEY", "API_KEY"];

/// API key passed explicitly to every backend call.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ApiKey").field(&"<redacted>").finish()
    }
}

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into().trim().to_string())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn from_env(env: &Env, keys: &[&str]) -> Result<Self> {
        let keys = if keys.is_empty() {
            DEFAULT_API_KEY_ENV
        } else {
            keys
        };
        for key in keys {
            if let Some(value) = env.get(key) {
                return Ok(Self::new(value));
            }
        }
        Err(StudioError::Config(format!(
            "no api key found (set one of: {})",
            keys.join(", ")
        )))
    }

    pub(crate) fn ensure_present(&self) -> Result<()> {
        if self.is_empty() {
            return Err(StudioError::InvalidInput("api key is empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_is_redacted() {
        let key = ApiKey::new("AIza-secret");
        assert!(!format!("{key:?}").contains("AIza"));
        assert_eq!(key.expose(), "AIza-secret");
    }

    #[test]
    fn resolves_first_configured_key() -> crate::Result<()> {
        let env = Env::parse_dotenv("GOOGLE_API_KEY=from-google\nAPI_KEY=fallback\n");
        let key = ApiKey::from_env(&env, &["MEDIA_STUDIO_TEST_UNSET_KEY", "GOOGLE_API_KEY"])?;
        assert_eq!(key.expose(), "from-google");
        Ok(())
    }

    #[test]
    fn missing_key_is_config_error() {
        let env = Env::default();
        let err = ApiKey::from_env(&env, &["MEDIA_STUDIO_TEST_UNSET_KEY"]).unwrap_err();
        assert!(matches!(err, StudioError::Config(_)));
    }
}
