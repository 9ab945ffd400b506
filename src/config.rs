use std::env;

/// Trait for types that can retrieve their API credential from environment
/// variables.
pub trait KeyFromEnv {
    /// The environment variable name for this client's API key.
    const KEY_NAME: &'static str;

    /// Find the API key by checking environment variables first, then .env file.
    ///
    /// Absence is not an error here: the credential is validated at call time,
    /// and an invalid or missing key surfaces as
    /// [`BackendError::Authentication`](crate::error::BackendError::Authentication)
    /// on the first request.
    fn find_key() -> Option<String> {
        // Load .env silently if present
        let _ = dotenvy::dotenv();

        env::var(Self::KEY_NAME).ok().filter(|k| !k.trim().is_empty())
    }
}

/// Configuration for a generative backend client.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub api_key: String,
    pub model: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gemini-2.5-flash".to_string(),
        }
    }
}

impl BackendConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self { api_key: api_key.into(), ..Self::default() }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}
