//! HTTP server configuration.

/// Settings for the REST surface, read from the environment at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origins the CORS layer accepts, from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    pub request_timeout_secs: u64,
}

impl ServerConfig {
    /// Read settings from the environment, falling back to development
    /// defaults: `HOST` `0.0.0.0`, `PORT` `3000`, `CORS_ORIGINS`
    /// `http://localhost:5173`, `REQUEST_TIMEOUT_SECS` `30`.
    ///
    /// Malformed numeric values abort startup.
    pub fn from_env() -> Self {
        Self {
            host: env_or("HOST", "0.0.0.0"),
            port: env_or("PORT", "3000")
                .parse()
                .expect("PORT must be a valid port number"),
            cors_origins: split_origins(&env_or("CORS_ORIGINS", "http://localhost:5173")),
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", "30")
                .parse()
                .expect("REQUEST_TIMEOUT_SECS must be a number of seconds"),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_list_is_trimmed_and_pruned() {
        assert_eq!(
            split_origins("http://a.example, http://b.example ,,"),
            vec!["http://a.example".to_string(), "http://b.example".to_string()]
        );
        assert!(split_origins("").is_empty());
    }
}
