use std::time::Duration;

pub const DEFAULT_OAUTH_SCOPES: &str = "https://www.googleapis.com/auth/analytics.readonly";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_dir: String,
    pub duckdb_memory_limit: String,
    pub cors_origins: Vec<String>,
    pub http_timeout_secs: u64,
    pub google: GoogleConfig,
    pub openai: OpenAiConfig,
}

/// Google Analytics property and OAuth client settings.
#[derive(Debug, Clone, Default)]
pub struct GoogleConfig {
    pub property_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
    pub redirect_uri: Option<String>,
    pub scopes: String,
}

#[derive(Debug, Clone, Default)]
pub struct OpenAiConfig {
    /// `None` disables generated narratives.
    pub api_key: Option<String>,
    pub model: String,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary variable source. Blank values count
    /// as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let get_either = |primary: &str, fallback: &str| get(primary).or_else(|| get(fallback));

        Ok(Self {
            port: get("TRENDLINE_PORT")
                .unwrap_or_else(|| "3000".to_string())
                .parse()
                .map_err(|e| format!("invalid port: {e}"))?,
            data_dir: get("TRENDLINE_DATA_DIR").unwrap_or_else(|| "./data".to_string()),
            duckdb_memory_limit: get("TRENDLINE_DUCKDB_MEMORY")
                .unwrap_or_else(|| "1GB".to_string()),
            cors_origins: get("TRENDLINE_CORS_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|o| !o.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            http_timeout_secs: get("TRENDLINE_HTTP_TIMEOUT_SECS")
                .map(|v| {
                    v.parse()
                        .map_err(|e| format!("invalid TRENDLINE_HTTP_TIMEOUT_SECS: {e}"))
                })
                .transpose()?
                .unwrap_or(30),
            google: GoogleConfig {
                property_id: get("GA4_PROPERTY_ID"),
                client_id: get_either("GA_OAUTH_CLIENT_ID", "GOOGLE_CLIENT_ID"),
                client_secret: get_either("GA_OAUTH_CLIENT_SECRET", "GOOGLE_CLIENT_SECRET"),
                refresh_token: get("GA_OAUTH_REFRESH_TOKEN"),
                redirect_uri: get("GA_OAUTH_REDIRECT_URI"),
                scopes: get("GA_OAUTH_SCOPES").unwrap_or_else(|| DEFAULT_OAUTH_SCOPES.to_string()),
            },
            openai: OpenAiConfig {
                api_key: get("OPENAI_API_KEY"),
                model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            },
        })
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Settings the dashboard needs that are not set. `OPENAI_API_KEY` is
    /// listed but its absence only disables narratives.
    pub fn missing_settings(&self) -> Vec<&'static str> {
        let g = &self.google;
        let mut missing = Vec::new();
        if g.property_id.is_none() {
            missing.push("GA4_PROPERTY_ID");
        }
        if g.client_id.is_none() {
            missing.push("GA_OAUTH_CLIENT_ID");
        }
        if g.client_secret.is_none() {
            missing.push("GA_OAUTH_CLIENT_SECRET");
        }
        if g.refresh_token.is_none() {
            missing.push("GA_OAUTH_REFRESH_TOKEN");
        }
        if self.openai.api_key.is_none() {
            missing.push("OPENAI_API_KEY");
        }
        missing
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<Config, String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = from_pairs(&[]).expect("config");
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.data_dir, "./data");
        assert_eq!(cfg.duckdb_memory_limit, "1GB");
        assert_eq!(cfg.http_timeout_secs, 30);
        assert_eq!(cfg.google.scopes, DEFAULT_OAUTH_SCOPES);
        assert_eq!(cfg.openai.model, DEFAULT_OPENAI_MODEL);
        assert!(cfg.openai.api_key.is_none());
    }

    #[test]
    fn google_client_falls_back_to_generic_names() {
        let cfg = from_pairs(&[
            ("GOOGLE_CLIENT_ID", "generic-id"),
            ("GA_OAUTH_CLIENT_SECRET", "ga-secret"),
            ("GOOGLE_CLIENT_SECRET", "generic-secret"),
        ])
        .expect("config");
        assert_eq!(cfg.google.client_id.as_deref(), Some("generic-id"));
        assert_eq!(cfg.google.client_secret.as_deref(), Some("ga-secret"));
    }

    #[test]
    fn blank_values_count_as_missing() {
        let cfg = from_pairs(&[("OPENAI_API_KEY", "  "), ("GA4_PROPERTY_ID", "1234")])
            .expect("config");
        let missing = cfg.missing_settings();
        assert!(missing.contains(&"OPENAI_API_KEY"));
        assert!(!missing.contains(&"GA4_PROPERTY_ID"));
    }

    #[test]
    fn invalid_port_is_rejected() {
        assert!(from_pairs(&[("TRENDLINE_PORT", "not-a-port")]).is_err());
    }

    #[test]
    fn cors_origins_split_on_commas() {
        let cfg = from_pairs(&[("TRENDLINE_CORS_ORIGINS", "https://a.test, https://b.test,")])
            .expect("config");
        assert_eq!(cfg.cors_origins, vec!["https://a.test", "https://b.test"]);
    }
}
