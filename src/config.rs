use std::path::PathBuf;
use std::time::Duration;

/// Runtime settings read from `.env` and the process environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_base: String,
    pub raw_base: String,
    pub github_token: Option<String>,
    pub data_dir: PathBuf,
    /// Prefix for links into the web app when it is deployed under a subpath.
    pub base_path: String,
    pub log_level: String,
    pub fetch: FetchConfig,
}

impl Settings {
    pub fn from_env() -> Self {
        let _ = dotenv::dotenv();

        let api_base = dotenv::var("GITHUB_API_BASE")
            .unwrap_or_else(|_| "https://api.github.com".to_string());
        let raw_base = dotenv::var("GITHUB_RAW_BASE")
            .unwrap_or_else(|_| "https://raw.githubusercontent.com".to_string());
        let github_token = dotenv::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty());
        let data_dir = dotenv::var("KEPLER_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/cache"));
        let base_path = normalize_base_path(&dotenv::var("KEPLER_BASE_PATH").unwrap_or_default());
        let log_level = dotenv::var("KEPLER_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            raw_base: raw_base.trim_end_matches('/').to_string(),
            github_token,
            data_dir,
            base_path,
            log_level,
            fetch: FetchConfig::default(),
        }
    }

    /// Link to a document page of the web app, honoring the base path.
    pub fn app_link(&self, route: &str, number: &str) -> String {
        format!("{}/{}?number={}", self.base_path, route, number)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            raw_base: "https://raw.githubusercontent.com".to_string(),
            github_token: None,
            data_dir: PathBuf::from("./data/cache"),
            base_path: String::new(),
            log_level: "info".to_string(),
            fetch: FetchConfig::default(),
        }
    }
}

/// `"/kepler/"` and `"kepler"` both become `"/kepler"`; empty stays empty.
fn normalize_base_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

/// Fetch and view tunables.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Concurrent per-document fetches per batch.
    pub batch_size: usize,
    pub commit_page_size: usize,
    /// Concurrent commit-detail fetches per batch.
    pub commit_batch_size: usize,
    /// Max characters kept from a narrative file.
    pub excerpt_chars: usize,
    /// Total attempts for a rate-limited request, the first one included.
    pub max_attempts: u32,
    pub retry_base_delay: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            batch_size: 15,
            commit_page_size: 100,
            commit_batch_size: 10,
            excerpt_chars: 4000,
            max_attempts: 3,
            retry_base_delay: Duration::from_millis(1000),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_path_is_normalized() {
        assert_eq!(normalize_base_path(""), "");
        assert_eq!(normalize_base_path("/"), "");
        assert_eq!(normalize_base_path("kepler"), "/kepler");
        assert_eq!(normalize_base_path("/kepler/"), "/kepler");
    }

    #[test]
    fn app_link_uses_base_path() {
        let settings = Settings {
            base_path: "/kepler".to_string(),
            ..Settings::default()
        };
        assert_eq!(settings.app_link("kep", "1287"), "/kepler/kep?number=1287");
    }
}
