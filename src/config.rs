use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

/// Upper bound on fetch workers.
pub const MAX_WORKERS: usize = 32;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub user_agent: String,
    pub timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub webdriver_url: String,
    pub headless: bool,
    /// Detail page wait.
    pub page_wait: Duration,
    /// Monthly list page wait.
    pub list_wait: Duration,
    /// Tracking tab activation wait.
    pub tracking_wait: Duration,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".to_string(),
            headless: true,
            page_wait: Duration::from_secs(10),
            list_wait: Duration::from_secs(5),
            tracking_wait: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub http: HttpConfig,
    pub browser: BrowserConfig,
    pub default_workers: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            browser: BrowserConfig::default(),
            default_workers: 4,
        }
    }
}

impl CollectorConfig {
    /// Reads `.env` (if present) and then the process environment.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        let user_agent = env::var("USER_AGENT")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.http.user_agent);

        Ok(Self {
            http: HttpConfig {
                user_agent,
                timeout: secs_var("HTTP_TIMEOUT_SECS", defaults.http.timeout)?,
            },
            browser: BrowserConfig {
                webdriver_url: env::var("WEBDRIVER_URL")
                    .ok()
                    .filter(|v| !v.trim().is_empty())
                    .unwrap_or(defaults.browser.webdriver_url),
                headless: bool_var("BROWSER_HEADLESS", defaults.browser.headless)?,
                page_wait: secs_var("PAGE_WAIT_SECS", defaults.browser.page_wait)?,
                list_wait: secs_var("LIST_WAIT_SECS", defaults.browser.list_wait)?,
                tracking_wait: secs_var("TRACKING_WAIT_SECS", defaults.browser.tracking_wait)?,
            },
            default_workers: match env::var("FETCH_PARALLELISM") {
                Ok(raw) if !raw.trim().is_empty() => raw
                    .trim()
                    .parse::<usize>()
                    .with_context(|| format!("FETCH_PARALLELISM={raw:?} is not a number"))?
                    .clamp(1, MAX_WORKERS),
                _ => defaults.default_workers,
            },
        })
    }
}

fn secs_var(key: &str, default: Duration) -> Result<Duration> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => {
            let secs = raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("{key}={raw:?} is not a whole number of seconds"))?;
            Ok(Duration::from_secs(secs))
        }
        _ => Ok(default),
    }
}

fn bool_var(key: &str, default: bool) -> Result<bool> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(anyhow::anyhow!("{key}={raw:?} is not a boolean")),
        },
        _ => Ok(default),
    }
}
