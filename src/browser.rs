use std::thread;
use std::time::{Duration, Instant};

use reqwest::Method;
use reqwest::blocking::Client;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::BrowserConfig;
use crate::error::FetchError;
use crate::http_client::control_client;

/// W3C web element reference key.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";
const PAGE_LOAD_TIMEOUT_MS: u64 = 20_000;
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Rendered-page access used by the J League fetcher.
pub trait BrowserSession: Send {
    fn navigate(&mut self, url: &str) -> Result<(), FetchError>;

    /// `Ok(false)` when nothing matched `css` before `timeout`.
    fn wait_for(&mut self, css: &str, timeout: Duration) -> Result<bool, FetchError>;

    /// Script-clicks the first match of `css`; `Ok(false)` when absent.
    fn click(&mut self, css: &str) -> Result<bool, FetchError>;

    fn page_source(&mut self) -> Result<String, FetchError>;

    /// False once a command has failed at the session level.
    fn is_alive(&self) -> bool;
}

/// Chrome session driven through a chromedriver endpoint.
pub struct WebDriverSession {
    client: &'static Client,
    base: String,
    session_id: String,
    alive: bool,
}

pub fn chrome_capabilities(config: &BrowserConfig, user_agent: &str) -> Value {
    let mut args = vec![
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-gpu".to_string(),
        "--window-size=1920,1080".to_string(),
        "--log-level=3".to_string(),
        format!("--user-agent={user_agent}"),
    ];
    if config.headless {
        args.insert(0, "--headless=new".to_string());
    }
    json!({
        "capabilities": {
            "alwaysMatch": {
                "browserName": "chrome",
                "goog:chromeOptions": {
                    "args": args,
                    "excludeSwitches": ["enable-automation", "enable-logging"],
                }
            }
        }
    })
}

/// Maps a W3C error code onto the fetch taxonomy.
pub fn classify_webdriver_error(code: &str, message: &str) -> FetchError {
    match code {
        "timeout" | "script timeout" => FetchError::PageLoadTimeout(message.to_string()),
        "no such element" | "stale element reference" => {
            FetchError::ElementNotFound(message.to_string())
        }
        _ => FetchError::SessionError(format!("{code}: {message}")),
    }
}

impl WebDriverSession {
    pub fn start(config: &BrowserConfig, user_agent: &str) -> Result<Self, FetchError> {
        let client =
            control_client().map_err(|err| FetchError::SessionError(format!("{err:#}")))?;
        let base = config.webdriver_url.trim_end_matches('/').to_string();

        let created = send(
            client,
            Method::POST,
            &format!("{base}/session"),
            Some(chrome_capabilities(config, user_agent)),
        )?;
        let session_id = created
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| FetchError::SessionError("webdriver returned no session id".into()))?
            .to_string();
        debug!(session = %session_id, "browser session started");

        let mut session = Self {
            client,
            base,
            session_id,
            alive: true,
        };
        session.command(
            Method::POST,
            "timeouts",
            Some(json!({ "pageLoad": PAGE_LOAD_TIMEOUT_MS, "implicit": 0 })),
        )?;
        Ok(session)
    }

    fn command(
        &mut self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, FetchError> {
        let url = format!("{}/session/{}/{path}", self.base, self.session_id);
        let reply = send(self.client, method, &url, body);
        if matches!(reply, Err(FetchError::SessionError(_))) {
            self.alive = false;
        }
        reply
    }

    fn find_all(&mut self, css: &str) -> Result<Vec<Value>, FetchError> {
        let found = self.command(
            Method::POST,
            "elements",
            Some(json!({ "using": "css selector", "value": css })),
        )?;
        match found {
            Value::Array(items) => Ok(items),
            other => Err(FetchError::SessionError(format!(
                "unexpected elements payload: {other}"
            ))),
        }
    }
}

fn send(client: &Client, method: Method, url: &str, body: Option<Value>) -> Result<Value, FetchError> {
    let mut req = client.request(method, url);
    if let Some(body) = body {
        req = req.json(&body);
    }
    let resp = req
        .send()
        .map_err(|err| FetchError::SessionError(format!("webdriver unreachable: {err}")))?;
    let payload: Value = resp
        .json()
        .map_err(|err| FetchError::SessionError(format!("webdriver reply unreadable: {err}")))?;
    let value = payload.get("value").cloned().unwrap_or(Value::Null);
    if let Some(code) = value.get("error").and_then(Value::as_str) {
        let message = value.get("message").and_then(Value::as_str).unwrap_or("");
        return Err(classify_webdriver_error(code, message));
    }
    Ok(value)
}

impl BrowserSession for WebDriverSession {
    fn navigate(&mut self, url: &str) -> Result<(), FetchError> {
        self.command(Method::POST, "url", Some(json!({ "url": url })))
            .map(|_| ())
    }

    fn wait_for(&mut self, css: &str, timeout: Duration) -> Result<bool, FetchError> {
        let started = Instant::now();
        loop {
            if !self.find_all(css)?.is_empty() {
                return Ok(true);
            }
            if started.elapsed() >= timeout {
                return Ok(false);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn click(&mut self, css: &str) -> Result<bool, FetchError> {
        let Some(element) = self.find_all(css)?.into_iter().next() else {
            return Ok(false);
        };
        let Some(id) = element.get(ELEMENT_KEY).and_then(Value::as_str) else {
            return Ok(false);
        };
        self.command(
            Method::POST,
            "execute/sync",
            Some(json!({
                "script": "arguments[0].click();",
                "args": [{ ELEMENT_KEY: id }],
            })),
        )?;
        Ok(true)
    }

    fn page_source(&mut self) -> Result<String, FetchError> {
        match self.command(Method::GET, "source", None)? {
            Value::String(html) => Ok(html),
            other => Err(FetchError::SessionError(format!(
                "unexpected page source payload: {}",
                other
            ))),
        }
    }

    fn is_alive(&self) -> bool {
        self.alive
    }
}

impl Drop for WebDriverSession {
    fn drop(&mut self) {
        let url = format!("{}/session/{}", self.base, self.session_id);
        match self.client.delete(&url).send() {
            Ok(_) => debug!(session = %self.session_id, "browser session closed"),
            Err(err) => warn!(session = %self.session_id, error = %err, "browser session close failed"),
        }
    }
}
