use std::time::Duration;

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ORIGIN, REFERER};

use crate::config::HttpConfig;
use crate::error::FetchError;

const CONTROL_TIMEOUT_SECS: u64 = 60;

static CONTROL_CLIENT: OnceCell<Client> = OnceCell::new();

/// Client for local control traffic (WebDriver endpoint), shared process-wide.
pub fn control_client() -> Result<&'static Client> {
    CONTROL_CLIENT.get_or_try_init(|| {
        Client::builder()
            .timeout(Duration::from_secs(CONTROL_TIMEOUT_SECS))
            .build()
            .context("failed to build control http client")
    })
}

/// Client for site traffic; each fetch worker builds its own.
pub fn site_client(config: &HttpConfig, referer: &str, origin: &str) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        REFERER,
        HeaderValue::from_str(referer).context("invalid referer header")?,
    );
    headers.insert(
        ORIGIN,
        HeaderValue::from_str(origin).context("invalid origin header")?,
    );
    headers.insert("X-Requested-With", HeaderValue::from_static("XMLHttpRequest"));

    Client::builder()
        .user_agent(config.user_agent.clone())
        .default_headers(headers)
        .timeout(config.timeout)
        .build()
        .context("failed to build site http client")
}

/// Blocking request surface used by the HTML+API fetcher.
pub trait HttpSession: Send {
    fn get_text(&mut self, url: &str) -> Result<String, FetchError>;
    fn post_form(&mut self, url: &str, form: &[(&str, String)]) -> Result<String, FetchError>;
}

pub struct ReqwestSession {
    client: Client,
}

impl ReqwestSession {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl HttpSession for ReqwestSession {
    fn get_text(&mut self, url: &str) -> Result<String, FetchError> {
        let resp = self.client.get(url).send()?;
        read_body(resp)
    }

    fn post_form(&mut self, url: &str, form: &[(&str, String)]) -> Result<String, FetchError> {
        let resp = self.client.post(url).form(form).send()?;
        read_body(resp)
    }
}

fn read_body(resp: reqwest::blocking::Response) -> Result<String, FetchError> {
    let status = resp.status();
    let url = resp.url().to_string();
    let body = resp.text()?;
    if !status.is_success() {
        return Err(FetchError::NetworkError(format!("http {status} for {url}")));
    }
    Ok(body)
}
