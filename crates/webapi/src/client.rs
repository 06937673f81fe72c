//! reqwest transport for the Gemini web app.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gemproxy_core::conversation::Attachment;
use gemproxy_core::gemini::{
    build_request_payload, extract_access_token, extract_cookie, parse_generate_response,
    parse_upload_response, ChatMetadata, GeminiError, ModelOutput, UploadedFile, GENERATE_URL,
    INIT_URL, ORIGIN, ROTATE_COOKIES_BODY, ROTATE_COOKIES_URL, UPLOAD_PUSH_ID, UPLOAD_URL,
};
use gemproxy_core::model::{GeminiModel, MODEL_HEADER};
use rand::Rng;
use reqwest::header::{CONTENT_TYPE, COOKIE, ORIGIN as ORIGIN_HEADER, REFERER, SET_COOKIE};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::backend::{BackendFactory, ChatBackend, Credential};
use crate::error::{from_reqwest, from_status, Result};

const PSID: &str = "__Secure-1PSID";
const PSIDTS: &str = "__Secure-1PSIDTS";

/// Transport settings shared by every client the factory creates.
#[derive(Debug, Clone)]
pub struct WebClientConfig {
    pub proxy: Option<String>,
    pub timeout: Duration,
    pub auto_refresh: bool,
    pub refresh_interval: Duration,
    /// Log request details at debug level.
    pub verbose: bool,
}

impl Default for WebClientConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            timeout: Duration::from_secs(30),
            auto_refresh: true,
            refresh_interval: Duration::from_secs(540),
            verbose: false,
        }
    }
}

#[derive(Debug, Clone)]
struct Cookies {
    secure_1psid: String,
    secure_1psidts: Option<String>,
}

impl Cookies {
    fn header(&self) -> String {
        match &self.secure_1psidts {
            Some(ts) => format!("{PSID}={}; {PSIDTS}={ts}", self.secure_1psid),
            None => format!("{PSID}={}", self.secure_1psid),
        }
    }
}

struct Session {
    http: reqwest::Client,
    cookies: RwLock<Cookies>,
}

impl Session {
    async fn cookie_header(&self) -> String {
        self.cookies.read().await.header()
    }

    /// Asks Google for a fresh `__Secure-1PSIDTS` and stores it.
    async fn rotate_cookies(&self) -> Result<bool> {
        let response = self
            .http
            .post(ROTATE_COOKIES_URL)
            .header(CONTENT_TYPE, "application/json")
            .header(COOKIE, self.cookie_header().await)
            .body(ROTATE_COOKIES_BODY)
            .send()
            .await
            .map_err(|e| from_reqwest(e, "Cookie rotation"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(from_status(status, "Cookie rotation"));
        }

        let set_cookies: Vec<&str> = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();

        match extract_cookie(set_cookies, PSIDTS) {
            Some(value) => {
                self.cookies.write().await.secure_1psidts = Some(value);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn fetch_access_token(&self) -> Result<String> {
        let response = self
            .http
            .get(INIT_URL)
            .header(COOKIE, self.cookie_header().await)
            .send()
            .await
            .map_err(|e| from_reqwest(e, "Client initialization"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(from_status(status, "Client initialization"));
        }

        let html = response
            .text()
            .await
            .map_err(|e| from_reqwest(e, "Client initialization"))?;

        extract_access_token(&html).ok_or_else(|| {
            GeminiError::Auth(
                "Failed to initialize client. SECURE_1PSIDTS could get expired frequently, please make sure cookie values are up to date."
                    .to_string(),
            )
        })
    }

    async fn upload(&self, attachment: &Attachment) -> Result<UploadedFile> {
        let part = reqwest::multipart::Part::bytes(attachment.data.clone())
            .file_name(attachment.file_name.clone())
            .mime_str(&attachment.mime_type)
            .map_err(|e| GeminiError::Api(format!("Invalid attachment type: {e}")))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(UPLOAD_URL)
            .header("Push-ID", UPLOAD_PUSH_ID)
            .multipart(form)
            .send()
            .await
            .map_err(|e| from_reqwest(e, "File upload"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(from_status(status, "File upload"));
        }

        let body = response
            .text()
            .await
            .map_err(|e| from_reqwest(e, "File upload"))?;

        Ok(UploadedFile {
            id: parse_upload_response(&body)?,
            file_name: attachment.file_name.clone(),
        })
    }
}

/// A signed-in Gemini web client.
pub struct WebClient {
    credential_id: String,
    session: Arc<Session>,
    access_token: String,
    running: Arc<AtomicBool>,
    refresher: Mutex<Option<JoinHandle<()>>>,
    verbose: bool,
}

impl WebClient {
    /// Signs in with `credential`.
    ///
    /// Rotates `__Secure-1PSIDTS` when it is missing, fetches the access
    /// token and, when enabled, starts the background cookie refresher.
    pub async fn init(credential: &Credential, config: &WebClientConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder().timeout(config.timeout);
        if let Some(proxy) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| GeminiError::Init(format!("Invalid proxy {proxy}: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let http = builder
            .build()
            .map_err(|e| GeminiError::Init(format!("Failed to build HTTP client: {e}")))?;

        let session = Arc::new(Session {
            http,
            cookies: RwLock::new(Cookies {
                secure_1psid: credential.secure_1psid.clone(),
                secure_1psidts: credential.secure_1psidts.clone(),
            }),
        });

        if credential.secure_1psidts.is_none() {
            match session.rotate_cookies().await {
                Ok(true) => tracing::debug!(credential = %credential.id, "Obtained SECURE_1PSIDTS"),
                Ok(false) => tracing::debug!(credential = %credential.id, "Cookie rotation returned no SECURE_1PSIDTS"),
                Err(e) => tracing::warn!(credential = %credential.id, error = %e, "Cookie rotation failed"),
            }
        }

        let access_token = session.fetch_access_token().await?;
        let running = Arc::new(AtomicBool::new(true));

        let refresher = config.auto_refresh.then(|| {
            spawn_refresher(
                credential.id.clone(),
                Arc::clone(&session),
                Arc::clone(&running),
                config.refresh_interval,
            )
        });

        tracing::info!(credential = %credential.id, "Gemini client initialized");

        Ok(Self {
            credential_id: credential.id.clone(),
            session,
            access_token,
            running,
            refresher: Mutex::new(refresher),
            verbose: config.verbose,
        })
    }
}

fn spawn_refresher(
    credential_id: String,
    session: Arc<Session>,
    running: Arc<AtomicBool>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            if !running.load(Ordering::Acquire) {
                break;
            }

            match session.rotate_cookies().await {
                Ok(true) => tracing::debug!(credential = %credential_id, "Cookies refreshed"),
                Ok(false) => {}
                Err(e) if e.is_auth() => {
                    tracing::warn!(credential = %credential_id, error = %e, "Cookie refresh rejected, stopping client");
                    running.store(false, Ordering::Release);
                    break;
                }
                Err(e) => tracing::warn!(credential = %credential_id, error = %e, "Cookie refresh failed"),
            }
        }
    })
}

#[async_trait]
impl ChatBackend for WebClient {
    async fn generate(
        &self,
        prompt: &str,
        attachments: &[Attachment],
        model: GeminiModel,
        metadata: Option<&ChatMetadata>,
    ) -> Result<ModelOutput> {
        if !self.is_running() {
            return Err(GeminiError::Api(format!(
                "Client for {} is not running",
                self.credential_id
            )));
        }

        let mut files = Vec::with_capacity(attachments.len());
        for attachment in attachments {
            files.push(self.session.upload(attachment).await?);
        }

        let payload = build_request_payload(prompt, &files, metadata);
        let request_id: u32 = rand::rng().random_range(10_000..100_000);

        if self.verbose {
            tracing::debug!(
                credential = %self.credential_id,
                model = %model,
                files = files.len(),
                continuing = metadata.is_some(),
                "Sending StreamGenerate request"
            );
        }

        let response = self
            .session
            .http
            .post(GENERATE_URL)
            .query(&[("_reqid", request_id.to_string()), ("rt", "c".to_string())])
            .header(ORIGIN_HEADER, ORIGIN)
            .header(REFERER, format!("{ORIGIN}/"))
            .header("X-Same-Domain", "1")
            .header(MODEL_HEADER, model.header())
            .header(COOKIE, self.session.cookie_header().await)
            .form(&[("at", self.access_token.as_str()), ("f.req", payload.as_str())])
            .send()
            .await
            .map_err(|e| from_reqwest(e, "Generate content request"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(from_status(status, "Generate content request"));
        }

        let body = response
            .text()
            .await
            .map_err(|e| from_reqwest(e, "Generate content request"))?;

        parse_generate_response(&body)
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    async fn close(&self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.refresher.lock().await.take() {
            handle.abort();
        }
        tracing::debug!(credential = %self.credential_id, "Gemini client closed");
    }
}

/// Creates [`WebClient`]s for the pool.
pub struct WebClientFactory {
    config: WebClientConfig,
}

impl WebClientFactory {
    pub fn new(config: WebClientConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl BackendFactory for WebClientFactory {
    async fn create(&self, credential: &Credential) -> Result<Arc<dyn ChatBackend>> {
        let client = WebClient::init(credential, &self.config).await?;
        Ok(Arc::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_header() {
        let mut cookies = Cookies {
            secure_1psid: "psid".to_string(),
            secure_1psidts: None,
        };
        assert_eq!(cookies.header(), "__Secure-1PSID=psid");

        cookies.secure_1psidts = Some("ts".to_string());
        assert_eq!(cookies.header(), "__Secure-1PSID=psid; __Secure-1PSIDTS=ts");
    }

    #[test]
    fn test_default_config() {
        let config = WebClientConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.refresh_interval, Duration::from_secs(540));
        assert!(config.auto_refresh);
        assert!(config.proxy.is_none());
    }
}
