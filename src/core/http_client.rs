use std::time::Duration;

use async_trait::async_trait;
use udb_core::models::settings::{DownloaderSettings, ProxySettings};

use crate::core::error::{PipelineError, PipelineResult};

/// The network capability the pipeline needs: whole-body GETs.
#[async_trait]
pub trait HttpFetch: Send + Sync {
    async fn fetch_text(&self, url: &str) -> PipelineResult<String>;
    async fn fetch_bytes(&self, url: &str) -> PipelineResult<Vec<u8>>;
}

pub fn apply_proxy(builder: reqwest::ClientBuilder, proxy: &ProxySettings) -> reqwest::ClientBuilder {
    let Some(proxy_url) = proxy.url() else {
        return builder;
    };
    match reqwest::Proxy::all(&proxy_url) {
        Ok(p) => builder.proxy(p),
        Err(e) => {
            tracing::warn!("Invalid proxy URL: {}", e);
            builder
        }
    }
}

/// Shared client setup without an overall request deadline.
pub fn client_builder(settings: &DownloaderSettings, proxy: &ProxySettings) -> reqwest::ClientBuilder {
    let builder = reqwest::Client::builder()
        .user_agent(settings.user_agent.clone())
        .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
        .pool_max_idle_per_host(settings.max_workers.max(1) as usize)
        .pool_idle_timeout(Duration::from_secs(30));
    apply_proxy(builder, proxy)
}

/// Client for manifests, keys, segments and subtitles: every request must
/// finish within `request_timeout_secs`.
pub fn build_client(
    settings: &DownloaderSettings,
    proxy: &ProxySettings,
) -> anyhow::Result<reqwest::Client> {
    Ok(client_builder(settings, proxy)
        .timeout(Duration::from_secs(settings.request_timeout_secs))
        .build()?)
}

/// Client for long single-file bodies. Only the connect timeout applies;
/// callers bound the response headers and each body chunk themselves.
pub fn build_stream_client(
    settings: &DownloaderSettings,
    proxy: &ProxySettings,
) -> anyhow::Result<reqwest::Client> {
    Ok(client_builder(settings, proxy).build()?)
}

pub struct ReqwestFetcher {
    client: reqwest::Client,
    referer: Option<String>,
    body_timeout: Duration,
}

impl ReqwestFetcher {
    pub fn new(client: reqwest::Client, settings: &DownloaderSettings) -> Self {
        Self {
            client,
            referer: settings.referer.clone(),
            body_timeout: Duration::from_secs(settings.segment_timeout_secs),
        }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    async fn get(&self, url: &str) -> PipelineResult<reqwest::Response> {
        let mut request = self.client.get(url);
        if let Some(referer) = &self.referer {
            request = request.header("Referer", referer);
        }
        let resp = request
            .send()
            .await
            .map_err(|e| PipelineError::fetch(url, e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(PipelineError::fetch(url, format!("HTTP {}", status.as_u16())));
        }
        Ok(resp)
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetcher {
    async fn fetch_text(&self, url: &str) -> PipelineResult<String> {
        let resp = self.get(url).await?;
        tokio::time::timeout(self.body_timeout, resp.text())
            .await
            .map_err(|_| PipelineError::fetch(url, "timed out reading body"))?
            .map_err(|e| PipelineError::fetch(url, e))
    }

    async fn fetch_bytes(&self, url: &str) -> PipelineResult<Vec<u8>> {
        let resp = self.get(url).await?;
        tokio::time::timeout(self.body_timeout, resp.bytes())
            .await
            .map_err(|_| PipelineError::fetch(url, "timed out reading body"))?
            .map(|b| b.to_vec())
            .map_err(|e| PipelineError::fetch(url, e))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// In-memory fetcher that counts calls and can fail a URL a set number of times.
    #[derive(Default)]
    pub struct FakeFetcher {
        bodies: HashMap<String, Vec<u8>>,
        failures: Mutex<HashMap<String, usize>>,
        pub calls: AtomicUsize,
        pub requested: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with(mut self, url: &str, body: impl Into<Vec<u8>>) -> Self {
            self.bodies.insert(url.to_string(), body.into());
            self
        }

        pub fn failing(self, url: &str, times: usize) -> Self {
            self.failures.lock().unwrap().insert(url.to_string(), times);
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn requested(&self) -> Vec<String> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HttpFetch for FakeFetcher {
        async fn fetch_text(&self, url: &str) -> PipelineResult<String> {
            let bytes = self.fetch_bytes(url).await?;
            String::from_utf8(bytes).map_err(|e| PipelineError::fetch(url, e))
        }

        async fn fetch_bytes(&self, url: &str) -> PipelineResult<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requested.lock().unwrap().push(url.to_string());
            {
                let mut failures = self.failures.lock().unwrap();
                if let Some(left) = failures.get_mut(url) {
                    if *left > 0 {
                        *left -= 1;
                        return Err(PipelineError::fetch(url, "HTTP 503"));
                    }
                }
            }
            self.bodies
                .get(url)
                .cloned()
                .ok_or_else(|| PipelineError::fetch(url, "HTTP 404"))
        }
    }
}
