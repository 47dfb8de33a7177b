//! HTTP client, request builder and the background stream worker.

use crate::error::Error;
use crate::models::{ModelSpec, ProviderKind};
use crate::providers::{for_kind_with_base_url, Provider, ProviderRequest, RequestConfig};
use crate::stream::{FragmentStream, UnitDecoder};
use crate::types::{Fragment, Message, Usage};
use futures::StreamExt;
use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Main client for making streaming LLM requests.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    api_keys: Arc<HashMap<ProviderKind, String>>,
    base_urls: Arc<HashMap<ProviderKind, String>>,
    config: ClientConfig,
}

/// Client configuration.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Overall request timeout. `None` keeps the transport default.
    pub timeout: Option<Duration>,
    /// Fragments buffered between the stream worker and the consumer.
    pub channel_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            channel_capacity: 32,
        }
    }
}

/// Builder for Client.
pub struct ClientBuilder {
    api_keys: HashMap<ProviderKind, String>,
    base_urls: HashMap<ProviderKind, String>,
    config: ClientConfig,
    http_builder: reqwest::ClientBuilder,
}

impl ClientBuilder {
    /// Create a new client builder.
    pub fn new() -> Self {
        Self {
            api_keys: HashMap::new(),
            base_urls: HashMap::new(),
            config: ClientConfig::default(),
            http_builder: reqwest::Client::builder().tcp_nodelay(true),
        }
    }

    /// Add an API key for a provider.
    pub fn api_key(mut self, provider: ProviderKind, key: impl Into<String>) -> Self {
        self.api_keys.insert(provider, key.into());
        self
    }

    /// Set a custom base URL for a provider (useful for testing with mock servers).
    pub fn base_url(mut self, provider: ProviderKind, url: impl Into<String>) -> Self {
        self.base_urls.insert(provider, url.into());
        self
    }

    /// Set request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    /// Set the fragment channel capacity (minimum 1).
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity.max(1);
        self
    }

    /// Load API keys from environment variables. Empty values count as unset.
    pub fn from_env(mut self) -> Self {
        for provider in ProviderKind::ALL {
            if let Ok(key) = env::var(provider.credential_var()) {
                if !key.is_empty() {
                    self.api_keys.insert(provider, key);
                }
            }
        }
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<Client, Error> {
        let mut http_builder = self.http_builder;
        if let Some(timeout) = self.config.timeout {
            http_builder = http_builder.timeout(timeout);
        }
        let http = http_builder
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;

        Ok(Client {
            http,
            api_keys: Arc::new(self.api_keys),
            base_urls: Arc::new(self.base_urls),
            config: self.config,
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    /// Create a client from environment variables.
    pub fn from_env() -> Result<Self, Error> {
        ClientBuilder::new().from_env().build()
    }

    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Start building a streaming request for a model alias.
    pub fn stream<'a>(&'a self, model: &str, message: &'a Message) -> RequestBuilder<'a> {
        RequestBuilder {
            client: self,
            model: model.to_string(),
            message,
            config: RequestConfig::default(),
        }
    }

    /// Get API key for a provider.
    fn credential(&self, provider: ProviderKind) -> Result<&str, Error> {
        self.api_keys
            .get(&provider)
            .map(String::as_str)
            .ok_or(Error::MissingCredential {
                var: provider.credential_var(),
            })
    }

    /// Fail with [`Error::MissingCredential`] unless a key for `provider` is set.
    pub fn require_credential(&self, provider: ProviderKind) -> Result<(), Error> {
        self.credential(provider).map(|_| ())
    }

    /// Get custom base URL for a provider, if configured.
    fn get_base_url(&self, provider: ProviderKind) -> Option<&str> {
        self.base_urls.get(&provider).map(String::as_str)
    }

    /// Send a request and hand its body to a background worker.
    async fn execute(
        &self,
        request: ProviderRequest,
        decoder: Box<dyn UnitDecoder + Send>,
        spec: &'static ModelSpec,
    ) -> Result<Exchange, Error> {
        info!(model = spec.model, provider = %spec.provider, "calling the API");
        debug!(url = request.url(), "dispatching request");

        let started = Instant::now();
        let response = self
            .http
            .post(request.url())
            .headers(request.headers().clone())
            .json(request.body())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::api(status.as_u16(), error_body(response).await));
        }

        let stream = FragmentStream::new(Box::pin(response.bytes_stream()), decoder);
        Ok(Exchange::spawn(
            stream,
            self.config.channel_capacity,
            spec,
            started,
        ))
    }
}

/// Body of a non-success response, kept verbatim. A body that cannot be
/// read is logged and reported as empty so the status still surfaces.
pub(crate) async fn error_body(response: reqwest::Response) -> String {
    let status = response.status();
    match response.text().await {
        Ok(body) => body,
        Err(e) => {
            debug!(%status, error = %e, "failed to read error response body");
            String::new()
        }
    }
}

/// Builder for individual requests.
pub struct RequestBuilder<'a> {
    client: &'a Client,
    model: String,
    message: &'a Message,
    config: RequestConfig,
}

impl RequestBuilder<'_> {
    /// Set maximum tokens to generate.
    pub fn max_tokens(mut self, tokens: u32) -> Self {
        self.config.max_tokens = tokens;
        self
    }

    /// Set temperature for sampling.
    pub fn temperature(mut self, temp: f64) -> Self {
        self.config.temperature = temp;
        self
    }

    /// Resolve the model and credential, then build the request without
    /// sending it.
    pub fn build(&self) -> Result<(ProviderRequest, &'static ModelSpec), Error> {
        let (request, _, spec) = self.prepare()?;
        Ok((request, spec))
    }

    fn prepare(&self) -> Result<(ProviderRequest, Box<dyn Provider>, &'static ModelSpec), Error> {
        let spec = ModelSpec::resolve(&self.model)?;
        let api_key = self.client.credential(spec.provider)?;
        let provider =
            for_kind_with_base_url(spec.provider, self.client.get_base_url(spec.provider));
        let request = provider.build_request(spec.model, self.message, &self.config, api_key)?;
        Ok((request, provider, spec))
    }

    /// Send the streaming request.
    ///
    /// Configuration errors are returned before any network I/O.
    pub async fn send(self) -> Result<Exchange, Error> {
        let (request, provider, spec) = self.prepare()?;
        self.client
            .execute(request, provider.create_decoder(), spec)
            .await
    }
}

/// A request in flight.
///
/// Fragments arrive on [`Exchange::fragments`] in decode order. The channel
/// closes when the worker finishes; only then is the final [`Usage`]
/// available from [`Exchange::finish`].
pub struct Exchange {
    fragments: mpsc::Receiver<Fragment>,
    worker: JoinHandle<Result<Usage, Error>>,
    spec: &'static ModelSpec,
    started: Instant,
}

impl Exchange {
    fn spawn<S>(
        mut stream: FragmentStream<S>,
        capacity: usize,
        spec: &'static ModelSpec,
        started: Instant,
    ) -> Self
    where
        S: futures::Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(capacity);

        let worker = tokio::spawn(async move {
            while let Some(fragment) = stream.next().await {
                if tx.send(fragment?).await.is_err() {
                    debug!("fragment consumer went away");
                    break;
                }
            }
            Ok::<_, Error>(stream.usage())
        });

        Self {
            fragments: rx,
            worker,
            spec,
            started,
        }
    }

    /// Wait for the next fragment. `None` once the worker has finished.
    pub async fn recv(&mut self) -> Option<Fragment> {
        self.fragments.recv().await
    }

    /// Model this exchange was sent to.
    pub fn spec(&self) -> &'static ModelSpec {
        self.spec
    }

    /// Wait for the worker and return the final usage and elapsed time
    /// since dispatch.
    pub async fn finish(self) -> Result<(Usage, Duration), Error> {
        drop(self.fragments);
        let usage = self.worker.await.map_err(|_| Error::WorkerPanicked)??;
        Ok((usage, self.started.elapsed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_builder() {
        let client = Client::builder()
            .api_key(ProviderKind::OpenAI, "test-key")
            .timeout(Duration::from_secs(60))
            .channel_capacity(0)
            .build()
            .unwrap();

        assert_eq!(client.config.timeout, Some(Duration::from_secs(60)));
        assert_eq!(client.config.channel_capacity, 1);
        assert_eq!(client.credential(ProviderKind::OpenAI).unwrap(), "test-key");
    }

    #[test]
    fn test_missing_credential_names_variable() {
        let client = Client::builder().build().unwrap();
        let message = Message::user("Hi");
        let err = client.stream("gpt", &message).build().unwrap_err();
        assert!(matches!(
            err,
            Error::MissingCredential {
                var: "OPENAI_API_KEY"
            }
        ));
    }

    #[test]
    fn test_unknown_model_fails_first() {
        let client = Client::builder().build().unwrap();
        let message = Message::user("Hi");
        let err = client.stream("nope", &message).build().unwrap_err();
        assert!(matches!(err, Error::UnsupportedModel(_)));
    }

    #[test]
    fn test_request_builder() {
        let client = Client::builder()
            .api_key(ProviderKind::Anthropic, "test")
            .base_url(ProviderKind::Anthropic, "http://localhost:1")
            .build()
            .unwrap();

        let message = Message::user("Hi");
        let (request, spec) = client
            .stream("haiku", &message)
            .max_tokens(100)
            .temperature(0.7)
            .build()
            .unwrap();

        assert_eq!(spec.model, "claude-3-haiku-20240307");
        assert_eq!(request.url(), "http://localhost:1/v1/messages");
        assert_eq!(request.body()["max_tokens"], 100);
        assert_eq!(request.body()["temperature"], 0.7);
    }
}
