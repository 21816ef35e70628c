use backoff::{future::retry, ExponentialBackoff, ExponentialBackoffBuilder};
use http::header;
use http::HeaderMap;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use url::Url;

use crate::error::{DatabaseError, Error, Result};

pub(crate) static USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

static EVENT_STREAM: &str = "text/event-stream";

/// Client is a wrapper around `reqwest::Client` which resolves database paths
/// against the base url and authenticates every request.
#[derive(Debug, Clone)]
pub(crate) struct Client {
    base_url: Url,
    auth: Option<String>,
    inner: reqwest::Client,
    // No total timeout, event streams stay open indefinitely.
    streaming: reqwest::Client,
}

#[derive(Clone)]
pub(crate) enum Body {
    Empty,
    Json(serde_json::Value),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Transport {
    Request,
    EventStream,
}

#[derive(Serialize)]
struct AuthParams<'a> {
    auth: &'a str,
}

pub(crate) fn build_backoff() -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(500)) // first retry after 500ms
        .with_multiplier(2.0) // all following retries are twice as long as the previous one
        .with_max_elapsed_time(Some(Duration::from_secs(30))) // try up to 30s
        .build()
}

impl Client {
    /// Creates a new client.
    pub(crate) fn new<U, T>(base_url: U, auth: T) -> Result<Self>
    where
        U: AsRef<str>,
        T: Into<Option<String>>,
    {
        let mut base_url = Url::parse(base_url.as_ref()).map_err(Error::InvalidUrl)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let auth = auth.into().filter(|token| !token.is_empty());
        if let Some(token) = auth.as_deref() {
            if token.chars().any(|c| c.is_control() || c.is_whitespace()) {
                return Err(Error::InvalidAuthToken);
            }
        }

        let inner = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(Error::HttpClientSetup)?;

        let streaming = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(Error::HttpClientSetup)?;

        Ok(Self {
            base_url,
            auth,
            inner,
            streaming,
        })
    }

    /// Resolves a database path like `users/abc` to its REST url
    /// `<base>/users/abc.json?auth=<token>`.
    pub(crate) fn url_for(&self, path: &str) -> Result<Url> {
        let path = path.trim_matches('/');
        let mut url = self
            .base_url
            .join(&format!("{path}.json"))
            .map_err(Error::InvalidUrl)?;
        if let Some(auth) = self.auth.as_deref() {
            url.set_query(Some(&serde_qs::to_string(&AuthParams { auth })?));
        }
        Ok(url)
    }

    async fn execute<P, H>(
        &self,
        method: http::Method,
        path: P,
        body: Body,
        headers: H,
        transport: Transport,
    ) -> Result<Response>
    where
        P: AsRef<str>,
        H: Into<Option<HeaderMap>>,
    {
        let url = self.url_for(path.as_ref())?;
        let headers = headers.into();
        let client = match transport {
            Transport::Request => &self.inner,
            Transport::EventStream => &self.streaming,
        };

        let res = retry(build_backoff(), || async {
            let mut req = client.request(method.clone(), url.clone());
            if let Some(headers) = headers.clone() {
                req = req.headers(headers);
            }
            match body.clone() {
                Body::Empty => {}
                Body::Json(value) => req = req.json(&value),
            }
            let res = client
                .execute(req.build()?)
                .await
                .map_err(backoff::Error::transient)?;
            if res.status().is_server_error() {
                // Retry 5XX, everything else is decided by the caller
                return match res.error_for_status() {
                    Ok(res) => Ok(res),
                    Err(e) => Err(backoff::Error::transient(e)),
                };
            }
            Ok(res)
        })
        .await
        .map(|res| Response::new(res, method, path.as_ref().to_string()))
        .map_err(Error::Http)?;

        Ok(res)
    }

    pub(crate) async fn get<S>(&self, path: S) -> Result<Response>
    where
        S: AsRef<str>,
    {
        self.execute(
            http::Method::GET,
            path.as_ref(),
            Body::Empty,
            None,
            Transport::Request,
        )
        .await
    }

    pub(crate) async fn post<S, P>(&self, path: S, payload: P) -> Result<Response>
    where
        S: AsRef<str>,
        P: Serialize,
    {
        self.execute(
            http::Method::POST,
            path,
            Body::Json(serde_json::to_value(payload).map_err(Error::Serialize)?),
            None,
            Transport::Request,
        )
        .await
    }

    pub(crate) async fn patch<S, P>(&self, path: S, payload: P) -> Result<Response>
    where
        S: AsRef<str>,
        P: Serialize,
    {
        self.execute(
            http::Method::PATCH,
            path,
            Body::Json(serde_json::to_value(payload).map_err(Error::Serialize)?),
            None,
            Transport::Request,
        )
        .await
    }

    /// Opens a server-sent event stream on the given path.
    pub(crate) async fn event_stream<S>(&self, path: S) -> Result<Response>
    where
        S: AsRef<str>,
    {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static(EVENT_STREAM));
        self.execute(
            http::Method::GET,
            path,
            Body::Empty,
            headers,
            Transport::EventStream,
        )
        .await
    }
}

#[derive(Debug)]
pub(crate) struct Response {
    inner: reqwest::Response,
    method: http::Method,
    path: String,
}

impl Response {
    pub(crate) fn new(inner: reqwest::Response, method: http::Method, path: String) -> Self {
        Self {
            inner,
            method,
            path,
        }
    }

    pub(crate) async fn json<T: DeserializeOwned>(self) -> Result<T> {
        self.check_error()
            .await?
            .inner
            .json::<T>()
            .await
            .map_err(Error::Deserialize)
    }

    pub(crate) async fn check_error(self) -> Result<Response> {
        let status = self.inner.status();
        if !status.is_success() {
            // Try to decode the error
            let e = match self.inner.json::<DatabaseError>().await {
                Ok(mut e) => {
                    e.status = status.as_u16();
                    e.method = self.method;
                    e.path = self.path;
                    Error::Database(e)
                }
                Err(_e) => {
                    // Decoding failed, we still want a DatabaseError
                    Error::Database(DatabaseError::new(
                        status.as_u16(),
                        self.method,
                        self.path,
                        None,
                    ))
                }
            };
            return Err(e);
        }

        Ok(self)
    }
}

impl From<Response> for reqwest::Response {
    fn from(res: Response) -> Self {
        res.inner
    }
}
