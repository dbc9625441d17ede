use anyhow::Context;
use async_trait::async_trait;
use http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    Method, Request, Response, StatusCode,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value as Json;
use tracing::debug;
use url::Url;

use crate::{
    config::ConfigClient,
    error::{HttpError, Result},
};

/// Generic HTTP client.
///
/// A trait is used here so to facilitate native HTTP/TLS when compiled for mobile applications.
#[async_trait]
pub trait AsyncHttpClient {
    async fn execute(&self, request: Request<Vec<u8>>) -> anyhow::Result<Response<Vec<u8>>>;
}

pub(crate) fn base_request() -> http::request::Builder {
    Request::builder().header(ACCEPT, "application/json, text/plain, */*")
}

#[derive(Debug)]
pub struct ReqwestClient(reqwest::Client);

impl AsRef<reqwest::Client> for ReqwestClient {
    fn as_ref(&self) -> &reqwest::Client {
        &self.0
    }
}

impl ReqwestClient {
    pub fn new() -> anyhow::Result<Self> {
        reqwest::Client::builder()
            .use_rustls_tls()
            .build()
            .context("unable to build http_client")
            .map(Self)
    }
}

#[async_trait]
impl AsyncHttpClient for ReqwestClient {
    async fn execute(&self, request: Request<Vec<u8>>) -> anyhow::Result<Response<Vec<u8>>> {
        let response = self
            .0
            .execute(request.try_into().context("unable to convert request")?)
            .await
            .context("http request failed")?;

        let mut builder = Response::builder()
            .status(response.status())
            .version(response.version());

        builder
            .extensions_mut()
            .context("unable to set extensions")?
            .extend(response.extensions().clone());

        builder
            .headers_mut()
            .context("unable to set headers")?
            .extend(response.headers().clone());

        builder
            .body(
                response
                    .bytes()
                    .await
                    .context("failed to extract response body")?
                    .to_vec(),
            )
            .context("unable to construct response")
    }
}

/// A response body, negotiated from the response `Content-Type`.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Json),
    Text(String),
    Empty,
}

impl ResponseBody {
    fn negotiate(content_type: Option<&str>, bytes: Vec<u8>) -> Self {
        if bytes.is_empty() {
            return Self::Empty;
        }
        let is_json = content_type.map_or(true, |ct| ct.contains("json"));
        if is_json {
            if let Ok(json) = serde_json::from_slice(&bytes) {
                return Self::Json(json);
            }
        }
        Self::Text(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn into_text(self) -> String {
        match self {
            Self::Json(json) => json.to_string(),
            Self::Text(text) => text,
            Self::Empty => String::new(),
        }
    }
}

/// The outcome of an [OpenIdFetcher] request, with the body split by success.
#[derive(Debug, Clone)]
pub struct OpenIdResponse {
    pub url: Url,
    pub status: StatusCode,
    pub body: ResponseBody,
}

impl OpenIdResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// The body of a 2xx response.
    pub fn success_body(&self) -> Option<&ResponseBody> {
        self.is_success().then_some(&self.body)
    }

    /// The body of a non-2xx response.
    pub fn error_body(&self) -> Option<&ResponseBody> {
        (!self.is_success()).then_some(&self.body)
    }

    /// Turn a non-2xx response into an [HttpError].
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            return Ok(self);
        }
        Err(HttpError {
            url: self.url.to_string(),
            status: self.status.as_u16(),
            body: self.body.into_text(),
        }
        .into())
    }

    /// Deserialize the body of a 2xx response.
    pub fn json<T: DeserializeOwned>(self) -> Result<T> {
        let url = self.url.clone();
        let value = match self.error_for_status()?.body {
            ResponseBody::Json(json) => json,
            ResponseBody::Text(text) => serde_json::from_str(&text)
                .context(format!("response from {url} was not valid json"))?,
            ResponseBody::Empty => Json::Null,
        };
        Ok(serde_json::from_value(value)
            .context(format!("unexpected response from {url}"))?)
    }

    /// The body of a 2xx response as text, if there is one.
    pub fn text(self) -> Result<Option<String>> {
        Ok(match self.error_for_status()?.body {
            ResponseBody::Empty => None,
            body => Some(body.into_text()),
        })
    }
}

/// OpenID-flavoured fetch on top of an [AsyncHttpClient].
///
/// Requests are routed through the configured proxy and may carry a bearer token.
pub struct OpenIdFetcher<'a, H: ?Sized> {
    client: &'a H,
    config: &'a ConfigClient,
}

impl<'a, H: AsyncHttpClient + ?Sized> OpenIdFetcher<'a, H> {
    pub fn new(client: &'a H, config: &'a ConfigClient) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &ConfigClient {
        self.config
    }

    pub async fn get(&self, url: &Url, bearer: Option<&str>) -> Result<OpenIdResponse> {
        self.fetch(Method::GET, url, None, vec![], bearer).await
    }

    pub async fn post_form<T: Serialize + ?Sized>(
        &self,
        url: &Url,
        form: &T,
        bearer: Option<&str>,
    ) -> Result<OpenIdResponse> {
        let body = serde_urlencoded::to_string(form).context("unable to encode form body")?;
        self.fetch(
            Method::POST,
            url,
            Some("application/x-www-form-urlencoded"),
            body.into_bytes(),
            bearer,
        )
        .await
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: &Url,
        body: &T,
        bearer: Option<&str>,
    ) -> Result<OpenIdResponse> {
        let body = serde_json::to_vec(body).context("unable to encode json body")?;
        self.fetch(Method::POST, url, Some("application/json"), body, bearer)
            .await
    }

    async fn fetch(
        &self,
        method: Method,
        url: &Url,
        content_type: Option<&str>,
        body: Vec<u8>,
        bearer: Option<&str>,
    ) -> Result<OpenIdResponse> {
        let target = self.config.proxied(url)?;
        debug!(%method, %target, "openid fetch");

        let mut builder = base_request().method(method).uri(target.as_str());
        if let Some(content_type) = content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        if let Some(token) = bearer {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = builder
            .body(body)
            .context(format!("failed to build request to {url}"))?;

        let response = self
            .client
            .execute(request)
            .await
            .context(format!("failed to make request to {url}"))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(ToOwned::to_owned);

        Ok(OpenIdResponse {
            url: url.clone(),
            status,
            body: ResponseBody::negotiate(content_type.as_deref(), response.into_body()),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn negotiates_body() {
        assert_eq!(
            ResponseBody::negotiate(Some("application/json"), br#"{"a":1}"#.to_vec()),
            ResponseBody::Json(serde_json::json!({"a": 1}))
        );
        assert_eq!(
            ResponseBody::negotiate(Some("application/oauth-authz-req+jwt"), b"a.b.c".to_vec()),
            ResponseBody::Text("a.b.c".into())
        );
        assert_eq!(
            ResponseBody::negotiate(None, b"not json".to_vec()),
            ResponseBody::Text("not json".into())
        );
        assert_eq!(ResponseBody::negotiate(None, vec![]), ResponseBody::Empty);
    }

    #[test]
    fn splits_bodies() {
        let response = OpenIdResponse {
            url: "https://example.com".parse().unwrap(),
            status: StatusCode::BAD_REQUEST,
            body: ResponseBody::Json(serde_json::json!({"error": "invalid_grant"})),
        };
        assert!(response.success_body().is_none());
        assert!(response.error_body().is_some());
        assert!(response.error_for_status().is_err());
    }
}
