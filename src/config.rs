use std::collections::BTreeMap;

use anyhow::Context;
use serde::Deserialize;
use url::Url;

use crate::error::Result;

/// Holder configuration.
///
/// ```
/// # use openid4vc_holder::config::Config;
/// let config: Config = serde_json::from_str(r#"{
///     "proxy_server": "https://proxy.example.com",
///     "client_ids": { "issuer.example.com": "wallet-client" }
/// }"#).unwrap();
///
/// assert_eq!(config.proxy_server.unwrap().as_str(), "https://proxy.example.com/");
/// ```
#[derive(Deserialize, Debug, Clone, Default)]
pub struct Config {
    /// Proxy that every outbound request is routed through.
    #[serde(default)]
    pub proxy_server: Option<BaseUrl>,
    /// Static registry of client ids, keyed by host.
    #[serde(default)]
    pub client_ids: BTreeMap<String, String>,
    /// Allow `http:` token endpoints.
    #[serde(default)]
    pub allow_insecure_endpoints: bool,
}

/// A url that is always a base (can be safely join()'ed with further path elements without
/// mangling).
#[derive(Deserialize, Debug, Clone, Hash, PartialEq, Eq)]
#[serde(try_from = "String")]
pub struct BaseUrl(Url);

impl std::ops::Deref for BaseUrl {
    type Target = Url;

    fn deref(&self) -> &Url {
        &self.0
    }
}

impl TryFrom<String> for BaseUrl {
    type Error = url::ParseError;

    fn try_from(mut url: String) -> Result<Self, Self::Error> {
        // Make URL a base.
        if !url.ends_with('/') {
            url += "/"
        }
        url.parse().map(Self)
    }
}

/// Resolves configuration-dependent values for outbound requests.
#[derive(Debug, Clone, Default)]
pub struct ConfigClient {
    config: Config,
}

impl ConfigClient {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Route `url` through the configured proxy server, if any.
    pub fn proxied(&self, url: &Url) -> Result<Url> {
        let Some(proxy) = &self.config.proxy_server else {
            return Ok(url.clone());
        };
        let proxied = format!("{}{}", proxy.as_str(), url.as_str());
        Ok(Url::parse(&proxied).context(format!("invalid proxied url '{proxied}'"))?)
    }

    /// The registered client id for the host of `url`.
    ///
    /// A registry entry matches when it equals the host or is a parent domain of it. When several
    /// entries match, the longest one wins.
    pub fn client_id_for(&self, url: &Url) -> Option<&str> {
        let host = url.host_str()?;
        self.config
            .client_ids
            .iter()
            .filter(|(registered, _)| {
                host == registered.as_str()
                    || host
                        .strip_suffix(registered.as_str())
                        .is_some_and(|prefix| prefix.ends_with('.'))
            })
            .max_by_key(|(registered, _)| registered.len())
            .map(|(_, client_id)| client_id.as_str())
    }

    pub fn allow_insecure_endpoints(&self) -> bool {
        self.config.allow_insecure_endpoints
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn client() -> ConfigClient {
        ConfigClient::new(Config {
            proxy_server: Some("https://proxy.example.com".to_string().try_into().unwrap()),
            client_ids: [
                ("example.com".to_string(), "generic".to_string()),
                ("issuer.example.com".to_string(), "specific".to_string()),
            ]
            .into_iter()
            .collect(),
            allow_insecure_endpoints: false,
        })
    }

    #[test]
    fn longest_host_wins() {
        let client = client();
        let url: Url = "https://issuer.example.com/credential".parse().unwrap();
        assert_eq!(client.client_id_for(&url), Some("specific"));

        let url: Url = "https://other.example.com".parse().unwrap();
        assert_eq!(client.client_id_for(&url), Some("generic"));

        let url: Url = "https://notexample.com".parse().unwrap();
        assert_eq!(client.client_id_for(&url), None);
    }

    #[test]
    fn proxied_url() {
        let url: Url = "https://issuer.example.com/.well-known/openid-credential-issuer"
            .parse()
            .unwrap();
        assert_eq!(
            client().proxied(&url).unwrap().as_str(),
            "https://proxy.example.com/https://issuer.example.com/.well-known/openid-credential-issuer"
        );
        assert_eq!(ConfigClient::default().proxied(&url).unwrap(), url);
    }
}
