// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! A [`ChainNode`](crate::chain::ChainNode) backed by the JSON-RPC API of a
//! Lotus-compatible node.

mod methods;
mod node;
mod notify;

pub use notify::head_changes;

use std::{env, fmt, marker::PhantomData, str::FromStr, time::Duration, time::Instant};

use anyhow::Context as _;
use jsonrpsee::core::client::ClientT as _;
use jsonrpsee::core::traits::ToRpcParams;
use jsonrpsee::http_client::{HeaderMap, HeaderValue, HttpClient, HttpClientBuilder};
use serde::de::DeserializeOwned;
use tracing::trace;
use url::Url;

use crate::metrics::{self, NodeMethodLabel};

pub const API_INFO_KEY: &str = "FULLNODE_API_INFO";
pub const DEFAULT_API_INFO: &str = "/ip4/127.0.0.1/tcp/1234/http";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
const RPC_PATH: &str = "/rpc/v1";

/// Token and URL of a node API.
///
/// Parsed from `[token:]address`, where the address is either a multiaddr
/// such as `/ip4/127.0.0.1/tcp/1234/http` or a URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiInfo {
    pub url: Url,
    pub token: Option<String>,
}

impl fmt::Display for ApiInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.token.is_some() {
            write!(f, "<token>:")?;
        }
        self.url.fmt(f)
    }
}

impl FromStr for ApiInfo {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (token, addr) = match s.split_once(':') {
            Some((token, addr)) if !token.starts_with('/') && !addr.starts_with("//") => {
                (Some(token), addr)
            }
            _ => (None, s),
        };
        let mut url = if addr.starts_with('/') {
            multiaddr2url(addr).with_context(|| format!("unsupported multiaddr {addr}"))?
        } else {
            Url::parse(addr).with_context(|| format!("invalid URL {addr}"))?
        };
        anyhow::ensure!(
            matches!(url.scheme(), "http" | "https"),
            "unsupported URL scheme {}",
            url.scheme()
        );
        if matches!(url.path(), "" | "/") {
            url.set_path(RPC_PATH);
        }
        Ok(ApiInfo {
            url,
            token: token.filter(|it| !it.is_empty()).map(String::from),
        })
    }
}

impl ApiInfo {
    /// Reads [`API_INFO_KEY`], falling back to the default local node.
    pub fn from_env() -> anyhow::Result<Self> {
        match env::var(API_INFO_KEY) {
            Ok(it) => it.parse(),
            Err(env::VarError::NotPresent) => DEFAULT_API_INFO.parse(),
            Err(it @ env::VarError::NotUnicode(_)) => Err(it.into()),
        }
    }

    pub fn set_token(self, token: Option<String>) -> Self {
        ApiInfo {
            token: token.or(self.token),
            ..self
        }
    }
}

/// An at-rest description of a remote procedure call.
#[derive(Debug, Clone)]
pub struct RpcRequest<T = serde_json::Value> {
    pub method_name: &'static str,
    pub params: serde_json::Value,
    pub result_type: PhantomData<T>,
    pub timeout: Duration,
}

impl<T> RpcRequest<T> {
    /// `params` is the JSON array of positional arguments.
    pub fn new(method_name: &'static str, params: serde_json::Value) -> Self {
        RpcRequest {
            method_name,
            params,
            result_type: PhantomData,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl<T> ToRpcParams for RpcRequest<T> {
    fn to_rpc_params(self) -> Result<Option<Box<serde_json::value::RawValue>>, serde_json::Error> {
        Ok(Some(serde_json::value::to_raw_value(&self.params)?))
    }
}

/// JSON-RPC client of a Lotus-compatible node.
#[derive(Clone)]
pub struct LotusClient {
    http: HttpClient,
    url: Url,
    poll_interval: Duration,
}

impl fmt::Debug for LotusClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LotusClient").field("url", &self.url).finish()
    }
}

impl LotusClient {
    pub fn new(info: &ApiInfo) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &info.token {
            headers.insert(
                "Authorization",
                HeaderValue::from_str(&format!("Bearer {token}"))
                    .context("invalid authorization token")?,
            );
        }
        let http = HttpClientBuilder::default()
            .set_headers(headers)
            .max_response_size(u32::MAX)
            .request_timeout(DEFAULT_TIMEOUT)
            .build(info.url.as_str())
            .with_context(|| format!("couldn't create a client for {}", info.url))?;
        Ok(Self {
            http,
            url: info.url.clone(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// How often `chain_notify` polls the head.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub async fn call<T: DeserializeOwned + Send>(&self, req: RpcRequest<T>) -> anyhow::Result<T> {
        let method_name = req.method_name;
        let timeout = req.timeout;
        trace!("calling {method_name}");
        let label = NodeMethodLabel {
            method: method_name,
        };
        let start = Instant::now();
        let result =
            match tokio::time::timeout(timeout, self.http.request::<T, _>(method_name, req)).await
            {
                Ok(result) => result.with_context(|| format!("{method_name} failed")),
                Err(_) => Err(anyhow::anyhow!(
                    "{method_name} timed out after {}",
                    humantime::format_duration(timeout)
                )),
            };
        metrics::NODE_CALL_DURATION
            .get_or_create(&label)
            .observe(start.elapsed().as_secs_f64());
        if result.is_err() {
            metrics::NODE_CALL_FAILURES.get_or_create(&label).inc();
        }
        result
    }
}

/// `"/dns/example.com/tcp/8080/http" -> "http://example.com:8080/"`
///
/// Websocket protocols map to their HTTP counterpart, as nodes serve both
/// on the same port.
fn multiaddr2url(addr: &str) -> Option<Url> {
    let mut components = addr.strip_prefix('/')?.split('/').peekable();
    let host = match (components.next()?, components.next()?) {
        ("dns" | "dns4" | "dns6" | "ip4", host) => host.to_string(),
        ("ip6", host) => format!("[{host}]"),
        _ => return None,
    };
    let port = match components.next_if_eq(&"tcp") {
        Some(_) => Some(components.next()?.parse::<u16>().ok()?),
        None => None,
    };
    let scheme = match components.next()? {
        "http" | "ws" => "http",
        "https" | "wss" => "https",
        _ => return None,
    };
    let None = components.next() else { return None };
    let parse_me = match port {
        Some(port) => format!("{scheme}://{host}:{port}"),
        None => format!("{scheme}://{host}"),
    };
    parse_me.parse().ok()
}
