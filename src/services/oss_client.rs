//! src/services/oss_client.rs
//!
//! OssClient: the `ObjectStore` backed by the Aliyun OSS REST API.
//! Requests are authenticated with the header signature (V1):
//! `Authorization: OSS <AccessKeyId>:<base64(HMAC-SHA1(secret, StringToSign))>`.
//! Bodies are streamed straight from disk; nothing is buffered in memory.

use crate::{
    config::AppConfig,
    errors::{DeployError, DeployResult},
    models::object_key::ObjectKey,
    services::object_store::{ObjectBody, ObjectStore},
};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use chrono::Utc;
use futures::TryStreamExt;
use hmac::{Hmac, Mac};
use reqwest::{
    Body, Method, RequestBuilder, Response,
    header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, DATE, ETAG},
};
use sha1::Sha1;
use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};
use tracing::debug;
use url::{Host, Url};

type HmacSha1 = Hmac<Sha1>;

const SECURITY_TOKEN_HEADER: &str = "x-oss-security-token";

/// How object URLs are addressed for a given endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum UrlStyle {
    /// `scheme://bucket.endpoint/key`
    VirtualHosted,
    /// `scheme://endpoint/bucket/key`, used when the endpoint is an IP address.
    PathStyle,
    /// `scheme://endpoint/key`, the endpoint is a domain bound to the bucket.
    Cname,
}

#[derive(Clone)]
pub struct OssClient {
    http: reqwest::Client,
    bucket: String,
    access_key_id: String,
    access_key_secret: String,
    security_token: Option<String>,
    scheme: String,
    host: String,
    style: UrlStyle,
}

impl OssClient {
    /// Build a client for the bucket and endpoint named in `cfg`.
    pub fn new(cfg: &AppConfig) -> DeployResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Self::with_http(cfg, http)
    }

    /// Same as `new` but with a caller-supplied HTTP client.
    pub fn with_http(cfg: &AppConfig, http: reqwest::Client) -> DeployResult<Self> {
        let Endpoint {
            scheme,
            host,
            is_ip,
        } = parse_endpoint(&cfg.endpoint)?;
        let style = if cfg.cname {
            UrlStyle::Cname
        } else if is_ip {
            UrlStyle::PathStyle
        } else {
            UrlStyle::VirtualHosted
        };
        debug!(%scheme, %host, ?style, bucket = %cfg.bucket, "configured OSS endpoint");

        Ok(Self {
            http,
            bucket: cfg.bucket.clone(),
            access_key_id: cfg.access_key_id.clone(),
            access_key_secret: cfg.access_key_secret.clone(),
            security_token: cfg.security_token.clone(),
            scheme,
            host,
            style,
        })
    }

    /// Full request URL for `key`, with each path segment percent-encoded.
    fn object_url(&self, key: &ObjectKey) -> String {
        let encoded = key
            .as_str()
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");

        match self.style {
            UrlStyle::VirtualHosted => {
                format!("{}://{}.{}/{}", self.scheme, self.bucket, self.host, encoded)
            }
            UrlStyle::PathStyle => {
                format!("{}://{}/{}/{}", self.scheme, self.host, self.bucket, encoded)
            }
            UrlStyle::Cname => format!("{}://{}/{}", self.scheme, self.host, encoded),
        }
    }

    /// `/bucket/key` with the raw key; identical for every URL style.
    fn canonical_resource(&self, key: &ObjectKey) -> String {
        format!("/{}/{}", self.bucket, key)
    }

    /// Attach `Date`, the `x-oss-*` headers and a signed `Authorization` header.
    fn signed(&self, method: Method, key: &ObjectKey, content_type: &str) -> RequestBuilder {
        let date = http_date();
        let mut oss_headers = BTreeMap::new();
        if let Some(token) = &self.security_token {
            oss_headers.insert(SECURITY_TOKEN_HEADER.to_string(), token.clone());
        }

        let to_sign = string_to_sign(
            method.as_str(),
            "",
            content_type,
            &date,
            &oss_headers,
            &self.canonical_resource(key),
        );
        let authorization = format!(
            "OSS {}:{}",
            self.access_key_id,
            sign(&self.access_key_secret, &to_sign)
        );

        let mut request = self
            .http
            .request(method, self.object_url(key))
            .header(DATE, date)
            .header(AUTHORIZATION, authorization);
        for (name, value) in oss_headers {
            request = request.header(name, value);
        }
        if !content_type.is_empty() {
            request = request.header(CONTENT_TYPE, content_type);
        }
        request
    }
}

#[async_trait]
impl ObjectStore for OssClient {
    async fn delete_object(&self, key: &ObjectKey) -> DeployResult<()> {
        let response = self.signed(Method::DELETE, key, "").send().await?;
        check_response(response).await?;
        debug!(%key, "deleted object");
        Ok(())
    }

    async fn put_object(&self, key: &ObjectKey, body: ObjectBody) -> DeployResult<()> {
        // MD5 of exactly what went over the wire, checked against the ETag.
        let digest = Arc::new(Mutex::new(md5::Context::new()));
        let tap = Arc::clone(&digest);
        let stream = body.stream.inspect_ok(move |chunk| {
            tap.lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .consume(chunk);
        });

        let response = self
            .signed(Method::PUT, key, &body.content_type)
            .header(CONTENT_LENGTH, body.size_bytes)
            .body(Body::wrap_stream(stream))
            .send()
            .await?;
        let response = check_response(response).await?;

        let expected = {
            let mut ctx = digest.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            format!("{:x}", std::mem::replace(&mut *ctx, md5::Context::new()).compute())
        };
        if let Some(etag) = response.headers().get(ETAG).and_then(|v| v.to_str().ok()) {
            let actual = etag.trim_matches('"');
            if !actual.eq_ignore_ascii_case(&expected) {
                return Err(DeployError::ChecksumMismatch {
                    key: key.to_string(),
                    expected,
                    actual: actual.to_string(),
                });
            }
        }

        debug!(%key, size_bytes = body.size_bytes, etag = %expected, "put object");
        Ok(())
    }
}

/// Pass 2xx responses through; turn anything else into `DeployError::Remote`.
async fn check_response(response: Response) -> DeployResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(DeployError::from_remote_body(status.as_u16(), &body))
}

/// Parsed endpoint: scheme, `host[:port]`, and whether the host is an IP literal.
#[derive(Debug, PartialEq, Eq)]
struct Endpoint {
    scheme: String,
    host: String,
    is_ip: bool,
}

/// Parse an endpoint such as `oss-cn-hangzhou.aliyuncs.com` or
/// `https://10.0.0.1:9000`. A missing scheme means `http`.
fn parse_endpoint(endpoint: &str) -> DeployResult<Endpoint> {
    let invalid = |reason: &str| DeployError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = endpoint.trim();
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    };
    let url = Url::parse(&with_scheme).map_err(|err| invalid(&err.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(invalid("scheme must be http or https"));
    }
    if url.path() != "/" || url.query().is_some() || url.fragment().is_some() {
        return Err(invalid("endpoint must not contain a path"));
    }
    let host = url.host().ok_or_else(|| invalid("missing host"))?;
    let is_ip = matches!(host, Host::Ipv4(_) | Host::Ipv6(_));
    let host = match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };

    Ok(Endpoint {
        scheme: url.scheme().to_string(),
        host,
        is_ip,
    })
}

/// RFC 1123 date in GMT, as the `Date` header expects.
fn http_date() -> String {
    Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Build the V1 StringToSign.
///
/// `oss_headers` must hold lower-cased `x-oss-*` names; the map keeps them sorted.
fn string_to_sign(
    verb: &str,
    content_md5: &str,
    content_type: &str,
    date: &str,
    oss_headers: &BTreeMap<String, String>,
    resource: &str,
) -> String {
    let mut out = format!("{}\n{}\n{}\n{}\n", verb, content_md5, content_type, date);
    for (name, value) in oss_headers {
        out.push_str(&format!("{}:{}\n", name, value.trim()));
    }
    out.push_str(resource);
    out
}

fn sign(secret: &str, string_to_sign: &str) -> String {
    let mut mac =
        HmacSha1::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(string_to_sign.as_bytes());
    general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}
