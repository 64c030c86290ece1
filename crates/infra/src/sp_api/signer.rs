//! AWS Signature Version 4 request signing.
//!
//! Pure and deterministic: the same request, credential, scope and timestamp
//! always produce the same headers. Nothing here touches the network or the
//! clock.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::credentials::SigningCredential;
use crate::http::HttpRequest;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const AMZ_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";
const DATE_FORMAT: &str = "%Y%m%d";

/// The HMAC chain refused a key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("signing key rejected: {0}")]
pub struct SigningError(String);

/// Region and service a signature is scoped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningScope {
    pub region: String,
    pub service: String,
}

impl SigningScope {
    pub fn new(region: impl Into<String>, service: impl Into<String>) -> Self {
        Self { region: region.into(), service: service.into() }
    }

    fn credential_scope(&self, date: &str) -> String {
        format!("{date}/{}/{}/aws4_request", self.region, self.service)
    }
}

/// The parts of an HTTP request that take part in the signature.
#[derive(Debug, Clone, Copy)]
pub struct SignableRequest<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub query: &'a [(String, String)],
    pub headers: &'a [(String, String)],
    pub body: &'a [u8],
}

/// Headers to add to the outgoing request, plus the intermediate artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    pub authorization: String,
    pub amz_date: String,
    pub security_token: Option<String>,
    pub signed_headers: String,
    pub canonical_request: String,
    pub string_to_sign: String,
    pub signature: String,
}

impl SignedRequest {
    /// Header pairs to attach to the request.
    pub fn headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![
            ("authorization".to_string(), self.authorization.clone()),
            ("x-amz-date".to_string(), self.amz_date.clone()),
        ];
        if let Some(token) = &self.security_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }
        headers
    }
}

/// Sign `request` at `timestamp`.
///
/// `x-amz-date` and, when the credential carries a session token,
/// `x-amz-security-token` are added to the canonical headers before signing;
/// any caller-supplied values for them are replaced.
pub fn sign(
    request: &SignableRequest<'_>,
    credential: &SigningCredential,
    scope: &SigningScope,
    timestamp: DateTime<Utc>,
) -> Result<SignedRequest, SigningError> {
    let amz_date = timestamp.format(AMZ_DATE_FORMAT).to_string();
    let date = timestamp.format(DATE_FORMAT).to_string();

    let mut headers = canonical_header_map(request.headers);
    headers.insert("x-amz-date".to_string(), vec![amz_date.clone()]);
    if let Some(token) = &credential.session_token {
        headers.insert("x-amz-security-token".to_string(), vec![token.clone()]);
    }

    let canonical_headers: String = headers
        .iter()
        .map(|(name, values)| format!("{name}:{}\n", values.join(",")))
        .collect();
    let signed_headers = headers.keys().map(String::as_str).collect::<Vec<_>>().join(";");

    let canonical_request = [
        request.method.to_ascii_uppercase(),
        request.path.to_string(),
        canonical_query(request.query),
        canonical_headers,
        signed_headers.clone(),
        hex_sha256(request.body),
    ]
    .join("\n");

    let credential_scope = scope.credential_scope(&date);
    let string_to_sign = format!(
        "{ALGORITHM}\n{amz_date}\n{credential_scope}\n{}",
        hex_sha256(canonical_request.as_bytes())
    );

    let key =
        derive_signing_key(&credential.secret_access_key, &date, &scope.region, &scope.service)?;
    let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes())?);

    let authorization = format!(
        "{ALGORITHM} Credential={}/{credential_scope}, SignedHeaders={signed_headers}, \
         Signature={signature}",
        credential.access_key_id
    );

    Ok(SignedRequest {
        authorization,
        amz_date,
        security_token: credential.session_token.clone(),
        signed_headers,
        canonical_request,
        string_to_sign,
        signature,
    })
}

/// Sign an outgoing [`HttpRequest`] in place, appending the signature headers.
pub fn sign_http_request(
    request: &mut HttpRequest,
    credential: &SigningCredential,
    scope: &SigningScope,
    timestamp: DateTime<Utc>,
) -> Result<SignedRequest, SigningError> {
    let query: Vec<(String, String)> = request.url.query_pairs().into_owned().collect();
    let method = request.method.as_str().to_string();
    let body = request.body.as_deref().unwrap_or_default().as_bytes();
    let signed = sign(
        &SignableRequest {
            method: &method,
            path: request.url.path(),
            query: &query,
            headers: &request.headers,
            body,
        },
        credential,
        scope,
        timestamp,
    )?;
    request.headers.extend(signed.headers());
    Ok(signed)
}

/// HMAC chain `"AWS4"+secret → date → region → service → "aws4_request"`.
pub fn derive_signing_key(
    secret: &str,
    date: &str,
    region: &str,
    service: &str,
) -> Result<Vec<u8>, SigningError> {
    let k_date = hmac_sha256(format!("AWS4{secret}").as_bytes(), date.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

/// Percent-encode with the RFC 3986 unreserved set, sort by key then value.
pub fn canonical_query(params: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(key, value)| {
            (urlencoding::encode(key).into_owned(), urlencoding::encode(value).into_owned())
        })
        .collect();
    encoded.sort();
    encoded.into_iter().map(|(key, value)| format!("{key}={value}")).collect::<Vec<_>>().join("&")
}

fn canonical_header_map(headers: &[(String, String)]) -> BTreeMap<String, Vec<String>> {
    let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in headers {
        let value = value.split_whitespace().collect::<Vec<_>>().join(" ");
        map.entry(name.trim().to_ascii_lowercase()).or_default().push(value);
    }
    map
}

fn hex_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, SigningError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|e| SigningError(e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}
