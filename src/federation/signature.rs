//! HTTP Signatures for ActivityPub
//!
//! Implements signing and verification per:
//! https://docs.joinmastodon.org/spec/security/
//!
//! Only the `(request-target) host date [digest]` header set is produced.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use http::{HeaderMap, HeaderName, HeaderValue};
use rsa::pkcs1v15::{Signature as Pkcs1v15Signature, SigningKey, VerifyingKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};

use crate::error::AppError;
use crate::identity::LocalActor;

/// RFC 7231 IMF-fixdate
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Format an instant as an HTTP `Date` header value
pub fn http_date(now: DateTime<Utc>) -> String {
    now.format(HTTP_DATE_FORMAT).to_string()
}

/// Canonical string to sign, together with the header names it covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningString {
    /// Newline-joined `name: value` lines
    pub text: String,
    /// Header names in signing order, as advertised in `headers="..."`
    pub headers: Vec<&'static str>,
}

impl SigningString {
    /// Value for the `headers` parameter of the Signature header
    pub fn header_list(&self) -> String {
        self.headers.join(" ")
    }
}

/// Build the canonical signing string
///
/// # Arguments
/// * `method` - HTTP method, any case
/// * `path` - Request target path, including any query string
/// * `host` - Host header value
/// * `date` - Date header value
/// * `digest` - Base64 SHA-256 of the body, when the request has one
///
/// The digest line is present iff `digest` is `Some`.
pub fn build_signing_string(
    method: &str,
    path: &str,
    host: &str,
    date: &str,
    digest: Option<&str>,
) -> SigningString {
    let mut lines = vec![
        format!("(request-target): {} {}", method.to_lowercase(), path),
        format!("host: {}", host),
        format!("date: {}", date),
    ];
    let mut headers = vec!["(request-target)", "host", "date"];

    if let Some(digest) = digest {
        lines.push(format!("digest: SHA-256={}", digest));
        headers.push("digest");
    }

    SigningString {
        text: lines.join("\n"),
        headers,
    }
}

/// Base64-encoded SHA-256 of the exact body bytes
pub fn body_digest(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    BASE64.encode(hasher.finalize())
}

/// `Digest` header value for a body
///
/// # Returns
/// `SHA-256=base64(hash)`
pub fn digest_header(body: &[u8]) -> String {
    format!("SHA-256={}", body_digest(body))
}

/// Headers to add for signed request
#[derive(Debug, Clone)]
pub struct SignatureHeaders {
    /// Host header value (`host[:port]`)
    pub host: String,
    /// Date header value, exactly as signed
    pub date: String,
    /// Digest header value (if body present)
    pub digest: Option<String>,
    /// Signature header value
    pub signature: String,
}

impl SignatureHeaders {
    /// Convert into a header map ready to merge into a request
    pub fn to_header_map(&self) -> Result<HeaderMap, AppError> {
        let mut headers = HeaderMap::new();
        insert_header(&mut headers, http::header::HOST, &self.host)?;
        insert_header(&mut headers, http::header::DATE, &self.date)?;
        if let Some(ref digest) = self.digest {
            insert_header(&mut headers, HeaderName::from_static("digest"), digest)?;
        }
        insert_header(
            &mut headers,
            HeaderName::from_static("signature"),
            &self.signature,
        )?;
        Ok(headers)
    }
}

fn insert_header(headers: &mut HeaderMap, name: HeaderName, value: &str) -> Result<(), AppError> {
    let value = HeaderValue::from_str(value)
        .map_err(|e| AppError::Validation(format!("Invalid {} header value: {}", name, e)))?;
    headers.insert(name, value);
    Ok(())
}

/// Split a URL into the Host header value and the request target
pub fn host_and_target(url: &str) -> Result<(String, String), AppError> {
    let parsed =
        url::Url::parse(url).map_err(|e| AppError::Validation(format!("Invalid URL: {}", e)))?;

    let host = parsed
        .host_str()
        .ok_or_else(|| AppError::Validation("Missing host in URL".to_string()))?;
    // `port()` is None for the scheme's default port
    let host = match parsed.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };

    let target = match parsed.query() {
        Some(query) => format!("{}?{}", parsed.path(), query),
        None => parsed.path().to_string(),
    };

    Ok((host, target))
}

/// Sign an HTTP request
///
/// Creates HTTP Signature headers for an outgoing request.
///
/// # Arguments
/// * `actor` - Local actor whose key signs the request
/// * `method` - HTTP method (e.g., "POST")
/// * `url` - Full URL being requested
/// * `date` - Date header value; reuse it for every request of one operation
/// * `body` - Request body (for digest), exactly as it will be sent
///
/// # Errors
/// `AppError::Signing` if the private key is unreadable or signing fails.
///
/// # Example
/// ```ignore
/// let headers = sign_request(&alice, "POST", "https://remote.example/inbox", &date, Some(&body))?;
/// ```
pub fn sign_request(
    actor: &LocalActor,
    method: &str,
    url: &str,
    date: &str,
    body: Option<&[u8]>,
) -> Result<SignatureHeaders, AppError> {
    let (host, target) = host_and_target(url)?;
    let digest = body.map(body_digest);

    let signing_string = build_signing_string(method, &target, &host, date, digest.as_deref());
    let signature_b64 = sign_string(actor.private_key_pem(), &signing_string.text)?;

    let signature = format!(
        "keyId=\"{}\",algorithm=\"rsa-sha256\",headers=\"{}\",signature=\"{}\"",
        actor.key_id,
        signing_string.header_list(),
        signature_b64
    );

    tracing::debug!(
        key_id = %actor.key_id,
        signing_string = %signing_string.text,
        "Signed request"
    );

    Ok(SignatureHeaders {
        host,
        date: date.to_string(),
        digest: digest.map(|d| format!("SHA-256={}", d)),
        signature,
    })
}

/// RSA-SHA256 (PKCS#1 v1.5) signature over `text`, base64-encoded
pub fn sign_string(private_key_pem: &str, text: &str) -> Result<String, AppError> {
    let private_key = parse_private_key(private_key_pem)?;
    let signing_key = SigningKey::<Sha256>::new(private_key);
    let signature = signing_key
        .try_sign(text.as_bytes())
        .map_err(|e| AppError::Signing(format!("RSA signing failed: {}", e)))?;
    Ok(BASE64.encode(signature.to_bytes()))
}

/// Accepts PKCS#8 (`BEGIN PRIVATE KEY`) and PKCS#1 (`BEGIN RSA PRIVATE KEY`)
fn parse_private_key(pem: &str) -> Result<RsaPrivateKey, AppError> {
    use rsa::pkcs1::DecodeRsaPrivateKey;
    use rsa::pkcs8::DecodePrivateKey;

    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|e| AppError::Signing(format!("Invalid private key: {}", e)))
}

fn parse_public_key(pem: &str) -> Result<RsaPublicKey, AppError> {
    use rsa::pkcs1::DecodeRsaPublicKey;
    use rsa::pkcs8::DecodePublicKey;

    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| AppError::Validation(format!("Invalid public key: {}", e)))
}

/// Verify an HTTP request signature
///
/// Reconstructs the signing string from the headers named in the
/// Signature header and checks it against `public_key_pem`.
///
/// # Arguments
/// * `method` - HTTP method
/// * `path` - Request target (path and query)
/// * `headers` - All request headers
/// * `body` - Request body; when present its digest must match
/// * `public_key_pem` - RSA public key in PEM format
pub fn verify_signature(
    method: &str,
    path: &str,
    headers: &HeaderMap,
    body: Option<&[u8]>,
    public_key_pem: &str,
) -> Result<(), AppError> {
    let signature_header = header_str(headers, "signature")?;
    let parsed = parse_signature_header(signature_header)?;

    if let Some(ref algorithm) = parsed.algorithm {
        if algorithm != "rsa-sha256" && algorithm != "hs2019" {
            return Err(AppError::Validation(format!(
                "Unsupported signature algorithm: {}",
                algorithm
            )));
        }
    }

    for required in ["(request-target)", "host", "date"] {
        if !parsed.headers.iter().any(|h| h == required) {
            return Err(AppError::Validation(format!(
                "Signed headers must include: {}",
                required
            )));
        }
    }

    if let Some(body) = body {
        if !parsed.headers.iter().any(|h| h == "digest") {
            return Err(AppError::Validation(
                "Signed headers must include: digest".to_string(),
            ));
        }
        if header_str(headers, "digest")? != digest_header(body) {
            return Err(AppError::Validation("Digest mismatch".to_string()));
        }
    }

    let mut signing_parts = Vec::with_capacity(parsed.headers.len());
    for header_name in &parsed.headers {
        let value = match header_name.as_str() {
            "(request-target)" => format!("{} {}", method.to_lowercase(), path),
            name => header_str(headers, name)?.to_string(),
        };
        signing_parts.push(format!("{}: {}", header_name, value));
    }
    let signing_string = signing_parts.join("\n");

    let signature_bytes = BASE64
        .decode(&parsed.signature)
        .map_err(|_| AppError::Validation("Invalid signature encoding".to_string()))?;
    let signature = Pkcs1v15Signature::try_from(signature_bytes.as_slice())
        .map_err(|e| AppError::Validation(format!("Invalid signature format: {}", e)))?;

    let verifier = VerifyingKey::<Sha256>::new(parse_public_key(public_key_pem)?);
    verifier
        .verify(signing_string.as_bytes(), &signature)
        .map_err(|_| AppError::Validation("Signature verification failed".to_string()))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, AppError> {
    headers
        .get(name)
        .ok_or_else(|| AppError::Validation(format!("Missing {} header", name)))?
        .to_str()
        .map_err(|_| AppError::Validation(format!("Invalid {} header", name)))
}

/// Parsed Signature header
#[derive(Debug, Clone)]
pub struct ParsedSignature {
    /// Key ID (URL to public key)
    pub key_id: String,
    /// Algorithm, when advertised
    pub algorithm: Option<String>,
    /// Signed header names
    pub headers: Vec<String>,
    /// Base64-encoded signature
    pub signature: String,
}

/// Parse Signature header value
///
/// # Format
/// ```text
/// keyId="...",algorithm="...",headers="...",signature="..."
/// ```
pub fn parse_signature_header(header: &str) -> Result<ParsedSignature, AppError> {
    let mut key_id = None;
    let mut algorithm = None;
    let mut headers = None;
    let mut signature = None;

    for part in header.split(',') {
        if let Some((key, value)) = part.trim().split_once('=') {
            let value = value.trim().trim_matches('"');

            match key.trim() {
                "keyId" => key_id = Some(value.to_string()),
                "algorithm" => algorithm = Some(value.to_string()),
                "headers" => {
                    headers = Some(
                        value
                            .split_whitespace()
                            .map(|s| s.to_ascii_lowercase())
                            .collect(),
                    )
                }
                "signature" => signature = Some(value.to_string()),
                _ => {}
            }
        }
    }

    Ok(ParsedSignature {
        key_id: key_id.ok_or_else(|| AppError::Validation("Missing keyId".to_string()))?,
        algorithm,
        // draft-cavage: absent list means just `date`
        headers: headers.unwrap_or_else(|| vec!["date".to_string()]),
        signature: signature
            .ok_or_else(|| AppError::Validation("Missing signature".to_string()))?,
    })
}
