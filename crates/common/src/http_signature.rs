//! HTTP Signature utilities for `ActivityPub` federation.
//!
//! Implements the signing-string construction, signing and verification of
//! draft-cavage HTTP Signatures, including the `(request-target)`,
//! `(created)` and `(expires)` pseudo-headers some implementations sign.
//! See: <https://datatracker.ietf.org/doc/html/draft-cavage-http-signatures>

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use rsa::{
    RsaPrivateKey, RsaPublicKey,
    pkcs1v15::{Signature, SigningKey, VerifyingKey},
    pkcs8::DecodePublicKey,
    sha2::Sha256,
    signature::{SignatureEncoding, Signer, Verifier},
};
use sha2::{Digest, Sha256 as Sha256Hasher};
use std::collections::HashMap;

use crate::{AppError, AppResult};

/// Parsed `signature` request header.
#[derive(Debug, Clone)]
pub struct HttpSignature {
    /// Key ID: a URI identifying the signing actor's public key.
    pub key_id: String,
    /// Algorithm used (typically "rsa-sha256" or "hs2019").
    pub algorithm: String,
    /// Ordered list of signed pseudo/real headers.
    pub headers: Vec<String>,
    /// The signature itself (base64 encoded).
    pub signature: String,
    /// Unix timestamp of the `(created)` parameter, if the sender sent one.
    pub created: Option<i64>,
    /// Unix timestamp of the `(expires)` parameter, if the sender sent one.
    pub expires: Option<i64>,
}

impl HttpSignature {
    /// Parse a `signature` header value.
    ///
    /// Format: `keyId="...",algorithm="...",headers="...",signature="..."`
    /// with optional unquoted `created=` / `expires=` integer parameters.
    pub fn parse(header: &str) -> AppResult<Self> {
        let mut key_id = None;
        let mut algorithm = None;
        let mut headers = None;
        let mut signature = None;
        let mut created = None;
        let mut expires = None;

        for part in header.split(',') {
            let part = part.trim();
            if let Some((key, value)) = part.split_once('=') {
                let value = value.trim_matches('"');
                match key.trim() {
                    "keyId" => key_id = Some(value.to_string()),
                    "algorithm" => algorithm = Some(value.to_string()),
                    "headers" => headers = Some(value.to_string()),
                    "signature" => signature = Some(value.to_string()),
                    "created" => created = value.parse::<i64>().ok(),
                    "expires" => expires = value.parse::<i64>().ok(),
                    _ => {} // Ignore unknown parameters
                }
            }
        }

        Ok(Self {
            key_id: key_id.ok_or_else(|| AppError::BadRequest("Missing keyId".to_string()))?,
            algorithm: algorithm.unwrap_or_else(|| "rsa-sha256".to_string()),
            headers: headers
                .unwrap_or_else(|| "date".to_string())
                .split(' ')
                .map(std::string::ToString::to_string)
                .collect(),
            signature: signature
                .ok_or_else(|| AppError::BadRequest("Missing signature".to_string()))?,
            created,
            expires,
        })
    }

    /// Whether the sender signed `(created)` instead of a `date` header.
    #[must_use]
    pub fn uses_created(&self) -> bool {
        self.headers.iter().any(|h| h == "(created)")
    }
}

/// Build the string that is signed/verified from request components.
///
/// `created`/`expires` supply the values of the corresponding
/// pseudo-headers when the sender signed them.
pub fn build_signing_string(
    method: &str,
    path: &str,
    headers: &HashMap<String, String>,
    signed_headers: &[String],
    created: Option<i64>,
    expires: Option<i64>,
) -> AppResult<String> {
    let mut parts = Vec::new();

    for header_name in signed_headers {
        let value = match header_name.as_str() {
            "(request-target)" => format!("{} {}", method.to_lowercase(), path),
            "(created)" => created
                .ok_or_else(|| AppError::BadRequest("Missing created parameter".to_string()))?
                .to_string(),
            "(expires)" => expires
                .ok_or_else(|| AppError::BadRequest("Missing expires parameter".to_string()))?
                .to_string(),
            _ => headers
                .get(&header_name.to_lowercase())
                .cloned()
                .ok_or_else(|| AppError::BadRequest(format!("Missing header: {header_name}")))?,
        };

        parts.push(format!("{header_name}: {value}"));
    }

    Ok(parts.join("\n"))
}

/// Verify a parsed HTTP Signature against a public key.
///
/// Returns `Ok(false)` for a well-formed but wrong signature; errors are
/// reserved for malformed input.
pub fn verify_signature(
    signature: &HttpSignature,
    public_key_pem: &str,
    method: &str,
    path: &str,
    headers: &HashMap<String, String>,
) -> AppResult<bool> {
    let signing_string = build_signing_string(
        method,
        path,
        headers,
        &signature.headers,
        signature.created,
        signature.expires,
    )?;

    let sig_bytes = BASE64
        .decode(&signature.signature)
        .map_err(|e| AppError::BadRequest(format!("Invalid signature encoding: {e}")))?;

    let public_key = RsaPublicKey::from_public_key_pem(public_key_pem)
        .map_err(|e| AppError::Internal(format!("Invalid public key: {e}")))?;

    let verifying_key = VerifyingKey::<Sha256>::new(public_key);
    let signature_obj = Signature::try_from(sig_bytes.as_slice())
        .map_err(|e| AppError::BadRequest(format!("Invalid signature format: {e}")))?;

    Ok(verifying_key
        .verify(signing_string.as_bytes(), &signature_obj)
        .is_ok())
}

/// Sign an HTTP request, returning the `signature` header value.
pub fn sign_request(
    private_key: &RsaPrivateKey,
    key_id: &str,
    method: &str,
    path: &str,
    headers: &HashMap<String, String>,
    signed_header_names: &[&str],
) -> AppResult<String> {
    let header_names: Vec<String> = signed_header_names
        .iter()
        .map(|s| (*s).to_string())
        .collect();
    let signing_string = build_signing_string(method, path, headers, &header_names, None, None)?;

    let signing_key = SigningKey::<Sha256>::new(private_key.clone());
    let signature = signing_key.sign(signing_string.as_bytes());
    let sig_base64 = BASE64.encode(signature.to_bytes());

    Ok(format!(
        r#"keyId="{}",algorithm="rsa-sha256",headers="{}",signature="{}""#,
        key_id,
        signed_header_names.join(" "),
        sig_base64
    ))
}

/// Calculate the SHA-256 `digest` header value of a body.
#[must_use]
pub fn calculate_digest(body: &[u8]) -> String {
    let mut hasher = Sha256Hasher::new();
    hasher.update(body);
    let hash = hasher.finalize();
    format!("SHA-256={}", BASE64.encode(hash))
}

/// Verify that a `digest` header matches the body.
#[must_use]
pub fn verify_digest(body: &[u8], digest_header: &str) -> bool {
    calculate_digest(body) == digest_header
}
