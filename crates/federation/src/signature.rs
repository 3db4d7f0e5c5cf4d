//! HTTP Signature signing and verification for federation requests.
//!
//! Builds on the shared draft-cavage primitives in `sparrow_common`,
//! adding the outbound header assembly and the inbound coverage policy
//! (which headers a remote signature must include to be trusted).

use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use rsa::RsaPrivateKey;
use sparrow_common::crypto::parse_private_key;
use sparrow_common::http_signature::{HttpSignature, calculate_digest, sign_request};
use sparrow_common::{AppError, AppResult, http_signature};
use std::collections::HashMap;
use url::Url;

/// Signs outbound federation requests for one actor key.
pub struct HttpSigner {
    private_key: RsaPrivateKey,
    key_id: String,
}

impl HttpSigner {
    /// Create a signer from a PEM-encoded PKCS#8 private key.
    pub fn new(private_key_pem: &str, key_id: String) -> AppResult<Self> {
        Ok(Self {
            private_key: parse_private_key(private_key_pem)?,
            key_id,
        })
    }

    /// Sign a POST of `body` to `url`, returning the headers to send.
    ///
    /// The signed set is always `(request-target) host date digest`.
    pub fn sign_post(
        &self,
        url: &Url,
        body: &[u8],
        content_type: &str,
    ) -> AppResult<HeaderMap> {
        let host = url
            .host_str()
            .ok_or_else(|| AppError::Federation(format!("inbox URL has no host: {url}")))?;
        let path = match url.query() {
            Some(query) => format!("{}?{query}", url.path()),
            None => url.path().to_string(),
        };
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let digest = calculate_digest(body);

        let mut header_values = HashMap::new();
        header_values.insert("host".to_string(), host.to_string());
        header_values.insert("date".to_string(), date.clone());
        header_values.insert("digest".to_string(), digest.clone());

        let signature_header = sign_request(
            &self.private_key,
            &self.key_id,
            "POST",
            &path,
            &header_values,
            &["(request-target)", "host", "date", "digest"],
        )?;

        let mut headers = HeaderMap::new();
        insert_header(&mut headers, "host", host)?;
        insert_header(&mut headers, "date", &date)?;
        insert_header(&mut headers, "digest", &digest)?;
        insert_header(&mut headers, "signature", &signature_header)?;
        insert_header(&mut headers, "content-type", content_type)?;
        Ok(headers)
    }
}

fn insert_header(headers: &mut HeaderMap, name: &'static str, value: &str) -> AppResult<()> {
    let value = HeaderValue::from_str(value)
        .map_err(|e| AppError::Federation(format!("invalid {name} header value: {e}")))?;
    headers.insert(HeaderName::from_static(name), value);
    Ok(())
}

/// Verifies inbound federation request signatures.
pub struct HttpVerifier;

impl HttpVerifier {
    /// Header coverage a trusted inbound signature must include:
    /// `(request-target)`, `digest`, `host`, and `date` or `(created)`.
    #[must_use]
    pub fn has_required_coverage(signature: &HttpSignature) -> bool {
        let has = |name: &str| signature.headers.iter().any(|h| h == name);
        has("(request-target)")
            && has("digest")
            && has("host")
            && (has("date") || has("(created)"))
    }

    /// Verify a parsed signature against a public key.
    ///
    /// `Ok(false)` means well-formed but wrong; errors mean the request
    /// is missing something the signature claims to cover.
    pub fn verify(
        signature: &HttpSignature,
        public_key_pem: &str,
        method: &str,
        path: &str,
        headers: &HashMap<String, String>,
    ) -> AppResult<bool> {
        if !Self::has_required_coverage(signature) {
            tracing::debug!(key_id = %signature.key_id, "signature header coverage insufficient");
            return Ok(false);
        }
        http_signature::verify_signature(signature, public_key_pem, method, path, headers)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sparrow_common::generate_rsa_keypair;

    #[test]
    fn test_sign_post_and_verify() {
        let keypair = generate_rsa_keypair().unwrap();
        let signer = HttpSigner::new(
            &keypair.private_key_pem,
            "https://sparrow.example/users/1#main-key".to_string(),
        )
        .unwrap();

        let url = Url::parse("https://remote.example/inbox").unwrap();
        let body = br#"{"type":"Create"}"#;
        let headers = signer
            .sign_post(&url, body, "application/activity+json")
            .unwrap();

        let parsed =
            HttpSignature::parse(headers.get("signature").unwrap().to_str().unwrap()).unwrap();
        assert!(HttpVerifier::has_required_coverage(&parsed));

        let mut header_values = HashMap::new();
        for name in ["host", "date", "digest"] {
            header_values.insert(
                name.to_string(),
                headers.get(name).unwrap().to_str().unwrap().to_string(),
            );
        }

        let verified = HttpVerifier::verify(
            &parsed,
            &keypair.public_key_pem,
            "POST",
            "/inbox",
            &header_values,
        )
        .unwrap();
        assert!(verified);
    }

    #[test]
    fn test_coverage_requires_digest() {
        let sig = HttpSignature {
            key_id: "https://a.example/users/1#main-key".to_string(),
            algorithm: "rsa-sha256".to_string(),
            headers: vec![
                "(request-target)".to_string(),
                "host".to_string(),
                "date".to_string(),
            ],
            signature: "sig==".to_string(),
            created: None,
            expires: None,
        };
        assert!(!HttpVerifier::has_required_coverage(&sig));
    }

    #[test]
    fn test_coverage_accepts_created_instead_of_date() {
        let sig = HttpSignature {
            key_id: "https://a.example/users/1#main-key".to_string(),
            algorithm: "hs2019".to_string(),
            headers: vec![
                "(request-target)".to_string(),
                "(created)".to_string(),
                "host".to_string(),
                "digest".to_string(),
            ],
            signature: "sig==".to_string(),
            created: Some(1_700_000_000),
            expires: None,
        };
        assert!(HttpVerifier::has_required_coverage(&sig));
    }
}
