//! Linked-Data Signatures (`RsaSignature2017`).
//!
//! The signature block travels inside the payload itself, so it survives
//! relaying: the options block (minus the signature value) and the
//! document (minus the whole signature block) are canonicalized and
//! hashed separately, the hashes are concatenated, and the result is
//! RSA-SHA256 signed.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{SecondsFormat, Utc};
use rsa::{
    pkcs1v15::{Signature, SigningKey, VerifyingKey},
    sha2::Sha256,
    signature::{SignatureEncoding, Signer, Verifier},
};
use serde_json::{Value, json};
use sha2::{Digest, Sha256 as Sha256Hasher};
use sparrow_common::crypto::{parse_private_key, parse_public_key};
use sparrow_common::{AppError, AppResult};

use crate::jsonld::{DateHandling, canonicalize};

/// The only LD signature suite this server understands.
pub const SIGNATURE_TYPE: &str = "RsaSignature2017";

const IDENTITY_CONTEXT: &str = "https://w3id.org/identity/v1";

/// The key id (`creator`) named by a document's embedded signature.
#[must_use]
pub fn creator_key_id(document: &Value) -> Option<&str> {
    document
        .get("signature")?
        .get("creator")
        .and_then(Value::as_str)
}

/// Attach an `RsaSignature2017` block to an outbound document.
pub fn attach_signature(
    document: &mut Value,
    creator: &str,
    private_key_pem: &str,
) -> AppResult<()> {
    let obj = document
        .as_object_mut()
        .ok_or_else(|| AppError::Federation("cannot LD-sign a non-object payload".to_string()))?;
    obj.remove("signature");

    let mut options = json!({
        "@context": IDENTITY_CONTEXT,
        "type": SIGNATURE_TYPE,
        "creator": creator,
        "created": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    });

    let to_sign = signing_input(&options, document, DateHandling::Strict);
    let private_key = parse_private_key(private_key_pem)?;
    let signing_key = SigningKey::<Sha256>::new(private_key);
    let signature = signing_key.sign(&to_sign);

    if let Some(options_obj) = options.as_object_mut() {
        options_obj.remove("@context");
        options_obj.insert(
            "signatureValue".to_string(),
            Value::String(BASE64.encode(signature.to_bytes())),
        );
    }
    if let Some(obj) = document.as_object_mut() {
        obj.insert("signature".to_string(), options);
    }
    Ok(())
}

/// Verify a document's embedded signature against a public key.
///
/// Canonicalization is strict first, hashing the payload exactly as
/// received. If that fails, one lenient pass reformats date terms
/// before hashing, which recovers signatures on documents whose
/// timestamps were reserialized in transit.
pub fn verify_signature(document: &Value, public_key_pem: &str) -> AppResult<bool> {
    let Some(signature_block) = document.get("signature") else {
        return Ok(false);
    };
    let suite = signature_block.get("type").and_then(Value::as_str);
    if suite != Some(SIGNATURE_TYPE) {
        tracing::debug!(suite = ?suite, "unsupported LD signature suite");
        return Ok(false);
    }
    let Some(signature_value) = signature_block.get("signatureValue").and_then(Value::as_str)
    else {
        return Ok(false);
    };

    // Rebuild the two signing inputs: options without the signature
    // value, document without the signature block.
    let mut options = signature_block.clone();
    if let Some(options_obj) = options.as_object_mut() {
        options_obj.remove("signatureValue");
        options_obj.remove("id");
        options_obj.insert(
            "@context".to_string(),
            Value::String(IDENTITY_CONTEXT.to_string()),
        );
    }
    let mut stripped = document.clone();
    if let Some(obj) = stripped.as_object_mut() {
        obj.remove("signature");
    }

    let sig_bytes = BASE64
        .decode(signature_value)
        .map_err(|e| AppError::BadRequest(format!("invalid LD signature encoding: {e}")))?;
    let signature = Signature::try_from(sig_bytes.as_slice())
        .map_err(|e| AppError::BadRequest(format!("invalid LD signature format: {e}")))?;

    let verifying_key = VerifyingKey::<Sha256>::new(parse_public_key(public_key_pem)?);
    let to_verify = signing_input(&options, &stripped, DateHandling::Strict);
    if verifying_key.verify(&to_verify, &signature).is_ok() {
        return Ok(true);
    }
    let to_verify = signing_input(&options, &stripped, DateHandling::Lenient);
    Ok(verifying_key.verify(&to_verify, &signature).is_ok())
}

/// sha256(options) || sha256(document), each over canonical form.
fn signing_input(options: &Value, document: &Value, dates: DateHandling) -> Vec<u8> {
    let options_hash = Sha256Hasher::digest(canonicalize(options, dates).as_bytes());
    let document_hash = Sha256Hasher::digest(canonicalize(document, dates).as_bytes());

    let mut input = Vec::with_capacity(64);
    input.extend_from_slice(&options_hash);
    input.extend_from_slice(&document_hash);
    input
}
