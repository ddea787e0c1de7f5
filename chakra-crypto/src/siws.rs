//! Sign-In With Solana (SIWS) messages.
//!
//! The wallet signs the exact UTF-8 bytes produced by [`build_siws_message`],
//! and the decryption policy rebuilds those bytes from the structured input
//! before checking the signature. The two sides must agree byte-for-byte, so
//! the layout below is fixed:
//!
//! ```text
//! {domain} wants you to sign in with your Solana account:
//! {address}
//!
//! {statement}
//!
//! URI: {uri}
//! Version: {version}
//! Chain ID: {chainId}
//! Nonce: {nonce}
//! Issued At: {issuedAt}
//! Expiration Time: {expirationTime}
//! Not Before: {notBefore}
//! Request ID: {requestId}
//! Resources:
//! - {resource}
//! ```
//!
//! Absent fields are dropped entirely; the statement block and the field
//! block each appear only when non-empty.

use crate::error::{CryptoError, CryptoResult};
use chrono::{DateTime, Duration, Utc};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

const HEADER_SUFFIX: &str = " wants you to sign in with your Solana account:";
const RESOURCES_LINE: &str = "Resources:";
const RESOURCE_PREFIX: &str = "- ";

/// Structured sign-in request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiwsInput {
    pub domain: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Vec<String>>,
}

impl SiwsInput {
    /// `issuedAt` as a UTC instant, if present and parseable.
    pub fn issued_at_utc(&self) -> Option<DateTime<Utc>> {
        self.issued_at.as_deref().and_then(parse_timestamp)
    }

    /// `expirationTime` as a UTC instant, if present and parseable.
    pub fn expiration_time_utc(&self) -> Option<DateTime<Utc>> {
        self.expiration_time.as_deref().and_then(parse_timestamp)
    }

    /// Canonical message text for this input.
    pub fn message(&self) -> String {
        build_siws_message(self)
    }
}

/// Signed sign-in proof handed to the decryption policy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiwsObject {
    pub siws_input: SiwsInput,
    /// Base58 ed25519 signature over the canonical message.
    pub signature: String,
}

/// Labelled fields of the trailing block, in their fixed order.
#[derive(Clone, Copy)]
enum Field {
    Uri,
    Version,
    ChainId,
    Nonce,
    IssuedAt,
    ExpirationTime,
    NotBefore,
    RequestId,
}

const FIELDS: [(Field, &str); 8] = [
    (Field::Uri, "URI: "),
    (Field::Version, "Version: "),
    (Field::ChainId, "Chain ID: "),
    (Field::Nonce, "Nonce: "),
    (Field::IssuedAt, "Issued At: "),
    (Field::ExpirationTime, "Expiration Time: "),
    (Field::NotBefore, "Not Before: "),
    (Field::RequestId, "Request ID: "),
];

impl Field {
    fn get(self, input: &SiwsInput) -> Option<&str> {
        match self {
            Field::Uri => input.uri.as_deref(),
            Field::Version => input.version.as_deref(),
            Field::ChainId => input.chain_id.as_deref(),
            Field::Nonce => input.nonce.as_deref(),
            Field::IssuedAt => input.issued_at.as_deref(),
            Field::ExpirationTime => input.expiration_time.as_deref(),
            Field::NotBefore => input.not_before.as_deref(),
            Field::RequestId => input.request_id.as_deref(),
        }
    }

    fn slot(self, input: &mut SiwsInput) -> &mut Option<String> {
        match self {
            Field::Uri => &mut input.uri,
            Field::Version => &mut input.version,
            Field::ChainId => &mut input.chain_id,
            Field::Nonce => &mut input.nonce,
            Field::IssuedAt => &mut input.issued_at,
            Field::ExpirationTime => &mut input.expiration_time,
            Field::NotBefore => &mut input.not_before,
            Field::RequestId => &mut input.request_id,
        }
    }
}

/// Builds the canonical message text that the wallet signs.
pub fn build_siws_message(input: &SiwsInput) -> String {
    let mut message = format!("{}{HEADER_SUFFIX}\n{}", input.domain, input.address);

    if let Some(statement) = input.statement.as_deref().filter(|s| !s.is_empty()) {
        message.push_str("\n\n");
        message.push_str(statement);
    }

    let mut fields: Vec<String> = FIELDS
        .iter()
        .filter_map(|(field, label)| field.get(input).map(|value| format!("{label}{value}")))
        .collect();

    if let Some(resources) = input.resources.as_ref().filter(|r| !r.is_empty()) {
        fields.push(RESOURCES_LINE.to_string());
        fields.extend(resources.iter().map(|r| format!("{RESOURCE_PREFIX}{r}")));
    }

    if !fields.is_empty() {
        message.push_str("\n\n");
        message.push_str(&fields.join("\n"));
    }

    message
}

/// Parses canonical message bytes back into a [`SiwsInput`].
///
/// The statement may itself contain newlines or text that looks like a
/// field line, so its extent is ambiguous. Like the wallet-standard parser,
/// the body is first read as a bare field block; failing that, the statement
/// is the shortest run of lines followed by a blank line and a valid field
/// block, or the whole body.
///
/// Returns `None` for non-UTF-8 bytes, a missing header, or a body that is
/// not separated from the address by a blank line.
pub fn parse_siws_message(bytes: &[u8]) -> Option<SiwsInput> {
    let text = std::str::from_utf8(bytes).ok()?;
    let mut lines = text.split('\n');

    let domain = lines.next()?.strip_suffix(HEADER_SUFFIX)?;
    let address = lines.next()?;
    if domain.is_empty() || address.is_empty() {
        return None;
    }

    let base = SiwsInput {
        domain: domain.to_string(),
        address: address.to_string(),
        ..Default::default()
    };

    let rest: Vec<&str> = lines.collect();
    let Some((separator, body)) = rest.split_first() else {
        return Some(base);
    };
    if !separator.is_empty() || body.is_empty() {
        return None;
    }

    if let Some(input) = parse_field_block(base.clone(), body) {
        return Some(input);
    }

    for end in 1..=body.len() {
        let statement = body[..end].join("\n");
        if statement.is_empty() {
            continue;
        }
        let candidate = SiwsInput {
            statement: Some(statement),
            ..base.clone()
        };
        if end == body.len() {
            return Some(candidate);
        }
        if body[end].is_empty() {
            if let Some(input) = parse_field_block(candidate, &body[end + 1..]) {
                return Some(input);
            }
        }
    }

    None
}

/// Reads labelled fields in their fixed order, then optional resources.
fn parse_field_block(mut input: SiwsInput, lines: &[&str]) -> Option<SiwsInput> {
    if lines.is_empty() {
        return None;
    }

    let mut next_field = 0;
    for (idx, line) in lines.iter().enumerate() {
        if *line == RESOURCES_LINE {
            let entries = &lines[idx + 1..];
            // An empty list is never written, so a bare header is not a field.
            if entries.is_empty() {
                return None;
            }
            let mut resources = Vec::with_capacity(entries.len());
            for entry in entries {
                let resource = entry.strip_prefix(RESOURCE_PREFIX)?;
                if resource.is_empty() {
                    return None;
                }
                resources.push(resource.to_string());
            }
            input.resources = Some(resources);
            return Some(input);
        }

        let (offset, value) = FIELDS[next_field..]
            .iter()
            .enumerate()
            .find_map(|(i, (_, label))| line.strip_prefix(label).map(|v| (i, v)))?;
        if value.is_empty() {
            return None;
        }
        let field = FIELDS[next_field + offset].0;
        *field.slot(&mut input) = Some(value.to_string());
        next_field += offset + 1;
    }

    Some(input)
}

/// Decodes a base58 string (surrounding whitespace is ignored).
pub fn decode_base58(input: &str) -> CryptoResult<Vec<u8>> {
    bs58::decode(input.trim())
        .into_vec()
        .map_err(|e| CryptoError::Base58(e.to_string()))
}

/// Checks an ed25519 signature over the UTF-8 bytes of `message`.
///
/// Returns `Ok(false)` when the signature does not verify. Returns `Err` only
/// when an input is not valid base58 or the public key cannot be imported;
/// callers treat both outcomes as "signature invalid".
pub fn verify_siws_signature(
    message: &str,
    signature_b58: &str,
    public_key_b58: &str,
) -> CryptoResult<bool> {
    let signature_bytes = decode_base58(signature_b58)?;
    let public_key_bytes = decode_base58(public_key_b58)?;

    let key: [u8; 32] = public_key_bytes.as_slice().try_into().map_err(|_| {
        CryptoError::InvalidPublicKey(format!(
            "ed25519 public key must be 32 bytes, got {}",
            public_key_bytes.len()
        ))
    })?;
    let verifying_key =
        VerifyingKey::from_bytes(&key).map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;

    let Ok(signature) = Signature::from_slice(&signature_bytes) else {
        return Ok(false);
    };

    Ok(verifying_key.verify(message.as_bytes(), &signature).is_ok())
}

/// Parses an ISO-8601 / RFC 3339 timestamp.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Formats an instant the way browsers render `Date.toISOString()`.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Why a cached sign-in proof must be replaced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StaleReason {
    /// The cached message bytes no longer parse.
    Unparsable,
    /// The message carries no `issuedAt`.
    MissingIssuedAt,
    /// Signed longer ago than the rolling freshness window.
    OutsideFreshnessWindow,
    /// Signed before the cutoff that retired an older statement wording.
    BeforeCutoff,
}

/// Sign-in proof as persisted in client storage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSiwsObject {
    pub b58_sign_in_message: String,
    pub b58_signature: String,
}

impl StoredSiwsObject {
    pub fn new(message: &[u8], signature: &[u8]) -> Self {
        Self {
            b58_sign_in_message: bs58::encode(message).into_string(),
            b58_signature: bs58::encode(signature).into_string(),
        }
    }

    pub fn message_bytes(&self) -> CryptoResult<Vec<u8>> {
        decode_base58(&self.b58_sign_in_message)
    }

    /// Parses the stored message back into structured form.
    pub fn parse_input(&self) -> Option<SiwsInput> {
        let bytes = self.message_bytes().ok()?;
        parse_siws_message(&bytes)
    }

    /// Rebuilds the `{siwsInput, signature}` object sent to the policy.
    pub fn to_siws_object(&self) -> Option<SiwsObject> {
        Some(SiwsObject {
            siws_input: self.parse_input()?,
            signature: self.b58_signature.clone(),
        })
    }

    /// Returns the first reason this proof must be re-signed, if any.
    ///
    /// The rolling window and the fixed cutoff are independent: a message
    /// replayed from before the cutoff is stale even when it is younger than
    /// the window.
    pub fn staleness(
        &self,
        now: DateTime<Utc>,
        freshness_window: Duration,
        cutoff: DateTime<Utc>,
    ) -> Option<StaleReason> {
        let Some(input) = self.parse_input() else {
            return Some(StaleReason::Unparsable);
        };
        let Some(issued_at) = input.issued_at_utc() else {
            return Some(StaleReason::MissingIssuedAt);
        };
        if issued_at < now - freshness_window {
            return Some(StaleReason::OutsideFreshnessWindow);
        }
        if issued_at < cutoff {
            return Some(StaleReason::BeforeCutoff);
        }
        None
    }
}
