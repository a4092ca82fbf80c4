//! Shared Key request signing for Blob Storage and SAS tokens for Event Hubs.
//!
//! Shared Key string-to-sign (service version 2015-02-21 and later):
//! ```text
//! VERB\n
//! Content-Encoding\n
//! Content-Language\n
//! Content-Length\n        (empty when zero)
//! Content-MD5\n
//! Content-Type\n
//! Date\n                  (empty, x-ms-date is sent instead)
//! If-Modified-Since\n
//! If-Match\n
//! If-None-Match\n
//! If-Unmodified-Since\n
//! Range\n
//! CanonicalizedHeaders\n
//! CanonicalizedResource
//! ```

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::Sha256;

use crate::adapters::AdapterError;

type HmacSha256 = Hmac<Sha256>;

pub const STORAGE_API_VERSION: &str = "2023-11-03";

/// Unreserved characters stay literal; everything else is percent-encoded.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

#[derive(Clone)]
pub enum StorageCredential {
    SharedKey { key: Vec<u8> },
    SasToken(String),
}

impl StorageCredential {
    pub fn shared_key(base64_key: &str) -> Result<Self, AdapterError> {
        let key = BASE64_STANDARD.decode(base64_key.trim()).map_err(|error| {
            AdapterError::Credential(format!("storage account key is not valid base64: {error}"))
        })?;
        Ok(Self::SharedKey { key })
    }

    pub fn sas_token(token: &str) -> Self {
        Self::SasToken(token.trim().trim_start_matches('?').to_string())
    }
}

impl std::fmt::Debug for StorageCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SharedKey { .. } => f.write_str("SharedKey(<redacted>)"),
            Self::SasToken(_) => f.write_str("SasToken(<redacted>)"),
        }
    }
}

pub struct SharedKeyRequest<'a> {
    pub method: &'a str,
    pub content_length: usize,
    pub content_type: &'a str,
    pub ms_headers: &'a [(String, String)],
    pub account: &'a str,
    /// Encoded URI path, starting with `/`.
    pub path: &'a str,
    pub query: &'a [(String, String)],
}

pub fn shared_key_string_to_sign(request: &SharedKeyRequest<'_>) -> String {
    let content_length = match request.content_length {
        0 => String::new(),
        length => length.to_string(),
    };

    let mut headers: Vec<(String, String)> = request
        .ms_headers
        .iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value.trim().to_string()))
        .filter(|(name, _)| name.starts_with("x-ms-"))
        .collect();
    headers.sort_by(|left, right| left.0.cmp(&right.0));
    let canonicalized_headers = headers
        .iter()
        .map(|(name, value)| format!("{name}:{value}"))
        .collect::<Vec<_>>()
        .join("\n");

    let mut canonicalized_resource = format!("/{}{}", request.account, request.path);
    let mut params: Vec<(String, String)> = request
        .query
        .iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value.clone()))
        .collect();
    params.sort_by(|left, right| left.0.cmp(&right.0));
    for (name, value) in params {
        canonicalized_resource.push_str(&format!("\n{name}:{value}"));
    }

    format!(
        "{}\n\n\n{}\n\n{}\n\n\n\n\n\n\n{}\n{}",
        request.method,
        content_length,
        request.content_type,
        canonicalized_headers,
        canonicalized_resource
    )
}

pub fn shared_key_authorization(
    key: &[u8],
    request: &SharedKeyRequest<'_>,
) -> Result<String, AdapterError> {
    let signature = hmac_base64(key, &shared_key_string_to_sign(request))?;
    Ok(format!("SharedKey {}:{signature}", request.account))
}

/// `SharedAccessSignature` token for an Event Hubs resource URI.
///
/// The key is used as its literal UTF-8 bytes, not base64-decoded.
pub fn event_hubs_sas_token(
    resource_uri: &str,
    key_name: &str,
    key: &str,
    expiry_unix_seconds: i64,
) -> Result<String, AdapterError> {
    let encoded_uri =
        utf8_percent_encode(&resource_uri.to_ascii_lowercase(), URI_COMPONENT).to_string();
    let signature = hmac_base64(
        key.as_bytes(),
        &format!("{encoded_uri}\n{expiry_unix_seconds}"),
    )?;
    let encoded_signature = utf8_percent_encode(&signature, URI_COMPONENT).to_string();
    Ok(format!(
        "SharedAccessSignature sr={encoded_uri}&sig={encoded_signature}&se={expiry_unix_seconds}&skn={key_name}"
    ))
}

/// RFC 1123 timestamp for the `x-ms-date` header.
pub fn rfc1123_now() -> String {
    chrono::Utc::now()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

fn hmac_base64(key: &[u8], message: &str) -> Result<String, AdapterError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|error| AdapterError::Credential(format!("HMAC key error: {error}")))?;
    mac.update(message.as_bytes());
    Ok(BASE64_STANDARD.encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers() -> Vec<(String, String)> {
        vec![
            (
                "x-ms-version".to_string(),
                STORAGE_API_VERSION.to_string(),
            ),
            (
                "x-ms-date".to_string(),
                "Fri, 01 Mar 2024 10:00:00 GMT".to_string(),
            ),
        ]
    }

    #[test]
    fn string_to_sign_for_listing_has_sorted_headers_and_params() {
        let headers = headers();
        let query = vec![
            ("restype".to_string(), "container".to_string()),
            ("comp".to_string(), "list".to_string()),
        ];
        let request = SharedKeyRequest {
            method: "GET",
            content_length: 0,
            content_type: "",
            ms_headers: &headers,
            account: "sadevdmz001",
            path: "/test1",
            query: &query,
        };

        assert_eq!(
            shared_key_string_to_sign(&request),
            "GET\n\n\n\n\n\n\n\n\n\n\n\nx-ms-date:Fri, 01 Mar 2024 10:00:00 GMT\nx-ms-version:2023-11-03\n/sadevdmz001/test1\ncomp:list\nrestype:container"
        );
    }

    #[test]
    fn string_to_sign_for_upload_includes_length_and_type() {
        let headers = headers();
        let request = SharedKeyRequest {
            method: "PUT",
            content_length: 21,
            content_type: "application/octet-stream",
            ms_headers: &headers,
            account: "acct",
            path: "/test1/mylogfile101010.log",
            query: &[],
        };

        let string_to_sign = shared_key_string_to_sign(&request);
        assert!(string_to_sign.starts_with("PUT\n\n\n21\n\napplication/octet-stream\n"));
        assert!(string_to_sign.ends_with("\n/acct/test1/mylogfile101010.log"));
    }

    #[test]
    fn authorization_header_names_account() {
        let headers = headers();
        let request = SharedKeyRequest {
            method: "HEAD",
            content_length: 0,
            content_type: "",
            ms_headers: &headers,
            account: "acct",
            path: "/test1/blob.log",
            query: &[],
        };
        let header =
            shared_key_authorization(b"secret-key", &request).expect("signing should succeed");
        let signature = header
            .strip_prefix("SharedKey acct:")
            .expect("header should name the account");
        assert_eq!(
            BASE64_STANDARD
                .decode(signature)
                .expect("signature should be base64")
                .len(),
            32
        );
    }

    #[test]
    fn rejects_non_base64_account_key() {
        let error = StorageCredential::shared_key("not base64!").expect_err("key should fail");
        assert!(error.to_string().contains("not valid base64"));
    }

    #[test]
    fn sas_token_encodes_resource_and_expiry() {
        let token = event_hubs_sas_token(
            "https://relay-ns.servicebus.windows.net/audit",
            "send",
            "key",
            1_700_000_000,
        )
        .expect("token should build");

        assert!(token.starts_with(
            "SharedAccessSignature sr=https%3A%2F%2Frelay-ns.servicebus.windows.net%2Faudit&sig="
        ));
        assert!(token.ends_with("&se=1700000000&skn=send"));

        let again = event_hubs_sas_token(
            "https://relay-ns.servicebus.windows.net/audit",
            "send",
            "key",
            1_700_000_000,
        )
        .expect("token should build");
        assert_eq!(token, again);
    }

    #[test]
    fn credential_debug_hides_secrets() {
        let credential = StorageCredential::sas_token("?sv=2020&sig=abc");
        assert_eq!(format!("{credential:?}"), "SasToken(<redacted>)");
    }
}
