use serde_json::Value;
use sha2::{Digest, Sha256};

pub const COPY_COMPLETED_MESSAGE: &str = "Completed";
pub const GENERIC_GREETING: &str = "This HTTP triggered function executed successfully. Pass a name in the query string or in the request body for a personalized response.";

/// Query string pairs and raw body of one forwarded HTTP invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionRequest {
    pub query: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl FunctionRequest {
    pub fn new(query: Vec<(String, String)>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            query,
            body: body.into(),
        }
    }

    /// Looks a field up in the query string first, then in the JSON body.
    ///
    /// A query parameter wins even when it is empty. An empty or whitespace
    /// body is treated as absent; any other body must be valid JSON.
    pub fn field(&self, key: &str) -> Result<Option<String>, ValidationError> {
        if let Some((_, value)) = self.query.iter().find(|(name, _)| name == key) {
            return Ok(Some(value.clone()));
        }

        let text = std::str::from_utf8(&self.body)
            .map_err(|error| ValidationError::new(format!("Request body is not UTF-8: {error}")))?;
        if text.trim().is_empty() {
            return Ok(None);
        }

        let payload: Value = serde_json::from_str(text)
            .map_err(|error| ValidationError::new(format!("Malformed JSON body: {error}")))?;

        Ok(match payload.get(key) {
            None | Some(Value::Null) => None,
            Some(Value::String(value)) => Some(value.clone()),
            Some(other) => Some(other.to_string()),
        })
    }
}

/// How the copy sequence picks the blob it leases and duplicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSelection {
    JustUploaded,
    Named(String),
    FirstListed,
}

impl SourceSelection {
    pub fn parse_mode(raw: &str) -> Result<Self, ValidationError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "just-uploaded" | "just_uploaded" => Ok(Self::JustUploaded),
            "first-listed" | "first_listed" => Ok(Self::FirstListed),
            _ => Err(ValidationError::new(format!(
                "Unsupported source selection '{raw}' (expected just-uploaded or first-listed)"
            ))),
        }
    }

    /// A `blob` field on the request overrides the configured mode.
    pub fn for_request(
        request: &FunctionRequest,
        configured: &SourceSelection,
    ) -> Result<Self, ValidationError> {
        match request.field("blob")? {
            Some(name) if !name.trim().is_empty() => Ok(Self::Named(name.trim().to_string())),
            _ => Ok(configured.clone()),
        }
    }
}

pub fn greeting_message(name: Option<&str>) -> String {
    match name {
        Some(name) if !name.is_empty() => {
            format!("Hello, {name}. This HTTP triggered function executed successfully.")
        }
        _ => GENERIC_GREETING.to_string(),
    }
}

pub fn content_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn query_name_takes_precedence_over_body() {
        let request = FunctionRequest::new(query(&[("name", "Ada")]), r#"{"name":"Grace"}"#);
        let name = request.field("name").expect("field should resolve");
        assert_eq!(name.as_deref(), Some("Ada"));
    }

    #[test]
    fn body_name_is_used_without_query() {
        let request = FunctionRequest::new(Vec::new(), r#"{"name":"Grace"}"#);
        let name = request.field("name").expect("field should resolve");
        assert_eq!(name.as_deref(), Some("Grace"));
    }

    #[test]
    fn empty_body_means_no_name() {
        let request = FunctionRequest::new(Vec::new(), "  \n");
        assert_eq!(request.field("name").expect("field should resolve"), None);
    }

    #[test]
    fn null_body_name_means_no_name() {
        let request = FunctionRequest::new(Vec::new(), r#"{"name":null}"#);
        assert_eq!(request.field("name").expect("field should resolve"), None);
    }

    #[test]
    fn malformed_body_is_rejected() {
        let request = FunctionRequest::new(Vec::new(), "{name:");
        let error = request.field("name").expect_err("malformed body should fail");
        assert!(error.message().starts_with("Malformed JSON body"));
    }

    #[test]
    fn greeting_contains_exactly_the_given_name() {
        let message = greeting_message(Some("Ada Lovelace"));
        assert_eq!(
            message,
            "Hello, Ada Lovelace. This HTTP triggered function executed successfully."
        );
    }

    #[test]
    fn greeting_without_name_is_generic() {
        assert_eq!(greeting_message(None), GENERIC_GREETING);
        assert_eq!(greeting_message(Some("")), GENERIC_GREETING);
    }

    #[test]
    fn blob_field_overrides_configured_selection() {
        let request = FunctionRequest::new(query(&[("blob", "report.log")]), Vec::new());
        let selection = SourceSelection::for_request(&request, &SourceSelection::FirstListed)
            .expect("selection should resolve");
        assert_eq!(selection, SourceSelection::Named("report.log".to_string()));

        let bare = FunctionRequest::default();
        let selection = SourceSelection::for_request(&bare, &SourceSelection::FirstListed)
            .expect("selection should resolve");
        assert_eq!(selection, SourceSelection::FirstListed);
    }

    #[test]
    fn parses_selection_modes() {
        assert_eq!(
            SourceSelection::parse_mode("first-listed").expect("mode should parse"),
            SourceSelection::FirstListed
        );
        assert_eq!(
            SourceSelection::parse_mode("").expect("mode should parse"),
            SourceSelection::JustUploaded
        );
        assert!(SourceSelection::parse_mode("newest").is_err());
    }

    #[test]
    fn digest_is_hex_sha256() {
        assert_eq!(
            content_digest(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
