use crate::contract::ValidationError;

/// Parsed Event Hubs namespace connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventHubConnection {
    pub host: String,
    pub key_name: String,
    pub key: String,
    pub entity_path: Option<String>,
}

impl EventHubConnection {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let mut endpoint = None;
        let mut key_name = None;
        let mut key = None;
        let mut entity_path = None;

        for part in raw.split(';').map(str::trim).filter(|part| !part.is_empty()) {
            let Some((name, value)) = part.split_once('=') else {
                return Err(ValidationError::new(format!(
                    "Connection string segment '{part}' is not key=value"
                )));
            };
            match name.to_ascii_lowercase().as_str() {
                "endpoint" => endpoint = Some(value.to_string()),
                "sharedaccesskeyname" => key_name = Some(value.to_string()),
                "sharedaccesskey" => key = Some(value.to_string()),
                "entitypath" => entity_path = Some(value.to_string()),
                _ => {}
            }
        }

        let endpoint =
            endpoint.ok_or_else(|| ValidationError::new("Connection string is missing Endpoint"))?;
        let host = endpoint
            .trim_start_matches("sb://")
            .trim_start_matches("https://")
            .trim_end_matches('/')
            .to_string();
        if host.is_empty() {
            return Err(ValidationError::new("Connection string Endpoint is empty"));
        }

        Ok(Self {
            host,
            key_name: key_name.ok_or_else(|| {
                ValidationError::new("Connection string is missing SharedAccessKeyName")
            })?,
            key: key
                .ok_or_else(|| ValidationError::new("Connection string is missing SharedAccessKey"))?,
            entity_path: entity_path.filter(|value| !value.is_empty()),
        })
    }

    /// An explicit hub name wins over the connection string's `EntityPath`.
    pub fn resolve_hub(&self, explicit: Option<&str>) -> Result<String, ValidationError> {
        match explicit.map(str::trim).filter(|value| !value.is_empty()) {
            Some(name) => Ok(name.to_string()),
            None => self.entity_path.clone().ok_or_else(|| {
                ValidationError::new("Event hub name is neither configured nor in EntityPath")
            }),
        }
    }

    pub fn https_endpoint(&self) -> String {
        format!("https://{}", self.host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Endpoint=sb://relay-ns.servicebus.windows.net/;SharedAccessKeyName=send;SharedAccessKey=c2VjcmV0PT0=;EntityPath=audit";

    #[test]
    fn parses_namespace_connection_string() {
        let connection = EventHubConnection::parse(SAMPLE).expect("connection should parse");
        assert_eq!(connection.host, "relay-ns.servicebus.windows.net");
        assert_eq!(connection.key_name, "send");
        assert_eq!(connection.key, "c2VjcmV0PT0=");
        assert_eq!(connection.entity_path.as_deref(), Some("audit"));
        assert_eq!(
            connection.https_endpoint(),
            "https://relay-ns.servicebus.windows.net"
        );
    }

    #[test]
    fn explicit_hub_name_overrides_entity_path() {
        let connection = EventHubConnection::parse(SAMPLE).expect("connection should parse");
        assert_eq!(
            connection.resolve_hub(Some("other")).expect("hub should resolve"),
            "other"
        );
        assert_eq!(
            connection.resolve_hub(None).expect("hub should resolve"),
            "audit"
        );
    }

    #[test]
    fn missing_key_is_reported() {
        let error = EventHubConnection::parse(
            "Endpoint=sb://relay-ns.servicebus.windows.net/;SharedAccessKeyName=send",
        )
        .expect_err("missing key should fail");
        assert_eq!(error.message(), "Connection string is missing SharedAccessKey");
    }

    #[test]
    fn hub_name_is_required_somewhere() {
        let connection = EventHubConnection::parse(
            "Endpoint=sb://relay-ns.servicebus.windows.net/;SharedAccessKeyName=send;SharedAccessKey=abc",
        )
        .expect("connection should parse");
        assert!(connection.resolve_hub(Some("  ")).is_err());
    }
}
