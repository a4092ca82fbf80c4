use async_trait::async_trait;

use super::AdapterError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseState {
    Available,
    Leased,
    Expired,
    Breaking,
    Broken,
}

impl LeaseState {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "available" => Some(Self::Available),
            "leased" => Some(Self::Leased),
            "expired" => Some(Self::Expired),
            "breaking" => Some(Self::Breaking),
            "broken" => Some(Self::Broken),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Leased => "leased",
            Self::Expired => "expired",
            Self::Breaking => "breaking",
            Self::Broken => "broken",
        }
    }
}

impl std::fmt::Display for LeaseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseDuration {
    Infinite,
    Seconds(u32),
}

impl LeaseDuration {
    pub fn header_value(self) -> String {
        match self {
            Self::Infinite => "-1".to_string(),
            Self::Seconds(seconds) => seconds.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseId(pub String);

impl std::fmt::Display for LeaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Subset of blob properties the copy sequence inspects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobProperties {
    pub content_length: u64,
    pub lease_state: LeaseState,
    pub copy_status: Option<String>,
    pub copy_progress: Option<String>,
    pub copy_completed_on: Option<String>,
}

impl BlobProperties {
    pub fn unleased(content_length: u64) -> Self {
        Self {
            content_length,
            lease_state: LeaseState::Available,
            copy_status: None,
            copy_progress: None,
            copy_completed_on: None,
        }
    }
}

/// One blob container, including lease operations on the blobs inside it.
#[async_trait]
pub trait BlobContainer: Send + Sync {
    fn container_name(&self) -> &str;

    /// Returns `true` when the container was created by this call.
    async fn create_if_not_exists(&self) -> Result<bool, AdapterError>;

    async fn upload_blob(&self, blob: &str, body: Vec<u8>) -> Result<(), AdapterError>;

    /// Blob names in service listing order.
    async fn list_blob_names(&self) -> Result<Vec<String>, AdapterError>;

    async fn blob_exists(&self, blob: &str) -> Result<bool, AdapterError>;

    async fn download_blob(&self, blob: &str) -> Result<Vec<u8>, AdapterError>;

    async fn blob_properties(&self, blob: &str) -> Result<BlobProperties, AdapterError>;

    async fn acquire_lease(
        &self,
        blob: &str,
        duration: LeaseDuration,
    ) -> Result<LeaseId, AdapterError>;

    /// Breaks the current lease immediately (zero break period).
    async fn break_lease(&self, blob: &str) -> Result<(), AdapterError>;
}
