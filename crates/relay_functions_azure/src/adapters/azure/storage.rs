//! Blob Storage container client over the Blob REST API.
//!
//! Requests are authorized with Shared Key signing or a SAS token appended to
//! the query string. The endpoint comes from a template so the same client
//! works against `https://{account}.blob.core.windows.net` and path-style
//! emulator endpoints such as `http://127.0.0.1:10000/{account}`.

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use relay_functions_core::blob_names::container_endpoint;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Method, Response, StatusCode, Url};
use serde::Deserialize;

use super::signing::{
    rfc1123_now, shared_key_authorization, SharedKeyRequest, StorageCredential,
    STORAGE_API_VERSION,
};
use crate::adapters::blob_store::{
    BlobContainer, BlobProperties, LeaseDuration, LeaseId, LeaseState,
};
use crate::adapters::AdapterError;

const BLOB_PATH: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/');

const OCTET_STREAM: &str = "application/octet-stream";

#[derive(Debug, Clone)]
pub struct AzureBlobContainer {
    http: reqwest::Client,
    account: String,
    container: String,
    container_url: String,
    credential: StorageCredential,
}

struct BlobRequest<'a> {
    operation: &'static str,
    method: Method,
    blob: Option<&'a str>,
    query: &'a [(&'a str, &'a str)],
    headers: Vec<(&'static str, String)>,
    body: Option<Vec<u8>>,
}

impl AzureBlobContainer {
    pub fn new(
        http: reqwest::Client,
        endpoint_template: &str,
        account: &str,
        container: &str,
        credential: StorageCredential,
    ) -> Self {
        Self {
            http,
            account: account.to_string(),
            container: container.to_string(),
            container_url: container_endpoint(endpoint_template, account, container),
            credential,
        }
    }

    fn url(&self, blob: Option<&str>, query: &[(String, String)]) -> Result<Url, AdapterError> {
        let mut raw = self.container_url.clone();
        if let Some(blob) = blob {
            raw.push('/');
            raw.push_str(&utf8_percent_encode(blob, BLOB_PATH).to_string());
        }

        let mut url = Url::parse(&raw)
            .map_err(|error| AdapterError::InvalidState(format!("invalid blob url '{raw}': {error}")))?;
        if let StorageCredential::SasToken(token) = &self.credential {
            url.set_query(Some(token.as_str()));
        }
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in query {
                pairs.append_pair(name, value);
            }
        }
        Ok(url)
    }

    async fn send(&self, request: BlobRequest<'_>) -> Result<Response, AdapterError> {
        let query: Vec<(String, String)> = request
            .query
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        let url = self.url(request.blob, &query)?;

        let mut ms_headers = vec![
            ("x-ms-date".to_string(), rfc1123_now()),
            ("x-ms-version".to_string(), STORAGE_API_VERSION.to_string()),
        ];
        ms_headers.extend(
            request
                .headers
                .iter()
                .map(|(name, value)| (name.to_string(), value.clone())),
        );

        let body = request.body;
        let content_type = if body.as_ref().is_some_and(|bytes| !bytes.is_empty()) {
            OCTET_STREAM
        } else {
            ""
        };
        let content_length = body.as_ref().map_or(0, Vec::len);

        let mut builder = self.http.request(request.method.clone(), url.clone());
        for (name, value) in &ms_headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !content_type.is_empty() {
            builder = builder.header(CONTENT_TYPE, content_type);
        }

        if let StorageCredential::SharedKey { key } = &self.credential {
            let authorization = shared_key_authorization(
                key,
                &SharedKeyRequest {
                    method: request.method.as_str(),
                    content_length,
                    content_type,
                    ms_headers: &ms_headers,
                    account: &self.account,
                    path: url.path(),
                    query: &query,
                },
            )?;
            builder = builder.header(AUTHORIZATION, authorization);
        }

        if let Some(body) = body {
            builder = builder.header(CONTENT_LENGTH, body.len()).body(body);
        }

        builder
            .send()
            .await
            .map_err(AdapterError::transport(request.operation))
    }

    fn blob_request<'a>(operation: &'static str, method: Method, blob: &'a str) -> BlobRequest<'a> {
        BlobRequest {
            operation,
            method,
            blob: Some(blob),
            query: &[],
            headers: Vec::new(),
            body: None,
        }
    }
}

#[async_trait]
impl BlobContainer for AzureBlobContainer {
    fn container_name(&self) -> &str {
        &self.container
    }

    async fn create_if_not_exists(&self) -> Result<bool, AdapterError> {
        let response = self
            .send(BlobRequest {
                operation: "create container",
                method: Method::PUT,
                blob: None,
                query: &[("restype", "container")],
                headers: Vec::new(),
                body: Some(Vec::new()),
            })
            .await?;

        match response.status() {
            StatusCode::CREATED => Ok(true),
            StatusCode::CONFLICT if error_code(&response) == "ContainerAlreadyExists" => Ok(false),
            _ => Err(service_error("create container", response).await),
        }
    }

    async fn upload_blob(&self, blob: &str, body: Vec<u8>) -> Result<(), AdapterError> {
        let mut request = Self::blob_request("upload blob", Method::PUT, blob);
        request.headers.push(("x-ms-blob-type", "BlockBlob".to_string()));
        request.body = Some(body);

        let response = self.send(request).await?;
        expect_status("upload blob", response, StatusCode::CREATED).await?;
        Ok(())
    }

    async fn list_blob_names(&self) -> Result<Vec<String>, AdapterError> {
        let mut names = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let text = {
                let mut query = vec![("restype", "container"), ("comp", "list")];
                if let Some(marker) = marker.as_deref() {
                    query.push(("marker", marker));
                }

                let response = self
                    .send(BlobRequest {
                        operation: "list blobs",
                        method: Method::GET,
                        blob: None,
                        query: &query,
                        headers: Vec::new(),
                        body: None,
                    })
                    .await?;
                let response = expect_status("list blobs", response, StatusCode::OK).await?;
                response
                    .text()
                    .await
                    .map_err(AdapterError::transport("list blobs"))?
            };

            let page = parse_blob_listing(&text)?;
            names.extend(page.names);
            match page.next_marker {
                Some(next) => marker = Some(next),
                None => return Ok(names),
            }
        }
    }

    async fn blob_exists(&self, blob: &str) -> Result<bool, AdapterError> {
        let response = self
            .send(Self::blob_request("check blob", Method::HEAD, blob))
            .await?;
        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(service_error("check blob", response).await),
        }
    }

    async fn download_blob(&self, blob: &str) -> Result<Vec<u8>, AdapterError> {
        let response = self
            .send(Self::blob_request("download blob", Method::GET, blob))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(AdapterError::NotFound {
                operation: "download blob",
                target: blob.to_string(),
            });
        }

        let response = expect_status("download blob", response, StatusCode::OK).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(AdapterError::transport("download blob"))?;
        Ok(bytes.to_vec())
    }

    async fn blob_properties(&self, blob: &str) -> Result<BlobProperties, AdapterError> {
        let response = self
            .send(Self::blob_request("get blob properties", Method::HEAD, blob))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(AdapterError::NotFound {
                operation: "get blob properties",
                target: blob.to_string(),
            });
        }

        let response = expect_status("get blob properties", response, StatusCode::OK).await?;
        parse_properties(&response)
    }

    async fn acquire_lease(
        &self,
        blob: &str,
        duration: LeaseDuration,
    ) -> Result<LeaseId, AdapterError> {
        let mut request = Self::blob_request("acquire lease", Method::PUT, blob);
        request.query = &[("comp", "lease")];
        request.headers = vec![
            ("x-ms-lease-action", "acquire".to_string()),
            ("x-ms-lease-duration", duration.header_value()),
        ];
        request.body = Some(Vec::new());

        let response = self.send(request).await?;
        let response = expect_status("acquire lease", response, StatusCode::CREATED).await?;
        header_text(&response, "x-ms-lease-id")
            .map(LeaseId)
            .ok_or_else(|| AdapterError::decode("acquire lease", "missing x-ms-lease-id header"))
    }

    async fn break_lease(&self, blob: &str) -> Result<(), AdapterError> {
        let mut request = Self::blob_request("break lease", Method::PUT, blob);
        request.query = &[("comp", "lease")];
        request.headers = vec![
            ("x-ms-lease-action", "break".to_string()),
            ("x-ms-lease-break-period", "0".to_string()),
        ];
        request.body = Some(Vec::new());

        let response = self.send(request).await?;
        expect_status("break lease", response, StatusCode::ACCEPTED).await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct EnumerationResults {
    #[serde(rename = "Blobs", default)]
    blobs: BlobList,
    #[serde(rename = "NextMarker", default)]
    next_marker: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BlobList {
    #[serde(rename = "Blob", default)]
    items: Vec<BlobItem>,
}

#[derive(Debug, Deserialize)]
struct BlobItem {
    #[serde(rename = "Name")]
    name: String,
}

#[derive(Debug, PartialEq, Eq)]
struct ListingPage {
    names: Vec<String>,
    next_marker: Option<String>,
}

fn parse_blob_listing(text: &str) -> Result<ListingPage, AdapterError> {
    let results: EnumerationResults = quick_xml::de::from_str(text.trim_start_matches('\u{feff}'))
        .map_err(|error| AdapterError::decode("list blobs", error))?;

    Ok(ListingPage {
        names: results.blobs.items.into_iter().map(|item| item.name).collect(),
        next_marker: results
            .next_marker
            .map(|marker| marker.trim().to_string())
            .filter(|marker| !marker.is_empty()),
    })
}

fn parse_properties(response: &Response) -> Result<BlobProperties, AdapterError> {
    let content_length = match header_text(response, "content-length") {
        Some(raw) => raw
            .parse::<u64>()
            .map_err(|error| AdapterError::decode("get blob properties", error))?,
        None => 0,
    };

    let lease_state = match header_text(response, "x-ms-lease-state") {
        Some(raw) => LeaseState::parse(&raw).ok_or_else(|| {
            AdapterError::decode("get blob properties", format!("unknown lease state '{raw}'"))
        })?,
        None => LeaseState::Available,
    };

    Ok(BlobProperties {
        content_length,
        lease_state,
        copy_status: header_text(response, "x-ms-copy-status"),
        copy_progress: header_text(response, "x-ms-copy-progress"),
        copy_completed_on: header_text(response, "x-ms-copy-completion-time"),
    })
}

fn header_text(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn error_code(response: &Response) -> String {
    header_text(response, "x-ms-error-code").unwrap_or_else(|| "Unknown".to_string())
}

async fn expect_status(
    operation: &'static str,
    response: Response,
    expected: StatusCode,
) -> Result<Response, AdapterError> {
    if response.status() == expected {
        Ok(response)
    } else {
        Err(service_error(operation, response).await)
    }
}

async fn service_error(operation: &'static str, response: Response) -> AdapterError {
    let status = response.status();
    let code = error_code(&response);
    let body = response.text().await.unwrap_or_default();
    let message = if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("no response body").to_string()
    } else {
        body.trim().to_string()
    };

    AdapterError::Service {
        operation,
        status: status.as_u16(),
        code,
        message,
    }
}
