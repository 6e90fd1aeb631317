//! Cosmos DB Document Store
//!
//! Talks to the Cosmos DB SQL API over REST using master-key authorization.
//! Every request is signed with HMAC-SHA256 over verb, resource type,
//! resource link and date.

use crate::config::CosmosConfig;
use crate::error::{IngestError, Result, WriteError};
use crate::ingestion::enricher::Record;
use crate::store::DocumentStore;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use sha2::Sha256;
use std::time::Duration;
use tracing::debug;

const API_VERSION: &str = "2018-12-31";

// Cosmos REST API:
//   GET  {endpoint}/dbs                                  list databases
//   POST {endpoint}/dbs/{db}/colls/{coll}/docs           create document
// Headers: authorization, x-ms-date, x-ms-version, x-ms-documentdb-partitionkey

#[derive(Debug, Deserialize)]
struct DatabaseList {
    #[serde(rename = "Databases", default)]
    databases: Vec<serde_json::Value>,
    #[serde(rename = "_count")]
    count: Option<usize>,
}

pub struct CosmosStore {
    config: CosmosConfig,
    endpoint: String,
    key: Vec<u8>,
    partition_key_field: String,
    client: Client,
}

impl CosmosStore {
    pub fn new(config: CosmosConfig, partition_key_field: impl Into<String>) -> Result<Self> {
        let key = STANDARD
            .decode(config.key.trim())
            .map_err(|e| IngestError::Config(format!("COSMOS_DB_KEY is not valid base64: {}", e)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(|e| IngestError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            config,
            key,
            partition_key_field: partition_key_field.into(),
            client,
        })
    }

    pub fn container(&self) -> &str {
        &self.config.container
    }

    /// Resource link as signed; names stay unencoded here.
    fn collection_link(&self) -> String {
        format!("dbs/{}/colls/{}", self.config.database, self.config.container)
    }

    fn documents_url(&self) -> String {
        format!(
            "{}/dbs/{}/colls/{}/docs",
            self.endpoint,
            urlencoding::encode(&self.config.database),
            urlencoding::encode(&self.config.container)
        )
    }

    /// Master-key authorization token for one request
    fn authorization(
        &self,
        verb: &str,
        resource_type: &str,
        resource_link: &str,
        date: &str,
    ) -> std::result::Result<String, String> {
        sign_request(&self.key, verb, resource_type, resource_link, date)
    }

    fn request_date() -> String {
        Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
    }
}

/// Build the url-encoded `type=master&ver=1.0&sig=...` token.
pub(crate) fn sign_request(
    key: &[u8],
    verb: &str,
    resource_type: &str,
    resource_link: &str,
    date: &str,
) -> std::result::Result<String, String> {
    let payload = format!(
        "{}\n{}\n{}\n{}\n\n",
        verb.to_lowercase(),
        resource_type.to_lowercase(),
        resource_link,
        date.to_lowercase()
    );

    let mut mac = Hmac::<Sha256>::new_from_slice(key).map_err(|e| e.to_string())?;
    mac.update(payload.as_bytes());
    let signature = STANDARD.encode(mac.finalize().into_bytes());

    let token = format!("type=master&ver=1.0&sig={}", signature);
    Ok(urlencoding::encode(&token).into_owned())
}

/// Map a non-success HTTP status from a create call to a write error.
pub(crate) fn classify_status(status: StatusCode, body: &str) -> WriteError {
    let detail = if body.is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, body)
    };

    match status {
        StatusCode::CONFLICT => WriteError::Conflict(detail),
        StatusCode::TOO_MANY_REQUESTS => WriteError::Throttled(detail),
        StatusCode::REQUEST_TIMEOUT => WriteError::Timeout(detail),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => WriteError::Rejected(detail),
        s if s.is_server_error() => WriteError::Unavailable(detail),
        s if s.is_client_error() => WriteError::Rejected(detail),
        _ => WriteError::Other(detail),
    }
}

fn classify_transport(e: &reqwest::Error) -> WriteError {
    if e.is_timeout() {
        WriteError::Timeout(e.to_string())
    } else if e.is_connect() || e.is_request() {
        WriteError::Unavailable(e.to_string())
    } else {
        WriteError::Other(e.to_string())
    }
}

#[async_trait]
impl DocumentStore for CosmosStore {
    fn name(&self) -> &str {
        "cosmos"
    }

    async fn check_auth(&self) -> Result<usize> {
        let date = Self::request_date();
        let auth = self
            .authorization("GET", "dbs", "", &date)
            .map_err(IngestError::Auth)?;

        let response = self
            .client
            .get(format!("{}/dbs", self.endpoint))
            .header("authorization", auth)
            .header("x-ms-date", &date)
            .header("x-ms-version", API_VERSION)
            .send()
            .await
            .map_err(|e| IngestError::Auth(format!("Failed to reach Cosmos DB: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(IngestError::Auth(format!(
                "Cosmos DB rejected credentials with status {}: {}",
                status, text
            )));
        }

        let list: DatabaseList = response
            .json()
            .await
            .map_err(|e| IngestError::Auth(format!("Failed to parse database list: {}", e)))?;
        let count = list.count.unwrap_or(list.databases.len());

        debug!("Cosmos DB lists {} databases", count);
        Ok(count)
    }

    async fn create(&self, record: &Record) -> std::result::Result<(), WriteError> {
        let link = self.collection_link();
        let date = Self::request_date();
        let auth = self
            .authorization("POST", "docs", &link, &date)
            .map_err(WriteError::Other)?;
        let partition_key = serde_json::to_string(&[&record.partition_key])
            .map_err(|e| WriteError::Rejected(e.to_string()))?;

        let response = self
            .client
            .post(self.documents_url())
            .header("authorization", auth)
            .header("x-ms-date", &date)
            .header("x-ms-version", API_VERSION)
            .header("x-ms-documentdb-partitionkey", partition_key)
            .json(&record.to_document(&self.partition_key_field))
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        let status = response.status();
        if status.is_success() {
            debug!("Created document {}", record.id);
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        Err(classify_status(status, &text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_request_matches_reference_token() {
        let key = STANDARD.decode("dGVzdC1tYXN0ZXIta2V5LTAxMjM0NTY3ODk=").unwrap();
        let token = sign_request(
            &key,
            "POST",
            "docs",
            "dbs/iot/colls/readings",
            "Tue, 01 Oct 2024 12:00:00 GMT",
        )
        .unwrap();
        assert_eq!(
            token,
            "type%3Dmaster%26ver%3D1.0%26sig%3DUH%2FQXwQNtGl7OggBs8JS9BsPLVUqVaX2izqp73MMVmw%3D"
        );
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(classify_status(StatusCode::CONFLICT, ""), WriteError::Conflict(_)));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "slow down"),
            WriteError::Throttled(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE, ""),
            WriteError::Unavailable(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, "bad partition key"),
            WriteError::Rejected(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::REQUEST_TIMEOUT, ""),
            WriteError::Timeout(_)
        ));
    }

    #[test]
    fn test_invalid_key_is_config_error() {
        let config = CosmosConfig {
            endpoint: "https://acct.documents.azure.com:443/".to_string(),
            key: "not base64!!".to_string(),
            database: "iot".to_string(),
            container: "readings".to_string(),
        };
        assert!(matches!(
            CosmosStore::new(config, "TimestampID"),
            Err(IngestError::Config(_))
        ));
    }

    #[test]
    fn test_collection_link_and_endpoint_trim() {
        let config = CosmosConfig {
            endpoint: "https://acct.documents.azure.com:443/".to_string(),
            key: "dGVzdA==".to_string(),
            database: "iot".to_string(),
            container: "readings".to_string(),
        };
        let store = CosmosStore::new(config, "TimestampID").unwrap();
        assert_eq!(store.collection_link(), "dbs/iot/colls/readings");
        assert_eq!(store.endpoint, "https://acct.documents.azure.com:443");
        assert_eq!(store.container(), "readings");
    }

    #[test]
    fn test_documents_url_encodes_names_but_link_does_not() {
        let config = CosmosConfig {
            endpoint: "https://acct.documents.azure.com:443".to_string(),
            key: "dGVzdA==".to_string(),
            database: "iot data".to_string(),
            container: "floor#2".to_string(),
        };
        let store = CosmosStore::new(config, "TimestampID").unwrap();
        assert_eq!(
            store.documents_url(),
            "https://acct.documents.azure.com:443/dbs/iot%20data/colls/floor%232/docs"
        );
        assert_eq!(store.collection_link(), "dbs/iot data/colls/floor#2");
    }
}
