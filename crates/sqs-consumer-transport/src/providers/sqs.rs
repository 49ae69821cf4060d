//! AWS SQS client implementation using the HTTP Query API.
//!
//! This module talks to SQS with direct HTTP calls instead of the AWS SDK, which
//! keeps the request/response handling transparent and lets the unit tests run
//! against a mocked HTTP server.
//!
//! ## Operations
//!
//! Only the two calls a consumer needs are implemented:
//!
//! - **ReceiveMessage**: long-poll receive, `WaitTimeSeconds` clamped to the
//!   SQS maximum of 20 seconds and `MaxNumberOfMessages` clamped to 1..=10
//! - **DeleteMessage**: acknowledge one delivery by its receipt handle
//!
//! ## Authentication
//!
//! Requests are signed with AWS Signature Version 4. Credentials come from
//! [`AwsSqsConfig`] or, when absent there, from `AWS_ACCESS_KEY_ID`,
//! `AWS_SECRET_ACCESS_KEY` and `AWS_SESSION_TOKEN`.
//!
//! ## Endpoints
//!
//! The HTTP endpoint is taken from the queue URL itself, so LocalStack or
//! ElasticMQ URLs such as `http://localhost:4566/000000000000/orders` work
//! without extra configuration.
//!
//! ## Example
//!
//! ```no_run
//! use sqs_consumer_transport::{AwsSqsConfig, QueueClient, QueueUrl, SqsQueueClient};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let queue_url = QueueUrl::new("https://sqs.us-east-1.amazonaws.com/123456789012/orders")?;
//! let client = SqsQueueClient::new(queue_url, AwsSqsConfig::default())
//!     .map_err(|e| e.to_queue_error())?;
//!
//! for message in client.receive(Duration::from_secs(2), 10).await? {
//!     client.acknowledge(&message).await?;
//! }
//! # Ok(())
//! # }
//! ```

use crate::client::QueueClient;
use crate::error::{ConfigurationError, QueueError, SerializationError};
use crate::message::{MessageId, QueueUrl, ReceiptHandle, ReceivedMessage, Timestamp};
use crate::provider::{AwsSqsConfig, ProviderType};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Client as HttpClient;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

#[cfg(test)]
#[path = "sqs_tests.rs"]
mod tests;

const SQS_API_VERSION: &str = "2012-11-05";

/// SQS long polling cannot wait longer than this
const MAX_WAIT_TIME_SECONDS: u64 = 20;

/// SQS never returns more than this many messages per receive
const MAX_RECEIVE_BATCH: u32 = 10;

/// Slack on top of the longest long poll before the HTTP client gives up
const HTTP_TIMEOUT_SLACK: Duration = Duration::from_secs(10);

const DEFAULT_REGION: &str = "us-east-1";

// ============================================================================
// Error Types
// ============================================================================

/// AWS SQS specific errors
#[derive(Debug, thiserror::Error)]
pub enum AwsError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("SQS service error: {code} - {message}")]
    ServiceError { code: String, message: String },

    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    #[error("Invalid receipt handle: {0}")]
    InvalidReceipt(String),

    #[error("Invalid configuration: {0}")]
    ConfigurationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl AwsError {
    /// Check if error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Authentication(_) => false,
            Self::AccessDenied(_) => false,
            Self::NetworkError(_) => true,
            Self::Timeout(_) => true,
            Self::ServiceError { .. } => true, // Most SQS errors are transient
            Self::QueueNotFound(_) => false,
            Self::InvalidReceipt(_) => false,
            Self::ConfigurationError(_) => false,
            Self::SerializationError(_) => false,
        }
    }

    /// Map AWS error to QueueError
    pub fn to_queue_error(self) -> QueueError {
        match self {
            Self::Authentication(msg) => QueueError::AuthenticationFailed { message: msg },
            Self::AccessDenied(operation) => QueueError::PermissionDenied { operation },
            Self::NetworkError(msg) => QueueError::ConnectionFailed { message: msg },
            Self::Timeout(duration) => QueueError::Timeout { duration },
            Self::ServiceError { code, message } => QueueError::ProviderError {
                provider: ProviderType::AwsSqs.to_string(),
                code,
                message,
            },
            Self::QueueNotFound(queue_url) => QueueError::QueueNotFound { queue_url },
            Self::InvalidReceipt(receipt) => QueueError::MessageNotFound { receipt },
            Self::ConfigurationError(msg) => {
                QueueError::ConfigurationError(ConfigurationError::Invalid { message: msg })
            }
            Self::SerializationError(msg) => {
                QueueError::SerializationError(SerializationError::Xml { message: msg })
            }
        }
    }
}

// ============================================================================
// AWS Signature V4 Signing
// ============================================================================

type HmacSha256 = Hmac<Sha256>;

/// Resolved AWS credentials
#[derive(Clone)]
struct AwsCredentials {
    access_key: String,
    secret_key: String,
    session_token: Option<String>,
}

impl AwsCredentials {
    /// Take credentials from config, falling back to the AWS environment variables
    fn resolve(config: &AwsSqsConfig) -> Option<Self> {
        let access_key = config
            .access_key_id
            .clone()
            .or_else(|| std::env::var("AWS_ACCESS_KEY_ID").ok())
            .filter(|k| !k.is_empty())?;
        let secret_key = config
            .secret_access_key
            .clone()
            .or_else(|| std::env::var("AWS_SECRET_ACCESS_KEY").ok())
            .filter(|k| !k.is_empty())?;
        let session_token = config
            .session_token
            .clone()
            .or_else(|| std::env::var("AWS_SESSION_TOKEN").ok())
            .filter(|t| !t.is_empty());

        Some(Self {
            access_key,
            secret_key,
            session_token,
        })
    }
}

/// AWS Signature Version 4 signer for request authentication
///
/// Implements the AWS Signature V4 signing process:
/// 1. Create canonical request (method, URI, query, headers, payload)
/// 2. Create string to sign (algorithm, timestamp, scope, request hash)
/// 3. Derive signing key (4-level HMAC chain)
/// 4. Calculate signature and build Authorization header
#[derive(Clone)]
struct AwsV4Signer {
    credentials: AwsCredentials,
    region: String,
    service: String,
}

impl AwsV4Signer {
    fn new(credentials: AwsCredentials, region: String) -> Self {
        Self {
            credentials,
            region,
            service: "sqs".to_string(),
        }
    }

    /// Sign an HTTP request with AWS Signature V4
    ///
    /// Returns the headers to add to the request: `Authorization`,
    /// `x-amz-date`, `host` and, for temporary credentials,
    /// `x-amz-security-token`.
    fn sign_request(
        &self,
        method: &str,
        host: &str,
        path: &str,
        query_params: &[(String, String)],
        body: &str,
        timestamp: &DateTime<Utc>,
    ) -> Vec<(String, String)> {
        let date_stamp = timestamp.format("%Y%m%d").to_string();
        let amz_date = timestamp.format("%Y%m%dT%H%M%SZ").to_string();

        let canonical_query_string = canonical_query_string(query_params);

        // Canonical headers (must be sorted)
        let mut canonical_headers = format!("host:{}\nx-amz-date:{}\n", host, amz_date);
        let mut signed_headers = "host;x-amz-date".to_string();
        if let Some(token) = &self.credentials.session_token {
            canonical_headers.push_str(&format!("x-amz-security-token:{}\n", token));
            signed_headers.push_str(";x-amz-security-token");
        }

        let payload_hash = format!("{:x}", Sha256::digest(body.as_bytes()));

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method, path, canonical_query_string, canonical_headers, signed_headers, payload_hash
        );

        let algorithm = "AWS4-HMAC-SHA256";
        let credential_scope = format!(
            "{}/{}/{}/aws4_request",
            date_stamp, self.region, self.service
        );
        let canonical_request_hash = format!("{:x}", Sha256::digest(canonical_request.as_bytes()));

        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            algorithm, amz_date, credential_scope, canonical_request_hash
        );

        let signature = self.calculate_signature(&string_to_sign, &date_stamp);

        let authorization_header = format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            algorithm, self.credentials.access_key, credential_scope, signed_headers, signature
        );

        let mut headers = vec![
            ("Authorization".to_string(), authorization_header),
            ("x-amz-date".to_string(), amz_date),
            ("host".to_string(), host.to_string()),
        ];
        if let Some(token) = &self.credentials.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }

        headers
    }

    /// Calculate AWS Signature V4 signature
    ///
    /// kSigning = HMAC(HMAC(HMAC(HMAC("AWS4" + secret, date), region), service), "aws4_request")
    fn calculate_signature(&self, string_to_sign: &str, date_stamp: &str) -> String {
        let k_secret = format!("AWS4{}", self.credentials.secret_key);
        let k_date = hmac_sha256(k_secret.as_bytes(), date_stamp.as_bytes());
        let k_region = hmac_sha256(&k_date, self.region.as_bytes());
        let k_service = hmac_sha256(&k_region, self.service.as_bytes());
        let k_signing = hmac_sha256(&k_service, b"aws4_request");
        let signature = hmac_sha256(&k_signing, string_to_sign.as_bytes());

        hex::encode(signature)
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// RFC 3986 encoded `k=v` pairs sorted by key, then value
fn canonical_query_string(query_params: &[(String, String)]) -> String {
    let mut pairs: Vec<(String, String)> = query_params
        .iter()
        .map(|(k, v)| {
            (
                urlencoding::encode(k).into_owned(),
                urlencoding::encode(v).into_owned(),
            )
        })
        .collect();
    pairs.sort();

    pairs
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

// ============================================================================
// AWS SQS Client
// ============================================================================

/// Queue client bound to a single SQS queue
///
/// The client is cheap to share behind an `Arc`; it holds no mutable state.
pub struct SqsQueueClient {
    http_client: HttpClient,
    signer: Option<AwsV4Signer>,
    queue_url: QueueUrl,
    endpoint: String,
}

impl SqsQueueClient {
    /// Create new SQS client for `queue_url`
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built. Missing credentials are
    /// not an error here; every request will then fail with
    /// [`AwsError::Authentication`].
    pub fn new(queue_url: QueueUrl, config: AwsSqsConfig) -> Result<Self, AwsError> {
        let region = config
            .region
            .clone()
            .filter(|r| !r.is_empty())
            .or_else(|| queue_url.region())
            .or_else(|| std::env::var("AWS_REGION").ok())
            .or_else(|| std::env::var("AWS_DEFAULT_REGION").ok())
            .unwrap_or_else(|| {
                warn!(
                    queue_url = %queue_url,
                    region = DEFAULT_REGION,
                    "Could not determine AWS region; using default"
                );
                DEFAULT_REGION.to_string()
            });

        let signer = match AwsCredentials::resolve(&config) {
            Some(credentials) => Some(AwsV4Signer::new(credentials, region)),
            None => {
                warn!(queue_url = %queue_url, "No AWS credentials configured; requests will fail");
                None
            }
        };

        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(MAX_WAIT_TIME_SECONDS) + HTTP_TIMEOUT_SLACK)
            .build()
            .map_err(|e| AwsError::NetworkError(format!("Failed to create HTTP client: {}", e)))?;

        let endpoint = queue_url.endpoint();

        Ok(Self {
            http_client,
            signer,
            queue_url,
            endpoint,
        })
    }

    /// Queue this client is bound to
    pub fn queue_url(&self) -> &QueueUrl {
        &self.queue_url
    }

    /// Make a signed Query API request and return the response body
    async fn make_request(&self, query_params: &[(String, String)]) -> Result<String, AwsError> {
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| AwsError::Authentication("No credentials configured".to_string()))?;

        let method = "POST";
        let path = "/";
        let host = self.queue_url.host_header();
        let auth_headers = signer.sign_request(method, &host, path, query_params, "", &Utc::now());

        let url = format!(
            "{}{}?{}",
            self.endpoint,
            path,
            canonical_query_string(query_params)
        );

        let mut request = self.http_client.post(&url);
        for (key, value) in auth_headers {
            request = request.header(key, value);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AwsError::Timeout(Duration::from_secs(MAX_WAIT_TIME_SECONDS) + HTTP_TIMEOUT_SLACK)
            } else if e.is_connect() {
                AwsError::NetworkError(format!("Connection failed: {}", e))
            } else {
                AwsError::NetworkError(format!("HTTP request failed: {}", e))
            }
        })?;

        let status = response.status();
        let response_body = response
            .text()
            .await
            .map_err(|e| AwsError::NetworkError(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            return Err(parse_error_response(&response_body, status.as_u16()));
        }

        Ok(response_body)
    }

    fn base_params(&self, action: &str) -> Vec<(String, String)> {
        vec![
            ("Action".to_string(), action.to_string()),
            ("Version".to_string(), SQS_API_VERSION.to_string()),
            ("QueueUrl".to_string(), self.queue_url.as_str().to_string()),
        ]
    }
}

impl fmt::Debug for SqsQueueClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqsQueueClient")
            .field("queue_url", &self.queue_url.as_str())
            .field("endpoint", &self.endpoint)
            .field("signed", &self.signer.is_some())
            .finish()
    }
}

#[async_trait]
impl QueueClient for SqsQueueClient {
    async fn receive(
        &self,
        wait: Duration,
        max_messages: u32,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let wait_time_seconds = wait.as_secs().min(MAX_WAIT_TIME_SECONDS);
        let max_messages = max_messages.clamp(1, MAX_RECEIVE_BATCH);

        let mut params = self.base_params("ReceiveMessage");
        params.push((
            "MaxNumberOfMessages".to_string(),
            max_messages.to_string(),
        ));
        params.push(("WaitTimeSeconds".to_string(), wait_time_seconds.to_string()));
        params.push(("AttributeName.1".to_string(), "All".to_string()));
        params.push(("MessageAttributeName.1".to_string(), "All".to_string()));

        let response = self
            .make_request(&params)
            .await
            .map_err(|e| e.to_queue_error())?;

        let messages = parse_receive_message_response(&response).map_err(|e| e.to_queue_error())?;

        debug!(
            queue = %self.queue_url.queue_name(),
            count = messages.len(),
            "Received messages"
        );

        Ok(messages)
    }

    async fn acknowledge(&self, message: &ReceivedMessage) -> Result<(), QueueError> {
        let mut params = self.base_params("DeleteMessage");
        params.push((
            "ReceiptHandle".to_string(),
            message.receipt_handle.handle().to_string(),
        ));

        // DeleteMessage returns an empty result element on success
        let _response = self
            .make_request(&params)
            .await
            .map_err(|e| e.to_queue_error())?;

        debug!(
            queue = %self.queue_url.queue_name(),
            message_id = %message.message_id,
            "Deleted message"
        );

        Ok(())
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::AwsSqs
    }
}

// ============================================================================
// XML Response Parsing
// ============================================================================

fn xml_error(e: quick_xml::Error) -> AwsError {
    AwsError::SerializationError(format!("XML parsing error: {}", e))
}

/// Fields of a `<Message>` element collected while parsing
#[derive(Default)]
struct MessageFields {
    message_id: Option<String>,
    receipt_handle: Option<String>,
    body: Option<String>,
    attributes: HashMap<String, String>,
    pending_name: Option<String>,
    pending_value: Option<String>,
}

impl MessageFields {
    fn finish_attribute(&mut self) {
        if let (Some(name), Some(value)) = (self.pending_name.take(), self.pending_value.take()) {
            self.attributes.insert(name, value);
        }
    }

    fn append_body(&mut self, text: &str) {
        self.body.get_or_insert_with(String::new).push_str(text);
    }

    fn into_received(self) -> Result<ReceivedMessage, AwsError> {
        let receipt_handle = self.receipt_handle.ok_or_else(|| {
            AwsError::SerializationError("ReceiptHandle not found in message".to_string())
        })?;

        let message_id = self
            .message_id
            .as_deref()
            .and_then(|id| MessageId::from_str(id).ok())
            .unwrap_or_else(MessageId::new);

        let delivery_count = self
            .attributes
            .get("ApproximateReceiveCount")
            .and_then(|count| count.parse().ok())
            .unwrap_or(1);

        Ok(ReceivedMessage {
            message_id,
            body: Bytes::from(self.body.unwrap_or_default()),
            attributes: self.attributes,
            receipt_handle: ReceiptHandle::new(receipt_handle, ProviderType::AwsSqs),
            delivery_count,
            delivered_at: Timestamp::now(),
        })
    }
}

/// Parse ReceiveMessage XML response
///
/// System attributes (`<Attribute>`) and string message attributes
/// (`<MessageAttribute>`) are merged into one attribute map.
///
/// Text is read untrimmed: a `<Body>` is returned byte for byte, including
/// surrounding whitespace and CDATA sections.
fn parse_receive_message_response(xml: &str) -> Result<Vec<ReceivedMessage>, AwsError> {
    let mut reader = Reader::from_str(xml);

    let mut messages = Vec::new();
    let mut current: Option<MessageFields> = None;
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(xml_error)? {
            Event::Start(ref e) => {
                let name = e.name().as_ref().to_vec();
                if name == b"Message" {
                    current = Some(MessageFields::default());
                }
                path.push(name);
            }
            Event::End(ref e) => {
                path.pop();
                match e.name().as_ref() {
                    b"Message" => {
                        if let Some(fields) = current.take() {
                            messages.push(fields.into_received()?);
                        }
                    }
                    b"Attribute" | b"MessageAttribute" => {
                        if let Some(fields) = current.as_mut() {
                            fields.finish_attribute();
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(e) => {
                let Some(fields) = current.as_mut() else {
                    buf.clear();
                    continue;
                };
                let text = e.unescape().map_err(xml_error)?.into_owned();
                let tail: Vec<&[u8]> = path.iter().rev().take(3).map(Vec::as_slice).collect();

                match tail.as_slice() {
                    [b"MessageId", b"Message", ..] => fields.message_id = Some(text),
                    [b"ReceiptHandle", b"Message", ..] => fields.receipt_handle = Some(text),
                    [b"Body", b"Message", ..] => fields.append_body(&text),
                    [b"Name", b"Attribute", ..] | [b"Name", b"MessageAttribute", ..] => {
                        fields.pending_name = Some(text)
                    }
                    [b"Value", b"Attribute", ..]
                    | [b"StringValue", b"Value", b"MessageAttribute"] => {
                        fields.pending_value = Some(text)
                    }
                    _ => {}
                }
            }
            Event::CData(e) => {
                let in_body = matches!(
                    path.iter().rev().take(2).map(Vec::as_slice).collect::<Vec<_>>().as_slice(),
                    [b"Body", b"Message"]
                );
                if let (true, Some(fields)) = (in_body, current.as_mut()) {
                    let text = std::str::from_utf8(&e).map_err(|_| {
                        AwsError::SerializationError("Body CDATA is not valid UTF-8".to_string())
                    })?;
                    fields.append_body(text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(messages)
}

/// Parse error response from XML
fn parse_error_response(xml: &str, status_code: u16) -> AwsError {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut error_code = None;
    let mut error_message = None;
    let mut in_error = false;
    let mut in_code = false;
    let mut in_message = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"Error" => in_error = true,
                b"Code" if in_error => in_code = true,
                b"Message" if in_error => in_message = true,
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_code {
                    error_code = e.unescape().ok().map(|s| s.into_owned());
                    in_code = false;
                } else if in_message {
                    error_message = e.unescape().ok().map(|s| s.into_owned());
                    in_message = false;
                }
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"Error" => {
                in_error = false;
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    let code = error_code.unwrap_or_else(|| "Unknown".to_string());
    let message = error_message.unwrap_or_else(|| format!("HTTP status {}", status_code));

    match code.as_str() {
        "AWS.SimpleQueueService.NonExistentQueue" | "QueueDoesNotExist" => {
            AwsError::QueueNotFound(message)
        }
        "InvalidClientTokenId"
        | "UnrecognizedClientException"
        | "SignatureDoesNotMatch"
        | "ExpiredToken" => AwsError::Authentication(format!("{}: {}", code, message)),
        "AccessDenied" | "AccessDeniedException" => AwsError::AccessDenied(message),
        "InvalidReceiptHandle" | "ReceiptHandleIsInvalid" => AwsError::InvalidReceipt(message),
        _ if status_code == 401 => AwsError::Authentication(format!("{}: {}", code, message)),
        _ if status_code == 403 => AwsError::AccessDenied(format!("{}: {}", code, message)),
        _ => AwsError::ServiceError { code, message },
    }
}
