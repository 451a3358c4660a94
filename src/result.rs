//! The per-target observation record produced by a probe, and the
//! sub-records (headers, cookies, TLS details, network log entries,
//! console output, detected technologies) it's built from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub url: String,
    pub final_url: Option<String>,
    pub probed_at: DateTime<Utc>,
    pub response_code: u16,
    pub response_reason: String,
    pub protocol: String,
    pub content_length: i64,
    pub headers: Vec<HeaderEntry>,
    pub cookies: Vec<CookieInfo>,
    pub tls: Option<TlsInfo>,
    pub title: Option<String>,
    pub html: Option<String>,
    pub network: Vec<NetworkLogEntry>,
    pub console: Vec<ConsoleEntry>,
    pub technologies: Vec<Technology>,
    pub failed: bool,
    pub failed_reason: Option<String>,
    pub filename: Option<String>,
    pub screenshot: Option<String>,
    pub perception_hash: Option<String>,
}

impl ProbeResult {
    pub fn new(url: String) -> Self {
        Self {
            url,
            final_url: None,
            probed_at: Utc::now(),
            response_code: 0,
            response_reason: String::new(),
            protocol: String::new(),
            content_length: 0,
            headers: Vec::new(),
            cookies: Vec::new(),
            tls: None,
            title: None,
            html: None,
            network: Vec::new(),
            console: Vec::new(),
            technologies: Vec::new(),
            failed: false,
            failed_reason: None,
            filename: None,
            screenshot: None,
            perception_hash: None,
        }
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.failed = true;
        self.failed_reason = Some(reason.into());
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderEntry {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieInfo {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub expires: DateTime<Utc>,
    pub size: i64,
    pub http_only: bool,
    pub secure: bool,
    pub session: bool,
    pub priority: String,
    pub source_scheme: String,
    pub source_port: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsInfo {
    pub protocol: String,
    pub key_exchange: String,
    pub cipher: String,
    pub subject_name: String,
    pub san_list: Vec<String>,
    pub issuer: String,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    pub server_signature_algorithm: Option<i64>,
    pub encrypted_client_hello: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkLogEntry {
    pub time: DateTime<Utc>,
    pub request_type: String,
    pub url: String,
    pub status_code: u16,
    pub remote_ip: Option<String>,
    pub mime_type: Option<String>,
    pub error: Option<String>,
    pub content: Option<String>,
}

impl NetworkLogEntry {
    pub fn new(url: String) -> Self {
        Self {
            time: Utc::now(),
            request_type: "HTTP".to_string(),
            url,
            status_code: 0,
            remote_ip: None,
            mime_type: None,
            error: None,
            content: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Technology {
    pub name: String,
}
