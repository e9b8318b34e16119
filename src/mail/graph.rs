//! Microsoft Graph implementation of [`MailApi`].
//!
//! Uses the OAuth2 client-credentials grant against Azure AD and the v1.0
//! Graph REST API. All calls are blocking; requests that fail with a
//! throttling or server status are retried with exponential backoff.

use std::collections::VecDeque;
use std::thread;
use std::time::Duration;

use base64::Engine;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::credentials::Credentials;
use crate::error::{Result, SortError};
use crate::model::attachment::Attachment;
use crate::model::message::MessageHandle;

use super::{MailApi, MessageIter};

/// Graph REST root.
pub const GRAPH_BASE: &str = "https://graph.microsoft.com/v1.0";

/// Azure AD authority root.
pub const AUTHORITY_BASE: &str = "https://login.microsoftonline.com";

/// Application-permission scope for Graph.
pub const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Messages requested per page.
const PAGE_SIZE: u32 = 50;

/// Attempts per request, including the first.
const MAX_ATTEMPTS: u32 = 5;

/// Base delay for exponential backoff.
const BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Longest server-requested wait honored before a retry.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(120);

const FILE_ATTACHMENT_TYPE: &str = "#microsoft.graph.fileattachment";

// ── Wire types ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphFolder {
    id: String,
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphMessage {
    id: String,
    subject: Option<String>,
    from: Option<GraphRecipient>,
    #[serde(default)]
    has_attachments: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphRecipient {
    email_address: Option<GraphEmailAddress>,
}

#[derive(Debug, Deserialize)]
struct GraphEmailAddress {
    address: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphAttachment {
    #[serde(rename = "@odata.type")]
    odata_type: Option<String>,
    id: Option<String>,
    name: Option<String>,
    content_bytes: Option<String>,
}

impl From<GraphMessage> for MessageHandle {
    fn from(m: GraphMessage) -> Self {
        let sender = m
            .from
            .and_then(|r| r.email_address)
            .and_then(|a| a.address)
            .unwrap_or_default()
            .to_lowercase();
        Self {
            id: m.id,
            subject: m.subject.unwrap_or_default(),
            sender,
        }
    }
}

// ── Client ──────────────────────────────────────────────────────

/// Blocking Graph client acting on one mailbox.
#[derive(Debug, Clone)]
pub struct GraphClient {
    http: Client,
    base_url: String,
    user: String,
    token: String,
}

impl GraphClient {
    /// Acquire an application token and build a client for `user`'s mailbox.
    pub fn connect(credentials: &Credentials, user: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        let token = acquire_token(&http, AUTHORITY_BASE, credentials)?;
        info!(user = %user, "Connected to Microsoft Graph");
        Ok(Self {
            http,
            base_url: GRAPH_BASE.to_string(),
            user: user.to_string(),
            token,
        })
    }

    /// Build a client from an existing token, against an arbitrary base URL.
    pub fn with_token(
        base_url: impl Into<String>,
        user: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            http: Client::builder().timeout(timeout).build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user: user.into(),
            token: token.into(),
        })
    }

    fn user_url(&self, path: &str) -> String {
        format!("{}/users/{}/{}", self.base_url, self.user, path)
    }

    /// Resolve a folder display name (case-insensitive) to its id.
    ///
    /// Searches top-level folders first, then children of the inbox.
    pub fn find_folder_id(&self, display_name: &str) -> Result<String> {
        let target = display_name.to_lowercase();
        for scope in ["mailFolders", "mailFolders/inbox/childFolders"] {
            let mut next = Some(format!("{}?$top=200", self.user_url(scope)));
            while let Some(url) = next {
                let page: Page<GraphFolder> = self.get_json(&url, "list mail folders")?;
                if let Some(folder) = page.value.into_iter().find(|f| {
                    f.display_name
                        .as_deref()
                        .is_some_and(|n| n.to_lowercase() == target)
                }) {
                    debug!(folder = %display_name, id = %folder.id, "Resolved folder");
                    return Ok(folder.id);
                }
                next = page.next_link;
            }
        }
        Err(SortError::FolderNotFound(display_name.to_string()))
    }

    fn messages_url(&self, folder_id: &str) -> String {
        // Graph requires the $orderby property to also appear first in $filter.
        format!(
            "{}?$filter={}&$orderby={}&$select={}&$top={PAGE_SIZE}",
            self.user_url(&format!("mailFolders/{folder_id}/messages")),
            "receivedDateTime%20ge%201900-01-01T00:00:00Z%20and%20hasAttachments%20eq%20true",
            "receivedDateTime%20asc",
            "id,subject,from,hasAttachments",
        )
    }

    fn download_value(&self, message_id: &str, attachment_id: &str) -> Result<Vec<u8>> {
        let url = self.user_url(&format!(
            "messages/{message_id}/attachments/{attachment_id}/$value"
        ));
        let resp = self.send(|| self.http.get(&url), "download attachment")?;
        Ok(resp.bytes()?.to_vec())
    }

    fn patch_message(
        &self,
        message_id: &str,
        body: &serde_json::Value,
        context: &str,
    ) -> Result<()> {
        let url = self.user_url(&format!("messages/{message_id}"));
        self.send(|| self.http.patch(&url).json(body), context)?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str, context: &str) -> Result<T> {
        let resp = self.send(|| self.http.get(url), context)?;
        let text = resp.text()?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Send an authorized request, retrying throttled and transient failures.
    fn send(&self, build: impl Fn() -> RequestBuilder, context: &str) -> Result<Response> {
        let mut attempt = 1;
        loop {
            let result = build().bearer_auth(&self.token).send();
            match result {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) if is_retryable(resp.status()) && attempt < MAX_ATTEMPTS => {
                    let delay = retry_after(resp.headers()).unwrap_or_else(|| backoff(attempt));
                    warn!(
                        status = resp.status().as_u16(),
                        attempt,
                        ?delay,
                        "{context}: retrying"
                    );
                    thread::sleep(delay);
                }
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let body = resp.text().unwrap_or_default();
                    return Err(SortError::api(status, context, &body));
                }
                Err(e) if (e.is_timeout() || e.is_connect()) && attempt < MAX_ATTEMPTS => {
                    let delay = backoff(attempt);
                    warn!(error = %e, attempt, "{context}: retrying");
                    thread::sleep(delay);
                }
                Err(e) => return Err(e.into()),
            }
            attempt += 1;
        }
    }
}

impl MailApi for GraphClient {
    fn list_messages_with_attachments<'a>(&'a self, folder: &str) -> Result<MessageIter<'a>> {
        let folder_id = self.find_folder_id(folder)?;
        let first = self.messages_url(&folder_id);
        Ok(Box::new(MessagePages {
            client: self,
            next: Some(first),
            buffer: VecDeque::new(),
        }))
    }

    fn get_attachments(&self, message: &MessageHandle) -> Result<Vec<Attachment>> {
        let mut next = Some(self.user_url(&format!("messages/{}/attachments", message.id)));
        let mut out = Vec::new();

        while let Some(url) = next {
            let page: Page<GraphAttachment> = self.get_json(&url, "list attachments")?;
            for att in page.value {
                let kind = att.odata_type.as_deref().unwrap_or_default().to_lowercase();
                if kind != FILE_ATTACHMENT_TYPE {
                    debug!(kind = %kind, message = %message.id, "Skipping non-file attachment");
                    continue;
                }
                let bytes = match (&att.content_bytes, &att.id) {
                    (Some(encoded), _) => base64::engine::general_purpose::STANDARD
                        .decode(encoded.as_bytes())
                        .map_err(|e| {
                            SortError::InvalidResponse(format!("attachment content: {e}"))
                        })?,
                    (None, Some(id)) => self.download_value(&message.id, id)?,
                    (None, None) => {
                        warn!(message = %message.id, "Attachment has neither content nor id");
                        continue;
                    }
                };
                out.push(Attachment {
                    filename: att.name.unwrap_or_else(|| "attachment".to_string()),
                    bytes,
                });
            }
            next = page.next_link;
        }
        Ok(out)
    }

    fn set_category(&self, message: &MessageHandle, category: &str) -> Result<()> {
        let body = serde_json::json!({ "categories": [category] });
        self.patch_message(&message.id, &body, "set category")
    }

    fn mark_read(&self, message: &MessageHandle) -> Result<()> {
        let body = serde_json::json!({ "isRead": true });
        self.patch_message(&message.id, &body, "mark read")
    }

    fn flag_complete(&self, message: &MessageHandle) -> Result<()> {
        let body = serde_json::json!({ "flag": { "flagStatus": "complete" } });
        self.patch_message(&message.id, &body, "flag complete")
    }
}

/// Lazily follows `@odata.nextLink` one page at a time.
struct MessagePages<'a> {
    client: &'a GraphClient,
    next: Option<String>,
    buffer: VecDeque<MessageHandle>,
}

impl Iterator for MessagePages<'_> {
    type Item = Result<MessageHandle>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(msg) = self.buffer.pop_front() {
                return Some(Ok(msg));
            }
            // `take` ensures a failed page ends the sequence.
            let url = self.next.take()?;
            match self.client.get_json::<Page<GraphMessage>>(&url, "list messages") {
                Ok(page) => {
                    self.next = page.next_link;
                    self.buffer.extend(
                        page.value
                            .into_iter()
                            .filter(|m| m.has_attachments)
                            .map(MessageHandle::from),
                    );
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Obtain an application access token with the client-credentials grant.
pub fn acquire_token(http: &Client, authority: &str, credentials: &Credentials) -> Result<String> {
    let url = format!(
        "{}/{}/oauth2/v2.0/token",
        authority.trim_end_matches('/'),
        credentials.tenant_id
    );
    let resp = http
        .post(&url)
        .form(&[
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("scope", GRAPH_SCOPE),
            ("grant_type", "client_credentials"),
        ])
        .send()?;

    let status = resp.status();
    let text = resp.text()?;
    if !status.is_success() {
        return Err(SortError::Credentials(format!(
            "token request rejected ({}): {}",
            status.as_u16(),
            text.chars().take(200).collect::<String>()
        )));
    }
    let token: TokenResponse = serde_json::from_str(&text)?;
    Ok(token.access_token)
}

fn is_retryable(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504)
}

fn backoff(attempt: u32) -> Duration {
    BACKOFF_BASE * 2u32.saturating_pow(attempt.saturating_sub(1))
}

/// Delay from a `Retry-After: <seconds>` header, capped at [`MAX_RETRY_AFTER`].
fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| Duration::from_secs(secs).min(MAX_RETRY_AFTER))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(backoff(1), Duration::from_millis(500));
        assert_eq!(backoff(2), Duration::from_millis(1000));
        assert_eq!(backoff(4), Duration::from_millis(4000));
    }

    #[test]
    fn test_retry_after_is_capped() {
        use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};

        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(7)));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("86400"));
        assert_eq!(retry_after(&headers), Some(MAX_RETRY_AFTER));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2026 07:28:00 GMT"));
        assert_eq!(retry_after(&headers), None);
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_retryable(StatusCode::NOT_FOUND));
        assert!(!is_retryable(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn test_message_page_parsing() {
        let json = r#"{
            "value": [{
                "id": "AAMk1",
                "subject": "Invoice 1042",
                "from": {"emailAddress": {"address": "Billing@Country-Care.com.au"}},
                "receivedDateTime": "2026-03-14T09:21:07Z",
                "categories": ["Doubled up"],
                "hasAttachments": true
            }],
            "@odata.nextLink": "https://graph.microsoft.com/v1.0/next"
        }"#;
        let page: Page<GraphMessage> = serde_json::from_str(json).unwrap();
        assert_eq!(page.next_link.as_deref(), Some("https://graph.microsoft.com/v1.0/next"));
        let handle = MessageHandle::from(page.value.into_iter().next().unwrap());
        assert_eq!(handle.id, "AAMk1");
        assert_eq!(handle.sender, "billing@country-care.com.au");
        assert_eq!(handle.subject, "Invoice 1042");
    }

    #[test]
    fn test_attachment_parsing() {
        let json = r##"{"value": [
            {"@odata.type": "#microsoft.graph.fileAttachment", "id": "A1", "name": "inv.pdf",
             "contentType": "application/pdf", "contentBytes": "aGVsbG8="},
            {"@odata.type": "#microsoft.graph.itemAttachment", "id": "A2", "name": "fwd"}
        ]}"##;
        let page: Page<GraphAttachment> = serde_json::from_str(json).unwrap();
        assert_eq!(page.value.len(), 2);
        assert!(page.next_link.is_none());
        let first = &page.value[0];
        assert_eq!(
            first.odata_type.as_deref().map(str::to_lowercase).as_deref(),
            Some(FILE_ATTACHMENT_TYPE)
        );
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(first.content_bytes.as_deref().unwrap())
            .unwrap();
        assert_eq!(decoded, b"hello");
    }

    #[test]
    fn test_messages_url_filters_and_orders() {
        let client = GraphClient::with_token(
            "https://graph.example/v1.0/",
            "ops@example.com",
            "t",
            Duration::from_secs(5),
        )
        .unwrap();
        let url = client.messages_url("FOLDER1");
        assert!(url.starts_with(
            "https://graph.example/v1.0/users/ops@example.com/mailFolders/FOLDER1/messages?"
        ));
        assert!(url.contains("hasAttachments%20eq%20true"));
        assert!(url.ends_with("$top=50"));
    }
}
