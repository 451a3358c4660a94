//! Turns the stream of DevTools events for one page into a single
//! `ProbeResult`. Network events arrive out of order and reference a
//! request id that isn't known to carry any meaning until its response
//! (or failure) event fires, so this module stages in-flight requests in
//! a side map and only appends a finished entry to `Result.network[]`
//! once it has a terminal outcome.

use crate::config::Options;
use crate::error::ProbeError;
use crate::result::{CookieInfo, NetworkLogEntry, ProbeResult, TlsInfo};
use chromiumoxide::cdp::browser_protocol::network::{
    EventLoadingFailed, EventRequestWillBeSent, EventResponseReceived, GetResponseBodyParams,
    RequestId, SetExtraHttpHeadersParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::{
    EventJavascriptDialogOpening, HandleJavaScriptDialogParams,
};
use chromiumoxide::cdp::browser_protocol::storage::GetCookiesParams;
use chromiumoxide::cdp::js_protocol::runtime::EventConsoleApiCalled;
use chromiumoxide::page::Page;
use chrono::Utc;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Staging map between `requestWillBeSent` and the terminal event
/// (`responseReceived` or `loadingFailed`) for a request id, plus the
/// anchor bookkeeping for which request id was seen first. An entry
/// lives here only until its terminal event fires, at which point the
/// caller pulls it out and appends it to `Result.network[]` itself — the
/// map never holds anything that has already been appended.
struct NetlogState<Id, T> {
    first_request: Option<Id>,
    staged: HashMap<Id, T>,
}

impl<Id: Eq + std::hash::Hash + Clone, T> NetlogState<Id, T> {
    fn new() -> Self {
        Self {
            first_request: None,
            staged: HashMap::new(),
        }
    }

    /// Record that `id` issued a request, returning whether it is the
    /// first one seen for this target (the navigation anchor).
    fn note_request(&mut self, id: Id) -> bool {
        let is_first = self.first_request.is_none();
        if is_first {
            self.first_request = Some(id);
        }
        is_first
    }

    fn stage(&mut self, id: Id, value: T) {
        self.staged.insert(id, value);
    }

    /// Remove and return the staged value for `id`, if a
    /// `requestWillBeSent` for it was ever seen.
    fn take(&mut self, id: &Id) -> Option<T> {
        self.staged.remove(id)
    }

    fn is_anchor(&self, id: &Id) -> bool {
        self.first_request.as_ref() == Some(id)
    }
}

struct Shared {
    result: Mutex<ProbeResult>,
    netlog: Mutex<NetlogState<RequestId, NetworkLogEntry>>,
}

pub struct EventAssembler {
    target: String,
    shared: Arc<Shared>,
}

/// Handles for the background listener tasks spawned for one target.
/// `stop` aborts them all; dropping without calling `stop` also aborts
/// them, but callers should prefer the explicit call so teardown is
/// visible in the control flow.
pub struct ListenerHandles {
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl ListenerHandles {
    pub async fn stop(self) {
        for task in self.tasks {
            task.abort();
        }
    }
}

impl EventAssembler {
    pub fn new(target: String) -> Self {
        Self {
            target: target.clone(),
            shared: Arc::new(Shared {
                result: Mutex::new(ProbeResult::new(target)),
                netlog: Mutex::new(NetlogState::new()),
            }),
        }
    }

    /// Enable the network domain and set the extra headers / user-agent
    /// that apply to every request this page makes.
    pub async fn prepare(&self, page: &Page, options: &Options) -> Result<(), ProbeError> {
        page.execute(chromiumoxide::cdp::browser_protocol::network::EnableParams::default())
            .await
            .map_err(|e| ProbeError::Cdp(e.to_string()))?;

        page.execute(SetUserAgentOverrideParams::new(options.chrome.user_agent.clone()))
            .await
            .map_err(|e| ProbeError::Cdp(e.to_string()))?;

        let mut headers = serde_json::Map::new();
        for line in &options.chrome.extra_headers {
            match crate::utils::parse_header_line(line) {
                Some((name, value)) => {
                    headers.insert(name, serde_json::Value::String(value));
                }
                None => debug!("skipping malformed extra header line: {line}"),
            }
        }
        if !headers.is_empty() {
            page.execute(SetExtraHttpHeadersParams::new(
                chromiumoxide::cdp::browser_protocol::network::Headers::new(serde_json::Value::Object(headers)),
            ))
            .await
            .map_err(|e| ProbeError::Cdp(e.to_string()))?;
        }

        Ok(())
    }

    /// Start the DevTools event listeners. Must be called before
    /// navigation so no early events are missed.
    pub async fn spawn_listeners(&self, page: &Page, options: &Options) -> Result<ListenerHandles, ProbeError> {
        let mut tasks = Vec::new();
        let save_content = options.scan.save_content;

        // Auto-accept dialogs so a blocking modal never stalls navigation.
        {
            let mut dialogs = page
                .event_listener::<EventJavascriptDialogOpening>()
                .await
                .map_err(|e| ProbeError::Cdp(e.to_string()))?;
            let page = page.clone();
            tasks.push(tokio::spawn(async move {
                while dialogs.next().await.is_some() {
                    let _ = page
                        .execute(HandleJavaScriptDialogParams::builder().accept(true).build().unwrap())
                        .await;
                }
            }));
        }

        // Console API calls.
        {
            let mut console = page
                .event_listener::<EventConsoleApiCalled>()
                .await
                .map_err(|e| ProbeError::Cdp(e.to_string()))?;
            let shared = self.shared.clone();
            tasks.push(tokio::spawn(async move {
                while let Some(event) = console.next().await {
                    let value: String = event
                        .args
                        .iter()
                        .filter_map(|arg| arg.value.as_ref().map(|v| v.to_string()))
                        .collect::<Vec<_>>()
                        .join(" ")
                        .trim()
                        .to_string();
                    if !value.is_empty() {
                        let mut result = shared.result.lock().await;
                        result.console.push(crate::result::ConsoleEntry {
                            kind: format!("console.{:?}", event.r#type).to_lowercase(),
                            value,
                        });
                    }
                }
            }));
        }

        // requestWillBeSent: stage a netlog entry keyed by request id; the
        // first request seen becomes the anchor. Staged entries are not
        // yet part of Result.network[] — they're appended only once their
        // terminal event (response or failure) fires, below.
        //
        // CDP reissues this same event, with the same request id, on every
        // redirect hop: it carries the prior hop's response in
        // `redirect_response` instead of a separate responseReceived event.
        // When that's present the previously staged entry for this id is a
        // finished hop, not an in-flight request — finalize it into
        // Result.network[] using the redirect response before staging the
        // new hop, or it's silently overwritten and the hop is lost.
        {
            let mut requests = page
                .event_listener::<EventRequestWillBeSent>()
                .await
                .map_err(|e| ProbeError::Cdp(e.to_string()))?;
            let shared = self.shared.clone();
            tasks.push(tokio::spawn(async move {
                while let Some(event) = requests.next().await {
                    let mut entry = NetworkLogEntry::new(event.request.url.clone());
                    entry.time = Utc::now();

                    let prior_hop = {
                        let mut netlog = shared.netlog.lock().await;
                        netlog.note_request(event.request_id.clone());
                        let prior_hop = if event.redirect_response.is_some() {
                            netlog.take(&event.request_id)
                        } else {
                            None
                        };
                        netlog.stage(event.request_id.clone(), entry);
                        prior_hop
                    };

                    if let (Some(redirect), Some(mut prior)) = (&event.redirect_response, prior_hop) {
                        prior.status_code = redirect.status as u16;
                        prior.url = redirect.url.clone();
                        prior.mime_type = Some(redirect.mime_type.clone());
                        shared.result.lock().await.network.push(prior);
                    }
                }
            }));
        }

        // responseReceived: populate top-level fields for the first
        // request's response; always update the corresponding netlog entry.
        {
            let mut responses = page
                .event_listener::<EventResponseReceived>()
                .await
                .map_err(|e| ProbeError::Cdp(e.to_string()))?;
            let shared = self.shared.clone();
            let page_clone = page.clone();
            tasks.push(tokio::spawn(async move {
                while let Some(event) = responses.next().await {
                    let (is_anchor, staged) = {
                        let mut netlog = shared.netlog.lock().await;
                        let is_anchor = netlog.is_anchor(&event.request_id);
                        (is_anchor, netlog.take(&event.request_id))
                    };

                    if is_anchor {
                        let mut result = shared.result.lock().await;
                        result.final_url = Some(event.response.url.clone());
                        result.response_code = event.response.status as u16;
                        result.response_reason = event.response.status_text.clone();
                        result.protocol = event.response.protocol.clone().unwrap_or_default();
                        result.content_length = event.response.encoded_data_length as i64;
                        result.headers = event
                            .response
                            .headers
                            .inner()
                            .as_object()
                            .map(|obj| {
                                obj.iter()
                                    .map(|(k, v)| crate::result::HeaderEntry {
                                        name: k.clone(),
                                        value: v.as_str().unwrap_or_default().to_string(),
                                    })
                                    .collect()
                            })
                            .unwrap_or_default();

                        if let Some(security) = &event.response.security_details {
                            result.tls = Some(TlsInfo {
                                protocol: security.protocol.clone(),
                                key_exchange: security.key_exchange.clone(),
                                cipher: security.cipher.clone(),
                                subject_name: security.subject_name.clone(),
                                san_list: security.san_list.clone(),
                                issuer: security.issuer.clone(),
                                valid_from: chrono::DateTime::from_timestamp(security.valid_from.inner().round() as i64, 0)
                                    .unwrap_or_default(),
                                valid_to: chrono::DateTime::from_timestamp(security.valid_to.inner().round() as i64, 0)
                                    .unwrap_or_default(),
                                server_signature_algorithm: security.server_signature_algorithm,
                                encrypted_client_hello: security.encrypted_client_hello,
                            });
                        }
                    }

                    if let Some(mut entry) = staged {
                        entry.status_code = event.response.status as u16;
                        entry.url = event.response.url.clone();
                        entry.remote_ip = event.response.remote_ip_address.clone();
                        entry.mime_type = Some(event.response.mime_type.clone());

                        let mut result = shared.result.lock().await;
                        let index = result.network.len();
                        result.network.push(entry);
                        drop(result);

                        if save_content {
                            let shared = shared.clone();
                            let page = page_clone.clone();
                            let request_id = event.request_id.clone();
                            tokio::spawn(async move {
                                if let Ok(body) = page.execute(GetResponseBodyParams::new(request_id)).await {
                                    let mut result = shared.result.lock().await;
                                    if let Some(entry) = result.network.get_mut(index) {
                                        entry.content = Some(body.body.clone());
                                    }
                                }
                            });
                        }
                    }
                }
            }));
        }

        // loadingFailed: anchor failure mutates only top-level fields
        // (deliberately not appended to network[]); sub-request failures
        // are annotated and appended.
        {
            let mut failures = page
                .event_listener::<EventLoadingFailed>()
                .await
                .map_err(|e| ProbeError::Cdp(e.to_string()))?;
            let shared = self.shared.clone();
            tasks.push(tokio::spawn(async move {
                while let Some(event) = failures.next().await {
                    let is_anchor = shared.netlog.lock().await.is_anchor(&event.request_id);

                    if is_anchor {
                        let mut result = shared.result.lock().await;
                        result.mark_failed(event.error_text.clone());
                        continue;
                    }

                    let staged = shared.netlog.lock().await.take(&event.request_id);
                    if let Some(mut entry) = staged {
                        entry.error = Some(event.error_text.clone());
                        shared.result.lock().await.network.push(entry);
                    }
                }
            }));
        }

        Ok(ListenerHandles { tasks })
    }

    pub async fn collect_cookies(&self, page: &Page) {
        match page.execute(GetCookiesParams::default()).await {
            Ok(resp) => {
                let cookies = resp
                    .cookies
                    .iter()
                    .map(|c| CookieInfo {
                        name: c.name.clone(),
                        value: c.value.clone(),
                        domain: c.domain.clone(),
                        path: c.path.clone(),
                        expires: chrono::DateTime::from_timestamp(c.expires.round() as i64, 0)
                            .unwrap_or_default(),
                        size: c.size as i64,
                        http_only: c.http_only,
                        secure: c.secure,
                        session: c.session,
                        priority: format!("{:?}", c.priority),
                        source_scheme: format!("{:?}", c.source_scheme),
                        source_port: c.source_port,
                    })
                    .collect();
                self.shared.result.lock().await.cookies = cookies;
            }
            Err(e) => debug!("failed to collect cookies for {}: {e}", self.target),
        }
    }

    pub async fn collect_title(&self, page: &Page) {
        match page.get_title().await {
            Ok(Some(title)) => self.shared.result.lock().await.title = Some(title),
            Ok(None) => {}
            Err(e) => debug!("failed to collect title for {}: {e}", self.target),
        }
    }

    pub async fn collect_html(&self, page: &Page) {
        match page.content().await {
            Ok(html) => self.shared.result.lock().await.html = Some(html),
            Err(e) => debug!("failed to collect html for {}: {e}", self.target),
        }
    }

    pub async fn into_result(self) -> ProbeResult {
        Arc::try_unwrap(self.shared)
            .map(|shared| shared.result.into_inner())
            .unwrap_or_else(|shared| {
                // A background body-fetch task is still holding a clone; block on the
                // lock instead of panicking, the data is still consistent.
                futures::executor::block_on(async move { shared.result.lock().await.clone() })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::NetlogState;

    #[test]
    fn first_request_becomes_the_anchor() {
        let mut netlog: NetlogState<String, &str> = NetlogState::new();
        assert!(netlog.note_request("req-1".to_string()));
        assert!(!netlog.note_request("req-2".to_string()));
        assert!(!netlog.note_request("req-3".to_string()));

        assert!(netlog.is_anchor(&"req-1".to_string()));
        assert!(!netlog.is_anchor(&"req-2".to_string()));
        assert!(!netlog.is_anchor(&"req-3".to_string()));
    }

    #[test]
    fn only_the_anchor_responds_once_even_with_interleaved_requests() {
        // Simulates two concurrent navigations racing requestWillBeSent
        // events with different request ids; only the first one seen may
        // ever anchor the top-level fields.
        let mut netlog: NetlogState<String, &str> = NetlogState::new();
        netlog.note_request("a".to_string());
        netlog.note_request("b".to_string());

        let anchors: Vec<bool> = ["a", "b", "a", "b"]
            .iter()
            .map(|id| netlog.is_anchor(&id.to_string()))
            .collect();
        assert_eq!(anchors, vec![true, false, true, false]);
    }

    #[test]
    fn staged_value_is_removed_once_taken() {
        let mut netlog: NetlogState<String, &str> = NetlogState::new();
        netlog.note_request("a".to_string());
        netlog.stage("a".to_string(), "first-response");
        netlog.note_request("b".to_string());
        netlog.stage("b".to_string(), "second-response");

        assert_eq!(netlog.take(&"a".to_string()), Some("first-response"));
        // A second terminal event for the same request id (shouldn't
        // happen, but the staging map must not resurrect a stale entry).
        assert_eq!(netlog.take(&"a".to_string()), None);
        assert_eq!(netlog.take(&"b".to_string()), Some("second-response"));
    }

    #[test]
    fn unknown_request_id_has_no_staged_value() {
        let mut netlog: NetlogState<String, &str> = NetlogState::new();
        assert_eq!(netlog.take(&"missing".to_string()), None);
        assert!(!netlog.is_anchor(&"missing".to_string()));
    }

    #[test]
    fn redirect_hop_can_be_taken_and_restaged_under_the_same_id() {
        // Mirrors what the requestWillBeSent handler does across a redirect:
        // the same request id gets requestWillBeSent twice, and the hop in
        // between must be pulled out of staging (to be finalized into
        // network[] by the caller) before the new hop takes its place —
        // never silently overwritten.
        let mut netlog: NetlogState<String, &str> = NetlogState::new();
        netlog.note_request("anchor".to_string());
        netlog.stage("anchor".to_string(), "hop-1 (302)");

        let prior_hop = netlog.take(&"anchor".to_string());
        assert_eq!(prior_hop, Some("hop-1 (302)"));

        netlog.stage("anchor".to_string(), "hop-2 (200)");
        assert_eq!(netlog.take(&"anchor".to_string()), Some("hop-2 (200)"));
    }
}
