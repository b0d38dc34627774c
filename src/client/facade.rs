//! Request pipeline: CSRF attachment, bearer header and retry-after-refresh.

use std::sync::Arc;

use futures::FutureExt;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::error::ClientError;
use super::session::{CsrfFetch, Session};
use super::transport::{ApiRequest, ApiResponse, ReqwestTransport, Transport};
use crate::types::{AuthResponse, CsrfTokenResponse};

const CSRF_HEADER: &str = "x-csrf-token";
const CSRF_PATH: &str = "/csrf-token";
const REFRESH_PATH: &str = "/auth/token";

/// Result of one attempt of a refreshable call.
enum Outcome<R> {
    Ok(R),
    /// 401: the access token is missing or expired. Carries the original error.
    NeedsRefresh(ClientError),
    Failed(ClientError),
}

/// Progress of a refreshable call. At most one refresh and one replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryState {
    Initial,
    AwaitingRefresh,
    Retried,
}

/// API client facade.
///
/// Construction starts the CSRF token fetch; every call awaits that same
/// fetch and attaches the token along with the current access token.
pub struct ApiClient<T: Transport = ReqwestTransport> {
    pub(super) transport: Arc<T>,
    pub(super) session: Arc<Session>,
    pub(super) cdn: String,
}

impl ApiClient<ReqwestTransport> {
    /// Client for the API at `base_url`; image file names are prefixed with `cdn`.
    pub fn new(base_url: &str, cdn: impl Into<String>) -> Result<Self, ClientError> {
        Ok(Self::with_transport(ReqwestTransport::new(base_url)?, cdn))
    }
}

impl<T: Transport> ApiClient<T> {
    pub fn with_transport(transport: T, cdn: impl Into<String>) -> Self {
        let client = Self {
            transport: Arc::new(transport),
            session: Arc::new(Session::new()),
            cdn: cdn.into(),
        };
        client.start_csrf_fetch();
        client
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn csrf_fetch(transport: Arc<T>) -> CsrfFetch {
        async move {
            let response = transport.send(ApiRequest::get(CSRF_PATH)).await?;
            let body: CsrfTokenResponse = response.into_result()?;
            debug!("CSRF token fetched");
            Ok(body.csrf_token)
        }
        .boxed()
    }

    /// Replace the cached CSRF fetch with a new one and drive it in the
    /// background when a runtime is available.
    fn start_csrf_fetch(&self) {
        let shared = self
            .session
            .replace_csrf(Self::csrf_fetch(self.transport.clone()));
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(shared.map(|_| ()));
        }
    }

    /// Discard the current CSRF token and fetch a new one.
    pub fn rotate_csrf_token(&self) {
        self.start_csrf_fetch();
    }

    async fn csrf_token(&self) -> Result<String, ClientError> {
        let transport = self.transport.clone();
        self.session
            .csrf_token(move || Self::csrf_fetch(transport))
            .await
    }

    /// Send one request with the CSRF and bearer headers attached.
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ClientError> {
        let csrf = self.csrf_token().await?;
        let mut request = request.clone().header(CSRF_HEADER, csrf);
        if let Some(token) = self.session.access_token() {
            request = request.header("authorization", format!("Bearer {}", token));
        }
        self.transport.send(request).await
    }

    /// Perform a call without the refresh path.
    pub async fn request<R: DeserializeOwned>(&self, request: ApiRequest) -> Result<R, ClientError> {
        self.send(&request).await?.into_result()
    }

    async fn attempt<R: DeserializeOwned>(&self, request: &ApiRequest) -> Outcome<R> {
        match self.send(request).await.and_then(|r| r.into_result()) {
            Ok(value) => Outcome::Ok(value),
            Err(e) if e.is_unauthorized() => Outcome::NeedsRefresh(e),
            Err(e) => Outcome::Failed(e),
        }
    }

    /// Exchange the refresh cookie for a new access token and store it.
    pub async fn refresh_token(&self) -> Result<AuthResponse, ClientError> {
        let response: AuthResponse = self.request(ApiRequest::get(REFRESH_PATH)).await?;
        if !response.success {
            return Err(ClientError::RefreshFailed(
                "server did not confirm the refresh".to_string(),
            ));
        }
        self.session
            .set_access_token(Some(response.access_token.clone()));
        Ok(response)
    }

    /// Perform a call; on 401 refresh the access token once and replay the call once.
    ///
    /// A failed refresh is returned as [`ClientError::RefreshFailed`] and the
    /// call is not replayed. Any non-401 failure is returned unchanged.
    pub async fn request_with_refresh<R: DeserializeOwned>(
        &self,
        request: ApiRequest,
    ) -> Result<R, ClientError> {
        let mut state = RetryState::Initial;
        loop {
            state = match state {
                RetryState::Initial => match self.attempt(&request).await {
                    Outcome::Ok(value) => return Ok(value),
                    Outcome::Failed(e) => return Err(e),
                    Outcome::NeedsRefresh(_) => RetryState::AwaitingRefresh,
                },
                RetryState::AwaitingRefresh => {
                    if let Err(e) = self.refresh_token().await {
                        warn!(path = %request.path, error = %e, "Token refresh failed");
                        return Err(match e {
                            ClientError::RefreshFailed(_) => e,
                            other => ClientError::RefreshFailed(other.to_string()),
                        });
                    }
                    RetryState::Retried
                }
                RetryState::Retried => {
                    return match self.attempt(&request).await {
                        Outcome::Ok(value) => Ok(value),
                        Outcome::Failed(e) | Outcome::NeedsRefresh(e) => Err(e),
                    };
                }
            };
        }
    }

    pub(super) fn with_cdn(&self, file_name: &str) -> String {
        format!("{}{}", self.cdn, file_name)
    }
}

#[cfg(test)]
pub(super) mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted transport: answers per path from queues and records every request.
    #[derive(Default)]
    pub struct MockTransport {
        pub responses: Mutex<Vec<(String, VecDeque<ApiResponse>)>>,
        pub requests: Mutex<Vec<ApiRequest>>,
        pub csrf_fetches: AtomicUsize,
    }

    impl MockTransport {
        pub fn respond(&self, path: &str, status: u16, body: serde_json::Value) {
            let mut responses = self.responses.lock().unwrap();
            let response = ApiResponse {
                status,
                body: serde_json::to_vec(&body).unwrap(),
            };
            match responses.iter_mut().find(|(p, _)| p == path) {
                Some((_, queue)) => queue.push_back(response),
                None => responses.push((path.to_string(), VecDeque::from([response]))),
            }
        }

        pub fn calls_to(&self, path: &str) -> Vec<ApiRequest> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.path == path)
                .cloned()
                .collect()
        }
    }

    impl Transport for MockTransport {
        fn send(&self, request: ApiRequest) -> BoxFuture<'_, Result<ApiResponse, ClientError>> {
            Box::pin(async move {
                tokio::task::yield_now().await;
                if request.path == CSRF_PATH {
                    let n = self.csrf_fetches.fetch_add(1, Ordering::SeqCst) + 1;
                    return Ok(ApiResponse {
                        status: 200,
                        body: serde_json::to_vec(
                            &serde_json::json!({ "csrfToken": format!("csrf-{}", n) }),
                        )
                        .unwrap(),
                    });
                }
                self.requests.lock().unwrap().push(request.clone());
                let mut responses = self.responses.lock().unwrap();
                let response = responses
                    .iter_mut()
                    .find(|(p, _)| *p == request.path)
                    .and_then(|(_, queue)| queue.pop_front());
                response.ok_or_else(|| ClientError::Transport(format!("no response for {}", request.path)))
            })
        }
    }

    fn header<'a>(request: &'a ApiRequest, name: &str) -> Option<&'a str> {
        request
            .headers
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    fn auth_ok(token: &str) -> serde_json::Value {
        serde_json::json!({
            "success": true,
            "user": { "id": "u1", "name": "Alice", "email": "a@example.com", "role": "user" },
            "accessToken": token
        })
    }

    fn client() -> ApiClient<MockTransport> {
        ApiClient::with_transport(MockTransport::default(), "")
    }

    #[tokio::test]
    async fn test_concurrent_calls_share_one_csrf_fetch() {
        let client = client();
        client.transport.respond("/a", 200, serde_json::json!(1));
        client.transport.respond("/b", 200, serde_json::json!(2));

        let (a, b) = tokio::join!(
            client.request::<i64>(ApiRequest::post("/a")),
            client.request::<i64>(ApiRequest::post("/b")),
        );

        assert_eq!((a.unwrap(), b.unwrap()), (1, 2));
        assert_eq!(client.transport.csrf_fetches.load(Ordering::SeqCst), 1);
        for path in ["/a", "/b"] {
            let call = &client.transport.calls_to(path)[0];
            assert_eq!(header(call, CSRF_HEADER), Some("csrf-1"));
        }
    }

    #[tokio::test]
    async fn test_401_refreshes_once_and_retries_once() {
        let client = client();
        client.session.set_access_token(Some("expired".into()));
        client
            .transport
            .respond("/order", 401, serde_json::json!({ "error": "Invalid token" }));
        client.transport.respond("/order", 200, serde_json::json!("ok"));
        client.transport.respond(REFRESH_PATH, 200, auth_ok("fresh"));

        let result: String = client
            .request_with_refresh(ApiRequest::post("/order"))
            .await
            .unwrap();

        assert_eq!(result, "ok");
        assert_eq!(client.transport.calls_to(REFRESH_PATH).len(), 1);
        let calls = client.transport.calls_to("/order");
        assert_eq!(calls.len(), 2);
        assert_eq!(header(&calls[0], "authorization"), Some("Bearer expired"));
        assert_eq!(header(&calls[1], "authorization"), Some("Bearer fresh"));
        assert_eq!(client.session.access_token().as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_failed_refresh_does_not_replay() {
        let client = client();
        client
            .transport
            .respond("/order", 401, serde_json::json!({ "error": "Invalid token" }));
        client.transport.respond(
            REFRESH_PATH,
            401,
            serde_json::json!({ "error": "Invalid refresh token" }),
        );

        let result = client
            .request_with_refresh::<String>(ApiRequest::post("/order"))
            .await;

        assert!(matches!(result, Err(ClientError::RefreshFailed(_))));
        assert_eq!(client.transport.calls_to("/order").len(), 1);
        assert_eq!(client.transport.calls_to(REFRESH_PATH).len(), 1);
    }

    #[tokio::test]
    async fn test_unsuccessful_refresh_body_is_a_failure() {
        let client = client();
        client
            .transport
            .respond("/order", 401, serde_json::json!({ "error": "expired" }));
        let mut body = auth_ok("ignored");
        body["success"] = serde_json::json!(false);
        client.transport.respond(REFRESH_PATH, 200, body);

        let result = client
            .request_with_refresh::<String>(ApiRequest::post("/order"))
            .await;

        assert!(matches!(result, Err(ClientError::RefreshFailed(_))));
        assert_eq!(client.transport.calls_to("/order").len(), 1);
        assert_eq!(client.session.access_token(), None);
    }

    #[tokio::test]
    async fn test_non_401_errors_propagate_without_refresh() {
        let client = client();
        client
            .transport
            .respond("/order", 403, serde_json::json!({ "error": "Forbidden" }));

        let result = client
            .request_with_refresh::<String>(ApiRequest::post("/order"))
            .await;

        assert_eq!(result.unwrap_err().status(), Some(403));
        assert!(client.transport.calls_to(REFRESH_PATH).is_empty());
    }

    #[tokio::test]
    async fn test_second_401_is_returned_not_retried() {
        let client = client();
        for _ in 0..2 {
            client
                .transport
                .respond("/order", 401, serde_json::json!({ "error": "nope" }));
        }
        client.transport.respond(REFRESH_PATH, 200, auth_ok("fresh"));

        let result = client
            .request_with_refresh::<String>(ApiRequest::post("/order"))
            .await;

        assert_eq!(result.unwrap_err().status(), Some(401));
        assert_eq!(client.transport.calls_to("/order").len(), 2);
        assert_eq!(client.transport.calls_to(REFRESH_PATH).len(), 1);
    }

    #[tokio::test]
    async fn test_rotate_fetches_new_token() {
        let client = client();
        client.transport.respond("/a", 200, serde_json::json!(1));
        client.transport.respond("/a", 200, serde_json::json!(2));

        client.request::<i64>(ApiRequest::post("/a")).await.unwrap();
        client.rotate_csrf_token();
        client.request::<i64>(ApiRequest::post("/a")).await.unwrap();

        let calls = client.transport.calls_to("/a");
        assert_eq!(header(&calls[0], CSRF_HEADER), Some("csrf-1"));
        assert_eq!(header(&calls[1], CSRF_HEADER), Some("csrf-2"));
    }
}
