//! HTTP implementation of the store [`Backend`].
//!
//! Talks to the platform REST API and to the public status page. Every
//! per-account call authenticates with that account's own session cookie;
//! an account without one fails with an authentication error rather than
//! borrowing another account's session. Stored accounts, their cookies and
//! the developer-mode flag live in memory, seeded from the config, since
//! the desktop shell that normally persists them is not part of the monitor.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use circle_core::{
    AccountId, BackendError, CircleResult, LimitedAvatar, LimitedUserFriend, LimitedWorld,
    StatusResponse, StoredAccount, User, UserStatus,
};
use circle_store::Backend;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, COOKIE, ORIGIN, USER_AGENT};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::config::{MonitorConfig, RetryConfig};
use crate::error::MonitorError;

pub const USER_AGENT_STRING: &str = "VRC-Circle/0.0.1 contact@kirameki.cafe";

const PAGE_SIZE: usize = 100;

pub struct HttpBackend {
    client: reqwest::Client,
    api_base_url: String,
    status_url: String,
    /// Cookie for probing the signed-in session when no account is active.
    session_cookie: Option<String>,
    cookies: Mutex<HashMap<AccountId, String>>,
    retry: RetryConfig,
    accounts: Mutex<Vec<StoredAccount>>,
    developer_mode: AtomicBool,
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackend")
            .field("api_base_url", &self.api_base_url)
            .field("status_url", &self.status_url)
            .field("session", &self.session_cookie.is_some())
            .field("accounts_with_cookie", &self.lock_cookies().len())
            .finish_non_exhaustive()
    }
}

impl HttpBackend {
    pub fn new(config: &MonitorConfig) -> Result<Self, MonitorError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .default_headers(default_headers())
            .build()?;

        Ok(Self {
            client,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            status_url: config.status_url.clone(),
            session_cookie: config.auth_cookie.clone(),
            cookies: Mutex::new(config.session_cookies()),
            retry: config.retry.clone(),
            accounts: Mutex::new(config.stored_accounts()),
            developer_mode: AtomicBool::new(config.developer_mode),
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url, path)
    }

    /// Cookie authenticating as `account`, or the default session for `None`.
    fn cookie_for(&self, account: Option<&AccountId>) -> CircleResult<String> {
        let cookie = match account {
            Some(id) => self.lock_cookies().get(id).cloned(),
            None => self.session_cookie.clone(),
        };
        cookie.ok_or_else(|| {
            let message = match account {
                Some(id) => format!("Not authenticated as {}", id),
                None => "Not authenticated".to_string(),
            };
            BackendError::auth(message).into()
        })
    }

    fn lock_accounts(&self) -> std::sync::MutexGuard<'_, Vec<StoredAccount>> {
        self.accounts.lock().unwrap_or_else(|err| err.into_inner())
    }

    fn lock_cookies(&self) -> std::sync::MutexGuard<'_, HashMap<AccountId, String>> {
        self.cookies.lock().unwrap_or_else(|err| err.into_inner())
    }

    /// Send a request, retrying rate limits, server errors and transport
    /// failures with exponential backoff.
    async fn send<F>(&self, build: F) -> CircleResult<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt: u8 = 0;
        let mut backoff = Duration::from_millis(self.retry.initial_ms);
        let max_backoff = Duration::from_millis(self.retry.max_ms);

        loop {
            let outcome = build().send().await;
            let exhausted = attempt >= self.retry.max_attempts;

            let wait = match outcome {
                Ok(response) if is_retryable(response.status()) && !exhausted => {
                    retry_wait(retry_after(&response), backoff, max_backoff)
                }
                Ok(response) => return check_status(response).await,
                Err(err) if !exhausted => {
                    debug!(error = %err, attempt, "Request failed, retrying");
                    backoff
                }
                Err(err) => return Err(map_transport_error(err).into()),
            };

            warn!(attempt, wait_ms = wait.as_millis() as u64, "Backing off before retry");
            tokio::time::sleep(wait).await;
            attempt += 1;
            backoff = (backoff * 2).min(max_backoff);
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, cookie: Option<&str>) -> CircleResult<T> {
        let response = self
            .send(|| {
                let request = self.client.get(url);
                match cookie {
                    Some(cookie) => request.header(COOKIE, cookie),
                    None => request,
                }
            })
            .await?;
        decode(response).await
    }

    async fn fetch_friends(
        &self,
        cookie: &str,
        offline: bool,
    ) -> CircleResult<Vec<LimitedUserFriend>> {
        collect_pages(PAGE_SIZE, |offset| {
            let url = self.api_url(&format!(
                "/auth/user/friends?offline={}&n={}&offset={}",
                offline, PAGE_SIZE, offset
            ));
            async move { self.get_json(&url, Some(cookie)).await }
        })
        .await
    }
}

fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_STRING));
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    headers.insert(ORIGIN, HeaderValue::from_static("https://vrchat.com"));
    headers
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get("retry-after")
        .and_then(|value| value.to_str().ok())
        .and_then(parse_retry_after)
}

/// Server-requested wait, else the current backoff, capped at `max`.
fn retry_wait(requested: Option<Duration>, backoff: Duration, max: Duration) -> Duration {
    requested.unwrap_or(backoff).min(max)
}

fn parse_retry_after(header: &str) -> Option<Duration> {
    header.trim().parse::<u64>().ok().map(Duration::from_secs)
}

async fn check_status(response: Response) -> CircleResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, &body).into())
}

/// Map an unsuccessful HTTP status to the backend error taxonomy.
pub fn status_error(status: StatusCode, body: &str) -> BackendError {
    let message = if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("Request failed").to_string()
    } else {
        body.trim().to_string()
    };
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendError::auth(message),
        StatusCode::TOO_MANY_REQUESTS => BackendError::RateLimit(message),
        _ => BackendError::http(status.as_u16(), message),
    }
}

fn map_transport_error(err: reqwest::Error) -> BackendError {
    if err.is_decode() {
        BackendError::parse(err.to_string())
    } else if err.is_timeout() {
        BackendError::network(format!("Request timed out: {}", err))
    } else {
        BackendError::network(err.to_string())
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> CircleResult<T> {
    let bytes = response
        .bytes()
        .await
        .map_err(map_transport_error)?;
    serde_json::from_slice(&bytes).map_err(|err| BackendError::from(err).into())
}

/// Fetch `offset`-paged results until a short or empty page.
pub async fn collect_pages<T, F, Fut>(page_size: usize, mut fetch_page: F) -> CircleResult<Vec<T>>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = CircleResult<Vec<T>>>,
{
    let mut results = Vec::new();
    let mut offset = 0;
    loop {
        let mut page = fetch_page(offset).await?;
        let count = page.len();
        results.append(&mut page);
        if count < page_size {
            break;
        }
        offset += count;
    }
    Ok(results)
}

/// Online friends first, then offline friends not already listed.
fn merge_friends(
    online: Vec<LimitedUserFriend>,
    offline: Vec<LimitedUserFriend>,
) -> Vec<LimitedUserFriend> {
    let mut seen = HashSet::new();
    online
        .into_iter()
        .chain(offline)
        .filter(|friend| seen.insert(friend.id.clone()))
        .collect()
}

#[async_trait]
impl Backend for HttpBackend {
    async fn current_user(&self, account: Option<&AccountId>) -> CircleResult<User> {
        let cookie = self.cookie_for(account)?;
        let user: User = self
            .get_json(&self.api_url("/auth/user"), Some(cookie.as_str()))
            .await?;
        if let Some(expected) = account {
            if &user.id != expected {
                return Err(BackendError::auth(format!(
                    "Session belongs to {}, not {}",
                    user.id, expected
                ))
                .into());
            }
        }
        Ok(user)
    }

    async fn friends(&self, account: &AccountId) -> CircleResult<Vec<LimitedUserFriend>> {
        let cookie = self.cookie_for(Some(account))?;
        let online = self.fetch_friends(&cookie, false).await?;
        let offline = self.fetch_friends(&cookie, true).await?;
        let friends = merge_friends(online, offline);
        debug!(account = %account, count = friends.len(), "Fetched friends");
        Ok(friends)
    }

    async fn uploaded_worlds(&self, account: &AccountId) -> CircleResult<Vec<LimitedWorld>> {
        let cookie = self.cookie_for(Some(account))?;
        let cookie = cookie.as_str();
        let worlds: Vec<LimitedWorld> = collect_pages(PAGE_SIZE, |offset| {
            let url = self.api_url(&format!(
                "/worlds?user=me&n={}&offset={}&order=descending&sort=updated",
                PAGE_SIZE, offset
            ));
            async move { self.get_json(&url, Some(cookie)).await }
        })
        .await?;
        debug!(account = %account, count = worlds.len(), "Fetched uploaded worlds");
        Ok(worlds)
    }

    async fn uploaded_avatars(&self, account: &AccountId) -> CircleResult<Vec<LimitedAvatar>> {
        let cookie = self.cookie_for(Some(account))?;
        let cookie = cookie.as_str();
        let avatars: Vec<LimitedAvatar> = collect_pages(PAGE_SIZE, |offset| {
            let url = self.api_url(&format!(
                "/avatars?user=me&releaseStatus=all&sort=updated&order=descending&n={}&offset={}",
                PAGE_SIZE, offset
            ));
            async move { self.get_json(&url, Some(cookie)).await }
        })
        .await?;
        debug!(account = %account, count = avatars.len(), "Fetched uploaded avatars");
        Ok(avatars)
    }

    async fn accounts(&self) -> CircleResult<Vec<StoredAccount>> {
        Ok(self.lock_accounts().clone())
    }

    async fn remove_account(&self, account: &AccountId) -> CircleResult<()> {
        let mut accounts = self.lock_accounts();
        let before = accounts.len();
        accounts.retain(|stored| &stored.user_id != account);
        if accounts.len() == before {
            return Err(BackendError::InvalidInput(format!("Unknown account {}", account)).into());
        }
        drop(accounts);
        self.lock_cookies().remove(account);
        info!(account = %account, "Account forgotten");
        Ok(())
    }

    async fn update_status(
        &self,
        account: &AccountId,
        status: UserStatus,
        description: &str,
    ) -> CircleResult<User> {
        let cookie = self.cookie_for(Some(account))?;
        let url = self.api_url(&format!("/users/{}", account));
        let body = serde_json::json!({
            "status": status,
            "statusDescription": description,
        });

        let response = self
            .send(|| {
                self.client
                    .put(&url)
                    .header(COOKIE, cookie.as_str())
                    .json(&body)
            })
            .await?;
        decode(response).await
    }

    async fn developer_mode(&self) -> CircleResult<bool> {
        Ok(self.developer_mode.load(Ordering::SeqCst))
    }

    async fn set_developer_mode(&self, enabled: bool) -> CircleResult<()> {
        self.developer_mode.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    async fn status(&self) -> CircleResult<StatusResponse> {
        self.get_json(&self.status_url, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use circle_core::CircleError;
    use proptest::prelude::*;
    use std::sync::atomic::AtomicUsize;

    fn friend(id: &str) -> LimitedUserFriend {
        serde_json::from_value(serde_json::json!({ "id": id, "displayName": id })).unwrap()
    }

    #[test]
    fn test_status_error_taxonomy() {
        assert_eq!(
            status_error(StatusCode::UNAUTHORIZED, ""),
            BackendError::auth("Unauthorized")
        );
        assert_eq!(
            status_error(StatusCode::TOO_MANY_REQUESTS, "slow down"),
            BackendError::RateLimit("slow down".to_string())
        );
        assert_eq!(
            status_error(StatusCode::NOT_FOUND, " missing "),
            BackendError::http(404, "missing")
        );
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable(StatusCode::BAD_GATEWAY));
        assert!(!is_retryable(StatusCode::NOT_FOUND));
        assert!(!is_retryable(StatusCode::OK));
    }

    #[test]
    fn test_parse_retry_after_seconds() {
        assert_eq!(parse_retry_after(" 3 "), Some(Duration::from_secs(3)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[test]
    fn test_retry_wait_is_capped() {
        let backoff = Duration::from_millis(200);
        let max = Duration::from_secs(10);
        assert_eq!(retry_wait(None, backoff, max), backoff);
        assert_eq!(retry_wait(Some(Duration::from_secs(2)), backoff, max), Duration::from_secs(2));
        assert_eq!(retry_wait(parse_retry_after("86400"), backoff, max), max);
    }

    #[test]
    fn test_merge_friends_prefers_online_entry() {
        let mut online_a = friend("usr_a");
        online_a.location = Some("wrld_1:1".to_string());
        let merged = merge_friends(
            vec![online_a.clone(), friend("usr_b")],
            vec![friend("usr_a"), friend("usr_c")],
        );

        let ids: Vec<&str> = merged.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["usr_a", "usr_b", "usr_c"]);
        assert_eq!(merged[0], online_a);
    }

    #[tokio::test]
    async fn test_collect_pages_stops_on_short_page() {
        let calls = AtomicUsize::new(0);
        let items = collect_pages(2, |offset| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                let page: Vec<usize> = (offset..(offset + 2).min(5)).collect();
                Ok::<_, CircleError>(page)
            }
        })
        .await
        .unwrap();

        assert_eq!(items, vec![0, 1, 2, 3, 4]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_collect_pages_propagates_errors() {
        let result: CircleResult<Vec<u8>> = collect_pages(10, |_| async {
            Err(CircleError::from(BackendError::network("offline")))
        })
        .await;
        assert_eq!(result, Err(CircleError::from(BackendError::network("offline"))));
    }

    #[tokio::test]
    async fn test_local_accounts_and_developer_mode() {
        let config: MonitorConfig = toml::from_str(
            r#"
api_base_url = "https://api.example.com/api/1/"
status_url = "https://status.example.com/api/v2/status.json"
request_timeout_ms = 1000
poll_interval_ms = 1000
developer_mode = true

[retry]
max_attempts = 0
initial_ms = 1
max_ms = 1

[log]
json = false
buffer_capacity = 10

[[accounts]]
user_id = "usr_a"
username = "a"
display_name = "A"
last_login = "2024-01-01T00:00:00Z"
"#,
        )
        .unwrap();
        let backend = HttpBackend::new(&config).unwrap();

        assert_eq!(backend.api_url("/auth/user"), "https://api.example.com/api/1/auth/user");
        assert!(backend.developer_mode().await.unwrap());
        backend.set_developer_mode(false).await.unwrap();
        assert!(!backend.developer_mode().await.unwrap());

        let account = AccountId::from("usr_a");
        assert_eq!(backend.accounts().await.unwrap().len(), 1);
        backend.remove_account(&account).await.unwrap();
        assert!(backend.remove_account(&account).await.is_err());

        let err = backend.current_user(None).await.unwrap_err();
        assert_eq!(err, CircleError::from(BackendError::auth("Not authenticated")));
    }

    #[tokio::test]
    async fn test_calls_never_borrow_another_accounts_session() {
        let config: MonitorConfig = toml::from_str(
            r#"
api_base_url = "https://api.example.invalid/api/1"
status_url = "https://status.example.invalid/api/v2/status.json"
request_timeout_ms = 1000
poll_interval_ms = 1000
auth_cookie = "auth=a"
active_account = "usr_a"

[retry]
max_attempts = 0
initial_ms = 1
max_ms = 1

[log]
json = false
buffer_capacity = 10

[[accounts]]
user_id = "usr_a"
username = "a"
display_name = "A"
last_login = "2024-01-01T00:00:00Z"

[[accounts]]
user_id = "usr_b"
username = "b"
display_name = "B"
last_login = "2024-01-02T00:00:00Z"
"#,
        )
        .unwrap();
        let backend = HttpBackend::new(&config).unwrap();
        let usr_a = AccountId::from("usr_a");
        let usr_b = AccountId::from("usr_b");
        let not_b = CircleError::from(BackendError::auth("Not authenticated as usr_b"));

        assert_eq!(backend.cookie_for(Some(&usr_a)).unwrap(), "auth=a");
        assert_eq!(backend.cookie_for(None).unwrap(), "auth=a");
        assert_eq!(backend.uploaded_worlds(&usr_b).await.unwrap_err(), not_b);
        assert_eq!(backend.uploaded_avatars(&usr_b).await.unwrap_err(), not_b);
        assert_eq!(backend.friends(&usr_b).await.unwrap_err(), not_b);
        assert_eq!(
            backend.update_status(&usr_b, UserStatus::Busy, "").await.unwrap_err(),
            not_b
        );
        assert_eq!(backend.current_user(Some(&usr_b)).await.unwrap_err(), not_b);

        backend.remove_account(&usr_a).await.unwrap();
        assert!(backend.cookie_for(Some(&usr_a)).is_err());
    }

    proptest! {
        #[test]
        fn prop_pages_concatenate_in_order(total in 0usize..350, page_size in 1usize..64) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let items = runtime.block_on(collect_pages(page_size, |offset| async move {
                Ok::<_, CircleError>((offset..(offset + page_size).min(total)).collect::<Vec<_>>())
            }));
            prop_assert_eq!(items.unwrap(), (0..total).collect::<Vec<_>>());
        }
    }
}
