//! Per-client session state: the current access token and the CSRF token cell.

use std::sync::{Mutex, PoisonError, RwLock};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};

use super::error::ClientError;

pub type CsrfFetch = BoxFuture<'static, Result<String, ClientError>>;
type SharedCsrf = Shared<CsrfFetch>;

/// Session context owned by one client.
///
/// The CSRF cell holds a single shared fetch. Every caller awaits the same
/// future, so concurrent callers issue one request between them.
#[derive(Default)]
pub struct Session {
    access_token: RwLock<Option<String>>,
    csrf: Mutex<Option<SharedCsrf>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn access_token(&self) -> Option<String> {
        self.access_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_access_token(&self, token: Option<String>) {
        *self
            .access_token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = token;
    }

    /// Install a new CSRF fetch, replacing any cached one. Returns the shared handle.
    pub fn replace_csrf(&self, fetch: CsrfFetch) -> Shared<CsrfFetch> {
        let shared = fetch.shared();
        *self.csrf.lock().unwrap_or_else(PoisonError::into_inner) = Some(shared.clone());
        shared
    }

    /// Await the cached CSRF fetch, starting one with `start` if the cell is empty.
    ///
    /// A failed fetch is evicted so the next caller starts over; a fetch that
    /// was already replaced by a rotation is left alone.
    pub async fn csrf_token<F>(&self, start: F) -> Result<String, ClientError>
    where
        F: FnOnce() -> CsrfFetch,
    {
        let fetch = {
            let mut cell = self.csrf.lock().unwrap_or_else(PoisonError::into_inner);
            match cell.as_ref() {
                Some(fetch) => fetch.clone(),
                None => {
                    let fetch = start().shared();
                    *cell = Some(fetch.clone());
                    fetch
                }
            }
        };

        let result = fetch.clone().await;
        if result.is_err() {
            let mut cell = self.csrf.lock().unwrap_or_else(PoisonError::into_inner);
            if cell.as_ref().is_some_and(|current| current.ptr_eq(&fetch)) {
                *cell = None;
            }
        }
        result
    }
}
