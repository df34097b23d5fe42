//! In-process fetcher for pipeline tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;

use crate::fetch::{Fetched, Fetcher};
use crate::headers::HeaderSet;
use replica_core::Error;

/// Serves canned bodies and records every request.
#[derive(Default)]
pub struct FakeFetcher {
    bodies: HashMap<String, (Bytes, Option<String>)>,
    failing: HashSet<String>,
    calls: AtomicUsize,
    requested: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(mut self, url: &str, body: impl Into<Bytes>, content_type: Option<&str>) -> Self {
        self.bodies.insert(url.to_string(), (body.into(), content_type.map(String::from)));
        self
    }

    pub fn fail(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, target: &str, _headers: &HeaderSet) -> Result<Fetched, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().unwrap().push(target.to_string());

        if self.failing.contains(target) {
            return Err(Error::NetworkExhausted { url: target.to_string(), last_error: "HTTP_ERROR: status 503".into() });
        }

        match self.bodies.get(target) {
            Some((body, content_type)) => {
                Ok(Fetched { body: body.clone(), content_type: content_type.clone(), relay: "fake".into() })
            }
            None => {
                Err(Error::NetworkExhausted { url: target.to_string(), last_error: "HTTP_ERROR: status 404".into() })
            }
        }
    }
}
