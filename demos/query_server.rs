//! Query server with JSON request routing.
//!
//! Each frame carries `{"msg_id": <n>, "msg": "<text>"}`:
//! - `msg_id` 1 suggests dictionary words starting with `msg`
//! - `msg_id` 2 searches the document set for pages containing `msg`
//!
//! Answers are kept in a bounded LRU cache per query. Unknown ids get an
//! empty response.
//!
//! ```text
//! cargo run --example query_server -- 127.0.0.1:8081
//! ```

use std::{
    collections::{HashMap, VecDeque},
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use anyhow::Context;
use mill_frame::prelude::*;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

const SUGGEST: u32 = 1;
const SEARCH: u32 = 2;
const MAX_RESULTS: usize = 5;
const CACHE_CAPACITY: usize = 256;

type CacheKey = (u32, String);

#[derive(Deserialize, Debug)]
struct Request {
    msg_id: u32,
    msg: String,
}

#[derive(Serialize, Debug)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Response {
    Suggestions { words: Vec<String> },
    Pages { pages: Vec<Page> },
}

#[derive(Serialize, Clone, Debug)]
struct Page {
    title: String,
    summary: String,
}

/// Least-recently-used response cache with a fixed capacity.
struct QueryCache {
    capacity: usize,
    entries: HashMap<CacheKey, Vec<u8>>,
    // front is the least recently used key
    order: VecDeque<CacheKey>,
}

impl QueryCache {
    fn new(capacity: usize) -> Self {
        QueryCache {
            capacity,
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    fn get(&mut self, key: &CacheKey) -> Option<Vec<u8>> {
        let hit = self.entries.get(key).cloned()?;
        self.touch(key);
        Some(hit)
    }

    fn insert(&mut self, key: CacheKey, value: Vec<u8>) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.insert(key.clone(), value).is_some() {
            self.touch(&key);
            return;
        }
        self.order.push_back(key);
        while self.entries.len() > self.capacity {
            match self.order.pop_front() {
                Some(evicted) => {
                    self.entries.remove(&evicted);
                }
                None => break,
            }
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn touch(&mut self, key: &CacheKey) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            if let Some(k) = self.order.remove(pos) {
                self.order.push_back(k);
            }
        }
    }
}

struct QueryService {
    words: Vec<String>,
    pages: Vec<Page>,
    cache: Mutex<QueryCache>,
}

impl QueryService {
    fn new() -> Self {
        let words = [
            "reactor", "read", "ready", "register", "request", "response", "route",
            "socket", "send", "server", "service", "signal", "stream",
        ];
        let pages = [
            ("Reactors", "A reactor waits for readiness and dispatches events."),
            ("Framing", "A length header tells the reader how many bytes follow."),
            ("Worker pools", "Workers compute responses and hand them back to the reactor."),
        ];
        QueryService {
            words: words.iter().map(|w| w.to_string()).collect(),
            pages: pages
                .iter()
                .map(|(title, summary)| Page {
                    title: title.to_string(),
                    summary: summary.to_string(),
                })
                .collect(),
            cache: Mutex::new(QueryCache::new(CACHE_CAPACITY)),
        }
    }

    fn answer(&self, request: &Request) -> Option<Response> {
        match request.msg_id {
            SUGGEST => Some(Response::Suggestions {
                words: self
                    .words
                    .iter()
                    .filter(|word| word.starts_with(&request.msg))
                    .take(MAX_RESULTS)
                    .cloned()
                    .collect(),
            }),
            SEARCH => {
                let needle = request.msg.to_lowercase();
                Some(Response::Pages {
                    pages: self
                        .pages
                        .iter()
                        .filter(|page| {
                            page.title.to_lowercase().contains(&needle)
                                || page.summary.to_lowercase().contains(&needle)
                        })
                        .take(MAX_RESULTS)
                        .cloned()
                        .collect(),
                })
            }
            _ => None,
        }
    }
}

impl Service for QueryService {
    fn call(&self, request: Vec<u8>) -> Vec<u8> {
        let request: Request = match serde_json::from_slice(&request) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!("malformed request: {e}");
                return Vec::new();
            }
        };

        let key = (request.msg_id, request.msg.clone());
        if let Some(hit) = self.cache.lock().ok().and_then(|mut c| c.get(&key)) {
            tracing::debug!("cache hit: {:?}", key);
            return hit;
        }

        let Some(response) = self.answer(&request) else {
            tracing::warn!("unknown msg_id {}", request.msg_id);
            return Vec::new();
        };
        let encoded = match serde_json::to_vec(&response) {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::error!("failed to encode response: {e}");
                return Vec::new();
            }
        };

        if let Ok(mut cache) = self.cache.lock() {
            tracing::debug!("cache miss: {:?} ({} cached)", key, cache.len());
            cache.insert(key, encoded.clone());
        }
        encoded
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let address: SocketAddr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:8081".to_string())
        .parse()
        .context("invalid bind address")?;

    let config = TcpServerConfig::builder().address(address).build();
    let mut server = TcpServer::new(config)?;
    let pool = Arc::new(ThreadPool::new(4)?);

    server.set_connection_callback(|conn| tracing::info!("{} connected", conn.show()));
    server.set_close_callback(|conn| tracing::info!("{} disconnected", conn.show()));
    server.serve(Arc::new(QueryService::new()), pool);

    server.start()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(id: u32, msg: &str) -> CacheKey {
        (id, msg.to_string())
    }

    #[test]
    fn test_cache_evicts_least_recently_used() {
        let mut cache = QueryCache::new(2);
        cache.insert(key(1, "a"), b"A".to_vec());
        cache.insert(key(1, "b"), b"B".to_vec());
        assert_eq!(cache.get(&key(1, "a")), Some(b"A".to_vec()));

        cache.insert(key(1, "c"), b"C".to_vec());
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&key(1, "b")), None);
        assert_eq!(cache.get(&key(1, "a")), Some(b"A".to_vec()));
        assert_eq!(cache.get(&key(1, "c")), Some(b"C".to_vec()));
    }

    #[test]
    fn test_cache_stays_bounded_under_many_queries() {
        let service = QueryService::new();
        for i in 0..CACHE_CAPACITY * 2 {
            let request = format!(r#"{{"msg_id": 1, "msg": "r{i}"}}"#);
            service.call(request.into_bytes());
        }
        assert_eq!(service.cache.lock().unwrap().len(), CACHE_CAPACITY);
    }

    #[test]
    fn test_routes_by_msg_id() {
        let service = QueryService::new();
        let words: serde_json::Value =
            serde_json::from_slice(&service.call(br#"{"msg_id": 1, "msg": "re"}"#.to_vec()))
                .unwrap();
        assert_eq!(words["kind"], "suggestions");
        assert!(words["words"]
            .as_array()
            .unwrap()
            .iter()
            .all(|w| w.as_str().unwrap().starts_with("re")));

        let pages: serde_json::Value =
            serde_json::from_slice(&service.call(br#"{"msg_id": 2, "msg": "reactor"}"#.to_vec()))
                .unwrap();
        assert_eq!(pages["kind"], "pages");
        assert!(!pages["pages"].as_array().unwrap().is_empty());

        assert!(service.call(br#"{"msg_id": 9, "msg": "x"}"#.to_vec()).is_empty());
    }
}
