use std::collections::{HashMap, VecDeque};

use hyper::Method;
use parking_lot::Mutex;

use crate::exchange::{Request, Response};

/// Method and normalized resource path; the query string never takes part
pub type RouteKey = (Method, String);

/// FIFO queues of canned responses for one service
#[derive(Debug, Default)]
pub struct ResponseQueue {
    queues: Mutex<HashMap<RouteKey, VecDeque<Response>>>,
}

impl ResponseQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `response` behind any earlier responses for the same route
    pub fn push(&self, request: &Request, response: Response) {
        self.queues
            .lock()
            .entry(route_key(request))
            .or_default()
            .push_back(response);
    }

    /// Take the next response for the route `request` belongs to
    pub fn pop(&self, request: &Request) -> Option<Response> {
        let mut queues = self.queues.lock();
        let key = route_key(request);
        let queue = queues.get_mut(&key)?;
        let response = queue.pop_front();
        if queue.is_empty() {
            queues.remove(&key);
        }
        response
    }

    /// Number of responses still waiting for a request
    pub fn pending(&self) -> usize {
        self.queues.lock().values().map(VecDeque::len).sum()
    }

    /// Routes that still have responses queued
    pub fn pending_routes(&self) -> Vec<RouteKey> {
        let mut routes: Vec<RouteKey> = self.queues.lock().keys().cloned().collect();
        routes.sort_by(|a, b| (a.0.as_str(), &a.1).cmp(&(b.0.as_str(), &b.1)));
        routes
    }
}

fn route_key(request: &Request) -> RouteKey {
    (request.method().clone(), request.resource().to_string())
}
