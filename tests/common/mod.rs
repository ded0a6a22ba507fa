#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use http::Method;
use weir::{Handler, Outcome, Request, Response};

/// Records the order in which handlers ran.
#[derive(Clone, Default)]
pub struct Spy(Arc<Mutex<Vec<String>>>);

impl Spy {
    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn record(&self, name: &str) {
        self.0.lock().unwrap().push(name.to_owned());
    }

    /// A handler that records `name` and continues.
    pub fn pass(&self, name: &'static str) -> impl Handler + use<> {
        let spy = self.clone();
        move |_req: Request| {
            spy.record(name);
            async { Outcome::Continue }
        }
    }

    /// A handler that records `name` and responds with `name` as the body.
    pub fn respond(&self, name: &'static str) -> impl Handler + use<> {
        let spy = self.clone();
        move |_req: Request| {
            spy.record(name);
            async move { Response::text(name) }
        }
    }

    /// A handler that records `name` and echoes its params as `k=v` pairs.
    pub fn echo_params(&self, name: &'static str) -> impl Handler + use<> {
        let spy = self.clone();
        move |req: Request| {
            spy.record(name);
            let mut pairs: Vec<String> =
                req.params().iter().map(|(k, v)| format!("{k}={v}")).collect();
            pairs.sort();
            async move { Response::text(pairs.join("&")) }
        }
    }
}

pub fn request(method: Method, uri: &str) -> Request {
    Request::builder().method(method).uri(uri).build()
}

pub fn get(uri: &str) -> Request {
    request(Method::GET, uri)
}

pub fn body_text(res: &Response) -> String {
    String::from_utf8_lossy(res.body()).into_owned()
}

pub fn body_json(res: &Response) -> serde_json::Value {
    serde_json::from_slice(res.body()).expect("json body")
}
