//! Canned Engine API server for adapter tests.
//!
//! Serves scripted replies on a Unix socket in a temporary directory. Each
//! `(method, path)` has a queue of replies; the last one repeats. Unscripted
//! requests get a 500.

use std::collections::{HashMap, VecDeque};
use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use hyper::server::conn::Http;
use hyper::service::service_fn;
use hyper::{Body, Method, Request, Response, StatusCode};
use tempfile::TempDir;
use tokio::net::UnixListener;

use super::{DockerRuntime, DockerRuntimeConfig};

const VERSION_PREFIX: &str = "/v1.43";

#[derive(Clone)]
struct Reply {
    status: u16,
    body: Vec<u8>,
}

#[derive(Clone, Default)]
struct Script {
    replies: Arc<Mutex<HashMap<(Method, String), VecDeque<Reply>>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl Script {
    fn respond(&self, method: &Method, path: &str, query: Option<&str>) -> Response<Body> {
        let call = match query {
            Some(q) => format!("{method} {path}?{q}"),
            None => format!("{method} {path}"),
        };
        self.calls.lock().unwrap().push(call);

        let reply = {
            let mut replies = self.replies.lock().unwrap();
            replies
                .get_mut(&(method.clone(), path.to_string()))
                .and_then(|queue| {
                    if queue.len() > 1 {
                        queue.pop_front()
                    } else {
                        queue.front().cloned()
                    }
                })
        };
        let reply = reply.unwrap_or(Reply {
            status: 500,
            body: br#"{"message":"unscripted request"}"#.to_vec(),
        });

        Response::builder()
            .status(StatusCode::from_u16(reply.status).unwrap())
            .header("Content-Type", "application/json")
            .header("Connection", "close")
            .body(Body::from(reply.body))
            .unwrap()
    }
}

pub struct FakeEngine {
    script: Script,
    runtime: DockerRuntime,
    _dir: TempDir,
}

impl FakeEngine {
    /// Bind the socket and start serving. Must run inside a Tokio runtime.
    pub fn start() -> Self {
        let dir = TempDir::new().unwrap();
        let socket_path = dir.path().join("docker.sock");
        let listener = UnixListener::bind(&socket_path).unwrap();
        let script = Script::default();

        let server_script = script.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let script = server_script.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<Body>| {
                        let script = script.clone();
                        async move {
                            let method = req.method().clone();
                            let path = req
                                .uri()
                                .path()
                                .trim_start_matches(VERSION_PREFIX)
                                .to_string();
                            let query = req.uri().query().map(str::to_string);
                            // Drain the request body before answering.
                            let _ = hyper::body::to_bytes(req.into_body()).await;
                            Ok::<_, Infallible>(script.respond(&method, &path, query.as_deref()))
                        }
                    });
                    let _ = Http::new()
                        .http1_only(true)
                        .serve_connection(stream, service)
                        .await;
                });
            }
        });

        let runtime = DockerRuntime::new(DockerRuntimeConfig {
            socket_path,
            stop_timeout_secs: 1,
        });

        Self {
            script,
            runtime,
            _dir: dir,
        }
    }

    pub fn runtime(&self) -> &DockerRuntime {
        &self.runtime
    }

    /// Queue a reply for `method path` (path without the version prefix or
    /// query string).
    pub fn reply(&self, method: Method, path: &str, status: u16, body: impl Into<Vec<u8>>) {
        self.script
            .replies
            .lock()
            .unwrap()
            .entry((method, path.to_string()))
            .or_default()
            .push_back(Reply {
                status,
                body: body.into(),
            });
    }

    /// Requests received so far, as `METHOD path[?query]`.
    pub fn calls(&self) -> Vec<String> {
        self.script.calls.lock().unwrap().clone()
    }
}
