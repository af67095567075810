mod proxy;
mod quota_route;

use std::io::Cursor;
use std::sync::Arc;
use std::thread;

use reqwest::Client;
use serde_json::{json, Value};
use tiny_http::{Header, ListenAddr, Response, Server};
use tokio::runtime::Handle;

use crate::error::{BackendError, Result};

pub use proxy::handle_proxy;
pub use quota_route::handle_quota;

pub const PROXY_PATH: &str = "/api/proxy";
pub const QUOTA_PATH: &str = "/api/one-api/quota";

/// Transport-neutral view of an inbound request. The body is read once up front.
#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    pub method: String,
    /// Path plus query string, as sent on the request line.
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl InboundRequest {
    /// An unreadable body is logged and treated as empty; the proxy then forwards
    /// without one.
    pub fn read_from(request: &mut tiny_http::Request) -> Self {
        let body = read_body(request.as_reader());
        Self {
            method: request.method().to_string(),
            url: request.url().to_string(),
            headers: request
                .headers()
                .iter()
                .map(|header| (header.field.to_string(), header.value.to_string()))
                .collect(),
            body,
        }
    }

    pub fn path(&self) -> &str {
        self.url.split('?').next().unwrap_or_default()
    }

    /// Case-insensitive lookup of the first header with this name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(field, _)| field.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct OutboundResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl OutboundResponse {
    pub fn json(status: u16, payload: &Value) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: serde_json::to_vec(payload).unwrap_or_default(),
        }
    }

    pub fn error(status: u16, message: &str) -> Self {
        Self::json(status, &json!({ "error": message }))
    }

    pub fn failure(message: &str, details: &str) -> Self {
        Self::json(500, &json!({ "error": message, "details": details }))
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(field, _)| field.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn body_json(&self) -> serde_json::Result<Value> {
        serde_json::from_slice(&self.body)
    }

    fn into_response(self) -> Response<Cursor<Vec<u8>>> {
        let mut response = Response::from_data(self.body).with_status_code(self.status);
        for (field, value) in self.headers {
            match Header::from_bytes(field.as_bytes(), value.as_bytes()) {
                Ok(header) => response.add_header(header),
                Err(_) => log::warn!("dropping unrepresentable response header '{field}'"),
            }
        }
        response
    }
}

pub async fn dispatch(client: &Client, request: &InboundRequest) -> OutboundResponse {
    match request.path() {
        PROXY_PATH => handle_proxy(client, request).await,
        QUOTA_PATH if request.method.eq_ignore_ascii_case("GET") => {
            handle_quota(client, request).await
        }
        QUOTA_PATH => OutboundResponse::error(405, "Method not allowed"),
        _ => OutboundResponse::error(404, "Not found"),
    }
}

#[derive(Debug)]
struct ServerState {
    client: Client,
    runtime: Handle,
}

/// Binds the listener and returns it with the port actually in use.
pub fn bind(addr: &str) -> Result<(Server, u16)> {
    let server = Server::http(addr)
        .map_err(|err| BackendError::Server(format!("failed to bind {addr}: {err}")))?;
    let port = match server.server_addr() {
        ListenAddr::IP(addr) => addr.port(),
        _ => {
            return Err(BackendError::Server(
                "listener address unavailable".to_string(),
            ))
        }
    };
    Ok((server, port))
}

/// Serves requests until the listener shuts down. Each request gets its own thread so a
/// slow upstream only stalls the request waiting on it.
pub fn serve(server: Server, runtime: Handle) {
    let state = Arc::new(ServerState {
        client: Client::new(),
        runtime,
    });

    for request in server.incoming_requests() {
        let state = state.clone();
        thread::spawn(move || handle_request(&state, request));
    }
}

fn read_body(reader: &mut dyn std::io::Read) -> Vec<u8> {
    let mut body = Vec::new();
    match reader.read_to_end(&mut body) {
        Ok(_) => body,
        Err(err) => {
            log::error!("error processing request body: {err}");
            Vec::new()
        }
    }
}

fn handle_request(state: &ServerState, mut request: tiny_http::Request) {
    let inbound = InboundRequest::read_from(&mut request);

    let response = state.runtime.block_on(dispatch(&state.client, &inbound));
    log::info!("{} {} -> {}", inbound.method, inbound.path(), response.status);

    if let Err(err) = request.respond(response.into_response()) {
        log::warn!("failed to send response: {err}");
    }
}
