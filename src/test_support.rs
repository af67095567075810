//! Loopback upstreams for exercising outbound HTTP in tests.

use std::sync::{Arc, Mutex};
use std::thread;

use tiny_http::{Header, Response, Server};

use crate::server::{bind, InboundRequest};

pub struct MockReply {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl MockReply {
    pub fn json(status: u16, body: &str) -> Self {
        Self::with_content_type(status, "application/json", body)
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self::with_content_type(status, "text/html", body)
    }

    fn with_content_type(status: u16, content_type: &str, body: &str) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".to_string(), content_type.to_string())],
            body: body.as_bytes().to_vec(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

pub struct MockUpstream {
    pub base_url: String,
    requests: Arc<Mutex<Vec<InboundRequest>>>,
}

impl MockUpstream {
    pub fn requests(&self) -> Vec<InboundRequest> {
        self.requests.lock().expect("mock requests mutex poisoned").clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.requests()
            .iter()
            .map(|request| request.path().to_string())
            .collect()
    }
}

/// Starts a server on an ephemeral port that records every request and answers with
/// whatever `handler` returns. The thread lives until the test process exits.
pub fn spawn_upstream<F>(handler: F) -> MockUpstream
where
    F: Fn(&InboundRequest) -> MockReply + Send + 'static,
{
    let (server, port): (Server, u16) = bind("127.0.0.1:0").expect("mock upstream should bind");
    let requests = Arc::new(Mutex::new(Vec::new()));
    let recorded = requests.clone();

    thread::spawn(move || {
        for mut request in server.incoming_requests() {
            let inbound = InboundRequest::read_from(&mut request);
            let reply = handler(&inbound);
            recorded
                .lock()
                .expect("mock requests mutex poisoned")
                .push(inbound);

            let mut response = Response::from_data(reply.body).with_status_code(reply.status);
            for (name, value) in reply.headers {
                let header = Header::from_bytes(name.as_bytes(), value.as_bytes())
                    .expect("mock header should be valid");
                response.add_header(header);
            }
            let _ = request.respond(response);
        }
    });

    MockUpstream {
        base_url: format!("http://127.0.0.1:{port}"),
        requests,
    }
}
