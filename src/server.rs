use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use log::{debug, info, warn};
use crate::error_handling::SolutionError;
use crate::health::HealthChecker;
use crate::submit::SolutionRequest;

/// Largest request accepted, headers included.
const MAX_REQUEST_BYTES: usize = 64 * 1024;

/// Status surface (`/health`, `/status`, `/metrics`) plus the
/// `POST /found_block` ingress for solutions detected out of process.
pub struct StatusServer {
    health_checker: Arc<HealthChecker>,
    bind: String,
    port: u16,
}

impl StatusServer {
    pub fn new(health_checker: Arc<HealthChecker>, bind: &str, port: u16) -> Self {
        Self {
            health_checker,
            bind: bind.to_string(),
            port,
        }
    }

    pub async fn start(&self) -> std::io::Result<()> {
        let listener = TcpListener::bind((self.bind.as_str(), self.port)).await?;
        info!("Status server listening on {}:{}", self.bind, self.port);

        loop {
            let (mut socket, peer) = listener.accept().await?;
            let health_checker = Arc::clone(&self.health_checker);

            tokio::spawn(async move {
                let request = match read_request(&mut socket).await {
                    Ok(Some(request)) => request,
                    Ok(None) => return,
                    Err(e) => {
                        debug!("Status request from {} failed: {}", peer, e);
                        return;
                    }
                };

                let response = Self::handle_request(&request, &health_checker).await;

                if let Err(e) = socket.write_all(response.as_bytes()).await {
                    debug!("Status response to {} failed: {}", peer, e);
                }
            });
        }
    }

    async fn handle_request(request: &str, health_checker: &HealthChecker) -> String {
        let Some(request_line) = request.lines().next() else {
            return Self::error_response(400, "Bad Request");
        };
        let parts: Vec<&str> = request_line.split_whitespace().collect();

        if parts.len() < 2 {
            return Self::error_response(400, "Bad Request");
        }

        match (parts[0], parts[1]) {
            ("GET", "/health") => match serde_json::to_string(&health_checker.get_health()) {
                Ok(json) => Self::response(200, "application/json", &json),
                Err(_) => Self::error_response(500, "Internal Server Error"),
            },
            ("GET", "/status") => match serde_json::to_string(&health_checker.get_status()) {
                Ok(json) => Self::response(200, "application/json", &json),
                Err(_) => Self::error_response(500, "Internal Server Error"),
            },
            ("GET", "/metrics") if health_checker.metrics_enabled() => match health_checker.export_metrics() {
                Ok(text) => Self::response(200, "text/plain; version=0.0.4", &text),
                Err(_) => Self::error_response(500, "Internal Server Error"),
            },
            ("POST", "/found_block") => Self::found_block(body(request), health_checker).await,
            _ => Self::error_response(404, "Not Found"),
        }
    }

    async fn found_block(body: &str, health_checker: &HealthChecker) -> String {
        let solution: SolutionRequest = match serde_json::from_str(body) {
            Ok(solution) => solution,
            Err(e) => return Self::error_response(400, &format!("invalid solution: {}", e)),
        };

        match health_checker.submit_solution(solution).await {
            Ok(outcome) => match serde_json::to_string(&outcome) {
                Ok(json) => Self::response(200, "application/json", &json),
                Err(_) => Self::error_response(500, "Internal Server Error"),
            },
            Err(e @ SolutionError::UnknownWork(_)) => {
                warn!("Dropping posted solution: {}", e);
                Self::error_response(409, &e.to_string())
            }
            Err(e) => Self::error_response(400, &e.to_string()),
        }
    }

    fn response(status: u16, content_type: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            Self::reason(status),
            content_type,
            body.len(),
            body
        )
    }

    fn error_response(status: u16, message: &str) -> String {
        let body = serde_json::json!({ "error": message }).to_string();
        Self::response(status, "application/json", &body)
    }

    fn reason(status: u16) -> &'static str {
        match status {
            200 => "OK",
            400 => "Bad Request",
            404 => "Not Found",
            409 => "Conflict",
            _ => "Internal Server Error",
        }
    }
}

fn body(request: &str) -> &str {
    request.split_once("\r\n\r\n").map(|(_, body)| body).unwrap_or("")
}

fn content_length(head: &str) -> usize {
    head.lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

/// Read one request: headers, then as much body as `Content-Length` names.
/// `None` when the peer closed without sending anything.
async fn read_request<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<Option<String>> {
    let mut received = Vec::new();
    let mut buffer = [0u8; 4096];

    loop {
        let n = reader.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        received.extend_from_slice(&buffer[..n]);

        let text = String::from_utf8_lossy(&received);
        if let Some((head, body)) = text.split_once("\r\n\r\n") {
            if body.len() >= content_length(head) {
                break;
            }
        }
        if received.len() >= MAX_REQUEST_BYTES {
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "request too large"));
        }
    }

    if received.is_empty() {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(&received).into_owned()))
}
