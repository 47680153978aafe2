//! Panel transports.

use crate::encode::Payload;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tapestry_core::PanelAddress;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("panel unreachable: {0}")]
    Unreachable(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("panel answered {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("unexpected panel response: {0}")]
    Protocol(String),
}

/// What a panel reports about itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelInfo {
    pub width: u32,
    pub height: u32,
    pub temperature: i32,
    pub screen_model: String,
}

/// One request to one panel. Implementations must not retry.
pub trait PanelTransport: Send + Sync {
    /// Show `payload` full-screen, optionally clearing first.
    fn draw(
        &self,
        address: &PanelAddress,
        payload: &Payload,
        clear: bool,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Blank the screen.
    fn clear(
        &self,
        address: &PanelAddress,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn info(
        &self,
        address: &PanelAddress,
    ) -> impl Future<Output = Result<PanelInfo, TransportError>> + Send;
}

/// HTTP firmware protocol:
/// - `POST /draw` with `width`, `height`, `x`, `y`, `clear` headers and the
///   payload as body,
/// - `POST /clear`,
/// - `GET /` answering [`PanelInfo`] as JSON.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// `connect_timeout` bounds only the TCP connect; whole-request
    /// deadlines are enforced by the dispatcher.
    pub fn new(connect_timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| TransportError::Protocol(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn url(address: &PanelAddress, path: &str) -> Result<reqwest::Url, TransportError> {
        address
            .endpoint(path)
            .map_err(|e| TransportError::Protocol(format!("{address}: {e}")))
    }
}

impl PanelTransport for HttpTransport {
    fn draw(
        &self,
        address: &PanelAddress,
        payload: &Payload,
        clear: bool,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        let request = Self::url(address, "/draw").map(|url| {
            self.client
                .post(url)
                .header(reqwest::header::CONTENT_TYPE, payload.content_type())
                .header("width", payload.width.to_string())
                .header("height", payload.height.to_string())
                .header("x", "0")
                .header("y", "0")
                .header("clear", if clear { "1" } else { "0" })
                .body(payload.body.clone())
        });
        async move {
            let response = request?.send().await.map_err(map_reqwest)?;
            check_status(response).await.map(|_| ())
        }
    }

    fn clear(
        &self,
        address: &PanelAddress,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        let request = Self::url(address, "/clear").map(|url| self.client.post(url));
        async move {
            let response = request?.send().await.map_err(map_reqwest)?;
            check_status(response).await.map(|_| ())
        }
    }

    fn info(
        &self,
        address: &PanelAddress,
    ) -> impl Future<Output = Result<PanelInfo, TransportError>> + Send {
        let request = Self::url(address, "/").map(|url| self.client.get(url));
        async move {
            let response = request?.send().await.map_err(map_reqwest)?;
            let body = check_status(response).await?;
            serde_json::from_slice(&body).map_err(|e| TransportError::Protocol(e.to_string()))
        }
    }
}

async fn check_status(response: reqwest::Response) -> Result<Vec<u8>, TransportError> {
    let status = response.status();
    let body = response.bytes().await.map_err(map_reqwest)?;
    if status.is_success() {
        Ok(body.to_vec())
    } else {
        let message = String::from_utf8_lossy(&body).chars().take(200).collect();
        Err(TransportError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

fn map_reqwest(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(err.to_string())
    } else if err.is_connect() || err.is_request() {
        TransportError::Unreachable(err.to_string())
    } else {
        TransportError::Protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tapestry_core::PayloadEncoding;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// What the fake panel received.
    struct Received {
        head: String,
        body: Vec<u8>,
    }

    /// A panel that answers one request with `status` and `body`.
    async fn fake_panel(
        status: &'static str,
        body: &'static str,
    ) -> (PanelAddress, JoinHandle<Received>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string().parse().unwrap();
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            let head_end = loop {
                let n = stream.read(&mut chunk).await.unwrap();
                assert!(n > 0, "client hung up mid-request");
                buf.extend_from_slice(&chunk[..n]);
                if let Some(i) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    break i + 4;
                }
            };
            let head = String::from_utf8_lossy(&buf[..head_end]).to_lowercase();
            let len = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .map(|v| v.trim().parse::<usize>().unwrap())
                .unwrap_or(0);
            while buf.len() < head_end + len {
                let n = stream.read(&mut chunk).await.unwrap();
                assert!(n > 0, "client hung up mid-body");
                buf.extend_from_slice(&chunk[..n]);
            }
            let reply = format!(
                "HTTP/1.1 {status}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(reply.as_bytes()).await.unwrap();
            let _ = stream.shutdown().await;
            Received {
                head,
                body: buf[head_end..head_end + len].to_vec(),
            }
        });
        (address, handle)
    }

    fn transport() -> HttpTransport {
        HttpTransport::new(Duration::from_secs(2)).unwrap()
    }

    fn gray4(width: u32, height: u32) -> Payload {
        Payload {
            width,
            height,
            encoding: PayloadEncoding::Gray4,
            body: vec![0x5a; (width * height / 2) as usize],
        }
    }

    #[tokio::test]
    async fn draw_posts_geometry_headers_and_body() {
        let (address, panel) = fake_panel("200 OK", "").await;
        let payload = gray4(8, 4);
        transport().draw(&address, &payload, true).await.unwrap();

        let got = panel.await.unwrap();
        assert!(got.head.starts_with("post /draw http/1.1\r\n"), "{}", got.head);
        for header in ["width: 8", "height: 4", "x: 0", "y: 0", "clear: 1"] {
            assert!(got.head.contains(&format!("\r\n{header}\r\n")), "{header} missing");
        }
        assert!(got.head.contains("content-type: application/octet-stream"));
        assert_eq!(got.body, payload.body);
    }

    #[tokio::test]
    async fn draw_without_clear_sends_zero() {
        let (address, panel) = fake_panel("200 OK", "").await;
        transport().draw(&address, &gray4(2, 2), false).await.unwrap();
        assert!(panel.await.unwrap().head.contains("\r\nclear: 0\r\n"));
    }

    #[tokio::test]
    async fn error_status_is_rejected_with_its_body() {
        let (address, panel) = fake_panel("503 Service Unavailable", "busy refreshing").await;
        let err = transport().draw(&address, &gray4(2, 2), false).await.unwrap_err();
        assert_eq!(
            err,
            TransportError::Rejected {
                status: 503,
                message: "busy refreshing".into(),
            }
        );
        panel.await.unwrap();
    }

    #[tokio::test]
    async fn closed_port_is_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address: PanelAddress = listener.local_addr().unwrap().to_string().parse().unwrap();
        drop(listener);

        let err = transport().clear(&address).await.unwrap_err();
        assert!(matches!(err, TransportError::Unreachable(_)), "{err:?}");
    }

    #[tokio::test]
    async fn info_reads_panel_json() {
        let json = r#"{"width":1200,"height":825,"temperature":21,"screen_model":"ED097TC2"}"#;
        let (address, panel) = fake_panel("200 OK", json).await;
        let info = transport().info(&address).await.unwrap();

        assert!(panel.await.unwrap().head.starts_with("get / http/1.1\r\n"));
        assert_eq!(
            info,
            PanelInfo {
                width: 1200,
                height: 825,
                temperature: 21,
                screen_model: "ED097TC2".into(),
            }
        );
    }

    #[tokio::test]
    async fn info_that_is_not_json_is_a_protocol_error() {
        let (address, panel) = fake_panel("200 OK", "<html>hello</html>").await;
        let err = transport().info(&address).await.unwrap_err();
        assert!(matches!(err, TransportError::Protocol(_)), "{err:?}");
        panel.await.unwrap();
    }

    #[tokio::test]
    async fn clear_posts_to_clear() {
        let (address, panel) = fake_panel("200 OK", "").await;
        transport().clear(&address).await.unwrap();
        assert!(panel.await.unwrap().head.starts_with("post /clear http/1.1\r\n"));
    }
}
