//! HTTP liveness probe
//!
//! A probe passes when the endpoint answers at all and the body can be read.
//! The response status is deliberately ignored; a worker returning 500 is
//! still up, and restarting it would not help.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::{MonitorError, MonitorResult};
use crate::traits::Prober;
use shared::{process_debug, Participant};

const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

pub struct HttpProber {
    participant: Participant,
    url: String,
    client: reqwest::Client,
}

impl HttpProber {
    pub fn new(participant: Participant, url: impl Into<String>) -> MonitorResult<HttpProber> {
        let client = reqwest::Client::builder()
            .connect_timeout(PROBE_TIMEOUT)
            .timeout(PROBE_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| MonitorError::config(format!("failed to build probe client: {e}")))?;

        Ok(HttpProber { participant, url: url.into(), client })
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn check(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(response) => {
                let status = response.status();
                match response.bytes().await {
                    Ok(_) => {
                        process_debug!(self.participant, "probe {} -> {}", self.url, status);
                        true
                    }
                    Err(e) => {
                        process_debug!(self.participant, "probe {} body read failed: {}", self.url, e);
                        false
                    }
                }
            }
            Err(e) => {
                process_debug!(self.participant, "probe {} failed: {}", self.url, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    async fn one_shot_server(response: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                use tokio::io::AsyncReadExt;
                let _ = stream.read(&mut buf).await;
                let _ = stream.write_all(response).await;
            }
        });
        format!("http://{addr}/")
    }

    #[tokio::test]
    async fn test_probe_succeeds_on_any_response() {
        let url = one_shot_server(
            b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 4\r\n\r\noops",
        )
        .await;
        let prober = HttpProber::new(Participant::Http, url).unwrap();
        assert!(prober.check().await);
    }

    #[tokio::test]
    async fn test_probe_fails_when_nothing_listens() {
        let prober = HttpProber::new(Participant::Http, "http://127.0.0.1:1/").unwrap();
        assert!(!prober.check().await);
    }
}
