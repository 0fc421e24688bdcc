//! Monitor configuration
//!
//! Loaded once at startup from a JSON file (`monitor.json` by default).
//! A missing file or a missing required field is a deploy mistake, not a
//! runtime condition: loading fails and the supervisor aborts.

use crate::error::{MonitorError, MonitorResult};
use serde::Deserialize;
use shared::Participant;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Network endpoint of the monitor's own datagram socket.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointSpec {
    pub ip: String,
    pub port: u16,
}

impl EndpointSpec {
    pub fn socket_addr(&self) -> MonitorResult<SocketAddr> {
        format!("{}:{}", self.ip, self.port)
            .parse()
            .map_err(|e| MonitorError::config(format!("invalid address {}:{}: {e}", self.ip, self.port)))
    }
}

/// Static configuration for one monitored worker process.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSpec {
    /// Address the worker's datagram socket is bound to
    pub ip: String,
    pub port: u16,
    /// Working directory the worker is spawned in
    pub working_dir: PathBuf,
    /// Executable (or launcher) started for this worker
    pub executable: PathBuf,
    /// Arguments passed to the executable
    #[serde(default)]
    pub args: Vec<String>,
    /// URL fetched by the active health probe while the worker is alive
    pub test_url: String,
}

impl WorkerSpec {
    pub fn socket_addr(&self) -> MonitorResult<SocketAddr> {
        format!("{}:{}", self.ip, self.port)
            .parse()
            .map_err(|e| MonitorError::config(format!("invalid address {}:{}: {e}", self.ip, self.port)))
    }
}

/// Mail portal settings. Absent mail config disables the portal.
#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub fetch_interval_secs: u64,
    /// The only sender whose commands are honored
    pub authorized_user: String,
    /// The monitor's own mail identity (From: of outbound mail)
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    pub monitor: EndpointSpec,
    pub http: WorkerSpec,
    pub https: WorkerSpec,
    pub mail: Option<MailConfig>,
}

impl MonitorConfig {
    pub fn load(path: &Path) -> MonitorResult<MonitorConfig> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            MonitorError::config(format!("could not read {}: {e}", path.display()))
        })?;
        let config: MonitorConfig = serde_json::from_str(&text).map_err(|e| {
            MonitorError::config(format!("could not parse {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> MonitorResult<()> {
        self.monitor.socket_addr()?;
        for (participant, worker) in [(Participant::Http, &self.http), (Participant::Https, &self.https)] {
            worker.socket_addr()?;
            if worker.executable.as_os_str().is_empty() {
                return Err(MonitorError::config(format!("{participant}: executable is empty")));
            }
            if !worker.test_url.starts_with("http://") && !worker.test_url.starts_with("https://") {
                return Err(MonitorError::config(format!(
                    "{participant}: test_url must be an http(s) URL, got \"{}\"",
                    worker.test_url
                )));
            }
        }
        Ok(())
    }

    pub fn worker(&self, participant: Participant) -> Option<&WorkerSpec> {
        match participant {
            Participant::Http => Some(&self.http),
            Participant::Https => Some(&self.https),
            Participant::Monitor => None,
        }
    }

    /// Peer address table for the message bus, one row per monitored worker.
    pub fn peer_table(&self) -> MonitorResult<HashMap<Participant, SocketAddr>> {
        Ok(HashMap::from([
            (Participant::Http, self.http.socket_addr()?),
            (Participant::Https, self.https.socket_addr()?),
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_json() -> &'static str {
        r#"{
            "monitor": { "ip": "127.0.0.1", "port": 8200 },
            "http": {
                "ip": "127.0.0.1", "port": 8201,
                "working_dir": "/srv/blog/http",
                "executable": "/usr/bin/blog-http",
                "args": ["--mode", "redirector"],
                "test_url": "http://127.0.0.1:8080/"
            },
            "https": {
                "ip": "127.0.0.1", "port": 8202,
                "working_dir": "/srv/blog/https",
                "executable": "/usr/bin/blog-https",
                "test_url": "https://127.0.0.1:8443/"
            },
            "mail": {
                "fetch_interval_secs": 60,
                "authorized_user": "operator@example.com",
                "user": "monitor@example.com",
                "password": "hunter2"
            }
        }"#
    }

    #[test]
    fn test_load_valid_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(sample_json().as_bytes()).unwrap();

        let config = MonitorConfig::load(file.path()).unwrap();
        assert_eq!(config.http.args, vec!["--mode", "redirector"]);
        assert!(config.https.args.is_empty());
        assert_eq!(config.mail.as_ref().unwrap().fetch_interval_secs, 60);

        let peers = config.peer_table().unwrap();
        assert_eq!(peers[&Participant::Http].port(), 8201);
        assert_eq!(peers[&Participant::Https].port(), 8202);
    }

    #[test]
    fn test_bad_test_url_is_fatal() {
        let text = sample_json().replace("http://127.0.0.1:8080/", "ftp://oops/");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();

        let err = MonitorConfig::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("test_url"));
    }

    #[test]
    fn test_missing_file_is_fatal() {
        assert!(MonitorConfig::load(Path::new("/nonexistent/monitor.json")).is_err());
    }
}
