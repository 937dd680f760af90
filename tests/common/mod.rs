//! Shared utilities for integration tests.

use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use probe_manager::config::{ManagerConfig, SourceConfig};

/// Start a programmable mock config authority on an ephemeral port.
///
/// Every GET is answered with whatever `f` returns.
pub async fn start_authority<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        read_request_head(&mut socket).await;
                        let (status, body) = f().await;
                        let status_text = match status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

async fn read_request_head(socket: &mut TcpStream) {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
}

/// Write a shell script that appends a line to `marker` on every SIGHUP.
///
/// The script creates `<dir>/ready` once its trap is installed.
pub fn hup_recorder(dir: &Path, marker: &Path) -> PathBuf {
    let script = dir.join("probed.sh");
    std::fs::write(
        &script,
        format!(
            "trap 'echo reload >> {}' HUP\n: > {}\nwhile true; do sleep 0.05; done\n",
            marker.display(),
            dir.join("ready").display()
        ),
    )
    .unwrap();
    script
}

/// Manager configuration for a test: ephemeral port, sh child, files under `dir`.
#[allow(dead_code)]
pub fn manager_config(dir: &Path, authority: SocketAddr, script: &Path) -> ManagerConfig {
    let mut config = ManagerConfig::default();
    config.rpc.bind_address = "127.0.0.1:0".into();
    config.child.binary = "/bin/sh".into();
    config.child.args = vec![script.display().to_string()];
    config.child.capture_output = false;
    config.child.shutdown_grace_secs = 1;
    config.store.path = dir.join("settings.xml");
    config.source = SourceConfig::Http {
        url: format!("http://{}/config", authority),
    };
    config.reload.fetch_timeout_secs = 2;
    config.reload.backoff_base_ms = 10;
    config.reload.backoff_max_ms = 50;
    config
}

/// Number of lines in `marker`, zero if it does not exist yet.
pub fn signal_count(marker: &Path) -> usize {
    std::fs::read_to_string(marker)
        .map(|s| s.lines().count())
        .unwrap_or(0)
}

/// Poll `cond` until it holds or `limit` passes.
pub async fn wait_for(limit: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    cond()
}
