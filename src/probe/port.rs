use std::{
    io::ErrorKind,
    net::{IpAddr, SocketAddr, TcpStream, ToSocketAddrs},
    sync::mpsc,
    thread,
    time::{Duration, Instant},
};

use tracing::debug;

use super::{PortProbe, ProbeResult};

/// Readiness probe that treats any accepted TCP connection as ready.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpPortProbe;

impl TcpPortProbe {
    /// Resolves `host`, giving up once `deadline` passes. IP literals skip DNS.
    fn resolve(host: &str, port: u16, deadline: Instant) -> Result<Vec<SocketAddr>, String> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(vec![SocketAddr::new(ip, port)]);
        }

        let (tx, rx) = mpsc::channel();
        let target = host.to_string();
        // The lookup cannot be cancelled; a stuck resolver thread finishes on its own.
        thread::spawn(move || {
            let _ = tx.send(
                (target.as_str(), port)
                    .to_socket_addrs()
                    .map(|addrs| addrs.collect::<Vec<_>>()),
            );
        });

        match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok(Ok(addrs)) => Ok(addrs),
            Ok(Err(err)) => Err(format!("cannot resolve {host}:{port}: {err}")),
            Err(_) => Err(format!("resolving {host} timed out")),
        }
    }
}

impl PortProbe for TcpPortProbe {
    fn is_ready(&self, host: &str, port: u16, timeout: Duration) -> ProbeResult {
        let deadline = Instant::now() + timeout;
        let addrs = match Self::resolve(host, port, deadline) {
            Ok(addrs) if !addrs.is_empty() => addrs,
            Ok(_) => return ProbeResult::unhealthy(format!("{host}:{port} resolved to nothing")),
            Err(detail) => return ProbeResult::unhealthy(detail),
        };

        let mut failures = Vec::new();

        for addr in addrs {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                failures.push(format!("{addr}: timed out"));
                break;
            }

            match TcpStream::connect_timeout(&addr, remaining) {
                Ok(_) => {
                    debug!("readiness probe connected to {addr}");
                    return ProbeResult::healthy(format!("{addr} accepting connections"));
                }
                Err(err) if err.kind() == ErrorKind::ConnectionRefused => {
                    failures.push(format!("{addr}: connection refused"));
                }
                Err(err) if err.kind() == ErrorKind::TimedOut => {
                    failures.push(format!("{addr}: timed out after {timeout:?}"));
                }
                Err(err) => failures.push(format!("{addr}: {err}")),
            }
        }

        ProbeResult::unhealthy(failures.join("; "))
    }
}
