//! Client-side transport: per-device streams to the ingestor, established
//! by the two-step gateway handshake, with best-effort reconnect around
//! every send.

use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};

use socket2::{Domain, Socket, Type};
use thiserror::Error;

use scurry_protocol::wire::{ClientHello, HandshakeReply, WireError};
use scurry_protocol::DeviceKind;
use scurry_util::{net, time};

use crate::config::IngestorConfig;

/// How long a broken stream is retried before the lane gives up and drains
/// locally.
pub const RECONNECT_BUDGET: Duration = Duration::from_secs(60);
pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("no address for {0}")]
    Resolve(String),
    #[error("connecting to {0}: {1}")]
    Connect(SocketAddr, io::Error),
    #[error("ingestor assigned out-of-range data port {0}")]
    PortOutOfRange(u16),
    #[error("reconnect budget exhausted after {0:?}")]
    BudgetExhausted(Duration),
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// One device's TCP stream to its assigned ingestor data port.
#[derive(Debug)]
pub struct DeviceLink {
    label: String,
    addr: SocketAddr,
    sock: TcpStream,
}

impl DeviceLink {
    /// Announces the device on the gateway, validates the assigned port and
    /// connects to it.
    pub fn handshake(
        cfg: &IngestorConfig,
        kind: DeviceKind,
        ident: u32,
    ) -> Result<DeviceLink, LinkError> {
        let gateway = resolve(&cfg.ip, cfg.gateway_port)?;
        let mut control = connect(gateway)?;

        let hello = ClientHello {
            kind,
            ident,
            ts: time::wall_ms_now(),
        };
        hello.write_to(&mut control)?;

        let HandshakeReply(port) = HandshakeReply::read_from(&mut control)?;
        if !(cfg.data_port_range_start..cfg.data_port_range_end).contains(&port) {
            return Err(LinkError::PortOutOfRange(port));
        }
        drop(control);

        let addr = resolve(&cfg.ip, port)?;
        let sock = connect(addr)?;
        log::info!("{kind}{ident}: streaming to {addr}");

        Ok(DeviceLink {
            label: format!("{kind}{ident}"),
            addr,
            sock,
        })
    }

    /// Wraps an already-connected stream, bypassing the gateway handshake.
    /// The reconnect path still points at `addr`.
    pub(crate) fn from_parts(label: String, addr: SocketAddr, sock: TcpStream) -> DeviceLink {
        DeviceLink { label, addr, sock }
    }

    /// Full send of one framed record. A transport failure tears the socket
    /// down, reconnects within the budget and retransmits the record.
    pub fn send_record(&mut self, payload: &[u8]) -> Result<(), LinkError> {
        match net::send_all(&mut self.sock, payload) {
            Ok(()) => Ok(()),
            Err(e) => {
                log::warn!("{}: send failed ({e}), reconnecting", self.label);
                self.reconnect()?;
                Ok(net::send_all(&mut self.sock, payload)?)
            }
        }
    }

    fn reconnect(&mut self) -> Result<(), LinkError> {
        let start = Instant::now();
        while start.elapsed() < RECONNECT_BUDGET {
            match connect(self.addr) {
                Ok(sock) => {
                    self.sock = sock;
                    log::info!("{}: connection restored", self.label);
                    return Ok(());
                }
                Err(e) => {
                    log::debug!("{}: reconnect attempt failed: {e}", self.label);
                    thread::sleep(RECONNECT_BACKOFF);
                }
            }
        }
        Err(LinkError::BudgetExhausted(RECONNECT_BUDGET))
    }
}

pub fn resolve(host: &str, port: u16) -> Result<SocketAddr, LinkError> {
    (host, port)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| LinkError::Resolve(format!("{host}:{port}")))
}

pub fn connect(addr: SocketAddr) -> Result<TcpStream, LinkError> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, None)
        .map_err(|e| LinkError::Connect(addr, e))?;
    socket
        .set_reuse_address(true)
        .map_err(|e| LinkError::Connect(addr, e))?;
    socket
        .connect(&addr.into())
        .map_err(|e| LinkError::Connect(addr, e))?;
    Ok(socket.into())
}
