//! The receiver node: a gateway listener admitting device streams, a
//! priority pool of admitted sessions, and one consumer thread per stream.
//! Per-port separation gives every device its own flow control; nothing is
//! multiplexed in-band.

mod consume;
pub mod session;

use std::fs;
use std::io;
use std::net::{SocketAddr, TcpListener};
use std::path::PathBuf;
use std::sync::Arc;

use socket2::{Domain, Socket, Type};
use structopt::StructOpt;
use thiserror::Error;

use scurry_protocol::wire::{ClientHello, HandshakeReply};
use scurry_util::{thread, time};

use crate::config::{ConfigError, Settings};

use self::session::{Session, SessionPool};

#[derive(StructOpt)]
pub struct IngestOpt {
    /// Path to settings.yaml
    #[structopt(long, env = "SCURRY_CONFIG", default_value = "settings.yaml")]
    pub config: PathBuf,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("binding gateway on port {0}: {1}")]
    Bind(u16, io::Error),
    #[error("data port range {0}..{1} exhausted")]
    PortRangeExhausted(u16, u16),
    #[error("creating data directory {0}: {1}")]
    DataDir(PathBuf, io::Error),
    #[error("gateway accept: {0}")]
    Accept(io::Error),
}

pub fn run(opt: IngestOpt) -> Result<(), IngestError> {
    let settings = Settings::load(&opt.config)?;

    for dir in [
        &settings.data_paths.sensor,
        &settings.data_paths.camera,
        &settings.data_paths.audio,
        &settings.data_paths.logs,
    ] {
        fs::create_dir_all(dir).map_err(|e| IngestError::DataDir(dir.clone(), e))?;
    }

    let pool = SessionPool::new();
    {
        let pool = pool.clone();
        let settings = settings.clone();
        thread::start("scurry/dispatch", move || dispatch(pool, settings));
    }

    let mut gateway = Gateway::bind(settings)?;
    log::info!(
        "gateway listening on port {}",
        gateway.local_port().map_err(IngestError::Accept)?
    );

    loop {
        match gateway.accept_one(&pool) {
            Ok(()) => {}
            Err(e @ IngestError::PortRangeExhausted(..)) | Err(e @ IngestError::Bind(..)) => {
                return Err(e);
            }
            Err(e) => log::warn!("gateway: {e}"),
        }
    }
}

/// Pops sessions freshest-first and gives each its own consumer thread,
/// specialized by device kind.
fn dispatch(pool: Arc<SessionPool>, settings: Settings) {
    loop {
        let session = pool.take();
        let name = format!("scurry/rx-{}{}", session.kind, session.ident);
        let settings = settings.clone();
        thread::start(&name, move || consume::run(session, settings));
    }
}

pub struct Gateway {
    listener: TcpListener,
    next_port: u16,
    settings: Settings,
}

impl Gateway {
    pub fn bind(settings: Settings) -> Result<Gateway, IngestError> {
        let port = settings.ingestor.gateway_port;
        let listener = listen_reuse(port).map_err(|e| IngestError::Bind(port, e))?;
        Ok(Gateway {
            listener,
            next_port: settings.ingestor.data_port_range_start,
            settings,
        })
    }

    pub fn local_port(&self) -> io::Result<u16> {
        Ok(self.listener.local_addr()?.port())
    }

    /// Admits one client: read the hello, bind a data port, reply with it,
    /// close the control connection and re-initialize the gateway socket.
    /// Malformed hellos drop that connection and nothing else.
    pub fn accept_one(&mut self, pool: &SessionPool) -> Result<(), IngestError> {
        let (mut conn, addr) = self.listener.accept().map_err(IngestError::Accept)?;
        log::info!("gateway: connection from {addr}");

        let hello = match ClientHello::read_from(&mut conn) {
            Ok(hello) => hello,
            Err(e) => {
                log::warn!("gateway: bad hello from {addr}: {e}");
                return Ok(());
            }
        };

        let (listener, port) = self.bind_data_port()?;
        let delay_ms = (time::wall_ms_now().0 - hello.ts.0) as i64;

        if let Err(e) = HandshakeReply(port).write_to(&mut conn) {
            log::warn!("gateway: handshake reply to {addr} failed: {e}");
            return Ok(());
        }
        drop(conn);

        // fresh gateway socket per admission
        self.reinit()?;

        log::info!(
            "gateway: admitted {}{} on data port {port} (delay {delay_ms} ms)",
            hello.kind,
            hello.ident
        );
        pool.admit(Session {
            kind: hello.kind,
            ident: hello.ident,
            created_ts: hello.ts,
            delay_ms,
            listener,
        });
        log::debug!("gateway: session pool depth now {}", pool.len());
        Ok(())
    }

    fn reinit(&mut self) -> Result<(), IngestError> {
        let port = self.settings.ingestor.gateway_port;
        self.listener = listen_reuse(port).map_err(|e| IngestError::Bind(port, e))?;
        Ok(())
    }

    /// Next port from the monotonically increasing pool, skipping ports some
    /// other process got to first.
    fn bind_data_port(&mut self) -> Result<(TcpListener, u16), IngestError> {
        let start = self.settings.ingestor.data_port_range_start;
        let end = self.settings.ingestor.data_port_range_end;
        while self.next_port < end {
            let port = self.next_port;
            self.next_port += 1;
            match listen_reuse(port) {
                Ok(listener) => return Ok((listener, port)),
                Err(e) => log::warn!("gateway: data port {port} unavailable: {e}"),
            }
        }
        Err(IngestError::PortRangeExhausted(start, end))
    }
}

fn listen_reuse(port: u16) -> io::Result<TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, None)?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(128)?;
    Ok(socket.into())
}
