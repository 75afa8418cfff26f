//! Shared governor machinery: the lifecycle state machine, the cooperative
//! termination flag, the controller-link listener and the generic transmit
//! loop that every streaming governor runs.

use std::fmt;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use scurry_core::DoubleBuffer;
use scurry_device::speaker::FrequencyControl;
use scurry_protocol::wire::{self, ControlMessage};
use scurry_util::net;

use crate::client::net::{connect, resolve, DeviceLink, LinkError};
use crate::config::BmiConfig;

/// Idle transmit tasks re-check their buffers and the termination flag at
/// this interval.
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Init,
    Ready,
    Running,
    Draining,
    Stopped,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Init => "INIT",
            State::Ready => "READY",
            State::Running => "RUNNING",
            State::Draining => "DRAINING",
            State::Stopped => "STOPPED",
        };
        f.write_str(name)
    }
}

/// Per-governor state tracker; transitions are logged so a run's lifecycle
/// can be reconstructed from the log alone.
pub struct Lifecycle {
    name: &'static str,
    state: State,
}

impl Lifecycle {
    pub fn new(name: &'static str) -> Lifecycle {
        Lifecycle {
            name,
            state: State::Init,
        }
    }

    pub fn advance(&mut self, to: State) {
        log::info!("{} governor: {} -> {}", self.name, self.state, to);
        self.state = to;
    }
}

/// Cooperative termination flag. The control listener is the only writer;
/// producer and transmit tasks poll it.
#[derive(Clone, Default)]
pub struct TermFlag(Arc<AtomicBool>);

impl TermFlag {
    pub fn new() -> TermFlag {
        TermFlag::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

pub fn control_connect(cfg: &BmiConfig) -> Result<TcpStream, LinkError> {
    let addr = resolve(&cfg.ip, cfg.listen_port)?;
    let sock = connect(addr)?;
    log::info!("controller link up at {addr}");
    Ok(sock)
}

/// Blocks on the controller link reading 10-byte messages. `BEGIN_STOP`
/// (and a dead link) set the termination flag; frequency commands steer the
/// speaker when this governor has one.
pub fn control_listener(
    name: &'static str,
    mut sock: TcpStream,
    term: TermFlag,
    frequency: Option<FrequencyControl>,
) {
    loop {
        let mut buf = [0u8; ControlMessage::LEN];
        match net::recv_exact(&mut sock, &mut buf) {
            Ok(true) => match ControlMessage::decode(&buf) {
                ControlMessage::Stop => {
                    log::info!("{name} governor: received termination signal");
                    term.set();
                    return;
                }
                ControlMessage::Frequency(hz) => match &frequency {
                    Some(control) => {
                        log::debug!("{name} governor: frequency set to {hz} Hz");
                        control.set(hz);
                    }
                    None => log::debug!("{name} governor: ignoring frequency command"),
                },
            },
            Ok(false) => {
                log::warn!("{name} governor: controller link closed, draining");
                term.set();
                return;
            }
            Err(e) => {
                log::warn!("{name} governor: controller link error ({e}), draining");
                term.set();
                return;
            }
        }
    }
}

/// One device stream inside a governor: the buffer it drains, the link it
/// feeds and the record framing for the wire.
pub struct TxLane<T> {
    pub label: String,
    pub buffer: Arc<DoubleBuffer<T>>,
    pub link: DeviceLink,
    pub record_len: usize,
    pub encode: Box<dyn Fn(T) -> Vec<u8> + Send>,
    dead: bool,
}

impl<T> TxLane<T> {
    pub fn new(
        label: String,
        buffer: Arc<DoubleBuffer<T>>,
        link: DeviceLink,
        record_len: usize,
        encode: Box<dyn Fn(T) -> Vec<u8> + Send>,
    ) -> TxLane<T> {
        TxLane {
            label,
            buffer,
            link,
            record_len,
            encode,
            dead: false,
        }
    }
}

/// Generic transmit task. Drains each lane's back ring, swapping when it
/// runs dry so items parked in front become visible; after the termination
/// flag is set it keeps going until every buffer is empty, then emits one
/// `END_STOP` sentinel per live lane. Never emits the sentinel while a
/// buffer still holds records.
pub fn transmit_loop<T>(mut lanes: Vec<TxLane<T>>, term: TermFlag, mut lifecycle: Lifecycle) {
    let mut draining = false;
    loop {
        if term.is_set() && !draining {
            lifecycle.advance(State::Draining);
            draining = true;
        }

        let mut sent_any = false;
        for lane in &mut lanes {
            if !lane.buffer.ready() {
                lane.buffer.swap();
            }
            for item in lane.buffer.drain() {
                if lane.dead {
                    // terminal lane: records are consumed and discarded
                    continue;
                }
                let payload = (lane.encode)(item);
                match lane.link.send_record(&payload) {
                    Ok(()) => sent_any = true,
                    Err(e) => {
                        log::error!("{}: {e}; draining locally from here on", lane.label);
                        lane.dead = true;
                    }
                }
            }
        }

        if draining && lanes.iter().all(|lane| lane.buffer.is_empty()) {
            for lane in &mut lanes {
                if lane.dead {
                    continue;
                }
                let sentinel = wire::sentinel(lane.record_len);
                if let Err(e) = lane.link.send_record(&sentinel) {
                    log::warn!("{}: sending end-of-stream sentinel: {e}", lane.label);
                }
                log::info!("{}: transmit complete", lane.label);
            }
            lifecycle.advance(State::Stopped);
            return;
        }

        if !sent_any {
            thread::sleep(POLL_INTERVAL);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    use scurry_protocol::wire::{AuxRecord, ControlMessage};
    use scurry_protocol::TimestampMs;
    use scurry_util::net::send_all;

    fn lane_to(
        listener: &TcpListener,
        buffer: Arc<DoubleBuffer<AuxRecord>>,
    ) -> (TxLane<AuxRecord>, std::thread::JoinHandle<Vec<Vec<u8>>>) {
        let addr = listener.local_addr().unwrap();

        let server = {
            let listener = listener.try_clone().unwrap();
            std::thread::spawn(move || {
                let (mut conn, _) = listener.accept().unwrap();
                let mut records = Vec::new();
                loop {
                    let mut buf = vec![0u8; AuxRecord::LEN];
                    if !scurry_util::net::recv_exact(&mut conn, &mut buf).unwrap() {
                        break;
                    }
                    let stop = wire::is_sentinel(&buf);
                    records.push(buf);
                    if stop {
                        break;
                    }
                }
                records
            })
        };

        let sock = connect(addr).unwrap();
        let link = DeviceLink::from_parts("aux-test".to_string(), addr, sock);
        let lane = TxLane::new(
            "aux-test".to_string(),
            buffer,
            link,
            AuxRecord::LEN,
            Box::new(|record: AuxRecord| record.encode().to_vec()),
        );
        (lane, server)
    }

    #[test]
    fn test_drain_on_termination_sends_all_then_sentinel() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let buffer = Arc::new(DoubleBuffer::new(8).unwrap());

        // five records parked before termination arrives
        for n in 0..5u64 {
            let record = AuxRecord {
                ts: TimestampMs(n as f64),
                value: n.to_be_bytes(),
            };
            buffer.put(record, false).unwrap();
        }

        let (lane, server) = lane_to(&listener, buffer);
        let term = TermFlag::new();
        term.set();

        transmit_loop(vec![lane], term, Lifecycle::new("aux"));

        let records = server.join().unwrap();
        assert_eq!(records.len(), 6);
        for (n, buf) in records[..5].iter().enumerate() {
            let record = AuxRecord::decode(buf.as_slice().try_into().unwrap());
            assert_eq!(record.value, (n as u64).to_be_bytes());
        }
        assert!(wire::is_sentinel(&records[5]));
    }

    #[test]
    fn test_steady_state_then_stop() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let buffer: Arc<DoubleBuffer<AuxRecord>> = Arc::new(DoubleBuffer::new(8).unwrap());

        let (lane, server) = lane_to(&listener, buffer.clone());
        let term = TermFlag::new();

        let tx = {
            let term = term.clone();
            std::thread::spawn(move || transmit_loop(vec![lane], term, Lifecycle::new("aux")))
        };

        for n in 0..3u64 {
            let record = AuxRecord {
                ts: TimestampMs(n as f64),
                value: n.to_be_bytes(),
            };
            buffer.put(record, false).unwrap();
            thread::sleep(Duration::from_millis(20));
        }
        term.set();

        tx.join().unwrap();
        let records = server.join().unwrap();
        assert_eq!(records.len(), 4);
        assert!(wire::is_sentinel(records.last().unwrap()));
    }

    #[test]
    fn test_control_listener_frequency_then_stop() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let controller = std::thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            send_all(&mut conn, &ControlMessage::Frequency(750.0).encode()).unwrap();
            send_all(&mut conn, &ControlMessage::Stop.encode()).unwrap();
        });

        let sock = TcpStream::connect(addr).unwrap();
        let term = TermFlag::new();
        let frequency = FrequencyControl::new(0.0);

        control_listener("speaker", sock, term.clone(), Some(frequency.clone()));

        controller.join().unwrap();
        assert!(term.is_set());
        assert_eq!(frequency.get(), 750.0);
    }

    #[test]
    fn test_control_listener_eof_sets_term() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        std::thread::spawn(move || {
            let (conn, _) = listener.accept().unwrap();
            drop(conn);
        });

        let sock = TcpStream::connect(addr).unwrap();
        let term = TermFlag::new();
        control_listener("sensor", sock, term.clone(), None);
        assert!(term.is_set());
    }
}
