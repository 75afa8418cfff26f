//! Per-device stream consumers. Each runs on its own thread, accepts on the
//! session's assigned data port, reads fixed-size records and appends them
//! to the channel-appropriate file. `END_STOP` ends that stream only; a
//! dropped connection re-accepts so a reconnecting client resumes.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::net::TcpStream;
use std::path::PathBuf;

use thiserror::Error;

use scurry_protocol::wire::{self, AudioRecord, AuxRecord, SensorRecord, VideoRecord};
use scurry_protocol::DeviceKind;
use scurry_util::net;

use crate::config::Settings;
use crate::ingest::session::Session;

#[derive(Debug, Error)]
enum ConsumeError {
    #[error("opening {0}: {1}")]
    Open(PathBuf, io::Error),
    #[error("writing {0}: {1}")]
    Write(PathBuf, io::Error),
    #[error("sensor record idx {0} out of range")]
    BadIdx(u32),
    #[error(transparent)]
    Wire(#[from] wire::WireError),
}

enum Outcome {
    EndOfStream,
    Disconnected,
}

pub fn run(session: Session, settings: Settings) {
    let label = format!("{}{}", session.kind, session.ident);
    log::debug!("{label}: consumer up for stream announced at {} ms", session.created_ts);
    loop {
        let (mut conn, addr) = match session.listener.accept() {
            Ok(pair) => pair,
            Err(e) => {
                log::error!("{label}: accept failed: {e}");
                return;
            }
        };
        log::info!("{label}: client connected from {addr}");

        let outcome = match session.kind {
            DeviceKind::Sensor => consume_sensor(&mut conn, &settings),
            DeviceKind::Camera => consume_camera(&mut conn, &session, &settings),
            DeviceKind::Audio => consume_audio(&mut conn, &session, &settings),
            DeviceKind::Aux => consume_aux(&mut conn, &session, &settings),
        };

        match outcome {
            Ok(Outcome::EndOfStream) => {
                log::info!("{label}: stream complete");
                return;
            }
            Ok(Outcome::Disconnected) => {
                log::warn!("{label}: connection lost, awaiting reconnect");
            }
            Err(e) => {
                // a bad stream takes down this consumer only
                log::error!("{label}: {e}; closing stream");
                return;
            }
        }
    }
}

/// Reads one record-sized chunk. `None` means this connection is done
/// (clean close or transport error) and the caller should re-accept.
fn read_record(conn: &mut TcpStream, buf: &mut [u8]) -> Option<()> {
    match net::recv_exact(conn, buf) {
        Ok(true) => Some(()),
        Ok(false) => None,
        Err(e) => {
            log::warn!("stream read failed: {e}");
            None
        }
    }
}

fn append_file(path: &PathBuf) -> Result<File, ConsumeError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| ConsumeError::Open(path.clone(), e))
}

/// Sensor records land in per-sensor CSVs selected by the record's own
/// `idx`, one `ts,x,y,h` line per reading.
fn consume_sensor(conn: &mut TcpStream, settings: &Settings) -> Result<Outcome, ConsumeError> {
    let mut files: [Option<(PathBuf, File)>; 2] = [None, None];
    let mut buf = [0u8; SensorRecord::LEN];

    loop {
        if read_record(conn, &mut buf).is_none() {
            return Ok(Outcome::Disconnected);
        }
        if wire::is_sentinel(&buf) {
            return Ok(Outcome::EndOfStream);
        }

        let record = SensorRecord::decode(&buf);
        let slot = files
            .get_mut(record.idx as usize)
            .ok_or(ConsumeError::BadIdx(record.idx))?;
        if slot.is_none() {
            let path = settings
                .data_paths
                .sensor
                .join(format!("sensor{}.csv", record.idx + 1));
            *slot = Some((path.clone(), append_file(&path)?));
        }
        let (path, file) = slot.as_mut().unwrap();

        writeln!(
            file,
            "{:?},{:?},{:?},{:?}",
            record.ts.0, record.pose.x, record.pose.y, record.pose.h
        )
        .map_err(|e| ConsumeError::Write(path.clone(), e))?;
    }
}

/// Raw frame payloads appended back to back; the fixed frame geometry makes
/// the file seekable by frame index.
fn consume_camera(
    conn: &mut TcpStream,
    session: &Session,
    settings: &Settings,
) -> Result<Outcome, ConsumeError> {
    let path = settings
        .data_paths
        .camera
        .join(format!("camera{}.raw", session.ident + 1));
    let mut file = append_file(&path)?;
    let mut buf = vec![0u8; VideoRecord::LEN];

    loop {
        if read_record(conn, &mut buf).is_none() {
            return Ok(Outcome::Disconnected);
        }
        if wire::is_sentinel(&buf) {
            return Ok(Outcome::EndOfStream);
        }

        let record = VideoRecord::decode(&buf)?;
        file.write_all(&record.frame)
            .map_err(|e| ConsumeError::Write(path.clone(), e))?;
    }
}

fn consume_audio(
    conn: &mut TcpStream,
    session: &Session,
    settings: &Settings,
) -> Result<Outcome, ConsumeError> {
    let chunk_len = settings.chunk_bytes();
    let path = settings
        .data_paths
        .audio
        .join(format!("audio{}.raw", session.ident + 1));
    let mut file = append_file(&path)?;
    let mut buf = vec![0u8; AudioRecord::wire_len(chunk_len)];

    loop {
        if read_record(conn, &mut buf).is_none() {
            return Ok(Outcome::Disconnected);
        }
        if wire::is_sentinel(&buf) {
            return Ok(Outcome::EndOfStream);
        }

        let record = AudioRecord::decode(&buf, chunk_len)?;
        file.write_all(&record.samples)
            .map_err(|e| ConsumeError::Write(path.clone(), e))?;
    }
}

fn consume_aux(
    conn: &mut TcpStream,
    session: &Session,
    settings: &Settings,
) -> Result<Outcome, ConsumeError> {
    let path = settings
        .data_paths
        .sensor
        .join(format!("aux{}.csv", session.ident + 1));
    let mut file = append_file(&path)?;
    let mut buf = [0u8; AuxRecord::LEN];

    loop {
        if read_record(conn, &mut buf).is_none() {
            return Ok(Outcome::Disconnected);
        }
        if wire::is_sentinel(&buf) {
            return Ok(Outcome::EndOfStream);
        }

        let record = AuxRecord::decode(&buf);
        let value = u64::from_be_bytes(record.value);
        writeln!(file, "{:?},{}", record.ts.0, value)
            .map_err(|e| ConsumeError::Write(path.clone(), e))?;
    }
}
