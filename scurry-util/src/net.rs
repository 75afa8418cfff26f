//! Length-delimited socket helpers. Callers never see short reads or short
//! writes; a record either arrives whole or the call fails.

use std::io::{self, Read, Write};

/// Reads exactly `buf.len()` bytes. `Ok(false)` reports a clean EOF before
/// the first byte; EOF mid-record is an error.
pub fn recv_exact<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                if filled == 0 {
                    return Ok(false);
                }
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("connection closed {filled} bytes into a {} byte record", buf.len()),
                ));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

/// Writes the whole buffer, retrying partial writes.
pub fn send_all<W: Write>(writer: &mut W, buf: &[u8]) -> io::Result<()> {
    let mut sent = 0;
    while sent < buf.len() {
        match writer.write(&buf[sent..]) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "socket accepted zero bytes",
                ))
            }
            Ok(n) => sent += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Reader that hands out one byte at a time, like a very unkind kernel.
    struct Trickle(Cursor<Vec<u8>>);

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = 1.min(buf.len());
            self.0.read(&mut buf[..n])
        }
    }

    #[test]
    fn test_recv_exact_reassembles_short_reads() {
        let mut reader = Trickle(Cursor::new(vec![1, 2, 3, 4, 5]));
        let mut buf = [0u8; 5];
        assert!(recv_exact(&mut reader, &mut buf).unwrap());
        assert_eq!(buf, [1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_recv_exact_clean_eof() {
        let mut reader = Cursor::new(Vec::<u8>::new());
        let mut buf = [0u8; 4];
        assert!(!recv_exact(&mut reader, &mut buf).unwrap());
    }

    #[test]
    fn test_recv_exact_partial_record_is_error() {
        let mut reader = Cursor::new(vec![1, 2]);
        let mut buf = [0u8; 4];
        let err = recv_exact(&mut reader, &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_send_all_writes_everything() {
        let mut sink = Vec::new();
        send_all(&mut sink, &[9, 8, 7]).unwrap();
        assert_eq!(sink, vec![9, 8, 7]);
    }
}
