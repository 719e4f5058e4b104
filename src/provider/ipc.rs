//! Buffered IPC primitives for the provider channel.
//!
//! Line-based I/O over pipes with EINTR handling. The reader can optionally
//! bound how long it waits for the next line.

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::os::unix::io::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::time::{Duration, Instant};

/// Default buffer size for IPC (64KB).
const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// A file descriptor wrapper that implements Read/Write with EINTR handling.
pub struct PipeFd {
    fd: OwnedFd,
}

impl PipeFd {
    pub fn new(fd: OwnedFd) -> Self {
        Self { fd }
    }
}

impl From<OwnedFd> for PipeFd {
    fn from(fd: OwnedFd) -> Self {
        Self::new(fd)
    }
}

impl AsFd for PipeFd {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl AsRawFd for PipeFd {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl Read for PipeFd {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match nix::unistd::read(&self.fd, buf) {
                Ok(n) => return Ok(n),
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(io::Error::from_raw_os_error(e as i32)),
            }
        }
    }
}

impl Write for PipeFd {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        loop {
            match nix::unistd::write(&self.fd, buf) {
                Ok(n) => return Ok(n),
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(io::Error::from_raw_os_error(e as i32)),
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(()) // Pipes don't need flushing at the fd level
    }
}

/// Buffered line reader for IPC.
pub struct LineReader {
    reader: BufReader<PipeFd>,
    line_buffer: String,
}

impl LineReader {
    pub fn new(fd: PipeFd) -> Self {
        Self {
            reader: BufReader::with_capacity(DEFAULT_BUFFER_SIZE, fd),
            line_buffer: String::with_capacity(4096),
        }
    }

    /// Read a line, returning a reference to the internal buffer.
    /// Returns `None` on EOF.
    pub fn read_line(&mut self) -> io::Result<Option<&str>> {
        self.line_buffer.clear();
        match self.reader.read_line(&mut self.line_buffer)? {
            0 => Ok(None),
            _ => Ok(Some(self.trimmed_line())),
        }
    }

    /// Like [`read_line`](Self::read_line), but gives up with
    /// `ErrorKind::TimedOut` unless a whole line arrives within `timeout`.
    ///
    /// The deadline covers every wait, including the ones in the middle of a
    /// partially written line. Bytes of an unfinished line are discarded on
    /// timeout.
    pub fn read_line_timeout(&mut self, timeout: Option<Duration>) -> io::Result<Option<&str>> {
        let Some(timeout) = timeout else {
            return self.read_line();
        };
        let deadline = Instant::now() + timeout;

        let mut line = Vec::new();
        loop {
            if self.reader.buffer().is_empty() {
                self.wait_readable(deadline, timeout)?;
            }
            let available = self.reader.fill_buf()?;
            if available.is_empty() {
                break;
            }
            match available.iter().position(|&b| b == b'\n') {
                Some(end) => {
                    line.extend_from_slice(&available[..=end]);
                    self.reader.consume(end + 1);
                    break;
                }
                None => {
                    let len = available.len();
                    line.extend_from_slice(available);
                    self.reader.consume(len);
                }
            }
        }

        if line.is_empty() {
            return Ok(None);
        }
        self.line_buffer = String::from_utf8(line)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(Some(self.trimmed_line()))
    }

    fn trimmed_line(&mut self) -> &str {
        if self.line_buffer.ends_with('\n') {
            self.line_buffer.pop();
        }
        if self.line_buffer.ends_with('\r') {
            self.line_buffer.pop();
        }
        &self.line_buffer
    }

    fn wait_readable(&self, deadline: Instant, timeout: Duration) -> io::Result<()> {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("no complete line within {:?}", timeout),
                ));
            }
            let wait = PollTimeout::try_from(remaining).unwrap_or(PollTimeout::MAX);
            let mut fds = [PollFd::new(self.reader.get_ref().as_fd(), PollFlags::POLLIN)];
            match poll(&mut fds, wait) {
                // POLLHUP/POLLERR also count: the following read reports EOF or the error.
                Ok(n) if n > 0 => return Ok(()),
                Ok(_) => continue,
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(io::Error::from_raw_os_error(e as i32)),
            }
        }
    }
}

/// Buffered line writer for IPC.
pub struct LineWriter {
    writer: BufWriter<PipeFd>,
}

impl LineWriter {
    pub fn new(fd: PipeFd) -> Self {
        Self {
            writer: BufWriter::with_capacity(DEFAULT_BUFFER_SIZE, fd),
        }
    }

    /// Write a line (appends newline if not present) and flush.
    pub fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.writer.write_all(line.as_bytes())?;
        if !line.ends_with('\n') {
            self.writer.write_all(b"\n")?;
        }
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_pipe() -> (PipeFd, PipeFd) {
        let (read_fd, write_fd) = nix::unistd::pipe().expect("Failed to create pipe");
        (PipeFd::new(read_fd), PipeFd::new(write_fd))
    }

    #[test]
    fn test_line_reader_writer_roundtrip() {
        let (read_fd, write_fd) = create_pipe();
        let mut reader = LineReader::new(read_fd);
        let mut writer = LineWriter::new(write_fd);

        writer.write_line("hello").unwrap();
        writer.write_line("world\n").unwrap();
        writer.write_line("").unwrap();
        drop(writer); // Close write end to signal EOF

        assert_eq!(reader.read_line().unwrap(), Some("hello"));
        assert_eq!(reader.read_line().unwrap(), Some("world"));
        assert_eq!(reader.read_line().unwrap(), Some(""));
        assert_eq!(reader.read_line().unwrap(), None);
    }

    #[test]
    fn test_crlf_handling() {
        let (read_fd, mut write_fd) = create_pipe();
        let mut reader = LineReader::new(read_fd);

        write_fd.write_all(b"line1\r\nline2\n").unwrap();
        drop(write_fd);

        assert_eq!(reader.read_line().unwrap(), Some("line1"));
        assert_eq!(reader.read_line().unwrap(), Some("line2"));
    }

    #[test]
    fn test_read_line_timeout_expires() {
        let (read_fd, _write_fd) = create_pipe();
        let mut reader = LineReader::new(read_fd);

        let start = Instant::now();
        let err = reader
            .read_line_timeout(Some(Duration::from_millis(50)))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_read_line_timeout_returns_available_line() {
        let (read_fd, write_fd) = create_pipe();
        let mut reader = LineReader::new(read_fd);
        let mut writer = LineWriter::new(write_fd);

        writer.write_line("ready").unwrap();
        let line = reader
            .read_line_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        assert_eq!(line, Some("ready"));
    }

    #[test]
    fn test_read_line_timeout_sees_eof_after_hangup() {
        let (read_fd, write_fd) = create_pipe();
        let mut reader = LineReader::new(read_fd);
        drop(write_fd);

        let line = reader
            .read_line_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        assert_eq!(line, None);
    }

    #[test]
    fn test_read_line_timeout_covers_partial_line() {
        let (read_fd, mut write_fd) = create_pipe();
        let mut reader = LineReader::new(read_fd);

        write_fd.write_all(br#"{"type":"val"#).unwrap();

        let start = Instant::now();
        let err = reader
            .read_line_timeout(Some(Duration::from_millis(100)))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_read_line_timeout_joins_split_line() {
        let (read_fd, mut write_fd) = create_pipe();
        let mut reader = LineReader::new(read_fd);

        write_fd.write_all(b"hel").unwrap();
        let writer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            write_fd.write_all(b"lo\nnext\n").unwrap();
            write_fd
        });

        let line = reader
            .read_line_timeout(Some(Duration::from_secs(5)))
            .unwrap()
            .map(str::to_string);
        assert_eq!(line.as_deref(), Some("hello"));
        let _write_fd = writer.join().unwrap();
        assert_eq!(reader.read_line().unwrap(), Some("next"));
    }
}
