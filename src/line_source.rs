//! # Line Sources
//!
//! Telemetry arrives as newline-terminated text. A [`LineSource`] hides where the
//! text comes from: the serial port in production, standard input in development,
//! an in-memory cursor in tests.
//!
//! Bytes that are not valid UTF-8 are replaced with U+FFFD rather than failing the
//! read. A serial read that times out yields an empty line, which the parser skips.
//! Losing the transport is reported as [`SourceError`] and ends the sensor phase.
//!
//! Readers without a timeout (standard input) go through [`ThreadedLineSource`],
//! which reads on a helper thread so the caller can still notice a shutdown.

use std::io::{self, BufRead};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Failures that end a line source.
#[derive(Error, Debug)]
pub enum SourceError {
    /// Transport read failed (device unplugged, port closed)
    #[error("line source IO: {0}")]
    Io(#[from] io::Error),

    /// Port could not be opened
    #[error("cannot open {port}: {reason}")]
    Open { port: String, reason: String },

    /// Auto-detection found no serial ports at all
    #[error("no serial device found")]
    NoDevice,
}

/// A lazy sequence of raw text lines.
pub trait LineSource {
    /// Next line without its terminator.
    ///
    /// `Ok(None)` means the stream ended; `Err` means the transport is gone.
    fn next_line(&mut self) -> Result<Option<String>, SourceError>;

    /// Short label for log messages.
    fn name(&self) -> &str;
}

impl<T: LineSource + ?Sized> LineSource for Box<T> {
    fn next_line(&mut self) -> Result<Option<String>, SourceError> {
        (**self).next_line()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Line source over any buffered reader.
///
/// Partial lines survive read timeouts: bytes read before a timeout stay pending
/// until the rest of the line arrives.
pub struct ReaderLineSource<R> {
    reader: R,
    name: String,
    pending: Vec<u8>,
}

impl<R: BufRead> ReaderLineSource<R> {
    pub fn new(reader: R, name: impl Into<String>) -> Self {
        ReaderLineSource {
            reader,
            name: name.into(),
            pending: Vec::with_capacity(64),
        }
    }
}

impl<R: BufRead> LineSource for ReaderLineSource<R> {
    fn next_line(&mut self) -> Result<Option<String>, SourceError> {
        loop {
            match self.reader.read_until(b'\n', &mut self.pending) {
                Ok(0) if self.pending.is_empty() => return Ok(None),
                Ok(_) => {
                    let line = decode_line(&self.pending);
                    self.pending.clear();
                    return Ok(Some(line));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e)
                    if e.kind() == io::ErrorKind::TimedOut
                        || e.kind() == io::ErrorKind::WouldBlock =>
                {
                    return Ok(Some(String::new()));
                }
                Err(e) => return Err(SourceError::Io(e)),
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Line source fed by a reader thread.
///
/// `next_line` waits at most `poll` for the next line and yields an empty line
/// when none arrived, the same way a serial read timeout does.
pub struct ThreadedLineSource {
    rx: Receiver<io::Result<Vec<u8>>>,
    name: String,
    poll: Duration,
}

impl ThreadedLineSource {
    pub fn spawn<R>(mut reader: R, name: impl Into<String>, poll: Duration) -> Self
    where
        R: BufRead + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || loop {
            let mut line = Vec::with_capacity(64);
            match reader.read_until(b'\n', &mut line) {
                // End of stream: dropping the sender disconnects the channel
                Ok(0) => break,
                Ok(_) => {
                    if tx.send(Ok(line)).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    let _ = tx.send(Err(e));
                    break;
                }
            }
        });

        ThreadedLineSource {
            rx,
            name: name.into(),
            poll,
        }
    }
}

impl LineSource for ThreadedLineSource {
    fn next_line(&mut self) -> Result<Option<String>, SourceError> {
        match self.rx.recv_timeout(self.poll) {
            Ok(Ok(bytes)) => Ok(Some(decode_line(&bytes))),
            Ok(Err(e)) => Err(SourceError::Io(e)),
            Err(RecvTimeoutError::Timeout) => Ok(Some(String::new())),
            Err(RecvTimeoutError::Disconnected) => Ok(None),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Decode raw bytes, substituting invalid sequences, and strip the line ending.
pub fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_string()
}

#[cfg(feature = "hardware")]
pub use serial::{detect_port, list_ports, open_serial, SerialLineSource};

#[cfg(feature = "hardware")]
mod serial {
    use super::{ReaderLineSource, SourceError};
    use crate::config::SerialConfig;
    use serialport::{SerialPortInfo, SerialPortType};
    use std::io::BufReader;
    use std::time::Duration;
    use tracing::{debug, info};

    /// Line source reading from an open serial port.
    pub type SerialLineSource = ReaderLineSource<BufReader<Box<dyn serialport::SerialPort>>>;

    /// USB descriptor fragments that identify common Arduino-compatible boards.
    const BOARD_HINTS: [&str; 3] = ["Arduino", "CH340", "USB Serial"];

    /// Open the configured port, or the detected board when `port = "auto"`.
    pub fn open_serial(config: &SerialConfig) -> Result<SerialLineSource, SourceError> {
        let port_name = if config.port.eq_ignore_ascii_case("auto") {
            let detected = detect_port().ok_or(SourceError::NoDevice)?;
            info!("Automatically detected board at {}", detected);
            detected
        } else {
            config.port.clone()
        };

        let port = serialport::new(&port_name, config.baud_rate)
            .timeout(Duration::from_millis(config.read_timeout_ms))
            .flow_control(serialport::FlowControl::None)
            .open()
            .map_err(|e| SourceError::Open {
                port: port_name.clone(),
                reason: e.to_string(),
            })?;

        info!("Connected to {} at {} baud", port_name, config.baud_rate);

        // Opening the port resets the board; give it time to boot.
        if config.settle_ms > 0 {
            debug!("Waiting {}ms for the board to settle", config.settle_ms);
            std::thread::sleep(Duration::from_millis(config.settle_ms));
        }

        Ok(ReaderLineSource::new(BufReader::new(port), port_name))
    }

    /// Pick the most likely sensor board among the available ports.
    ///
    /// Prefers a USB port whose descriptor mentions a known board, otherwise
    /// returns the first port found.
    pub fn detect_port() -> Option<String> {
        let ports = serialport::available_ports().ok()?;
        pick_port(&ports)
    }

    fn pick_port(ports: &[SerialPortInfo]) -> Option<String> {
        ports
            .iter()
            .find(|p| looks_like_board(&p.port_type))
            .or_else(|| ports.first())
            .map(|p| p.port_name.clone())
    }

    fn looks_like_board(port_type: &SerialPortType) -> bool {
        match port_type {
            SerialPortType::UsbPort(info) => [&info.product, &info.manufacturer]
                .into_iter()
                .flatten()
                .any(|text| BOARD_HINTS.iter().any(|hint| text.contains(hint))),
            _ => false,
        }
    }

    /// Print the available serial ports to stdout.
    pub fn list_ports() {
        println!("Available serial ports:");
        match serialport::available_ports() {
            Ok(ports) => {
                if ports.is_empty() {
                    println!("  (none)");
                }
                for port in ports {
                    match &port.port_type {
                        SerialPortType::UsbPort(info) => {
                            println!(
                                "  {} - USB (VID: 0x{:04x}, PID: 0x{:04x}) {}",
                                port.port_name,
                                info.vid,
                                info.pid,
                                info.product.as_deref().unwrap_or("")
                            );
                        }
                        SerialPortType::BluetoothPort => {
                            println!("  {} - Bluetooth", port.port_name)
                        }
                        SerialPortType::PciPort => println!("  {} - PCI", port.port_name),
                        SerialPortType::Unknown => println!("  {} - Unknown", port.port_name),
                    }
                }
            }
            Err(e) => eprintln!("Error listing ports: {}", e),
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use serialport::UsbPortInfo;

        fn usb(name: &str, product: Option<&str>) -> SerialPortInfo {
            SerialPortInfo {
                port_name: name.to_string(),
                port_type: SerialPortType::UsbPort(UsbPortInfo {
                    vid: 0x2341,
                    pid: 0x0043,
                    serial_number: None,
                    manufacturer: None,
                    product: product.map(str::to_string),
                }),
            }
        }

        #[test]
        fn prefers_known_board() {
            let ports = vec![
                usb("/dev/ttyUSB0", Some("FTDI Cable")),
                usb("/dev/ttyACM0", Some("Arduino Uno")),
            ];
            assert_eq!(pick_port(&ports).as_deref(), Some("/dev/ttyACM0"));
        }

        #[test]
        fn falls_back_to_first_port() {
            let ports = vec![usb("/dev/ttyUSB0", None), usb("/dev/ttyUSB1", None)];
            assert_eq!(pick_port(&ports).as_deref(), Some("/dev/ttyUSB0"));
            assert_eq!(pick_port(&[]), None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::Silent;
    use std::io::{Cursor, Read};

    #[test]
    fn reads_lines_then_end_of_stream() {
        let mut source = ReaderLineSource::new(Cursor::new("25.0,7.2,45.0\r\n\nlast"), "mem");
        assert_eq!(source.next_line().unwrap().as_deref(), Some("25.0,7.2,45.0"));
        assert_eq!(source.next_line().unwrap().as_deref(), Some(""));
        assert_eq!(source.next_line().unwrap().as_deref(), Some("last"));
        assert!(source.next_line().unwrap().is_none());
        assert_eq!(source.name(), "mem");
    }

    #[test]
    fn invalid_bytes_are_replaced() {
        let bytes: &[u8] = b"25.0,\xff7.2,45.0\n";
        let mut source = ReaderLineSource::new(Cursor::new(bytes), "mem");
        let line = source.next_line().unwrap().unwrap();
        assert_eq!(line, "25.0,\u{FFFD}7.2,45.0");
    }

    /// Reader that times out once in the middle of a line.
    struct Stuttering {
        chunks: Vec<io::Result<&'static [u8]>>,
    }

    impl Read for Stuttering {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.chunks.is_empty() {
                return Ok(0);
            }
            match self.chunks.remove(0) {
                Ok(bytes) => {
                    buf[..bytes.len()].copy_from_slice(bytes);
                    Ok(bytes.len())
                }
                Err(e) => Err(e),
            }
        }
    }

    #[test]
    fn timeout_yields_empty_line_and_keeps_partial_data() {
        let reader = Stuttering {
            chunks: vec![
                Ok(b"25.0,7"),
                Err(io::Error::new(io::ErrorKind::TimedOut, "timeout")),
                Ok(b".2,45.0\n"),
            ],
        };
        let mut source = ReaderLineSource::new(io::BufReader::new(reader), "serial");
        assert_eq!(source.next_line().unwrap().as_deref(), Some(""));
        assert_eq!(source.next_line().unwrap().as_deref(), Some("25.0,7.2,45.0"));
    }

    #[test]
    fn transport_loss_is_an_error() {
        let reader = Stuttering {
            chunks: vec![Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"))],
        };
        let mut source = ReaderLineSource::new(io::BufReader::new(reader), "serial");
        assert!(matches!(source.next_line(), Err(SourceError::Io(_))));
    }

    #[test]
    fn threaded_source_reads_lines_then_end_of_stream() {
        let reader = Cursor::new(b"25.0,\xff7.2,45.0\r\nlast".to_vec());
        let mut source = ThreadedLineSource::spawn(reader, "stdin", Duration::from_secs(5));
        assert_eq!(
            source.next_line().unwrap().as_deref(),
            Some("25.0,\u{FFFD}7.2,45.0")
        );
        assert_eq!(source.next_line().unwrap().as_deref(), Some("last"));
        assert!(source.next_line().unwrap().is_none());
        assert_eq!(source.name(), "stdin");
    }

    #[test]
    fn threaded_source_times_out_on_silence() {
        let (hold, rx) = mpsc::channel::<()>();
        let mut source = ThreadedLineSource::spawn(
            io::BufReader::new(Silent(rx)),
            "stdin",
            Duration::from_millis(10),
        );
        assert_eq!(source.next_line().unwrap().as_deref(), Some(""));
        assert_eq!(source.next_line().unwrap().as_deref(), Some(""));

        drop(hold);
        let end = loop {
            match source.next_line().unwrap() {
                Some(line) if line.is_empty() => continue,
                other => break other,
            }
        };
        assert!(end.is_none());
    }

    #[test]
    fn threaded_source_reports_read_errors() {
        let reader = Stuttering {
            chunks: vec![Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))],
        };
        let mut source =
            ThreadedLineSource::spawn(io::BufReader::new(reader), "stdin", Duration::from_secs(5));
        assert!(matches!(source.next_line(), Err(SourceError::Io(_))));
    }
}
