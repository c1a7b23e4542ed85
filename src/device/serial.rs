//! Serial link to the controller.
//!
//! The port is split into two halves, each owned by one OS thread. The
//! `device-writer` thread is the only code that writes to the port; everything
//! else submits commands through a [`DeviceWriter`] handle and waits for that
//! command's bytes to be flushed. The `device-reader` thread turns the byte
//! stream into lines.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::thread::{self, JoinHandle};

use serialport::{DataBits, SerialPort};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use crate::config::DeviceSettings;
use crate::device::command::DeviceCommand;
use crate::utils::BridgeError;
use crate::utils::shutdown::ShutdownSignal;

/// One line from the device, or the error that ended the stream.
pub type DeviceLine = io::Result<Vec<u8>>;

/// Opens the configured port and returns `(reader, writer)` halves.
pub fn open_serial(
    settings: &DeviceSettings,
) -> Result<(Box<dyn SerialPort>, Box<dyn SerialPort>), BridgeError> {
    let data_bits = match settings.data_bits {
        5 => DataBits::Five,
        6 => DataBits::Six,
        7 => DataBits::Seven,
        8 => DataBits::Eight,
        other => {
            return Err(BridgeError::InvalidSetting(format!(
                "device.data_bits must be 5-8, got {other}"
            )));
        }
    };

    let writer = serialport::new(&settings.port, settings.baud_rate)
        .data_bits(data_bits)
        .timeout(settings.read_timeout())
        .open()?;
    let reader = writer.try_clone()?;
    info!(
        "Opened {} at {} baud (read timeout {:?})",
        settings.port,
        settings.baud_rate,
        settings.read_timeout()
    );
    Ok((reader, writer))
}

struct WriteRequest {
    command: DeviceCommand,
    done: oneshot::Sender<io::Result<()>>,
}

/// Handle for submitting commands to the single writer thread.
#[derive(Debug, Clone)]
pub struct DeviceWriter {
    requests: mpsc::Sender<WriteRequest>,
}

impl DeviceWriter {
    /// Moves `port` onto a dedicated thread that writes one command at a time.
    ///
    /// The thread exits after the first failed write or once every handle is dropped.
    pub fn spawn<W>(mut port: W, capacity: usize) -> io::Result<(Self, JoinHandle<()>)>
    where
        W: Write + Send + 'static,
    {
        let (requests, mut inbox) = mpsc::channel::<WriteRequest>(capacity.max(1));
        let handle = thread::Builder::new()
            .name("device-writer".into())
            .spawn(move || {
                while let Some(request) = inbox.blocking_recv() {
                    let bytes = request.command.encode();
                    let result = port.write_all(&bytes).and_then(|()| port.flush());
                    let failed = result.is_err();
                    if let Err(e) = &result {
                        error!("Device write failed for {:?}: {e}", request.command);
                    }
                    let _ = request.done.send(result);
                    if failed {
                        break;
                    }
                }
                debug!("Device writer stopped");
            })?;
        Ok((Self { requests }, handle))
    }

    /// Queues `command` and waits until its bytes are flushed to the device.
    pub async fn submit(&self, command: DeviceCommand) -> Result<(), BridgeError> {
        let (done, written) = oneshot::channel();
        self.requests
            .send(WriteRequest { command, done })
            .await
            .map_err(|_| BridgeError::DeviceClosed)?;
        written
            .await
            .map_err(|_| BridgeError::DeviceClosed)?
            .map_err(BridgeError::DeviceWrite)
    }
}

/// Moves `port` onto a dedicated thread that splits it into lines.
///
/// Read timeouts only give the thread a chance to observe `shutdown`; a
/// partial line survives them. Any other read error is sent as the last item.
pub fn spawn_line_reader<R>(
    port: R,
    capacity: usize,
    shutdown: ShutdownSignal,
) -> io::Result<(mpsc::Receiver<DeviceLine>, JoinHandle<()>)>
where
    R: Read + Send + 'static,
{
    let (lines, receiver) = mpsc::channel::<DeviceLine>(capacity.max(1));
    let handle = thread::Builder::new()
        .name("device-reader".into())
        .spawn(move || {
            let mut reader = BufReader::new(port);
            let mut buf = Vec::new();
            while !shutdown.is_triggered() {
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) => {
                        if !buf.is_empty() {
                            let _ = lines.blocking_send(Ok(std::mem::take(&mut buf)));
                        }
                        debug!("Device stream ended");
                        return;
                    }
                    Ok(_) if buf.ends_with(b"\n") => {
                        buf.pop();
                        if buf.ends_with(b"\r") {
                            buf.pop();
                        }
                        if buf.is_empty() {
                            continue;
                        }
                        if lines.blocking_send(Ok(std::mem::take(&mut buf))).is_err() {
                            return;
                        }
                    }
                    // Hit end of stream mid-line; the next read returns 0.
                    Ok(_) => {}
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::TimedOut
                                | io::ErrorKind::WouldBlock
                                | io::ErrorKind::Interrupted
                        ) => {}
                    Err(e) => {
                        let _ = lines.blocking_send(Err(e));
                        return;
                    }
                }
            }
        })?;
    Ok((receiver, handle))
}
