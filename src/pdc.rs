//! # PDC Endpoint
//!
//! A TCP client bound to exactly one PMU. A single reader task owns the
//! socket's read half and the stream decoder; everything it decodes flows
//! through one channel. The request/response helpers (`get_header`,
//! `get_config`) send their command and then filter that channel for the
//! matching frame type within a bounded wait, discarding data frames that
//! arrive in the interim, so responses keep request order even on a stream
//! that is already ticking.

use bytes::Bytes;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{info, warn};

use crate::endpoint::{read_frame, EndpointError, Result};
use crate::ieee_c37_118::codec::{Frame, FrameDecoder};
use crate::ieee_c37_118::commands::CommandFrame;
use crate::ieee_c37_118::config::{ConfigIndex, ConfigurationFrame};
use crate::ieee_c37_118::data_frame::DataFrame;
use crate::ieee_c37_118::header::HeaderFrame;

/// Frames buffered between the reader task and the consumer.
const FRAME_CHANNEL_DEPTH: usize = 256;

/// Default bounded wait for a command response.
const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// The PDC endpoint: a client session against one PMU.
pub struct Pdc {
    pdc_id: u16,
    pmu_ip: String,
    pmu_port: u16,
    response_timeout: Duration,
    writer: Option<OwnedWriteHalf>,
    frames: Option<mpsc::Receiver<(Frame, Bytes)>>,
    reader_task: Option<JoinHandle<()>>,
    latest_config: Arc<RwLock<Option<ConfigurationFrame>>>,
}

impl Pdc {
    pub fn new(pdc_id: u16, pmu_ip: &str, pmu_port: u16) -> Self {
        Pdc {
            pdc_id,
            pmu_ip: pmu_ip.to_string(),
            pmu_port,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            writer: None,
            frames: None,
            reader_task: None,
            latest_config: Arc::new(RwLock::new(None)),
        }
    }

    /// Bounded wait applied to `get_header` and `get_config`.
    pub fn set_response_timeout(&mut self, timeout: Duration) {
        self.response_timeout = timeout;
    }

    /// Connects to the PMU and starts the reader task.
    pub async fn run(&mut self) -> Result<()> {
        if self.writer.is_some() {
            info!(
                pdc = self.pdc_id,
                "already connected to {}:{}", self.pmu_ip, self.pmu_port
            );
            return Ok(());
        }
        let stream = TcpStream::connect((self.pmu_ip.as_str(), self.pmu_port)).await?;
        info!(pdc = self.pdc_id, "connected to PMU {}:{}", self.pmu_ip, self.pmu_port);
        let (rd, wr) = stream.into_split();
        let (tx, rx) = mpsc::channel(FRAME_CHANNEL_DEPTH);
        let latest_config = self.latest_config.clone();
        self.reader_task = Some(tokio::spawn(reader_loop(rd, tx, latest_config)));
        self.writer = Some(wr);
        self.frames = Some(rx);
        Ok(())
    }

    /// Requests the header frame and waits for it (bounded). `Ok(None)` on
    /// expiry.
    pub async fn get_header(&mut self) -> Result<Option<HeaderFrame>> {
        self.send_command(CommandFrame::send_header_frame(self.pdc_id)).await?;
        self.await_response(|frame| match frame {
            Frame::Header(header) => Some(header),
            _ => None,
        })
        .await
    }

    /// Requests CFG-2 and waits for a configuration frame (bounded).
    /// `Ok(None)` on expiry.
    pub async fn get_config(&mut self) -> Result<Option<ConfigurationFrame>> {
        self.send_command(CommandFrame::send_config_frame2(self.pdc_id)).await?;
        self.await_response(|frame| match frame {
            Frame::Config(cfg) => Some(cfg),
            _ => None,
        })
        .await
    }

    /// Asks the PMU to start streaming data frames.
    pub async fn start(&mut self) -> Result<()> {
        info!(pdc = self.pdc_id, "requesting transmission on");
        self.send_command(CommandFrame::turn_on_transmission(self.pdc_id)).await
    }

    /// Asks the PMU to stop streaming.
    pub async fn stop(&mut self) -> Result<()> {
        info!(pdc = self.pdc_id, "requesting transmission off");
        self.send_command(CommandFrame::turn_off_transmission(self.pdc_id)).await
    }

    /// Next data frame from the stream, `None` once the connection closes.
    /// Non-data frames (config changes, headers) are consumed internally.
    pub async fn get(&mut self) -> Option<DataFrame> {
        let rx = self.frames.as_mut()?;
        loop {
            match rx.recv().await {
                Some((Frame::Data(frame), _)) => return Some(frame),
                Some(_) => continue,
                None => return None,
            }
        }
    }

    /// Next frame of any type with its verbatim wire bytes, `None` once the
    /// connection closes. This is the splitter's receive path.
    pub async fn recv_frame(&mut self) -> Option<(Frame, Bytes)> {
        self.frames.as_mut()?.recv().await
    }

    /// Hands the frame channel to the caller (the splitter separates
    /// receiving from command writing this way). Afterwards `get`,
    /// `get_header` and `get_config` are no longer usable on this handle.
    pub fn take_frames(&mut self) -> Option<mpsc::Receiver<(Frame, Bytes)>> {
        self.frames.take()
    }

    /// Most recent configuration seen on this session.
    pub fn config(&self) -> Option<ConfigurationFrame> {
        self.latest_config.read().clone()
    }

    /// Closes the session. Idempotent.
    pub fn quit(&mut self) {
        if self.writer.take().is_some() {
            info!(pdc = self.pdc_id, "closing connection to PMU");
        }
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        self.frames = None;
    }

    async fn send_command(&mut self, mut cmd: CommandFrame) -> Result<()> {
        let time_base = self
            .latest_config
            .read()
            .as_ref()
            .map(|cfg| cfg.time_base)
            .unwrap_or(1_000_000);
        cmd.prefix.set_time_now(time_base);
        let bytes = cmd.to_hex()?;
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| EndpointError::NotReady("not connected, call run first".to_string()))?;
        writer.write_all(&bytes).await?;
        Ok(())
    }

    /// Drains the frame channel until `pick` accepts a frame or the
    /// response timeout expires. Frames `pick` rejects are dropped; expiry
    /// is an empty result, not an error.
    async fn await_response<T>(
        &mut self,
        mut pick: impl FnMut(Frame) -> Option<T>,
    ) -> Result<Option<T>> {
        let rx = self
            .frames
            .as_mut()
            .ok_or_else(|| EndpointError::NotReady("not connected, call run first".to_string()))?;
        let deadline = Instant::now() + self.response_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            match timeout(remaining, rx.recv()).await {
                Err(_) => return Ok(None),
                Ok(None) => return Err(EndpointError::ConnectionLost),
                Ok(Some((frame, _))) => {
                    if let Some(value) = pick(frame) {
                        return Ok(Some(value));
                    }
                }
            }
        }
    }
}

impl Drop for Pdc {
    fn drop(&mut self) {
        self.quit();
    }
}

async fn reader_loop(
    mut rd: OwnedReadHalf,
    tx: mpsc::Sender<(Frame, Bytes)>,
    latest_config: Arc<RwLock<Option<ConfigurationFrame>>>,
) {
    let mut decoder = FrameDecoder::new();
    let mut context = ConfigIndex::new();
    loop {
        match read_frame(&mut rd, &mut decoder, &mut context).await {
            Ok(Some((frame, raw))) => {
                if let Frame::Config(cfg) = &frame {
                    *latest_config.write() = Some(cfg.clone());
                }
                if tx.send((frame, raw)).await.is_err() {
                    // Consumer went away; nothing left to deliver to.
                    break;
                }
            }
            Ok(None) => {
                info!("PMU closed the connection");
                break;
            }
            Err(err) => {
                warn!("read failed: {err}");
                break;
            }
        }
    }
}
