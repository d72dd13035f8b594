//! # PMU Endpoint
//!
//! A TCP server that plays the data-source role: it advertises a
//! configuration and header on request and streams data frames to every
//! client that has turned transmission on.
//!
//! Each accepted connection runs one session task that interleaves two
//! duties: draining the client's bounded outbound queue and reacting to
//! commands from the peer. The client set itself is only mutated by the
//! accept path (insert) and by a session on its way out (remove); broadcast
//! walks a snapshot, so a client dropping mid-send never stalls the rest.

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::endpoint::{read_frame, EndpointError, Result, CLIENT_QUEUE_DEPTH};
use crate::ieee_c37_118::codec::{Frame, FrameDecoder};
use crate::ieee_c37_118::commands::CommandType;
use crate::ieee_c37_118::common::FrameError;
use crate::ieee_c37_118::config::{ConfigIndex, ConfigurationFrame};
use crate::ieee_c37_118::data_frame::DataFrame;
use crate::ieee_c37_118::header::HeaderFrame;

/// Identifier of one connected client, unique for the lifetime of the
/// endpoint.
pub type ClientId = u64;

/// Snapshot of one connected client.
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub id: ClientId,
    pub addr: SocketAddr,
    pub streaming: bool,
}

struct ClientHandle {
    addr: SocketAddr,
    tx: mpsc::Sender<Bytes>,
    streaming: Arc<AtomicBool>,
}

struct PmuShared {
    stamp_time: AtomicBool,
    announce_on_connect: AtomicBool,
    cfg1: RwLock<ConfigurationFrame>,
    cfg2: RwLock<ConfigurationFrame>,
    header: RwLock<HeaderFrame>,
    sample: RwLock<Option<DataFrame>>,
    clients: RwLock<HashMap<ClientId, ClientHandle>>,
    next_client: AtomicU64,
}

/// The PMU endpoint.
pub struct Pmu {
    ip: String,
    port: u16,
    shared: Arc<PmuShared>,
    shutdown: watch::Sender<bool>,
    listener_task: Mutex<Option<JoinHandle<()>>>,
    local_addr: RwLock<Option<SocketAddr>>,
}

impl Pmu {
    /// Creates a PMU serving the IEEE sample configuration under the given
    /// station name and data rate. Nothing touches the network until
    /// [`Pmu::run`].
    pub fn new(
        pmu_id: u16,
        ip: &str,
        port: u16,
        station_name: &str,
        data_rate: i16,
    ) -> std::result::Result<Self, FrameError> {
        let mut cfg2 = ConfigurationFrame::ieee_sample(pmu_id, data_rate)?;
        cfg2.set_station_name(0, station_name)?;
        let cfg1 = cfg2.as_cfg1();
        let header = HeaderFrame::new(pmu_id, "Hi! I am tinyPMU!");
        let (shutdown, _) = watch::channel(false);
        Ok(Pmu {
            ip: ip.to_string(),
            port,
            shared: Arc::new(PmuShared {
                stamp_time: AtomicBool::new(true),
                announce_on_connect: AtomicBool::new(false),
                cfg1: RwLock::new(cfg1),
                cfg2: RwLock::new(cfg2),
                header: RwLock::new(header),
                sample: RwLock::new(None),
                clients: RwLock::new(HashMap::new()),
                next_client: AtomicU64::new(1),
            }),
            shutdown,
            listener_task: Mutex::new(None),
            local_addr: RwLock::new(None),
        })
    }

    /// Whether frames get a fresh timestamp at send time. On by default;
    /// the splitter turns it off so forwarded bytes stay verbatim.
    pub fn set_stamp_time(&self, on: bool) {
        self.shared.stamp_time.store(on, Ordering::Relaxed);
    }

    /// Whether newly accepted clients are greeted with the cached header
    /// and CFG-2 without asking. Off by default, on in the splitter.
    pub fn set_announce_on_connect(&self, on: bool) {
        self.shared.announce_on_connect.store(on, Ordering::Relaxed);
    }

    pub fn idcode(&self) -> u16 {
        self.shared.cfg2.read().prefix.idcode
    }

    pub fn data_rate(&self) -> i16 {
        self.shared.cfg2.read().data_rate
    }

    /// Interval between data frames at the configured rate.
    pub fn tick_interval(&self) -> Duration {
        self.shared.cfg2.read().tick_interval()
    }

    /// Current stream configuration (CFG-2).
    pub fn configuration(&self) -> ConfigurationFrame {
        self.shared.cfg2.read().clone()
    }

    pub fn header(&self) -> HeaderFrame {
        self.shared.header.read().clone()
    }

    /// Replaces the served configuration; `None` reloads the IEEE sample.
    /// Connected clients are notified with the new CFG-2.
    pub fn set_configuration(
        &self,
        cfg: Option<ConfigurationFrame>,
    ) -> std::result::Result<(), FrameError> {
        let new_cfg = match cfg {
            Some(cfg) => cfg,
            None => {
                let current = self.shared.cfg2.read();
                ConfigurationFrame::ieee_sample(current.prefix.idcode, current.data_rate)?
            }
        };
        *self.shared.cfg1.write() = new_cfg.as_cfg1();
        *self.shared.cfg2.write() = new_cfg;
        info!(idcode = self.idcode(), "PMU configuration changed");
        self.notify_config();
        Ok(())
    }

    /// Replaces the served header text; `None` restores the default.
    /// Connected clients are notified with the new header frame.
    pub fn set_header(&self, header: Option<&str>) {
        let frame = HeaderFrame::new(self.idcode(), header.unwrap_or("Hi! I am tinyPMU!"));
        self.set_header_frame(frame);
    }

    /// Replaces the served header with a ready-made frame (the splitter
    /// caches the upstream header this way).
    pub fn set_header_frame(&self, frame: HeaderFrame) {
        *self.shared.header.write() = frame;
        info!(idcode = self.idcode(), "PMU header changed");
        let bytes = encode_header(&self.shared);
        self.broadcast_raw(bytes, false);
    }

    /// Changes the reporting rate on CFG-1 and CFG-2 and notifies clients.
    pub fn set_data_rate(&self, data_rate: i16) -> std::result::Result<(), FrameError> {
        self.shared.cfg1.write().set_data_rate(data_rate)?;
        self.shared.cfg2.write().set_data_rate(data_rate)?;
        info!(idcode = self.idcode(), data_rate, "PMU reporting rate changed");
        self.notify_config();
        Ok(())
    }

    /// Loads the IEEE sample data frame shaped to the current
    /// configuration; [`Pmu::send_sample`] streams it.
    pub fn set_ieee_data_sample(&self) -> std::result::Result<(), FrameError> {
        let sample = DataFrame::ieee_sample(&self.shared.cfg2.read())?;
        *self.shared.sample.write() = Some(sample);
        Ok(())
    }

    pub fn data_sample(&self) -> Option<DataFrame> {
        self.shared.sample.read().clone()
    }

    /// Binds the listener and starts accepting clients.
    pub async fn run(&self) -> Result<()> {
        if self.listener_task.lock().is_some() {
            return Err(EndpointError::NotReady("endpoint already running".to_string()));
        }
        let listener = TcpListener::bind((self.ip.as_str(), self.port)).await?;
        let addr = listener.local_addr()?;
        *self.local_addr.write() = Some(addr);
        info!(idcode = self.idcode(), %addr, "PMU listening");

        let shared = self.shared.clone();
        let shutdown = self.shutdown.subscribe();
        let handle = tokio::spawn(accept_loop(listener, shared, shutdown));
        *self.listener_task.lock() = Some(handle);
        Ok(())
    }

    /// Address the listener is bound to, available after [`Pmu::run`].
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.read()
    }

    /// Broadcasts a frame to every client in streaming state. Clients that
    /// have not turned transmission on are skipped.
    pub fn send(&self, frame: &Frame) -> std::result::Result<(), FrameError> {
        let bytes = self.encode_stamped(frame)?;
        self.broadcast_raw(bytes, true);
        Ok(())
    }

    /// Streams the stored sample data frame to all streaming clients.
    pub fn send_sample(&self) -> Result<()> {
        let sample = self.data_sample().ok_or_else(|| {
            EndpointError::NotReady("no data sample loaded, call set_ieee_data_sample".to_string())
        })?;
        self.send(&Frame::Data(sample))?;
        Ok(())
    }

    /// Unicasts a frame to one client regardless of its streaming state.
    pub fn send_to(&self, client: ClientId, frame: &Frame) -> Result<()> {
        let bytes = self.encode_stamped(frame)?;
        let tx = self
            .shared
            .clients
            .read()
            .get(&client)
            .map(|handle| handle.tx.clone())
            .ok_or_else(|| EndpointError::NotReady(format!("no client {}", client)))?;
        tx.try_send(bytes).map_err(|_| EndpointError::ConnectionLost)?;
        Ok(())
    }

    /// Broadcasts pre-encoded bytes, optionally only to streaming clients.
    ///
    /// A client whose bounded queue is full is dropped rather than allowed
    /// to stall the source.
    pub fn broadcast_raw(&self, bytes: Bytes, streaming_only: bool) {
        let snapshot: Vec<(ClientId, mpsc::Sender<Bytes>, Arc<AtomicBool>)> = self
            .shared
            .clients
            .read()
            .iter()
            .map(|(id, handle)| (*id, handle.tx.clone(), handle.streaming.clone()))
            .collect();

        let mut dead = Vec::new();
        for (id, tx, streaming) in snapshot {
            if streaming_only && !streaming.load(Ordering::Relaxed) {
                continue;
            }
            match tx.try_send(bytes.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(client = id, "outbound queue full, dropping client");
                    dead.push(id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => dead.push(id),
            }
        }
        if !dead.is_empty() {
            let mut clients = self.shared.clients.write();
            for id in dead {
                clients.remove(&id);
            }
        }
    }

    /// Snapshot of the connected clients.
    pub fn clients(&self) -> Vec<ClientInfo> {
        self.shared
            .clients
            .read()
            .iter()
            .map(|(id, handle)| ClientInfo {
                id: *id,
                addr: handle.addr,
                streaming: handle.streaming.load(Ordering::Relaxed),
            })
            .collect()
    }

    pub fn client_count(&self) -> usize {
        self.shared.clients.read().len()
    }

    pub fn streaming_count(&self) -> usize {
        self.shared
            .clients
            .read()
            .values()
            .filter(|handle| handle.streaming.load(Ordering::Relaxed))
            .count()
    }

    /// Disconnects every client (their sessions see a closed queue and
    /// exit). The listener stays up.
    pub fn drop_all_clients(&self) {
        self.shared.clients.write().clear();
    }

    /// Stops the endpoint: the listener closes first, then every session
    /// drains and exits. Idempotent.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Waits for the accept loop to finish (after [`Pmu::stop`]).
    pub async fn join(&self) {
        let handle = self.listener_task.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    fn notify_config(&self) {
        match encode_cfg(&self.shared, 2) {
            Ok(bytes) => self.broadcast_raw(bytes, false),
            Err(err) => warn!("cannot encode configuration for notification: {err}"),
        }
    }

    fn encode_stamped(&self, frame: &Frame) -> std::result::Result<Bytes, FrameError> {
        let mut frame = frame.clone();
        if self.shared.stamp_time.load(Ordering::Relaxed) {
            let time_base = self.shared.cfg2.read().time_base;
            match &mut frame {
                Frame::Header(f) => f.prefix.set_time_now(time_base),
                Frame::Config(f) => f.prefix.set_time_now(time_base),
                Frame::Data(f) => f.prefix.set_time_now(time_base),
                Frame::Command(f) => f.prefix.set_time_now(time_base),
            }
        }
        Ok(Bytes::from(frame.to_hex()?))
    }
}

fn encode_header(shared: &PmuShared) -> Bytes {
    let mut frame = shared.header.read().clone();
    if shared.stamp_time.load(Ordering::Relaxed) {
        let time_base = shared.cfg2.read().time_base;
        frame.prefix.set_time_now(time_base);
    }
    Bytes::from(frame.to_hex())
}

fn encode_cfg(shared: &PmuShared, cfg_type: u8) -> std::result::Result<Bytes, FrameError> {
    let mut frame = {
        let lock = if cfg_type == 1 { &shared.cfg1 } else { &shared.cfg2 };
        let mut cfg = lock.write();
        cfg.mark_transmitted();
        cfg.clone()
    };
    if shared.stamp_time.load(Ordering::Relaxed) {
        frame.prefix.set_time_now(frame.time_base);
    }
    Ok(Bytes::from(frame.to_hex()?))
}

async fn accept_loop(
    listener: TcpListener,
    shared: Arc<PmuShared>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    spawn_session(&shared, stream, addr, shutdown.clone());
                }
                Err(err) => {
                    warn!("accept failed: {err}");
                }
            }
        }
    }
    info!("PMU listener closed");
}

fn spawn_session(
    shared: &Arc<PmuShared>,
    stream: TcpStream,
    addr: SocketAddr,
    shutdown: watch::Receiver<bool>,
) {
    let id = shared.next_client.fetch_add(1, Ordering::Relaxed);
    let (tx, rx) = mpsc::channel(CLIENT_QUEUE_DEPTH);
    let streaming = Arc::new(AtomicBool::new(false));
    shared.clients.write().insert(
        id,
        ClientHandle {
            addr,
            tx: tx.clone(),
            streaming: streaming.clone(),
        },
    );

    if shared.announce_on_connect.load(Ordering::Relaxed) {
        let _ = tx.try_send(encode_header(shared));
        match encode_cfg(shared, 2) {
            Ok(bytes) => {
                let _ = tx.try_send(bytes);
            }
            Err(err) => warn!(client = id, "cannot announce configuration: {err}"),
        }
    }

    tokio::spawn(client_session(shared.clone(), id, addr, stream, rx, streaming, shutdown));
}

async fn client_session(
    shared: Arc<PmuShared>,
    id: ClientId,
    addr: SocketAddr,
    stream: TcpStream,
    mut rx: mpsc::Receiver<Bytes>,
    streaming: Arc<AtomicBool>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(client = id, %addr, "PDC client connected");
    let (mut rd, mut wr) = stream.into_split();
    let mut decoder = FrameDecoder::new();
    let mut context = ConfigIndex::new();

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                // Drain writes already queued, then close.
                while let Ok(bytes) = rx.try_recv() {
                    if wr.write_all(&bytes).await.is_err() {
                        break;
                    }
                }
                break;
            }
            queued = rx.recv() => match queued {
                Some(bytes) => {
                    if let Err(err) = wr.write_all(&bytes).await {
                        warn!(client = id, "write failed: {err}");
                        break;
                    }
                }
                // Removed from the client set (stop, slow-consumer drop).
                None => break,
            },
            received = read_frame(&mut rd, &mut decoder, &mut context) => match received {
                Ok(Some((frame, _))) => {
                    if !handle_frame(&shared, id, &streaming, &mut wr, frame).await {
                        break;
                    }
                }
                Ok(None) => {
                    info!(client = id, %addr, "peer closed connection");
                    break;
                }
                Err(err) => {
                    warn!(client = id, "read failed: {err}");
                    break;
                }
            }
        }
    }

    shared.clients.write().remove(&id);
    info!(client = id, %addr, "connection closed");
}

/// Reacts to one frame from a client. Returns `false` when the session
/// should end.
async fn handle_frame(
    shared: &Arc<PmuShared>,
    id: ClientId,
    streaming: &AtomicBool,
    wr: &mut OwnedWriteHalf,
    frame: Frame,
) -> bool {
    let cmd = match frame {
        Frame::Command(cmd) => cmd,
        other => {
            debug!(client = id, "ignoring unexpected {}", other.frame_type());
            return true;
        }
    };

    match cmd.command_type() {
        Some(CommandType::TurnOnTransmission) => {
            streaming.store(true, Ordering::Relaxed);
            info!(client = id, "transmission on");
            true
        }
        Some(CommandType::TurnOffTransmission) => {
            streaming.store(false, Ordering::Relaxed);
            info!(client = id, "transmission off");
            true
        }
        Some(CommandType::SendHeaderFrame) => {
            info!(client = id, "header frame requested");
            write_reply(wr, id, encode_header(shared)).await
        }
        Some(CommandType::SendConfigFrame1) => {
            info!(client = id, "configuration frame 1 requested");
            match encode_cfg(shared, 1) {
                Ok(bytes) => write_reply(wr, id, bytes).await,
                Err(err) => {
                    warn!(client = id, "cannot encode CFG-1: {err}");
                    true
                }
            }
        }
        Some(CommandType::SendConfigFrame2) => {
            info!(client = id, "configuration frame 2 requested");
            match encode_cfg(shared, 2) {
                Ok(bytes) => write_reply(wr, id, bytes).await,
                Err(err) => {
                    warn!(client = id, "cannot encode CFG-2: {err}");
                    true
                }
            }
        }
        Some(CommandType::SendConfigFrame3) => {
            // CFG-3 is out of scope; a header frame is the standard's only
            // free-form response vehicle, so the requester gets a decodable
            // negative answer instead of silence.
            info!(client = id, "configuration frame 3 requested, answering negatively");
            let mut reply = HeaderFrame::new(
                shared.cfg2.read().prefix.idcode,
                "Configuration frame 3 is not supported.",
            );
            if shared.stamp_time.load(Ordering::Relaxed) {
                let time_base = shared.cfg2.read().time_base;
                reply.prefix.set_time_now(time_base);
            }
            write_reply(wr, id, Bytes::from(reply.to_hex())).await
        }
        Some(CommandType::SendExtendedFrame) => {
            debug!(client = id, "extended frame ignored");
            true
        }
        None => {
            warn!(client = id, code = cmd.command, "unsupported command code");
            true
        }
    }
}

async fn write_reply(wr: &mut OwnedWriteHalf, id: ClientId, bytes: Bytes) -> bool {
    if let Err(err) = wr.write_all(&bytes).await {
        warn!(client = id, "reply failed: {err}");
        return false;
    }
    true
}
