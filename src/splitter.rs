//! # Stream Splitter
//!
//! One upstream PDC session fanned out to any number of downstream
//! clients through an embedded PMU endpoint. Downstream clients are served
//! the cached upstream header and configuration and can start or stop
//! their own stream; those commands are absorbed locally, never forwarded.
//! The splitter keeps upstream transmission on while at least one
//! downstream client is attached and turns it off when the last one
//! leaves. Data bytes are resent exactly as received.
//!
//! Losing the upstream drops every downstream client and triggers
//! reconnection with exponential backoff.

use bytes::Bytes;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::endpoint::{EndpointError, Result};
use crate::ieee_c37_118::codec::Frame;
use crate::ieee_c37_118::common::FrameError;
use crate::pdc::Pdc;
use crate::pmu::Pmu;

const BACKOFF_INITIAL: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(30);

/// How often downstream attachment is reconciled with upstream
/// transmission state.
const ATTACH_POLL: Duration = Duration::from_millis(200);

/// The stream splitter endpoint.
pub struct StreamSplitter {
    source_ip: String,
    source_port: u16,
    id_code: u16,
    pmu: Arc<Pmu>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StreamSplitter {
    /// Creates a splitter that consumes `source_ip:source_port` upstream
    /// and serves downstream clients on `listen_ip:listen_port`. `id_code`
    /// addresses the upstream stream and is reused by the embedded PMU
    /// until the upstream configuration replaces it.
    pub fn new(
        source_ip: &str,
        source_port: u16,
        listen_ip: &str,
        listen_port: u16,
        id_code: u16,
    ) -> std::result::Result<Self, FrameError> {
        let pmu = Pmu::new(id_code, listen_ip, listen_port, "Station A", 30)?;
        // Forwarded bytes must stay verbatim, and late joiners need the
        // cached header/configuration without asking.
        pmu.set_stamp_time(false);
        pmu.set_announce_on_connect(true);
        let (shutdown, _) = watch::channel(false);
        Ok(StreamSplitter {
            source_ip: source_ip.to_string(),
            source_port,
            id_code,
            pmu: Arc::new(pmu),
            shutdown,
            task: Mutex::new(None),
        })
    }

    /// Connects upstream, retrieves header and configuration, binds the
    /// downstream listener and starts forwarding.
    pub async fn run(&self) -> Result<()> {
        if self.task.lock().is_some() {
            return Err(EndpointError::NotReady("splitter already running".to_string()));
        }

        let mut pdc = Pdc::new(self.id_code, &self.source_ip, self.source_port);
        pdc.run().await?;
        let header = pdc.get_header().await?;
        let cfg = pdc
            .get_config()
            .await?
            .ok_or_else(|| EndpointError::Timeout("upstream configuration".to_string()))?;
        if let Some(header) = header {
            self.pmu.set_header_frame(header);
        }
        self.pmu.set_configuration(Some(cfg))?;
        self.pmu.run().await?;
        let source = format!("{}:{}", self.source_ip, self.source_port);
        if let Some(listen) = self.pmu.local_addr() {
            info!(source = %source, listen = %listen, "splitter running");
        }

        let pmu = self.pmu.clone();
        let shutdown = self.shutdown.subscribe();
        let source_ip = self.source_ip.clone();
        let source_port = self.source_port;
        let id_code = self.id_code;
        let handle = tokio::spawn(splitter_loop(
            pdc, pmu, source_ip, source_port, id_code, shutdown,
        ));
        *self.task.lock() = Some(handle);
        Ok(())
    }

    /// The embedded downstream PMU endpoint.
    pub fn downstream(&self) -> &Pmu {
        &self.pmu
    }

    /// Downstream listener address, available after [`StreamSplitter::run`].
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.pmu.local_addr()
    }

    /// Stops forwarding and the downstream endpoint. Idempotent.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
        self.pmu.stop();
    }

    /// Waits for the forwarding task and the downstream endpoint to wind
    /// down (after [`StreamSplitter::stop`]).
    pub async fn join(&self) {
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.pmu.join().await;
    }
}

async fn splitter_loop(
    mut pdc: Pdc,
    pmu: Arc<Pmu>,
    source_ip: String,
    source_port: u16,
    id_code: u16,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut backoff = BACKOFF_INITIAL;
    loop {
        if forward_session(&mut pdc, &pmu, &mut shutdown).await {
            break;
        }

        warn!("upstream connection lost, dropping downstream clients");
        pmu.drop_all_clients();
        pdc.quit();

        // Reconnect with exponential backoff until shutdown.
        loop {
            tokio::select! {
                _ = shutdown.changed() => return,
                _ = tokio::time::sleep(backoff) => {}
            }
            backoff = (backoff * 2).min(BACKOFF_CAP);

            match reconnect(id_code, &source_ip, source_port).await {
                Ok((fresh, header, cfg)) => {
                    if let Some(header) = header {
                        pmu.set_header_frame(header);
                    }
                    if let Err(err) = pmu.set_configuration(Some(cfg)) {
                        warn!("upstream configuration rejected: {err}");
                        continue;
                    }
                    pdc = fresh;
                    backoff = BACKOFF_INITIAL;
                    info!("upstream reconnected");
                    break;
                }
                Err(err) => {
                    warn!("reconnect failed: {err}");
                }
            }
        }
    }
    info!("splitter stopped");
}

async fn reconnect(
    id_code: u16,
    source_ip: &str,
    source_port: u16,
) -> Result<(
    Pdc,
    Option<crate::ieee_c37_118::header::HeaderFrame>,
    crate::ieee_c37_118::config::ConfigurationFrame,
)> {
    let mut pdc = Pdc::new(id_code, source_ip, source_port);
    pdc.run().await?;
    let header = pdc.get_header().await?;
    let cfg = pdc
        .get_config()
        .await?
        .ok_or_else(|| EndpointError::Timeout("upstream configuration".to_string()))?;
    Ok((pdc, header, cfg))
}

/// Forwards upstream frames until the upstream drops (`false`) or
/// shutdown is requested (`true`).
async fn forward_session(pdc: &mut Pdc, pmu: &Pmu, shutdown: &mut watch::Receiver<bool>) -> bool {
    let mut frames: mpsc::Receiver<(Frame, Bytes)> = match pdc.take_frames() {
        Some(rx) => rx,
        None => return false,
    };
    let mut ticker = tokio::time::interval(ATTACH_POLL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut upstream_on = false;

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                let _ = pdc.stop().await;
                return true;
            }
            _ = ticker.tick() => {
                let attached = pmu.client_count();
                if attached > 0 && !upstream_on {
                    if pdc.start().await.is_ok() {
                        upstream_on = true;
                        info!(attached, "downstream clients attached, upstream transmission on");
                    }
                } else if attached == 0 && upstream_on {
                    if pdc.stop().await.is_ok() {
                        upstream_on = false;
                        info!("no downstream clients, upstream transmission off");
                    }
                }
            }
            received = frames.recv() => match received {
                Some((frame, raw)) => forward(pmu, frame, raw),
                None => return false,
            }
        }
    }
}

fn forward(pmu: &Pmu, frame: Frame, raw: Bytes) {
    match frame {
        // Data only reaches downstream clients that asked for it. The
        // already-validated receive buffer is resent untouched.
        Frame::Data(_) => pmu.broadcast_raw(raw, true),
        // Header and configuration changes refresh the cache served to new
        // clients and are re-announced to everyone connected. Stamping is
        // off, so the re-encoded bytes equal the received ones.
        Frame::Header(header) => pmu.set_header_frame(header),
        Frame::Config(cfg) => {
            if let Err(err) = pmu.set_configuration(Some(cfg)) {
                warn!("dropping unusable upstream configuration: {err}");
            }
        }
        // A PMU-side stream never carries commands downstream.
        Frame::Command(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_configures_forwarding_pmu() {
        let splitter = StreamSplitter::new("127.0.0.1", 4712, "127.0.0.1", 0, 1).unwrap();
        assert_eq!(splitter.downstream().idcode(), 1);
        assert!(splitter.local_addr().is_none());
    }

    #[tokio::test]
    async fn test_run_fails_fast_on_dead_upstream() {
        // Port 1 on localhost refuses connections.
        let splitter = StreamSplitter::new("127.0.0.1", 1, "127.0.0.1", 0, 1).unwrap();
        assert!(splitter.run().await.is_err());
    }
}
