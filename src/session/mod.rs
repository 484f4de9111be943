//! Stream session orchestration
//!
//! A `StreamSession` owns everything one logical audio stream needs: the
//! sender sequence counter, the receive-side jitter buffer and chunk
//! assembler, the quality monitor/controller pair, the payload codec and the
//! transport handle. Sessions are single-owner: all mutation goes through
//! `&mut self`, and cross-task access happens over the event/chunk channels.

use bytes::Bytes;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::buffer::{AudioChunk, ChunkAssembler, InsertOutcome, JitterBuffer, JitterEntry, JitterStats};
use crate::codec::{bytes_to_pcm, DeltaCodec};
use crate::config::AppConfig;
use crate::error::{Result, SessionError};
use crate::network::{Inbound, Transport, TransportKind, TransportStats};
use crate::protocol::{self, Compression, PacketFlags, QualityProfile};
use crate::quality::{
    AdaptiveQualityController, AdjustmentReason, NetworkMetrics, NetworkQualityMonitor,
    ProfileChange,
};

/// Typed session events for observers
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A validated packet entered the jitter buffer
    PacketReceived {
        sequence: u32,
        bytes: usize,
        from: SocketAddr,
    },
    /// The adaptive controller committed a profile switch
    QualityChanged {
        old: QualityProfile,
        new: QualityProfile,
        reason: AdjustmentReason,
    },
    /// A sequence gap was detected on a connection-oriented transport;
    /// the peer may re-send the missing range
    RetransmitRequest { first_missing: u32, count: u32 },
    /// The session stopped; no packet callback fires after this
    SessionStopped { id: Uuid },
}

/// Opaque vehicle context supplied by an external collaborator
///
/// The transport core never reads or simulates these values; they ride
/// along so consumers can correlate audio with vehicle state.
#[derive(Debug, Clone, Default)]
pub struct DrivingContext {
    pub speed_kph: f32,
    pub cabin_noise_db: f32,
    pub driving_mode: String,
}

/// Full statistics snapshot for one session
#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionStats {
    pub id: Uuid,
    pub running: bool,
    pub profile: QualityProfile,
    pub network: NetworkMetrics,
    pub transport: TransportStats,
    pub jitter: JitterStats,
}

/// One logical audio stream between head unit and backend
pub struct StreamSession {
    id: Uuid,
    config: AppConfig,
    initial_profile: QualityProfile,
    channels: u8,
    running: bool,
    started_at: Instant,
    /// Sender-side sequence counter; exclusively owned, reset on start
    sequence: u32,
    transport: Box<dyn Transport>,
    transport_kind: TransportKind,
    incoming: Option<mpsc::Receiver<Inbound>>,
    compressor: DeltaCodec,
    decompressor: DeltaCodec,
    jitter: JitterBuffer,
    assembler: ChunkAssembler,
    monitor: NetworkQualityMonitor,
    controller: AdaptiveQualityController,
    event_tx: Sender<StreamEvent>,
    event_rx: Receiver<StreamEvent>,
    chunk_tx: Sender<AudioChunk>,
    chunk_rx: Receiver<AudioChunk>,
    driving_context: Option<DrivingContext>,
}

impl StreamSession {
    pub fn new(config: AppConfig, profile: QualityProfile, channels: u8, transport: Box<dyn Transport>) -> Self {
        let (event_tx, event_rx) = unbounded();
        let (chunk_tx, chunk_rx) = unbounded();
        let transport_kind = transport.kind();
        let rate = config.compression.adaptation_rate;

        Self {
            id: Uuid::new_v4(),
            initial_profile: profile,
            channels,
            running: false,
            started_at: Instant::now(),
            sequence: 0,
            transport,
            transport_kind,
            incoming: None,
            compressor: DeltaCodec::new(profile.compression(), rate),
            decompressor: DeltaCodec::new(profile.compression(), rate),
            jitter: JitterBuffer::new(config.jitter.capacity, config.jitter.high_water),
            assembler: ChunkAssembler::new(
                config.jitter.chunk_packets_clamped(),
                profile.sample_rate(),
                channels,
            ),
            monitor: NetworkQualityMonitor::new(
                config.quality.smoothing,
                config.quality.assess_interval(),
            ),
            controller: AdaptiveQualityController::new(config.quality.clone(), profile),
            event_tx,
            event_rx,
            chunk_tx,
            chunk_rx,
            driving_context: None,
            config,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Currently active quality profile
    pub fn profile(&self) -> QualityProfile {
        self.controller.profile()
    }

    /// Transport address once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.transport.local_addr()
    }

    /// Subscribe to session events; receivers may be cloned freely
    pub fn events(&self) -> Receiver<StreamEvent> {
        self.event_rx.clone()
    }

    /// Subscribe to ordered, decoded audio chunks
    pub fn chunks(&self) -> Receiver<AudioChunk> {
        self.chunk_rx.clone()
    }

    /// Attach vehicle context from an external collaborator
    pub fn set_driving_context(&mut self, context: DrivingContext) {
        self.driving_context = Some(context);
    }

    pub fn driving_context(&self) -> Option<&DrivingContext> {
        self.driving_context.as_ref()
    }

    /// Milliseconds since session start; the sender's timestamp epoch
    pub fn elapsed_ms(&self) -> u32 {
        self.started_at.elapsed().as_millis() as u32
    }

    /// Start the session: bind the transport and reset all per-stream state
    ///
    /// A bind/listen failure is fatal and aborts the start; everything after
    /// that is recoverable and absorbed into statistics.
    pub async fn start(&mut self) -> Result<()> {
        if self.running {
            return Err(SessionError::AlreadyStarted.into());
        }

        self.transport.start().await?;
        self.incoming = self.transport.take_incoming();

        self.sequence = 0;
        self.jitter.reset(0);
        self.monitor.reset();
        self.controller.reset(self.initial_profile);
        self.compressor.set_kind(self.initial_profile.compression());
        self.decompressor.set_kind(self.initial_profile.compression());
        self.started_at = Instant::now();
        self.running = true;

        tracing::info!(id = %self.id, profile = %self.initial_profile, "stream session started");
        Ok(())
    }

    /// Stop the session: no packet callback fires after this returns
    ///
    /// Buffered entries are flushed to the consumer, then transport
    /// resources are released, all before returning.
    pub async fn stop(&mut self) -> Result<()> {
        if !self.running {
            return Err(SessionError::NotRunning.into());
        }
        self.running = false;
        self.incoming = None;

        let tail = self.jitter.drain();
        self.deliver(tail);
        if let Some(chunk) = self.assembler.flush() {
            let _ = self.chunk_tx.send(chunk);
        }

        self.transport.shutdown().await;
        self.emit(StreamEvent::SessionStopped { id: self.id });
        tracing::info!(id = %self.id, "stream session stopped");
        Ok(())
    }

    /// Compress, frame and send one chunk of captured samples
    ///
    /// Send failures are recoverable: they count as loss and the session
    /// keeps running under whatever quality the network allows.
    pub async fn stream_chunk(&mut self, samples: &[i16], end_of_utterance: bool) -> Result<()> {
        if !self.running {
            return Err(SessionError::NotRunning.into());
        }

        let profile = self.controller.profile();
        let kind = profile.compression();
        if self.compressor.kind() != kind {
            self.compressor.set_kind(kind);
        }
        let payload = self.compressor.compress(samples);

        let flags = PacketFlags {
            compressed: kind != Compression::Off,
            priority: false,
            end_of_utterance,
        };
        let packet = protocol::encode(
            &payload,
            self.sequence,
            self.elapsed_ms(),
            flags,
            Some(profile.header_extension(self.channels)),
        );
        self.sequence = self.sequence.wrapping_add(1);

        let len = packet.len();
        match self.transport.send(packet).await {
            Ok(()) => self.monitor.record_sent(len),
            Err(e) => {
                self.monitor.record_lost(1);
                tracing::debug!(id = %self.id, error = %e, "send failed, counted as loss");
            }
        }
        Ok(())
    }

    /// Validate one raw inbound packet and feed it through the pipeline
    ///
    /// Corrupt, truncated or foreign packets are dropped here and counted as
    /// loss; they never reach the jitter buffer.
    pub fn handle_datagram(&mut self, data: &[u8], from: SocketAddr) {
        if !self.running {
            return;
        }

        let (header, payload) = match protocol::decode(data) {
            Ok(decoded) => decoded,
            Err(e) => {
                self.monitor.record_lost(1);
                tracing::debug!(id = %self.id, error = %e, "invalid packet dropped");
                return;
            }
        };

        // Pin the compression variant at validation time
        let compression = if !header.flags.compressed {
            Compression::Off
        } else {
            header
                .extension
                .and_then(|ext| QualityProfile::from_wire_id(ext.profile_id))
                .map(|p| p.compression())
                .unwrap_or_else(|| self.profile().compression())
        };
        if header.flags.compressed && compression == Compression::Off {
            // Compressed payload from a variant this peer cannot run:
            // discard rather than corrupt audio
            self.monitor.record_lost(1);
            tracing::warn!(id = %self.id, sequence = header.sequence, "undecodable compressed packet discarded");
            return;
        }

        let entry = JitterEntry {
            sequence: header.sequence,
            timestamp_ms: header.timestamp_ms,
            payload: Bytes::copy_from_slice(payload),
            flags: header.flags,
            compression,
            received_at: Instant::now(),
        };

        match self.jitter.insert(entry) {
            InsertOutcome::Late | InsertOutcome::Duplicate => return,
            InsertOutcome::Buffered { gap_lost } => {
                // Replayed late/duplicate packets must not inflate the
                // received count or dilute the loss rate
                self.monitor.record_received(data.len());

                // Latency from the sender timestamp against the session
                // clock. Skewed or unsynchronized clocks produce nonsense
                // samples; only a plausible one-way delay is fed in.
                let diff_ms = self.elapsed_ms() as i64 - header.timestamp_ms as i64;
                if (0..60_000).contains(&diff_ms) {
                    self.monitor.record_latency(diff_ms as f64);
                }

                if gap_lost > 0 {
                    self.monitor.record_lost(gap_lost as u64);
                    if self.transport_kind == TransportKind::ConnectionOriented {
                        self.emit(StreamEvent::RetransmitRequest {
                            first_missing: header.sequence.wrapping_sub(gap_lost),
                            count: gap_lost,
                        });
                    }
                }
            }
        }

        self.emit(StreamEvent::PacketReceived {
            sequence: header.sequence,
            bytes: data.len(),
            from,
        });

        let released = self.jitter.release_ready();
        self.deliver(released);
    }

    /// Drain all currently queued inbound packets without blocking
    pub fn poll_inbound(&mut self) -> usize {
        let mut handled = 0;
        loop {
            let inbound = match self.incoming.as_mut() {
                Some(rx) => match rx.try_recv() {
                    Ok(inbound) => inbound,
                    Err(_) => break,
                },
                None => break,
            };
            self.handle_datagram(&inbound.data, inbound.from);
            handled += 1;
        }
        handled
    }

    /// Await and handle the next inbound packet; `false` when the transport
    /// is gone
    pub async fn next_inbound(&mut self) -> bool {
        let inbound = match self.incoming.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        };
        match inbound {
            Some(inbound) => {
                self.handle_datagram(&inbound.data, inbound.from);
                true
            }
            None => false,
        }
    }

    /// Event-loop driver: handles inbound packets and periodic quality
    /// assessment until `shutdown` flips or the transport closes
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        let mut assess = tokio::time::interval(self.config.quality.assess_interval());
        assess.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut incoming = self.incoming.take();

        loop {
            tokio::select! {
                inbound = recv_opt(&mut incoming) => match inbound {
                    Some(packet) => self.handle_datagram(&packet.data, packet.from),
                    None => break,
                },
                _ = assess.tick() => self.assess_quality(),
                _ = shutdown.changed() => break,
            }
        }

        self.incoming = incoming;
    }

    /// Interval-gated quality assessment; may switch the active profile
    pub fn assess_quality(&mut self) {
        let now = Instant::now();
        if let Some(metrics) = self.monitor.assess(now) {
            let underruns = self.jitter.stats().underruns;
            if let Some(change) = self.controller.evaluate_at(&metrics, underruns, now) {
                self.apply_profile_change(change);
            }
        }
    }

    /// Immediate assessment, bypassing the interval gate
    pub fn force_assessment(&mut self) -> NetworkMetrics {
        let metrics = self.monitor.assess_now();
        let underruns = self.jitter.stats().underruns;
        if let Some(change) = self.controller.evaluate_at(&metrics, underruns, Instant::now()) {
            self.apply_profile_change(change);
        }
        metrics
    }

    /// Feed an externally measured latency sample (collaborators with their
    /// own clock sync)
    pub fn record_latency(&mut self, latency_ms: f64) {
        self.monitor.record_latency(latency_ms);
    }

    /// Record that the playback side polled for audio and found none
    pub fn record_underrun(&mut self) {
        self.jitter.record_underrun();
    }

    /// Full statistics snapshot
    pub fn snapshot(&self) -> SessionStats {
        SessionStats {
            id: self.id,
            running: self.running,
            profile: self.controller.profile(),
            network: self.monitor.snapshot(),
            transport: self.transport.stats(),
            jitter: self.jitter.stats(),
        }
    }

    fn apply_profile_change(&mut self, change: ProfileChange) {
        // Predictor state must never survive a variant switch
        self.compressor.set_kind(change.new.compression());
        if let Some(chunk) = self.assembler.set_format(change.new.sample_rate(), self.channels) {
            let _ = self.chunk_tx.send(chunk);
        }
        self.emit(StreamEvent::QualityChanged {
            old: change.old,
            new: change.new,
            reason: change.reason,
        });
    }

    /// Decompress released packets and hand assembled chunks to the consumer
    fn deliver(&mut self, entries: Vec<JitterEntry>) {
        for entry in entries {
            let samples = match entry.compression {
                Compression::Off => bytes_to_pcm(&entry.payload),
                kind => {
                    if self.decompressor.kind() != kind {
                        self.decompressor.set_kind(kind);
                    }
                    self.decompressor.decompress(&entry.payload)
                }
            };
            if let Some(chunk) = self.assembler.push(
                entry.sequence,
                entry.timestamp_ms,
                &samples,
                entry.flags.end_of_utterance,
            ) {
                let _ = self.chunk_tx.send(chunk);
            }
        }
    }

    fn emit(&self, event: StreamEvent) {
        let _ = self.event_tx.send(event);
    }
}

async fn recv_opt(rx: &mut Option<mpsc::Receiver<Inbound>>) -> Option<Inbound> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
