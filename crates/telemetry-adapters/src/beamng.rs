//! BeamNG.drive telemetry via the OutGauge UDP protocol.
//!
//! OutGauge is the LFS layout: 92 bytes, or 96 with the optional `id`.
//! BeamNG always writes `"beam"` into the car tag and has no vehicle model
//! identifier, so the source synthesizes `vehicle.car_id` from idle periods
//! (see [`IdleEpochTracker`]).
//!
//! Layout: time(u32@0), car([4]u8@4), flags(u16@8), gear(u8@10), plid(u8@11),
//! speed(f32@12, m/s), rpm(f32@16), ..., throttle(f32@48), brake(f32@52),
//! clutch(f32@56), display1/2, id(i32@92, optional).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ssp_telemetry_core::{
    CapabilitySpec, TelemetryError, TelemetryFrame, TelemetryResult, signal,
};
use tracing::{debug, info};

use crate::decode::{CoreSample, Decoded, PlausibilityFilter, read_f32_le, read_u8};
use crate::plugin::{DEFAULT_SAMPLE_HZ, SourcePlugin};
use crate::process::ProcessQuery;
use crate::udp::UdpReceiver;
use crate::watchdog::{IdleEpochTracker, IdleProbe, ProcessWatch};

pub const DEFAULT_BEAMNG_PORT: u16 = 4444;
pub const BEAMNG_PROCESS: &str = "BeamNG.drive.x64.exe";

pub const OUTGAUGE_PACKET_LEN: usize = 92;
const OFF_CAR: usize = 4;
const OFF_GEAR: usize = 10;
const OFF_SPEED: usize = 12;
const OFF_RPM: usize = 16;
const OFF_THROTTLE: usize = 48;
const OFF_BRAKE: usize = 52;

const CAR_TAGS: [&[u8; 4]; 2] = [b"beam", b"BEAM"];
const STALE_AFTER: Duration = Duration::from_millis(600);

/// OutGauge fields used by the bridge, in source units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutGaugePacket {
    pub gear: i32,
    pub speed_ms: f32,
    pub rpm: f32,
    /// 0..1
    pub throttle: f32,
    /// 0..1
    pub brake: f32,
}

/// OutGauge gear byte: 0 = reverse, 1 = neutral, 2 = first.
pub fn normalize_gear(raw: u8) -> i32 {
    match raw {
        0 => -1,
        g => i32::from(g) - 1,
    }
}

impl OutGaugePacket {
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < OUTGAUGE_PACKET_LEN {
            return None;
        }
        let tag = data.get(OFF_CAR..OFF_CAR + 4)?;
        if !CAR_TAGS.iter().any(|expected| tag == expected.as_slice()) {
            return None;
        }
        Some(Self {
            gear: normalize_gear(read_u8(data, OFF_GEAR)?),
            speed_ms: read_f32_le(data, OFF_SPEED)?,
            rpm: read_f32_le(data, OFF_RPM)?,
            throttle: read_f32_le(data, OFF_THROTTLE)?,
            brake: read_f32_le(data, OFF_BRAKE)?,
        })
    }

    pub fn core_sample(&self) -> CoreSample {
        CoreSample {
            rpm: f64::from(self.rpm),
            speed_kmh: f64::from(self.speed_ms) * 3.6,
            gear: self.gear,
            throttle: f64::from(self.throttle),
            brake: f64::from(self.brake),
        }
    }

    fn throttle_pct(&self) -> f64 {
        f64::from(self.throttle) * 100.0
    }

    fn brake_pct(&self) -> f64 {
        f64::from(self.brake) * 100.0
    }

    /// Looser than the shared filter: BeamNG idles at low but non-zero values
    /// that still mean a car is loaded.
    pub fn is_live(&self) -> bool {
        self.rpm > 0.0
            || self.speed_ms.abs() > 0.05
            || self.throttle_pct() > 0.5
            || self.brake_pct() > 0.5
    }

    fn idle_probe(&self) -> IdleProbe {
        IdleProbe {
            rpm: f64::from(self.rpm),
            speed_ms: f64::from(self.speed_ms),
            throttle_pct: self.throttle_pct(),
            brake_pct: self.brake_pct(),
        }
    }
}

/// Receive-thread filter: BeamNG OutGauge packets inside the envelope.
fn accept_packet(data: &[u8]) -> Option<OutGaugePacket> {
    OutGaugePacket::parse(data)
        .filter(|p| PlausibilityFilter::STANDARD.in_range(&p.core_sample()))
}

/// Full decoder contract: in-range packets that pass the live filter.
pub fn decode(data: &[u8]) -> Decoded<OutGaugePacket> {
    match accept_packet(data) {
        Some(p) if p.is_live() => Decoded::Reading(p),
        _ => Decoded::Invalid,
    }
}

pub struct BeamNgSource {
    bind_addr: SocketAddr,
    receiver: Option<UdpReceiver<OutGaugePacket>>,
    process: ProcessWatch,
    epochs: IdleEpochTracker,
}

impl BeamNgSource {
    pub const ID: &'static str = "beamng";

    pub fn new(bind_addr: SocketAddr, process_query: Arc<dyn ProcessQuery>) -> Self {
        Self {
            bind_addr,
            receiver: None,
            process: ProcessWatch::new(BEAMNG_PROCESS, process_query),
            epochs: IdleEpochTracker::default(),
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.receiver.as_ref().map(UdpReceiver::local_addr)
    }

    /// Evaluate the latest packet; `age` is time since it was received.
    fn process_packet(
        &mut self,
        packet: &OutGaugePacket,
        wall_ts: f64,
        age: Duration,
        now: Instant,
    ) -> Option<TelemetryFrame> {
        if age > STALE_AFTER {
            return None;
        }

        let live = packet.is_live();
        if live {
            self.epochs.mark_activity();
        }
        self.epochs.observe(&packet.idle_probe(), now);
        if !live {
            return None;
        }

        let car_id = self.epochs.car_id(Self::ID);
        Some(
            packet
                .core_sample()
                .to_frame(Self::ID, wall_ts)
                .with_signal(signal::VEHICLE_CAR_ID, car_id),
        )
    }
}

impl SourcePlugin for BeamNgSource {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn name(&self) -> &'static str {
        "BeamNG.drive"
    }

    fn open(&mut self) -> TelemetryResult<()> {
        self.close();
        let receiver = UdpReceiver::spawn(Self::ID, self.bind_addr, accept_packet)?;
        info!(addr = %receiver.local_addr(), "BeamNG OutGauge listener started");
        self.receiver = Some(receiver);
        self.process.reset();
        self.epochs.reset();
        Ok(())
    }

    fn read_frame(&mut self) -> TelemetryResult<Option<TelemetryFrame>> {
        let now = Instant::now();
        if !self.process.running_at(now) {
            return Err(TelemetryError::source_lost(
                Self::ID,
                format!("{BEAMNG_PROCESS} is no longer running"),
            ));
        }
        let latest = match &self.receiver {
            Some(receiver) => receiver.latest(),
            None => return Err(TelemetryError::not_available(Self::ID, "source is not open")),
        };
        let Some(latest) = latest else {
            return Ok(None);
        };
        let age = latest.age(now);
        Ok(self.process_packet(&latest.value, latest.wall_ts, age, now))
    }

    fn capabilities(&self) -> CapabilitySpec {
        CapabilitySpec::standard(Self::ID, DEFAULT_SAMPLE_HZ)
    }

    fn close(&mut self) {
        if let Some(mut receiver) = self.receiver.take() {
            receiver.stop();
            debug!("BeamNG OutGauge listener stopped");
        }
    }

    fn is_open(&self) -> bool {
        self.receiver.is_some()
    }
}
