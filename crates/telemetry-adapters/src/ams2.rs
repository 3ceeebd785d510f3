//! Automobilista 2 via SMS UDP (car physics packets).
//!
//! Only `eCarPhysics` packets (type 0) are decoded. Staleness is measured
//! from packet receipt: a short gap is "no data", a long one forces a
//! reconnect.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use ssp_telemetry_core::{
    CapabilitySpec, SignalSpec, SignalType, TelemetryError, TelemetryFrame, TelemetryResult,
    round_to, signal,
};
use tracing::{debug, info};

use crate::decode::{
    CoreSample, Decoded, PlausibilityFilter, Verdict, read_f32_le, read_u8, read_u16_le,
};
use crate::physics_page::PLAUSIBLE_MAX_RPM;
use crate::plugin::{DEFAULT_SAMPLE_HZ, SourcePlugin};
use crate::udp::UdpReceiver;

pub const DEFAULT_AMS2_PORT: u16 = 5606;

const PACKET_BASE_LEN: usize = 12;
const OFF_PACKET_TYPE: usize = 10;
const PACKET_TYPE_CAR_PHYSICS: u8 = 0;
const OFF_BRAKE: usize = 29;
const OFF_THROTTLE: usize = 30;
const OFF_SPEED: usize = 36;
const OFF_RPM: usize = 40;
const OFF_MAX_RPM: usize = 42;
const OFF_GEAR_NUM_GEARS: usize = 45;
pub const MIN_PACKET_LEN: usize = OFF_GEAR_NUM_GEARS + 1;

const OPEN_WAIT: Duration = Duration::from_millis(600);
const OPEN_POLL: Duration = Duration::from_millis(20);
const NO_DATA_AFTER: Duration = Duration::from_millis(500);
const STALE_AFTER: Duration = Duration::from_secs(2);

/// Decoded car physics fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ams2Packet {
    pub rpm: u16,
    pub max_rpm: u16,
    /// m/s, signed.
    pub speed_ms: f32,
    pub throttle_raw: u8,
    pub brake_raw: u8,
    pub gear: i32,
    pub num_gears: u8,
}

/// Split the packed gear byte: low nibble gear (15 = reverse), high nibble gear count.
pub fn decode_gear(packed: u8) -> (i32, u8) {
    let gear = match packed & 0x0F {
        15 => -1,
        g => i32::from(g),
    };
    (gear, packed >> 4)
}

impl Ams2Packet {
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < PACKET_BASE_LEN.max(MIN_PACKET_LEN) {
            return None;
        }
        if read_u8(data, OFF_PACKET_TYPE)? != PACKET_TYPE_CAR_PHYSICS {
            return None;
        }
        let (gear, num_gears) = decode_gear(read_u8(data, OFF_GEAR_NUM_GEARS)?);
        Some(Self {
            rpm: read_u16_le(data, OFF_RPM)?,
            max_rpm: read_u16_le(data, OFF_MAX_RPM)?,
            speed_ms: read_f32_le(data, OFF_SPEED)?,
            throttle_raw: read_u8(data, OFF_THROTTLE)?,
            brake_raw: read_u8(data, OFF_BRAKE)?,
            gear,
            num_gears,
        })
    }

    pub fn core_sample(&self) -> CoreSample {
        CoreSample {
            rpm: f64::from(self.rpm),
            speed_kmh: f64::from(self.speed_ms) * 3.6,
            gear: self.gear,
            throttle: f64::from(self.throttle_raw) / 255.0,
            brake: f64::from(self.brake_raw) / 255.0,
        }
    }

    pub fn native_max_rpm(&self) -> Option<u16> {
        Some(self.max_rpm).filter(|rpm| PLAUSIBLE_MAX_RPM.contains(&i32::from(*rpm)))
    }

    pub fn to_frame(&self, timestamp: f64) -> TelemetryFrame {
        let mut frame = self.core_sample().to_frame(Ams2Source::ID, timestamp);
        if let Some(max_rpm) = self.native_max_rpm() {
            let ratio = (f64::from(self.rpm) / f64::from(max_rpm)).clamp(0.0, 1.0);
            frame.insert_signal(signal::ENGINE_RPM_MAX, max_rpm);
            frame.insert_signal(signal::ENGINE_RPM_PCT, round_to(ratio, 3));
        }
        frame
    }
}

/// Receive-thread filter: structurally valid car physics inside the envelope.
fn accept_packet(data: &[u8]) -> Option<Ams2Packet> {
    Ams2Packet::parse(data)
        .filter(|p| PlausibilityFilter::STANDARD.in_range(&p.core_sample()))
}

/// Full decoder contract: only live, in-range physics packets are readings.
pub fn decode(data: &[u8]) -> Decoded<Ams2Packet> {
    match accept_packet(data) {
        Some(p) if PlausibilityFilter::STANDARD.verdict(&p.core_sample()) == Verdict::Alive => {
            Decoded::Reading(p)
        }
        _ => Decoded::Invalid,
    }
}

pub struct Ams2Source {
    bind_addr: SocketAddr,
    receiver: Option<UdpReceiver<Ams2Packet>>,
}

impl Ams2Source {
    pub const ID: &'static str = "ams2";

    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            receiver: None,
        }
    }

    /// Address actually bound while open.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.receiver.as_ref().map(UdpReceiver::local_addr)
    }
}

impl SourcePlugin for Ams2Source {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn name(&self) -> &'static str {
        "Automobilista 2 (UDP/SMS)"
    }

    fn open(&mut self) -> TelemetryResult<()> {
        self.close();
        let receiver = UdpReceiver::spawn(Self::ID, self.bind_addr, accept_packet)?;

        let deadline = Instant::now() + OPEN_WAIT;
        while Instant::now() < deadline {
            if receiver.latest().is_some() {
                info!(addr = %receiver.local_addr(), "Receiving Automobilista 2 UDP telemetry");
                self.receiver = Some(receiver);
                return Ok(());
            }
            std::thread::sleep(OPEN_POLL);
        }

        Err(TelemetryError::not_available(
            Self::ID,
            format!(
                "no UDP packets on port {}; enable UDP telemetry in AMS2 and match the port",
                self.bind_addr.port()
            ),
        ))
    }

    fn read_frame(&mut self) -> TelemetryResult<Option<TelemetryFrame>> {
        let Some(receiver) = &self.receiver else {
            return Err(TelemetryError::not_available(Self::ID, "source is not open"));
        };
        let Some(latest) = receiver.latest() else {
            return Ok(None);
        };

        let age = latest.age(Instant::now());
        if age > STALE_AFTER {
            return Err(TelemetryError::stale(
                Self::ID,
                format!("no UDP packets for {:.1}s", age.as_secs_f64()),
            ));
        }
        if age > NO_DATA_AFTER {
            return Ok(None);
        }

        let sample = latest.value.core_sample();
        if PlausibilityFilter::STANDARD.verdict(&sample) != Verdict::Alive {
            return Ok(None);
        }
        Ok(Some(latest.value.to_frame(latest.wall_ts)))
    }

    fn capabilities(&self) -> CapabilitySpec {
        CapabilitySpec::standard(Self::ID, DEFAULT_SAMPLE_HZ).with_signal(
            signal::ENGINE_RPM_MAX,
            SignalSpec::new(SignalType::Integer, "rpm", DEFAULT_SAMPLE_HZ)
                .range(1000.0, 25_000.0)
                .description("Rev limit reported by the car physics packet"),
        )
    }

    fn close(&mut self) {
        if let Some(mut receiver) = self.receiver.take() {
            receiver.stop();
            debug!("Automobilista 2 UDP receiver stopped");
        }
    }

    fn is_open(&self) -> bool {
        self.receiver.is_some()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Car physics packet with the given fields.
    pub fn physics_packet(
        rpm: u16,
        max_rpm: u16,
        speed_ms: f32,
        throttle: u8,
        brake: u8,
        gear_byte: u8,
    ) -> Vec<u8> {
        let mut data = vec![0u8; 559];
        put(&mut data, OFF_PACKET_TYPE, &[PACKET_TYPE_CAR_PHYSICS]);
        put(&mut data, OFF_BRAKE, &[brake]);
        put(&mut data, OFF_THROTTLE, &[throttle]);
        put(&mut data, OFF_SPEED, &speed_ms.to_le_bytes());
        put(&mut data, OFF_RPM, &rpm.to_le_bytes());
        put(&mut data, OFF_MAX_RPM, &max_rpm.to_le_bytes());
        put(&mut data, OFF_GEAR_NUM_GEARS, &[gear_byte]);
        data
    }

    fn put(data: &mut [u8], offset: usize, bytes: &[u8]) {
        if let Some(slot) = data.get_mut(offset..offset + bytes.len()) {
            slot.copy_from_slice(bytes);
        }
    }
}
