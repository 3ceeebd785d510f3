//! Assetto Corsa family shared-memory pages.
//!
//! Both AC and ACC publish the same physics page prefix. ACC additionally
//! exposes a static page with the car model and the rev limit.

use crate::decode::{
    CoreSample, Decoded, PlausibilityFilter, Verdict, read_f32_le, read_i32_le, read_wide_string,
};

pub const PHYSICS_MAPPINGS: [&str; 2] = ["Local\\acpmf_physics", "acpmf_physics"];
pub const STATIC_MAPPINGS: [&str; 2] = ["Local\\acpmf_static", "acpmf_static"];

const OFF_PACKET_ID: usize = 0;
const OFF_GAS: usize = 4;
const OFF_BRAKE: usize = 8;
const OFF_GEAR: usize = 16;
const OFF_RPM: usize = 20;
const OFF_SPEED_KMH: usize = 28;

/// Bytes needed for the physics fields above.
pub const PHYSICS_MIN_LEN: usize = 32;

/// Raw physics page fields. Gear is the page's own encoding (0 = R, 1 = N).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicsPage {
    pub packet_id: i32,
    pub gas: f32,
    pub brake: f32,
    pub gear_raw: i32,
    pub rpm: i32,
    pub speed_kmh: f32,
}

impl PhysicsPage {
    pub fn parse(data: &[u8]) -> Option<Self> {
        Some(Self {
            packet_id: read_i32_le(data, OFF_PACKET_ID)?,
            gas: read_f32_le(data, OFF_GAS)?,
            brake: read_f32_le(data, OFF_BRAKE)?,
            gear_raw: read_i32_le(data, OFF_GEAR)?,
            rpm: read_i32_le(data, OFF_RPM)?,
            speed_kmh: read_f32_le(data, OFF_SPEED_KMH)?,
        })
    }

    /// Canonical gear: the page counts reverse as 0 and neutral as 1.
    pub fn gear(&self) -> i32 {
        self.gear_raw.saturating_sub(1)
    }

    pub fn core_sample(&self) -> CoreSample {
        CoreSample {
            rpm: f64::from(self.rpm),
            speed_kmh: f64::from(self.speed_kmh),
            gear: self.gear(),
            throttle: f64::from(self.gas),
            brake: f64::from(self.brake),
        }
    }

    /// A page whose producer has never written a packet is never alive.
    pub fn verdict(&self, filter: &PlausibilityFilter) -> Verdict {
        match filter.verdict(&self.core_sample()) {
            Verdict::Alive if self.packet_id <= 0 => Verdict::Idle,
            verdict => verdict,
        }
    }
}

/// Decode a physics prefix; only live, in-range pages are readings.
pub fn decode_physics(data: &[u8], filter: &PlausibilityFilter) -> Decoded<PhysicsPage> {
    match PhysicsPage::parse(data) {
        Some(page) if page.verdict(filter) == Verdict::Alive => Decoded::Reading(page),
        _ => Decoded::Invalid,
    }
}

// Static page, pack(4): smVersion[15], acVersion[15] wchar, numberOfSessions,
// numCars i32, carModel/track/playerName/playerSurname/playerNick wchar[33],
// then sectorCount i32, maxTorque f32, maxPower f32, maxRpm i32.
const WCHAR_VERSION: usize = 15;
const WCHAR_NAME: usize = 33;
const OFF_CAR_MODEL: usize = 68;
const OFF_MAX_RPM: usize = 412;

pub const STATIC_MIN_LEN: usize = OFF_MAX_RPM + 4;

pub const PLAUSIBLE_MAX_RPM: std::ops::RangeInclusive<i32> = 1000..=25_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticPage {
    pub car_model: String,
    pub max_rpm: i32,
}

impl StaticPage {
    pub fn parse(data: &[u8]) -> Option<Self> {
        Some(Self {
            car_model: read_wide_string(data, OFF_CAR_MODEL, WCHAR_NAME)?,
            max_rpm: read_i32_le(data, OFF_MAX_RPM)?,
        })
    }

    pub fn plausible_max_rpm(&self) -> Option<i32> {
        Some(self.max_rpm).filter(|rpm| PLAUSIBLE_MAX_RPM.contains(rpm))
    }
}

// Keeps the documented layout arithmetic next to the offsets it produces.
const _: () = {
    let header = 2 * WCHAR_VERSION * 2 + 4 + 4;
    assert!(header == OFF_CAR_MODEL);
    let names_end = OFF_CAR_MODEL + 5 * WCHAR_NAME * 2;
    // sectorCount aligned to 4, then maxTorque and maxPower.
    let sector_count = names_end.div_ceil(4) * 4;
    assert!(sector_count + 12 == OFF_MAX_RPM);
};

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Physics page prefix with the given fields.
    pub fn physics_bytes(
        packet_id: i32,
        gas: f32,
        brake: f32,
        gear_raw: i32,
        rpm: i32,
        speed_kmh: f32,
    ) -> Vec<u8> {
        let mut data = vec![0u8; 256];
        put(&mut data, OFF_PACKET_ID, &packet_id.to_le_bytes());
        put(&mut data, OFF_GAS, &gas.to_le_bytes());
        put(&mut data, OFF_BRAKE, &brake.to_le_bytes());
        put(&mut data, OFF_GEAR, &gear_raw.to_le_bytes());
        put(&mut data, OFF_RPM, &rpm.to_le_bytes());
        put(&mut data, OFF_SPEED_KMH, &speed_kmh.to_le_bytes());
        data
    }

    pub fn static_bytes(car_model: &str, max_rpm: i32) -> Vec<u8> {
        let mut data = vec![0u8; STATIC_MIN_LEN + 64];
        for (i, unit) in car_model.encode_utf16().take(WCHAR_NAME - 1).enumerate() {
            put(&mut data, OFF_CAR_MODEL + i * 2, &unit.to_le_bytes());
        }
        put(&mut data, OFF_MAX_RPM, &max_rpm.to_le_bytes());
        data
    }

    fn put(data: &mut [u8], offset: usize, bytes: &[u8]) {
        if let Some(slot) = data.get_mut(offset..offset + bytes.len()) {
            slot.copy_from_slice(bytes);
        }
    }
}
