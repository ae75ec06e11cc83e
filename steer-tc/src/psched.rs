//! Packet scheduler time base.
//!
//! HTB expects burst sizes as transmission times in scheduler ticks. The tick rate is read from
//! `/proc/net/psched` once per process.

use std::{
    io::{self, Read as _},
    sync::LazyLock,
};

pub const PSCHED_PATH: &str = "/proc/net/psched";

/// Standard Ethernet MTU in bytes.
pub const MTU_ETHERNET: u32 = 1_500;

/// Scheduler frequency assumed when sizing the default burst.
pub const KERNEL_HZ: u64 = 1_000;

const USEC_PER_SEC: f64 = 1_000_000.0;

/// Reads the number of scheduler ticks per microsecond.
///
/// The file holds `t2us us2t clock resolution` in hex; the first two give the ratio.
pub fn tc_core_init() -> io::Result<f64> {
    let mut contents = String::new();
    std::fs::File::open(PSCHED_PATH)?.read_to_string(&mut contents)?;
    parse_psched(&contents)
}

fn parse_psched(contents: &str) -> io::Result<f64> {
    let invalid = || io::Error::new(io::ErrorKind::InvalidData, "malformed psched");
    let mut fields = contents.split_whitespace().map(|f| u32::from_str_radix(f, 16));

    let t2us = fields.next().ok_or_else(invalid)?.map_err(|_| invalid())?;
    let us2t = fields.next().ok_or_else(invalid)?.map_err(|_| invalid())?;
    if us2t == 0 {
        return Err(invalid());
    }

    Ok(f64::from(t2us) / f64::from(us2t))
}

/// Ticks per microsecond. Falls back to 1 if the time base cannot be read.
pub static TICK_IN_USEC: LazyLock<f64> = LazyLock::new(|| match tc_core_init() {
    Ok(tick_in_usec) => {
        tracing::debug!(tick_in_usec, "read {PSCHED_PATH}");
        tick_in_usec
    }
    Err(e) => {
        tracing::warn!(?e, "failed to read {PSCHED_PATH}, assuming 1 tick per usec");
        1.0
    }
});

/// The burst HTB allows for a class by default: one timer interval at `rate` plus an MTU.
pub fn default_burst(rate_bytes: u64) -> u64 {
    rate_bytes / KERNEL_HZ + u64::from(MTU_ETHERNET)
}

/// The time, in ticks, it takes to send `size` bytes at `rate_bytes` per second.
pub fn xmit_ticks(rate_bytes: u64, size: u64) -> u32 {
    let rate = rate_bytes.max(1) as f64;
    let ticks = USEC_PER_SEC * size as f64 / rate * *TICK_IN_USEC;
    ticks.min(f64::from(u32::MAX)) as u32
}
