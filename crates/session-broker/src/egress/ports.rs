//! UDP port pair allocation for plain RTP egress.
//!
//! RTP convention: the RTP port is even and RTCP is RTP + 1. Candidate bases
//! are drawn at random from the configured range and probed by binding both
//! sockets on loopback. The probe sockets are dropped immediately; the
//! transcoder rebinds the ports moments later, which leaves a small race
//! window that the single retry papers over.

use crate::errors::BrokerError;
use rand::Rng;
use std::net::{Ipv4Addr, UdpSocket};
use tracing::debug;

/// Allocates a `(rtp, rtcp)` port pair inside `[min, max]`.
///
/// # Errors
///
/// Returns [`BrokerError::PortAllocation`] if the range cannot hold a pair
/// or if both bind attempts fail.
pub fn allocate_pair(min: u16, max: u16) -> Result<(u16, u16), BrokerError> {
    if max <= min.saturating_add(1) {
        return Err(BrokerError::PortAllocation(format!(
            "port range too small: {min}-{max}"
        )));
    }

    let mut last_failure: Option<(u16, std::io::Error)> = None;
    for attempt in 0..2u8 {
        let base = pick_even_base(min, max);
        match try_bind_pair(base) {
            Ok(()) => return Ok((base, base + 1)),
            Err(e) => {
                debug!(
                    target: "broker.egress",
                    base,
                    attempt,
                    error = %e,
                    "udp bind probe failed"
                );
                last_failure = Some((base, e));
            }
        }
    }

    match last_failure {
        Some((base, e)) => Err(BrokerError::PortAllocation(format!(
            "udp bind {base}/{}: {e}",
            base + 1
        ))),
        None => Err(BrokerError::PortAllocation(format!(
            "no usable pair in {min}-{max}"
        ))),
    }
}

/// Picks a random even base with `base >= min` and `base + 1 <= max`.
fn pick_even_base(min: u16, max: u16) -> u16 {
    let half_min = u32::from(min).div_ceil(2);
    let half_max = u32::from(max) / 2;
    let k = rand::thread_rng().gen_range(half_min..half_max.max(half_min + 1));
    // k <= max/2 so 2k fits in u16
    (k * 2) as u16
}

fn try_bind_pair(base: u16) -> std::io::Result<()> {
    let _rtp = UdpSocket::bind((Ipv4Addr::LOCALHOST, base))?;
    let _rtcp = UdpSocket::bind((Ipv4Addr::LOCALHOST, base + 1))?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn allocates_adjacent_pair_in_range() {
        let (rtp, rtcp) = allocate_pair(40_000, 40_100).unwrap();
        assert_eq!(rtp % 2, 0);
        assert_eq!(rtcp, rtp + 1);
        assert!(rtp >= 40_000);
        assert!(rtcp <= 40_100);
    }

    #[test]
    fn rejects_degenerate_range() {
        let err = allocate_pair(5_000, 5_001).unwrap_err();
        assert!(matches!(err, BrokerError::PortAllocation(_)));
    }

    #[test]
    fn even_base_stays_inside_odd_bounds() {
        for _ in 0..100 {
            let base = pick_even_base(40_001, 40_007);
            assert_eq!(base % 2, 0);
            assert!(base >= 40_001);
            assert!(base + 1 <= 40_007);
        }
    }
}
