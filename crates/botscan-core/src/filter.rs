//! Row filters applied before scoring.
//!
//! Both filters build one boolean mask from the host list and apply it to the
//! whole [`FlowFrame`], so features and hosts stay aligned.

use crate::error::Result;
use crate::features::{FlowFrame, HostList};
use crate::ip::IpEntity;

/// Keep only rows whose host has strictly more than `min_count` rows.
///
/// The host row counts are recomputed first. `min_count == 0` keeps everything.
pub fn filter_by_min_count(frame: &FlowFrame, min_count: usize) -> FlowFrame {
    let frame = frame.clone().recount();
    if min_count == 0 {
        return frame;
    }

    let mask: Vec<bool> = frame
        .hosts()
        .counts()
        .iter()
        .map(|&count| count > min_count)
        .collect();
    let filtered = frame.retain(&mask);
    tracing::debug!(
        min_count,
        before = frame.len(),
        after = filtered.len(),
        "filtered hosts by flow count"
    );
    filtered
}

/// Mask of rows whose host matches any of `ranges`, or `None` when no ranges
/// were given.
pub fn range_mask(
    hosts: &HostList,
    ranges: &[IpEntity],
    ignore_invalid: bool,
) -> Result<Option<Vec<bool>>> {
    if ranges.is_empty() {
        return Ok(None);
    }

    let mut mask = Vec::with_capacity(hosts.len());
    for addr in hosts.addresses() {
        let mut hit = false;
        for range in ranges {
            if range.matches(addr, ignore_invalid)? {
                hit = true;
                break;
            }
        }
        mask.push(hit);
    }
    Ok(Some(mask))
}

/// Keep only rows whose host falls in at least one of `ranges`.
pub fn filter_by_ranges(
    frame: &FlowFrame,
    ranges: &[IpEntity],
    ignore_invalid: bool,
) -> Result<FlowFrame> {
    let Some(mask) = range_mask(frame.hosts(), ranges, ignore_invalid)? else {
        return Ok(frame.clone());
    };

    let filtered = frame.retain(&mask);
    tracing::debug!(
        ranges = ranges.len(),
        before = frame.len(),
        after = filtered.len(),
        "filtered hosts by address range"
    );
    Ok(filtered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BotscanError;
    use crate::features::{CanonicalFlow, FeatureRow, FeatureTable};

    fn frame(hosts: &[&str]) -> FlowFrame {
        let features = hosts
            .iter()
            .enumerate()
            .map(|(i, _)| FeatureRow {
                flow: CanonicalFlow {
                    proto: "udp".into(),
                    dport: "53".into(),
                    sport: i.to_string(),
                    state: "INT".into(),
                    dur: 0.5,
                    totbytes: 64.0,
                    srcbytes: 32.0,
                },
                bps: 1024,
            })
            .collect();
        let hosts = HostList::new(hosts.iter().map(|h| h.to_string()).collect());
        FlowFrame::from_parts(FeatureTable::new(features), hosts).unwrap()
    }

    fn row_ids(frame: &FlowFrame) -> Vec<String> {
        frame.features().iter().map(|r| r.flow.sport.clone()).collect()
    }

    #[test]
    fn test_min_count_zero_is_noop() {
        let f = frame(&["a", "b", "a"]);
        let out = filter_by_min_count(&f, 0);
        assert_eq!(out.len(), 3);
        assert_eq!(out.hosts().counts(), &[2, 1, 2]);
    }

    #[test]
    fn test_min_count_is_strict() {
        let f = frame(&["a", "b", "a", "c", "c", "c", "b"]);
        // a: 2, b: 2, c: 3
        let out = filter_by_min_count(&f, 2);
        assert_eq!(row_ids(&out), vec!["3", "4", "5"]);
        assert!(out.hosts().addresses().all(|h| h == "c"));

        let out = filter_by_min_count(&f, 1);
        assert_eq!(out.len(), 7);
    }

    #[test]
    fn test_range_filter_or_semantics() {
        let f = frame(&["10.0.0.1", "10.0.1.1", "192.168.1.5", "10.0.0.200", "8.8.8.8"]);
        let ranges = vec![
            IpEntity::parse("10.0.0.0/24").unwrap(),
            IpEntity::parse("8.8.8.8").unwrap(),
        ];
        let out = filter_by_ranges(&f, &ranges, false).unwrap();
        assert_eq!(row_ids(&out), vec!["0", "3", "4"]);
        let hosts: Vec<&str> = out.hosts().addresses().collect();
        assert_eq!(hosts, vec!["10.0.0.1", "10.0.0.200", "8.8.8.8"]);
    }

    #[test]
    fn test_empty_ranges_is_noop() {
        let f = frame(&["not-an-address"]);
        let out = filter_by_ranges(&f, &[], false).unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_invalid_host_handling() {
        let f = frame(&["10.0.0.1", "bogus"]);
        let ranges = vec![IpEntity::parse("10.0.0.0/8").unwrap()];

        let out = filter_by_ranges(&f, &ranges, true).unwrap();
        assert_eq!(row_ids(&out), vec!["0"]);

        assert!(matches!(
            filter_by_ranges(&f, &ranges, false),
            Err(BotscanError::InvalidAddress(addr)) if addr == "bogus"
        ));
    }
}
