// ── Channel addressing ──
//
// A channel is one telemetry value on an edge, addressed as
// `component/channel` (e.g. `_sum/GridActivePower`).

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Address of a single telemetry channel.
///
/// Canonical form is `component/channel`. Equality and hashing follow
/// the canonical string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelAddress {
    component_id: String,
    channel_id: String,
}

impl ChannelAddress {
    /// Build an address from its parts. Both must be non-empty and free of `/`.
    pub fn new(
        component_id: impl Into<String>,
        channel_id: impl Into<String>,
    ) -> Result<Self, InvalidChannelAddress> {
        let component_id = component_id.into();
        let channel_id = channel_id.into();
        if !is_valid_part(&component_id) || !is_valid_part(&channel_id) {
            return Err(InvalidChannelAddress(format!("{component_id}/{channel_id}")));
        }
        Ok(Self {
            component_id,
            channel_id,
        })
    }

    pub fn component_id(&self) -> &str {
        &self.component_id
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }
}

fn is_valid_part(part: &str) -> bool {
    !part.is_empty() && !part.contains('/')
}

/// A string that is not `component/channel`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid channel address {0:?}: expected component/channel")]
pub struct InvalidChannelAddress(pub String);

impl fmt::Display for ChannelAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.component_id, self.channel_id)
    }
}

impl FromStr for ChannelAddress {
    type Err = InvalidChannelAddress;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((component, channel)) => {
                Self::new(component, channel).map_err(|_| InvalidChannelAddress(s.to_owned()))
            }
            None => Err(InvalidChannelAddress(s.to_owned())),
        }
    }
}

impl Serialize for ChannelAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ChannelAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ── Date range ───────────────────────────────────────────────────────

/// Inclusive day range for historical queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DateRange {
    from: NaiveDate,
    to: NaiveDate,
}

impl DateRange {
    /// `None` when `to` is before `from`.
    pub fn new(from: NaiveDate, to: NaiveDate) -> Option<Self> {
        (from <= to).then_some(Self { from, to })
    }

    pub fn from(&self) -> NaiveDate {
        self.from
    }

    pub fn to(&self) -> NaiveDate {
        self.to
    }

    /// Move the start forward to `earliest` if it lies before it.
    /// The end never moves, so a range entirely before `earliest`
    /// collapses to the single day `to`.
    pub(crate) fn clamp_start(self, earliest: NaiveDate) -> Self {
        let from = self.from.max(earliest).min(self.to);
        Self { from, to: self.to }
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.from, self.to)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn parses_canonical_form() {
        let addr: ChannelAddress = "_sum/GridActivePower".parse().unwrap();
        assert_eq!(addr.component_id(), "_sum");
        assert_eq!(addr.channel_id(), "GridActivePower");
        assert_eq!(addr.to_string(), "_sum/GridActivePower");
    }

    #[test]
    fn rejects_malformed_addresses() {
        for raw in ["", "/", "meter0", "meter0/", "/ActivePower", "a/b/c"] {
            assert!(raw.parse::<ChannelAddress>().is_err(), "{raw:?} should be rejected");
        }
    }

    #[test]
    fn equality_follows_canonical_string() {
        let a: ChannelAddress = "meter0/ActivePower".parse().unwrap();
        let b = ChannelAddress::new("meter0", "ActivePower").unwrap();
        assert_eq!(a, b);

        let set: HashSet<_> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn serde_uses_canonical_string() {
        let addr: ChannelAddress = "ess0/Soc".parse().unwrap();
        assert_eq!(serde_json::to_string(&addr).unwrap(), r#""ess0/Soc""#);
        let back: ChannelAddress = serde_json::from_str(r#""ess0/Soc""#).unwrap();
        assert_eq!(back, addr);
        assert!(serde_json::from_str::<ChannelAddress>(r#""ess0""#).is_err());
    }

    #[test]
    fn date_range_rejects_inverted_bounds() {
        let d1 = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        assert!(DateRange::new(d1, d2).is_some());
        assert!(DateRange::new(d2, d1).is_none());
    }

    #[test]
    fn clamp_start_moves_only_the_start() {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        )
        .unwrap();

        let setup = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let clamped = range.clamp_start(setup);
        assert_eq!(clamped.from(), setup);
        assert_eq!(clamped.to(), range.to());

        let before = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        assert_eq!(range.clamp_start(before), range);

        let after = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        assert_eq!(range.clamp_start(after).from(), range.to());
    }
}
