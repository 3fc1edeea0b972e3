//! Geographic region tags used for latency lookups

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SchedulerError;

/// Coarse geographic bin a node is assigned to at registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    Americas,
    WesternEurope,
    CentralEurope,
    EasternEurope,
    MiddleEast,
    Africa,
    Russia,
    Asia,
}

impl Region {
    pub const COUNT: usize = 8;

    pub const ALL: [Region; Region::COUNT] = [
        Region::Americas,
        Region::WesternEurope,
        Region::CentralEurope,
        Region::EasternEurope,
        Region::MiddleEast,
        Region::Africa,
        Region::Russia,
        Region::Asia,
    ];

    /// Row/column of this region in a latency matrix
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Region::Americas => "Americas",
            Region::WesternEurope => "WesternEurope",
            Region::CentralEurope => "CentralEurope",
            Region::EasternEurope => "EasternEurope",
            Region::MiddleEast => "MiddleEast",
            Region::Africa => "Africa",
            Region::Russia => "Russia",
            Region::Asia => "Asia",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = SchedulerError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        Region::ALL
            .into_iter()
            .find(|region| region.as_str() == tag)
            .ok_or_else(|| SchedulerError::UnknownRegion(tag.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_tags() {
        for region in Region::ALL {
            assert_eq!(region.as_str().parse::<Region>().unwrap(), region);
        }
        assert_eq!("Asia".parse::<Region>().unwrap().index(), 7);
    }

    #[test]
    fn test_parse_unknown_tag() {
        let err = "Antarctica".parse::<Region>().unwrap_err();
        assert!(matches!(err, SchedulerError::UnknownRegion(tag) if tag == "Antarctica"));
        assert!("asia".parse::<Region>().is_err());
    }
}
