use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Number of bits an AS number occupies inside the packed ISD-AS form.
const ASN_BITS: u32 = 48;
/// Largest representable AS number.
const MAX_ASN: u64 = (1 << ASN_BITS) - 1;
/// AS numbers up to this value use the decimal (BGP compatible) notation.
const MAX_BGP_ASN: u64 = u32::MAX as u64;

/// Errors produced when parsing textual ISD, AS or ISD-AS forms.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddrParseError {
    #[error("invalid ISD number: {0:?}")]
    InvalidIsd(String),
    #[error("invalid AS number: {0:?}")]
    InvalidAsn(String),
    #[error("invalid ISD-AS: {0:?}")]
    InvalidIa(String),
}

/// Isolation domain number.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Isd(pub u16);

impl Isd {
    /// The wildcard ISD.
    pub const WILDCARD: Isd = Isd(0);

    pub fn is_wildcard(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Isd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Isd {
    type Err = AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u16>()
            .map(Isd)
            .map_err(|_| AddrParseError::InvalidIsd(s.to_string()))
    }
}

/// Autonomous system number, at most 48 bits wide.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Asn(u64);

impl Asn {
    /// The wildcard AS.
    pub const WILDCARD: Asn = Asn(0);

    pub fn new(value: u64) -> Result<Asn, AddrParseError> {
        if value > MAX_ASN {
            return Err(AddrParseError::InvalidAsn(value.to_string()));
        }
        Ok(Asn(value))
    }

    pub fn get(&self) -> u64 {
        self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Asn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 <= MAX_BGP_ASN {
            return write!(f, "{}", self.0);
        }
        write!(
            f,
            "{:x}:{:x}:{:x}",
            (self.0 >> 32) & 0xffff,
            (self.0 >> 16) & 0xffff,
            self.0 & 0xffff,
        )
    }
}

impl FromStr for Asn {
    type Err = AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || AddrParseError::InvalidAsn(s.to_string());
        if !s.contains(':') {
            // Decimal notation is only allowed for the BGP range.
            let value = s.parse::<u64>().map_err(|_| err())?;
            if value > MAX_BGP_ASN {
                return Err(err());
            }
            return Ok(Asn(value));
        }
        let mut groups = s.split(':');
        let mut value: u64 = 0;
        for _ in 0..3 {
            let group = groups.next().ok_or_else(err)?;
            if group.is_empty() || group.len() > 4 {
                return Err(err());
            }
            let group = u64::from_str_radix(group, 16).map_err(|_| err())?;
            value = value << 16 | group;
        }
        if groups.next().is_some() {
            return Err(err());
        }
        Ok(Asn(value))
    }
}

/// ISD-AS identifier. Equality and ordering are on the packed 64-bit form,
/// the upper 16 bits holding the ISD and the lower 48 bits the AS.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ia(u64);

impl Ia {
    /// The fully unspecified ISD-AS, used as a wildcard in queries.
    pub const WILDCARD: Ia = Ia(0);

    pub fn new(isd: Isd, asn: Asn) -> Ia {
        Ia((isd.0 as u64) << ASN_BITS | asn.0)
    }

    pub fn isd(&self) -> Isd {
        Isd((self.0 >> ASN_BITS) as u16)
    }

    pub fn asn(&self) -> Asn {
        Asn(self.0 & MAX_ASN)
    }

    pub fn is_wildcard(&self) -> bool {
        self.0 == 0
    }

    /// The packed on-wire representation.
    pub fn to_u64(&self) -> u64 {
        self.0
    }

    pub fn from_u64(value: u64) -> Ia {
        Ia(value)
    }
}

impl fmt::Display for Ia {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.isd(), self.asn())
    }
}

impl FromStr for Ia {
    type Err = AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (isd, asn) = s
            .split_once('-')
            .ok_or_else(|| AddrParseError::InvalidIa(s.to_string()))?;
        Ok(Ia::new(isd.parse()?, asn.parse()?))
    }
}

impl Serialize for Ia {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Ia {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
