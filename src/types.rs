use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use time::macros::format_description;

/// Vertex or edge type id. Labels are assigned in registration order.
pub type LabelId = u8;
/// Dense per-label vertex index.
pub type Vid = u32;
/// External vertex id as supplied by input records.
pub type Oid = i64;
/// Logical write timestamp.
pub type Timestamp = u32;

/// Marks an unoccupied single-edge slot.
pub const INVALID_TIMESTAMP: Timestamp = Timestamp::MAX;

/// Declared type of a column or edge payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyType {
    Empty,
    Int32,
    Int64,
    Date,
    String,
    Browser,
    IpAddr,
    Gender,
}

impl PropertyType {
    /// Parse a type name as written in schema definitions.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "empty" | "none" => Some(PropertyType::Empty),
            "int32" | "int" | "i32" => Some(PropertyType::Int32),
            "int64" | "long" | "i64" => Some(PropertyType::Int64),
            "date" | "datetime" => Some(PropertyType::Date),
            "string" | "str" => Some(PropertyType::String),
            "browser" => Some(PropertyType::Browser),
            "ip" | "ipaddr" => Some(PropertyType::IpAddr),
            "gender" => Some(PropertyType::Gender),
            _ => None,
        }
    }
}

/// How a vertex property is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StorageStrategy {
    /// Declared in the schema but dropped; writes are discarded.
    None,
    #[default]
    Mem,
}

/// Edge cardinality per source vertex, chosen per direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EdgeStrategy {
    None,
    Single,
    #[default]
    Multiple,
}

impl EdgeStrategy {
    pub fn from_str(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "none" => EdgeStrategy::None,
            "single" | "one" => EdgeStrategy::Single,
            _ => EdgeStrategy::Multiple,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// Milliseconds since the unix epoch, normalised to UTC.
#[repr(transparent)]
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Pod, Zeroable, Serialize, Deserialize,
)]
pub struct Date {
    pub milli_second: i64,
}

impl Date {
    pub fn from_millis(milli_second: i64) -> Self {
        Self { milli_second }
    }
}

impl FromStr for Date {
    type Err = String;

    /// Accepts `YYYY-MM-DD`, `YYYY-MM-DDThh:mm:ss.SSS+hhmm`, or a bare
    /// integer millisecond count.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(ms) = s.parse::<i64>() {
            return Ok(Date::from_millis(ms));
        }
        if s.len() == 10 {
            let date = time::Date::parse(s, format_description!("[year]-[month]-[day]"))
                .map_err(|e| e.to_string())?;
            return Ok(Date::from_millis(date.midnight().assume_utc().unix_timestamp() * 1000));
        }
        let dt = time::OffsetDateTime::parse(
            s,
            format_description!(
                "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3][offset_hour sign:mandatory][offset_minute]"
            ),
        )
        .map_err(|e| e.to_string())?;
        Ok(Date::from_millis((dt.unix_timestamp_nanos() / 1_000_000) as i64))
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nanos = self.milli_second as i128 * 1_000_000;
        let dt = time::OffsetDateTime::from_unix_timestamp_nanos(nanos).map_err(|_| fmt::Error)?;
        let text = dt
            .format(format_description!(
                "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]+0000"
            ))
            .map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

/// IPv4 address packed big-endian into a `u32` for column and adjacency storage.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable, Serialize, Deserialize)]
pub struct Ipv4(pub u32);

impl From<Ipv4Addr> for Ipv4 {
    fn from(addr: Ipv4Addr) -> Self {
        Ipv4(u32::from(addr))
    }
}

impl From<Ipv4> for Ipv4Addr {
    fn from(ip: Ipv4) -> Self {
        Ipv4Addr::from(ip.0)
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Browser {
    #[default]
    Firefox = 0,
    Chrome = 1,
    InternetExplorer = 2,
    Safari = 3,
    Opera = 4,
}

impl Browser {
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Browser::Firefox),
            1 => Some(Browser::Chrome),
            2 => Some(Browser::InternetExplorer),
            3 => Some(Browser::Safari),
            4 => Some(Browser::Opera),
            _ => None,
        }
    }
}

impl FromStr for Browser {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(' ', "").as_str() {
            "firefox" => Ok(Browser::Firefox),
            "chrome" => Ok(Browser::Chrome),
            "internetexplorer" | "ie" => Ok(Browser::InternetExplorer),
            "safari" => Ok(Browser::Safari),
            "opera" => Ok(Browser::Opera),
            other => Err(format!("unknown browser `{other}`")),
        }
    }
}

impl fmt::Display for Browser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Browser::Firefox => "Firefox",
            Browser::Chrome => "Chrome",
            Browser::InternetExplorer => "Internet Explorer",
            Browser::Safari => "Safari",
            Browser::Opera => "Opera",
        };
        f.write_str(name)
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    #[default]
    Male = 0,
    Female = 1,
}

impl Gender {
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Gender::Male),
            1 => Some(Gender::Female),
            _ => None,
        }
    }
}

impl FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" | "m" => Ok(Gender::Male),
            "female" | "f" => Ok(Gender::Female),
            other => Err(format!("unknown gender `{other}`")),
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Gender::Male => "male",
            Gender::Female => "female",
        })
    }
}
