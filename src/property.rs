//! Tagged property values.
//!
//! `Any` carries one value of the closed property type set. The tag is part
//! of the enum, so a payload can only be read back through an accessor that
//! checks it against the requested type.

use crate::error::{GraphError, Result};
use crate::types::{Browser, Date, Gender, Ipv4, PropertyType};
use bytemuck::Pod;
use std::borrow::Cow;
use std::fmt;
use std::net::Ipv4Addr;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Any<'a> {
    #[default]
    Empty,
    Int32(i32),
    Int64(i64),
    Date(Date),
    String(Cow<'a, str>),
    Browser(Browser),
    IpAddr(Ipv4Addr),
    Gender(Gender),
}

impl<'a> Any<'a> {
    pub fn property_type(&self) -> PropertyType {
        match self {
            Any::Empty => PropertyType::Empty,
            Any::Int32(_) => PropertyType::Int32,
            Any::Int64(_) => PropertyType::Int64,
            Any::Date(_) => PropertyType::Date,
            Any::String(_) => PropertyType::String,
            Any::Browser(_) => PropertyType::Browser,
            Any::IpAddr(_) => PropertyType::IpAddr,
            Any::Gender(_) => PropertyType::Gender,
        }
    }

    /// Parse a text field from an input record. Strings borrow from `text`.
    pub fn parse(ty: PropertyType, text: &'a str) -> Result<Any<'a>> {
        let invalid = || GraphError::InvalidValue { ty, value: text.to_string() };
        let value = match ty {
            PropertyType::Empty => Any::Empty,
            PropertyType::Int32 => Any::Int32(text.trim().parse().map_err(|_| invalid())?),
            PropertyType::Int64 => Any::Int64(text.trim().parse().map_err(|_| invalid())?),
            PropertyType::Date => Any::Date(text.parse().map_err(|_| invalid())?),
            PropertyType::String => Any::String(Cow::Borrowed(text)),
            PropertyType::Browser => Any::Browser(text.parse().map_err(|_| invalid())?),
            PropertyType::IpAddr => Any::IpAddr(text.trim().parse().map_err(|_| invalid())?),
            PropertyType::Gender => Any::Gender(text.parse().map_err(|_| invalid())?),
        };
        Ok(value)
    }

    pub fn into_owned(self) -> Any<'static> {
        match self {
            Any::Empty => Any::Empty,
            Any::Int32(v) => Any::Int32(v),
            Any::Int64(v) => Any::Int64(v),
            Any::Date(v) => Any::Date(v),
            Any::String(s) => Any::String(Cow::Owned(s.into_owned())),
            Any::Browser(v) => Any::Browser(v),
            Any::IpAddr(v) => Any::IpAddr(v),
            Any::Gender(v) => Any::Gender(v),
        }
    }

    fn mismatch(&self, expected: PropertyType) -> GraphError {
        GraphError::TypeMismatch { expected, found: self.property_type() }
    }

    pub fn as_i32(&self) -> Result<i32> {
        match self {
            Any::Int32(v) => Ok(*v),
            other => Err(other.mismatch(PropertyType::Int32)),
        }
    }

    pub fn as_i64(&self) -> Result<i64> {
        match self {
            Any::Int64(v) => Ok(*v),
            other => Err(other.mismatch(PropertyType::Int64)),
        }
    }

    pub fn as_date(&self) -> Result<Date> {
        match self {
            Any::Date(v) => Ok(*v),
            other => Err(other.mismatch(PropertyType::Date)),
        }
    }

    pub fn as_str(&self) -> Result<&str> {
        match self {
            Any::String(s) => Ok(s.as_ref()),
            other => Err(other.mismatch(PropertyType::String)),
        }
    }

    pub fn as_browser(&self) -> Result<Browser> {
        match self {
            Any::Browser(v) => Ok(*v),
            other => Err(other.mismatch(PropertyType::Browser)),
        }
    }

    pub fn as_ip(&self) -> Result<Ipv4Addr> {
        match self {
            Any::IpAddr(v) => Ok(*v),
            other => Err(other.mismatch(PropertyType::IpAddr)),
        }
    }

    pub fn as_gender(&self) -> Result<Gender> {
        match self {
            Any::Gender(v) => Ok(*v),
            other => Err(other.mismatch(PropertyType::Gender)),
        }
    }

    /// Fails unless the tag equals `expected`.
    pub fn expect_type(&self, expected: PropertyType) -> Result<()> {
        if self.property_type() == expected {
            Ok(())
        } else {
            Err(self.mismatch(expected))
        }
    }
}

impl fmt::Display for Any<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Any::Empty => Ok(()),
            Any::Int32(v) => write!(f, "{v}"),
            Any::Int64(v) => write!(f, "{v}"),
            Any::Date(v) => write!(f, "{v}"),
            Any::String(s) => f.write_str(s),
            Any::Browser(v) => write!(f, "{v}"),
            Any::IpAddr(v) => write!(f, "{v}"),
            Any::Gender(v) => write!(f, "{v}"),
        }
    }
}

impl From<i32> for Any<'_> {
    fn from(v: i32) -> Self {
        Any::Int32(v)
    }
}

impl From<i64> for Any<'_> {
    fn from(v: i64) -> Self {
        Any::Int64(v)
    }
}

impl From<Date> for Any<'_> {
    fn from(v: Date) -> Self {
        Any::Date(v)
    }
}

impl<'a> From<&'a str> for Any<'a> {
    fn from(v: &'a str) -> Self {
        Any::String(Cow::Borrowed(v))
    }
}

impl From<String> for Any<'_> {
    fn from(v: String) -> Self {
        Any::String(Cow::Owned(v))
    }
}

impl From<Ipv4Addr> for Any<'_> {
    fn from(v: Ipv4Addr) -> Self {
        Any::IpAddr(v)
    }
}

impl From<Browser> for Any<'_> {
    fn from(v: Browser) -> Self {
        Any::Browser(v)
    }
}

impl From<Gender> for Any<'_> {
    fn from(v: Gender) -> Self {
        Any::Gender(v)
    }
}

/// Fixed-width property types with a plain-old-data storage form.
pub trait Scalar: Copy + Default + Send + Sync + 'static {
    type Raw: Pod;
    const TYPE: PropertyType;

    fn to_raw(self) -> Self::Raw;
    fn from_raw(raw: Self::Raw) -> Self;
    fn to_any(self) -> Any<'static>;
    fn from_any(value: &Any<'_>) -> Result<Self>;
}

impl Scalar for i32 {
    type Raw = i32;
    const TYPE: PropertyType = PropertyType::Int32;

    fn to_raw(self) -> i32 {
        self
    }
    fn from_raw(raw: i32) -> Self {
        raw
    }
    fn to_any(self) -> Any<'static> {
        Any::Int32(self)
    }
    fn from_any(value: &Any<'_>) -> Result<Self> {
        value.as_i32()
    }
}

impl Scalar for i64 {
    type Raw = i64;
    const TYPE: PropertyType = PropertyType::Int64;

    fn to_raw(self) -> i64 {
        self
    }
    fn from_raw(raw: i64) -> Self {
        raw
    }
    fn to_any(self) -> Any<'static> {
        Any::Int64(self)
    }
    fn from_any(value: &Any<'_>) -> Result<Self> {
        value.as_i64()
    }
}

impl Scalar for Date {
    type Raw = Date;
    const TYPE: PropertyType = PropertyType::Date;

    fn to_raw(self) -> Date {
        self
    }
    fn from_raw(raw: Date) -> Self {
        raw
    }
    fn to_any(self) -> Any<'static> {
        Any::Date(self)
    }
    fn from_any(value: &Any<'_>) -> Result<Self> {
        value.as_date()
    }
}

impl Scalar for Browser {
    type Raw = u8;
    const TYPE: PropertyType = PropertyType::Browser;

    fn to_raw(self) -> u8 {
        self as u8
    }
    fn from_raw(raw: u8) -> Self {
        Browser::from_u8(raw).unwrap_or_default()
    }
    fn to_any(self) -> Any<'static> {
        Any::Browser(self)
    }
    fn from_any(value: &Any<'_>) -> Result<Self> {
        value.as_browser()
    }
}

impl Scalar for Gender {
    type Raw = u8;
    const TYPE: PropertyType = PropertyType::Gender;

    fn to_raw(self) -> u8 {
        self as u8
    }
    fn from_raw(raw: u8) -> Self {
        Gender::from_u8(raw).unwrap_or_default()
    }
    fn to_any(self) -> Any<'static> {
        Any::Gender(self)
    }
    fn from_any(value: &Any<'_>) -> Result<Self> {
        value.as_gender()
    }
}

impl Scalar for Ipv4 {
    type Raw = Ipv4;
    const TYPE: PropertyType = PropertyType::IpAddr;

    fn to_raw(self) -> Ipv4 {
        self
    }
    fn from_raw(raw: Ipv4) -> Self {
        raw
    }
    fn to_any(self) -> Any<'static> {
        Any::IpAddr(self.into())
    }
    fn from_any(value: &Any<'_>) -> Result<Self> {
        value.as_ip().map(Ipv4::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_access() {
        let v = Any::from(42i64);
        assert_eq!(v.as_i64().unwrap(), 42);
        match v.as_i32() {
            Err(GraphError::TypeMismatch { expected, found }) => {
                assert_eq!(expected, PropertyType::Int32);
                assert_eq!(found, PropertyType::Int64);
            }
            other => panic!("expected mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_fields() {
        assert_eq!(Any::parse(PropertyType::Int32, " 7").unwrap(), Any::Int32(7));
        assert_eq!(
            Any::parse(PropertyType::IpAddr, "10.0.0.1").unwrap(),
            Any::IpAddr(Ipv4Addr::new(10, 0, 0, 1))
        );
        assert_eq!(Any::parse(PropertyType::String, "Alice").unwrap().as_str().unwrap(), "Alice");
        assert!(Any::parse(PropertyType::Int64, "abc").is_err());
        assert!(Any::parse(PropertyType::IpAddr, "10.0.0").is_err());
    }

    #[test]
    fn test_into_owned_keeps_value() {
        let text = String::from("borrowed");
        let owned = Any::from(text.as_str()).into_owned();
        drop(text);
        assert_eq!(owned.as_str().unwrap(), "borrowed");
    }

    #[test]
    fn test_scalar_raw_forms() {
        let ip = Ipv4Addr::new(192, 168, 1, 20);
        assert_eq!(Ipv4::from_raw(Ipv4::from(ip)).to_any(), Any::IpAddr(ip));
        assert_eq!(Ipv4::from_any(&Any::IpAddr(ip)).unwrap(), Ipv4(0xC0A8_0114));
        assert_eq!(Browser::from_raw(Browser::Opera.to_raw()), Browser::Opera);
        assert_eq!(Gender::from_any(&Any::Gender(Gender::Female)).unwrap(), Gender::Female);
    }
}
