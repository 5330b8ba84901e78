/*!
 * Session attributes.
 */
use std::collections::HashMap;
use std::fmt;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VisaError};
use crate::resource_name::ResourceName;
use crate::timeout::Timeout;

/// A `VI_ATTR_*` identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttributeId(pub u32);

impl AttributeId {
    /// Handle of the owning resource manager session
    pub const RM_SESSION: AttributeId = AttributeId(0x3FFF_00C4);
    /// Resource name as opened
    pub const RSRC_NAME: AttributeId = AttributeId(0xBFFF_0002);
    /// Resource class
    pub const RSRC_CLASS: AttributeId = AttributeId(0xBFFF_0001);
    /// Interface type
    pub const INTF_TYPE: AttributeId = AttributeId(0x3FFF_0171);
    /// Default timeout of blocking operations, milliseconds
    pub const TMO_VALUE: AttributeId = AttributeId(0x3FFF_001A);

    /// Every attribute a session carries
    pub const ALL: [AttributeId; 5] = [
        AttributeId::RM_SESSION,
        AttributeId::RSRC_NAME,
        AttributeId::RSRC_CLASS,
        AttributeId::INTF_TYPE,
        AttributeId::TMO_VALUE,
    ];

    /// `VI_ATTR_*` name, `None` for ids sessions do not carry
    pub fn name(&self) -> Option<&'static str> {
        match *self {
            AttributeId::RM_SESSION => Some("VI_ATTR_RM_SESSION"),
            AttributeId::RSRC_NAME => Some("VI_ATTR_RSRC_NAME"),
            AttributeId::RSRC_CLASS => Some("VI_ATTR_RSRC_CLASS"),
            AttributeId::INTF_TYPE => Some("VI_ATTR_INTF_TYPE"),
            AttributeId::TMO_VALUE => Some("VI_ATTR_TMO_VALUE"),
            _ => None,
        }
    }

    /// Whether clients may change the attribute
    pub fn is_writable(&self) -> bool {
        *self == AttributeId::TMO_VALUE
    }
}

impl fmt::Display for AttributeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "{:#x}", self.0),
        }
    }
}

/// Value of an attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Numeric attribute
    Integer(u32),
    /// Text attribute
    Text(String),
}

impl AttributeValue {
    /// Numeric value
    pub fn as_integer(&self) -> Option<u32> {
        match self {
            AttributeValue::Integer(v) => Some(*v),
            AttributeValue::Text(_) => None,
        }
    }

    /// Text value
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            AttributeValue::Integer(_) => None,
        }
    }

    fn same_kind(&self, other: &AttributeValue) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Integer(v) => write!(f, "{}", v),
            AttributeValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<u32> for AttributeValue {
    fn from(v: u32) -> Self {
        AttributeValue::Integer(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::Text(s.to_string())
    }
}

/// The attribute set of one session
#[derive(Debug)]
pub struct Attributes {
    values: RwLock<HashMap<AttributeId, AttributeValue>>,
}

impl Attributes {
    /// Attributes of a session on `name`
    pub fn new(rm_session: u32, name: &ResourceName, timeout_ms: u32) -> Self {
        let values = HashMap::from([
            (AttributeId::RM_SESSION, AttributeValue::Integer(rm_session)),
            (AttributeId::RSRC_NAME, AttributeValue::Text(name.to_string())),
            (AttributeId::RSRC_CLASS, AttributeValue::from(name.resource_class())),
            (AttributeId::INTF_TYPE, AttributeValue::Integer(name.interface_type().into())),
            (AttributeId::TMO_VALUE, AttributeValue::Integer(timeout_ms)),
        ]);
        Self {
            values: RwLock::new(values),
        }
    }

    /// Read an attribute
    pub fn get(&self, id: AttributeId) -> Result<AttributeValue> {
        self.values
            .read()
            .get(&id)
            .cloned()
            .ok_or(VisaError::UnsupportedAttribute(id.0))
    }

    /// Write an attribute
    pub fn set(&self, id: AttributeId, value: AttributeValue) -> Result<()> {
        let mut values = self.values.write();
        let current = values.get_mut(&id).ok_or(VisaError::UnsupportedAttribute(id.0))?;

        if !id.is_writable() {
            return Err(VisaError::ReadOnlyAttribute(id.0));
        }
        if !current.same_kind(&value) {
            return Err(VisaError::InvalidAttributeState(
                id.0,
                format!("{} cannot be set to {:?}", id, value),
            ));
        }

        *current = value;
        Ok(())
    }

    /// The current `TMO_VALUE` as a timeout
    pub fn timeout(&self) -> Timeout {
        let millis = self
            .get(AttributeId::TMO_VALUE)
            .ok()
            .and_then(|v| v.as_integer())
            .unwrap_or(crate::timeout::INFINITE_MILLIS);
        Timeout::from_millis(millis)
    }
}
