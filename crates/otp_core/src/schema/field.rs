//! Field descriptors and parameter types.

use crate::datagram::{Datagram, DatagramIterator};
use crate::error::ProtocolError;
use crate::types::FieldId;
use std::fmt;

bitflags::bitflags! {
    /// Keyword flags attached to a field.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FieldFlags: u16 {
        const REQUIRED = 1 << 0;
        const BROADCAST = 1 << 1;
        const RAM = 1 << 2;
        const DB = 1 << 3;
        const CLSEND = 1 << 4;
        const CLRECV = 1 << 5;
        const OWNSEND = 1 << 6;
        const OWNRECV = 1 << 7;
        const AIRECV = 1 << 8;
    }
}

impl FieldFlags {
    /// Parses a schema keyword such as `"broadcast"`.
    pub fn from_keyword(keyword: &str) -> Option<FieldFlags> {
        let flag = match keyword {
            "required" => Self::REQUIRED,
            "broadcast" => Self::BROADCAST,
            "ram" => Self::RAM,
            "db" => Self::DB,
            "clsend" => Self::CLSEND,
            "clrecv" => Self::CLRECV,
            "ownsend" => Self::OWNSEND,
            "ownrecv" => Self::OWNRECV,
            "airecv" => Self::AIRECV,
            _ => return None,
        };
        Some(flag)
    }
}

/// Wire type of one field parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float64,
    String,
    Blob,
    /// Byte-length prefixed sequence of the element type
    Array(Box<ParamType>),
}

impl ParamType {
    /// Parses a type name such as `uint32` or `string[]`.
    pub fn parse(name: &str) -> Option<ParamType> {
        if let Some(element) = name.strip_suffix("[]") {
            return ParamType::parse(element).map(|p| ParamType::Array(Box::new(p)));
        }
        let param = match name {
            "int8" => ParamType::Int8,
            "int16" => ParamType::Int16,
            "int32" => ParamType::Int32,
            "int64" => ParamType::Int64,
            "uint8" => ParamType::UInt8,
            "uint16" => ParamType::UInt16,
            "uint32" => ParamType::UInt32,
            "uint64" => ParamType::UInt64,
            "float64" => ParamType::Float64,
            "string" => ParamType::String,
            "blob" => ParamType::Blob,
            _ => return None,
        };
        Some(param)
    }

    fn fixed_size(&self) -> Option<usize> {
        match self {
            ParamType::Int8 | ParamType::UInt8 => Some(1),
            ParamType::Int16 | ParamType::UInt16 => Some(2),
            ParamType::Int32 | ParamType::UInt32 => Some(4),
            ParamType::Int64 | ParamType::UInt64 | ParamType::Float64 => Some(8),
            ParamType::String | ParamType::Blob | ParamType::Array(_) => None,
        }
    }

    /// Advances `di` past one value of this type.
    pub fn skip(&self, di: &mut DatagramIterator<'_>) -> Result<(), ProtocolError> {
        match self.fixed_size() {
            Some(size) => di.get_bytes(size).map(|_| ()),
            None => di.get_blob().map(|_| ()),
        }
    }

    /// Packs the zero value of this type.
    pub fn pack_zero(&self, dg: &mut Datagram) {
        match self.fixed_size() {
            Some(size) => dg.append_data(&vec![0u8; size]),
            None => dg.add_u16(0),
        }
    }

    /// Packs a schema-file literal as this type.
    pub fn pack_value(&self, value: &toml::Value, dg: &mut Datagram) -> Result<(), String> {
        match self {
            ParamType::Float64 => {
                let number = match value {
                    toml::Value::Float(f) => *f,
                    toml::Value::Integer(i) => *i as f64,
                    other => return Err(format!("expected a number, found {other}")),
                };
                dg.add_f64(number);
            }
            ParamType::String => match value {
                toml::Value::String(s) => dg.add_string(s),
                other => return Err(format!("expected a string, found {other}")),
            },
            ParamType::Blob => match value {
                toml::Value::String(s) => dg.add_blob(s.as_bytes()),
                toml::Value::Array(items) => {
                    let bytes = items
                        .iter()
                        .map(|item| {
                            item.as_integer()
                                .and_then(|i| u8::try_from(i).ok())
                                .ok_or_else(|| format!("blob byte out of range: {item}"))
                        })
                        .collect::<Result<Vec<u8>, String>>()?;
                    dg.add_blob(&bytes);
                }
                other => return Err(format!("expected a string or byte list, found {other}")),
            },
            ParamType::Array(element) => {
                let items = value
                    .as_array()
                    .ok_or_else(|| format!("expected a list, found {value}"))?;
                let mut inner = Datagram::new();
                for item in items {
                    element.pack_value(item, &mut inner)?;
                }
                dg.add_blob(inner.as_bytes());
            }
            integer => {
                let i = value
                    .as_integer()
                    .ok_or_else(|| format!("expected an integer, found {value}"))?;
                integer.pack_integer(i, dg)?;
            }
        }
        Ok(())
    }

    fn pack_integer(&self, i: i64, dg: &mut Datagram) -> Result<(), String> {
        let out_of_range = || format!("{i} does not fit {self}");
        match self {
            ParamType::Int8 => dg.add_i8(i8::try_from(i).map_err(|_| out_of_range())?),
            ParamType::Int16 => dg.add_i16(i16::try_from(i).map_err(|_| out_of_range())?),
            ParamType::Int32 => dg.add_i32(i32::try_from(i).map_err(|_| out_of_range())?),
            ParamType::Int64 => dg.add_i64(i),
            ParamType::UInt8 => dg.add_u8(u8::try_from(i).map_err(|_| out_of_range())?),
            ParamType::UInt16 => dg.add_u16(u16::try_from(i).map_err(|_| out_of_range())?),
            ParamType::UInt32 => dg.add_u32(u32::try_from(i).map_err(|_| out_of_range())?),
            ParamType::UInt64 => dg.add_u64(u64::try_from(i).map_err(|_| out_of_range())?),
            _ => return Err(out_of_range()),
        }
        Ok(())
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::Int8 => write!(f, "int8"),
            ParamType::Int16 => write!(f, "int16"),
            ParamType::Int32 => write!(f, "int32"),
            ParamType::Int64 => write!(f, "int64"),
            ParamType::UInt8 => write!(f, "uint8"),
            ParamType::UInt16 => write!(f, "uint16"),
            ParamType::UInt32 => write!(f, "uint32"),
            ParamType::UInt64 => write!(f, "uint64"),
            ParamType::Float64 => write!(f, "float64"),
            ParamType::String => write!(f, "string"),
            ParamType::Blob => write!(f, "blob"),
            ParamType::Array(element) => write!(f, "{element}[]"),
        }
    }
}

/// Shape of a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// A plain field with its parameter list
    Atomic(Vec<ParamType>),
    /// A field that bundles several atomic fields, in order
    Molecular(Vec<FieldId>),
}

/// Everything the server knows about a field.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub id: FieldId,
    pub name: String,
    pub flags: FieldFlags,
    pub kind: FieldKind,
    /// Packed default value
    pub default: Vec<u8>,
}

impl FieldDescriptor {
    pub fn is_atomic(&self) -> bool {
        matches!(self.kind, FieldKind::Atomic(_))
    }

    pub fn is_required(&self) -> bool {
        self.flags.contains(FieldFlags::REQUIRED)
    }

    pub fn is_broadcast(&self) -> bool {
        self.flags.contains(FieldFlags::BROADCAST)
    }

    pub fn is_ram(&self) -> bool {
        self.flags.contains(FieldFlags::RAM)
    }

    pub fn is_db(&self) -> bool {
        self.flags.contains(FieldFlags::DB)
    }

    pub fn is_clsend(&self) -> bool {
        self.flags.contains(FieldFlags::CLSEND)
    }

    pub fn is_clrecv(&self) -> bool {
        self.flags.contains(FieldFlags::CLRECV)
    }

    pub fn is_ownsend(&self) -> bool {
        self.flags.contains(FieldFlags::OWNSEND)
    }

    pub fn is_ownrecv(&self) -> bool {
        self.flags.contains(FieldFlags::OWNRECV)
    }

    pub fn is_airecv(&self) -> bool {
        self.flags.contains(FieldFlags::AIRECV)
    }

    /// Reads the packed value of an atomic field, leaving `di` after it.
    ///
    /// Molecular fields must be expanded by the schema first.
    pub fn read_atomic<'a>(&self, di: &mut DatagramIterator<'a>) -> Result<&'a [u8], ProtocolError> {
        let FieldKind::Atomic(params) = &self.kind else {
            return Ok(&[]);
        };
        let mut probe = di.clone();
        for param in params {
            param.skip(&mut probe)?;
        }
        di.get_bytes(probe.position() - di.position())
    }
}
