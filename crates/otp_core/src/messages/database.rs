use crate::datagram::{Datagram, DatagramIterator};
use crate::error::ProtocolError;
use crate::msgtypes::dbserver;
use crate::types::DoId;

/// Requests served by the persistent-store adapter.
///
/// Field values travel as packed bytes inside length-prefixed strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseMessage {
    GetStoredValues {
        context: u32,
        do_id: DoId,
        names: Vec<String>,
    },
    SetStoredValues {
        do_id: DoId,
        names: Vec<String>,
        values: Vec<Vec<u8>>,
    },
    CreateStoredObject {
        context: u32,
        /// Index into the classes that carry the stored-object marker field
        object_type: u16,
        names: Vec<String>,
        values: Vec<Vec<u8>>,
    },
    DeleteStoredObject,
}

fn read_names(di: &mut DatagramIterator<'_>, count: usize) -> Result<Vec<String>, ProtocolError> {
    (0..count).map(|_| di.get_string()).collect()
}

fn read_values(di: &mut DatagramIterator<'_>, count: usize) -> Result<Vec<Vec<u8>>, ProtocolError> {
    (0..count).map(|_| di.get_blob().map(<[u8]>::to_vec)).collect()
}

impl DatabaseMessage {
    pub fn decode(code: u16, di: &mut DatagramIterator<'_>) -> Result<Self, ProtocolError> {
        let message = match code {
            dbserver::GET_STORED_VALUES => {
                let context = di.get_u32()?;
                let do_id = di.get_u32()?;
                let count = usize::from(di.get_u16()?);
                DatabaseMessage::GetStoredValues {
                    context,
                    do_id,
                    names: read_names(di, count)?,
                }
            }
            dbserver::SET_STORED_VALUES => {
                let do_id = di.get_u32()?;
                let count = di.get_u32()? as usize;
                let names = read_names(di, count)?;
                let values = read_values(di, count)?;
                DatabaseMessage::SetStoredValues { do_id, names, values }
            }
            dbserver::CREATE_STORED_OBJECT => {
                let context = di.get_u32()?;
                let _unused = di.get_string()?;
                let object_type = di.get_u16()?;
                let count = usize::from(di.get_u16()?);
                let names = read_names(di, count)?;
                let values = read_values(di, count)?;
                DatabaseMessage::CreateStoredObject {
                    context,
                    object_type,
                    names,
                    values,
                }
            }
            dbserver::DELETE_STORED_OBJECT => {
                di.get_remaining_bytes();
                DatabaseMessage::DeleteStoredObject
            }
            code => {
                return Err(ProtocolError::UnknownCode {
                    code,
                    target: "database server",
                })
            }
        };
        di.expect_end(code)?;
        Ok(message)
    }

    pub fn code(&self) -> u16 {
        match self {
            DatabaseMessage::GetStoredValues { .. } => dbserver::GET_STORED_VALUES,
            DatabaseMessage::SetStoredValues { .. } => dbserver::SET_STORED_VALUES,
            DatabaseMessage::CreateStoredObject { .. } => dbserver::CREATE_STORED_OBJECT,
            DatabaseMessage::DeleteStoredObject => dbserver::DELETE_STORED_OBJECT,
        }
    }

    pub fn payload(&self) -> Datagram {
        let mut dg = Datagram::new();
        match self {
            DatabaseMessage::GetStoredValues { context, do_id, names } => {
                dg.add_u32(*context);
                dg.add_u32(*do_id);
                dg.add_u16(names.len() as u16);
                names.iter().for_each(|name| dg.add_string(name));
            }
            DatabaseMessage::SetStoredValues { do_id, names, values } => {
                dg.add_u32(*do_id);
                dg.add_u32(names.len() as u32);
                names.iter().for_each(|name| dg.add_string(name));
                values.iter().for_each(|value| dg.add_blob(value));
            }
            DatabaseMessage::CreateStoredObject {
                context,
                object_type,
                names,
                values,
            } => {
                dg.add_u32(*context);
                dg.add_string("");
                dg.add_u16(*object_type);
                dg.add_u16(names.len() as u16);
                names.iter().for_each(|name| dg.add_string(name));
                values.iter().for_each(|value| dg.add_blob(value));
            }
            DatabaseMessage::DeleteStoredObject => {}
        }
        dg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_skips_the_unused_string() {
        let message = DatabaseMessage::CreateStoredObject {
            context: 8,
            object_type: 1,
            names: vec!["setName".into()],
            values: vec![vec![2, 0, b'h', b'i']],
        };
        let dg = message.payload();
        let decoded = DatabaseMessage::decode(message.code(), &mut DatagramIterator::new(dg.as_bytes())).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn set_values_count_is_u32() {
        let message = DatabaseMessage::SetStoredValues {
            do_id: 10_000_000,
            names: vec!["a".into(), "b".into()],
            values: vec![vec![1], vec![2]],
        };
        let dg = message.payload();
        assert_eq!(&dg.as_bytes()[4..8], &[2, 0, 0, 0]);
    }

    #[test]
    fn missing_values_are_truncation() {
        let mut dg = Datagram::new();
        dg.add_u32(1);
        dg.add_u32(1);
        dg.add_string("setName");
        let result = DatabaseMessage::decode(dbserver::SET_STORED_VALUES, &mut DatagramIterator::new(dg.as_bytes()));
        assert!(matches!(result, Err(ProtocolError::Truncated { .. })));
    }
}
