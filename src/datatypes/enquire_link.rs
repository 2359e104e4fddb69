use crate::codec::{CodecError, Decodable, Encodable, PduHeader};
use crate::datatypes::{CommandId, CommandStatus};
use bytes::{Bytes, BytesMut};
use std::io::Cursor;

/// The enquire_link operation is used to provide a confidence check of the
/// communication path between an ESME and an SMSC. On the transport layer
/// used to convey SMPP, this operation does not need to be used. However,
/// to ensure a robust interface, each end of the session must be able to
/// verify that the other end is still active on the network.
#[derive(Clone, Debug, PartialEq)]
pub struct EnquireLink {
    pub command_status: CommandStatus,
    pub sequence_number: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EnquireLinkResponse {
    pub command_status: CommandStatus,
    pub sequence_number: u32,
}

impl EnquireLink {
    pub fn new(sequence_number: u32) -> Self {
        Self {
            command_status: CommandStatus::Ok,
            sequence_number,
        }
    }
}

impl EnquireLinkResponse {
    pub fn new(sequence_number: u32) -> Self {
        Self {
            command_status: CommandStatus::Ok,
            sequence_number,
        }
    }

    pub fn error(sequence_number: u32, status: CommandStatus) -> Self {
        Self {
            command_status: status,
            sequence_number,
        }
    }
}

// Legacy byte-serialization, kept around for any code still depending on it.
impl crate::datatypes::ToBytes for EnquireLink {
    fn to_bytes(&self) -> Bytes {
        Encodable::to_bytes(self)
    }
}

impl crate::datatypes::ToBytes for EnquireLinkResponse {
    fn to_bytes(&self) -> Bytes {
        Encodable::to_bytes(self)
    }
}

impl Encodable for EnquireLink {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        let header = PduHeader {
            command_length: PduHeader::SIZE as u32,
            command_id: CommandId::EnquireLink,
            command_status: self.command_status,
            sequence_number: self.sequence_number,
        };
        header.encode(buf)?;
        Ok(())
    }

    fn encoded_size(&self) -> usize {
        PduHeader::SIZE
    }
}

impl Decodable for EnquireLink {
    fn command_id() -> CommandId {
        CommandId::EnquireLink
    }

    fn decode(header: PduHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        Self::validate_header(&header)?;

        if bytes::Buf::has_remaining(buf) {
            return Err(CodecError::FieldValidation {
                field: "enquire_link_body",
                reason: "enquire_link PDU should have no body".to_string(),
            });
        }

        Ok(EnquireLink {
            command_status: header.command_status,
            sequence_number: header.sequence_number,
        })
    }
}

impl Encodable for EnquireLinkResponse {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        let header = PduHeader {
            command_length: PduHeader::SIZE as u32,
            command_id: CommandId::EnquireLinkResp,
            command_status: self.command_status,
            sequence_number: self.sequence_number,
        };
        header.encode(buf)?;
        Ok(())
    }

    fn encoded_size(&self) -> usize {
        PduHeader::SIZE
    }
}

impl Decodable for EnquireLinkResponse {
    fn command_id() -> CommandId {
        CommandId::EnquireLinkResp
    }

    fn decode(header: PduHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        Self::validate_header(&header)?;

        if bytes::Buf::has_remaining(buf) {
            return Err(CodecError::FieldValidation {
                field: "enquire_link_resp_body",
                reason: "enquire_link_resp PDU should have no body".to_string(),
            });
        }

        Ok(EnquireLinkResponse {
            command_status: header.command_status,
            sequence_number: header.sequence_number,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enquire_link_to_bytes() {
        let enquire_link = EnquireLink::new(42);
        let bytes = enquire_link.to_bytes();

        let expected: Vec<u8> = vec![
            0x00, 0x00, 0x00, 0x10, // command_length (16)
            0x00, 0x00, 0x00, 0x15, // command_id
            0x00, 0x00, 0x00, 0x00, // command_status
            0x00, 0x00, 0x00, 0x2A, // sequence_number (42)
        ];

        assert_eq!(bytes.as_ref(), expected.as_slice());
    }

    #[test]
    fn enquire_link_response_roundtrip() {
        let original = EnquireLinkResponse::new(7);
        let bytes = original.to_bytes();

        let mut cursor = Cursor::new(bytes.as_ref());
        let header = PduHeader::decode(&mut cursor).unwrap();
        let decoded = EnquireLinkResponse::decode(header, &mut cursor).unwrap();

        assert_eq!(original, decoded);
    }

    #[test]
    fn enquire_link_response_error_preserves_status() {
        let response = EnquireLinkResponse::error(9, CommandStatus::SystemError);
        assert_eq!(response.command_status, CommandStatus::SystemError);
    }
}
