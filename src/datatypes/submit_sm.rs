use crate::codec::{
    CodecError, Decodable, Encodable, PduHeader, decode_cstring, decode_u8, encode_cstring,
    encode_u8,
};
use crate::datatypes::{
    AddressError, CommandId, CommandStatus, DataCoding, DestinationAddr, EsmClass, FixedStringError,
    MessageId, NumericPlanIndicator, PriorityFlag, RegisteredDelivery, RegisteredDeliveryError,
    ScheduleDeliveryTime, ServiceType, ShortMessage, SourceAddr, Tlv, TypeOfNumber, ValidityPeriod,
};
use bytes::{Buf, BufMut, BytesMut};
use std::io::Cursor;
use thiserror::Error;

/// Validation errors for SubmitSm PDU
#[derive(Debug, Error)]
pub enum SubmitSmValidationError {
    #[error("Service type error: {0}")]
    ServiceType(#[from] crate::datatypes::ServiceTypeError),
    #[error("Source address error: {0}")]
    SourceAddr(#[from] AddressError),
    #[error("Data coding error: {0}")]
    DataCoding(#[from] crate::datatypes::DataCodingError),
    #[error("ESM class error: {0}")]
    EsmClass(#[from] crate::datatypes::EsmClassError),
    #[error("Registered delivery error: {0}")]
    RegisteredDelivery(#[from] RegisteredDeliveryError),
    #[error("Short message error: {0}")]
    ShortMessage(#[from] FixedStringError),
}

/// This operation is used by an ESME to submit a short message to the SMSC for onward transmission
/// to a specified short message entity (SME). The submit_sm PDU does not support the transaction
/// message mode.
///
/// ## References
/// - SMPP v3.4 Specification Section 4.4.1
#[derive(Clone, Debug, PartialEq)]
pub struct SubmitSm {
    pub command_status: CommandStatus,
    pub sequence_number: u32,

    // Mandatory parameters
    pub service_type: ServiceType,
    pub source_addr_ton: TypeOfNumber,
    pub source_addr_npi: NumericPlanIndicator,
    pub source_addr: SourceAddr,
    pub dest_addr_ton: TypeOfNumber,
    pub dest_addr_npi: NumericPlanIndicator,
    pub destination_addr: DestinationAddr,
    pub esm_class: EsmClass,
    pub protocol_id: u8,
    pub priority_flag: PriorityFlag,
    pub schedule_delivery_time: ScheduleDeliveryTime,
    pub validity_period: ValidityPeriod,
    pub registered_delivery: RegisteredDelivery,
    pub replace_if_present_flag: u8,
    pub data_coding: DataCoding,
    pub sm_default_msg_id: u8,
    pub short_message: ShortMessage,

    /// Optional TLV parameters (e.g. message_payload, user_message_reference,
    /// SAR segmentation, callback_num, and any vendor/forward-compatible tags).
    /// Unknown tags are preserved verbatim so that a decode/encode cycle is
    /// byte-identical for PDUs carrying parameters this library does not
    /// interpret.
    pub optional_parameters: Vec<Tlv>,
}

impl SubmitSm {
    /// Create a new SubmitSm PDU with no optional parameters
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sequence_number: u32,
        service_type: ServiceType,
        source_addr_ton: TypeOfNumber,
        source_addr_npi: NumericPlanIndicator,
        source_addr: SourceAddr,
        dest_addr_ton: TypeOfNumber,
        dest_addr_npi: NumericPlanIndicator,
        destination_addr: DestinationAddr,
        esm_class: EsmClass,
        priority_flag: PriorityFlag,
        registered_delivery: RegisteredDelivery,
        data_coding: DataCoding,
        short_message: ShortMessage,
    ) -> Self {
        Self {
            command_status: CommandStatus::Ok,
            sequence_number,
            service_type,
            source_addr_ton,
            source_addr_npi,
            source_addr,
            dest_addr_ton,
            dest_addr_npi,
            destination_addr,
            esm_class,
            protocol_id: 0,
            priority_flag,
            schedule_delivery_time: ScheduleDeliveryTime::immediate(),
            validity_period: ValidityPeriod::immediate(),
            registered_delivery,
            replace_if_present_flag: 0,
            data_coding,
            sm_default_msg_id: 0,
            short_message,
            optional_parameters: Vec::new(),
        }
    }

    /// Add a custom TLV parameter
    pub fn add_tlv(&mut self, tlv: Tlv) {
        self.optional_parameters.push(tlv);
    }

    /// Add a message payload TLV, used when the message content exceeds the
    /// 254-octet short_message field.
    pub fn add_message_payload(&mut self, payload: &[u8]) {
        self.optional_parameters.push(Tlv {
            tag: crate::datatypes::tlv::tags::MESSAGE_PAYLOAD,
            length: payload.len() as u16,
            value: bytes::Bytes::copy_from_slice(payload),
        });
    }

    /// Get the message_payload TLV value, if present.
    pub fn message_payload(&self) -> Option<&bytes::Bytes> {
        self.optional_parameters
            .iter()
            .find(|tlv| tlv.tag == crate::datatypes::tlv::tags::MESSAGE_PAYLOAD)
            .map(|tlv| &tlv.value)
    }

    /// True if SAR (segmentation and reassembly) TLVs indicate this PDU
    /// carries one segment of a concatenated message.
    pub fn is_concatenated(&self) -> bool {
        self.optional_parameters
            .iter()
            .any(|tlv| tlv.tag == crate::datatypes::tlv::tags::SAR_MSG_REF_NUM)
    }
}

impl Encodable for SubmitSm {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        let header = PduHeader {
            command_length: 0, // backpatched by to_bytes()
            command_id: CommandId::SubmitSm,
            command_status: self.command_status,
            sequence_number: self.sequence_number,
        };
        header.encode(buf)?;

        encode_cstring(buf, self.service_type.as_str().unwrap_or(""), 6);
        encode_u8(buf, self.source_addr_ton as u8);
        encode_u8(buf, self.source_addr_npi as u8);
        encode_cstring(buf, self.source_addr.as_str().unwrap_or(""), 21);
        encode_u8(buf, self.dest_addr_ton as u8);
        encode_u8(buf, self.dest_addr_npi as u8);
        encode_cstring(buf, self.destination_addr.as_str().unwrap_or(""), 21);
        encode_u8(buf, self.esm_class.to_byte());
        encode_u8(buf, self.protocol_id);
        encode_u8(buf, self.priority_flag as u8);
        encode_cstring(
            buf,
            self.schedule_delivery_time.as_str().unwrap_or(""),
            17,
        );
        encode_cstring(buf, self.validity_period.as_str().unwrap_or(""), 17);
        encode_u8(buf, self.registered_delivery.to_byte());
        encode_u8(buf, self.replace_if_present_flag);
        encode_u8(buf, self.data_coding.to_byte());
        encode_u8(buf, self.sm_default_msg_id);
        encode_u8(buf, self.short_message.len());
        buf.put_slice(self.short_message.as_bytes());

        for tlv in &self.optional_parameters {
            tlv.encode(buf)?;
        }

        Ok(())
    }

    fn encoded_size(&self) -> usize {
        let mut size = PduHeader::SIZE + 6 + 1 + 1 + 21 + 1 + 1 + 21 + 1 + 1 + 1 + 17 + 17 + 1 + 1
            + 1 + 1 + 1 + self.short_message.len() as usize;
        for tlv in &self.optional_parameters {
            size += tlv.encoded_size();
        }
        size
    }
}

impl Decodable for SubmitSm {
    fn command_id() -> CommandId {
        CommandId::SubmitSm
    }

    fn decode(header: PduHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        Self::validate_header(&header)?;

        let service_type_str = decode_cstring(buf, 6, "service_type")?;
        let service_type =
            ServiceType::new(&service_type_str).map_err(|e| CodecError::FieldValidation {
                field: "service_type",
                reason: e.to_string(),
            })?;

        let source_addr_ton =
            TypeOfNumber::try_from(decode_u8(buf)?).map_err(|_| CodecError::FieldValidation {
                field: "source_addr_ton",
                reason: "Invalid type of number".to_string(),
            })?;
        let source_addr_npi = NumericPlanIndicator::try_from(decode_u8(buf)?).map_err(|_| {
            CodecError::FieldValidation {
                field: "source_addr_npi",
                reason: "Invalid numbering plan indicator".to_string(),
            }
        })?;
        let source_addr_str = decode_cstring(buf, 21, "source_addr")?;
        let source_addr =
            SourceAddr::new(&source_addr_str, source_addr_ton).map_err(|e| CodecError::FieldValidation {
                field: "source_addr",
                reason: e.to_string(),
            })?;

        let dest_addr_ton =
            TypeOfNumber::try_from(decode_u8(buf)?).map_err(|_| CodecError::FieldValidation {
                field: "dest_addr_ton",
                reason: "Invalid type of number".to_string(),
            })?;
        let dest_addr_npi = NumericPlanIndicator::try_from(decode_u8(buf)?).map_err(|_| {
            CodecError::FieldValidation {
                field: "dest_addr_npi",
                reason: "Invalid numbering plan indicator".to_string(),
            }
        })?;
        let destination_addr_str = decode_cstring(buf, 21, "destination_addr")?;
        let destination_addr = DestinationAddr::new(&destination_addr_str, dest_addr_ton).map_err(
            |e| CodecError::FieldValidation {
                field: "destination_addr",
                reason: e.to_string(),
            },
        )?;

        let esm_class = EsmClass::from_byte(decode_u8(buf)?).map_err(|e| {
            CodecError::FieldValidation {
                field: "esm_class",
                reason: e.to_string(),
            }
        })?;
        let protocol_id = decode_u8(buf)?;
        let priority_flag =
            PriorityFlag::try_from(decode_u8(buf)?).map_err(|_| CodecError::FieldValidation {
                field: "priority_flag",
                reason: "Invalid priority flag".to_string(),
            })?;

        let schedule_delivery_time_str = decode_cstring(buf, 17, "schedule_delivery_time")?;
        let schedule_delivery_time = ScheduleDeliveryTime::from_parsed_string(
            schedule_delivery_time_str,
        )
        .map_err(|e| CodecError::FieldValidation {
            field: "schedule_delivery_time",
            reason: e.to_string(),
        })?;

        let validity_period_str = decode_cstring(buf, 17, "validity_period")?;
        let validity_period = ValidityPeriod::from_parsed_string(validity_period_str).map_err(|e| {
            CodecError::FieldValidation {
                field: "validity_period",
                reason: e.to_string(),
            }
        })?;

        let registered_delivery =
            RegisteredDelivery::from_byte(decode_u8(buf)?).map_err(|e| CodecError::FieldValidation {
                field: "registered_delivery",
                reason: e.to_string(),
            })?;
        let replace_if_present_flag = decode_u8(buf)?;
        let data_coding_byte = decode_u8(buf)?;
        let data_coding = DataCoding::from_byte(data_coding_byte);
        let sm_default_msg_id = decode_u8(buf)?;

        let sm_length = decode_u8(buf)?;
        if sm_length > 254 {
            return Err(CodecError::FieldValidation {
                field: "sm_length",
                reason: format!("sm_length {sm_length} exceeds maximum of 254"),
            });
        }
        if buf.remaining() < sm_length as usize {
            return Err(CodecError::Incomplete);
        }
        let mut message_bytes = vec![0u8; sm_length as usize];
        buf.copy_to_slice(&mut message_bytes);
        let short_message =
            ShortMessage::new(&message_bytes).map_err(|e| CodecError::FieldValidation {
                field: "short_message",
                reason: e.to_string(),
            })?;

        let mut optional_parameters = Vec::new();
        while buf.remaining() > 0 {
            match Tlv::decode(buf) {
                Ok(tlv) => optional_parameters.push(tlv),
                Err(CodecError::Incomplete) => break,
                Err(e) => return Err(e),
            }
        }

        Ok(SubmitSm {
            command_status: header.command_status,
            sequence_number: header.sequence_number,
            service_type,
            source_addr_ton,
            source_addr_npi,
            source_addr,
            dest_addr_ton,
            dest_addr_npi,
            destination_addr,
            esm_class,
            protocol_id,
            priority_flag,
            schedule_delivery_time,
            validity_period,
            registered_delivery,
            replace_if_present_flag,
            data_coding,
            sm_default_msg_id,
            short_message,
            optional_parameters,
        })
    }
}

/// Validation errors for SubmitSmResponse PDU
#[derive(Debug, Error)]
pub enum SubmitSmResponseValidationError {
    #[error("Message ID error: {0}")]
    MessageId(#[from] FixedStringError),
}

#[derive(Clone, Debug, PartialEq)]
pub struct SubmitSmResponse {
    pub command_status: CommandStatus,
    pub sequence_number: u32,
    pub message_id: MessageId,
}

impl SubmitSmResponse {
    pub fn success(sequence_number: u32, message_id: MessageId) -> Self {
        Self {
            command_status: CommandStatus::Ok,
            sequence_number,
            message_id,
        }
    }

    pub fn error(sequence_number: u32, command_status: CommandStatus) -> Self {
        Self {
            command_status,
            sequence_number,
            message_id: MessageId::default(),
        }
    }
}

impl Encodable for SubmitSmResponse {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        let header = PduHeader {
            command_length: 0,
            command_id: CommandId::SubmitSmResp,
            command_status: self.command_status,
            sequence_number: self.sequence_number,
        };
        header.encode(buf)?;

        encode_cstring(buf, self.message_id.as_str().unwrap_or(""), 65);
        Ok(())
    }

    fn encoded_size(&self) -> usize {
        PduHeader::SIZE + 65
    }
}

impl Decodable for SubmitSmResponse {
    fn command_id() -> CommandId {
        CommandId::SubmitSmResp
    }

    fn decode(header: PduHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        Self::validate_header(&header)?;

        let message_id_str = decode_cstring(buf, 65, "message_id")?;
        let message_id =
            MessageId::from_parsed_string(message_id_str).map_err(|e| CodecError::FieldValidation {
                field: "message_id",
                reason: e.to_string(),
            })?;

        Ok(SubmitSmResponse {
            command_status: header.command_status,
            sequence_number: header.sequence_number,
            message_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::{Acknowledgement, DeliveryReceipt};

    fn sample() -> SubmitSm {
        SubmitSm::new(
            7,
            ServiceType::Default,
            TypeOfNumber::International,
            NumericPlanIndicator::Isdn,
            SourceAddr::new("15551234567", TypeOfNumber::International).unwrap(),
            TypeOfNumber::International,
            NumericPlanIndicator::Isdn,
            DestinationAddr::new("15557654321", TypeOfNumber::International).unwrap(),
            EsmClass::new(
                crate::datatypes::MessageMode::Default,
                crate::datatypes::MessageType::Default,
            ),
            PriorityFlag::Level1,
            RegisteredDelivery::delivery_receipt(),
            DataCoding::default(),
            ShortMessage::new(b"Hello, World!").unwrap(),
        )
    }

    #[test]
    fn roundtrip_via_encodable_decodable() {
        let original = sample();
        let bytes = original.to_bytes();

        let mut cursor = Cursor::new(bytes.as_ref());
        let header = PduHeader::decode(&mut cursor).unwrap();
        let decoded = SubmitSm::decode(header, &mut cursor).unwrap();

        assert_eq!(original, decoded);
    }

    #[test]
    fn unknown_tlv_round_trips_byte_identical() {
        let mut original = sample();
        original.add_tlv(Tlv {
            tag: 0xBEEF,
            length: 3,
            value: bytes::Bytes::from_static(&[1, 2, 3]),
        });

        let bytes = original.to_bytes();
        let mut cursor = Cursor::new(bytes.as_ref());
        let header = PduHeader::decode(&mut cursor).unwrap();
        let decoded = SubmitSm::decode(header, &mut cursor).unwrap();

        assert_eq!(decoded.optional_parameters.len(), 1);
        assert_eq!(decoded.optional_parameters[0].tag, 0xBEEF);
        assert_eq!(decoded.to_bytes(), bytes);
    }

    #[test]
    fn message_payload_helper_roundtrips() {
        let mut original = sample();
        original.add_message_payload(b"a much longer payload than short_message allows");

        let bytes = original.to_bytes();
        let mut cursor = Cursor::new(bytes.as_ref());
        let header = PduHeader::decode(&mut cursor).unwrap();
        let decoded = SubmitSm::decode(header, &mut cursor).unwrap();

        assert_eq!(
            decoded.message_payload().unwrap().as_ref(),
            b"a much longer payload than short_message allows"
        );
    }

    #[test]
    fn registered_delivery_field_is_typed() {
        let pdu = sample();
        assert_eq!(pdu.registered_delivery.receipt, DeliveryReceipt::OnSuccessOrFailure);
        assert_eq!(pdu.registered_delivery.acknowledgement, Acknowledgement::None);
    }

    #[test]
    fn response_roundtrip() {
        let original = SubmitSmResponse::success(7, MessageId::new(b"12345").unwrap());
        let bytes = original.to_bytes();

        let mut cursor = Cursor::new(bytes.as_ref());
        let header = PduHeader::decode(&mut cursor).unwrap();
        let decoded = SubmitSmResponse::decode(header, &mut cursor).unwrap();

        assert_eq!(original, decoded);
    }

    #[test]
    fn sm_length_over_254_is_rejected() {
        let mut buf = BytesMut::new();
        let header = PduHeader {
            command_length: 0,
            command_id: CommandId::SubmitSm,
            command_status: CommandStatus::Ok,
            sequence_number: 1,
        };
        header.encode(&mut buf).unwrap();
        encode_cstring(&mut buf, "", 6);
        encode_u8(&mut buf, 0);
        encode_u8(&mut buf, 0);
        encode_cstring(&mut buf, "1", 21);
        encode_u8(&mut buf, 0);
        encode_u8(&mut buf, 0);
        encode_cstring(&mut buf, "2", 21);
        encode_u8(&mut buf, 0);
        encode_u8(&mut buf, 0);
        encode_u8(&mut buf, 0);
        encode_cstring(&mut buf, "", 17);
        encode_cstring(&mut buf, "", 17);
        encode_u8(&mut buf, 0);
        encode_u8(&mut buf, 0);
        encode_u8(&mut buf, 0);
        encode_u8(&mut buf, 0);
        encode_u8(&mut buf, 255); // sm_length, invalid

        let mut cursor = Cursor::new(buf.as_ref());
        let header = PduHeader::decode(&mut cursor).unwrap();
        let result = SubmitSm::decode(header, &mut cursor);
        assert!(matches!(result, Err(CodecError::FieldValidation { field: "sm_length", .. })));
    }
}
