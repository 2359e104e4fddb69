//! Crate-level integration tests exercising the codec, PDU round-trips, and
//! cross-cutting wire-protocol properties rather than a single module's
//! internals (which are covered by the `#[cfg(test)]` blocks alongside
//! `codec.rs`, `window.rs`, `session::state`, etc).

use crate::codec::{CodecError, Decodable, Encodable, Frame, PduHeader, PduRegistry};
use crate::datatypes::*;
use std::io::Cursor;

fn decode_one(bytes: &[u8]) -> Frame {
    let registry = PduRegistry::new();
    let mut cursor = Cursor::new(bytes);
    let header = PduHeader::decode(&mut cursor).expect("valid header");
    registry.decode_pdu(header, &mut cursor).expect("valid body")
}

/// Spec §8 property 1: header round-trips with `command_length = 16 +
/// body_bytes` and `command_id` matching the variant.
#[test]
fn header_round_trips_with_correct_length_and_command_id() {
    let pdu = EnquireLink::new(99);
    let bytes = pdu.to_bytes();
    assert_eq!(bytes.len(), 16);
    assert_eq!(u32::from_be_bytes(bytes[0..4].try_into().unwrap()), 16);

    let frame = decode_one(&bytes);
    assert_eq!(frame.command_id(), CommandId::EnquireLink);
    assert_eq!(frame.sequence_number(), 99);
}

/// Spec §8 S1 — exact bytes for `enquire_link(seq=1)`.
#[test]
fn s1_enquire_link_matches_the_literal_wire_bytes() {
    let pdu = EnquireLink::new(1);
    let bytes = pdu.to_bytes();
    assert_eq!(
        bytes.as_ref(),
        &[
            0x00, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00, 0x15, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x01,
        ]
    );

    let frame = decode_one(&bytes);
    match frame {
        Frame::EnquireLink(pdu) => assert_eq!(pdu.sequence_number, 1),
        other => panic!("expected EnquireLink, got {other:?}"),
    }
}

/// Spec §8 S2 — `bind_transceiver` body bytes and field-for-field round
/// trip.
#[test]
fn s2_bind_transceiver_matches_the_literal_wire_bytes() {
    let pdu = BindTransceiver {
        command_status: CommandStatus::Ok,
        sequence_number: 1,
        system_id: SystemId::from("test"),
        password: Some(Password::from("pw")),
        system_type: SystemType::from(""),
        interface_version: InterfaceVersion::SmppV34,
        addr_ton: TypeOfNumber::Unknown,
        addr_npi: NumericPlanIndicator::Unknown,
        address_range: AddressRange::from(""),
    };

    let bytes = pdu.to_bytes();
    assert_eq!(u32::from_be_bytes(bytes[4..8].try_into().unwrap()), 0x0000_0009);
    assert_eq!(u32::from_be_bytes(bytes[8..12].try_into().unwrap()), 0);

    let body = &bytes[16..];
    assert_eq!(
        body,
        b"test\0pw\0\0\x34\x00\x00\0".as_slice(),
        "body bytes must match service_type/password/system_type/iface/ton/npi/range order"
    );

    let decoded = match decode_one(&bytes) {
        Frame::BindTransceiver(pdu) => pdu,
        other => panic!("expected BindTransceiver, got {other:?}"),
    };
    assert_eq!(decoded, *Box::new(pdu));
}

/// Spec §8 S3 — an ESME's `submit_sm` decodes on the SMSC side, and the
/// SMSC's `submit_sm_resp` decodes back on the ESME side carrying the same
/// sequence number (the correlation property property 2 generalizes).
#[test]
fn s3_submit_sm_round_trips_and_its_response_correlates_by_sequence_number() {
    let submit = SubmitSm::new(
        42,
        ServiceType::default(),
        TypeOfNumber::National,
        NumericPlanIndicator::Isdn,
        SourceAddr::new("SENDER", TypeOfNumber::National).unwrap(),
        TypeOfNumber::National,
        NumericPlanIndicator::Isdn,
        DestinationAddr::new("14155551234", TypeOfNumber::National).unwrap(),
        EsmClass::default(),
        PriorityFlag::Level0,
        RegisteredDelivery::default(),
        DataCoding::default(),
        ShortMessage::new(b"Hello").unwrap(),
    );

    let bytes = submit.to_bytes();
    let decoded = match decode_one(&bytes) {
        Frame::SubmitSm(pdu) => *pdu,
        other => panic!("expected SubmitSm, got {other:?}"),
    };
    assert_eq!(decoded.sequence_number, 42);
    assert_eq!(decoded.source_addr.to_string(), "SENDER");
    assert_eq!(decoded.short_message.as_bytes(), b"Hello");

    // The SMSC answers with a response sharing the request's sequence
    // number and command_id | 0x8000_0000.
    let response = SubmitSmResponse::success(decoded.sequence_number, MessageId::from("ABC"));
    assert_eq!(response.sequence_number, submit.sequence_number);
    assert_eq!(response.command_status, CommandStatus::Ok);

    let resp_bytes = response.to_bytes();
    let decoded_resp = match decode_one(&resp_bytes) {
        Frame::SubmitSmResp(pdu) => pdu,
        other => panic!("expected SubmitSmResp, got {other:?}"),
    };
    assert_eq!(decoded_resp.sequence_number, 42);
    assert_eq!(decoded_resp.message_id.as_str().unwrap(), "ABC");
    assert_eq!(
        CommandId::SubmitSmResp as u32,
        CommandId::SubmitSm as u32 | 0x8000_0000
    );
}

/// Spec §8 property 6: an unknown TLV tag round-trips byte-identically.
#[test]
fn unknown_tlv_round_trips_byte_identically() {
    let unknown_tag = 0x9999u16;
    let mut submit = SubmitSm::new(
        7,
        ServiceType::default(),
        TypeOfNumber::International,
        NumericPlanIndicator::Isdn,
        SourceAddr::new("12345", TypeOfNumber::International).unwrap(),
        TypeOfNumber::International,
        NumericPlanIndicator::Isdn,
        DestinationAddr::new("67890", TypeOfNumber::International).unwrap(),
        EsmClass::default(),
        PriorityFlag::Level0,
        RegisteredDelivery::default(),
        DataCoding::default(),
        ShortMessage::new(b"hi").unwrap(),
    );
    submit.add_tlv(Tlv {
        tag: unknown_tag,
        length: 4,
        value: bytes::Bytes::from_static(b"\xDE\xAD\xBE\xEF"),
    });

    let bytes = submit.to_bytes();
    let decoded = match decode_one(&bytes) {
        Frame::SubmitSm(pdu) => *pdu,
        other => panic!("expected SubmitSm, got {other:?}"),
    };

    let tlv = decoded
        .optional_parameters
        .iter()
        .find(|t| t.tag == unknown_tag)
        .expect("unknown TLV must survive decode");
    assert_eq!(tlv.value.as_ref(), b"\xDE\xAD\xBE\xEF");
}

/// Spec §8 S6 — an unrecognized command_id decodes to `Frame::Unknown`
/// rather than failing outright, and the runtime answers it with
/// `generic_nack(status=ESME_RINVCMDID)` bearing the original frame's
/// sequence number (exercised directly here; `session::runtime` wires this
/// into the dispatch loop).
#[test]
fn s6_unknown_command_id_decodes_as_unknown_and_nacks_with_the_original_sequence_number() {
    let mut raw = bytes::BytesMut::new();
    raw.extend_from_slice(&20u32.to_be_bytes()); // command_length
    raw.extend_from_slice(&0x9999_9999u32.to_be_bytes()); // unregistered command_id
    raw.extend_from_slice(&0u32.to_be_bytes()); // command_status
    raw.extend_from_slice(&7u32.to_be_bytes()); // sequence_number
    raw.extend_from_slice(&[0xAA, 0xBB, 0xCC, 0xDD]); // opaque body

    let frame = decode_one(&raw);
    match &frame {
        Frame::Unknown { header, body } => {
            assert_eq!(header.sequence_number, 7);
            assert_eq!(body.as_ref(), &[0xAA, 0xBB, 0xCC, 0xDD]);
        }
        other => panic!("expected Unknown, got {other:?}"),
    }

    let nack = GenericNack::invalid_command_id(frame.sequence_number());
    assert_eq!(nack.sequence_number, 7);
    assert_eq!(nack.command_status, CommandStatus::InvalidCommandId);
}

/// Framing: `command_length < 16` is a fatal decoding error (§4.2.1); the
/// connection must close rather than attempt a `GenericNack`.
#[test]
fn command_length_below_header_size_is_a_fatal_framing_error() {
    let mut raw = bytes::BytesMut::new();
    raw.extend_from_slice(&5u32.to_be_bytes());
    raw.extend_from_slice(&0x0000_0015u32.to_be_bytes());
    raw.extend_from_slice(&0u32.to_be_bytes());
    raw.extend_from_slice(&1u32.to_be_bytes());

    let mut cursor = Cursor::new(raw.as_ref());
    let err = Frame::check(&mut cursor).expect_err("length below header size must be rejected");
    assert!(matches!(err, CodecError::InvalidPduLength { .. }));
}

/// Framing: an incomplete buffer (fewer than 4 length-prefix bytes, or
/// fewer than `command_length` bytes buffered) reports `Incomplete` rather
/// than a hard error, so the caller knows to wait for more bytes.
#[test]
fn incomplete_buffers_report_incomplete_rather_than_an_error() {
    let mut cursor = Cursor::new([0x00, 0x00].as_slice());
    assert!(matches!(Frame::check(&mut cursor), Err(CodecError::Incomplete)));

    let mut raw = bytes::BytesMut::new();
    raw.extend_from_slice(&64u32.to_be_bytes()); // claims 64 bytes total
    raw.extend_from_slice(&0x0000_0015u32.to_be_bytes());
    raw.extend_from_slice(&0u32.to_be_bytes());
    raw.extend_from_slice(&1u32.to_be_bytes());
    // Only the 16-byte header is actually present.
    let mut cursor = Cursor::new(raw.as_ref());
    assert!(matches!(Frame::check(&mut cursor), Err(CodecError::Incomplete)));
}

/// Spec §8 property 7 / §4.4 gating: a request SMPP v3.4 restricts to
/// transmitter/transceiver-bound sessions gets `ESME_RINVBNDSTS` from
/// `Frame::invalid_bind_status_response`, keyed to the original sequence
/// number, without ever touching a handler.
#[test]
fn bind_gating_rejects_transmit_only_requests_with_invalid_bind_status() {
    let submit = SubmitSm::new(
        5,
        ServiceType::default(),
        TypeOfNumber::International,
        NumericPlanIndicator::Isdn,
        SourceAddr::new("1", TypeOfNumber::International).unwrap(),
        TypeOfNumber::International,
        NumericPlanIndicator::Isdn,
        DestinationAddr::new("2", TypeOfNumber::International).unwrap(),
        EsmClass::default(),
        PriorityFlag::Level0,
        RegisteredDelivery::default(),
        DataCoding::default(),
        ShortMessage::new(b"x").unwrap(),
    );
    let frame = Frame::SubmitSm(Box::new(submit));
    assert!(frame.requires_transmit_capability());

    let nack = frame
        .invalid_bind_status_response(5)
        .expect("submit_sm must have an invalid_bind_status response");
    match nack {
        Frame::SubmitSmResp(resp) => {
            assert_eq!(resp.sequence_number, 5);
            assert_eq!(resp.command_status, CommandStatus::IncorrectBindStatus);
        }
        other => panic!("expected SubmitSmResp, got {other:?}"),
    }

    // enquire_link and the bind family are not transmit-gated.
    assert!(!Frame::EnquireLink(EnquireLink::new(1)).requires_transmit_capability());
}

/// Spec §8 property 8: an inbound `enquire_link(seq=k)` is answered with
/// `enquire_link_resp(seq=k, status=ROK)`.
#[test]
fn enquire_link_response_carries_the_same_sequence_number_and_rok() {
    let request = EnquireLink::new(17);
    let response = EnquireLinkResponse::new(request.sequence_number);
    assert_eq!(response.sequence_number, 17);
    assert_eq!(response.command_status, CommandStatus::Ok);

    let bytes = response.to_bytes();
    let decoded = match decode_one(&bytes) {
        Frame::EnquireLinkResp(pdu) => pdu,
        other => panic!("expected EnquireLinkResp, got {other:?}"),
    };
    assert_eq!(decoded, response);
}

/// A malformed C-Octet string (missing its null terminator before the
/// field's maximum length) is reported as a field validation error rather
/// than panicking or silently truncating.
#[test]
fn missing_cstring_terminator_is_a_malformed_pdu_not_a_panic() {
    let mut raw = bytes::BytesMut::new();
    let body = b"test".to_vec(); // no null terminator anywhere in the 16-byte field budget
    let total_len = PduHeader::SIZE + body.len();
    raw.extend_from_slice(&(total_len as u32).to_be_bytes());
    raw.extend_from_slice(&(CommandId::BindTransmitter as u32).to_be_bytes());
    raw.extend_from_slice(&0u32.to_be_bytes());
    raw.extend_from_slice(&1u32.to_be_bytes());
    raw.extend_from_slice(&body);

    let registry = PduRegistry::new();
    let outcome = crate::codec::decode_frame(&raw, &registry);
    let err = outcome.expect_err("a body with no terminator anywhere must be malformed");
    assert_eq!(err.sequence_number, 1);
}

/// Reserved sequence numbers (0 and 0xFFFFFFFF) are rejected by the header
/// decoder per SMPP v3.4 §3.2, independent of which command carries them.
#[test]
fn reserved_sequence_numbers_are_rejected_at_the_header() {
    for seq in [0u32, 0xFFFF_FFFF] {
        let mut raw = bytes::BytesMut::new();
        raw.extend_from_slice(&16u32.to_be_bytes());
        raw.extend_from_slice(&(CommandId::EnquireLink as u32).to_be_bytes());
        raw.extend_from_slice(&0u32.to_be_bytes());
        raw.extend_from_slice(&seq.to_be_bytes());

        let mut cursor = Cursor::new(raw.as_ref());
        let err = PduHeader::decode(&mut cursor).expect_err("reserved sequence number");
        assert!(matches!(err, CodecError::ReservedSequenceNumber(_)));
    }
}
