// ABOUTME: Strongly-typed SMPP registered_delivery bitfield with receipt and acknowledgement flags
// ABOUTME: Provides compile-time guarantees for registered_delivery format per specification Section 5.2.17

use std::fmt;

/// SMSC Delivery Receipt request (bits 1-0 of registered_delivery)
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum DeliveryReceipt {
    /// No SMSC delivery receipt requested (default)
    #[default]
    None,
    /// SMSC delivery receipt requested where final delivery outcome is success or failure
    OnSuccessOrFailure,
    /// SMSC delivery receipt requested where final delivery outcome is failure only
    OnFailureOnly,
}

impl DeliveryReceipt {
    fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0b00 => Some(Self::None),
            0b01 => Some(Self::OnSuccessOrFailure),
            0b10 => Some(Self::OnFailureOnly),
            _ => None,
        }
    }

    fn to_bits(self) -> u8 {
        match self {
            Self::None => 0b00,
            Self::OnSuccessOrFailure => 0b01,
            Self::OnFailureOnly => 0b10,
        }
    }
}

/// SME originated Acknowledgement request (bits 3-2 of registered_delivery)
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum Acknowledgement {
    /// No recipient SME acknowledgement requested (default)
    #[default]
    None,
    /// SME delivery acknowledgement requested
    DeliveryAcknowledgement,
    /// SME manual/user acknowledgement requested
    UserAcknowledgement,
    /// Both delivery and user acknowledgement requested
    Both,
}

impl Acknowledgement {
    fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0b00 => Some(Self::None),
            0b01 => Some(Self::DeliveryAcknowledgement),
            0b10 => Some(Self::UserAcknowledgement),
            0b11 => Some(Self::Both),
            _ => None,
        }
    }

    fn to_bits(self) -> u8 {
        match self {
            Self::None => 0b00,
            Self::DeliveryAcknowledgement => 0b01,
            Self::UserAcknowledgement => 0b10,
            Self::Both => 0b11,
        }
    }
}

/// Registered Delivery field (SMPP v3.4 Section 5.2.17)
///
/// Indicates whether the ESME would like a delivery receipt and/or an SME
/// originated acknowledgement for the submitted message. Also carries the
/// Intermediate Notification flag used to request a delivery receipt for
/// intermediate (not final) delivery outcomes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct RegisteredDelivery {
    pub receipt: DeliveryReceipt,
    pub acknowledgement: Acknowledgement,
    pub intermediate_notification: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum RegisteredDeliveryError {
    #[error("Invalid SMSC delivery receipt bits: {0:#04b}")]
    InvalidReceipt(u8),
    #[error("Invalid SME acknowledgement bits: {0:#04b}")]
    InvalidAcknowledgement(u8),
    #[error("Reserved bits set in registered_delivery: {0:#010b}")]
    ReservedBitsSet(u8),
}

impl RegisteredDelivery {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn delivery_receipt() -> Self {
        Self {
            receipt: DeliveryReceipt::OnSuccessOrFailure,
            ..Self::default()
        }
    }

    pub fn to_byte(self) -> u8 {
        let receipt_bits = self.receipt.to_bits();
        let ack_bits = self.acknowledgement.to_bits() << 2;
        let intermediate_bit = u8::from(self.intermediate_notification) << 4;

        receipt_bits | ack_bits | intermediate_bit
    }

    pub fn from_byte(value: u8) -> Result<Self, RegisteredDeliveryError> {
        if value & 0b1110_0000 != 0 {
            return Err(RegisteredDeliveryError::ReservedBitsSet(value));
        }

        let receipt_bits = value & 0b0000_0011;
        let ack_bits = (value >> 2) & 0b0000_0011;
        let intermediate_notification = (value >> 4) & 0x01 == 1;

        let receipt =
            DeliveryReceipt::from_bits(receipt_bits).ok_or(RegisteredDeliveryError::InvalidReceipt(receipt_bits))?;
        let acknowledgement = Acknowledgement::from_bits(ack_bits)
            .ok_or(RegisteredDeliveryError::InvalidAcknowledgement(ack_bits))?;

        Ok(Self {
            receipt,
            acknowledgement,
            intermediate_notification,
        })
    }
}

impl From<RegisteredDelivery> for u8 {
    fn from(value: RegisteredDelivery) -> Self {
        value.to_byte()
    }
}

impl TryFrom<u8> for RegisteredDelivery {
    type Error = RegisteredDeliveryError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_byte(value)
    }
}

impl fmt::Display for RegisteredDelivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RegisteredDelivery(receipt={:?}, ack={:?}, intermediate={})",
            self.receipt, self.acknowledgement, self.intermediate_notification
        )
    }
}
