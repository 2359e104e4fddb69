//! Generic framed I/O over any `AsyncRead + AsyncWrite` transport.
//!
//! This mirrors the buffered read/parse loop the old TCP-only `Connection`
//! used, but is generic over the transport and speaks the unified
//! [`crate::codec::Frame`] rather than a PDU-specific wire format.
//! [`Connection`] bundles both halves behind `&mut self` for simple
//! request/response clients like
//! [`crate::client::default::DefaultClient`]; [`FrameReader`]/[`FrameWriter`]
//! split the same framing logic across independent reader/writer tasks for
//! [`crate::session::runtime`].

use crate::codec::{CodecError, Encodable, Frame, MalformedPdu, PduHeader, PduRegistry};
use bytes::{Buf, Bytes, BytesMut};
use std::io::Cursor;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};

/// The initial read buffer capacity. Grows as needed for larger PDUs.
const INITIAL_BUFFER_CAPACITY: usize = 4 * 1024;

/// The length-prefixed frame parser shared by [`Connection`] and
/// [`FrameReader`]. Holds the accumulation buffer and the PDU registry;
/// knows nothing about the transport itself.
struct FrameBuffer {
    buffer: BytesMut,
    registry: PduRegistry,
}

impl FrameBuffer {
    fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            registry: PduRegistry::new(),
        }
    }

    /// Returns `Some(command_length)` once a complete frame is buffered,
    /// `None` if more bytes are needed. A `command_length` outside the
    /// legal 16..=MAX_PDU_SIZE range is a framing error: the connection
    /// cannot be trusted to resynchronize and must close.
    fn peek_command_length(&self) -> Result<Option<usize>, CodecError> {
        if self.buffer.len() < PduHeader::SIZE {
            return Ok(None);
        }

        let mut cursor = Cursor::new(&self.buffer[..]);
        match Frame::check(&mut cursor) {
            Ok(()) => {
                let command_length = u32::from_be_bytes([
                    self.buffer[0],
                    self.buffer[1],
                    self.buffer[2],
                    self.buffer[3],
                ]);
                Ok(Some(command_length as usize))
            }
            Err(CodecError::Incomplete) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn try_parse_frame(&mut self) -> Result<Option<Frame>, CodecError> {
        let command_length = match self.peek_command_length()? {
            Some(len) => len,
            None => return Ok(None),
        };

        let mut cursor = Cursor::new(&self.buffer[..command_length]);
        let header = PduHeader::decode(&mut cursor)?;
        let frame = self.registry.decode_pdu(header, &mut cursor)?;
        self.buffer.advance(command_length);
        Ok(Some(frame))
    }

    fn try_parse_raw_frame(&mut self) -> Result<Option<Result<Frame, MalformedPdu>>, CodecError> {
        let command_length = match self.peek_command_length()? {
            Some(len) => len,
            None => return Ok(None),
        };

        let outcome = crate::codec::decode_frame(&self.buffer[..command_length], &self.registry);
        self.buffer.advance(command_length);
        Ok(Some(outcome))
    }
}

/// A `CodecError` raised while trying to read a frame always means the
/// connection must close: either the framing itself is broken (bad
/// length) or the peer disconnected mid-PDU. It is distinct from a
/// [`MalformedPdu`], which is an application-level decode failure on an
/// otherwise healthy connection and is answered with a `GenericNack`
/// instead of a disconnect.
async fn fill_and_parse<R, F, T>(
    reader: &mut R,
    buffer: &mut FrameBuffer,
    mut parse: F,
) -> Result<Option<T>, CodecError>
where
    R: AsyncRead + Unpin,
    F: FnMut(&mut FrameBuffer) -> Result<Option<T>, CodecError>,
{
    loop {
        if let Some(parsed) = parse(buffer)? {
            return Ok(Some(parsed));
        }

        if 0 == reader.read_buf(&mut buffer.buffer).await? {
            return if buffer.buffer.is_empty() {
                Ok(None)
            } else {
                Err(CodecError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "connection reset by peer mid-frame",
                )))
            };
        }
    }
}

/// Buffered, framed connection over a generic async transport.
///
/// Reads accumulate in an internal buffer until a complete PDU is present,
/// mirroring how a `BufReader` works but tailored to SMPP's
/// length-prefixed framing. Writes go through a `BufWriter` and are flushed
/// per-frame so peers see each PDU promptly.
pub struct Connection<S> {
    stream: BufWriter<S>,
    framing: FrameBuffer,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Connection<S> {
    pub fn new(socket: S) -> Self {
        Self {
            stream: BufWriter::new(socket),
            framing: FrameBuffer::new(),
        }
    }

    /// Read the next frame from the stream, decoding it against the
    /// standard PDU registry. Returns `Ok(None)` on a clean EOF with no
    /// partial data buffered.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, CodecError> {
        fill_and_parse(&mut self.stream, &mut self.framing, FrameBuffer::try_parse_frame).await
    }

    /// Read the next frame, but separate framing failures (which demand a
    /// close) from PDU-level decode failures (which should be answered
    /// with a GenericNack on an otherwise healthy connection).
    pub async fn read_raw_frame(
        &mut self,
    ) -> Result<Option<Result<Frame, MalformedPdu>>, CodecError> {
        fill_and_parse(&mut self.stream, &mut self.framing, FrameBuffer::try_parse_raw_frame).await
    }

    /// Write a frame to the stream and flush immediately.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<(), CodecError> {
        let bytes = encode_frame(frame)?;
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Split the connection into independent [`FrameReader`]/[`FrameWriter`]
    /// halves for use by separate reader/writer tasks. Consumes `self`
    /// since the framing buffer and registry are not meaningfully shared
    /// once split; call this immediately after construction, before any
    /// partial reads have accumulated.
    pub fn into_split(self) -> (FrameReader<tokio::io::ReadHalf<S>>, FrameWriter<tokio::io::WriteHalf<S>>)
    where
        S: Sized,
    {
        let (read_half, write_half) = tokio::io::split(self.stream.into_inner());
        (
            FrameReader {
                reader: read_half,
                framing: self.framing,
            },
            FrameWriter {
                writer: BufWriter::new(write_half),
            },
        )
    }
}

/// The read half of a split [`Connection`], owned by a dedicated reader
/// task.
pub struct FrameReader<R> {
    reader: R,
    framing: FrameBuffer,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, CodecError> {
        fill_and_parse(&mut self.reader, &mut self.framing, FrameBuffer::try_parse_frame).await
    }

    pub async fn read_raw_frame(
        &mut self,
    ) -> Result<Option<Result<Frame, MalformedPdu>>, CodecError> {
        fill_and_parse(&mut self.reader, &mut self.framing, FrameBuffer::try_parse_raw_frame).await
    }
}

/// The write half of a split [`Connection`], shared by the writer task
/// that serializes all outbound frames for a session.
pub struct FrameWriter<W> {
    writer: BufWriter<W>,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<(), CodecError> {
        let bytes = encode_frame(frame)?;
        self.writer.write_all(&bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

/// Encode any typed, non-`Unknown` frame to its wire bytes.
pub fn encode_frame(frame: &Frame) -> Result<Bytes, CodecError> {
    Ok(match frame {
        Frame::EnquireLink(pdu) => pdu.to_bytes(),
        Frame::EnquireLinkResp(pdu) => pdu.to_bytes(),
        Frame::Unbind(pdu) => pdu.to_bytes(),
        Frame::UnbindResp(pdu) => pdu.to_bytes(),
        Frame::BindReceiver(pdu) => pdu.to_bytes(),
        Frame::BindReceiverResp(pdu) => pdu.to_bytes(),
        Frame::BindTransceiver(pdu) => pdu.to_bytes(),
        Frame::BindTransceiverResp(pdu) => pdu.to_bytes(),
        Frame::BindTransmitter(pdu) => pdu.to_bytes(),
        Frame::BindTransmitterResp(pdu) => pdu.to_bytes(),
        Frame::SubmitSm(pdu) => pdu.to_bytes(),
        Frame::SubmitSmResp(pdu) => pdu.to_bytes(),
        Frame::SubmitMulti(pdu) => pdu.to_bytes(),
        Frame::SubmitMultiResp(pdu) => pdu.to_bytes(),
        Frame::QuerySm(pdu) => pdu.to_bytes(),
        Frame::QuerySmResp(pdu) => pdu.to_bytes(),
        Frame::ReplaceSm(pdu) => pdu.to_bytes(),
        Frame::ReplaceSmResp(pdu) => pdu.to_bytes(),
        Frame::CancelSm(pdu) => pdu.to_bytes(),
        Frame::CancelSmResp(pdu) => pdu.to_bytes(),
        Frame::DataSm(pdu) => pdu.to_bytes(),
        Frame::DataSmResp(pdu) => pdu.to_bytes(),
        Frame::DeliverSm(pdu) => pdu.to_bytes(),
        Frame::DeliverSmResp(pdu) => pdu.to_bytes(),
        Frame::AlertNotification(pdu) => pdu.to_bytes(),
        Frame::GenericNack(pdu) => pdu.to_bytes(),
        Frame::Outbind(pdu) => pdu.to_bytes(),
        Frame::Unknown { .. } => {
            return Err(CodecError::FieldValidation {
                field: "frame",
                reason: "cannot encode an Unknown frame".to_string(),
            });
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::{EnquireLink, EnquireLinkResponse};
    use tokio::io::duplex;

    #[tokio::test]
    async fn round_trips_a_frame_through_a_duplex_stream() {
        let (client, server) = duplex(4096);
        let mut client = Connection::new(client);
        let mut server = Connection::new(server);

        let enquire = EnquireLink::new(7);
        client
            .write_frame(&Frame::EnquireLink(enquire.clone()))
            .await
            .unwrap();

        let received = server.read_frame().await.unwrap().unwrap();
        match received {
            Frame::EnquireLink(pdu) => assert_eq!(pdu.sequence_number, 7),
            other => panic!("unexpected frame: {other:?}"),
        }

        let resp = EnquireLinkResponse::new(7);
        server
            .write_frame(&Frame::EnquireLinkResp(resp))
            .await
            .unwrap();
        let received = client.read_frame().await.unwrap().unwrap();
        assert!(matches!(received, Frame::EnquireLinkResp(_)));
    }

    #[tokio::test]
    async fn read_frame_returns_none_on_clean_eof() {
        let (client, server) = duplex(64);
        drop(client);
        let mut server = Connection::new(server);
        assert!(server.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn read_raw_frame_reports_malformed_pdu_without_closing() {
        let (mut client, server) = duplex(4096);
        let mut server = Connection::new(server);

        // command_length=16, command_id=0xFFFF0000 (unregistered/invalid),
        // command_status=0, sequence_number=42.
        let mut bad = BytesMut::new();
        bad.extend_from_slice(&16u32.to_be_bytes());
        bad.extend_from_slice(&0xFFFF_0000u32.to_be_bytes());
        bad.extend_from_slice(&0u32.to_be_bytes());
        bad.extend_from_slice(&42u32.to_be_bytes());
        client.write_all(&bad).await.unwrap();

        let outcome = server.read_raw_frame().await.unwrap().unwrap();
        let err = outcome.expect_err("expected a malformed PDU");
        assert_eq!(err.sequence_number, 42);
    }

    #[tokio::test]
    async fn split_halves_round_trip_independently() {
        let (client, server) = duplex(4096);
        let (mut client_reader, mut client_writer) = Connection::new(client).into_split();
        let (mut server_reader, mut server_writer) = Connection::new(server).into_split();

        client_writer
            .write_frame(&Frame::EnquireLink(EnquireLink::new(3)))
            .await
            .unwrap();
        let received = server_reader.read_frame().await.unwrap().unwrap();
        assert_eq!(received.sequence_number(), 3);

        server_writer
            .write_frame(&Frame::EnquireLinkResp(EnquireLinkResponse::new(3)))
            .await
            .unwrap();
        let received = client_reader.read_frame().await.unwrap().unwrap();
        assert!(matches!(received, Frame::EnquireLinkResp(_)));
    }
}
