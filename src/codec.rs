use std::io;

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Width of the length prefix: one pointer-sized unsigned integer in the
/// platform's native byte order. Cameras must size the prefix identically or
/// framing breaks.
pub const PREFIX_LEN: usize = std::mem::size_of::<usize>();

/// Sanity bound for a single payload. A prefix above this is treated as a
/// corrupt stream rather than an allocation request.
pub const MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;

/// Codec for the camera wire protocol: `[length][payload]`, repeated, with no
/// handshake or acknowledgment. Partial reads leave the buffer untouched;
/// surplus bytes after a payload stay buffered as the start of the next
/// message.
#[derive(Debug, Default)]
pub struct FrameCodec;

impl FrameCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<Bytes>> {
        if src.len() < PREFIX_LEN {
            return Ok(None);
        }

        let mut prefix = [0u8; PREFIX_LEN];
        prefix.copy_from_slice(&src[..PREFIX_LEN]);
        let payload_len = usize::from_ne_bytes(prefix);

        if payload_len > MAX_PAYLOAD_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("declared payload of {payload_len} bytes exceeds the {MAX_PAYLOAD_LEN} byte limit"),
            ));
        }

        if src.len() < PREFIX_LEN + payload_len {
            src.reserve(PREFIX_LEN + payload_len - src.len());
            return Ok(None);
        }

        src.advance(PREFIX_LEN);
        Ok(Some(src.split_to(payload_len).freeze()))
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, payload: Bytes, dst: &mut BytesMut) -> io::Result<()> {
        dst.reserve(PREFIX_LEN + payload.len());
        dst.extend_from_slice(&payload.len().to_ne_bytes());
        dst.extend_from_slice(&payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(payload: &[u8]) -> Vec<u8> {
        let mut wire = payload.len().to_ne_bytes().to_vec();
        wire.extend_from_slice(payload);
        wire
    }

    #[test]
    fn waits_for_a_complete_prefix() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&message(b"hello")[..PREFIX_LEN - 1]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), PREFIX_LEN - 1);
    }

    #[test]
    fn waits_for_a_complete_payload() {
        let mut codec = FrameCodec::new();
        let wire = message(b"hello");
        let mut buf = BytesMut::from(&wire[..wire.len() - 2]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        // the prefix must not have been consumed by the partial read
        assert_eq!(buf.len(), wire.len() - 2);
    }

    #[test]
    fn decodes_a_single_message() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&message(b"hello")[..]);
        let payload = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&payload[..], b"hello");
        assert!(buf.is_empty());
    }

    #[test]
    fn framing_is_independent_of_segmentation() {
        let payloads: Vec<Vec<u8>> = vec![
            b"alpha".to_vec(),
            vec![0xAB; 1000],
            Vec::new(),
            b"tail".to_vec(),
        ];
        let wire: Vec<u8> = payloads.iter().flat_map(|p| message(p)).collect();

        for chunk_size in [1, 2, 3, 7, 16, 1024] {
            let mut codec = FrameCodec::new();
            let mut buf = BytesMut::new();
            let mut decoded = Vec::new();
            for chunk in wire.chunks(chunk_size) {
                buf.extend_from_slice(chunk);
                while let Some(payload) = codec.decode(&mut buf).unwrap() {
                    decoded.push(payload.to_vec());
                }
            }
            assert_eq!(decoded, payloads, "chunk size {chunk_size}");
        }
    }

    #[test]
    fn retains_surplus_bytes_for_the_next_message() {
        let mut codec = FrameCodec::new();
        let second = message(b"second");
        let mut wire = message(b"first");
        wire.extend_from_slice(&second[..3]);

        let mut buf = BytesMut::from(&wire[..]);
        assert_eq!(&codec.decode(&mut buf).unwrap().unwrap()[..], b"first");
        assert_eq!(buf.len(), 3);

        buf.extend_from_slice(&second[3..]);
        assert_eq!(&codec.decode(&mut buf).unwrap().unwrap()[..], b"second");
    }

    #[test]
    fn rejects_an_oversized_length_prefix() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&usize::MAX.to_ne_bytes()[..]);
        let err = codec.decode(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn eof_mid_message_is_an_error() {
        let mut codec = FrameCodec::new();
        let wire = message(b"cut short");
        let mut buf = BytesMut::from(&wire[..wire.len() - 1]);
        assert!(codec.decode_eof(&mut buf).is_err());
    }

    #[test]
    fn encoder_output_decodes_back() {
        let mut codec = FrameCodec::new();
        let mut wire = BytesMut::new();
        codec.encode(Bytes::from_static(b"ping"), &mut wire).unwrap();
        codec.encode(Bytes::from_static(b"pong"), &mut wire).unwrap();

        assert_eq!(&codec.decode(&mut wire).unwrap().unwrap()[..], b"ping");
        assert_eq!(&codec.decode(&mut wire).unwrap().unwrap()[..], b"pong");
        assert!(wire.is_empty());
    }
}
