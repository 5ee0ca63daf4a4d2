//! Netstring framing: `<decimal length>:<payload>,`.

use {
    bytes::{Buf, BufMut, Bytes, BytesMut},
    tokio_util::codec::{Decoder, Encoder},
};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Length,
    Payload(usize),
}

/// Codec for a stream of netstrings with a bounded payload size.
#[derive(Debug, Clone)]
pub struct NetstringCodec {
    max_length: usize,
    state: State,
}

impl NetstringCodec {
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length,
            state: State::Length,
        }
    }

    /// Parse the length prefix, if all of it has arrived.
    fn decode_length(&self, src: &mut BytesMut) -> Result<Option<usize>> {
        let mut length: usize = 0;
        let mut colon = None;
        for (index, &byte) in src.iter().enumerate() {
            match byte {
                b'0'..=b'9' => {
                    length = length
                        .checked_mul(10)
                        .and_then(|l| l.checked_add(usize::from(byte - b'0')))
                        .ok_or(Error::NetstringLength)?;
                    if length > self.max_length {
                        return Err(Error::FrameTooLarge {
                            length,
                            max: self.max_length,
                        });
                    }
                },
                b':' if index > 0 => {
                    colon = Some(index);
                    break;
                },
                _ => return Err(Error::NetstringLength),
            }
        }
        let Some(index) = colon else {
            return Ok(None);
        };
        src.advance(index + 1);
        Ok(Some(length))
    }
}

fn put_frame(payload: &[u8], dst: &mut BytesMut) {
    let prefix = payload.len().to_string();
    dst.reserve(prefix.len() + payload.len() + 2);
    dst.put_slice(prefix.as_bytes());
    dst.put_u8(b':');
    dst.put_slice(payload);
    dst.put_u8(b',');
}

/// Frame `payload` as a single netstring.
pub fn frame(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::new();
    put_frame(payload, &mut buf);
    buf.freeze()
}

impl Decoder for NetstringCodec {
    type Error = Error;
    type Item = BytesMut;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<BytesMut>> {
        if self.state == State::Length {
            match self.decode_length(src)? {
                Some(length) => self.state = State::Payload(length),
                None => return Ok(None),
            }
        }
        let State::Payload(length) = self.state else {
            return Ok(None);
        };
        if src.len() <= length {
            src.reserve(length + 1 - src.len());
            return Ok(None);
        }
        if src[length] != b',' {
            return Err(Error::MissingTerminator);
        }
        let payload = src.split_to(length);
        src.advance(1);
        self.state = State::Length;
        Ok(Some(payload))
    }
}

impl Encoder<Bytes> for NetstringCodec {
    type Error = Error;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<()> {
        put_frame(&item, dst);
        Ok(())
    }
}
