//! AMP box framing.
//!
//! ```text
//! repeat: [2B key_len][key][2B value_len][value]
//! end:    [2B 0x0000]
//! ```

use {
    bytes::{Buf, BufMut, BytesMut},
    tokio_util::codec::{Decoder, Encoder},
};

use crate::{
    AmpBox,
    boxes::{MAX_KEY_LENGTH, MAX_VALUE_LENGTH},
    error::{Error, Result},
};

/// Stateless codec for a stream of boxes.
#[derive(Debug, Clone, Copy, Default)]
pub struct AmpCodec;

fn read_u16(buf: &[u8], at: usize) -> usize {
    usize::from(u16::from_be_bytes([buf[at], buf[at + 1]]))
}

/// Check that every key and value of `amp_box` fits the wire format.
pub fn validate(amp_box: &AmpBox) -> Result<()> {
    for (key, value) in amp_box {
        if key.is_empty() {
            return Err(Error::malformed("empty key"));
        }
        if key.len() > MAX_KEY_LENGTH {
            return Err(Error::KeyTooLong {
                length: key.len(),
                max: MAX_KEY_LENGTH,
            });
        }
        if value.len() > MAX_VALUE_LENGTH {
            return Err(Error::ValueTooLong {
                key: key.clone(),
                length: value.len(),
                max: MAX_VALUE_LENGTH,
            });
        }
    }
    Ok(())
}

impl Decoder for AmpCodec {
    type Error = Error;
    type Item = AmpBox;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<AmpBox>> {
        // Find the terminator without consuming anything.
        let mut end = 0;
        loop {
            if src.len() < end + 2 {
                return Ok(None);
            }
            let key_len = read_u16(src, end);
            if key_len == 0 {
                break;
            }
            if key_len > MAX_KEY_LENGTH {
                return Err(Error::KeyTooLong {
                    length: key_len,
                    max: MAX_KEY_LENGTH,
                });
            }
            let value_at = end + 2 + key_len;
            if src.len() < value_at + 2 {
                return Ok(None);
            }
            end = value_at + 2 + read_u16(src, value_at);
        }

        let mut frame = src.split_to(end + 2).freeze();
        let mut amp_box = AmpBox::new();
        loop {
            let key_len = usize::from(frame.get_u16());
            if key_len == 0 {
                break;
            }
            let key = frame.split_to(key_len);
            let key = std::str::from_utf8(&key)
                .map_err(|_| Error::malformed("key is not valid UTF-8"))?
                .to_owned();
            let value_len = usize::from(frame.get_u16());
            amp_box.insert(key, frame.split_to(value_len));
        }
        Ok(Some(amp_box))
    }
}

impl Encoder<AmpBox> for AmpCodec {
    type Error = Error;

    fn encode(&mut self, item: AmpBox, dst: &mut BytesMut) -> Result<()> {
        validate(&item)?;
        let size: usize = item.iter().map(|(k, v)| 4 + k.len() + v.len()).sum();
        dst.reserve(size + 2);
        for (key, value) in &item {
            dst.put_u16(key.len() as u16);
            dst.put_slice(key.as_bytes());
            dst.put_u16(value.len() as u16);
            dst.put_slice(value);
        }
        dst.put_u16(0);
        Ok(())
    }
}
