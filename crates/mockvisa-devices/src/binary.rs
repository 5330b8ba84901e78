/*!
 * IEEE 488.2 definite-length binary blocks.
 *
 * A block is `#`, one digit giving the width of the length field, the length
 * in bytes, then the payload. Values are little-endian `f32`.
 */
use bytes::{BufMut, Bytes, BytesMut};

use mockvisa_core::error::{Error as CoreError, Result as CoreResult};

const VALUE_SIZE: usize = std::mem::size_of::<f32>();

/// Encode `values` as a definite-length block
pub fn to_ieee_block(values: &[f32]) -> Bytes {
    let length = (values.len() * VALUE_SIZE).to_string();
    let mut block = BytesMut::with_capacity(2 + length.len() + values.len() * VALUE_SIZE);
    block.put_u8(b'#');
    block.put_slice(length.len().to_string().as_bytes());
    block.put_slice(length.as_bytes());
    for value in values {
        block.put_f32_le(*value);
    }
    block.freeze()
}

/// Decode a definite-length block of little-endian `f32`.
///
/// Text before the `#` and bytes after the payload, such as a trailing
/// newline, are ignored.
pub fn from_ieee_block(data: &[u8]) -> CoreResult<Vec<f32>> {
    let start = data
        .iter()
        .position(|&b| b == b'#')
        .ok_or_else(|| CoreError::argument("binary block has no '#' header"))?;
    let header = &data[start + 1..];

    let width = header
        .first()
        .and_then(|b| char::from(*b).to_digit(10))
        .ok_or_else(|| CoreError::argument("binary block header has no length width"))?
        as usize;
    if width == 0 {
        return Err(CoreError::argument("indefinite-length blocks are not supported"));
    }

    let length: usize = header
        .get(1..1 + width)
        .and_then(|digits| std::str::from_utf8(digits).ok())
        .and_then(|digits| digits.parse().ok())
        .ok_or_else(|| CoreError::argument("binary block length is malformed"))?;
    let payload = header
        .get(1 + width..1 + width + length)
        .ok_or_else(|| {
            CoreError::argument(format!("binary block announces {} bytes but is shorter", length))
        })?;
    if length % VALUE_SIZE != 0 {
        return Err(CoreError::argument(format!(
            "binary block length {} is not a multiple of {}",
            length, VALUE_SIZE
        )));
    }

    Ok(payload
        .chunks_exact(VALUE_SIZE)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}
