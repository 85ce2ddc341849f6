//! Embedding blob codec: fixed-width little-endian float32.

/// Encode a vector as a `4 * len` byte little-endian blob.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
  let mut blob = Vec::with_capacity(vec.len() * 4);
  for value in vec {
    blob.extend_from_slice(&value.to_le_bytes());
  }
  blob
}

/// Decode a blob back into float32 values. Returns None if the length is not
/// a multiple of four.
pub fn blob_to_vec(blob: &[u8]) -> Option<Vec<f32>> {
  if blob.len() % 4 != 0 {
    return None;
  }
  Some(
    blob
      .chunks_exact(4)
      .map(|bytes| f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
      .collect(),
  )
}
