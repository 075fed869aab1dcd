//! Fixed-width sample types carried through the bridge.

#![forbid(unsafe_code)]

use std::fmt::Debug;

/// A fixed-width integer sample as delivered by a hardware FIFO.
///
/// The bridge never interprets sample values. The only structure it relies
/// on is the width, which fixes the on-disk layout of a file sink.
pub trait Element: Copy + Default + Debug + PartialEq + Send + Sync + 'static {
    /// Width of one element in bytes.
    const WIDTH: usize;

    /// Appends the little-endian encoding of `self` to `out`.
    fn write_le(self, out: &mut Vec<u8>);

    /// Decodes one element from the first `Self::WIDTH` little-endian bytes.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is shorter than `Self::WIDTH`.
    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_element {
    ($($t:ty),* $(,)?) => {
        $(
            impl Element for $t {
                const WIDTH: usize = std::mem::size_of::<$t>();

                #[inline]
                fn write_le(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }

                #[inline]
                fn read_le(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$t>()];
                    raw.copy_from_slice(&bytes[..Self::WIDTH]);
                    <$t>::from_le_bytes(raw)
                }
            }
        )*
    };
}

impl_element!(u8, u16, u32, u64, i8, i16, i32, i64);

/// Encodes a batch of elements into a flat little-endian byte vector.
pub fn encode_batch<T: Element>(batch: &[T]) -> Vec<u8> {
    let mut out = Vec::with_capacity(batch.len() * T::WIDTH);
    for &item in batch {
        item.write_le(&mut out);
    }
    out
}
