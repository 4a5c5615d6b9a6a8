use std::cmp::Ordering;
use std::fmt;

/// A fixed-width key that can be stored in a B+Tree page.
pub trait IndexKey: Copy + Send + Sync + fmt::Debug + 'static {
    /// Encoded width in bytes
    const SIZE: usize;

    fn encode(&self, buf: &mut [u8]);

    fn decode(buf: &[u8]) -> Self;
}

impl IndexKey for u32 {
    const SIZE: usize = 4;

    fn encode(&self, buf: &mut [u8]) {
        buf[..4].copy_from_slice(&self.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])
    }
}

impl IndexKey for i64 {
    const SIZE: usize = 8;

    fn encode(&self, buf: &mut [u8]) {
        buf[..8].copy_from_slice(&self.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&buf[..8]);
        i64::from_le_bytes(bytes)
    }
}

/// An opaque N-byte key.
///
/// Ordering is decided by the comparator the tree is built with; the derived
/// `Ord` is plain byte order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GenericKey<const N: usize> {
    data: [u8; N],
}

impl<const N: usize> GenericKey<N> {
    pub fn new(data: [u8; N]) -> Self {
        Self { data }
    }

    /// Copies `bytes` into a zero-padded key, truncating past `N`.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut data = [0u8; N];
        let len = bytes.len().min(N);
        data[..len].copy_from_slice(&bytes[..len]);
        Self { data }
    }

    /// Stores `value` little-endian in the leading bytes.
    pub fn from_integer(value: i64) -> Self {
        Self::from_bytes(&value.to_le_bytes())
    }

    /// Reads the leading bytes back as a little-endian integer.
    pub fn as_integer(&self) -> i64 {
        let mut bytes = [0u8; 8];
        let len = N.min(8);
        bytes[..len].copy_from_slice(&self.data[..len]);
        i64::from_le_bytes(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; N] {
        &self.data
    }
}

impl<const N: usize> Default for GenericKey<N> {
    fn default() -> Self {
        Self { data: [0u8; N] }
    }
}

impl<const N: usize> fmt::Debug for GenericKey<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if N >= 8 {
            write!(f, "{}", self.as_integer())
        } else {
            write!(f, "{:?}", &self.data[..])
        }
    }
}

impl<const N: usize> IndexKey for GenericKey<N> {
    const SIZE: usize = N;

    fn encode(&self, buf: &mut [u8]) {
        buf[..N].copy_from_slice(&self.data);
    }

    fn decode(buf: &[u8]) -> Self {
        Self::from_bytes(&buf[..N])
    }
}

pub trait KeyComparator<K>: Send + Sync {
    fn compare(&self, a: &K, b: &K) -> Ordering;
}

/// Orders keys by their `Ord` implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NaturalComparator;

impl<K: Ord> KeyComparator<K> for NaturalComparator {
    fn compare(&self, a: &K, b: &K) -> Ordering {
        a.cmp(b)
    }
}

/// Orders generic keys by the signed integer in their leading bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegerComparator;

impl<const N: usize> KeyComparator<GenericKey<N>> for IntegerComparator {
    fn compare(&self, a: &GenericKey<N>, b: &GenericKey<N>) -> Ordering {
        a.as_integer().cmp(&b.as_integer())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BytewiseComparator;

impl<const N: usize> KeyComparator<GenericKey<N>> for BytewiseComparator {
    fn compare(&self, a: &GenericKey<N>, b: &GenericKey<N>) -> Ordering {
        a.as_bytes().cmp(b.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_keys_encode() {
        let mut buf = [0u8; 8];
        7u32.encode(&mut buf);
        assert_eq!(u32::decode(&buf), 7);

        (-42i64).encode(&mut buf);
        assert_eq!(i64::decode(&buf), -42);
    }

    #[test]
    fn test_integer_comparator_orders_negatives() {
        let a = GenericKey::<8>::from_integer(-1);
        let b = GenericKey::<8>::from_integer(1);

        assert_eq!(IntegerComparator.compare(&a, &b), Ordering::Less);
        // Two's complement puts -1 after 1 in byte order
        assert_eq!(BytewiseComparator.compare(&a, &b), Ordering::Greater);
    }

    #[test]
    fn test_generic_key_padding() {
        let key = GenericKey::<16>::from_bytes(b"abc");
        assert_eq!(&key.as_bytes()[..4], b"abc\0");

        let mut buf = [0u8; 16];
        key.encode(&mut buf);
        assert_eq!(GenericKey::<16>::decode(&buf), key);
    }

    #[test]
    fn test_natural_comparator() {
        assert_eq!(NaturalComparator.compare(&3u32, &3u32), Ordering::Equal);
        assert_eq!(NaturalComparator.compare(&-5i64, &2i64), Ordering::Less);
    }
}
