//! Serde adapters for arkworks curve types.
//!
//! Points and scalars travel as their canonical compressed `ark-serialize`
//! bytes inside CBOR byte strings. Intended for `#[serde(with = "...")]` on
//! message fields.

use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::{Affine, Scalar};

// Serializes any canonical-serializable value as a byte string.
fn serialize_canonical<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: CanonicalSerialize,
    S: Serializer,
{
    let mut buf = Vec::with_capacity(value.compressed_size());
    value
        .serialize_compressed(&mut buf)
        .map_err(serde::ser::Error::custom)?;
    serializer.serialize_bytes(&buf)
}

// Accepts byte strings as well as sequences of integers, so the adapters
// work with both binary and self-describing formats.
struct BytesVisitor;

impl<'de> Visitor<'de> for BytesVisitor {
    type Value = Vec<u8>;

    fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str("a byte string")
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
        Ok(v.to_vec())
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
        Ok(v)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut buf = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(byte) = seq.next_element::<u8>()? {
            buf.push(byte);
        }
        Ok(buf)
    }
}

fn deserialize_canonical<'de, T, D>(deserializer: D) -> Result<T, D::Error>
where
    T: CanonicalDeserialize,
    D: Deserializer<'de>,
{
    let bytes = deserializer.deserialize_byte_buf(BytesVisitor)?;
    T::deserialize_compressed(bytes.as_slice()).map_err(de::Error::custom)
}

/// Serde adapter for a single affine curve point.
pub mod affine {
    use super::*;

    /// Serializes a point as compressed canonical bytes.
    pub fn serialize<S: Serializer>(value: &Affine, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_canonical(value, serializer)
    }

    /// Deserializes a point from compressed canonical bytes.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Affine, D::Error> {
        deserialize_canonical(deserializer)
    }
}

/// Serde adapter for a single scalar field element.
pub mod scalar {
    use super::*;

    /// Serializes a scalar as compressed canonical bytes.
    pub fn serialize<S: Serializer>(value: &Scalar, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_canonical(value, serializer)
    }

    /// Deserializes a scalar from compressed canonical bytes.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Scalar, D::Error> {
        deserialize_canonical(deserializer)
    }
}

/// Serde adapter for a vector of affine curve points.
pub mod affine_vec {
    use super::*;

    struct SerPoint<'a>(&'a Affine);

    impl Serialize for SerPoint<'_> {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            serialize_canonical(self.0, serializer)
        }
    }

    struct DePoint(Affine);

    impl<'de> Deserialize<'de> for DePoint {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            deserialize_canonical(deserializer).map(DePoint)
        }
    }

    /// Serializes the points as a sequence of compressed canonical bytes.
    pub fn serialize<S: Serializer>(value: &[Affine], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(value.iter().map(SerPoint))
    }

    /// Deserializes a sequence of compressed canonical points.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Affine>, D::Error> {
        let points = Vec::<DePoint>::deserialize(deserializer)?;
        Ok(points.into_iter().map(|p| p.0).collect())
    }
}
