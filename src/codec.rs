//! Blob codecs.
//!
//! Both sides of a cache key must use the same codec, and the codec must be deterministic: equal values encode to
//! equal bytes.

use std::any::type_name;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CodecError;
use crate::types::Record;

/// Codec of view blobs, see [`CatalogBuilder::codec`](crate::catalog::CatalogBuilder::codec).
pub type RecordsCodec = Arc<dyn Codec<[Record]>>;

/// The codec catalogs use unless told otherwise.
pub fn default_records_codec() -> RecordsCodec {
    Arc::new(PostcardCodec::<[Record]>::new())
}

/// Encodes borrowed values and decodes into their owned form, so a slice encodes to what a `Vec` decodes from.
pub trait Codec<T>: Send + Sync + 'static
where
    T: ToOwned + ?Sized,
{
    fn encode(&self, value: &T) -> Result<Vec<u8>, CodecError>;
    fn decode(&self, bytes: &[u8]) -> Result<T::Owned, CodecError>;
}

/// [`postcard`] based codec for any serde type.
pub struct PostcardCodec<T: ?Sized> {
    _marker: PhantomData<fn(&T)>,
}

impl<T: ?Sized> PostcardCodec<T> {
    pub fn new() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<T: ?Sized> Default for PostcardCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Codec<T> for PostcardCodec<T>
where
    T: Serialize + ToOwned + ?Sized + 'static,
    T::Owned: DeserializeOwned,
{
    fn encode(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        postcard::to_stdvec(value).map_err(|e| CodecError::Encode {
            what: type_name::<T>(),
            msg:  e.to_string(),
        })
    }

    fn decode(&self, bytes: &[u8]) -> Result<T::Owned, CodecError> {
        postcard::from_bytes(bytes).map_err(|e| CodecError::Decode {
            what: type_name::<T>(),
            msg:  e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_is_deterministic() {
        let codec = PostcardCodec::<Vec<Record>>::new();
        let records = vec![
            Record::item("Alpha", 10.0, "X").with_vendor("ACME"),
            Record::item("Bravo", 5.0, "X"),
        ];
        let copy = records.clone();
        assert_eq!(codec.encode(&records).unwrap(), codec.encode(&copy).unwrap());
    }

    #[test]
    fn slices_decode_as_vectors() {
        let records = vec![Record::item("Alpha", 10.0, "X"), Record::item("Bravo", 5.0, "X")];
        let bytes = PostcardCodec::<[Record]>::new().encode(&records[..1]).unwrap();
        let decoded: Vec<Record> = PostcardCodec::<Vec<Record>>::new().decode(&bytes).unwrap();
        assert_eq!(decoded, records[..1]);
    }

    #[test]
    fn garbage_does_not_decode() {
        let codec = PostcardCodec::<[Record]>::new();
        let err = codec.decode(&[0xff, 0xff, 0xff, 0xff, 0xff, 0x01]).unwrap_err();
        assert!(matches!(err, CodecError::Decode { .. }));
    }
}
