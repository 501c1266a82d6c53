use crate::buffer::ImageBuffer;
use crate::error::{CographError, Result};
use crate::schema::{ValueHeaderRecord, ValueKind, VALUE_HEADER_SIZE};

/// Borrow-scoped view over a value header plus its payload bytes. Typed
/// readers verify the kind before decoding; `try_as_*` forms turn a
/// mismatch into an absent result.
#[derive(Debug, Copy, Clone)]
pub struct Value<'a> {
    kind: ValueKind,
    payload: &'a [u8],
}

impl<'a> Value<'a> {
    pub(crate) fn read(buffer: &'a ImageBuffer, offset: u32) -> Result<Self> {
        let header: ValueHeaderRecord = buffer.read(offset)?;
        let payload_offset = offset.checked_add(VALUE_HEADER_SIZE as u32).ok_or_else(|| {
            CographError::OutOfRange(format!("value payload at {offset} overflows"))
        })?;
        let payload = buffer.slice(payload_offset, header.byte_length as usize)?;
        Ok(Self {
            kind: header.kind,
            payload,
        })
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    fn expect_kind(&self, kind: ValueKind) -> Result<()> {
        if self.kind != kind {
            return Err(CographError::TypeMismatch {
                expected: kind.name(),
                found: self.kind.name(),
            });
        }
        Ok(())
    }

    fn fixed_payload<const N: usize>(&self, kind: ValueKind) -> Result<[u8; N]> {
        self.expect_kind(kind)?;
        self.payload.try_into().map_err(|_| {
            CographError::Truncated(format!(
                "{} payload has {} bytes, expected {N}",
                kind.name(),
                self.payload.len()
            ))
        })
    }

    pub fn as_str(&self) -> Result<&'a str> {
        self.expect_kind(ValueKind::String)?;
        std::str::from_utf8(self.payload).map_err(|_| CographError::InvalidUtf8(0))
    }

    pub fn as_i32(&self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.fixed_payload(ValueKind::I32)?))
    }

    pub fn as_u32(&self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.fixed_payload(ValueKind::U32)?))
    }

    pub fn as_i64(&self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.fixed_payload(ValueKind::I64)?))
    }

    pub fn as_u64(&self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.fixed_payload(ValueKind::U64)?))
    }

    pub fn as_f32(&self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.fixed_payload(ValueKind::F32)?))
    }

    pub fn as_f64(&self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.fixed_payload(ValueKind::F64)?))
    }

    pub fn as_bool(&self) -> Result<bool> {
        let [byte] = self.fixed_payload::<1>(ValueKind::Bool)?;
        match byte {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CographError::InvalidArgument(format!(
                "invalid boolean encoding {other}"
            ))),
        }
    }

    pub fn as_bytes(&self) -> Result<&'a [u8]> {
        self.expect_kind(ValueKind::Bytes)?;
        Ok(self.payload)
    }

    pub fn try_as_str(&self) -> Option<&'a str> {
        self.as_str().ok()
    }

    pub fn try_as_i32(&self) -> Option<i32> {
        self.as_i32().ok()
    }

    pub fn try_as_u32(&self) -> Option<u32> {
        self.as_u32().ok()
    }

    pub fn try_as_i64(&self) -> Option<i64> {
        self.as_i64().ok()
    }

    pub fn try_as_u64(&self) -> Option<u64> {
        self.as_u64().ok()
    }

    pub fn try_as_f32(&self) -> Option<f32> {
        self.as_f32().ok()
    }

    pub fn try_as_f64(&self) -> Option<f64> {
        self.as_f64().ok()
    }

    pub fn try_as_bool(&self) -> Option<bool> {
        self.as_bool().ok()
    }

    pub fn try_as_bytes(&self) -> Option<&'a [u8]> {
        self.as_bytes().ok()
    }

    /// Copies the value out of the image.
    pub fn to_owned(&self) -> Result<OwnedPropValue> {
        Ok(match self.kind {
            ValueKind::String => OwnedPropValue::Str(self.as_str()?.to_owned()),
            ValueKind::I32 => OwnedPropValue::I32(self.as_i32()?),
            ValueKind::U32 => OwnedPropValue::U32(self.as_u32()?),
            ValueKind::I64 => OwnedPropValue::I64(self.as_i64()?),
            ValueKind::U64 => OwnedPropValue::U64(self.as_u64()?),
            ValueKind::F32 => OwnedPropValue::F32(self.as_f32()?),
            ValueKind::F64 => OwnedPropValue::F64(self.as_f64()?),
            ValueKind::Bool => OwnedPropValue::Bool(self.as_bool()?),
            ValueKind::Bytes => OwnedPropValue::Bytes(self.as_bytes()?.to_vec()),
        })
    }
}

/// Borrowed property value handed to the builder.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum PropValue<'a> {
    Str(&'a str),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Bool(bool),
    Bytes(&'a [u8]),
}

impl PropValue<'_> {
    pub fn kind(&self) -> ValueKind {
        match self {
            PropValue::Str(_) => ValueKind::String,
            PropValue::I32(_) => ValueKind::I32,
            PropValue::U32(_) => ValueKind::U32,
            PropValue::I64(_) => ValueKind::I64,
            PropValue::U64(_) => ValueKind::U64,
            PropValue::F32(_) => ValueKind::F32,
            PropValue::F64(_) => ValueKind::F64,
            PropValue::Bool(_) => ValueKind::Bool,
            PropValue::Bytes(_) => ValueKind::Bytes,
        }
    }

    pub(crate) fn append_payload(&self, out: &mut Vec<u8>) {
        match self {
            PropValue::Str(s) => out.extend_from_slice(s.as_bytes()),
            PropValue::I32(v) => out.extend_from_slice(&v.to_le_bytes()),
            PropValue::U32(v) => out.extend_from_slice(&v.to_le_bytes()),
            PropValue::I64(v) => out.extend_from_slice(&v.to_le_bytes()),
            PropValue::U64(v) => out.extend_from_slice(&v.to_le_bytes()),
            PropValue::F32(v) => out.extend_from_slice(&v.to_le_bytes()),
            PropValue::F64(v) => out.extend_from_slice(&v.to_le_bytes()),
            PropValue::Bool(v) => out.push(u8::from(*v)),
            PropValue::Bytes(b) => out.extend_from_slice(b),
        }
    }
}

/// Owning counterpart of [`PropValue`], used where values outlive the
/// borrow they were read from (the editor's queued operations).
#[derive(Debug, Clone, PartialEq)]
pub enum OwnedPropValue {
    Str(String),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Bool(bool),
    Bytes(Vec<u8>),
}

impl OwnedPropValue {
    pub fn as_ref(&self) -> PropValue<'_> {
        match self {
            OwnedPropValue::Str(s) => PropValue::Str(s),
            OwnedPropValue::I32(v) => PropValue::I32(*v),
            OwnedPropValue::U32(v) => PropValue::U32(*v),
            OwnedPropValue::I64(v) => PropValue::I64(*v),
            OwnedPropValue::U64(v) => PropValue::U64(*v),
            OwnedPropValue::F32(v) => PropValue::F32(*v),
            OwnedPropValue::F64(v) => PropValue::F64(*v),
            OwnedPropValue::Bool(v) => PropValue::Bool(*v),
            OwnedPropValue::Bytes(b) => PropValue::Bytes(b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value_of(kind: ValueKind, payload: &[u8]) -> Value<'_> {
        Value { kind, payload }
    }

    #[test]
    fn typed_reads_verify_kind() {
        let bytes = 42i32.to_le_bytes();
        let value = value_of(ValueKind::I32, &bytes);
        assert_eq!(value.as_i32().expect("i32"), 42);
        let err = value.as_str().unwrap_err();
        assert!(matches!(
            err,
            CographError::TypeMismatch {
                expected: "string",
                found: "i32",
            }
        ));
        assert!(value.try_as_str().is_none());
        assert_eq!(value.try_as_i32(), Some(42));
    }

    #[test]
    fn every_kind_round_trips_through_payload() {
        let cases: Vec<(PropValue<'_>, ValueKind)> = vec![
            (PropValue::Str("hello"), ValueKind::String),
            (PropValue::I32(-7), ValueKind::I32),
            (PropValue::U32(7), ValueKind::U32),
            (PropValue::I64(-1 << 40), ValueKind::I64),
            (PropValue::U64(1 << 40), ValueKind::U64),
            (PropValue::F32(2.5), ValueKind::F32),
            (PropValue::F64(3.14159), ValueKind::F64),
            (PropValue::Bool(true), ValueKind::Bool),
            (PropValue::Bytes(&[1, 2, 3]), ValueKind::Bytes),
        ];
        for (input, kind) in cases {
            assert_eq!(input.kind(), kind);
            let mut payload = Vec::new();
            input.append_payload(&mut payload);
            let view = value_of(kind, &payload);
            match input {
                PropValue::Str(s) => assert_eq!(view.as_str().expect("str"), s),
                PropValue::I32(v) => assert_eq!(view.as_i32().expect("i32"), v),
                PropValue::U32(v) => assert_eq!(view.as_u32().expect("u32"), v),
                PropValue::I64(v) => assert_eq!(view.as_i64().expect("i64"), v),
                PropValue::U64(v) => assert_eq!(view.as_u64().expect("u64"), v),
                PropValue::F32(v) => assert_eq!(view.as_f32().expect("f32"), v),
                PropValue::F64(v) => assert_eq!(view.as_f64().expect("f64"), v),
                PropValue::Bool(v) => assert_eq!(view.as_bool().expect("bool"), v),
                PropValue::Bytes(b) => assert_eq!(view.as_bytes().expect("bytes"), b),
            }
        }
    }

    #[test]
    fn short_numeric_payload_is_truncated() {
        let value = value_of(ValueKind::F64, &[0u8; 4]);
        assert!(matches!(
            value.as_f64(),
            Err(CographError::Truncated(_))
        ));
    }

    #[test]
    fn invalid_boolean_byte() {
        let value = value_of(ValueKind::Bool, &[2]);
        assert!(matches!(
            value.as_bool(),
            Err(CographError::InvalidArgument(_))
        ));
        assert!(value.try_as_bool().is_none());
    }

    #[test]
    fn owned_conversion_preserves_payload() {
        let value = value_of(ValueKind::String, b"forest");
        let owned = value.to_owned().expect("owned");
        assert_eq!(owned, OwnedPropValue::Str("forest".into()));
        assert_eq!(owned.as_ref(), PropValue::Str("forest"));
    }
}
