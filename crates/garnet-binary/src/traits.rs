use crate::error::BinaryError;
use crate::io::{BinaryReader, BinaryWriter};

/// Trait for types that can be read from a `BinaryReader`.
pub trait Readable: Sized {
    /// Reads an instance of `Self` from the reader.
    fn read(reader: &mut BinaryReader) -> Result<Self, BinaryError>;
}

/// Trait for types that can be written to a `BinaryWriter`.
pub trait Writable {
    /// Writes this instance to the writer.
    fn write(&self, writer: &mut BinaryWriter) -> Result<(), BinaryError>;
}

// Primitive impls use the little-endian accessors; multi-byte wire fields in
// this workspace are little-endian.
macro_rules! impl_primitive {
    ($($ty:ty => $read:ident, $write:ident),*) => {
        $(
            impl Readable for $ty {
                #[inline]
                fn read(reader: &mut BinaryReader) -> Result<Self, BinaryError> {
                    reader.$read()
                }
            }

            impl Writable for $ty {
                #[inline]
                fn write(&self, writer: &mut BinaryWriter) -> Result<(), BinaryError> {
                    writer.$write(*self)
                }
            }
        )*
    };
}

impl_primitive! {
    u8 => read_u8, write_u8,
    u16 => read_u16_le, write_u16_le,
    u32 => read_u32_le, write_u32_le
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_roundtrip() {
        let mut writer = BinaryWriter::new();
        42u8.write(&mut writer).unwrap();
        512u16.write(&mut writer).unwrap();
        70_000u32.write(&mut writer).unwrap();

        let mut reader = BinaryReader::new(writer.freeze());
        assert_eq!(u8::read(&mut reader).unwrap(), 42);
        assert_eq!(u16::read(&mut reader).unwrap(), 512);
        assert_eq!(u32::read(&mut reader).unwrap(), 70_000);
    }
}
