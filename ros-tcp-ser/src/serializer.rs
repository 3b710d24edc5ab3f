//! ROS1 wire serializer writing directly into a buffer.

use byteorder::{ByteOrder, LittleEndian};
use serde::{Serialize, ser};

use crate::buffer::RosBuffer;
use crate::error::{Error, Result};

/// Serializer that appends the ROS1 encoding of a value to a buffer.
pub struct RosSerializer<'a, B: RosBuffer = Vec<u8>> {
    buffer: &'a mut B,
}

impl<'a, B: RosBuffer> RosSerializer<'a, B> {
    pub fn new(buffer: &'a mut B) -> Self {
        Self { buffer }
    }

    #[inline(always)]
    fn put_len(&mut self, len: usize) -> Result<()> {
        let len = u32::try_from(len).map_err(|_| Error::LengthOverflow(len))?;
        let mut buf = [0u8; 4];
        LittleEndian::write_u32(&mut buf, len);
        self.buffer.extend_from_slice(&buf);
        Ok(())
    }
}

macro_rules! put_le {
    ($self:ident, $write:ident, $v:expr, $n:expr) => {{
        let mut buf = [0u8; $n];
        LittleEndian::$write(&mut buf, $v);
        $self.buffer.extend_from_slice(&buf);
        Ok(())
    }};
}

/// Serialize to a new `Vec<u8>`.
pub fn to_vec<T>(value: &T) -> Result<Vec<u8>>
where
    T: ?Sized + Serialize,
{
    let mut buffer = Vec::with_capacity(64);
    let mut serializer = RosSerializer::new(&mut buffer);
    value.serialize(&mut serializer)?;
    Ok(buffer)
}

/// Serialize into any buffer implementing [`RosBuffer`], replacing its contents.
pub fn to_buffer<T, B>(value: &T, buffer: &mut B) -> Result<()>
where
    T: ?Sized + Serialize,
    B: RosBuffer,
{
    buffer.clear();
    let mut serializer = RosSerializer::new(buffer);
    value.serialize(&mut serializer)?;
    Ok(())
}

impl<B: RosBuffer> ser::Serializer for &mut RosSerializer<'_, B> {
    type Ok = ();
    type Error = Error;

    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Self;
    type SerializeStruct = Self;
    type SerializeStructVariant = Self;

    #[inline]
    fn serialize_bool(self, v: bool) -> Result<()> {
        self.buffer.push(u8::from(v));
        Ok(())
    }

    #[inline]
    fn serialize_u8(self, v: u8) -> Result<()> {
        self.buffer.push(v);
        Ok(())
    }

    #[inline]
    fn serialize_u16(self, v: u16) -> Result<()> {
        put_le!(self, write_u16, v, 2)
    }

    #[inline]
    fn serialize_u32(self, v: u32) -> Result<()> {
        put_le!(self, write_u32, v, 4)
    }

    #[inline]
    fn serialize_u64(self, v: u64) -> Result<()> {
        put_le!(self, write_u64, v, 8)
    }

    #[inline]
    fn serialize_i8(self, v: i8) -> Result<()> {
        self.buffer.push(v as u8);
        Ok(())
    }

    #[inline]
    fn serialize_i16(self, v: i16) -> Result<()> {
        put_le!(self, write_i16, v, 2)
    }

    #[inline]
    fn serialize_i32(self, v: i32) -> Result<()> {
        put_le!(self, write_i32, v, 4)
    }

    #[inline]
    fn serialize_i64(self, v: i64) -> Result<()> {
        put_le!(self, write_i64, v, 8)
    }

    #[inline]
    fn serialize_f32(self, v: f32) -> Result<()> {
        put_le!(self, write_f32, v, 4)
    }

    #[inline]
    fn serialize_f64(self, v: f64) -> Result<()> {
        put_le!(self, write_f64, v, 8)
    }

    /// ROS1 `char` is a single unsigned byte.
    #[inline]
    fn serialize_char(self, v: char) -> Result<()> {
        let code = v as u32;
        let byte = u8::try_from(code).map_err(|_| Error::InvalidChar(code))?;
        self.buffer.push(byte);
        Ok(())
    }

    #[inline]
    fn serialize_str(self, v: &str) -> Result<()> {
        self.put_len(v.len())?;
        self.buffer.extend_from_slice(v.as_bytes());
        Ok(())
    }

    #[inline]
    fn serialize_bytes(self, v: &[u8]) -> Result<()> {
        self.put_len(v.len())?;
        self.buffer.extend_from_slice(v);
        Ok(())
    }

    fn serialize_none(self) -> Result<()> {
        Err(Error::Unsupported("Option"))
    }

    fn serialize_some<T>(self, _value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        Err(Error::Unsupported("Option"))
    }

    #[inline]
    fn serialize_unit(self) -> Result<()> {
        Ok(())
    }

    #[inline]
    fn serialize_unit_struct(self, _name: &'static str) -> Result<()> {
        Ok(())
    }

    #[inline]
    fn serialize_unit_variant(
        self,
        _name: &'static str,
        variant_index: u32,
        _variant: &'static str,
    ) -> Result<()> {
        self.serialize_u32(variant_index)
    }

    #[inline]
    fn serialize_newtype_struct<T>(self, _name: &'static str, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(self)
    }

    #[inline]
    fn serialize_newtype_variant<T>(
        self,
        _name: &'static str,
        variant_index: u32,
        _variant: &'static str,
        value: &T,
    ) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        self.serialize_u32(variant_index)?;
        value.serialize(self)
    }

    #[inline]
    fn serialize_seq(self, len: Option<usize>) -> Result<Self::SerializeSeq> {
        let len = len.ok_or(Error::UnknownLength)?;
        self.put_len(len)?;
        Ok(self)
    }

    /// Fixed-size arrays carry no length prefix.
    #[inline]
    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple> {
        Ok(self)
    }

    #[inline]
    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct> {
        Ok(self)
    }

    #[inline]
    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        self.serialize_u32(variant_index)?;
        Ok(self)
    }

    #[inline]
    fn serialize_map(self, len: Option<usize>) -> Result<Self::SerializeMap> {
        let len = len.ok_or(Error::UnknownLength)?;
        self.put_len(len)?;
        Ok(self)
    }

    #[inline]
    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<Self::SerializeStruct> {
        Ok(self)
    }

    #[inline]
    fn serialize_struct_variant(
        self,
        _name: &'static str,
        variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant> {
        self.serialize_u32(variant_index)?;
        Ok(self)
    }

    fn is_human_readable(&self) -> bool {
        false
    }
}

impl<B: RosBuffer> ser::SerializeSeq for &mut RosSerializer<'_, B> {
    type Ok = ();
    type Error = Error;

    #[inline]
    fn serialize_element<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(&mut **self)
    }

    #[inline]
    fn end(self) -> Result<()> {
        Ok(())
    }
}

impl<B: RosBuffer> ser::SerializeTuple for &mut RosSerializer<'_, B> {
    type Ok = ();
    type Error = Error;

    #[inline]
    fn serialize_element<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(&mut **self)
    }

    #[inline]
    fn end(self) -> Result<()> {
        Ok(())
    }
}

impl<B: RosBuffer> ser::SerializeTupleStruct for &mut RosSerializer<'_, B> {
    type Ok = ();
    type Error = Error;

    #[inline]
    fn serialize_field<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(&mut **self)
    }

    #[inline]
    fn end(self) -> Result<()> {
        Ok(())
    }
}

impl<B: RosBuffer> ser::SerializeTupleVariant for &mut RosSerializer<'_, B> {
    type Ok = ();
    type Error = Error;

    #[inline]
    fn serialize_field<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(&mut **self)
    }

    #[inline]
    fn end(self) -> Result<()> {
        Ok(())
    }
}

impl<B: RosBuffer> ser::SerializeMap for &mut RosSerializer<'_, B> {
    type Ok = ();
    type Error = Error;

    #[inline]
    fn serialize_key<T>(&mut self, key: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        key.serialize(&mut **self)
    }

    #[inline]
    fn serialize_value<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(&mut **self)
    }

    #[inline]
    fn end(self) -> Result<()> {
        Ok(())
    }
}

impl<B: RosBuffer> ser::SerializeStruct for &mut RosSerializer<'_, B> {
    type Ok = ();
    type Error = Error;

    #[inline]
    fn serialize_field<T>(&mut self, _key: &'static str, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(&mut **self)
    }

    #[inline]
    fn end(self) -> Result<()> {
        Ok(())
    }
}

impl<B: RosBuffer> ser::SerializeStructVariant for &mut RosSerializer<'_, B> {
    type Ok = ();
    type Error = Error;

    #[inline]
    fn serialize_field<T>(&mut self, _key: &'static str, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(&mut **self)
    }

    #[inline]
    fn end(self) -> Result<()> {
        Ok(())
    }
}
