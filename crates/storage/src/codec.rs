//! Page codec: typed reads/writes of scalars and length-prefixed strings at
//! explicit page offsets. All multi-byte integers are big-endian.

use common::{DbError, DbResult};

use crate::page::Page;

/// Strings up to 255 bytes, framed with a 1-byte length prefix.
pub const VARSTRING255_MAX: usize = 255;
/// Strings up to 65535 bytes, framed with a 2-byte length prefix.
pub const VARSTRING65535_MAX: usize = 65535;

fn check_bounds(data_len: usize, offset: usize, size: usize) -> DbResult<()> {
    if offset + size > data_len {
        return Err(DbError::InvalidFilePointer(format!(
            "offset {offset} + size {size} exceeds page length {data_len}"
        )));
    }
    Ok(())
}

impl Page {
    pub fn read_u8(&self, offset: usize) -> DbResult<u8> {
        check_bounds(self.data.len(), offset, 1)?;
        Ok(self.data[offset])
    }

    pub fn write_u8(&mut self, offset: usize, value: u8) -> DbResult<()> {
        check_bounds(self.data.len(), offset, 1)?;
        self.data[offset] = value;
        Ok(())
    }

    pub fn read_bool(&self, offset: usize) -> DbResult<bool> {
        Ok(self.read_u8(offset)? != 0)
    }

    pub fn write_bool(&mut self, offset: usize, value: bool) -> DbResult<()> {
        self.write_u8(offset, value as u8)
    }

    pub fn read_u16(&self, offset: usize) -> DbResult<u16> {
        check_bounds(self.data.len(), offset, 2)?;
        let bytes: [u8; 2] = self.data[offset..offset + 2].try_into().unwrap();
        Ok(u16::from_be_bytes(bytes))
    }

    pub fn write_u16(&mut self, offset: usize, value: u16) -> DbResult<()> {
        check_bounds(self.data.len(), offset, 2)?;
        self.data[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    pub fn read_u32(&self, offset: usize) -> DbResult<u32> {
        check_bounds(self.data.len(), offset, 4)?;
        let bytes: [u8; 4] = self.data[offset..offset + 4].try_into().unwrap();
        Ok(u32::from_be_bytes(bytes))
    }

    pub fn write_u32(&mut self, offset: usize, value: u32) -> DbResult<()> {
        check_bounds(self.data.len(), offset, 4)?;
        self.data[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    /// `char`, represented as a single UTF-8 scalar stored in 4 bytes.
    pub fn read_char(&self, offset: usize) -> DbResult<char> {
        let code = self.read_i32(offset)? as u32;
        char::from_u32(code)
            .ok_or_else(|| DbError::DataFormat(format!("invalid char code point {code}")))
    }

    pub fn write_char(&mut self, offset: usize, value: char) -> DbResult<()> {
        self.write_i32(offset, value as i32)
    }

    pub fn read_i32(&self, offset: usize) -> DbResult<i32> {
        check_bounds(self.data.len(), offset, 4)?;
        let bytes: [u8; 4] = self.data[offset..offset + 4].try_into().unwrap();
        Ok(i32::from_be_bytes(bytes))
    }

    pub fn write_i32(&mut self, offset: usize, value: i32) -> DbResult<()> {
        check_bounds(self.data.len(), offset, 4)?;
        self.data[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    pub fn read_i64(&self, offset: usize) -> DbResult<i64> {
        check_bounds(self.data.len(), offset, 8)?;
        let bytes: [u8; 8] = self.data[offset..offset + 8].try_into().unwrap();
        Ok(i64::from_be_bytes(bytes))
    }

    pub fn write_i64(&mut self, offset: usize, value: i64) -> DbResult<()> {
        check_bounds(self.data.len(), offset, 8)?;
        self.data[offset..offset + 8].copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    pub fn read_f32(&self, offset: usize) -> DbResult<f32> {
        Ok(f32::from_bits(self.read_i32(offset)? as u32))
    }

    pub fn write_f32(&mut self, offset: usize, value: f32) -> DbResult<()> {
        self.write_i32(offset, value.to_bits() as i32)
    }

    pub fn read_f64(&self, offset: usize) -> DbResult<f64> {
        Ok(f64::from_bits(self.read_i64(offset)? as u64))
    }

    pub fn write_f64(&mut self, offset: usize, value: f64) -> DbResult<()> {
        self.write_i64(offset, value.to_bits())
    }

    /// Length-prefixed ASCII string, 1-byte length, up to 255 bytes.
    pub fn read_varstring255(&self, offset: usize) -> DbResult<String> {
        let len = self.read_u8(offset)? as usize;
        check_bounds(self.data.len(), offset + 1, len)?;
        let bytes = &self.data[offset + 1..offset + 1 + len];
        decode_ascii(bytes)
    }

    pub fn write_varstring255(&mut self, offset: usize, value: &str) -> DbResult<usize> {
        if value.len() > VARSTRING255_MAX || !value.is_ascii() {
            return Err(DbError::TupleTooLarge(format!(
                "VARSTRING255 value must be ASCII and <= {VARSTRING255_MAX} bytes, got {}",
                value.len()
            )));
        }
        check_bounds(self.data.len(), offset, 1 + value.len())?;
        self.data[offset] = value.len() as u8;
        self.data[offset + 1..offset + 1 + value.len()].copy_from_slice(value.as_bytes());
        Ok(1 + value.len())
    }

    /// Length-prefixed ASCII string, 2-byte length, up to 65535 bytes.
    pub fn read_varstring65535(&self, offset: usize) -> DbResult<String> {
        let len = self.read_u16(offset)? as usize;
        check_bounds(self.data.len(), offset + 2, len)?;
        let bytes = &self.data[offset + 2..offset + 2 + len];
        decode_ascii(bytes)
    }

    pub fn write_varstring65535(&mut self, offset: usize, value: &str) -> DbResult<usize> {
        if value.len() > VARSTRING65535_MAX || !value.is_ascii() {
            return Err(DbError::TupleTooLarge(format!(
                "VARSTRING65535 value must be ASCII and <= {VARSTRING65535_MAX} bytes, got {}",
                value.len()
            )));
        }
        check_bounds(self.data.len(), offset, 2 + value.len())?;
        self.data[offset..offset + 2].copy_from_slice(&(value.len() as u16).to_be_bytes());
        self.data[offset + 2..offset + 2 + value.len()].copy_from_slice(value.as_bytes());
        Ok(2 + value.len())
    }
}

fn decode_ascii(bytes: &[u8]) -> DbResult<String> {
    if !bytes.is_ascii() {
        return Err(DbError::DataFormat("VARSTRING payload is not ASCII".into()));
    }
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::FileType;
    use proptest::prelude::*;

    fn page() -> Page {
        Page::new(FileType::HeapData, 0, 4096)
    }

    #[test]
    fn scalar_round_trips() {
        let mut p = page();
        p.write_u8(0, 7).unwrap();
        p.write_bool(1, true).unwrap();
        p.write_u16(2, 4321).unwrap();
        p.write_i32(4, -12345).unwrap();
        p.write_i64(8, -1_234_567_890_123).unwrap();
        p.write_f32(16, 3.5).unwrap();
        p.write_f64(20, 2.5e10).unwrap();
        p.write_char(28, 'λ').unwrap();
        p.write_u32(32, 0xDEAD_BEEF).unwrap();

        assert_eq!(p.read_u8(0).unwrap(), 7);
        assert!(p.read_bool(1).unwrap());
        assert_eq!(p.read_u16(2).unwrap(), 4321);
        assert_eq!(p.read_i32(4).unwrap(), -12345);
        assert_eq!(p.read_i64(8).unwrap(), -1_234_567_890_123);
        assert_eq!(p.read_f32(16).unwrap(), 3.5);
        assert_eq!(p.read_f64(20).unwrap(), 2.5e10);
        assert_eq!(p.read_char(28).unwrap(), 'λ');
        assert_eq!(p.read_u32(32).unwrap(), 0xDEAD_BEEF);
    }

    #[test]
    fn varstring255_round_trips() {
        let mut p = page();
        let s = "hello, nanodb";
        let written = p.write_varstring255(100, s).unwrap();
        assert_eq!(written, 1 + s.len());
        assert_eq!(p.read_varstring255(100).unwrap(), s);
    }

    #[test]
    fn varstring255_rejects_oversize() {
        let mut p = page();
        let s = "x".repeat(256);
        assert!(p.write_varstring255(0, &s).is_err());
    }

    #[test]
    fn varstring65535_round_trips() {
        let mut p = page();
        let s = "y".repeat(2000);
        p.write_varstring65535(0, &s).unwrap();
        assert_eq!(p.read_varstring65535(0).unwrap(), s);
    }

    #[test]
    fn out_of_bounds_offsets_are_rejected() {
        let p = page();
        assert!(p.read_i64(p.data.len() - 4).is_err());
    }

    proptest! {
        #[test]
        fn varstring255_arbitrary_ascii_round_trips(s in "[ -~]{0,255}") {
            let mut p = page();
            p.write_varstring255(0, &s).unwrap();
            prop_assert_eq!(p.read_varstring255(0).unwrap(), s);
        }

        #[test]
        fn i32_arbitrary_round_trips(v in any::<i32>()) {
            let mut p = page();
            p.write_i32(0, v).unwrap();
            prop_assert_eq!(p.read_i32(0).unwrap(), v);
        }
    }
}
