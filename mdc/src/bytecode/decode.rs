//! The container deserializer, the inverse of [`super::encode::encode`].
//!
//! Every failure here becomes [`BytecodeError`], which the VM surfaces as
//! [`crate::error::RuntimeErrorKind::MalformedBytecode`] (§7) rather than
//! panicking — a module can arrive from anywhere (a file, a pipe, a test
//! fixture), and none of those sources are trusted.

use thiserror::Error;

use super::{Constant, FunctionRecord, Module, ParamRecord, MAGIC};
use crate::ast::TypeAnn;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BytecodeError {
    #[error("not a Machine Dialect bytecode module (bad magic)")]
    BadMagic,
    #[error("unsupported bytecode version {0}")]
    UnsupportedVersion(u32),
    #[error("truncated bytecode module: expected at least {needed} bytes, found {found}")]
    Truncated { needed: usize, found: usize },
    #[error("invalid constant tag {0}")]
    BadConstantTag(u8),
    #[error("invalid type annotation tag {0}")]
    BadTypeTag(u8),
    #[error("invalid UTF-8 in module")]
    BadUtf8,
}

/// A read cursor over the raw container bytes. Every read bounds-checks
/// before indexing, so a truncated or adversarial module can't panic
/// decoding rather than raise `BytecodeError`.
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn need(&self, n: usize) -> Result<(), BytecodeError> {
        if self.pos + n > self.bytes.len() {
            Err(BytecodeError::Truncated {
                needed: self.pos + n,
                found: self.bytes.len(),
            })
        } else {
            Ok(())
        }
    }

    fn u8(&mut self) -> Result<u8, BytecodeError> {
        self.need(1)?;
        let v = self.bytes[self.pos];
        self.pos += 1;
        Ok(v)
    }

    fn u16(&mut self) -> Result<u16, BytecodeError> {
        self.need(2)?;
        let v = u16::from_le_bytes(self.bytes[self.pos..self.pos + 2].try_into().unwrap());
        self.pos += 2;
        Ok(v)
    }

    fn u32(&mut self) -> Result<u32, BytecodeError> {
        self.need(4)?;
        let v = u32::from_le_bytes(self.bytes[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        Ok(v)
    }

    fn i64(&mut self) -> Result<i64, BytecodeError> {
        self.need(8)?;
        let v = i64::from_le_bytes(self.bytes[self.pos..self.pos + 8].try_into().unwrap());
        self.pos += 8;
        Ok(v)
    }

    fn f64(&mut self) -> Result<f64, BytecodeError> {
        self.need(8)?;
        let v = f64::from_le_bytes(self.bytes[self.pos..self.pos + 8].try_into().unwrap());
        self.pos += 8;
        Ok(v)
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8], BytecodeError> {
        self.need(n)?;
        let s = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    fn string(&mut self) -> Result<String, BytecodeError> {
        let len = self.u32()? as usize;
        let raw = self.bytes(len)?;
        std::str::from_utf8(raw)
            .map(str::to_owned)
            .map_err(|_| BytecodeError::BadUtf8)
    }

    fn seek(&mut self, offset: u32) -> Result<(), BytecodeError> {
        let offset = offset as usize;
        self.need(0)?;
        if offset > self.bytes.len() {
            return Err(BytecodeError::Truncated {
                needed: offset,
                found: self.bytes.len(),
            });
        }
        self.pos = offset;
        Ok(())
    }
}

pub(crate) fn decode_type_tag(tag: u8) -> Result<TypeAnn, BytecodeError> {
    let ty = match tag {
        0 => TypeAnn::WholeNumber,
        1 => TypeAnn::Float,
        2 => TypeAnn::Number,
        3 => TypeAnn::Text,
        4 => TypeAnn::Url,
        5 => TypeAnn::YesNo,
        6 => TypeAnn::Empty,
        7 => TypeAnn::OrderedList,
        8 => TypeAnn::UnorderedList,
        9 => TypeAnn::NamedList,
        10 => TypeAnn::Any,
        _ => return Err(BytecodeError::BadTypeTag(tag)),
    };
    Ok(ty)
}

fn decode_constant(c: &mut Cursor) -> Result<Constant, BytecodeError> {
    let tag = c.u8()?;
    let value = match tag {
        0 => Constant::Empty,
        1 => Constant::Integer(c.i64()?),
        2 => Constant::Float(c.f64()?),
        3 => Constant::String(c.string()?),
        4 => Constant::Boolean(c.u8()? != 0),
        _ => return Err(BytecodeError::BadConstantTag(tag)),
    };
    Ok(value)
}

fn decode_function(c: &mut Cursor) -> Result<FunctionRecord, BytecodeError> {
    let name = c.string()?;
    let param_count = c.u8()?;
    let mut params = Vec::with_capacity(param_count as usize);
    for _ in 0..param_count {
        let pname = c.string()?;
        let required = c.u8()? != 0;
        let has_default = c.u8()? != 0;
        let default_fn = if has_default { Some(c.u32()?) } else { None };
        params.push(ParamRecord {
            name: pname,
            required,
            default_fn,
        });
    }
    let output_ty = decode_type_tag(c.u8()?)?;
    let register_count = c.u16()?;
    let entry_offset = c.u32()?;
    Ok(FunctionRecord {
        name,
        params,
        output_ty,
        register_count,
        entry_offset,
    })
}

/// Parses a `.mdbc` container (§4.4) back into a [`Module`].
pub fn decode(bytes: &[u8]) -> Result<Module, BytecodeError> {
    let mut c = Cursor::new(bytes);

    let magic = c.bytes(4)?;
    if magic != MAGIC {
        return Err(BytecodeError::BadMagic);
    }
    let version = c.u32()?;
    if version != super::VERSION {
        return Err(BytecodeError::UnsupportedVersion(version));
    }
    let flags = c.u32()?;
    let name_offset = c.u32()?;
    let const_offset = c.u32()?;
    let func_offset = c.u32()?;
    let inst_offset = c.u32()?;

    c.seek(name_offset)?;
    let name = c.string()?;

    c.seek(const_offset)?;
    let const_count = c.u32()?;
    let mut constants = Vec::with_capacity(const_count as usize);
    for _ in 0..const_count {
        constants.push(decode_constant(&mut c)?);
    }

    c.seek(func_offset)?;
    let func_count = c.u32()?;
    let mut functions = Vec::with_capacity(func_count as usize);
    for _ in 0..func_count {
        functions.push(decode_function(&mut c)?);
    }

    c.seek(inst_offset)?;
    let code_len = c.u32()? as usize;
    let top_level_register_count = c.u16()?;
    let code = c.bytes(code_len)?.to_vec();

    Ok(Module {
        version,
        flags,
        name,
        constants,
        functions,
        code,
        top_level_register_count,
    })
}

#[cfg(test)]
mod tests {
    use super::super::encode::encode;
    use super::*;

    fn sample_module() -> Module {
        Module {
            version: super::super::VERSION,
            flags: 0,
            name: "demo".into(),
            constants: vec![
                Constant::Integer(42),
                Constant::String("hi".into()),
                Constant::Boolean(true),
            ],
            functions: vec![FunctionRecord {
                name: "double".into(),
                params: vec![],
                output_ty: TypeAnn::Empty,
                register_count: 4,
                entry_offset: 0,
            }],
            code: vec![0, 0, 0, 0, 26, 0, 0],
            top_level_register_count: 2,
        }
    }

    #[test]
    fn round_trips_through_encode_and_decode() {
        let module = sample_module();
        let bytes = encode(&module);
        let decoded = decode(&bytes).expect("decode should succeed");
        assert_eq!(decoded.name, module.name);
        assert_eq!(decoded.constants, module.constants);
        assert_eq!(decoded.code, module.code);
        assert_eq!(decoded.functions.len(), 1);
        assert_eq!(decoded.functions[0].name, "double");
        assert_eq!(decoded.top_level_register_count, 2);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = encode(&sample_module());
        bytes[0] = b'X';
        assert_eq!(decode(&bytes), Err(BytecodeError::BadMagic));
    }

    #[test]
    fn rejects_truncated_input() {
        let bytes = encode(&sample_module());
        let err = decode(&bytes[..8]).unwrap_err();
        assert!(matches!(err, BytecodeError::Truncated { .. }));
    }
}
