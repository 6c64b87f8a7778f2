use super::DecodeError;
use super::reader::ClassReader;

const CONSTANT_UTF8: u8 = 1;
const CONSTANT_INTEGER: u8 = 3;
const CONSTANT_FLOAT: u8 = 4;
const CONSTANT_LONG: u8 = 5;
const CONSTANT_DOUBLE: u8 = 6;
const CONSTANT_CLASS: u8 = 7;
const CONSTANT_STRING: u8 = 8;
const CONSTANT_FIELDREF: u8 = 9;
const CONSTANT_METHODREF: u8 = 10;
const CONSTANT_INTERFACE_METHODREF: u8 = 11;
const CONSTANT_NAME_AND_TYPE: u8 = 12;
const CONSTANT_METHOD_HANDLE: u8 = 15;
const CONSTANT_METHOD_TYPE: u8 = 16;
const CONSTANT_DYNAMIC: u8 = 17;
const CONSTANT_INVOKE_DYNAMIC: u8 = 18;
const CONSTANT_MODULE: u8 = 19;
const CONSTANT_PACKAGE: u8 = 20;

#[derive(Debug, Clone)]
enum Constant {
    Utf8(String),
    Class {
        name_index: u16,
    },
    MemberRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    NameAndType {
        name_index: u16,
        descriptor_index: u16,
    },
    MethodHandle {
        kind: u8,
        reference_index: u16,
    },
    InvokeDynamic {
        bootstrap_index: u16,
        name_and_type_index: u16,
    },
    Other,
    Unusable,
}

/// A field or method reference resolved to plain strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MemberRef<'p> {
    pub owner: &'p str,
    pub name: &'p str,
    pub descriptor: &'p str,
}

pub(crate) struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    pub(crate) fn parse(reader: &mut ClassReader<'_>) -> Result<Self, DecodeError> {
        let count = reader.read_u2()?;
        let mut entries = Vec::with_capacity(count as usize);
        entries.push(Constant::Unusable); // index 0 unused

        let mut index: u16 = 1;
        while index < count {
            let tag = reader.read_u1()?;
            let entry = match tag {
                CONSTANT_UTF8 => {
                    let length = reader.read_u2()? as usize;
                    Constant::Utf8(decode_modified_utf8(reader.read_slice(length)?)?)
                }
                CONSTANT_INTEGER | CONSTANT_FLOAT => {
                    reader.skip(4)?;
                    Constant::Other
                }
                CONSTANT_LONG | CONSTANT_DOUBLE => {
                    // eight-byte constants take up two pool slots
                    reader.skip(8)?;
                    entries.push(Constant::Other);
                    index += 1;
                    Constant::Unusable
                }
                CONSTANT_CLASS => Constant::Class {
                    name_index: reader.read_u2()?,
                },
                CONSTANT_STRING | CONSTANT_METHOD_TYPE | CONSTANT_MODULE | CONSTANT_PACKAGE => {
                    reader.skip(2)?;
                    Constant::Other
                }
                CONSTANT_FIELDREF | CONSTANT_METHODREF | CONSTANT_INTERFACE_METHODREF => {
                    Constant::MemberRef {
                        class_index: reader.read_u2()?,
                        name_and_type_index: reader.read_u2()?,
                    }
                }
                CONSTANT_NAME_AND_TYPE => Constant::NameAndType {
                    name_index: reader.read_u2()?,
                    descriptor_index: reader.read_u2()?,
                },
                CONSTANT_METHOD_HANDLE => Constant::MethodHandle {
                    kind: reader.read_u1()?,
                    reference_index: reader.read_u2()?,
                },
                CONSTANT_DYNAMIC => {
                    reader.skip(4)?;
                    Constant::Other
                }
                CONSTANT_INVOKE_DYNAMIC => Constant::InvokeDynamic {
                    bootstrap_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                other => return Err(DecodeError::UnsupportedConstant { tag: other, index }),
            };

            entries.push(entry);
            index = index.saturating_add(1);
        }

        Ok(Self { entries })
    }

    fn get(&self, index: u16) -> Result<&Constant, DecodeError> {
        self.entries
            .get(index as usize)
            .ok_or(DecodeError::InvalidConstantIndex { index })
    }

    pub(crate) fn utf8(&self, index: u16) -> Result<&str, DecodeError> {
        match self.get(index)? {
            Constant::Utf8(value) => Ok(value.as_str()),
            _ => Err(DecodeError::InvalidConstantIndex { index }),
        }
    }

    pub(crate) fn class_name(&self, index: u16) -> Result<&str, DecodeError> {
        match self.get(index)? {
            Constant::Class { name_index } => self.utf8(*name_index),
            _ => Err(DecodeError::InvalidConstantIndex { index }),
        }
    }

    pub(crate) fn name_and_type(&self, index: u16) -> Result<(&str, &str), DecodeError> {
        match self.get(index)? {
            Constant::NameAndType {
                name_index,
                descriptor_index,
            } => Ok((self.utf8(*name_index)?, self.utf8(*descriptor_index)?)),
            _ => Err(DecodeError::InvalidConstantIndex { index }),
        }
    }

    /// Resolves a Fieldref, Methodref or InterfaceMethodref entry.
    pub(crate) fn member_ref(&self, index: u16) -> Result<MemberRef<'_>, DecodeError> {
        match self.get(index)? {
            Constant::MemberRef {
                class_index,
                name_and_type_index,
            } => {
                let owner = self.class_name(*class_index)?;
                let (name, descriptor) = self.name_and_type(*name_and_type_index)?;
                Ok(MemberRef {
                    owner,
                    name,
                    descriptor,
                })
            }
            _ => Err(DecodeError::InvalidConstantIndex { index }),
        }
    }

    pub(crate) fn method_handle(&self, index: u16) -> Result<(u8, MemberRef<'_>), DecodeError> {
        match self.get(index)? {
            Constant::MethodHandle {
                kind,
                reference_index,
            } => Ok((*kind, self.member_ref(*reference_index)?)),
            _ => Err(DecodeError::InvalidConstantIndex { index }),
        }
    }

    /// Returns the bootstrap method index, name and descriptor of an
    /// InvokeDynamic entry.
    pub(crate) fn invoke_dynamic(&self, index: u16) -> Result<(u16, &str, &str), DecodeError> {
        match self.get(index)? {
            Constant::InvokeDynamic {
                bootstrap_index,
                name_and_type_index,
            } => {
                let (name, descriptor) = self.name_and_type(*name_and_type_index)?;
                Ok((*bootstrap_index, name, descriptor))
            }
            _ => Err(DecodeError::InvalidConstantIndex { index }),
        }
    }
}

/// Decodes the JVM's "modified UTF-8": NUL is written as two bytes and
/// supplementary characters as surrogate pairs of three bytes each.
///
/// Unpaired surrogates are legal in Java string literals; they decode to
/// U+FFFD. Only a broken byte structure is an error.
pub(crate) fn decode_modified_utf8(bytes: &[u8]) -> Result<String, DecodeError> {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return Ok(text.to_owned());
    }

    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i] as u16;
        if b & 0x80 == 0 {
            units.push(b);
            i += 1;
        } else if b & 0xE0 == 0xC0 {
            let b2 = continuation(bytes, i + 1)?;
            units.push(((b & 0x1F) << 6) | b2);
            i += 2;
        } else if b & 0xF0 == 0xE0 {
            let b2 = continuation(bytes, i + 1)?;
            let b3 = continuation(bytes, i + 2)?;
            units.push(((b & 0x0F) << 12) | (b2 << 6) | b3);
            i += 3;
        } else {
            return Err(DecodeError::InvalidUtf8);
        }
    }

    Ok(String::from_utf16_lossy(&units))
}

fn continuation(bytes: &[u8], at: usize) -> Result<u16, DecodeError> {
    match bytes.get(at) {
        Some(b) if b & 0xC0 == 0x80 => Ok((b & 0x3F) as u16),
        _ => Err(DecodeError::InvalidUtf8),
    }
}
