//! Class-file decoding.
//!
//! [`decode`] parses one compiled unit. In [`DecodeMode::Shallow`] only the
//! class shape is read (name, hierarchy, member names and descriptors); in
//! [`DecodeMode::Outline`] annotations, `SourceFile` and `EnclosingMethod`
//! are added; [`DecodeMode::Full`] also reads line numbers and decodes every
//! method body into the symbolic [`Reference`]s it makes.
//!
//! Malformed input always yields a [`DecodeError`]; every read is bounds
//! checked.

mod annotation;
mod code;
mod constant_pool;
pub mod descriptor;
mod reader;

use thiserror::Error;

use crate::version::ClassVersion;
use annotation::{is_annotation_attribute, parse_annotations};
use code::{BootstrapMethod, CodeAttribute, parse_bootstrap_methods};
use constant_pool::ConstantPool;
use reader::ClassReader;

pub use annotation::{
    IGNORE_REQUIREMENT_ANNOTATION, LEGACY_IGNORE_REQUIREMENT_ANNOTATION, SuppressionMarkers,
};

const MAGIC: u32 = 0xCAFEBABE;

const CODE: &str = "Code";
const BOOTSTRAP_METHODS: &str = "BootstrapMethods";
const SOURCE_FILE: &str = "SourceFile";
const ENCLOSING_METHOD: &str = "EnclosingMethod";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unexpected end of class file")]
    UnexpectedEof,
    #[error("invalid class file magic header {0:#010x}")]
    InvalidMagic(u32),
    #[error("unsupported constant pool tag {tag} at index {index}")]
    UnsupportedConstant { tag: u8, index: u16 },
    #[error("invalid constant pool index {index}")]
    InvalidConstantIndex { index: u16 },
    #[error("invalid modified UTF-8 string in constant pool")]
    InvalidUtf8,
    #[error("invalid opcode {opcode:#04x} at code offset {offset}")]
    InvalidOpcode { opcode: u8, offset: usize },
    #[error("malformed switch at code offset {offset}")]
    MalformedSwitch { offset: usize },
    #[error("annotation values nested deeper than {0} levels")]
    NestingTooDeep(usize),
    #[error("invalid bootstrap method index {index}")]
    InvalidBootstrapIndex { index: u16 },
    #[error("malformed {0} attribute")]
    MalformedAttribute(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeMode {
    /// Class shape only; no attributes are interpreted.
    #[default]
    Shallow,
    /// Shape plus annotations, source file and enclosing method; method
    /// bodies are skipped.
    Outline,
    /// Outline plus line numbers and method-body references.
    Full,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassFile {
    pub version: ClassVersion,
    pub access_flags: u16,
    pub name: String,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    /// Class-level annotation type descriptors (not read in shallow mode).
    pub annotations: Vec<String>,
    pub source_file: Option<String>,
    /// Set for local and anonymous classes.
    pub enclosing: Option<EnclosingMethod>,
}

/// Where a local or anonymous class was declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnclosingMethod {
    pub class: String,
    /// `name(desc)ret`; absent when declared in an initializer.
    pub method: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub access_flags: u16,
    pub name: String,
    pub descriptor: String,
    pub annotations: Vec<String>,
}

impl FieldInfo {
    pub fn signature(&self) -> String {
        format!("{}#{}", self.name, self.descriptor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo {
    pub access_flags: u16,
    pub name: String,
    pub descriptor: String,
    pub annotations: Vec<String>,
    /// Symbolic references made by the method body (full mode only).
    pub references: Vec<Reference>,
}

impl MethodInfo {
    pub fn signature(&self) -> String {
        format!("{}{}", self.name, self.descriptor)
    }
}

/// A class, field or method named by an instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub kind: ReferenceKind,
    pub line: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceKind {
    Method {
        owner: String,
        name: String,
        descriptor: String,
    },
    Field {
        owner: String,
        name: String,
        descriptor: String,
    },
    Type {
        name: String,
    },
}

impl ReferenceKind {
    /// The class the reference resolves against.
    pub fn owner(&self) -> &str {
        match self {
            ReferenceKind::Method { owner, .. } | ReferenceKind::Field { owner, .. } => owner,
            ReferenceKind::Type { name } => name,
        }
    }

    /// The member signature (`name(desc)ret` or `name#desc`); `None` for
    /// plain type references.
    pub fn signature(&self) -> Option<String> {
        match self {
            ReferenceKind::Method {
                name, descriptor, ..
            } => Some(format!("{name}{descriptor}")),
            ReferenceKind::Field {
                name, descriptor, ..
            } => Some(format!("{name}#{descriptor}")),
            ReferenceKind::Type { .. } => None,
        }
    }
}

/// Reads only the magic number and version pair.
pub fn read_version(bytes: &[u8]) -> Result<ClassVersion, DecodeError> {
    let mut reader = ClassReader::new(bytes);
    expect_magic(&mut reader)?;
    let minor = reader.read_u2()?;
    let major = reader.read_u2()?;
    Ok(ClassVersion { major, minor })
}

pub fn decode(bytes: &[u8], mode: DecodeMode) -> Result<ClassFile, DecodeError> {
    let attributes = mode != DecodeMode::Shallow;
    let bodies = mode == DecodeMode::Full;
    let mut reader = ClassReader::new(bytes);
    let version = {
        expect_magic(&mut reader)?;
        let minor = reader.read_u2()?;
        let major = reader.read_u2()?;
        ClassVersion { major, minor }
    };
    let pool = ConstantPool::parse(&mut reader)?;

    let access_flags = reader.read_u2()?;
    let this_class = reader.read_u2()?;
    let super_class = reader.read_u2()?;
    let name = pool.class_name(this_class)?.to_string();
    let super_name = match super_class {
        0 => None,
        index => Some(pool.class_name(index)?.to_string()),
    };

    let interfaces_count = reader.read_u2()?;
    let mut interfaces = Vec::with_capacity(interfaces_count as usize);
    for _ in 0..interfaces_count {
        interfaces.push(pool.class_name(reader.read_u2()?)?.to_string());
    }

    let fields_count = reader.read_u2()?;
    let mut fields = Vec::with_capacity(fields_count as usize);
    for _ in 0..fields_count {
        let (access_flags, name, descriptor) = read_member_header(&mut reader, &pool)?;
        let mut annotations = Vec::new();
        for (attribute, data) in read_attributes(&mut reader, &pool)? {
            if attributes && is_annotation_attribute(attribute) {
                parse_annotations(data, &pool, &mut annotations)?;
            }
        }
        fields.push(FieldInfo {
            access_flags,
            name,
            descriptor,
            annotations,
        });
    }

    let methods_count = reader.read_u2()?;
    let mut methods = Vec::with_capacity(methods_count as usize);
    let mut method_bodies: Vec<Option<&[u8]>> = Vec::with_capacity(methods_count as usize);
    for _ in 0..methods_count {
        let (access_flags, name, descriptor) = read_member_header(&mut reader, &pool)?;
        let mut annotations = Vec::new();
        let mut body = None;
        for (attribute, data) in read_attributes(&mut reader, &pool)? {
            if !attributes {
                continue;
            }
            if is_annotation_attribute(attribute) {
                parse_annotations(data, &pool, &mut annotations)?;
            } else if bodies && attribute == CODE {
                body = Some(data);
            }
        }
        methods.push(MethodInfo {
            access_flags,
            name,
            descriptor,
            annotations,
            references: Vec::new(),
        });
        method_bodies.push(body);
    }

    let mut annotations = Vec::new();
    let mut source_file = None;
    let mut enclosing = None;
    let mut bootstrap: Vec<BootstrapMethod> = Vec::new();
    for (attribute, data) in read_attributes(&mut reader, &pool)? {
        if !attributes {
            continue;
        }
        if is_annotation_attribute(attribute) {
            parse_annotations(data, &pool, &mut annotations)?;
        } else if attribute == ENCLOSING_METHOD {
            enclosing = Some(parse_enclosing_method(data, &pool)?);
        } else if bodies && attribute == BOOTSTRAP_METHODS {
            bootstrap = parse_bootstrap_methods(data)?;
        } else if attribute == SOURCE_FILE {
            let index = ClassReader::new(data).read_u2()?;
            source_file = Some(pool.utf8(index)?.to_string());
        }
    }

    // Bodies are decoded last: invokedynamic sites need BootstrapMethods,
    // which follows the method table.
    for (method, body) in methods.iter_mut().zip(method_bodies) {
        if let Some(data) = body {
            let code = CodeAttribute::parse(data, &pool)?;
            method.references = code.references(&pool, &bootstrap)?;
        }
    }

    Ok(ClassFile {
        version,
        access_flags,
        name,
        super_name,
        interfaces,
        fields,
        methods,
        annotations,
        source_file,
        enclosing,
    })
}

fn parse_enclosing_method(data: &[u8], pool: &ConstantPool) -> Result<EnclosingMethod, DecodeError> {
    let mut reader = ClassReader::new(data);
    let class = pool.class_name(reader.read_u2()?)?.to_string();
    let method = match reader.read_u2()? {
        0 => None,
        index => {
            let (name, descriptor) = pool.name_and_type(index)?;
            Some(format!("{name}{descriptor}"))
        }
    };
    Ok(EnclosingMethod { class, method })
}

fn expect_magic(reader: &mut ClassReader<'_>) -> Result<(), DecodeError> {
    let magic = reader.read_u4()?;
    if magic != MAGIC {
        return Err(DecodeError::InvalidMagic(magic));
    }
    Ok(())
}

fn read_member_header(
    reader: &mut ClassReader<'_>,
    pool: &ConstantPool,
) -> Result<(u16, String, String), DecodeError> {
    let access_flags = reader.read_u2()?;
    let name = pool.utf8(reader.read_u2()?)?.to_string();
    let descriptor = pool.utf8(reader.read_u2()?)?.to_string();
    Ok((access_flags, name, descriptor))
}

fn read_attributes<'a, 'p>(
    reader: &mut ClassReader<'a>,
    pool: &'p ConstantPool,
) -> Result<Vec<(&'p str, &'a [u8])>, DecodeError> {
    let count = reader.read_u2()?;
    let mut attributes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name = pool.utf8(reader.read_u2()?)?;
        let length = reader.read_u4()? as usize;
        attributes.push((name, reader.read_slice(length)?));
    }
    Ok(attributes)
}
