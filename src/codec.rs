//! Persisted signature database format.
//!
//! The whole stream is gzip compressed:
//!
//! ```text
//! "SGDB" u16:version
//! ( 0x01 type-descriptor u32:body-len bincode-body )*
//! 0x00
//! ```
//!
//! A type descriptor is a `u16`-length-prefixed type name followed by a
//! `u8` component count and that many `u16`-length-prefixed component
//! names. Only `SignatureSet` records built from `StringSet` and
//! `StringList` components are accepted; the descriptor is checked before
//! the body is looked at.

use bincode::Options;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fmt;
use std::io::{self, Read, Write};
use thiserror::Error;

use crate::signature::{Database, SignatureSet};

const MAGIC: &[u8; 4] = b"SGDB";
const FORMAT_VERSION: u16 = 1;

const TAG_END: u8 = 0x00;
const TAG_RECORD: u8 = 0x01;

const MAX_BODY_LEN: u32 = 16 * 1024 * 1024;

const RECORD_TYPE: &str = "SignatureSet";
const COMPONENT_TYPES: [&str; 2] = ["StringSet", "StringList"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisallowedReason {
    /// The type name is not one the codec knows.
    NotFound,
    /// The type is known but not allowed where it appeared.
    NotPermitted,
}

impl fmt::Display for DisallowedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisallowedReason::NotFound => f.write_str("type not found"),
            DisallowedReason::NotPermitted => f.write_str("type not permitted"),
        }
    }
}

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("signature database I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("not a signature database")]
    BadMagic,
    #[error("unsupported signature database format version {0}")]
    UnsupportedVersion(u16),
    #[error("disallowed record type `{type_name}` ({reason})")]
    DisallowedRecord {
        type_name: String,
        reason: DisallowedReason,
    },
    #[error("unknown frame tag {0:#04x}")]
    UnknownTag(u8),
    #[error("record body of {0} bytes exceeds the size limit")]
    BodyTooLarge(u32),
    #[error("signature database ended without an end marker")]
    MissingEndMarker,
    #[error("record type name is not valid UTF-8")]
    InvalidTypeName,
    #[error("malformed signature record: {0}")]
    Malformed(#[from] bincode::Error),
}

/// Writes `db` as a complete, end-marked stream. Records are written in
/// class-name order so equal databases produce identical bytes.
pub fn write_database<W: Write>(writer: W, db: &Database) -> Result<(), DatabaseError> {
    let mut out = GzEncoder::new(writer, Compression::default());
    out.write_all(MAGIC)?;
    out.write_all(&FORMAT_VERSION.to_be_bytes())?;

    for set in db.sorted() {
        let body = record_options().serialize(set)?;
        let len = u32::try_from(body.len())
            .ok()
            .filter(|len| *len <= MAX_BODY_LEN)
            .ok_or(DatabaseError::BodyTooLarge(u32::MAX))?;
        out.write_all(&[TAG_RECORD])?;
        write_type_descriptor(&mut out, RECORD_TYPE, &COMPONENT_TYPES)?;
        out.write_all(&len.to_be_bytes())?;
        out.write_all(&body)?;
    }

    out.write_all(&[TAG_END])?;
    out.finish()?;
    Ok(())
}

/// Reads records up to the end marker. Later records replace earlier ones
/// with the same class name.
pub fn read_database<R: Read>(reader: R) -> Result<Database, DatabaseError> {
    let mut input = GzDecoder::new(reader);

    let mut magic = [0u8; 4];
    read_exact(&mut input, &mut magic)?;
    if &magic != MAGIC {
        return Err(DatabaseError::BadMagic);
    }
    let version = read_u16(&mut input)?;
    if version != FORMAT_VERSION {
        return Err(DatabaseError::UnsupportedVersion(version));
    }

    let mut db = Database::new();
    loop {
        let mut tag = [0u8; 1];
        read_exact(&mut input, &mut tag)?;
        match tag[0] {
            TAG_END => return Ok(db),
            TAG_RECORD => {
                check_type_descriptor(&mut input)?;
                let len = read_u32(&mut input)?;
                if len > MAX_BODY_LEN {
                    return Err(DatabaseError::BodyTooLarge(len));
                }
                let mut body = vec![0u8; len as usize];
                read_exact(&mut input, &mut body)?;
                let set: SignatureSet = record_options().deserialize(&body)?;
                db.insert(set);
            }
            other => return Err(DatabaseError::UnknownTag(other)),
        }
    }
}

/// Fixed-width little-endian bincode; a body must be consumed exactly.
fn record_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
}

fn write_type_descriptor<W: Write>(
    out: &mut W,
    type_name: &str,
    components: &[&str],
) -> io::Result<()> {
    write_name(out, type_name)?;
    out.write_all(&[components.len() as u8])?;
    for component in components {
        write_name(out, component)?;
    }
    Ok(())
}

fn write_name<W: Write>(out: &mut W, name: &str) -> io::Result<()> {
    out.write_all(&(name.len() as u16).to_be_bytes())?;
    out.write_all(name.as_bytes())
}

fn check_type_descriptor<R: Read>(input: &mut R) -> Result<(), DatabaseError> {
    let type_name = read_name(input)?;
    if type_name != RECORD_TYPE {
        return Err(disallowed(type_name));
    }

    let mut count = [0u8; 1];
    read_exact(input, &mut count)?;
    for _ in 0..count[0] {
        let component = read_name(input)?;
        if !COMPONENT_TYPES.contains(&component.as_str()) {
            return Err(disallowed(component));
        }
    }
    Ok(())
}

fn disallowed(type_name: String) -> DatabaseError {
    let known = type_name == RECORD_TYPE || COMPONENT_TYPES.contains(&type_name.as_str());
    let reason = if known {
        DisallowedReason::NotPermitted
    } else {
        DisallowedReason::NotFound
    };
    DatabaseError::DisallowedRecord { type_name, reason }
}

fn read_name<R: Read>(input: &mut R) -> Result<String, DatabaseError> {
    let len = read_u16(input)?;
    let mut bytes = vec![0u8; len as usize];
    read_exact(input, &mut bytes)?;
    String::from_utf8(bytes).map_err(|_| DatabaseError::InvalidTypeName)
}

fn read_u16<R: Read>(input: &mut R) -> Result<u16, DatabaseError> {
    let mut bytes = [0u8; 2];
    read_exact(input, &mut bytes)?;
    Ok(u16::from_be_bytes(bytes))
}

fn read_u32<R: Read>(input: &mut R) -> Result<u32, DatabaseError> {
    let mut bytes = [0u8; 4];
    read_exact(input, &mut bytes)?;
    Ok(u32::from_be_bytes(bytes))
}

fn read_exact<R: Read>(input: &mut R, buf: &mut [u8]) -> Result<(), DatabaseError> {
    input.read_exact(buf).map_err(|err| match err.kind() {
        io::ErrorKind::UnexpectedEof => DatabaseError::MissingEndMarker,
        _ => DatabaseError::Io(err),
    })
}
