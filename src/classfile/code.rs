//! Method body decoding: walks the bytecode of a `Code` attribute and
//! records every instruction that names a class, field or method.

use super::constant_pool::ConstantPool;
use super::descriptor::return_type_class;
use super::reader::ClassReader;
use super::{DecodeError, Reference, ReferenceKind};

const IINC: u8 = 0x84;
const RET: u8 = 0xa9;
const TABLESWITCH: u8 = 0xaa;
const LOOKUPSWITCH: u8 = 0xab;
const GETSTATIC: u8 = 0xb2;
const PUTFIELD: u8 = 0xb5;
const INVOKEVIRTUAL: u8 = 0xb6;
const INVOKEINTERFACE: u8 = 0xb9;
const INVOKEDYNAMIC: u8 = 0xba;
const NEW: u8 = 0xbb;
const ANEWARRAY: u8 = 0xbd;
const CHECKCAST: u8 = 0xc0;
const INSTANCEOF: u8 = 0xc1;
const WIDE: u8 = 0xc4;

const LINE_NUMBER_TABLE: &str = "LineNumberTable";
const LAMBDA_METAFACTORY: &str = "java/lang/invoke/LambdaMetafactory";

/// One entry of a `BootstrapMethods` class attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BootstrapMethod {
    pub method_ref: u16,
    pub arguments: Vec<u16>,
}

pub(crate) fn parse_bootstrap_methods(data: &[u8]) -> Result<Vec<BootstrapMethod>, DecodeError> {
    let mut reader = ClassReader::new(data);
    let count = reader.read_u2()?;
    let mut methods = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let method_ref = reader.read_u2()?;
        let argument_count = reader.read_u2()?;
        let arguments = (0..argument_count)
            .map(|_| reader.read_u2())
            .collect::<Result<Vec<_>, _>>()?;
        methods.push(BootstrapMethod {
            method_ref,
            arguments,
        });
    }
    Ok(methods)
}

/// The parts of a `Code` attribute the checker cares about.
pub(crate) struct CodeAttribute<'a> {
    code: &'a [u8],
    line_numbers: Vec<(u16, u16)>,
}

impl<'a> CodeAttribute<'a> {
    pub(crate) fn parse(data: &'a [u8], pool: &ConstantPool) -> Result<Self, DecodeError> {
        let mut reader = ClassReader::new(data);
        reader.read_u2()?; // max_stack
        reader.read_u2()?; // max_locals
        let code_length = reader.read_u4()? as usize;
        let code = reader.read_slice(code_length)?;
        let exception_table_length = reader.read_u2()? as usize;
        reader.skip(exception_table_length * 8)?;

        let mut line_numbers = Vec::new();
        let attributes_count = reader.read_u2()?;
        for _ in 0..attributes_count {
            let name_index = reader.read_u2()?;
            let length = reader.read_u4()? as usize;
            let payload = reader.read_slice(length)?;
            if pool.utf8(name_index)? == LINE_NUMBER_TABLE {
                let mut table = ClassReader::new(payload);
                let entries = table.read_u2()?;
                for _ in 0..entries {
                    let start_pc = table.read_u2()?;
                    let line = table.read_u2()?;
                    line_numbers.push((start_pc, line));
                }
            }
        }
        line_numbers.sort_unstable();

        Ok(Self { code, line_numbers })
    }

    fn line_at(&self, offset: usize) -> Option<u16> {
        let idx = self
            .line_numbers
            .partition_point(|(start, _)| (*start as usize) <= offset);
        idx.checked_sub(1).map(|i| self.line_numbers[i].1)
    }

    /// Decodes every instruction, returning the symbolic references in
    /// program order.
    pub(crate) fn references(
        &self,
        pool: &ConstantPool,
        bootstrap: &[BootstrapMethod],
    ) -> Result<Vec<Reference>, DecodeError> {
        let mut refs = Vec::new();
        let mut reader = ClassReader::new(self.code);

        while !reader.is_empty() {
            let offset = reader.position();
            let opcode = reader.read_u1()?;
            let line = self.line_at(offset);
            let mut push = |kind: ReferenceKind| refs.push(Reference { kind, line });

            match opcode {
                GETSTATIC..=PUTFIELD => {
                    let member = pool.member_ref(reader.read_u2()?)?;
                    push(ReferenceKind::Field {
                        owner: member.owner.to_string(),
                        name: member.name.to_string(),
                        descriptor: member.descriptor.to_string(),
                    });
                }
                INVOKEVIRTUAL..=INVOKEINTERFACE => {
                    let member = pool.member_ref(reader.read_u2()?)?;
                    if opcode == INVOKEINTERFACE {
                        reader.skip(2)?; // count, 0
                    }
                    if let Some(returned) = return_type_class(member.descriptor) {
                        push(ReferenceKind::Type {
                            name: returned.to_string(),
                        });
                    }
                    push(ReferenceKind::Method {
                        owner: member.owner.to_string(),
                        name: member.name.to_string(),
                        descriptor: member.descriptor.to_string(),
                    });
                }
                INVOKEDYNAMIC => {
                    let index = reader.read_u2()?;
                    reader.skip(2)?;
                    let (bootstrap_index, _, descriptor) = pool.invoke_dynamic(index)?;
                    let bsm = bootstrap
                        .get(bootstrap_index as usize)
                        .ok_or(DecodeError::InvalidBootstrapIndex {
                            index: bootstrap_index,
                        })?;
                    let (_, handle) = pool.method_handle(bsm.method_ref)?;
                    if handle.owner == LAMBDA_METAFACTORY
                        && matches!(handle.name, "metafactory" | "altMetafactory")
                    {
                        let target = *bsm
                            .arguments
                            .get(1)
                            .ok_or(DecodeError::MalformedAttribute("BootstrapMethods"))?;
                        let (_, implementation) = pool.method_handle(target)?;
                        push(ReferenceKind::Method {
                            owner: implementation.owner.to_string(),
                            name: implementation.name.to_string(),
                            descriptor: implementation.descriptor.to_string(),
                        });
                        if let Some(functional) = return_type_class(descriptor) {
                            push(ReferenceKind::Type {
                                name: functional.to_string(),
                            });
                        }
                    }
                }
                NEW | ANEWARRAY | CHECKCAST | INSTANCEOF => {
                    let name = pool.class_name(reader.read_u2()?)?;
                    push(ReferenceKind::Type {
                        name: name.to_string(),
                    });
                }
                TABLESWITCH => {
                    skip_switch_padding(&mut reader, offset)?;
                    reader.read_i4()?; // default
                    let low = reader.read_i4()? as i64;
                    let high = reader.read_i4()? as i64;
                    if high < low {
                        return Err(DecodeError::MalformedSwitch { offset });
                    }
                    let targets = usize::try_from((high - low + 1) * 4)
                        .map_err(|_| DecodeError::MalformedSwitch { offset })?;
                    reader.skip(targets)?;
                }
                LOOKUPSWITCH => {
                    skip_switch_padding(&mut reader, offset)?;
                    reader.read_i4()?; // default
                    let pairs = reader.read_i4()?;
                    if pairs < 0 {
                        return Err(DecodeError::MalformedSwitch { offset });
                    }
                    let targets = (pairs as usize)
                        .checked_mul(8)
                        .ok_or(DecodeError::MalformedSwitch { offset })?;
                    reader.skip(targets)?;
                }
                WIDE => match reader.read_u1()? {
                    IINC => reader.skip(4)?,
                    0x15..=0x19 | 0x36..=0x3a | RET => reader.skip(2)?,
                    other => {
                        return Err(DecodeError::InvalidOpcode {
                            opcode: other,
                            offset,
                        });
                    }
                },
                other => {
                    let operands =
                        operand_length(other).ok_or(DecodeError::InvalidOpcode { opcode: other, offset })?;
                    reader.skip(operands)?;
                }
            }
        }

        Ok(refs)
    }
}

/// Switch operands start at the next four-byte boundary relative to the
/// start of the code array.
fn skip_switch_padding(reader: &mut ClassReader<'_>, offset: usize) -> Result<(), DecodeError> {
    let padding = (4 - (offset + 1) % 4) % 4;
    reader.skip(padding)
}

/// Operand byte counts for fixed-length opcodes; `None` for opcodes that
/// are undefined (or handled separately above).
fn operand_length(opcode: u8) -> Option<usize> {
    let length = match opcode {
        0x00..=0x0f => 0,          // nop, constants
        0x10 => 1,                 // bipush
        0x11 => 2,                 // sipush
        0x12 => 1,                 // ldc
        0x13 | 0x14 => 2,          // ldc_w, ldc2_w
        0x15..=0x19 => 1,          // loads with index
        0x1a..=0x35 => 0,          // loads, array loads
        0x36..=0x3a => 1,          // stores with index
        0x3b..=0x83 => 0,          // stores, stack, arithmetic
        IINC => 2,
        0x85..=0x98 => 0,          // conversions, comparisons
        0x99..=0xa8 => 2,          // branches, goto, jsr
        RET => 1,
        0xac..=0xb1 => 0,          // returns
        0xbc => 1,                 // newarray
        0xbe | 0xbf => 0,          // arraylength, athrow
        0xc2 | 0xc3 => 0,          // monitorenter, monitorexit
        0xc5 => 3,                 // multianewarray
        0xc6 | 0xc7 => 2,          // ifnull, ifnonnull
        0xc8 | 0xc9 => 4,          // goto_w, jsr_w
        0xca => 0,                 // breakpoint
        _ => return None,
    };
    Some(length)
}
