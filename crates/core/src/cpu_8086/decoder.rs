//! Instruction decoder
//!
//! Prefixes are consumed first, then the opcode's high nibble selects one of
//! sixteen range decoders. Anything that cannot be decoded degrades to a
//! `db`/`dw` pseudo-instruction so the fetch loop always makes progress.

use super::flags::Condition;
use super::instruction::{AluOp, Instruction, Op, RepPrefix, ShiftOp};
use super::memory::Memory8086;
use super::operand::{resolve_rm, MemoryRef, ModRm, Operand};
use super::registers::{Reg16, Reg8, RegisterFile, SegReg, Width};
use super::CpuModel;
use crate::logging::{log, LogCategory, LogLevel};
use thiserror::Error;

/// Longest prefix run accepted before giving up on an instruction
const MAX_PREFIXES: u16 = 15;

/// Why a byte sequence could not be decoded
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid opcode 0x{0:02X}")]
    InvalidOpcode(u8),
    #[error("invalid extension /{reg} for opcode 0x{opcode:02X}")]
    InvalidExtension { opcode: u8, reg: u8 },
    #[error("opcode 0x{0:02X} requires an 80186")]
    Requires80186(u8),
    #[error("opcode 0x{0:02X} requires a memory operand")]
    RegisterOperand(u8),
    #[error("too many prefix bytes")]
    TooManyPrefixes,
}

type Decoded = Result<(Op, Vec<Operand>), DecodeError>;
type NibbleDecoder = fn(&mut Cursor<'_>, u8) -> Decoded;

/// Range decoders indexed by `opcode >> 4`
static NIBBLE_DECODERS: [NibbleDecoder; 16] = [
    decode_alu_block,
    decode_alu_block,
    decode_alu_block,
    decode_alu_block,
    decode_4x,
    decode_5x,
    decode_6x,
    decode_7x,
    decode_8x,
    decode_9x,
    decode_ax,
    decode_bx,
    decode_cx,
    decode_dx,
    decode_ex,
    decode_fx,
];

/// Byte reader over CS:IP plus the decode context
struct Cursor<'a> {
    memory: &'a dyn Memory8086,
    regs: &'a RegisterFile,
    model: CpuModel,
    cs: u16,
    ip: u16,
    consumed: u16,
    segment_override: Option<SegReg>,
}

impl Cursor<'_> {
    fn u8(&mut self) -> u8 {
        let byte = self
            .memory
            .get_byte(self.cs, self.ip.wrapping_add(self.consumed));
        self.consumed = self.consumed.wrapping_add(1);
        byte
    }

    fn u16(&mut self) -> u16 {
        let low = self.u8() as u16;
        let high = self.u8() as u16;
        (high << 8) | low
    }

    /// Immediate of the given width
    fn imm(&mut self, width: Width) -> Operand {
        let value = match width {
            Width::Byte => self.u8() as u16,
            Width::Word => self.u16(),
        };
        Operand::Imm(value, width)
    }

    /// Sign-extended imm8 presented as a word
    fn imm8_sx(&mut self) -> Operand {
        Operand::Imm(self.u8() as i8 as i16 as u16, Width::Word)
    }

    /// IP of the byte after everything consumed so far
    fn next_ip(&self) -> u16 {
        self.ip.wrapping_add(self.consumed)
    }

    /// rel8 branch target, relative to the end of the instruction
    fn rel8(&mut self) -> Operand {
        let rel = self.u8() as i8 as i16 as u16;
        Operand::Near(self.next_ip().wrapping_add(rel))
    }

    /// rel16 branch target, relative to the end of the instruction
    fn rel16(&mut self) -> Operand {
        let rel = self.u16();
        Operand::Near(self.next_ip().wrapping_add(rel))
    }

    fn modrm(&mut self) -> ModRm {
        ModRm::decode(self.u8())
    }

    /// Read the displacement (if any) and resolve the r/m operand
    fn rm(&mut self, modrm: ModRm, width: Width) -> Operand {
        let displacement = match modrm.displacement_len() {
            1 => self.u8() as u16,
            2 => self.u16(),
            _ => 0,
        };
        resolve_rm(self.regs, modrm, displacement, width, self.segment_override)
    }

    /// r/m operand that must address memory (LEA, LDS, LES, BOUND, far indirect)
    fn mem(&mut self, opcode: u8, modrm: ModRm, width: Width) -> Result<Operand, DecodeError> {
        if modrm.is_register() {
            return Err(DecodeError::RegisterOperand(opcode));
        }
        Ok(self.rm(modrm, width))
    }

    fn require_80186(&self, opcode: u8) -> Result<(), DecodeError> {
        if self.model.supports_80186_instructions() {
            Ok(())
        } else {
            Err(DecodeError::Requires80186(opcode))
        }
    }

    /// Direct memory operand for MOV AL/AX, moffs
    fn moffs(&mut self, width: Width) -> Operand {
        let offset = self.u16();
        let seg = self.segment_override.unwrap_or(SegReg::DS);
        Operand::Mem(
            MemoryRef::direct(seg, self.regs, offset, self.segment_override.is_some()),
            width,
        )
    }
}

/// Accumulator register of the given width
fn acc(width: Width) -> Operand {
    match width {
        Width::Byte => Operand::Reg8(Reg8::AL),
        Width::Word => Operand::Reg16(Reg16::AX),
    }
}

/// Decode the instruction at CS:IP
pub fn decode(memory: &dyn Memory8086, regs: &RegisterFile, model: CpuModel) -> Instruction {
    decode_at(memory, regs, model, regs.seg(SegReg::CS), regs.ip)
}

/// Decode the instruction at an arbitrary `cs:ip`, resolving memory operands
/// against the current register state. Never fails: undecodable bytes come
/// back as `db`/`dw`.
pub fn decode_at(
    memory: &dyn Memory8086,
    regs: &RegisterFile,
    model: CpuModel,
    cs: u16,
    ip: u16,
) -> Instruction {
    let mut cursor = Cursor {
        memory,
        regs,
        model,
        cs,
        ip,
        consumed: 0,
        segment_override: None,
    };

    match decode_with_prefixes(&mut cursor) {
        Ok(instr) => instr,
        Err(err) => {
            let instr = fallback(memory, cs, ip, cursor.consumed);
            log(LogCategory::Decoder, LogLevel::Debug, || {
                format!("{:04X}:{:04X} {} -> {}", cs, ip, err, instr)
            });
            instr
        }
    }
}

/// `db first` when a single byte was consumed, otherwise `dw first,second`
fn fallback(memory: &dyn Memory8086, cs: u16, ip: u16, consumed: u16) -> Instruction {
    if consumed <= 1 {
        let byte = memory.get_byte(cs, ip) as u16;
        Instruction::new(Op::Db, vec![Operand::Imm(byte, Width::Byte)], 1)
    } else {
        let word = memory.get_word(cs, ip);
        Instruction::new(Op::Dw, vec![Operand::Imm(word, Width::Word)], 2)
    }
}

fn decode_with_prefixes(cursor: &mut Cursor<'_>) -> Result<Instruction, DecodeError> {
    let mut rep = None;
    let mut lock = false;

    let opcode = loop {
        let byte = cursor.u8();
        match byte {
            0x26 => cursor.segment_override = Some(SegReg::ES),
            0x2E => cursor.segment_override = Some(SegReg::CS),
            0x36 => cursor.segment_override = Some(SegReg::SS),
            0x3E => cursor.segment_override = Some(SegReg::DS),
            0xF0 => lock = true,
            0xF2 => rep = Some(RepPrefix::Repne),
            0xF3 => rep = Some(RepPrefix::Rep),
            _ => break byte,
        }
        if cursor.consumed >= MAX_PREFIXES {
            return Err(DecodeError::TooManyPrefixes);
        }
    };

    let (op, operands) = NIBBLE_DECODERS[(opcode >> 4) as usize](cursor, opcode)?;
    Ok(Instruction {
        op,
        operands,
        // REP only means something on string opcodes
        rep: if op.is_string() { rep } else { None },
        lock,
        segment_override: cursor.segment_override,
        length: cursor.consumed,
    })
}

// 0x00-0x3F: the eight ALU ops in six encodings each, plus segment
// push/pop and the decimal adjusts in the x6/x7/xE/xF slots
fn decode_alu_block(c: &mut Cursor<'_>, opcode: u8) -> Decoded {
    match opcode & 0x07 {
        0x00..=0x05 => {
            let alu = AluOp::from_index(opcode >> 3);
            let width = Width::from_w_bit(opcode);
            let operands = match opcode & 0x07 {
                // op r/m, reg
                0x00 | 0x01 => {
                    let modrm = c.modrm();
                    let rm = c.rm(modrm, width);
                    vec![rm, Operand::register(modrm.reg, width)]
                }
                // op reg, r/m
                0x02 | 0x03 => {
                    let modrm = c.modrm();
                    let rm = c.rm(modrm, width);
                    vec![Operand::register(modrm.reg, width), rm]
                }
                // op AL/AX, imm
                _ => vec![acc(width), c.imm(width)],
            };
            Ok((Op::Alu(alu), operands))
        }
        _ => match opcode {
            0x06 | 0x0E | 0x16 | 0x1E => {
                Ok((Op::Push, vec![Operand::Seg(SegReg::from_index(opcode >> 3))]))
            }
            0x07 | 0x17 | 0x1F => Ok((Op::Pop, vec![Operand::Seg(SegReg::from_index(opcode >> 3))])),
            0x27 => Ok((Op::Daa, vec![])),
            0x2F => Ok((Op::Das, vec![])),
            0x37 => Ok((Op::Aaa, vec![])),
            0x3F => Ok((Op::Aas, vec![])),
            // 0x0F (POP CS / 286 escape) and stray prefixes
            _ => Err(DecodeError::InvalidOpcode(opcode)),
        },
    }
}

// INC r16 / DEC r16
fn decode_4x(_c: &mut Cursor<'_>, opcode: u8) -> Decoded {
    let reg = Operand::Reg16(Reg16::from_index(opcode));
    let op = if opcode < 0x48 { Op::Inc } else { Op::Dec };
    Ok((op, vec![reg]))
}

// PUSH r16 / POP r16
fn decode_5x(_c: &mut Cursor<'_>, opcode: u8) -> Decoded {
    let reg = Operand::Reg16(Reg16::from_index(opcode));
    let op = if opcode < 0x58 { Op::Push } else { Op::Pop };
    Ok((op, vec![reg]))
}

// 80186 additions
fn decode_6x(c: &mut Cursor<'_>, opcode: u8) -> Decoded {
    if (0x63..=0x67).contains(&opcode) {
        return Err(DecodeError::InvalidOpcode(opcode));
    }
    c.require_80186(opcode)?;
    match opcode {
        0x60 => Ok((Op::Pusha, vec![])),
        0x61 => Ok((Op::Popa, vec![])),
        // BOUND r16, m16&16
        0x62 => {
            let modrm = c.modrm();
            let mem = c.mem(opcode, modrm, Width::Word)?;
            Ok((Op::Bound, vec![Operand::register(modrm.reg, Width::Word), mem]))
        }
        0x68 => Ok((Op::Push, vec![c.imm(Width::Word)])),
        0x6A => Ok((Op::Push, vec![c.imm8_sx()])),
        // IMUL r16, r/m16, imm16 / imm8
        0x69 | 0x6B => {
            let modrm = c.modrm();
            let rm = c.rm(modrm, Width::Word);
            let imm = if opcode == 0x69 {
                c.imm(Width::Word)
            } else {
                c.imm8_sx()
            };
            Ok((Op::Imul3, vec![Operand::register(modrm.reg, Width::Word), rm, imm]))
        }
        0x6C => Ok((Op::Ins(Width::Byte), vec![])),
        0x6D => Ok((Op::Ins(Width::Word), vec![])),
        0x6E => Ok((Op::Outs(Width::Byte), vec![])),
        _ => Ok((Op::Outs(Width::Word), vec![])),
    }
}

// Jcc rel8
fn decode_7x(c: &mut Cursor<'_>, opcode: u8) -> Decoded {
    Ok((Op::Jcc(Condition::from_nibble(opcode)), vec![c.rel8()]))
}

fn decode_8x(c: &mut Cursor<'_>, opcode: u8) -> Decoded {
    let width = Width::from_w_bit(opcode);
    match opcode {
        // Group 1: ALU r/m, imm (0x82 aliases 0x80)
        0x80..=0x83 => {
            let modrm = c.modrm();
            let rm = c.rm(modrm, width);
            let imm = if opcode == 0x83 {
                c.imm8_sx()
            } else {
                c.imm(width)
            };
            Ok((Op::Alu(AluOp::from_index(modrm.reg)), vec![rm, imm]))
        }
        // TEST / XCHG / MOV r/m, reg forms
        0x84..=0x89 => {
            let modrm = c.modrm();
            let rm = c.rm(modrm, width);
            let reg = Operand::register(modrm.reg, width);
            let op = match opcode {
                0x84 | 0x85 => Op::Test,
                0x86 | 0x87 => Op::Xchg,
                _ => Op::Mov,
            };
            Ok((op, vec![rm, reg]))
        }
        // MOV reg, r/m
        0x8A | 0x8B => {
            let modrm = c.modrm();
            let rm = c.rm(modrm, width);
            Ok((Op::Mov, vec![Operand::register(modrm.reg, width), rm]))
        }
        // MOV r/m16, sreg
        0x8C => {
            let modrm = c.modrm();
            let rm = c.rm(modrm, Width::Word);
            Ok((Op::Mov, vec![rm, Operand::Seg(SegReg::from_index(modrm.reg))]))
        }
        // LEA r16, m
        0x8D => {
            let modrm = c.modrm();
            let mem = c.mem(opcode, modrm, Width::Word)?;
            Ok((Op::Lea, vec![Operand::register(modrm.reg, Width::Word), mem]))
        }
        // MOV sreg, r/m16
        0x8E => {
            let modrm = c.modrm();
            let rm = c.rm(modrm, Width::Word);
            Ok((Op::Mov, vec![Operand::Seg(SegReg::from_index(modrm.reg)), rm]))
        }
        // POP r/m16
        _ => {
            let modrm = c.modrm();
            if modrm.reg != 0 {
                return Err(DecodeError::InvalidExtension {
                    opcode,
                    reg: modrm.reg,
                });
            }
            Ok((Op::Pop, vec![c.rm(modrm, Width::Word)]))
        }
    }
}

fn decode_9x(c: &mut Cursor<'_>, opcode: u8) -> Decoded {
    match opcode {
        0x90 => Ok((Op::Nop, vec![])),
        0x91..=0x97 => Ok((
            Op::Xchg,
            vec![Operand::Reg16(Reg16::AX), Operand::Reg16(Reg16::from_index(opcode))],
        )),
        0x98 => Ok((Op::Cbw, vec![])),
        0x99 => Ok((Op::Cwd, vec![])),
        // CALL ptr16:16
        0x9A => {
            let offset = c.u16();
            let segment = c.u16();
            Ok((Op::CallFar, vec![Operand::Far { segment, offset }]))
        }
        0x9B => Ok((Op::Wait, vec![])),
        0x9C => Ok((Op::Pushf, vec![])),
        0x9D => Ok((Op::Popf, vec![])),
        0x9E => Ok((Op::Sahf, vec![])),
        _ => Ok((Op::Lahf, vec![])),
    }
}

fn decode_ax(c: &mut Cursor<'_>, opcode: u8) -> Decoded {
    let width = Width::from_w_bit(opcode);
    match opcode {
        0xA0 | 0xA1 => {
            let mem = c.moffs(width);
            Ok((Op::Mov, vec![acc(width), mem]))
        }
        0xA2 | 0xA3 => {
            let mem = c.moffs(width);
            Ok((Op::Mov, vec![mem, acc(width)]))
        }
        0xA4 | 0xA5 => Ok((Op::Movs(width), vec![])),
        0xA6 | 0xA7 => Ok((Op::Cmps(width), vec![])),
        0xA8 | 0xA9 => Ok((Op::Test, vec![acc(width), c.imm(width)])),
        0xAA | 0xAB => Ok((Op::Stos(width), vec![])),
        0xAC | 0xAD => Ok((Op::Lods(width), vec![])),
        _ => Ok((Op::Scas(width), vec![])),
    }
}

// MOV reg, imm
fn decode_bx(c: &mut Cursor<'_>, opcode: u8) -> Decoded {
    let width = if opcode & 0x08 != 0 {
        Width::Word
    } else {
        Width::Byte
    };
    let reg = Operand::register(opcode & 0x07, width);
    Ok((Op::Mov, vec![reg, c.imm(width)]))
}

/// Shift group operands: r/m plus count
fn shift_group(c: &mut Cursor<'_>, width: Width, count: ShiftCount) -> Decoded {
    let modrm = c.modrm();
    let rm = c.rm(modrm, width);
    let count = match count {
        ShiftCount::One => Operand::Imm(1, Width::Byte),
        ShiftCount::Cl => Operand::Reg8(Reg8::CL),
        ShiftCount::Imm8 => c.imm(Width::Byte),
    };
    Ok((Op::Shift(ShiftOp::from_index(modrm.reg)), vec![rm, count]))
}

enum ShiftCount {
    One,
    Cl,
    Imm8,
}

fn decode_cx(c: &mut Cursor<'_>, opcode: u8) -> Decoded {
    let width = Width::from_w_bit(opcode);
    match opcode {
        0xC0 | 0xC1 => {
            c.require_80186(opcode)?;
            shift_group(c, width, ShiftCount::Imm8)
        }
        0xC2 => Ok((Op::Ret, vec![c.imm(Width::Word)])),
        0xC3 => Ok((Op::Ret, vec![])),
        0xC4 | 0xC5 => {
            let modrm = c.modrm();
            let mem = c.mem(opcode, modrm, Width::Word)?;
            let op = if opcode == 0xC4 { Op::Les } else { Op::Lds };
            Ok((op, vec![Operand::register(modrm.reg, Width::Word), mem]))
        }
        // MOV r/m, imm
        0xC6 | 0xC7 => {
            let modrm = c.modrm();
            if modrm.reg != 0 {
                return Err(DecodeError::InvalidExtension {
                    opcode,
                    reg: modrm.reg,
                });
            }
            let rm = c.rm(modrm, width);
            Ok((Op::Mov, vec![rm, c.imm(width)]))
        }
        0xC8 => {
            c.require_80186(opcode)?;
            let size = c.imm(Width::Word);
            let level = c.imm(Width::Byte);
            Ok((Op::Enter, vec![size, level]))
        }
        0xC9 => {
            c.require_80186(opcode)?;
            Ok((Op::Leave, vec![]))
        }
        0xCA => Ok((Op::RetFar, vec![c.imm(Width::Word)])),
        0xCB => Ok((Op::RetFar, vec![])),
        0xCC => Ok((Op::Int3, vec![])),
        0xCD => Ok((Op::Int, vec![c.imm(Width::Byte)])),
        0xCE => Ok((Op::Into, vec![])),
        _ => Ok((Op::Iret, vec![])),
    }
}

fn decode_dx(c: &mut Cursor<'_>, opcode: u8) -> Decoded {
    let width = Width::from_w_bit(opcode);
    match opcode {
        0xD0 | 0xD1 => shift_group(c, width, ShiftCount::One),
        0xD2 | 0xD3 => shift_group(c, width, ShiftCount::Cl),
        0xD4 => Ok((Op::Aam, vec![c.imm(Width::Byte)])),
        0xD5 => Ok((Op::Aad, vec![c.imm(Width::Byte)])),
        0xD6 => Ok((Op::Salc, vec![])),
        0xD7 => Ok((Op::Xlat, vec![])),
        // ESC: FPU opcodes, decoded for their operand only
        _ => {
            let modrm = c.modrm();
            let rm = c.rm(modrm, Width::Word);
            Ok((Op::Esc(((opcode & 0x07) << 3) | modrm.reg), vec![rm]))
        }
    }
}

fn decode_ex(c: &mut Cursor<'_>, opcode: u8) -> Decoded {
    let width = Width::from_w_bit(opcode);
    match opcode {
        0xE0 => Ok((Op::Loopne, vec![c.rel8()])),
        0xE1 => Ok((Op::Loope, vec![c.rel8()])),
        0xE2 => Ok((Op::Loop, vec![c.rel8()])),
        0xE3 => Ok((Op::Jcxz, vec![c.rel8()])),
        0xE4 | 0xE5 => Ok((Op::In, vec![acc(width), c.imm(Width::Byte)])),
        0xE6 | 0xE7 => {
            let port = c.imm(Width::Byte);
            Ok((Op::Out, vec![port, acc(width)]))
        }
        0xE8 => Ok((Op::Call, vec![c.rel16()])),
        0xE9 => Ok((Op::Jmp, vec![c.rel16()])),
        0xEA => {
            let offset = c.u16();
            let segment = c.u16();
            Ok((Op::JmpFar, vec![Operand::Far { segment, offset }]))
        }
        0xEB => Ok((Op::Jmp, vec![c.rel8()])),
        0xEC | 0xED => Ok((Op::In, vec![acc(width), Operand::Reg16(Reg16::DX)])),
        _ => Ok((Op::Out, vec![Operand::Reg16(Reg16::DX), acc(width)])),
    }
}

fn decode_fx(c: &mut Cursor<'_>, opcode: u8) -> Decoded {
    let width = Width::from_w_bit(opcode);
    match opcode {
        0xF4 => Ok((Op::Hlt, vec![])),
        0xF5 => Ok((Op::Cmc, vec![])),
        // Group 3 (/1 is an undocumented alias of TEST)
        0xF6 | 0xF7 => {
            let modrm = c.modrm();
            let rm = c.rm(modrm, width);
            match modrm.reg {
                0 | 1 => Ok((Op::Test, vec![rm, c.imm(width)])),
                2 => Ok((Op::Not, vec![rm])),
                3 => Ok((Op::Neg, vec![rm])),
                4 => Ok((Op::Mul, vec![rm])),
                5 => Ok((Op::Imul, vec![rm])),
                6 => Ok((Op::Div, vec![rm])),
                _ => Ok((Op::Idiv, vec![rm])),
            }
        }
        0xF8 => Ok((Op::Clc, vec![])),
        0xF9 => Ok((Op::Stc, vec![])),
        0xFA => Ok((Op::Cli, vec![])),
        0xFB => Ok((Op::Sti, vec![])),
        0xFC => Ok((Op::Cld, vec![])),
        0xFD => Ok((Op::Std, vec![])),
        // Group 4: INC/DEC r/m8
        0xFE => {
            let modrm = c.modrm();
            let op = match modrm.reg {
                0 => Op::Inc,
                1 => Op::Dec,
                reg => return Err(DecodeError::InvalidExtension { opcode, reg }),
            };
            Ok((op, vec![c.rm(modrm, Width::Byte)]))
        }
        // Group 5
        0xFF => {
            let modrm = c.modrm();
            match modrm.reg {
                0 => Ok((Op::Inc, vec![c.rm(modrm, Width::Word)])),
                1 => Ok((Op::Dec, vec![c.rm(modrm, Width::Word)])),
                2 => Ok((Op::Call, vec![c.rm(modrm, Width::Word)])),
                3 => Ok((Op::CallFar, vec![c.mem(opcode, modrm, Width::Word)?])),
                4 => Ok((Op::Jmp, vec![c.rm(modrm, Width::Word)])),
                5 => Ok((Op::JmpFar, vec![c.mem(opcode, modrm, Width::Word)?])),
                6 => Ok((Op::Push, vec![c.rm(modrm, Width::Word)])),
                reg => Err(DecodeError::InvalidExtension { opcode, reg }),
            }
        }
        // 0xF1 and prefixes out of place
        _ => Err(DecodeError::InvalidOpcode(opcode)),
    }
}
