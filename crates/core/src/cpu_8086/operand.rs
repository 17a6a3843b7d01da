//! Operand resolution
//!
//! The decoder turns a ModR/M byte plus its trailing displacement into an
//! [`Operand`]; the executor only ever touches registers and memory through
//! [`Operand::get`] and [`Operand::set`].

use super::memory::{physical_address, Memory8086};
use super::registers::{Reg16, Reg8, RegisterFile, SegReg, Width};
use super::{Cpu8086, CpuError};
use std::fmt;

/// Decoded ModR/M byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModRm {
    /// Bits 7-6: addressing mode (0b11 = register)
    pub mode: u8,
    /// Bits 5-3: register or opcode extension
    pub reg: u8,
    /// Bits 2-0: register or base/index selector
    pub rm: u8,
}

impl ModRm {
    #[inline]
    pub fn decode(byte: u8) -> Self {
        Self {
            mode: (byte >> 6) & 0x03,
            reg: (byte >> 3) & 0x07,
            rm: byte & 0x07,
        }
    }

    /// True when the r/m field names a register rather than memory
    #[inline]
    pub fn is_register(&self) -> bool {
        self.mode == 0b11
    }

    /// Number of displacement bytes that follow the ModR/M byte
    #[inline]
    pub fn displacement_len(&self) -> usize {
        match self.mode {
            0b00 if self.rm == 0b110 => 2,
            0b01 => 1,
            0b10 => 2,
            _ => 0,
        }
    }
}

/// Base/index part of a 16-bit effective address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressBase {
    BxSi,
    BxDi,
    BpSi,
    BpDi,
    Si,
    Di,
    Bp,
    Bx,
    /// `[disp16]` with no registers (mod=00, rm=110)
    Direct,
}

impl AddressBase {
    fn from_modrm(modrm: ModRm) -> Self {
        match modrm.rm {
            0b000 => AddressBase::BxSi,
            0b001 => AddressBase::BxDi,
            0b010 => AddressBase::BpSi,
            0b011 => AddressBase::BpDi,
            0b100 => AddressBase::Si,
            0b101 => AddressBase::Di,
            0b110 if modrm.mode == 0b00 => AddressBase::Direct,
            0b110 => AddressBase::Bp,
            _ => AddressBase::Bx,
        }
    }

    /// BP-based forms default to SS, everything else to DS
    pub fn default_segment(self) -> SegReg {
        match self {
            AddressBase::BpSi | AddressBase::BpDi | AddressBase::Bp => SegReg::SS,
            _ => SegReg::DS,
        }
    }

    /// Sum of the base/index registers (without displacement)
    pub fn base_offset(self, regs: &RegisterFile) -> u16 {
        let bx = regs.get16(Reg16::BX);
        let bp = regs.get16(Reg16::BP);
        let si = regs.get16(Reg16::SI);
        let di = regs.get16(Reg16::DI);
        match self {
            AddressBase::BxSi => bx.wrapping_add(si),
            AddressBase::BxDi => bx.wrapping_add(di),
            AddressBase::BpSi => bp.wrapping_add(si),
            AddressBase::BpDi => bp.wrapping_add(di),
            AddressBase::Si => si,
            AddressBase::Di => di,
            AddressBase::Bp => bp,
            AddressBase::Bx => bx,
            AddressBase::Direct => 0,
        }
    }

    fn name(self) -> Option<&'static str> {
        match self {
            AddressBase::BxSi => Some("bx+si"),
            AddressBase::BxDi => Some("bx+di"),
            AddressBase::BpSi => Some("bp+si"),
            AddressBase::BpDi => Some("bp+di"),
            AddressBase::Si => Some("si"),
            AddressBase::Di => Some("di"),
            AddressBase::Bp => Some("bp"),
            AddressBase::Bx => Some("bx"),
            AddressBase::Direct => None,
        }
    }
}

/// A memory location bound to a segment, resolved when decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRef {
    /// Segment register the reference is relative to
    pub segment_reg: SegReg,
    /// Value of that segment register at decode time
    pub segment: u16,
    /// Effective address (offset within the segment)
    pub offset: u16,
    /// Address expression, kept for disassembly
    pub base: AddressBase,
    /// Signed displacement (disp8 already sign-extended)
    pub displacement: i16,
    /// True when a segment-override prefix selected `segment_reg`
    pub explicit_segment: bool,
}

impl MemoryRef {
    /// Physical address of the first byte
    #[inline]
    pub fn physical(&self) -> u32 {
        physical_address(self.segment, self.offset)
    }

    /// The same reference `delta` bytes further on (offset wraps in-segment)
    #[inline]
    pub fn advanced(&self, delta: u16) -> MemoryRef {
        MemoryRef {
            offset: self.offset.wrapping_add(delta),
            displacement: self.displacement.wrapping_add(delta as i16),
            ..*self
        }
    }

    /// Reference to an absolute segment:offset, as used by XLAT and MOV moffs
    pub fn direct(segment_reg: SegReg, regs: &RegisterFile, offset: u16, explicit: bool) -> Self {
        MemoryRef {
            segment_reg,
            segment: regs.seg(segment_reg),
            offset,
            base: AddressBase::Direct,
            displacement: offset as i16,
            explicit_segment: explicit,
        }
    }
}

impl fmt::Display for MemoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.explicit_segment {
            write!(f, "{}:", self.segment_reg)?;
        }
        match self.base.name() {
            None => write!(f, "[0x{:04x}]", self.displacement as u16),
            Some(base) => {
                write!(f, "[{}", base)?;
                match self.displacement {
                    0 => {}
                    d if d < 0 => write!(f, "-0x{:02x}", (d as i32).unsigned_abs())?,
                    d => write!(f, "+0x{:02x}", d)?,
                }
                f.write_str("]")
            }
        }
    }
}

/// A resolved instruction operand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Reg8(Reg8),
    Reg16(Reg16),
    Seg(SegReg),
    Mem(MemoryRef, Width),
    /// Immediate, already sign-extended to its width where the encoding asks for it
    Imm(u16, Width),
    /// Near branch target (absolute offset in CS)
    Near(u16),
    /// Far pointer immediate
    Far { segment: u16, offset: u16 },
}

impl Operand {
    /// Width of the value this operand holds
    pub fn width(&self) -> Width {
        match self {
            Operand::Reg8(_) => Width::Byte,
            Operand::Mem(_, w) | Operand::Imm(_, w) => *w,
            _ => Width::Word,
        }
    }

    /// Register or memory operand of the given width, as selected by the
    /// `reg` field of a ModR/M byte
    pub fn register(index: u8, width: Width) -> Self {
        match width {
            Width::Byte => Operand::Reg8(Reg8::from_index(index)),
            Width::Word => Operand::Reg16(Reg16::from_index(index)),
        }
    }

    /// True for memory operands
    #[inline]
    pub fn is_memory(&self) -> bool {
        matches!(self, Operand::Mem(..))
    }

    /// Read the operand's current value
    pub fn get<M: Memory8086>(&self, cpu: &Cpu8086<M>) -> u16 {
        match *self {
            Operand::Reg8(r) => cpu.regs.get8(r) as u16,
            Operand::Reg16(r) => cpu.regs.get16(r),
            Operand::Seg(s) => cpu.regs.seg(s),
            Operand::Mem(m, Width::Byte) => cpu.memory.get_byte(m.segment, m.offset) as u16,
            Operand::Mem(m, Width::Word) => cpu.memory.get_word(m.segment, m.offset),
            Operand::Imm(v, w) => v & w.mask(),
            Operand::Near(target) => target,
            Operand::Far { offset, .. } => offset,
        }
    }

    /// Store a value, truncated to the operand's width
    pub fn set<M: Memory8086>(&self, cpu: &mut Cpu8086<M>, val: u16) -> Result<(), CpuError> {
        match *self {
            Operand::Reg8(r) => cpu.regs.set8(r, val as u8),
            Operand::Reg16(r) => cpu.regs.set16(r, val),
            Operand::Seg(s) => cpu.regs.set_seg(s, val),
            Operand::Mem(m, Width::Byte) => cpu.memory.set_byte(m.segment, m.offset, val as u8),
            Operand::Mem(m, Width::Word) => cpu.memory.set_word(m.segment, m.offset, val),
            Operand::Imm(..) | Operand::Near(_) | Operand::Far { .. } => {
                return Err(CpuError::ReadOnlyOperand {
                    operand: self.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Read a far pointer (offset, then segment) from a memory operand
    pub fn get_far<M: Memory8086>(&self, cpu: &Cpu8086<M>) -> Option<(u16, u16)> {
        match *self {
            Operand::Mem(m, _) => {
                let offset = cpu.memory.get_word(m.segment, m.offset);
                let segment = cpu.memory.get_word(m.segment, m.offset.wrapping_add(2));
                Some((segment, offset))
            }
            Operand::Far { segment, offset } => Some((segment, offset)),
            _ => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg8(r) => write!(f, "{}", r),
            Operand::Reg16(r) => write!(f, "{}", r),
            Operand::Seg(s) => write!(f, "{}", s),
            Operand::Mem(m, Width::Byte) => write!(f, "byte {}", m),
            Operand::Mem(m, Width::Word) => write!(f, "word {}", m),
            Operand::Imm(v, Width::Byte) => write!(f, "0x{:02x}", v & 0xFF),
            Operand::Imm(v, Width::Word) => write!(f, "0x{:04x}", v),
            Operand::Near(target) => write!(f, "0x{:04x}", target),
            Operand::Far { segment, offset } => write!(f, "0x{:04x}:0x{:04x}", segment, offset),
        }
    }
}

/// Resolve the r/m half of a ModR/M byte into a register or memory operand.
///
/// `displacement` is the raw little-endian value that followed the ModR/M
/// byte (ignored when [`ModRm::displacement_len`] is 0); a one-byte
/// displacement is sign-extended here.
pub fn resolve_rm(
    regs: &RegisterFile,
    modrm: ModRm,
    displacement: u16,
    width: Width,
    segment_override: Option<SegReg>,
) -> Operand {
    if modrm.is_register() {
        return Operand::register(modrm.rm, width);
    }

    let displacement = match modrm.displacement_len() {
        1 => displacement as u8 as i8 as i16,
        2 => displacement as i16,
        _ => 0,
    };
    let base = AddressBase::from_modrm(modrm);
    let offset = base.base_offset(regs).wrapping_add(displacement as u16);
    let segment_reg = segment_override.unwrap_or_else(|| base.default_segment());

    Operand::Mem(
        MemoryRef {
            segment_reg,
            segment: regs.seg(segment_reg),
            offset,
            base,
            displacement,
            explicit_segment: segment_override.is_some(),
        },
        width,
    )
}
