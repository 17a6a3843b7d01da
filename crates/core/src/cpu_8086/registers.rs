//! Register file for the 8086
//!
//! General registers are stored as eight 16-bit words in ModR/M encoding
//! order (AX, CX, DX, BX, SP, BP, SI, DI). The 8-bit registers are views onto
//! the low/high halves of AX..BX, implemented with explicit mask/shift
//! accessors so writing AL never disturbs AH and vice versa.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Operand width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Width {
    /// 8-bit operand
    Byte,
    /// 16-bit operand
    Word,
}

impl Width {
    /// Select the width from the `w` bit of an opcode
    #[inline]
    pub fn from_w_bit(opcode: u8) -> Self {
        if opcode & 1 != 0 {
            Width::Word
        } else {
            Width::Byte
        }
    }

    /// Mask covering all bits of this width
    #[inline]
    pub fn mask(self) -> u16 {
        match self {
            Width::Byte => 0x00FF,
            Width::Word => 0xFFFF,
        }
    }

    /// Most significant bit of this width
    #[inline]
    pub fn sign_bit(self) -> u16 {
        match self {
            Width::Byte => 0x0080,
            Width::Word => 0x8000,
        }
    }

    /// Size in bytes
    #[inline]
    pub fn bytes(self) -> u16 {
        match self {
            Width::Byte => 1,
            Width::Word => 2,
        }
    }

    /// Size in bits
    #[inline]
    pub fn bits(self) -> u32 {
        match self {
            Width::Byte => 8,
            Width::Word => 16,
        }
    }

    /// Sign-extend a value of this width to 32 bits
    #[inline]
    pub fn sign_extend(self, value: u16) -> i32 {
        match self {
            Width::Byte => value as u8 as i8 as i32,
            Width::Word => value as i16 as i32,
        }
    }
}

/// 16-bit general purpose registers, in ModR/M `reg` field order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reg16 {
    AX = 0,
    CX = 1,
    DX = 2,
    BX = 3,
    SP = 4,
    BP = 5,
    SI = 6,
    DI = 7,
}

impl Reg16 {
    const ALL: [Reg16; 8] = [
        Reg16::AX,
        Reg16::CX,
        Reg16::DX,
        Reg16::BX,
        Reg16::SP,
        Reg16::BP,
        Reg16::SI,
        Reg16::DI,
    ];

    /// Decode a 3-bit register field
    #[inline]
    pub fn from_index(index: u8) -> Self {
        Self::ALL[(index & 0x07) as usize]
    }

    /// Assembler name of the register
    pub fn name(self) -> &'static str {
        match self {
            Reg16::AX => "ax",
            Reg16::CX => "cx",
            Reg16::DX => "dx",
            Reg16::BX => "bx",
            Reg16::SP => "sp",
            Reg16::BP => "bp",
            Reg16::SI => "si",
            Reg16::DI => "di",
        }
    }
}

/// 8-bit registers, in ModR/M `reg` field order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reg8 {
    AL = 0,
    CL = 1,
    DL = 2,
    BL = 3,
    AH = 4,
    CH = 5,
    DH = 6,
    BH = 7,
}

impl Reg8 {
    const ALL: [Reg8; 8] = [
        Reg8::AL,
        Reg8::CL,
        Reg8::DL,
        Reg8::BL,
        Reg8::AH,
        Reg8::CH,
        Reg8::DH,
        Reg8::BH,
    ];

    /// Decode a 3-bit register field
    #[inline]
    pub fn from_index(index: u8) -> Self {
        Self::ALL[(index & 0x07) as usize]
    }

    /// The 16-bit register this byte register aliases
    #[inline]
    pub fn backing(self) -> Reg16 {
        Reg16::from_index(self as u8 & 0x03)
    }

    /// True for AH, CH, DH, BH
    #[inline]
    pub fn is_high(self) -> bool {
        (self as u8) >= 4
    }

    /// Assembler name of the register
    pub fn name(self) -> &'static str {
        match self {
            Reg8::AL => "al",
            Reg8::CL => "cl",
            Reg8::DL => "dl",
            Reg8::BL => "bl",
            Reg8::AH => "ah",
            Reg8::CH => "ch",
            Reg8::DH => "dh",
            Reg8::BH => "bh",
        }
    }
}

/// Segment registers, in ModR/M `sreg` field order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SegReg {
    ES = 0,
    CS = 1,
    SS = 2,
    DS = 3,
}

impl SegReg {
    /// Decode a 2-bit segment field (only the low two bits are used, as on the 8086)
    #[inline]
    pub fn from_index(index: u8) -> Self {
        match index & 0x03 {
            0 => SegReg::ES,
            1 => SegReg::CS,
            2 => SegReg::SS,
            _ => SegReg::DS,
        }
    }

    /// Assembler name of the register
    pub fn name(self) -> &'static str {
        match self {
            SegReg::ES => "es",
            SegReg::CS => "cs",
            SegReg::SS => "ss",
            SegReg::DS => "ds",
        }
    }
}

impl fmt::Display for Reg16 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for Reg8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for SegReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// General, segment and instruction-pointer registers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterFile {
    words: [u16; 8],
    segments: [u16; 4],
    /// Instruction pointer
    pub ip: u16,
}

impl RegisterFile {
    /// Create a register file with every register cleared
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a 16-bit register
    #[inline]
    pub fn get16(&self, reg: Reg16) -> u16 {
        self.words[reg as usize]
    }

    /// Write a 16-bit register (both halves replaced)
    #[inline]
    pub fn set16(&mut self, reg: Reg16, val: u16) {
        self.words[reg as usize] = val;
    }

    /// Read an 8-bit register
    #[inline]
    pub fn get8(&self, reg: Reg8) -> u8 {
        let word = self.words[reg.backing() as usize];
        if reg.is_high() {
            (word >> 8) as u8
        } else {
            (word & 0xFF) as u8
        }
    }

    /// Write an 8-bit register, leaving the other half of the word untouched
    #[inline]
    pub fn set8(&mut self, reg: Reg8, val: u8) {
        let slot = &mut self.words[reg.backing() as usize];
        if reg.is_high() {
            *slot = (*slot & 0x00FF) | ((val as u16) << 8);
        } else {
            *slot = (*slot & 0xFF00) | (val as u16);
        }
    }

    /// Read a segment register
    #[inline]
    pub fn seg(&self, seg: SegReg) -> u16 {
        self.segments[seg as usize]
    }

    /// Write a segment register
    #[inline]
    pub fn set_seg(&mut self, seg: SegReg, val: u16) {
        self.segments[seg as usize] = val;
    }

    /// Add a signed delta to a 16-bit register with wraparound
    #[inline]
    pub fn adjust16(&mut self, reg: Reg16, delta: i32) {
        let val = self.get16(reg);
        self.set16(reg, (val as i32).wrapping_add(delta) as u16);
    }

    /// Clear every register
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
