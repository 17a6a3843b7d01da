//! FLAGS register and the shared flag-update routines
//!
//! Every arithmetic and logical opcode funnels through one of the
//! `update_*` routines here, so ADD/ADC, SUB/SBB/CMP/NEG and
//! AND/OR/XOR/TEST share identical flag semantics.

use super::registers::Width;
use serde::{Deserialize, Serialize};
use std::fmt;

// CPU flags (FLAGS register bits)
pub const FLAG_CF: u32 = 0x0001; // Carry Flag
pub const FLAG_RESERVED: u32 = 0x0002; // Always reads as 1
pub const FLAG_PF: u32 = 0x0004; // Parity Flag
pub const FLAG_AF: u32 = 0x0010; // Auxiliary Carry Flag
pub const FLAG_ZF: u32 = 0x0040; // Zero Flag
pub const FLAG_SF: u32 = 0x0080; // Sign Flag
pub const FLAG_TF: u32 = 0x0100; // Trap Flag
pub const FLAG_IF: u32 = 0x0200; // Interrupt Enable Flag
pub const FLAG_DF: u32 = 0x0400; // Direction Flag
pub const FLAG_OF: u32 = 0x0800; // Overflow Flag
pub const FLAG_VM: u32 = 0x2_0000; // Virtual-8086 mode (EFLAGS bit 17)

/// Arithmetic status flags: the ones a host service may hand back to the guest
pub const STATUS_FLAGS: u32 = FLAG_CF | FLAG_PF | FLAG_AF | FLAG_ZF | FLAG_SF | FLAG_OF;

/// Bits of the 16-bit FLAGS word that POPF/SAHF/IRET may change
const WRITABLE_WORD: u32 = STATUS_FLAGS | FLAG_TF | FLAG_IF | FLAG_DF;

/// Even parity of the low byte
#[inline]
pub fn parity(val: u8) -> bool {
    val.count_ones() % 2 == 0
}

/// Jcc/LOOP condition codes, in opcode order (low nibble of 0x70-0x7F)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    O = 0x0,
    No = 0x1,
    B = 0x2,
    Ae = 0x3,
    E = 0x4,
    Ne = 0x5,
    Be = 0x6,
    A = 0x7,
    S = 0x8,
    Ns = 0x9,
    P = 0xA,
    Np = 0xB,
    L = 0xC,
    Ge = 0xD,
    Le = 0xE,
    G = 0xF,
}

impl Condition {
    const ALL: [Condition; 16] = [
        Condition::O,
        Condition::No,
        Condition::B,
        Condition::Ae,
        Condition::E,
        Condition::Ne,
        Condition::Be,
        Condition::A,
        Condition::S,
        Condition::Ns,
        Condition::P,
        Condition::Np,
        Condition::L,
        Condition::Ge,
        Condition::Le,
        Condition::G,
    ];

    /// Decode the low nibble of a Jcc opcode
    #[inline]
    pub fn from_nibble(nibble: u8) -> Self {
        Self::ALL[(nibble & 0x0F) as usize]
    }

    pub fn suffix(self) -> &'static str {
        match self {
            Condition::O => "o",
            Condition::No => "no",
            Condition::B => "b",
            Condition::Ae => "ae",
            Condition::E => "e",
            Condition::Ne => "ne",
            Condition::Be => "be",
            Condition::A => "a",
            Condition::S => "s",
            Condition::Ns => "ns",
            Condition::P => "p",
            Condition::Np => "np",
            Condition::L => "l",
            Condition::Ge => "ge",
            Condition::Le => "le",
            Condition::G => "g",
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// FLAGS register
///
/// Stored as 32 bits so the VM bit has somewhere to live; the real-mode
/// FLAGS word pushed by PUSHF/INT is the low 16 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flags {
    bits: u32,
}

impl Default for Flags {
    fn default() -> Self {
        Self {
            bits: FLAG_RESERVED,
        }
    }
}

impl Flags {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get(&self, flag: u32) -> bool {
        self.bits & flag != 0
    }

    #[inline]
    pub fn set(&mut self, flag: u32, value: bool) {
        if value {
            self.bits |= flag;
        } else {
            self.bits &= !flag;
        }
    }

    /// Full register including the VM bit
    #[inline]
    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// The 16-bit FLAGS word as pushed on the stack
    #[inline]
    pub fn word(&self) -> u16 {
        (self.bits & 0xFFFF) as u16
    }

    /// Load a FLAGS word (POPF/IRET). The reserved bit stays set and the
    /// upper bits are preserved.
    pub fn set_word(&mut self, word: u16) {
        self.bits = (self.bits & !WRITABLE_WORD) | (word as u32 & WRITABLE_WORD) | FLAG_RESERVED;
    }

    /// Low byte as stored by LAHF (SF ZF - AF - PF 1 CF)
    #[inline]
    pub fn low_byte(&self) -> u8 {
        (self.word() & 0xFF) as u8 | FLAG_RESERVED as u8
    }

    /// SAHF: load SF, ZF, AF, PF and CF from a byte
    pub fn set_low_byte(&mut self, byte: u8) {
        let mask = FLAG_SF | FLAG_ZF | FLAG_AF | FLAG_PF | FLAG_CF;
        self.bits = (self.bits & !mask) | (byte as u32 & mask);
    }

    /// Replace only the arithmetic status flags with those from `other`
    pub fn merge_status(&mut self, other: u32) {
        self.bits = (self.bits & !STATUS_FLAGS) | (other & STATUS_FLAGS);
    }

    /// Set ZF, SF and PF from a result of the given width
    #[inline]
    pub fn update_szp(&mut self, result: u16, width: Width) {
        let result = result & width.mask();
        self.set(FLAG_ZF, result == 0);
        self.set(FLAG_SF, result & width.sign_bit() != 0);
        self.set(FLAG_PF, parity(result as u8));
    }

    /// Addition with carry-in; shared by ADD, ADC and INC
    fn add_with_carry(&mut self, dest: u16, src: u16, carry_in: bool, width: Width) -> u16 {
        let mask = width.mask() as u32;
        let a = dest as u32 & mask;
        let b = src as u32 & mask;
        let full = a + b + carry_in as u32;
        let result = (full & mask) as u16;
        let sign = width.sign_bit();

        self.set(FLAG_CF, full > mask);
        self.set(FLAG_OF, (!(a ^ b) & (a ^ full)) as u16 & sign != 0);
        self.set(FLAG_AF, ((a ^ b ^ full) & 0x10) != 0);
        self.update_szp(result, width);
        result
    }

    /// Subtraction with borrow-in; shared by SUB, SBB, CMP, NEG and DEC
    fn sub_with_borrow(&mut self, dest: u16, src: u16, borrow_in: bool, width: Width) -> u16 {
        let mask = width.mask() as u32;
        let a = dest as u32 & mask;
        let b = src as u32 & mask;
        let full = a.wrapping_sub(b).wrapping_sub(borrow_in as u32);
        let result = (full & mask) as u16;
        let sign = width.sign_bit();

        self.set(FLAG_CF, b + (borrow_in as u32) > a);
        self.set(FLAG_OF, ((a ^ b) & (a ^ full)) as u16 & sign != 0);
        self.set(FLAG_AF, ((a ^ b ^ full) & 0x10) != 0);
        self.update_szp(result, width);
        result
    }

    /// ADD: returns the truncated result and sets CF, OF, AF, ZF, SF, PF
    #[inline]
    pub fn update_add(&mut self, dest: u16, src: u16, width: Width) -> u16 {
        self.add_with_carry(dest, src, false, width)
    }

    /// ADC: folds the current CF in as carry-in
    #[inline]
    pub fn update_adc(&mut self, dest: u16, src: u16, width: Width) -> u16 {
        let carry = self.get(FLAG_CF);
        self.add_with_carry(dest, src, carry, width)
    }

    /// SUB/CMP: returns the truncated result and sets CF, OF, AF, ZF, SF, PF
    #[inline]
    pub fn update_sub(&mut self, dest: u16, src: u16, width: Width) -> u16 {
        self.sub_with_borrow(dest, src, false, width)
    }

    /// SBB: folds the current CF in as borrow-in
    #[inline]
    pub fn update_sbb(&mut self, dest: u16, src: u16, width: Width) -> u16 {
        let borrow = self.get(FLAG_CF);
        self.sub_with_borrow(dest, src, borrow, width)
    }

    /// INC: like ADD 1 but CF is preserved
    pub fn update_inc(&mut self, dest: u16, width: Width) -> u16 {
        let cf = self.get(FLAG_CF);
        let result = self.add_with_carry(dest, 1, false, width);
        self.set(FLAG_CF, cf);
        result
    }

    /// DEC: like SUB 1 but CF is preserved
    pub fn update_dec(&mut self, dest: u16, width: Width) -> u16 {
        let cf = self.get(FLAG_CF);
        let result = self.sub_with_borrow(dest, 1, false, width);
        self.set(FLAG_CF, cf);
        result
    }

    fn logic(&mut self, result: u16, width: Width) -> u16 {
        let result = result & width.mask();
        self.set(FLAG_CF, false);
        self.set(FLAG_OF, false);
        self.update_szp(result, width);
        result
    }

    /// AND/TEST: CF=OF=0, SZP from the result, AF untouched
    #[inline]
    pub fn update_and(&mut self, dest: u16, src: u16, width: Width) -> u16 {
        self.logic(dest & src, width)
    }

    /// OR: CF=OF=0, SZP from the result, AF untouched
    #[inline]
    pub fn update_or(&mut self, dest: u16, src: u16, width: Width) -> u16 {
        self.logic(dest | src, width)
    }

    /// XOR: CF=OF=0, SZP from the result, AF untouched
    #[inline]
    pub fn update_xor(&mut self, dest: u16, src: u16, width: Width) -> u16 {
        self.logic(dest ^ src, width)
    }

    /// Evaluate a Jcc condition
    pub fn condition(&self, cond: Condition) -> bool {
        match cond {
            Condition::O => self.get(FLAG_OF),
            Condition::No => !self.get(FLAG_OF),
            Condition::B => self.get(FLAG_CF),
            Condition::Ae => !self.get(FLAG_CF),
            Condition::E => self.get(FLAG_ZF),
            Condition::Ne => !self.get(FLAG_ZF),
            Condition::Be => self.get(FLAG_CF) || self.get(FLAG_ZF),
            Condition::A => !self.get(FLAG_CF) && !self.get(FLAG_ZF),
            Condition::S => self.get(FLAG_SF),
            Condition::Ns => !self.get(FLAG_SF),
            Condition::P => self.get(FLAG_PF),
            Condition::Np => !self.get(FLAG_PF),
            Condition::L => self.get(FLAG_SF) != self.get(FLAG_OF),
            Condition::Ge => self.get(FLAG_SF) == self.get(FLAG_OF),
            Condition::Le => self.get(FLAG_ZF) || (self.get(FLAG_SF) != self.get(FLAG_OF)),
            Condition::G => !self.get(FLAG_ZF) && (self.get(FLAG_SF) == self.get(FLAG_OF)),
        }
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (FLAG_OF, 'O'),
            (FLAG_DF, 'D'),
            (FLAG_IF, 'I'),
            (FLAG_TF, 'T'),
            (FLAG_SF, 'S'),
            (FLAG_ZF, 'Z'),
            (FLAG_AF, 'A'),
            (FLAG_PF, 'P'),
            (FLAG_CF, 'C'),
        ];
        for (flag, c) in names {
            let shown = if self.get(flag) { c } else { '-' };
            write!(f, "{}", shown)?;
        }
        Ok(())
    }
}
