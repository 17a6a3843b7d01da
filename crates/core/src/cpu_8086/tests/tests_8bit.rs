//! Tests for 8-bit ALU operations and data movement

use super::{cpu_with, step_n};
use crate::cpu_8086::{Memory8086, Reg16, Reg8, FLAG_AF, FLAG_CF, FLAG_OF, FLAG_PF, FLAG_SF, FLAG_ZF};

#[test]
fn test_test_rm8_r8() {
    // TEST CL, AL
    let mut cpu = cpu_with(&[0x84, 0b11_000_001]);
    cpu.regs.set8(Reg8::AL, 0xFF);
    cpu.regs.set8(Reg8::CL, 0xAA);
    cpu.flags.set(FLAG_CF, true);
    step_n(&mut cpu, 1);

    // TEST doesn't modify operands
    assert_eq!(cpu.regs.get8(Reg8::AL), 0xFF);
    assert_eq!(cpu.regs.get8(Reg8::CL), 0xAA);
    assert!(!cpu.flags.get(FLAG_ZF));
    assert!(cpu.flags.get(FLAG_SF));
    assert!(!cpu.flags.get(FLAG_CF));
    assert!(!cpu.flags.get(FLAG_OF));
}

#[test]
fn test_test_al_imm8_zero() {
    // TEST AL, 0x0F
    let mut cpu = cpu_with(&[0xA8, 0x0F]);
    cpu.regs.set8(Reg8::AL, 0xF0);
    step_n(&mut cpu, 1);
    assert!(cpu.flags.get(FLAG_ZF));
}

#[test]
fn test_not_r8_leaves_flags() {
    // NOT AL
    let mut cpu = cpu_with(&[0xF6, 0xD0]);
    cpu.regs.set8(Reg8::AL, 0x0F);
    cpu.flags.set(FLAG_ZF, true);
    step_n(&mut cpu, 1);
    assert_eq!(cpu.regs.get8(Reg8::AL), 0xF0);
    assert!(cpu.flags.get(FLAG_ZF));
}

#[test]
fn test_add_al_imm8_wraps_to_zero() {
    // ADD AL, 0xFF
    let mut cpu = cpu_with(&[0x04, 0xFF]);
    cpu.regs.set8(Reg8::AL, 0x01);
    step_n(&mut cpu, 1);
    assert_eq!(cpu.regs.get8(Reg8::AL), 0x00);
    assert!(cpu.flags.get(FLAG_CF));
    assert!(cpu.flags.get(FLAG_ZF));
    assert!(cpu.flags.get(FLAG_AF));
    assert!(cpu.flags.get(FLAG_PF));
    assert!(!cpu.flags.get(FLAG_OF));
}

#[test]
fn test_add_signed_overflow() {
    // ADD AL, 0x7F
    let mut cpu = cpu_with(&[0x04, 0x7F]);
    cpu.regs.set8(Reg8::AL, 0x01);
    step_n(&mut cpu, 1);
    assert_eq!(cpu.regs.get8(Reg8::AL), 0x80);
    assert!(cpu.flags.get(FLAG_OF));
    assert!(cpu.flags.get(FLAG_SF));
    assert!(!cpu.flags.get(FLAG_CF));
}

#[test]
fn test_sub_rm8_r8_borrows() {
    // SUB AL, BL
    let mut cpu = cpu_with(&[0x28, 0b11_011_000]);
    cpu.regs.set8(Reg8::AL, 0x00);
    cpu.regs.set8(Reg8::BL, 0x01);
    step_n(&mut cpu, 1);
    assert_eq!(cpu.regs.get8(Reg8::AL), 0xFF);
    assert!(cpu.flags.get(FLAG_CF));
    assert!(cpu.flags.get(FLAG_SF));
    assert!(cpu.flags.get(FLAG_AF));
    assert!(!cpu.flags.get(FLAG_OF));
}

#[test]
fn test_cmp_does_not_store() {
    // CMP AL, 0x80
    let mut cpu = cpu_with(&[0x3C, 0x80]);
    cpu.regs.set8(Reg8::AL, 0x7F);
    step_n(&mut cpu, 1);
    assert_eq!(cpu.regs.get8(Reg8::AL), 0x7F);
    assert!(cpu.flags.get(FLAG_OF));
    assert!(cpu.flags.get(FLAG_CF));
    assert!(cpu.flags.get(FLAG_SF));
}

#[test]
fn test_mov_high_byte_registers() {
    // MOV AH, 0x12 ; MOV BL, AH
    let mut cpu = cpu_with(&[0xB4, 0x12, 0x88, 0b11_100_011]);
    step_n(&mut cpu, 2);
    assert_eq!(cpu.regs.get16(Reg16::AX), 0x1200);
    assert_eq!(cpu.regs.get16(Reg16::BX), 0x0012);
}

#[test]
fn test_inc_preserves_carry() {
    // INC AL
    let mut cpu = cpu_with(&[0xFE, 0xC0]);
    cpu.regs.set8(Reg8::AL, 0xFF);
    cpu.flags.set(FLAG_CF, true);
    step_n(&mut cpu, 1);
    assert_eq!(cpu.regs.get8(Reg8::AL), 0x00);
    assert!(cpu.flags.get(FLAG_CF));
    assert!(cpu.flags.get(FLAG_ZF));
    assert!(cpu.flags.get(FLAG_AF));
}

#[test]
fn test_dec_bh_overflow() {
    // DEC BH
    let mut cpu = cpu_with(&[0xFE, 0xCF]);
    cpu.regs.set8(Reg8::BH, 0x80);
    step_n(&mut cpu, 1);
    assert_eq!(cpu.regs.get8(Reg8::BH), 0x7F);
    assert!(cpu.flags.get(FLAG_OF));
    assert!(!cpu.flags.get(FLAG_SF));
}

#[test]
fn test_neg_sets_carry_unless_zero() {
    // NEG AL ; NEG AL
    let mut cpu = cpu_with(&[0xF6, 0xD8, 0xF6, 0xD8]);
    cpu.regs.set8(Reg8::AL, 0x01);
    step_n(&mut cpu, 1);
    assert_eq!(cpu.regs.get8(Reg8::AL), 0xFF);
    assert!(cpu.flags.get(FLAG_CF));

    cpu.regs.set8(Reg8::AL, 0x00);
    step_n(&mut cpu, 1);
    assert_eq!(cpu.regs.get8(Reg8::AL), 0x00);
    assert!(!cpu.flags.get(FLAG_CF));
    assert!(cpu.flags.get(FLAG_ZF));
}

#[test]
fn test_mul_byte() {
    // MUL BL
    let mut cpu = cpu_with(&[0xF6, 0xE3]);
    cpu.regs.set8(Reg8::AL, 0x10);
    cpu.regs.set8(Reg8::BL, 0x10);
    step_n(&mut cpu, 1);
    assert_eq!(cpu.regs.get16(Reg16::AX), 0x0100);
    assert!(cpu.flags.get(FLAG_CF));
    assert!(cpu.flags.get(FLAG_OF));
}

#[test]
fn test_mul_byte_fits() {
    // MUL BL
    let mut cpu = cpu_with(&[0xF6, 0xE3]);
    cpu.regs.set8(Reg8::AL, 0x05);
    cpu.regs.set8(Reg8::BL, 0x03);
    step_n(&mut cpu, 1);
    assert_eq!(cpu.regs.get16(Reg16::AX), 0x000F);
    assert!(!cpu.flags.get(FLAG_CF));
    assert!(!cpu.flags.get(FLAG_OF));
}

#[test]
fn test_imul_byte_negative() {
    // IMUL BL
    let mut cpu = cpu_with(&[0xF6, 0xEB]);
    cpu.regs.set8(Reg8::AL, 0xFF);
    cpu.regs.set8(Reg8::BL, 0x02);
    step_n(&mut cpu, 1);
    assert_eq!(cpu.regs.get16(Reg16::AX), 0xFFFE);
    assert!(!cpu.flags.get(FLAG_CF));
    assert!(!cpu.flags.get(FLAG_OF));
}

#[test]
fn test_div_byte() {
    // DIV BL
    let mut cpu = cpu_with(&[0xF6, 0xF3]);
    cpu.regs.set16(Reg16::AX, 263);
    cpu.regs.set8(Reg8::BL, 0x10);
    step_n(&mut cpu, 1);
    assert_eq!(cpu.regs.get8(Reg8::AL), 16);
    assert_eq!(cpu.regs.get8(Reg8::AH), 7);
}

#[test]
fn test_idiv_byte_signed_remainder() {
    // IDIV BL
    let mut cpu = cpu_with(&[0xF6, 0xFB]);
    cpu.regs.set16(Reg16::AX, (-7i16) as u16);
    cpu.regs.set8(Reg8::BL, 2);
    step_n(&mut cpu, 1);
    assert_eq!(cpu.regs.get8(Reg8::AL) as i8, -3);
    assert_eq!(cpu.regs.get8(Reg8::AH) as i8, -1);
}

#[test]
fn test_xchg_al_ah() {
    // XCHG AL, AH
    let mut cpu = cpu_with(&[0x86, 0b11_000_100]);
    cpu.regs.set16(Reg16::AX, 0x1234);
    step_n(&mut cpu, 1);
    assert_eq!(cpu.regs.get16(Reg16::AX), 0x3412);
}

#[test]
fn test_adc_and_sbb_use_carry() {
    // ADC AL, 0 ; SBB AL, 0
    let mut cpu = cpu_with(&[0x14, 0x00, 0x1C, 0x00]);
    cpu.regs.set8(Reg8::AL, 0xFF);
    cpu.flags.set(FLAG_CF, true);
    step_n(&mut cpu, 1);
    assert_eq!(cpu.regs.get8(Reg8::AL), 0x00);
    assert!(cpu.flags.get(FLAG_CF));

    step_n(&mut cpu, 1);
    assert_eq!(cpu.regs.get8(Reg8::AL), 0xFF);
    assert!(cpu.flags.get(FLAG_CF));
}

#[test]
fn test_logic_ops_clear_carry() {
    // AND AL, 0x0F ; OR AL, 0xF0 ; XOR AL, 0xFC
    let mut cpu = cpu_with(&[0x24, 0x0F, 0x0C, 0xF0, 0x34, 0xFC]);
    cpu.regs.set8(Reg8::AL, 0x3C);
    cpu.flags.set(FLAG_CF, true);
    cpu.flags.set(FLAG_OF, true);
    step_n(&mut cpu, 1);
    assert_eq!(cpu.regs.get8(Reg8::AL), 0x0C);
    assert!(!cpu.flags.get(FLAG_CF));
    assert!(!cpu.flags.get(FLAG_OF));

    step_n(&mut cpu, 1);
    assert_eq!(cpu.regs.get8(Reg8::AL), 0xFC);
    assert!(cpu.flags.get(FLAG_SF));

    step_n(&mut cpu, 1);
    assert_eq!(cpu.regs.get8(Reg8::AL), 0x00);
    assert!(cpu.flags.get(FLAG_ZF));
    assert!(cpu.flags.get(FLAG_PF));
}

#[test]
fn test_group1_byte_immediates() {
    // ADD BL, 5 ; CMP BL, 10
    let mut cpu = cpu_with(&[0x80, 0xC3, 0x05, 0x80, 0xFB, 0x0A]);
    cpu.regs.set8(Reg8::BL, 5);
    step_n(&mut cpu, 2);
    assert_eq!(cpu.regs.get8(Reg8::BL), 10);
    assert!(cpu.flags.get(FLAG_ZF));
}

#[test]
fn test_mov_moffs_byte() {
    // MOV [0x0200], AL ; MOV BL, [0x0200] via MOV AL, moffs after clearing
    let mut cpu = cpu_with(&[0xA2, 0x00, 0x02, 0xB0, 0x00, 0xA0, 0x00, 0x02]);
    cpu.regs.set8(Reg8::AL, 0x5A);
    step_n(&mut cpu, 1);
    assert_eq!(cpu.memory.get_byte(0x1000, 0x0200), 0x5A);

    step_n(&mut cpu, 2);
    assert_eq!(cpu.regs.get8(Reg8::AL), 0x5A);
}

#[test]
fn test_lahf_sahf() {
    // LAHF ; MOV AH, 0xD5 ; SAHF
    let mut cpu = cpu_with(&[0x9F, 0xB4, 0xD5, 0x9E]);
    cpu.flags.set(FLAG_CF, true);
    step_n(&mut cpu, 1);
    assert_eq!(cpu.regs.get8(Reg8::AH) & 0x03, 0x03);

    step_n(&mut cpu, 2);
    assert!(cpu.flags.get(FLAG_SF));
    assert!(cpu.flags.get(FLAG_ZF));
    assert!(cpu.flags.get(FLAG_AF));
    assert!(cpu.flags.get(FLAG_PF));
    assert!(cpu.flags.get(FLAG_CF));
}

#[test]
fn test_xlat() {
    // XLAT
    let mut cpu = cpu_with(&[0xD7]);
    cpu.memory.set_bytes(0x1000, 0x0300, &[0x10, 0x11, 0x55]);
    cpu.regs.set16(Reg16::BX, 0x0300);
    cpu.regs.set8(Reg8::AL, 2);
    step_n(&mut cpu, 1);
    assert_eq!(cpu.regs.get8(Reg8::AL), 0x55);
}

#[test]
fn test_salc_and_cbw() {
    // SALC ; CBW
    let mut cpu = cpu_with(&[0xD6, 0x98]);
    cpu.flags.set(FLAG_CF, true);
    cpu.regs.set16(Reg16::AX, 0x1200);
    step_n(&mut cpu, 1);
    assert_eq!(cpu.regs.get16(Reg16::AX), 0x12FF);

    step_n(&mut cpu, 1);
    assert_eq!(cpu.regs.get16(Reg16::AX), 0xFFFF);
}
