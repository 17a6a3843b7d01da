//! Tests for flag instructions and FLAGS word handling

use super::{cpu_with, step_n};
use crate::cpu_8086::{Reg16, FLAG_CF, FLAG_DF, FLAG_IF, FLAG_OF, FLAG_PF, FLAG_TF, FLAG_VM, FLAG_ZF};

#[test]
fn test_clc_stc_cmc() {
    // STC ; CMC ; CMC ; CLC
    let mut cpu = cpu_with(&[0xF9, 0xF5, 0xF5, 0xF8]);
    step_n(&mut cpu, 1);
    assert!(cpu.flags.get(FLAG_CF));
    step_n(&mut cpu, 1);
    assert!(!cpu.flags.get(FLAG_CF));
    step_n(&mut cpu, 1);
    assert!(cpu.flags.get(FLAG_CF));
    step_n(&mut cpu, 1);
    assert!(!cpu.flags.get(FLAG_CF));
}

#[test]
fn test_direction_and_interrupt_flags() {
    // STD ; STI ; CLD ; CLI
    let mut cpu = cpu_with(&[0xFD, 0xFB, 0xFC, 0xFA]);
    step_n(&mut cpu, 2);
    assert!(cpu.flags.get(FLAG_DF));
    assert!(cpu.flags.get(FLAG_IF));
    step_n(&mut cpu, 2);
    assert!(!cpu.flags.get(FLAG_DF));
    assert!(!cpu.flags.get(FLAG_IF));
}

#[test]
fn test_popf_keeps_reserved_bit() {
    // PUSH AX ; POPF
    let mut cpu = cpu_with(&[0x50, 0x9D]);
    cpu.regs.set16(Reg16::AX, 0x0000);
    step_n(&mut cpu, 2);
    assert_eq!(cpu.flags.word() & 0x0002, 0x0002);
    assert!(!cpu.flags.get(FLAG_ZF));
}

#[test]
fn test_popf_loads_control_flags() {
    // PUSH AX ; POPF
    let mut cpu = cpu_with(&[0x50, 0x9D]);
    cpu.regs.set16(Reg16::AX, 0xFFFF);
    step_n(&mut cpu, 2);
    assert!(cpu.flags.get(FLAG_TF));
    assert!(cpu.flags.get(FLAG_IF));
    assert!(cpu.flags.get(FLAG_DF));
    assert!(cpu.flags.get(FLAG_OF));
    assert!(!cpu.flags.get(FLAG_VM));
}

#[test]
fn test_parity_of_low_byte_only() {
    // ADD AX, 0x0100 leaves AL = 0x03 (two bits set)
    let mut cpu = cpu_with(&[0x05, 0x00, 0x01]);
    cpu.regs.set16(Reg16::AX, 0x0003);
    step_n(&mut cpu, 1);
    assert!(cpu.flags.get(FLAG_PF));
}

#[test]
fn test_flags_display() {
    let mut cpu = cpu_with(&[0xF9]);
    step_n(&mut cpu, 1);
    let shown = cpu.flags.to_string();
    assert!(shown.ends_with('C'));
    assert_eq!(shown.len(), 9);
}
