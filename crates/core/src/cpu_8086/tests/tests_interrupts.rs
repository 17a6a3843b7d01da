//! Tests for software interrupts, CPU faults and host service handlers

use super::{cpu186_with, cpu_with, run_to_halt, step_n};
use crate::cpu_8086::interrupts::{write_vector, DEFAULT_HANDLER_OFFSET, DEFAULT_HANDLER_SEGMENT};
use crate::cpu_8086::{
    ArrayMemory, Cpu8086, CpuError, Memory8086, Reg16, Reg8, SegReg, FLAG_CF, FLAG_IF, FLAG_OF,
};

#[test]
fn test_int_through_guest_vector_and_iret() {
    // INT 0x60 ; HLT   (handler at 2000:0000: MOV AX, 0x4242 ; IRET)
    let mut cpu = cpu_with(&[0xCD, 0x60, 0xF4]);
    cpu.memory.set_bytes(0x2000, 0x0000, &[0xB8, 0x42, 0x42, 0xCF]);
    write_vector(&mut cpu.memory, 0x60, 0x2000, 0x0000);
    cpu.flags.set(FLAG_IF, true);

    step_n(&mut cpu, 1);
    assert_eq!(cpu.regs.seg(SegReg::CS), 0x2000);
    assert_eq!(cpu.regs.ip, 0x0000);
    assert!(!cpu.flags.get(FLAG_IF));
    // FLAGS, CS, IP
    assert_eq!(cpu.memory.get_word(0x1000, 0xFFFA), 0x1000);
    assert_eq!(cpu.memory.get_word(0x1000, 0xFFF8), 0x0102);

    run_to_halt(&mut cpu);
    assert_eq!(cpu.regs.get16(Reg16::AX), 0x4242);
    assert!(cpu.flags.get(FLAG_IF));
    assert_eq!(cpu.regs.get16(Reg16::SP), 0xFFFE);
}

#[test]
fn test_host_handler_runs_from_guest_code() {
    // MOV AH, 0x30 ; INT 0x21 ; HLT
    let mut cpu = cpu_with(&[0xB4, 0x30, 0xCD, 0x21, 0xF4]);
    cpu.register_interrupt(
        0x21,
        0xF000,
        0x0021,
        |cpu: &mut Cpu8086<ArrayMemory>| -> Result<(), CpuError> {
            if cpu.regs.get8(Reg8::AH) == 0x30 {
                cpu.regs.set16(Reg16::AX, 0x0005);
            }
            cpu.flags.set(FLAG_CF, true);
            Ok(())
        },
    );

    run_to_halt(&mut cpu);
    assert_eq!(cpu.regs.get16(Reg16::AX), 0x0005);
    assert!(cpu.flags.get(FLAG_CF));
    assert_eq!(cpu.regs.seg(SegReg::CS), 0x1000);
    assert_eq!(cpu.regs.ip, 0x0105);
    assert_eq!(cpu.regs.get16(Reg16::SP), 0xFFFE);
}

#[test]
fn test_divide_by_zero_returns_past_div() {
    // DIV BL ; HLT
    let mut cpu = cpu_with(&[0xF6, 0xF3, 0xF4]);
    cpu.regs.set16(Reg16::AX, 0x1234);
    step_n(&mut cpu, 1);
    assert_eq!(cpu.regs.seg(SegReg::CS), DEFAULT_HANDLER_SEGMENT);
    assert_eq!(cpu.regs.ip, DEFAULT_HANDLER_OFFSET);
    assert_eq!(cpu.regs.get16(Reg16::AX), 0x1234);

    // Default handler is a bare IRET
    run_to_halt(&mut cpu);
    assert_eq!(cpu.regs.seg(SegReg::CS), 0x1000);
    assert_eq!(cpu.regs.ip, 0x0103);
}

#[test]
fn test_divide_overflow_faults() {
    // DIV BL with a quotient that does not fit AL
    let mut cpu = cpu_with(&[0xF6, 0xF3]);
    cpu.regs.set16(Reg16::AX, 0x1000);
    cpu.regs.set8(Reg8::BL, 0x02);
    step_n(&mut cpu, 1);
    assert_eq!(cpu.regs.ip, DEFAULT_HANDLER_OFFSET);
    assert_eq!(cpu.regs.get16(Reg16::AX), 0x1000);
}

#[test]
fn test_idiv_most_negative_by_minus_one_faults() {
    // IDIV BX
    let mut cpu = cpu_with(&[0xF7, 0xFB]);
    cpu.regs.set16(Reg16::DX, 0xFFFF);
    cpu.regs.set16(Reg16::AX, 0x8000);
    cpu.regs.set16(Reg16::BX, 0xFFFF);
    step_n(&mut cpu, 1);
    assert_eq!(cpu.regs.ip, DEFAULT_HANDLER_OFFSET);
}

#[test]
fn test_into_only_with_overflow() {
    // INTO ; INTO
    let mut cpu = cpu_with(&[0xCE, 0xCE]);
    step_n(&mut cpu, 1);
    assert_eq!(cpu.regs.ip, 0x0101);

    cpu.flags.set(FLAG_OF, true);
    step_n(&mut cpu, 1);
    assert_eq!(cpu.regs.ip, DEFAULT_HANDLER_OFFSET);
}

#[test]
fn test_int3_uses_vector_3() {
    // INT3
    let mut cpu = cpu_with(&[0xCC]);
    write_vector(&mut cpu.memory, 3, 0x3000, 0x0010);
    step_n(&mut cpu, 1);
    assert_eq!(cpu.regs.seg(SegReg::CS), 0x3000);
    assert_eq!(cpu.regs.ip, 0x0010);
    assert_eq!(cpu.memory.get_word(0x1000, 0xFFF8), 0x0101);
}

#[test]
fn test_bound_out_of_range_raises_vector_5() {
    // BOUND AX, [0x0200]
    let mut cpu = cpu186_with(&[0x62, 0x06, 0x00, 0x02, 0x62, 0x06, 0x00, 0x02]);
    write_vector(&mut cpu.memory, 5, 0x3000, 0x0000);
    cpu.memory.set_word(0x1000, 0x0200, 0x0000);
    cpu.memory.set_word(0x1000, 0x0202, 0x000A);

    cpu.regs.set16(Reg16::AX, 5);
    step_n(&mut cpu, 1);
    assert_eq!(cpu.regs.ip, 0x0104);

    cpu.regs.set16(Reg16::AX, 11);
    step_n(&mut cpu, 1);
    assert_eq!(cpu.regs.seg(SegReg::CS), 0x3000);
}

#[test]
fn test_invalid_opcode_raises_vector_6() {
    // 0x0F is not an 8086 opcode
    let mut cpu = cpu_with(&[0x0F, 0xF4]);
    write_vector(&mut cpu.memory, 6, 0x3000, 0x0000);
    step_n(&mut cpu, 1);
    assert_eq!(cpu.regs.seg(SegReg::CS), 0x3000);
    assert_eq!(cpu.memory.get_word(0x1000, 0xFFF8), 0x0101);
}

#[test]
fn test_80186_opcode_on_8086_is_invalid() {
    // PUSHA on a plain 8086
    let mut cpu = cpu_with(&[0x60]);
    write_vector(&mut cpu.memory, 6, 0x3000, 0x0000);
    step_n(&mut cpu, 1);
    assert_eq!(cpu.regs.seg(SegReg::CS), 0x3000);
    assert_eq!(cpu.regs.get16(Reg16::SP), 0xFFF8);
}

#[test]
fn test_failing_handler_surfaces_from_step() {
    // INT 0x21
    let mut cpu = cpu_with(&[0xCD, 0x21]);
    cpu.register_interrupt(
        0x21,
        0xF000,
        0x0021,
        |_cpu: &mut Cpu8086<ArrayMemory>| -> Result<(), CpuError> {
            Err(CpuError::Handler {
                vector: 0x21,
                message: "unsupported".to_string(),
            })
        },
    );
    let err = cpu.step().unwrap_err();
    assert!(matches!(err, CpuError::Handler { vector: 0x21, .. }));
    assert_eq!(cpu.regs.get16(Reg16::SP), 0xFFFE);
}

#[test]
fn test_hlt_stops_stepping() {
    // HLT ; INC AX
    let mut cpu = cpu_with(&[0xF4, 0x40]);
    step_n(&mut cpu, 3);
    assert!(cpu.is_halted());
    assert_eq!(cpu.regs.get16(Reg16::AX), 0);
    assert_eq!(cpu.steps, 1);
}

#[test]
fn test_interrupt_wakes_halted_cpu() {
    // HLT ; INC AX ; HLT
    let mut cpu = cpu_with(&[0xF4, 0x40, 0xF4]);
    step_n(&mut cpu, 1);
    assert!(cpu.is_halted());

    cpu.interrupt(0x08).unwrap();
    assert!(!cpu.is_halted());
    run_to_halt(&mut cpu);
    assert_eq!(cpu.regs.get16(Reg16::AX), 1);
}
