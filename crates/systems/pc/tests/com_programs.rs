//! End-to-end runs of small hand-assembled .COM programs

use emu86_core::cpu_8086::{Memory8086, Reg16, SegReg, StopReason, FLAG_CF};
use emu86_core::System;
use emu86_pc::{PcConfig, PcSystem};

const STEP_BUDGET: u64 = 100_000;

fn run_com(image: &[u8]) -> PcSystem {
    run_com_with_input(image, "")
}

fn run_com_with_input(image: &[u8], input: &str) -> PcSystem {
    let mut sys = PcSystem::new();
    sys.mount("Program", image).unwrap();
    sys.type_text(input);
    let summary = sys.run_until_halt(Some(STEP_BUDGET)).unwrap();
    assert_eq!(summary.reason, StopReason::Halted, "program did not stop");
    sys
}

fn reg(sys: &PcSystem, reg: Reg16) -> u16 {
    sys.cpu().cpu().regs.get16(reg)
}

#[test]
fn test_hello_world_dos_string() {
    let mut image = vec![
        0xBA, 0x09, 0x01, // mov dx, 0x0109
        0xB4, 0x09, // mov ah, 0x09
        0xCD, 0x21, // int 0x21
        0xCD, 0x20, // int 0x20
    ];
    image.extend_from_slice(b"Hello, world!$");

    let sys = run_com(&image);
    assert_eq!(sys.console_output(), "Hello, world!");
    assert_eq!(sys.screen_text(), "Hello, world!");
    assert_eq!(sys.exit_code(), Some(0));
}

#[test]
fn test_teletype_loop_and_ret_to_psp() {
    let mut image = vec![
        0xBE, 0x0F, 0x01, // mov si, 0x010F
        0xAC, // lodsb
        0x08, 0xC0, // or al, al
        0x74, 0x06, // jz 0x010E
        0xB4, 0x0E, // mov ah, 0x0E
        0xCD, 0x10, // int 0x10
        0xEB, 0xF5, // jmp 0x0103
        0xC3, // ret (to the INT 20h at PSP:0000)
    ];
    image.extend_from_slice(b"Hi\r\nthere\0");

    let sys = run_com(&image);
    assert_eq!(sys.console_output(), "Hi\r\nthere");
    assert_eq!(sys.screen_text(), "Hi\nthere");
    assert_eq!(sys.exit_code(), Some(0));
    assert_eq!(sys.cpu().get_registers().cs, 0x0700);
}

#[test]
fn test_keyboard_echo_counts_keys() {
    let image = [
        0x31, 0xDB, // xor bx, bx
        0xB4, 0x00, // mov ah, 0x00
        0xCD, 0x16, // int 0x16
        0x3C, 0x0D, // cmp al, 0x0D
        0x74, 0x09, // jz 0x0113
        0x88, 0xC2, // mov dl, al
        0xB4, 0x02, // mov ah, 0x02
        0xCD, 0x21, // int 0x21
        0x43, // inc bx
        0xEB, 0xEF, // jmp 0x0102
        0x88, 0xD8, // mov al, bl
        0xB4, 0x4C, // mov ah, 0x4C
        0xCD, 0x21, // int 0x21
    ];

    let sys = run_com_with_input(&image, "abc\n");
    assert_eq!(sys.console_output(), "abc");
    assert_eq!(sys.exit_code(), Some(3));
}

#[test]
fn test_key_available_reports_through_zf() {
    let image = [
        0xB4, 0x01, // mov ah, 0x01
        0xCD, 0x16, // int 0x16
        0x74, 0x04, // jz 0x010A
        0xB0, 0x01, // mov al, 1
        0xEB, 0x02, // jmp 0x010C
        0xB0, 0x00, // mov al, 0
        0xB4, 0x4C, // mov ah, 0x4C
        0xCD, 0x21, // int 0x21
    ];

    assert_eq!(run_com(&image).exit_code(), Some(0));
    assert_eq!(run_com_with_input(&image, "x").exit_code(), Some(1));
}

#[test]
fn test_dos_read_char_with_echo_and_eof() {
    let image = [
        0xB4, 0x01, // mov ah, 0x01
        0xCD, 0x21, // int 0x21
        0x88, 0xC3, // mov bl, al
        0xB4, 0x01, // mov ah, 0x01
        0xCD, 0x21, // int 0x21 (queue now empty)
        0xF4, // hlt
    ];

    let sys = run_com_with_input(&image, "q");
    assert_eq!(sys.console_output(), "q");
    assert_eq!(reg(&sys, Reg16::BX) & 0xFF, b'q' as u16);
    assert_eq!(reg(&sys, Reg16::AX) & 0xFF, 0x1A);
    // HLT is not a DOS termination
    assert_eq!(sys.exit_code(), None);
}

#[test]
fn test_set_and_get_vector() {
    let image = [
        0xB8, 0x60, 0x25, // mov ax, 0x2560
        0xBA, 0x34, 0x12, // mov dx, 0x1234
        0xCD, 0x21, // int 0x21
        0xB8, 0x60, 0x35, // mov ax, 0x3560
        0xCD, 0x21, // int 0x21
        0xF4, // hlt
    ];

    let sys = run_com(&image);
    assert_eq!(reg(&sys, Reg16::BX), 0x1234);
    assert_eq!(sys.cpu().cpu().regs.seg(SegReg::ES), 0x0700);
    assert_eq!(sys.bus().get_word(0x0000, 0x60 * 4), 0x1234);
}

#[test]
fn test_guest_installed_interrupt_service() {
    let image = [
        0xB8, 0x60, 0x25, // mov ax, 0x2560
        0xBA, 0x0F, 0x01, // mov dx, 0x010F
        0xCD, 0x21, // int 0x21
        0xCD, 0x60, // int 0x60
        0xB4, 0x4C, // mov ah, 0x4C
        0xCD, 0x21, // int 0x21
        0x90, // nop
        0xB0, 0x2A, // 010F: mov al, 0x2A
        0xCF, // iret
    ];

    assert_eq!(run_com(&image).exit_code(), Some(0x2A));
}

#[test]
fn test_dos_version() {
    let sys = run_com(&[0xB4, 0x30, 0xCD, 0x21, 0xF4]);
    assert_eq!(reg(&sys, Reg16::AX), 0x0005);
}

#[test]
fn test_unimplemented_dos_function_sets_carry() {
    // mov ah, 0x77 ; int 0x21 ; hlt
    let sys = run_com(&[0xB4, 0x77, 0xCD, 0x21, 0xF4]);
    assert!(sys.cpu().cpu().flags.get(FLAG_CF));
    assert_eq!(reg(&sys, Reg16::AX), 0x0001);
}

#[test]
fn test_successful_dos_function_clears_carry() {
    // stc ; mov ah, 0x30 ; int 0x21 ; hlt
    let sys = run_com(&[0xF9, 0xB4, 0x30, 0xCD, 0x21, 0xF4]);
    assert!(!sys.cpu().cpu().flags.get(FLAG_CF));
    assert_eq!(reg(&sys, Reg16::AX), 0x0005);
}

#[test]
fn test_equipment_and_memory_size() {
    let sys = run_com(&[0xCD, 0x11, 0x89, 0xC3, 0xCD, 0x12, 0xF4]);
    assert_eq!(reg(&sys, Reg16::BX), 0x0020);
    assert_eq!(reg(&sys, Reg16::AX), 640);

    let mut small = PcSystem::with_config(PcConfig {
        memory_kb: 256,
        ..PcConfig::default()
    });
    small.mount("Program", &[0xCD, 0x12, 0xF4]).unwrap();
    small.run_until_halt(Some(STEP_BUDGET)).unwrap();
    assert_eq!(small.cpu().cpu().regs.get16(Reg16::AX), 256);
    // Top of memory in the PSP follows the configured size
    assert_eq!(small.bus().get_word(0x0700, 0x0002), 0x4000);
}

#[test]
fn test_cursor_and_character_output() {
    let image = [
        0xB4, 0x02, // mov ah, 0x02
        0xB7, 0x00, // mov bh, 0
        0xB6, 0x05, // mov dh, 5
        0xB2, 0x0A, // mov dl, 10
        0xCD, 0x10, // int 0x10
        0xB8, 0x58, 0x09, // mov ax, 0x0958
        0xB3, 0x1F, // mov bl, 0x1F
        0xB9, 0x03, 0x00, // mov cx, 3
        0xCD, 0x10, // int 0x10
        0xB4, 0x03, // mov ah, 0x03
        0xCD, 0x10, // int 0x10
        0xF4, // hlt
    ];

    let sys = run_com(&image);
    let text = sys.screen_text();
    assert_eq!(text.lines().nth(5), Some("          XXX"));
    assert_eq!(sys.bus().get_byte(0xB800, (5 * 80 + 10) * 2 + 1), 0x1F);
    // AH=09h does not move the cursor
    assert_eq!(reg(&sys, Reg16::DX), 0x050A);
    assert_eq!(reg(&sys, Reg16::CX), 0x0607);
    // BIOS data area cursor for page 0
    assert_eq!(sys.bus().get_word(0x0040, 0x0050), 0x050A);
    // Direct writes are not console output
    assert_eq!(sys.console_output(), "");
}

#[test]
fn test_command_tail_in_psp() {
    let image = [
        0xA0, 0x80, 0x00, // mov al, [0x0080]
        0xB4, 0x4C, // mov ah, 0x4C
        0xCD, 0x21, // int 0x21
    ];

    let mut sys = PcSystem::new();
    sys.load_com(&image, " hello").unwrap();
    sys.run_until_halt(Some(STEP_BUDGET)).unwrap();
    assert_eq!(sys.exit_code(), Some(6));
}

#[test]
fn test_divide_error_through_default_vector_resumes() {
    let image = [
        0x31, 0xC9, // xor cx, cx
        0xF7, 0xF1, // div cx
        0xB0, 0x05, // mov al, 5
        0xB4, 0x4C, // mov ah, 0x4C
        0xCD, 0x21, // int 0x21
    ];

    assert_eq!(run_com(&image).exit_code(), Some(5));
}

#[test]
fn test_step_budget_stops_endless_loop() {
    let mut sys = PcSystem::new();
    sys.mount("Program", &[0xEB, 0xFE]).unwrap();
    let summary = sys.run_until_halt(Some(1000)).unwrap();
    assert_eq!(summary.reason, StopReason::StepLimit);
    assert_eq!(summary.steps, 1000);
    assert!(!sys.is_halted());
    assert_eq!(sys.exit_code(), None);
}

#[test]
fn test_config_step_budget_applies_by_default() {
    let mut sys = PcSystem::with_config(PcConfig {
        max_steps: Some(50),
        ..PcConfig::default()
    });
    sys.mount("Program", &[0xEB, 0xFE]).unwrap();
    let summary = sys.run_until_halt(None).unwrap();
    assert_eq!(summary.steps, 50);
}

#[test]
fn test_save_state_resumes_in_fresh_machine() {
    let mut image = vec![
        0xBA, 0x09, 0x01, // mov dx, 0x0109
        0xB4, 0x09, // mov ah, 0x09
        0xCD, 0x21, // int 0x21
        0xCD, 0x20, // int 0x20
    ];
    image.extend_from_slice(b"again$");

    let mut sys = PcSystem::new();
    sys.mount("Program", &image).unwrap();
    sys.step().unwrap();
    sys.step().unwrap();
    let state = sys.save_state();

    let mut resumed = PcSystem::new();
    resumed.mount("Program", &image).unwrap();
    resumed.load_state(&state).unwrap();
    resumed.run_until_halt(Some(STEP_BUDGET)).unwrap();
    assert_eq!(resumed.console_output(), "again");
    assert_eq!(resumed.cpu().steps(), 4);
}
