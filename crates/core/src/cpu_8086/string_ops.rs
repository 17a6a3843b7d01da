//! String instructions and REP loops
//!
//! Source operands live at `seg:SI` where `seg` is DS unless a segment
//! override prefix was given; destinations are always `ES:DI`. After each
//! element SI and/or DI move by the element size, upwards with DF clear and
//! downwards with DF set.
//!
//! A repeated MOVS/STOS/LODS runs as a single bulk operation whose result is
//! identical to executing the element loop CX times. Repeated CMPS/SCAS
//! stop early on the REPE/REPNE condition; ZF is left as the last
//! comparison set it.

use super::flags::{FLAG_DF, FLAG_ZF};
use super::instruction::{Instruction, Op, RepPrefix};
use super::memory::{physical_address, Direction, Memory8086};
use super::registers::{Reg16, Reg8, SegReg, Width};
use super::{Cpu8086, CpuError};
use crate::logging::{log, LogCategory, LogLevel};

/// Run a (possibly repeated) string instruction
pub fn execute<M: Memory8086>(instr: &Instruction, cpu: &mut Cpu8086<M>) -> Result<(), CpuError> {
    let width = match instr.op {
        Op::Movs(w) | Op::Cmps(w) | Op::Stos(w) | Op::Lods(w) | Op::Scas(w) | Op::Ins(w)
        | Op::Outs(w) => w,
        _ => {
            return Err(CpuError::UnsupportedOperand {
                mnemonic: instr.mnemonic(),
                operand: "string operation".to_string(),
            })
        }
    };
    let src_seg = cpu.regs.seg(instr.segment_override.unwrap_or(SegReg::DS));

    let Some(rep) = instr.rep else {
        single(cpu, instr.op, src_seg, width);
        return Ok(());
    };

    let count = cpu.regs.get16(Reg16::CX);
    if count == 0 {
        return Ok(());
    }
    log(LogCategory::CPU, LogLevel::Trace, || {
        format!("{} x{}", instr.mnemonic(), count)
    });

    let processed = match instr.op {
        Op::Movs(_) => {
            movs_mass(cpu, src_seg, width, count);
            count
        }
        Op::Stos(_) => {
            stos_mass(cpu, width, count);
            count
        }
        Op::Lods(_) => {
            lods_mass(cpu, src_seg, width, count);
            count
        }
        Op::Cmps(_) => cmps_mass(cpu, src_seg, width, count, rep),
        Op::Scas(_) => scas_mass(cpu, width, count, rep),
        op => {
            for _ in 0..count {
                single(cpu, op, src_seg, width);
            }
            count
        }
    };
    cpu.regs.set16(Reg16::CX, count - processed);
    Ok(())
}

fn single<M: Memory8086>(cpu: &mut Cpu8086<M>, op: Op, src_seg: u16, width: Width) {
    match op {
        Op::Movs(_) => movs(cpu, src_seg, width),
        Op::Cmps(_) => cmps(cpu, src_seg, width),
        Op::Stos(_) => stos(cpu, width),
        Op::Lods(_) => lods(cpu, src_seg, width),
        Op::Scas(_) => scas(cpu, width),
        Op::Ins(_) => ins(cpu, width),
        Op::Outs(_) => outs(cpu, src_seg, width),
        _ => {}
    }
}

#[inline]
fn direction<M: Memory8086>(cpu: &Cpu8086<M>) -> Direction {
    if cpu.flags.get(FLAG_DF) {
        Direction::Backward
    } else {
        Direction::Forward
    }
}

/// Move SI or DI past `count` elements
#[inline]
fn advance<M: Memory8086>(cpu: &mut Cpu8086<M>, reg: Reg16, width: Width, count: u16) {
    let delta = direction(cpu).step(width.bytes()) * count as i32;
    cpu.regs.adjust16(reg, delta);
}

#[inline]
fn read_element<M: Memory8086>(cpu: &Cpu8086<M>, seg: u16, offset: u16, width: Width) -> u16 {
    match width {
        Width::Byte => cpu.memory.get_byte(seg, offset) as u16,
        Width::Word => cpu.memory.get_word(seg, offset),
    }
}

#[inline]
fn write_element<M: Memory8086>(cpu: &mut Cpu8086<M>, seg: u16, offset: u16, width: Width, val: u16) {
    match width {
        Width::Byte => cpu.memory.set_byte(seg, offset, val as u8),
        Width::Word => cpu.memory.set_word(seg, offset, val),
    }
}

#[inline]
fn accumulator<M: Memory8086>(cpu: &Cpu8086<M>, width: Width) -> u16 {
    match width {
        Width::Byte => cpu.regs.get8(Reg8::AL) as u16,
        Width::Word => cpu.regs.get16(Reg16::AX),
    }
}

#[inline]
fn set_accumulator<M: Memory8086>(cpu: &mut Cpu8086<M>, width: Width, val: u16) {
    match width {
        Width::Byte => cpu.regs.set8(Reg8::AL, val as u8),
        Width::Word => cpu.regs.set16(Reg16::AX, val),
    }
}

/// MOVS: `ES:[DI] <- seg:[SI]`
pub fn movs<M: Memory8086>(cpu: &mut Cpu8086<M>, src_seg: u16, width: Width) {
    let (si, di) = (cpu.regs.get16(Reg16::SI), cpu.regs.get16(Reg16::DI));
    let val = read_element(cpu, src_seg, si, width);
    let es = cpu.regs.seg(SegReg::ES);
    write_element(cpu, es, di, width, val);
    advance(cpu, Reg16::SI, width, 1);
    advance(cpu, Reg16::DI, width, 1);
}

/// CMPS: flags of `seg:[SI] - ES:[DI]`
pub fn cmps<M: Memory8086>(cpu: &mut Cpu8086<M>, src_seg: u16, width: Width) {
    let (si, di) = (cpu.regs.get16(Reg16::SI), cpu.regs.get16(Reg16::DI));
    let a = read_element(cpu, src_seg, si, width);
    let b = read_element(cpu, cpu.regs.seg(SegReg::ES), di, width);
    cpu.flags.update_sub(a, b, width);
    advance(cpu, Reg16::SI, width, 1);
    advance(cpu, Reg16::DI, width, 1);
}

/// STOS: `ES:[DI] <- AL/AX`
pub fn stos<M: Memory8086>(cpu: &mut Cpu8086<M>, width: Width) {
    let val = accumulator(cpu, width);
    let (es, di) = (cpu.regs.seg(SegReg::ES), cpu.regs.get16(Reg16::DI));
    write_element(cpu, es, di, width, val);
    advance(cpu, Reg16::DI, width, 1);
}

/// LODS: `AL/AX <- seg:[SI]`
pub fn lods<M: Memory8086>(cpu: &mut Cpu8086<M>, src_seg: u16, width: Width) {
    let val = read_element(cpu, src_seg, cpu.regs.get16(Reg16::SI), width);
    set_accumulator(cpu, width, val);
    advance(cpu, Reg16::SI, width, 1);
}

/// SCAS: flags of `AL/AX - ES:[DI]`
pub fn scas<M: Memory8086>(cpu: &mut Cpu8086<M>, width: Width) {
    let a = accumulator(cpu, width);
    let b = read_element(cpu, cpu.regs.seg(SegReg::ES), cpu.regs.get16(Reg16::DI), width);
    cpu.flags.update_sub(a, b, width);
    advance(cpu, Reg16::DI, width, 1);
}

/// INS: `ES:[DI] <- port DX`
pub fn ins<M: Memory8086>(cpu: &mut Cpu8086<M>, width: Width) {
    let port = cpu.regs.get16(Reg16::DX);
    let val = match width {
        Width::Byte => cpu.memory.io_read(port) as u16,
        Width::Word => cpu.memory.io_read_word(port),
    };
    let (es, di) = (cpu.regs.seg(SegReg::ES), cpu.regs.get16(Reg16::DI));
    write_element(cpu, es, di, width, val);
    advance(cpu, Reg16::DI, width, 1);
}

/// OUTS: `port DX <- seg:[SI]`
pub fn outs<M: Memory8086>(cpu: &mut Cpu8086<M>, src_seg: u16, width: Width) {
    let port = cpu.regs.get16(Reg16::DX);
    let val = read_element(cpu, src_seg, cpu.regs.get16(Reg16::SI), width);
    match width {
        Width::Byte => cpu.memory.io_write(port, val as u8),
        Width::Word => cpu.memory.io_write_word(port, val),
    }
    advance(cpu, Reg16::SI, width, 1);
}

/// `count` MOVS elements in one go
pub fn movs_mass<M: Memory8086>(cpu: &mut Cpu8086<M>, src_seg: u16, width: Width, count: u16) {
    let si = cpu.regs.get16(Reg16::SI);
    let di = cpu.regs.get16(Reg16::DI);
    let es = cpu.regs.seg(SegReg::ES);
    let dir = direction(cpu);
    let bytes = count as usize * width.bytes() as usize;

    match width {
        Width::Byte => cpu.memory.copy_bytes(src_seg, si, es, di, bytes, dir),
        Width::Word => {
            // Byte order inside a word only matters when the ranges overlap
            let (src, dst) = (
                physical_address(src_seg, si) as usize,
                physical_address(es, di) as usize,
            );
            let disjoint = dst >= src + bytes || src >= dst + bytes;
            if disjoint && dir == Direction::Forward {
                cpu.memory.copy_bytes(src_seg, si, es, di, bytes, dir);
            } else {
                for _ in 0..count {
                    movs(cpu, src_seg, width);
                }
                return;
            }
        }
    }
    advance(cpu, Reg16::SI, width, count);
    advance(cpu, Reg16::DI, width, count);
}

/// `count` STOS elements in one go
pub fn stos_mass<M: Memory8086>(cpu: &mut Cpu8086<M>, width: Width, count: u16) {
    match width {
        Width::Byte => {
            let al = cpu.regs.get8(Reg8::AL);
            let es = cpu.regs.seg(SegReg::ES);
            let di = cpu.regs.get16(Reg16::DI);
            let start = match direction(cpu) {
                Direction::Forward => di,
                Direction::Backward => di.wrapping_sub(count - 1),
            };
            cpu.memory.fill(es, start, count as usize, al);
            advance(cpu, Reg16::DI, width, count);
        }
        Width::Word => {
            for _ in 0..count {
                stos(cpu, width);
            }
        }
    }
}

/// `count` LODS elements: only the last one survives in the accumulator
pub fn lods_mass<M: Memory8086>(cpu: &mut Cpu8086<M>, src_seg: u16, width: Width, count: u16) {
    if count == 0 {
        return;
    }
    advance(cpu, Reg16::SI, width, count - 1);
    lods(cpu, src_seg, width);
}

/// Repeated CMPS; returns how many elements were compared
pub fn cmps_mass<M: Memory8086>(
    cpu: &mut Cpu8086<M>,
    src_seg: u16,
    width: Width,
    count: u16,
    rep: RepPrefix,
) -> u16 {
    let mut processed = 0;
    while processed < count {
        cmps(cpu, src_seg, width);
        processed += 1;
        if stop_comparing(cpu, rep) {
            break;
        }
    }
    processed
}

/// Repeated SCAS; returns how many elements were scanned
pub fn scas_mass<M: Memory8086>(cpu: &mut Cpu8086<M>, width: Width, count: u16, rep: RepPrefix) -> u16 {
    let mut processed = 0;
    while processed < count {
        scas(cpu, width);
        processed += 1;
        if stop_comparing(cpu, rep) {
            break;
        }
    }
    processed
}

/// REPE stops on a mismatch, REPNE on a match
#[inline]
fn stop_comparing<M: Memory8086>(cpu: &Cpu8086<M>, rep: RepPrefix) -> bool {
    let zf = cpu.flags.get(FLAG_ZF);
    match rep {
        RepPrefix::Rep => !zf,
        RepPrefix::Repne => zf,
    }
}
