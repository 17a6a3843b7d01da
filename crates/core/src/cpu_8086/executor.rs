//! Opcode semantics
//!
//! [`Instruction::execute`] runs one decoded instruction against the CPU.
//! IP has already been advanced past the instruction, so relative targets
//! and interrupt return addresses refer to the next instruction.

use super::flags::{Flags, FLAG_AF, FLAG_CF, FLAG_DF, FLAG_IF, FLAG_OF, FLAG_ZF};
use super::instruction::{AluOp, Instruction, Op, ShiftOp};
use super::interrupts::{
    VECTOR_BOUND, VECTOR_BREAKPOINT, VECTOR_DIVIDE_ERROR, VECTOR_INVALID_OPCODE, VECTOR_OVERFLOW,
};
use super::memory::Memory8086;
use super::operand::Operand;
use super::registers::{Reg16, Reg8, SegReg, Width};
use super::string_ops;
use super::{Cpu8086, CpuError};

impl Instruction {
    /// Execute this instruction
    pub fn execute<M: Memory8086>(&self, cpu: &mut Cpu8086<M>) -> Result<(), CpuError> {
        match self.op {
            Op::Alu(alu) => self.alu(cpu, alu),
            Op::Test => {
                let (dst, src) = (self.arg(0)?, self.arg(1)?);
                let (a, b) = (dst.get(cpu), src.get(cpu));
                cpu.flags.update_and(a, b, dst.width());
                Ok(())
            }
            Op::Inc | Op::Dec => {
                let dst = self.arg(0)?;
                let val = dst.get(cpu);
                let result = if self.op == Op::Inc {
                    cpu.flags.update_inc(val, dst.width())
                } else {
                    cpu.flags.update_dec(val, dst.width())
                };
                dst.set(cpu, result)
            }
            Op::Neg => {
                let dst = self.arg(0)?;
                let val = dst.get(cpu);
                let result = cpu.flags.update_sub(0, val, dst.width());
                dst.set(cpu, result)
            }
            Op::Not => {
                let dst = self.arg(0)?;
                let val = dst.get(cpu);
                dst.set(cpu, !val)
            }
            Op::Mul => self.mul(cpu),
            Op::Imul => self.imul(cpu),
            Op::Div => self.div(cpu),
            Op::Idiv => self.idiv(cpu),
            Op::Imul3 => {
                let (dst, src, imm) = (self.arg(0)?, self.arg(1)?, self.arg(2)?);
                let product = (src.get(cpu) as i16 as i32) * (imm.get(cpu) as i16 as i32);
                let overflow = product != product as i16 as i32;
                cpu.flags.set(FLAG_CF, overflow);
                cpu.flags.set(FLAG_OF, overflow);
                dst.set(cpu, product as u16)
            }
            Op::Shift(shift) => {
                let (dst, count) = (self.arg(0)?, self.arg(1)?);
                // The 80186 masks the count to 5 bits; the 8086 shifts by all of CL
                let count = count.get(cpu) as u8;
                let count = if cpu.model().supports_80186_instructions() {
                    count & 0x1F
                } else {
                    count
                };
                if count == 0 {
                    return Ok(());
                }
                let val = dst.get(cpu);
                let result = shift_rotate(&mut cpu.flags, shift, val, count, dst.width());
                dst.set(cpu, result)
            }

            Op::Xchg => {
                let (a, b) = (self.arg(0)?, self.arg(1)?);
                let (va, vb) = (a.get(cpu), b.get(cpu));
                a.set(cpu, vb)?;
                b.set(cpu, va)
            }
            Op::Mov => {
                let (dst, src) = (self.arg(0)?, self.arg(1)?);
                let val = src.get(cpu);
                dst.set(cpu, val)
            }
            Op::Lea => {
                let dst = self.arg(0)?;
                match self.arg(1)? {
                    Operand::Mem(m, _) => dst.set(cpu, m.offset),
                    other => Err(self.unsupported(&other)),
                }
            }
            Op::Lds | Op::Les => {
                let dst = self.arg(0)?;
                let src = self.arg(1)?;
                let (segment, offset) = match src {
                    Operand::Mem(..) => src.get_far(cpu).ok_or_else(|| self.unsupported(&src))?,
                    other => return Err(self.unsupported(&other)),
                };
                dst.set(cpu, offset)?;
                let seg = if self.op == Op::Lds {
                    SegReg::DS
                } else {
                    SegReg::ES
                };
                cpu.regs.set_seg(seg, segment);
                Ok(())
            }
            Op::Push => {
                let src = self.arg(0)?;
                // 8086/80186 push the already-decremented SP
                let val = match src {
                    Operand::Reg16(Reg16::SP) => cpu.regs.get16(Reg16::SP).wrapping_sub(2),
                    _ => src.get(cpu),
                };
                cpu.push(val);
                Ok(())
            }
            Op::Pop => {
                let dst = self.arg(0)?;
                let val = cpu.pop();
                dst.set(cpu, val)
            }
            Op::Pusha => {
                let sp = cpu.regs.get16(Reg16::SP);
                for reg in [Reg16::AX, Reg16::CX, Reg16::DX, Reg16::BX] {
                    cpu.push(cpu.regs.get16(reg));
                }
                cpu.push(sp);
                for reg in [Reg16::BP, Reg16::SI, Reg16::DI] {
                    cpu.push(cpu.regs.get16(reg));
                }
                Ok(())
            }
            Op::Popa => {
                for reg in [Reg16::DI, Reg16::SI, Reg16::BP] {
                    let val = cpu.pop();
                    cpu.regs.set16(reg, val);
                }
                cpu.pop(); // stored SP is discarded
                for reg in [Reg16::BX, Reg16::DX, Reg16::CX, Reg16::AX] {
                    let val = cpu.pop();
                    cpu.regs.set16(reg, val);
                }
                Ok(())
            }
            Op::Pushf => {
                cpu.push(cpu.flags.word());
                Ok(())
            }
            Op::Popf => {
                let word = cpu.pop();
                cpu.flags.set_word(word);
                Ok(())
            }
            Op::Lahf => {
                cpu.regs.set8(Reg8::AH, cpu.flags.low_byte());
                Ok(())
            }
            Op::Sahf => {
                cpu.flags.set_low_byte(cpu.regs.get8(Reg8::AH));
                Ok(())
            }
            Op::Cbw => {
                let al = cpu.regs.get8(Reg8::AL);
                cpu.regs.set16(Reg16::AX, al as i8 as i16 as u16);
                Ok(())
            }
            Op::Cwd => {
                let ax = cpu.regs.get16(Reg16::AX);
                let dx = if ax & 0x8000 != 0 { 0xFFFF } else { 0x0000 };
                cpu.regs.set16(Reg16::DX, dx);
                Ok(())
            }
            Op::Xlat => {
                let seg = cpu.regs.seg(self.segment_override.unwrap_or(SegReg::DS));
                let offset = cpu
                    .regs
                    .get16(Reg16::BX)
                    .wrapping_add(cpu.regs.get8(Reg8::AL) as u16);
                let val = cpu.memory.get_byte(seg, offset);
                cpu.regs.set8(Reg8::AL, val);
                Ok(())
            }
            Op::Salc => {
                let al = if cpu.flags.get(FLAG_CF) { 0xFF } else { 0x00 };
                cpu.regs.set8(Reg8::AL, al);
                Ok(())
            }

            Op::Daa => {
                decimal_adjust(cpu, true);
                Ok(())
            }
            Op::Das => {
                decimal_adjust(cpu, false);
                Ok(())
            }
            Op::Aaa => {
                let al = cpu.regs.get8(Reg8::AL);
                let adjust = (al & 0x0F) > 9 || cpu.flags.get(FLAG_AF);
                if adjust {
                    // Add 1 to AH, 6 to AL
                    cpu.regs.adjust16(Reg16::AX, 0x106);
                }
                cpu.flags.set(FLAG_AF, adjust);
                cpu.flags.set(FLAG_CF, adjust);
                let ax = cpu.regs.get16(Reg16::AX) & 0xFF0F;
                cpu.regs.set16(Reg16::AX, ax);
                Ok(())
            }
            Op::Aas => {
                let al = cpu.regs.get8(Reg8::AL);
                let adjust = (al & 0x0F) > 9 || cpu.flags.get(FLAG_AF);
                if adjust {
                    cpu.regs.adjust16(Reg16::AX, -6);
                    let ah = cpu.regs.get8(Reg8::AH).wrapping_sub(1);
                    cpu.regs.set8(Reg8::AH, ah);
                }
                cpu.flags.set(FLAG_AF, adjust);
                cpu.flags.set(FLAG_CF, adjust);
                let ax = cpu.regs.get16(Reg16::AX) & 0xFF0F;
                cpu.regs.set16(Reg16::AX, ax);
                Ok(())
            }
            Op::Aam => {
                let base = self.arg(0)?.get(cpu) as u8;
                if base == 0 {
                    return cpu.interrupt(VECTOR_DIVIDE_ERROR);
                }
                let al = cpu.regs.get8(Reg8::AL);
                cpu.regs.set8(Reg8::AH, al / base);
                cpu.regs.set8(Reg8::AL, al % base);
                cpu.flags.update_szp(al as u16 % base as u16, Width::Byte);
                Ok(())
            }
            Op::Aad => {
                let base = self.arg(0)?.get(cpu) as u8;
                let al = cpu.regs.get8(Reg8::AL);
                let ah = cpu.regs.get8(Reg8::AH);
                let result = al.wrapping_add(ah.wrapping_mul(base));
                cpu.regs.set16(Reg16::AX, result as u16);
                cpu.flags.update_szp(result as u16, Width::Byte);
                Ok(())
            }

            Op::Jcc(cond) => {
                if cpu.flags.condition(cond) {
                    cpu.regs.ip = self.arg(0)?.get(cpu);
                }
                Ok(())
            }
            Op::Jmp => {
                cpu.regs.ip = self.arg(0)?.get(cpu);
                Ok(())
            }
            Op::JmpFar => {
                let (segment, offset) = self.far_target(cpu)?;
                cpu.regs.set_seg(SegReg::CS, segment);
                cpu.regs.ip = offset;
                Ok(())
            }
            Op::Call => {
                let target = self.arg(0)?.get(cpu);
                cpu.push(cpu.regs.ip);
                cpu.regs.ip = target;
                Ok(())
            }
            Op::CallFar => {
                let (segment, offset) = self.far_target(cpu)?;
                cpu.push(cpu.regs.seg(SegReg::CS));
                cpu.push(cpu.regs.ip);
                cpu.regs.set_seg(SegReg::CS, segment);
                cpu.regs.ip = offset;
                Ok(())
            }
            Op::Ret => {
                cpu.regs.ip = cpu.pop();
                self.release_stack(cpu);
                Ok(())
            }
            Op::RetFar => {
                cpu.regs.ip = cpu.pop();
                let cs = cpu.pop();
                cpu.regs.set_seg(SegReg::CS, cs);
                self.release_stack(cpu);
                Ok(())
            }
            Op::Loop | Op::Loope | Op::Loopne => {
                let cx = cpu.regs.get16(Reg16::CX).wrapping_sub(1);
                cpu.regs.set16(Reg16::CX, cx);
                let zf = cpu.flags.get(FLAG_ZF);
                let taken = cx != 0
                    && match self.op {
                        Op::Loope => zf,
                        Op::Loopne => !zf,
                        _ => true,
                    };
                if taken {
                    cpu.regs.ip = self.arg(0)?.get(cpu);
                }
                Ok(())
            }
            Op::Jcxz => {
                if cpu.regs.get16(Reg16::CX) == 0 {
                    cpu.regs.ip = self.arg(0)?.get(cpu);
                }
                Ok(())
            }
            Op::Int => {
                let vector = self.arg(0)?.get(cpu) as u8;
                cpu.interrupt(vector)
            }
            Op::Int3 => cpu.interrupt(VECTOR_BREAKPOINT),
            Op::Into => {
                if cpu.flags.get(FLAG_OF) {
                    cpu.interrupt(VECTOR_OVERFLOW)
                } else {
                    Ok(())
                }
            }
            Op::Iret => {
                cpu.regs.ip = cpu.pop();
                let cs = cpu.pop();
                cpu.regs.set_seg(SegReg::CS, cs);
                let flags = cpu.pop();
                cpu.flags.set_word(flags);
                Ok(())
            }
            Op::Enter => {
                let size = self.arg(0)?.get(cpu);
                let level = self.arg(1)?.get(cpu) & 0x1F;
                cpu.push(cpu.regs.get16(Reg16::BP));
                let frame = cpu.regs.get16(Reg16::SP);
                if level > 0 {
                    let ss = cpu.regs.seg(SegReg::SS);
                    for _ in 1..level {
                        let bp = cpu.regs.get16(Reg16::BP).wrapping_sub(2);
                        cpu.regs.set16(Reg16::BP, bp);
                        let val = cpu.memory.get_word(ss, bp);
                        cpu.push(val);
                    }
                    cpu.push(frame);
                }
                cpu.regs.set16(Reg16::BP, frame);
                let sp = cpu.regs.get16(Reg16::SP).wrapping_sub(size);
                cpu.regs.set16(Reg16::SP, sp);
                Ok(())
            }
            Op::Leave => {
                cpu.regs.set16(Reg16::SP, cpu.regs.get16(Reg16::BP));
                let bp = cpu.pop();
                cpu.regs.set16(Reg16::BP, bp);
                Ok(())
            }
            Op::Bound => {
                let index = self.arg(0)?.get(cpu) as i16;
                let bounds = self.arg(1)?;
                let Operand::Mem(m, _) = bounds else {
                    return Err(self.unsupported(&bounds));
                };
                let lower = cpu.memory.get_word(m.segment, m.offset) as i16;
                let upper = cpu.memory.get_word(m.segment, m.offset.wrapping_add(2)) as i16;
                if index < lower || index > upper {
                    cpu.interrupt(VECTOR_BOUND)
                } else {
                    Ok(())
                }
            }

            Op::In => {
                let (dst, port) = (self.arg(0)?, self.arg(1)?);
                let port = port.get(cpu);
                let val = match dst.width() {
                    Width::Byte => cpu.memory.io_read(port) as u16,
                    Width::Word => cpu.memory.io_read_word(port),
                };
                dst.set(cpu, val)
            }
            Op::Out => {
                let (port, src) = (self.arg(0)?, self.arg(1)?);
                let port = port.get(cpu);
                let val = src.get(cpu);
                match src.width() {
                    Width::Byte => cpu.memory.io_write(port, val as u8),
                    Width::Word => cpu.memory.io_write_word(port, val),
                }
                Ok(())
            }

            Op::Movs(_)
            | Op::Cmps(_)
            | Op::Stos(_)
            | Op::Lods(_)
            | Op::Scas(_)
            | Op::Ins(_)
            | Op::Outs(_) => string_ops::execute(self, cpu),

            Op::Clc => Self::set_flag(cpu, FLAG_CF, false),
            Op::Stc => Self::set_flag(cpu, FLAG_CF, true),
            Op::Cmc => {
                let cf = cpu.flags.get(FLAG_CF);
                Self::set_flag(cpu, FLAG_CF, !cf)
            }
            Op::Cld => Self::set_flag(cpu, FLAG_DF, false),
            Op::Std => Self::set_flag(cpu, FLAG_DF, true),
            Op::Cli => Self::set_flag(cpu, FLAG_IF, false),
            Op::Sti => Self::set_flag(cpu, FLAG_IF, true),
            Op::Hlt => {
                cpu.halted = true;
                Ok(())
            }
            // No coprocessor: WAIT and ESC only consume their bytes
            Op::Wait | Op::Nop | Op::Esc(_) => Ok(()),
            Op::Db | Op::Dw => cpu.interrupt(VECTOR_INVALID_OPCODE),
        }
    }

    /// Operand `index` by value
    pub(super) fn arg(&self, index: usize) -> Result<Operand, CpuError> {
        self.operands
            .get(index)
            .copied()
            .ok_or_else(|| CpuError::MissingOperand {
                mnemonic: self.mnemonic(),
                index,
            })
    }

    fn unsupported(&self, operand: &Operand) -> CpuError {
        CpuError::UnsupportedOperand {
            mnemonic: self.mnemonic(),
            operand: operand.to_string(),
        }
    }

    fn set_flag<M: Memory8086>(cpu: &mut Cpu8086<M>, flag: u32, value: bool) -> Result<(), CpuError> {
        cpu.flags.set(flag, value);
        Ok(())
    }

    /// Far jump/call target: an immediate pointer or a pointer in memory
    fn far_target<M: Memory8086>(&self, cpu: &Cpu8086<M>) -> Result<(u16, u16), CpuError> {
        let target = self.arg(0)?;
        target.get_far(cpu).ok_or_else(|| self.unsupported(&target))
    }

    /// RET imm16: drop the callee's arguments
    fn release_stack<M: Memory8086>(&self, cpu: &mut Cpu8086<M>) {
        if let Some(bytes) = self.operands.first() {
            let bytes = bytes.get(cpu);
            let sp = cpu.regs.get16(Reg16::SP).wrapping_add(bytes);
            cpu.regs.set16(Reg16::SP, sp);
        }
    }

    // Shared compute -> update flags -> store template for the ALU group
    fn alu<M: Memory8086>(&self, cpu: &mut Cpu8086<M>, alu: AluOp) -> Result<(), CpuError> {
        let (dst, src) = (self.arg(0)?, self.arg(1)?);
        let width = dst.width();
        let (a, b) = (dst.get(cpu), src.get(cpu));
        let flags = &mut cpu.flags;
        let result = match alu {
            AluOp::Add => flags.update_add(a, b, width),
            AluOp::Adc => flags.update_adc(a, b, width),
            AluOp::Sub | AluOp::Cmp => flags.update_sub(a, b, width),
            AluOp::Sbb => flags.update_sbb(a, b, width),
            AluOp::And => flags.update_and(a, b, width),
            AluOp::Or => flags.update_or(a, b, width),
            AluOp::Xor => flags.update_xor(a, b, width),
        };
        if alu == AluOp::Cmp {
            return Ok(());
        }
        dst.set(cpu, result)
    }

    fn mul<M: Memory8086>(&self, cpu: &mut Cpu8086<M>) -> Result<(), CpuError> {
        let src = self.arg(0)?;
        let val = src.get(cpu) as u32;
        let high_set = match src.width() {
            Width::Byte => {
                let result = cpu.regs.get8(Reg8::AL) as u32 * val;
                cpu.regs.set16(Reg16::AX, result as u16);
                cpu.flags.update_szp(result as u16, Width::Word);
                result & 0xFF00 != 0
            }
            Width::Word => {
                let result = cpu.regs.get16(Reg16::AX) as u32 * val;
                cpu.regs.set16(Reg16::AX, result as u16);
                cpu.regs.set16(Reg16::DX, (result >> 16) as u16);
                cpu.flags.update_szp(result as u16, Width::Word);
                result >> 16 != 0
            }
        };
        cpu.flags.set(FLAG_CF, high_set);
        cpu.flags.set(FLAG_OF, high_set);
        Ok(())
    }

    fn imul<M: Memory8086>(&self, cpu: &mut Cpu8086<M>) -> Result<(), CpuError> {
        let src = self.arg(0)?;
        let width = src.width();
        let val = width.sign_extend(src.get(cpu));
        let overflow = match width {
            Width::Byte => {
                let result = cpu.regs.get8(Reg8::AL) as i8 as i32 * val;
                cpu.regs.set16(Reg16::AX, result as u16);
                cpu.flags.update_szp(result as u16, Width::Word);
                result != result as i8 as i32
            }
            Width::Word => {
                let result = cpu.regs.get16(Reg16::AX) as i16 as i32 * val;
                cpu.regs.set16(Reg16::AX, result as u16);
                cpu.regs.set16(Reg16::DX, (result >> 16) as u16);
                cpu.flags.update_szp(result as u16, Width::Word);
                result != result as i16 as i32
            }
        };
        cpu.flags.set(FLAG_CF, overflow);
        cpu.flags.set(FLAG_OF, overflow);
        Ok(())
    }

    fn div<M: Memory8086>(&self, cpu: &mut Cpu8086<M>) -> Result<(), CpuError> {
        let src = self.arg(0)?;
        let divisor = src.get(cpu) as u32;
        if divisor == 0 {
            return cpu.interrupt(VECTOR_DIVIDE_ERROR);
        }
        match src.width() {
            Width::Byte => {
                let dividend = cpu.regs.get16(Reg16::AX) as u32;
                let quotient = dividend / divisor;
                if quotient > 0xFF {
                    return cpu.interrupt(VECTOR_DIVIDE_ERROR);
                }
                cpu.regs.set8(Reg8::AL, quotient as u8);
                cpu.regs.set8(Reg8::AH, (dividend % divisor) as u8);
            }
            Width::Word => {
                let dividend =
                    ((cpu.regs.get16(Reg16::DX) as u32) << 16) | cpu.regs.get16(Reg16::AX) as u32;
                let quotient = dividend / divisor;
                if quotient > 0xFFFF {
                    return cpu.interrupt(VECTOR_DIVIDE_ERROR);
                }
                cpu.regs.set16(Reg16::AX, quotient as u16);
                cpu.regs.set16(Reg16::DX, (dividend % divisor) as u16);
            }
        }
        Ok(())
    }

    fn idiv<M: Memory8086>(&self, cpu: &mut Cpu8086<M>) -> Result<(), CpuError> {
        let src = self.arg(0)?;
        let width = src.width();
        let divisor = width.sign_extend(src.get(cpu)) as i64;
        if divisor == 0 {
            return cpu.interrupt(VECTOR_DIVIDE_ERROR);
        }
        match width {
            Width::Byte => {
                let dividend = cpu.regs.get16(Reg16::AX) as i16 as i64;
                let quotient = dividend / divisor;
                if !(-128..=127).contains(&quotient) {
                    return cpu.interrupt(VECTOR_DIVIDE_ERROR);
                }
                cpu.regs.set8(Reg8::AL, quotient as u8);
                cpu.regs.set8(Reg8::AH, (dividend % divisor) as u8);
            }
            Width::Word => {
                let dividend = (((cpu.regs.get16(Reg16::DX) as u32) << 16)
                    | cpu.regs.get16(Reg16::AX) as u32) as i32 as i64;
                let quotient = dividend / divisor;
                if !(-32768..=32767).contains(&quotient) {
                    return cpu.interrupt(VECTOR_DIVIDE_ERROR);
                }
                cpu.regs.set16(Reg16::AX, quotient as u16);
                cpu.regs.set16(Reg16::DX, (dividend % divisor) as u16);
            }
        }
        Ok(())
    }
}

/// DAA (`add == true`) / DAS on AL
fn decimal_adjust<M: Memory8086>(cpu: &mut Cpu8086<M>, add: bool) {
    let old_al = cpu.regs.get8(Reg8::AL);
    let old_cf = cpu.flags.get(FLAG_CF);
    let mut al = old_al;

    let low_adjust = (al & 0x0F) > 9 || cpu.flags.get(FLAG_AF);
    if low_adjust {
        al = if add {
            al.wrapping_add(0x06)
        } else {
            al.wrapping_sub(0x06)
        };
    }
    cpu.flags.set(FLAG_AF, low_adjust);

    let high_adjust = old_al > 0x99 || old_cf;
    if high_adjust {
        al = if add {
            al.wrapping_add(0x60)
        } else {
            al.wrapping_sub(0x60)
        };
    }
    cpu.flags.set(FLAG_CF, high_adjust);

    cpu.regs.set8(Reg8::AL, al);
    cpu.flags.update_szp(al as u16, Width::Byte);
}

/// Shift or rotate `val` by `count` (1..=31), updating CF and, for a count
/// of 1, OF. Shifts also set SF, ZF and PF; rotates leave them alone.
pub fn shift_rotate(flags: &mut Flags, op: ShiftOp, val: u16, count: u8, width: Width) -> u16 {
    let mask = width.mask();
    let msb = width.sign_bit();
    let original = val & mask;
    let mut result = original;
    let mut cf = flags.get(FLAG_CF);

    // OF from the top two bits of the result, as ROR/RCR define it
    let top_bits_differ = |r: u16| ((r ^ (r << 1)) & msb) != 0;

    match op {
        ShiftOp::Rol => {
            for _ in 0..count {
                cf = result & msb != 0;
                result = ((result << 1) | cf as u16) & mask;
            }
            if count == 1 {
                flags.set(FLAG_OF, (result & msb != 0) != cf);
            }
        }
        ShiftOp::Ror => {
            for _ in 0..count {
                cf = result & 1 != 0;
                result = (result >> 1) | if cf { msb } else { 0 };
            }
            if count == 1 {
                flags.set(FLAG_OF, top_bits_differ(result));
            }
        }
        ShiftOp::Rcl => {
            for _ in 0..count {
                let out = result & msb != 0;
                result = ((result << 1) | cf as u16) & mask;
                cf = out;
            }
            if count == 1 {
                flags.set(FLAG_OF, (result & msb != 0) != cf);
            }
        }
        ShiftOp::Rcr => {
            for _ in 0..count {
                let out = result & 1 != 0;
                result = (result >> 1) | if cf { msb } else { 0 };
                cf = out;
            }
            if count == 1 {
                flags.set(FLAG_OF, top_bits_differ(result));
            }
        }
        ShiftOp::Shl => {
            for _ in 0..count {
                cf = result & msb != 0;
                result = (result << 1) & mask;
            }
            if count == 1 {
                flags.set(FLAG_OF, (result & msb != 0) != cf);
            }
        }
        ShiftOp::Shr => {
            for _ in 0..count {
                cf = result & 1 != 0;
                result >>= 1;
            }
            if count == 1 {
                flags.set(FLAG_OF, original & msb != 0);
            }
        }
        ShiftOp::Sar => {
            for _ in 0..count {
                cf = result & 1 != 0;
                result = (result >> 1) | (result & msb);
            }
            if count == 1 {
                flags.set(FLAG_OF, false);
            }
        }
    }

    flags.set(FLAG_CF, cf);
    if !matches!(op, ShiftOp::Rol | ShiftOp::Ror | ShiftOp::Rcl | ShiftOp::Rcr) {
        flags.update_szp(result, width);
    }
    result
}
