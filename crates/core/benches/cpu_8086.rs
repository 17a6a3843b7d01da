use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use emu86_core::cpu_8086::{ArrayMemory, Cpu8086, Memory8086, Reg16, SegReg};

/// Memory with a tight ALU loop at 1000:0100
fn bench_memory() -> ArrayMemory {
    let mut mem = ArrayMemory::new();
    let program = [
        0xB8, 0x42, 0x00, // mov ax, 0x42
        0x89, 0x07, // mov [bx], ax
        0x43, // inc bx
        0x01, 0xC1, // add cx, ax
        0x31, 0xD2, // xor dx, dx
        0xD1, 0xE0, // shl ax, 1
        0xEB, 0xF2, // jmp 0x0100
    ];
    mem.set_bytes(0x1000, 0x0100, &program);
    mem
}

fn bench_cpu() -> Cpu8086<ArrayMemory> {
    let mut cpu = Cpu8086::new(bench_memory());
    for seg in [SegReg::CS, SegReg::DS, SegReg::ES, SegReg::SS] {
        cpu.regs.set_seg(seg, 0x1000);
    }
    cpu.regs.ip = 0x0100;
    cpu.regs.set16(Reg16::SP, 0xFFFE);
    cpu.regs.set16(Reg16::BX, 0x0400);
    cpu
}

fn bench_cpu_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("cpu_8086_step");

    group.bench_function("single_instruction", |b| {
        b.iter(|| {
            let mut cpu = bench_cpu();
            cpu.step().unwrap();
            black_box(cpu.regs.get16(Reg16::AX));
        });
    });

    group.finish();
}

fn bench_cpu_multiple_steps(c: &mut Criterion) {
    let mut group = c.benchmark_group("cpu_8086_multiple_steps");

    for step_count in [10, 100, 1000].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(step_count),
            step_count,
            |b, &count| {
                b.iter(|| {
                    let mut cpu = bench_cpu();
                    cpu.run(Some(count)).unwrap();
                    black_box(cpu.steps);
                });
            },
        );
    }

    group.finish();
}

fn bench_rep_movsb(c: &mut Criterion) {
    let mut group = c.benchmark_group("cpu_8086_strings");

    for len in [64u16, 4096, 32768].iter() {
        group.bench_with_input(BenchmarkId::new("rep_movsb", len), len, |b, &len| {
            b.iter(|| {
                let mut cpu = bench_cpu();
                // rep movsb
                cpu.memory.set_bytes(0x1000, 0x0100, &[0xF3, 0xA4]);
                cpu.regs.set_seg(SegReg::ES, 0x3000);
                cpu.regs.set16(Reg16::SI, 0x1000);
                cpu.regs.set16(Reg16::DI, 0x0000);
                cpu.regs.set16(Reg16::CX, len);
                cpu.step().unwrap();
                black_box(cpu.regs.get16(Reg16::DI));
            });
        });
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    c.bench_function("cpu_8086_disassemble", |b| {
        let cpu = bench_cpu();
        b.iter(|| {
            black_box(cpu.disassemble(7));
        });
    });
}

fn bench_cpu_reset(c: &mut Criterion) {
    c.bench_function("cpu_8086_reset", |b| {
        let mut cpu = bench_cpu();
        b.iter(|| {
            cpu.reset();
            black_box(cpu.regs.ip);
        });
    });
}

criterion_group!(
    benches,
    bench_cpu_step,
    bench_cpu_multiple_steps,
    bench_rep_movsb,
    bench_decode,
    bench_cpu_reset
);
criterion_main!(benches);
