use criterion::{black_box, criterion_group, criterion_main, Criterion};

use chip8::{prelude::*, TimerMode};

/// Draws a random maze of diagonal lines, then spins.
#[rustfmt::skip]
const MAZE: &[u8] = &[
    0xA2, 0x1E, // 0x200: LD I, .left
    0xC2, 0x01, // 0x202: RND v2, 1
    0x32, 0x01, // 0x204: SE v2, 1
    0xA2, 0x1A, // 0x206: LD I, .right
    0xD0, 0x14, // 0x208: DRW v0, v1, 4
    0x70, 0x04, // 0x20A: ADD v0, 4
    0x30, 0x40, // 0x20C: SE v0, 64
    0x12, 0x00, // 0x20E: JP 0x200
    0x60, 0x00, // 0x210: LD v0, 0
    0x71, 0x04, // 0x212: ADD v1, 4
    0x31, 0x20, // 0x214: SE v1, 32
    0x12, 0x00, // 0x216: JP 0x200
    0x12, 0x18, // 0x218: JP 0x218
    0x80, 0x40, 0x20, 0x10, // 0x21A: .right
    0x10, 0x20, 0x40, 0x80, // 0x21E: .left
];

fn criterion_benchmark(c: &mut Criterion) {
    {
        let mut vm = Chip8Vm::new(Chip8Conf {
            timer_mode: TimerMode::Manual,
            seed: Some(42),
            ..Default::default()
        });

        c.bench_function("maze bytecode", |b| {
            b.iter(|| {
                vm.load_bytecode(MAZE).unwrap();
                let step_count = black_box(1000_usize);
                black_box(vm.run_steps(step_count))
            })
        });
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
