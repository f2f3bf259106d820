//! Benchmark Annex-B scanning and AVCC assembly on synthetic access units.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dd_media::codec::Codec;
use dd_media::nal::scan_annex_b;
use dd_media::sample::assemble;

/// SPS + PPS + `slices` slice units of `slice_len` bytes each.
fn make_access_unit(slices: usize, slice_len: usize) -> Vec<u8> {
    let mut au = vec![
        0, 0, 0, 1, 0x67, 0x64, 0x00, 0x28, 0xAC, 0xD9, //
        0, 0, 0, 1, 0x68, 0xEB, 0xE3, 0xCB,
    ];
    for i in 0..slices {
        au.extend_from_slice(&[0, 0, 1, if i == 0 { 0x65 } else { 0x41 }]);
        // 0xA5 never forms a start code.
        au.extend(std::iter::repeat(0xA5).take(slice_len));
    }
    au
}

fn bench_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("annexb_scan");

    // Sub-stream P-frame: a few KB.
    let small = make_access_unit(1, 4 * 1024);
    group.bench_function("4kb_1slice", |b| {
        b.iter(|| scan_annex_b(black_box(&small)).len());
    });

    // 1080p I-frame split into slices.
    let large = make_access_unit(8, 32 * 1024);
    group.bench_function("256kb_8slices", |b| {
        b.iter(|| scan_annex_b(black_box(&large)).len());
    });

    group.bench_function("256kb_8slices_assemble", |b| {
        b.iter(|| {
            let nalus = scan_annex_b(black_box(&large));
            assemble(Codec::H264, &nalus)
        });
    });

    group.finish();
}

criterion_group!(benches, bench_scan);
criterion_main!(benches);
