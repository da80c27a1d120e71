//! Benchmarks the Magic Scanner's per-file classification cost against the
//! shapes a real dump directory exercises it with: a hit on each table rule,
//! plus the no-match fall-through that most files in a firmware archive take.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use firmdump::magic;

fn write_fixture(dir: &Path, name: &str, len: usize, stamp: Option<(u64, &[u8])>) -> std::path::PathBuf {
    let path = dir.join(name);
    let mut contents = vec![0u8; len];
    if let Some((offset, bytes)) = stamp {
        let offset = offset as usize;
        contents[offset..offset + bytes.len()].copy_from_slice(bytes);
    }
    let mut file = File::create(&path).unwrap();
    file.write_all(&contents).unwrap();
    path
}

fn bench_classify(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();

    let sparse_raw = write_fixture(dir.path(), "system.img", 8192, Some((0, &[0x3A, 0xFF, 0x26, 0xED])));
    let erofs = write_fixture(dir.path(), "vendor.img", 8192, Some((1024, &[0xE2, 0xE1, 0xF5, 0xE0])));
    let ext4 = write_fixture(dir.path(), "product.img", 8192, Some((1080, &[0x53, 0xEF])));
    let unknown = write_fixture(dir.path(), "build.prop", 4096, None);

    let mut group = c.benchmark_group("magic_scan");

    group.bench_function("sparse_raw_hit", |b| b.iter(|| magic::classify(black_box(&sparse_raw))));
    group.bench_function("erofs_hit", |b| b.iter(|| magic::classify(black_box(&erofs))));
    group.bench_function("ext4_hit", |b| b.iter(|| magic::classify(black_box(&ext4))));
    group.bench_function("no_match_fallthrough", |b| b.iter(|| magic::classify(black_box(&unknown))));

    group.finish();
}

criterion_group!(benches, bench_classify);
criterion_main!(benches);
