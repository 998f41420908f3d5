use criterion::{Criterion, black_box, criterion_group, criterion_main};
use grid_fs::io::{self, RobustnessConfig};
use grid_fs::{Fingerprint, NormalizedPath};
use tempfile::tempdir;

fn write_atomic_benchmark(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let state = NormalizedPath::new(dir.path().join(".grid/state.json"));
    let payload = br#"{"version":1,"cursor":"rev-1","dirty":false,"files":{}}"#;

    c.bench_function("io::write_atomic (state file)", |b| {
        b.iter(|| io::write_atomic(black_box(&state), black_box(payload), RobustnessConfig::default()).unwrap())
    });
}

fn fingerprint_benchmark(c: &mut Criterion) {
    let small = vec![42u8; 4 * 1024];
    let large = vec![42u8; 4 * 1024 * 1024];

    c.bench_function("Fingerprint::of_bytes (4 KiB)", |b| {
        b.iter(|| Fingerprint::of_bytes(black_box(&small)))
    });
    c.bench_function("Fingerprint::of_bytes (4 MiB)", |b| {
        b.iter(|| Fingerprint::of_bytes(black_box(&large)))
    });

    c.bench_function("Fingerprint::of_file (4 MiB)", |b| {
        let dir = tempdir().unwrap();
        let path = dir.path().join("large.bin");
        std::fs::write(&path, &large).unwrap();
        b.iter(|| Fingerprint::of_file(black_box(&path)).unwrap())
    });
}

criterion_group!(benches, write_atomic_benchmark, fingerprint_benchmark);
criterion_main!(benches);
