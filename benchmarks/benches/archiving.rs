//! Benchmarks for writing voice archives in both formats

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use pack_core::ArchiveFormat;
use packager::archive;
use tempfile::TempDir;

fn archive_write_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("archive_write");

    for size in [1_000_000, 10_000_000, 60_000_000].iter() {
        // Setup: an export directory with a model of `size` bytes
        let source = TempDir::new().unwrap();
        let model: Vec<u8> = (0..*size).map(|i| (i % 251) as u8).collect();
        std::fs::write(source.path().join("model.onnx"), &model).unwrap();
        std::fs::write(source.path().join("config.json"), br#"{"streaming": true}"#).unwrap();
        let entries = archive::collect_entries(source.path()).unwrap();

        group.throughput(Throughput::Bytes(*size as u64));

        for format in [ArchiveFormat::Zip, ArchiveFormat::TarGz] {
            group.bench_function(
                format!("{}/{}MB", format.extension(), size / 1_000_000),
                |b| {
                    let target_dir = TempDir::new().unwrap();
                    let target = target_dir.path().join(format.file_name("bench-voice+RT-medium"));
                    b.iter(|| {
                        archive::write_archive(format, &entries, &target).unwrap();
                    });
                },
            );
        }
    }

    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = archive_write_benchmark
}
criterion_main!(benches);
