use console_core::stores::{build_store, StoreInit};
use console_core::{ConsoleConfig, HeadlessSurface, LatLng, LayerPreference, RecordSchema};
use console_proto::{ChainId, Classification, DisplayType, LayerId, StreamKey, SubSystemId};
use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};

fn init(header: &str, display: DisplayType) -> StoreInit {
    StoreInit {
        layer: LayerId::stream(
            ChainId::parse("A").unwrap(),
            SubSystemId::parse("S1").unwrap(),
            StreamKey::parse("T1").unwrap(),
        ),
        sensor_origin: LatLng::new(45.0, -75.0),
        schema: RecordSchema::decode(header, display),
        classifications: (0..4)
            .map(|i| Classification {
                palette_index: i,
                symbol_index: i % 3,
                label: None,
            })
            .collect(),
        refresh_period_ms: 1_000,
        dot_size_m: None,
        preference: LayerPreference::default(),
    }
}

fn records(display: DisplayType, count: usize) -> Vec<String> {
    (0..count)
        .map(|i| match display {
            DisplayType::Track => format!(
                "\"{}\",{:.5},{:.5},{},{},{},\"info\"",
                i % 200,
                45.0 + (i as f64) * 1e-5,
                -75.0,
                i % 40,
                i % 360,
                i % 4
            ),
            DisplayType::Strobe => format!("\"{}\",{},{},{}", i % 200, i % 360, 5_000, i % 4),
            _ => format!("{},{},{}", i % 4, (i % 360) as f64, 1_000 + i % 5_000),
        })
        .collect()
}

fn bench_ingest(c: &mut Criterion) {
    let config = ConsoleConfig::default();
    let mut group = c.benchmark_group("ingest");

    let cases = [
        (DisplayType::Plot, "Type,Azimuth,Range"),
        (DisplayType::HeatMap, "Type,Azimuth,Range"),
        (DisplayType::Strobe, "Identifier,Azimuth,Range,Type"),
        (
            DisplayType::Track,
            "Identifier,Latitude,Longitude,Speed,Bearing,Type,Info",
        ),
    ];

    for (display, header) in cases {
        for count in [1_000usize, 10_000] {
            let lines = records(display, count);
            group.bench_with_input(
                BenchmarkId::new(display.to_string(), count),
                &lines,
                |b, lines| {
                    b.iter_batched(
                        || {
                            let mut surface = HeadlessSurface::new();
                            let store = build_store(init(header, display), &config, &mut surface);
                            (surface, store)
                        },
                        |(mut surface, mut store)| {
                            for line in lines {
                                let _ = store.enqueue(line, 0);
                            }
                            store.refresh(&mut surface, 0);
                        },
                        BatchSize::SmallInput,
                    )
                },
            );
        }
    }

    group.finish();
}

criterion_group!(ingest_benches, bench_ingest);
criterion_main!(ingest_benches);
