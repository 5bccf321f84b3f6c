// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Scanner and pipeline throughput on generated STEP data
//!
//! Run with: cargo bench -p ifc-ingest-step --bench scan

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ifc_ingest_model::{StringTable, YieldPoint};
use ifc_ingest_step::{EntityIndex, EntityScanner, StepParser};

/// A storey with `walls` walls, each carrying one property set
fn generate_step(walls: usize) -> Vec<u8> {
    let mut out = String::from(
        "ISO-10303-21;\nHEADER;\nFILE_SCHEMA(('IFC4'));\nENDSEC;\nDATA;\n\
         #1=IFCPROJECT('p',$,'Bench',$,$,$,$,$,$);\n\
         #2=IFCBUILDINGSTOREY('s',$,'L0',$,$,$,$,$,.ELEMENT.,0.);\n\
         #3=IFCRELAGGREGATES('a',$,$,$,#1,(#2));\n",
    );
    let mut next = 10;
    let mut contained = Vec::with_capacity(walls);
    for i in 0..walls {
        let (wall, prop, pset, rel) = (next, next + 1, next + 2, next + 3);
        next += 4;
        contained.push(format!("#{}", wall));
        out.push_str(&format!(
            "#{}=IFCWALL('w{}',$,'Wall \\X2\\00E9\\X0\\ {}',$,$,$,$,$);\n\
             #{}=IFCPROPERTYSINGLEVALUE('IsExternal',$,IFCBOOLEAN(.T.),$);\n\
             #{}=IFCPROPERTYSET('ps{}',$,'Pset_WallCommon',$,(#{}));\n\
             #{}=IFCRELDEFINESBYPROPERTIES('r{}',$,$,$,(#{}),#{});\n",
            wall, i, i, prop, pset, i, prop, rel, i, wall, pset
        ));
    }
    out.push_str(&format!(
        "#{}=IFCRELCONTAINEDINSPATIALSTRUCTURE('c',$,$,$,({}),#2);\nENDSEC;\nEND-ISO-10303-21;\n",
        next,
        contained.join(",")
    ));
    out.into_bytes()
}

fn bench_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan");
    for walls in [1_000, 10_000] {
        let data = generate_step(walls);
        group.throughput(Throughput::Bytes(data.len() as u64));

        group.bench_with_input(BenchmarkId::new("scanner", walls), &data, |b, data| {
            b.iter(|| EntityScanner::new(black_box(data)).count())
        });
        group.bench_with_input(BenchmarkId::new("index", walls), &data, |b, data| {
            b.iter(|| {
                let strings = StringTable::new();
                EntityIndex::build(black_box(data), &strings, &mut YieldPoint::disabled()).len()
            })
        });
    }
    group.finish();
}

fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");
    group.sample_size(20);
    let data = generate_step(10_000);
    group.throughput(Throughput::Bytes(data.len() as u64));

    let eager = StepParser::new();
    let lazy = StepParser::new().with_eager_property_threshold(0);
    group.bench_function("eager_properties", |b| {
        b.iter(|| eager.parse(black_box(&data)).map(|s| s.entity_count))
    });
    group.bench_function("on_demand_properties", |b| {
        b.iter(|| lazy.parse(black_box(&data)).map(|s| s.entity_count))
    });
    group.finish();
}

criterion_group!(benches, bench_scan, bench_pipeline);
criterion_main!(benches);
