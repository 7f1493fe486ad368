//! Benchmarks for pipeline execution.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use stagepipe::prelude::*;
use stagepipe::testing::{CopyStage, HeadStage, RepeatStage, SharedBuffer};
use std::sync::Arc;

fn copy_chain(stages: usize) -> Pipeline {
    let mut builder = PipelineBuilder::new().stage(Arc::new(RepeatStage::new("seq", vec![b'x'; 4096]).times(256)));
    for i in 0..stages {
        builder = builder.stage(Arc::new(CopyStage::new(format!("cat{i}"))));
    }
    builder.build().expect("non-empty pipeline")
}

fn pipeline_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("runtime");

    let chain = copy_chain(4);
    c.bench_function("copy_1mib_through_4_stages", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let token = CancellationToken::new();
                let result = chain
                    .run(&token, tokio::io::empty(), SharedBuffer::new(), Diagnostics::sink())
                    .await;
                black_box(result)
            })
        });
    });

    let early_exit = PipelineBuilder::new()
        .stage(Arc::new(RepeatStage::new("yes", "y\n")))
        .stage(Arc::new(HeadStage::new("head", 100)))
        .build()
        .expect("non-empty pipeline");
    c.bench_function("yes_head_100", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let token = CancellationToken::new();
                let result = early_exit
                    .run(&token, tokio::io::empty(), SharedBuffer::new(), Diagnostics::sink())
                    .await;
                black_box(result)
            })
        });
    });
}

criterion_group!(benches, pipeline_benchmark);
criterion_main!(benches);
