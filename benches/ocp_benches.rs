use RustedOCP::Examples::ocp_examples::{cstr_config, cstr_model};
use RustedOCP::numerical::optimal_control::shooting_transcriber::ShootingTranscriber;
use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

fn bench_cstr_transcription(c: &mut Criterion) {
    let model = cstr_model().unwrap();
    let transcriber = ShootingTranscriber::new(cstr_config());
    c.bench_function("CSTR transcription", |b| {
        b.iter(|| transcriber.transcribe(black_box(&model)).unwrap())
    });
}

fn bench_cstr_evaluation(c: &mut Criterion) {
    let model = cstr_model().unwrap();
    let mut group = c.benchmark_group("CSTR NLP evaluation");
    for parallel in [false, true] {
        let config = cstr_config().with_parallel(parallel);
        let ocp = ShootingTranscriber::new(config).transcribe(&model).unwrap();
        let v0 = ocp.nlp.v0.clone();
        let name = if parallel { "parallel" } else { "sequential" };
        group.bench_function(format!("constraints, {}", name), |b| {
            b.iter(|| ocp.nlp.constraints(black_box(v0.as_slice())).unwrap())
        });
        group.bench_function(format!("values and derivatives, {}", name), |b| {
            b.iter(|| ocp.nlp.evaluate(black_box(v0.as_slice())).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_cstr_transcription, bench_cstr_evaluation);
criterion_main!(benches);
