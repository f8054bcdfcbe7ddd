use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mdlr::driver::StreamInfo;
use mdlr::modules::{Attenuator, Envelope, KellettFilter, Metropolis, Oscillator};
use mdlr::{Group, Module, ProcessContext, Renderer, VolumeRamp};

fn acid_voice() -> Group {
    let mut g = Group::with_io(1, 1);
    g.add("seq", Metropolis::with_seed(1)).unwrap();
    g.add("osc", Oscillator::new()).unwrap();
    g.add("filter", KellettFilter::new()).unwrap();
    g.add("env", Envelope::new()).unwrap();
    g.add("amp", Attenuator::new()).unwrap();
    g.connect("in-0", "seq.clock").unwrap();
    g.connect("seq.pitch", "osc.frequency").unwrap();
    g.connect("seq.gate", "env.gate").unwrap();
    g.connect("osc.output", "filter.input").unwrap();
    g.connect("filter.lowpass", "amp.input").unwrap();
    g.connect("env.output", "amp.gain").unwrap();
    g.connect("amp.output", "out-0").unwrap();
    g.randomize_at("seq", 0).unwrap();
    g
}

pub fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("Oscillator.process()", |b| {
        let ctx = ProcessContext::new(48_000.0);
        let mut osc = Oscillator::new();
        let mut output = [0.0];
        b.iter(|| osc.process(&ctx, black_box(&[440.0]), &mut output))
    });

    c.bench_function("Group.process_frame() acid voice", |b| {
        let ctx = ProcessContext::new(48_000.0);
        let mut voice = acid_voice();
        let mut output = [0.0];
        let mut clock = 0.0;
        b.iter(|| {
            clock = 1.0 - clock;
            voice.process_frame(&ctx, black_box(&[clock]), &mut output)
        })
    });

    c.bench_function("Renderer.render() 512 frames", |b| {
        let info = StreamInfo {
            sample_rate: 48_000,
            buffer_size: 512,
            capture_channels: 1,
            playback_channels: 1,
        };
        let (mut renderer, _controller) = Renderer::new(acid_voice(), info, Arc::new(VolumeRamp::new()));
        let capture: Vec<f32> = (0..512).map(|i| (i / 32 % 2) as f32).collect();
        let mut playback = vec![0.0; 512];
        b.iter(|| renderer.render(black_box(&capture), &mut playback))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
