use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::sleep;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rtrb::RingBuffer;

use mdlr::control::Command;
use mdlr::driver::{DriverConfig, HeadlessDriver, StreamInfo};
use mdlr::modules::{
    Adsr, Attenuator, ClockDivider, Envelope, KellettFilter, Metropolis, Oscillator, Sequencer, Step,
};
use mdlr::{
    EdgeDetector, Engine, Group, Module, PatchError, Ports, ProcessContext, Renderer, Signal, Value,
    VolumeRamp,
};

const CTX: ProcessContext = ProcessContext { sample_rate: 100.0 };

/// Writes a constant to its output.
struct Constant(f32);

impl Module for Constant {
    fn ports(&self) -> Ports {
        Ports::named(&[], &["output"])
    }

    fn process(&mut self, _: &ProcessContext, _: &[Signal], outputs: &mut [Signal]) {
        outputs[0] = self.0;
    }
}

/// Records every value seen on its input, shared with the test.
struct Recorder(Arc<AtomicU32>);

impl Module for Recorder {
    fn ports(&self) -> Ports {
        Ports::named(&["input"], &[])
    }

    fn process(&mut self, _: &ProcessContext, inputs: &[Signal], _: &mut [Signal]) {
        self.0.store(inputs[0].to_bits(), Ordering::Relaxed);
    }
}

fn recorder() -> (Recorder, Arc<AtomicU32>) {
    let seen = Arc::new(AtomicU32::new(0));
    (Recorder(Arc::clone(&seen)), seen)
}

fn seen(cell: &AtomicU32) -> f32 {
    f32::from_bits(cell.load(Ordering::Relaxed))
}

#[test]
fn edge_detector_reference_sequence() {
    let mut edge = EdgeDetector::new();
    let fired: Vec<usize> = [0.0, 0.5, 0.5, 0.5, 0.2, 0.6]
        .iter()
        .enumerate()
        .filter(|(_, &x)| edge.process(x))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(fired, [1, 5]);
}

#[test]
fn envelope_stays_in_range_under_random_gates() {
    let adsr = Adsr {
        attack: 0.01,
        decay: 0.01,
        sustain: 0.5,
        release: 0.01,
    };
    let mut env = Envelope::new();
    assert!(env.step(true, adsr, 100.0) >= 1.0);

    let mut rng = StdRng::seed_from_u64(42);
    let mut gate = false;
    for _ in 0..10_000 {
        if rng.gen_bool(0.1) {
            gate = !gate;
        }
        let v = env.step(gate, adsr, 100.0);
        assert!((0.0..=1.0).contains(&v));
    }
}

#[test]
fn clock_divider_in_a_group() {
    let mut g = Group::with_io(1, 7);
    g.add("div", ClockDivider::new()).unwrap();
    g.connect("in-0", "div.clock").unwrap();
    for (i, name) in ["1/2", "1/3", "1/4", "1/6", "1/8", "1/12", "1/16"].iter().enumerate() {
        g.connect(&format!("div.{}", name), &format!("out-{}", i)).unwrap();
    }

    let mut totals = [0u32; 7];
    let mut out = [0.0; 7];
    for _ in 0..16 {
        for level in [1.0, 0.0] {
            g.process_frame(&CTX, &[level], &mut out);
            for (t, p) in totals.iter_mut().zip(&out) {
                *t += *p as u32;
            }
        }
    }
    assert_eq!(totals, [8, 5, 4, 2, 2, 1, 1]);
}

#[test]
fn feed_forward_reaches_recorder_in_same_frame() {
    let (recorder, cell) = recorder();
    let mut g = Group::new();
    g.add("a", Constant(3.0)).unwrap();
    g.add("b", recorder).unwrap();
    g.connect("a.output", "b.input").unwrap();

    g.process_frame(&CTX, &[], &mut []);
    assert_eq!(seen(&cell), 3.0);
}

#[test]
fn backwards_connection_arrives_next_frame() {
    let (recorder, cell) = recorder();
    let mut g = Group::new();
    g.add("b", recorder).unwrap();
    g.add("a", Constant(3.0)).unwrap();
    g.connect("a.output", "b.input").unwrap();

    g.process_frame(&CTX, &[], &mut []);
    assert_eq!(seen(&cell), 0.0);
    g.process_frame(&CTX, &[], &mut []);
    assert_eq!(seen(&cell), 3.0);
}

#[test]
fn nested_groups_pass_values_across_boundaries() {
    let (recorder, cell) = recorder();

    let mut inner = Group::new();
    inner.add_input("x").unwrap();
    inner.add_output("y").unwrap();
    inner.add("gain", Attenuator::new()).unwrap();
    inner.connect("x", "gain.input").unwrap();
    inner.connect("gain.output", "y").unwrap();

    let mut outer = Group::new();
    outer.add_output("result").unwrap();
    outer.add("src", Constant(2.0)).unwrap();
    outer.add("inner", inner).unwrap();
    outer.add("rec", recorder).unwrap();
    outer.connect("src.output", "inner.x").unwrap();
    outer.connect("inner.y", "rec.input").unwrap();
    outer.connect("inner.y", "result").unwrap();

    // unity gain with a sample rate high enough for instant smoothing
    *outer.find_input_mut("inner.gain.gain").unwrap() = 1.0;
    let ctx = ProcessContext::new(1000.0);
    let mut out = [0.0];
    outer.process_frame(&ctx, &[], &mut out);
    assert_eq!(out, [2.0]);
    assert_eq!(seen(&cell), 2.0);
    assert_eq!(outer.find_output("inner.gain.output"), Some(2.0));
}

#[test]
fn fan_in_is_rejected_across_module_kinds() {
    let mut g = Group::new();
    g.add("a", Constant(1.0)).unwrap();
    g.add("b", Constant(2.0)).unwrap();
    g.add("osc", Oscillator::new()).unwrap();
    g.connect("a.output", "osc.frequency").unwrap();
    assert!(matches!(
        g.connect("b.output", "osc.frequency"),
        Err(PatchError::FanIn { .. })
    ));
    // fan-out is fine
    g.add("filter", KellettFilter::new()).unwrap();
    g.connect("a.output", "filter.cutoff").unwrap();
}

#[test]
fn path_lookup_fails_at_any_segment() {
    let mut inner = Group::new();
    inner.add("env", Envelope::new()).unwrap();
    let mut root = Group::new();
    root.add("voice", inner).unwrap();
    root.add("seq", Metropolis::with_seed(1)).unwrap();

    assert_eq!(root.find_input("voice.env.a"), Some(0.01));
    assert_eq!(root.find_input("nobody.env.a"), None);
    assert_eq!(root.find_input("voice.nobody.a"), None);
    assert_eq!(root.find_input("voice.env.nothing"), None);
    // a leaf module is not a scope
    assert_eq!(root.find_input("seq.inner.clock"), None);
    assert!(root.find_module("voice.env").is_some());
    assert!(root.find_module("voice.env.a").is_none());

    assert_eq!(root.find_parameter("seq.gatelen"), Some(Value::Float(1.0)));
    assert_eq!(
        root.apply(Command::parse("voice.env.q = 1").unwrap()),
        Err(PatchError::NotFound("voice.env.q".into()))
    );
    assert!(root.apply(Command::parse("nobody.randomize()").unwrap()).is_err());
}

#[test]
fn value_parse_order() {
    assert_eq!(Value::parse("1"), Value::Float(1.0));
    assert_eq!(Value::parse("-0.5"), Value::Float(-0.5));
    assert_eq!(Value::parse("true"), Value::Bool(true));
    assert_eq!(Value::parse("long"), Value::Text("long".into()));
    assert_eq!(Value::parse(""), Value::Empty);
}

#[test]
fn metropolis_repeat_and_end() {
    let mut steps = [Step::default(); 8];
    steps[0].repeat = 2;
    let mut m = Metropolis::with_seed(1).with_steps(steps);
    let mut outs = [0.0; 13];
    let mut ends = 0;
    for edge in 0..3 {
        m.process(&CTX, &[1.0, 0.0, 0.0], &mut outs);
        ends += outs[4] as u32;
        m.process(&CTX, &[0.0, 0.0, 0.0], &mut outs);
        assert_eq!(outs[4], 0.0, "end pulse lasts one frame (edge {})", edge);
    }
    assert_eq!(m.index(), 1);
    assert_eq!(ends, 0);

    // steps 1..7 take one edge each; the wrap back to 0 fires end
    for _ in 0..7 {
        m.process(&CTX, &[1.0, 0.0, 0.0], &mut outs);
        ends += outs[4] as u32;
        m.process(&CTX, &[0.0, 0.0, 0.0], &mut outs);
    }
    assert_eq!(m.index(), 0);
    assert_eq!(ends, 1);
}

#[test]
fn sequencer_pitch_randomize_leaves_velocity() {
    let velocity = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8];
    let mut seq = Sequencer::with_seed(99).with_steps([60.0; 8], velocity);
    for _ in 0..10_000 {
        Module::randomize(&mut seq, 1);
        assert!(seq.pitch().iter().all(|p| (30.0..=120.0).contains(p)));
    }
    assert_eq!(*seq.velocity(), velocity);
}

#[test]
fn control_surface_writes_nested_parameters() {
    let mut acid = Group::new();
    acid.add("seq", Metropolis::with_seed(5)).unwrap();
    let mut root = Group::new();
    root.add("acid", acid).unwrap();

    root.apply(Command::parse("acid.seq.gatelen = 0.02").unwrap()).unwrap();
    root.apply(Command::parse("acid.seq.slidetime = 0.0005").unwrap()).unwrap();
    assert_eq!(root.find_parameter("acid.seq.gatelen"), Some(Value::Float(0.02)));
    assert_eq!(root.find_parameter("acid.seq.slidetime"), Some(Value::Float(0.0005)));
    root.apply(Command::parse("acid.randomize(1)").unwrap()).unwrap();
}

#[test]
fn controller_commands_land_on_next_period() {
    let mut root = Group::with_io(0, 1);
    root.add("osc", Oscillator::new()).unwrap();
    root.connect("osc.output", "out-0").unwrap();
    let info = StreamInfo {
        sample_rate: 1000,
        buffer_size: 8,
        capture_channels: 0,
        playback_channels: 1,
    };
    let (mut renderer, mut controller) = Renderer::new(root, info, Arc::new(VolumeRamp::new()));

    let mut playback = [0.0; 8];
    renderer.render(&[], &mut playback);
    assert_eq!(renderer.system().find_input("osc.frequency"), Some(120.0));

    controller.submit("osc.frequency = 250").unwrap();
    assert_eq!(renderer.system().find_input("osc.frequency"), Some(120.0));
    renderer.render(&[], &mut playback);
    assert_eq!(renderer.system().find_input("osc.frequency"), Some(250.0));
}

#[test]
fn headless_engine_fades_in_and_out() {
    let (tap, mut rendered) = RingBuffer::new(1 << 16);
    let driver = HeadlessDriver::new(0, 1).with_tap(tap).free_running();
    let config = DriverConfig::default()
        .with_sample_rate(8000)
        .with_buffer_size(64)
        .with_ramp_timeout(Duration::from_secs(5));
    let mut engine = Engine::new(driver, &config).unwrap();

    let system = engine.system_mut().unwrap();
    system.add("osc", Oscillator::new()).unwrap();
    system.connect("osc.output", "out-0").unwrap();

    engine.start().unwrap();
    assert!(engine.volume() >= 0.99);
    engine.controller().unwrap().submit("osc.frequency = 440").unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut loudest = 0.0f32;
    while loudest < 0.5 && Instant::now() < deadline {
        while let Ok(sample) = rendered.pop() {
            assert!(sample.abs() <= 1.0);
            loudest = loudest.max(sample.abs());
        }
        sleep(Duration::from_millis(1));
    }
    assert!(loudest >= 0.5);

    engine.stop().unwrap();
    assert!(engine.volume() <= 0.01);
    assert!(!engine.is_running());
}
