//! Plays a small generative patch: an acid line and a kick drum sharing
//! one clock.
//!
//! Run with: cargo run --features cpal_sink -- -v -s 20
//!
//! Extra `-c` commands are sent through the control queue once playback has
//! started, e.g. `-c "acid.filter.cutoff = 0.4" -c "acid.seq.randomize(1)"`.

use std::error::Error;
use std::f32::consts::TAU;
use std::thread::sleep;
use std::time::Duration;

use clap::{ArgAction, Parser};
use tracing::{info, warn, Level};

use mdlr::control::Command;
use mdlr::driver::{DeviceSelector, Driver, DriverConfig, HeadlessDriver};
use mdlr::modules::{
    Adsr, Attenuator, ClockDivider, Delay, Envelope, KellettFilter, Metropolis, Mixer, Oscillator,
    Sigmoid,
};
use mdlr::{EdgeDetector, Engine, Group, Module, PatchError, Ports, Port, ProcessContext, Signal};

#[derive(Parser, Debug)]
#[command(name = "mdlr")]
#[command(about = "Per-sample modular synth playing a generative demo patch", long_about = None)]
struct Args {
    #[arg(short = 'r', long, value_name = "HZ", default_value_t = 44_100)]
    sample_rate: u32,

    /// Frames per audio period
    #[arg(short, long, value_name = "FRAMES", default_value_t = 1024)]
    buffer_size: u32,

    /// How long to play
    #[arg(short, long, value_name = "SECONDS", default_value_t = 10.0)]
    seconds: f32,

    /// Render on a software clock instead of an audio device
    #[arg(long)]
    headless: bool,

    /// Playback device, matched by substring
    #[arg(short, long, value_name = "NAME")]
    device: Option<String>,

    /// Seed for the sequencer patterns
    #[arg(long)]
    seed: Option<u64>,

    /// Control command to send after start (repeatable)
    #[arg(short = 'c', long = "command", value_name = "COMMAND")]
    commands: Vec<String>,

    /// Print the patch before playing
    #[arg(long)]
    describe: bool,

    /// List audio devices and exit
    #[arg(long)]
    list_devices: bool,

    /// More logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

/// Pitch-swept sine drum.
///
/// A rising edge on `trigger` restarts two envelopes: a short one sweeping
/// the pitch down onto `pitch`, and one of length `decay` shaping the level.
struct Kick {
    trigger: EdgeDetector,
    sweep: Envelope,
    body: Envelope,
    phase: f32,
}

impl Kick {
    fn new() -> Self {
        Self {
            trigger: EdgeDetector::new(),
            sweep: Envelope::new(),
            body: Envelope::new(),
            phase: 0.0,
        }
    }
}

impl Module for Kick {
    fn ports(&self) -> Ports {
        Ports::new(
            vec![
                Port::new("trigger"),
                Port::new("pitch").with_default(50.0),
                Port::new("velocity").with_default(1.0),
                Port::new("decay").with_default(0.2),
            ],
            vec![Port::new("output")],
        )
    }

    fn process(&mut self, ctx: &ProcessContext, inputs: &[Signal], outputs: &mut [Signal]) {
        let hit = self.trigger.process(inputs[0]);
        let strike = Adsr {
            attack: 0.0,
            decay: 0.0,
            sustain: 1.0,
            release: 0.01,
        };
        let sweep = self.sweep.step(hit, strike, ctx.sample_rate);
        let body = self.body.step(
            hit,
            Adsr {
                release: inputs[3],
                ..strike
            },
            ctx.sample_rate,
        );

        let frequency = inputs[1] + sweep * sweep * 400.0;
        outputs[0] = self.phase.sin() * inputs[2] * body;
        self.phase = (self.phase + TAU * frequency / ctx.sample_rate).rem_euclid(TAU);
    }
}

/// Metropolis-driven oscillator through a resonant filter and a VCA.
fn acid_voice(seed: u64) -> Result<Group, PatchError> {
    let mut acid = Group::new();
    acid.add_input("clock")?;
    acid.add_output("out")?;

    acid.add(
        "seq",
        Metropolis::with_seed(seed)
            .with_gate_length(0.02)
            .with_slide_time(0.0005),
    )?;
    acid.add("osc", Oscillator::new())?;
    acid.add("filter", KellettFilter::new())?;
    acid.add("env", Envelope::new())?;
    acid.add("amp", Attenuator::new())?;

    acid.connect("clock", "seq.clock")?;
    acid.connect("seq.pitch", "osc.frequency")?;
    acid.connect("seq.gate", "env.gate")?;
    acid.connect("osc.output", "filter.input")?;
    acid.connect("filter.lowpass", "amp.input")?;
    acid.connect("env.output", "amp.gain")?;
    acid.connect("amp.output", "out")?;
    Ok(acid)
}

fn build_patch(system: &mut Group, seed: u64) -> Result<(), Box<dyn Error>> {
    system.add("clock", Oscillator::new())?;
    system.add("square", Sigmoid)?;
    system.add("div", ClockDivider::new())?;
    system.add("acid", acid_voice(seed)?)?;
    system.add("kick", Kick::new())?;
    system.add("echo", Delay::new())?;
    system.add("mix", Mixer::new(3))?;

    system.connect("clock.output", "square.input")?;
    system.connect("square.output", "div.clock")?;
    system.connect("square.output", "acid.clock")?;
    system.connect("div.1/4", "kick.trigger")?;
    system.connect("acid.out", "echo.input")?;
    system.connect("acid.out", "mix.in0")?;
    system.connect("kick.output", "mix.in1")?;
    system.connect("echo.output", "mix.in2")?;
    for i in 0..system.output_count() {
        system.connect("mix.output", &format!("out-{}", i))?;
    }

    for line in [
        "clock.frequency = 8",
        "square.k = 40",
        "acid.seq.randomize()",
        "acid.filter.cutoff = 0.15",
        "acid.filter.resonance = 0.6",
        "acid.env.a = 0.002",
        "acid.env.r = 0.05",
        "echo.time = 0.125",
        "mix.volume0 = 0.5",
        "mix.volume1 = 0.8",
        "mix.volume2 = 0.25",
    ] {
        system.apply(Command::parse(line)?)?;
    }
    Ok(())
}

#[cfg(feature = "cpal_sink")]
fn driver(args: &Args) -> Box<dyn Driver> {
    if args.headless {
        Box::new(HeadlessDriver::new(0, 2))
    } else {
        Box::new(mdlr::driver::CpalDriver::new())
    }
}

#[cfg(not(feature = "cpal_sink"))]
fn driver(args: &Args) -> Box<dyn Driver> {
    if !args.headless {
        warn!("built without the cpal_sink feature, rendering headless");
    }
    Box::new(HeadlessDriver::new(0, 2))
}

#[cfg(feature = "cpal_sink")]
fn list_devices() {
    use mdlr::driver::CpalDriver;

    println!("Output devices:");
    for device in CpalDriver::list_outputs() {
        println!("  {} ({} Hz, {} ch)", device.name, device.sample_rate, device.channels);
    }
    println!("Input devices:");
    for device in CpalDriver::list_inputs() {
        println!("  {} ({} Hz, {} ch)", device.name, device.sample_rate, device.channels);
    }
}

#[cfg(not(feature = "cpal_sink"))]
fn list_devices() {
    println!("No audio backend compiled in; rebuild with --features cpal_sink");
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    if args.list_devices {
        list_devices();
        return Ok(());
    }

    let mut config = DriverConfig::default()
        .with_sample_rate(args.sample_rate)
        .with_buffer_size(args.buffer_size);
    if let Some(name) = &args.device {
        config = config.with_playback(DeviceSelector::Named(name.clone()));
    }

    let mut engine = Engine::new(driver(&args), &config)?;
    let seed = args.seed.unwrap_or_else(rand::random);
    let system = engine.system_mut().ok_or("engine started before the patch was built")?;
    build_patch(system, seed)?;
    if args.describe {
        print!("{}", system.describe());
    }
    info!(seed, info = ?engine.info(), "patch built");

    engine.start()?;
    if let Some(controller) = engine.controller() {
        for line in &args.commands {
            if let Err(err) = controller.submit(line) {
                warn!(%err, "command not sent");
            }
        }
    }

    sleep(Duration::from_secs_f32(args.seconds.max(0.0)));
    engine.stop()?;
    Ok(())
}
