mod cli;

use std::{
    fs,
    path::Path,
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result, bail};
use clap::Parser;
use crossbeam_channel::Receiver;
use image::RgbaImage;
use indicatif::{ProgressBar, ProgressStyle};
use kinect_capture::{
    BodyJoint, ChannelSink, DeviceConfig, DeviceSession, PixelBuffer, Stream,
    device::synthetic::{SyntheticDriver, SyntheticOptions},
    types::ChannelLayout,
};

use cli::{CliArgs, Command};

const SINK_CAPACITY: usize = 2;
const REFRESH_INTERVAL: Duration = Duration::from_millis(100);

fn main() -> Result<()> {
    env_logger::init();

    let args = CliArgs::parse();
    let config = match &args.config {
        Some(path) => DeviceConfig::from_file(path)?,
        None => DeviceConfig::default(),
    };

    let driver = SyntheticDriver::new(SyntheticOptions {
        devices: args.synthetic_devices,
        bodies: args.synthetic_bodies,
        ..SyntheticOptions::default()
    });
    let mut session = DeviceSession::new(driver);

    match args.command {
        Command::Devices => list_devices(&mut session),
        Command::Run { seconds, dump } => run(
            &mut session,
            config,
            Duration::from_secs(seconds),
            dump.as_deref(),
        ),
    }
}

fn list_devices(session: &mut DeviceSession<SyntheticDriver>) -> Result<()> {
    let attached = session.count_devices();
    let devices = session.refresh_devices();
    println!("{} of {attached} devices available", devices.len());
    for device in devices {
        println!("  [{}] {}", device.index, device.serial_number);
    }
    Ok(())
}

/// Receiving end of one stream's sink.
struct Tap {
    name: &'static str,
    rx: Receiver<PixelBuffer>,
    frames: u64,
    last: Option<PixelBuffer>,
}

impl Tap {
    fn attach(
        session: &mut DeviceSession<SyntheticDriver>,
        stream: Stream,
        name: &'static str,
    ) -> Result<Self> {
        let (sink, rx) = ChannelSink::new(SINK_CAPACITY);
        session.set_sink(stream, sink)?;
        Ok(Self {
            name,
            rx,
            frames: 0,
            last: None,
        })
    }

    fn drain(&mut self) {
        for frame in self.rx.try_iter() {
            self.frames += 1;
            self.last = Some(frame);
        }
    }
}

fn run(
    session: &mut DeviceSession<SyntheticDriver>,
    mut config: DeviceConfig,
    duration: Duration,
    dump: Option<&Path>,
) -> Result<()> {
    if config.device_index.is_none() {
        let Some(first) = session.refresh_devices().first() else {
            bail!("no devices found");
        };
        log::info!("no device configured, using {}", first.serial_number);
        config.device_index = Some(first.index);
    }
    session.set_config(config)?;

    let mut taps = vec![
        Tap::attach(session, Stream::Colour, "colour")?,
        Tap::attach(session, Stream::Depth, "depth")?,
        Tap::attach(session, Stream::Infrared, "infrared")?,
        Tap::attach(session, Stream::BodyIndex, "body_index")?,
    ];

    session
        .try_start()
        .context("failed to start the device session")?;
    let store = session.skeleton_store();

    let progress = ProgressBar::new_spinner();
    progress.set_style(ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] {msg}",
    )?);
    progress.enable_steady_tick(REFRESH_INTERVAL);

    let deadline = Instant::now() + duration;
    while Instant::now() < deadline {
        thread::sleep(REFRESH_INTERVAL);
        let mut message = format!("skeletons {}", store.tracked_count());
        for tap in &mut taps {
            tap.drain();
            message.push_str(&format!(" | {} {}", tap.name, tap.frames));
        }
        progress.set_message(message);
    }

    let last = store.read();
    session.stop();
    for tap in &mut taps {
        tap.drain();
    }
    progress.finish_with_message(format!("captured for {}s", duration.as_secs()));

    for skeleton in last.skeletons() {
        if let Some(pelvis) = skeleton.joint(BodyJoint::Pelvis) {
            let p = pelvis.position;
            println!(
                "body {}: {} at ({:.1}, {:.1}, {:.1}) cm",
                skeleton.id,
                BodyJoint::Pelvis.display_name(),
                p.x,
                p.y,
                p.z
            );
        }
    }

    if let Some(dir) = dump {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create dump directory {}", dir.display()))?;
        for tap in &taps {
            if let Some(frame) = &tap.last {
                let path = dir.join(format!("{}.png", tap.name));
                write_png(frame, &path)?;
                println!("wrote {}", path.display());
            }
        }
    }

    Ok(())
}

fn write_png(frame: &PixelBuffer, path: &Path) -> Result<()> {
    let (width, height) = frame.size();
    let row_bytes = width as usize * frame.layout.bytes_per_pixel();
    let mut rgba = Vec::with_capacity(row_bytes * height as usize);
    for row in frame.bytes.chunks(frame.row_pitch).take(height as usize) {
        let Some(pixels) = row.get(..row_bytes) else {
            bail!("frame row is shorter than {row_bytes} bytes");
        };
        rgba.extend_from_slice(pixels);
    }
    if frame.layout == ChannelLayout::Bgra8 {
        for px in rgba.chunks_exact_mut(4) {
            px.swap(0, 2);
        }
    }

    let image = RgbaImage::from_raw(width, height, rgba)
        .with_context(|| format!("frame buffer does not match {width}x{height}"))?;
    image
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))
}
