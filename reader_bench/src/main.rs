use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use log::{info, warn};
use signal_hook::consts::{SIGINT, SIGTERM};

use mmqueue::reader;

const END_MARKER: &str = " 🐓 🏰 🥕 ";
const IDLE_INTERVAL: Duration = Duration::from_micros(50);

#[derive(clap::Parser)]
#[clap()]
struct Opts {
    #[clap(short = 'c', long = "config", default_value = "mmqueue-reader.toml")]
    config: String,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let opts: Opts = Opts::parse();
    let cfg: reader::ReaderConfig = confy::load_path(&opts.config)?;
    info!("{:?}", &cfg.queue);

    let stop = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGINT, Arc::clone(&stop))?;
    signal_hook::flag::register(SIGTERM, Arc::clone(&stop))?;

    let mut reader = reader::MessageReader::new(&cfg)?;
    run(&mut reader, &stop)?;
    reader.close();
    Ok(())
}

struct ReaderContext {
    called: u64,
    finished: bool,
}

impl ReaderContext {
    /// Messages are the decimal sequence numbers 0, 1, 2, ... followed by the end marker.
    fn accept(&mut self, message: &[u8]) -> Result<(), Box<dyn Error>> {
        let message = String::from_utf8_lossy(message);
        if message == END_MARKER {
            self.finished = true;
            return Ok(());
        }
        let expected = self.called.to_string();
        if message != expected {
            return Err(format!("expected message {}, got {:?}", expected, message).into());
        }
        self.called += 1;
        if self.called % 100_000 == 0 {
            eprint!("\rTotal {} ops (current value: {})", self.called, message);
        }
        Ok(())
    }
}

fn run(reader: &mut reader::MessageReader, stop: &AtomicBool) -> Result<(), Box<dyn Error>> {
    let mut start = None;
    let ctx = &mut ReaderContext {
        called: 0,
        finished: false,
    };
    while !ctx.finished {
        if stop.load(Ordering::Relaxed) {
            warn!("interrupted after {} messages", ctx.called);
            break;
        }
        match reader.read() {
            Ok(Some(message)) => {
                start.get_or_insert_with(Instant::now);
                ctx.accept(&message)?;
            }
            Ok(None) => thread::sleep(IDLE_INTERVAL),
            Err(e) if e.is_transient() => warn!("{}", e),
            Err(e) => return Err(e.into()),
        }
    }

    let duration = start.map(|s| s.elapsed()).unwrap_or_default();
    let iops = (ctx.called as f64) / duration.as_secs_f64().max(f64::EPSILON);
    println!(
        "\n{:#?}K messages read/s. Total {} messages in {:#?} ({})",
        (iops / 1000f64) as u64,
        ctx.called,
        duration,
        reader.stats()
    );
    Ok(())
}
