//! Simulated devices for tests and the demo node.
//!
//! The witness samples a square wave at the beacon's current period with a
//! little seeded noise, so collected signals carry the emitted schedule.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::device::{Beacon, DeviceError, SampleSink, Witness};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BeaconEvent {
    Setup,
    Start(u64),
    Stop,
}

#[derive(Default)]
pub struct SimulatedBeacon {
    events: Mutex<Vec<BeaconEvent>>,
    emitting: Mutex<Option<(u64, Instant)>>,
    failing: AtomicBool,
}

impl SimulatedBeacon {
    pub fn new() -> Self {
        Self::default()
    }

    /// A beacon whose `start` always fails.
    pub fn failing() -> Self {
        let beacon = Self::default();
        beacon.failing.store(true, Ordering::SeqCst);
        beacon
    }

    pub fn events(&self) -> Vec<BeaconEvent> {
        self.events.lock().clone()
    }

    /// Periods of every successful start, in order.
    pub fn started_periods(&self) -> Vec<u64> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                BeaconEvent::Start(period) => Some(*period),
                _ => None,
            })
            .collect()
    }

    pub fn is_emitting(&self) -> bool {
        self.emitting.lock().is_some()
    }

    /// On/off level at this instant.
    pub fn level(&self) -> f64 {
        match *self.emitting.lock() {
            Some((period, since)) => {
                let elapsed = since.elapsed().as_millis() as u64;
                if (elapsed / period.max(1)) % 2 == 0 {
                    1.0
                } else {
                    0.0
                }
            }
            None => 0.0,
        }
    }
}

impl Beacon for SimulatedBeacon {
    fn setup(&self) -> Result<(), DeviceError> {
        self.events.lock().push(BeaconEvent::Setup);
        Ok(())
    }

    fn start(&self, period_ms: u64) -> Result<(), DeviceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DeviceError::Io("simulated start failure".into()));
        }
        self.events.lock().push(BeaconEvent::Start(period_ms));
        *self.emitting.lock() = Some((period_ms, Instant::now()));
        Ok(())
    }

    fn stop(&self) -> Result<(), DeviceError> {
        self.events.lock().push(BeaconEvent::Stop);
        *self.emitting.lock() = None;
        Ok(())
    }
}

pub struct SimulatedWitness {
    beacon: Arc<SimulatedBeacon>,
    /// Each start opens a new session; a sampler thread exits once its
    /// session is no longer current.
    session: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    samples: Arc<AtomicUsize>,
    rng: Mutex<ChaCha8Rng>,
    noise: f64,
}

impl SimulatedWitness {
    pub fn new(beacon: Arc<SimulatedBeacon>, seed: u64) -> Self {
        Self {
            beacon,
            session: Arc::new(AtomicU64::new(0)),
            running: Arc::new(AtomicBool::new(false)),
            samples: Arc::new(AtomicUsize::new(0)),
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
            noise: 0.05,
        }
    }

    pub fn samples_taken(&self) -> usize {
        self.samples.load(Ordering::SeqCst)
    }

    pub fn is_sampling(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Witness for SimulatedWitness {
    fn start(&self, period_ms: u64, on_sample: SampleSink) -> Result<(), DeviceError> {
        let session = self.session.fetch_add(1, Ordering::SeqCst) + 1;
        self.running.store(true, Ordering::SeqCst);

        let current = Arc::clone(&self.session);
        let running = Arc::clone(&self.running);
        let samples = Arc::clone(&self.samples);
        let beacon = Arc::clone(&self.beacon);
        let mut rng = ChaCha8Rng::seed_from_u64(self.rng.lock().gen());
        let noise = self.noise;
        let interval = Duration::from_millis(period_ms.max(1));

        std::thread::Builder::new()
            .name("sim-witness".into())
            .spawn(move || {
                while running.load(Ordering::SeqCst) && current.load(Ordering::SeqCst) == session {
                    let sample = (beacon.level() + rng.gen_range(-noise..noise)).clamp(0.0, 1.0);
                    samples.fetch_add(1, Ordering::SeqCst);
                    on_sample(sample);
                    std::thread::sleep(interval);
                }
            })
            .map_err(|e| DeviceError::Unavailable(e.to_string()))?;

        Ok(())
    }

    fn stop(&self) -> Result<(), DeviceError> {
        self.running.store(false, Ordering::SeqCst);
        self.session.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
