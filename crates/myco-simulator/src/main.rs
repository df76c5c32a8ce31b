//! Desktop driver for the myco telemetry engine.
//!
//! Runs the engine in a cooperative polling loop against the in-memory
//! store. In `simulated` mode the store reports itself unavailable and the
//! engine falls back to its random walk. In `live` mode a device emulator
//! pushes readings into the store the way the grow-room hardware would, and
//! the store is pre-filled with a day of history for the startup snapshot.
//!
//! # Settings (environment, `.env` is loaded first)
//!
//! | Variable                  | Default     |
//! |---------------------------|-------------|
//! | `MYCO_MODE`               | `simulated` |
//! | `MYCO_ADMIN_EMAIL`        | unset       |
//! | `MYCO_ADMIN_PASSWORD`     | unset       |
//! | `MYCO_SEED`               | built in    |
//! | `MYCO_DEVICE_INTERVAL_MS` | `2000`      |
//!
//! # Commands (one per line on stdin)
//!
//! | Command                               | Action                     |
//! |---------------------------------------|----------------------------|
//! | `login` / `logout`                    | Admin session              |
//! | `mode auto` / `mode manual`           | Control mode               |
//! | `<actuator> on` / `<actuator> off`    | Manual actuator command    |
//! | `ranges <tmin> <tmax> <hmin> <hmax> <ext>` | Save control ranges   |
//! | `cycle <on> <off>`                    | Save a light cycle         |
//! | `status`                              | Print current state        |
//! | `export`                              | Print history as JSON      |
//! | `quit`                                | Exit                       |

use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use embassy_futures::block_on;
use log::{debug, error, info, warn};
use serde_json::Value;

use myco_core::alerts::Severity;
use myco_core::app_state::{EngineEvent, EventChannel};
use myco_core::control::{
    Actuator, ActuatorState, ControlMode, Credentials, IdentityProvider, MemoryIdentityProvider,
};
use myco_core::sensors::{RandomWalk, SensorReadings, SensorType};
use myco_core::storage::{ActuatorsRecord, SensorHistoryRecord};
use myco_core::store::{MemoryStore, RemoteStore, paths};
use myco_core::validation::{ControlRanges, LightCycle, LightMode, LightSchedule};
use myco_core::{Config, Engine, Timestamp};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Target loop duration (~10 Hz).
const FRAME_DURATION: Duration = Duration::from_millis(100);

/// Interval between status lines in the log.
const STATUS_INTERVAL: Duration = Duration::from_secs(15);

/// Samples shown in the sparkline summary.
const SPARKLINE_SAMPLES: usize = 12;

/// Hourly history records written before startup in `live` mode.
const SEEDED_HISTORY: usize = 24;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    Live,
    Simulated,
}

struct Settings {
    backend: Backend,
    admin: Option<(String, String)>,
    seed: Option<u64>,
    device_interval: Duration,
}

impl Settings {
    fn from_env() -> Self {
        let backend = match std::env::var("MYCO_MODE").as_deref() {
            Ok("live") => Backend::Live,
            Ok("simulated") | Err(_) => Backend::Simulated,
            Ok(other) => {
                warn!("Unknown MYCO_MODE {:?}, using simulated", other);
                Backend::Simulated
            }
        };

        let admin = match (
            std::env::var("MYCO_ADMIN_EMAIL"),
            std::env::var("MYCO_ADMIN_PASSWORD"),
        ) {
            (Ok(email), Ok(password)) if !email.is_empty() && !password.is_empty() => {
                Some((email, password))
            }
            _ => None,
        };

        let seed = std::env::var("MYCO_SEED")
            .ok()
            .and_then(|s| s.parse().ok());

        let device_interval = std::env::var("MYCO_DEVICE_INTERVAL_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map_or(Duration::from_secs(2), Duration::from_millis);

        Self {
            backend,
            admin,
            seed,
            device_interval,
        }
    }
}

fn now_ms() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as Timestamp
}

// ---------------------------------------------------------------------------
// Device emulation
// ---------------------------------------------------------------------------

/// Stands in for the grow-room hardware: pushes readings into `Sensors`
/// and reacts to the actuator booleans it finds under `Actuators`.
struct DeviceEmulator {
    walk: RandomWalk,
    readings: SensorReadings,
}

impl DeviceEmulator {
    fn new(seed: u64) -> Self {
        Self {
            // Offset so the device does not mirror the engine's own walk.
            walk: RandomWalk::new(seed.wrapping_add(1)),
            readings: SensorReadings::fallback(),
        }
    }

    /// Write a day of hourly history ending at `now`.
    fn seed_history(&mut self, store: &mut MemoryStore, now: Timestamp) {
        let history = self.walk.warm_up(SEEDED_HISTORY, 3_600_000, now);
        for (at, readings) in &history {
            let record = SensorHistoryRecord::new(readings, *at);
            let Ok(value) = serde_json::to_value(record) else {
                continue;
            };
            if let Err(e) = block_on(store.append(paths::SENSOR_HISTORY, value)) {
                error!("Seeding history failed: {}", e);
                return;
            }
        }
        if let Some((_, last)) = history.last() {
            self.readings = *last;
        }
        info!("Seeded {} history records", history.len());
    }

    fn push(&mut self, store: &mut MemoryStore) {
        let actuators = store
            .get(paths::ACTUATORS)
            .cloned()
            .and_then(|v| serde_json::from_value::<ActuatorsRecord>(v).ok())
            .map(|record| record.state())
            .unwrap_or_default();

        self.readings = self.walk.step(&self.readings, &actuators);
        match serde_json::to_value(self.readings) {
            Ok(Value::Object(fields)) => {
                if let Err(e) = store.update(paths::SENSORS, fields) {
                    error!("Device push failed: {}", e);
                }
            }
            Ok(_) | Err(_) => error!("Device readings did not encode as an object"),
        }
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum Command {
    Login,
    Logout,
    Mode(ControlMode),
    Switch(Actuator, bool),
    Ranges(ControlRanges),
    Cycle(u8, u8),
    Status,
    Export,
    Quit,
}

fn parse_command(line: &str) -> Option<Command> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let command = match words.as_slice() {
        ["login"] => Command::Login,
        ["logout"] => Command::Logout,
        ["mode", "auto"] => Command::Mode(ControlMode::Auto),
        ["mode", "manual"] => Command::Mode(ControlMode::Manual),
        [name, state @ ("on" | "off")] => {
            Command::Switch(Actuator::from_name(name)?, *state == "on")
        }
        ["ranges", tmin, tmax, hmin, hmax, ext] => Command::Ranges(ControlRanges {
            temp_min: tmin.parse().ok()?,
            temp_max: tmax.parse().ok()?,
            hum_min: hmin.parse().ok()?,
            hum_max: hmax.parse().ok()?,
            hum_extractor_min: ext.parse().ok()?,
        }),
        ["cycle", on, off] => Command::Cycle(on.parse().ok()?, off.parse().ok()?),
        ["status"] => Command::Status,
        ["export"] => Command::Export,
        ["quit"] | ["q"] => Command::Quit,
        _ => return None,
    };
    Some(command)
}

/// Forward stdin lines to the loop without blocking it.
fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn run_command<I: IdentityProvider>(
    engine: &mut Engine<'_, MemoryStore, I>,
    command: Command,
    settings: &Settings,
) {
    let now = now_ms();
    let result = match command {
        Command::Login => {
            let Some((email, password)) = &settings.admin else {
                warn!("No admin account configured (MYCO_ADMIN_EMAIL / MYCO_ADMIN_PASSWORD)");
                return;
            };
            let credentials = Credentials {
                email: email.as_str(),
                password: password.as_str(),
            };
            block_on(engine.authenticate(&credentials, now))
        }
        Command::Logout => {
            block_on(engine.logout(now));
            Ok(())
        }
        Command::Mode(mode) => block_on(engine.set_mode(mode, now)),
        Command::Switch(actuator, on) => block_on(engine.command_actuator(actuator, on, now)),
        Command::Ranges(ranges) => block_on(engine.save_ranges(ranges, now)),
        Command::Cycle(on_hours, off_hours) => {
            let schedule = LightSchedule {
                mode: LightMode::Cycle,
                cycle: LightCycle {
                    on_hours,
                    off_hours,
                },
                ..*engine.light_schedule()
            };
            block_on(engine.save_light_schedule(schedule, now))
        }
        Command::Status => {
            log_status(engine);
            Ok(())
        }
        Command::Export => {
            match engine.export_json() {
                Ok(json) => println!("{json}"),
                Err(e) => error!("Export failed: {}", e),
            }
            Ok(())
        }
        Command::Quit => Ok(()),
    };

    if let Err(e) = result {
        warn!("Command rejected: {}", e);
    }
}

// ---------------------------------------------------------------------------
// Presentation
// ---------------------------------------------------------------------------

fn log_event(event: &EngineEvent) {
    match event {
        EngineEvent::AlertRaised(alert) => match alert.severity {
            Severity::Warning | Severity::Danger => {
                warn!("[{:?}] {}", alert.severity, alert.message)
            }
            Severity::Info | Severity::Success => {
                info!("[{:?}] {}", alert.severity, alert.message)
            }
        },
        EngineEvent::SensorsUpdated { readings, .. } => debug!("Readings: {}", readings),
        EngineEvent::ActuatorsUpdated { state, mode } => {
            info!("Actuators ({}): {}", mode.label(), describe_actuators(state))
        }
        EngineEvent::ConfigUpdated(kind) => info!("Configuration updated: {:?}", kind),
        EngineEvent::SessionChanged { authenticated } => {
            info!("Admin session: {}", if *authenticated { "active" } else { "none" })
        }
    }
}

fn describe_actuators(state: &ActuatorState) -> String {
    Actuator::ALL
        .iter()
        .map(|&a| format!("{}={}", a.name(), if state.get(a) { "on" } else { "off" }))
        .collect::<Vec<_>>()
        .join(" ")
}

fn log_status<I: IdentityProvider>(engine: &Engine<'_, MemoryStore, I>) {
    let readings = engine.current_readings();
    info!(
        "{:?} | mode {} | admin {} | {}",
        engine.run_state(),
        engine.mode().label(),
        if engine.is_authenticated() { "yes" } else { "no" },
        describe_actuators(&engine.actuator_state())
    );

    for sensor in SensorType::ALL {
        let spark: Vec<String> = engine
            .window(sensor, SPARKLINE_SAMPLES)
            .map(|s| format!("{:.0}", s.value))
            .collect();
        let stats = engine
            .stats(sensor)
            .map(|s| format!("min {:.1} max {:.1} avg {:.1} n {}", s.min, s.max, s.avg, s.count))
            .unwrap_or_else(|| "no data".to_string());
        info!(
            "  {:<11} {:>7.1} {:<3} {:<6} [{}] {}",
            sensor.label(),
            readings.get(sensor),
            sensor.unit(),
            engine.sensor_status(sensor).label(),
            spark.join(" "),
            stats
        );
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    let _ = dotenvy::dotenv();
    env_logger::init();

    let settings = Settings::from_env();
    let mut config = Config::default();
    if let Some(seed) = settings.seed {
        config.rng_seed = seed;
    }
    info!("Starting myco simulator ({:?} backend)", settings.backend);

    let mut identity = MemoryIdentityProvider::new();
    match &settings.admin {
        Some((email, password)) => {
            identity.register(email, password);
            info!("Admin account {} registered", email);
        }
        None => warn!("No admin account configured, login is unavailable"),
    }

    let mut device = None;
    let store = match settings.backend {
        Backend::Live => {
            let mut store = MemoryStore::new();
            let mut emulator = DeviceEmulator::new(config.rng_seed);
            emulator.seed_history(&mut store, now_ms());
            device = Some(emulator);
            store
        }
        Backend::Simulated => MemoryStore::offline(),
    };

    let channel = EventChannel::new();
    let (Ok(mut events), Ok(publisher)) = (channel.subscriber(), channel.publisher()) else {
        error!("Event channel has no free slots");
        return;
    };

    let mut engine = Engine::new(store, identity, config).with_publisher(publisher);
    let run_state = block_on(engine.start(now_ms()));
    info!(
        "Engine {:?}, simulation tick {} ms",
        run_state,
        engine.config().simulation_tick().as_millis()
    );

    let commands = spawn_stdin_reader();
    let mut last_device = Instant::now();
    let mut last_status = Instant::now();
    log_status(&engine);

    // -----------------------------------------------------------------------
    // Main loop
    // -----------------------------------------------------------------------
    'running: loop {
        let frame_start = Instant::now();

        // --- Commands -----------------------------------------------------
        while let Ok(line) = commands.try_recv() {
            match parse_command(&line) {
                Some(Command::Quit) => break 'running,
                Some(command) => run_command(&mut engine, command, &settings),
                None if line.trim().is_empty() => {}
                None => warn!("Unknown command: {}", line.trim()),
            }
        }

        // --- Device -------------------------------------------------------
        if let Some(device) = device.as_mut()
            && last_device.elapsed() >= settings.device_interval
        {
            device.push(engine.store_mut());
            last_device = Instant::now();
        }

        // --- Engine -------------------------------------------------------
        block_on(engine.tick(now_ms()));

        while let Some(event) = events.try_next_message_pure() {
            log_event(&event);
        }

        if last_status.elapsed() >= STATUS_INTERVAL {
            log_status(&engine);
            last_status = Instant::now();
        }

        // --- Frame pacing -------------------------------------------------
        let elapsed = frame_start.elapsed();
        if elapsed < FRAME_DURATION {
            std::thread::sleep(FRAME_DURATION - elapsed);
        }
    }

    info!("Simulator exiting");
}
