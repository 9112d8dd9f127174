//! DRV8825 stepper control for the two turret axes.
//!
//! The yaw axis never stops at a position, it chases a commanded angular
//! velocity, so its STEP line is a hardware PWM output and changing speed
//! just reprograms the period ([`RateStepper`]). The pitch axis instead
//! moves to an absolute angle over a requested duration, which needs a
//! counted pulse train; [`PositionStepper`] runs one on a worker thread that
//! can be redirected mid-train when a new target arrives.
//!
//! Microstepping is adaptive on both axes: the drivers pick the smallest
//! subdivision that keeps the pulse rate above `min_step_freq`, so slow
//! motion stays smooth without capping top speed.
//!
//! Direction convention: the DIR line is driven high for negative angular
//! velocity. This is a software convention, not a hardware fact: if a rig
//! turns the wrong way, swap two motor wires rather than editing this file.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{HardwareError, HwResult};
use crate::gpio::{DriverBackend, GpioInput, GpioOutput, Level, Pull, PwmOutput};
use crate::pins::{MicrostepWiring, PinSpec, StepperPins};

/// Hard ceiling on pitch motor speed, radians per second (3 rev/s).
const MAX_PITCH_VELOCITY: f64 = 3.0 * std::f64::consts::TAU;

/// Shortest step period the software pulse train will attempt, seconds.
const MIN_STEP_PERIOD: f64 = 100e-6;

/// Pick the microstep number for a requested angular velocity.
///
/// The smallest available `m` such that the resulting pulse rate
/// `|velocity| / (step_size / 2^m)` stays at or above `min_step_freq`,
/// i.e. `m >= log2(step_size * min_step_freq / |velocity|)`. If even the
/// finest available subdivision cannot reach the minimum rate, the finest
/// one is returned.
pub fn choose_microstep_number(
    step_size: f64,
    min_step_freq: f64,
    velocity: f64,
    available: &[u8],
) -> u8 {
    assert!(!available.is_empty(), "no microstep numbers available");
    if available.len() == 1 {
        return available[0];
    }
    let desired = ((step_size * min_step_freq) / velocity.abs()).log2().ceil();
    // Saturating cast: an infinite `desired` (velocity == 0) selects the
    // finest available subdivision.
    let desired = desired as i64;
    available
        .iter()
        .find(|&&m| i64::from(m) >= desired)
        .or_else(|| available.last())
        .copied()
        .expect("available checked non-empty")
}

/// Angle of one pulse at microstep number `m`, radians.
pub fn microstep_size(step_size: f64, m: u8) -> f64 {
    step_size / f64::from(1u32 << m)
}

/// One microstep-select line: either driven or accounted for by wiring.
enum SelectLine {
    Driven(Box<dyn GpioOutput>),
    Wired,
}

impl SelectLine {
    fn claim(spec: PinSpec, backend: &mut dyn DriverBackend) -> HwResult<Self> {
        match spec {
            PinSpec::Gpio(pin) => Ok(SelectLine::Driven(backend.claim_output(pin)?)),
            PinSpec::Low | PinSpec::High => Ok(SelectLine::Wired),
        }
    }

    fn write(&mut self, level: Level) -> HwResult<()> {
        match self {
            SelectLine::Driven(out) => out.write(level),
            SelectLine::Wired => Ok(()),
        }
    }
}

/// The DIR / microstep-select / SLEEP lines shared by both stepper kinds.
struct ControlLines {
    dir: Box<dyn GpioOutput>,
    select: [SelectLine; 3],
    sleep: Option<Box<dyn GpioOutput>>,
}

impl ControlLines {
    fn claim(pins: &StepperPins, backend: &mut dyn DriverBackend) -> HwResult<(Self, MicrostepWiring)> {
        let dir = backend.claim_output(pins.dir_pin()?)?;
        let specs = pins.microstep_specs()?;
        let wiring = MicrostepWiring::from_specs(&specs)?;
        let select = [
            SelectLine::claim(specs[0], backend)?,
            SelectLine::claim(specs[1], backend)?,
            SelectLine::claim(specs[2], backend)?,
        ];
        let sleep = match pins.sleep_pin() {
            Some(pin) => Some(backend.claim_output(pin)?),
            None => None,
        };
        Ok((Self { dir, select, sleep }, wiring))
    }

    /// Program direction and microstep number, then wake the driver.
    ///
    /// `negative` selects the DIR level per the module convention.
    fn enable(&mut self, m: u8, negative: bool) -> HwResult<()> {
        self.dir.write(Level::from(negative))?;
        for (bit, line) in self.select.iter_mut().enumerate() {
            line.write(Level::from(m & (1 << bit) != 0))?;
        }
        if let Some(sleep) = self.sleep.as_mut() {
            sleep.write(Level::Low)?;
        }
        Ok(())
    }

    /// Put the driver to sleep and idle every line.
    fn disable(&mut self) -> HwResult<()> {
        if let Some(sleep) = self.sleep.as_mut() {
            sleep.write(Level::High)?;
        }
        for line in self.select.iter_mut() {
            line.write(Level::Low)?;
        }
        self.dir.write(Level::Low)
    }
}

/// Rate-controlled stepper: the yaw axis.
///
/// [`set_velocity`](Self::set_velocity) reprograms the STEP PWM in place;
/// zero velocity sleeps the driver entirely.
pub struct RateStepper {
    step_size: f64,
    min_step_freq: f64,
    wiring: MicrostepWiring,
    lines: ControlLines,
    step_pwm: Box<dyn PwmOutput>,
}

impl std::fmt::Debug for RateStepper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateStepper")
            .field("step_size", &self.step_size)
            .field("min_step_freq", &self.min_step_freq)
            .field("wiring", &self.wiring)
            .finish_non_exhaustive()
    }
}

impl RateStepper {
    /// Claim the stepper's pins and leave the motor asleep.
    ///
    /// `step_size` is radians per whole step; `min_step_freq` the pulse
    /// rate floor used for microstep selection.
    pub fn new(
        step_size: f64,
        min_step_freq: f64,
        pins: &StepperPins,
        backend: &mut dyn DriverBackend,
    ) -> HwResult<Self> {
        let (mut lines, wiring) = ControlLines::claim(pins, backend)?;
        let mut step_pwm = backend.claim_pwm(pins.step_pin()?)?;
        step_pwm.enable(false)?;
        step_pwm.set_duty(0.5)?;
        lines.disable()?;
        Ok(Self {
            step_size,
            min_step_freq,
            wiring,
            lines,
            step_pwm,
        })
    }

    /// Command a new angular velocity in radians per second.
    ///
    /// Positive is clockwise (see the module-level direction convention).
    /// Zero disables the step output and sleeps the driver.
    pub fn set_velocity(&mut self, velocity: f64) -> HwResult<()> {
        if velocity == 0.0 {
            debug!("yaw stepper idle");
            self.step_pwm.enable(false)?;
            return self.lines.disable();
        }

        let m = choose_microstep_number(
            self.step_size,
            self.min_step_freq,
            velocity,
            self.wiring.available(),
        );
        let period = microstep_size(self.step_size, m) / velocity.abs();
        debug!("yaw stepper velocity {velocity:.3} rad/s: microstep {m}, period {period:.6}s");

        self.lines.enable(m, velocity < 0.0)?;
        self.step_pwm.set_period(period)?;
        self.step_pwm.set_duty(0.5)?;
        self.step_pwm.enable(true)
    }
}

struct PitchState {
    target: f64,
    transition: Duration,
    current: f64,
    homing: Option<Homing>,
    generation: u64,
    shutdown: bool,
}

struct Homing {
    negative: bool,
    reference: f64,
}

struct PitchShared {
    state: Mutex<PitchState>,
    cv: Condvar,
}

/// Position-controlled stepper: the pitch axis.
///
/// [`set_position`](Self::set_position) stores the new target and wakes the
/// worker; an in-flight pulse train notices the change between pulses and
/// re-plans immediately, so a fresh aim never waits for the old transition
/// to finish.
pub struct PositionStepper {
    shared: Arc<PitchShared>,
    worker: Option<JoinHandle<()>>,
}

impl PositionStepper {
    /// Claim the stepper's pins and start the pulse-train worker.
    pub fn new(
        step_size: f64,
        min_step_freq: f64,
        pins: &StepperPins,
        backend: &mut dyn DriverBackend,
    ) -> HwResult<Self> {
        let (lines, wiring) = ControlLines::claim(pins, backend)?;
        let step = backend.claim_output(pins.step_pin()?)?;
        let homing_input = match pins.position_pin() {
            Some(pin) => Some(backend.claim_input(pin, Pull::Up)?),
            None => None,
        };

        let shared = Arc::new(PitchShared {
            state: Mutex::new(PitchState {
                target: 0.0,
                transition: Duration::ZERO,
                current: 0.0,
                homing: None,
                generation: 0,
                shutdown: false,
            }),
            cv: Condvar::new(),
        });

        let worker = PitchWorker {
            step_size,
            min_step_freq,
            wiring,
            lines,
            step,
            homing_input,
            shared: shared.clone(),
        };
        let handle = thread::Builder::new()
            .name("pitch-stepper".into())
            .spawn(move || worker.run())
            .map_err(|e| HardwareError::Driver {
                op: "spawn pitch worker",
                msg: e.to_string(),
            })?;

        Ok(Self {
            shared,
            worker: Some(handle),
        })
    }

    /// Command a transition to `angle` (radians) spread over `transition`.
    ///
    /// Too-short transitions are not an error: the worker clamps the implied
    /// velocity and simply takes longer.
    pub fn set_position(&self, angle: f64, transition: Duration) {
        let mut state = self.shared.state.lock().unwrap();
        state.target = angle;
        state.transition = transition;
        state.generation += 1;
        self.shared.cv.notify_all();
    }

    /// Home against the position switch, stepping in the negative or
    /// positive direction until the switch reads low, then adopt
    /// `reference` as the current angle. No-op warning if the stepper was
    /// built without a position pin.
    pub fn calibrate(&self, negative: bool, reference: f64) {
        let mut state = self.shared.state.lock().unwrap();
        state.homing = Some(Homing { negative, reference });
        state.generation += 1;
        self.shared.cv.notify_all();
    }

    /// The worker's current idea of the motor angle, radians.
    pub fn angle(&self) -> f64 {
        self.shared.state.lock().unwrap().current
    }
}

impl Drop for PositionStepper {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock().unwrap();
            state.shutdown = true;
            self.shared.cv.notify_all();
        }
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

struct PitchWorker {
    step_size: f64,
    min_step_freq: f64,
    wiring: MicrostepWiring,
    lines: ControlLines,
    step: Box<dyn GpioOutput>,
    homing_input: Option<Box<dyn GpioInput>>,
    shared: Arc<PitchShared>,
}

impl PitchWorker {
    fn run(mut self) {
        let shared = self.shared.clone();
        let mut guard = shared.state.lock().unwrap();
        let _ = self.lines.disable();
        // Generation 0 is the constructed state; a command issued before
        // this thread first took the lock still counts as news.
        let mut seen = 0;

        'idle: loop {
            while !guard.shutdown && guard.generation == seen {
                guard = shared.cv.wait(guard).unwrap();
            }
            if guard.shutdown {
                break;
            }
            seen = guard.generation;

            if let Some(homing) = guard.homing.take() {
                match self.home(&homing) {
                    Ok(()) => {
                        // Re-base and hold: the switch position is the new
                        // truth, and the motor stays there until commanded.
                        guard.current = homing.reference;
                        guard.target = homing.reference;
                    }
                    Err(e) => warn!("pitch homing failed: {e}"),
                }
            }

            'motion: loop {
                if guard.shutdown {
                    break 'idle;
                }
                let offset = guard.target - guard.current;
                let seconds = guard.transition.as_secs_f64().max(1e-9);
                let velocity = (offset / seconds).clamp(-MAX_PITCH_VELOCITY, MAX_PITCH_VELOCITY);
                let m = choose_microstep_number(
                    self.step_size,
                    self.min_step_freq,
                    velocity,
                    self.wiring.available(),
                );
                let step = microstep_size(self.step_size, m).copysign(velocity);
                if velocity == 0.0 || offset.abs() < step.abs() {
                    break 'motion;
                }
                let period = (step / velocity).max(MIN_STEP_PERIOD);
                let mut remaining = (offset / step) as u64;
                debug!(
                    "pitch transition to {:.4} rad: velocity {velocity:.3}, microstep {m}, {remaining} steps",
                    guard.target
                );
                if let Err(e) = self.lines.enable(m, velocity < 0.0) {
                    warn!("pitch driver enable failed: {e}");
                    break 'motion;
                }

                while remaining > 0 {
                    let _ = self.step.write(Level::High);
                    thread::sleep(Duration::from_secs_f64(MIN_STEP_PERIOD / 2.0));
                    let _ = self.step.write(Level::Low);
                    guard.current += step;
                    remaining -= 1;
                    if remaining == 0 {
                        break;
                    }
                    let rest = Duration::from_secs_f64(period - MIN_STEP_PERIOD / 2.0);
                    let (g, _timeout) = shared.cv.wait_timeout(guard, rest).unwrap();
                    guard = g;
                    if guard.shutdown {
                        break 'idle;
                    }
                    if guard.generation != seen {
                        // A new target arrived mid-train: re-plan from the
                        // angle we actually reached.
                        seen = guard.generation;
                        continue 'motion;
                    }
                }
                break 'motion;
            }
            let _ = self.lines.disable();
        }
        let _ = self.lines.disable();
    }

    fn home(&mut self, homing: &Homing) -> HwResult<()> {
        let input = self.homing_input.as_mut().ok_or(HardwareError::Driver {
            op: "homing",
            msg: "stepper has no position pin".into(),
        })?;

        let m = *self
            .wiring
            .available()
            .first()
            .expect("wiring has at least one microstep number");
        let step = microstep_size(self.step_size, m);
        let period = (1.0 / self.min_step_freq).max(MIN_STEP_PERIOD);
        // Bound the sweep at two full revolutions; a switch that never
        // trips means a wiring fault, not a longer search.
        let max_steps = (2.0 * std::f64::consts::TAU / step).ceil() as u64;

        self.lines.enable(m, homing.negative)?;
        for _ in 0..max_steps {
            if input.read()? == Level::Low {
                self.lines.disable()?;
                debug!("pitch homed to reference {:.4} rad", homing.reference);
                return Ok(());
            }
            self.step.write(Level::High)?;
            thread::sleep(Duration::from_secs_f64(period / 2.0));
            self.step.write(Level::Low)?;
            thread::sleep(Duration::from_secs_f64(period / 2.0));
        }
        self.lines.disable()?;
        Err(HardwareError::Driver {
            op: "homing",
            msg: "position switch never went low".into(),
        })
    }
}
