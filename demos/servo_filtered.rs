//! Servo position loop with a noisy encoder, raw vs filtered derivative
//! Run with: cargo run --example servo_filtered

use simple_logger::SimpleLogger;
use trapezoid_pid::{FirFilter, IirFilter, Pid64, PidConfig, PidError};

struct Servo {
    position: f64,
    velocity: f64,
}

impl Servo {
    fn new() -> Self {
        Self {
            position: 0.0,
            velocity: 0.0,
        }
    }

    fn step(&mut self, torque: f64, dt: f64) {
        let accel = torque * 4.0 - self.velocity * 2.5;
        self.velocity += accel * dt;
        self.position += self.velocity * dt;
    }
}

/// Cheap deterministic encoder noise
fn noise(i: usize) -> f64 {
    let phase = (i as f64 * 12.9898).sin() * 43_758.545;
    (phase - phase.floor() - 0.5) * 0.02
}

fn main() -> Result<(), PidError> {
    SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()
        .ok();

    println!("=== Servo Positioning ===\n");

    let mut config = PidConfig::default();
    config.kp = 6.0;
    config.ki = 1.5;
    config.kd = 0.4;

    let mut raw = Pid64::new(config);
    let mut fir_pid = Pid64::new(config);
    let mut iir_pid = Pid64::new(config);
    for pid in [&mut raw, &mut fir_pid, &mut iir_pid] {
        pid.set_saturation(-2.0, 2.0)?;
        pid.set_anti_windup(-0.5, 0.5)?;
    }

    let mut fir = FirFilter::<f64, 8>::moving_average()?;
    let mut iir = IirFilter::single_pole_lowpass(0.2)?;

    let mut servos = [Servo::new(), Servo::new(), Servo::new()];
    let target = 1.0;
    let dt = 0.001; // 1 kHz control interrupt

    println!("Time(s) | Raw pos | FIR pos | IIR pos | Raw D   | FIR D   | IIR D");
    println!("--------|---------|---------|---------|---------|---------|--------");

    for i in 0..3000 {
        let time = i as f64 * dt;
        let measured: Vec<f64> = servos.iter().map(|s| s.position + noise(i)).collect();

        let a = raw.update(target - measured[0], dt)?;
        let b = fir_pid.update_filtered(target - measured[1], dt, &mut fir)?;
        let c = iir_pid.update_filtered(target - measured[2], dt, &mut iir)?;

        servos[0].step(a.output, dt);
        servos[1].step(b.output, dt);
        servos[2].step(c.output, dt);

        if i % 250 == 0 {
            println!(
                "{:7.3} | {:7.3} | {:7.3} | {:7.3} | {:7.2} | {:7.2} | {:7.2}",
                time,
                servos[0].position,
                servos[1].position,
                servos[2].position,
                a.d,
                b.d,
                c.d
            );
        }
    }

    println!("\nRaw derivative loop:\n{}", raw.diagnostics());
    println!("\nFIR derivative loop:\n{}", fir_pid.diagnostics());
    println!("\nIIR derivative loop:\n{}", iir_pid.diagnostics());
    Ok(())
}
