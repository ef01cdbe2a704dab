//! Heater regulation on a first-order thermal plant
//! Run with: cargo run --example thermal_loop

use simple_logger::SimpleLogger;
use trapezoid_pid::{PidBuilder, PidError};

fn main() -> Result<(), PidError> {
    SimpleLogger::new()
        .with_level(log::LevelFilter::Debug)
        .init()
        .ok();

    println!("=== Thermal Regulation ===\n");

    // Heater power in percent, integral held to a third of the range
    let mut pid = PidBuilder::new()
        .gains(8.0, 0.6, 0.0)
        .output_limits(0.0, 100.0)
        .windup_limits(0.0, 35.0)
        .build()?;

    let setpoint = 60.0;
    let ambient = 20.0;
    let mut temperature = ambient;
    let dt = 0.5; // 2 Hz regulation tick

    println!("Time(s) | Temp(°C) | Power(%) | Integral | Saturated");
    println!("--------|----------|----------|----------|----------");

    for i in 0..600 {
        let time = i as f64 * dt;
        let out = pid.update(setpoint - temperature, dt)?;

        // Heater gain and losses to ambient
        temperature += (out.output * 0.04 - (temperature - ambient) * 0.02) * dt;

        if i % 20 == 0 {
            println!(
                "{:7.1} | {:8.2} | {:8.2} | {:8.2} | {}",
                time, temperature, out.output, out.i, out.saturated
            );
        }
    }

    // Operator lowers the power ceiling mid-run; an inverted pair is refused
    if let Err(err) = pid.set_saturation(80.0, 40.0) {
        println!("\nrejected power limits: {}", err);
    }
    pid.set_saturation(0.0, 40.0)?;

    println!("\n{}", pid.diagnostics());
    Ok(())
}
