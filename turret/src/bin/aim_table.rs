//! Print intercept solutions over a grid of target geometries.
//!
//! Handy for sanity-checking ballistic constants against a tape measure:
//! pick the muzzle speed, read off pitch per range/height.

use anyhow::Result;
use clap::Parser;
use std::time::Instant;

use turret::{Aimer, CameraInfo, PolarCom, TrackedUser};

#[derive(Parser, Debug)]
#[command(author, version, about = "Tabulate firing solutions by target geometry")]
struct Args {
    /// Muzzle speed, m/s.
    #[arg(short, long, default_value = "10.0")]
    water_rate: f64,

    /// Horizontal water deceleration, m/s².
    #[arg(short, long, default_value = "0.0")]
    air_resistance: f64,

    /// Maximum ground range to tabulate, metres.
    #[arg(long, default_value = "10")]
    max_range: u32,
}

fn main() -> Result<()> {
    let args = Args::parse();
    // Field of view and depth only matter for target scoring, not for the
    // ballistics; nominal values suffice here.
    let info = CameraInfo {
        h_fov: 1.0,
        v_fov: 0.8,
        max_depth: args.max_range as f64,
        fps: 30.0,
    };
    let aimer = Aimer::new(args.water_rate, args.air_resistance, &info);

    let heights = [-1.0, -0.5, 0.0, 0.5, 1.0, 1.5];
    print!("{:>8}", "range\\h");
    for h in heights {
        print!("{h:>10.1}");
    }
    println!();

    for range in 1..=args.max_range {
        print!("{range:>7}m");
        for height in heights {
            let user = TrackedUser {
                id: 0,
                timestamp: Instant::now(),
                com: PolarCom::new(0.0, height, range as f64),
                com_rate: PolarCom::default(),
            };
            match aimer.calculate_aim(&user) {
                Some(aim) => print!("{:>9.2}°", aim.pitch.to_degrees()),
                None => print!("{:>10}", "--"),
            }
        }
        println!();
    }
    Ok(())
}
