//! Ballistics and target selection.
//!
//! Given a tracked user, [`Aimer::calculate_aim`] finds the yaw and pitch
//! that intercept them: water leaves the muzzle at a fixed speed, drops
//! under gravity, and decelerates horizontally by a small constant drag.
//! Eliminating the launch angle from the range and height equations leaves
//! a quartic in the time of flight; the smallest positive real root is the
//! interception time, and no such root means the user cannot be hit.
//!
//! [`Aimer::choose_target`] ranks reachable users by a weighted score
//! (centred beats offset, near beats far, approaching beats receding) and
//! picks the best.

use num_complex::Complex64;
use tracing::trace;

use crate::camera::CameraInfo;
use crate::quartic::{smallest_positive_real, solve_quartic};
use crate::tracker::TrackedUser;

/// Standard gravity, m/s².
pub const GRAVITY: f64 = 9.81;

/// Roots closer to the real axis than this count as real.
const IMAG_EPS: f64 = 1e-6;

/// Divisor normalising the approach-speed score term, m/s.
const APPROACH_NORM: f64 = 7.0;

/// A firing solution: turret yaw and pitch, radians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GunPosition {
    pub yaw: f64,
    pub pitch: f64,
}

/// Stateless ballistic solver and target chooser.
#[derive(Debug, Clone)]
pub struct Aimer {
    water_rate: f64,
    air_resistance: f64,
    h_fov: f64,
    max_depth: f64,
}

impl Aimer {
    /// `water_rate` is the muzzle speed in m/s; `air_resistance` the
    /// horizontal deceleration in m/s². Field of view and depth limits come
    /// from the camera and normalise the selection score.
    pub fn new(water_rate: f64, air_resistance: f64, info: &CameraInfo) -> Self {
        Self {
            water_rate,
            air_resistance,
            h_fov: info.h_fov,
            max_depth: info.max_depth,
        }
    }

    /// Compute the firing solution for a user, or `None` if the water
    /// cannot reach them.
    ///
    /// The user's coordinates are assumed to evolve linearly with their
    /// current velocity over the flight time, so the yaw leads a moving
    /// target.
    pub fn calculate_aim(&self, user: &TrackedUser) -> Option<GunPosition> {
        let y0 = user.com.height;
        let z0 = user.com.range;
        let vy = user.com_rate.height;
        let vz = user.com_rate.range;
        let v = self.water_rate;
        let a = self.air_resistance;

        // A user sitting on the muzzle needs no ballistics.
        if y0 * y0 + z0 * z0 == 0.0 {
            return Some(GunPosition {
                yaw: user.com.yaw,
                pitch: 0.0,
            });
        }

        // (z0 + vz·t + a·t²/2)² + (y0 + vy·t + g·t²/2)² = v²t², expanded in
        // powers of t.
        let roots = solve_quartic(
            Complex64::new((a * a + GRAVITY * GRAVITY) / 4.0, 0.0),
            Complex64::new(a * vz + GRAVITY * vy, 0.0),
            Complex64::new(
                a * z0 + vz * vz + GRAVITY * y0 + vy * vy - v * v,
                0.0,
            ),
            Complex64::new(2.0 * z0 * vz + 2.0 * y0 * vy, 0.0),
            Complex64::new(z0 * z0 + y0 * y0, 0.0),
        );
        let time = smallest_positive_real(&roots, IMAG_EPS)?;

        let sin_pitch =
            ((y0 + vy * time + GRAVITY * time * time / 2.0) / (v * time)).clamp(-1.0, 1.0);
        let aim = GunPosition {
            yaw: user.com.yaw + user.com_rate.yaw * time,
            pitch: sin_pitch.asin(),
        };
        trace!(
            "aim solution for user {}: t={time:.3}s yaw={:.3} pitch={:.3}",
            user.id,
            aim.yaw,
            aim.pitch
        );
        Some(aim)
    }

    /// Score a reachable user; higher is better.
    fn score(&self, user: &TrackedUser, aim: &GunPosition) -> f64 {
        let centered = -2.0 * aim.yaw.abs() / (self.h_fov / 2.0) + 1.0;
        let close = -2.0 * (user.com.range / self.max_depth) + 1.0;
        let approaching = -user.com_rate.range / APPROACH_NORM;
        centered + close + approaching
    }

    /// Pick the best target, skipping users the water cannot reach.
    /// Ties go to the earlier user in the list. `None` when the list is
    /// empty or nobody is reachable.
    pub fn choose_target(&self, users: &[TrackedUser]) -> Option<TrackedUser> {
        let mut best: Option<(f64, &TrackedUser)> = None;
        for user in users {
            let Some(aim) = self.calculate_aim(user) else {
                continue;
            };
            let score = self.score(user, &aim);
            if best.map_or(true, |(s, _)| score > s) {
                best = Some((score, user));
            }
        }
        best.map(|(_, user)| *user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::angles::PolarCom;
    use approx::assert_relative_eq;
    use std::time::Instant;

    fn camera_info() -> CameraInfo {
        CameraInfo {
            h_fov: 1.0,
            v_fov: 0.8,
            max_depth: 10.0,
            fps: 30.0,
        }
    }

    fn stationary(yaw: f64, height: f64, range: f64) -> TrackedUser {
        TrackedUser {
            id: 1,
            timestamp: Instant::now(),
            com: PolarCom::new(yaw, height, range),
            com_rate: PolarCom::default(),
        }
    }

    #[test]
    fn test_stationary_target_solution() {
        // v = 10 m/s, no drag, target level at 5 m: the biquadratic
        // (g²/4)t⁴ − v²t² + z² = 0 has its smaller root near t = 0.517 s.
        let aimer = Aimer::new(10.0, 0.0, &camera_info());
        let aim = aimer.calculate_aim(&stationary(0.0, 0.0, 5.0)).unwrap();
        assert_relative_eq!(aim.yaw, 0.0, epsilon = 1e-12);

        let t = (100.0 - (10000.0f64 - GRAVITY * GRAVITY * 25.0).sqrt())
            / (GRAVITY * GRAVITY / 2.0);
        let t = t.sqrt();
        let expected_pitch = (GRAVITY * t / (2.0 * 10.0)).asin();
        assert_relative_eq!(aim.pitch, expected_pitch, epsilon = 1e-6);
        // Around 14.7 degrees.
        assert!(aim.pitch > 0.24 && aim.pitch < 0.27);
    }

    #[test]
    fn test_ballistic_round_trip() {
        // Launching at the returned angles must land on the target.
        let aimer = Aimer::new(12.0, 0.5, &camera_info());
        for (y0, z0) in [(0.0, 5.0), (1.0, 4.0), (-0.5, 6.0), (0.3, 2.0)] {
            let user = stationary(0.2, y0, z0);
            let aim = aimer.calculate_aim(&user).unwrap();

            // The trajectory crosses the target height at up to two times;
            // the shot is good if the range matches at either crossing.
            let v = 12.0;
            let crossings = crate::quartic::solve_quadratic(
                Complex64::new(-GRAVITY / 2.0, 0.0),
                Complex64::new(v * aim.pitch.sin(), 0.0),
                Complex64::new(-y0, 0.0),
            );
            let hit = crossings.iter().any(|t| {
                t.im.abs() < 1e-9 && t.re > 0.0 && {
                    let t = t.re;
                    let z_hit = v * aim.pitch.cos() * t - 0.5 * 0.5 * t * t;
                    (z_hit - z0).abs() < 1e-3
                }
            });
            assert!(hit, "target ({y0}, {z0}) missed at both height crossings");
        }
    }

    #[test]
    fn test_unreachable_target() {
        // 3 m/s of water cannot reach a level target 5 m out.
        let aimer = Aimer::new(3.0, 0.0, &camera_info());
        assert!(aimer.calculate_aim(&stationary(0.0, 0.0, 5.0)).is_none());
    }

    #[test]
    fn test_receding_faster_than_water_unreachable() {
        let aimer = Aimer::new(10.0, 0.0, &camera_info());
        let mut user = stationary(0.0, 0.0, 5.0);
        user.com_rate = PolarCom::new(0.0, 0.0, 12.0);
        assert!(aimer.calculate_aim(&user).is_none());
    }

    #[test]
    fn test_coincident_target_edge_case() {
        let aimer = Aimer::new(10.0, 0.0, &camera_info());
        let aim = aimer.calculate_aim(&stationary(0.4, 0.0, 0.0)).unwrap();
        assert_relative_eq!(aim.yaw, 0.4);
        assert_relative_eq!(aim.pitch, 0.0);
    }

    #[test]
    fn test_moving_target_leads_yaw() {
        let aimer = Aimer::new(10.0, 0.0, &camera_info());
        let mut user = stationary(0.0, 0.0, 5.0);
        user.com_rate = PolarCom::new(0.3, 0.0, 0.0);
        let aim = aimer.calculate_aim(&user).unwrap();
        // Yaw leads by rate × flight time; flight time is near 0.517 s.
        assert!(aim.yaw > 0.14 && aim.yaw < 0.17, "lead yaw {}", aim.yaw);
    }

    #[test]
    fn test_target_selection_scores() {
        // A at (yaw 0.3, z 4, stationary), B at (yaw 0, z 6, approaching
        // at 3 m/s): B scores about 1.23 against A's 0.0.
        let aimer = Aimer::new(10.0, 0.0, &camera_info());
        let a = stationary(0.3, 0.0, 4.0);
        let mut b = stationary(0.0, 0.0, 6.0);
        b.id = 2;
        b.com_rate = PolarCom::new(0.0, 0.0, -3.0);

        let chosen = aimer.choose_target(&[a, b]).unwrap();
        assert_eq!(chosen.id, 2);
    }

    #[test]
    fn test_selection_skips_unreachable() {
        // The closer, centred user is out of throwing range; the reachable
        // one wins despite a worse score.
        let aimer = Aimer::new(7.0, 0.0, &camera_info());
        let mut far = stationary(0.0, 0.0, 4.0);
        far.com_rate = PolarCom::new(0.0, 0.0, 20.0);
        let mut reachable = stationary(0.4, 0.0, 5.0);
        reachable.id = 2;

        let chosen = aimer.choose_target(&[far, reachable]).unwrap();
        assert_eq!(chosen.id, 2);
    }

    #[test]
    fn test_selection_empty_and_unreachable_lists() {
        let aimer = Aimer::new(3.0, 0.0, &camera_info());
        assert!(aimer.choose_target(&[]).is_none());
        assert!(aimer.choose_target(&[stationary(0.0, 0.0, 8.0)]).is_none());
    }

    #[test]
    fn test_selection_tie_first_wins() {
        let aimer = Aimer::new(10.0, 0.0, &camera_info());
        let first = stationary(0.2, 0.0, 5.0);
        let mut twin = first;
        twin.id = 9;
        let chosen = aimer.choose_target(&[first, twin]).unwrap();
        assert_eq!(chosen.id, 1);
    }
}
