//! Zeroing - barrel elevation that puts the trajectory on the line of sight.
//!
//! Without drag the angle has a closed form and is solved synchronously.
//! With drag the solver flies the bullet through the same integrator as live
//! flight and searches the angle by bracketing and bisection; that work runs
//! on the async compute pool behind a [`ZeroingTask`].

use bevy::prelude::*;
use bevy::tasks::futures_lite::future;
use bevy::tasks::{block_on, AsyncComputeTaskPool, Task, TaskPool};

use crate::error::ZeroingError;
use crate::registry::BulletState;
use crate::resources::BallisticsEnvironment;
use crate::systems::kinematics;
use crate::template::BulletTemplate;
use crate::types::PhysicsModel;

/// Height residual (meters) accepted as a zero.
const TOLERANCE: f32 = 1.0e-4;
/// Residual above which the search is reported as not converged.
const MAX_RESIDUAL: f32 = 1.0e-2;
const MAX_BISECTIONS: usize = 60;
const MAX_WIDENINGS: usize = 12;
/// Longest simulated flight per candidate angle (seconds).
const MAX_FLIGHT_TIME: f32 = 20.0;

/// Elevation for one target distance.
#[derive(Clone, Copy, PartialEq, Debug, Reflect)]
pub struct ZeroingResult {
    /// Target distance along the line of sight (meters)
    pub distance: f32,
    /// Elevation above the line of sight (radians)
    pub angle: f32,
}

/// Aerodynamic parameters for the iterative solver.
#[derive(Clone, Copy, PartialEq, Debug, Reflect)]
pub struct DragParams {
    /// Air density (kg/m³)
    pub air_density: f32,
    /// `0.5 * area * Cd / mass`
    pub drag_factor: f32,
    /// Integration step (seconds)
    pub time_step: f32,
}

/// Inputs of the zeroing solver.
///
/// # Fields
/// * `distances` - Target distances in meters
/// * `speed` - Muzzle speed in meters per second
/// * `gravity` - Gravity magnitude in meters per second squared
/// * `sight_height` - Height of the line of sight above the bore
/// * `drag` - Solve with drag when set, otherwise analytically
#[derive(Clone, PartialEq, Debug, Reflect)]
pub struct ZeroingParams {
    pub distances: Vec<f32>,
    pub speed: f32,
    pub gravity: f32,
    pub sight_height: f32,
    pub drag: Option<DragParams>,
}

impl ZeroingParams {
    /// Drag-free parameters.
    pub fn analytic(distances: Vec<f32>, speed: f32, gravity: f32) -> Self {
        Self {
            distances,
            speed,
            gravity,
            sight_height: 0.0,
            drag: None,
        }
    }

    /// Parameters matching live flight of `template` in `env`.
    ///
    /// Drag is included when the environment enables air resistance.
    pub fn from_template(template: &BulletTemplate, env: &BallisticsEnvironment, distances: Vec<f32>) -> Self {
        Self {
            distances,
            speed: template.speed,
            gravity: env.gravity.length(),
            sight_height: 0.0,
            drag: env.air_resistance.then(|| DragParams {
                air_density: env.effective_air_density(),
                drag_factor: template.drag_factor(),
                time_step: env.max_delta_time,
            }),
        }
    }

    pub fn with_sight_height(mut self, sight_height: f32) -> Self {
        self.sight_height = sight_height;
        self
    }

    fn validate(&self) -> Result<(), ZeroingError> {
        let invalid = |reason: &str| Err(ZeroingError::InvalidInput(reason.to_string()));
        if !(self.speed > 0.0) || !self.speed.is_finite() {
            return invalid("speed must be positive");
        }
        if !(self.gravity >= 0.0) || !self.gravity.is_finite() {
            return invalid("gravity must be non-negative");
        }
        if !self.sight_height.is_finite() {
            return invalid("sight height must be finite");
        }
        if self.distances.iter().any(|d| !(*d > 0.0) || !d.is_finite()) {
            return invalid("distances must be positive");
        }
        if let Some(drag) = &self.drag {
            if !(drag.time_step > 0.0) || !(drag.air_density >= 0.0) || !(drag.drag_factor >= 0.0) {
                return invalid("drag parameters must be positive");
            }
        }
        Ok(())
    }
}

/// Closed-form elevation without drag.
///
/// The bore starts `sight_height` below the line of sight; with
/// `k = g·d² / (2v²)` the flatter root of `k·T² - d·T + (k + h) = 0`
/// gives `T = tan(angle)`.
pub fn analytic_angle(distance: f32, speed: f32, gravity: f32, sight_height: f32) -> Result<f32, ZeroingError> {
    let k = gravity * distance * distance / (2.0 * speed * speed);
    if k <= f32::EPSILON {
        return Ok((sight_height / distance).atan());
    }
    let discriminant = distance * distance - 4.0 * k * (k + sight_height);
    if discriminant < 0.0 {
        return Err(ZeroingError::Unreachable { distance });
    }
    Ok(((distance - discriminant.sqrt()) / (2.0 * k)).atan())
}

/// Height of the drag-free trajectory relative to the line of sight at `x`.
pub fn analytic_height(x: f32, angle: f32, speed: f32, gravity: f32, sight_height: f32) -> f32 {
    let cos = angle.cos();
    -sight_height + x * angle.tan() - gravity * x * x / (2.0 * speed * speed * cos * cos)
}

/// Solves every distance synchronously.
///
/// Fails on the first distance that cannot be zeroed.
pub fn solve(params: &ZeroingParams) -> Result<Vec<ZeroingResult>, ZeroingError> {
    params.validate()?;
    params
        .distances
        .iter()
        .map(|&distance| {
            let angle = analytic_angle(distance, params.speed, params.gravity, params.sight_height)?;
            let angle = match &params.drag {
                Some(drag) => solve_with_drag(params, drag, distance, angle)?,
                None => angle,
            };
            Ok(ZeroingResult { distance, angle })
        })
        .collect()
}

/// Bracket-and-bisect search on the height residual at `distance`.
///
/// Drag only adds drop, so the drag-free angle is a lower bound; the upper
/// bound is widened from there until the residual changes sign.
fn solve_with_drag(params: &ZeroingParams, drag: &DragParams, distance: f32, no_drag_angle: f32) -> Result<f32, ZeroingError> {
    let residual = |angle: f32| height_with_drag(params, drag, distance, angle);

    let mut lo = no_drag_angle - 0.001;
    let mut f_lo = residual(lo).ok_or(ZeroingError::Unreachable { distance })?;
    if f_lo.abs() < TOLERANCE {
        return Ok(lo);
    }
    if f_lo > 0.0 {
        // already high: the residual crosses zero below, walk down
        let mut step = 0.01;
        let mut widenings = 0;
        while f_lo > 0.0 {
            if widenings == MAX_WIDENINGS {
                return Err(ZeroingError::Unreachable { distance });
            }
            lo -= step;
            step *= 2.0;
            f_lo = residual(lo).ok_or(ZeroingError::Unreachable { distance })?;
            widenings += 1;
        }
    }

    let mut step = 0.5f32.to_radians();
    let mut hi = lo + step;
    let mut f_hi = residual(hi);
    let mut widenings = 0;
    while !f_hi.is_some_and(|f| f > 0.0) {
        if widenings == MAX_WIDENINGS || hi >= std::f32::consts::FRAC_PI_4 {
            return Err(ZeroingError::Unreachable { distance });
        }
        step *= 2.0;
        hi = (lo + step).min(std::f32::consts::FRAC_PI_4);
        f_hi = residual(hi);
        widenings += 1;
    }

    let mut best = (lo, f_lo);
    for _ in 0..MAX_BISECTIONS {
        let mid = 0.5 * (lo + hi);
        let Some(f_mid) = residual(mid) else {
            // too flat to arrive at all
            lo = mid;
            continue;
        };
        if f_mid.abs() < best.1.abs() {
            best = (mid, f_mid);
        }
        if f_mid.abs() < TOLERANCE {
            return Ok(mid);
        }
        if f_mid < 0.0 {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    if best.1.abs() <= MAX_RESIDUAL {
        Ok(best.0)
    } else {
        warn!("zeroing at {} m stopped with residual {} m", distance, best.1);
        Err(ZeroingError::DidNotConverge {
            distance,
            residual: best.1,
        })
    }
}

/// Flies a collision-free bullet at `angle` and returns its height relative
/// to the line of sight when it crosses `distance`, or `None` if it never
/// gets there.
fn height_with_drag(params: &ZeroingParams, drag: &DragParams, distance: f32, angle: f32) -> Option<f32> {
    let env = BallisticsEnvironment {
        gravity: Vec3::new(0.0, -params.gravity, 0.0),
        air_density: drag.air_density,
        wind: Vec3::ZERO,
        temperature: 15.0,
        altitude: 0.0,
        max_delta_time: drag.time_step,
        air_resistance: true,
        spin: false,
        ..Default::default()
    };

    let direction = Vec3::new(0.0, angle.sin(), -angle.cos());
    let mut state = BulletState {
        position: Vec3::new(0.0, -params.sight_height, 0.0),
        velocity: direction * params.speed,
        lifetime: MAX_FLIGHT_TIME,
        mass: 1.0,
        drag_factor: drag.drag_factor,
        ..Default::default()
    };

    while state.lifetime > 0.0 {
        let before = state.position;
        state = kinematics::step(&state, drag.time_step, &env, PhysicsModel::SemiImplicitEuler);
        let (x0, x1) = (-before.z, -state.position.z);
        if x1 >= distance {
            let t = if x1 > x0 { (distance - x0) / (x1 - x0) } else { 1.0 };
            return Some(before.y + (state.position.y - before.y) * t);
        }
        if x1 <= x0 || !state.position.is_finite() {
            return None;
        }
    }
    None
}

/// Background zeroing computation.
///
/// The result is not available until [`poll`](Self::poll) returns it or
/// [`complete`](Self::complete) is called; neither is done implicitly.
pub struct ZeroingTask {
    task: Option<Task<Result<Vec<ZeroingResult>, ZeroingError>>>,
}

impl ZeroingTask {
    /// Starts solving `params` on the async compute pool.
    pub fn spawn(params: ZeroingParams) -> Self {
        let pool = AsyncComputeTaskPool::get_or_init(TaskPool::default);
        Self {
            task: Some(pool.spawn(async move { solve(&params) })),
        }
    }

    /// Non-blocking check. Yields the result once, then `None`.
    pub fn poll(&mut self) -> Option<Result<Vec<ZeroingResult>, ZeroingError>> {
        let task = self.task.as_mut()?;
        let result = block_on(future::poll_once(task))?;
        self.task = None;
        Some(result)
    }

    /// Blocks until the result is ready.
    pub fn complete(mut self) -> Result<Vec<ZeroingResult>, ZeroingError> {
        match self.task.take() {
            Some(task) => block_on(task),
            None => Err(ZeroingError::Cancelled),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.task.is_some()
    }
}

/// Solves `params`, synchronously when drag-free and in the background otherwise.
pub enum Zeroing {
    Ready(Result<Vec<ZeroingResult>, ZeroingError>),
    Pending(ZeroingTask),
}

impl Zeroing {
    pub fn start(params: ZeroingParams) -> Self {
        if params.drag.is_none() {
            Zeroing::Ready(solve(&params))
        } else {
            Zeroing::Pending(ZeroingTask::spawn(params))
        }
    }

    /// Blocks until the result is ready.
    pub fn complete(self) -> Result<Vec<ZeroingResult>, ZeroingError> {
        match self {
            Zeroing::Ready(result) => result,
            Zeroing::Pending(task) => task.complete(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_analytic_zero_crosses_at_distance() {
        let angle = analytic_angle(100.0, 500.0, 9.81, 0.0).unwrap();
        assert!(angle > 0.0);
        assert_abs_diff_eq!(analytic_height(100.0, angle, 500.0, 9.81, 0.0), 0.0, epsilon = 1.0e-4);
        // rising before the zero, falling after
        assert!(analytic_height(50.0, angle, 500.0, 9.81, 0.0) > 0.0);
        assert!(analytic_height(150.0, angle, 500.0, 9.81, 0.0) < 0.0);
    }

    #[test]
    fn test_analytic_with_sight_height() {
        let angle = analytic_angle(100.0, 800.0, 9.81, 0.05).unwrap();
        assert_abs_diff_eq!(analytic_height(100.0, angle, 800.0, 9.81, 0.05), 0.0, epsilon = 1.0e-4);
    }

    #[test]
    fn test_unreachable_distance() {
        // maximum range is v²/g ≈ 102 m
        assert_eq!(
            analytic_angle(200.0, 100.0 / 3.13, 9.81, 0.0),
            Err(ZeroingError::Unreachable { distance: 200.0 })
        );
    }

    #[test]
    fn test_zero_gravity_is_flat() {
        assert_eq!(analytic_angle(300.0, 900.0, 0.0, 0.0), Ok(0.0));
    }

    #[test]
    fn test_solve_rejects_bad_input() {
        let params = ZeroingParams::analytic(vec![100.0, -5.0], 500.0, 9.81);
        assert!(matches!(solve(&params), Err(ZeroingError::InvalidInput(_))));
    }

    #[test]
    fn test_drag_needs_more_elevation() {
        let mut params = ZeroingParams::analytic(vec![100.0, 300.0], 800.0, 9.81);
        let flat = solve(&params).unwrap();
        params.drag = Some(DragParams {
            air_density: 1.225,
            drag_factor: 0.0008,
            time_step: 1.0 / 240.0,
        });
        let dragged = solve(&params).unwrap();

        for (a, b) in flat.iter().zip(&dragged) {
            assert_eq!(a.distance, b.distance);
            assert!(b.angle > a.angle);
        }
        let drag = params.drag.unwrap();
        for result in &dragged {
            let height = height_with_drag(&params, &drag, result.distance, result.angle).unwrap();
            assert_abs_diff_eq!(height, 0.0, epsilon = MAX_RESIDUAL);
        }
    }

    #[test]
    fn test_background_task_completes() {
        let params = ZeroingParams {
            drag: Some(DragParams {
                air_density: 1.225,
                drag_factor: 0.0008,
                time_step: 1.0 / 120.0,
            }),
            ..ZeroingParams::analytic(vec![200.0], 700.0, 9.81)
        };
        let zeroing = Zeroing::start(params);
        assert!(matches!(zeroing, Zeroing::Pending(_)));
        let results = zeroing.complete().unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].angle > 0.0);
    }

    #[test]
    fn test_poll_yields_once() {
        let mut task = ZeroingTask::spawn(ZeroingParams::analytic(vec![50.0], 400.0, 9.81));
        let result = loop {
            if let Some(result) = task.poll() {
                break result;
            }
            std::thread::yield_now();
        };
        assert!(result.is_ok());
        assert!(task.poll().is_none());
        assert!(!task.is_pending());
        assert_eq!(task.complete(), Err(ZeroingError::Cancelled));
    }
}
