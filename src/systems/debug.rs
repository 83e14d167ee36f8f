use bevy::prelude::*;

use crate::resources::BallisticsConfig;
use crate::simulation::BulletSimulation;
use crate::types::BulletFlags;

/// Draw debug gizmos for live bullets.
///
/// Draws each bullet's position, its last step and a scaled velocity vector;
/// ricocheted bullets are yellow, penetrating ones blue.
pub fn draw_bullet_debug(mut gizmos: Gizmos, sim: Res<BulletSimulation>, config: Res<BallisticsConfig>) {
    if !config.debug_draw {
        return;
    }

    for (_, state) in sim.iter_active() {
        let color = if state.flags.contains(BulletFlags::RICOCHETED) {
            Color::srgb(1.0, 1.0, 0.0)
        } else if state.flags.contains(BulletFlags::PENETRATED) {
            Color::srgb(0.2, 0.4, 1.0)
        } else {
            Color::srgb(1.0, 0.0, 0.0)
        };
        gizmos.sphere(state.position, 0.05, color);
        gizmos.line(state.prev_position, state.position, color);

        // Scale down for visibility
        let end = state.position + state.velocity * 0.01;
        gizmos.line(state.position, end, Color::srgb(0.0, 1.0, 0.0));
    }
}
