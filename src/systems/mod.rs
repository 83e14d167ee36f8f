//! Systems module - the pure simulation phases and the ECS systems hosting them.

pub mod collision;
pub mod debug;
pub mod kinematics;
pub mod logic;
pub mod preview;
pub mod surface;
pub mod zeroing;
