pub mod actuator;
pub mod arbitrator;
pub mod channel;
pub mod clock;
pub mod cooldown;
pub mod detection;
pub mod dwell;
pub mod geometry;
