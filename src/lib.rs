//! Battle Copilot - scripted battle automation over screen capture and input

pub mod battle;
pub mod core;
pub mod device;
pub mod notify;
pub mod sim;
