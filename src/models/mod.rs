//! Domain model module declarations.

pub mod agent;
pub mod outputs;
pub mod question;
pub mod session;
pub mod step;
