mod serve;
mod services;

pub use serve::execute_serve;
pub use services::{execute_register, execute_resolve};
