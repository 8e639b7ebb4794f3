pub mod builder;
pub mod listener;

pub use builder::ServerBuilder;
pub use listener::bind_tcp;
