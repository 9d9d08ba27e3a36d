pub mod animator;
pub mod config;
pub mod devices;
pub mod error;
pub mod idle;
pub mod poller;
pub mod shutdown;
pub mod platform {
    pub mod display_power;
}
