pub mod bus;
pub mod types;

pub use bus::ChangeBus;
pub use types::ChangeEvent;
