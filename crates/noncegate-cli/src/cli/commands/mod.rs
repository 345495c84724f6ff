mod dispatch;
pub mod sim;
pub mod soak;

pub use dispatch::dispatch;
