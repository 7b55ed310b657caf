pub mod identity;
pub mod instance;
pub mod volume;
