pub mod cancel;
pub mod deploy;
pub mod destroy;
pub mod outputs;
pub mod preview;
pub mod provision;
