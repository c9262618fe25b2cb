mod demo;
mod ssh;

pub use demo::DemoExecutor;
pub use ssh::{SshExecutor, SshOptions};
