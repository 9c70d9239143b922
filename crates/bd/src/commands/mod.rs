//! Command handlers, one module per subcommand.

pub mod blocked;
pub mod close;
pub mod cook;
pub mod create;
pub mod dep;
pub mod init;
pub mod mol;
pub mod ready;
pub mod reopen;
