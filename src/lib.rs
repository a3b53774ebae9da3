pub mod config;
pub mod debugger;
pub mod log;
pub mod rpc;
pub mod script;
pub mod ui;
