pub mod chat;
pub mod config_cmd;
pub mod files;
pub mod serve;
