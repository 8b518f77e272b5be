pub mod blockmap;
pub mod config;
pub mod control;
pub mod display;
pub mod driver;
pub mod ftp;
pub mod logging;
pub mod storage;
pub mod supervisor;
pub mod walker;
pub mod worker;
