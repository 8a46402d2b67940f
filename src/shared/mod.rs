/// 機能横断の共有モジュール
pub mod api_client;
pub mod config;
pub mod errors;
pub mod scheduler;
pub mod storage;
pub mod utils;
