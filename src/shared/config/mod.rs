/// 設定管理モジュール
pub mod environment;

pub use environment::{
    get_environment, initialize_logging_system, load_environment_variables, ApiConfig,
    AppConfig, AuthConfig, Environment, EnvironmentConfig, StorageConfig, UiConfig,
};
