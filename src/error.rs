//! シミュレーションのエラー型

use thiserror::Error;

/// コマンドライン入力の検証エラー
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid input: {0:?} is not a non-negative integer")]
    NotANumber(String),

    #[error("invalid input: {0:?} is out of range")]
    OutOfRange(String),

    #[error("invalid input: at least one philosopher is required")]
    NoPhilosophers,
}

/// 起動時・実行時のエラー
///
/// 餓死と全員満腹はエラーではなく `Status` で表す。
#[derive(Error, Debug)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// テーブル (箸の輪) の構築に失敗
    #[error("failed to set the table: {0}")]
    ResourceInit(String),

    #[error("failed to spawn philosopher thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// ロックが poison された
    #[error("lock failure: {0}")]
    Sync(&'static str),

    #[error("failed to install signal handler: {0}")]
    Signal(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;
