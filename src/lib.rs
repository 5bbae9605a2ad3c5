//! 食事する哲学者のシミュレーション
//!
//! 円卓に座った N 人の哲学者がそれぞれスレッドとして動き、隣と共有する箸
//! (Mutex) を 2 本取って食べ、眠り、考えることを繰り返す。監視者は誰かが
//! `time_to_die` の間食べられなかったら餓死を、全員が指定回数食べたら満腹を
//! 宣言してシミュレーションを止める。

pub mod clock;
pub mod config;
pub mod error;
mod monitor;
mod philosopher;
pub mod signal;
pub mod simulation;
pub mod state;
pub mod table;

pub use config::{SimConfig, Tuning};
pub use error::{ConfigError, Result, SimError};
pub use philosopher::think_time;
pub use simulation::{Outcome, SimHandle, Simulation};
pub use state::{Event, Snapshot, Status};
