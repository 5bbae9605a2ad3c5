use std::time::Duration;

use crate::error::ConfigError;

// 偶数番の哲学者が最初に待つ時間
const START_DELAY: Duration = Duration::from_millis(5);
// 監視者の巡回間隔
const POLL_INTERVAL: Duration = Duration::from_micros(250);

/// シミュレーションの設定。生成後は変更しない。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimConfig {
    pub philosophers: usize,
    pub time_to_die: Duration,
    pub time_to_eat: Duration,
    pub time_to_sleep: Duration,
    // None なら食事回数の上限なし
    pub meals: Option<u32>,
}

impl SimConfig {
    pub fn new(
        philosophers: usize,
        die_ms: u64,
        eat_ms: u64,
        sleep_ms: u64,
        meals: Option<u32>,
    ) -> Result<Self, ConfigError> {
        if philosophers == 0 {
            return Err(ConfigError::NoPhilosophers);
        }
        Ok(SimConfig {
            philosophers,
            time_to_die: Duration::from_millis(die_ms),
            time_to_eat: Duration::from_millis(eat_ms),
            time_to_sleep: Duration::from_millis(sleep_ms),
            meals,
        })
    }
}

/// タイミング調整用の定数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tuning {
    pub start_delay: Duration,
    pub poll_interval: Duration,
    // 考える時間がこれ以下なら考えない
    pub think_floor: Duration,
    // 考える時間がこれ以上なら think_cap だけ考える
    pub think_ceiling: Duration,
    pub think_cap: Duration,
}

impl Default for Tuning {
    fn default() -> Self {
        Tuning {
            start_delay: START_DELAY,
            poll_interval: POLL_INTERVAL,
            think_floor: Duration::from_millis(10),
            think_ceiling: Duration::from_millis(200),
            think_cap: Duration::from_millis(100),
        }
    }
}

// 数字のみを受け付ける。符号や空白は不可
pub fn parse_ms(s: &str) -> Result<u64, ConfigError> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ConfigError::NotANumber(s.to_string()));
    }
    s.parse::<u64>()
        .map_err(|_| ConfigError::OutOfRange(s.to_string()))
}

pub fn parse_count(s: &str) -> Result<u32, ConfigError> {
    let n = parse_ms(s)?;
    u32::try_from(n).map_err(|_| ConfigError::OutOfRange(s.to_string()))
}

pub fn parse_philosophers(s: &str) -> Result<usize, ConfigError> {
    let n = parse_count(s)?;
    match n {
        0 => Err(ConfigError::NoPhilosophers),
        n => usize::try_from(n).map_err(|_| ConfigError::OutOfRange(s.to_string())),
    }
}
