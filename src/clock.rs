use std::time::{Duration, Instant};

// シミュレーション開始時刻を基準にしたミリ秒時計
// Instant は単調増加なので、時刻が巻き戻ることはない
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    start: Instant,
}

impl Clock {
    pub fn start() -> Self {
        Clock {
            start: Instant::now(),
        }
    }

    // 開始からの経過ミリ秒
    pub fn elapsed_ms(&self) -> u64 {
        as_ms(self.start.elapsed())
    }

    // at から現在までのミリ秒
    pub fn ms_since(&self, at: Instant) -> u64 {
        as_ms(Instant::now().saturating_duration_since(at))
    }

    // 開始から at までのミリ秒
    pub fn offset_ms(&self, at: Instant) -> u64 {
        as_ms(at.saturating_duration_since(self.start))
    }

    pub fn started_at(&self) -> Instant {
        self.start
    }
}

fn as_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
