use std::fmt;
use std::io::{self, Write};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::warn;

use crate::clock::Clock;
use crate::error::{Result, SimError};

/// イベント行の出力先
pub type Sink = Box<dyn Write + Send>;

/// 哲学者の状態変化
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    TakenChopstick,
    Eating,
    Sleeping,
    Thinking,
    Died,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Event::TakenChopstick => "has taken a resource.",
            Event::Eating => "is eating.",
            Event::Sleeping => "is sleeping.",
            Event::Thinking => "is thinking.",
            Event::Died => "died.",
        };
        f.write_str(s)
    }
}

/// シミュレーションの状態
///
/// `Running` 以外に遷移するのは一度だけで、以後は変化しない。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Running,
    // at_ms - last_meal_ms >= time_to_die
    Died {
        id: usize,
        at_ms: u64,
        last_meal_ms: u64,
    },
    Satisfied,
    Interrupted,
    Aborted,
}

impl Status {
    pub fn is_running(&self) -> bool {
        matches!(self, Status::Running)
    }
}

/// ある時点の共有状態の写し
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub status: Status,
    pub eating: Vec<bool>,
    pub satisfied: usize,
}

// 状態ロックで保護するデータ
pub(crate) struct Board {
    pub(crate) status: Status,
    pub(crate) last_meal: Vec<Instant>,
    pub(crate) eating: Vec<bool>,
    pub(crate) satisfied: usize,
    out: Sink,
    // 一度書き込みに失敗した出力先には以後書かない
    out_failed: bool,
}

impl Board {
    // 状態を確定させる。既に確定済みなら false
    pub(crate) fn settle(&mut self, status: Status) -> bool {
        if !self.status.is_running() {
            return false;
        }
        self.status = status;
        true
    }

    pub(crate) fn emit(&mut self, ms: u64, id: usize, event: Event) {
        self.write_line(format_args!("{ms} {id} {event}"));
    }

    pub(crate) fn announce(&mut self, line: &str) {
        self.write_line(format_args!("{line}"));
    }

    fn write_line(&mut self, line: fmt::Arguments<'_>) {
        if self.out_failed {
            return;
        }
        if let Err(e) = writeln!(self.out, "{line}") {
            self.out_failed = true;
            warn!(error = %e, "output failed, dropping further event lines");
            // 読み手がいなくなったら割り込みとして止める
            if e.kind() == io::ErrorKind::BrokenPipe {
                self.settle(Status::Interrupted);
            }
        }
    }
}

/// 全スレッドで共有するシミュレーション状態
///
/// 時刻・フラグ・カウンタ・出力はすべて一つの Mutex (状態ロック) で直列化する。
/// 出力もロック中に行うので行が混ざることはない。
pub struct State {
    clock: Clock,
    board: Mutex<Board>,
    // 状態が Running から変わったら notify_all
    changed: Condvar,
}

impl State {
    pub(crate) fn new(philosophers: usize, meals: Option<u32>, out: Sink) -> Result<Self> {
        let clock = Clock::start();

        let mut last_meal = Vec::new();
        let mut eating = Vec::new();
        last_meal
            .try_reserve_exact(philosophers)
            .and_then(|_| eating.try_reserve_exact(philosophers))
            .map_err(|e| SimError::ResourceInit(e.to_string()))?;
        last_meal.resize(philosophers, clock.started_at());
        eating.resize(philosophers, false);

        // 0 回でよいなら最初から全員満腹
        let satisfied = match meals {
            Some(0) => philosophers,
            _ => 0,
        };

        Ok(State {
            clock,
            board: Mutex::new(Board {
                status: Status::Running,
                last_meal,
                eating,
                satisfied,
                out,
                out_failed: false,
            }),
            changed: Condvar::new(),
        })
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Board>> {
        self.board
            .lock()
            .map_err(|_| SimError::Sync("state lock poisoned"))
    }

    pub(crate) fn notify(&self) {
        self.changed.notify_all();
    }

    pub fn status(&self) -> Result<Status> {
        Ok(self.lock()?.status)
    }

    pub fn is_running(&self) -> Result<bool> {
        Ok(self.lock()?.status.is_running())
    }

    /// 状態を確定させる。既に確定済みなら何もせず false を返す
    pub fn stop(&self, status: Status) -> Result<bool> {
        let settled = self.lock()?.settle(status);
        if settled {
            self.notify();
        }
        Ok(settled)
    }

    /// 実行中なら 1 行出力して true を返す。終了後は何も出力しない
    pub fn report(&self, id: usize, event: Event) -> Result<bool> {
        let mut board = self.lock()?;
        if !board.status.is_running() {
            return Ok(false);
        }
        let ms = self.clock.elapsed_ms();
        board.emit(ms, id, event);
        if !board.status.is_running() {
            self.notify();
        }
        Ok(true)
    }

    // 食事開始時刻の記録と "is eating." の出力を一つのクリティカルセクションで行う
    pub(crate) fn start_eating(&self, idx: usize, id: usize) -> Result<bool> {
        let mut board = self.lock()?;
        if !board.status.is_running() {
            return Ok(false);
        }
        let now = Instant::now();
        if let Some(t) = board.last_meal.get_mut(idx) {
            *t = now;
        }
        if let Some(e) = board.eating.get_mut(idx) {
            *e = true;
        }
        let ms = self.clock.offset_ms(now);
        board.emit(ms, id, Event::Eating);
        if !board.status.is_running() {
            self.notify();
        }
        Ok(true)
    }

    // 箸を置く前に呼ぶ
    pub(crate) fn stop_eating(&self, idx: usize) -> Result<()> {
        let mut board = self.lock()?;
        if let Some(e) = board.eating.get_mut(idx) {
            *e = false;
        }
        Ok(())
    }

    pub(crate) fn record_satisfied(&self) -> Result<()> {
        self.lock()?.satisfied += 1;
        Ok(())
    }

    pub(crate) fn since_last_meal(&self, idx: usize) -> Result<Duration> {
        let board = self.lock()?;
        let last = board
            .last_meal
            .get(idx)
            .copied()
            .unwrap_or_else(|| self.clock.started_at());
        Ok(Instant::now().saturating_duration_since(last))
    }

    /// dur だけ待つ。終了したら途中で起こされ false を返す
    pub fn pause(&self, dur: Duration) -> Result<bool> {
        let board = self.lock()?;
        let (board, _) = self
            .changed
            .wait_timeout_while(board, dur, |b| b.status.is_running())
            .map_err(|_| SimError::Sync("state lock poisoned"))?;
        Ok(board.status.is_running())
    }

    pub fn snapshot(&self) -> Result<Snapshot> {
        let board = self.lock()?;
        Ok(Snapshot {
            status: board.status,
            eating: board.eating.clone(),
            satisfied: board.satisfied,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Capture {
        fn lines(&self) -> Vec<String> {
            let buf = self.0.lock().unwrap();
            String::from_utf8_lossy(&buf)
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    // 書き込みが常に失敗する出力先
    #[derive(Clone)]
    struct Closed {
        kind: io::ErrorKind,
        writes: Arc<Mutex<usize>>,
    }

    impl Write for Closed {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            *self.writes.lock().unwrap() += 1;
            Err(io::Error::from(self.kind))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn closed(kind: io::ErrorKind) -> Closed {
        Closed {
            kind,
            writes: Arc::new(Mutex::new(0)),
        }
    }

    #[test]
    fn test_broken_pipe_interrupts() {
        let out = closed(io::ErrorKind::BrokenPipe);
        let state = State::new(2, None, Box::new(out.clone())).unwrap();

        assert!(state.report(1, Event::TakenChopstick).unwrap());
        assert_eq!(state.status().unwrap(), Status::Interrupted);
        // 止まっているので待たずに戻る
        assert!(!state.pause(Duration::from_secs(10)).unwrap());
        assert!(!state.report(1, Event::Eating).unwrap());
        assert_eq!(*out.writes.lock().unwrap(), 1);
    }

    #[test]
    fn test_failed_output_is_written_once() {
        let out = closed(io::ErrorKind::Other);
        let state = State::new(2, None, Box::new(out.clone())).unwrap();

        for _ in 0..5 {
            assert!(state.report(2, Event::Thinking).unwrap());
        }
        assert!(state.start_eating(0, 1).unwrap());
        // 壊れた出力先は一度しか触らず、シミュレーションは続く
        assert_eq!(*out.writes.lock().unwrap(), 1);
        assert!(state.is_running().unwrap());
    }

    #[test]
    fn test_report_format() {
        let out = Capture::default();
        let state = State::new(2, None, Box::new(out.clone())).unwrap();
        assert!(state.report(2, Event::Sleeping).unwrap());

        let lines = out.lines();
        assert_eq!(lines.len(), 1);
        let parts: Vec<&str> = lines[0].splitn(3, ' ').collect();
        assert!(parts[0].parse::<u64>().is_ok());
        assert_eq!(parts[1], "2");
        assert_eq!(parts[2], "is sleeping.");
    }

    #[test]
    fn test_stop_is_final() {
        let state = State::new(3, None, Box::new(std::io::sink())).unwrap();
        assert!(state.stop(Status::Satisfied).unwrap());
        // 一度確定したら上書きされない
        assert!(!state.stop(Status::Interrupted).unwrap());
        assert_eq!(state.status().unwrap(), Status::Satisfied);
    }

    #[test]
    fn test_no_report_after_stop() {
        let out = Capture::default();
        let state = State::new(2, None, Box::new(out.clone())).unwrap();
        state.stop(Status::Interrupted).unwrap();

        assert!(!state.report(1, Event::Thinking).unwrap());
        assert!(!state.start_eating(0, 1).unwrap());
        assert!(out.lines().is_empty());
        assert_eq!(state.snapshot().unwrap().eating, vec![false, false]);
    }

    #[test]
    fn test_eating_flags() {
        let state = State::new(3, Some(1), Box::new(std::io::sink())).unwrap();
        assert!(state.start_eating(1, 2).unwrap());
        assert_eq!(state.snapshot().unwrap().eating, vec![false, true, false]);
        state.stop_eating(1).unwrap();
        state.record_satisfied().unwrap();
        let snap = state.snapshot().unwrap();
        assert_eq!(snap.eating, vec![false, false, false]);
        assert_eq!(snap.satisfied, 1);
    }

    #[test]
    fn test_zero_meals_is_satisfied() {
        let state = State::new(4, Some(0), Box::new(std::io::sink())).unwrap();
        assert_eq!(state.snapshot().unwrap().satisfied, 4);
    }

    #[test]
    fn test_pause_wakes_on_stop() {
        let state = Arc::new(State::new(1, None, Box::new(std::io::sink())).unwrap());
        let state0 = state.clone();
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            state0.stop(Status::Interrupted).unwrap();
        });

        let begin = Instant::now();
        assert!(!state.pause(Duration::from_secs(10)).unwrap());
        assert!(begin.elapsed() < Duration::from_secs(5));
        t.join().unwrap();
    }

    #[test]
    fn test_pause_runs_full_duration() {
        let state = State::new(1, None, Box::new(std::io::sink())).unwrap();
        let begin = Instant::now();
        assert!(state.pause(Duration::from_millis(30)).unwrap());
        assert!(begin.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_poisoned_lock_is_sync_error() {
        let state = Arc::new(State::new(1, None, Box::new(std::io::sink())).unwrap());
        let state0 = state.clone();
        let _ = thread::spawn(move || {
            let _board = state0.lock().unwrap();
            panic!("poison the state lock");
        })
        .join();

        assert!(matches!(
            state.report(1, Event::Thinking),
            Err(SimError::Sync(_))
        ));
    }

    #[test]
    fn test_oversized_table_fails() {
        let res = State::new(usize::MAX / 2, None, Box::new(std::io::sink()));
        assert!(matches!(res, Err(SimError::ResourceInit(_))));
    }
}
