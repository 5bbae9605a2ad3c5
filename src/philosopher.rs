use std::time::Duration;

use tracing::{debug, error};

use crate::config::Tuning;
use crate::error::Result;
use crate::state::{Event, State, Status};
use crate::table::{Held, Seat, Table};

// 哲学者スレッドの本体。食べた回数を返す
pub(crate) fn dine(table: &Table, idx: usize) -> u32 {
    let mut p = Philosopher {
        table,
        idx,
        id: idx + 1,
        meals: 0,
    };

    if let Err(e) = p.run() {
        // このスレッドだけ止める。結果はもう信用できないので全体も打ち切る
        error!(philosopher = p.id, error = %e, "philosopher stopped");
        if let Err(e) = table.state().stop(Status::Aborted) {
            error!(philosopher = p.id, error = %e, "could not abort simulation");
        }
    }
    debug!(philosopher = p.id, meals = p.meals, "philosopher left the table");
    p.meals
}

struct Philosopher<'a> {
    table: &'a Table,
    idx: usize,
    id: usize,
    meals: u32,
}

impl<'a> Philosopher<'a> {
    fn state(&self) -> &'a State {
        self.table.state()
    }

    fn run(&mut self) -> Result<()> {
        // 偶数番は少し遅れて始める。全員が同時に左の箸を取るのを避けるため
        if self.id % 2 == 0 && !self.state().pause(self.table.tuning().start_delay)? {
            return Ok(());
        }

        while self.eat()? && self.sleep_then_think()? {}
        Ok(())
    }

    // 両方の箸を取って食べる。続けてよければ true
    fn eat(&mut self) -> Result<bool> {
        let Some(seat) = self.table.seat(self.idx) else {
            return Ok(false);
        };
        let state = self.state();
        let config = self.table.config();

        // 自分の (左の) 箸
        // これを持っている他人は食事中なので、待ちは食事時間で抑えられる
        let own = seat.take()?;
        if !state.report(self.id, Event::TakenChopstick)? {
            return Ok(false);
        }

        let Some(partner) = self.table.partner_of(self.idx) else {
            // 一人では箸が一本しかないので食べられない。餓死するまで待つ
            state.pause(config.time_to_die)?;
            drop(own);
            return Ok(false);
        };

        // 右の箸
        let Some(other) = self.take_partner(partner)? else {
            return Ok(false);
        };
        if !state.report(self.id, Event::TakenChopstick)? {
            return Ok(false);
        }

        if !state.start_eating(self.idx, self.id)? {
            return Ok(false);
        }
        let finished = state.pause(config.time_to_eat)?;

        // 食事中フラグを下ろしてから右、左の順に箸を置く
        state.stop_eating(self.idx)?;
        drop(other);
        drop(own);

        // 途中で打ち切られた食事は数えない
        if !finished {
            return Ok(false);
        }
        self.count_meal()?;
        Ok(true)
    }

    // 右の箸は取れるまで待ちつつ、終了していないか確認する
    // 全員が左の箸を握った循環待ちでも、スレッドは必ず抜けられる
    fn take_partner<'s>(&self, seat: &'s Seat) -> Result<Option<Held<'s>>> {
        let poll = self.table.tuning().poll_interval;
        loop {
            if let Some(held) = seat.try_take()? {
                return Ok(Some(held));
            }
            if !self.state().pause(poll)? {
                return Ok(None);
            }
        }
    }

    fn count_meal(&mut self) -> Result<()> {
        if let Some(required) = self.table.config().meals {
            self.meals += 1;
            if self.meals == required {
                self.state().record_satisfied()?;
            }
        }
        Ok(())
    }

    fn sleep_then_think(&mut self) -> Result<bool> {
        let state = self.state();
        let config = self.table.config();

        if !state.report(self.id, Event::Sleeping)? {
            return Ok(false);
        }
        if !state.pause(config.time_to_sleep)? {
            return Ok(false);
        }

        let since = state.since_last_meal(self.idx)?;
        let think = think_time(self.table.tuning(), config.time_to_die, since);
        if !state.report(self.id, Event::Thinking)? {
            return Ok(false);
        }
        state.pause(think)
    }
}

/// 考える時間 = (time_to_die - 前回の食事からの経過時間) / 2
///
/// 2 で割るのは、箸の取得待ちでどれだけブロックされるか分からないため。
/// 余裕がなければ考えず、余裕が大きすぎれば上限で切る。
pub fn think_time(tuning: &Tuning, time_to_die: Duration, since_last_meal: Duration) -> Duration {
    let slack = time_to_die.saturating_sub(since_last_meal) / 2;
    if slack <= tuning.think_floor {
        Duration::ZERO
    } else if slack >= tuning.think_ceiling {
        tuning.think_cap
    } else {
        slack
    }
}
