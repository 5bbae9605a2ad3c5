use std::thread;

use tracing::{debug, info};

use crate::error::Result;
use crate::state::{Event, Status};
use crate::table::Table;

// 哲学者を観測する監視者
// 餓死か全員満腹を見つけるまで巡回し、確定した状態を返す
pub(crate) fn watch(table: &Table) -> Result<Status> {
    let poll = table.tuning().poll_interval;
    loop {
        if let Some(status) = sweep(table)? {
            return Ok(status);
        }
        thread::sleep(poll);
    }
}

// 一巡分の検査。状態ロックは巡回の間ずっと保持する
pub(crate) fn sweep(table: &Table) -> Result<Option<Status>> {
    let state = table.state();
    let clock = state.clock();
    let config = table.config();
    let mut board = state.lock()?;

    // 割り込みや異常終了で既に止まっている
    if !board.status.is_running() {
        debug!(status = ?board.status, "simulation already stopped");
        return Ok(Some(board.status));
    }

    let die_ms = u64::try_from(config.time_to_die.as_millis()).unwrap_or(u64::MAX);
    let now_ms = clock.elapsed_ms();

    // 席の順に前回の食事からの経過時間を見る
    let starved = board.last_meal.iter().enumerate().find_map(|(idx, at)| {
        let last_meal_ms = clock.offset_ms(*at);
        (now_ms.saturating_sub(last_meal_ms) >= die_ms).then_some(Status::Died {
            id: idx + 1,
            at_ms: now_ms,
            last_meal_ms,
        })
    });

    if let Some(status @ Status::Died { id, .. }) = starved {
        // フラグを立てるのと "died." の出力は同じクリティカルセクションで行う
        board.settle(status);
        board.emit(now_ms, id, Event::Died);
        state.notify();
        info!(philosopher = id, at_ms = now_ms, "philosopher starved");
        return Ok(Some(status));
    }

    if let Some(required) = config.meals {
        if board.satisfied >= table.len() {
            board.settle(Status::Satisfied);
            board.announce(&format!("All philosophers have eaten {required} meals."));
            state.notify();
            info!(meals = required, "every philosopher is satisfied");
            return Ok(Some(Status::Satisfied));
        }
    }

    Ok(None)
}
