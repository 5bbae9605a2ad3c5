use std::sync::{Mutex, MutexGuard, TryLockError};

use tracing::debug;

use crate::config::{SimConfig, Tuning};
use crate::error::{Result, SimError};
use crate::state::{Sink, State};

// 箸。保護するデータはなく、ロックそのものが資源
#[derive(Debug, Default)]
pub struct Chopstick;

pub type Held<'a> = MutexGuard<'a, Chopstick>;

/// 円卓の一席
///
/// 自分の左の箸を所有し、右の箸は隣の席 (partner) の箸を借りる。
#[derive(Debug)]
pub struct Seat {
    pub id: usize,
    chopstick: Mutex<Chopstick>,
    // 右隣の席の添字。一人のときは None
    partner: Option<usize>,
}

impl Seat {
    pub fn partner(&self) -> Option<usize> {
        self.partner
    }

    // 自分の箸を取る。取れるまでブロックする
    pub(crate) fn take(&self) -> Result<Held<'_>> {
        self.chopstick
            .lock()
            .map_err(|_| SimError::Sync("chopstick lock poisoned"))
    }

    // 取れなければ None
    pub(crate) fn try_take(&self) -> Result<Option<Held<'_>>> {
        match self.chopstick.try_lock() {
            Ok(held) => Ok(Some(held)),
            Err(TryLockError::WouldBlock) => Ok(None),
            Err(TryLockError::Poisoned(_)) => Err(SimError::Sync("chopstick lock poisoned")),
        }
    }
}

/// 円卓: 席の並びと共有状態をひとまとめに所有する
///
/// 隣の席は添字の計算で求めるので、席同士のポインタは持たない。
pub struct Table {
    config: SimConfig,
    tuning: Tuning,
    state: State,
    seats: Vec<Seat>,
}

impl Table {
    /// すべての席を作ってから返す。途中で失敗したら作りかけのものは捨てる
    pub fn new(config: SimConfig, tuning: Tuning, out: Sink) -> Result<Self> {
        let n = config.philosophers;
        if n == 0 {
            return Err(SimError::ResourceInit("the table has no seats".to_string()));
        }

        let mut seats = Vec::new();
        seats
            .try_reserve_exact(n)
            .map_err(|e| SimError::ResourceInit(e.to_string()))?;
        for i in 0..n {
            seats.push(Seat {
                id: i + 1,
                chopstick: Mutex::new(Chopstick),
                partner: (n > 1).then(|| right_of(i, n)),
            });
        }

        let state = State::new(n, config.meals, out)?;
        debug!(philosophers = n, "table is set");

        Ok(Table {
            config,
            tuning,
            state,
            seats,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn tuning(&self) -> &Tuning {
        &self.tuning
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn seats(&self) -> &[Seat] {
        &self.seats
    }

    pub fn seat(&self, idx: usize) -> Option<&Seat> {
        self.seats.get(idx)
    }

    // 右の箸の持ち主
    pub fn partner_of(&self, idx: usize) -> Option<&Seat> {
        self.seat(idx)?.partner.and_then(|p| self.seat(p))
    }

    pub fn len(&self) -> usize {
        self.seats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seats.is_empty()
    }
}

pub fn left_of(i: usize, n: usize) -> usize {
    (i + n - 1) % n
}

pub fn right_of(i: usize, n: usize) -> usize {
    (i + 1) % n
}

#[cfg(test)]
mod test {
    use super::*;

    fn table(n: usize) -> Table {
        let config = SimConfig::new(n, 800, 200, 200, None).unwrap();
        Table::new(config, Tuning::default(), Box::new(std::io::sink())).unwrap()
    }

    #[test]
    fn test_ring_is_a_cycle() {
        let t = table(5);
        assert_eq!(t.len(), 5);

        // 右隣をたどると全員を一度ずつ通って戻ってくる
        let mut visited = [false; 5];
        let mut idx = 0;
        for _ in 0..5 {
            assert!(!visited[idx]);
            visited[idx] = true;
            idx = t.seat(idx).unwrap().partner().unwrap();
        }
        assert_eq!(idx, 0);
        assert!(visited.iter().all(|v| *v));

        let ids: Vec<usize> = t.seats().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_lone_seat_has_no_partner() {
        let t = table(1);
        assert_eq!(t.seat(0).unwrap().partner(), None);
        assert!(t.partner_of(0).is_none());
    }

    #[test]
    fn test_two_seats_share_both_chopsticks() {
        let t = table(2);
        assert_eq!(t.partner_of(0).unwrap().id, 2);
        assert_eq!(t.partner_of(1).unwrap().id, 1);
    }

    #[test]
    fn test_neighbors() {
        assert_eq!(left_of(0, 5), 4);
        assert_eq!(right_of(4, 5), 0);
        assert_eq!(left_of(3, 5), 2);
        assert_eq!(right_of(0, 1), 0);
    }

    #[test]
    fn test_chopstick_is_exclusive() {
        let t = table(2);
        let seat = t.seat(0).unwrap();
        let held = seat.take().unwrap();
        assert!(seat.try_take().unwrap().is_none());
        drop(held);
        assert!(seat.try_take().unwrap().is_some());
    }

    #[test]
    fn test_oversized_table_is_not_built() {
        let config = SimConfig::new(usize::MAX / 2, 800, 200, 200, None).unwrap();
        let res = Table::new(config, Tuning::default(), Box::new(std::io::sink()));
        assert!(matches!(res, Err(SimError::ResourceInit(_))));
    }
}
