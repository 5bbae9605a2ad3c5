use std::io::{self, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info};

use crate::config::{SimConfig, Tuning};
use crate::error::{Result, SimError};
use crate::monitor;
use crate::philosopher;
use crate::state::{Sink, Snapshot, Status};
use crate::table::Table;

/// シミュレーションの結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub status: Status,
    // 席ごとの食事回数 (食事回数の指定がなければ数えない)
    pub meals: Vec<u32>,
}

impl Outcome {
    pub fn exit_code(&self) -> u8 {
        match self.status {
            Status::Died { .. } | Status::Satisfied => 0,
            Status::Interrupted => 130,
            Status::Running | Status::Aborted => 1,
        }
    }
}

pub struct Builder {
    config: SimConfig,
    tuning: Tuning,
    out: Option<Sink>,
}

impl Builder {
    pub fn tuning(mut self, tuning: Tuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn output<W: Write + Send + 'static>(mut self, out: W) -> Self {
        self.out = Some(Box::new(out));
        self
    }

    // 円卓を用意する。失敗したらスレッドは一つも作らない
    pub fn build(self) -> Result<Simulation> {
        let out = self.out.unwrap_or_else(|| Box::new(io::stdout()));
        let table = Table::new(self.config, self.tuning, out)?;
        Ok(Simulation {
            table: Arc::new(table),
        })
    }
}

/// 実行中のシミュレーションを外から止めたり覗いたりするためのハンドル
#[derive(Clone)]
pub struct SimHandle {
    table: Arc<Table>,
}

impl SimHandle {
    /// 割り込みで止める。既に終わっていれば false
    pub fn interrupt(&self) -> Result<bool> {
        self.table.state().stop(Status::Interrupted)
    }

    pub fn snapshot(&self) -> Result<Snapshot> {
        self.table.state().snapshot()
    }

    pub fn philosophers(&self) -> usize {
        self.table.len()
    }
}

pub struct Simulation {
    table: Arc<Table>,
}

impl Simulation {
    pub fn builder(config: SimConfig) -> Builder {
        Builder {
            config,
            tuning: Tuning::default(),
            out: None,
        }
    }

    pub fn handle(&self) -> SimHandle {
        SimHandle {
            table: self.table.clone(),
        }
    }

    /// 哲学者を一人一スレッドで走らせ、監視者が終了を見つけたら全員の終了を待つ
    pub fn run(self) -> Result<Outcome> {
        let n = self.table.len();
        let mut v = Vec::with_capacity(n);

        for idx in 0..n {
            let table = self.table.clone();
            let spawned = thread::Builder::new()
                .name(format!("philo-{}", idx + 1))
                .spawn(move || philosopher::dine(&table, idx));

            match spawned {
                Ok(t) => v.push(t),
                Err(e) => {
                    error!(philosopher = idx + 1, error = %e, "failed to spawn philosopher");
                    if let Err(e) = self.table.state().stop(Status::Aborted) {
                        error!(error = %e, "could not abort simulation");
                    }
                    join_all(v);
                    return Err(SimError::Spawn(e));
                }
            }
        }
        debug!(philosophers = n, "all philosophers seated");

        let watched = monitor::watch(&self.table);
        if watched.is_err() {
            // 監視できないなら哲学者も止める
            if let Err(e) = self.table.state().stop(Status::Aborted) {
                error!(error = %e, "could not abort simulation");
            }
        }
        let meals = join_all(v);
        let status = watched?;
        info!(status = ?status, "simulation finished");

        Ok(Outcome { status, meals })
    }
}

fn join_all(v: Vec<JoinHandle<u32>>) -> Vec<u32> {
    v.into_iter()
        .enumerate()
        .map(|(idx, t)| match t.join() {
            Ok(meals) => meals,
            Err(_) => {
                error!(philosopher = idx + 1, "philosopher thread panicked");
                0
            }
        })
        .collect()
}
