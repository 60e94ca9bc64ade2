use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use crate::protocol::domain::result_state::ResultState;

/// Observer for frame pump activity.
///
/// Keeps the pump loop free of output concerns; the CLI logs through the
/// `log` facade, tests discard everything.
pub trait ScanLogger: Send {
    /// One frame was submitted and the engine answered with `state`.
    fn tick(&mut self, tick: u64, state: ResultState);

    /// How long a named stage took for one tick.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    fn metric(&mut self, name: &str, value: f64);

    fn info(&mut self, message: &str);

    /// Emit an end-of-scan summary. Default: no-op.
    fn summary(&self) {}
}

pub struct NullScanLogger;

impl ScanLogger for NullScanLogger {
    fn tick(&mut self, _tick: u64, _state: ResultState) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn info(&mut self, _message: &str) {}
}

/// Running aggregate of one timing or metric series.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Series {
    pub count: u64,
    pub total: f64,
    pub max: f64,
}

impl Series {
    fn record(&mut self, value: f64) {
        self.count += 1;
        self.total += value;
        self.max = if self.count == 1 {
            value
        } else {
            self.max.max(value)
        };
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total / self.count as f64
        }
    }
}

/// Logger writing through the `log` facade.
///
/// Tick lines are logged at info level every `every_ticks` ticks and at
/// trace level otherwise. The summary lists per-stage timings, metric
/// averages, result-state counts and throughput.
pub struct LogScanLogger {
    every_ticks: u64,
    started: Instant,
    last_tick: u64,
    stages: BTreeMap<String, Series>,
    metrics: BTreeMap<String, Series>,
    states: HashMap<ResultState, u64>,
    notes: Vec<String>,
}

impl LogScanLogger {
    pub fn new(every_ticks: u64) -> Self {
        Self {
            every_ticks: every_ticks.max(1),
            started: Instant::now(),
            last_tick: 0,
            stages: BTreeMap::new(),
            metrics: BTreeMap::new(),
            states: HashMap::new(),
            notes: Vec::new(),
        }
    }

    pub fn stage(&self, stage: &str) -> Option<Series> {
        self.stages.get(stage).copied()
    }

    pub fn metric_series(&self, name: &str) -> Option<Series> {
        self.metrics.get(name).copied()
    }

    pub fn state_count(&self, state: ResultState) -> u64 {
        self.states.get(&state).copied().unwrap_or(0)
    }

    /// Summary text, or `None` before anything was recorded.
    pub fn render_summary(&self) -> Option<String> {
        if self.last_tick == 0 && self.stages.is_empty() && self.metrics.is_empty() {
            return None;
        }

        let secs = self.started.elapsed().as_secs_f64();
        let mut out = format!("Scan summary ({} ticks in {secs:.1}s)", self.last_tick);

        for (stage, series) in &self.stages {
            out.push_str(&format!(
                "\n  {stage:<14} mean {:>7.2}ms  max {:>7.2}ms  n={}",
                series.mean(),
                series.max,
                series.count
            ));
        }
        for (name, series) in &self.metrics {
            out.push_str(&format!("\n  {name}: mean {:.1}", series.mean()));
        }

        let counts: Vec<String> = [
            ResultState::Empty,
            ResultState::Uncertain,
            ResultState::StageValid,
            ResultState::Valid,
        ]
        .into_iter()
        .filter_map(|state| {
            self.states
                .get(&state)
                .map(|count| format!("{state}={count}"))
        })
        .collect();
        if !counts.is_empty() {
            out.push_str(&format!("\n  results: {}", counts.join(" ")));
        }

        if self.last_tick > 0 && secs > 0.0 {
            out.push_str(&format!(
                "\n  rate: {:.1} frames/s",
                self.last_tick as f64 / secs
            ));
        }
        Some(out)
    }
}

impl Default for LogScanLogger {
    fn default() -> Self {
        Self::new(30)
    }
}

impl ScanLogger for LogScanLogger {
    fn tick(&mut self, tick: u64, state: ResultState) {
        self.last_tick = self.last_tick.max(tick);
        *self.states.entry(state).or_insert(0) += 1;
        if tick % self.every_ticks == 0 {
            log::info!("tick {tick}: {state}");
        } else {
            log::trace!("tick {tick}: {state}");
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.stages
            .entry(stage.to_owned())
            .or_default()
            .record(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics.entry(name.to_owned()).or_default().record(value);
    }

    fn info(&mut self, message: &str) {
        log::info!("{message}");
        self.notes.push(message.to_owned());
    }

    fn summary(&self) {
        match self.render_summary() {
            Some(text) => log::info!("{text}"),
            None => log::debug!("Scan ended before any frame was processed"),
        }
    }
}
