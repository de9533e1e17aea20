//! Per-invocation pipeline state.
//!
//! A run moves strictly forward through
//! `Idle -> Locating -> Decoding -> Regridding -> Encoding -> Publishing -> Done`
//! and may drop to `Failed` from any active stage.

use std::fmt;
use std::time::Instant;

use serde::Serialize;
use tracing::debug;

use crate::error::{IngestionError, PipelineFailure};
use crate::request::SensorParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Idle,
    Locating,
    Decoding,
    Regridding,
    Encoding,
    Publishing,
    Done,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::Locating => "locating",
            Stage::Decoding => "decoding",
            Stage::Regridding => "regridding",
            Stage::Encoding => "encoding",
            Stage::Publishing => "publishing",
            Stage::Done => "done",
            Stage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks one invocation through its stages.
#[derive(Debug)]
pub struct PipelineRun {
    params: SensorParams,
    stage: Stage,
    started: Instant,
}

impl PipelineRun {
    pub fn start(params: SensorParams) -> Self {
        Self {
            params,
            stage: Stage::Idle,
            started: Instant::now(),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn params(&self) -> &SensorParams {
        &self.params
    }

    /// Move to `next`. Transitions never go backwards or leave a terminal
    /// state; such calls are ignored.
    pub fn enter(&mut self, next: Stage) {
        if self.stage.is_terminal() || next <= self.stage {
            debug!(from = %self.stage, to = %next, "Ignoring out-of-order stage transition");
            return;
        }
        debug!(
            params = %self.params,
            from = %self.stage,
            to = %next,
            elapsed_ms = self.elapsed_ms(),
            "Pipeline stage"
        );
        self.stage = next;
    }

    pub fn finish(&mut self) -> u64 {
        self.enter(Stage::Done);
        self.elapsed_ms()
    }

    /// Mark the run failed at its current stage.
    pub fn fail(&mut self, source: IngestionError) -> PipelineFailure {
        let stage = self.stage;
        if !self.stage.is_terminal() {
            self.stage = Stage::Failed;
        }
        PipelineFailure::new(stage, self.params.clone(), source)
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}
