//! Ghost AI events
//!
//! Пишет `ghost_behavior`, читают FeedbackBus (proximity) и session layer
//! (catch, журнал переходов для хоста).

use bevy::prelude::*;

use super::components::{GhostId, GhostStateKind};

/// FSM переход (ровно одно событие на переход)
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct GhostStateChanged {
    pub ghost: GhostId,
    pub from: GhostStateKind,
    pub to: GhostStateKind,
}

/// Призрак рядом с целью: proximity = clamp01(distance / (radius * 1.5))
///
/// Пишет FSM каждый тик в Chasing/Searching, либо хост через
/// `Session::on_ghost_proximity`.
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct ProximityReported {
    pub ghost: GhostId,
    pub proximity: f32,
}

/// Цель поймана (терминальное, one-shot)
#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetCaught {
    pub ghost: GhostId,
}
