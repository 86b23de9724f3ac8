//! Difficulty events.

use bevy::prelude::*;

/// Игрок подобрал предмет (Session::on_item_collected)
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct ItemCollected;

/// Нормализованная сложность изменилась (пишет FeedbackBus при публикации)
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct DifficultyChanged {
    pub level: f32,
    pub normalized: f32,
}
