use bevy::prelude::*;

/// Whether fixed-update ticks advance the engine
#[derive(States, Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum AppState {
    #[default]
    Running,
    Paused,
}
