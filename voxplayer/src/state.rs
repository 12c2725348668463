use std::fmt;

/// Player life cycle
///
/// `Dead` is terminal: a killed player never plays again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerState {
    #[default]
    Stopped,
    Playing,
    Paused,
    Dead,
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PlayerState::Stopped => "stopped",
            PlayerState::Playing => "playing",
            PlayerState::Paused => "paused",
            PlayerState::Dead => "dead",
        };
        f.write_str(label)
    }
}

/// What happens when an entry finishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepeatMode {
    /// Move on to the next entry
    #[default]
    None,
    /// Re-queue the finished entry at the end
    All,
    /// Replay the finished entry immediately
    Single,
}

impl RepeatMode {
    /// Next mode in the `None -> All -> Single -> None` cycle
    pub fn cycled(self) -> RepeatMode {
        match self {
            RepeatMode::None => RepeatMode::All,
            RepeatMode::All => RepeatMode::Single,
            RepeatMode::Single => RepeatMode::None,
        }
    }
}

impl fmt::Display for RepeatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RepeatMode::None => "off",
            RepeatMode::All => "all",
            RepeatMode::Single => "single",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeat_cycles_through_all_modes() {
        let mut mode = RepeatMode::None;
        mode = mode.cycled();
        assert_eq!(mode, RepeatMode::All);
        mode = mode.cycled();
        assert_eq!(mode, RepeatMode::Single);
        mode = mode.cycled();
        assert_eq!(mode, RepeatMode::None);
    }
}
