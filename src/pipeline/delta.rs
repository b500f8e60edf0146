/// Previous absolute reading of one delta key
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeltaState {
    previous: Option<f64>,
}

impl DeltaState {
    pub fn new() -> Self {
        DeltaState { previous: None }
    }

    /// Record a reading and return the difference to the one before.
    /// The first reading only primes the state and yields `None`.
    pub fn observe(&mut self, value: f64) -> Option<f64> {
        let delta = self.previous.map(|previous| value - previous);
        self.previous = Some(value);
        delta
    }

    pub fn is_primed(&self) -> bool {
        self.previous.is_some()
    }

    pub fn previous(&self) -> Option<f64> {
        self.previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_observation_primes() {
        let mut state = DeltaState::new();
        assert!(!state.is_primed());
        assert_eq!(state.observe(100.0), None);
        assert!(state.is_primed());
        assert_eq!(state.previous(), Some(100.0));
    }

    #[test]
    fn test_successive_differences() {
        let mut state = DeltaState::new();
        state.observe(100.0);
        assert_eq!(state.observe(107.5), Some(7.5));
        assert_eq!(state.observe(110.0), Some(2.5));
        assert_eq!(state.observe(110.0), Some(0.0));
        assert_eq!(state.previous(), Some(110.0));
    }
}
