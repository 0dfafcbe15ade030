//! Fallback command policy for failed control cycles

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use comms_if::cmd::SteerCmd;

use super::SimError;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Holds the last good command over failed cycles, up to a limit.
#[derive(Debug, Clone)]
pub struct Fallback {
    last_cmd: Option<SteerCmd>,
    consecutive_failures: usize,
    max_consecutive_failures: usize,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Fallback {
    pub fn new(max_consecutive_failures: usize) -> Self {
        Self {
            last_cmd: None,
            consecutive_failures: 0,
            max_consecutive_failures,
        }
    }

    /// Record a successful cycle's command.
    pub fn success(&mut self, cmd: &SteerCmd) {
        self.last_cmd = Some(cmd.clone());
        self.consecutive_failures = 0;
    }

    /// Record a failed cycle and get the command to apply instead.
    ///
    /// The last good actuation is held, without its stale trajectories. If
    /// no cycle has succeeded yet a neutral command is used. Once more than
    /// the allowed number of cycles fail in a row an error is returned.
    pub fn failure(&mut self) -> Result<SteerCmd, SimError> {
        self.consecutive_failures += 1;

        if self.consecutive_failures > self.max_consecutive_failures {
            return Err(SimError::TooManyFailures(self.consecutive_failures));
        }

        Ok(match self.last_cmd {
            Some(ref c) => SteerCmd {
                steering_norm: c.steering_norm,
                throttle_norm: c.throttle_norm,
                ..SteerCmd::neutral()
            },
            None => SteerCmd::neutral(),
        })
    }

    pub fn consecutive_failures(&self) -> usize {
        self.consecutive_failures
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_fallback() {
        let mut f = Fallback::new(2);

        assert_eq!(f.failure().unwrap(), SteerCmd::neutral());

        let good = SteerCmd {
            steering_norm: 0.3,
            throttle_norm: 0.8,
            predicted_x_m: vec![1.0],
            ..Default::default()
        };
        f.success(&good);
        assert_eq!(f.consecutive_failures(), 0);

        let held = f.failure().unwrap();
        assert_eq!(held.steering_norm, 0.3);
        assert_eq!(held.throttle_norm, 0.8);
        assert!(held.predicted_x_m.is_empty());

        assert!(f.failure().is_ok());
        assert!(matches!(f.failure(), Err(SimError::TooManyFailures(3))));
    }
}
