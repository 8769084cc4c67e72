use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopState {
    Running,
    Stopped,
}

/// Watches validation loss. An epoch improves when its loss is below the
/// best so far by more than `delta`; `patience` consecutive non-improving
/// epochs stop the run. `Stopped` is terminal.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    delta: f64,
    best_loss: f64,
    counter: usize,
    state: StopState,
}

impl EarlyStopping {
    pub fn new(patience: usize, delta: f64) -> EarlyStopping {
        EarlyStopping {
            patience,
            delta,
            best_loss: f64::INFINITY,
            counter: 0,
            state: StopState::Running,
        }
    }

    pub fn update(&mut self, val_loss: f64) -> StopState {
        if self.state == StopState::Stopped {
            return StopState::Stopped;
        }
        if val_loss < self.best_loss - self.delta {
            self.best_loss = val_loss;
            self.counter = 0;
        } else {
            self.counter += 1;
            if self.counter >= self.patience {
                self.state = StopState::Stopped;
            }
        }
        self.state
    }

    pub fn state(&self) -> StopState {
        self.state
    }

    pub fn counter(&self) -> usize {
        self.counter
    }

    /// `None` until the first evaluation.
    pub fn best_loss(&self) -> Option<f64> {
        if self.best_loss.is_finite() { Some(self.best_loss) } else { None }
    }
}
