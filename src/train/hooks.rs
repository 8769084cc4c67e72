use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;

use crate::sink::{MetricsSink, NullSink};
use crate::train::epoch_record::EpochRecord;

/// Optional observers of a run.
///
/// - `progress_tx` receives one `EpochRecord` per completed epoch. A dropped
///   receiver is ignored; training continues.
/// - `stop_flag`, once set from another thread, ends the run after the
///   current epoch. The export still happens.
/// - `sink` receives scalars, figures and sample predictions.
pub struct TrainHooks {
    pub progress_tx: Option<mpsc::Sender<EpochRecord>>,
    pub stop_flag: Option<Arc<AtomicBool>>,
    pub sink: Box<dyn MetricsSink>,
}

impl Default for TrainHooks {
    fn default() -> Self {
        TrainHooks { progress_tx: None, stop_flag: None, sink: Box::new(NullSink) }
    }
}

impl TrainHooks {
    pub fn new() -> TrainHooks {
        TrainHooks::default()
    }

    pub fn with_sink(mut self, sink: impl MetricsSink + 'static) -> TrainHooks {
        self.sink = Box::new(sink);
        self
    }

    pub fn with_progress(mut self, tx: mpsc::Sender<EpochRecord>) -> TrainHooks {
        self.progress_tx = Some(tx);
        self
    }

    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> TrainHooks {
        self.stop_flag = Some(flag);
        self
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_flag.as_ref().map_or(false, |f| f.load(Ordering::Relaxed))
    }

    pub(crate) fn send_progress(&self, record: &EpochRecord) {
        if let Some(tx) = &self.progress_tx {
            let _ = tx.send(record.clone());
        }
    }
}
