use std::fmt;
use std::sync::Arc;

use crate::types::Candle;

/// Entry predicate evaluated by the simulator at each candidate index.
///
/// Implementations see the full candle sequence of the run and must not look
/// past `index` if they want to avoid lookahead bias.
pub trait EntrySignal: Send + Sync {
    fn evaluate(&self, candles: &[Candle], index: usize) -> bool;

    fn name(&self) -> String {
        "custom".to_string()
    }
}

impl<F> EntrySignal for F
where
    F: Fn(&[Candle], usize) -> bool + Send + Sync,
{
    fn evaluate(&self, candles: &[Candle], index: usize) -> bool {
        self(candles, index)
    }
}

/// Cheaply clonable handle to an entry signal, shared across parallel runs
#[derive(Clone)]
pub struct SharedSignal(Arc<dyn EntrySignal>);

impl SharedSignal {
    pub fn new(signal: impl EntrySignal + 'static) -> Self {
        Self(Arc::new(signal))
    }

    pub fn evaluate(&self, candles: &[Candle], index: usize) -> bool {
        self.0.evaluate(candles, index)
    }

    pub fn name(&self) -> String {
        self.0.name()
    }
}

impl EntrySignal for SharedSignal {
    fn evaluate(&self, candles: &[Candle], index: usize) -> bool {
        self.0.evaluate(candles, index)
    }

    fn name(&self) -> String {
        self.0.name()
    }
}

impl fmt::Debug for SharedSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedSignal").field(&self.name()).finish()
    }
}
