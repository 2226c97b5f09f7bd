// src/api/handlers.rs

use std::collections::HashMap;
use std::fmt;

use crate::signal::Signal;

type Handler = Box<dyn FnMut() + Send>;

/// Callbacks for application-defined signals, keyed by symbol.
///
/// Each handler closes over whatever arguments it needs. Only extension
/// symbols dispatch: a handler registered under a canonical name (`SIGTERM`,
/// `READY`, ...) is stored but never matched or called.
#[derive(Default)]
pub struct SignalHandlers {
    handlers: HashMap<Signal, Handler>,
}

impl fmt::Debug for SignalHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut symbols: Vec<_> = self.handlers.keys().map(Signal::symbol).collect();
        symbols.sort_unstable();
        f.debug_struct("SignalHandlers")
            .field("symbols", &symbols)
            .finish()
    }
}

impl SignalHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration.
    pub fn on(mut self, symbol: &str, handler: impl FnMut() + Send + 'static) -> Self {
        self.register(symbol, handler);
        self
    }

    /// Register (or replace) the handler for `symbol`.
    pub fn register(&mut self, symbol: &str, handler: impl FnMut() + Send + 'static) {
        self.handlers.insert(Signal::custom(symbol), Box::new(handler));
    }

    pub fn contains(&self, signal: &Signal) -> bool {
        signal.is_extension() && self.handlers.contains_key(signal)
    }

    /// Run the handler for `signal`. Returns false when none is registered.
    pub fn invoke(&mut self, signal: &Signal) -> bool {
        if !signal.is_extension() {
            return false;
        }
        match self.handlers.get_mut(signal) {
            Some(handler) => {
                handler();
                true
            }
            None => false,
        }
    }

    /// Registered symbols, sorted, for error messages.
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self
            .handlers
            .keys()
            .filter(|s| s.is_extension())
            .map(|s| s.symbol().to_string())
            .collect();
        symbols.sort();
        symbols
    }
}
