//! Bypass relay capability

use tokio::sync::watch;

/// On/off relay carrying the full load while bypass is active
pub trait Relay: Send + Sync {
    /// Whether a relay is wired and usable
    fn is_enabled(&self) -> bool;

    fn is_on(&self) -> bool;

    fn is_off(&self) -> bool {
        !self.is_on()
    }

    /// Switch the relay. Ignored when the relay is not enabled.
    fn set_state(&self, on: bool);
}

/// Relay whose state is published on a watch channel
///
/// The hardware side (GPIO, remote switch) subscribes and follows the
/// published state.
#[derive(Debug)]
pub struct LatchRelay {
    enabled: bool,
    state: watch::Sender<bool>,
}

impl LatchRelay {
    pub fn new(enabled: bool) -> Self {
        let (state, _) = watch::channel(false);
        Self { enabled, state }
    }

    /// Observe state changes
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }
}

impl Relay for LatchRelay {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn is_on(&self) -> bool {
        *self.state.borrow()
    }

    fn set_state(&self, on: bool) {
        if !self.enabled {
            return;
        }
        self.state.send_replace(on);
    }
}
