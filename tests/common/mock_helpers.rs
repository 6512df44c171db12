//! Mock construction helpers

use gascal_rs::backend::{
    AcquisitionEvent, AcquisitionHandle, SimulatedAdc, SimulatedAdcControl, SimulatedPattern,
};
use std::time::{Duration, Instant};

/// Simulated reference instrument with constant, easy to check voltages
pub fn create_test_adc() -> (SimulatedAdc, SimulatedAdcControl) {
    let adc = SimulatedAdc::new()
        .with_channel(0, SimulatedPattern::Constant(500.0))
        .with_channel(3, SimulatedPattern::Constant(418.0));
    let control = adc.control();
    (adc, control)
}

/// Wait for the first event matching `pred`
pub fn wait_for_event<F>(
    handle: &AcquisitionHandle,
    timeout: Duration,
    mut pred: F,
) -> Option<AcquisitionEvent>
where
    F: FnMut(&AcquisitionEvent) -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return None;
        }
        match handle.recv_timeout(remaining) {
            Some(event) if pred(&event) => return Some(event),
            Some(_) => continue,
            None => return None,
        }
    }
}
