//! Seam for the external recorder/camera peripheral.
//!
//! The auxiliary M-codes address an acquisition box that lives on the
//! network; the transport that actually reaches it is wired in by the
//! embedding process. Calls are fire-and-forget: nothing here returns a
//! result and failures are never surfaced to the interpreter.

pub trait Recorder: Send {
    fn start_acquisition(&mut self, pulses_per_sec: u32, label: &str);
    fn stop_acquisition(&mut self);
    fn stream_on(&mut self);
    fn stream_off(&mut self);
    fn set_exposure(&mut self, microseconds: u32);
}

/// Recorder that only logs what it is asked to do. Default for builds
/// without the acquisition box attached.
#[derive(Debug, Default)]
pub struct LogRecorder;

impl Recorder for LogRecorder {
    fn start_acquisition(&mut self, pulses_per_sec: u32, label: &str) {
        tracing::info!(pulses_per_sec, label, "recorder: start acquisition");
    }

    fn stop_acquisition(&mut self) {
        tracing::info!("recorder: stop acquisition");
    }

    fn stream_on(&mut self) {
        tracing::info!("recorder: stream on");
    }

    fn stream_off(&mut self) {
        tracing::info!("recorder: stream off");
    }

    fn set_exposure(&mut self, microseconds: u32) {
        tracing::info!(microseconds, "recorder: set exposure");
    }
}
