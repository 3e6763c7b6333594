use marker_rig_core::BoxError;

/// Per-controller behaviour run at lifecycle transitions.
///
/// Stopping cannot fail: a stop always completes so that cascades leave
/// every dependent stopped.
pub trait ControllerHooks {
    fn configure(&mut self) -> Result<(), BoxError> {
        Ok(())
    }

    fn on_start(&mut self) -> Result<(), BoxError> {
        Ok(())
    }

    fn on_stop(&mut self) {}
}

impl<T: ControllerHooks + ?Sized> ControllerHooks for Box<T> {
    fn configure(&mut self) -> Result<(), BoxError> {
        (**self).configure()
    }

    fn on_start(&mut self) -> Result<(), BoxError> {
        (**self).on_start()
    }

    fn on_stop(&mut self) {
        (**self).on_stop()
    }
}

/// Hooks for controllers that only take part in dependency wiring.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopHooks;

impl ControllerHooks for NoopHooks {}
