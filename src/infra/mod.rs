//! Infrastructure shared between the interrupt handlers and the
//! cooperative poll loop.
pub mod queue;
