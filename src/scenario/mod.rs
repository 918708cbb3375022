pub mod payload;
pub mod register;

use crate::engine::context::IterationContext;
use futures::future::BoxFuture;

pub use payload::{CredentialGenerator, RegisterPayload};
pub use register::RegisterScenario;

/// The unit of work started once per scheduled tick.
///
/// Implementations must not panic or return early on network failure; a
/// failed request is recorded as an outcome like any other. The returned
/// future is dropped if the run is torn down before it completes.
pub trait Scenario: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn run(&self, ctx: IterationContext) -> BoxFuture<'_, ()>;
}
