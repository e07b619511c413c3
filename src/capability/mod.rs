//! 能力层：外部能力抽象（CapabilityProvider / Connection）、路由、超时执行器、Mock

pub mod executor;
pub mod mock;
pub mod router;
pub mod traits;

pub use executor::CapabilityExecutor;
pub use mock::MockConnection;
pub use router::CapabilityRouter;
pub use traits::{CapabilityProvider, Connection};
