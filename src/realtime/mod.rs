pub mod dispatch;
pub mod events;
pub mod fanout;
pub mod presence;
pub mod pubsub;
pub mod registry;
pub mod session;

pub use dispatch::Dispatcher;
pub use events::ServerEvent;
pub use fanout::{DeliveryReport, FanoutRouter};
pub use presence::PresenceTracker;
pub use registry::{ConnectionRecord, ConnectionRegistry};
pub use session::SessionCoordinator;
