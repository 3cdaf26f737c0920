pub mod controller;
pub mod events;
pub mod reconcile;

pub use controller::SessionController;
pub use events::SessionEvent;
pub use reconcile::reconcile;
