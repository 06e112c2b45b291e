/// Gateway networking modules
pub mod protocol;
pub mod session;

pub use protocol::{ClientEvent, Frame, ServerEvent};
pub use session::{Session, SessionState};
