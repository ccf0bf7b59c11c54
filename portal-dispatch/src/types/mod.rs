pub mod ids;
pub mod kind;
pub mod flags;
pub mod status;
pub mod events;

pub use ids::JobId;
pub use kind::JobKind;
pub use flags::{JobFlag, KindFlags};
pub use status::JobStatus;
pub use events::DispatchEvent;
